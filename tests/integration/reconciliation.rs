//! Live sessions follow structural changes to the rule base

use trellis_engine::{Package, Rule, RuleBase, RuleBaseConfiguration};
use trellis_foundation::{EntryPointId, ErrorKind, Fact};

struct Order {
    total: u32,
}

struct Refund;

#[test]
fn new_rule_sees_existing_facts() {
    crate::init_tracing();
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    let session = rb.new_session().unwrap();
    session.insert(Order { total: 500 }).unwrap();
    session.insert(Order { total: 5 }).unwrap();
    assert!(session.activations().is_empty());

    rb.add_package(
        Package::new("orders").with_rule(Rule::new("big").when_fact(|o: &Order| o.total > 100)),
    )
    .unwrap();

    assert_eq!(session.activations().len(), 1);
    assert_eq!(session.fire_all_rules().unwrap(), 1);
}

#[test]
fn removed_rule_loses_its_activations() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    rb.add_package(Package::new("orders").with_rule(Rule::new("any").of_type::<Order>()))
        .unwrap();
    rb.add_package(Package::new("refunds").with_rule(Rule::new("any").of_type::<Refund>()))
        .unwrap();
    let session = rb.new_session().unwrap();
    session.insert(Order { total: 1 }).unwrap();
    session.insert(Refund).unwrap();
    assert_eq!(session.activations().len(), 2);

    rb.remove_package("orders").unwrap();

    let remaining = session.activations();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].rule.package(), "refunds");
    assert_eq!(session.fact_count(), 2);
}

#[test]
fn replaced_rule_is_reevaluated() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    rb.add_package(
        Package::new("orders").with_rule(Rule::new("big").when_fact(|o: &Order| o.total > 100)),
    )
    .unwrap();
    let session = rb.new_session().unwrap();
    session.insert(Order { total: 50 }).unwrap();
    assert!(session.activations().is_empty());

    rb.add_package(
        Package::new("orders")
            .with_version(2)
            .with_rule(Rule::new("big").when_fact(|o: &Order| o.total > 10)),
    )
    .unwrap();
    assert_eq!(session.activations().len(), 1);
}

#[test]
fn sessions_pick_up_new_entry_points() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    let session = rb.new_session().unwrap();
    let err = session
        .insert_into("returns", Fact::new(Refund))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownEntryPoint(_)));

    rb.add_package(
        Package::new("returns").with_rule(Rule::new("any").on_entry_point("returns")),
    )
    .unwrap();
    assert!(session.entry_point_ids().contains(&EntryPointId::new("returns")));
    session.insert_into("returns", Fact::new(Refund)).unwrap();
    assert_eq!(session.activations().len(), 1);
}

#[test]
fn sessions_drop_removed_entry_points() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    rb.add_package(
        Package::new("returns").with_rule(Rule::new("any").on_entry_point("returns")),
    )
    .unwrap();
    let session = rb.new_session().unwrap();
    let handle = session.insert_into("returns", Fact::new(Refund)).unwrap();

    rb.remove_package("returns").unwrap();
    assert!(!session.entry_point_ids().contains(&EntryPointId::new("returns")));
    assert!(rb.removed_entry_node_cache().is_empty());

    let err = session
        .insert_into("returns", Fact::new(Refund))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownEntryPoint(_)));
    // Facts already inserted there can still be retracted.
    session.retract(handle).unwrap();
}

#[test]
fn default_entry_point_is_never_removed() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    rb.add_package(Package::new("orders").with_rule(Rule::new("any").of_type::<Order>()))
        .unwrap();
    rb.remove_package("orders").unwrap();
    let session = rb.new_session().unwrap();
    assert_eq!(session.entry_point_ids(), vec![EntryPointId::default()]);
    session.insert(Order { total: 1 }).unwrap();
}

#[test]
fn multithreaded_reconciliation_spans_partitions() {
    let rb = RuleBase::new(RuleBaseConfiguration::multithreaded());
    let session = rb.new_session().unwrap();
    session.insert(Order { total: 1 }).unwrap();
    session.insert(Refund).unwrap();

    rb.add_package(
        Package::new("all")
            .with_rule(Rule::new("orders").of_type::<Order>())
            .with_rule(Rule::new("refunds").of_type::<Refund>()),
    )
    .unwrap();
    assert!(rb.partition_ids().len() >= 3);
    assert_eq!(session.activations().len(), 2);
}
