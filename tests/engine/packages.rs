//! Integration tests for package deployment

use trellis_engine::{Package, Rule, RuleBase, RuleBaseConfiguration};
use trellis_foundation::{ErrorKind, FactType, Operation, TypeDeclaration};
use trellis_network::RuleName;

struct Invoice {
    amount: u32,
}

struct Customer;

fn billing(version: u32) -> Package {
    Package::new("billing")
        .with_version(version)
        .with_global::<u32>("limit")
        .with_rule(Rule::new("large").when_fact(|i: &Invoice| i.amount > 1_000))
}

#[test]
fn package_rules_are_addressable_by_qualified_name() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    rb.add_package(billing(1)).unwrap();

    let name = RuleName::new("billing", "large");
    assert!(rb.rule(&name).is_some());
    assert!(rb.rete().node_for_rule(&name).is_some());
    assert_eq!(rb.packages().rule_count(), 1);
    assert_eq!(rb.globals().get("limit"), Some(&FactType::of::<u32>()));
}

#[test]
fn replacing_a_package_swaps_its_rules() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    rb.add_package(billing(1)).unwrap();
    rb.add_package(
        Package::new("billing")
            .with_version(2)
            .with_rule(Rule::new("tiny").when_fact(|i: &Invoice| i.amount < 10)),
    )
    .unwrap();

    assert!(rb.rule(&RuleName::new("billing", "large")).is_none());
    assert!(rb.rule(&RuleName::new("billing", "tiny")).is_some());
    assert_eq!(rb.node_count(), 1);
    assert!(rb.globals().get("limit").is_none());
}

#[test]
fn globals_must_agree_across_packages() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    rb.add_package(billing(1)).unwrap();
    let err = rb
        .add_package(Package::new("shipping").with_global::<String>("limit"))
        .unwrap_err();

    assert!(matches!(err.kind, ErrorKind::ConflictingGlobal(_)));
    let context = err.context.unwrap();
    assert_eq!(context.operation, Some(Operation::PackageUpdate));
    assert_eq!(context.package.as_deref(), Some("shipping"));
    assert!(rb.package("shipping").is_none());
}

#[test]
fn type_declarations_survive_package_removal() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    rb.add_package(Package::new("crm").with_type_declaration(TypeDeclaration::event::<Customer>()))
        .unwrap();
    rb.remove_package("crm").unwrap();

    assert!(rb.package("crm").is_none());
    assert!(rb.is_event_type::<Customer>());
}

#[test]
fn identical_redeclaration_is_accepted() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    rb.add_package(Package::new("a").with_type_declaration(TypeDeclaration::fact::<Customer>()))
        .unwrap();
    rb.add_package(Package::new("b").with_type_declaration(TypeDeclaration::fact::<Customer>()))
        .unwrap();
    assert_eq!(rb.packages().len(), 2);
    assert_eq!(rb.type_declarations().len(), 1);
}

#[test]
fn packages_are_listed_by_name() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    for name in ["shipping", "billing", "crm"] {
        rb.add_package(Package::new(name)).unwrap();
    }
    assert_eq!(rb.packages().names(), vec!["billing", "crm", "shipping"]);
}
