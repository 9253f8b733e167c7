//! Integration tests for working memory sessions

use std::sync::Arc;

use parking_lot::Mutex;
use trellis_engine::{Package, Rule, RuleBase, RuleBaseConfiguration, WorkingMemory};
use trellis_foundation::{EntryPointId, ErrorCategory, ErrorKind, Fact, FactHandle};

struct Sensor {
    celsius: i32,
}

struct Alert {
    celsius: i32,
}

fn climate() -> Package {
    Package::new("climate")
        .with_rule(
            Rule::new("overheat")
                .when_fact(|s: &Sensor| s.celsius > 40)
                .then(|ctx| {
                    let celsius = ctx.fact_as::<Sensor>().map_or(0, |s| s.celsius);
                    ctx.insert(Alert { celsius })?;
                    Ok(())
                }),
        )
        .with_rule(Rule::new("remote").on_entry_point("remote").of_type::<Sensor>())
}

fn session() -> WorkingMemory {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    rb.add_package(climate()).unwrap();
    rb.new_session().unwrap()
}

fn alerts(session: &WorkingMemory) -> Vec<i32> {
    session
        .facts()
        .into_iter()
        .filter_map(|(_, fact)| fact.downcast_ref::<Alert>().map(|a| a.celsius))
        .collect()
}

// =============================================================================
// Fact Identity
// =============================================================================

#[test]
fn handles_are_monotonic_per_session() {
    let session = session();
    let a = session.insert(Sensor { celsius: 1 }).unwrap();
    let b = session.insert(Sensor { celsius: 2 }).unwrap();
    let c = session.new_fact_handle().unwrap();
    assert_eq!(a.factory, session.factory_id());
    assert!(a.id < b.id && b.id < c.id);
}

#[test]
fn sessions_get_distinct_factories() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    let first = rb.new_session().unwrap();
    let second = rb.new_session().unwrap();
    assert_ne!(first.factory_id(), second.factory_id());
    assert_ne!(first.id(), second.id());
}

#[test]
fn retracted_handle_stays_dead() {
    let session = session();
    let handle = session.insert(Sensor { celsius: 50 }).unwrap();
    session.retract(handle).unwrap();

    let err = session.update(handle, Fact::new(Sensor { celsius: 1 })).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RetractedHandle(_)));
    assert_eq!(err.category(), ErrorCategory::Identity);
}

#[test]
fn foreign_handle_is_rejected_without_side_effects() {
    let session = session();
    session.insert(Sensor { celsius: 50 }).unwrap();
    let foreign = FactHandle::new(session.factory_id() + 100, 1);

    let err = session.retract(foreign).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ForeignHandle { .. }));
    assert_eq!(session.fact_count(), 1);
    assert_eq!(session.activations().len(), 1);
}

// =============================================================================
// Entry Points
// =============================================================================

#[test]
fn named_entry_point_routes_only_its_rules() {
    let session = session();
    assert!(session.entry_point_ids().contains(&EntryPointId::new("remote")));

    session
        .insert_into("remote", Fact::new(Sensor { celsius: 90 }))
        .unwrap();
    let activations = session.activations();
    assert_eq!(activations.len(), 1);
    assert_eq!(activations[0].rule.rule(), "remote");
}

#[test]
fn retract_works_on_the_inserting_entry_point() {
    let session = session();
    let handle = session
        .insert_into("remote", Fact::new(Sensor { celsius: 1 }))
        .unwrap();
    session.retract(handle).unwrap();
    assert_eq!(session.fact_count(), 0);
}

// =============================================================================
// Firing
// =============================================================================

#[test]
fn consequences_can_insert_facts() {
    let session = session();
    session.insert(Sensor { celsius: 45 }).unwrap();
    session.insert(Sensor { celsius: 20 }).unwrap();
    session.insert(Sensor { celsius: 60 }).unwrap();

    assert_eq!(session.fire_all_rules().unwrap(), 2);
    let mut seen = alerts(&session);
    seen.sort_unstable();
    assert_eq!(seen, vec![45, 60]);
}

#[test]
fn consequences_can_retract_their_fact() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    rb.add_package(Package::new("cleanup").with_rule(
        Rule::new("drop-cold")
            .when_fact(|s: &Sensor| s.celsius < 0)
            .then(|ctx| {
                let handle = ctx.handle();
                ctx.retract(handle)
            }),
    ))
    .unwrap();
    let session = rb.new_session().unwrap();
    session.insert(Sensor { celsius: -5 }).unwrap();
    session.insert(Sensor { celsius: 5 }).unwrap();

    assert_eq!(session.fire_all_rules().unwrap(), 1);
    assert_eq!(session.fact_count(), 1);
}

#[test]
fn consequences_see_globals() {
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    rb.add_package(
        Package::new("p")
            .with_global::<i32>("threshold")
            .with_rule(Rule::new("r").of_type::<Sensor>().then(move |ctx| {
                let threshold = ctx
                    .global("threshold")
                    .and_then(|fact| fact.downcast_ref::<i32>().copied());
                *sink.lock() = threshold;
                Ok(())
            })),
    )
    .unwrap();
    let session = rb.new_session().unwrap();
    session.set_global("threshold", 30i32).unwrap();
    session.insert(Sensor { celsius: 1 }).unwrap();
    session.fire_all_rules().unwrap();
    assert_eq!(*seen.lock(), Some(30));
}
