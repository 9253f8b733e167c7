//! Integration tests for identifiers, facts, and type declarations

use std::collections::BTreeSet;
use std::time::Duration;

use trellis_foundation::{
    EntryPointId, Fact, FactHandle, FactType, Role, RuleBasePartitionId, TypeDeclaration,
};

struct Reading {
    value: f64,
}

struct Alarm;

// =============================================================================
// Fact Handles
// =============================================================================

#[test]
fn handles_order_by_factory_then_id() {
    let handles: BTreeSet<_> = [
        FactHandle::new(2, 1),
        FactHandle::new(1, 9),
        FactHandle::new(1, 2),
    ]
    .into_iter()
    .collect();
    let ordered: Vec<_> = handles.into_iter().collect();
    assert_eq!(
        ordered,
        vec![FactHandle::new(1, 2), FactHandle::new(1, 9), FactHandle::new(2, 1)]
    );
}

#[test]
fn handles_from_different_factories_differ() {
    assert_ne!(FactHandle::new(1, 5), FactHandle::new(2, 5));
    assert_eq!(FactHandle::new(3, 5).to_string(), "#3:5");
}

#[test]
fn main_partition_is_lowest() {
    assert_eq!(RuleBasePartitionId::MAIN.index(), 0);
    assert!(RuleBasePartitionId::MAIN < RuleBasePartitionId(1));
}

// =============================================================================
// Entry Points
// =============================================================================

#[test]
fn default_entry_point() {
    let id = EntryPointId::default();
    assert!(id.is_default());
    assert_eq!(id.name(), EntryPointId::DEFAULT_NAME);
    assert!(!EntryPointId::from("payments").is_default());
}

#[test]
fn entry_point_ids_compare_by_name() {
    assert_eq!(EntryPointId::new("audit"), EntryPointId::from("audit"));
    assert!(EntryPointId::new("audit") < EntryPointId::new("payments"));
}

// =============================================================================
// Facts
// =============================================================================

#[test]
fn fact_downcasts_to_its_type() {
    let fact = Fact::new(Reading { value: 2.5 });
    assert!(fact.is::<Reading>());
    assert!(!fact.is::<Alarm>());
    assert!((fact.downcast_ref::<Reading>().unwrap().value - 2.5).abs() < f64::EPSILON);
    assert!(fact.downcast_ref::<Alarm>().is_none());
    assert_eq!(fact.fact_type(), FactType::of::<Reading>());
}

#[test]
fn fact_clones_share_the_value() {
    let fact = Fact::new(Alarm);
    let clone = fact.clone();
    assert!(fact.ptr_eq(&clone));
    assert!(!fact.ptr_eq(&Fact::new(Alarm)));
}

// =============================================================================
// Type Declarations
// =============================================================================

#[test]
fn event_declaration_carries_expiry() {
    let declaration = TypeDeclaration::event::<Alarm>()
        .with_expires(Duration::from_secs(10))
        .with_timestamp_attribute("raised_at")
        .with_metadata("source", "sensors");

    assert!(declaration.is_event());
    assert_eq!(declaration.role, Role::Event);
    assert_eq!(declaration.expires, Some(Duration::from_secs(10)));
    assert_eq!(declaration.timestamp_attribute.as_deref(), Some("raised_at"));
    assert_eq!(declaration.metadata.get("source").map(String::as_str), Some("sensors"));
}

#[test]
fn fact_declaration_is_not_an_event() {
    let declaration = TypeDeclaration::fact::<Reading>();
    assert!(!declaration.is_event());
    assert_ne!(declaration, TypeDeclaration::event::<Reading>());
}
