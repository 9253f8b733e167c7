//! Fail-clean propagation: a node failure leaves no trace

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use trellis_engine::{Package, Rule, RuleBase, RuleBaseConfiguration};
use trellis_foundation::{Error, ErrorCategory, ErrorKind, Fact, FactHandle, NodeId, Result};
use trellis_network::{
    Activation, NodeProvider, NodeSpec, ObjectSink, PropagationContext, RuleName,
    TerminalNodeProvider,
};

struct Reading {
    value: i32,
}

/// Counts propagations and fails on values it was told to reject.
struct FlakyNode {
    spec: NodeSpec,
    reject_above: Option<i32>,
    fail_retract: bool,
    asserted: Arc<AtomicUsize>,
    retracted: Arc<AtomicUsize>,
}

impl ObjectSink for FlakyNode {
    fn id(&self) -> NodeId {
        self.spec.id
    }

    fn rule(&self) -> &RuleName {
        &self.spec.rule
    }

    fn partition(&self) -> trellis_foundation::RuleBasePartitionId {
        self.spec.partition
    }

    fn assert_object(
        &self,
        handle: FactHandle,
        fact: &Fact,
        context: &PropagationContext,
    ) -> Result<Option<Activation>> {
        let value = fact.downcast_ref::<Reading>().map_or(0, |r| r.value);
        if self.reject_above.is_some_and(|limit| value > limit) {
            return Err(Error::node_failure(self.spec.id, "value out of range"));
        }
        self.asserted.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Activation {
            rule: self.spec.rule.clone(),
            node: self.spec.id,
            handle,
            salience: self.spec.salience,
            sequence: context.sequence(),
        }))
    }

    fn retract_object(&self, _handle: FactHandle, _context: &PropagationContext) -> Result<()> {
        if self.fail_retract {
            return Err(Error::node_failure(self.spec.id, "retraction refused"));
        }
        self.retracted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct Counters {
    asserted: Arc<AtomicUsize>,
    retracted: Arc<AtomicUsize>,
}

/// Builds a `FlakyNode` for rules named "strict" or "sticky".
struct FlakyProvider {
    counters: Counters,
}

impl NodeProvider for FlakyProvider {
    fn build(&self, spec: NodeSpec) -> Result<Arc<dyn ObjectSink>> {
        let (reject_above, fail_retract) = match spec.rule.rule() {
            "strict" => (Some(100), false),
            "sticky" => (None, true),
            "unbuildable" => {
                return Err(Error::node_failure(spec.id, "cannot build"));
            }
            _ => (None, false),
        };
        Ok(Arc::new(FlakyNode {
            spec,
            reject_above,
            fail_retract,
            asserted: Arc::clone(&self.counters.asserted),
            retracted: Arc::clone(&self.counters.retracted),
        }))
    }
}

fn rule_base() -> (Arc<RuleBase>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    crate::init_tracing();
    let counters = Counters::default();
    let asserted = Arc::clone(&counters.asserted);
    let retracted = Arc::clone(&counters.retracted);
    let rb = RuleBase::with_node_provider(
        RuleBaseConfiguration::default(),
        Arc::new(FlakyProvider { counters }),
    );
    (rb, asserted, retracted)
}

#[test]
fn failed_assertion_is_rolled_back() {
    let (rb, asserted, retracted) = rule_base();
    rb.add_package(
        Package::new("sensors")
            .with_rule(Rule::new("lenient").of_type::<Reading>())
            .with_rule(Rule::new("strict").of_type::<Reading>()),
    )
    .unwrap();
    let session = rb.new_session().unwrap();

    let err = session.insert(Reading { value: 500 }).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Propagation);
    assert!(err.is_assertion_failure());
    assert!(matches!(err.kind, ErrorKind::NodeFailure { .. }));

    assert_eq!(session.fact_count(), 0);
    assert!(session.activations().is_empty());
    assert_eq!(asserted.load(Ordering::SeqCst), 1);
    assert_eq!(retracted.load(Ordering::SeqCst), 1);

    // The session keeps working afterwards.
    session.insert(Reading { value: 5 }).unwrap();
    assert_eq!(session.activations().len(), 2);
}

#[test]
fn failed_retraction_keeps_the_fact() {
    let (rb, asserted, _) = rule_base();
    rb.add_package(
        Package::new("sensors")
            .with_rule(Rule::new("lenient").of_type::<Reading>())
            .with_rule(Rule::new("sticky").of_type::<Reading>()),
    )
    .unwrap();
    let session = rb.new_session().unwrap();
    let handle = session.insert(Reading { value: 1 }).unwrap();
    assert_eq!(asserted.load(Ordering::SeqCst), 2);

    let err = session.retract(handle).unwrap_err();
    assert!(err.is_retraction_failure());
    assert!(session.contains(handle));
    assert_eq!(session.activations().len(), 2);
    // The node that had already dropped the fact got it back.
    assert_eq!(asserted.load(Ordering::SeqCst), 3);
}

#[test]
fn failed_node_build_publishes_nothing() {
    let (rb, _, _) = rule_base();
    rb.add_package(Package::new("base").with_rule(Rule::new("lenient").of_type::<Reading>()))
        .unwrap();

    let err = rb
        .add_package(
            Package::new("broken")
                .with_global::<i32>("limit")
                .with_rule(Rule::new("fine").of_type::<Reading>())
                .with_rule(Rule::new("unbuildable").of_type::<Reading>()),
        )
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NodeFailure { .. }));
    assert!(rb.package("broken").is_none());
    assert!(rb.globals().is_empty());
    assert_eq!(rb.node_count(), 1);
}

#[test]
fn default_provider_never_fails() {
    let rb = RuleBase::with_node_provider(
        RuleBaseConfiguration::default(),
        Arc::new(TerminalNodeProvider),
    );
    rb.add_package(Package::new("p").with_rule(Rule::new("strict").of_type::<Reading>()))
        .unwrap();
    let session = rb.new_session().unwrap();
    session.insert(Reading { value: 500 }).unwrap();
    assert_eq!(session.activations().len(), 1);
}
