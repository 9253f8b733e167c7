//! Integration tests for the error taxonomy

use trellis_foundation::{
    EntryPointId, Error, ErrorCategory, ErrorContext, ErrorKind, FactHandle, NodeId, Operation,
    RuleBasePartitionId, SessionId,
};

#[test]
fn identity_errors() {
    let handle = FactHandle::new(1, 1);
    for err in [
        Error::unknown_handle(handle),
        Error::foreign_handle(handle, 2),
        Error::retracted_handle(handle),
        Error::duplicate_assertion(handle),
    ] {
        assert_eq!(err.category(), ErrorCategory::Identity);
    }
}

#[test]
fn recovery_errors() {
    assert_eq!(
        Error::invalid_checkpoint(-1, 0).category(),
        ErrorCategory::Recovery
    );
    assert_eq!(
        Error::unreadable_checkpoint("truncated").category(),
        ErrorCategory::Recovery
    );
}

#[test]
fn structural_errors() {
    assert_eq!(Error::undeclared_type("Order").category(), ErrorCategory::Structural);
    assert_eq!(
        Error::unknown_entry_point(&EntryPointId::new("audit")).category(),
        ErrorCategory::Structural
    );
    assert_eq!(
        Error::new(ErrorKind::ConflictingTypeDeclaration("Order".into())).category(),
        ErrorCategory::Structural
    );
}

#[test]
fn concurrency_and_lifecycle_errors() {
    let violation = Error::lock_order_violation(RuleBasePartitionId(3), RuleBasePartitionId(1));
    assert_eq!(violation.category(), ErrorCategory::Concurrency);
    assert!(violation.to_string().contains("P3"));

    assert_eq!(Error::rule_base_disposed().category(), ErrorCategory::Lifecycle);
    assert_eq!(
        Error::session_disposed(SessionId(4)).category(),
        ErrorCategory::Lifecycle
    );
    assert_eq!(
        Error::node_failure(NodeId(2), "boom").category(),
        ErrorCategory::Propagation
    );
}

#[test]
fn context_marks_assertion_and_retraction_failures() {
    let handle = FactHandle::new(1, 7);
    let assert = Error::unknown_handle(handle)
        .with_context(ErrorContext::new(Operation::Assert).with_handle(handle));
    assert!(assert.is_assertion_failure());
    assert!(!assert.is_retraction_failure());

    let retract = Error::retracted_handle(handle).with_context(ErrorContext::new(Operation::Retract));
    assert!(retract.is_retraction_failure());
    assert!(!Error::rule_base_disposed().is_assertion_failure());
}

#[test]
fn outer_context_does_not_override_inner() {
    let err = Error::unknown_handle(FactHandle::new(1, 1))
        .with_context(ErrorContext::new(Operation::Retract))
        .with_context(ErrorContext::new(Operation::QueuedAction).with_package("billing"));

    let context = err.context.unwrap();
    assert_eq!(context.operation, Some(Operation::Retract));
    assert_eq!(context.package.as_deref(), Some("billing"));
}
