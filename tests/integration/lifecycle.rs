//! Rule base and session lifecycle

use std::sync::Arc;
use std::thread;

use trellis_engine::{Package, Rule, RuleBase, RuleBaseConfiguration, RuleBaseState};
use trellis_foundation::{EntryPointId, ErrorCategory, ErrorKind, RuleBasePartitionId};
use trellis_network::EntryPointNode;

struct Ping;

#[test]
fn disposed_rule_base_rejects_everything() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    rb.add_package(Package::new("p").with_rule(Rule::new("r").of_type::<Ping>()))
        .unwrap();
    let session = rb.new_session().unwrap();
    session.insert(Ping).unwrap();

    rb.dispose().unwrap();
    assert_eq!(rb.state(), RuleBaseState::Disposed);
    assert!(rb.working_memories().is_empty());

    for err in [
        rb.new_session().unwrap_err(),
        rb.remove_package("p").unwrap_err(),
        rb.queue_action(|_| Ok(())).unwrap_err(),
        session.insert(Ping).unwrap_err(),
        session.fire_all_rules().unwrap_err(),
        rb.create_new_partition_id().unwrap_err(),
        rb.new_fact_handle_factory().unwrap_err(),
        rb.recover_fact_handle_factory(9, 10).unwrap_err(),
        rb.next_working_memory_counter().unwrap_err(),
        rb.register_added_entry_node_cache(Arc::new(EntryPointNode::new(EntryPointId::new("late"))))
            .unwrap_err(),
        rb.register_removed_entry_node_cache(&EntryPointNode::new(EntryPointId::default()))
            .unwrap_err(),
    ] {
        assert!(matches!(err.kind, ErrorKind::RuleBaseDisposed), "{err}");
        assert_eq!(err.category(), ErrorCategory::Lifecycle);
    }

    // Read-only queries still answer.
    assert!(rb.package("p").is_some());
    assert_eq!(rb.partition_ids(), vec![RuleBasePartitionId::MAIN]);
    assert!(rb.added_entry_node_cache().is_empty());
    assert!(rb.removed_entry_node_cache().is_empty());
    assert!(rb.entry_point(&EntryPointId::new("late")).is_none());
}

#[test]
fn dispose_is_idempotent() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    rb.dispose().unwrap();
    rb.dispose().unwrap();
    assert_eq!(rb.state(), RuleBaseState::Disposed);
}

#[test]
fn disposing_one_session_leaves_the_others() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    let keep = rb.new_session().unwrap();
    let gone = rb.new_session().unwrap();
    rb.dispose_stateful_session(&gone);

    assert_eq!(rb.working_memories(), vec![keep.clone()]);
    assert!(matches!(
        gone.insert(Ping).unwrap_err().kind,
        ErrorKind::SessionDisposed(_)
    ));
    keep.insert(Ping).unwrap();
}

#[test]
fn sessions_of_another_rule_base_are_ignored() {
    let first = RuleBase::new(RuleBaseConfiguration::default());
    let second = RuleBase::new(RuleBaseConfiguration::default());
    let session = first.new_session().unwrap();
    second.dispose_stateful_session(&session);
    assert!(!session.is_disposed());
}

#[test]
fn queued_actions_refuse_to_run_under_a_lock() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    rb.queue_action(|_| Ok(())).unwrap();
    {
        let _read = rb.read_lock();
        let err = rb.execute_queued_actions().unwrap_err();
        assert!(matches!(err.kind, ErrorKind::LockHeld(_)));
        assert_eq!(rb.queued_action_count(), 1);
    }
    assert_eq!(rb.execute_queued_actions().unwrap().executed, 1);
}

#[test]
fn dispose_waits_for_readers_on_other_threads() {
    crate::init_tracing();
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    let session = rb.new_session().unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let session = session.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    if let Err(err) = session.insert(Ping) {
                        assert!(matches!(
                            err.kind,
                            ErrorKind::RuleBaseDisposed
                                | ErrorKind::RuleBaseStopping
                                | ErrorKind::SessionDisposed(_)
                        ));
                        return;
                    }
                }
            })
        })
        .collect();

    let disposer = {
        let rb = Arc::clone(&rb);
        thread::spawn(move || rb.dispose())
    };
    disposer.join().unwrap().unwrap();
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(session.fact_count(), 0);
}
