//! Integration tests for fact handle checkpoints

use tempfile::tempdir;
use trellis_engine::persistence::{load_from_file, save_to_file};
use trellis_engine::{
    CheckpointStore, FactHandleCheckpoint, FileCheckpointStore, MemoryCheckpointStore, RuleBase,
    RuleBaseConfiguration,
};
use trellis_foundation::{ErrorCategory, ErrorKind};

#[test]
fn recovered_factory_continues_after_counter() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    let mut factory = rb.recover_fact_handle_factory(7, 100).unwrap();
    assert_eq!(factory.id(), 7);
    assert_eq!(factory.next(), 101);
    assert_eq!(factory.next(), 102);
}

#[test]
fn recovery_reserves_the_factory_id() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    rb.recover_fact_handle_factory(7, 100).unwrap();
    for _ in 0..3 {
        assert!(rb.new_fact_handle_factory().unwrap().id() > 7);
    }
}

#[test]
fn inconsistent_checkpoint_is_rejected() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    for (id, counter) in [(-1, 0), (1, -5), (i64::from(u32::MAX) + 1, 0)] {
        let err = rb.recover_fact_handle_factory(id, counter).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidCheckpoint { .. }));
        assert_eq!(err.category(), ErrorCategory::Recovery);
    }
}

#[test]
fn session_survives_a_file_round_trip() {
    let dir = tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path().join("handles.ckpt"));
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    assert!(store.load().unwrap().is_none());

    let session = rb.new_session().unwrap();
    let mut last = session.insert(1u32).unwrap();
    for value in 2..5u32 {
        last = session.insert(value).unwrap();
    }
    session.checkpoint_to(&store).unwrap();
    session.dispose();

    let resumed = rb.new_session_from_store(&store).unwrap();
    let next = resumed.insert(5u32).unwrap();
    assert_eq!(next.factory, last.factory);
    assert_eq!(next.id, last.id + 1);
}

#[test]
fn empty_store_opens_a_fresh_session() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    let store = MemoryCheckpointStore::new();
    let session = rb.new_session_from_store(&store).unwrap();
    assert_eq!(session.checkpoint().unwrap().counter, 0);
}

#[test]
fn corrupted_store_is_a_recovery_error() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    let store = MemoryCheckpointStore::from_bytes(vec![0xc1, 0x00, 0x13]);
    let err = rb.new_session_from_store(&store).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Recovery);
}

#[test]
fn checkpoint_file_helpers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("factory.ckpt");
    let checkpoint = FactHandleCheckpoint { id: 3, counter: 42 };
    save_to_file(&checkpoint, &path).unwrap();
    assert_eq!(load_from_file(&path).unwrap(), checkpoint);
}
