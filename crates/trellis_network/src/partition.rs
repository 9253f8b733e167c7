//! Partitioning of the discrimination network.
//!
//! Every network node belongs to exactly one partition. Propagation locks
//! the partitions of the nodes it reaches, never the whole network, so
//! unrelated subgraphs evaluate concurrently. When several partitions are
//! involved they are always locked in ascending id order, and a thread
//! asking for a partition at or below one it already holds is refused
//! with [`ErrorKind::LockOrderViolation`](trellis_foundation::ErrorKind)
//! instead of risking a deadlock.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex, RwLock};
use tracing::debug;
use trellis_foundation::{Error, ErrorKind, Result, RuleBasePartitionId};

static NEXT_MANAGER: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Partitions held by the current thread, tagged with their manager.
    static HELD: RefCell<Vec<(u64, RuleBasePartitionId)>> = const { RefCell::new(Vec::new()) };
}

/// One lockable region of the network.
#[derive(Debug)]
pub struct Partition {
    id: RuleBasePartitionId,
    lock: Arc<Mutex<()>>,
    retired: AtomicBool,
}

impl Partition {
    fn new(id: RuleBasePartitionId) -> Self {
        Self {
            id,
            lock: Arc::new(Mutex::new(())),
            retired: AtomicBool::new(false),
        }
    }

    /// Returns the partition id.
    #[must_use]
    pub fn id(&self) -> RuleBasePartitionId {
        self.id
    }

    /// Returns true once the partition's subgraph was removed.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }
}

/// Allocates partition ids and hands out partition locks.
#[derive(Debug)]
pub struct PartitionManager {
    uid: u64,
    /// Indexed by partition id; ids are dense and allocated in order.
    partitions: RwLock<Vec<Arc<Partition>>>,
}

impl Default for PartitionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionManager {
    /// Creates a manager with the main partition already allocated.
    #[must_use]
    pub fn new() -> Self {
        Self {
            uid: NEXT_MANAGER.fetch_add(1, Ordering::Relaxed),
            partitions: RwLock::new(vec![Arc::new(Partition::new(
                RuleBasePartitionId::MAIN,
            ))]),
        }
    }

    /// Allocates the next partition id. Ids are never reused.
    pub fn create_new_partition_id(&self) -> RuleBasePartitionId {
        let mut partitions = self.partitions.write();
        #[allow(clippy::cast_possible_truncation)]
        let id = RuleBasePartitionId(partitions.len() as u32);
        partitions.push(Arc::new(Partition::new(id)));
        debug!(partition = %id, "allocated partition");
        id
    }

    /// Returns every allocated partition id in allocation order.
    #[must_use]
    pub fn partition_ids(&self) -> Vec<RuleBasePartitionId> {
        self.partitions.read().iter().map(|p| p.id).collect()
    }

    /// Returns the ids of partitions whose subgraph is still live.
    #[must_use]
    pub fn active_partition_ids(&self) -> Vec<RuleBasePartitionId> {
        self.partitions
            .read()
            .iter()
            .filter(|p| !p.is_retired())
            .map(|p| p.id)
            .collect()
    }

    /// Returns the number of allocated partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.partitions.read().len()
    }

    /// Always false: the main partition exists from the start.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Marks a partition as retired. The id stays allocated.
    ///
    /// # Errors
    /// Returns an error if the id was never allocated.
    pub fn retire(&self, id: RuleBasePartitionId) -> Result<()> {
        let partition = self.partition(id)?;
        partition.retired.store(true, Ordering::Release);
        debug!(partition = %id, "retired partition");
        Ok(())
    }

    /// Returns true if the calling thread holds any partition lock of this manager.
    #[must_use]
    pub fn holds_any_lock(&self) -> bool {
        HELD.with(|held| held.borrow().iter().any(|(m, _)| *m == self.uid))
    }

    /// Locks the given partitions in ascending id order.
    ///
    /// Duplicate ids are locked once. The returned guard releases every
    /// lock when dropped.
    ///
    /// # Errors
    /// Returns [`ErrorKind::LockOrderViolation`] if the calling thread
    /// already holds a partition whose id is not below every requested id,
    /// or [`ErrorKind::PartitionConflict`] for an id that was never allocated.
    pub fn lock(&self, ids: &[RuleBasePartitionId]) -> Result<PartitionGuard> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        if let Some(&lowest) = ids.first() {
            let highest_held = HELD.with(|held| {
                held.borrow()
                    .iter()
                    .filter(|(m, _)| *m == self.uid)
                    .map(|(_, p)| *p)
                    .max()
            });
            if let Some(held) = highest_held {
                if lowest <= held {
                    return Err(Error::lock_order_violation(held, lowest));
                }
            }
        }

        // Resolve first so the table lock is not held while blocking.
        let partitions = ids
            .iter()
            .map(|id| self.partition(*id))
            .collect::<Result<Vec<_>>>()?;

        let guards = partitions
            .iter()
            .map(|p| p.lock.lock_arc())
            .collect::<Vec<_>>();

        HELD.with(|held| {
            let mut held = held.borrow_mut();
            held.extend(ids.iter().map(|id| (self.uid, *id)));
        });

        Ok(PartitionGuard {
            manager: self.uid,
            ids,
            _guards: guards,
        })
    }

    fn partition(&self, id: RuleBasePartitionId) -> Result<Arc<Partition>> {
        self.partitions
            .read()
            .get(id.index() as usize)
            .cloned()
            .ok_or_else(|| {
                Error::new(ErrorKind::PartitionConflict(format!(
                    "partition {id} was never allocated"
                )))
            })
    }
}

/// Holds a set of partition locks; releases them on drop.
///
/// Not `Send`: locks are tracked per thread.
pub struct PartitionGuard {
    manager: u64,
    ids: Vec<RuleBasePartitionId>,
    _guards: Vec<ArcMutexGuard<RawMutex, ()>>,
}

impl PartitionGuard {
    /// Returns the locked partition ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> &[RuleBasePartitionId] {
        &self.ids
    }
}

impl std::fmt::Debug for PartitionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionGuard")
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

impl Drop for PartitionGuard {
    fn drop(&mut self) {
        HELD.with(|held| {
            held.borrow_mut()
                .retain(|(m, p)| !(*m == self.manager && self.ids.contains(p)));
        });
    }
}
