//! The rule base coordinator.
//!
//! A [`RuleBase`] owns everything shared between working memories: the
//! package store, the type registry, the partition table and the live
//! network snapshot. Working memories propagate facts through it.
//!
//! # Locking
//!
//! Every lock is taken in one global order:
//!
//! 1. the rule base read lock (reentrant per thread),
//! 2. an entry point's ordering guard,
//! 3. a working memory's state,
//! 4. partition locks, in ascending id order.
//!
//! Structural changes (package add/replace/remove, entry point
//! reconciliation) are built off to the side and published under the write
//! side of the rule base lock, so a propagation never observes a half-built
//! network.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use im::OrdMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, trace, warn};
use trellis_foundation::{
    EntryPointId, Error, ErrorContext, ErrorKind, Fact, FactHandle, FactType, NodeId, Operation,
    Result, RuleBasePartitionId, SessionId, TypeDeclaration,
};
use trellis_network::{
    Activation, EntryPointNode, NetworkNode, NodeProvider, NodeSpec, ObjectSink, PartitionManager,
    PropagationContext, PropagationKind, Rete, RuleName, TerminalNodeProvider,
};

use crate::config::RuleBaseConfiguration;
use crate::factory::FactHandleFactory;
use crate::package::{Package, PackageSnapshot, PackageStore, Rule};
use crate::persistence::{CheckpointStore, FactHandleCheckpoint};
use crate::session::{FactEntry, SessionInner, WorkingMemory};
use crate::type_registry::{TypeRegistry, TypeTable};

static NEXT_RULE_BASE: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Rule bases whose read lock the current thread holds, once per guard.
    static READ_HELD: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Lifecycle of a rule base.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum RuleBaseState {
    /// Built, nothing deployed or opened yet.
    Created = 0,
    /// Accepting packages and sessions.
    Active = 1,
    /// Disposal in progress; in-flight propagations are finishing.
    Stopping = 2,
    /// No further operations are accepted.
    Disposed = 3,
}

impl RuleBaseState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Active,
            2 => Self::Stopping,
            _ => Self::Disposed,
        }
    }
}

impl fmt::Display for RuleBaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Stopping => "stopping",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Shared read access to the rule base structure.
///
/// While any guard is alive no structural change can be published. The
/// lock is reentrant: a thread may hold several guards at once.
#[must_use = "the read lock is released as soon as the guard is dropped"]
pub struct RuleBaseReadGuard<'a> {
    _guard: RwLockReadGuard<'a, ()>,
    uid: u64,
}

impl Drop for RuleBaseReadGuard<'_> {
    fn drop(&mut self) {
        READ_HELD.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(position) = held.iter().rposition(|&uid| uid == self.uid) {
                held.remove(position);
            }
        });
    }
}

impl fmt::Debug for RuleBaseReadGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleBaseReadGuard")
            .field("rule_base", &self.uid)
            .finish()
    }
}

// =============================================================================
// Queued Actions
// =============================================================================

type RuleBaseAction = Box<dyn FnOnce(&RuleBase) -> Result<()> + Send>;

enum QueuedAction {
    /// Bring live sessions up to date with a published network change.
    Network(NetworkUpdate),
    Custom(RuleBaseAction),
}

struct NetworkUpdate {
    added: Vec<NodeId>,
    removed: Vec<NodeId>,
}

/// Outcome of draining a queue of deferred actions.
#[derive(Debug, Default)]
pub struct QueuedActionReport {
    /// Actions that completed.
    pub executed: usize,
    /// Errors of actions that failed. Other actions still ran.
    pub failures: Vec<Error>,
    /// Sessions whose entry point view was reconciled.
    pub reconciled_sessions: usize,
}

impl QueuedActionReport {
    /// Returns true if no action failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the number of actions that ran, failed or not.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.executed + self.failures.len()
    }

    pub(crate) fn record(&mut self, result: Result<()>) {
        match result {
            Ok(()) => self.executed += 1,
            Err(err) => {
                warn!(error = %err, "queued action failed");
                self.failures
                    .push(err.with_context(ErrorContext::new(Operation::QueuedAction)));
            }
        }
    }
}

// =============================================================================
// Structural Changes
// =============================================================================

/// A network edit being prepared off to the side.
struct NetworkChange {
    rete: Rete,
    added: Vec<NodeId>,
    removed: Vec<NodeId>,
    emptied: Vec<RuleBasePartitionId>,
    /// Partitions allocated for this change; retired if it is abandoned.
    allocated: Vec<RuleBasePartitionId>,
    added_entry_points: Vec<Arc<EntryPointNode>>,
}

impl NetworkChange {
    fn new(current: &Rete) -> Self {
        Self {
            rete: current.clone(),
            added: Vec::new(),
            removed: Vec::new(),
            emptied: Vec::new(),
            allocated: Vec::new(),
            added_entry_points: Vec::new(),
        }
    }

    fn detach_package(&mut self, package: &Package) {
        for rule in package.rules() {
            let Some(id) = self.rete.node_for_rule(&package.qualified(rule)) else {
                continue;
            };
            if let Some((_, emptied)) = self.rete.remove_node(id) {
                self.removed.push(id);
                self.emptied.extend(emptied);
            }
        }
    }

    fn drop_unused_entry_points(&mut self) -> Vec<Arc<EntryPointNode>> {
        self.rete
            .unused_entry_points()
            .iter()
            .filter_map(|id| self.rete.remove_entry_point(id))
            .collect()
    }
}

// =============================================================================
// Rule Base
// =============================================================================

/// Coordinator shared by every working memory built from the same packages.
pub struct RuleBase {
    uid: u64,
    config: RuleBaseConfiguration,
    state: AtomicU8,
    structure: RwLock<()>,
    builder: Mutex<()>,
    rete: ArcSwap<Rete>,
    packages: PackageStore,
    types: TypeRegistry,
    partitions: PartitionManager,
    provider: Arc<dyn NodeProvider>,
    entry_nodes: Mutex<HashMap<EntryPointId, Arc<EntryPointNode>>>,
    added_entry_nodes: Mutex<BTreeMap<EntryPointId, Arc<EntryPointNode>>>,
    removed_entry_nodes: Mutex<BTreeMap<EntryPointId, Arc<EntryPointNode>>>,
    queue: Mutex<VecDeque<QueuedAction>>,
    sessions: Mutex<BTreeMap<SessionId, Weak<SessionInner>>>,
    session_counter: AtomicU32,
    factory_counter: AtomicU32,
    node_counter: AtomicU32,
}

impl RuleBase {
    /// Creates a rule base using the default terminal node provider.
    #[must_use]
    pub fn new(config: RuleBaseConfiguration) -> Arc<Self> {
        Self::with_node_provider(config, Arc::new(TerminalNodeProvider))
    }

    /// Creates a rule base that builds its nodes with `provider`.
    #[must_use]
    pub fn with_node_provider(
        config: RuleBaseConfiguration,
        provider: Arc<dyn NodeProvider>,
    ) -> Arc<Self> {
        let default_entry_point = Arc::new(EntryPointNode::new(EntryPointId::default()));
        let mut rete = Rete::new();
        rete.add_entry_point(Arc::clone(&default_entry_point));

        let mut entry_nodes = HashMap::new();
        entry_nodes.insert(EntryPointId::default(), default_entry_point);

        debug!(id = %config.id, multithreaded = config.multithreaded_evaluation, "rule base created");
        Arc::new(Self {
            uid: NEXT_RULE_BASE.fetch_add(1, Ordering::Relaxed),
            config,
            state: AtomicU8::new(RuleBaseState::Created as u8),
            structure: RwLock::new(()),
            builder: Mutex::new(()),
            rete: ArcSwap::from_pointee(rete),
            packages: PackageStore::new(),
            types: TypeRegistry::new(),
            partitions: PartitionManager::new(),
            provider,
            entry_nodes: Mutex::new(entry_nodes),
            added_entry_nodes: Mutex::new(BTreeMap::new()),
            removed_entry_nodes: Mutex::new(BTreeMap::new()),
            queue: Mutex::new(VecDeque::new()),
            sessions: Mutex::new(BTreeMap::new()),
            session_counter: AtomicU32::new(0),
            factory_counter: AtomicU32::new(1),
            node_counter: AtomicU32::new(1),
        })
    }

    /// Returns the rule base id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Returns the configuration.
    #[must_use]
    pub fn configuration(&self) -> &RuleBaseConfiguration {
        &self.config
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> RuleBaseState {
        RuleBaseState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Fails unless the rule base accepts operations, activating it on first
    /// use.
    pub(crate) fn ensure_running(&self) -> Result<()> {
        loop {
            match self.state() {
                RuleBaseState::Active => return Ok(()),
                RuleBaseState::Stopping => return Err(Error::new(ErrorKind::RuleBaseStopping)),
                RuleBaseState::Disposed => return Err(Error::rule_base_disposed()),
                RuleBaseState::Created => {
                    if self
                        .state
                        .compare_exchange(
                            RuleBaseState::Created as u8,
                            RuleBaseState::Active as u8,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        info!(id = %self.config.id, "rule base activated");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Fails once the rule base is stopping or disposed, without activating
    /// it.
    fn ensure_not_disposed(&self) -> Result<()> {
        match self.state() {
            RuleBaseState::Created | RuleBaseState::Active => Ok(()),
            RuleBaseState::Stopping => Err(Error::new(ErrorKind::RuleBaseStopping)),
            RuleBaseState::Disposed => Err(Error::rule_base_disposed()),
        }
    }

    // -------------------------------------------------------------------------
    // Locking
    // -------------------------------------------------------------------------

    /// Acquires the read lock. Released when the guard drops.
    pub fn read_lock(&self) -> RuleBaseReadGuard<'_> {
        let guard = if self.holds_read_lock() {
            self.structure.read_recursive()
        } else {
            self.structure.read()
        };
        READ_HELD.with(|held| held.borrow_mut().push(self.uid));
        RuleBaseReadGuard {
            _guard: guard,
            uid: self.uid,
        }
    }

    /// Returns true if the calling thread holds this rule base's read lock.
    #[must_use]
    pub fn holds_read_lock(&self) -> bool {
        READ_HELD.with(|held| held.borrow().contains(&self.uid))
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.partitions.holds_any_lock() {
            return Err(Error::new(ErrorKind::LockHeld("a partition lock".to_string())));
        }
        if self.holds_read_lock() {
            return Err(Error::new(ErrorKind::LockHeld(
                "the rule base read lock".to_string(),
            )));
        }
        Ok(())
    }

    fn write_lock(&self) -> Result<RwLockWriteGuard<'_, ()>> {
        self.ensure_unlocked()?;
        Ok(self.structure.write())
    }

    // -------------------------------------------------------------------------
    // Partitions
    // -------------------------------------------------------------------------

    /// Allocates a new partition id.
    ///
    /// # Errors
    /// Fails with a lifecycle error once the rule base is stopping.
    pub fn create_new_partition_id(&self) -> Result<RuleBasePartitionId> {
        self.ensure_not_disposed()?;
        Ok(self.partitions.create_new_partition_id())
    }

    /// Returns every allocated partition id, in allocation order.
    #[must_use]
    pub fn partition_ids(&self) -> Vec<RuleBasePartitionId> {
        self.partitions.partition_ids()
    }

    /// Returns the partition manager.
    #[must_use]
    pub fn partitions(&self) -> &PartitionManager {
        &self.partitions
    }

    fn assign_partition(&self) -> RuleBasePartitionId {
        if self.config.multithreaded_evaluation {
            self.partitions.create_new_partition_id()
        } else {
            RuleBasePartitionId::MAIN
        }
    }

    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------

    /// Creates a fresh fact handle factory with a new id.
    ///
    /// # Errors
    /// Fails with a lifecycle error once the rule base is stopping.
    pub fn new_fact_handle_factory(&self) -> Result<FactHandleFactory> {
        self.ensure_not_disposed()?;
        Ok(FactHandleFactory::new(
            self.factory_counter.fetch_add(1, Ordering::Relaxed),
        ))
    }

    /// Recreates a fact handle factory from a persisted `(id, counter)`.
    ///
    /// # Errors
    /// Returns [`ErrorKind::InvalidCheckpoint`] for negative values, or a
    /// lifecycle error once the rule base is stopping.
    pub fn recover_fact_handle_factory(&self, id: i64, counter: i64) -> Result<FactHandleFactory> {
        self.ensure_not_disposed()?;
        let factory = FactHandleFactory::recover(id, counter)
            .map_err(|err| err.with_context(ErrorContext::new(Operation::Recovery)))?;
        self.factory_counter
            .fetch_max(factory.id().saturating_add(1), Ordering::Relaxed);
        Ok(factory)
    }

    /// Issues the next working memory counter value.
    ///
    /// # Errors
    /// Fails with a lifecycle error once the rule base is stopping.
    pub fn next_working_memory_counter(&self) -> Result<u32> {
        self.ensure_not_disposed()?;
        Ok(self.session_counter.fetch_add(1, Ordering::Relaxed))
    }

    // -------------------------------------------------------------------------
    // Network, Types, Packages
    // -------------------------------------------------------------------------

    /// Returns the current network snapshot.
    #[must_use]
    pub fn rete(&self) -> Arc<Rete> {
        self.rete.load_full()
    }

    /// Returns the number of nodes in the network.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.rete.load().node_count()
    }

    /// Returns the entry point node registered under `id`, whether or not it
    /// is currently part of the network.
    #[must_use]
    pub fn entry_point(&self, id: &EntryPointId) -> Option<Arc<EntryPointNode>> {
        self.entry_nodes.lock().get(id).cloned()
    }

    /// Returns the entry point node for `id`, creating it on first use. The
    /// same node is returned for the same id for the rule base's lifetime.
    pub(crate) fn entry_point_node(&self, id: &EntryPointId) -> Arc<EntryPointNode> {
        Arc::clone(
            self.entry_nodes
                .lock()
                .entry(id.clone())
                .or_insert_with(|| Arc::new(EntryPointNode::new(id.clone()))),
        )
    }

    /// Returns the declaration of a type.
    #[must_use]
    pub fn type_declaration(&self, fact_type: &FactType) -> Option<Arc<TypeDeclaration>> {
        self.types.declaration(fact_type)
    }

    /// Returns every type declaration.
    #[must_use]
    pub fn type_declarations(&self) -> Vec<Arc<TypeDeclaration>> {
        self.types.declarations()
    }

    /// Returns true if the type is declared as an event.
    #[must_use]
    pub fn is_event(&self, fact_type: &FactType) -> bool {
        self.types.is_event(fact_type)
    }

    /// Returns true if `T` is declared as an event.
    #[must_use]
    pub fn is_event_type<T: std::any::Any>(&self) -> bool {
        self.is_event(&FactType::of::<T>())
    }

    /// Returns a deployed package.
    #[must_use]
    pub fn package(&self, name: &str) -> Option<Arc<Package>> {
        self.packages.load().package(name)
    }

    /// Returns a snapshot of every deployed package. Later changes are not
    /// reflected in it.
    #[must_use]
    pub fn packages(&self) -> Arc<PackageSnapshot> {
        self.packages.load()
    }

    /// Returns the merged global namespace.
    #[must_use]
    pub fn globals(&self) -> OrdMap<String, FactType> {
        self.packages.load().globals().clone()
    }

    /// Looks up a rule by qualified name.
    #[must_use]
    pub fn rule(&self, name: &RuleName) -> Option<Arc<Rule>> {
        self.packages.load().rule(name)
    }

    /// Adds a package, atomically replacing any package with the same name.
    ///
    /// Rules of a replaced version are detached, new rules attached, and
    /// the change is published in one step. Live sessions are brought up to
    /// date by the queued actions, which run before this returns.
    ///
    /// # Errors
    /// Fails with a structural error for conflicting type declarations or
    /// globals, undeclared types in strict mode, or a node the provider
    /// cannot build; nothing is published in that case. Fails with
    /// [`ErrorKind::LockHeld`] if the caller holds the read lock or a
    /// partition lock.
    pub fn add_package(&self, package: Package) -> Result<()> {
        let name = package.name().to_string();
        self.stage_package(package).map_err(|err| {
            err.with_context(ErrorContext::new(Operation::PackageUpdate).with_package(name))
        })?;
        self.execute_queued_actions().map(|_| ())
    }

    /// Removes a package and detaches its rules.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::UnknownPackage`] if no package has that name,
    /// or [`ErrorKind::LockHeld`] if the caller holds a lock.
    pub fn remove_package(&self, name: &str) -> Result<()> {
        self.unstage_package(name).map_err(|err| {
            err.with_context(ErrorContext::new(Operation::PackageUpdate).with_package(name))
        })?;
        self.execute_queued_actions().map(|_| ())
    }

    fn stage_package(&self, package: Package) -> Result<()> {
        self.ensure_running()?;
        self.ensure_unlocked()?;
        let _builder = self.builder.lock();

        let package = Arc::new(package);
        let packages = self.packages.stage_add(Arc::clone(&package))?;
        let types = self.types.stage(package.type_declarations())?;
        if self.config.strict_type_declarations {
            for ty in package.rules().iter().filter_map(|rule| rule.fact_type()) {
                if !types.contains_key(&ty) {
                    return Err(Error::undeclared_type(ty.name()));
                }
            }
        }

        let previous = self.packages.load().package(package.name());
        let mut change = NetworkChange::new(&self.rete.load_full());
        if let Some(previous) = &previous {
            change.detach_package(previous);
        }
        if let Err(err) = self.attach_package(&mut change, &package) {
            self.retire_partitions(&change.allocated);
            return Err(err);
        }
        let (added, removed) = (change.added.len(), change.removed.len());
        let allocated = change.allocated.clone();
        if let Err(err) = self.publish(change, packages, Some(types)) {
            self.retire_partitions(&allocated);
            return Err(err);
        }

        info!(
            package = package.name(),
            version = package.version(),
            rules = package.rule_count(),
            replaced = previous.is_some(),
            added,
            removed,
            "package deployed"
        );
        Ok(())
    }

    fn unstage_package(&self, name: &str) -> Result<()> {
        self.ensure_running()?;
        self.ensure_unlocked()?;
        let _builder = self.builder.lock();

        let packages = self.packages.stage_remove(name)?;
        let previous = self
            .packages
            .load()
            .package(name)
            .ok_or_else(|| Error::new(ErrorKind::UnknownPackage(name.to_string())))?;
        let mut change = NetworkChange::new(&self.rete.load_full());
        change.detach_package(&previous);
        self.publish(change, packages, None)?;

        info!(package = name, rules = previous.rule_count(), "package removed");
        Ok(())
    }

    fn attach_package(&self, change: &mut NetworkChange, package: &Package) -> Result<()> {
        for rule in package.rules() {
            let entry_point = rule.entry_point().clone();
            if change.rete.entry_point(&entry_point).is_none() {
                let node = self.entry_point_node(&entry_point);
                change.rete.add_entry_point(Arc::clone(&node));
                change.added_entry_points.push(node);
            }

            let fact_type = rule.fact_type();
            let partition = match change.rete.route_partition(&entry_point, fact_type.as_ref()) {
                Some(partition) => partition,
                None => {
                    let partition = self.assign_partition();
                    if partition != RuleBasePartitionId::MAIN {
                        change.allocated.push(partition);
                    }
                    partition
                }
            };
            let id = NodeId(self.node_counter.fetch_add(1, Ordering::Relaxed));
            let sink = self.provider.build(NodeSpec {
                id,
                rule: package.qualified(rule),
                salience: rule.salience(),
                entry_point: entry_point.clone(),
                fact_type,
                condition: Arc::clone(rule.condition()),
                partition,
            })?;
            change.rete.add_node(NetworkNode {
                sink,
                entry_point,
                fact_type,
            })?;
            change.added.push(id);
        }
        Ok(())
    }

    fn retire_partitions(&self, partitions: &[RuleBasePartitionId]) {
        for &partition in partitions {
            if let Err(err) = self.partitions.retire(partition) {
                warn!(%partition, error = %err, "failed to retire partition");
            }
        }
        if !partitions.is_empty() {
            debug!(retired = partitions.len(), "abandoned change released its partitions");
        }
    }

    fn publish(
        &self,
        mut change: NetworkChange,
        packages: PackageSnapshot,
        types: Option<TypeTable>,
    ) -> Result<()> {
        let removed_entry_points = change.drop_unused_entry_points();
        let in_use: HashSet<RuleBasePartitionId> =
            change.rete.nodes().map(|node| node.sink.partition()).collect();
        let NetworkChange {
            rete,
            added,
            removed,
            emptied,
            added_entry_points,
            ..
        } = change;

        {
            let _write = self.write_lock()?;
            self.packages.publish(packages);
            if let Some(types) = types {
                self.types.publish(types);
            }
            self.rete.store(Arc::new(rete));
        }

        for partition in emptied {
            if partition != RuleBasePartitionId::MAIN && !in_use.contains(&partition) {
                if let Err(err) = self.partitions.retire(partition) {
                    warn!(%partition, error = %err, "failed to retire partition");
                }
            }
        }
        for node in added_entry_points {
            self.stage_added_entry_node(node);
        }
        for node in removed_entry_points {
            self.stage_removed_entry_node(node.id());
        }
        if !added.is_empty() || !removed.is_empty() {
            self.queue
                .lock()
                .push_back(QueuedAction::Network(NetworkUpdate { added, removed }));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Entry Node Caches
    // -------------------------------------------------------------------------

    /// Stages an entry point that sessions should add to their view at the
    /// next reconciliation.
    ///
    /// Entry point identity is fixed for the rule base's lifetime: if a node
    /// is already registered under the same id, that node is staged and
    /// returned instead of `node`.
    ///
    /// # Errors
    /// Fails with a lifecycle error once the rule base is stopping.
    pub fn register_added_entry_node_cache(
        &self,
        node: Arc<EntryPointNode>,
    ) -> Result<Arc<EntryPointNode>> {
        self.ensure_not_disposed()?;
        Ok(self.stage_added_entry_node(node))
    }

    fn stage_added_entry_node(&self, node: Arc<EntryPointNode>) -> Arc<EntryPointNode> {
        let id = node.id().clone();
        let canonical = Arc::clone(
            self.entry_nodes
                .lock()
                .entry(id.clone())
                .or_insert(node),
        );
        self.removed_entry_nodes.lock().remove(&id);
        self.added_entry_nodes
            .lock()
            .insert(id, Arc::clone(&canonical));
        canonical
    }

    /// Returns the staged entry point additions.
    #[must_use]
    pub fn added_entry_node_cache(&self) -> Vec<Arc<EntryPointNode>> {
        self.added_entry_nodes.lock().values().cloned().collect()
    }

    /// Stages an entry point that sessions should drop from their view at
    /// the next reconciliation. The node stays registered under its id.
    ///
    /// # Errors
    /// Fails with a lifecycle error once the rule base is stopping.
    pub fn register_removed_entry_node_cache(&self, node: &EntryPointNode) -> Result<()> {
        self.ensure_not_disposed()?;
        self.stage_removed_entry_node(node.id());
        Ok(())
    }

    fn stage_removed_entry_node(&self, id: &EntryPointId) {
        let canonical = self.entry_point_node(id);
        self.added_entry_nodes.lock().remove(id);
        self.removed_entry_nodes.lock().insert(id.clone(), canonical);
    }

    /// Returns the staged entry point removals.
    #[must_use]
    pub fn removed_entry_node_cache(&self) -> Vec<Arc<EntryPointNode>> {
        self.removed_entry_nodes.lock().values().cloned().collect()
    }

    fn reconcile_entry_points(&self) -> Result<usize> {
        if self.added_entry_nodes.lock().is_empty() && self.removed_entry_nodes.lock().is_empty() {
            return Ok(0);
        }

        let _write = self.write_lock()?;
        let added = std::mem::take(&mut *self.added_entry_nodes.lock());
        let removed = std::mem::take(&mut *self.removed_entry_nodes.lock());
        let sessions = self.working_memories();
        for session in &sessions {
            session.apply_entry_point_changes(added.values(), removed.keys());
        }
        info!(
            added = added.len(),
            removed = removed.len(),
            sessions = sessions.len(),
            "entry points reconciled"
        );
        Ok(sessions.len())
    }

    // -------------------------------------------------------------------------
    // Queued Actions
    // -------------------------------------------------------------------------

    /// Queues an action to run at the next drain.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::QueueFull`] when the configured limit is
    /// reached, or a lifecycle error once the rule base is stopping.
    pub fn queue_action<F>(&self, action: F) -> Result<()>
    where
        F: FnOnce(&RuleBase) -> Result<()> + Send + 'static,
    {
        self.ensure_running()?;
        let mut queue = self.queue.lock();
        if queue.len() >= self.config.max_queued_actions {
            return Err(Error::new(ErrorKind::QueueFull(self.config.max_queued_actions)));
        }
        queue.push_back(QueuedAction::Custom(Box::new(action)));
        Ok(())
    }

    /// Returns the number of pending queued actions.
    #[must_use]
    pub fn queued_action_count(&self) -> usize {
        self.queue.lock().len()
    }

    /// Drains the queue in FIFO order, then reconciles staged entry point
    /// changes into every live session.
    ///
    /// Every action runs even when an earlier one fails; failures are
    /// collected in the report.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::LockHeld`] if the calling thread holds a
    /// partition lock or the read lock, or with
    /// [`ErrorKind::RuleBaseDisposed`] after disposal.
    pub fn execute_queued_actions(&self) -> Result<QueuedActionReport> {
        if self.state() == RuleBaseState::Disposed {
            return Err(Error::rule_base_disposed());
        }
        self.ensure_unlocked()?;

        let actions: Vec<QueuedAction> = self.queue.lock().drain(..).collect();
        let mut report = QueuedActionReport::default();
        for action in actions {
            let result = match action {
                QueuedAction::Network(update) => self.apply_network_update(&update),
                QueuedAction::Custom(action) => action(self),
            };
            report.record(result);
        }
        report.reconciled_sessions = self.reconcile_entry_points()?;

        if report.attempted() > 0 {
            debug!(
                executed = report.executed,
                failed = report.failures.len(),
                "queued actions executed"
            );
        }
        Ok(report)
    }

    fn apply_network_update(&self, update: &NetworkUpdate) -> Result<()> {
        let removed: HashSet<NodeId> = update.removed.iter().copied().collect();
        let mut first_error = None;
        for session in self.working_memories() {
            if !removed.is_empty() {
                session.drop_node_memories(&removed);
            }
            if !update.added.is_empty() {
                if let Err(err) = self.propagate_to_new_nodes(&session, &update.added) {
                    warn!(session = %session.id(), error = %err, "failed to propagate facts to new nodes");
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Propagates the facts a session already holds into newly added nodes.
    fn propagate_to_new_nodes(&self, session: &WorkingMemory, added: &[NodeId]) -> Result<()> {
        let _read = self.read_lock();
        if session.is_disposed() {
            return Ok(());
        }
        let rete = self.rete.load_full();
        let targets: Vec<&NetworkNode> = added.iter().filter_map(|id| rete.node(*id)).collect();
        if targets.is_empty() {
            return Ok(());
        }

        let mut by_entry_point: BTreeMap<EntryPointId, Vec<FactHandle>> = BTreeMap::new();
        for (handle, entry_point) in session.lock_state().handles_by_entry_point() {
            by_entry_point.entry(entry_point).or_default().push(handle);
        }

        let mut first_error = None;
        for (entry_point, handles) in by_entry_point {
            let nodes: Vec<&NetworkNode> = targets
                .iter()
                .copied()
                .filter(|node| node.entry_point == entry_point)
                .collect();
            if nodes.is_empty() {
                continue;
            }

            let entry_node = self.entry_point_node(&entry_point);
            let mut order = entry_node.order();
            let mut state = session.lock_state();
            for handle in handles {
                let Some(fact) = state.fact(handle).cloned() else {
                    continue;
                };
                let fact_type = fact.fact_type();
                let sinks: Vec<Arc<dyn ObjectSink>> = nodes
                    .iter()
                    .filter(|node| node.fact_type.is_none_or(|ty| ty == fact_type))
                    .filter(|node| !state.memories.contains(node.sink.id(), handle))
                    .map(|node| Arc::clone(&node.sink))
                    .collect();
                if sinks.is_empty() {
                    continue;
                }

                let context = order.next_context(PropagationKind::Assertion, handle);
                entry_node.accept(&context)?;
                match self.propagate_assert(&sinks, handle, &fact, &context) {
                    Ok(activations) => state.record_matches(handle, activations),
                    Err(err) => {
                        first_error.get_or_insert(err);
                    }
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    /// Opens a working memory with a fresh fact handle factory.
    ///
    /// # Errors
    /// Fails with a lifecycle error once the rule base is stopping.
    pub fn new_session(self: &Arc<Self>) -> Result<WorkingMemory> {
        let factory = self.new_fact_handle_factory()?;
        self.open_session(factory)
    }

    /// Opens a working memory whose handles continue from a checkpoint.
    ///
    /// # Errors
    /// Fails with a recovery error for an inconsistent checkpoint.
    pub fn new_session_from(self: &Arc<Self>, checkpoint: &FactHandleCheckpoint) -> Result<WorkingMemory> {
        let factory = self.recover_fact_handle_factory(checkpoint.id, checkpoint.counter)?;
        self.open_session(factory)
    }

    /// Opens a working memory from a stored checkpoint, or a fresh one if
    /// the store is empty.
    ///
    /// # Errors
    /// Fails with a recovery error if the store cannot be read or holds an
    /// inconsistent checkpoint.
    pub fn new_session_from_store(self: &Arc<Self>, store: &dyn CheckpointStore) -> Result<WorkingMemory> {
        let stored = store
            .load()
            .map_err(|err| err.with_context(ErrorContext::new(Operation::Recovery)))?;
        match stored {
            Some(checkpoint) => self.new_session_from(&checkpoint),
            None => self.new_session(),
        }
    }

    fn open_session(self: &Arc<Self>, factory: FactHandleFactory) -> Result<WorkingMemory> {
        self.ensure_running()?;
        let _read = self.read_lock();
        let id = SessionId(self.next_working_memory_counter()?);
        let entry_points = self
            .rete
            .load()
            .entry_points()
            .map(|node| (node.id().clone(), Arc::clone(node)))
            .collect();
        let factory_id = factory.id();
        let session = WorkingMemory::new(id, Arc::clone(self), factory, entry_points);
        self.sessions.lock().insert(id, session.downgrade());
        info!(rule_base = %self.config.id, session = %id, factory = factory_id, "session opened");
        Ok(session)
    }

    /// Returns every live working memory.
    #[must_use]
    pub fn working_memories(&self) -> Vec<WorkingMemory> {
        let mut sessions = self.sessions.lock();
        sessions.retain(|_, weak| weak.strong_count() > 0);
        sessions
            .values()
            .filter_map(WorkingMemory::upgrade)
            .collect()
    }

    /// Disposes a working memory. Safe to call more than once, and after
    /// the rule base itself was disposed.
    pub fn dispose_stateful_session(&self, session: &WorkingMemory) {
        if !std::ptr::eq(Arc::as_ptr(session.rule_base()), self) {
            return;
        }
        self.sessions.lock().remove(&session.id());
        if session.release() {
            info!(rule_base = %self.config.id, session = %session.id(), "session disposed");
        }
    }

    /// Disposes the rule base and every live session.
    ///
    /// Waits for in-flight propagations to finish. Idempotent.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::LockHeld`] if the caller holds the read lock
    /// or a partition lock.
    pub fn dispose(&self) -> Result<()> {
        if self.state() == RuleBaseState::Disposed {
            return Ok(());
        }
        self.ensure_unlocked()?;
        let previous = self.state.swap(RuleBaseState::Stopping as u8, Ordering::AcqRel);
        match RuleBaseState::from_u8(previous) {
            RuleBaseState::Disposed => {
                self.state
                    .store(RuleBaseState::Disposed as u8, Ordering::Release);
                return Ok(());
            }
            RuleBaseState::Stopping => return Ok(()),
            RuleBaseState::Created | RuleBaseState::Active => {}
        }
        info!(id = %self.config.id, "rule base stopping");

        drop(self.write_lock()?);
        let sessions: Vec<WorkingMemory> = std::mem::take(&mut *self.sessions.lock())
            .values()
            .filter_map(WorkingMemory::upgrade)
            .collect();
        for session in &sessions {
            session.release();
        }
        self.queue.lock().clear();
        self.added_entry_nodes.lock().clear();
        self.removed_entry_nodes.lock().clear();

        self.state
            .store(RuleBaseState::Disposed as u8, Ordering::Release);
        info!(id = %self.config.id, sessions = sessions.len(), "rule base disposed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Propagation
    // -------------------------------------------------------------------------

    /// Asserts a fact into the network on behalf of a working memory.
    ///
    /// The caller holds the ordering guard of the context's entry point.
    /// On failure nothing is committed and nodes that already accepted the
    /// fact see a compensating retraction.
    ///
    /// # Errors
    /// Identity errors for foreign, live or retracted handles; structural
    /// errors for undeclared types (strict mode) or entry points unknown to
    /// the session; [`ErrorKind::OutOfOrderPropagation`] for a stale
    /// context; node failures after rollback.
    pub fn assert_object(
        &self,
        handle: FactHandle,
        fact: Fact,
        context: &PropagationContext,
        session: &WorkingMemory,
    ) -> Result<()> {
        self.assert_inner(handle, fact, context, session)
            .map_err(|err| err.with_context(propagation_context(Operation::Assert, handle, context)))
    }

    fn assert_inner(
        &self,
        handle: FactHandle,
        fact: Fact,
        context: &PropagationContext,
        session: &WorkingMemory,
    ) -> Result<()> {
        let _read = self.read_lock();
        self.ensure_running()?;
        session.ensure_open()?;
        check_context(context, PropagationKind::Assertion, handle)?;
        self.check_declared(&fact)?;
        let entry_point = session.require_entry_point(context.entry_point())?;

        let mut state = session.lock_state();
        state.check_assertable(handle)?;
        entry_point.accept(context)?;

        let sinks = self
            .rete
            .load()
            .sinks_for(context.entry_point(), &fact.fact_type());
        let activations = self.propagate_assert(&sinks, handle, &fact, context)?;
        trace!(%handle, entry_point = %context.entry_point(), matched = activations.len(), "asserted");
        let entry = FactEntry {
            fact,
            entry_point: context.entry_point().clone(),
            inserted_at: session.clock().now(),
        };
        state.commit_assert(handle, entry, activations);
        Ok(())
    }

    /// Retracts a fact from the network on behalf of a working memory.
    ///
    /// Every partial match and pending activation of the handle is dropped.
    ///
    /// # Errors
    /// [`ErrorKind::UnknownHandle`] for handles never asserted,
    /// [`ErrorKind::RetractedHandle`] for handles already retracted, or a
    /// node failure after rollback.
    pub fn retract_object(
        &self,
        handle: FactHandle,
        context: &PropagationContext,
        session: &WorkingMemory,
    ) -> Result<()> {
        self.retract_inner(handle, context, session)
            .map_err(|err| err.with_context(propagation_context(Operation::Retract, handle, context)))
    }

    fn retract_inner(
        &self,
        handle: FactHandle,
        context: &PropagationContext,
        session: &WorkingMemory,
    ) -> Result<()> {
        let _read = self.read_lock();
        self.ensure_running()?;
        session.ensure_open()?;
        check_context(context, PropagationKind::Retraction, handle)?;

        let mut state = session.lock_state();
        let fact = state.live_on(handle, context.entry_point())?.fact.clone();
        self.entry_point_node(context.entry_point()).accept(context)?;

        let sinks = self.matched_sinks(&state.memories.nodes_of(handle));
        self.propagate_retract(&sinks, handle, &fact, context)?;
        trace!(%handle, entry_point = %context.entry_point(), "retracted");
        state.commit_retract(handle);
        Ok(())
    }

    /// Replaces the fact behind a live handle, keeping the handle.
    ///
    /// # Errors
    /// Same as [`RuleBase::retract_object`] and [`RuleBase::assert_object`].
    pub fn modify_object(
        &self,
        handle: FactHandle,
        fact: Fact,
        context: &PropagationContext,
        session: &WorkingMemory,
    ) -> Result<()> {
        self.modify_inner(handle, fact, context, session)
            .map_err(|err| err.with_context(propagation_context(Operation::Modify, handle, context)))
    }

    fn modify_inner(
        &self,
        handle: FactHandle,
        fact: Fact,
        context: &PropagationContext,
        session: &WorkingMemory,
    ) -> Result<()> {
        let _read = self.read_lock();
        self.ensure_running()?;
        session.ensure_open()?;
        check_context(context, PropagationKind::Modification, handle)?;
        self.check_declared(&fact)?;

        let mut state = session.lock_state();
        let previous = state.live_on(handle, context.entry_point())?.fact.clone();
        self.entry_point_node(context.entry_point()).accept(context)?;

        let old_sinks = self.matched_sinks(&state.memories.nodes_of(handle));
        let new_sinks = self
            .rete
            .load()
            .sinks_for(context.entry_point(), &fact.fact_type());
        let mut all = old_sinks.clone();
        all.extend(new_sinks.iter().cloned());
        let _partitions = self.partitions.lock(&Rete::partitions_of(&all))?;

        retract_from(&old_sinks, handle, &previous, context)?;
        let activations = match assert_into(&new_sinks, handle, &fact, context) {
            Ok(activations) => activations,
            Err(err) => {
                for sink in &old_sinks {
                    if let Err(compensation) = sink.assert_object(handle, &previous, context) {
                        warn!(node = %sink.id(), %handle, error = %compensation, "failed to restore fact after modification failure");
                    }
                }
                return Err(err);
            }
        };
        trace!(%handle, matched = activations.len(), "modified");
        state.commit_modify(handle, fact, activations);
        Ok(())
    }

    fn check_declared(&self, fact: &Fact) -> Result<()> {
        let fact_type = fact.fact_type();
        if self.config.strict_type_declarations && !self.types.contains(&fact_type) {
            return Err(Error::undeclared_type(fact_type.name()));
        }
        Ok(())
    }

    fn matched_sinks(&self, nodes: &BTreeSet<NodeId>) -> Vec<Arc<dyn ObjectSink>> {
        let rete = self.rete.load();
        nodes
            .iter()
            .filter_map(|id| rete.node(*id))
            .map(|node| Arc::clone(&node.sink))
            .collect()
    }

    fn propagate_assert(
        &self,
        sinks: &[Arc<dyn ObjectSink>],
        handle: FactHandle,
        fact: &Fact,
        context: &PropagationContext,
    ) -> Result<Vec<Activation>> {
        let _partitions = self.partitions.lock(&Rete::partitions_of(sinks))?;
        assert_into(sinks, handle, fact, context)
    }

    fn propagate_retract(
        &self,
        sinks: &[Arc<dyn ObjectSink>],
        handle: FactHandle,
        fact: &Fact,
        context: &PropagationContext,
    ) -> Result<()> {
        let _partitions = self.partitions.lock(&Rete::partitions_of(sinks))?;
        retract_from(sinks, handle, fact, context)
    }
}

/// Fails unless the context was issued for this kind of event on `handle`.
fn check_context(context: &PropagationContext, kind: PropagationKind, handle: FactHandle) -> Result<()> {
    if context.kind() != kind {
        return Err(Error::invalid_context(format!(
            "{:?} context used for {kind:?}",
            context.kind()
        )));
    }
    if context.handle() != handle {
        return Err(Error::invalid_context(format!(
            "context issued for {} used for {handle}",
            context.handle()
        )));
    }
    Ok(())
}

fn propagation_context(
    operation: Operation,
    handle: FactHandle,
    context: &PropagationContext,
) -> ErrorContext {
    ErrorContext::new(operation)
        .with_handle(handle)
        .with_entry_point(context.entry_point().clone())
}

/// Asserts into every sink in order. On failure, sinks that already matched
/// see a compensating retraction. Partition locks must be held.
fn assert_into(
    sinks: &[Arc<dyn ObjectSink>],
    handle: FactHandle,
    fact: &Fact,
    context: &PropagationContext,
) -> Result<Vec<Activation>> {
    let mut matched: Vec<&Arc<dyn ObjectSink>> = Vec::new();
    let mut activations = Vec::new();
    for sink in sinks {
        match sink.assert_object(handle, fact, context) {
            Ok(Some(activation)) => {
                matched.push(sink);
                activations.push(activation);
            }
            Ok(None) => {}
            Err(err) => {
                for reached in matched.iter().rev() {
                    if let Err(compensation) = reached.retract_object(handle, context) {
                        warn!(node = %reached.id(), %handle, error = %compensation, "compensating retraction failed");
                    }
                }
                warn!(node = %sink.id(), %handle, rolled_back = matched.len(), error = %err, "assertion rolled back");
                return Err(err);
            }
        }
    }
    Ok(activations)
}

/// Retracts from every sink in order. On failure, sinks already retracted
/// get the fact back. Partition locks must be held.
fn retract_from(
    sinks: &[Arc<dyn ObjectSink>],
    handle: FactHandle,
    fact: &Fact,
    context: &PropagationContext,
) -> Result<()> {
    for (index, sink) in sinks.iter().enumerate() {
        if let Err(err) = sink.retract_object(handle, context) {
            for reached in sinks[..index].iter().rev() {
                if let Err(compensation) = reached.assert_object(handle, fact, context) {
                    warn!(node = %reached.id(), %handle, error = %compensation, "compensating assertion failed");
                }
            }
            warn!(node = %sink.id(), %handle, rolled_back = index, error = %err, "retraction rolled back");
            return Err(err);
        }
    }
    Ok(())
}

impl fmt::Debug for RuleBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleBase")
            .field("id", &self.config.id)
            .field("state", &self.state())
            .field("packages", &self.packages.load().names())
            .field("nodes", &self.node_count())
            .field("partitions", &self.partitions.len())
            .finish_non_exhaustive()
    }
}
