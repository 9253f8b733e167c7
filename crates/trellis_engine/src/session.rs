//! Working memory sessions.
//!
//! A [`WorkingMemory`] is a cheap, cloneable handle onto one session's
//! facts, node memories and agenda. Facts enter through entry points and
//! are propagated by the owning [`RuleBase`].

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, trace};
use trellis_foundation::{
    EntryPointId, Error, ErrorContext, ErrorKind, Fact, FactHandle, FactType, NodeId, Operation,
    Result, SessionId,
};
use trellis_network::{Activation, EntryPointNode, PropagationKind, RuleName};

use crate::agenda::Agenda;
use crate::clock::SessionClock;
use crate::factory::FactHandleFactory;
use crate::persistence::{CheckpointStore, FactHandleCheckpoint};
use crate::rule_base::{QueuedActionReport, RuleBase};

type SessionAction = Box<dyn FnOnce(&WorkingMemory) -> Result<()> + Send>;

// =============================================================================
// Session State
// =============================================================================

/// A live fact.
#[derive(Clone, Debug)]
pub(crate) struct FactEntry {
    pub fact: Fact,
    pub entry_point: EntryPointId,
    pub inserted_at: Duration,
}

/// Partial matches: which node holds which fact.
#[derive(Debug, Default)]
pub(crate) struct NodeMemories {
    by_node: HashMap<NodeId, HashSet<FactHandle>>,
    by_handle: HashMap<FactHandle, BTreeSet<NodeId>>,
}

impl NodeMemories {
    pub fn insert(&mut self, node: NodeId, handle: FactHandle) {
        self.by_node.entry(node).or_default().insert(handle);
        self.by_handle.entry(handle).or_default().insert(node);
    }

    pub fn contains(&self, node: NodeId, handle: FactHandle) -> bool {
        self.by_node
            .get(&node)
            .is_some_and(|handles| handles.contains(&handle))
    }

    pub fn nodes_of(&self, handle: FactHandle) -> BTreeSet<NodeId> {
        self.by_handle.get(&handle).cloned().unwrap_or_default()
    }

    pub fn len_of(&self, node: NodeId) -> usize {
        self.by_node.get(&node).map_or(0, HashSet::len)
    }

    pub fn remove_handle(&mut self, handle: FactHandle) {
        for node in self.by_handle.remove(&handle).unwrap_or_default() {
            if let Some(handles) = self.by_node.get_mut(&node) {
                handles.remove(&handle);
                if handles.is_empty() {
                    self.by_node.remove(&node);
                }
            }
        }
    }

    pub fn remove_nodes(&mut self, nodes: &HashSet<NodeId>) -> usize {
        let mut dropped = 0;
        for node in nodes {
            for handle in self.by_node.remove(node).unwrap_or_default() {
                dropped += 1;
                if let Some(held) = self.by_handle.get_mut(&handle) {
                    held.remove(node);
                    if held.is_empty() {
                        self.by_handle.remove(&handle);
                    }
                }
            }
        }
        dropped
    }

    pub fn clear(&mut self) {
        self.by_node.clear();
        self.by_handle.clear();
    }
}

/// Everything guarded by the session state lock.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub factory: FactHandleFactory,
    /// Issued handles not yet asserted.
    pub pending: HashSet<FactHandle>,
    pub facts: BTreeMap<FactHandle, FactEntry>,
    pub memories: NodeMemories,
    pub agenda: Agenda,
    pub globals: HashMap<String, Fact>,
}

impl SessionState {
    fn new(factory: FactHandleFactory) -> Self {
        Self {
            factory,
            pending: HashSet::new(),
            facts: BTreeMap::new(),
            memories: NodeMemories::default(),
            agenda: Agenda::new(),
            globals: HashMap::new(),
        }
    }

    fn dead_handle(&self, handle: FactHandle) -> Error {
        if self.factory.owns(handle) && !self.pending.contains(&handle) {
            Error::retracted_handle(handle)
        } else {
            Error::unknown_handle(handle)
        }
    }

    fn check_factory(&self, handle: FactHandle) -> Result<()> {
        if handle.factory == self.factory.id() {
            Ok(())
        } else {
            Err(Error::foreign_handle(handle, self.factory.id()))
        }
    }

    pub fn fact(&self, handle: FactHandle) -> Option<&Fact> {
        self.facts.get(&handle).map(|entry| &entry.fact)
    }

    /// Checks that `handle` may be asserted: issued here, not yet live, and
    /// never retracted.
    pub fn check_assertable(&self, handle: FactHandle) -> Result<()> {
        self.check_factory(handle)?;
        if self.facts.contains_key(&handle) {
            return Err(Error::duplicate_assertion(handle));
        }
        if self.pending.contains(&handle) {
            Ok(())
        } else {
            Err(self.dead_handle(handle))
        }
    }

    /// Returns the live entry of `handle`.
    pub fn live(&self, handle: FactHandle) -> Result<&FactEntry> {
        self.check_factory(handle)?;
        self.facts
            .get(&handle)
            .ok_or_else(|| self.dead_handle(handle))
    }

    /// Returns the live entry of `handle`, which must have been inserted
    /// through `entry_point`.
    pub fn live_on(&self, handle: FactHandle, entry_point: &EntryPointId) -> Result<&FactEntry> {
        let entry = self.live(handle)?;
        if entry.entry_point == *entry_point {
            Ok(entry)
        } else {
            Err(Error::unknown_handle(handle))
        }
    }

    pub fn handles_by_entry_point(&self) -> Vec<(FactHandle, EntryPointId)> {
        self.facts
            .iter()
            .map(|(handle, entry)| (*handle, entry.entry_point.clone()))
            .collect()
    }

    pub fn record_matches(&mut self, handle: FactHandle, activations: Vec<Activation>) {
        for activation in activations {
            self.memories.insert(activation.node, handle);
            self.agenda.push(activation);
        }
    }

    pub fn commit_assert(&mut self, handle: FactHandle, entry: FactEntry, activations: Vec<Activation>) {
        self.pending.remove(&handle);
        self.facts.insert(handle, entry);
        self.record_matches(handle, activations);
    }

    pub fn commit_retract(&mut self, handle: FactHandle) -> Option<FactEntry> {
        self.memories.remove_handle(handle);
        self.agenda.cancel_handle(handle);
        self.facts.remove(&handle)
    }

    pub fn commit_modify(&mut self, handle: FactHandle, fact: Fact, activations: Vec<Activation>) {
        self.memories.remove_handle(handle);
        self.agenda.cancel_handle(handle);
        if let Some(entry) = self.facts.get_mut(&handle) {
            entry.fact = fact;
        }
        self.record_matches(handle, activations);
    }

    fn clear(&mut self) {
        self.pending.clear();
        self.facts.clear();
        self.memories.clear();
        self.agenda.clear();
        self.globals.clear();
    }
}

pub(crate) struct SessionInner {
    id: SessionId,
    rule_base: Arc<RuleBase>,
    state: Mutex<SessionState>,
    entry_points: RwLock<BTreeMap<EntryPointId, Arc<EntryPointNode>>>,
    actions: Mutex<VecDeque<SessionAction>>,
    clock: SessionClock,
    disposed: AtomicBool,
}

// =============================================================================
// Working Memory
// =============================================================================

/// Handle onto one working memory session.
///
/// Clones share the same session. The rule base only tracks sessions
/// weakly: a session whose last handle is dropped disappears from
/// [`RuleBase::working_memories`].
#[derive(Clone)]
pub struct WorkingMemory {
    inner: Arc<SessionInner>,
}

impl WorkingMemory {
    pub(crate) fn new(
        id: SessionId,
        rule_base: Arc<RuleBase>,
        factory: FactHandleFactory,
        entry_points: BTreeMap<EntryPointId, Arc<EntryPointNode>>,
    ) -> Self {
        let clock = SessionClock::new(rule_base.configuration().clock);
        Self {
            inner: Arc::new(SessionInner {
                id,
                rule_base,
                state: Mutex::new(SessionState::new(factory)),
                entry_points: RwLock::new(entry_points),
                actions: Mutex::new(VecDeque::new()),
                clock,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<SessionInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock()
    }

    /// Returns the session id.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Returns the owning rule base.
    #[must_use]
    pub fn rule_base(&self) -> &Arc<RuleBase> {
        &self.inner.rule_base
    }

    /// Returns true once the session was disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Returns the id of the session's fact handle factory.
    #[must_use]
    pub fn factory_id(&self) -> u32 {
        self.lock_state().factory.id()
    }

    /// Returns the session clock.
    #[must_use]
    pub fn clock(&self) -> &SessionClock {
        &self.inner.clock
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_disposed() {
            Err(Error::session_disposed(self.id()))
        } else {
            Ok(())
        }
    }

    fn ensure_live(&self) -> Result<()> {
        self.rule_base().ensure_running()?;
        self.ensure_open()
    }

    /// Marks the session disposed and drops its contents. Returns false if
    /// it was already disposed.
    pub(crate) fn release(&self) -> bool {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.actions.lock().clear();
        self.inner.entry_points.write().clear();
        self.lock_state().clear();
        true
    }

    /// Disposes the session. Safe to call more than once.
    pub fn dispose(&self) {
        self.rule_base().dispose_stateful_session(self);
    }

    // -------------------------------------------------------------------------
    // Entry Points
    // -------------------------------------------------------------------------

    /// Returns the session's view of an entry point.
    #[must_use]
    pub fn entry_point(&self, id: &EntryPointId) -> Option<Arc<EntryPointNode>> {
        self.inner.entry_points.read().get(id).cloned()
    }

    pub(crate) fn require_entry_point(&self, id: &EntryPointId) -> Result<Arc<EntryPointNode>> {
        self.entry_point(id)
            .ok_or_else(|| Error::unknown_entry_point(id))
    }

    /// Returns the ids of the entry points in the session's view.
    #[must_use]
    pub fn entry_point_ids(&self) -> Vec<EntryPointId> {
        self.inner.entry_points.read().keys().cloned().collect()
    }

    pub(crate) fn apply_entry_point_changes<'a>(
        &self,
        added: impl IntoIterator<Item = &'a Arc<EntryPointNode>>,
        removed: impl IntoIterator<Item = &'a EntryPointId>,
    ) {
        if self.is_disposed() {
            return;
        }
        let mut view = self.inner.entry_points.write();
        for node in added {
            view.insert(node.id().clone(), Arc::clone(node));
        }
        for id in removed {
            view.remove(id);
        }
    }

    pub(crate) fn drop_node_memories(&self, nodes: &HashSet<NodeId>) {
        let mut state = self.lock_state();
        let dropped = state.memories.remove_nodes(nodes);
        let cancelled = state.agenda.cancel_nodes(nodes);
        if dropped > 0 || cancelled > 0 {
            debug!(session = %self.id(), dropped, cancelled, "dropped memories of removed nodes");
        }
    }

    // -------------------------------------------------------------------------
    // Facts
    // -------------------------------------------------------------------------

    /// Issues a handle from the session's factory. It can be asserted once.
    ///
    /// # Errors
    /// Fails once the session or rule base is disposed.
    pub fn new_fact_handle(&self) -> Result<FactHandle> {
        self.ensure_live()?;
        let mut state = self.lock_state();
        let handle = state.factory.new_handle();
        state.pending.insert(handle);
        Ok(handle)
    }

    /// Inserts a value on the default entry point.
    ///
    /// # Errors
    /// See [`WorkingMemory::insert_into`].
    pub fn insert<T: Any + Send + Sync>(&self, value: T) -> Result<FactHandle> {
        self.insert_into(EntryPointId::default(), Fact::new(value))
    }

    /// Inserts a fact on the default entry point.
    ///
    /// # Errors
    /// See [`WorkingMemory::insert_into`].
    pub fn insert_fact(&self, fact: Fact) -> Result<FactHandle> {
        self.insert_into(EntryPointId::default(), fact)
    }

    /// Inserts a fact on a named entry point.
    ///
    /// # Errors
    /// Fails if the entry point is not in the session's view, the type is
    /// undeclared in strict mode, a node fails (nothing is inserted then),
    /// or the session or rule base is disposed.
    pub fn insert_into(&self, entry_point: impl Into<EntryPointId>, fact: Fact) -> Result<FactHandle> {
        let entry_point = entry_point.into();
        let rule_base = self.rule_base();
        let _read = rule_base.read_lock();
        self.ensure_live()?;
        let node = self.require_entry_point(&entry_point).map_err(|err| {
            err.with_context(ErrorContext::new(Operation::Assert).with_entry_point(entry_point.clone()))
        })?;

        let handle = self.new_fact_handle()?;
        let mut order = node.order();
        let context = order.next_context(PropagationKind::Assertion, handle);
        if let Err(err) = rule_base.assert_object(handle, fact, &context, self) {
            self.lock_state().pending.remove(&handle);
            return Err(err);
        }
        Ok(handle)
    }

    /// Retracts a fact.
    ///
    /// # Errors
    /// Identity errors for unknown, foreign or already retracted handles,
    /// or a node failure (the fact stays then).
    pub fn retract(&self, handle: FactHandle) -> Result<()> {
        self.propagate_change(handle, PropagationKind::Retraction, None)
    }

    /// Replaces the fact behind a live handle.
    ///
    /// # Errors
    /// Same as [`WorkingMemory::retract`]; the old fact stays on failure.
    pub fn update(&self, handle: FactHandle, fact: Fact) -> Result<()> {
        self.propagate_change(handle, PropagationKind::Modification, Some(fact))
    }

    fn propagate_change(&self, handle: FactHandle, kind: PropagationKind, fact: Option<Fact>) -> Result<()> {
        let operation = kind.operation();
        let rule_base = self.rule_base();
        let _read = rule_base.read_lock();
        self.ensure_live()?;
        let entry_point = self
            .lock_state()
            .live(handle)
            .map(|entry| entry.entry_point.clone())
            .map_err(|err| err.with_context(ErrorContext::new(operation).with_handle(handle)))?;

        let node = rule_base.entry_point_node(&entry_point);
        let mut order = node.order();
        let context = order.next_context(kind, handle);
        match fact {
            Some(fact) => rule_base.modify_object(handle, fact, &context, self),
            None => rule_base.retract_object(handle, &context, self),
        }
    }

    /// Returns the fact behind a live handle.
    #[must_use]
    pub fn fact(&self, handle: FactHandle) -> Option<Fact> {
        self.lock_state().fact(handle).cloned()
    }

    /// Returns true if the handle is live.
    #[must_use]
    pub fn contains(&self, handle: FactHandle) -> bool {
        self.lock_state().facts.contains_key(&handle)
    }

    /// Returns the number of live facts.
    #[must_use]
    pub fn fact_count(&self) -> usize {
        self.lock_state().facts.len()
    }

    /// Returns every live fact, ordered by handle.
    #[must_use]
    pub fn facts(&self) -> Vec<(FactHandle, Fact)> {
        self.lock_state()
            .facts
            .iter()
            .map(|(handle, entry)| (*handle, entry.fact.clone()))
            .collect()
    }

    /// Returns the number of facts a node currently holds.
    #[must_use]
    pub fn node_memory_len(&self, node: NodeId) -> usize {
        self.lock_state().memories.len_of(node)
    }

    // -------------------------------------------------------------------------
    // Agenda
    // -------------------------------------------------------------------------

    /// Returns the pending activations in firing order.
    #[must_use]
    pub fn activations(&self) -> Vec<Activation> {
        self.lock_state().agenda.iter().cloned().collect()
    }

    /// Fires activations until the agenda is empty. Returns how many fired.
    ///
    /// # Errors
    /// Returns the first error raised by a consequence.
    pub fn fire_all_rules(&self) -> Result<usize> {
        self.fire_until_limit(usize::MAX)
    }

    /// Fires at most `limit` activations. Returns how many fired.
    ///
    /// Queued actions run before each firing. Consequences run without any
    /// session lock held, so they may insert, update and retract.
    ///
    /// # Errors
    /// Returns the first error raised by a consequence.
    pub fn fire_until_limit(&self, limit: usize) -> Result<usize> {
        self.ensure_live()?;
        let mut fired = 0;
        while fired < limit {
            self.execute_queued_actions()?;
            let Some(activation) = self.lock_state().agenda.pop() else {
                break;
            };
            let Some(fact) = self.fact(activation.handle) else {
                continue;
            };
            let Some(rule) = self.rule_base().rule(&activation.rule) else {
                continue;
            };
            if let Some(consequence) = rule.consequence() {
                let mut context = RuleContext {
                    session: self,
                    activation: &activation,
                    fact,
                };
                consequence.fire(&mut context)?;
            }
            trace!(session = %self.id(), rule = %activation.rule, handle = %activation.handle, "fired");
            fired += 1;
        }
        Ok(fired)
    }

    // -------------------------------------------------------------------------
    // Queued Actions
    // -------------------------------------------------------------------------

    /// Queues an action to run before the next firing.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::QueueFull`] at the configured limit.
    pub fn queue_action<F>(&self, action: F) -> Result<()>
    where
        F: FnOnce(&WorkingMemory) -> Result<()> + Send + 'static,
    {
        self.ensure_live()?;
        let limit = self.rule_base().configuration().max_queued_actions;
        let mut actions = self.inner.actions.lock();
        if actions.len() >= limit {
            return Err(Error::new(ErrorKind::QueueFull(limit)));
        }
        actions.push_back(Box::new(action));
        Ok(())
    }

    /// Runs every queued action in FIFO order. Failures are collected; the
    /// remaining actions still run.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::LockHeld`] if the calling thread holds the
    /// rule base read lock or a partition lock.
    pub fn execute_queued_actions(&self) -> Result<QueuedActionReport> {
        self.ensure_live()?;
        let rule_base = self.rule_base();
        if rule_base.holds_read_lock() || rule_base.partitions().holds_any_lock() {
            return Err(Error::new(ErrorKind::LockHeld(format!(
                "a rule base lock while draining {}",
                self.id()
            ))));
        }

        let actions: Vec<SessionAction> = self.inner.actions.lock().drain(..).collect();
        let mut report = QueuedActionReport::default();
        for action in actions {
            report.record(action(self));
        }
        Ok(report)
    }

    // -------------------------------------------------------------------------
    // Globals
    // -------------------------------------------------------------------------

    /// Sets a global declared by one of the deployed packages.
    ///
    /// # Errors
    /// [`ErrorKind::UnknownGlobal`] if no package declares `name`,
    /// [`ErrorKind::ConflictingGlobal`] if it is declared with another type.
    pub fn set_global<T: Any + Send + Sync>(&self, name: &str, value: T) -> Result<()> {
        self.ensure_live()?;
        let declared = self
            .rule_base()
            .packages()
            .global(name)
            .ok_or_else(|| Error::new(ErrorKind::UnknownGlobal(name.to_string())))?;
        let actual = FactType::of::<T>();
        if declared != actual {
            return Err(Error::new(ErrorKind::ConflictingGlobal(format!(
                "{name} is declared as {declared}, not {actual}"
            ))));
        }
        self.lock_state()
            .globals
            .insert(name.to_string(), Fact::new(value));
        Ok(())
    }

    /// Returns the value of a global.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<Fact> {
        self.lock_state().globals.get(name).cloned()
    }

    // -------------------------------------------------------------------------
    // Time
    // -------------------------------------------------------------------------

    /// Advances a pseudo clock. Returns false on a realtime clock.
    pub fn advance_time(&self, by: Duration) -> bool {
        self.inner.clock.advance(by)
    }

    /// Retracts every event whose declared expiration has passed.
    ///
    /// Only stream mode honors expirations; in cloud mode nothing expires.
    /// Returns the number of events retracted.
    ///
    /// # Errors
    /// Fails if a retraction fails.
    pub fn expire_events(&self) -> Result<usize> {
        self.ensure_live()?;
        let rule_base = self.rule_base();
        if !rule_base.configuration().is_stream_mode() {
            return Ok(0);
        }

        let now = self.inner.clock.now();
        let expired: Vec<FactHandle> = self
            .lock_state()
            .facts
            .iter()
            .filter_map(|(handle, entry)| {
                let declaration = rule_base.type_declaration(&entry.fact.fact_type())?;
                let expires = declaration.expires.filter(|_| declaration.is_event())?;
                (now.saturating_sub(entry.inserted_at) > expires).then_some(*handle)
            })
            .collect();

        let mut retracted = 0;
        for handle in expired {
            match self.retract(handle) {
                Ok(()) => retracted += 1,
                Err(err) if matches!(err.kind, ErrorKind::RetractedHandle(_)) => {}
                Err(err) => return Err(err),
            }
        }
        if retracted > 0 {
            debug!(session = %self.id(), retracted, "expired events");
        }
        Ok(retracted)
    }

    // -------------------------------------------------------------------------
    // Checkpoints
    // -------------------------------------------------------------------------

    /// Returns the state needed to recover this session's handle factory.
    ///
    /// # Errors
    /// Fails once the session is disposed.
    pub fn checkpoint(&self) -> Result<FactHandleCheckpoint> {
        self.ensure_open()?;
        Ok(self.lock_state().factory.checkpoint())
    }

    /// Writes a checkpoint to a store.
    ///
    /// # Errors
    /// Fails if the session is disposed or the store cannot be written.
    pub fn checkpoint_to(&self, store: &dyn CheckpointStore) -> Result<()> {
        store.store(&self.checkpoint()?)
    }
}

impl PartialEq for WorkingMemory {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for WorkingMemory {}

impl fmt::Debug for WorkingMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkingMemory")
            .field("id", &self.id())
            .field("rule_base", &self.rule_base().id())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Rule Context
// =============================================================================

/// What a consequence sees while it runs.
pub struct RuleContext<'a> {
    session: &'a WorkingMemory,
    activation: &'a Activation,
    fact: Fact,
}

impl RuleContext<'_> {
    /// Returns the session the rule fired in.
    #[must_use]
    pub fn session(&self) -> &WorkingMemory {
        self.session
    }

    /// Returns the rule that fired.
    #[must_use]
    pub fn rule(&self) -> &RuleName {
        &self.activation.rule
    }

    /// Returns the handle of the matched fact.
    #[must_use]
    pub fn handle(&self) -> FactHandle {
        self.activation.handle
    }

    /// Returns the matched fact.
    #[must_use]
    pub fn fact(&self) -> &Fact {
        &self.fact
    }

    /// Returns the matched fact as `T`.
    #[must_use]
    pub fn fact_as<T: Any>(&self) -> Option<&T> {
        self.fact.downcast_ref::<T>()
    }

    /// Returns the value of a global.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<Fact> {
        self.session.global(name)
    }

    /// Inserts a value on the default entry point.
    ///
    /// # Errors
    /// See [`WorkingMemory::insert`].
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) -> Result<FactHandle> {
        self.session.insert(value)
    }

    /// Retracts a fact.
    ///
    /// # Errors
    /// See [`WorkingMemory::retract`].
    pub fn retract(&mut self, handle: FactHandle) -> Result<()> {
        self.session.retract(handle)
    }
}

impl fmt::Debug for RuleContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleContext")
            .field("session", &self.session.id())
            .field("activation", self.activation)
            .field("fact", &self.fact)
            .finish()
    }
}
