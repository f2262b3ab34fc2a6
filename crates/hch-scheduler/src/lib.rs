//! Scheduler.
//!
//! Single-threaded and cooperative: one ready FIFO of sessions waiting for
//! their next action, one parked set of sessions waiting on a datastore
//! [`WakeToken`], and a global automation cache the caller threads through
//! explicitly rather than a singleton the scheduler owns itself. A run is
//! fully reproducible from `(store, cache)` alone.

use hch_actions::{Action, ActionError};
use hch_context::Context;
use hch_datastore::{Address, AwaitOutcome, Datastore, WakeToken};
use hch_hypertext::Hypertext;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;
use tracing::{debug, trace, warn};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Action(#[from] ActionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        SessionId(raw)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Session {
    context: Context,
    /// `None` only for the root session, which has no parent sub-entry to
    /// fulfil when it eventually replies.
    reply_target: Option<(Address, Address)>,
}

/// A plain-data dump of everything the scheduler needs to resume a run.
/// Addresses are snapshotted verbatim; `hch-bin`'s persistence layer
/// restores `WakeToken`s fresh by re-registering each parked session's
/// await against the restored datastore, since tokens themselves carry no
/// meaning across a process boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    sessions: Vec<(SessionId, Session)>,
    ready: Vec<SessionId>,
    /// Parked sessions and the address each is still awaiting (not the
    /// ephemeral wake token, which is re-minted on restore).
    parked: Vec<(SessionId, Address)>,
    pending_retry: Vec<(SessionId, Action)>,
    next_id: u64,
    root: SessionId,
}

/// Supplies the next action for a rendered context. `hch-bin`'s CLI driver
/// implements this over stdin/stdout; tests implement it over a canned
/// script. Parsing user-entered action/hypertext text happens inside the
/// `Driver` implementation, which is why `prompt` is handed the live
/// `Context` and a mutable `Datastore` reference: resolving a `$id` token or
/// interning freshly-typed inline content needs both. A parse failure is
/// reported to the driver with no state change, which a driver naturally
/// satisfies by re-prompting internally rather than ever returning a bad
/// action to the scheduler.
///
/// Returns `None` when the driver has nothing further to offer (stdin
/// closed, script exhausted) rather than inventing a placeholder action:
/// the scheduler leaves the session ready and stops stepping instead of
/// caching a decision nobody actually made.
pub trait Driver {
    fn prompt(&mut self, store: &mut Datastore<Hypertext>, context: &Context, rendering: &str) -> Option<Action>;
}

/// The session table, ready queue, and parked set.
pub struct Scheduler {
    sessions: HashMap<SessionId, Session>,
    ready: VecDeque<SessionId>,
    parked: HashMap<WakeToken, SessionId>,
    /// The address each parked session is awaiting, kept alongside `parked`
    /// purely so a snapshot can be taken without the (intentionally
    /// ephemeral) wake token.
    parked_addr: HashMap<SessionId, Address>,
    /// An action a parked session must replay, with no prompt and no
    /// automation-cache lookup, once its wake token fires.
    pending_retry: HashMap<SessionId, Action>,
    next_id: u64,
    root: SessionId,
    /// Renderings an automation replay chain has already revisited for a
    /// given session, since that session last needed actual human input.
    /// Per-session: two sessions legitimately rendering identically
    /// (content-addressing makes that possible) must not trip each other's
    /// loop detector.
    visited_since_human: HashMap<SessionId, HashSet<String>>,
}

impl Scheduler {
    pub fn new(root_context: Context) -> Self {
        let root = SessionId(0);
        let mut sessions = HashMap::new();
        sessions.insert(
            root,
            Session {
                context: root_context,
                reply_target: None,
            },
        );
        let mut ready = VecDeque::new();
        ready.push_back(root);
        Self {
            sessions,
            ready,
            parked: HashMap::new(),
            parked_addr: HashMap::new(),
            pending_retry: HashMap::new(),
            next_id: 1,
            root,
            visited_since_human: HashMap::new(),
        }
    }

    /// Dump the session table, ready queue, and parked set for persistence.
    /// The automation cache is persisted separately by the caller, since it
    /// is shared, process-wide state rather than per-scheduler state.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            sessions: self
                .sessions
                .iter()
                .map(|(id, s)| (*id, s.clone()))
                .collect(),
            ready: self.ready.iter().copied().collect(),
            parked: self
                .parked_addr
                .iter()
                .map(|(id, addr)| (*id, *addr))
                .collect(),
            pending_retry: self
                .pending_retry
                .iter()
                .map(|(id, a)| (*id, a.clone()))
                .collect(),
            next_id: self.next_id,
            root: self.root,
        }
    }

    /// Rebuild a scheduler from a [`SchedulerSnapshot`] against the
    /// datastore it was taken with (already restored). Each parked
    /// session's wait is re-registered fresh: if the awaited address has
    /// since resolved to `Filled` (possible if the snapshot was taken after
    /// a fulfilment but before the wake was drained), the session is placed
    /// back on the ready queue instead of parked, matching how `fulfil`
    /// itself would have woken it.
    pub fn restore(
        snapshot: SchedulerSnapshot,
        store: &mut Datastore<Hypertext>,
    ) -> Result<Self, hch_datastore::DatastoreError> {
        let sessions = snapshot.sessions.into_iter().collect::<HashMap<_, _>>();
        let mut ready: VecDeque<SessionId> = snapshot.ready.into_iter().collect();
        let mut parked = HashMap::new();
        let mut parked_addr = HashMap::new();
        for (id, addr) in snapshot.parked {
            let token = store.new_wake_token();
            match store.await_fulfilment(addr, token)? {
                AwaitOutcome::Parked => {
                    parked.insert(token, id);
                    parked_addr.insert(id, addr);
                }
                AwaitOutcome::Ready => ready.push_back(id),
            }
        }
        Ok(Self {
            sessions,
            ready,
            parked,
            parked_addr,
            pending_retry: snapshot.pending_retry.into_iter().collect(),
            next_id: snapshot.next_id,
            root: snapshot.root,
            visited_since_human: HashMap::new(),
        })
    }

    /// Record `rendering` as visited by `id`'s current auto-replay chain;
    /// `true` means it was already there.
    fn would_loop(&mut self, id: SessionId, rendering: &str) -> bool {
        let seen = self.visited_since_human.entry(id).or_default();
        !seen.insert(rendering.to_string())
    }

    fn fresh_id(&mut self) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn is_finished(&self) -> bool {
        !self.sessions.contains_key(&self.root)
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub fn parked_len(&self) -> usize {
        self.parked.len()
    }

    /// The current context of a still-live session, for inspection (tests,
    /// a future `sessions` REPL command). Not used by `step` itself.
    pub fn session_context(&self, id: SessionId) -> Option<&Context> {
        self.sessions.get(&id).map(|s| &s.context)
    }

    pub fn root_id(&self) -> SessionId {
        self.root
    }

    /// Drive steps until the root session replies, returning its answer.
    pub fn run(
        &mut self,
        store: &mut Datastore<Hypertext>,
        driver: &mut dyn Driver,
        automation_cache: &mut HashMap<String, Action>,
    ) -> Result<Address, SchedulerError> {
        loop {
            if let Some(answer) = self.step(store, driver, automation_cache)? {
                return Ok(answer);
            }
        }
    }

    /// Advance by exactly one ready session. Returns `Some(answer)` once
    /// the root session has replied.
    pub fn step(
        &mut self,
        store: &mut Datastore<Hypertext>,
        driver: &mut dyn Driver,
        automation_cache: &mut HashMap<String, Action>,
    ) -> Result<Option<Address>, SchedulerError> {
        let Some(id) = self.ready.pop_front() else {
            return Ok(None);
        };
        let session = self.sessions.get(&id).expect("ready session must exist").clone();

        let action = if let Some(retry) = self.pending_retry.remove(&id) {
            trace!(target: "hch_scheduler", %id, "replaying action after wake");
            retry
        } else {
            let rendering = session
                .context
                .render(store)
                .expect("a session's own context always renders");
            let cached = automation_cache.get(&rendering).cloned();
            match cached {
                Some(cached) if self.would_loop(id, &rendering) => {
                    // A cached action that would revisit a rendering already
                    // seen in this auto-replay chain means automation cannot
                    // safely continue; fall back to the driver exactly as if
                    // this rendering had never been cached, and let fresh
                    // human input restart the chain.
                    warn!(target: "hch_scheduler", %id, "automation loop detected, falling back to driver");
                    let _ = cached;
                    self.visited_since_human.remove(&id);
                    match driver.prompt(store, &session.context, &rendering) {
                        Some(chosen) => {
                            automation_cache.insert(rendering, chosen.clone());
                            chosen
                        }
                        None => {
                            self.ready.push_front(id);
                            return Ok(None);
                        }
                    }
                }
                Some(cached) => {
                    trace!(target: "hch_scheduler", %id, "automation replay hit");
                    cached
                }
                None => {
                    self.visited_since_human.remove(&id);
                    match driver.prompt(store, &session.context, &rendering) {
                        Some(chosen) => {
                            automation_cache.insert(rendering, chosen.clone());
                            chosen
                        }
                        None => {
                            self.ready.push_front(id);
                            return Ok(None);
                        }
                    }
                }
            }
        };

        let outcome = hch_actions::apply(action.clone(), store, &session.context, session.reply_target)?;

        for token in &outcome.woken {
            if let Some(waiter) = self.parked.remove(token) {
                self.parked_addr.remove(&waiter);
                debug!(target: "hch_scheduler", %waiter, "wake token fired");
                self.ready.push_back(waiter);
            }
        }

        if let Some(parked_on) = outcome.parked_on {
            self.parked.insert(parked_on, id);
            if let Action::Unlock(ref token) = action
                && let Ok(addr) = session.context.resolve_pointer(store, token)
            {
                self.parked_addr.insert(id, addr);
            }
            self.pending_retry.insert(id, action);
            return Ok(None);
        }

        if let Some(spawned) = outcome.spawned {
            let child = self.fresh_id();
            debug!(target: "hch_scheduler", %id, %child, "ask spawned child session");
            self.sessions.insert(
                child,
                Session {
                    context: spawned.context,
                    reply_target: Some(spawned.reply_target),
                },
            );
            self.ready.push_back(child);
        }

        if outcome.terminated {
            self.sessions.remove(&id);
            if id == self.root {
                return Ok(Some(outcome.answer.expect("reply always produces an answer")));
            }
            return Ok(None);
        }

        self.sessions.get_mut(&id).expect("session still live").context = outcome.context;
        self.ready.push_back(id);
        Ok(None)
    }
}
