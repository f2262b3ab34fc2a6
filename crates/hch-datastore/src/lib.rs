//! Address & Datastore.
//!
//! A content-addressed, promise-capable store. Every slot is exactly one of
//! `Filled`, `Pending`, or `Alias`; this crate owns allocation,
//! canonical-form interning, promise fulfilment, and alias-chain resolution.
//! It knows nothing about hypertext shape or workspaces; those are layered
//! on top via the [`Canonicalize`] trait, so this crate stays a generic,
//! reusable content store, agnostic to what it stores.

mod address;
mod error;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;

pub use address::{Address, WakeToken};
pub use error::DatastoreError;

/// What a stored value must support so the datastore can dedupe and track
/// reverse-dependencies for it. `canonical_form` must render every embedded
/// child address through `resolve`, i.e. the value's current resolution, not
/// a string cached from when the value was interned. The index key has to
/// be recomputed at lookup time so that a child's later alias is reflected
/// in every parent that embeds it.
pub trait Canonicalize {
    fn canonical_form(&self, resolve: &dyn Fn(Address) -> Address) -> String;

    /// Every address embedded as a direct (one-level) child. Content
    /// equality of deeper structure is already captured by child addresses
    /// themselves (content equality implies address equality, invariant 2),
    /// so canonical form never needs to recurse past this one level.
    fn direct_children(&self) -> Vec<Address>;
}

#[derive(Debug)]
enum Slot<H> {
    Filled(H),
    Pending(Vec<WakeToken>),
    Alias(Address),
}

/// Whether a probed address is ready to be read, or still a promise.
pub enum Lookup<'a, H> {
    Filled(&'a H),
    Pending,
}

/// Result of registering interest in an address's fulfilment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitOutcome {
    /// The address (after alias resolution) is already `Filled`; the caller
    /// should treat its token as immediately delivered rather than parking.
    Ready,
    /// The token was recorded as a waiter; it fires on a future `fulfil`.
    Parked,
}

/// The shared, content-addressed store. Generic over the stored value type
/// `H` so the datastore itself carries no notion of hypertext or workspace
/// shape.
pub struct Datastore<H> {
    slots: Vec<Slot<H>>,
    canonical_index: HashMap<String, Address>,
    keys_by_address: HashMap<Address, String>,
    /// child address -> Filled parent addresses whose canonical form embeds
    /// it directly. Used to re-key `canonical_index` when a pending child
    /// resolves to something other than itself (the alias case); see
    /// `reresolve_dependents`.
    dependents: HashMap<Address, Vec<Address>>,
    next_wake_token: u64,
}

impl<H> Default for Datastore<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Datastore<H> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            canonical_index: HashMap::new(),
            keys_by_address: HashMap::new(),
            dependents: HashMap::new(),
            next_wake_token: 0,
        }
    }

    /// Mint a fresh, never-before-issued wake token for the caller (the
    /// scheduler) to register via [`Datastore::await_fulfilment`].
    pub fn new_wake_token(&mut self) -> WakeToken {
        let token = WakeToken::new(self.next_wake_token);
        self.next_wake_token += 1;
        token
    }

    fn alloc_slot(&mut self, slot: Slot<H>) -> Address {
        let addr = Address::new(self.slots.len() as u64);
        self.slots.push(slot);
        addr
    }

    /// Follow `Alias` pointers to a non-alias slot. Addresses are allocated
    /// monotonically and an `Alias` only ever targets a strictly earlier
    /// address that is itself never re-aliased once it becomes the terminus
    /// (Filled/Pending are terminal once reached from here), so the chain is
    /// finite. The length cap below only guards against a cycle that should
    /// never arise through the public API; if it does, that is a bug in the
    /// caller, not a recoverable condition.
    pub fn resolve(&self, addr: Address) -> Result<Address, DatastoreError> {
        let mut current = addr;
        for _ in 0..=self.slots.len() {
            match self.slot(current)? {
                Slot::Alias(next) => current = *next,
                _ => return Ok(current),
            }
        }
        Err(DatastoreError::AliasCycle(addr))
    }

    fn slot(&self, addr: Address) -> Result<&Slot<H>, DatastoreError> {
        self.slots
            .get(addr.raw() as usize)
            .ok_or(DatastoreError::UnknownAddress(addr))
    }

    fn slot_mut(&mut self, addr: Address) -> Result<&mut Slot<H>, DatastoreError> {
        self.slots
            .get_mut(addr.raw() as usize)
            .ok_or(DatastoreError::UnknownAddress(addr))
    }

    pub fn lookup(&self, addr: Address) -> Result<Lookup<'_, H>, DatastoreError> {
        let resolved = self.resolve(addr)?;
        match self.slot(resolved)? {
            Slot::Filled(h) => Ok(Lookup::Filled(h)),
            Slot::Pending(_) => Ok(Lookup::Pending),
            Slot::Alias(_) => unreachable!("resolve() never returns an alias slot"),
        }
    }

    /// Register `token` against `addr`'s eventual fulfilment. An address
    /// already resolving to `Filled` delivers the token immediately: the
    /// scheduler must still act on it, the datastore just reports readiness
    /// rather than silently dropping it.
    pub fn await_fulfilment(
        &mut self,
        addr: Address,
        token: WakeToken,
    ) -> Result<AwaitOutcome, DatastoreError> {
        let resolved = self.resolve(addr)?;
        match self.slot_mut(resolved)? {
            Slot::Filled(_) => Ok(AwaitOutcome::Ready),
            Slot::Pending(waiters) => {
                waiters.push(token);
                Ok(AwaitOutcome::Parked)
            }
            Slot::Alias(_) => unreachable!("resolve() never returns an alias slot"),
        }
    }

    fn resolver(&self) -> impl Fn(Address) -> Address + '_ {
        move |a| self.resolve(a).unwrap_or(a)
    }
}

/// A single slot's persisted shape. Waiters are never serialised: a
/// `Pending` slot's wake tokens are process-local and meaningless across a
/// restart. `hch-scheduler`'s own snapshot records which address each
/// parked session awaits and re-registers a fresh `await_fulfilment` on
/// restore, which is what repopulates this slot's waiter list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SlotSnapshot<H> {
    Filled(H),
    Pending,
    Alias(Address),
}

impl<H: Clone> Datastore<H> {
    /// Dump every slot in address order for persistence. Index `i` of the
    /// returned vector is address `i`.
    pub fn slot_snapshots(&self) -> Vec<SlotSnapshot<H>> {
        self.slots
            .iter()
            .map(|s| match s {
                Slot::Filled(h) => SlotSnapshot::Filled(h.clone()),
                Slot::Pending(_) => SlotSnapshot::Pending,
                Slot::Alias(a) => SlotSnapshot::Alias(*a),
            })
            .collect()
    }
}

impl<H: Canonicalize + Clone> Datastore<H> {
    /// Rebuild a datastore from a slot dump. Addresses are exactly the
    /// slots' positions, so no renumbering happens; the canonical-form
    /// index is rebuilt from scratch by replaying `register_canonical` over
    /// every `Filled` slot in address order, which is safe because a slot's
    /// canonical form only ever depends on earlier or equal addresses
    /// (children are interned before their parents).
    pub fn from_snapshot(slots: Vec<SlotSnapshot<H>>) -> Self {
        let mut store = Self::new();
        store.slots = slots
            .into_iter()
            .map(|s| match s {
                SlotSnapshot::Filled(h) => Slot::Filled(h),
                SlotSnapshot::Pending => Slot::Pending(Vec::new()),
                SlotSnapshot::Alias(a) => Slot::Alias(a),
            })
            .collect();
        for i in 0..store.slots.len() {
            let addr = Address::new(i as u64);
            if let Slot::Filled(h) = &store.slots[i] {
                let h = h.clone();
                let key = h.canonical_form(&store.resolver());
                store.register_canonical(addr, key, &h);
            }
        }
        store
    }
}

impl<H: Canonicalize + Clone> Datastore<H> {
    /// Intern `h` by canonical form: an equal canonical form already filled
    /// elsewhere is reused verbatim.
    pub fn allocate_filled(&mut self, h: H) -> Address {
        let key = h.canonical_form(&self.resolver());
        if let Some(&existing) = self.canonical_index.get(&key) {
            trace!(target: "hch_datastore", %existing, "allocate_filled deduped");
            return existing;
        }
        let addr = self.alloc_slot(Slot::Filled(h.clone()));
        self.register_canonical(addr, key, &h);
        trace!(target: "hch_datastore", %addr, "allocate_filled fresh");
        addr
    }

    /// Allocate a fresh promise: no canonical indexing yet, since an
    /// unresolved promise is not content-equal to anything.
    pub fn allocate_promise(&mut self) -> Address {
        let addr = self.alloc_slot(Slot::Pending(Vec::new()));
        trace!(target: "hch_datastore", %addr, "allocate_promise");
        addr
    }

    /// Resolve a promise. Returns the wake tokens that are now ready to
    /// fire: either `addr`'s own waiters (fresh fill) or the same waiters
    /// forwarded because `addr` turned out to alias an already-`Filled`
    /// address. The transfer is atomic with the state change so no waiter
    /// is lost or double-delivered.
    pub fn fulfil(&mut self, addr: Address, h: H) -> Result<Vec<WakeToken>, DatastoreError> {
        let waiters = match self.slot(addr)? {
            Slot::Pending(_) => {
                let Slot::Pending(w) = std::mem::replace(
                    self.slot_mut(addr)?,
                    Slot::Pending(Vec::new()),
                ) else {
                    unreachable!()
                };
                w
            }
            _ => return Err(DatastoreError::DoubleFulfil(addr)),
        };

        let key = h.canonical_form(&self.resolver());
        if let Some(&existing) = self.canonical_index.get(&key) {
            if existing != addr {
                trace!(target: "hch_datastore", %addr, %existing, waiters = waiters.len(), "fulfil aliased");
                *self.slot_mut(addr)? = Slot::Alias(existing);
                self.reresolve_dependents(addr);
                return Ok(waiters);
            }
        }

        trace!(target: "hch_datastore", %addr, waiters = waiters.len(), "fulfil filled");
        *self.slot_mut(addr)? = Slot::Filled(h.clone());
        self.register_canonical(addr, key, &h);
        Ok(waiters)
    }

    fn register_canonical(&mut self, addr: Address, key: String, h: &H) {
        self.canonical_index.insert(key.clone(), addr);
        self.keys_by_address.insert(addr, key);
        for child in h.direct_children() {
            let resolved = self.resolve(child).unwrap_or(child);
            self.dependents.entry(resolved).or_default().push(addr);
        }
    }

    /// After `addr` turns out to alias `existing`, every already-`Filled`
    /// parent that embedded `addr` as a direct child has a stale
    /// `canonical_index` entry (it was computed while `addr` resolved to
    /// itself). Recompute those parents' keys now that `resolve(addr)`
    /// yields `existing` instead. No further cascade is needed: `existing`
    /// is permanently `Filled` (invariant 3), so this is a one-hop fix-up.
    /// A parent's own address never changes; only the string under which
    /// it is indexed does.
    fn reresolve_dependents(&mut self, addr: Address) {
        let Some(parents) = self.dependents.remove(&addr) else {
            return;
        };
        for parent in parents {
            let Ok(Slot::Filled(content)) = self.slot(parent) else {
                continue;
            };
            let new_key = content.canonical_form(&self.resolver());
            if let Some(old_key) = self.keys_by_address.remove(&parent) {
                self.canonical_index.remove(&old_key);
            }
            self.canonical_index.insert(new_key.clone(), parent);
            self.keys_by_address.insert(parent, new_key);
        }
    }
}
