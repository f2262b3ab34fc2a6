use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque, comparable, hashable identifier for a datastore slot.
///
/// Two addresses are equal iff they refer to the same storage slot; the
/// numeric value backing an address carries no meaning beyond identity and
/// allocation order. Its `$<n>` textual form (see `Display`) exists only for
/// presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(u64);

impl Address {
    /// Construct an address from a raw id. Ordinary code never needs this,
    /// since addresses come from a [`crate::Datastore`], but persistence
    /// round-trips and tests that build hypertext fixtures without a live
    /// store need a way to name an address.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric id, for display and serialisation only.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// A scheduler-owned token registered against a datastore address via
/// [`crate::Datastore::await_fulfilment`]. The datastore treats this as an
/// opaque bag of bits; it never interprets or dereferences it, only stores
/// and returns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WakeToken(u64);

impl WakeToken {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WakeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wake#{}", self.0)
    }
}
