use crate::Address;
use thiserror::Error;

/// Fatal datastore errors: `DoubleFulfil` and `AliasCycle` both indicate a
/// scheduler bug, not a condition a well-behaved caller can trigger through
/// the public API. Kept as real, constructible variants rather than
/// `unreachable!()` so a misuse surfaces as a typed error instead of a panic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatastoreError {
    #[error("fulfil called on {0}, which is not a pending slot")]
    DoubleFulfil(Address),

    #[error("alias chain starting at {0} does not terminate")]
    AliasCycle(Address),

    #[error("address {0} does not exist in this datastore")]
    UnknownAddress(Address),
}
