//! Tamper-evident audit trail for the activity log.
//!
//! Every activity entry is committed as a SHA-256 leaf of an append-only
//! Merkle tree. The root changes with each entry, so any later edit of a
//! stored activity row no longer hashes to its leaf, and any edit of a leaf
//! breaks the inclusion proofs handed out earlier.

mod proof;
mod trail;

pub use proof::*;
pub use trail::*;
