//! Layer 2: Size accounting
//!
//! Byte-weight bookkeeping for the size limit check and GC observability.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Byte weight of one ticket: lamport (8) + delimiter (4) + actor (16).
pub const TICKET_WEIGHT: usize = 28;

/// Payload vs. bookkeeping bytes for a set of elements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSize {
    /// Bytes of user payload (canonical scalar text).
    pub data: usize,
    /// Bytes of CRDT metadata (tickets held by elements).
    pub meta: usize,
}

impl DataSize {
    pub fn total(&self) -> usize {
        self.data + self.meta
    }
}

impl AddAssign for DataSize {
    fn add_assign(&mut self, rhs: DataSize) {
        self.data += rhs.data;
        self.meta += rhs.meta;
    }
}

/// Document size split into live elements and pending garbage.
///
/// The size limit applies to `total()`, which counts live weight only;
/// tombstones are transient and reclaimed by GC.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocSize {
    pub live: DataSize,
    pub garbage: DataSize,
}

impl DocSize {
    pub fn total(&self) -> usize {
        self.live.total()
    }
}
