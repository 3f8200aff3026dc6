//! Property-based testing utilities using proptest.
//!
//! Strategies generate capacities and operation sequences over a small pool
//! of users, so duplicates and re-registrations show up often.

use proptest::prelude::*;
use rsvp_core::{Capacity, UserId};

/// One step of a generated operation sequence.
///
/// Users are referred to by index into a pool built with [`user_pool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerOp {
    /// Register the user at this index
    Register(usize),
    /// Unregister the user at this index
    Unregister(usize),
}

impl LedgerOp {
    /// Index of the user the operation acts on.
    #[must_use]
    pub const fn user(self) -> usize {
        match self {
            Self::Register(user) | Self::Unregister(user) => user,
        }
    }
}

/// `size` fresh user ids.
#[must_use]
pub fn user_pool(size: usize) -> Vec<UserId> {
    (0..size).map(|_| UserId::new()).collect()
}

/// Small bounded capacities (including zero) and, sometimes, unbounded.
pub fn capacity() -> impl Strategy<Value = Capacity> {
    prop_oneof![
        4 => (0_u32..8).prop_map(Capacity::bounded),
        1 => Just(Capacity::Unbounded),
    ]
}

/// A single operation on a pool of `pool_size` users, biased towards
/// registration.
pub fn ledger_op(pool_size: usize) -> impl Strategy<Value = LedgerOp> {
    let max = pool_size.max(1);
    prop_oneof![
        3 => (0..max).prop_map(LedgerOp::Register),
        1 => (0..max).prop_map(LedgerOp::Unregister),
    ]
}

/// Up to `max_len` operations on a pool of `pool_size` users.
pub fn ledger_ops(pool_size: usize, max_len: usize) -> impl Strategy<Value = Vec<LedgerOp>> {
    prop::collection::vec(ledger_op(pool_size), 0..=max_len)
}
