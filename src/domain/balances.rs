//! A sparse, triple-keyed (owner, token, tranche) additive accumulator.
//!
//! Used both as the ring-local fee/burn ledger ([`super::ring::Ring::fee_balances`])
//! and as the engine-wide before/after balance snapshots in
//! [`crate::report::SimulatorReport`].

use {
    crate::{address::Address, big_int::BigInt},
    num::Zero,
    std::collections::BTreeMap,
};

/// `(owner, token, tranche)`. `BTreeMap` keys on this tuple directly so
/// iteration order - and therefore report serialization - is deterministic
/// without a separate sort pass.
pub type Key = (Address, Address, Address);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceEntry {
    pub owner: Address,
    pub token: Address,
    pub tranche: Address,
}

impl BalanceEntry {
    pub fn key(&self) -> Key {
        (self.owner, self.token, self.tranche)
    }
}

/// A mapping `(owner, token, tranche) -> BigInt`, defaulting absent triples
/// to zero. Insertion order is not observable; [`Self::enumerate`] always
/// walks the keys in sorted order.
#[derive(Debug, Clone, Default)]
pub struct BalanceBook {
    balances: BTreeMap<Key, BigInt>,
}

impl BalanceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the triple at zero if absent, then adds `delta` (which may be
    /// negative).
    pub fn add(&mut self, owner: Address, token: Address, tranche: Address, delta: &BigInt) {
        let entry = self.balances.entry((owner, token, tranche)).or_insert_with(BigInt::zero);
        *entry += delta;
    }

    pub fn get(&self, owner: Address, token: Address, tranche: Address) -> BigInt {
        self.balances.get(&(owner, token, tranche)).cloned().unwrap_or_else(BigInt::zero)
    }

    /// True iff the triple was ever written, including an explicit zero -
    /// distinct from `get(..) == 0`, which is also true for triples never
    /// touched at all.
    pub fn is_known(&self, owner: Address, token: Address, tranche: Address) -> bool {
        self.balances.contains_key(&(owner, token, tranche))
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn enumerate(&self) -> Vec<(BalanceEntry, BigInt)> {
        self.balances
            .iter()
            .map(|(&(owner, token, tranche), amount)| (BalanceEntry { owner, token, tranche }, amount.clone()))
            .collect()
    }

    /// The set of distinct tokens that appear in any known triple.
    pub fn tokens(&self) -> std::collections::BTreeSet<Address> {
        self.balances.keys().map(|&(_, token, _)| token).collect()
    }

    /// All tokens that appear in `self` or `other`, per the "union of token
    /// sets" reading of `validateSettlement`'s key iteration.
    pub fn union_tokens(&self, other: &Self) -> std::collections::BTreeSet<Address> {
        let mut tokens = self.tokens();
        tokens.extend(other.tokens());
        tokens
    }
}
