//! The central algorithm: fixed-point fill computation, fee/burn/rebate
//! calculation, transfer emission, and per-ring invariant checks for one
//! cyclic chain of `2..=8` orders.

pub mod fees;
pub mod fill;
pub mod payments;

use {
    crate::{
        big_int::BigInt,
        chain_view::{ChainView, Hasher, SignatureVerifier},
        config::Config,
        domain::{
            balances::BalanceBook,
            order::{OrderRef, OrderValidator},
        },
    },
    num::Zero,
    thiserror::Error,
};

/// A per-ring failure. These are localized: the ring is marked invalid and
/// an `InvalidRingEvent` is emitted, but the batch continues.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    #[error("ring size {0} is outside [2, 8]")]
    SizeOutOfBounds(usize),
    #[error("order {0} sells the same token as another order in the ring")]
    SubRing(usize),
    #[error("order {0}'s tokenS does not match its predecessor's tokenB")]
    TokenChainMismatch(usize),
    #[error("some order in the ring is invalid")]
    ContainsInvalidOrder,
    #[error("resize made a fill amount negative at index {0}")]
    InfeasibleResize(usize),
    #[error("order {0}'s fee exceeds its spendable fee balance")]
    InfeasibleFee(usize),
    #[error("order {0}'s margin would be negative")]
    NegativeMargin(usize),
    #[error("miner-fee waive sum exceeds the fee percentage base")]
    WaiveSumExceedsBase,
    #[error("order {0}'s ERC1400 canSend probe was refused")]
    CanSendRefused(usize),
}

/// A single order's slot inside a ring.
#[derive(Debug, Clone)]
pub struct Participation {
    pub order: OrderRef,
    pub fill_amount_s: BigInt,
    pub fill_amount_b: BigInt,
    pub split_s: BigInt,
    pub fee_amount: BigInt,
    pub fee_amount_s: BigInt,
    pub fee_amount_b: BigInt,
    pub rebate_fee: BigInt,
    pub rebate_s: BigInt,
    pub rebate_b: BigInt,
    pub ring_spendable_s: BigInt,
    pub ring_spendable_fee: BigInt,
}

impl Participation {
    pub fn new(order: OrderRef) -> Self {
        Self {
            order,
            fill_amount_s: BigInt::zero(),
            fill_amount_b: BigInt::zero(),
            split_s: BigInt::zero(),
            fee_amount: BigInt::zero(),
            fee_amount_s: BigInt::zero(),
            fee_amount_b: BigInt::zero(),
            rebate_fee: BigInt::zero(),
            rebate_s: BigInt::zero(),
            rebate_b: BigInt::zero(),
            ring_spendable_s: BigInt::zero(),
            ring_spendable_fee: BigInt::zero(),
        }
    }
}

/// A cyclic chain of `2..=8` orders: participation `i` sells to
/// participation `i-1 (mod n)` and buys from `i+1 (mod n)`.
#[derive(Debug, Clone)]
pub struct Ring {
    pub participations: Vec<Participation>,
    pub hash: [u8; 32],
    pub valid: bool,
    /// Sum of `-waiveFeePercentage` over participations with a negative
    /// waive, accumulated during [`fees::calculate_fees`]. Expressed in the
    /// same base as every other percentage (`Config::fee_percentage_base`).
    pub miner_fees_to_orders_percentage: i64,
    pub fee_balances: BalanceBook,
    /// Diagnostic only - not part of the egress schema (which only reports
    /// `ringHash` for an invalidated ring), but threaded through for
    /// `tracing::warn!` call sites.
    pub invalid_reason: Option<InvalidReason>,
}

impl Ring {
    pub fn new(participations: Vec<Participation>, hash: [u8; 32]) -> Self {
        Self {
            participations,
            hash,
            valid: true,
            miner_fees_to_orders_percentage: 0,
            fee_balances: BalanceBook::new(),
            invalid_reason: None,
        }
    }

    pub fn len(&self) -> usize {
        self.participations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participations.is_empty()
    }

    fn prev_index(&self, i: usize) -> usize {
        (i + self.participations.len() - 1) % self.participations.len()
    }

    /// Structural checks that only ever need to run once: ring size bounds,
    /// the `tokenS[i] == tokenB[i-1]` chain, matching token types, and no
    /// sub-ring (two orders sharing `tokenS`).
    pub fn check_for_sub_rings(&mut self, config: &Config) {
        let n = self.participations.len();
        if n < config.min_ring_size || n > config.max_ring_size {
            self.invalidate(InvalidReason::SizeOutOfBounds(n));
            return;
        }
        let mut seen_token_s = std::collections::HashSet::new();
        for i in 0..n {
            let order = self.participations[i].order.borrow();
            if !seen_token_s.insert(order.token_s) {
                drop(order);
                self.invalidate(InvalidReason::SubRing(i));
                return;
            }
        }
        for i in 0..n {
            let prev = self.prev_index(i);
            let order = self.participations[i].order.borrow();
            let prev_order = self.participations[prev].order.borrow();
            if order.token_s != prev_order.token_b || order.token_type_s != prev_order.token_type_b {
                drop(order);
                drop(prev_order);
                self.invalidate(InvalidReason::TokenChainMismatch(i));
                return;
            }
        }
    }

    /// Re-derives `self.valid` from the current validity of every
    /// participating order. Monotone: once `false`, a ring never becomes
    /// `true` again.
    pub fn check_orders_valid(&mut self) {
        if !self.valid {
            return;
        }
        let all_valid = self.participations.iter().all(|p| p.order.borrow().valid);
        if !all_valid {
            self.valid = false;
        }
    }

    fn invalidate(&mut self, reason: InvalidReason) {
        self.valid = false;
        self.invalid_reason.get_or_insert(reason);
        tracing::warn!(ring_hash = %hex::encode(self.hash), %reason, "ring invalidated");
    }

    /// `order.filledAmountS += fillAmountS + splitS` and spendable
    /// drawdowns for every participation. All updated amounts must remain
    /// `>= 0` and `filledAmountS <= amountS` - a violation here means the
    /// fill computation above this call has a bug, so it is asserted rather
    /// than handled as a recoverable error.
    pub fn adjust_order_states<C, H, S>(&self, validator: &OrderValidator<C, H, S>)
    where
        C: ChainView,
        H: Hasher,
        S: SignatureVerifier,
    {
        for p in &self.participations {
            let mut order = p.order.borrow_mut();
            let spent_s = &p.fill_amount_s + &p.split_s;
            order.filled_amount_s += &spent_s;
            debug_assert!(order.filled_amount_s <= order.amount_s);
            debug_assert!(order.filled_amount_s >= BigInt::zero());
            order.token_spendable_s.amount -= &spent_s;
            order.token_spendable_fee.amount -= &p.fee_amount;
            if let Some(shared) = order.broker_spendable_s.clone() {
                shared.borrow_mut().amount -= &spent_s;
            }
            if let Some(shared) = order.broker_spendable_fee.clone() {
                shared.borrow_mut().amount -= &p.fee_amount;
            }
            drop(order);
            validator.reset_reservations(&mut p.order.borrow_mut());
        }
    }

    /// The inverse of [`Self::adjust_order_states`], used when
    /// [`super::all_or_none::AllOrNoneResolver`] invalidates a
    /// previously-valid ring.
    pub fn revert_order_stats(&self) {
        for p in &self.participations {
            let mut order = p.order.borrow_mut();
            let spent_s = &p.fill_amount_s + &p.split_s;
            order.filled_amount_s -= &spent_s;
            order.token_spendable_s.amount += &spent_s;
            order.token_spendable_fee.amount += &p.fee_amount;
            if let Some(shared) = order.broker_spendable_s.clone() {
                shared.borrow_mut().amount += &spent_s;
            }
            if let Some(shared) = order.broker_spendable_fee.clone() {
                shared.borrow_mut().amount += &p.fee_amount;
            }
        }
    }
}
