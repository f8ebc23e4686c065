//! A single order and its mutable settlement-time state.

pub mod validator;

pub use validator::OrderValidator;

use {
    crate::{address::Address, big_int::BigInt, token::TokenType},
    num::Zero,
    std::{cell::RefCell, rc::Rc},
};

/// A cached query of how much of a token an owner can spend via a given
/// path. `amount - reserved` is the live budget; `initial_amount` freezes
/// the starting value for invariant checks across the lifetime of one
/// settlement.
#[derive(Debug, Clone)]
pub struct Spendable {
    pub initialized: bool,
    pub amount: BigInt,
    pub reserved: BigInt,
    pub initial_amount: BigInt,
}

impl Default for Spendable {
    fn default() -> Self {
        Self {
            initialized: false,
            amount: BigInt::zero(),
            reserved: BigInt::zero(),
            initial_amount: BigInt::zero(),
        }
    }
}

impl Spendable {
    pub fn initialize(&mut self, amount: BigInt) {
        self.amount = amount.clone();
        self.initial_amount = amount;
        self.initialized = true;
    }

    /// The currently-live budget: `amount - reserved`.
    pub fn live(&self) -> BigInt {
        &self.amount - &self.reserved
    }

    pub fn reserve(&mut self, delta: &BigInt) {
        self.reserved += delta;
    }

    pub fn reset_reservation(&mut self) {
        self.reserved = BigInt::zero();
    }
}

/// A `Spendable` potentially shared by reference across every order that
/// reuses the same `(broker, owner, token)` triple in one batch, so that
/// reservations against it interact correctly.
pub type SharedSpendable = Rc<RefCell<Spendable>>;

/// Shared, mutable ownership of an order: a ring only ever holds an index
/// into the batch's order list, but since `AllOrNoneResolver` and the
/// engine both need to mutate the same `OrderInfo` from rings that
/// reference it, participations hold a clone of this handle rather than a
/// borrow.
pub type OrderRef = Rc<RefCell<OrderInfo>>;

/// Why [`OrderInfo::valid`] was set to `false`. Diagnostic only - order
/// invalidation is a state transition, not an error that aborts the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    ValidSinceInFuture,
    ValidUntilInPast,
    ZeroAmountS,
    ZeroAmountB,
    FeeTokenMissing,
    OwnerMissing,
    BrokerNotRegistered,
    BrokerSignatureInvalid,
    DualAuthSignatureInvalid,
    Cancelled,
    AllOrNoneNotFullyFilled,
}

/// A single order, plus the mutable settlement-time state the engine
/// accumulates on top of it (`valid`, `filled_amount_s`, spendable caches,
/// hash).
#[derive(Debug, Clone)]
pub struct OrderInfo {
    pub owner: Address,
    pub token_recipient: Address,
    pub broker: Option<Address>,
    pub broker_interceptor: Option<Address>,
    pub wallet_addr: Option<Address>,

    pub token_s: Address,
    pub token_b: Address,
    pub fee_token: Address,

    pub amount_s: BigInt,
    pub amount_b: BigInt,
    pub fee_amount: BigInt,

    pub tranche_s: Address,
    pub tranche_b: Address,
    pub tranche_fee: Address,

    pub token_type_s: TokenType,
    pub token_type_b: TokenType,
    pub token_type_fee: TokenType,

    pub transfer_data_s: Vec<u8>,

    pub valid_since: u64,
    pub valid_until: u64,

    pub all_or_none: bool,

    pub fee_percentage: u32,
    pub token_s_fee_percentage: u32,
    pub token_b_fee_percentage: u32,
    pub wallet_split_percentage: u32,
    /// Signed: positive means this order pays extra miner fee; negative
    /// means it instead *receives* a share of other orders' miner fees.
    pub waive_fee_percentage: i32,

    pub broker_signature: Option<Vec<u8>>,
    pub dual_auth_signature: Option<Vec<u8>>,
    pub dual_auth_addr: Option<Address>,

    // Mutable settlement-time state.
    pub hash: [u8; 32],
    pub valid: bool,
    pub invalid_reason: Option<InvalidReason>,
    pub filled_amount_s: BigInt,
    pub token_spendable_s: Spendable,
    pub token_spendable_fee: Spendable,
    pub broker_spendable_s: Option<SharedSpendable>,
    pub broker_spendable_fee: Option<SharedSpendable>,
}

impl OrderInfo {
    /// `tokenSFeePercentage>0 || tokenBFeePercentage>0`.
    pub fn is_p2p(&self) -> bool {
        self.token_s_fee_percentage > 0 || self.token_b_fee_percentage > 0
    }

    pub fn invalidate(&mut self, reason: InvalidReason) {
        self.valid = false;
        self.invalid_reason.get_or_insert(reason);
    }

    pub fn remaining_amount_s(&self) -> BigInt {
        &self.amount_s - &self.filled_amount_s
    }
}
