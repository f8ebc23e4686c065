//! An in-memory [`ChainView`] fake plus an [`OrderInfo`] builder, shared by
//! the settlement scenario tests in `tests/settlement.rs`.

#![allow(dead_code)]

use {
    ring_settlement_core::{
        chain_view::{CanSendResult, ChainView},
        Address, BigInt, OrderInfo, TokenType,
    },
    std::collections::HashMap,
};

pub fn addr(byte: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[19] = byte;
    Address(bytes)
}

/// Enables `tracing` output (ring/order invalidation warnings) under
/// `cargo test -- --nocapture`. Idempotent: later calls across the test
/// binary's other scenarios are no-ops once a subscriber is installed.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().with_env_filter("debug").try_init();
}

/// A read-only chain snapshot backed by plain maps, populated by a test
/// before constructing a [`ring_settlement_core::SettlementEngine`]. Since
/// `ChainView` methods only ever read, no interior mutability is needed -
/// every map is filled in before the first `simulate` call.
#[derive(Debug, Default, Clone)]
pub struct FakeChainView {
    /// `(token, tranche, owner) -> spendable amount`.
    balances: HashMap<(Address, Address, Address), BigInt>,
    fee_balances: HashMap<(Address, Address), BigInt>,
    burn_rates: HashMap<Address, u32>,
    brokers: HashMap<(Address, Address), Address>,
    /// `(token, owner) -> canSend response`, checked at the selling owner's
    /// tranche. Absent entries default to a pass-through at the same
    /// tranche, matching an ERC20-like token that never redirects.
    can_send: HashMap<(Address, Address), CanSendResult>,
}

impl FakeChainView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(mut self, token: Address, tranche: Address, owner: Address, amount: i64) -> Self {
        self.balances.insert((token, tranche, owner), BigInt::from(amount));
        self
    }

    pub fn with_burn_rate(mut self, token: Address, rate: u32) -> Self {
        self.burn_rates.insert(token, rate);
        self
    }

    pub fn with_broker(mut self, broker: Address, owner: Address, interceptor: Address) -> Self {
        self.brokers.insert((broker, owner), interceptor);
        self
    }

    pub fn with_can_send(mut self, token: Address, owner: Address, status: u8, dest_tranche: Address) -> Self {
        self.can_send.insert((token, owner), CanSendResult { status, dest_tranche });
        self
    }
}

impl ChainView for FakeChainView {
    fn batch_get_filled_and_check_cancelled(&self, order_hashes: &[[u8; 32]]) -> Vec<BigInt> {
        // Every test order starts fresh (never partially filled, never
        // cancelled): return a fresh-order marker of zero for each.
        order_hashes.iter().map(|_| BigInt::from(0)).collect()
    }

    fn filled(&self, _order_hash: &[u8; 32]) -> BigInt {
        BigInt::from(0)
    }

    fn fee_balance(&self, token: Address, holder: Address) -> BigInt {
        self.fee_balances.get(&(token, holder)).cloned().unwrap_or_else(|| BigInt::from(0))
    }

    fn get_burn_rate(&self, token: Address) -> u32 {
        self.burn_rates.get(&token).copied().unwrap_or(0)
    }

    fn broker_get(&self, broker: Address, owner: Address) -> Option<Address> {
        self.brokers.get(&(broker, owner)).copied()
    }

    fn token_spendable(&self, _token_type: TokenType, token: Address, tranche: Address, owner: Address) -> BigInt {
        self.balances.get(&(token, tranche, owner)).cloned().unwrap_or_else(|| BigInt::from(0))
    }

    fn erc1400_can_send(
        &self,
        token: Address,
        from: Address,
        _to: Address,
        from_tranche: Address,
        _amount: &BigInt,
        _data: &[u8],
    ) -> CanSendResult {
        self.can_send
            .get(&(token, from))
            .copied()
            .unwrap_or(CanSendResult { status: 0xa0, dest_tranche: from_tranche })
    }
}

/// A fluent builder over [`OrderInfo`], defaulting every field to the
/// "unremarkable ERC20 order with no fee, no broker, no tranche" case so
/// each scenario only sets what it cares about.
pub struct OrderBuilder {
    order: OrderInfo,
}

impl OrderBuilder {
    pub fn new(owner: Address, token_s: Address, amount_s: i64, token_b: Address, amount_b: i64) -> Self {
        Self {
            order: OrderInfo {
                owner,
                token_recipient: owner,
                broker: None,
                broker_interceptor: None,
                wallet_addr: None,
                token_s,
                token_b,
                fee_token: addr(250),
                amount_s: BigInt::from(amount_s),
                amount_b: BigInt::from(amount_b),
                fee_amount: BigInt::from(0),
                tranche_s: Address::ZERO,
                tranche_b: Address::ZERO,
                tranche_fee: Address::ZERO,
                token_type_s: TokenType::Erc20,
                token_type_b: TokenType::Erc20,
                token_type_fee: TokenType::Erc20,
                transfer_data_s: vec![],
                valid_since: 0,
                valid_until: u64::MAX,
                all_or_none: false,
                fee_percentage: 0,
                token_s_fee_percentage: 0,
                token_b_fee_percentage: 0,
                wallet_split_percentage: 0,
                waive_fee_percentage: 0,
                broker_signature: None,
                dual_auth_signature: None,
                dual_auth_addr: None,
                hash: [0u8; 32],
                valid: true,
                invalid_reason: None,
                filled_amount_s: BigInt::from(0),
                token_spendable_s: Default::default(),
                token_spendable_fee: Default::default(),
                broker_spendable_s: None,
                broker_spendable_fee: None,
            },
        }
    }

    pub fn fee(mut self, fee_token: Address, fee_amount: i64) -> Self {
        self.order.fee_token = fee_token;
        self.order.fee_amount = BigInt::from(fee_amount);
        self
    }

    pub fn wallet(mut self, wallet: Address, split_percentage: u32) -> Self {
        self.order.wallet_addr = Some(wallet);
        self.order.wallet_split_percentage = split_percentage;
        self
    }

    pub fn waive(mut self, waive_fee_percentage: i32) -> Self {
        self.order.waive_fee_percentage = waive_fee_percentage;
        self
    }

    pub fn p2p(mut self, token_s_fee_percentage: u32, token_b_fee_percentage: u32) -> Self {
        self.order.token_s_fee_percentage = token_s_fee_percentage;
        self.order.token_b_fee_percentage = token_b_fee_percentage;
        self
    }

    pub fn all_or_none(mut self) -> Self {
        self.order.all_or_none = true;
        self
    }

    pub fn tranche_s(mut self, tranche: Address) -> Self {
        self.order.tranche_s = tranche;
        self
    }

    pub fn tranche_b(mut self, tranche: Address) -> Self {
        self.order.tranche_b = tranche;
        self
    }

    pub fn erc1400_s(mut self) -> Self {
        self.order.token_type_s = TokenType::Erc1400;
        self
    }

    pub fn erc1400_b(mut self) -> Self {
        self.order.token_type_b = TokenType::Erc1400;
        self
    }

    pub fn build(self) -> OrderInfo {
        self.order
    }
}
