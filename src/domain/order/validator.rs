//! Stateless validation, hashing, and spendable-query helpers over an
//! [`OrderInfo`] and a [`ChainView`] snapshot.

use {
    super::{InvalidReason, OrderInfo, SharedSpendable, Spendable},
    crate::{
        address::Address,
        big_int::{BigInt, min},
        chain_view::{ChainView, Hasher, SignatureVerifier},
        token::TokenType,
    },
    num::Zero,
};

/// Bundles the collaborators `OrderInfo` validation needs: a chain
/// snapshot, a hash primitive, a signature verifier, and the timestamp the
/// batch is being evaluated at. Borrowed for the lifetime of one
/// `simulate` call.
pub struct OrderValidator<'a, C, H, S> {
    pub chain: &'a C,
    pub hasher: &'a H,
    pub sig: &'a S,
    pub now: u64,
}

impl<'a, C, H, S> OrderValidator<'a, C, H, S>
where
    C: ChainView,
    H: Hasher,
    S: SignatureVerifier,
{
    pub fn new(chain: &'a C, hasher: &'a H, sig: &'a S, now: u64) -> Self {
        Self { chain, hasher, sig, now }
    }

    /// Sets `order.valid=false` on an expired validity window, zero
    /// amounts, or a missing fee token/owner.
    pub fn validate_info(&self, order: &mut OrderInfo) {
        if order.valid_since > self.now {
            order.invalidate(InvalidReason::ValidSinceInFuture);
        }
        if order.valid_until <= self.now {
            order.invalidate(InvalidReason::ValidUntilInPast);
        }
        if order.amount_s.is_zero() {
            order.invalidate(InvalidReason::ZeroAmountS);
        }
        if order.amount_b.is_zero() {
            order.invalidate(InvalidReason::ZeroAmountB);
        }
        if order.fee_token.is_zero() {
            order.invalidate(InvalidReason::FeeTokenMissing);
        }
        if order.owner.is_zero() {
            order.invalidate(InvalidReason::OwnerMissing);
        }
    }

    /// Marking is derivable (`is_p2p`), but kept as an explicit step so the
    /// ring/fee code never has to recompute it; nothing to invalidate here.
    pub fn check_p2p(&self, _order: &OrderInfo) -> bool {
        _order.is_p2p()
    }

    /// Deterministic hash over the canonical order fields. Two orders with
    /// identical economically-relevant fields hash identically regardless
    /// of mutable settlement-time state (`valid`, `filled_amount_s`, ...).
    pub fn compute_hash(&self, order: &OrderInfo) -> [u8; 32] {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&order.owner.0);
        buf.extend_from_slice(&order.token_recipient.0);
        buf.extend_from_slice(&order.token_s.0);
        buf.extend_from_slice(&order.token_b.0);
        buf.extend_from_slice(&order.fee_token.0);
        buf.extend_from_slice(&order.amount_s.to_signed_bytes_be());
        buf.extend_from_slice(&order.amount_b.to_signed_bytes_be());
        buf.extend_from_slice(&order.fee_amount.to_signed_bytes_be());
        buf.extend_from_slice(&order.tranche_s.0);
        buf.extend_from_slice(&order.tranche_b.0);
        buf.extend_from_slice(&order.tranche_fee.0);
        buf.extend_from_slice(&order.valid_since.to_be_bytes());
        buf.extend_from_slice(&order.valid_until.to_be_bytes());
        buf.push(order.all_or_none as u8);
        buf.extend_from_slice(&order.fee_percentage.to_be_bytes());
        buf.extend_from_slice(&order.token_s_fee_percentage.to_be_bytes());
        buf.extend_from_slice(&order.token_b_fee_percentage.to_be_bytes());
        buf.extend_from_slice(&order.wallet_split_percentage.to_be_bytes());
        buf.extend_from_slice(&order.waive_fee_percentage.to_be_bytes());
        buf.extend_from_slice(&order.transfer_data_s);
        self.hasher.hash(&buf)
    }

    /// If `broker` is present, queries the broker registry and marks the
    /// order invalid if it isn't registered.
    pub fn resolve_broker(&self, order: &mut OrderInfo) {
        if let Some(broker) = order.broker {
            match self.chain.broker_get(broker, order.owner) {
                Some(interceptor) => order.broker_interceptor = Some(interceptor),
                None => order.invalidate(InvalidReason::BrokerNotRegistered),
            }
        }
    }

    pub fn check_broker_signature(&self, order: &mut OrderInfo) {
        if let (Some(broker), Some(signature)) = (order.broker, order.broker_signature.as_ref()) {
            if !self.sig.verify(broker, &order.hash, signature) {
                order.invalidate(InvalidReason::BrokerSignatureInvalid);
            }
        }
    }

    pub fn check_dual_auth_signature(&self, order: &mut OrderInfo) {
        if let (Some(dual_auth_addr), Some(signature)) =
            (order.dual_auth_addr, order.dual_auth_signature.as_ref())
        {
            if !self.sig.verify(dual_auth_addr, &order.hash, signature) {
                order.invalidate(InvalidReason::DualAuthSignatureInvalid);
            }
        }
    }

    /// Fatal on mismatch - see [`crate::domain::settlement`], which is the
    /// only caller (mining signatures authenticate the whole batch, not a
    /// single order).
    pub fn check_miner_signature(&self, miner: Address, hash: &[u8; 32], signature: &[u8]) -> bool {
        self.sig.verify(miner, hash, signature)
    }

    /// The live spendable for `order`'s sell leg, lazily caching the first
    /// query. If a broker interceptor is present, the effective spendable is
    /// `min(token-path, broker-path)`.
    pub fn get_spendable_s(&self, order: &mut OrderInfo) -> BigInt {
        self.get_token_spendable_cached(
            order.token_type_s,
            order.token_s,
            order.tranche_s,
            order.owner,
            true,
            order,
        )
    }

    pub fn get_spendable_fee(&self, order: &mut OrderInfo) -> BigInt {
        self.get_token_spendable_cached(
            order.token_type_fee,
            order.fee_token,
            order.tranche_fee,
            order.owner,
            false,
            order,
        )
    }

    fn get_token_spendable_cached(
        &self,
        token_type: TokenType,
        token: Address,
        tranche: Address,
        owner: Address,
        is_sell_leg: bool,
        order: &mut OrderInfo,
    ) -> BigInt {
        let broker = order.broker;
        let broker_interceptor = order.broker_interceptor;
        let cache = if is_sell_leg { &mut order.token_spendable_s } else { &mut order.token_spendable_fee };
        if !cache.initialized {
            cache.initialize(self.get_token_spendable(token_type, token, tranche, owner));
        }
        let token_path = cache.live();

        let shared = if is_sell_leg { &mut order.broker_spendable_s } else { &mut order.broker_spendable_fee };
        match (broker, broker_interceptor, shared) {
            (Some(_), Some(interceptor), Some(broker_spendable)) => {
                let mut broker_spendable = broker_spendable.borrow_mut();
                if !broker_spendable.initialized {
                    broker_spendable
                        .initialize(self.get_token_spendable(token_type, token, tranche, interceptor));
                }
                min(&token_path, &broker_spendable.live())
            }
            _ => token_path,
        }
    }

    /// `ChainView.token_spendable`: balance ∧ allowance for `(tokenType,
    /// token, tranche, owner)`.
    pub fn get_token_spendable(
        &self,
        token_type: TokenType,
        token: Address,
        tranche: Address,
        owner: Address,
    ) -> BigInt {
        self.chain.token_spendable(token_type, token, tranche, owner)
    }

    pub fn reserve_amount_s(&self, order: &mut OrderInfo, amount: &BigInt) {
        order.token_spendable_s.reserve(amount);
        if let Some(shared) = &order.broker_spendable_s {
            shared.borrow_mut().reserve(amount);
        }
    }

    pub fn reserve_amount_fee(&self, order: &mut OrderInfo, amount: &BigInt) {
        order.token_spendable_fee.reserve(amount);
        if let Some(shared) = &order.broker_spendable_fee {
            shared.borrow_mut().reserve(amount);
        }
    }

    /// Reservations are scoped to one ring's fill computation; the ring
    /// clears them once it has decided feasibility.
    pub fn reset_reservations(&self, order: &mut OrderInfo) {
        order.token_spendable_s.reset_reservation();
        order.token_spendable_fee.reset_reservation();
        if let Some(shared) = &order.broker_spendable_s {
            shared.borrow_mut().reset_reservation();
        }
        if let Some(shared) = &order.broker_spendable_fee {
            shared.borrow_mut().reset_reservation();
        }
    }

    /// Sets `order.valid=false` if `allOrNone` and the order isn't fully
    /// filled after settlement planning.
    pub fn validate_all_or_none(&self, order: &mut OrderInfo) {
        if order.all_or_none && order.filled_amount_s < order.amount_s {
            order.invalidate(InvalidReason::AllOrNoneNotFullyFilled);
        }
    }
}

/// Constructs a [`SharedSpendable`] initialized lazily on first use -
/// shared across every order in a batch that reuses the same
/// `(broker, owner, token)` triple.
pub fn new_shared_spendable() -> SharedSpendable {
    std::rc::Rc::new(std::cell::RefCell::new(Spendable::default()))
}
