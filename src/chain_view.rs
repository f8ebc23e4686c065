//! The read-only façade onto on-chain state, and the cryptographic seams,
//! that the core consumes but never implements.
//!
//! Everything in this module is a trait: a real embedding (the reference
//! oracle, or a miner's pre-flight tool) provides an implementation backed
//! by an RPC client or a local node snapshot. For tests, see
//! `tests/support` for an in-memory fake.

use crate::{address::Address, big_int::BigInt, token::TokenType};

/// A single hash primitive, injected rather than hard-coded, since
/// cryptographic primitives are out of scope for the core. A real caller injects
/// Keccak256 to match the on-chain consensus hash; this crate ships a
/// `sha2`-backed implementation (see [`Sha256Hasher`]) for tests and
/// non-consensus-critical callers.
pub trait Hasher {
    fn hash(&self, data: &[u8]) -> [u8; 32];
}

/// Verifies that `signature` was produced by `signer` over `hash`.
pub trait SignatureVerifier {
    fn verify(&self, signer: Address, hash: &[u8; 32], signature: &[u8]) -> bool;
}

/// The result of an ERC1400 `canSend` probe: a status code (success iff in
/// [`crate::config::Config::can_send_success_codes`]) and the destination
/// tranche the token contract wants the transfer redirected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanSendResult {
    pub status: u8,
    pub dest_tranche: Address,
}

/// Read-only access to on-chain state: `TradeDelegate`, `FeeHolder`,
/// `BurnRateTable`, `BrokerRegistry`, and ERC20/ERC1400 balance/allowance
/// probes, all folded into one façade since the core only ever reads
/// through it, never writes. Every method must be a pure function of the
/// chain snapshot the façade was constructed against - repeated calls with
/// the same arguments must return the same result within one simulation.
pub trait ChainView {
    /// One entry per queried order hash, in the same order as the input.
    /// An entry equal to [`crate::big_int::cancelled_sentinel`] means the
    /// order was cancelled; otherwise the entry is the order's already-filled
    /// `amountS`.
    fn batch_get_filled_and_check_cancelled(&self, order_hashes: &[[u8; 32]]) -> Vec<BigInt>;

    /// `TradeDelegate.filled(orderHash)`.
    fn filled(&self, order_hash: &[u8; 32]) -> BigInt;

    /// `FeeHolder.feeBalances(token, holder)`.
    fn fee_balance(&self, token: Address, holder: Address) -> BigInt;

    /// `BurnRateTable.getBurnRate(token)`: low 16 bits are the non-P2P rate,
    /// high 16 bits are the P2P rate.
    fn get_burn_rate(&self, token: Address) -> u32;

    /// `BrokerRegistry.get(broker, owner)`. `None` if unregistered.
    fn broker_get(&self, broker: Address, owner: Address) -> Option<Address>;

    /// The live spendable amount for `owner` over `token` (ERC20: plain
    /// balance ∧ allowance; ERC1400: the partition named by `tranche`),
    /// with no reservation already subtracted - callers apply
    /// [`crate::domain::order::Spendable`] reservations on top.
    fn token_spendable(
        &self,
        token_type: TokenType,
        token: Address,
        tranche: Address,
        owner: Address,
    ) -> BigInt;

    /// `ERC1400(token).canSend(from, to, fromTranche, amount, data)`.
    #[allow(clippy::too_many_arguments)]
    fn erc1400_can_send(
        &self,
        token: Address,
        from: Address,
        to: Address,
        from_tranche: Address,
        amount: &BigInt,
        data: &[u8],
    ) -> CanSendResult;
}

/// A reference [`Hasher`] backed by SHA-256. Not consensus-exact (the
/// on-chain contracts use Keccak256); suitable for tests and for
/// applications that only need a stable, collision-resistant order hash.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn hash(&self, data: &[u8]) -> [u8; 32] {
        use sha2::Digest;
        let mut hasher = sha2::Sha256::new();
        hasher.update(data);
        hasher.finalize().into()
    }
}

/// A [`SignatureVerifier`] that accepts every signature. Useful for
/// simulations that only care about fill/fee arithmetic and supply
/// already-validated orders.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysValidSignatureVerifier;

impl SignatureVerifier for AlwaysValidSignatureVerifier {
    fn verify(&self, _signer: Address, _hash: &[u8; 32], _signature: &[u8]) -> bool {
        true
    }
}
