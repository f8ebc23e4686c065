//! The egress side of a simulation: `SimulatorReport` and its constituent
//! types.

use {
    crate::{address::Address, big_int::BigInt, domain::balances::BalanceBook, token::TokenType},
    serde::{Deserialize, Serialize},
};

/// A single token movement a consensus settlement transaction would
/// perform. `fromTranche`/`toTranche` are both the zero address for ERC20;
/// for ERC1400, `toTranche` may differ from `fromTranche` per the token's
/// `canSend` redirect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferItem {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    #[serde(with = "crate::report::bigint_decimal")]
    pub amount: BigInt,
    pub token_type: TokenType,
    pub from_tranche: Address,
    pub to_tranche: Address,
    pub data: Option<Vec<u8>>,
}

impl TransferItem {
    /// The tuple transfers are merged on: identical `(token, from, to,
    /// tokenType, fromTranche, data)` collapse by summing `amount`.
    fn merge_key(&self) -> (Address, Address, Address, TokenType, Address, Option<Vec<u8>>) {
        (self.token, self.from, self.to, self.token_type, self.from_tranche, self.data.clone())
    }
}

/// Merges transfers sharing `(token, from, to, tokenType, fromTranche,
/// data)` by summing `amount`. Associative and commutative in `amount`, so
/// callers may merge incrementally (per ring) or all at once.
pub fn merge_transfers(mut transfers: Vec<TransferItem>) -> Vec<TransferItem> {
    use itertools::Itertools;

    transfers.sort_by_key(TransferItem::merge_key);
    transfers
        .into_iter()
        .chunk_by(TransferItem::merge_key)
        .into_iter()
        .map(|(_key, group)| {
            // `to_tranche` is not part of the merge key, but two transfers
            // that share the key should also share it in
            // practice (it's determined by the same canSend probe); keep
            // the first one seen and sum the rest into its amount.
            let mut group = group;
            let mut merged = group.next().expect("group contains at least 1 transfer");
            for transfer in group {
                merged.amount += transfer.amount;
            }
            merged
        })
        .collect()
}

/// A single order's contribution to a mined ring, for the `RingMined`
/// event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_hash: [u8; 32],
    pub owner: Address,
    pub token_s: Address,
    #[serde(with = "crate::report::bigint_decimal")]
    pub amount_s: BigInt,
    #[serde(with = "crate::report::bigint_decimal")]
    pub split: BigInt,
    /// For non-P2P orders this is `feeAmount + feeAmountB` (the two
    /// non-P2P fee legs collapsed into one reported figure); for P2P
    /// orders `feeAmount` is always zero so this is just `feeAmountB`.
    #[serde(with = "crate::report::bigint_decimal")]
    pub fee_amount: BigInt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingMined {
    pub ring_index: u64,
    pub ring_hash: [u8; 32],
    pub fee_recipient: Address,
    pub fills: Vec<Fill>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InvalidRingEvent {
    pub ring_hash: [u8; 32],
}

/// A per-participation fee/rebate/margin summary for one settled ring,
/// kept alongside the flat `transfer_items` list for callers that want to
/// reason about a ring's economics without re-deriving them from
/// transfers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingPayment {
    pub ring_hash: [u8; 32],
    pub order_hash: [u8; 32],
    #[serde(with = "crate::report::bigint_decimal")]
    pub fee_amount: BigInt,
    #[serde(with = "crate::report::bigint_decimal")]
    pub fee_amount_s: BigInt,
    #[serde(with = "crate::report::bigint_decimal")]
    pub fee_amount_b: BigInt,
    #[serde(with = "crate::report::bigint_decimal")]
    pub rebate_fee: BigInt,
    #[serde(with = "crate::report::bigint_decimal")]
    pub rebate_s: BigInt,
    #[serde(with = "crate::report::bigint_decimal")]
    pub rebate_b: BigInt,
    #[serde(with = "crate::report::bigint_decimal")]
    pub split_s: BigInt,
}

/// A (owner, token, tranche) -> amount snapshot, flattened for
/// serialization (`BalanceBook` itself stays internal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshotEntry {
    pub owner: Address,
    pub token: Address,
    pub tranche: Address,
    #[serde(with = "crate::report::bigint_decimal")]
    pub amount: BigInt,
}

pub fn snapshot(book: &BalanceBook) -> Vec<BalanceSnapshotEntry> {
    book.enumerate()
        .into_iter()
        .map(|(entry, amount)| BalanceSnapshotEntry {
            owner: entry.owner,
            token: entry.token,
            tranche: entry.tranche,
            amount,
        })
        .collect()
}

/// A (orderHash -> filledAmountS) snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilledAmountEntry {
    pub order_hash: [u8; 32],
    #[serde(with = "crate::report::bigint_decimal")]
    pub filled_amount_s: BigInt,
}

/// The full output of one `SettlementEngine::simulate` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulatorReport {
    pub reverted: bool,
    pub ring_mined_events: Vec<RingMined>,
    pub invalid_ring_events: Vec<InvalidRingEvent>,
    pub transfer_items: Vec<TransferItem>,
    pub fee_balances_before: Vec<BalanceSnapshotEntry>,
    pub fee_balances_after: Vec<BalanceSnapshotEntry>,
    pub filled_amounts_before: Vec<FilledAmountEntry>,
    pub filled_amounts_after: Vec<FilledAmountEntry>,
    pub balances_before: Vec<BalanceSnapshotEntry>,
    pub balances_after: Vec<BalanceSnapshotEntry>,
    pub payments: Vec<RingPayment>,
}

/// `BigInt` has no native `serde` impl; every financial figure in the
/// report serializes as a decimal string so large values survive a JSON
/// round-trip without precision loss.
pub mod bigint_decimal {
    use {
        num::BigInt,
        serde::{Deserialize, Deserializer, Serialize, Serializer},
        std::str::FromStr,
    };

    pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        value.to_string().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        let raw = String::deserialize(deserializer)?;
        BigInt::from_str(&raw).map_err(serde::de::Error::custom)
    }
}
