//! The batch driver: validates orders, constructs rings, runs the
//! all-or-none fixed point, performs payments, aggregates a report, and
//! runs the global invariants.

use {
    crate::{
        address::Address,
        big_int::{cancelled_sentinel, BigInt},
        chain_view::{ChainView, Hasher, SignatureVerifier},
        config::Config,
        domain::{
            all_or_none::AllOrNoneResolver,
            balances::BalanceBook,
            order::{validator::new_shared_spendable, OrderInfo, OrderRef, OrderValidator, SharedSpendable},
            ring::{Participation, Ring},
        },
        report::{merge_transfers, snapshot, FilledAmountEntry, Fill, InvalidRingEvent, RingMined, RingPayment, SimulatorReport},
        token::TokenType,
    },
    num::Zero,
    std::{cell::Cell, collections::HashMap},
    thiserror::Error,
};

/// A batch of orders bundled into rings by a miner, ready to be simulated.
#[derive(Debug, Clone)]
pub struct RingsInput {
    pub orders: Vec<OrderInfo>,
    /// Each inner `Vec` is a ring expressed as indices into `orders`.
    pub rings: Vec<Vec<usize>>,
    pub fee_recipient: Option<Address>,
    pub miner: Option<Address>,
    pub sig: Option<Vec<u8>>,
    pub transaction_origin: Address,
}

/// A fatal failure aborts the whole simulation: a corrupt ring index, an
/// invalid miner signature, or a post-simulation invariant breach.
#[derive(Debug, Error)]
pub enum Fatal {
    #[error("ring references order index {0} which is out of bounds")]
    OrderIndexOutOfBounds(usize),
    #[error("miner signature is invalid")]
    InvalidMinerSignature,
    #[error("a miner/feeRecipient is required to check the mining signature")]
    MissingMiner,
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

pub struct SettlementEngine<'a, C, H, S> {
    pub chain: &'a C,
    pub hasher: &'a H,
    pub sig: &'a S,
    pub config: Config,
    pub fee_holder: Address,
    pub now: u64,
    ring_index: Cell<u64>,
}

impl<'a, C, H, S> SettlementEngine<'a, C, H, S>
where
    C: ChainView,
    H: Hasher,
    S: SignatureVerifier,
{
    pub fn new(chain: &'a C, hasher: &'a H, sig: &'a S, config: Config, fee_holder: Address, now: u64) -> Self {
        Self { chain, hasher, sig, config, fee_holder, now, ring_index: Cell::new(0) }
    }

    pub fn simulate(&self, input: RingsInput) -> Result<SimulatorReport, Fatal> {
        let validator = OrderValidator::new(self.chain, self.hasher, self.sig, self.now);

        let orders: Vec<OrderRef> = input
            .orders
            .into_iter()
            .map(|order| std::rc::Rc::new(std::cell::RefCell::new(order)))
            .collect();

        // Preflight: per-order validation, hashing, broker resolution.
        for order in &orders {
            let mut order_mut = order.borrow_mut();
            validator.validate_info(&mut order_mut);
            let _ = validator.check_p2p(&order_mut);
            order_mut.hash = validator.compute_hash(&order_mut);
            validator.resolve_broker(&mut order_mut);
            validator.check_broker_signature(&mut order_mut);
            validator.check_dual_auth_signature(&mut order_mut);
        }

        let filled_amounts_before = self.batch_query_filled_and_cancelled(&orders);

        self.dedup_broker_spendables(&orders);

        let mut rings = self.build_rings(&orders, &input.rings)?;

        let fee_recipient = input.fee_recipient.or(input.miner).ok_or(Fatal::MissingMiner)?;
        let miner = input.miner.unwrap_or(fee_recipient);
        self.check_miner_signature(&validator, &rings, miner, fee_recipient, input.sig.as_deref())?;

        for ring in &mut rings {
            ring.check_orders_valid();
            ring.check_for_sub_rings(&self.config);
            ring.calculate_fill_amount_and_fee(&validator, self.chain, &self.config);
            if ring.valid {
                ring.adjust_order_states(&validator);
            }
        }

        AllOrNoneResolver::resolve(&orders, &mut rings, &validator);

        let mut all_transfers = Vec::new();
        let mut ring_mined_events = Vec::new();
        let mut invalid_ring_events = Vec::new();
        let mut payments = Vec::new();
        let mut engine_fee_balances = BalanceBook::new();

        for ring in &mut rings {
            if !ring.valid {
                invalid_ring_events.push(InvalidRingEvent { ring_hash: ring.hash });
                continue;
            }

            let transfers = ring
                .do_payments(self.chain, &self.config, self.fee_holder, fee_recipient)
                .map_err(|err| Fatal::InvariantViolation(err.to_string()))?;

            let fills = ring
                .participations
                .iter()
                .map(|p| {
                    let order = p.order.borrow();
                    let fee_amount = if order.is_p2p() { p.fee_amount_b.clone() } else { &p.fee_amount + &p.fee_amount_b };
                    Fill {
                        order_hash: order.hash,
                        owner: order.owner,
                        token_s: order.token_s,
                        amount_s: p.fill_amount_s.clone(),
                        split: p.split_s.clone(),
                        fee_amount,
                    }
                })
                .collect();

            for p in &ring.participations {
                let order = p.order.borrow();
                payments.push(RingPayment {
                    ring_hash: ring.hash,
                    order_hash: order.hash,
                    fee_amount: p.fee_amount.clone(),
                    fee_amount_s: p.fee_amount_s.clone(),
                    fee_amount_b: p.fee_amount_b.clone(),
                    rebate_fee: p.rebate_fee.clone(),
                    rebate_s: p.rebate_s.clone(),
                    rebate_b: p.rebate_b.clone(),
                    split_s: p.split_s.clone(),
                });
            }

            let ring_index = self.ring_index.get();
            self.ring_index.set(ring_index + 1);
            ring_mined_events.push(RingMined { ring_index, ring_hash: ring.hash, fee_recipient, fills });

            for (entry, amount) in ring.fee_balances.enumerate() {
                engine_fee_balances.add(entry.owner, entry.token, entry.tranche, &amount);
            }
            all_transfers.extend(transfers);
        }

        let transfer_items = merge_transfers(all_transfers);

        let (balances_before, balances_after) =
            self.build_balance_snapshots(&rings, fee_recipient, &transfer_items);

        let (fee_balances_before, fee_balances_after) = self.build_fee_balance_snapshots(&engine_fee_balances);

        let filled_amounts_after: Vec<FilledAmountEntry> = orders
            .iter()
            .map(|order| {
                let order = order.borrow();
                FilledAmountEntry { order_hash: order.hash, filled_amount_s: order.filled_amount_s.clone() }
            })
            .collect();

        self.validate_rings(&orders, &rings, &transfer_items, &balances_after, &engine_fee_balances, &fee_balances_after)?;

        Ok(SimulatorReport {
            reverted: false,
            ring_mined_events,
            invalid_ring_events,
            transfer_items,
            fee_balances_before: snapshot(&fee_balances_before),
            fee_balances_after: snapshot(&fee_balances_after),
            filled_amounts_before,
            filled_amounts_after,
            balances_before: snapshot(&balances_before),
            balances_after: snapshot(&balances_after),
            payments,
        })
    }

    /// `TradeDelegate.batchGetFilledAndCheckCancelled`: sets
    /// `filled_amount_s` from the chain and invalidates cancelled orders.
    /// Returns the pre-ring-evaluation filled amounts for the report.
    fn batch_query_filled_and_cancelled(&self, orders: &[OrderRef]) -> Vec<FilledAmountEntry> {
        let hashes: Vec<[u8; 32]> = orders.iter().map(|o| o.borrow().hash).collect();
        let results = self.chain.batch_get_filled_and_check_cancelled(&hashes);
        let sentinel = cancelled_sentinel();

        orders
            .iter()
            .zip(results)
            .map(|(order, result)| {
                let mut order_mut = order.borrow_mut();
                if result == sentinel {
                    order_mut.invalidate(crate::domain::order::InvalidReason::Cancelled);
                    FilledAmountEntry { order_hash: order_mut.hash, filled_amount_s: order_mut.filled_amount_s.clone() }
                } else {
                    order_mut.filled_amount_s = result;
                    FilledAmountEntry { order_hash: order_mut.hash, filled_amount_s: order_mut.filled_amount_s.clone() }
                }
            })
            .collect()
    }

    /// One `Spendable` per distinct `(broker, owner, token)` across the
    /// batch, shared by reference between every order that reuses it -
    /// separately for the sell-token path and the fee-token path.
    fn dedup_broker_spendables(&self, orders: &[OrderRef]) {
        let mut sell_path: HashMap<(Address, Address, Address), SharedSpendable> = HashMap::new();
        let mut fee_path: HashMap<(Address, Address, Address), SharedSpendable> = HashMap::new();

        for order in orders {
            let mut order_mut = order.borrow_mut();
            if let Some(broker) = order_mut.broker {
                let sell_key = (broker, order_mut.owner, order_mut.token_s);
                order_mut.broker_spendable_s =
                    Some(sell_path.entry(sell_key).or_insert_with(new_shared_spendable).clone());

                let fee_key = (broker, order_mut.owner, order_mut.fee_token);
                order_mut.broker_spendable_fee =
                    Some(fee_path.entry(fee_key).or_insert_with(new_shared_spendable).clone());
            }
        }
    }

    fn build_rings(&self, orders: &[OrderRef], ring_inputs: &[Vec<usize>]) -> Result<Vec<Ring>, Fatal> {
        ring_inputs
            .iter()
            .map(|indices| {
                let participations = indices
                    .iter()
                    .map(|&idx| {
                        orders
                            .get(idx)
                            .cloned()
                            .map(Participation::new)
                            .ok_or(Fatal::OrderIndexOutOfBounds(idx))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let hash = self.compute_ring_hash(&participations);
                Ok(Ring::new(participations, hash))
            })
            .collect()
    }

    /// Hashes the ring's ordered order-hashes together, ahead of the full
    /// `Mining.updateHash` step which additionally folds in miner/feeRecipient.
    fn compute_ring_hash(&self, participations: &[Participation]) -> [u8; 32] {
        let mut buf = Vec::with_capacity(participations.len() * 32);
        for p in participations {
            buf.extend_from_slice(&p.order.borrow().hash);
        }
        self.hasher.hash(&buf)
    }

    /// `Mining.updateHash` + `checkMinerSignature`: hashes the ordered
    /// rings' hashes plus miner/feeRecipient, then requires a valid
    /// signature over that hash. Mandatory and fatal on failure.
    fn check_miner_signature<C2, H2, S2>(
        &self,
        validator: &OrderValidator<C2, H2, S2>,
        rings: &[Ring],
        miner: Address,
        fee_recipient: Address,
        signature: Option<&[u8]>,
    ) -> Result<(), Fatal>
    where
        C2: ChainView,
        H2: Hasher,
        S2: SignatureVerifier,
    {
        let mut buf = Vec::with_capacity(rings.len() * 32 + 40);
        for ring in rings {
            buf.extend_from_slice(&ring.hash);
        }
        buf.extend_from_slice(&miner.0);
        buf.extend_from_slice(&fee_recipient.0);
        let mining_hash = self.hasher.hash(&buf);

        let signature = signature.ok_or(Fatal::InvalidMinerSignature)?;
        if !validator.check_miner_signature(miner, &mining_hash, signature) {
            return Err(Fatal::InvalidMinerSignature);
        }
        Ok(())
    }

    /// Pre- and post-simulation balance snapshots for every `(owner,
    /// token, tranche)` touched by a transfer, plus the fee recipient's
    /// balance in each ring's `tokenS` (so margin crediting is visible
    /// even when every transfer into that slot nets to zero).
    fn build_balance_snapshots(
        &self,
        rings: &[Ring],
        fee_recipient: Address,
        transfers: &[crate::report::TransferItem],
    ) -> (BalanceBook, BalanceBook) {
        let mut touched: Vec<(Address, Address, Address, TokenType)> = Vec::new();
        for transfer in transfers {
            touched.push((transfer.from, transfer.token, transfer.from_tranche, transfer.token_type));
            touched.push((transfer.to, transfer.token, transfer.to_tranche, transfer.token_type));
        }
        for ring in rings {
            for p in &ring.participations {
                let order = p.order.borrow();
                touched.push((fee_recipient, order.token_s, order.tranche_s, order.token_type_s));
            }
        }

        let mut before = BalanceBook::new();
        for (owner, token, tranche, token_type) in touched {
            if before.is_known(owner, token, tranche) {
                continue;
            }
            let balance = self.chain.token_spendable(token_type, token, tranche, owner);
            before.add(owner, token, tranche, &balance);
        }

        let mut after = before.copy();
        for transfer in transfers {
            after.add(transfer.from, transfer.token, transfer.from_tranche, &(-&transfer.amount));
            after.add(transfer.to, transfer.token, transfer.to_tranche, &transfer.amount);
        }

        (before, after)
    }

    fn build_fee_balance_snapshots(&self, engine_fee_balances: &BalanceBook) -> (BalanceBook, BalanceBook) {
        let mut before = BalanceBook::new();
        for (entry, _) in engine_fee_balances.enumerate() {
            let balance = self.chain.fee_balance(entry.token, entry.owner);
            before.add(entry.owner, entry.token, entry.tranche, &balance);
        }
        let mut after = before.copy();
        for (entry, amount) in engine_fee_balances.enumerate() {
            after.add(entry.owner, entry.token, entry.tranche, &amount);
        }
        (before, after)
    }

    /// Global `validateRings`: non-negativity of every balance and fee
    /// balance, burn-address accounting agreement, AllOrNone full-fill, and
    /// that no owner had more debited from their spendable/fee legs than
    /// was actually transferred out of them.
    fn validate_rings(
        &self,
        orders: &[OrderRef],
        rings: &[Ring],
        transfer_items: &[crate::report::TransferItem],
        balances_after: &BalanceBook,
        engine_fee_balances: &BalanceBook,
        fee_balances_after: &BalanceBook,
    ) -> Result<(), Fatal> {
        for (entry, amount) in balances_after.enumerate() {
            if amount < BigInt::zero() {
                return Err(Fatal::InvariantViolation(format!(
                    "negative balance for owner {} token {}",
                    entry.owner, entry.token
                )));
            }
        }

        for (entry, amount) in fee_balances_after.enumerate() {
            if amount < BigInt::zero() {
                return Err(Fatal::InvariantViolation(format!(
                    "negative fee balance for holder {} token {}",
                    entry.owner, entry.token
                )));
            }
        }

        // Burn match: the burn address's credited total per token must
        // equal what the engine's own ledger recorded there. Iterate the
        // union of tokens known to either accumulator: every token that
        // appeared in either.
        for token in engine_fee_balances.union_tokens(fee_balances_after) {
            let expected = engine_fee_balances.get(Address::ZERO, token, Address::ZERO);
            let recorded = fee_balances_after.get(Address::ZERO, token, Address::ZERO)
                - self.chain.fee_balance(token, Address::ZERO);
            if expected != recorded {
                return Err(Fatal::InvariantViolation(format!("burn accounting mismatch for token {token}")));
            }
        }

        for order in orders {
            let order = order.borrow();
            if order.all_or_none && !order.filled_amount_s.is_zero() && order.filled_amount_s != order.amount_s {
                return Err(Fatal::InvariantViolation(format!(
                    "allOrNone order {:x?} partially filled",
                    order.hash
                )));
            }
        }

        // For every order, amountSpent >= amountTransferred: what was
        // debited from an owner's spendables (tokenS + feeToken legs
        // across every valid ring it settled in) must be at least what
        // that owner actually transferred out in that token. Rebates are
        // the only thing that can make the difference non-zero.
        let mut spent: HashMap<(Address, Address), BigInt> = HashMap::new();
        for ring in rings {
            if !ring.valid {
                continue;
            }
            for p in &ring.participations {
                let order = p.order.borrow();
                *spent.entry((order.owner, order.token_s)).or_insert_with(BigInt::zero) += &p.fill_amount_s + &p.split_s;
                *spent.entry((order.owner, order.fee_token)).or_insert_with(BigInt::zero) += &p.fee_amount;
            }
        }
        let mut transferred: HashMap<(Address, Address), BigInt> = HashMap::new();
        for transfer in transfer_items {
            *transferred.entry((transfer.from, transfer.token)).or_insert_with(BigInt::zero) += &transfer.amount;
        }
        for (owner, token) in spent.keys() {
            let spent_amount = &spent[&(*owner, *token)];
            let transferred_amount = transferred.get(&(*owner, *token)).cloned().unwrap_or_else(BigInt::zero);
            if &transferred_amount > spent_amount {
                return Err(Fatal::InvariantViolation(format!(
                    "owner {owner} transferred more of token {token} than was debited from its spendable"
                )));
            }
        }

        Ok(())
    }
}
