//! Step 5: transfer emission and the `payFeesAndBurn` fee/burn/rebate
//! distribution.

use {
    super::Ring,
    crate::{
        address::Address,
        big_int::{mul_pct, rates_match, BigInt},
        chain_view::ChainView,
        config::Config,
        report::TransferItem,
        token::TokenType,
    },
    num::Zero,
    thiserror::Error,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("order {0}'s ERC1400 canSend probe was refused at payment time")]
    CanSendRefused(usize),
    #[error("settlement invariant violated for participation {0}: {1}")]
    InvariantViolation(usize, String),
}

impl Ring {
    /// Emits the four logical transfers per participation and runs
    /// `payFeesAndBurn` over each of the three fee legs
    /// (`feeAmount`/`feeAmountS`/`feeAmountB`), recording rebates back onto
    /// the participation and credits into `self.fee_balances`. Zero-amount
    /// and self-transfers are suppressed.
    pub fn do_payments(
        &mut self,
        chain: &impl ChainView,
        config: &Config,
        fee_holder: Address,
        miner_fee_recipient: Address,
    ) -> Result<Vec<TransferItem>, PaymentError> {
        let n = self.participations.len();
        let mut transfers = Vec::new();

        // payFeesAndBurn first, since transfer #1 and #2 need the
        // just-computed rebates.
        for idx in 0..n {
            let (fee_amount, fee_amount_s, fee_amount_b, fee_token, token_s, token_b) = {
                let p = &self.participations[idx];
                let order = p.order.borrow();
                (
                    p.fee_amount.clone(),
                    p.fee_amount_s.clone(),
                    p.fee_amount_b.clone(),
                    order.fee_token,
                    order.token_s,
                    order.token_b,
                )
            };
            let rebate_fee = self.pay_fees_and_burn(idx, &fee_amount, fee_token, chain, config, miner_fee_recipient);
            let rebate_s = self.pay_fees_and_burn(idx, &fee_amount_s, token_s, chain, config, miner_fee_recipient);
            let rebate_b = self.pay_fees_and_burn(idx, &fee_amount_b, token_b, chain, config, miner_fee_recipient);
            let p = &mut self.participations[idx];
            p.rebate_fee = rebate_fee;
            p.rebate_s = rebate_s;
            p.rebate_b = rebate_b;
        }

        for idx in 0..n {
            let prev = self.prev_index(idx);
            let (owner, token_s, token_type_s, tranche_s, fee_token, transfer_data_s) = {
                let order = self.participations[idx].order.borrow();
                (order.owner, order.token_s, order.token_type_s, order.tranche_s, order.fee_token, order.transfer_data_s.clone())
            };
            let prev_recipient = self.participations[prev].order.borrow().token_recipient;
            let prev_tranche_b = self.participations[prev].order.borrow().tranche_b;

            let (fill_amount_s, fee_amount_s, fee_amount, split_s, rebate_s, rebate_fee) = {
                let p = &self.participations[idx];
                (
                    p.fill_amount_s.clone(),
                    p.fee_amount_s.clone(),
                    p.fee_amount.clone(),
                    p.split_s.clone(),
                    p.rebate_s.clone(),
                    p.rebate_fee.clone(),
                )
            };
            let (prev_fee_amount_b, prev_rebate_b) = {
                let prev_p = &self.participations[prev];
                (prev_p.fee_amount_b.clone(), prev_p.rebate_b.clone())
            };

            let (dest_tranche_to_recipient, dest_tranche_to_fee_holder) = if token_type_s.is_erc1400() {
                let probe = chain.erc1400_can_send(
                    token_s,
                    owner,
                    prev_recipient,
                    tranche_s,
                    &fill_amount_s,
                    &transfer_data_s,
                );
                if !config.can_send_ok(probe.status) || probe.dest_tranche != prev_tranche_b {
                    return Err(PaymentError::CanSendRefused(idx));
                }
                (probe.dest_tranche, Address::ZERO)
            } else {
                (Address::ZERO, Address::ZERO)
            };

            // 1. seller -> previous recipient.
            let to_recipient = &fill_amount_s - &fee_amount_s - (&prev_fee_amount_b - &prev_rebate_b);
            push_transfer(
                &mut transfers,
                token_s,
                owner,
                prev_recipient,
                to_recipient,
                token_type_s,
                tranche_s,
                dest_tranche_to_recipient,
            );

            // 2 (& possibly 3 folded in). seller -> feeHolder, tokenS leg.
            let mut to_fee_holder_s = (&fee_amount_s - &rebate_s) + (&prev_fee_amount_b - &prev_rebate_b);
            let fee_folded_into_token_s = token_s == fee_token;
            if fee_folded_into_token_s {
                to_fee_holder_s += &fee_amount - &rebate_fee;
            }
            push_transfer(
                &mut transfers,
                token_s,
                owner,
                fee_holder,
                to_fee_holder_s,
                token_type_s,
                tranche_s,
                dest_tranche_to_fee_holder,
            );

            // 3. seller -> feeHolder, feeToken leg (skipped when folded into #2).
            if !fee_folded_into_token_s {
                let (token_type_fee, tranche_fee) = {
                    let order = self.participations[idx].order.borrow();
                    (order.token_type_fee, order.tranche_fee)
                };
                push_transfer(
                    &mut transfers,
                    fee_token,
                    owner,
                    fee_holder,
                    &fee_amount - &rebate_fee,
                    token_type_fee,
                    tranche_fee,
                    Address::ZERO,
                );
            }

            // 4. seller -> miner, margin. Security tokens never distribute margin.
            let margin = if token_type_s.is_erc1400() { BigInt::zero() } else { split_s.clone() };
            push_transfer(
                &mut transfers,
                token_s,
                owner,
                miner_fee_recipient,
                margin,
                token_type_s,
                tranche_s,
                dest_tranche_to_recipient,
            );
        }

        self.validate_settlement()?;

        Ok(transfers)
    }

    /// Re-derives the closure and fee-mode invariants over the final
    /// participation state, run once per ring right after its transfers are
    /// emitted: ring closure, 8-digit-tolerant rate respect, non-negativity,
    /// fill bounds, rebate bounds, spendable safety, and the P2P/non-P2P
    /// fee-mode exclusivity rules. A breach here means an earlier step
    /// computed something inconsistent, not a market condition, so it
    /// propagates as an error rather than a silent ring invalidation.
    fn validate_settlement(&self) -> Result<(), PaymentError> {
        let zero = BigInt::zero();
        for idx in 0..self.participations.len() {
            let prev = self.prev_index(idx);
            let p = &self.participations[idx];
            let prev_p = &self.participations[prev];
            let order = p.order.borrow();

            // 1. Ring closure.
            if &p.fill_amount_s - &p.fee_amount_s != prev_p.fill_amount_b {
                return Err(invariant(idx, "fillAmountS - feeAmountS != prev.fillAmountB"));
            }

            // 2. Rate respect, 8-digit tolerant.
            let delivered = &p.fill_amount_s + &p.split_s;
            if !rates_match(&delivered, &p.fill_amount_b, &order.amount_s, &order.amount_b) {
                return Err(invariant(idx, "fill rate diverges from the order's rate"));
            }

            // 3. Non-negativity.
            if p.fill_amount_s < zero
                || p.fill_amount_b < zero
                || p.split_s < zero
                || p.fee_amount < zero
                || p.fee_amount_s < zero
                || p.fee_amount_b < zero
                || p.rebate_fee < zero
                || p.rebate_s < zero
                || p.rebate_b < zero
            {
                return Err(invariant(idx, "a fill/fee/rebate quantity went negative"));
            }

            // 4. Fill bounds.
            if &p.fill_amount_s + &p.split_s > order.amount_s
                || p.fill_amount_b > order.amount_b
                || p.fee_amount > order.fee_amount
            {
                return Err(invariant(idx, "fill or fee amount exceeds the order's bound"));
            }

            // 5. Rebate bounds.
            if p.rebate_fee > p.fee_amount || p.rebate_s > p.fee_amount_s || p.rebate_b > p.fee_amount_b {
                return Err(invariant(idx, "a rebate exceeds its fee leg"));
            }

            // 6. Spendable safety.
            if order.token_s == order.fee_token {
                if &p.fill_amount_s + &p.split_s + &p.fee_amount > p.ring_spendable_s {
                    return Err(invariant(idx, "spendableS exceeded (tokenS == feeToken)"));
                }
            } else {
                if &p.fill_amount_s + &p.split_s > p.ring_spendable_s {
                    return Err(invariant(idx, "spendableS exceeded"));
                }
                if p.fee_amount > p.ring_spendable_fee {
                    return Err(invariant(idx, "spendableFee exceeded"));
                }
            }

            // 7 & 8. Fee-mode exclusivity.
            if order.is_p2p() {
                if !p.fee_amount.is_zero() {
                    return Err(invariant(idx, "P2P order carries a non-zero feeToken fee"));
                }
            } else {
                if !p.fee_amount_s.is_zero() {
                    return Err(invariant(idx, "non-P2P order carries a non-zero feeAmountS"));
                }
                if !p.fee_amount.is_zero() && !p.fee_amount_b.is_zero() {
                    return Err(invariant(idx, "non-P2P order pays both feeAmount and feeAmountB"));
                }
            }
        }
        Ok(())
    }

    /// Distributes `amount` (denominated in `token`) between the order's
    /// wallet and the miner, applies the order's `waiveFeePercentage`,
    /// burns the protocol's burn rate, and - when this ring has orders
    /// waiving in the miner's favor - redistributes the miner's remainder
    /// to them. Returns the rebate: whatever wasn't credited anywhere,
    /// which flows back to the order itself as a discount.
    fn pay_fees_and_burn(
        &mut self,
        idx: usize,
        amount: &BigInt,
        token: Address,
        chain: &impl ChainView,
        config: &Config,
        miner_fee_recipient: Address,
    ) -> BigInt {
        if amount.is_zero() {
            return BigInt::zero();
        }

        let (is_p2p, wallet, waive) = {
            let order = self.participations[idx].order.borrow();
            (order.is_p2p(), order.wallet_addr, order.waive_fee_percentage)
        };

        if is_p2p && wallet.is_none() {
            // The order keeps its own fee entirely.
            return amount.clone();
        }

        let wallet_split = if is_p2p { 100 } else if wallet.is_some() {
            let order = self.participations[idx].order.borrow();
            order.wallet_split_percentage
        } else {
            0
        };

        let wallet_fee = mul_pct(amount, wallet_split, 100);
        let mut miner_fee = amount - &wallet_fee;

        if waive > 0 {
            miner_fee = mul_pct(&miner_fee, config.fee_percentage_base - waive as u32, config.fee_percentage_base);
        } else if waive < 0 {
            miner_fee = BigInt::zero();
        }

        let burn_rate_token = chain.get_burn_rate(token);
        let burn_rate = if is_p2p { burn_rate_token >> 16 } else { burn_rate_token & 0xFFFF };
        // Hard-coded to 0 in the real protocol throughout; kept as a
        // `Config` knob rather than a literal so the accounting path
        // generalizes if it's ever activated.
        let rebate_rate = config.rebate_rate;

        let miner_burn = mul_pct(&miner_fee, burn_rate, config.fee_percentage_base);
        let miner_rebate = mul_pct(&miner_fee, rebate_rate, config.fee_percentage_base);
        miner_fee = &miner_fee - &miner_burn - &miner_rebate;

        let wallet_burn = mul_pct(&wallet_fee, burn_rate, config.fee_percentage_base);
        let wallet_rebate = mul_pct(&wallet_fee, rebate_rate, config.fee_percentage_base);
        let wallet_fee_after = &wallet_fee - &wallet_burn - &wallet_rebate;

        let percentage = self.miner_fees_to_orders_percentage;
        let mut distributed_total = BigInt::zero();
        let mut credits: Vec<(Address, BigInt)> = Vec::new();
        if percentage > 0 && miner_fee > BigInt::zero() {
            for (j, other) in self.participations.iter().enumerate() {
                if j == idx {
                    continue;
                }
                let other_order = other.order.borrow();
                if other_order.waive_fee_percentage < 0 {
                    let share = mul_pct(&miner_fee, (-other_order.waive_fee_percentage) as u32, config.fee_percentage_base);
                    if share > BigInt::zero() {
                        credits.push((other_order.owner, share.clone()));
                        distributed_total += share;
                    }
                }
            }
        }

        let miner_kept = if percentage > 0 && miner_fee > BigInt::zero() {
            mul_pct(&miner_fee, config.fee_percentage_base - percentage as u32, config.fee_percentage_base)
        } else {
            miner_fee.clone()
        };

        if wallet_fee_after > BigInt::zero() {
            if let Some(wallet_addr) = wallet {
                self.fee_balances.add(wallet_addr, token, Address::ZERO, &wallet_fee_after);
            }
        }
        if miner_kept > BigInt::zero() {
            self.fee_balances.add(miner_fee_recipient, token, Address::ZERO, &miner_kept);
        }
        let total_burn = &miner_burn + &wallet_burn;
        if total_burn > BigInt::zero() {
            self.fee_balances.add(Address::ZERO, token, Address::ZERO, &total_burn);
        }
        for (recipient, share) in &credits {
            self.fee_balances.add(*recipient, token, Address::ZERO, share);
        }

        let total_credited = &wallet_fee_after + &miner_kept + &total_burn + &distributed_total;
        amount - &total_credited
    }
}

fn invariant(idx: usize, reason: &str) -> PaymentError {
    PaymentError::InvariantViolation(idx, reason.to_string())
}

#[allow(clippy::too_many_arguments)]
fn push_transfer(
    transfers: &mut Vec<TransferItem>,
    token: Address,
    from: Address,
    to: Address,
    amount: BigInt,
    token_type: TokenType,
    from_tranche: Address,
    to_tranche: Address,
) {
    if amount.is_zero() || from == to {
        return;
    }
    transfers.push(TransferItem {
        token,
        from,
        to,
        amount,
        token_type,
        from_tranche,
        to_tranche,
        data: None,
    });
}
