//! Step 4: per-pair fee and feasibility (`calculateFees`), plus the
//! top-level `calculateFillAmountAndFee` orchestration that chains steps
//! 1-5 together.

use {
    super::{InvalidReason, Ring},
    crate::{
        big_int::{mul_pct, BigInt},
        chain_view::{CanSendResult, ChainView, Hasher, SignatureVerifier},
        config::Config,
        domain::order::OrderValidator,
    },
    num::Zero,
};

impl Ring {
    /// Runs the full fill computation (steps 1-5 of the fill/fee pass). On
    /// return, `self.valid` reflects whether the ring is feasible; if it
    /// is, every participation's `fill_amount_s/b`, `fee_amount*`, and
    /// `split_s` are final for this ring in isolation (before the
    /// all-or-none cross-ring pass may still invalidate it).
    pub fn calculate_fill_amount_and_fee<C, H, S>(
        &mut self,
        validator: &OrderValidator<C, H, S>,
        chain: &C,
        config: &Config,
    ) where
        C: ChainView,
        H: Hasher,
        S: SignatureVerifier,
    {
        if !self.valid {
            return;
        }

        self.set_max_fill_amounts(validator, config);
        self.resize_fill_amounts(config);
        self.reserve_sell_amounts(validator);

        let n = self.participations.len();
        for i in 0..n {
            if let Err(reason) = self.calculate_fees_for_pair(i, chain, validator, config) {
                self.invalidate(reason);
                break;
            }
        }

        if self.valid && self.miner_fees_to_orders_percentage > i64::from(config.fee_percentage_base) {
            self.invalidate(InvalidReason::WaiveSumExceedsBase);
        }

        // Step 5: ring computation does not persist reservations across
        // rings - each ring starts from the order's true spendable.
        for p in &self.participations {
            validator.reset_reservations(&mut p.order.borrow_mut());
        }
    }

    fn calculate_fees_for_pair<C, H, S>(
        &mut self,
        idx: usize,
        chain: &C,
        validator: &OrderValidator<C, H, S>,
        config: &Config,
    ) -> Result<(), InvalidReason>
    where
        C: ChainView,
        H: Hasher,
        S: SignatureVerifier,
    {
        let prev = self.prev_index(idx);
        let prev_fill_amount_b = self.participations[prev].fill_amount_b.clone();
        let (prev_token_recipient, prev_tranche_b) = {
            let prev_order = self.participations[prev].order.borrow();
            (prev_order.token_recipient, prev_order.tranche_b)
        };

        let p = &mut self.participations[idx];
        let order_ref = p.order.clone();
        let mut order = order_ref.borrow_mut();

        if order.is_p2p() {
            p.fee_amount = BigInt::zero();
            p.fee_amount_s = mul_pct(&p.fill_amount_s, order.token_s_fee_percentage, config.fee_percentage_base);
            p.fee_amount_b = mul_pct(&p.fill_amount_b, order.token_b_fee_percentage, config.fee_percentage_base);
        } else {
            let mut fee_amount = crate::big_int::mul_div(&order.fee_amount, &p.fill_amount_s, &order.amount_s);
            p.fee_amount_s = BigInt::zero();
            p.fee_amount_b = BigInt::zero();

            let fee_from_bought_amount = order.fee_token == order.token_b
                && order.owner == order.token_recipient
                && p.fill_amount_b >= fee_amount;
            if fee_from_bought_amount {
                p.fee_amount_b = fee_amount.clone();
                fee_amount = BigInt::zero();
            }

            if fee_amount > p.ring_spendable_fee {
                return Err(InvalidReason::InfeasibleFee(idx));
            }
            validator.reserve_amount_fee(&mut order, &fee_amount);
            p.fee_amount = fee_amount;
        }

        if order.waive_fee_percentage < 0 {
            self.miner_fees_to_orders_percentage += i64::from(-order.waive_fee_percentage);
        }

        let post_fee_fill_s = &p.fill_amount_s - &p.fee_amount_s;
        if post_fee_fill_s >= prev_fill_amount_b {
            p.split_s = &post_fee_fill_s - &prev_fill_amount_b;
            p.fill_amount_s = &prev_fill_amount_b + &p.fee_amount_s;
        } else {
            return Err(InvalidReason::NegativeMargin(idx));
        }

        if order.token_type_s.is_erc1400() {
            let CanSendResult { status, dest_tranche } = chain.erc1400_can_send(
                order.token_s,
                order.owner,
                prev_token_recipient,
                order.tranche_s,
                &p.fill_amount_s,
                &order.transfer_data_s,
            );
            if !config.can_send_ok(status) || dest_tranche != prev_tranche_b {
                return Err(InvalidReason::CanSendRefused(idx));
            }
        }

        Ok(())
    }
}
