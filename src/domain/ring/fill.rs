//! Steps 1-3 of ring fill computation: per-participation max fill, the
//! two-sweep resize loop that propagates shrinkage around the cycle, and
//! reservation of the sell-token spendable.

use {
    super::Ring,
    crate::{
        big_int::{mul_div, mul_pct, BigInt},
        chain_view::{ChainView, Hasher, SignatureVerifier},
        config::Config,
        domain::order::OrderValidator,
    },
    num::Zero,
};

impl Ring {
    /// Step 1: an initial, independent max-fill estimate for every
    /// participation, before the cycle's feasibility is reconciled.
    pub fn set_max_fill_amounts<C, H, S>(&mut self, validator: &OrderValidator<C, H, S>, config: &Config)
    where
        C: ChainView,
        H: Hasher,
        S: SignatureVerifier,
    {
        for p in &mut self.participations {
            let mut order = p.order.borrow_mut();
            let remaining_s = order.remaining_amount_s();
            let ring_spendable_s = validator.get_spendable_s(&mut order);
            p.ring_spendable_s = ring_spendable_s.clone();

            let mut fill_amount_s = remaining_s.min(ring_spendable_s.clone());

            // Always cache the fee spendable, even for P2P orders (the
            // participation's `ring_spendable_fee` field is always
            // populated), but only let it affect `fill_amount_s` on the
            // non-P2P branch below.
            let ring_spendable_fee = validator.get_spendable_fee(&mut order);
            p.ring_spendable_fee = ring_spendable_fee.clone();

            if !order.is_p2p() {
                let fee_from_bought_amount = order.fee_token == order.token_b
                    && order.owner == order.token_recipient
                    && order.fee_amount <= order.amount_b;

                if !fee_from_bought_amount {
                    let mut fee_amount = mul_div(&order.fee_amount, &fill_amount_s, &order.amount_s);

                    if order.fee_token == order.token_s {
                        if &fill_amount_s + &fee_amount > ring_spendable_s {
                            let total = &order.amount_s + &order.fee_amount;
                            fill_amount_s = mul_div(&ring_spendable_s, &order.amount_s, &total);
                            fee_amount = mul_div(&ring_spendable_s, &order.fee_amount, &total);
                        }
                    } else if fee_amount > ring_spendable_fee {
                        fee_amount = ring_spendable_fee.clone();
                        if !order.fee_amount.is_zero() {
                            fill_amount_s = mul_div(&fee_amount, &order.amount_s, &order.fee_amount);
                        }
                    }
                    let _ = fee_amount; // authoritative value is recomputed in calculate_fees
                }
            }

            p.fill_amount_b = mul_div(&fill_amount_s, &order.amount_b, &order.amount_s);
            p.fill_amount_s = fill_amount_s;
        }
    }

    /// `fillAmountS * (feePercentageBase - tokenSFeePercentage) / feePercentageBase`.
    fn post_fee_fill_amount_s(&self, idx: usize, config: &Config) -> BigInt {
        let p = &self.participations[idx];
        let order = p.order.borrow();
        mul_pct(&p.fill_amount_s, config.fee_percentage_base - order.token_s_fee_percentage, config.fee_percentage_base)
    }

    /// One descending pass over `[from, to]` (inclusive, `from >= to`)
    /// shrinking each predecessor's `fillAmountB`/`fillAmountS` down to what
    /// its successor can actually deliver after its own sell-side fee.
    /// Returns the smallest index touched by a shrink, if any.
    fn resize_pass(&mut self, from: usize, to: usize, config: &Config) -> Option<usize> {
        let mut smallest = None;
        let mut i = from;
        loop {
            let prev = self.prev_index(i);
            let required = self.post_fee_fill_amount_s(i, config);
            let prev_fill_amount_b = self.participations[prev].fill_amount_b.clone();
            if prev_fill_amount_b > required {
                let prev_p = &mut self.participations[prev];
                let prev_order = prev_p.order.borrow();
                let new_fill_amount_s = mul_div(&required, &prev_order.amount_s, &prev_order.amount_b);
                drop(prev_order);
                prev_p.fill_amount_b = required;
                prev_p.fill_amount_s = new_fill_amount_s;
                smallest = Some(i);
            }
            if i == to {
                break;
            }
            i -= 1;
        }
        smallest
    }

    /// Step 2: the two-sweep resize loop. Two sweeps suffice provided the
    /// second sweep stops at the smallest index the first sweep touched.
    pub fn resize_fill_amounts(&mut self, config: &Config) {
        let n = self.participations.len();
        if n == 0 {
            return;
        }
        if let Some(smallest) = self.resize_pass(n - 1, 0, config) {
            self.resize_pass(n - 1, smallest, config);
        }
    }

    /// Step 3: reserve every participation's `fillAmountS` against its
    /// order's sell-token spendable, so a later participation sharing the
    /// same owner/token/broker triple in this ring sees the updated budget.
    pub fn reserve_sell_amounts<C, H, S>(&self, validator: &OrderValidator<C, H, S>)
    where
        C: ChainView,
        H: Hasher,
        S: SignatureVerifier,
    {
        for p in &self.participations {
            let mut order = p.order.borrow_mut();
            validator.reserve_amount_s(&mut order, &p.fill_amount_s);
        }
    }
}
