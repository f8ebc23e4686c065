//! Cross-ring fixed-point: a ring is only feasible if every `allOrNone`
//! order inside it ends up completely filled *across the whole batch*, not
//! just within that one ring.

use crate::domain::{
    order::{OrderRef, OrderValidator},
    ring::Ring,
};

/// Drives the AllOrNone resolution fixed-point loop. Each iteration
/// strictly shrinks the set of valid orders (an order, once invalidated,
/// never becomes valid again), so termination in at most `|orders|`
/// iterations is guaranteed.
pub struct AllOrNoneResolver;

impl AllOrNoneResolver {
    /// Runs to fixed point: orders violating `allOrNone` are invalidated,
    /// which can invalidate rings, whose `revertOrderStats` can un-fill
    /// other orders, which can in turn violate *their* `allOrNone`
    /// constraint - hence the loop.
    pub fn resolve<C, H, S>(orders: &[OrderRef], rings: &mut [Ring], validator: &OrderValidator<C, H, S>)
    where
        C: crate::chain_view::ChainView,
        H: crate::chain_view::Hasher,
        S: crate::chain_view::SignatureVerifier,
    {
        let mut iterations = 0usize;
        loop {
            iterations += 1;
            debug_assert!(iterations <= orders.len() + 1, "all-or-none fixed point did not terminate");

            let mut changed = false;
            for order in orders {
                let mut order_mut = order.borrow_mut();
                if order_mut.valid {
                    let was_valid = order_mut.valid;
                    validator.validate_all_or_none(&mut order_mut);
                    if was_valid && !order_mut.valid {
                        changed = true;
                    }
                }
            }

            if !changed {
                break;
            }

            for ring in rings.iter_mut() {
                let was_valid = ring.valid;
                ring.check_orders_valid();
                if was_valid && !ring.valid {
                    tracing::warn!(ring_hash = %hex::encode(ring.hash), "ring invalidated by all-or-none cascade");
                    ring.revert_order_stats();
                }
            }
        }
    }
}
