//! Arbitrary-precision arithmetic shared by every financial calculation in
//! this crate.
//!
//! [`num::BigInt`]'s `Div` impl truncates toward zero (matching Rust's
//! built-in integer semantics), which is exactly the rounding rule the
//! consensus implementation this crate mirrors relies on. Never introduce a
//! floating-point or floor-division shortcut here - reports would diverge
//! from the on-chain settlement they're meant to model.

pub use num::BigInt;
use num::Zero;

/// `(a * b) / denom`, truncated toward zero, with the multiplication applied
/// *before* the division. Every percent-and-base computation here (fee
/// scaling, fill resizing, burn/rebate splits) must go through this helper
/// rather than pre-dividing, or two equivalent-looking calculations are no
/// longer guaranteed to agree bit-for-bit.
pub fn mul_div(a: &BigInt, b: &BigInt, denom: &BigInt) -> BigInt {
    if denom.is_zero() {
        return BigInt::zero();
    }
    (a * b) / denom
}

/// `(a * pct) / base`, the specific case of [`mul_div`] used for percentage
/// arithmetic throughout the fee/burn model.
pub fn mul_pct(a: &BigInt, pct: u32, base: u32) -> BigInt {
    mul_div(a, &BigInt::from(pct), &BigInt::from(base))
}

/// `a.min(b)` for `BigInt`, since `std::cmp::min` needs `Ord` by value and
/// callers here usually only hold references.
pub fn min(a: &BigInt, b: &BigInt) -> BigInt {
    if a <= b { a.clone() } else { b.clone() }
}

/// The ERC20/ERC1400 "all bits set" sentinel used by `TradeDelegate` to mark
/// an order as cancelled: `2^256 - 1`.
pub fn cancelled_sentinel() -> BigInt {
    (BigInt::from(1) << 256u32) - BigInt::from(1)
}

/// Whether `numA/denA` and `numB/denB` agree to 8 significant digits.
/// Cross-multiplies into a shared fixed-point scale rather than dividing as
/// floats, so this stays exact integer arithmetic; used only by the
/// tolerant-equality validation path (the transfers themselves are always
/// computed bit-exact, never through this helper).
pub fn rates_match(num_a: &BigInt, den_a: &BigInt, num_b: &BigInt, den_b: &BigInt) -> bool {
    if den_a.is_zero() || den_b.is_zero() {
        return den_a.is_zero() && den_b.is_zero();
    }
    let precision = BigInt::from(100_000_000u64);
    let scaled_a = mul_div(num_a, &precision, den_a);
    let scaled_b = mul_div(num_b, &precision, den_b);
    (scaled_a - scaled_b).abs() <= BigInt::from(1)
}
