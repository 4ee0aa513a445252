//! Pro-rata share arithmetic.
//!
//! Computes `drip_amount * volume / total_volume` exactly, rounding down.
//! The product can exceed 128 bits for 18-decimal amounts, so the slow path
//! forms the full 256-bit product and divides it by shift-and-subtract.

use voldrip_core::error::DripError;
use voldrip_core::types::Amount;

const LOW_MASK: u128 = u64::MAX as u128;

/// Full 256-bit product of two `u128` values as `(high, low)`.
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    let (a1, a0) = (a >> 64, a & LOW_MASK);
    let (b1, b0) = (b >> 64, b & LOW_MASK);

    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;

    // At most 3 * (2^64 - 1), no overflow.
    let mid = (p00 >> 64) + (p01 & LOW_MASK) + (p10 & LOW_MASK);
    let low = (p00 & LOW_MASK) | (mid << 64);
    let high = p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64);
    (high, low)
}

/// Compute `a * b / d` rounding down, without intermediate overflow.
///
/// Fails with [`DripError::ArithmeticOverflow`] if `d == 0` or the quotient
/// does not fit in 128 bits.
pub fn mul_div(a: u128, b: u128, d: u128) -> Result<u128, DripError> {
    if d == 0 {
        return Err(DripError::ArithmeticOverflow);
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / d);
    }

    let (high, low) = widening_mul(a, b);
    if high >= d {
        return Err(DripError::ArithmeticOverflow);
    }

    // Invariant: rem < d at the top of every iteration.
    let mut rem = high;
    let mut quotient: u128 = 0;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((low >> bit) & 1);
        quotient <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quotient |= 1;
        }
    }
    Ok(quotient)
}

/// A participant's share of a period's drip amount.
///
/// Zero when either the participant's volume or the period's total volume
/// is zero. Never exceeds `drip_amount` while `volume <= total_volume`.
pub fn pro_rata_share(volume: Amount, total_volume: Amount, drip_amount: Amount) -> Result<Amount, DripError> {
    if volume == 0 || total_volume == 0 || drip_amount == 0 {
        return Ok(0);
    }
    mul_div(drip_amount, volume, total_volume)
}
