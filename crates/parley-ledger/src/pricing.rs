//! Stake pricing.
//!
//! The creator's declared band `[low, high]` encodes the odds they are
//! willing to take money at. A skeptic bets the statement is false, so the
//! creator matches at the low edge; a believer bets it is true, so the
//! creator matches at the high edge. The derived stake is floored to whole
//! cents.

use parley_core::{Cents, Certainty};

/// The creator-side stake matching a bettor's stake.
///
/// Skeptic: `floor(stake * low / (1 - low))`.
/// Believer: `floor(stake * (1 - high) / high)`.
///
/// A band edge of exactly 1.0 makes the skeptic ratio infinite; the cast
/// saturates and the caller's exposure cap rejects the trade. A believer
/// at `high = 1.0` prices to zero creator risk, which is allowed.
pub fn creator_stake_cents(
    certainty: &Certainty,
    bettor_is_a_skeptic: bool,
    bettor_stake_cents: Cents,
) -> Cents {
    let ratio = if bettor_is_a_skeptic {
        certainty.low / (1.0 - certainty.low)
    } else {
        (1.0 - certainty.high) / certainty.high
    };
    // f64-to-int casts in Rust saturate; NaN becomes 0, +inf becomes MAX.
    (bettor_stake_cents as f64 * ratio) as Cents
}
