//! The shared clock-price decay function.
//!
//! Both the bid path and the price ticker call [`clock_price`]; a bid arriving
//! at elapsed time `t` settles at exactly the price the ticker would publish
//! at `t`. Linear interpolation from `start_price` down to `min_price` over
//! `duration`, clamped to `[min_price, start_price]`, rounded to 2 decimals.

use rust_decimal::Decimal;
use std::time::Duration;

/// Default length of one clock run: start price to floor in 30 seconds.
pub const AUCTION_DURATION: Duration = Duration::from_secs(30);

/// Price on the descending clock at `elapsed` into a run of `duration`.
pub fn clock_price(
    start_price: Decimal,
    min_price: Decimal,
    elapsed: Duration,
    duration: Duration,
) -> Decimal {
    if min_price >= start_price {
        // Degenerate configuration: no decay span.
        return min_price;
    }
    if duration.is_zero() || elapsed >= duration {
        return min_price;
    }
    let ratio = Decimal::from(elapsed.as_millis() as u64) / Decimal::from(duration.as_millis() as u64);
    let price = (start_price - (start_price - min_price) * ratio).round_dp(2);
    price.clamp(min_price, start_price)
}
