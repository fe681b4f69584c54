// src/utils/precision.rs
use crate::types::AccountSnapshot;
use rust_decimal::Decimal;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Price move from `start` to `last`: (absolute delta, delta in percent of `start`).
/// `None` when `start` is not a usable reference.
pub fn price_delta(start: Decimal, last: Decimal) -> Option<(Decimal, Decimal)> {
    if start <= Decimal::ZERO {
        return None;
    }
    let delta = last - start;
    Some((delta, delta / start * HUNDRED))
}

/// Free-balance change of `asset` between two snapshots (`after - before`).
pub fn balance_delta(asset: &str, before: &AccountSnapshot, after: &AccountSnapshot) -> Decimal {
    after.balance(asset).free - before.balance(asset).free
}
