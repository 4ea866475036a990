//! Credit accounting over the document.
//!
//! Commitment counts winning-bid prices on open and executing days; the
//! balance itself is only touched at the open→executing transition
//! (`charge_on_commit`), on a voluntary release (`refund_release`) and at
//! day finalization (`apply_rollover`).
//
//  This module is deliberately pure: no async, no IO.

use rust_decimal::Decimal;

use common::keys::DayKey;
use store::{DayStatus, Document, User};

/// Sum of winning-bid prices held by `username` on non-finalized days.
pub fn committed(doc: &Document, username: &str) -> Decimal {
    let total: u64 = doc
        .days
        .values()
        .filter(|d| matches!(d.status, DayStatus::Open | DayStatus::Executing))
        .flat_map(|d| d.slots.values().flatten())
        .filter(|s| s.winner.as_deref() == Some(username))
        .map(|s| u64::from(s.price))
        .sum();
    Decimal::from(total)
}

/// Balance not yet spoken for by winning bids.
pub fn available(doc: &Document, username: &str) -> Option<Decimal> {
    let user = doc.users.get(username)?;
    Some(user.balance - committed(doc, username))
}

/// Whether `username` can take on `additional` credits of commitment.
///
/// `additional` is the delta above whatever this user already has committed
/// on the slot in question; re-bidding your own slot costs only the
/// increment.
pub fn can_afford(doc: &Document, username: &str, additional: Decimal) -> Option<bool> {
    Some(available(doc, username)? >= additional)
}

/// Debit `amount` at the open→executing transition. Refuses to drive the
/// balance negative; the caller decides what to do with the offending slot.
pub fn charge_on_commit(user: &mut User, amount: Decimal) -> Result<(), Decimal> {
    if user.balance < amount {
        return Err(user.balance);
    }
    user.balance -= amount;
    Ok(())
}

/// Credit the fixed release refund.
pub fn refund_release(user: &mut User, refund: Decimal) {
    user.balance += refund;
}

/// End-of-day refill: `balance = min(budget, balance) * rollover + budget`.
///
/// Applied at most once per (user, day) no matter how often the finalizing
/// transition is replayed; returns whether it was applied.
pub fn apply_rollover(user: &mut User, day: DayKey, rollover: Decimal) -> bool {
    if user.rollover_applied_for_day.is_some_and(|d| d >= day) {
        return false;
    }
    let budget = Decimal::from(user.weekly_budget);
    user.balance = user.balance.min(budget) * rollover + budget;
    user.rollover_applied_for_day = Some(day);
    true
}
