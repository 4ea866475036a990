//! Bid placement, undo and voluntary release.
//!
//! Locking protocol: slot locks first (in ascending key order for bulk
//! batches), then the global lock inside `mutate`. Bulk operations validate
//! every slot before touching any of them, so outside observers see either
//! the whole batch or none of it.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::Serialize;

use common::clock::Clock;
use common::keys::SlotKey;

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::ledger;
use crate::notify;
use store::{DayStatus, Document};

#[derive(Debug, Clone, Serialize)]
pub struct BidOutcome {
    pub slot: SlotKey,
    pub new_price: u32,
    pub previous_winner: Option<String>,
    pub previous_price: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseOutcome {
    pub released: Vec<SlotKey>,
    pub refund: Decimal,
}

impl Engine {
    /// Place one unit-increment bid on `key` for `username`.
    pub async fn place_bid(&self, username: &str, key: SlotKey) -> EngineResult<BidOutcome> {
        let _slot = self.locks.acquire(key).await;
        self.mutate(|doc, clock| {
            let (required, increment) = validate_bid(doc, username, key)?;
            require_afford(doc, username, increment)?;
            Ok(apply_bid(doc, clock, username, key, required))
        })
        .await
    }

    /// All-or-nothing bid over a batch of slots.
    ///
    /// The batch is deduplicated and processed in ascending key order; the
    /// total incremental commitment across the batch must fit the caller's
    /// available balance or nothing is applied.
    pub async fn place_bulk(
        &self,
        username: &str,
        keys: &[SlotKey],
    ) -> EngineResult<Vec<BidOutcome>> {
        let batch: BTreeSet<SlotKey> = keys.iter().copied().collect();
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let _guards = self.locks.acquire_sorted(&batch).await;
        self.mutate(|doc, clock| {
            let mut required = Vec::with_capacity(batch.len());
            let mut total = Decimal::ZERO;
            for key in &batch {
                let (price, increment) = validate_bid(doc, username, *key)?;
                total += increment;
                required.push((*key, price));
            }
            require_afford(doc, username, total)?;

            Ok(required
                .into_iter()
                .map(|(key, price)| apply_bid(doc, clock, username, key, price))
                .collect())
        })
        .await
    }

    /// Undo the caller's most recent bid on `key`.
    ///
    /// Only permissible when it would not dispossess a third party: the
    /// previous winner was the caller (price rewind) or nobody. The caller
    /// presents the pre-bid state it observed; if the slot has moved since,
    /// the undo is stale and rejected.
    pub async fn undo_bid(
        &self,
        username: &str,
        key: SlotKey,
        previous_winner: Option<&str>,
        previous_price: u32,
    ) -> EngineResult<()> {
        let _slot = self.locks.acquire(key).await;
        self.mutate(|doc, _clock| {
            if !doc.users.contains_key(username) {
                return Err(EngineError::UnknownUser(username.to_string()));
            }
            let day = doc
                .days
                .get(&key.day)
                .ok_or(EngineError::UnknownDay(key.day))?;
            if day.status != DayStatus::Open {
                return Err(EngineError::SlotUnavailable(format!(
                    "day {} is not open",
                    key.day
                )));
            }

            let slot = doc
                .slot(&key)
                .ok_or(EngineError::UnknownSlot(key))?;
            if slot.winner.as_deref() != Some(username)
                || slot.price != previous_price + 1
            {
                return Err(EngineError::Conflict(
                    "slot has changed since the bid".to_string(),
                ));
            }

            match previous_winner {
                Some(prev) if prev == username => {
                    if previous_price == 0 {
                        return Err(EngineError::Conflict(
                            "a winning bid cannot have price zero".to_string(),
                        ));
                    }
                }
                Some(_) => {
                    return Err(EngineError::Forbidden(
                        "undo would dispossess another bidder".to_string(),
                    ));
                }
                None => {
                    if previous_price != 0 {
                        return Err(EngineError::Conflict(
                            "slot has changed since the bid".to_string(),
                        ));
                    }
                }
            }

            let slot = doc.slot_mut(&key).ok_or(EngineError::UnknownSlot(key))?;
            let last = slot
                .bids
                .iter_mut()
                .rev()
                .find(|b| !b.undone)
                .filter(|b| b.user == username)
                .ok_or_else(|| {
                    EngineError::Conflict("no live bid by caller on this slot".to_string())
                })?;
            last.undone = true;

            match previous_winner {
                Some(_) => {
                    slot.price = previous_price;
                }
                None => {
                    slot.price = 0;
                    slot.winner = None;
                }
            }
            Ok(())
        })
        .await
    }

    /// Voluntarily surrender a future slot of the executing day for the
    /// fixed refund.
    pub async fn release_slot(
        &self,
        username: &str,
        key: SlotKey,
    ) -> EngineResult<ReleaseOutcome> {
        let _slot = self.locks.acquire(key).await;
        self.mutate(|doc, clock| {
            validate_release(doc, clock, username, key)?;
            let refund = doc.config.refund;
            apply_release(doc, username, key, refund);
            Ok(ReleaseOutcome {
                released: vec![key],
                refund,
            })
        })
        .await
    }

    /// Release a batch of future slots; all-or-nothing like bulk bids.
    pub async fn release_bulk(
        &self,
        username: &str,
        keys: &[SlotKey],
    ) -> EngineResult<ReleaseOutcome> {
        let batch: BTreeSet<SlotKey> = keys.iter().copied().collect();
        if batch.is_empty() {
            return Ok(ReleaseOutcome {
                released: Vec::new(),
                refund: Decimal::ZERO,
            });
        }

        let _guards = self.locks.acquire_sorted(&batch).await;
        self.mutate(|doc, clock| {
            for key in &batch {
                validate_release(doc, clock, username, *key)?;
            }
            let refund = doc.config.refund;
            for key in &batch {
                apply_release(doc, username, *key, refund);
            }
            Ok(ReleaseOutcome {
                released: batch.iter().copied().collect(),
                refund: refund * Decimal::from(batch.len() as u64),
            })
        })
        .await
    }
}

/// Status/existence checks plus the (required price, incremental
/// commitment) pair for one prospective bid.
fn validate_bid(
    doc: &Document,
    username: &str,
    key: SlotKey,
) -> EngineResult<(u32, Decimal)> {
    if !doc.users.contains_key(username) {
        return Err(EngineError::UnknownUser(username.to_string()));
    }
    let day = doc
        .days
        .get(&key.day)
        .ok_or(EngineError::UnknownDay(key.day))?;
    if day.status != DayStatus::Open {
        return Err(EngineError::SlotUnavailable(format!(
            "day {} is not open for bidding",
            key.day
        )));
    }
    let slot = doc.slot(&key).ok_or(EngineError::UnknownSlot(key))?;

    let required = slot.price + 1;
    // Re-bidding a slot you already hold only adds the increment on top of
    // your standing commitment.
    let increment = if slot.winner.as_deref() == Some(username) {
        Decimal::ONE
    } else {
        Decimal::from(required)
    };
    Ok((required, increment))
}

fn require_afford(doc: &Document, username: &str, additional: Decimal) -> EngineResult<()> {
    let available = ledger::available(doc, username)
        .ok_or_else(|| EngineError::UnknownUser(username.to_string()))?;
    if available < additional {
        return Err(EngineError::InsufficientCredits {
            required: additional,
            available,
        });
    }
    Ok(())
}

/// Apply an already-validated bid. Infallible by construction.
fn apply_bid(
    doc: &mut Document,
    clock: &Clock,
    username: &str,
    key: SlotKey,
    required: u32,
) -> BidOutcome {
    let ts = clock.now().fixed_offset();
    let slot = doc
        .slot_mut(&key)
        .expect("bid was validated against an existing slot");

    let previous_winner = slot.winner.clone();
    let previous_price = slot.price;

    slot.price = required;
    slot.winner = Some(username.to_string());
    slot.bids.push(store::BidEntry {
        user: username.to_string(),
        price: required,
        ts,
        undone: false,
        extra: Default::default(),
    });

    if let Some(prev) = previous_winner.as_deref() {
        if prev != username {
            notify::push_outbid(doc, prev, key);
        }
    }

    BidOutcome {
        slot: key,
        new_price: required,
        previous_winner,
        previous_price,
    }
}

fn validate_release(
    doc: &Document,
    clock: &Clock,
    username: &str,
    key: SlotKey,
) -> EngineResult<()> {
    if !doc.users.contains_key(username) {
        return Err(EngineError::UnknownUser(username.to_string()));
    }
    let day = doc
        .days
        .get(&key.day)
        .ok_or(EngineError::UnknownDay(key.day))?;
    if day.status != DayStatus::Executing {
        return Err(EngineError::SlotUnavailable(format!(
            "day {} is not executing",
            key.day
        )));
    }
    let slot = doc.slot(&key).ok_or(EngineError::UnknownSlot(key))?;
    if slot.winner.as_deref() != Some(username) {
        return Err(EngineError::Forbidden(
            "only the slot winner may release it".to_string(),
        ));
    }
    let starts = clock.hour_start(key.day, key.hour);
    if starts < clock.now() + chrono::Duration::hours(1) {
        return Err(EngineError::SlotUnavailable(
            "slot starts too soon to release".to_string(),
        ));
    }
    Ok(())
}

/// Clear the slot back to unallocated and credit the refund.
fn apply_release(doc: &mut Document, username: &str, key: SlotKey, refund: Decimal) {
    if let Some(slot) = doc.slot_mut(&key) {
        slot.winner = None;
        slot.price = 0;
        slot.bids.clear();
    }
    if let Some(user) = doc.users.get_mut(username) {
        ledger::refund_release(user, refund);
    }
}
