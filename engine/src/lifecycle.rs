//! Day lifecycle: planning, promotion to executing, finalization.
//!
//! `tick` is invoked from every write path and from a 60-second timer. It
//! is idempotent, serialized by the global lock, and persists one write per
//! transition step, so a crash mid-catch-up resumes cleanly on the next
//! tick. Catch-up after downtime is capped per tick; successive ticks keep
//! going.

use rust_decimal::Decimal;

use common::clock::Clock;
use common::keys::DayKey;
use store::{Day, DayStatus, Document};

use crate::engine::Engine;
use crate::error::EngineResult;
use crate::ledger;
use crate::notify;
use crate::usage;

/// Bound on transitions applied by a single tick, so a long outage cannot
/// wedge one request in catch-up work.
pub const MAX_TRANSITIONS_PER_TICK: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Created or promoted planned days.
    Planned,
    /// A day entered `executing`; winners were charged.
    Started(DayKey),
    /// A day entered `final`; usage frozen, rollover applied.
    Finalized(DayKey),
}

impl Engine {
    /// Advance the day state machine as far as the current time warrants.
    pub async fn tick(&self) -> EngineResult<Vec<Transition>> {
        let mut applied = Vec::new();
        for _ in 0..MAX_TRANSITIONS_PER_TICK {
            let step = self
                .mutate_if(|doc, clock| Ok(advance_once(doc, clock)))
                .await?;
            let Some(transition) = step else { break };

            if let Transition::Finalized(day) = transition {
                self.locks.purge_day(day);
            }
            tracing::info!(?transition, "lifecycle transition");
            applied.push(transition);
        }
        Ok(applied)
    }

    /// Admin override: force the next transition now, ignoring the clock.
    ///
    /// Finalizes the executing day if there is one, otherwise starts the
    /// earliest non-final day. Rollover stays once-per-day even when a
    /// transition is forced repeatedly.
    pub async fn force_advance(&self) -> EngineResult<Option<Transition>> {
        let step = self
            .mutate_if(|doc, clock| {
                if let Some(day) = executing_day(doc) {
                    finalize_day(doc, clock, day);
                    return Ok(Some(Transition::Finalized(day)));
                }
                let next = doc
                    .days
                    .iter()
                    .find(|(_, d)| d.status != DayStatus::Final)
                    .map(|(k, _)| *k);
                match next {
                    Some(day) => {
                        start_day(doc, day);
                        Ok(Some(Transition::Started(day)))
                    }
                    None => Ok(None),
                }
            })
            .await?;

        if let Some(Transition::Finalized(day)) = step {
            self.locks.purge_day(day);
        }
        Ok(step)
    }
}

/// One lifecycle step, in priority order. Returns `None` when the document
/// already reflects the current time.
fn advance_once(doc: &mut Document, clock: &Clock) -> Option<Transition> {
    let now = clock.now();

    if let Some(day) = executing_day(doc) {
        // Executing -> final once the day's last hour has passed.
        if clock.day_end(day) <= now {
            finalize_day(doc, clock, day);
            return Some(Transition::Finalized(day));
        }
    } else {
        // Bootstrapping or between days: the earliest non-final day that
        // has started becomes the executing one.
        let candidate = doc
            .days
            .iter()
            .filter(|(_, d)| d.status != DayStatus::Final)
            .map(|(k, _)| *k)
            .find(|k| clock.day_start(*k) <= now);
        if let Some(day) = candidate {
            start_day(doc, day);
            return Some(Transition::Started(day));
        }
    }

    if plan_days(doc, clock) {
        return Some(Transition::Planned);
    }
    None
}

fn executing_day(doc: &Document) -> Option<DayKey> {
    doc.days
        .iter()
        .find(|(_, d)| d.status == DayStatus::Executing)
        .map(|(k, _)| *k)
}

/// Keep the open window planned: every day from today through the horizon
/// exists and is at least `open`.
fn plan_days(doc: &mut Document, clock: &Clock) -> bool {
    let labels = clock.hour_labels();
    let num_gpus = doc.config.num_gpus;
    let mut changed = false;

    let mut day = clock.today();
    for _ in 0..=doc.config.planning_horizon_days {
        match doc.days.get_mut(&day) {
            None => {
                doc.days
                    .insert(day, Day::empty(DayStatus::Open, &labels, num_gpus));
                changed = true;
            }
            Some(d) if d.status == DayStatus::Future => {
                d.status = DayStatus::Open;
                changed = true;
            }
            Some(_) => {}
        }
        day = day.next();
    }
    changed
}

/// Open -> executing: debit every winner, drop the day's outbid queues.
///
/// Bid validation makes overcommitment impossible, but a charge that would
/// go negative is still checked for: the slot is zeroed, the inconsistency
/// logged, and the transition continues.
fn start_day(doc: &mut Document, day: DayKey) {
    let winners: Vec<(u8, u8, String, u32)> = doc
        .days
        .get(&day)
        .map(|d| {
            d.slots
                .iter()
                .flat_map(|(hour, slots)| {
                    let hour = hour.0;
                    slots.iter().filter_map(move |s| {
                        s.winner
                            .as_ref()
                            .map(|w| (hour, s.gpu, w.clone(), s.price))
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    for (hour, gpu, winner, price) in winners {
        let charged = doc
            .users
            .get_mut(&winner)
            .map(|user| ledger::charge_on_commit(user, Decimal::from(price)));

        let zero_reason = match charged {
            Some(Ok(())) => None,
            Some(Err(balance)) => Some(format!(
                "winner {winner} cannot cover price {price} (balance {balance})"
            )),
            None => Some(format!("winner {winner} does not exist")),
        };

        if let Some(reason) = zero_reason {
            tracing::error!(%day, hour, gpu, %reason, "inconsistent slot at commit; zeroing");
            let key = common::keys::SlotKey::new(day, hour, gpu);
            if let Some(slot) = doc.slot_mut(&key) {
                slot.winner = None;
                slot.price = 0;
                slot.bids.clear();
            }
        }
    }

    if let Some(d) = doc.days.get_mut(&day) {
        d.status = DayStatus::Executing;
    }
    notify::clear_day(doc, day);
}

/// Executing -> final: freeze usage, apply rollover once per user, purge
/// expired samples.
fn finalize_day(doc: &mut Document, clock: &Clock, day: DayKey) {
    usage::finalize_day_usage(doc, day);

    let rollover = doc.config.rollover;
    for user in doc.users.values_mut() {
        ledger::apply_rollover(user, day, rollover);
    }

    if let Some(d) = doc.days.get_mut(&day) {
        d.status = DayStatus::Final;
        d.finalized_at = Some(clock.now().fixed_offset());
    }

    // Sample retention: the finalized day stays (it is now the previous
    // day); anything older goes.
    doc.usage_samples.retain(|k, _| *k >= day);
}
