//! Read-only views consumed by the HTTP layer.
//!
//! Each view is assembled from one consistent snapshot: the global lock is
//! held while the view structs are built and released before anything is
//! serialized.

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::Serialize;

use common::keys::{DayKey, GpuKey, HourKey};
use store::{DayStatus, Role};

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::ledger;
use crate::notify;
use crate::usage;

#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    pub gpu: u8,
    pub price: u32,
    pub winner: Option<String>,
    pub is_mine: bool,
    pub has_bid: bool,
    pub live_users: Vec<String>,
    pub most_frequent_user: Option<String>,
    pub actual_user: Option<String>,
    pub unauthorized: bool,
    pub no_show: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HourView {
    pub hour: u8,
    pub is_current_hour: bool,
    pub slots: Vec<SlotView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayView {
    pub day: DayKey,
    pub status: DayStatus,
    pub finalized_at: Option<DateTime<FixedOffset>>,
    pub has_notifications: bool,
    pub hours: Vec<HourView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub username: String,
    pub role: Role,
    pub weekly_budget: u32,
    pub balance: Decimal,
    pub committed: Decimal,
    pub available: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub day: DayKey,
    pub status: DayStatus,
    pub has_notifications: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub days: Vec<DaySummary>,
    pub user: UserSummary,
}

impl Engine {
    /// The full hour × gpu grid of one day, as seen by `viewer`.
    pub async fn day_view(&self, day: DayKey, viewer: &str) -> EngineResult<DayView> {
        self.read(|doc| {
            let d = doc.days.get(&day).ok_or(EngineError::UnknownDay(day))?;

            let clock = self.clock();
            let now = clock.now();
            let current_hour = (d.status == DayStatus::Executing
                && clock.day_of(now) == day)
                .then(|| clock.hour_label(now));

            let hours = clock
                .hour_labels()
                .iter()
                .filter_map(|hour| {
                    let slots = d.slots.get(&HourKey(*hour))?;
                    Some(HourView {
                        hour: *hour,
                        is_current_hour: current_hour == Some(*hour),
                        slots: slots
                            .iter()
                            .map(|slot| {
                                let counters = doc
                                    .usage_samples
                                    .get(&day)
                                    .and_then(|hours| hours.get(&HourKey(*hour)))
                                    .and_then(|gpus| gpus.get(&GpuKey(slot.gpu)));
                                SlotView {
                                    gpu: slot.gpu,
                                    price: slot.price,
                                    winner: slot.winner.clone(),
                                    is_mine: slot.winner.as_deref() == Some(viewer),
                                    has_bid: slot
                                        .bids
                                        .iter()
                                        .any(|b| !b.undone && b.user == viewer),
                                    live_users: slot.live_users.clone(),
                                    most_frequent_user: counters
                                        .and_then(usage::most_frequent),
                                    actual_user: slot.actual_user.clone(),
                                    unauthorized: usage::is_unauthorized(slot),
                                    no_show: usage::is_no_show(slot),
                                }
                            })
                            .collect(),
                    })
                })
                .collect();

            Ok(DayView {
                day,
                status: d.status,
                finalized_at: d.finalized_at,
                has_notifications: d.status == DayStatus::Open
                    && notify::has_notifications(doc, viewer, day),
                hours,
            })
        })
        .await
    }

    /// Day list plus the viewer's credit summary.
    pub async fn overview(&self, viewer: &str) -> EngineResult<Overview> {
        self.read(|doc| {
            let user = doc
                .users
                .get(viewer)
                .ok_or_else(|| EngineError::UnknownUser(viewer.to_string()))?;

            let committed = ledger::committed(doc, viewer);
            let days = doc
                .days
                .iter()
                .map(|(day, d)| DaySummary {
                    day: *day,
                    status: d.status,
                    has_notifications: d.status == DayStatus::Open
                        && notify::has_notifications(doc, viewer, *day),
                })
                .collect();

            Ok(Overview {
                days,
                user: UserSummary {
                    username: viewer.to_string(),
                    role: user.role,
                    weekly_budget: user.weekly_budget,
                    balance: user.balance,
                    committed,
                    available: user.balance - committed,
                },
            })
        })
        .await
    }

    /// Config snapshot for callers outside the lock.
    pub async fn config(&self) -> store::Config {
        self.read(|doc| doc.config.clone()).await
    }
}
