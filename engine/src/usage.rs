//! Usage-sample ingestion and per-hour attribution.
//!
//! An external monitor reports which users it sees on each GPU. The server
//! clock is authoritative: samples are always filed under the current hour,
//! and a payload timestamp is only checked for skew (warned about, never
//! dropped). At day finalization each slot's sample counters collapse into
//! a single `actual_user`.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};

use common::keys::{DayKey, GpuKey, HourKey, SlotKey};
use store::{DayStatus, Document, GpuSamples, Slot};

use crate::engine::Engine;
use crate::error::EngineResult;

/// Payload timestamps further than this from the server clock are logged
/// as out-of-sync.
const MAX_REPORT_SKEW_MINUTES: i64 = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct UsageReport {
    #[serde(default)]
    pub timestamp: Option<DateTime<FixedOffset>>,
    /// gpu index -> usernames currently observed on it.
    pub usage: BTreeMap<u8, Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GpuLive {
    pub gpu: u8,
    pub live_users: Vec<String>,
    pub winner: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveStatus {
    pub day: Option<DayKey>,
    pub hour: u8,
    pub gpus: Vec<GpuLive>,
}

impl Engine {
    /// Record one monitor report against the current hour.
    pub async fn ingest_usage(&self, report: UsageReport) -> EngineResult<()> {
        self.mutate(|doc, clock| {
            let now = clock.now();
            if let Some(ts) = report.timestamp {
                let skew = (now.fixed_offset() - ts).abs();
                if skew > Duration::minutes(MAX_REPORT_SKEW_MINUTES) {
                    tracing::warn!(
                        payload_ts = %ts,
                        skew_secs = skew.num_seconds(),
                        "monitor report timestamp out of sync; using server time"
                    );
                }
            }

            let day = clock.day_of(now);
            let hour = clock.hour_label(now);

            for (gpu, users) in &report.usage {
                if *gpu >= doc.config.num_gpus {
                    tracing::warn!(gpu = *gpu, "monitor reported unknown gpu index");
                    continue;
                }

                if let Some(slot) = doc.slot_mut(&SlotKey::new(day, hour, *gpu)) {
                    slot.live_users = users.clone();
                }

                let counters = doc
                    .usage_samples
                    .entry(day)
                    .or_default()
                    .entry(HourKey(hour))
                    .or_default()
                    .entry(GpuKey(*gpu))
                    .or_default();
                for user in users {
                    *counters.entry(user.clone()).or_insert(0) += 1;
                }
            }
            Ok(())
        })
        .await
    }

    /// The current hour's observed users per GPU, for the executing day.
    pub async fn live_status(&self) -> LiveStatus {
        self.read(|doc| {
            let clock = self.clock();
            let now = clock.now();
            let day = clock.day_of(now);
            let hour = clock.hour_label(now);

            let executing = doc
                .days
                .get(&day)
                .filter(|d| d.status == DayStatus::Executing);

            let gpus = executing
                .and_then(|d| d.slots.get(&HourKey(hour)))
                .map(|slots| {
                    slots
                        .iter()
                        .map(|s| GpuLive {
                            gpu: s.gpu,
                            live_users: s.live_users.clone(),
                            winner: s.winner.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default();

            LiveStatus {
                day: executing.map(|_| day),
                hour,
                gpus,
            }
        })
        .await
    }
}

/// Collapse each slot's sample counters into its final `actual_user` and
/// drop the transient live sets. Called once, when the day finalizes.
pub(crate) fn finalize_day_usage(doc: &mut Document, day: DayKey) {
    let samples = doc.usage_samples.get(&day).cloned().unwrap_or_default();

    if let Some(d) = doc.days.get_mut(&day) {
        for (hour, slots) in d.slots.iter_mut() {
            for slot in slots.iter_mut() {
                slot.actual_user = samples
                    .get(hour)
                    .and_then(|gpus| gpus.get(&GpuKey(slot.gpu)))
                    .and_then(most_frequent);
                slot.live_users.clear();
            }
        }
    }
}

/// The user with the highest sample count; ties go to the earliest
/// observed (insertion order).
pub fn most_frequent(samples: &GpuSamples) -> Option<String> {
    let mut best: Option<(&str, u32)> = None;
    for (user, &count) in samples {
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((user.as_str(), count));
        }
    }
    best.map(|(user, _)| user.to_string())
}

/// Someone ran on the GPU who had not won the hour.
pub fn is_unauthorized(slot: &Slot) -> bool {
    match &slot.actual_user {
        Some(actual) => slot.winner.as_deref() != Some(actual.as_str()),
        None => false,
    }
}

/// The winner never showed up.
pub fn is_no_show(slot: &Slot) -> bool {
    slot.winner.is_some() && slot.actual_user.is_none()
}
