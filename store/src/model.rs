//! The persisted document: one JSON-shaped value holding users, days,
//! slots, usage samples and notification queues.
//!
//! Every struct that appears in the persisted JSON carries a flattened
//! `extra` map so fields written by a newer build survive a load→save cycle
//! on an older one. `live_users` is the only transient field and is never
//! serialized.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use rust_decimal::{Decimal, dec};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use common::keys::{DayKey, GpuKey, HourKey, SlotKey};

/// Version 2 encodes the rollover formula
/// `balance = min(budget, balance) * rollover + budget`, applied at most
/// once per (user, day) via `rollover_applied_for_day`.
pub const DOCUMENT_VERSION: u32 = 2;

/// Per-user sample counters for one GPU-hour. Insertion order is
/// significant: it breaks ties when the most frequent user is picked.
pub type GpuSamples = IndexMap<String, u32>;

/// hour label -> gpu index -> sample counters.
pub type HourSamples = BTreeMap<HourKey, BTreeMap<GpuKey, GpuSamples>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub version: u32,
    pub config: Config,
    #[serde(default)]
    pub users: BTreeMap<String, User>,
    #[serde(default)]
    pub days: BTreeMap<DayKey, Day>,
    #[serde(default)]
    pub usage_samples: BTreeMap<DayKey, HourSamples>,
    #[serde(default)]
    pub notifications: BTreeMap<String, BTreeMap<DayKey, Vec<SlotKey>>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    pub fn bootstrap(config: Config) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            config,
            users: BTreeMap::new(),
            days: BTreeMap::new(),
            usage_samples: BTreeMap::new(),
            notifications: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    pub fn slot(&self, key: &SlotKey) -> Option<&Slot> {
        self.days
            .get(&key.day)?
            .slots
            .get(&HourKey(key.hour))?
            .iter()
            .find(|s| s.gpu == key.gpu)
    }

    pub fn slot_mut(&mut self, key: &SlotKey) -> Option<&mut Slot> {
        self.days
            .get_mut(&key.day)?
            .slots
            .get_mut(&HourKey(key.hour))?
            .iter_mut()
            .find(|s| s.gpu == key.gpu)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub num_gpus: u8,
    pub transition_hour: u8,
    /// Fraction of unused balance carried into the next refill.
    pub rollover: Decimal,
    /// Credits returned for a voluntary future-slot release.
    pub refund: Decimal,
    /// How many open days to keep planned ahead of the executing one.
    pub planning_horizon_days: u32,
    pub session_ttl_seconds: u64,
    /// IANA timezone name used for all day/hour arithmetic.
    pub timezone: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_gpus: 8,
            transition_hour: 0,
            rollover: dec!(0.5),
            refund: dec!(0.34),
            planning_horizon_days: 3,
            session_ttl_seconds: 12 * 60 * 60,
            timezone: "America/New_York".to_string(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub password_hash: String,
    pub salt: String,
    pub role: Role,
    pub weekly_budget: u32,
    pub balance: Decimal,
    /// Last day key whose end-of-day rollover has been applied to this
    /// user. Guards against applying the refill twice when a transition is
    /// replayed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollover_applied_for_day: Option<DayKey>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayStatus {
    Future,
    Open,
    Executing,
    Final,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Day {
    pub status: DayStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<FixedOffset>>,
    /// hour label -> one slot per GPU.
    pub slots: BTreeMap<HourKey, Vec<Slot>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Day {
    /// A fresh day: all 24 hour labels present, every slot unclaimed.
    pub fn empty(status: DayStatus, hour_labels: &[u8; 24], num_gpus: u8) -> Self {
        let slots = hour_labels
            .iter()
            .map(|&hour| (HourKey(hour), (0..num_gpus).map(Slot::unclaimed).collect()))
            .collect();
        Self {
            status,
            finalized_at: None,
            slots,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub gpu: u8,
    pub price: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    #[serde(default)]
    pub bids: Vec<BidEntry>,
    /// Most frequent observed user over the completed hour; set exactly
    /// once, at day finalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_user: Option<String>,
    /// Users the monitor currently sees on this GPU. Current hour only,
    /// never persisted.
    #[serde(skip)]
    pub live_users: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Slot {
    pub fn unclaimed(gpu: u8) -> Self {
        Self {
            gpu,
            price: 0,
            winner: None,
            bids: Vec::new(),
            actual_user: None,
            live_users: Vec::new(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidEntry {
    pub user: String,
    pub price: u32,
    pub ts: DateTime<FixedOffset>,
    /// Kept (annotated, not removed) when the bid is undone.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub undone: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_day_has_full_grid() {
        let labels: [u8; 24] = std::array::from_fn(|i| ((9 + i) % 24) as u8);
        let day = Day::empty(DayStatus::Open, &labels, 4);
        assert_eq!(day.slots.len(), 24);
        for slots in day.slots.values() {
            assert_eq!(slots.len(), 4);
            assert!(slots.iter().all(|s| s.price == 0 && s.winner.is_none()));
        }
    }

    #[test]
    fn slot_lookup_by_key() {
        let labels: [u8; 24] = std::array::from_fn(|i| i as u8);
        let mut doc = Document::bootstrap(Config::default());
        let day: DayKey = "2025-06-10".parse().unwrap();
        doc.days
            .insert(day, Day::empty(DayStatus::Open, &labels, 2));

        assert!(doc.days[&day].slots.contains_key(&HourKey(14)));
        let key = common::keys::SlotKey::new(day, 14, 1);
        assert!(doc.slot(&key).is_some());
        doc.slot_mut(&key).unwrap().price = 3;
        assert_eq!(doc.slot(&key).unwrap().price, 3);

        let missing = common::keys::SlotKey::new(day, 14, 7);
        assert!(doc.slot(&missing).is_none());
    }
}
