//! Key types identifying days and schedulable slots.
//!
//! Both keys serialize as strings so they can be used directly as JSON map
//! keys in the persisted document. `SlotKey` ordering is lexicographic on
//! (day, hour, gpu), which is the canonical acquisition order for bulk
//! operations.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid day key: {0}")]
    InvalidDay(String),

    #[error("invalid hour key: {0}")]
    InvalidHour(String),

    #[error("invalid gpu key: {0}")]
    InvalidGpu(String),

    #[error("invalid slot key: {0}")]
    InvalidSlot(String),
}

/// Local calendar date identifying one scheduling day, rendered `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0.succ_opt().expect("day key out of calendar range"))
    }

    pub fn prev(&self) -> Self {
        Self(self.0.pred_opt().expect("day key out of calendar range"))
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DayKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(DayKey)
            .map_err(|_| KeyError::InvalidDay(s.to_string()))
    }
}

impl Serialize for DayKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DayKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Hour-of-day label used as a JSON map key, rendered zero-padded
/// (`"00"`..`"23"`) so lexicographic key order matches numeric order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HourKey(pub u8);

impl From<u8> for HourKey {
    fn from(hour: u8) -> Self {
        Self(hour)
    }
}

impl fmt::Display for HourKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl FromStr for HourKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hour: u8 = s
            .parse()
            .map_err(|_| KeyError::InvalidHour(s.to_string()))?;
        if hour > 23 {
            return Err(KeyError::InvalidHour(s.to_string()));
        }
        Ok(Self(hour))
    }
}

impl Serialize for HourKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HourKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// GPU index used as a JSON map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GpuKey(pub u8);

impl From<u8> for GpuKey {
    fn from(gpu: u8) -> Self {
        Self(gpu)
    }
}

impl fmt::Display for GpuKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GpuKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse()
            .map(GpuKey)
            .map_err(|_| KeyError::InvalidGpu(s.to_string()))
    }
}

impl Serialize for GpuKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GpuKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// One schedulable unit: a (day, hour, gpu) triple.
///
/// Rendered `<day>|<day>THH:00|<gpu>`, the same shape the outbid
/// notification queues store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey {
    pub day: DayKey,
    pub hour: u8,
    pub gpu: u8,
}

impl SlotKey {
    pub fn new(day: DayKey, hour: u8, gpu: u8) -> Self {
        Self { day, hour, gpu }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{day}|{day}T{hour:02}:00|{gpu}",
            day = self.day,
            hour = self.hour,
            gpu = self.gpu
        )
    }
}

impl FromStr for SlotKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || KeyError::InvalidSlot(s.to_string());

        let mut parts = s.split('|');
        let day: DayKey = parts.next().ok_or_else(bad)?.parse()?;
        let hour_part = parts.next().ok_or_else(bad)?;
        let gpu: u8 = parts
            .next()
            .ok_or_else(bad)?
            .parse()
            .map_err(|_| bad())?;
        if parts.next().is_some() {
            return Err(bad());
        }

        // "<day>THH:00"
        let time = hour_part.strip_prefix(&format!("{day}T")).ok_or_else(bad)?;
        let hour: u8 = time
            .strip_suffix(":00")
            .ok_or_else(bad)?
            .parse()
            .map_err(|_| bad())?;
        if hour > 23 {
            return Err(bad());
        }

        Ok(SlotKey { day, hour, gpu })
    }
}

impl Serialize for SlotKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
