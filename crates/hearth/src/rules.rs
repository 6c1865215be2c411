// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative automation rules.
//!
//! Rules arrive as JSON (config file or `POST /rules`) and parse into a typed
//! sum: time rules fire after a local time of day, sensor rules fire when a
//! cached device state subset-matches an expected shape. Guard records bound
//! the firing rate; all per-rule runtime state lives in the engine, not here.

use std::fmt;
use std::time::Duration;

use chrono::{NaiveTime, Timelike};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A single automation rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(flatten)]
    pub kind: RuleKind,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub safety: Safety,
    #[serde(default)]
    pub guards: Guards,
}

/// Rule condition, keyed on the `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuleKind {
    /// Fires once wall-clock time of day reaches `after`.
    Time { after: TimeOfDay },
    /// Fires while a cached sensor/device state matches the condition.
    Sensor { condition: SensorCondition },
}

/// Sensor-rule condition: where to look and what must match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorCondition {
    /// Device entity to inspect in the snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<String>,
    /// Alternative lookup key: a raw subject cached as a device entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Subset of fields the cached state must carry verbatim.
    #[serde(default)]
    pub equals: Value,
    /// Additional time-of-day gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<TimeOfDay>,
    /// Minimum interval since the rule last fired (ISO-8601, `PTxxMxxS`).
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub hold: Option<IsoDuration>,
}

/// A tool invocation performed when the rule fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub tool: String,
    #[serde(default = "empty_args")]
    pub args: Value,
}

fn empty_args() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Hard safety bound, checked before all other guards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Safety {
    #[serde(default)]
    pub rate_limit_per_min: f64,
}

/// Soft guards: firing windows and action retry policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Guards {
    #[serde(default)]
    pub debounce_ms: u64,
    #[serde(default)]
    pub throttle_per_min: f64,
    #[serde(default)]
    pub retry: Retry,
}

/// Per-action retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Retry {
    #[serde(default = "default_retry_max")]
    pub max: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_retry_max() -> u32 {
    1
}

fn default_backoff_ms() -> u64 {
    250
}

impl Default for Retry {
    fn default() -> Self {
        Self { max: default_retry_max(), backoff_ms: default_backoff_ms() }
    }
}

// -- Subset matching -----------------------------------------------------------

/// Whether every key/value pair of `expected` appears verbatim in `actual`.
///
/// A non-object `expected` matches everything (an empty condition is vacuous).
pub fn subset_match(expected: &Value, actual: &Value) -> bool {
    let Value::Object(expected) = expected else {
        return true;
    };
    expected.iter().all(|(key, want)| actual.get(key) == Some(want))
}

// -- Time of day ---------------------------------------------------------------

/// A local wall-clock `"HH:MM"` threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

impl TimeOfDay {
    pub fn parse(s: &str) -> Result<Self, String> {
        let Some((h, m)) = s.split_once(':') else {
            return Err(format!("expected HH:MM, got {s:?}"));
        };
        let hour: u32 = h.parse().map_err(|_| format!("bad hour in {s:?}"))?;
        let minute: u32 = m.parse().map_err(|_| format!("bad minute in {s:?}"))?;
        if hour > 23 || minute > 59 {
            return Err(format!("time of day out of range: {s:?}"));
        }
        Ok(Self { hour, minute })
    }

    /// Whether the given wall-clock time has reached this threshold.
    pub fn is_reached(&self, now: NaiveTime) -> bool {
        (now.hour(), now.minute()) >= (self.hour, self.minute)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(D::Error::custom)
    }
}

// -- ISO-8601 durations --------------------------------------------------------

/// Minimal ISO-8601 duration (`PT<m>M<s>S` form only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsoDuration {
    secs: u64,
}

impl IsoDuration {
    pub fn from_secs(secs: u64) -> Self {
        Self { secs }
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        let Some(mut rest) = s.strip_prefix("PT") else {
            return Err(format!("expected PT-prefixed duration, got {s:?}"));
        };
        let mut minutes: u64 = 0;
        if let Some((m, tail)) = rest.split_once('M') {
            minutes = parse_component(m, s)?;
            rest = tail;
        }
        let mut seconds: u64 = 0;
        if let Some(sec) = rest.strip_suffix('S') {
            seconds = parse_component(sec, s)?;
        } else if !rest.is_empty() {
            return Err(format!("trailing garbage in duration {s:?}"));
        }
        Ok(Self { secs: minutes * 60 + seconds })
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.secs)
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.secs as f64
    }
}

fn parse_component(part: &str, whole: &str) -> Result<u64, String> {
    if part.is_empty() {
        return Ok(0);
    }
    part.parse().map_err(|_| format!("bad duration component in {whole:?}"))
}

impl fmt::Display for IsoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PT{}M{}S", self.secs / 60, self.secs % 60)
    }
}

impl Serialize for IsoDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for IsoDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;
