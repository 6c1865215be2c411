// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed device wire payloads.
//!
//! Every payload on a `set` or `state` subject is a JSON object with a `type`
//! tag. Known types parse into [`DevicePayload`] variants; anything else
//! (vision events, vendor extensions) stays raw JSON and is passed through
//! untouched. Echoed state may carry extra fields (`ts`, vendor data) — those
//! are ignored on parse.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A device state or command payload, keyed on its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DevicePayload {
    Light {
        state: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        brightness: Option<i64>,
    },
    Lock {
        state: String,
    },
    Cover {
        position: i64,
    },
    Switch {
        state: String,
    },
    Thermostat {
        target: f64,
    },
    Siren {
        state: String,
    },
    Security {
        mode: String,
    },
    /// Motion sensor publication (`home.sensor.<id>.state`).
    Motion {
        #[serde(default)]
        value: Value,
    },
    /// Illuminance sensor publication.
    Illuminance {
        lux: f64,
    },
}

impl DevicePayload {
    /// Parse a raw JSON value into a typed payload.
    ///
    /// Returns `None` for unknown `type` tags or shapes that do not fit the
    /// variant — callers treat those as raw pass-through.
    pub fn parse(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Serialize into the wire JSON object.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// JSON truthiness, matching how motion sensor values are interpreted:
/// `false`, `null`, `0`, `""`, empty arrays/objects are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
