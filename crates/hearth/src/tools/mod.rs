// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device-control tools.
//!
//! Every tool is one broker round trip: validate the target against the
//! registry, publish a typed command to the device's `set` subject, then wait
//! on the `state` subject for an echo matching a type-specific predicate.
//! Numeric predicates carry tolerances because the physical layer answers
//! with jitter. The [`ToolInvoker`] trait is the dispatch seam used by the
//! rule engine, the supervisor, and the HTTP surface.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Duration;

use crate::broker::StateBroker;
use crate::error::HomeError;
use crate::metrics::Metrics;
use crate::payload::DevicePayload;
use crate::registry::{Device, DeviceKind, DeviceRegistry};

/// Default echo wait for command round trips.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
/// Shorter wait for pure status reads.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(1);

/// Aggregate security subjects (not tied to a registry device).
pub const SECURITY_SET_SUBJECT: &str = "home.security.set";
pub const SECURITY_STATE_SUBJECT: &str = "home.security.state";

const BRIGHTNESS_TOLERANCE: i64 = 5;
const POSITION_TOLERANCE: i64 = 2;
const TEMPERATURE_TOLERANCE: f64 = 0.5;

/// Seam between tool callers and the tools component.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Invoke a tool by name with JSON arguments, returning the echoed state.
    async fn invoke(&self, tool: &str, args: &Value) -> Result<Value, HomeError>;
}

// -- Request types -------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlLightReq {
    pub device_id: String,
    pub state: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceIdReq {
    pub device_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverSetPositionReq {
    pub device_id: String,
    pub position: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetThermostatReq {
    pub device_id: String,
    pub temperature: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmSecurityReq {
    #[serde(default = "default_security_mode")]
    pub mode: String,
}

fn default_security_mode() -> String {
    "away".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorIdReq {
    pub sensor_id: String,
}

// -- Echo predicates -----------------------------------------------------------

pub(crate) fn light_echo_matches(echo: &Value, want_state: &str, want: Option<i64>) -> bool {
    match DevicePayload::parse(echo) {
        Some(DevicePayload::Light { state, brightness }) => {
            if state != want_state {
                return false;
            }
            // Brightness only constrains echoes that report one.
            match (want, brightness) {
                (Some(want), Some(got)) => (got - want).abs() <= BRIGHTNESS_TOLERANCE,
                _ => true,
            }
        }
        _ => false,
    }
}

pub(crate) fn lock_echo_matches(echo: &Value, want_state: &str) -> bool {
    matches!(DevicePayload::parse(echo),
        Some(DevicePayload::Lock { state }) if state == want_state)
}

pub(crate) fn cover_echo_matches(echo: &Value, want_position: i64) -> bool {
    matches!(DevicePayload::parse(echo),
        Some(DevicePayload::Cover { position }) if (position - want_position).abs() <= POSITION_TOLERANCE)
}

pub(crate) fn switch_echo_matches(echo: &Value, want_state: &str) -> bool {
    matches!(DevicePayload::parse(echo),
        Some(DevicePayload::Switch { state }) if state == want_state)
}

pub(crate) fn thermostat_echo_matches(echo: &Value, want_target: f64) -> bool {
    matches!(DevicePayload::parse(echo),
        Some(DevicePayload::Thermostat { target }) if (target - want_target).abs() <= TEMPERATURE_TOLERANCE)
}

pub(crate) fn siren_echo_matches(echo: &Value, want_state: &str) -> bool {
    matches!(DevicePayload::parse(echo),
        Some(DevicePayload::Siren { state }) if state == want_state)
}

pub(crate) fn security_echo_matches(echo: &Value, want_mode: &str) -> bool {
    matches!(DevicePayload::parse(echo),
        Some(DevicePayload::Security { mode }) if mode == want_mode)
}

// -- Tools ---------------------------------------------------------------------

pub struct HomeTools {
    broker: Arc<dyn StateBroker>,
    registry: Arc<DeviceRegistry>,
    metrics: Arc<Metrics>,
}

impl HomeTools {
    pub fn new(
        broker: Arc<dyn StateBroker>,
        registry: Arc<DeviceRegistry>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { broker, registry, metrics }
    }

    fn device(&self, device_id: &str, expected: DeviceKind) -> Result<&Device, HomeError> {
        let device = self
            .registry
            .get(device_id)
            .ok_or_else(|| HomeError::UnknownDevice(device_id.to_owned()))?;
        if device.kind != expected {
            return Err(HomeError::WrongType {
                device: device_id.to_owned(),
                expected: expected.as_str(),
            });
        }
        Ok(device)
    }

    pub async fn control_light(
        &self,
        device_id: &str,
        on: bool,
        brightness: Option<i64>,
    ) -> Result<Value, HomeError> {
        let device = self.device(device_id, DeviceKind::Light)?;
        let want_state = if on { "ON" } else { "OFF" };
        let brightness = brightness.map(|b| b.clamp(0, 100));
        let payload =
            DevicePayload::Light { state: want_state.to_owned(), brightness }.to_value();
        let want_state = want_state.to_owned();
        self.broker
            .publish_and_wait(
                &device.topics.set,
                &payload,
                &device.topics.state,
                Box::new(move |echo| light_echo_matches(echo, &want_state, brightness)),
                DEFAULT_TIMEOUT,
            )
            .await
    }

    pub async fn lock_door(&self, device_id: &str) -> Result<Value, HomeError> {
        self.set_lock(device_id, "LOCKED").await
    }

    pub async fn unlock_door(&self, device_id: &str) -> Result<Value, HomeError> {
        self.set_lock(device_id, "UNLOCKED").await
    }

    async fn set_lock(&self, device_id: &str, want_state: &str) -> Result<Value, HomeError> {
        let device = self.device(device_id, DeviceKind::Lock)?;
        let payload = DevicePayload::Lock { state: want_state.to_owned() }.to_value();
        let want = want_state.to_owned();
        self.broker
            .publish_and_wait(
                &device.topics.set,
                &payload,
                &device.topics.state,
                Box::new(move |echo| lock_echo_matches(echo, &want)),
                DEFAULT_TIMEOUT,
            )
            .await
    }

    pub async fn cover_set_position(
        &self,
        device_id: &str,
        position: i64,
    ) -> Result<Value, HomeError> {
        let device = self.device(device_id, DeviceKind::Cover)?;
        let position = position.clamp(0, 100);
        let payload = DevicePayload::Cover { position }.to_value();
        self.broker
            .publish_and_wait(
                &device.topics.set,
                &payload,
                &device.topics.state,
                Box::new(move |echo| cover_echo_matches(echo, position)),
                DEFAULT_TIMEOUT,
            )
            .await
    }

    pub async fn switch_on(&self, device_id: &str) -> Result<Value, HomeError> {
        self.set_switch(device_id, "ON").await
    }

    pub async fn switch_off(&self, device_id: &str) -> Result<Value, HomeError> {
        self.set_switch(device_id, "OFF").await
    }

    async fn set_switch(&self, device_id: &str, want_state: &str) -> Result<Value, HomeError> {
        let device = self.device(device_id, DeviceKind::Switch)?;
        let payload = DevicePayload::Switch { state: want_state.to_owned() }.to_value();
        let want = want_state.to_owned();
        self.broker
            .publish_and_wait(
                &device.topics.set,
                &payload,
                &device.topics.state,
                Box::new(move |echo| switch_echo_matches(echo, &want)),
                DEFAULT_TIMEOUT,
            )
            .await
    }

    pub async fn set_thermostat(
        &self,
        device_id: &str,
        temperature: f64,
    ) -> Result<Value, HomeError> {
        let device = self.device(device_id, DeviceKind::Thermostat)?;
        let payload = DevicePayload::Thermostat { target: temperature }.to_value();
        self.broker
            .publish_and_wait(
                &device.topics.set,
                &payload,
                &device.topics.state,
                Box::new(move |echo| thermostat_echo_matches(echo, temperature)),
                DEFAULT_TIMEOUT,
            )
            .await
    }

    pub async fn siren_on(&self, device_id: &str) -> Result<Value, HomeError> {
        self.set_siren(device_id, "ON").await
    }

    pub async fn siren_off(&self, device_id: &str) -> Result<Value, HomeError> {
        self.set_siren(device_id, "OFF").await
    }

    async fn set_siren(&self, device_id: &str, want_state: &str) -> Result<Value, HomeError> {
        let device = self.device(device_id, DeviceKind::Siren)?;
        let payload = DevicePayload::Siren { state: want_state.to_owned() }.to_value();
        let want = want_state.to_owned();
        self.broker
            .publish_and_wait(
                &device.topics.set,
                &payload,
                &device.topics.state,
                Box::new(move |echo| siren_echo_matches(echo, &want)),
                DEFAULT_TIMEOUT,
            )
            .await
    }

    /// Arm the whole-home security aggregate (`away` / `night` / `home`).
    pub async fn arm_security(&self, mode: &str) -> Result<Value, HomeError> {
        self.set_security(mode).await
    }

    pub async fn disarm_security(&self) -> Result<Value, HomeError> {
        self.set_security("disarmed").await
    }

    async fn set_security(&self, mode: &str) -> Result<Value, HomeError> {
        let payload = DevicePayload::Security { mode: mode.to_owned() }.to_value();
        let want = mode.to_owned();
        self.broker
            .publish_and_wait(
                SECURITY_SET_SUBJECT,
                &payload,
                SECURITY_STATE_SUBJECT,
                Box::new(move |echo| security_echo_matches(echo, &want)),
                DEFAULT_TIMEOUT,
            )
            .await
    }

    /// Wait for the next state publication from any known device.
    pub async fn get_device_status(&self, device_id: &str) -> Result<Value, HomeError> {
        let device = self
            .registry
            .get(device_id)
            .ok_or_else(|| HomeError::UnknownDevice(device_id.to_owned()))?;
        self.broker
            .wait_for_state(&device.topics.state, Box::new(|_| true), STATUS_TIMEOUT)
            .await
    }

    /// Wait for the next publication on a sensor's well-known subject.
    pub async fn get_sensor_data(&self, sensor_id: &str) -> Result<Value, HomeError> {
        let subject = sensor_state_subject(sensor_id);
        self.broker.wait_for_state(&subject, Box::new(|_| true), STATUS_TIMEOUT).await
    }

    /// Publish a synthetic sensor reading (test and simulation helper).
    pub async fn emit_sensor(&self, sensor_id: &str, value: Value) -> Result<(), HomeError> {
        let subject = sensor_state_subject(sensor_id);
        let payload = serde_json::json!({"type": "generic", "value": value});
        self.broker.publish_without_wait(&subject, &payload).await
    }

    async fn dispatch(&self, tool: &str, args: &Value) -> Result<Value, HomeError> {
        match tool {
            "control_light" => {
                let req: ControlLightReq = parse_args(args)?;
                self.control_light(&req.device_id, req.state, req.brightness).await
            }
            "lock_door" => {
                let req: DeviceIdReq = parse_args(args)?;
                self.lock_door(&req.device_id).await
            }
            "unlock_door" => {
                let req: DeviceIdReq = parse_args(args)?;
                self.unlock_door(&req.device_id).await
            }
            "cover_set_position" => {
                let req: CoverSetPositionReq = parse_args(args)?;
                self.cover_set_position(&req.device_id, req.position).await
            }
            "switch_on" => {
                let req: DeviceIdReq = parse_args(args)?;
                self.switch_on(&req.device_id).await
            }
            "switch_off" => {
                let req: DeviceIdReq = parse_args(args)?;
                self.switch_off(&req.device_id).await
            }
            "set_thermostat" => {
                let req: SetThermostatReq = parse_args(args)?;
                if !(5.0..=35.0).contains(&req.temperature) {
                    return Err(HomeError::InvalidArgs(format!(
                        "temperature out of range: {}",
                        req.temperature
                    )));
                }
                self.set_thermostat(&req.device_id, req.temperature).await
            }
            "siren_on" => {
                let req: DeviceIdReq = parse_args(args)?;
                self.siren_on(&req.device_id).await
            }
            "siren_off" => {
                let req: DeviceIdReq = parse_args(args)?;
                self.siren_off(&req.device_id).await
            }
            "arm_security" => {
                let req: ArmSecurityReq = parse_args(args)?;
                if !matches!(req.mode.as_str(), "away" | "night" | "home") {
                    return Err(HomeError::InvalidArgs(format!(
                        "unknown security mode: {}",
                        req.mode
                    )));
                }
                self.arm_security(&req.mode).await
            }
            "disarm_security" => self.disarm_security().await,
            "get_device_status" => {
                let req: DeviceIdReq = parse_args(args)?;
                self.get_device_status(&req.device_id).await
            }
            "get_sensor_data" => {
                let req: SensorIdReq = parse_args(args)?;
                self.get_sensor_data(&req.sensor_id).await
            }
            // Notification delivery has no broker leg; accepted and dropped.
            "notify" => Ok(Value::Null),
            other => Err(HomeError::ToolFailed(format!("unknown tool: {other}"))),
        }
    }
}

#[async_trait]
impl ToolInvoker for HomeTools {
    async fn invoke(&self, tool: &str, args: &Value) -> Result<Value, HomeError> {
        let started = std::time::Instant::now();
        let result = self.dispatch(tool, args).await;
        let outcome = if result.is_ok() { "ok" } else { "err" };
        self.metrics.tool_calls.with_label_values(&[tool, outcome]).inc();
        self.metrics
            .tool_latency_ms
            .with_label_values(&[tool])
            .observe(started.elapsed().as_secs_f64() * 1000.0);
        result
    }
}

fn parse_args<T: DeserializeOwned>(args: &Value) -> Result<T, HomeError> {
    serde_json::from_value(args.clone()).map_err(|e| HomeError::InvalidArgs(e.to_string()))
}

/// Well-known subject a sensor publishes on.
pub fn sensor_state_subject(sensor_id: &str) -> String {
    format!("home.sensor.{sensor_id}.state")
}

#[cfg(test)]
#[path = "match_tests.rs"]
mod tests;
