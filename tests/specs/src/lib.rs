// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end scenario tests.
//!
//! Drives the real components in-process. The broker peer is simulated by
//! [`EchoPeer`], which answers every command with a jittered state echo the
//! way a physical device (or the conformance simulator) would.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::Duration;

use hearth::broker::{MatchFn, StateBroker};
use hearth::error::HomeError;
use hearth::registry::{Device, DeviceRegistry};
use hearth::tools::ToolInvoker;

/// A scripted broker peer that echoes commands back as state.
///
/// Deterministic stand-in for the echo simulator: numeric fields are offset
/// by a configurable amount so tolerance handling is exercised.
#[derive(Default)]
pub struct EchoPeer {
    pub brightness_offset: i64,
    pub position_offset: i64,
    pub target_offset: f64,
    published: Mutex<Vec<(String, Value)>>,
}

impl EchoPeer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jitter(brightness: i64, position: i64, target: f64) -> Self {
        Self {
            brightness_offset: brightness,
            position_offset: position,
            target_offset: target,
            published: Mutex::new(Vec::new()),
        }
    }

    pub async fn published(&self) -> Vec<(String, Value)> {
        self.published.lock().await.clone()
    }

    fn echo_for(&self, payload: &Value) -> Value {
        let mut echo = payload.clone();
        if let Some(obj) = echo.as_object_mut() {
            if let Some(b) = obj.get("brightness").and_then(Value::as_i64) {
                obj.insert(
                    "brightness".to_owned(),
                    json!((b + self.brightness_offset).clamp(0, 100)),
                );
            }
            if let Some(p) = obj.get("position").and_then(Value::as_i64) {
                obj.insert(
                    "position".to_owned(),
                    json!((p + self.position_offset).clamp(0, 100)),
                );
            }
            if let Some(t) = obj.get("target").and_then(Value::as_f64) {
                obj.insert("target".to_owned(), json!(t + self.target_offset));
            }
            obj.insert("ts".to_owned(), json!(0.0));
        }
        echo
    }
}

#[async_trait]
impl StateBroker for EchoPeer {
    async fn publish_json(&self, subject: &str, payload: &Value) -> Result<(), HomeError> {
        self.published.lock().await.push((subject.to_owned(), payload.clone()));
        Ok(())
    }

    async fn wait_for_state(
        &self,
        _subject: &str,
        _predicate: MatchFn,
        _timeout: Duration,
    ) -> Result<Value, HomeError> {
        // Nothing publishes unprompted in this harness.
        Err(HomeError::Timeout)
    }

    async fn publish_and_wait(
        &self,
        set_subject: &str,
        payload: &Value,
        _state_subject: &str,
        predicate: MatchFn,
        _timeout: Duration,
    ) -> Result<Value, HomeError> {
        self.publish_json(set_subject, payload).await?;
        let echo = self.echo_for(payload);
        if predicate(&echo) {
            Ok(echo)
        } else {
            Err(HomeError::Timeout)
        }
    }

    async fn publish_without_wait(
        &self,
        subject: &str,
        payload: &Value,
    ) -> Result<(), HomeError> {
        self.publish_json(subject, payload).await
    }
}

/// Recording tool invoker for engine/supervisor scenarios.
#[derive(Default)]
pub struct RecordingInvoker {
    calls: Mutex<Vec<(String, Value)>>,
}

impl RecordingInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().await.clone()
    }

    pub async fn count(&self, tool: &str) -> usize {
        self.calls.lock().await.iter().filter(|(t, _)| t == tool).count()
    }
}

#[async_trait]
impl ToolInvoker for RecordingInvoker {
    async fn invoke(&self, tool: &str, args: &Value) -> Result<Value, HomeError> {
        self.calls.lock().await.push((tool.to_owned(), args.clone()));
        Ok(json!({"echoed": tool}))
    }
}

/// Registry with the devices the control-plane scenarios talk about.
pub fn scenario_registry() -> anyhow::Result<Arc<DeviceRegistry>> {
    let devices: Vec<Device> = serde_json::from_value(json!([
        {"id": "light_living_main", "type": "light", "room": "living",
         "topics": {"set": "home.device.light_living_main.set",
                    "state": "home.device.light_living_main.state"}},
        {"id": "cover_kitchen", "type": "cover", "room": "kitchen",
         "topics": {"set": "home.device.cover_kitchen.set",
                    "state": "home.device.cover_kitchen.state"}},
        {"id": "m1", "type": "sensor", "room": "living",
         "topics": {"set": "home.sensor.m1.set", "state": "home.sensor.m1.state"}}
    ]))?;
    Ok(Arc::new(DeviceRegistry::from_devices(devices)?))
}
