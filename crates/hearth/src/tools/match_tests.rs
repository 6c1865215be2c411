// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::Duration;

use super::*;
use crate::broker::{MatchFn, StateBroker};
use crate::error::HomeError;
use crate::registry::{Device, DeviceRegistry};

/// Scripted broker peer: records publishes, answers waits from a canned list
/// of state echoes per subject.
#[derive(Default)]
struct FakeBroker {
    published: Mutex<Vec<(String, Value)>>,
    echoes: Mutex<HashMap<String, Vec<Value>>>,
}

impl FakeBroker {
    async fn script(&self, subject: &str, echo: Value) {
        self.echoes.lock().await.entry(subject.to_owned()).or_default().push(echo);
    }

    async fn published(&self) -> Vec<(String, Value)> {
        self.published.lock().await.clone()
    }

    async fn answer(&self, subject: &str, predicate: &MatchFn) -> Result<Value, HomeError> {
        let echoes = self.echoes.lock().await;
        echoes
            .get(subject)
            .and_then(|list| list.iter().find(|echo| predicate(echo)))
            .cloned()
            .ok_or(HomeError::Timeout)
    }
}

#[async_trait]
impl StateBroker for FakeBroker {
    async fn publish_json(&self, subject: &str, payload: &Value) -> Result<(), HomeError> {
        self.published.lock().await.push((subject.to_owned(), payload.clone()));
        Ok(())
    }

    async fn wait_for_state(
        &self,
        subject: &str,
        predicate: MatchFn,
        _timeout: Duration,
    ) -> Result<Value, HomeError> {
        self.answer(subject, &predicate).await
    }

    async fn publish_and_wait(
        &self,
        set_subject: &str,
        payload: &Value,
        state_subject: &str,
        predicate: MatchFn,
        _timeout: Duration,
    ) -> Result<Value, HomeError> {
        self.publish_json(set_subject, payload).await?;
        self.answer(state_subject, &predicate).await
    }

    async fn publish_without_wait(
        &self,
        subject: &str,
        payload: &Value,
    ) -> Result<(), HomeError> {
        self.publish_json(subject, payload).await
    }
}

fn test_registry() -> Arc<DeviceRegistry> {
    let devices: Vec<Device> = serde_json::from_value(json!([
        {"id": "l1", "type": "light", "room": "living",
         "topics": {"set": "home.device.l1.set", "state": "home.device.l1.state"}},
        {"id": "d1", "type": "lock", "room": "hall",
         "topics": {"set": "home.device.d1.set", "state": "home.device.d1.state"}},
        {"id": "c1", "type": "cover", "room": "kitchen",
         "topics": {"set": "home.device.c1.set", "state": "home.device.c1.state"}},
        {"id": "t1", "type": "thermostat", "room": "living",
         "topics": {"set": "home.device.t1.set", "state": "home.device.t1.state"}}
    ]))
    .unwrap_or_default();
    Arc::new(DeviceRegistry::from_devices(devices).unwrap_or_default())
}

fn test_tools(broker: Arc<FakeBroker>) -> anyhow::Result<HomeTools> {
    let metrics = Arc::new(crate::metrics::Metrics::new()?);
    Ok(HomeTools::new(broker, test_registry(), metrics))
}

// -- Predicates ---------------------------------------------------------------

#[test]
fn light_predicate_has_brightness_tolerance() {
    let echo = json!({"type": "light", "state": "ON", "brightness": 47, "ts": 1.0});
    assert!(light_echo_matches(&echo, "ON", Some(50)));
    assert!(light_echo_matches(&echo, "ON", Some(52)));
    assert!(!light_echo_matches(&echo, "ON", Some(41)));
    assert!(!light_echo_matches(&echo, "OFF", Some(47)));

    // Echo without brightness matches on state alone even when requested.
    let bare = json!({"type": "light", "state": "ON"});
    assert!(light_echo_matches(&bare, "ON", Some(50)));
    // Wrong payload type never matches.
    assert!(!light_echo_matches(&json!({"type": "switch", "state": "ON"}), "ON", None));
}

#[test]
fn cover_predicate_has_position_tolerance() {
    assert!(cover_echo_matches(&json!({"type": "cover", "position": 99}), 100));
    assert!(cover_echo_matches(&json!({"type": "cover", "position": 100}), 98));
    assert!(!cover_echo_matches(&json!({"type": "cover", "position": 95}), 100));
    assert!(!cover_echo_matches(&json!({"type": "cover"}), 100));
}

#[test]
fn thermostat_predicate_has_half_degree_tolerance() {
    assert!(thermostat_echo_matches(&json!({"type": "thermostat", "target": 21.4}), 21.0));
    assert!(thermostat_echo_matches(&json!({"type": "thermostat", "target": 20.5}), 21.0));
    assert!(!thermostat_echo_matches(&json!({"type": "thermostat", "target": 22.0}), 21.0));
}

#[test]
fn exact_match_predicates() {
    assert!(lock_echo_matches(&json!({"type": "lock", "state": "LOCKED"}), "LOCKED"));
    assert!(!lock_echo_matches(&json!({"type": "lock", "state": "UNLOCKED"}), "LOCKED"));
    assert!(switch_echo_matches(&json!({"type": "switch", "state": "OFF"}), "OFF"));
    assert!(siren_echo_matches(&json!({"type": "siren", "state": "ON"}), "ON"));
    assert!(security_echo_matches(&json!({"type": "security", "mode": "night"}), "night"));
    assert!(!security_echo_matches(&json!({"type": "security", "mode": "away"}), "night"));
}

// -- Round trips against the scripted peer ------------------------------------

#[tokio::test]
async fn control_light_round_trip_accepts_jittered_echo() -> anyhow::Result<()> {
    let broker = Arc::new(FakeBroker::default());
    broker
        .script("home.device.l1.state", json!({"type": "light", "state": "ON", "brightness": 47}))
        .await;
    let tools = test_tools(Arc::clone(&broker))?;

    let echo = tools.control_light("l1", true, Some(50)).await?;
    assert_eq!(echo["brightness"], 47);

    let published = broker.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "home.device.l1.set");
    assert_eq!(published[0].1, json!({"type": "light", "state": "ON", "brightness": 50}));
    Ok(())
}

#[tokio::test]
async fn brightness_is_clamped_before_publishing() -> anyhow::Result<()> {
    let broker = Arc::new(FakeBroker::default());
    broker
        .script("home.device.l1.state", json!({"type": "light", "state": "ON", "brightness": 100}))
        .await;
    let tools = test_tools(Arc::clone(&broker))?;

    tools.control_light("l1", true, Some(150)).await?;
    let published = broker.published().await;
    assert_eq!(published[0].1["brightness"], 100);
    Ok(())
}

#[tokio::test]
async fn cover_round_trip_within_tolerance() -> anyhow::Result<()> {
    let broker = Arc::new(FakeBroker::default());
    broker.script("home.device.c1.state", json!({"type": "cover", "position": 99})).await;
    let tools = test_tools(Arc::clone(&broker))?;

    let echo = tools.cover_set_position("c1", 100).await?;
    assert_eq!(echo["position"], 99);
    Ok(())
}

#[tokio::test]
async fn mismatched_echo_times_out() -> anyhow::Result<()> {
    let broker = Arc::new(FakeBroker::default());
    broker.script("home.device.d1.state", json!({"type": "lock", "state": "UNLOCKED"})).await;
    let tools = test_tools(broker)?;

    let result = tools.lock_door("d1").await;
    assert_eq!(result, Err(HomeError::Timeout));
    Ok(())
}

#[tokio::test]
async fn security_uses_aggregate_subjects() -> anyhow::Result<()> {
    let broker = Arc::new(FakeBroker::default());
    broker.script(SECURITY_STATE_SUBJECT, json!({"type": "security", "mode": "night"})).await;
    let tools = test_tools(Arc::clone(&broker))?;

    tools.arm_security("night").await?;
    let published = broker.published().await;
    assert_eq!(published[0].0, SECURITY_SET_SUBJECT);
    assert_eq!(published[0].1, json!({"type": "security", "mode": "night"}));
    Ok(())
}

// -- Registry validation ------------------------------------------------------

#[tokio::test]
async fn unknown_device_is_rejected_before_any_publish() -> anyhow::Result<()> {
    let broker = Arc::new(FakeBroker::default());
    let tools = test_tools(Arc::clone(&broker))?;

    let result = tools.control_light("ghost", true, None).await;
    assert!(matches!(result, Err(HomeError::UnknownDevice(_))));
    assert!(broker.published().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn wrong_device_type_is_rejected() -> anyhow::Result<()> {
    let broker = Arc::new(FakeBroker::default());
    let tools = test_tools(broker)?;

    let result = tools.lock_door("l1").await;
    assert!(matches!(result, Err(HomeError::WrongType { .. })));
    Ok(())
}

// -- Dispatch -----------------------------------------------------------------

#[tokio::test]
async fn dispatch_validates_and_routes() -> anyhow::Result<()> {
    let broker = Arc::new(FakeBroker::default());
    broker.script("home.device.t1.state", json!({"type": "thermostat", "target": 21.2})).await;
    let tools = test_tools(broker)?;

    let echo = tools
        .invoke("set_thermostat", &json!({"device_id": "t1", "temperature": 21.0}))
        .await?;
    assert_eq!(echo["target"], 21.2);

    let result = tools
        .invoke("set_thermostat", &json!({"device_id": "t1", "temperature": 60.0}))
        .await;
    assert!(matches!(result, Err(HomeError::InvalidArgs(_))));

    let result = tools.invoke("arm_security", &json!({"mode": "party"})).await;
    assert!(matches!(result, Err(HomeError::InvalidArgs(_))));

    let result = tools.invoke("warp_drive", &json!({})).await;
    assert!(matches!(result, Err(HomeError::ToolFailed(_))));

    let result = tools.invoke("control_light", &json!({"state": true})).await;
    assert!(matches!(result, Err(HomeError::InvalidArgs(_))));
    Ok(())
}

#[tokio::test]
async fn notify_is_an_accepted_no_op() -> anyhow::Result<()> {
    let broker = Arc::new(FakeBroker::default());
    let tools = test_tools(Arc::clone(&broker))?;

    let result = tools.invoke("notify", &json!({"message": "hi"})).await?;
    assert_eq!(result, Value::Null);
    assert!(broker.published().await.is_empty());
    Ok(())
}

#[test]
fn sensor_subjects_are_well_known() {
    assert_eq!(sensor_state_subject("m1"), "home.sensor.m1.state");
}
