// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenario tests over the in-process component stack: broker
//! round trips against an echoing peer, snapshot projection, rule firing
//! with safety guards, the supervisor's critical-action window, and bus
//! fan-out under a stalled consumer.

use std::sync::Arc;

use serde_json::json;

use hearth::bus::{epoch_secs, EventBus, HomeEvent};
use hearth::context::HomeContext;
use hearth::engine::RuleEngine;
use hearth::metrics::Metrics;
use hearth::supervisor::{PlanStep, StepStatus, Supervisor};
use hearth::tools::HomeTools;

use hearth_specs::{scenario_registry, EchoPeer, RecordingInvoker};

// -- Tool round trips against the echoing peer ---------------------------------

#[tokio::test]
async fn light_round_trip_with_jittered_brightness() -> anyhow::Result<()> {
    let peer = Arc::new(EchoPeer::with_jitter(-3, 0, 0.0));
    let tools =
        HomeTools::new(Arc::clone(&peer) as _, scenario_registry()?, Arc::new(Metrics::new()?));

    let echo = tools.control_light("light_living_main", true, Some(50)).await?;
    assert_eq!(echo["state"], "ON");
    assert_eq!(echo["brightness"], 47, "peer jitter within tolerance is accepted");

    let published = peer.published().await;
    assert_eq!(published[0].0, "home.device.light_living_main.set");
    assert_eq!(
        published[0].1,
        json!({"type": "light", "state": "ON", "brightness": 50})
    );
    Ok(())
}

#[tokio::test]
async fn cover_round_trip_with_jittered_position() -> anyhow::Result<()> {
    let peer = Arc::new(EchoPeer::with_jitter(0, -1, 0.0));
    let tools =
        HomeTools::new(Arc::clone(&peer) as _, scenario_registry()?, Arc::new(Metrics::new()?));

    let echo = tools.cover_set_position("cover_kitchen", 100).await?;
    assert_eq!(echo["position"], 99);
    Ok(())
}

#[tokio::test]
async fn excessive_jitter_is_a_timeout() -> anyhow::Result<()> {
    let peer = Arc::new(EchoPeer::with_jitter(-20, 0, 0.0));
    let tools =
        HomeTools::new(Arc::clone(&peer) as _, scenario_registry()?, Arc::new(Metrics::new()?));

    let result = tools.control_light("light_living_main", true, Some(50)).await;
    assert!(result.is_err(), "echo outside tolerance never matches");
    Ok(())
}

// -- Snapshot projection -------------------------------------------------------

#[tokio::test]
async fn device_message_projects_into_living_zone() -> anyhow::Result<()> {
    let context = HomeContext::new(scenario_registry()?);
    context
        .ingest(
            "home.device.light_living_main.state",
            json!({"type": "light", "state": "ON", "brightness": 30}),
        )
        .await;

    let snapshot = context.snapshot().await;
    let Some(zone) = snapshot.zones.get("living") else {
        anyhow::bail!("living zone should be derived");
    };
    assert_eq!(zone.light.as_deref(), Some("ON"));
    assert_eq!(zone.brightness, Some(30));
    Ok(())
}

// -- Rule firing with rate limit -----------------------------------------------

#[tokio::test]
async fn motion_rule_fires_once_within_the_rate_window() -> anyhow::Result<()> {
    let context = Arc::new(HomeContext::new(scenario_registry()?));
    let invoker = Arc::new(RecordingInvoker::new());
    let rules = serde_json::from_value(json!([{
        "id": "r1",
        "type": "sensor",
        "condition": {"sensor_id": "m1", "equals": {"type": "motion", "value": true}},
        "actions": [{"tool": "control_light", "args": {"device_id": "l1", "state": true}}],
        "safety": {"rate_limit_per_min": 6}
    }]))?;
    let engine = RuleEngine::new(
        Arc::clone(&context),
        Arc::clone(&invoker) as _,
        Arc::new(Metrics::new()?),
        rules,
    );

    context.ingest("home.sensor.m1.state", json!({"type": "motion", "value": true})).await;

    engine.tick().await;
    engine.tick().await;
    assert_eq!(invoker.count("control_light").await, 1, "second tick inside 10 s is gated");
    Ok(())
}

#[tokio::test]
async fn hot_swapped_rules_take_effect_immediately() -> anyhow::Result<()> {
    let context = Arc::new(HomeContext::new(scenario_registry()?));
    let invoker = Arc::new(RecordingInvoker::new());
    let rules = serde_json::from_value(json!([{
        "id": "old",
        "type": "sensor",
        "condition": {"sensor_id": "m1", "equals": {"type": "motion", "value": true}},
        "actions": [{"tool": "siren_on", "args": {"device_id": "s1"}}]
    }]))?;
    let engine = RuleEngine::new(
        Arc::clone(&context),
        Arc::clone(&invoker) as _,
        Arc::new(Metrics::new()?),
        rules,
    );
    context.ingest("home.sensor.m1.state", json!({"type": "motion", "value": true})).await;

    engine.tick().await;
    assert_eq!(invoker.count("siren_on").await, 1);

    let replacement = serde_json::from_value(json!([{
        "id": "new",
        "type": "sensor",
        "condition": {"sensor_id": "m1", "equals": {"type": "motion", "value": true}},
        "actions": [{"tool": "control_light", "args": {"device_id": "l1", "state": false}}]
    }]))?;
    engine.set_rules(replacement).await;

    engine.tick().await;
    assert_eq!(invoker.count("siren_on").await, 1, "old rule no longer fires");
    assert_eq!(invoker.count("control_light").await, 1, "new rule fires");
    Ok(())
}

// -- Supervisor critical window -------------------------------------------------

#[tokio::test]
async fn fourth_critical_action_in_the_window_is_rate_limited() -> anyhow::Result<()> {
    let invoker = Arc::new(RecordingInvoker::new());
    let bus = Arc::new(EventBus::new());
    let supervisor =
        Supervisor::new(Arc::clone(&invoker) as _, Arc::clone(&bus), Arc::new(Metrics::new()?));

    let plan = vec![PlanStep {
        tool: "arm_security".to_owned(),
        args: json!({"mode": "night"}),
    }];

    let mut statuses = Vec::new();
    for _ in 0..4 {
        let results = supervisor.execute_plan(&plan, false, false).await;
        statuses.push(results[0].status);
    }
    assert_eq!(
        statuses,
        [StepStatus::Ok, StepStatus::Ok, StepStatus::Ok, StepStatus::RateLimited]
    );
    assert_eq!(invoker.count("arm_security").await, 3);
    Ok(())
}

// -- Bus fan-out ----------------------------------------------------------------

#[tokio::test]
async fn stalled_subscriber_drops_while_fast_subscriber_sees_all() -> anyhow::Result<()> {
    let bus = EventBus::new();
    let mut fast = bus.subscribe().await;
    let mut stalled = bus.subscribe().await;

    let mut fast_seen = 0usize;
    for n in 0..600 {
        bus.publish(HomeEvent::Insight {
            kind: "waste_light".to_owned(),
            room: format!("room{n}"),
            ts: epoch_secs(),
        })
        .await;
        while fast.try_recv().is_ok() {
            fast_seen += 1;
        }
    }
    while fast.try_recv().is_ok() {
        fast_seen += 1;
    }

    let mut stalled_seen = 0usize;
    while stalled.try_recv().is_ok() {
        stalled_seen += 1;
    }

    assert_eq!(fast_seen, 600);
    assert_eq!(stalled_seen, 500, "stalled consumer loses everything beyond its queue");
    Ok(())
}
