// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Home context manager: the live world model.
//!
//! A dedicated broker session subscribes to `home.>` and `vision.events.>`
//! and folds every state message into one [`WorldState`]: raw payloads per
//! entity plus per-room zone fields derived from the device registry. The
//! whole fold for one message happens under a single write-lock acquisition,
//! so readers always observe a coherent snapshot.
//!
//! The session is deliberately separate from the RPC client — a wildcard
//! subscription sharing the RPC session would swallow command echoes.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::broker;
use crate::bus::epoch_secs;
use crate::payload::{truthy, DevicePayload};
use crate::registry::{DeviceKind, DeviceRegistry};

/// Per-room semantic state derived from device messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub illuminance: Option<f64>,
}

/// A coherent view of the world at a timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldState {
    pub security_mode: String,
    pub occupancy: String,
    pub energy_mode: String,
    /// Latest raw payload per entity (device id or pass-through subject).
    pub devices: HashMap<String, Value>,
    /// Derived per-room fields.
    pub zones: HashMap<String, ZoneState>,
    /// Wall-clock time of the last update, seconds since the epoch.
    pub ts: f64,
}

impl Default for WorldState {
    fn default() -> Self {
        Self {
            security_mode: "home".to_owned(),
            occupancy: "home".to_owned(),
            energy_mode: "normal".to_owned(),
            devices: HashMap::new(),
            zones: HashMap::new(),
            ts: epoch_secs(),
        }
    }
}

/// Owner of the world state; ingest loop plus snapshot reads.
pub struct HomeContext {
    registry: Arc<DeviceRegistry>,
    state: RwLock<WorldState>,
}

impl HomeContext {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry, state: RwLock::new(WorldState::default()) }
    }

    /// A shallow copy of the current world state.
    pub async fn snapshot(&self) -> WorldState {
        self.state.read().await.clone()
    }

    /// Fold one broker message into the world state.
    ///
    /// Subjects that fit neither `vision.events.<id>` nor
    /// `home.<class>.<entity>.state` are ignored.
    pub async fn ingest(&self, subject: &str, payload: Value) {
        let parts: Vec<&str> = subject.split('.').collect();

        if parts.len() >= 3 && parts[0] == "vision" && parts[1] == "events" {
            let key = parts[..3].join(".");
            let mut state = self.state.write().await;
            state.devices.insert(key, payload);
            state.ts = epoch_secs();
            return;
        }

        if parts.len() < 4 || parts[0] != "home" || parts[3] != "state" {
            return;
        }
        let entity_id = parts[2];
        self.write_device_state(entity_id, payload).await;
    }

    /// Out-of-band state injection; applies the same zone projection as a
    /// broker message.
    pub async fn upsert_device_state(&self, entity_id: &str, payload: Value) {
        self.write_device_state(entity_id, payload).await;
    }

    async fn write_device_state(&self, entity_id: &str, payload: Value) {
        let parsed = DevicePayload::parse(&payload);
        let mut state = self.state.write().await;
        state.devices.insert(entity_id.to_owned(), payload);
        state.ts = epoch_secs();

        let Some(device) = self.registry.get(entity_id) else {
            return;
        };
        let Some(ref room) = device.room else {
            return;
        };
        let Some(parsed) = parsed else {
            return;
        };
        let zone = state.zones.entry(room.clone()).or_default();
        match (device.kind, parsed) {
            (DeviceKind::Light, DevicePayload::Light { state, brightness }) => {
                zone.light = Some(state);
                if let Some(brightness) = brightness {
                    zone.brightness = Some(brightness);
                }
            }
            (DeviceKind::Lock, DevicePayload::Lock { state }) => {
                zone.lock = Some(state);
            }
            (DeviceKind::Sensor, DevicePayload::Motion { value }) => {
                zone.presence = Some(truthy(&value));
            }
            (DeviceKind::Sensor, DevicePayload::Illuminance { lux }) => {
                zone.illuminance = Some(lux);
            }
            // Other device kinds have no zone projection.
            _ => {}
        }
    }
}

/// Spawn the ingest loop on its own broker session.
pub fn spawn_ingest(
    context: Arc<HomeContext>,
    url: String,
    token: Option<String>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        if let Err(e) = run_ingest(context, &url, token.as_deref(), shutdown).await {
            tracing::error!(err = %e, "context ingest loop failed");
        }
    });
}

async fn run_ingest(
    context: Arc<HomeContext>,
    url: &str,
    token: Option<&str>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let client = broker::connect(url, token, "hearth-context").await?;
    let mut home = client.subscribe("home.>").await?;
    let mut vision = client.subscribe("vision.events.>").await?;
    tracing::info!("context ingest subscribed to home.> and vision.events.>");

    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = home.next() => msg,
            msg = vision.next() => msg,
        };
        let Some(message) = message else { break };
        // Undecodable payloads are dropped without ceremony.
        let Ok(payload) = serde_json::from_slice::<Value>(&message.payload) else {
            continue;
        };
        context.ingest(message.subject.as_str(), payload).await;
    }

    let _ = home.unsubscribe().await;
    let _ = vision.unsubscribe().await;
    Ok(())
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod tests;
