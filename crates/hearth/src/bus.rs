// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event bus.
//!
//! Topic-less fan-out: every subscriber owns a bounded queue, and `publish`
//! does a non-blocking enqueue per subscriber. A full queue drops the event
//! for that subscriber only — slow consumers lose data instead of gaining
//! backpressure over the publishers. Closed queues (abandoned streams) are
//! pruned on the next publish. No lock is held across subscriber I/O; only
//! the subscriber list itself is serialized.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use crate::context::WorldState;
use crate::supervisor::PlanStepResult;

/// Per-subscriber queue capacity. Beyond this, the subscriber drops events.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 500;

/// Events flowing over the bus, tagged with their wire-format `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HomeEvent {
    /// One executed (or gated) step of a supervisor plan.
    AgentStep {
        #[serde(flatten)]
        step: PlanStepResult,
        ts: f64,
    },
    /// A fresh world snapshot was produced.
    StateUpdate { snapshot: WorldState, ts: f64 },
    /// A heuristic finding from the background analyzer.
    Insight { kind: String, room: String, ts: f64 },
    /// Liveness marker, sent first on every SSE stream.
    Heartbeat { ts: f64 },
}

impl HomeEvent {
    /// The wire-format `type` tag, used for SSE event names and history filters.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AgentStep { .. } => "agent_step",
            Self::StateUpdate { .. } => "state_update",
            Self::Insight { .. } => "insight",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// Fan-out hub with bounded per-subscriber queues.
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::Sender<HomeEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { subscribers: Mutex::new(Vec::new()) }
    }

    /// Register a new subscriber and return its queue.
    ///
    /// Dropping the receiver abandons the subscription; the sender side is
    /// removed on the next publish.
    pub async fn subscribe(&self) -> mpsc::Receiver<HomeEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        self.subscribers.lock().await.push(tx);
        rx
    }

    /// Deliver an event to every live subscriber without blocking.
    pub async fn publish(&self, event: HomeEvent) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            // Queue full: drop the event for this subscriber, keep the subscriber.
            Err(mpsc::error::TrySendError::Full(_)) => true,
            // Receiver gone: prune.
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Number of currently registered subscribers (pruning lags until the
    /// next publish).
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Current wall-clock time as fractional seconds since the Unix epoch.
pub fn epoch_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
