// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded in-memory archive of bus events.
//!
//! A background task subscribes to the bus and appends everything except
//! heartbeats into a ring; `GET /history/events` reads it back newest first.
//! When the ring is full the oldest entry is discarded.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::bus::{EventBus, HomeEvent};

/// Default ring capacity.
pub const HISTORY_CAPACITY: usize = 1000;

/// Default number of events returned when no limit is given.
pub const DEFAULT_RECENT_LIMIT: usize = 200;

pub struct EventHistory {
    capacity: usize,
    events: RwLock<VecDeque<HomeEvent>>,
}

impl EventHistory {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, events: RwLock::new(VecDeque::with_capacity(capacity)) }
    }

    /// Append one event, discarding the oldest once full. Heartbeats are
    /// liveness noise and are not archived.
    pub async fn record(&self, event: HomeEvent) {
        if matches!(event, HomeEvent::Heartbeat { .. }) {
            return;
        }
        let mut events = self.events.write().await;
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// The most recent events, newest first, optionally filtered by type tag.
    pub async fn recent(&self, limit: usize, etype: Option<&str>) -> Vec<HomeEvent> {
        let events = self.events.read().await;
        events
            .iter()
            .rev()
            .filter(|event| etype.is_none_or(|t| event.event_type() == t))
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

impl Default for EventHistory {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

/// Spawn the archiver task feeding the history from the bus.
pub fn spawn_archiver(
    history: Arc<EventHistory>,
    bus: Arc<EventBus>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut rx = bus.subscribe().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    history.record(event).await;
                }
            }
        }
        tracing::debug!("event archiver stopped");
    });
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
