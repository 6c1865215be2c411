// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background analyzer: periodic heuristics over the world snapshot.
//!
//! Currently one heuristic: a lit room with nobody in it is wasted light.

use std::sync::Arc;

use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::bus::{epoch_secs, EventBus, HomeEvent};
use crate::context::HomeContext;
use crate::metrics::Metrics;

pub const ANALYZE_INTERVAL: Duration = Duration::from_secs(2);

pub struct BackgroundAnalyzer {
    context: Arc<HomeContext>,
    bus: Arc<EventBus>,
    metrics: Arc<Metrics>,
}

impl BackgroundAnalyzer {
    pub fn new(context: Arc<HomeContext>, bus: Arc<EventBus>, metrics: Arc<Metrics>) -> Self {
        Self { context, bus, metrics }
    }

    /// One scan pass: emit an insight per wasteful zone.
    pub async fn scan(&self) {
        self.metrics.analysis_ticks.inc();
        let snapshot = self.context.snapshot().await;
        for (room, zone) in &snapshot.zones {
            let lit = zone.light.as_deref() == Some("ON");
            // Unknown presence counts as absent.
            let present = zone.presence.unwrap_or(false);
            if lit && !present {
                self.metrics.analysis_insights.with_label_values(&["waste_light"]).inc();
                self.bus
                    .publish(HomeEvent::Insight {
                        kind: "waste_light".to_owned(),
                        room: room.clone(),
                        ts: epoch_secs(),
                    })
                    .await;
            }
        }
    }
}

/// Spawn the scan loop as a background task.
pub fn spawn(analyzer: Arc<BackgroundAnalyzer>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ANALYZE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            analyzer.scan().await;
        }
        tracing::debug!("analyzer loop stopped");
    });
}

#[cfg(test)]
#[path = "analyzer_tests.rs"]
mod tests;
