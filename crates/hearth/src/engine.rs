// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rule engine: periodic evaluation of automation rules.
//!
//! Every tick takes one snapshot and walks the rule list in order. A rule
//! must pass its gates (rate limit, then debounce, then throttle), then its
//! condition, before its actions run sequentially with per-action retry.
//! Failures are contained: a failing action consumes its retries and marks
//! the firing `err`, a failing rule never stops the loop.
//!
//! All per-rule runtime state (last fire, guard windows) lives here, keyed by
//! rule id. Replacing the rule set clears `last_fire`; stale guard windows
//! for removed ids are simply never consulted again.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveTime;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::bus::epoch_secs;
use crate::context::{HomeContext, WorldState};
use crate::metrics::Metrics;
use crate::rules::{subset_match, Rule, RuleKind};
use crate::tools::ToolInvoker;

/// Evaluation cadence.
pub const TICK_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Default)]
struct FireWindows {
    /// Epoch seconds of the last firing per rule.
    last_fire: HashMap<String, f64>,
    /// Epoch milliseconds before which debounced rules stay quiet.
    debounce_until: HashMap<String, f64>,
    /// Epoch milliseconds before which throttled rules stay quiet.
    throttle_until: HashMap<String, f64>,
}

pub struct RuleEngine {
    context: Arc<HomeContext>,
    tools: Arc<dyn ToolInvoker>,
    metrics: Arc<Metrics>,
    rules: RwLock<Vec<Rule>>,
    windows: Mutex<FireWindows>,
}

impl RuleEngine {
    pub fn new(
        context: Arc<HomeContext>,
        tools: Arc<dyn ToolInvoker>,
        metrics: Arc<Metrics>,
        rules: Vec<Rule>,
    ) -> Self {
        Self {
            context,
            tools,
            metrics,
            rules: RwLock::new(rules),
            windows: Mutex::new(FireWindows::default()),
        }
    }

    /// Atomically replace the active rule set.
    ///
    /// Clears last-fire bookkeeping so replacement rules start fresh.
    pub async fn set_rules(&self, rules: Vec<Rule>) {
        let count = rules.len();
        *self.rules.write().await = rules;
        self.windows.lock().await.last_fire.clear();
        self.metrics.rules_version.inc();
        tracing::info!(count, "rule set replaced");
    }

    /// Remove a single rule by id. Returns whether it existed.
    pub async fn delete_rule(&self, rule_id: &str) -> bool {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|r| r.id != rule_id);
        let removed = rules.len() != before;
        if removed {
            self.metrics.rules_version.inc();
            tracing::info!(rule_id, "rule deleted");
        }
        removed
    }

    /// The active rule set.
    pub async fn rules(&self) -> Vec<Rule> {
        self.rules.read().await.clone()
    }

    /// One evaluation pass over all rules against a fresh snapshot.
    pub async fn tick(&self) {
        let snapshot = self.context.snapshot().await;
        let rules = self.rules.read().await.clone();
        for rule in &rules {
            self.maybe_fire(rule, &snapshot).await;
        }
    }

    async fn maybe_fire(&self, rule: &Rule, snapshot: &WorldState) {
        let now = epoch_secs();
        if !self.gates_pass(rule, now).await {
            return;
        }
        let last_fire = self.last_fire(&rule.id).await;
        let tod = chrono::Local::now().time();
        if !condition_holds(rule, snapshot, tod, now, last_fire) {
            return;
        }

        let ok = self.run_actions(rule).await;
        self.record_fire(rule, now).await;
        let outcome = if ok { "ok" } else { "err" };
        self.metrics.trigger_firings.with_label_values(&[rule.id.as_str(), outcome]).inc();
        tracing::debug!(rule_id = %rule.id, outcome, "rule fired");
    }

    /// Gate order matters: rate limit, then debounce, then throttle.
    async fn gates_pass(&self, rule: &Rule, now: f64) -> bool {
        let windows = self.windows.lock().await;
        let rate = rule.safety.rate_limit_per_min;
        if rate > 0.0 {
            let last = windows.last_fire.get(&rule.id).copied().unwrap_or(0.0);
            if now - last < 60.0 / rate {
                return false;
            }
        }
        let now_ms = now * 1000.0;
        if rule.guards.debounce_ms > 0
            && now_ms < windows.debounce_until.get(&rule.id).copied().unwrap_or(0.0)
        {
            return false;
        }
        if rule.guards.throttle_per_min > 0.0
            && now_ms < windows.throttle_until.get(&rule.id).copied().unwrap_or(0.0)
        {
            return false;
        }
        true
    }

    async fn last_fire(&self, rule_id: &str) -> f64 {
        self.windows.lock().await.last_fire.get(rule_id).copied().unwrap_or(0.0)
    }

    /// Run the rule's actions in order. An action that exhausts its retries
    /// marks the firing failed; the remaining actions still execute.
    async fn run_actions(&self, rule: &Rule) -> bool {
        let retry = &rule.guards.retry;
        let max_attempts = retry.max.max(1);
        let mut fired_ok = true;
        for action in &rule.actions {
            let mut attempt = 0;
            loop {
                match self.tools.invoke(&action.tool, &action.args).await {
                    Ok(_) => break,
                    Err(e) => {
                        attempt += 1;
                        if attempt >= max_attempts {
                            tracing::warn!(
                                rule_id = %rule.id,
                                tool = %action.tool,
                                err = %e,
                                "rule action exhausted retries"
                            );
                            fired_ok = false;
                            break;
                        }
                        tokio::time::sleep(Duration::from_millis(retry.backoff_ms)).await;
                    }
                }
            }
        }
        fired_ok
    }

    async fn record_fire(&self, rule: &Rule, now: f64) {
        let mut windows = self.windows.lock().await;
        windows.last_fire.insert(rule.id.clone(), now);
        let now_ms = now * 1000.0;
        if rule.guards.debounce_ms > 0 {
            windows.debounce_until.insert(rule.id.clone(), now_ms + rule.guards.debounce_ms as f64);
        }
        if rule.guards.throttle_per_min > 0.0 {
            windows
                .throttle_until
                .insert(rule.id.clone(), now_ms + 60_000.0 / rule.guards.throttle_per_min);
        }
    }
}

/// Pure condition check against one snapshot.
///
/// `last_fire` feeds the `for` duration clause, which bounds firing cadence
/// rather than how long the condition has held.
fn condition_holds(
    rule: &Rule,
    snapshot: &WorldState,
    tod: NaiveTime,
    now: f64,
    last_fire: f64,
) -> bool {
    match &rule.kind {
        RuleKind::Time { after } => after.is_reached(tod),
        RuleKind::Sensor { condition } => {
            let Some(key) = condition.sensor_id.as_deref().or(condition.topic.as_deref()) else {
                return false;
            };
            let empty = Value::Object(serde_json::Map::new());
            let cached = snapshot.devices.get(key).unwrap_or(&empty);
            let mut ok = subset_match(&condition.equals, cached);
            if let Some(after) = condition.after {
                if !after.is_reached(tod) {
                    ok = false;
                }
            }
            if let Some(hold) = condition.hold {
                if now - last_fire < hold.as_secs_f64() {
                    ok = false;
                }
            }
            ok
        }
    }
}

/// Spawn the tick loop as a background task.
pub fn spawn(engine: Arc<RuleEngine>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            engine.tick().await;
        }
        tracing::debug!("rule engine loop stopped");
    });
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
