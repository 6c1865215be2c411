// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan executor with critical-action guard rails.
//!
//! A plan is an ordered list of tool invocations. The supervisor walks it in
//! order, short-circuiting on dry-run, gating critical tools behind an
//! explicit confirmation flag and a sliding-window rate limiter, and stopping
//! the whole plan at the first failed step (no rollback of earlier steps).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::bus::{epoch_secs, EventBus, HomeEvent};
use crate::metrics::Metrics;
use crate::tools::ToolInvoker;

/// Tools whose invocation is additionally rate limited and confirm gated.
pub const CRITICAL_TOOLS: &[&str] = &["lock_door", "arm_security"];

const CRITICAL_WINDOW_SECS: f64 = 60.0;
const CRITICAL_WINDOW_LIMIT: usize = 3;

/// One step of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

/// Outcome of one plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Err,
    DryRun,
    NeedsConfirm,
    RateLimited,
}

/// A plan step together with its execution outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStepResult {
    pub tool: String,
    pub args: Value,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlanStepResult {
    fn gated(step: &PlanStep, status: StepStatus) -> Self {
        Self {
            tool: step.tool.clone(),
            args: step.args.clone(),
            status,
            lat_ms: None,
            result: None,
            error: None,
        }
    }
}

pub fn is_critical(tool: &str) -> bool {
    CRITICAL_TOOLS.contains(&tool)
}

pub struct Supervisor {
    tools: Arc<dyn ToolInvoker>,
    bus: Arc<EventBus>,
    metrics: Arc<Metrics>,
    /// Timestamps of recent critical invocations (sliding 60 s window).
    critical_window: Mutex<Vec<f64>>,
}

impl Supervisor {
    pub fn new(tools: Arc<dyn ToolInvoker>, bus: Arc<EventBus>, metrics: Arc<Metrics>) -> Self {
        Self { tools, bus, metrics, critical_window: Mutex::new(Vec::new()) }
    }

    async fn allow_critical(&self, now: f64) -> bool {
        let mut window = self.critical_window.lock().await;
        window.retain(|t| now - t < CRITICAL_WINDOW_SECS);
        window.len() < CRITICAL_WINDOW_LIMIT
    }

    /// Execute a plan in order, returning one result per attempted step.
    pub async fn execute_plan(
        &self,
        steps: &[PlanStep],
        dry_run: bool,
        require_confirm: bool,
    ) -> Vec<PlanStepResult> {
        let mut results = Vec::with_capacity(steps.len());
        for step in steps {
            if dry_run {
                results.push(PlanStepResult::gated(step, StepStatus::DryRun));
                continue;
            }
            if require_confirm && is_critical(&step.tool) {
                results.push(PlanStepResult::gated(step, StepStatus::NeedsConfirm));
                continue;
            }
            if is_critical(&step.tool) && !self.allow_critical(epoch_secs()).await {
                results.push(PlanStepResult::gated(step, StepStatus::RateLimited));
                continue;
            }

            let started = std::time::Instant::now();
            match self.tools.invoke(&step.tool, &step.args).await {
                Ok(output) => {
                    let lat_ms = started.elapsed().as_secs_f64() * 1000.0;
                    self.metrics
                        .agent_step_latency_ms
                        .with_label_values(&[step.tool.as_str()])
                        .observe(lat_ms);
                    if is_critical(&step.tool) {
                        self.critical_window.lock().await.push(epoch_secs());
                        self.metrics
                            .critical_actions
                            .with_label_values(&[step.tool.as_str()])
                            .inc();
                    }
                    let result = PlanStepResult {
                        tool: step.tool.clone(),
                        args: step.args.clone(),
                        status: StepStatus::Ok,
                        lat_ms: Some((lat_ms * 100.0).round() / 100.0),
                        result: Some(output),
                        error: None,
                    };
                    results.push(result.clone());
                    self.bus
                        .publish(HomeEvent::AgentStep { step: result, ts: epoch_secs() })
                        .await;
                }
                Err(e) => {
                    results.push(PlanStepResult {
                        tool: step.tool.clone(),
                        args: step.args.clone(),
                        status: StepStatus::Err,
                        lat_ms: None,
                        result: None,
                        error: Some(e.to_string()),
                    });
                    // A failed step aborts the rest of the plan.
                    break;
                }
            }
        }
        results
    }

    /// Derive a minimal plan from a textual intent.
    ///
    /// Substring matching is a deliberate placeholder for a real planner.
    pub fn plan_from_intent(&self, intent: &str) -> Vec<PlanStep> {
        if intent.contains("night") || intent.contains("sleep") || intent.contains("ноч") {
            return vec![
                PlanStep {
                    tool: "control_light".to_owned(),
                    args: serde_json::json!({
                        "device_id": "light_living_main", "state": true, "brightness": 20
                    }),
                },
                PlanStep {
                    tool: "arm_security".to_owned(),
                    args: serde_json::json!({"mode": "night"}),
                },
            ];
        }
        Vec::new()
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
