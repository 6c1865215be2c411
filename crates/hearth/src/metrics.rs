// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metric families for the control plane.
//!
//! One `Metrics` value is constructed at startup and shared by reference;
//! nothing registers into a process-global registry.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

const LATENCY_BUCKETS_MS: &[f64] = &[5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0];

pub struct Metrics {
    registry: Registry,
    /// Tool invocations by tool name and outcome.
    pub tool_calls: IntCounterVec,
    /// Tool round-trip latency in milliseconds.
    pub tool_latency_ms: HistogramVec,
    /// Broker publish operations by subject.
    pub broker_publishes: IntCounterVec,
    /// Rule firings by rule id and outcome.
    pub trigger_firings: IntCounterVec,
    /// Agent commands by intent kind and outcome.
    pub agent_commands: IntCounterVec,
    /// Per-step supervisor latency in milliseconds.
    pub agent_step_latency_ms: HistogramVec,
    /// Critical tool invocations admitted by the sliding window.
    pub critical_actions: IntCounterVec,
    /// Monotonic version of the active rule set.
    pub rules_version: IntGauge,
    /// Background analyzer ticks.
    pub analysis_ticks: IntCounter,
    /// Analyzer insights by kind.
    pub analysis_insights: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let tool_calls =
            IntCounterVec::new(Opts::new("tool_calls_total", "Total tool calls"), &[
                "tool", "result",
            ])?;
        let tool_latency_ms = HistogramVec::new(
            HistogramOpts::new("tool_call_latency_ms", "Tool call latency in ms")
                .buckets(LATENCY_BUCKETS_MS.to_vec()),
            &["tool"],
        )?;
        let broker_publishes = IntCounterVec::new(
            Opts::new("broker_publish_total", "Broker publish operations"),
            &["subject"],
        )?;
        let trigger_firings = IntCounterVec::new(
            Opts::new("trigger_firings_total", "Number of rule firings"),
            &["rule_id", "result"],
        )?;
        let agent_commands = IntCounterVec::new(
            Opts::new("agent_commands_total", "Agent commands processed"),
            &["intent", "result"],
        )?;
        let agent_step_latency_ms = HistogramVec::new(
            HistogramOpts::new("agent_step_latency_ms", "Per-step latency for the plan executor")
                .buckets(LATENCY_BUCKETS_MS.to_vec()),
            &["tool"],
        )?;
        let critical_actions = IntCounterVec::new(
            Opts::new("critical_actions_total", "Critical actions executed"),
            &["tool"],
        )?;
        let rules_version =
            IntGauge::new("rules_version", "Monotonic version of the active rule set")?;
        let analysis_ticks =
            IntCounter::new("analysis_ticks_total", "Background analyzer ticks")?;
        let analysis_insights = IntCounterVec::new(
            Opts::new("analysis_insights_total", "Analyzer insights generated"),
            &["kind"],
        )?;

        registry.register(Box::new(tool_calls.clone()))?;
        registry.register(Box::new(tool_latency_ms.clone()))?;
        registry.register(Box::new(broker_publishes.clone()))?;
        registry.register(Box::new(trigger_firings.clone()))?;
        registry.register(Box::new(agent_commands.clone()))?;
        registry.register(Box::new(agent_step_latency_ms.clone()))?;
        registry.register(Box::new(critical_actions.clone()))?;
        registry.register(Box::new(rules_version.clone()))?;
        registry.register(Box::new(analysis_ticks.clone()))?;
        registry.register(Box::new(analysis_insights.clone()))?;

        Ok(Self {
            registry,
            tool_calls,
            tool_latency_ms,
            broker_publishes,
            trigger_firings,
            agent_commands,
            agent_step_latency_ms,
            critical_actions,
            rules_version,
            analysis_ticks,
            analysis_insights,
        })
    }

    /// Render the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buf) {
            tracing::warn!(err = %e, "metrics encoding failed");
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
