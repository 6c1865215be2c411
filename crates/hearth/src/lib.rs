// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hearth: event-driven smart-home control plane.
//!
//! Telemetry flows in from the broker into the context manager's world
//! snapshot; control flows out through the tools as publish-and-wait round
//! trips; the rule engine, supervisor, and analyzer sit between the two and
//! fan their observations out over the in-process bus to SSE clients and the
//! event history.

pub mod analyzer;
pub mod audit;
pub mod broker;
pub mod bus;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod history;
pub mod metrics;
pub mod payload;
pub mod rbac;
pub mod registry;
pub mod rules;
pub mod supervisor;
pub mod tools;
pub mod transport;

#[cfg(test)]
pub mod test_support;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::analyzer::BackgroundAnalyzer;
use crate::audit::AuditLogger;
use crate::broker::BrokerClient;
use crate::bus::{epoch_secs, EventBus, HomeEvent};
use crate::config::HearthConfig;
use crate::context::HomeContext;
use crate::engine::RuleEngine;
use crate::history::EventHistory;
use crate::metrics::Metrics;
use crate::rbac::RolePolicy;
use crate::registry::DeviceRegistry;
use crate::supervisor::Supervisor;
use crate::tools::{HomeTools, ToolInvoker};

/// Everything the handlers and background tasks share, built once at startup.
pub struct App {
    pub registry: Arc<DeviceRegistry>,
    pub context: Arc<HomeContext>,
    pub tools: Arc<dyn ToolInvoker>,
    pub engine: Arc<RuleEngine>,
    pub supervisor: Arc<Supervisor>,
    pub bus: Arc<EventBus>,
    pub history: Arc<EventHistory>,
    pub audit: Arc<AuditLogger>,
    pub rbac: RolePolicy,
    pub metrics: Arc<Metrics>,
    pub boot: std::time::Instant,
}

/// Run the control plane until shutdown.
pub async fn run(config: HearthConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    // Static configuration first — any failure here is fatal.
    let registry = Arc::new(DeviceRegistry::load(&config.config_dir)?);
    let rules = registry::load_rules(&config.config_dir)?;
    tracing::info!(devices = registry.len(), rules = rules.len(), "configuration loaded");

    let metrics = Arc::new(Metrics::new()?);
    let bus = Arc::new(EventBus::new());
    let history = Arc::new(EventHistory::new(config.history_capacity));
    let audit = Arc::new(AuditLogger::new(&config.audit_dir)?);

    // RPC broker session, distinct from the context manager's.
    let broker = Arc::new(
        BrokerClient::connect(
            &config.broker_url,
            config.broker_token.as_deref(),
            Arc::clone(&metrics),
        )
        .await?,
    );
    let tools: Arc<dyn ToolInvoker> =
        Arc::new(HomeTools::new(broker, Arc::clone(&registry), Arc::clone(&metrics)));

    let context = Arc::new(HomeContext::new(Arc::clone(&registry)));
    let engine = Arc::new(RuleEngine::new(
        Arc::clone(&context),
        Arc::clone(&tools),
        Arc::clone(&metrics),
        rules,
    ));
    metrics.rules_version.set(1);
    let supervisor =
        Arc::new(Supervisor::new(Arc::clone(&tools), Arc::clone(&bus), Arc::clone(&metrics)));
    let analyzer = Arc::new(BackgroundAnalyzer::new(
        Arc::clone(&context),
        Arc::clone(&bus),
        Arc::clone(&metrics),
    ));

    // Background tasks, all owned by the shutdown token.
    context::spawn_ingest(
        Arc::clone(&context),
        config.broker_url.clone(),
        config.broker_token.clone(),
        shutdown.clone(),
    );
    engine::spawn(Arc::clone(&engine), shutdown.clone());
    analyzer::spawn(Arc::clone(&analyzer), shutdown.clone());
    history::spawn_archiver(Arc::clone(&history), Arc::clone(&bus), shutdown.clone());

    // Announce the (still empty) world to early stream subscribers.
    bus.publish(HomeEvent::StateUpdate { snapshot: context.snapshot().await, ts: epoch_secs() })
        .await;

    let app = Arc::new(App {
        registry,
        context,
        tools,
        engine,
        supervisor,
        bus,
        history,
        audit,
        rbac: RolePolicy::new(),
        metrics,
        boot: std::time::Instant::now(),
    });

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("hearth listening on {addr}");
    let router = transport::build_router(app);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}
