// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the hearth control plane.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "hearth", about = "Event-driven smart-home control plane")]
pub struct HearthConfig {
    /// Host to bind the HTTP API on.
    #[arg(long, default_value = "127.0.0.1", env = "HEARTH_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8600, env = "HEARTH_PORT")]
    pub port: u16,

    /// Broker URL.
    #[arg(long, default_value = "nats://127.0.0.1:4222", env = "HEARTH_BROKER_URL")]
    pub broker_url: String,

    /// Broker auth token. If unset, the connection is unauthenticated.
    #[arg(long, env = "HEARTH_BROKER_TOKEN")]
    pub broker_token: Option<String>,

    /// Directory containing `devices.json` and `rules.json`.
    #[arg(long, default_value = "configs", env = "HEARTH_CONFIG_DIR")]
    pub config_dir: std::path::PathBuf,

    /// Directory for the append-only audit log.
    #[arg(long, default_value = "logs", env = "HEARTH_AUDIT_DIR")]
    pub audit_dir: std::path::PathBuf,

    /// Event history ring capacity.
    #[arg(long, default_value_t = 1000, env = "HEARTH_HISTORY_CAPACITY")]
    pub history_capacity: usize,
}
