// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only audit trail for tool invocations.
//!
//! One JSON line per action: who did what, a digest of the arguments (not
//! the arguments themselves), outcome and latency. Write failures are logged
//! and swallowed; auditing must never take a request down.

use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::bus::epoch_secs;

/// One audit record, as serialized to the log.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub ts: f64,
    pub actor: String,
    pub role: String,
    pub action: String,
    pub args_digest: String,
    pub result: String,
    pub latency_ms: f64,
    pub trace_id: String,
}

pub struct AuditLogger {
    path: PathBuf,
}

impl AuditLogger {
    /// Create a logger writing to `audit.log` under `dir`, creating the
    /// directory if needed.
    pub fn new(dir: &std::path::Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self { path: dir.join("audit.log") })
    }

    /// Append one record. `trace_id` defaults to a fresh UUID.
    pub fn log(
        &self,
        actor: &str,
        role: &str,
        action: &str,
        args: &Value,
        result: &str,
        latency_ms: f64,
        trace_id: Option<&str>,
    ) {
        let entry = AuditEntry {
            ts: epoch_secs(),
            actor: actor.to_owned(),
            role: role.to_owned(),
            action: action.to_owned(),
            args_digest: digest_args(args),
            result: result.to_owned(),
            latency_ms: (latency_ms * 100.0).round() / 100.0,
            trace_id: trace_id
                .map(str::to_owned)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        };
        if let Err(e) = self.append(&entry) {
            tracing::warn!(err = %e, "audit write failed");
        }
    }

    fn append(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(entry).map_err(std::io::Error::other)?;
        line.push(b'\n');
        let mut file =
            std::fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(&line)
    }
}

/// First 16 hex characters of the SHA-256 of the compact-encoded arguments.
pub fn digest_args(args: &Value) -> String {
    let blob = serde_json::to_vec(args).unwrap_or_default();
    let digest = Sha256::digest(&blob);
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        let _ = std::fmt::Write::write_fmt(&mut hex, format_args!("{byte:02x}"));
    }
    hex
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;
