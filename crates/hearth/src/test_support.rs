// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for unit tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::error::HomeError;
use crate::tools::ToolInvoker;

/// Recording tool invoker with scriptable failures.
#[derive(Default)]
pub struct RecordingInvoker {
    calls: Mutex<Vec<(String, Value)>>,
    fail_remaining: Mutex<HashMap<String, u32>>,
}

impl RecordingInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` invocations of `tool` fail.
    pub async fn fail_next(&self, tool: &str, n: u32) {
        self.fail_remaining.lock().await.insert(tool.to_owned(), n);
    }

    pub async fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().await.clone()
    }

    pub async fn count(&self, tool: &str) -> usize {
        self.calls.lock().await.iter().filter(|(t, _)| t == tool).count()
    }
}

#[async_trait]
impl ToolInvoker for RecordingInvoker {
    async fn invoke(&self, tool: &str, args: &Value) -> Result<Value, HomeError> {
        self.calls.lock().await.push((tool.to_owned(), args.clone()));
        let mut failures = self.fail_remaining.lock().await;
        if let Some(remaining) = failures.get_mut(tool) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(HomeError::ToolFailed(format!("scripted failure of {tool}")));
            }
        }
        Ok(json!({"echoed": tool}))
    }
}
