// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + SSE transport for the control plane.

pub mod http;
pub mod sse;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::App;

/// Build the axum `Router` with all control-plane routes.
pub fn build_router(app: Arc<App>) -> Router {
    Router::new()
        .route("/health", get(http::health))
        .route("/state", get(http::state))
        .route("/devices", get(http::devices))
        .route("/device/{id}", get(http::device))
        // Tool invocation (RBAC-checked via the X-Role header)
        .route("/tools/{op}", post(http::invoke_tool))
        // Rule management
        .route("/rules", get(http::list_rules).post(http::replace_rules))
        .route("/rules/{id}", delete(http::delete_rule))
        // Agent surface
        .route("/agent/command", post(http::agent_command))
        // Event streams
        .route("/ui/stream", get(sse::ui_stream))
        .route("/history/events", get(http::history_events))
        // Observability
        .route("/metrics", get(http::metrics))
        .layer(CorsLayer::permissive())
        .with_state(app)
}
