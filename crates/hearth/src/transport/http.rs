// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ErrorBody, ErrorResponse};
use crate::rules::Rule;
use crate::supervisor::PlanStep;
use crate::App;

/// Caller role from the `X-Role` header, defaulting to `admin`.
fn caller_role(headers: &HeaderMap) -> String {
    headers
        .get("x-role")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("admin")
        .to_owned()
}

fn forbidden(role: &str, tool: &str) -> (StatusCode, Json<ErrorResponse>) {
    let body = ErrorResponse {
        error: ErrorBody {
            code: "FORBIDDEN".to_owned(),
            message: format!("role {role} may not call {tool}"),
        },
    };
    (StatusCode::FORBIDDEN, Json(body))
}

// -- Health and introspection --------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub uptime_s: f64,
    pub devices: usize,
    pub rules: usize,
}

/// `GET /health`
pub async fn health(State(app): State<Arc<App>>) -> impl IntoResponse {
    let uptime = app.boot.elapsed().as_secs_f64();
    Json(HealthResponse {
        ok: true,
        uptime_s: (uptime * 10.0).round() / 10.0,
        devices: app.registry.len(),
        rules: app.engine.rules().await.len(),
    })
}

/// `GET /state`
pub async fn state(State(app): State<Arc<App>>) -> impl IntoResponse {
    Json(app.context.snapshot().await)
}

/// `GET /devices`
pub async fn devices(State(app): State<Arc<App>>) -> impl IntoResponse {
    let devices: Vec<_> = app.registry.iter().cloned().collect();
    Json(json!({"devices": devices}))
}

/// `GET /device/{id}`
pub async fn device(
    State(app): State<Arc<App>>,
    Path(device_id): Path<String>,
) -> impl IntoResponse {
    match app.registry.get(&device_id) {
        Some(device) => Json(device.clone()).into_response(),
        None => crate::error::HomeError::UnknownDevice(device_id).to_http_response().into_response(),
    }
}

// -- Tool invocation -----------------------------------------------------------

/// `POST /tools/{op}` — invoke one tool with the request body as arguments.
pub async fn invoke_tool(
    State(app): State<Arc<App>>,
    Path(op): Path<String>,
    headers: HeaderMap,
    Json(args): Json<Value>,
) -> impl IntoResponse {
    let role = caller_role(&headers);
    if !app.rbac.is_allowed(&role, &op) {
        return forbidden(&role, &op).into_response();
    }

    let started = std::time::Instant::now();
    let result = app.tools.invoke(&op, &args).await;
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    let outcome = if result.is_ok() { "ok" } else { "err" };
    app.audit.log("api", &role, &op, &args, outcome, latency_ms, None);

    match result {
        Ok(value) => Json(json!({"status": "ok", "result": value})).into_response(),
        Err(e) => e.to_http_response().into_response(),
    }
}

// -- Rule management -----------------------------------------------------------

/// `GET /rules`
pub async fn list_rules(State(app): State<Arc<App>>) -> impl IntoResponse {
    Json(json!({"rules": app.engine.rules().await}))
}

/// `POST /rules` — replace the whole rule set.
pub async fn replace_rules(
    State(app): State<Arc<App>>,
    Json(rules): Json<Vec<Rule>>,
) -> impl IntoResponse {
    let count = rules.len();
    app.engine.set_rules(rules).await;
    Json(json!({"status": "ok", "count": count}))
}

/// `DELETE /rules/{id}`
pub async fn delete_rule(
    State(app): State<Arc<App>>,
    Path(rule_id): Path<String>,
) -> impl IntoResponse {
    if app.engine.delete_rule(&rule_id).await {
        Json(json!({"status": "ok", "id": rule_id})).into_response()
    } else {
        let body = ErrorResponse {
            error: ErrorBody {
                code: "UNKNOWN_RULE".to_owned(),
                message: format!("no rule with id {rule_id}"),
            },
        };
        (StatusCode::NOT_FOUND, Json(body)).into_response()
    }
}

// -- History -------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub etype: Option<String>,
}

/// `GET /history/events?limit=&etype=`
pub async fn history_events(
    State(app): State<Arc<App>>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(crate::history::DEFAULT_RECENT_LIMIT);
    let events = app.history.recent(limit, query.etype.as_deref()).await;
    Json(json!({"events": events}))
}

// -- Agent command -------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AgentCommandReq {
    /// Either a structured `{tool, args}` call or a textual intent.
    pub command: Option<Value>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub confirm: bool,
}

/// `POST /agent/command`
pub async fn agent_command(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(req): Json<AgentCommandReq>,
) -> impl IntoResponse {
    let role = caller_role(&headers);
    let trace_id = uuid::Uuid::new_v4().to_string();

    // Structured tool call.
    if let Some(tool) = req.command.as_ref().and_then(|c| c.get("tool")).and_then(Value::as_str)
    {
        let tool = tool.to_owned();
        if !app.rbac.is_allowed(&role, &tool) {
            return forbidden(&role, &tool).into_response();
        }
        if req.dry_run {
            app.metrics.agent_commands.with_label_values(&["structured", "ok"]).inc();
            return Json(json!({"trace_id": trace_id, "status": "ok", "dry_run": true}))
                .into_response();
        }
        let args = req
            .command
            .as_ref()
            .and_then(|c| c.get("args"))
            .cloned()
            .unwrap_or_else(|| json!({}));
        let started = std::time::Instant::now();
        let result = app.tools.invoke(&tool, &args).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let outcome = if result.is_ok() { "ok" } else { "err" };
        app.audit.log("api", &role, &tool, &args, outcome, latency_ms, Some(&trace_id));
        app.metrics.agent_commands.with_label_values(&["structured", outcome]).inc();
        return match result {
            Ok(value) => {
                Json(json!({"trace_id": trace_id, "status": "ok", "result": value}))
                    .into_response()
            }
            Err(e) => e.to_http_response().into_response(),
        };
    }

    // Textual intent: plan, then execute.
    if let Some(intent) = req.command.as_ref().and_then(Value::as_str) {
        let plan: Vec<PlanStep> = app.supervisor.plan_from_intent(intent);
        let steps = app.supervisor.execute_plan(&plan, req.dry_run, req.confirm).await;
        app.metrics.agent_commands.with_label_values(&["intent", "ok"]).inc();
        return Json(json!({"trace_id": trace_id, "status": "ok", "steps": steps}))
            .into_response();
    }

    app.metrics.agent_commands.with_label_values(&["unknown", "accepted"]).inc();
    (
        StatusCode::ACCEPTED,
        Json(json!({"trace_id": trace_id, "status": "not_implemented"})),
    )
        .into_response()
}

// -- Metrics -------------------------------------------------------------------

/// `GET /metrics` — Prometheus text exposition.
pub async fn metrics(State(app): State<Arc<App>>) -> impl IntoResponse {
    app.metrics.render()
}
