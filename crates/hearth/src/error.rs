// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error kinds for the control plane.
#[derive(Debug, Clone, PartialEq)]
pub enum HomeError {
    /// Static configuration failed to load or validate. Fatal at startup.
    ConfigInvalid(String),
    /// Broker I/O failure (connect, publish, subscribe).
    Transport(String),
    /// No matching state message arrived within the wait window.
    Timeout,
    /// Device ID not present in the registry.
    UnknownDevice(String),
    /// Device exists but is not of the type the operation requires.
    WrongType { device: String, expected: &'static str },
    /// Request arguments failed validation.
    InvalidArgs(String),
    /// Generic tool failure (unknown tool name, downstream error).
    ToolFailed(String),
}

impl HomeError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ConfigInvalid(_) => 500,
            Self::Transport(_) => 502,
            Self::Timeout => 504,
            Self::UnknownDevice(_) => 404,
            Self::WrongType { .. } => 400,
            Self::InvalidArgs(_) => 400,
            Self::ToolFailed(_) => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigInvalid(_) => "CONFIG_INVALID",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::UnknownDevice(_) => "UNKNOWN_DEVICE",
            Self::WrongType { .. } => "WRONG_TYPE",
            Self::InvalidArgs(_) => "INVALID_ARGS",
            Self::ToolFailed(_) => "TOOL_FAILED",
        }
    }

    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: self.to_string() }
    }

    pub fn to_http_response(&self) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body() };
        (status, Json(body))
    }
}

impl fmt::Display for HomeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigInvalid(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Transport(msg) => write!(f, "broker transport error: {msg}"),
            Self::Timeout => f.write_str("timed out waiting for state"),
            Self::UnknownDevice(id) => write!(f, "unknown device: {id}"),
            Self::WrongType { device, expected } => {
                write!(f, "device {device} is not a {expected}")
            }
            Self::InvalidArgs(msg) => write!(f, "invalid arguments: {msg}"),
            Self::ToolFailed(msg) => write!(f, "tool failed: {msg}"),
        }
    }
}

impl std::error::Error for HomeError {}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
