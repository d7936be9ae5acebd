//! # error
//!
//! Two error types live here:
//!
//! * [`SignalError`] — the pipeline taxonomy.  Detector-local failures are
//!   converted into fail-reasons at the Strategy Engine boundary and never
//!   propagate further; a pipeline error only aborts the current tick.
//! * [`AppError`] — what HTTP handlers return.  Axum's `IntoResponse` impl
//!   converts these into structured JSON error bodies so dashboards and the
//!   external scheduler always get a machine-readable response.
//!
//! "Threshold not met" is deliberately *not* an error: it is a `None`
//! outcome logged at info level.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// ─── Pipeline errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SignalError {
    /// Upstream fetch returned too little data to evaluate.
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// Unexpected failure inside one detector's analyze().
    #[error("Computation error in {strategy}: {message}")]
    Computation { strategy: String, message: String },

    /// A detector exceeded its analyze() budget.
    #[error("{strategy} timed out after {secs}s")]
    Timeout { strategy: String, secs: u64 },

    /// Required settings are missing or malformed.
    #[error("Configuration invalid: {0}")]
    ConfigurationInvalid(String),

    /// Market-data bridge or notification channel failure.
    #[error("Upstream error: {0}")]
    Upstream(String),
}

// ─── HTTP errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AppError {
    /// The request payload was syntactically correct but semantically invalid.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Signal(#[from] SignalError),

    /// Catch-all for unexpected failures.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Signal(SignalError::DataUnavailable(msg)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, format!("Data unavailable: {msg}"))
            }
            AppError::Signal(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {err}"),
            ),
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}
