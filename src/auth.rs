//! # auth — API Key Middleware
//!
//! ป้องกัน Endpoint ด้วย `X-API-Key` header
//!
//! ## Mode
//! - `API_KEY` ไม่ได้ตั้ง (หรือ empty) → **Allow All** (Dev Mode)
//! - `API_KEY` ตั้งค่า → ต้องส่ง `X-API-Key: <key>` ทุก Request
//!
//! ## ยกเว้น
//! `/api/health` ไม่ต้อง Auth
//!
//! ```bash
//! curl -X POST -H "X-API-Key: $API_KEY" http://localhost:3000/api/safety/lock
//! ```

use axum::{
    body::Body,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

const PUBLIC_PATHS: &[&str] = &["/api/health"];

/// Checks `provided` against `expected`; an empty `expected` means dev mode.
fn is_authorized(expected: &str, path: &str, provided: Option<&str>) -> bool {
    expected.is_empty() || PUBLIC_PATHS.contains(&path) || provided == Some(expected)
}

/// Axum middleware — ตรวจสอบ X-API-Key header
pub async fn require_api_key(request: Request<Body>, next: Next) -> Response {
    let api_key_env = std::env::var("API_KEY").unwrap_or_default();
    let path = request.uri().path().to_string();
    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok());

    if is_authorized(&api_key_env, &path, provided) {
        return next.run(request).await;
    }

    warn!(path, "❌ Unauthorized request — invalid or missing X-API-Key");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "ok":    false,
            "error": "Unauthorized: invalid or missing X-API-Key header",
            "hint":  "Set X-API-Key header with your API key"
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_mode_allows_everything() {
        assert!(is_authorized("", "/api/safety/lock", None));
    }

    #[test]
    fn test_key_required_except_health() {
        assert!(!is_authorized("k", "/api/safety/lock", None));
        assert!(!is_authorized("k", "/api/safety/lock", Some("wrong")));
        assert!(is_authorized("k", "/api/safety/lock", Some("k")));
        assert!(is_authorized("k", "/api/health", None));
    }
}
