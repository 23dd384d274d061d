//! Errors surfaced by the ambient status/metrics HTTP surface.

use actix_web::http;
use actix_web::HttpResponse;
use prometheus::{IntGaugeVec, Opts, Registry};
use thiserror::Error;

/// Errors returned by the status/metrics endpoints.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum StatusError {
    /// The client did not request the content type we serve.
    #[error("invalid Content-Type requested")]
    InvalidContentType,
}

impl actix_web::error::ResponseError for StatusError {
    fn error_response(&self) -> HttpResponse {
        self.as_json_error()
    }
}

impl StatusError {
    /// Return the HTTP JSON error response.
    pub fn as_json_error(&self) -> HttpResponse {
        let code = self.as_status_code();
        let json_body = serde_json::json!({
            "kind": self.as_kind(),
            "value": self.to_string(),
        });
        HttpResponse::build(code).json(json_body)
    }

    fn as_status_code(&self) -> http::StatusCode {
        match *self {
            StatusError::InvalidContentType => http::StatusCode::NOT_ACCEPTABLE,
        }
    }

    fn as_kind(&self) -> &'static str {
        match *self {
            StatusError::InvalidContentType => "invalid_content_type",
        }
    }
}

/// Register a `build_info` gauge (always `1`) carrying the crate version as
/// a label, the same convention most Prometheus exporters use to make the
/// running version visible in dashboards.
pub fn register_metrics(registry: &Registry, component: &str, version: &str) -> anyhow::Result<()> {
    let build_info = IntGaugeVec::new(
        Opts::new("build_info", "Build information"),
        &["component", "version"],
    )?;
    registry.register(Box::new(build_info.clone()))?;
    build_info.with_label_values(&[component, version]).set(1);
    Ok(())
}
