//! Common utilities shared by the resolver core and the resolver CLI.

#![deny(missing_docs)]

mod config;
pub use crate::config::MergeOptions;

pub mod de;

mod errors;
pub use crate::errors::{register_metrics, StatusError};

pub mod metrics;

pub mod testing;

use actix_web::http::header;

/// Strip all but one leading slash and all trailing slashes.
pub fn parse_path_prefix<S>(path_prefix: S) -> String
where
    S: AsRef<str>,
{
    format!("/{}", path_prefix.as_ref().to_string().trim_matches('/'))
}

/// Make sure client requested a valid content type.
pub fn ensure_content_type(
    headers: &actix_web::http::HeaderMap,
    content_type: &'static str,
) -> Result<(), StatusError> {
    let content_json = header::HeaderValue::from_static(content_type);

    if !headers
        .get(header::ACCEPT)
        .map(|accept| accept == content_json)
        .unwrap_or(false)
    {
        Err(StatusError::InvalidContentType)
    } else {
        Ok(())
    }
}
