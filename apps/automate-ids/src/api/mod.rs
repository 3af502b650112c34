//! # API Module
//!
//! HTTP clients for the servers the function talks to.
//!
//! | Client | Server | Used for |
//! |--------|--------|----------|
//! | `SpeckleClient` | Speckle server | version objects, blobs, run status |
//! | `BsddClient` | bsDD API | class lookups by URI |
//!
//! Requests are sequential and time out after `REQUEST_TIMEOUT`.

pub mod bsdd;
pub mod speckle;

pub use bsdd::{BsddClient, DEFAULT_BSDD_API_URL};
pub use speckle::SpeckleClient;

use crate::error::{AppError, AppResult};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::time::Duration;

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build an HTTP client, optionally sending `Authorization: Bearer <token>`.
pub fn http_client(token: Option<&str>) -> AppResult<reqwest::Client> {
    let mut headers = HeaderMap::new();
    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| AppError::InvalidArgument(format!("Invalid token header: {}", e)))?;
        headers.insert(AUTHORIZATION, value);
    }
    Ok(reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .default_headers(headers)
        .build()?)
}

/// Turn a non-success response into `AppError::Server` with the body text.
pub(crate) async fn ensure_success(response: reqwest::Response) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(AppError::Server(format!("{} from {}: {}", status, url, body.trim())))
}
