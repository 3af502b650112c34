//! bsDD REST client: `GET {base}/api/Class/v1?Uri=..&IncludeClassProperties=true`.

use super::{ensure_success, http_client};
use crate::error::AppResult;
use automate_ids_core::BsddClass;
use tracing::debug;

/// Public bsDD API.
pub const DEFAULT_BSDD_API_URL: &str = "https://api.bsdd.buildingsmart.org";

/// Unauthenticated bsDD client.
#[derive(Debug, Clone)]
pub struct BsddClient {
    base_url: String,
    client: reqwest::Client,
}

impl BsddClient {
    pub fn new(base_url: &str) -> AppResult<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(None)?,
        })
    }

    /// Fetch one class with its properties.
    pub async fn class(&self, uri: &str) -> AppResult<BsddClass> {
        let url = format!("{}/api/Class/v1", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("Uri", uri), ("IncludeClassProperties", "true")])
            .send()
            .await?;
        let body = ensure_success(response).await?.text().await?;
        let class = BsddClass::from_api_json(&body)?;
        debug!(uri, code = %class.code, properties = class.properties.len(), "Fetched bsDD class");
        Ok(class)
    }
}
