//! # Sources Module
//!
//! Loads IDS documents and bsDD dictionaries named in the function inputs.
//!
//! A source is an `http(s)://` URL or a local path. A bsDD source that
//! contains `/class/` is a class URI and is fetched from the bsDD API
//! instead of being read as a sheet.

use crate::api::{ensure_success, http_client, BsddClient};
use crate::error::{AppError, AppResult};
use automate_ids_core::bsdd::dictionary_uri_of;
use automate_ids_core::{BsddDictionary, IdsDocument};
use tracing::{debug, info};

/// True for `http://` and `https://` sources.
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Fetches rule sources over HTTP or from disk.
#[derive(Debug, Clone)]
pub struct SourceLoader {
    client: reqwest::Client,
    bsdd: BsddClient,
}

impl SourceLoader {
    pub fn new(bsdd_api_url: &str) -> AppResult<Self> {
        Ok(Self {
            client: http_client(None)?,
            bsdd: BsddClient::new(bsdd_api_url)?,
        })
    }

    /// Read a source as text.
    pub async fn load_text(&self, source: &str) -> AppResult<String> {
        if is_url(source) {
            debug!(source, "Downloading source");
            let response = self.client.get(source).send().await?;
            Ok(ensure_success(response).await?.text().await?)
        } else {
            tokio::fs::read_to_string(source).await.map_err(|e| {
                AppError::InvalidArgument(format!("cannot read {}: {}", source, e))
            })
        }
    }

    /// Load and parse an IDS document.
    pub async fn load_ids(&self, source: &str) -> AppResult<IdsDocument> {
        let xml = self.load_text(source).await?;
        let document = IdsDocument::parse(&xml)?;
        info!(
            source,
            title = document.title.as_deref().unwrap_or(""),
            requirements = document.requirements.len(),
            skipped = document.skipped.len(),
            "Loaded IDS"
        );
        Ok(document)
    }

    /// Load the dictionaries of one bsDD source.
    pub async fn load_bsdd(&self, source: &str) -> AppResult<Vec<BsddDictionary>> {
        let dictionaries = if dictionary_uri_of(source).is_some() {
            let class = self.bsdd.class(source).await?;
            BsddDictionary::from_classes(vec![class])
        } else {
            let json = self.load_text(source).await?;
            BsddDictionary::from_sheet_json(&json)?
        };
        info!(
            source,
            dictionaries = dictionaries.len(),
            classes = dictionaries.iter().map(BsddDictionary::len).sum::<usize>(),
            "Loaded bsDD source"
        );
        Ok(dictionaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_detection() {
        assert!(is_url("https://example.com/ids.xml"));
        assert!(is_url("http://localhost:8080/x"));
        assert!(!is_url("standards/ids.xml"));
        assert!(!is_url("C:\\ids.xml"));
    }

    #[tokio::test]
    async fn missing_local_file_is_invalid_argument() {
        let loader = SourceLoader::new("http://127.0.0.1:9").unwrap();
        let err = loader.load_text("does/not/exist.ids").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }
}
