//! HTTP client for the history service
//!
//! Wraps reqwest::Client with base URL handling and status checking.

use serde::de::DeserializeOwned;
use url::Url;

use crate::config::Config;
use crate::error::HistoryFetchError;

/// Client for the roster and thread history endpoints.
#[derive(Clone)]
pub struct HistoryClient {
    http: reqwest::Client,
    base: Url,
}

impl HistoryClient {
    pub fn new(base_url: &str) -> Result<Self, HistoryFetchError> {
        Ok(Self {
            http: reqwest::Client::new(),
            base: Url::parse(base_url)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, HistoryFetchError> {
        Self::new(&config.backend_url)
    }

    /// Build `{base}/{path}?{query}`, keeping any path prefix on the base.
    pub fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, HistoryFetchError> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                HistoryFetchError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase)
            })?;
            segments.pop_if_empty().push(path);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// GET a JSON document.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, HistoryFetchError> {
        let url = self.endpoint(path, query)?;
        tracing::debug!("History GET {}", url);

        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| HistoryFetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let resp = check_response(resp, url.as_str()).await?;
        resp.json()
            .await
            .map_err(|source| HistoryFetchError::Decode {
                url: url.to_string(),
                source,
            })
    }
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(
    resp: reqwest::Response,
    url: &str,
) -> Result<reqwest::Response, HistoryFetchError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(HistoryFetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp)
}
