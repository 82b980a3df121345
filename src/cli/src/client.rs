//! HTTP client for the lockstep status server.

use anyhow::{Context, Result};
use lockstep_core::api::HealthReport;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// API response wrapper matching the server's `ApiResponse` format.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

/// Error body returned by the server for failed requests.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// HTTP client for the status API.
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client pointing at the given base URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Return the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))
    }

    /// Perform a GET request and unwrap the `data` field of the response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.send(path).await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            match serde_json::from_str::<ErrorBody>(&body) {
                Ok(err) => anyhow::bail!("{} ({})", err.message, err.code),
                Err(_) => anyhow::bail!("API error ({}): {}", status, body),
            }
        }

        let api_resp: ApiResponse<T> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))?;

        if api_resp.success {
            api_resp
                .data
                .ok_or_else(|| anyhow::anyhow!("API returned success but no data"))
        } else {
            Err(anyhow::anyhow!(
                "API error: {}",
                api_resp.error.unwrap_or_else(|| "Unknown error".into())
            ))
        }
    }

    /// Fetch the health report.
    ///
    /// A stopped processor answers 503 with a full report, so the body is
    /// parsed regardless of status.
    pub async fn health(&self) -> Result<HealthReport> {
        let resp = self.send("/health").await?;
        let status = resp.status();
        let body = resp.text().await.context("Failed to read health response")?;

        serde_json::from_str(&body)
            .with_context(|| format!("Unexpected health response ({}): {}", status, body))
    }
}
