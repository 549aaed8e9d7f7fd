//! HTTP adapters for the transit authority and the directions service.

use std::time::Duration;

use dondeviene_transit::{Result, TransitError};

pub mod mapbox;
pub mod red;

pub use mapbox::MapboxDirections;
pub use red::RedClient;

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| TransitError::UpstreamFetch(format!("Failed to create HTTP client: {e}")))
}

/// Send a request and return the body of a 2xx response.
async fn fetch_text(request: reqwest::RequestBuilder) -> Result<String> {
    let response = request
        .send()
        .await
        .map_err(|e| TransitError::UpstreamFetch(e.without_url().to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(TransitError::UpstreamFetch(format!("HTTP {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| TransitError::UpstreamFetch(format!("Failed to read body: {}", e.without_url())))
}

fn decode<T: serde::de::DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| TransitError::UpstreamFetch(format!("Malformed {what} response: {e}")))
}
