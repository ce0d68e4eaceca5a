use std::fmt::Debug;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::error::WeatherError;

/// Raw HTTP GET. Anything but a 200 is a [`WeatherError::BadResponse`].
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn get(&self, url: Url) -> Result<Vec<u8>, WeatherError>;
}

/// Fetch `url` and decode the body as JSON into `T`.
pub async fn fetch_json<T: DeserializeOwned>(
    transport: &dyn Transport,
    url: Url,
) -> Result<T, WeatherError> {
    let body = transport.get(url).await?;
    serde_json::from_slice(&body).map_err(|err| WeatherError::DecodeFailure(err.to_string()))
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: Url) -> Result<Vec<u8>, WeatherError> {
        let res = self.http.get(url).send().await.map_err(|err| {
            // Never echo the URL: it carries the API key.
            WeatherError::BadResponse(format!("request failed: {}", err.without_url()))
        })?;

        let status = res.status();
        let body = res
            .bytes()
            .await
            .map_err(|err| WeatherError::BadResponse(format!("failed to read body: {err}")))?;

        if status != StatusCode::OK {
            return Err(WeatherError::BadResponse(format!(
                "status {}: {}",
                status,
                truncate_body(&String::from_utf8_lossy(&body)),
            )));
        }

        Ok(body.to_vec())
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
