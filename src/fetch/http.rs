// src/fetch/http.rs
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::Transport;
use crate::error::FetchFailure;

/// Plain HTTP GET via reqwest. Any non-2xx status counts as a failed attempt.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_once(&self, url: &str) -> Result<String, FetchFailure> {
        let rsp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchFailure::Transport(e.to_string()))?;

        let status = rsp.status();
        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        rsp.text()
            .await
            .map_err(|e| FetchFailure::Transport(format!("reading body: {e}")))
    }
}
