// src/health/http.rs
use super::checker::{CheckError, Checker};
use crate::config::HttpCheckerConfig;
use async_trait::async_trait;
use reqwest::Client;
use tokio::time::{timeout, Duration};
use tracing::debug;
use url::Url;

/// Checks an HTTP dependency by issuing `GET <url>`; any 2xx answer is healthy.
pub struct HttpChecker {
    url: Url,
    timeout: Duration,
    client: Client,
}

impl HttpChecker {
    /// `request_timeout` bounds the whole request, connect included.
    pub fn new(url: Url, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().build()?;

        Ok(Self {
            url,
            timeout: request_timeout,
            client,
        })
    }

    pub fn from_config(config: &HttpCheckerConfig) -> Result<Self, reqwest::Error> {
        Self::new(config.url.clone(), config.timeout())
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Checker for HttpChecker {
    async fn check(&self) -> Result<(), CheckError> {
        let result = timeout(self.timeout, self.client.get(self.url.as_str()).send()).await;

        match result {
            Ok(Ok(response)) => {
                let status = response.status();
                debug!(url = %self.url, %status, "HTTP check answered");
                if status.is_success() {
                    Ok(())
                } else {
                    Err(CheckError::Status(status))
                }
            }
            Ok(Err(e)) => Err(CheckError::Request(e)),
            Err(_) => Err(CheckError::Timeout(self.timeout)),
        }
    }
}
