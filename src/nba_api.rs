use std::time::Duration;

use anyhow::Result;
use reqwest::blocking::Client;
use tracing::debug;

use crate::error::FetchError;
use crate::fetch::{StatsSource, UpstreamCall};
use crate::http_client::http_client;

const ERROR_BODY_LIMIT: usize = 200;

pub struct NbaStatsClient {
    client: &'static Client,
    base_url: String,
    timeout: Duration,
}

impl NbaStatsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                secs: self.timeout.as_secs(),
            }
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

impl StatsSource for NbaStatsClient {
    fn call(&mut self, call: &UpstreamCall) -> Result<String, FetchError> {
        let url = format!("{}/{}", self.base_url, call.endpoint);
        debug!(call = %call.describe(), "upstream request");
        let resp = self
            .client
            .get(&url)
            .query(&call.params)
            .send()
            .map_err(|err| self.classify(err))?;
        let status = resp.status();
        let body = resp.text().map_err(|err| self.classify(err))?;
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }
        Ok(body)
    }
}
