// src/upload/client.rs

use anyhow::{Context, Result};
use reqwest::{blocking::Client, header::CONTENT_TYPE};
use std::time::Duration;
use tracing::debug;

use super::{MutationRequest, MutationTransport, TransportError, TransportResponse};
use crate::config::Endpoint;

/// Blocking HTTP transport for `POST {base}/api/mutation`.
pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    pub fn new(endpoint: &Endpoint, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            url: endpoint.mutation_url(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl MutationTransport for HttpTransport {
    fn post(&self, request: &MutationRequest<'_>) -> Result<TransportResponse, TransportError> {
        debug!(url = %self.url, records = request.args.data.len(), "POST mutation");
        let resp = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .map_err(classify_error)?;

        let status = resp.status().as_u16();
        let body = resp.text().map_err(classify_error)?;
        Ok(TransportResponse { status, body })
    }
}

fn classify_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Other(e.to_string())
    }
}
