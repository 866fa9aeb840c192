//! Delivery of signed envelopes to the alarm web service

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Identity};
use tracing::{debug, warn};

use crate::error::{DispatchError, Result};
use crate::signer::SignedEnvelope;

/// Default alarm web service base URL
pub const DEFAULT_ALARM_BASE_URL: &str = "https://api.service.ff-agent.com/v1/WebService";

/// Sends one signed envelope and reports the upstream answer
///
/// `Ok` means a 2xx answer. Any other status, network error or timeout is an
/// error; callers never retry on the same channel.
#[async_trait]
pub trait AlarmTransport: Send + Sync {
    async fn deliver(&self, envelope: &SignedEnvelope) -> Result<u16>;
}

/// Build the shared outbound client
///
/// `identity_pem` is a PEM bundle holding the client certificate and its
/// private key.
pub fn build_client(timeout: Duration, identity_pem: Option<&Path>) -> Result<Client> {
    let mut builder = Client::builder().timeout(timeout);

    if let Some(path) = identity_pem {
        let pem = std::fs::read(path).map_err(|e| {
            DispatchError::Config(format!(
                "Cannot read client identity {}: {}",
                path.display(),
                e
            ))
        })?;
        let identity = Identity::from_pem(&pem)
            .map_err(|e| DispatchError::Config(format!("Invalid client identity: {}", e)))?;
        builder = builder.identity(identity);
    }

    builder
        .build()
        .map_err(|e| DispatchError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// HTTPS transport to `{base_url}/{channel}`
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, envelope: &SignedEnvelope) -> String {
        format!("{}/{}", self.base_url, envelope.channel.endpoint())
    }
}

#[async_trait]
impl AlarmTransport for HttpTransport {
    async fn deliver(&self, envelope: &SignedEnvelope) -> Result<u16> {
        let channel = envelope.channel.endpoint();
        let url = self.url_for(envelope);

        let mut request = self.client.post(&url);
        for (name, value) in &envelope.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .body(envelope.body.clone())
            .send()
            .await
            .map_err(|e| DispatchError::from_reqwest(channel, &e))?;

        let status = response.status();
        if status.is_success() {
            debug!("[{}] delivered: {}", channel, status);
            return Ok(status.as_u16());
        }

        let body = response.text().await.unwrap_or_default();
        warn!("[{}] rejected with {}: {}", channel, status, body);
        Err(DispatchError::upstream(
            channel,
            format!("HTTP {}", status.as_u16()),
        ))
    }
}
