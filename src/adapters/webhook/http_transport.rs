//! Reqwest-backed webhook transport.

use async_trait::async_trait;

use crate::ports::{TransportOutcome, WebhookRequest, WebhookTransport};

use super::SIGNATURE_HEADER;

/// Posts signed payloads over HTTP.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(&self, request: WebhookRequest) -> TransportOutcome {
        let response = self
            .client
            .post(&request.url)
            .header(SIGNATURE_HEADER, &request.signature_header)
            .header("Content-Type", "application/json")
            .timeout(request.timeout)
            .body(request.body)
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status().as_u16();
                if response.status().is_success() {
                    TransportOutcome::Accepted(status)
                } else {
                    TransportOutcome::Rejected(status)
                }
            }
            // Timeouts and connection failures both enter the retry path.
            Err(err) => TransportOutcome::Failed(err.to_string()),
        }
    }
}
