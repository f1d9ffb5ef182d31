//! # HTTP Ledger Adapter
//!
//! Submits a digest to the ledger's HTTP endpoint as a single `hash` field,
//! form-encoded by default or as a JSON body.
//!
//! | Response | Ack |
//! |----------|-----|
//! | 2xx with `{"success": true}` | `Accepted` |
//! | 2xx with `success: false` or an undecodable body | `Rejected` |
//! | other 4xx | `Rejected` |
//! | transport error, timeout, 408, 429, 5xx | `Unavailable` |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use shared_types::Digest;
use thiserror::Error;

use crate::ports::{AnchorAck, LedgerAnchor};

/// Request body encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorEncoding {
    /// `application/x-www-form-urlencoded`
    #[default]
    Form,
    /// `application/json`
    Json,
}

/// Errors building the client.
#[derive(Debug, Error)]
pub enum HttpAnchorError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid ledger endpoint `{0}`")]
    Endpoint(String),
}

#[derive(Serialize)]
struct AnchorRequest<'a> {
    hash: &'a str,
}

#[derive(Deserialize)]
struct AnchorResponse {
    success: bool,
}

/// Ledger reached over HTTP.
pub struct HttpLedgerAnchor {
    client: Client,
    endpoint: String,
    encoding: AnchorEncoding,
}

impl HttpLedgerAnchor {
    /// Create an anchor client with a per-request timeout.
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        encoding: AnchorEncoding,
    ) -> Result<Self, HttpAnchorError> {
        let endpoint = endpoint.into();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(HttpAnchorError::Endpoint(endpoint));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            encoding,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn classify_status(status: StatusCode) -> Option<AnchorAck> {
        if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            return Some(AnchorAck::Unavailable {
                reason: format!("ledger returned {status}"),
            });
        }
        if !status.is_success() {
            return Some(AnchorAck::Rejected {
                reason: format!("ledger returned {status}"),
            });
        }
        None
    }
}

#[async_trait]
impl LedgerAnchor for HttpLedgerAnchor {
    async fn submit(&self, digest: &Digest) -> AnchorAck {
        let hash = digest.to_hex();
        let request = self.client.post(&self.endpoint);
        let request = match self.encoding {
            AnchorEncoding::Form => request.form(&[("hash", hash.as_str())]),
            AnchorEncoding::Json => request.json(&AnchorRequest { hash: &hash }),
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return AnchorAck::Unavailable {
                    reason: e.to_string(),
                }
            }
        };

        if let Some(ack) = Self::classify_status(response.status()) {
            return ack;
        }

        match response.json::<AnchorResponse>().await {
            Ok(AnchorResponse { success: true }) => AnchorAck::Accepted,
            Ok(AnchorResponse { success: false }) => AnchorAck::Rejected {
                reason: "ledger reported success=false".into(),
            },
            Err(e) => AnchorAck::Rejected {
                reason: format!("malformed acknowledgement: {e}"),
            },
        }
    }
}
