use crate::error::{Result, SendError};
use log::{debug, info};
use reqwest::blocking::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SEND_TOKENS_PATH: &str = "thin_wallet/send_tokens";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// What the node reports back for an accepted transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    /// Hash the node assigned, when it echoes the transaction back
    pub tx_hash: Option<String>,
    pub message: Option<String>,
}

/// Delivers a finished transaction to the network.
pub trait SubmissionGateway {
    fn submit(&self, tx_hex: &str) -> Result<SubmissionReceipt>;
}

#[derive(Debug, Serialize)]
struct SendTokensRequest<'a> {
    tx_hex: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendTokensResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    tx: Option<serde_json::Value>,
}

/// Gateway posting to a node's thin wallet API.
pub struct HttpGateway {
    endpoint: String,
    client: Client,
}

impl HttpGateway {
    pub fn new(node_url: &str, timeout: Duration) -> Result<HttpGateway> {
        let client = ClientBuilder::new()
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(HttpGateway {
            endpoint: send_tokens_endpoint(node_url),
            client,
        })
    }

    pub fn get_endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl SubmissionGateway for HttpGateway {
    fn submit(&self, tx_hex: &str) -> Result<SubmissionReceipt> {
        debug!("Posting {} hex chars to {}", tx_hex.len(), self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SendTokensRequest { tx_hex })
            .send()?;

        let status = response.status().as_u16();
        let body = response.bytes()?;
        let receipt = interpret_response(status, &body)?;
        info!(
            "Node accepted transaction {}",
            receipt.tx_hash.as_deref().unwrap_or("(no hash returned)")
        );
        Ok(receipt)
    }
}

fn send_tokens_endpoint(node_url: &str) -> String {
    let base = node_url.trim();
    if base.ends_with('/') {
        format!("{base}{SEND_TOKENS_PATH}")
    } else {
        format!("{base}/{SEND_TOKENS_PATH}")
    }
}

/// Map an HTTP status and body to a receipt or the matching error. A
/// structured `success: false` is a rejection whatever the status code.
pub fn interpret_response(status: u16, body: &[u8]) -> Result<SubmissionReceipt> {
    let parsed: std::result::Result<SendTokensResponse, _> = serde_json::from_slice(body);

    match (status, parsed) {
        (_, Ok(response)) if !response.success => Err(SendError::SubmissionRejected(
            response
                .message
                .unwrap_or_else(|| "Transaction rejected".to_string()),
        )),
        (200..=299, Ok(response)) => Ok(SubmissionReceipt {
            tx_hash: response
                .tx
                .as_ref()
                .and_then(|tx| tx.get("hash"))
                .and_then(|hash| hash.as_str())
                .map(str::to_string),
            message: response.message,
        }),
        (200..=299, Err(e)) => Err(SendError::Transport(format!(
            "Unreadable response from node: {e}"
        ))),
        (code, _) => Err(SendError::Transport(format!(
            "Unexpected status code {code} from node"
        ))),
    }
}
