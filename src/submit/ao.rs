//! AO network client.
//!
//! Messages are signed locally as ANS-104 data items, posted to a messenger
//! unit (MU), and their results read back from a compute unit (CU).
//!
//! MU: POST {mu_url}/                                  (application/octet-stream)
//! CU: GET  {cu_url}/result/{message_id}?process-id={process_id}

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::data_item::{decode_id, DataItem, DataItemBuilder, ID_LENGTH};
use super::{MessageResult, Submitter};
use crate::config::AoConfig;
use crate::credential::Signer;
use crate::types::{OracleError, Tag};

/// Payload of every message; the process acts on tags only.
const MESSAGE_DATA: &[u8] = b"1984";

/// Response from the MU after accepting a data item.
#[derive(Debug, Deserialize)]
struct MuResponse {
    #[serde(default)]
    id: Option<String>,
}

/// Protocol tags that mark a data item as an AO message.
fn protocol_tags() -> Vec<Tag> {
    vec![
        Tag::new("Data-Protocol", "ao"),
        Tag::new("Variant", "ao.TN.1"),
        Tag::new("Type", "Message"),
        Tag::new("SDK", env!("CARGO_PKG_NAME")),
    ]
}

/// Random 32-character alphanumeric anchor.
fn random_anchor() -> [u8; ID_LENGTH] {
    let mut anchor = [0u8; ID_LENGTH];
    for (slot, ch) in anchor.iter_mut().zip(rand::thread_rng().sample_iter(&Alphanumeric)) {
        *slot = ch;
    }
    anchor
}

/// AO messenger/compute unit client.
pub struct AoClient {
    http: Client,
    config: AoConfig,
    signer: Arc<dyn Signer>,
}

impl AoClient {
    pub fn new(config: AoConfig, signer: Arc<dyn Signer>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ao-price-oracle/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for AO")?;

        Ok(Self { http, config, signer })
    }

    /// Sign a message for `process_id` carrying `tags` after the protocol tags.
    pub fn build_message(
        &self,
        process_id: &str,
        tags: &[Tag],
    ) -> Result<DataItem, OracleError> {
        let target = decode_id(process_id)?;
        let mut all_tags = protocol_tags();
        all_tags.extend_from_slice(tags);

        DataItemBuilder {
            target: Some(target),
            anchor: Some(random_anchor()),
            tags: &all_tags,
            data: MESSAGE_DATA,
        }
        .sign(self.signer.as_ref())
    }
}

#[async_trait]
impl Submitter for AoClient {
    async fn send_message(&self, process_id: &str, tags: &[Tag]) -> Result<String, OracleError> {
        let item = self.build_message(process_id, tags)?;
        let url = format!("{}/", self.config.mu_url.trim_end_matches('/'));

        debug!(message_id = %item.id, bytes = item.bytes.len(), "Posting data item to MU");

        let resp = self
            .http
            .post(&url)
            .header("Content-Type", "application/octet-stream")
            .header("Accept", "application/json")
            .body(item.bytes)
            .send()
            .await
            .map_err(|e| OracleError::Submission(format!("MU request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(OracleError::Submission(format!("MU rejected message {status}: {body}")));
        }

        // The id is derived from our own signature; the MU echo is informational.
        match resp.json::<MuResponse>().await {
            Ok(MuResponse { id: Some(echoed) }) if echoed != item.id => {
                warn!(expected = %item.id, echoed = %echoed, "MU echoed a different message id");
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "MU response body was not JSON"),
        }

        info!(message_id = %item.id, process_id, "Message sent");
        Ok(item.id)
    }

    async fn fetch_result(
        &self,
        process_id: &str,
        message_id: &str,
    ) -> Result<MessageResult, OracleError> {
        let url = format!(
            "{}/result/{}?process-id={}",
            self.config.cu_url.trim_end_matches('/'),
            urlencoding::encode(message_id),
            urlencoding::encode(process_id),
        );

        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| OracleError::Confirmation(format!("CU request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(OracleError::Confirmation(format!(
                "CU result lookup failed {status}: {body}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| OracleError::Confirmation(format!("Failed to parse CU result: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
