//! Message submission to the consumer process.
//!
//! Defines the `Submitter` trait and the AO messenger/compute unit client
//! that implements it.

pub mod ao;
pub mod data_item;

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use crate::types::{OracleError, Tag};

/// Abstraction over the channel that delivers signed updates to the
/// consumer process and reports what the process did with them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Submitter: Send + Sync {
    /// Sign and send a message to `process_id`. Returns the message id.
    async fn send_message(&self, process_id: &str, tags: &[Tag]) -> Result<String, OracleError>;

    /// Retrieve the outcome of a previously sent message.
    async fn fetch_result(
        &self,
        process_id: &str,
        message_id: &str,
    ) -> Result<MessageResult, OracleError>;
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Outcome of a processed message, as reported by a compute unit.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MessageResult {
    #[serde(rename = "Messages", default)]
    pub messages: Vec<OutboundMessage>,
    #[serde(rename = "Error", default)]
    pub error: Option<serde_json::Value>,
}

/// A message the target process emitted while handling ours.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "Tags", default, deserialize_with = "deserialize_tags")]
    pub tags: HashMap<String, String>,
}

impl MessageResult {
    /// Value of `tag` on the first emitted message, if present.
    pub fn first_message_tag(&self, tag: &str) -> Option<&str> {
        self.messages.first()?.tags.get(tag).map(String::as_str)
    }
}

/// Compute units return tags as `[{name, value}]`; some gateways flatten
/// them to a map. Both normalize to a map.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTags {
    List(Vec<Tag>),
    Map(HashMap<String, serde_json::Value>),
}

fn deserialize_tags<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<RawTags>::deserialize(deserializer)?;
    Ok(match raw {
        Some(RawTags::List(tags)) => tags.into_iter().map(|t| (t.name, t.value)).collect(),
        Some(RawTags::Map(map)) => map
            .into_iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect(),
        None => HashMap::new(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
