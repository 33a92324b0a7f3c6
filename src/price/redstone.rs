//! RedStone price feed read from Arweave.
//!
//! RedStone publishes signed price packages as Arweave transactions. The
//! latest one for a feed is located through the Arweave GraphQL index and
//! then fetched from the gateway by transaction id.
//!
//! GraphQL: https://arweave.net/graphql
//! Data:    https://arweave.net/{tx_id}

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::PriceSource;
use crate::config::FeedConfig;
use crate::types::{OracleError, PriceRecord, Provenance};

// ---------------------------------------------------------------------------
// GraphQL response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<GraphQlData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlData {
    transactions: TransactionConnection,
}

#[derive(Debug, Deserialize)]
struct TransactionConnection {
    #[serde(default)]
    edges: Vec<TransactionEdge>,
}

#[derive(Debug, Deserialize)]
struct TransactionEdge {
    node: TransactionNode,
}

#[derive(Debug, Deserialize)]
struct TransactionNode {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Reads the latest RedStone price package for one feed from Arweave.
pub struct RedstoneClient {
    http: Client,
    feed: FeedConfig,
}

impl RedstoneClient {
    pub fn new(feed: FeedConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ao-price-oracle/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for Arweave")?;

        Ok(Self { http, feed })
    }

    pub fn feed(&self) -> &FeedConfig {
        &self.feed
    }

    /// GraphQL query selecting the newest transaction for the configured
    /// feed, published by the trusted owner.
    pub fn graphql_query(&self) -> String {
        format!(
            r#"query {{
  transactions(
    sort: HEIGHT_DESC,
    first: 1,
    tags: [
      {{ name: "type", values: ["{feed_type}"] }},
      {{ name: "dataFeedId", values: ["{feed_id}"] }},
      {{ name: "dataServiceId", values: ["{service_id}"] }}
    ],
    owners: ["{owner}"]
  ) {{
    edges {{
      node {{
        id
        tags {{ name value }}
        owner {{ address key }}
      }}
    }}
  }}
}}"#,
            feed_type = self.feed.feed_type,
            feed_id = self.feed.data_feed_id,
            service_id = self.feed.data_service_id,
            owner = self.feed.trusted_owner,
        )
    }

    /// Id of the most recent matching price transaction.
    pub async fn find_latest_transaction_id(&self) -> Result<String, OracleError> {
        let body = serde_json::json!({ "query": self.graphql_query() });

        debug!(endpoint = %self.feed.graphql_endpoint, "Querying Arweave index");

        let resp = self
            .http
            .post(&self.feed.graphql_endpoint)
            .header("Accept", "application/json")
            .header("Origin", "https://arweave.net")
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Fetch(format!("GraphQL request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(OracleError::Fetch(format!("GraphQL request failed {status}: {body}")));
        }

        let parsed: GraphQlResponse = resp
            .json()
            .await
            .map_err(|e| OracleError::Fetch(format!("Failed to parse GraphQL response: {e}")))?;

        let id = latest_id(parsed)?;
        info!(transaction_id = %id, "Latest price transaction found");
        Ok(id)
    }

    /// Raw JSON content of a price transaction.
    pub async fn fetch_payload(&self, transaction_id: &str) -> Result<Value, OracleError> {
        let url = format!("{}/{}", self.feed.data_endpoint.trim_end_matches('/'), transaction_id);

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| OracleError::Fetch(format!("Price data request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(OracleError::Fetch(format!(
                "Failed to fetch price data {transaction_id}: {status}: {body}"
            )));
        }

        let payload: Value = resp.json().await.map_err(|e| {
            OracleError::MalformedData(format!("price data for {transaction_id} is not JSON: {e}"))
        })?;

        debug!(transaction_id, "Price data fetched");
        Ok(payload)
    }
}

#[async_trait]
impl PriceSource for RedstoneClient {
    async fn fetch_price(&self) -> Result<PriceRecord, OracleError> {
        info!(feed = %self.feed.data_feed_id, "Fetching token price...");

        let transaction_id = self.find_latest_transaction_id().await?;
        let payload = self.fetch_payload(&transaction_id).await?;
        let record = build_record(&payload, &transaction_id, &self.feed.data_feed_id)?;

        info!(price = record.value(), feed = %record.data_feed_id(), "Token price fetched");
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Payload validation
// ---------------------------------------------------------------------------

fn latest_id(resp: GraphQlResponse) -> Result<String, OracleError> {
    if !resp.errors.is_empty() {
        let messages: Vec<_> = resp.errors.into_iter().map(|e| e.message).collect();
        return Err(OracleError::Fetch(format!("GraphQL errors: {}", messages.join("; "))));
    }

    resp.data
        .and_then(|d| d.transactions.edges.into_iter().next())
        .map(|edge| edge.node.id)
        .ok_or_else(|| OracleError::NotFound("No transactions found".to_string()))
}

/// The single data point whose `dataFeedId` equals `feed_id`.
fn find_data_point<'a>(payload: &'a Value, feed_id: &str) -> Result<&'a Value, OracleError> {
    let points = payload
        .get("dataPoints")
        .and_then(Value::as_array)
        .filter(|points| !points.is_empty())
        .ok_or_else(|| {
            OracleError::MalformedData("Invalid price data structure: no dataPoints found".into())
        })?;

    let mut matching = points
        .iter()
        .filter(|dp| dp.get("dataFeedId").and_then(Value::as_str) == Some(feed_id));

    let point = matching.next().ok_or_else(|| {
        OracleError::MalformedData(format!("{feed_id} data point not found in price data"))
    })?;

    if matching.next().is_some() {
        return Err(OracleError::MalformedData(format!(
            "more than one {feed_id} data point in price data"
        )));
    }

    Ok(point)
}

/// Extract the price for `feed_id` from a RedStone payload.
///
/// The payload must carry a non-empty `dataPoints` array with exactly one
/// entry for the feed, whose `value` is a finite number.
pub fn extract_price(payload: &Value, feed_id: &str) -> Result<f64, OracleError> {
    let point = find_data_point(payload, feed_id)?;

    let price = point
        .get("value")
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .ok_or_else(|| OracleError::MalformedData(format!("Invalid price value for {feed_id}")))?;

    Ok(price)
}

/// Build a validated [`PriceRecord`] from a fetched payload.
pub fn build_record(
    payload: &Value,
    transaction_id: &str,
    feed_id: &str,
) -> Result<PriceRecord, OracleError> {
    let price = extract_price(payload, feed_id)?;
    let point = find_data_point(payload, feed_id)?;

    let timestamp = payload
        .get("timestampMilliseconds")
        .and_then(Value::as_i64)
        .and_then(ms_to_datetime)
        .unwrap_or_else(|| {
            debug!(transaction_id, "Payload has no usable timestamp, using fetch time");
            Utc::now()
        });

    let provenance = Provenance {
        data_service_id: payload.get("dataServiceId").and_then(Value::as_str).map(String::from),
        signer_address: payload.get("signerAddress").and_then(Value::as_str).map(String::from),
        is_signature_valid: payload.get("isSignatureValid").and_then(Value::as_bool),
        metadata: point.get("metadata").cloned(),
    };

    PriceRecord::new(price, timestamp, transaction_id, feed_id, provenance)
}

fn ms_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
