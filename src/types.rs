//! Shared types for the price oracle.
//!
//! These types form the data model passed between the price source, the
//! submission client, and the cycle engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Price
// ---------------------------------------------------------------------------

/// One validated price observation pulled from the ledger.
///
/// Fields are private so a record can only be produced through
/// [`PriceRecord::new`], which enforces a finite positive value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRecord {
    value: f64,
    timestamp: DateTime<Utc>,
    source_transaction_id: String,
    data_feed_id: String,
    provenance: Provenance,
}

/// Payload-level details kept alongside the price for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub data_service_id: Option<String>,
    pub signer_address: Option<String>,
    pub is_signature_valid: Option<bool>,
    /// Metadata attached to the matching data point, if any.
    pub metadata: Option<serde_json::Value>,
}

impl PriceRecord {
    pub fn new(
        value: f64,
        timestamp: DateTime<Utc>,
        source_transaction_id: impl Into<String>,
        data_feed_id: impl Into<String>,
        provenance: Provenance,
    ) -> Result<Self, OracleError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(OracleError::MalformedData(format!(
                "price must be a finite positive number, got {value}"
            )));
        }
        Ok(Self {
            value,
            timestamp,
            source_transaction_id: source_transaction_id.into(),
            data_feed_id: data_feed_id.into(),
            provenance,
        })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn source_transaction_id(&self) -> &str {
        &self.source_transaction_id
    }

    pub fn data_feed_id(&self) -> &str {
        &self.data_feed_id
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// The price as it is sent in the `Price` tag: shortest decimal form
    /// that round-trips, without exponent.
    pub fn price_tag_value(&self) -> String {
        self.value.to_string()
    }
}

impl fmt::Display for PriceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} = ${:.6} @ {} (tx {})",
            self.data_feed_id,
            self.value,
            self.timestamp.to_rfc3339(),
            self.source_transaction_id,
        )
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// A name/value metadata pair attached to an AO message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

/// Result of one submission attempt. Logged, then dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub submitted_price: f64,
    pub message_id: String,
    /// Whether the target process echoed the acknowledgment tag.
    pub acknowledged: bool,
    pub acknowledged_price: Option<String>,
}

// ---------------------------------------------------------------------------
// Cycle
// ---------------------------------------------------------------------------

/// Stages of a single update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CycleStage {
    Idle,
    Fetching,
    Submitting,
    Confirming,
    Succeeded,
    Failed,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CycleStage::Idle => "idle",
            CycleStage::Fetching => "fetching",
            CycleStage::Submitting => "submitting",
            CycleStage::Confirming => "confirming",
            CycleStage::Succeeded => "succeeded",
            CycleStage::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types.
///
/// Only `Configuration` is fatal; every other variant is contained within
/// the cycle that produced it.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No matching ledger record: {0}")]
    NotFound(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Malformed price data: {0}")]
    MalformedData(String),

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Could not retrieve message result: {0}")]
    Confirmation(String),
}

impl OracleError {
    /// Whether this error must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OracleError::Configuration(_))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
