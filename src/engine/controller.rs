//! Update cycle controller.
//!
//! Drives one fetch → submit → confirm cycle and interprets the outcome.
//! A cycle never returns an error to its caller: every failure is logged
//! with the stage it happened in and folded into the returned report, so
//! a bad cycle can never break the recurring schedule.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::price::PriceSource;
use crate::submit::Submitter;
use crate::types::{CycleStage, OracleError, Tag, UpdateOutcome};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// What the controller sends and what it looks for in the reply.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub process_id: String,
    /// Value of the `Action` tag.
    pub action: String,
    /// Tag on the reply that confirms the price was applied.
    pub ack_tag: String,
}

impl ControllerSettings {
    pub fn new(process_id: impl Into<String>) -> Self {
        Self {
            process_id: process_id.into(),
            action: "UpdatePaymentTokenPrice".to_string(),
            ack_tag: "Updated-Payment-Token-Price".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// How a cycle ended.
#[derive(Debug)]
pub enum CycleOutcome {
    Succeeded(UpdateOutcome),
    Failed { stage: CycleStage, error: OracleError },
}

/// Summary of one cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Succeeded(_))
    }

    /// Terminal stage reached by the cycle.
    pub fn final_stage(&self) -> CycleStage {
        match self.outcome {
            CycleOutcome::Succeeded(_) => CycleStage::Succeeded,
            CycleOutcome::Failed { .. } => CycleStage::Failed,
        }
    }

    /// Stage in which the cycle failed, if it did.
    pub fn failed_stage(&self) -> Option<CycleStage> {
        match &self.outcome {
            CycleOutcome::Failed { stage, .. } => Some(*stage),
            CycleOutcome::Succeeded(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct UpdateController {
    prices: Arc<dyn PriceSource>,
    submitter: Arc<dyn Submitter>,
    settings: ControllerSettings,
}

impl UpdateController {
    pub fn new(
        prices: Arc<dyn PriceSource>,
        submitter: Arc<dyn Submitter>,
        settings: ControllerSettings,
    ) -> Self {
        Self { prices, submitter, settings }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Run one full cycle. Never fails; see [`CycleReport`].
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let span = tracing::info_span!("cycle", id = %cycle_id);

        async move {
            let started_at = Utc::now();
            let clock = Instant::now();
            info!("Starting price update cycle");

            let outcome = match self.drive().await {
                Ok(update) => CycleOutcome::Succeeded(update),
                Err((stage, error)) => {
                    error!(stage = %stage, error = %error, "Price update cycle failed");
                    CycleOutcome::Failed { stage, error }
                }
            };

            let report = CycleReport { cycle_id, started_at, elapsed: clock.elapsed(), outcome };
            debug!(
                stage = %report.final_stage(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Cycle finished"
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn drive(&self) -> Result<UpdateOutcome, (CycleStage, OracleError)> {
        // 1. Fetch
        debug!(stage = %CycleStage::Fetching, "Cycle stage");
        let record = self
            .prices
            .fetch_price()
            .await
            .map_err(|e| (CycleStage::Fetching, e))?;
        info!(
            price = format!("${:.6}", record.value()),
            transaction_id = %record.source_transaction_id(),
            "Current token price"
        );

        // 2. Submit
        debug!(stage = %CycleStage::Submitting, "Cycle stage");
        let price = record.price_tag_value();
        let tags = [
            Tag::new("Action", self.settings.action.as_str()),
            Tag::new("Price", price.as_str()),
        ];
        let message_id = self
            .submitter
            .send_message(&self.settings.process_id, &tags)
            .await
            .map_err(|e| (CycleStage::Submitting, e))?;
        info!(message_id = %message_id, "Price update message sent");

        // 3. Confirm
        debug!(stage = %CycleStage::Confirming, "Cycle stage");
        let result = self
            .submitter
            .fetch_result(&self.settings.process_id, &message_id)
            .await
            .map_err(|e| (CycleStage::Confirming, e))?;

        let acknowledged_price = result
            .first_message_tag(&self.settings.ack_tag)
            .map(String::from);

        match &acknowledged_price {
            Some(acked) => {
                info!(acknowledged_price = %acked, "Price updated successfully in process");
            }
            None => {
                warn!(
                    message_id = %message_id,
                    replies = result.messages.len(),
                    process_error = ?result.error,
                    "Update message processed but confirmation tag not found"
                );
            }
        }

        Ok(UpdateOutcome {
            submitted_price: record.value(),
            message_id,
            acknowledged: acknowledged_price.is_some(),
            acknowledged_price,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
