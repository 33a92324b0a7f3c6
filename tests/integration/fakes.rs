//! In-memory collaborators for deterministic testing.
//!
//! Both fakes count calls and can be told to fail, so tests can assert
//! which stages of a cycle ran.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use ao_price_oracle::price::PriceSource;
use ao_price_oracle::submit::{MessageResult, OutboundMessage, Submitter};
use ao_price_oracle::types::{OracleError, PriceRecord, Provenance, Tag};

/// Price source returning a fixed price after an optional delay.
pub struct FakePriceSource {
    price: f64,
    delay: Duration,
    fail: AtomicBool,
    calls: AtomicUsize,
    completed: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakePriceSource {
    pub fn new(price: f64) -> Self {
        Self::with_delay(price, Duration::ZERO)
    }

    pub fn with_delay(price: f64, delay: Duration) -> Self {
        Self {
            price,
            delay,
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        let source = Self::new(1.0);
        source.fail.store(true, Ordering::SeqCst);
        source
    }

    /// Number of cycles that reached the fetch stage.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at the same time.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for FakePriceSource {
    async fn fetch_price(&self) -> Result<PriceRecord, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(OracleError::Fetch("gateway unavailable".into()));
        }
        PriceRecord::new(self.price, Utc::now(), "tx-fake", "AO", Provenance::default())
    }
}

/// Submitter that records every message and acknowledges with a fixed tag.
pub struct FakeSubmitter {
    ack_tag: Option<(String, String)>,
    sent: Mutex<Vec<Vec<Tag>>>,
    results_fetched: AtomicUsize,
}

impl FakeSubmitter {
    /// Acknowledges every update with `Updated-Payment-Token-Price`.
    pub fn acking() -> Self {
        Self {
            ack_tag: Some(("Updated-Payment-Token-Price".into(), String::new())),
            sent: Mutex::new(Vec::new()),
            results_fetched: AtomicUsize::new(0),
        }
    }

    /// Replies without any recognizable acknowledgment.
    pub fn silent() -> Self {
        Self { ack_tag: None, sent: Mutex::new(Vec::new()), results_fetched: AtomicUsize::new(0) }
    }

    pub fn sent(&self) -> Vec<Vec<Tag>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn results_fetched(&self) -> usize {
        self.results_fetched.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Submitter for FakeSubmitter {
    async fn send_message(&self, _process_id: &str, tags: &[Tag]) -> Result<String, OracleError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(tags.to_vec());
        Ok(format!("msg-{}", sent.len()))
    }

    async fn fetch_result(
        &self,
        _process_id: &str,
        message_id: &str,
    ) -> Result<MessageResult, OracleError> {
        self.results_fetched.fetch_add(1, Ordering::SeqCst);

        let Some((name, _)) = &self.ack_tag else {
            return Ok(MessageResult::default());
        };

        // Echo back the price from the message being confirmed.
        let index: usize = message_id.trim_start_matches("msg-").parse().unwrap_or(1);
        let price = self.sent.lock().unwrap()[index - 1]
            .iter()
            .find(|t| t.name == "Price")
            .map(|t| t.value.clone())
            .unwrap_or_default();

        let mut message = OutboundMessage::default();
        message.tags.insert(name.clone(), price);
        Ok(MessageResult { messages: vec![message], error: None })
    }
}
