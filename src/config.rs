//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `config.toml` (optional, every key has a default) and then applies
//! the deployment overrides from the process environment. The signing key is
//! never part of this struct; only the name of the env var holding it is.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Length of a base64url-encoded 32-byte AO process id.
const PROCESS_ID_LEN: usize = 43;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub oracle: OracleConfig,
    pub feed: FeedConfig,
    pub ao: AoConfig,
    pub http: HttpConfig,
    pub health: HealthConfig,
    pub credential: CredentialConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OracleConfig {
    /// Target AO process. Usually supplied through `ORACLE_PROCESS_ID`.
    pub process_id: Option<String>,
    pub update_interval_ms: u64,
    /// Skip a tick while the previous cycle is still in flight.
    pub serialize_cycles: bool,
    /// How long shutdown waits for in-flight cycles.
    pub shutdown_grace_secs: u64,
    pub action: String,
    pub ack_tag: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            process_id: None,
            update_interval_ms: 60_000,
            serialize_cycles: false,
            shutdown_grace_secs: 10,
            action: "UpdatePaymentTokenPrice".to_string(),
            ack_tag: "Updated-Payment-Token-Price".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedConfig {
    pub data_feed_id: String,
    pub data_service_id: String,
    pub feed_type: String,
    /// Arweave address of the only publisher whose records are trusted.
    pub trusted_owner: String,
    pub graphql_endpoint: String,
    pub data_endpoint: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            data_feed_id: "AO".to_string(),
            data_service_id: "redstone-primary-prod".to_string(),
            feed_type: "redstone-oracles".to_string(),
            trusted_owner: "I-5rWUehEv-MjdK9gFw09RxfSLQX9DIHxG614Wf8qo0".to_string(),
            graphql_endpoint: "https://arweave.net/graphql".to_string(),
            data_endpoint: "https://arweave.net".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AoConfig {
    pub mu_url: String,
    pub cu_url: String,
}

impl Default for AoConfig {
    fn default() -> Self {
        Self {
            mu_url: "https://mu.ao-testnet.xyz".to_string(),
            cu_url: "https://cu.ao-testnet.xyz".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { request_timeout_secs: 30 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    pub port: u16,
    pub service_name: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3000,
            service_name: "payment token price oracle - ao".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CredentialConfig {
    /// Name of the env var holding the JWK JSON.
    pub jwk_env: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self { jwk_env: "ORACLE_PK".to_string() }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Load `path` if it exists, otherwise fall back to the built-in defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            info!(path, "No config file found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply environment overrides using `lookup` to resolve variable names.
    ///
    /// Takes a lookup function rather than reading `std::env` directly so the
    /// override rules can be exercised without mutating the process env.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(pid) = lookup("ORACLE_PROCESS_ID").filter(|v| !v.trim().is_empty()) {
            self.oracle.process_id = Some(pid.trim().to_string());
        }
        if let Some(ms) = lookup("ORACLE_UPDATE_INTERVAL_MS") {
            self.oracle.update_interval_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("ORACLE_UPDATE_INTERVAL_MS is not an integer: {ms}"))?;
        }
        if let Some(flag) = lookup("ORACLE_SERIALIZE_CYCLES") {
            self.oracle.serialize_cycles = parse_bool(&flag)
                .with_context(|| format!("ORACLE_SERIALIZE_CYCLES is not a boolean: {flag}"))?;
        }
        if let Some(port) = lookup("PORT") {
            self.health.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT is not a valid port: {port}"))?;
        }
        Ok(self)
    }

    /// Apply overrides from the real process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Check the fields the service cannot run without.
    pub fn validate(&self) -> Result<()> {
        let pid = self.process_id()?;
        if pid.len() != PROCESS_ID_LEN
            || !pid.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            bail!("Process id must be a {PROCESS_ID_LEN}-character base64url id, got {pid:?}");
        }
        if self.oracle.update_interval_ms == 0 {
            bail!("update_interval_ms must be greater than zero");
        }
        if self.http.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// The configured target process id.
    pub fn process_id(&self) -> Result<&str> {
        self.oracle
            .process_id
            .as_deref()
            .context("Target process id not configured (set ORACLE_PROCESS_ID)")
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.oracle.update_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.oracle.shutdown_grace_secs)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
