//! Signing credentials.
//!
//! The oracle signs every AO message with an Arweave wallet key supplied as
//! a JSON Web Key. Loading sits behind `CredentialProvider` and signing
//! behind `Signer`, so another backend (remote signer, HSM) can be swapped in
//! without touching the submission client or the cycle engine.
//!
//! The raw JWK is held in a `SecretString` while parsing and the parsed key
//! material never appears in `Debug` output or logs.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pss, RsaPrivateKey};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::types::OracleError;

/// ANS-104 signature type for Arweave RSA-PSS keys.
pub const ARWEAVE_SIGNATURE_TYPE: u16 = 1;

/// Modulus length of an Arweave wallet key (4096 bits).
pub const ARWEAVE_OWNER_LENGTH: usize = 512;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Something that can sign ANS-104 data items.
pub trait Signer: Send + Sync {
    /// ANS-104 signature type identifier.
    fn signature_type(&self) -> u16;

    /// Raw public key bytes placed in the data item's owner field.
    fn owner(&self) -> &[u8];

    /// Sign `message` (the data item's deep hash).
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, OracleError>;
}

/// Source of the process's signing credential. Called once at startup.
pub trait CredentialProvider {
    fn load(&self) -> Result<Arc<dyn Signer>, OracleError>;
}

// ---------------------------------------------------------------------------
// JWK
// ---------------------------------------------------------------------------

/// RSA JSON Web Key as exported by Arweave wallets.
#[derive(Deserialize)]
pub struct Jwk {
    kty: Option<String>,
    n: Option<String>,
    e: Option<String>,
    d: Option<String>,
    p: Option<String>,
    q: Option<String>,
}

impl fmt::Debug for Jwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n_prefix = self
            .n
            .as_ref()
            .map(|n| format!("{}…", n.chars().take(8).collect::<String>()));
        f.debug_struct("Jwk")
            .field("kty", &self.kty)
            .field("n", &n_prefix)
            .field("d", &"<redacted>")
            .finish()
    }
}

impl Jwk {
    /// Parse a JWK from its JSON text, requiring `kty`, `n`, `e` and `d`.
    pub fn parse(raw: &SecretString) -> Result<Self, OracleError> {
        let jwk: Jwk = serde_json::from_str(raw.expose_secret()).map_err(|_| {
            OracleError::Configuration("credential must be a valid JSON Web Key (JWK)".into())
        })?;

        let present = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.is_empty());
        if !(present(&jwk.kty) && present(&jwk.n) && present(&jwk.e) && present(&jwk.d)) {
            return Err(OracleError::Configuration(
                "Invalid JWK format: kty, n, e and d are required".into(),
            ));
        }
        if jwk.kty.as_deref() != Some("RSA") {
            return Err(OracleError::Configuration(format!(
                "Unsupported JWK key type {:?}, expected RSA",
                jwk.kty.as_deref().unwrap_or_default()
            )));
        }
        Ok(jwk)
    }

    fn component(name: &str, value: Option<&str>) -> Result<BigUint, OracleError> {
        let value = value.unwrap_or_default().trim_end_matches('=');
        let bytes = URL_SAFE_NO_PAD.decode(value).map_err(|_| {
            OracleError::Configuration(format!("JWK field {name} is not base64url"))
        })?;
        Ok(BigUint::from_bytes_be(&bytes))
    }

    fn to_private_key(&self) -> Result<RsaPrivateKey, OracleError> {
        let n = Self::component("n", self.n.as_deref())?;
        let e = Self::component("e", self.e.as_deref())?;
        let d = Self::component("d", self.d.as_deref())?;

        let primes = match (self.p.as_deref(), self.q.as_deref()) {
            (Some(p), Some(q)) => vec![Self::component("p", Some(p))?, Self::component("q", Some(q))?],
            _ => Vec::new(),
        };

        let key = RsaPrivateKey::from_components(n, e, d, primes)
            .map_err(|e| OracleError::Configuration(format!("JWK is not a usable RSA key: {e}")))?;
        key.validate()
            .map_err(|e| OracleError::Configuration(format!("JWK failed validation: {e}")))?;
        Ok(key)
    }
}

// ---------------------------------------------------------------------------
// Arweave signer
// ---------------------------------------------------------------------------

/// RSA-PSS (SHA-256) signer backed by an Arweave wallet key.
pub struct ArweaveSigner {
    key: RsaPrivateKey,
    owner: Vec<u8>,
}

impl fmt::Debug for ArweaveSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArweaveSigner").field("address", &self.address()).finish()
    }
}

impl ArweaveSigner {
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, OracleError> {
        let key = jwk.to_private_key()?;
        if key.size() != ARWEAVE_OWNER_LENGTH {
            return Err(OracleError::Configuration(format!(
                "Arweave keys must be 4096-bit RSA, got {} bits",
                key.size() * 8
            )));
        }
        Ok(Self::from_key(key))
    }

    fn from_key(key: RsaPrivateKey) -> Self {
        let owner = key.n().to_bytes_be();
        Self { key, owner }
    }

    /// Wallet address: base64url SHA-256 of the owner bytes.
    pub fn address(&self) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(&self.owner))
    }
}

impl Signer for ArweaveSigner {
    fn signature_type(&self) -> u16 {
        ARWEAVE_SIGNATURE_TYPE
    }

    fn owner(&self) -> &[u8] {
        &self.owner
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, OracleError> {
        let digest = Sha256::digest(message);
        self.key
            .sign_with_rng(&mut rand::thread_rng(), Pss::new::<Sha256>(), &digest)
            .map_err(|e| OracleError::Submission(format!("Signing failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Loads the JWK JSON from an environment variable.
pub struct EnvJwkProvider {
    var_name: String,
}

impl EnvJwkProvider {
    pub fn new(var_name: impl Into<String>) -> Self {
        Self { var_name: var_name.into() }
    }
}

impl CredentialProvider for EnvJwkProvider {
    fn load(&self) -> Result<Arc<dyn Signer>, OracleError> {
        let raw = std::env::var(&self.var_name)
            .map(SecretString::new)
            .map_err(|_| {
                OracleError::Configuration(format!(
                    "{} environment variable is required",
                    self.var_name
                ))
            })?;

        let signer = ArweaveSigner::from_jwk(&Jwk::parse(&raw)?)?;
        info!(address = %signer.address(), "Oracle signer initialized");
        Ok(Arc::new(signer))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
