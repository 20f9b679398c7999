//! Request signing for private OKX endpoints

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::types::OkxError;

type HmacSha256 = Hmac<Sha256>;

/// API key material for private endpoints
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    secret_key: String,
    passphrase: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: secret_key.into(),
            passphrase: passphrase.into(),
        }
    }

    /// Read credentials from the process environment
    ///
    /// `OKX_API_SECRET` is preferred, `OKX_SECRET_KEY` is accepted as well.
    /// Returns `None` if any of the three values is missing or empty.
    pub fn from_env() -> Option<Self> {
        let get = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let api_key = get("OKX_API_KEY")?;
        let secret_key = get("OKX_API_SECRET").or_else(|| get("OKX_SECRET_KEY"))?;
        let passphrase = get("OKX_PASSPHRASE")?;

        Some(Self::new(api_key, secret_key, passphrase))
    }

    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }

    /// Base64 HMAC-SHA256 over `timestamp + METHOD + request_path + body`
    pub fn sign(
        &self,
        timestamp: &str,
        method: &str,
        request_path: &str,
        body: &str,
    ) -> Result<String, OkxError> {
        let mut mac =
            HmacSha256::new_from_slice(self.secret_key.as_bytes()).map_err(|_| OkxError::InvalidKey)?;
        mac.update(prehash(timestamp, method, request_path, body).as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

/// String that gets signed
pub fn prehash(timestamp: &str, method: &str, request_path: &str, body: &str) -> String {
    format!(
        "{}{}{}{}",
        timestamp,
        method.to_uppercase(),
        request_path,
        body
    )
}

/// ISO-8601 UTC timestamp with millisecond precision, as OKX expects
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Whether `OKX_SIMULATED=1` is set
pub fn simulated_from_env() -> bool {
    std::env::var("OKX_SIMULATED")
        .map(|v| v.trim() == "1")
        .unwrap_or(false)
}
