//! Webhook signature verification.
//!
//! The sender signs each delivery with a header of the form
//! `t=<unix seconds>,v1=<hex>` where `v1` is HMAC-SHA256 over
//! `"<t>.<raw body>"`. Several `v1` entries may be present while a secret
//! is being rotated; any one matching is enough.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Name of the HTTP header carrying the signature.
pub const SIGNATURE_HEADER: &str = "payment-signature";

/// Default accepted clock skew between signing and verification.
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// Reasons a delivery fails authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingHeader,

    #[error("malformed signature header: {0}")]
    MalformedHeader(String),

    #[error("timestamp {timestamp} outside tolerance at {now}")]
    OutsideTolerance { timestamp: i64, now: i64 },

    #[error("no signature matches the payload")]
    Mismatch,

    #[error("signing secret is not a valid HMAC key")]
    InvalidKey,
}

/// How a delivery was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// The signature matched the configured secret.
    Verified,
    /// No secret is configured; the payload is trusted as-is.
    Unverified,
}

/// Verifies delivery signatures against a shared secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Option<String>,
    tolerance_secs: u64,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl SignatureVerifier {
    /// Creates a verifier. With no secret every delivery is accepted
    /// unverified, which is only acceptable outside production.
    pub fn new(secret: Option<String>, tolerance_secs: u64) -> Self {
        let secret = secret.filter(|s| !s.is_empty());
        if secret.is_none() {
            tracing::warn!(
                "No webhook signing secret configured; payment events will be trusted without verification. Do not run this in production"
            );
        }
        Self {
            secret,
            tolerance_secs,
        }
    }

    /// Returns true if deliveries are accepted without verification.
    pub fn is_degraded(&self) -> bool {
        self.secret.is_none()
    }

    /// Checks `header` against `payload` at time `now`.
    pub fn verify(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Verification, SignatureError> {
        let Some(secret) = &self.secret else {
            return Ok(Verification::Unverified);
        };

        let header = header.ok_or(SignatureError::MissingHeader)?;
        let (timestamp, candidates) = parse_header(header)?;

        let now = now.timestamp();
        if now.abs_diff(timestamp) > self.tolerance_secs {
            return Err(SignatureError::OutsideTolerance { timestamp, now });
        }

        let mac = signed_mac(secret, timestamp, payload)?;
        let matched = candidates
            .iter()
            .filter_map(|candidate| hex::decode(candidate).ok())
            .any(|candidate| mac.clone().verify_slice(&candidate).is_ok());

        if matched {
            Ok(Verification::Verified)
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

/// Produces a signature header value for `payload`.
///
/// Used by senders and tests; the verifier accepts exactly this format.
pub fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, SignatureError> {
    let signature = hex::encode(signed_mac(secret, timestamp, payload)?.finalize().into_bytes());
    Ok(format!("t={timestamp},v1={signature}"))
}

fn signed_mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

fn parse_header(header: &str) -> Result<(i64, Vec<&str>), SignatureError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            return Err(SignatureError::MalformedHeader(format!(
                "expected key=value, got '{part}'"
            )));
        };
        match key {
            "t" => {
                let parsed = value.parse::<i64>().map_err(|_| {
                    SignatureError::MalformedHeader(format!("invalid timestamp '{value}'"))
                })?;
                timestamp = Some(parsed);
            }
            "v1" => candidates.push(value),
            // Other schemes are ignored.
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| SignatureError::MalformedHeader("missing timestamp".into()))?;
    if candidates.is_empty() {
        return Err(SignatureError::MalformedHeader("missing v1 signature".into()));
    }
    Ok((timestamp, candidates))
}
