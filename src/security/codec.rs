//! Authenticated token encoding for cookies.
//!
//! # Format
//! ```text
//! base64url( timestamp "|" base64(value) "|" HMAC-SHA256(name "|" timestamp "|" base64(value)) )
//! ```
//!
//! # Design Decisions
//! - The MAC binds the value to the cookie name, so a token minted for one
//!   cookie cannot be replayed in another
//! - First key signs, every key verifies (key rotation)
//! - MAC verification is constant-time (`Mac::verify_slice`)

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Encodes opaque bytes into a cookie-safe, tamper-evident string.
pub trait TokenCodec: Send + Sync {
    fn encode(&self, value: &[u8]) -> Result<String, CodecError>;
    fn decode(&self, encoded: &str) -> Result<Vec<u8>, CodecError>;
}

/// Errors from encoding or decoding a token.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("no signing keys configured")]
    NoKeys,

    #[error("invalid signing key")]
    InvalidKey,

    #[error("malformed token")]
    Malformed,

    #[error("token is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("token signature mismatch")]
    InvalidMac,

    #[error("token expired")]
    Expired,
}

/// HMAC-SHA256 codec bound to a cookie name.
#[derive(Clone)]
pub struct HmacTokenCodec {
    name: String,
    keys: Vec<Vec<u8>>,
    max_age: Option<Duration>,
}

impl std::fmt::Debug for HmacTokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacTokenCodec")
            .field("name", &self.name)
            .field("keys", &self.keys.len())
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl HmacTokenCodec {
    /// Create a codec. The first key signs new tokens.
    pub fn new<I, K>(name: impl Into<String>, keys: I) -> Result<Self, CodecError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let keys: Vec<Vec<u8>> = keys
            .into_iter()
            .map(|k| k.as_ref().to_vec())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return Err(CodecError::NoKeys);
        }
        Ok(Self {
            name: name.into(),
            keys,
            max_age: None,
        })
    }

    /// Reject tokens older than `max_age`.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    fn mac(&self, key: &[u8], payload: &[u8]) -> Result<HmacSha256, CodecError> {
        let mut mac = HmacSha256::new_from_slice(key).map_err(|_| CodecError::InvalidKey)?;
        mac.update(self.name.as_bytes());
        mac.update(b"|");
        mac.update(payload);
        Ok(mac)
    }

    fn encode_at(&self, value: &[u8], timestamp: u64) -> Result<String, CodecError> {
        let key = self.keys.first().ok_or(CodecError::NoKeys)?;
        let payload = format!("{}|{}", timestamp, STANDARD.encode(value));
        let tag = self.mac(key, payload.as_bytes())?.finalize().into_bytes();

        let mut raw = payload.into_bytes();
        raw.push(b'|');
        raw.extend_from_slice(&tag);
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }
}

impl TokenCodec for HmacTokenCodec {
    fn encode(&self, value: &[u8]) -> Result<String, CodecError> {
        self.encode_at(value, unix_now())
    }

    fn decode(&self, encoded: &str) -> Result<Vec<u8>, CodecError> {
        let raw = URL_SAFE_NO_PAD.decode(encoded)?;

        // Timestamp and base64 value never contain '|'; the tag may.
        let mut parts = raw.splitn(3, |b| *b == b'|');
        let (timestamp, value, tag) = match (parts.next(), parts.next(), parts.next()) {
            (Some(t), Some(v), Some(tag)) => (t, v, tag),
            _ => return Err(CodecError::Malformed),
        };
        let payload = &raw[..timestamp.len() + 1 + value.len()];

        let verified = self.keys.iter().any(|key| {
            self.mac(key, payload)
                .map(|mac| mac.verify_slice(tag).is_ok())
                .unwrap_or(false)
        });
        if !verified {
            return Err(CodecError::InvalidMac);
        }

        let issued_at: u64 = std::str::from_utf8(timestamp)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(CodecError::Malformed)?;
        if let Some(max_age) = self.max_age {
            if unix_now().saturating_sub(issued_at) > max_age.as_secs() {
                return Err(CodecError::Expired);
            }
        }

        Ok(STANDARD.decode(value)?)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
