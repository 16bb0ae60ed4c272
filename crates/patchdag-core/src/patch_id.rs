//! Lexicographically ordered patch identities.
//!
//! A `PatchId` is `"<time36>_<client>"`: the patch's logical time in
//! milliseconds as fixed-width base-36 (11 digits, zero-padded) followed by
//! an opaque per-client token. String order is replay order, so ids sort by
//! time first and by client token as the tie-break.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Width of the base-36 time prefix. 36^11 ms reaches far past any
/// representable wall clock.
pub const TIME_WIDTH: usize = 11;

/// Bytes of client-token entropy (96 bits).
pub const CLIENT_TOKEN_BYTES: usize = 12;

/// Client id used for ids that predate per-client tokens.
pub const LEGACY_CLIENT_ID: &str = "legacy";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchIdError {
    #[error("patch id too short: {0:?}")]
    BadLength(String),
    #[error("patch id missing `_` delimiter: {0:?}")]
    MissingDelimiter(String),
    #[error("patch id has invalid time component: {0:?}")]
    BadTime(String),
    #[error("patch id client component is empty")]
    EmptyClient,
}

/// Opaque, orderable patch identity. `Ord` on the string form is the
/// deterministic replay order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchId(String);

/// Components of a decoded [`PatchId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPatchId {
    pub time_ms: i64,
    pub client_id: String,
}

impl PatchId {
    /// Encode a wall/logical time and client token into an id.
    pub fn encode(time_ms: i64, client_id: &str) -> Result<Self, PatchIdError> {
        if time_ms < 0 {
            return Err(PatchIdError::BadTime(time_ms.to_string()));
        }
        if client_id.is_empty() {
            return Err(PatchIdError::EmptyClient);
        }
        let time36 = to_base36(time_ms);
        if time36.len() > TIME_WIDTH {
            return Err(PatchIdError::BadTime(time_ms.to_string()));
        }
        Ok(Self(format!(
            "{:0>width$}_{}",
            time36,
            client_id,
            width = TIME_WIDTH
        )))
    }

    /// Encode a time with the fixed legacy client token.
    pub fn legacy(time_ms: i64) -> Result<Self, PatchIdError> {
        Self::encode(time_ms, LEGACY_CLIENT_ID)
    }

    /// Validate and wrap an id in string form.
    pub fn parse(s: impl Into<String>) -> Result<Self, PatchIdError> {
        let id = Self(s.into());
        id.decode()?;
        Ok(id)
    }

    /// Split the id back into its time and client components.
    ///
    /// The time prefix is a fixed 11 characters; client tokens may contain
    /// `_` themselves, so splitting on a delimiter search would be wrong.
    pub fn decode(&self) -> Result<DecodedPatchId, PatchIdError> {
        let s = self.0.as_str();
        if s.len() < TIME_WIDTH + 2 {
            return Err(PatchIdError::BadLength(s.to_owned()));
        }
        let bytes = s.as_bytes();
        if bytes[TIME_WIDTH] != b'_' {
            return Err(PatchIdError::MissingDelimiter(s.to_owned()));
        }
        let prefix = &s[..TIME_WIDTH];
        if !prefix
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
        {
            return Err(PatchIdError::BadTime(s.to_owned()));
        }
        let time_ms = i64::from_str_radix(prefix, 36)
            .map_err(|_| PatchIdError::BadTime(s.to_owned()))?;
        Ok(DecodedPatchId {
            time_ms,
            client_id: s[TIME_WIDTH + 1..].to_owned(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lexicographic comparison; equivalent to `a.cmp(b)`.
pub fn compare(a: &PatchId, b: &PatchId) -> std::cmp::Ordering {
    a.cmp(b)
}

fn to_base36(mut n: i64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_owned();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize] as char);
        n /= 36;
    }
    out.iter().rev().collect()
}

static WEAK_TOKEN_WARNING: Once = Once::new();
static WEAK_TOKEN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a fresh client token: 96 bits from the OS CSPRNG, base64url
/// without padding.
///
/// If the OS entropy source fails, falls back to a clock/counter-derived
/// token and warns once. The fallback is out of contract for any
/// cryptographic use.
pub fn generate_client_id() -> String {
    let mut buf = [0u8; CLIENT_TOKEN_BYTES];
    if OsRng.try_fill_bytes(&mut buf).is_err() {
        WEAK_TOKEN_WARNING.call_once(|| {
            tracing::warn!("OS entropy source unavailable; using a weak client token");
        });
        weak_fill(&mut buf);
    }
    URL_SAFE_NO_PAD.encode(buf)
}

fn weak_fill(buf: &mut [u8; CLIENT_TOKEN_BYTES]) {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let counter = WEAK_TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut hasher = DefaultHasher::new();
    (nanos, counter, std::process::id()).hash(&mut hasher);
    let a = hasher.finish();
    (a, nanos).hash(&mut hasher);
    let b = hasher.finish();
    buf[..8].copy_from_slice(&a.to_le_bytes());
    buf[8..].copy_from_slice(&b.to_le_bytes()[..CLIENT_TOKEN_BYTES - 8]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let id = PatchId::encode(1_700_000_000_123, "abc_def").unwrap();
        let d = id.decode().unwrap();
        assert_eq!(d.time_ms, 1_700_000_000_123);
        assert_eq!(d.client_id, "abc_def");
    }

    #[test]
    fn time_prefix_is_fixed_width() {
        let id = PatchId::encode(0, "c").unwrap();
        assert_eq!(id.as_str(), "00000000000_c");
        let id = PatchId::encode(35, "c").unwrap();
        assert_eq!(id.as_str(), "0000000000z_c");
    }

    #[test]
    fn client_tokens_may_contain_underscores() {
        let id = PatchId::encode(36, "a_b_c").unwrap();
        assert_eq!(id.decode().unwrap().client_id, "a_b_c");
    }

    #[test]
    fn string_order_follows_time() {
        let a = PatchId::encode(10, "zzz").unwrap();
        let b = PatchId::encode(11, "aaa").unwrap();
        assert!(a < b);
        assert_eq!(compare(&a, &b), std::cmp::Ordering::Less);
        assert_eq!(compare(&a, &a.clone()), std::cmp::Ordering::Equal);
    }

    #[test]
    fn decode_rejects_malformed_ids() {
        assert_eq!(
            PatchId::parse("short").unwrap_err(),
            PatchIdError::BadLength("short".to_owned())
        );
        assert!(matches!(
            PatchId::parse("00000000000xclient").unwrap_err(),
            PatchIdError::MissingDelimiter(_)
        ));
        assert!(matches!(
            PatchId::parse("0000000000Z_client").unwrap_err(),
            PatchIdError::BadTime(_)
        ));
    }

    #[test]
    fn encode_rejects_negative_time_and_empty_client() {
        assert!(matches!(
            PatchId::encode(-1, "c"),
            Err(PatchIdError::BadTime(_))
        ));
        assert_eq!(PatchId::encode(1, "").unwrap_err(), PatchIdError::EmptyClient);
    }

    #[test]
    fn legacy_ids_use_the_fixed_client() {
        let id = PatchId::legacy(1234).unwrap();
        assert_eq!(id.decode().unwrap().client_id, LEGACY_CLIENT_ID);
    }

    #[test]
    fn generated_tokens_are_distinct_and_url_safe() {
        let a = generate_client_id();
        let b = generate_client_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
