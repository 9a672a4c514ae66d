//! Monotonic time source and ID minting (component C1).
//!
//! The clock is injected as a handle rather than read from global statics so
//! that tests can substitute a deterministic implementation. This mirrors
//! the model repository's guidance to keep process-wide clock/ID generators
//! behind an injectable seam.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// A source of monotonic ticks and wall-clock readings.
///
/// `Clock` is `Send + Sync` and cheap to clone; production code uses
/// [`SystemClock`], tests use a fixed or steppable fake.
pub trait Clock: Send + Sync {
    /// Monotonically non-decreasing tick count in milliseconds since an
    /// arbitrary epoch. Only useful for measuring elapsed durations.
    fn now_ms(&self) -> u64;

    /// Wall-clock time as fractional Unix seconds.
    fn wall(&self) -> f64;
}

/// Production clock backed by [`std::time::SystemTime`] and a monotonic
/// counter seeded at process start.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_millis() as u64
    }

    fn wall(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_secs_f64()
    }
}

/// Deterministic clock for tests: starts at a fixed instant and only
/// advances when told to.
#[derive(Debug)]
pub struct FakeClock {
    ms: AtomicU64,
}

impl FakeClock {
    /// Create a fake clock starting at the given millisecond timestamp.
    pub fn at(start_ms: u64) -> Self {
        Self {
            ms: AtomicU64::new(start_ms),
        }
    }

    /// Advance the clock by `delta_ms` milliseconds.
    pub fn advance(&self, delta_ms: u64) {
        self.ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.ms.load(Ordering::SeqCst)
    }

    fn wall(&self) -> f64 {
        self.ms.load(Ordering::SeqCst) as f64 / 1000.0
    }
}

/// Mint a sortable, globally unique ID with a human-readable prefix, e.g.
/// `mcp_01912f1a...`. Backed by UUIDv7 (RFC 9562), which is time-ordered at
/// millisecond resolution the same way a ULID is.
#[must_use]
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::now_v7().simple())
}

/// Compute an Interaction Record's `request_digest` (spec §3): the first
/// `max_prefix_bytes` of `payload`, rendered lossily as UTF-8, followed by a
/// SHA-256 fingerprint of the whole payload. The prefix gives a human a
/// quick glance at the request shape; the fingerprint makes the digest
/// useful for exact-match comparison without storing the raw payload.
#[must_use]
pub fn request_digest(payload: &[u8], max_prefix_bytes: usize) -> String {
    let prefix_len = payload.len().min(max_prefix_bytes);
    let prefix = String::from_utf8_lossy(&payload[..prefix_len]);
    format!("{prefix}#{}", fingerprint(payload))
}

/// SHA-256 fingerprint of arbitrary bytes, hex-encoded.
#[must_use]
pub fn fingerprint(data: &[u8]) -> String {
    use sha2::Digest;
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Mint an HMAC-bound bearer token valid for `ttl_secs` seconds from now.
///
/// Format: `sk-<expiry-epoch-hex>-<hmac16-hex>` where the HMAC covers the
/// expiry so tampering with it is detectable without any server-side state.
#[must_use]
pub fn hmac_token(secret: &[u8], ttl_secs: u64, clock: &dyn Clock) -> String {
    let expires_at = (clock.wall() as u64).saturating_add(ttl_secs);
    let tag = sign_expiry(secret, expires_at);
    format!("sk-{:x}-{}", expires_at, hex::encode(&tag[..8]))
}

/// Outcome of verifying an HMAC token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenVerification {
    pub valid: bool,
    pub expires_at: Option<u64>,
}

/// Verify an HMAC token produced by [`hmac_token`]. Constant-time with
/// respect to the tag comparison; expiry must be strictly in the future.
#[must_use]
pub fn verify_token(token: &str, secret: &[u8], clock: &dyn Clock) -> TokenVerification {
    let Some(rest) = token.strip_prefix("sk-") else {
        return TokenVerification {
            valid: false,
            expires_at: None,
        };
    };
    let Some((expiry_hex, tag_hex)) = rest.split_once('-') else {
        return TokenVerification {
            valid: false,
            expires_at: None,
        };
    };
    let Ok(expires_at) = u64::from_str_radix(expiry_hex, 16) else {
        return TokenVerification {
            valid: false,
            expires_at: None,
        };
    };
    let Ok(provided_tag) = hex::decode(tag_hex) else {
        return TokenVerification {
            valid: false,
            expires_at: Some(expires_at),
        };
    };

    let expected_tag = sign_expiry(secret, expires_at);
    let tag_ok: bool = provided_tag
        .ct_eq(&expected_tag[..provided_tag.len().min(expected_tag.len())])
        .into();

    let not_expired = (clock.wall() as u64) < expires_at;

    TokenVerification {
        valid: tag_ok && provided_tag.len() == 8 && not_expired,
        expires_at: Some(expires_at),
    }
}

fn sign_expiry(secret: &[u8], expires_at: u64) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(expires_at.to_be_bytes().as_slice());
    mac.finalize().into_bytes().into()
}
