//! Credential Validator (component C2).
//!
//! Two token modes are accepted: an entry in the static table, or a
//! stateless HMAC token minted by [`coordinator_core::clock::hmac_token`].
//! Successful validations are cached for a short TTL (<=5 min) so the hot
//! request path rarely touches the static table lookup or HMAC verification.

use std::sync::Arc;
use std::time::Duration;

use coordinator_core::clock::{verify_token, Clock};
use moka::sync::Cache;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::rate_limit::FailureLimiter;
use crate::types::{Principal, StaticTokenTable};

/// Default positive-cache TTL, per spec §4.2 ("short-lived positive cache
/// (<=5 min)").
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// How often the background task prunes stale failed-attempt buckets.
const LIMITER_SWEEP_PERIOD: Duration = Duration::from_secs(60);
/// A bucket untouched for this long is assumed to be a source that has
/// stopped sending traffic, and is dropped to bound memory.
const LIMITER_BUCKET_MAX_AGE: Duration = Duration::from_secs(10 * 60);

pub struct CredentialValidator {
    static_tokens: RwLock<Arc<StaticTokenTable>>,
    hmac_secret: Vec<u8>,
    cache: Cache<String, Principal>,
    limiter: FailureLimiter,
    clock: Arc<dyn Clock>,
}

impl CredentialValidator {
    pub fn new(static_tokens: StaticTokenTable, hmac_secret: Vec<u8>, clock: Arc<dyn Clock>) -> Self {
        Self {
            static_tokens: RwLock::new(Arc::new(static_tokens)),
            hmac_secret,
            cache: Cache::builder().time_to_live(CACHE_TTL).build(),
            limiter: FailureLimiter::with_defaults(),
            clock,
        }
    }

    /// Replace the static token table wholesale (e.g. on a config reload).
    /// Does not touch the positive cache — revoked tokens must be cleared
    /// explicitly via [`CredentialValidator::revoke`].
    pub fn reload_static_tokens(&self, table: StaticTokenTable) {
        *self.static_tokens.write() = Arc::new(table);
    }

    /// Synchronously evict a token from the positive cache, so a
    /// revocation takes effect on the very next request (spec §4.2:
    /// "Revocation clears cache entry synchronously").
    pub fn revoke(&self, token: &str) {
        self.cache.invalidate(token);
    }

    /// Validate a bearer token, consulting the cache first.
    ///
    /// `source` identifies the caller (e.g. peer IP) for the failed-attempt
    /// rate limiter; it is not consulted on a cache hit or a successful
    /// validation.
    pub fn validate(&self, token: &str, source: &str) -> Result<Principal, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Malformed);
        }

        if let Some(principal) = self.cache.get(token) {
            debug!(source, "credential cache hit");
            return Ok(principal);
        }

        if !self.limiter.check(source) {
            warn!(source, "credential validation rate limited");
            return Err(AuthError::RateLimited);
        }

        let principal = self.validate_uncached(token)?;
        self.cache.insert(token.to_string(), principal.clone());
        Ok(principal)
    }

    fn validate_uncached(&self, token: &str) -> Result<Principal, AuthError> {
        if let Some(entry) = self.static_tokens.read().get(token) {
            if entry.disabled {
                return Err(AuthError::Disabled);
            }
            if let Some(expires_at) = entry.expires_at {
                if self.clock.wall() >= expires_at {
                    return Err(AuthError::Expired);
                }
            }
            return Ok(Principal {
                name: entry.principal.clone(),
                scope: entry.scope.clone(),
            });
        }

        if token.starts_with("sk-") {
            let result = verify_token(token, &self.hmac_secret, self.clock.as_ref());
            return if result.valid {
                Ok(Principal {
                    name: format!("hmac:{token}"),
                    scope: Vec::new(),
                })
            } else if result.expires_at.is_some() {
                Err(AuthError::Expired)
            } else {
                Err(AuthError::Malformed)
            };
        }

        Err(AuthError::UnknownToken)
    }

    /// Background sweeper: periodically prunes per-source failure-limiter
    /// buckets untouched for [`LIMITER_BUCKET_MAX_AGE`], mirroring the
    /// `HealthMonitor::run_sweeper` / `run_periodic_snapshot` pattern.
    pub async fn run_limiter_sweeper(self: Arc<Self>) {
        let mut interval = tokio::time::interval(LIMITER_SWEEP_PERIOD);
        loop {
            interval.tick().await;
            self.limiter.sweep(LIMITER_BUCKET_MAX_AGE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordinator_core::clock::{hmac_token, FakeClock};
    use std::collections::HashMap;

    fn table_with(token: &str, entry: crate::types::TokenEntry) -> StaticTokenTable {
        let mut map = HashMap::new();
        map.insert(token.to_string(), entry);
        StaticTokenTable(map)
    }

    #[test]
    fn unknown_token_is_rejected() {
        let clock = Arc::new(FakeClock::at(0));
        let v = CredentialValidator::new(StaticTokenTable::default(), b"s".to_vec(), clock);
        assert_eq!(v.validate("nope", "ip").unwrap_err(), AuthError::UnknownToken);
    }

    #[test]
    fn static_token_validates_and_caches() {
        let clock = Arc::new(FakeClock::at(0));
        let table = table_with(
            "tok-1",
            crate::types::TokenEntry {
                principal: "alice".into(),
                scope: vec!["routing".into()],
                expires_at: None,
                disabled: false,
            },
        );
        let v = CredentialValidator::new(table, b"s".to_vec(), clock);
        let p = v.validate("tok-1", "ip").unwrap();
        assert_eq!(p.name, "alice");
        // second call must hit cache (no panic / same result) even if the
        // static table were wiped underneath it.
        v.reload_static_tokens(StaticTokenTable::default());
        let p2 = v.validate("tok-1", "ip").unwrap();
        assert_eq!(p2.name, "alice");
    }

    #[test]
    fn disabled_static_token_is_rejected() {
        let clock = Arc::new(FakeClock::at(0));
        let table = table_with(
            "tok-1",
            crate::types::TokenEntry {
                principal: "alice".into(),
                scope: vec![],
                expires_at: None,
                disabled: true,
            },
        );
        let v = CredentialValidator::new(table, b"s".to_vec(), clock);
        assert_eq!(v.validate("tok-1", "ip").unwrap_err(), AuthError::Disabled);
    }

    #[test]
    fn expired_static_token_is_rejected() {
        let clock = Arc::new(FakeClock::at(10_000));
        let table = table_with(
            "tok-1",
            crate::types::TokenEntry {
                principal: "alice".into(),
                scope: vec![],
                expires_at: Some(5.0),
                disabled: false,
            },
        );
        let v = CredentialValidator::new(table, b"s".to_vec(), clock);
        assert_eq!(v.validate("tok-1", "ip").unwrap_err(), AuthError::Expired);
    }

    #[test]
    fn revoke_clears_cache_synchronously() {
        let clock = Arc::new(FakeClock::at(0));
        let table = table_with(
            "tok-1",
            crate::types::TokenEntry {
                principal: "alice".into(),
                scope: vec![],
                expires_at: None,
                disabled: false,
            },
        );
        let v = CredentialValidator::new(table, b"s".to_vec(), clock);
        v.validate("tok-1", "ip").unwrap();
        v.revoke("tok-1");
        v.reload_static_tokens(StaticTokenTable::default());
        assert_eq!(v.validate("tok-1", "ip").unwrap_err(), AuthError::UnknownToken);
    }

    #[test]
    fn hmac_token_accepted_without_static_entry() {
        let clock = Arc::new(FakeClock::at(0));
        let secret = b"hmac-secret".to_vec();
        let token = hmac_token(&secret, 60, clock.as_ref());
        let v = CredentialValidator::new(StaticTokenTable::default(), secret, clock);
        assert!(v.validate(&token, "ip").is_ok());
    }

    #[test]
    fn empty_token_is_malformed() {
        let clock = Arc::new(FakeClock::at(0));
        let v = CredentialValidator::new(StaticTokenTable::default(), b"s".to_vec(), clock);
        assert_eq!(v.validate("", "ip").unwrap_err(), AuthError::Malformed);
    }
}
