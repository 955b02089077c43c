//! Bearer token cache for the HTTP scheduler API.

use chrono::{DateTime, Duration, Utc};
use hpc_types::TransportError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 3600;

/// Source of the current time; injectable so expiry can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<std::sync::Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(std::sync::Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    /// Usable strictly before `expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Per-transport token cache. The lock is held across check-and-refresh so concurrent
/// callers with an expired token trigger a single login.
pub struct TokenCache {
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    slot: Mutex<Option<AuthToken>>,
}

impl TokenCache {
    pub fn new(clock: Arc<dyn Clock>, default_ttl: Duration) -> Self {
        Self {
            clock,
            default_ttl,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached token if still valid, otherwise run `login` and cache its result.
    ///
    /// `login` yields the token and, optionally, its lifetime in seconds; without one the
    /// cache's default TTL applies.
    pub async fn get_or_refresh<F, Fut>(&self, login: F) -> Result<String, TransportError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(String, Option<i64>), TransportError>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.is_valid_at(self.clock.now()) {
                return Ok(cached.token.clone());
            }
            tracing::debug!(expired_at = %cached.expires_at, "scheduler token expired");
        }
        *slot = None;
        let (token, expires_in) = login().await?;
        let ttl = expires_in
            .filter(|s| *s > 0)
            .map(|s| Duration::seconds(s.min(MAX_TOKEN_LIFETIME_SECS)))
            .unwrap_or(self.default_ttl);
        let expires_at = self.clock.now() + ttl;
        *slot = Some(AuthToken {
            token: token.clone(),
            expires_at,
        });
        Ok(token)
    }

    /// Drop the cached token, e.g. after the scheduler rejected it.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    /// Cached token, only if it is still valid.
    pub async fn current(&self) -> Option<AuthToken> {
        let now = self.clock.now();
        self.slot
            .lock()
            .await
            .as_ref()
            .filter(|t| t.is_valid_at(now))
            .cloned()
    }
}
