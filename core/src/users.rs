//! User identities and the user directory.
//!
//! Orders only need a stable user id plus display fields for the admin
//! screens and the CSV export. Authentication lives outside this crate; the
//! [`UserDirectory`] trait is the seam through which the surrounding
//! application supplies user data.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// User identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The user fields this crate cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// User identifier.
    pub id: UserId,
    /// Contact email.
    pub email: String,
    /// Display name, if set.
    pub name: Option<String>,
    /// Whether the user may use the admin operations.
    pub is_admin: bool,
}

/// Read-only directory of users. Returns a named `Send` future so generic
/// callers stay `Send`; implementations use `async fn`.
pub trait UserDirectory: Send + Sync {
    /// Look up a user by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::UserNotFound`] if the id is unknown, or
    /// [`crate::StoreError::Database`] on lookup failure.
    fn find_user(&self, id: UserId) -> impl Future<Output = Result<UserRecord>> + Send;
}

/// Cache policy for [`CachedUserDirectory`].
#[derive(Debug, Clone, Copy)]
pub struct UserCacheConfig {
    /// How long a cached record stays fresh.
    pub ttl: Duration,
}

impl UserCacheConfig {
    /// Override the time-to-live.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

impl Default for UserCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
        }
    }
}

/// A [`UserDirectory`] decorator that caches lookups with an explicit
/// per-entry time-to-live. Lookups that fail are never cached.
pub struct CachedUserDirectory<D> {
    inner: D,
    config: UserCacheConfig,
    entries: Mutex<HashMap<UserId, (UserRecord, Instant)>>,
}

impl<D: UserDirectory> CachedUserDirectory<D> {
    /// Wrap a directory with the default cache policy.
    pub fn new(inner: D) -> Self {
        Self::with_config(inner, UserCacheConfig::default())
    }

    /// Wrap a directory with an explicit cache policy.
    pub fn with_config(inner: D, config: UserCacheConfig) -> Self {
        Self {
            inner,
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Drop all cached entries.
    pub fn invalidate_all(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Drop the cached entry for one user.
    pub fn invalidate(&self, id: UserId) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&id);
        }
    }

    fn cached(&self, id: UserId) -> Option<UserRecord> {
        let entries = self.entries.lock().ok()?;
        let (record, stored_at) = entries.get(&id)?;
        if stored_at.elapsed() < self.config.ttl {
            Some(record.clone())
        } else {
            None
        }
    }
}

impl<D: UserDirectory> UserDirectory for CachedUserDirectory<D> {
    async fn find_user(&self, id: UserId) -> Result<UserRecord> {
        if let Some(record) = self.cached(id) {
            metrics::counter!("user_directory_cache_hits_total").increment(1);
            return Ok(record);
        }
        metrics::counter!("user_directory_cache_misses_total").increment(1);
        let record = self.inner.find_user(id).await?;
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(id, (record.clone(), Instant::now()));
        }
        Ok(record)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDirectory {
        calls: AtomicUsize,
    }

    impl UserDirectory for CountingDirectory {
        async fn find_user(&self, id: UserId) -> Result<UserRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if id.0 == 404 {
                return Err(StoreError::UserNotFound);
            }
            Ok(UserRecord {
                id,
                email: format!("user{}@example.com", id.0),
                name: None,
                is_admin: false,
            })
        }
    }

    fn counting() -> CachedUserDirectory<CountingDirectory> {
        CachedUserDirectory::new(CountingDirectory {
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let directory = counting();
        let first = directory.find_user(UserId(1)).await.unwrap();
        let second = directory.find_user(UserId(1)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(directory.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_lookup_is_not_cached() {
        let directory = counting();
        assert!(directory.find_user(UserId(404)).await.is_err());
        assert!(directory.find_user(UserId(404)).await.is_err());
        assert_eq!(directory.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_entry_is_refetched() {
        let directory = CachedUserDirectory::with_config(
            CountingDirectory {
                calls: AtomicUsize::new(0),
            },
            UserCacheConfig::default().with_ttl(Duration::ZERO),
        );
        directory.find_user(UserId(1)).await.unwrap();
        directory.find_user(UserId(1)).await.unwrap();
        assert_eq!(directory.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidation_forces_refetch() {
        let directory = counting();
        directory.find_user(UserId(1)).await.unwrap();
        directory.invalidate(UserId(1));
        directory.find_user(UserId(1)).await.unwrap();
        assert_eq!(directory.inner.calls.load(Ordering::SeqCst), 2);
    }
}
