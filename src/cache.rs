//! Caching for backend reads
//!
//! Reads land in a small keyed cache so navigation between pages does not
//! refetch data that is seconds old. Entries expire after a short TTL but
//! stay resident so a failed refresh can fall back to stale data.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::Error;

/// How long a cache entry counts as fresh in seconds
pub const CACHE_TTL_SECS: i64 = 300;

/// The keys data is cached under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The event listing
    Events,
    /// The RSVP listing
    Responses,
    /// Flagged RSVP rows needing organizer attention
    RsvpIssues,
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Events => write!(f, "events"),
            CacheKey::Responses => write!(f, "responses"),
            CacheKey::RsvpIssues => write!(f, "rsvp_issues"),
        }
    }
}

/// What kind of entity a successful mutation touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// An event was created, updated or deleted
    Event,
    /// An RSVP was submitted, edited or deleted
    Response,
}

/// A single cached payload
#[derive(Debug, Clone)]
struct CacheEntry {
    /// The cached payload
    payload: serde_json::Value,
    /// When this payload was cached
    cached_at: DateTime<Utc>,
    /// The global cache version this entry was written at
    version: u64,
}

/// A keyed cache over backend reads
pub struct CacheManager {
    /// How long entries count as fresh
    ttl: Duration,
    /// The cached entries by key
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    /// A counter bumped on every write or invalidation
    version: AtomicU64,
    /// Channels to notify when a key changes
    subscribers: Mutex<Vec<mpsc::UnboundedSender<CacheKey>>>,
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheManager {
    /// Create a cache with the default TTL
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(CACHE_TTL_SECS))
    }

    /// Create a cache with a specific TTL
    ///
    /// # Arguments
    ///
    /// * `ttl` - How long entries count as fresh
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        CacheManager {
            ttl,
            entries: Mutex::new(HashMap::with_capacity(3)),
            version: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Get the current cache version
    ///
    /// The version bumps on every write or invalidation so callers can
    /// detect that data changed underneath them without diffing payloads.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Cache a payload under a key
    ///
    /// Returns the cache version this write landed at.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to cache under
    /// * `payload` - The payload to cache
    pub fn set(&self, key: CacheKey, payload: serde_json::Value) -> u64 {
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        {
            let mut entries = self.entries.lock().unwrap();
            entries.insert(
                key,
                CacheEntry {
                    payload,
                    cached_at: Utc::now(),
                    version,
                },
            );
        }
        self.notify(key);
        version
    }

    /// Get a fresh payload if one is cached
    ///
    /// # Arguments
    ///
    /// * `key` - The key to read
    pub fn get(&self, key: CacheKey) -> Option<serde_json::Value> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(&key)?;
        // expired entries stay resident for stale reads but are not fresh
        if !is_fresh(Utc::now() - entry.cached_at, self.ttl) {
            return None;
        }
        Some(entry.payload.clone())
    }

    /// Get a cached payload ignoring freshness
    ///
    /// # Arguments
    ///
    /// * `key` - The key to read
    pub fn stale(&self, key: CacheKey) -> Option<serde_json::Value> {
        let entries = self.entries.lock().unwrap();
        entries.get(&key).map(|entry| entry.payload.clone())
    }

    /// Get a fresh typed payload if one is cached
    ///
    /// # Arguments
    ///
    /// * `key` - The key to read
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        let payload = self.get(key)?;
        serde_json::from_value(payload).ok()
    }

    /// Read through the cache with a fallible fetch
    ///
    /// A fresh entry short circuits the fetch entirely. When the fetch
    /// fails and a stale entry exists the stale entry is returned instead
    /// of the error so pages keep rendering through backend blips.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to read through
    /// * `fetch` - The fetch to run on a cache miss
    pub async fn get_with<F, Fut>(&self, key: CacheKey, fetch: F) -> Result<serde_json::Value, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<serde_json::Value, Error>>,
    {
        // a fresh entry needs no fetch
        if let Some(payload) = self.get(key) {
            return Ok(payload);
        }
        match fetch().await {
            Ok(payload) => {
                self.set(key, payload.clone());
                Ok(payload)
            }
            Err(error) => {
                // fall back to stale data if we have any
                if let Some(stale) = self.stale(key) {
                    tracing::warn!(key = %key, error = %error, "serving stale cache after failed refresh");
                    return Ok(stale);
                }
                Err(error)
            }
        }
    }

    /// Drop a single key from the cache
    ///
    /// # Arguments
    ///
    /// * `key` - The key to drop
    pub fn invalidate(&self, key: CacheKey) {
        self.version.fetch_add(1, Ordering::AcqRel);
        {
            let mut entries = self.entries.lock().unwrap();
            entries.remove(&key);
        }
        self.notify(key);
    }

    /// Drop the keys a successful mutation made stale
    ///
    /// Any mutation changes the response listing and the flagged rows derived
    /// from it; event mutations additionally drop the event listing.
    ///
    /// # Arguments
    ///
    /// * `mutated` - What kind of entity the mutation touched
    /// * `event_id` - The event the mutation was scoped to
    pub fn invalidate_after_mutation(&self, mutated: Mutation, event_id: &str) {
        tracing::debug!(?mutated, event_id, "invalidating after mutation");
        if mutated == Mutation::Event {
            self.invalidate(CacheKey::Events);
        }
        self.invalidate(CacheKey::Responses);
        self.invalidate(CacheKey::RsvpIssues);
    }

    /// Drop everything from the cache
    pub fn clear(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
        let keys: Vec<CacheKey> = {
            let mut entries = self.entries.lock().unwrap();
            let keys = entries.keys().copied().collect();
            entries.clear();
            keys
        };
        for key in keys {
            self.notify(key);
        }
    }

    /// Subscribe to change notifications
    ///
    /// The receiver gets the key of every write or invalidation from this
    /// point on. Dropped receivers are pruned on the next notification.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<CacheKey> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Tell subscribers a key changed
    fn notify(&self, key: CacheKey) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(key).is_ok());
    }
}

/// Whether an entry of some age still counts as fresh
///
/// An entry exactly at the ttl is still served.
///
/// # Arguments
///
/// * `age` - How old the entry is
/// * `ttl` - How long entries count as fresh
fn is_fresh(age: Duration, ttl: Duration) -> bool {
    age <= ttl
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fresh_entries_are_served() {
        let cache = CacheManager::new();
        cache.set(CacheKey::Events, json!([{"id": "E1"}]));
        assert_eq!(cache.get(CacheKey::Events), Some(json!([{"id": "E1"}])));
    }

    #[test]
    fn expired_entries_are_stale_but_resident() {
        // a zero ttl expires entries immediately
        let cache = CacheManager::with_ttl(Duration::zero());
        cache.set(CacheKey::Responses, json!([]));
        assert_eq!(cache.get(CacheKey::Responses), None);
        assert_eq!(cache.stale(CacheKey::Responses), Some(json!([])));
    }

    #[test]
    fn versions_bump_on_writes_and_invalidations() {
        let cache = CacheManager::new();
        let start = cache.version();
        cache.set(CacheKey::Events, json!([]));
        assert_eq!(cache.version(), start + 1);
        cache.invalidate(CacheKey::Events);
        assert_eq!(cache.version(), start + 2);
    }

    #[test]
    fn response_mutations_leave_the_event_listing_alone() {
        let cache = CacheManager::new();
        cache.set(CacheKey::Events, json!([1]));
        cache.set(CacheKey::Responses, json!([2]));
        cache.set(CacheKey::RsvpIssues, json!([3]));
        cache.invalidate_after_mutation(Mutation::Response, "E1");
        assert!(cache.get(CacheKey::Events).is_some());
        assert!(cache.stale(CacheKey::Responses).is_none());
        assert!(cache.stale(CacheKey::RsvpIssues).is_none());
    }

    #[test]
    fn event_mutations_drop_the_event_listing_too() {
        let cache = CacheManager::new();
        cache.set(CacheKey::Events, json!([1]));
        cache.set(CacheKey::Responses, json!([2]));
        cache.set(CacheKey::RsvpIssues, json!([3]));
        cache.invalidate_after_mutation(Mutation::Event, "E1");
        assert!(cache.stale(CacheKey::Events).is_none());
        assert!(cache.stale(CacheKey::Responses).is_none());
        assert!(cache.stale(CacheKey::RsvpIssues).is_none());
    }

    #[test]
    fn freshness_boundary_is_inclusive() {
        let ttl = Duration::seconds(300);
        // an entry exactly at the ttl still serves
        assert!(is_fresh(ttl, ttl));
        assert!(is_fresh(Duration::zero(), ttl));
        assert!(!is_fresh(ttl + Duration::nanoseconds(1), ttl));
    }

    #[tokio::test]
    async fn get_with_fetches_on_miss() {
        let cache = CacheManager::new();
        let payload = cache
            .get_with(CacheKey::Events, || async { Ok(json!(["fetched"])) })
            .await
            .unwrap();
        assert_eq!(payload, json!(["fetched"]));
        // the fetched payload is now cached
        assert_eq!(cache.get(CacheKey::Events), Some(json!(["fetched"])));
    }

    #[tokio::test]
    async fn get_with_serves_stale_on_fetch_failure() {
        let cache = CacheManager::with_ttl(Duration::zero());
        cache.set(CacheKey::Events, json!(["stale"]));
        let payload = cache
            .get_with(CacheKey::Events, || async {
                Err(Error::Generic("backend down".to_owned()))
            })
            .await
            .unwrap();
        assert_eq!(payload, json!(["stale"]));
    }

    #[tokio::test]
    async fn get_with_propagates_errors_with_no_stale_data() {
        let cache = CacheManager::new();
        let result = cache
            .get_with(CacheKey::Events, || async {
                Err(Error::Generic("backend down".to_owned()))
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn subscribers_see_writes() {
        let cache = CacheManager::new();
        let mut rx = cache.subscribe();
        cache.set(CacheKey::RsvpIssues, json!([]));
        assert_eq!(rx.recv().await, Some(CacheKey::RsvpIssues));
    }
}
