//! Keyed loading and error state for pages
//!
//! Pages flip a named key while a fetch is in flight and record a guest
//! friendly message when it fails. Raw error text never reaches the page;
//! it is classified into a short message or truncated.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::Error;

/// The longest raw error text shown when classification finds nothing
pub const ERROR_TRUNCATE_AT: usize = 100;

/// Turn raw error text into something a guest can act on
///
/// Classification is substring based so it works on whatever text a
/// backend, proxy or browser produced.
///
/// # Arguments
///
/// * `raw` - The raw error text
#[must_use]
pub fn friendly_message(raw: &str) -> String {
    let lower = raw.to_lowercase();
    // rate limiting first since those bodies often also mention the server
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("rate-limited") {
        return "Too many requests. Please wait a moment and try again.".to_owned();
    }
    if lower.contains("401") || lower.contains("unauthorized") || lower.contains("authentication") {
        return "Your session has expired. Please log in again.".to_owned();
    }
    if lower.contains("timeout") || lower.contains("timed out") {
        return "The request timed out. Check your connection and try again.".to_owned();
    }
    if lower.contains("500") || lower.contains("internal server") {
        return "The server hit an error. Please try again shortly.".to_owned();
    }
    if lower.contains("network") || lower.contains("fetch") || lower.contains("connection") {
        return "Could not reach the server. Check your connection.".to_owned();
    }
    // nothing matched; show the raw text but keep it short
    if raw.chars().count() > ERROR_TRUNCATE_AT {
        let truncated: String = raw.chars().take(ERROR_TRUNCATE_AT).collect();
        return format!("{truncated}…");
    }
    raw.to_owned()
}

/// The loading and error state for one key
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadState {
    /// Whether a fetch is in flight for this key
    pub loading: bool,
    /// The friendly message from the last failure if one happened
    pub error: Option<String>,
}

/// Tracks loading and error state per named key
#[derive(Default)]
pub struct LoadingStateManager {
    /// The state for each key
    states: Mutex<HashMap<String, LoadState>>,
    /// Channels to notify when a key changes
    subscribers: Mutex<Vec<mpsc::UnboundedSender<String>>>,
}

impl LoadingStateManager {
    /// Create an empty manager
    #[must_use]
    pub fn new() -> Self {
        LoadingStateManager::default()
    }

    /// Mark a key as loading clearing any prior error
    ///
    /// # Arguments
    ///
    /// * `key` - The key to mark
    pub fn start(&self, key: &str) {
        self.update(key, |state| {
            state.loading = true;
            state.error = None;
        });
    }

    /// Mark a key as done loading
    ///
    /// # Arguments
    ///
    /// * `key` - The key to mark
    pub fn finish(&self, key: &str) {
        self.update(key, |state| state.loading = false);
    }

    /// Record a failure for a key
    ///
    /// # Arguments
    ///
    /// * `key` - The key that failed
    /// * `error` - The error to classify and record
    pub fn fail(&self, key: &str, error: &Error) {
        let raw = error.msg().unwrap_or_else(|| error.to_string());
        let message = friendly_message(&raw);
        self.update(key, |state| {
            state.loading = false;
            state.error = Some(message.clone());
        });
    }

    /// Get the state for a key
    ///
    /// # Arguments
    ///
    /// * `key` - The key to read
    #[must_use]
    pub fn get(&self, key: &str) -> LoadState {
        self.states
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether a fetch is in flight for a key
    #[must_use]
    pub fn is_loading(&self, key: &str) -> bool {
        self.get(key).loading
    }

    /// Get the recorded failure message for a key if one exists
    #[must_use]
    pub fn error(&self, key: &str) -> Option<String> {
        self.get(key).error
    }

    /// Run a fetch flipping the keys state around it
    ///
    /// # Arguments
    ///
    /// * `key` - The key to track the fetch under
    /// * `fetch` - The fetch to run
    pub async fn with_loading<T, Fut>(&self, key: &str, fetch: Fut) -> Result<T, Error>
    where
        Fut: Future<Output = Result<T, Error>>,
    {
        self.start(key);
        match fetch.await {
            Ok(value) => {
                self.finish(key);
                Ok(value)
            }
            Err(error) => {
                self.fail(key, &error);
                Err(error)
            }
        }
    }

    /// Subscribe to key change notifications
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Apply a mutation to a keys state and notify subscribers
    fn update<F: FnOnce(&mut LoadState)>(&self, key: &str, apply: F) {
        {
            let mut states = self.states.lock().unwrap();
            apply(states.entry(key.to_owned()).or_default());
        }
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(key.to_owned()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_covers_the_common_failures() {
        assert!(friendly_message("HTTP 429 from api").contains("Too many requests"));
        assert!(friendly_message("got a 401 unauthorized").contains("log in again"));
        assert!(friendly_message("request timed out after 30s").contains("timed out"));
        assert!(friendly_message("500 Internal Server Error").contains("server hit an error"));
        assert!(friendly_message("network error: failed to fetch").contains("reach the server"));
    }

    #[test]
    fn unmatched_errors_truncate() {
        let raw = "x".repeat(250);
        let message = friendly_message(&raw);
        assert_eq!(message.chars().count(), ERROR_TRUNCATE_AT + 1);
        assert!(message.ends_with('…'));
        // short unmatched text passes through untouched
        assert_eq!(friendly_message("odd failure"), "odd failure");
    }

    #[test]
    fn start_finish_flips_loading() {
        let manager = LoadingStateManager::new();
        assert!(!manager.is_loading("events"));
        manager.start("events");
        assert!(manager.is_loading("events"));
        manager.finish("events");
        assert!(!manager.is_loading("events"));
    }

    #[test]
    fn failures_record_a_friendly_message() {
        let manager = LoadingStateManager::new();
        manager.start("events");
        manager.fail("events", &Error::new("HTTP 429 from api"));
        assert!(!manager.is_loading("events"));
        assert!(manager.error("events").unwrap().contains("Too many requests"));
        // a fresh load clears the recorded error
        manager.start("events");
        assert!(manager.error("events").is_none());
    }

    #[tokio::test]
    async fn with_loading_wraps_a_fetch() {
        let manager = LoadingStateManager::new();
        let value = manager
            .with_loading("responses", async { Ok(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert!(!manager.is_loading("responses"));
        // a failing fetch records its message
        let result: Result<u32, Error> = manager
            .with_loading("responses", async { Err(Error::new("request timed out")) })
            .await;
        assert!(result.is_err());
        assert!(manager.error("responses").unwrap().contains("timed out"));
    }

    #[test]
    fn subscribers_see_key_changes() {
        let manager = LoadingStateManager::new();
        let mut rx = manager.subscribe();
        manager.start("events");
        assert_eq!(rx.try_recv().unwrap(), "events");
    }
}
