//! Organizer session persistence
//!
//! Sessions live in one of two stores: a durable store that survives
//! restarts and carries a seven day TTL, or a transient store that lives as
//! long as the tab. On boot the transient store wins if both hold a session.

use chrono::prelude::*;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::client::Users;
use crate::models::User;
use crate::state::StateStore;
use crate::Error;

/// How long a durable session stays valid in days
pub const SESSION_TTL_DAYS: i64 = 7;

/// The state key sessions live under
const SESSION_KEY: &str = "session";

/// A logged in organizer session
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Session {
    /// The logged in user
    pub user: User,
    /// When this session was issued
    pub issued: DateTime<Utc>,
    /// Whether this session lives in the durable store
    pub durable: bool,
}

impl Session {
    /// Check whether this session has outlived its TTL
    ///
    /// Transient sessions never expire by age; the store they live in dies
    /// with the tab.
    ///
    /// # Arguments
    ///
    /// * `now` - The instant to check expiry at
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.durable && now - self.issued >= chrono::Duration::days(SESSION_TTL_DAYS)
    }
}

/// Loads, saves and reconciles organizer sessions
pub struct SessionStore {
    /// The durable store surviving restarts
    durable: Arc<dyn StateStore>,
    /// The transient store living as long as the tab
    transient: Arc<dyn StateStore>,
    /// The currently loaded session
    current: Mutex<Option<Session>>,
    /// Channels to notify when a session expires
    expiry: Mutex<Vec<mpsc::UnboundedSender<()>>>,
}

impl SessionStore {
    /// Create a session store over two state stores
    ///
    /// # Arguments
    ///
    /// * `durable` - The store surviving restarts
    /// * `transient` - The store living as long as the tab
    #[must_use]
    pub fn new(durable: Arc<dyn StateStore>, transient: Arc<dyn StateStore>) -> Self {
        SessionStore {
            durable,
            transient,
            current: Mutex::new(None),
            expiry: Mutex::new(Vec::new()),
        }
    }

    /// Save a fresh session for a user
    ///
    /// # Arguments
    ///
    /// * `user` - The user that logged in
    /// * `remember` - Whether the session should survive restarts
    pub fn save(&self, user: User, remember: bool) -> Result<Session, Error> {
        let session = Session {
            user,
            issued: Utc::now(),
            durable: remember,
        };
        let raw = serde_json::to_string(&session)?;
        // write to the chosen store and clear the other so a stale copy
        // can never resurrect a logged out session
        if remember {
            self.durable.set(SESSION_KEY, &raw);
            self.transient.remove(SESSION_KEY);
        } else {
            self.transient.set(SESSION_KEY, &raw);
            self.durable.remove(SESSION_KEY);
        }
        *self.current.lock().unwrap() = Some(session.clone());
        Ok(session)
    }

    /// Load a session from either store
    ///
    /// The transient store wins when both hold one. Expired durable
    /// sessions are dropped and expiry subscribers are told.
    pub fn load(&self) -> Option<Session> {
        let raw = self
            .transient
            .get(SESSION_KEY)
            .or_else(|| self.durable.get(SESSION_KEY))?;
        let session: Session = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(error) => {
                tracing::warn!(error = %error, "dropping unreadable session");
                self.clear();
                return None;
            }
        };
        if session.is_expired(Utc::now()) {
            tracing::info!(username = %session.user.username, "session expired");
            self.clear();
            self.notify_expiry();
            return None;
        }
        *self.current.lock().unwrap() = Some(session.clone());
        Some(session)
    }

    /// Get the currently loaded session
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.current.lock().unwrap().clone()
    }

    /// Drop the session from both stores
    pub fn clear(&self) {
        self.durable.remove(SESSION_KEY);
        self.transient.remove(SESSION_KEY);
        *self.current.lock().unwrap() = None;
    }

    /// Reconcile the loaded session against the backend
    ///
    /// A deleted account clears the session; a fresher user row refreshes
    /// it. Transient backend failures leave the session alone so an
    /// organizer can keep working offline.
    ///
    /// # Arguments
    ///
    /// * `users` - The users handler to reconcile against
    pub async fn reconcile(&self, users: &Users) -> Result<Option<Session>, Error> {
        let Some(session) = self.current() else {
            return Ok(None);
        };
        match users.get(&session.user.username).await {
            Ok(user) => {
                // refresh the session with the servers view of the user
                let refreshed = self.save(user, session.durable)?;
                Ok(Some(refreshed))
            }
            Err(error) if error.kind() == crate::ErrorKind::NotFound => {
                tracing::info!(username = %session.user.username, "account gone, clearing session");
                self.clear();
                self.notify_expiry();
                Ok(None)
            }
            Err(error) => {
                tracing::debug!(error = %error, "session reconcile skipped");
                Ok(Some(session))
            }
        }
    }

    /// Subscribe to session expiry notifications
    pub fn subscribe_expiry(&self) -> mpsc::UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.expiry.lock().unwrap().push(tx);
        rx
    }

    /// Tell subscribers the session expired
    fn notify_expiry(&self) {
        let mut subscribers = self.expiry.lock().unwrap();
        subscribers.retain(|tx| tx.send(()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{User, UserRole};
    use crate::state::MemoryStateStore;

    /// Build a user for tests
    fn user() -> User {
        User {
            id: "U1".to_owned(),
            username: "ahart".to_owned(),
            name: "Alice Hart".to_owned(),
            email: "alice@example.com".to_owned(),
            branch: None,
            rank: None,
            role: UserRole::User,
            created: Utc::now(),
        }
    }

    /// Build a store over fresh memory state
    fn store() -> SessionStore {
        SessionStore::new(
            Arc::new(MemoryStateStore::new()),
            Arc::new(MemoryStateStore::new()),
        )
    }

    #[test]
    fn save_and_load_round_trip() {
        let store = store();
        store.save(user(), true).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.user.username, "ahart");
        assert!(loaded.durable);
    }

    #[test]
    fn transient_sessions_win_on_load() {
        let store = store();
        let mut other = user();
        other.username = "bcole".to_owned();
        store.save(user(), true).unwrap();
        // the second save clears the durable copy
        store.save(other, false).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.user.username, "bcole");
        assert!(!loaded.durable);
    }

    #[test]
    fn expired_durable_sessions_drop_and_notify() {
        let store = store();
        let mut rx = store.subscribe_expiry();
        let session = store.save(user(), true).unwrap();
        // age the stored session past its ttl
        let mut aged = session;
        aged.issued = Utc::now() - chrono::Duration::days(SESSION_TTL_DAYS) - chrono::Duration::hours(1);
        store
            .durable
            .set(SESSION_KEY, &serde_json::to_string(&aged).unwrap());
        store.transient.remove(SESSION_KEY);
        assert!(store.load().is_none());
        assert!(rx.try_recv().is_ok());
        // the expired session was scrubbed from the store
        assert!(store.durable.get(SESSION_KEY).is_none());
    }

    #[test]
    fn transient_sessions_never_age_out() {
        let session = Session {
            user: user(),
            issued: Utc::now() - chrono::Duration::days(30),
            durable: false,
        };
        assert!(!session.is_expired(Utc::now()));
    }

    #[test]
    fn unreadable_sessions_are_dropped() {
        let store = store();
        store.durable.set(SESSION_KEY, "not json");
        assert!(store.load().is_none());
        assert!(store.durable.get(SESSION_KEY).is_none());
    }

    #[test]
    fn clear_scrubs_both_stores() {
        let store = store();
        store.save(user(), true).unwrap();
        store.clear();
        assert!(store.current().is_none());
        assert!(store.load().is_none());
    }
}
