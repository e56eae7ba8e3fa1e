//! The local spool for submissions that could not reach any remote surface
//!
//! Spooled envelopes are sealed before they touch the shared state store so
//! attendee contact info never sits there in the clear. The sealing key is
//! generated per process; entries that outlive the process fail to open and
//! are dropped on the next load.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::SubmissionEnvelope;
use crate::state::StateStore;
use crate::Error;

/// How long spooled envelopes stay replayable in hours
pub const SPOOL_TTL_HOURS: i64 = 4;

/// The nonce length chacha20poly1305 uses
const NONCE_LEN: usize = 12;

/// Build the state key spooled envelopes for an event live under
fn spool_key(event_id: &str) -> String {
    format!("pending_{event_id}")
}

/// A spooled submission envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpoolEntry {
    /// The envelope that failed to submit
    pub envelope: SubmissionEnvelope,
    /// When this envelope was spooled
    pub spooled_at: DateTime<Utc>,
}

/// A sealed spool of submissions awaiting replay
#[derive(Clone)]
pub struct Spool {
    /// The state store sealed entries are kept in
    state: Arc<dyn StateStore>,
    /// The cipher sealing entries at rest
    cipher: ChaCha20Poly1305,
}

impl Spool {
    /// Create a spool with a fresh per process sealing key
    ///
    /// # Arguments
    ///
    /// * `state` - The state store to keep sealed entries in
    #[must_use]
    pub fn new(state: Arc<dyn StateStore>) -> Self {
        let key = ChaCha20Poly1305::generate_key(&mut OsRng);
        Spool {
            state,
            cipher: ChaCha20Poly1305::new(&key),
        }
    }

    /// Create a spool sealing with a caller provided key
    ///
    /// # Arguments
    ///
    /// * `state` - The state store to keep sealed entries in
    /// * `key` - The 32 byte sealing key
    #[must_use]
    pub fn with_key(state: Arc<dyn StateStore>, key: &[u8; 32]) -> Self {
        Spool {
            state,
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Spool an envelope for later replay
    ///
    /// Envelopes dedup by lowercase email so resubmitting while offline
    /// replaces the earlier pending entry instead of stacking a second one.
    ///
    /// # Arguments
    ///
    /// * `envelope` - The envelope to spool
    pub fn save(&self, envelope: &SubmissionEnvelope) -> Result<(), Error> {
        self.save_at(envelope, Utc::now())
    }

    /// Spool an envelope with an explicit timestamp
    fn save_at(&self, envelope: &SubmissionEnvelope, spooled_at: DateTime<Utc>) -> Result<(), Error> {
        let event_id = envelope.rsvp.event_id.clone();
        let mut entries = self.load_map(&event_id);
        entries.insert(
            envelope.rsvp.email.to_lowercase(),
            SpoolEntry {
                envelope: envelope.clone(),
                spooled_at,
            },
        );
        self.store_map(&event_id, &entries)
    }

    /// Load the live spooled envelopes for an event
    ///
    /// Expired entries are pruned from the store as a side effect.
    ///
    /// # Arguments
    ///
    /// * `event_id` - The event to load spooled envelopes for
    pub fn load(&self, event_id: &str) -> Vec<SpoolEntry> {
        let entries = self.load_map(event_id);
        let now = Utc::now();
        let live: HashMap<String, SpoolEntry> = entries
            .into_iter()
            .filter(|(_, entry)| now - entry.spooled_at < Duration::hours(SPOOL_TTL_HOURS))
            .collect();
        // rewrite the store when pruning dropped anything
        if live.is_empty() {
            self.state.remove(&spool_key(event_id));
        } else if self.store_map(event_id, &live).is_err() {
            tracing::warn!(event_id, "failed to rewrite spool after pruning");
        }
        live.into_values().collect()
    }

    /// Take the live spooled envelopes for an event clearing them
    ///
    /// # Arguments
    ///
    /// * `event_id` - The event to drain
    pub fn take(&self, event_id: &str) -> Vec<SpoolEntry> {
        let entries = self.load(event_id);
        self.state.remove(&spool_key(event_id));
        entries
    }

    /// Drop a single spooled envelope by email
    ///
    /// # Arguments
    ///
    /// * `event_id` - The event the envelope was spooled under
    /// * `email` - The email the envelope was keyed by
    pub fn remove(&self, event_id: &str, email: &str) {
        let mut entries = self.load_map(event_id);
        if entries.remove(&email.to_lowercase()).is_some() {
            if entries.is_empty() {
                self.state.remove(&spool_key(event_id));
            } else if self.store_map(event_id, &entries).is_err() {
                tracing::warn!(event_id, "failed to rewrite spool after removal");
            }
        }
    }

    /// Drop every spooled envelope for an event
    ///
    /// # Arguments
    ///
    /// * `event_id` - The event to clear
    pub fn clear(&self, event_id: &str) {
        self.state.remove(&spool_key(event_id));
    }

    /// Load and open the spool map for an event
    ///
    /// Entries that fail to open were sealed by another process and can
    /// never be read again; they are dropped with a warning.
    fn load_map(&self, event_id: &str) -> HashMap<String, SpoolEntry> {
        let Some(sealed) = self.state.get(&spool_key(event_id)) else {
            return HashMap::new();
        };
        match self
            .open(&sealed)
            .and_then(|raw| serde_json::from_slice(&raw).map_err(Error::from))
        {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(event_id, error = %error, "dropping unreadable spool");
                self.state.remove(&spool_key(event_id));
                HashMap::new()
            }
        }
    }

    /// Seal and store the spool map for an event
    fn store_map(&self, event_id: &str, entries: &HashMap<String, SpoolEntry>) -> Result<(), Error> {
        let raw = serde_json::to_vec(entries)?;
        let sealed = self.seal(&raw)?;
        self.state.set(&spool_key(event_id), &sealed);
        Ok(())
    }

    /// Seal bytes prepending the nonce
    fn seal(&self, raw: &[u8]) -> Result<String, Error> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let mut sealed = self
            .cipher
            .encrypt(&nonce, raw)
            .map_err(|error| Error::Seal(error.to_string()))?;
        let mut out = nonce.to_vec();
        out.append(&mut sealed);
        Ok(B64.encode(out))
    }

    /// Open sealed bytes splitting off the nonce
    fn open(&self, sealed: &str) -> Result<Vec<u8>, Error> {
        let raw = B64.decode(sealed)?;
        if raw.len() <= NONCE_LEN {
            return Err(Error::Seal("sealed spool entry is truncated".to_owned()));
        }
        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|error| Error::Seal(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Rsvp, SubmissionEnvelope, SubmissionMethod};
    use crate::state::MemoryStateStore;

    /// Build an envelope for a given attendee
    fn envelope(event_id: &str, email: &str) -> SubmissionEnvelope {
        let mut rsvp = Rsvp::new(event_id, "Test Attendee", email, true);
        rsvp.guest_count = 1;
        SubmissionEnvelope::new(rsvp, SubmissionMethod::LocalSpool)
    }

    #[test]
    fn save_and_load_round_trip() {
        let spool = Spool::new(Arc::new(MemoryStateStore::new()));
        spool.save(&envelope("E1", "amy@example.com")).unwrap();
        let entries = spool.load("E1");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].envelope.rsvp.email, "amy@example.com");
        // other events see nothing
        assert!(spool.load("E2").is_empty());
    }

    #[test]
    fn dedups_by_lowercase_email() {
        let spool = Spool::new(Arc::new(MemoryStateStore::new()));
        spool.save(&envelope("E1", "Amy@Example.com")).unwrap();
        spool.save(&envelope("E1", "amy@example.com")).unwrap();
        assert_eq!(spool.load("E1").len(), 1);
    }

    #[test]
    fn expired_entries_are_pruned() {
        let state = Arc::new(MemoryStateStore::new());
        let spool = Spool::new(state.clone());
        let stale = Utc::now() - Duration::hours(SPOOL_TTL_HOURS) - Duration::minutes(1);
        spool.save_at(&envelope("E1", "old@example.com"), stale).unwrap();
        spool.save(&envelope("E1", "new@example.com")).unwrap();
        let entries = spool.load("E1");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].envelope.rsvp.email, "new@example.com");
    }

    #[test]
    fn take_drains_the_spool() {
        let spool = Spool::new(Arc::new(MemoryStateStore::new()));
        spool.save(&envelope("E1", "amy@example.com")).unwrap();
        assert_eq!(spool.take("E1").len(), 1);
        assert!(spool.load("E1").is_empty());
    }

    #[test]
    fn remove_drops_a_single_entry() {
        let spool = Spool::new(Arc::new(MemoryStateStore::new()));
        spool.save(&envelope("E1", "amy@example.com")).unwrap();
        spool.save(&envelope("E1", "ben@example.com")).unwrap();
        spool.remove("E1", "AMY@EXAMPLE.COM");
        let entries = spool.load("E1");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].envelope.rsvp.email, "ben@example.com");
    }

    #[test]
    fn foreign_keys_are_dropped_not_propagated() {
        // sealing with one key and opening with another mimics a restart
        let state = Arc::new(MemoryStateStore::new());
        let sealer = Spool::with_key(state.clone(), &[7u8; 32]);
        sealer.save(&envelope("E1", "amy@example.com")).unwrap();
        let opener = Spool::with_key(state.clone(), &[9u8; 32]);
        assert!(opener.load("E1").is_empty());
        // the unreadable blob was cleared from the store
        assert!(state.get("pending_E1").is_none());
    }
}
