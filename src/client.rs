//! The asynchronous client for EventCall
//!
//! The client talks to two remote persistence surfaces: the primary REST
//! backend and a git-contents fallback store. Either may be left
//! unconfigured; operations that need the missing surface fail with an
//! unavailable error instead of guessing.

use std::sync::{Arc, Mutex};

mod auth;
pub mod conf;
mod error;
mod events;
mod helpers;
mod images;
mod keys;
mod rsvps;
pub mod store;
pub mod transport;
mod users;

pub use auth::{Auth, CsrfState};
pub use conf::{ClientConf, ClientSettings};
pub use error::{Error, ErrorKind};
pub use events::Events;
pub use images::Images;
pub use keys::{Keys, StoreKeys};
pub use rsvps::Rsvps;
pub use store::ContentStore;
pub use transport::{RetryPolicy, TokenPool, Transport};
pub use users::Users;

use crate::models::{Event, EventListParams, Rsvp, RsvpListParams};
use crate::state::{MemoryStateStore, StateStore};

/// Builds the EventCall client
#[derive(Clone)]
pub struct EventCallClientBuilder {
    /// The host/domain the EventCall api can be found at
    host: Option<String>,
    /// The settings for the fallback content store
    store: Option<StoreKeys>,
    /// The settings for this client
    pub settings: ClientSettings,
    /// The per-tab state store to share across the client
    state: Option<Arc<dyn StateStore>>,
}

impl EventCallClientBuilder {
    /// Sets the fallback content store to write blobs through
    ///
    /// # Arguments
    ///
    /// * `store` - The settings for the content store
    ///
    /// # Examples
    ///
    /// ```
    /// use eventcall::client::StoreKeys;
    /// use eventcall::EventCall;
    ///
    /// EventCall::build("http://127.0.0.1")
    ///     .store(StoreKeys::new("https://api.github.com/repos/hart/eventcall-data"));
    /// ```
    #[must_use]
    pub fn store(mut self, store: StoreKeys) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the client settings to build with
    ///
    /// # Arguments
    ///
    /// * `settings` - The settings to use
    #[must_use]
    pub fn settings(mut self, settings: ClientSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the per-tab state store to share across the client
    ///
    /// # Arguments
    ///
    /// * `state` - The state store to share
    #[must_use]
    pub fn state(mut self, state: Arc<dyn StateStore>) -> Self {
        self.state = Some(state);
        self
    }

    /// Load connection info from a key file on disk
    ///
    /// # Arguments
    ///
    /// * `path` - The path to load keys from
    pub fn from_keys(mut self, path: &str) -> Result<Self, Error> {
        // load keys from disk
        let keys = Keys::new(path)?;
        // take the api host and store settings from the keys
        self.host = keys.api;
        self.store = keys.store;
        Ok(self)
    }

    /// Load connection info and settings from a [`ClientConf`]
    ///
    /// # Arguments
    ///
    /// * `conf` - The config to build from
    #[must_use]
    pub fn from_conf(mut self, conf: ClientConf) -> Self {
        self.host = conf.keys.api;
        self.store = conf.keys.store;
        self.settings = conf.client;
        self
    }

    /// Builds a client with the configured settings
    ///
    /// At least one persistence surface must be configured.
    ///
    /// # Examples
    ///
    /// ```
    /// use eventcall::EventCall;
    /// # use eventcall::Error;
    ///
    /// # fn exec() -> Result<(), Error> {
    /// let eventcall = EventCall::build("http://127.0.0.1").build()?;
    /// # Ok(())
    /// # }
    /// # exec();
    /// ```
    pub fn build(self) -> Result<EventCall, Error> {
        // neither surface configured means this client could never persist
        if self.host.is_none() && self.store.is_none() {
            return Err(Error::Unavailable(
                "neither a backend host nor a content store is configured".to_owned(),
            ));
        }
        // build a reqwest client
        let client = helpers::build_reqwest_client(&self.settings)?;
        // fall back to a fresh in memory state store
        let state = self
            .state
            .unwrap_or_else(|| Arc::new(MemoryStateStore::new()));
        // the csrf token is shared across every backend handler
        let csrf: CsrfState = Arc::new(Mutex::new(None));
        // build the backend handlers if a host is configured
        let backend = self.host.map(|host| {
            let host = host.trim_end_matches('/').to_owned();
            let transport = transport::Transport::new(&client, self.settings.retry.clone());
            Backend::new(&host, &transport, &csrf)
        });
        // build the content store if one is configured
        let store = self.store.map(|keys| {
            // the store rides its own transport so its rotation pool never
            // leaks onto backend requests
            let pool = TokenPool::new(keys.tokens.clone(), state.clone());
            let transport =
                transport::Transport::new(&client, self.settings.retry.clone()).pool(pool);
            ContentStore::new(&keys.root, &keys.branch, transport)
        });
        Ok(EventCall {
            backend,
            store,
            state,
            client,
        })
    }
}

/// The route handlers for the primary REST backend
#[derive(Clone)]
pub struct Backend {
    /// Handles auth routes in EventCall
    pub auth: Auth,
    /// Handles user routes in EventCall
    pub users: Users,
    /// Handles event routes in EventCall
    pub events: Events,
    /// Handles RSVP routes in EventCall
    pub rsvps: Rsvps,
    /// Handles image routes in EventCall
    pub images: Images,
    /// The host/url to reach EventCall at
    pub host: String,
}

impl Backend {
    /// Build the handlers for a backend host
    ///
    /// # Arguments
    ///
    /// * `host` - The host/url to reach EventCall at
    /// * `transport` - The transport to send requests through
    /// * `csrf` - The csrf state shared across handlers
    #[must_use]
    pub fn new(host: &str, transport: &Transport, csrf: &CsrfState) -> Self {
        // build handlers
        let auth = Auth::new(host, transport, csrf);
        let users = Users::new(host, transport, &auth);
        let events = Events::new(host, transport, &auth);
        let rsvps = Rsvps::new(host, transport, &auth);
        let images = Images::new(host, transport, &auth);
        Backend {
            auth,
            users,
            events,
            rsvps,
            images,
            host: host.to_owned(),
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

/// An asynchronous client for EventCall
#[derive(Clone)]
pub struct EventCall {
    /// The primary REST backend if one is configured
    pub backend: Option<Backend>,
    /// The fallback content store if one is configured
    pub store: Option<ContentStore>,
    /// The per-tab state store shared across the client
    pub state: Arc<dyn StateStore>,
    // keep a copy of our client for any extra transports
    client: reqwest::Client,
}

impl std::fmt::Debug for EventCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCall")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl EventCall {
    /// Start building an EventCall client against a backend host
    ///
    /// # Arguments
    ///
    /// * `host` - The host/url the EventCall api can be reached at
    ///
    /// # Examples
    ///
    /// ```
    /// use eventcall::EventCall;
    ///
    /// EventCall::build("http://127.0.0.1");
    /// ```
    #[must_use]
    pub fn build<T: Into<String>>(host: T) -> EventCallClientBuilder {
        EventCallClientBuilder {
            host: Some(host.into()),
            store: None,
            settings: ClientSettings::default(),
            state: None,
        }
    }

    /// Start building an EventCall client with no backend host
    ///
    /// Only operations with a content store path will work on the built
    /// client; everything else fails unavailable.
    #[must_use]
    pub fn build_store_only(store: StoreKeys) -> EventCallClientBuilder {
        EventCallClientBuilder {
            host: None,
            store: Some(store),
            settings: ClientSettings::default(),
            state: None,
        }
    }

    /// Get the backend handlers failing if none are configured
    pub fn try_backend(&self) -> Result<&Backend, Error> {
        self.backend.as_ref().ok_or_else(|| {
            Error::Unavailable("the primary backend is not configured".to_owned())
        })
    }

    /// Get the backend handlers failing if none are configured
    ///
    /// Alias kept short for call sites that read better with it.
    pub fn backend(&self) -> Result<&Backend, Error> {
        self.try_backend()
    }

    /// Get the content store failing if none is configured
    pub fn try_store(&self) -> Result<&ContentStore, Error> {
        self.store
            .as_ref()
            .ok_or_else(|| Error::Unavailable("the content store is not configured".to_owned()))
    }

    /// Get the underlying reqwest client
    #[must_use]
    pub fn raw(&self) -> &reqwest::Client {
        &self.client
    }

    /// List events from whichever surface is configured
    ///
    /// The backend answers when configured; otherwise the event blobs in the
    /// content store are walked and filtered client side.
    ///
    /// # Arguments
    ///
    /// * `params` - The params to filter the listing on
    pub async fn list_events(&self, params: &EventListParams) -> Result<Vec<Event>, Error> {
        if let Some(backend) = &self.backend {
            return backend.events.list(params).await;
        }
        let store = self.try_store()?;
        // walk the event blobs and filter client side
        let mut events = Vec::new();
        for entry in store.read_tree().await? {
            if entry.path.starts_with("events/") && entry.path.ends_with(".json") {
                if let Some((bytes, _)) = store.read_path(&entry.path).await? {
                    events.push(serde_json::from_slice::<Event>(&bytes)?);
                }
            }
        }
        events.retain(|event| {
            if let Some(owner) = &params.created_by {
                if &event.created_by != owner {
                    return false;
                }
            }
            if let Some(status) = params.status {
                if event.status != status {
                    return false;
                }
            }
            !params.unassigned || event.created_by.is_empty()
        });
        Ok(events)
    }

    /// Get a single event from whichever surface is configured
    ///
    /// # Arguments
    ///
    /// * `event_id` - The id of the event to get
    pub async fn get_event(&self, event_id: &str) -> Result<Option<Event>, Error> {
        if let Some(backend) = &self.backend {
            let events = backend.events.list(&EventListParams::new()).await?;
            return Ok(events.into_iter().find(|event| event.id == event_id));
        }
        let store = self.try_store()?;
        match store.read_path(&store::event_path(event_id)).await? {
            Some((bytes, _)) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// List the responses for an event from whichever surface is configured
    ///
    /// # Arguments
    ///
    /// * `event_id` - The event to list responses for
    pub async fn list_responses(&self, event_id: &str) -> Result<Vec<Rsvp>, Error> {
        if let Some(backend) = &self.backend {
            return backend.rsvps.list(&RsvpListParams::event(event_id)).await;
        }
        let store = self.try_store()?;
        match store.read_path(&store::rsvps_path(event_id)).await? {
            Some((bytes, _)) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_a_surface() {
        // a builder with neither surface configured refuses to build
        let builder = EventCallClientBuilder {
            host: None,
            store: None,
            settings: ClientSettings::default(),
            state: None,
        };
        let error = builder.build().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn store_only_clients_have_no_backend() {
        let keys = StoreKeys::new("https://api.github.com/repos/hart/eventcall-data");
        let client = EventCall::build_store_only(keys).build().unwrap();
        assert!(client.backend.is_none());
        assert_eq!(
            client.try_backend().unwrap_err().kind(),
            ErrorKind::Unavailable
        );
        assert!(client.try_store().is_ok());
    }
}
