//! The events handler for the EventCall client

use super::auth::Auth;
use super::transport::Transport;
use super::Error;
use crate::models::events::valid_cover_url;
use crate::models::{Event, EventCreate, EventListParams, EventUpdate};
use crate::{add_query, add_query_bool, send_build};

/// events handler for the EventCall client
#[derive(Clone)]
pub struct Events {
    /// url/ip of the EventCall api
    host: String,
    /// The transport to send requests through
    transport: Transport,
    /// The auth handler for csrf tokens
    auth: Auth,
}

impl Events {
    /// Creates a new events handler
    ///
    /// Instead of directly creating this handler you likely want to simply
    /// create an `eventcall::EventCall` and use the handler within that.
    ///
    /// # Arguments
    ///
    /// * `host` - The url/ip of the EventCall api
    /// * `transport` - The transport to send requests through
    /// * `auth` - The auth handler for csrf tokens
    #[must_use]
    pub fn new(host: &str, transport: &Transport, auth: &Auth) -> Self {
        // build events route handler
        Events {
            host: host.to_owned(),
            transport: transport.clone(),
            auth: auth.clone(),
        }
    }

    /// Create a new event
    ///
    /// # Arguments
    ///
    /// * `blueprint` - The event creation blueprint
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{NaiveDate, NaiveTime};
    /// use eventcall::EventCall;
    /// use eventcall::models::EventCreate;
    /// # use eventcall::Error;
    ///
    /// # async fn exec() -> Result<(), Error> {
    /// let eventcall = EventCall::build("http://127.0.0.1").build()?;
    /// let req = EventCreate::new(
    ///     "Dining Out",
    ///     NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
    ///     NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
    ///     "Fort Harmon Club",
    /// );
    /// let event = eventcall.backend()?.events.create(req).await?;
    /// # // allow test code to be compiled but don't unwrap as no API instance would be up
    /// # Ok(())
    /// # }
    /// # tokio_test::block_on(async {
    /// #    exec().await
    /// # });
    /// ```
    pub async fn create(&self, blueprint: EventCreate) -> Result<Event, Error> {
        // reject incomplete blueprints before any network call
        if blueprint.title.trim().is_empty() {
            return Err(Error::validation("an event title is required"));
        }
        if let Some(cover) = &blueprint.cover_image_url {
            if !valid_cover_url(cover) {
                return Err(Error::validation("cover url must be https or empty"));
            }
        }
        // build url for creating an event
        let url = format!("{}/api/events", self.host);
        // build request with the current csrf token attached
        let req = self
            .auth
            .attach_csrf(self.transport.raw().post(&url).json(&blueprint));
        // send request and build the event
        send_build!(self.transport, req, "events_create", Event)
    }

    /// List events matching some params
    ///
    /// # Arguments
    ///
    /// * `params` - The params to filter the listing on
    pub async fn list(&self, params: &EventListParams) -> Result<Vec<Event>, Error> {
        // build url for listing events
        let url = format!("{}/api/events", self.host);
        // collect our query params
        let mut query: Vec<(&str, String)> = Vec::with_capacity(3);
        add_query!(query, "created_by", params.created_by);
        add_query_bool!(query, "unassigned", params.unassigned);
        add_query!(query, "status", params.status);
        // build request
        let req = self.transport.raw().get(&url).query(&query);
        // send request and build the listing
        send_build!(self.transport, req, "events_list", Vec<Event>)
    }

    /// Update an event
    ///
    /// Only the events owner may mutate it; the server enforces that.
    ///
    /// # Arguments
    ///
    /// * `id` - The id of the event to update
    /// * `update` - The update to apply
    pub async fn update(&self, id: &str, update: EventUpdate) -> Result<Event, Error> {
        // reject empty updates before any network call
        if update.is_empty() {
            return Err(Error::validation("event update changes nothing"));
        }
        if let Some(cover) = &update.cover_image_url {
            if !valid_cover_url(cover) {
                return Err(Error::validation("cover url must be https or empty"));
            }
        }
        // build url for updating this event
        let url = format!("{}/api/events/{}", self.host, id);
        // build request with the current csrf token attached
        let req = self
            .auth
            .attach_csrf(self.transport.raw().put(&url).json(&update));
        // send request and build the updated event
        send_build!(self.transport, req, "events_update", Event)
    }

    /// Delete an event
    ///
    /// The server cascades this to the events response list and cover image.
    ///
    /// # Arguments
    ///
    /// * `id` - The id of the event to delete
    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        // build url for deleting this event
        let url = format!("{}/api/events/{}", self.host, id);
        // build request with the current csrf token attached
        let req = self.auth.attach_csrf(self.transport.raw().delete(&url));
        // send request
        self.transport.send(req, "events_delete").await?;
        Ok(())
    }
}
