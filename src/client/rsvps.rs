//! The RSVPs handler for the EventCall client

use uuid::Uuid;

use super::auth::Auth;
use super::transport::Transport;
use super::Error;
use crate::models::{Rsvp, RsvpListParams, SubmissionEnvelope};
use crate::{add_query, send_build};

/// rsvps handler for the EventCall client
#[derive(Clone)]
pub struct Rsvps {
    /// url/ip of the EventCall api
    host: String,
    /// The transport to send requests through
    transport: Transport,
    /// The auth handler for csrf tokens
    auth: Auth,
}

impl Rsvps {
    /// Creates a new rsvps handler
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
        // build rsvps route handler
        Rsvps {
            host: host.to_owned(),
            transport: transport.clone(),
            auth: auth.clone(),
        }
    }

    /// Submit an RSVP envelope
    ///
    /// The server upserts by `(event_id, lowercase email)` so a duplicate
    /// submission collapses into an update of the existing row.
    ///
    /// # Arguments
    ///
    /// * `envelope` - The submission envelope to send
    pub async fn submit(&self, envelope: &SubmissionEnvelope) -> Result<Rsvp, Error> {
        // reject incomplete envelopes before any network call
        if envelope.rsvp.event_id.is_empty() {
            return Err(Error::validation("an event id is required"));
        }
        if envelope.rsvp.email.is_empty() {
            return Err(Error::validation("an email is required"));
        }
        // build url for submitting an rsvp
        let url = format!("{}/api/rsvps", self.host);
        // build request with the current csrf token attached
        let req = self
            .auth
            .attach_csrf(self.transport.raw().post(&url).json(envelope));
        // send request and build the persisted rsvp
        send_build!(self.transport, req, "rsvps_submit", Rsvp)
    }

    /// List RSVPs matching some params
    ///
    /// # Arguments
    ///
    /// * `params` - The params to filter the listing on
    ///
    /// # Examples
    ///
    /// ```
    /// use eventcall::EventCall;
    /// use eventcall::models::RsvpListParams;
    /// # use eventcall::Error;
    ///
    /// # async fn exec() -> Result<(), Error> {
    /// let eventcall = EventCall::build("http://127.0.0.1").build()?;
    /// let params = RsvpListParams::event("E1");
    /// let responses = eventcall.backend()?.rsvps.list(&params).await?;
    /// # // allow test code to be compiled but don't unwrap as no API instance would be up
    /// # Ok(())
    /// # }
    /// # tokio_test::block_on(async {
    /// #    exec().await
    /// # });
    /// ```
    pub async fn list(&self, params: &RsvpListParams) -> Result<Vec<Rsvp>, Error> {
        // build url for listing rsvps
        let url = format!("{}/api/rsvps", self.host);
        // collect our query params
        let mut query: Vec<(&str, String)> = Vec::with_capacity(2);
        add_query!(query, "event_id", params.event_id);
        if !params.event_ids.is_empty() {
            query.push(("event_ids", params.event_ids.join(",")));
        }
        // build request
        let req = self.transport.raw().get(&url).query(&query);
        // send request and build the listing
        send_build!(self.transport, req, "rsvps_list", Vec<Rsvp>)
    }

    /// Delete an RSVP
    ///
    /// Only the event owner may delete responses; the server enforces that.
    ///
    /// # Arguments
    ///
    /// * `id` - The id of the RSVP to delete
    pub async fn delete(&self, id: &Uuid) -> Result<(), Error> {
        // build url for deleting this rsvp
        let url = format!("{}/api/rsvps/{}", self.host, id);
        // build request with the current csrf token attached
        let req = self.auth.attach_csrf(self.transport.raw().delete(&url));
        // send request
        self.transport.send(req, "rsvps_delete").await?;
        Ok(())
    }
}
