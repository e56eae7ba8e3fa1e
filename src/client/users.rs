//! The users handler for the EventCall client

use super::auth::Auth;
use super::transport::Transport;
use super::Error;
use crate::models::{User, UserList, UserResponse, UserUpdate};
use crate::send_build;

/// users handler for the EventCall client
#[derive(Clone)]
pub struct Users {
    /// url/ip of the EventCall api
    host: String,
    /// The transport to send requests through
    transport: Transport,
    /// The auth handler for csrf tokens
    auth: Auth,
}

impl Users {
    /// Creates a new users handler
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
        // build users route handler
        Users {
            host: host.to_owned(),
            transport: transport.clone(),
            auth: auth.clone(),
        }
    }

    /// Gets info on a specific user by username
    ///
    /// # Arguments
    ///
    /// * `username` - The user to get info on
    ///
    /// # Examples
    ///
    /// ```
    /// use eventcall::EventCall;
    /// # use eventcall::Error;
    ///
    /// # async fn exec() -> Result<(), Error> {
    /// let eventcall = EventCall::build("http://127.0.0.1").build()?;
    /// let user = eventcall.backend()?.users.get("ahart").await?;
    /// # // allow test code to be compiled but don't unwrap as no API instance would be up
    /// # Ok(())
    /// # }
    /// # tokio_test::block_on(async {
    /// #    exec().await
    /// # });
    /// ```
    pub async fn get(&self, username: &str) -> Result<User, Error> {
        // reject empty usernames before any network call
        if username.is_empty() {
            return Err(Error::validation("a username is required"));
        }
        // build url for getting a users data
        let url = format!(
            "{}/api/users/by-username/{}",
            self.host,
            username.to_lowercase()
        );
        // build request
        let req = self.transport.raw().get(&url);
        // send request and build the user
        let resp = send_build!(self.transport, req, "users_get", UserResponse)?;
        Ok(resp.user)
    }

    /// Gets info on a batch of users by id
    ///
    /// # Arguments
    ///
    /// * `ids` - The ids of the users to get info on
    pub async fn list(&self, ids: &[String]) -> Result<Vec<User>, Error> {
        // an empty batch needs no network call
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        // build url for listing users
        let url = format!("{}/api/users", self.host);
        // build request with the ids as a csv param
        let req = self
            .transport
            .raw()
            .get(&url)
            .query(&[("ids", ids.join(","))]);
        // send request and build the listing
        let listing = send_build!(self.transport, req, "users_list", UserList)?;
        Ok(listing.users)
    }

    /// Update the current users profile
    ///
    /// # Arguments
    ///
    /// * `update` - The profile update to apply
    pub async fn update_profile(&self, update: UserUpdate) -> Result<(), Error> {
        // an empty update needs no network call
        if update.is_empty() {
            return Ok(());
        }
        // build url for updating a profile
        let url = format!("{}/api/users/update-profile", self.host);
        // build request with the current csrf token attached
        let req = self
            .auth
            .attach_csrf(self.transport.raw().post(&url).json(&update));
        // send request
        self.transport.send(req, "users_update_profile").await?;
        Ok(())
    }
}
