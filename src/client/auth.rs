//! The auth handler for the EventCall client

use std::sync::{Arc, Mutex};

use super::keys::Keys;
use super::transport::Transport;
use super::Error;
use crate::models::{AuthResponse, CsrfToken, PasswordUpdate, UserCreate};
use crate::send_build;

/// The csrf token shared across handlers
///
/// State changing requests carry the current token and rotate it after they
/// land; the pipeline also rotates after a successful submission.
pub type CsrfState = Arc<Mutex<Option<CsrfToken>>>;

/// auth handler for the EventCall client
#[derive(Clone)]
pub struct Auth {
    /// url/ip of the EventCall api
    host: String,
    /// The transport to send requests through
    transport: Transport,
    /// The csrf token shared across handlers
    csrf: CsrfState,
}

impl Auth {
    /// Creates a new auth handler
    ///
    /// Instead of directly creating this handler you likely want to simply
    /// create an `eventcall::EventCall` and use the handler within that.
    ///
    /// # Arguments
    ///
    /// * `host` - The url/ip of the EventCall api
    /// * `transport` - The transport to send requests through
    /// * `csrf` - The csrf state shared across handlers
    #[must_use]
    pub fn new(host: &str, transport: &Transport, csrf: &CsrfState) -> Self {
        // build auth route handler
        Auth {
            host: host.to_owned(),
            transport: transport.clone(),
            csrf: csrf.clone(),
        }
    }

    /// Register a new organizer account
    ///
    /// # Arguments
    ///
    /// * `blueprint` - The user creation blueprint
    ///
    /// # Examples
    ///
    /// ```
    /// use eventcall::EventCall;
    /// use eventcall::models::UserCreate;
    /// # use eventcall::Error;
    ///
    /// # async fn exec() -> Result<(), Error> {
    /// let eventcall = EventCall::build("http://127.0.0.1").build()?;
    /// let req = UserCreate::new("ahart", "hunter2", "Alice Hart", "alice@example.com");
    /// let auth = eventcall.backend()?.auth.register(req).await?;
    /// # // allow test code to be compiled but don't unwrap as no API instance would be up
    /// # Ok(())
    /// # }
    /// # tokio_test::block_on(async {
    /// #    exec().await
    /// # });
    /// ```
    pub async fn register(&self, blueprint: UserCreate) -> Result<AuthResponse, Error> {
        // reject incomplete blueprints before any network call
        if blueprint.username.is_empty() || blueprint.password.is_empty() {
            return Err(Error::validation("username and password are required"));
        }
        if blueprint.name.is_empty() || !blueprint.email.contains('@') {
            return Err(Error::validation("a name and a valid email are required"));
        }
        // build url for registering a user
        let url = format!("{}/api/auth/register", self.host);
        // build request
        let req = self.transport.raw().post(&url).json(&blueprint);
        // send request and build the auth response
        send_build!(self.transport, req, "auth_register", AuthResponse)
    }

    /// Log in with a username/password
    ///
    /// A rate limited login surfaces the servers `retryAfter` on the error.
    ///
    /// # Arguments
    ///
    /// * `username` - The user that is authenticating
    /// * `password` - The password to authenticate with
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, Error> {
        // reject empty credentials before any network call
        if username.is_empty() || password.is_empty() {
            return Err(Error::validation("username and password are required"));
        }
        // build url for logging in
        let url = format!("{}/api/auth/login", self.host);
        // usernames are unique in their lowercase form
        let body = serde_json::json!({
            "username": username.to_lowercase(),
            "password": password,
        });
        // build request
        let req = self.transport.raw().post(&url).json(&body);
        // send request and build the auth response
        send_build!(self.transport, req, "auth_login", AuthResponse)
    }

    /// Log in with the credentials from a key file
    ///
    /// # Arguments
    ///
    /// * `keys` - The keys holding a username/password
    ///
    /// # Examples
    ///
    /// ```
    /// use eventcall::client::Keys;
    /// use eventcall::EventCall;
    /// # use eventcall::Error;
    ///
    /// # async fn exec() -> Result<(), Error> {
    /// let keys = Keys::new_basic("http://127.0.0.1", "ahart", "hunter2");
    /// let eventcall = EventCall::build("http://127.0.0.1").build()?;
    /// let auth = eventcall.backend()?.auth.login_keys(&keys).await?;
    /// # Ok(())
    /// # }
    /// # tokio_test::block_on(async {
    /// #    exec().await
    /// # });
    /// ```
    pub async fn login_keys(&self, keys: &Keys) -> Result<AuthResponse, Error> {
        match (&keys.username, &keys.password) {
            (Some(username), Some(password)) => self.login(username, password).await,
            _ => Err(Error::validation(
                "the key file carries no username/password",
            )),
        }
    }

    /// Change the current users password
    ///
    /// # Arguments
    ///
    /// * `update` - The password change to apply
    pub async fn change_password(&self, update: PasswordUpdate) -> Result<(), Error> {
        // reject incomplete updates before any network call
        if update.current_password.is_empty() || update.new_password.is_empty() {
            return Err(Error::validation("both passwords are required"));
        }
        // build url for changing a password
        let url = format!("{}/api/auth/change-password", self.host);
        // build request with the current csrf token attached
        let req = self.attach_csrf(self.transport.raw().post(&url).json(&update));
        // send request
        self.transport.send(req, "auth_change_password").await?;
        // rotate csrf after a state changing request
        self.rotate_csrf().await?;
        Ok(())
    }

    /// Fetch a fresh csrf token storing it for later requests
    pub async fn rotate_csrf(&self) -> Result<CsrfToken, Error> {
        // build url for minting a csrf token
        let url = format!("{}/api/csrf", self.host);
        // build request
        let req = self.transport.raw().get(&url);
        // send request and build the token
        let token = send_build!(self.transport, req, "csrf", CsrfToken)?;
        // store the fresh token for later requests
        *self.csrf.lock().unwrap() = Some(token.clone());
        Ok(token)
    }

    /// Get the currently held csrf token if one exists
    #[must_use]
    pub fn current_csrf(&self) -> Option<CsrfToken> {
        self.csrf.lock().unwrap().clone()
    }

    /// Attach the current csrf token to a request if one is held
    ///
    /// # Arguments
    ///
    /// * `req` - The request to attach the token to
    pub(super) fn attach_csrf(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.current_csrf() {
            Some(token) => req
                .header("x-csrf-token", token.token)
                .header("x-client-id", token.client_id),
            None => req,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RetryPolicy;

    #[tokio::test]
    async fn key_file_logins_need_both_credentials() {
        let transport = Transport::new(&reqwest::Client::new(), RetryPolicy::default());
        let csrf: CsrfState = Arc::new(Mutex::new(None));
        let auth = Auth::new("http://127.0.0.1:9", &transport, &csrf);
        // a key file missing its password is rejected before any network call
        let keys = Keys {
            api: Some("http://127.0.0.1:9".to_owned()),
            username: Some("ahart".to_owned()),
            password: None,
            store: None,
        };
        let error = auth.login_keys(&keys).await.unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::Validation);
    }
}
