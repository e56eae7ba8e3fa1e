//! Wrappers for interacting with users within EventCall

use chrono::prelude::*;

use super::InvalidEnum;

/// The roles a user can have
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// A user can create and manage their own events
    User,
    /// An admin can see and manage all events
    Admin,
}

impl Default for UserRole {
    /// Create a default user role of user
    fn default() -> Self {
        UserRole::User
    }
}

impl std::fmt::Display for UserRole {
    /// Cleanly print a user role
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            UserRole::User => write!(f, "user"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = InvalidEnum;

    /// Convert this str to a [`UserRole`]
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "user" => Ok(UserRole::User),
            "admin" => Ok(UserRole::Admin),
            _ => Err(InvalidEnum(format!("Unknown UserRole: {raw}"))),
        }
    }
}

/// An organizer account in EventCall
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    /// The unique id for this user
    pub id: String,
    /// The unique lowercase username for this user
    pub username: String,
    /// The display name for this user
    pub name: String,
    /// This users email
    pub email: String,
    /// The service branch this user belongs to if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// The rank of this user if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<String>,
    /// The role of this user
    #[serde(default)]
    pub role: UserRole,
    /// When this user was created
    pub created: DateTime<Utc>,
}

/// Data needed to register a user
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserCreate {
    /// The username of the user
    pub username: String,
    /// The password for the user
    pub password: String,
    /// The display name for the user
    pub name: String,
    /// This users email
    pub email: String,
    /// The service branch this user belongs to if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// The rank of this user if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<String>,
}

impl UserCreate {
    /// Create a [`UserCreate`] object
    ///
    /// Usernames are unique in their lowercase form so the username is
    /// lowercased here.
    ///
    /// # Arguments
    ///
    /// * `username` - The username of the user to create
    /// * `password` - The new users password
    /// * `name` - The display name for this user
    /// * `email` - An email address for this user
    ///
    /// # Examples
    ///
    /// ```
    /// use eventcall::models::UserCreate;
    ///
    /// UserCreate::new("AHart", "hunter2", "Alice Hart", "alice@example.com");
    /// ```
    pub fn new<U, P, N, E>(username: U, password: P, name: N, email: E) -> Self
    where
        U: Into<String>,
        P: Into<String>,
        N: Into<String>,
        E: Into<String>,
    {
        UserCreate {
            username: username.into().to_lowercase(),
            password: password.into(),
            name: name.into(),
            email: email.into(),
            branch: None,
            rank: None,
        }
    }

    /// Set the service branch for this user
    ///
    /// # Arguments
    ///
    /// * `branch` - The branch to set
    #[must_use]
    pub fn branch<B: Into<String>>(mut self, branch: B) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Set the rank for this user
    ///
    /// # Arguments
    ///
    /// * `rank` - The rank to set
    #[must_use]
    pub fn rank<R: Into<String>>(mut self, rank: R) -> Self {
        self.rank = Some(rank.into());
        self
    }
}

/// The updatable fields on a user profile
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct UserUpdate {
    /// The username of the user to update
    pub username: String,
    /// A new display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// A new email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// A new service branch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// A new rank
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<String>,
}

impl UserUpdate {
    /// Create an empty update for a user
    ///
    /// # Arguments
    ///
    /// * `username` - The username of the user to update
    pub fn new<U: Into<String>>(username: U) -> Self {
        UserUpdate {
            username: username.into().to_lowercase(),
            ..Default::default()
        }
    }

    /// Set a new display name
    #[must_use]
    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set a new email
    #[must_use]
    pub fn email<E: Into<String>>(mut self, email: E) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Check if this update actually changes anything
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.branch.is_none() && self.rank.is_none()
    }
}

/// The data needed to change a users password
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PasswordUpdate {
    /// The username of the user changing their password
    pub username: String,
    /// The current password to prove we hold the account
    pub current_password: String,
    /// The new password to set
    pub new_password: String,
}

/// Response to a sucessful auth
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthResponse {
    /// Whether auth succeeded
    pub success: bool,
    /// The authenticated user
    pub user: User,
}

/// The wire shape users list under
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserList {
    /// The users in this listing
    pub users: Vec<User>,
}

/// The wire shape a single user answers under
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserResponse {
    /// The requested user
    pub user: User,
}

/// A csrf token minted by the backend
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CsrfToken {
    /// The client id this token is bound to
    pub client_id: String,
    /// The token itself
    pub token: String,
    /// When this token expires
    pub expires: DateTime<Utc>,
}
