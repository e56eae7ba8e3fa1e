//! An error from the EventCall client

use reqwest::StatusCode;

/// The broad categories of failure the client can surface to a user
///
/// These are the categories the loading state manager classifies into
/// short user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request never reached the server
    Network,
    /// The server told us to slow down
    RateLimited,
    /// We are not logged in or our session is no longer valid
    Authentication,
    /// We are logged in but not allowed to do this
    Authorization,
    /// The target resource does not exist
    NotFound,
    /// An optimistic lock or duplicate submission conflict
    Conflict,
    /// The input was rejected locally before any network call
    Validation,
    /// The server failed
    Server,
    /// The request or a wait gate timed out
    Timeout,
    /// The backend this operation needs is not configured
    Unavailable,
}

impl std::fmt::Display for ErrorKind {
    /// Print an error kind as its lowercase wire name
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Network => "network",
            ErrorKind::RateLimited => "rate-limited",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Authorization => "authorization",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation",
            ErrorKind::Server => "server",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unavailable => "unavailable",
        };
        write!(f, "{name}")
    }
}

/// An error from the EventCall client
#[derive(Debug)]
pub enum Error {
    /// An error reported by the EventCall API or the content store
    Api {
        /// The status code the server answered with
        code: StatusCode,
        /// The error message from the response body if one was sent
        msg: Option<String>,
        /// How many seconds the server asked us to wait before retrying
        retry_after: Option<u64>,
    },
    /// A generic error with a message
    Generic(String),
    /// An input was rejected before any network call was made
    Validation(String),
    /// An optimistic lock write lost the race for a blob
    Conflict(String),
    /// The operation needs a backend that is not configured
    Unavailable(String),
    /// A wait gate or request hit its time ceiling
    Timeout(String),
    /// An error from sending or recieving a request
    Reqwest(reqwest::Error),
    /// An IO Error
    IO(std::io::Error),
    /// An error from converting a value with serde
    Serde(serde_json::Error),
    /// An error from converting a value with serde to YAML
    SerdeYaml(serde_yaml::Error),
    /// An error from loading a config
    Config(config::ConfigError),
    /// An error from parsing a URL
    UrlParse(url::ParseError),
    /// An error from converting a type to a Uuid
    Uuid(uuid::Error),
    /// An error from parsing a timestamp/date
    ChronoParse(chrono::ParseError),
    /// An error from decoding base64 data
    Base64(base64::DecodeError),
    /// An error casting bytes to a utf8 formatted string
    StringFromUtf8(std::string::FromUtf8Error),
    /// An error from sealing or opening a spool entry
    Seal(String),
}

impl Error {
    /// Create a new generic error
    ///
    /// # Arguments
    ///
    /// * `msg` - The error message to set
    pub fn new<T: Into<String>>(msg: T) -> Self {
        Error::Generic(msg.into())
    }

    /// Create a new validation error
    ///
    /// # Arguments
    ///
    /// * `msg` - The reason this input was rejected
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Error::Validation(msg.into())
    }

    /// Get the status code from this error if one exists
    pub fn status(&self) -> Option<StatusCode> {
        // get the status code from any error types that support it
        match self {
            Error::Api { code, .. } => Some(code.to_owned()),
            Error::Reqwest(err) => err.status(),
            _ => None,
        }
    }

    /// Get the error message for this error if one exists
    pub fn msg(&self) -> Option<String> {
        // get the msg from any error types that support it
        match self {
            Error::Api { msg, .. } => msg.clone(),
            Error::Generic(msg) => Some(msg.clone()),
            Error::Validation(msg) => Some(msg.clone()),
            Error::Conflict(msg) => Some(msg.clone()),
            Error::Unavailable(msg) => Some(msg.clone()),
            Error::Timeout(msg) => Some(msg.clone()),
            Error::Reqwest(err) => Some(err.to_string()),
            Error::IO(err) => Some(err.to_string()),
            Error::Serde(err) => Some(err.to_string()),
            Error::SerdeYaml(err) => Some(err.to_string()),
            Error::Config(err) => Some(err.to_string()),
            Error::UrlParse(err) => Some(err.to_string()),
            Error::Uuid(err) => Some(err.to_string()),
            Error::ChronoParse(err) => Some(err.to_string()),
            Error::Base64(err) => Some(err.to_string()),
            Error::StringFromUtf8(err) => Some(err.to_string()),
            Error::Seal(msg) => Some(msg.clone()),
        }
    }

    /// Get the broad category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Api { code, .. } => kind_from_status(*code),
            Error::Validation(_) => ErrorKind::Validation,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Unavailable(_) => ErrorKind::Unavailable,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Reqwest(err) => {
                // a timed out request is its own category
                if err.is_timeout() {
                    ErrorKind::Timeout
                } else if let Some(code) = err.status() {
                    kind_from_status(code)
                } else {
                    // anything else from reqwest means we never got an answer
                    ErrorKind::Network
                }
            }
            // everything else is a client side failure we surface as a server error
            _ => ErrorKind::Server,
        }
    }

    /// Whether a retry could plausibly succeed for this error
    ///
    /// Validation and auth failures never clear on retry so don't retry them.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Network
                | ErrorKind::Server
                | ErrorKind::Timeout
                | ErrorKind::RateLimited
                | ErrorKind::Conflict
        )
    }

    /// Get the number of seconds the server asked us to wait if it did
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Error::Api { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Map an http status code onto an [`ErrorKind`]
///
/// # Arguments
///
/// * `code` - The status code to map
fn kind_from_status(code: StatusCode) -> ErrorKind {
    match code {
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimited,
        StatusCode::UNAUTHORIZED => ErrorKind::Authentication,
        StatusCode::FORBIDDEN => ErrorKind::Authorization,
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => ErrorKind::Conflict,
        StatusCode::BAD_REQUEST => ErrorKind::Validation,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ErrorKind::Timeout,
        code if code.is_server_error() => ErrorKind::Server,
        _ => ErrorKind::Server,
    }
}

/// The error body shape the EventCall API answers failures with
#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    /// The error message
    error: String,
    /// How many seconds to wait before trying again
    #[serde(rename = "retryAfter")]
    retry_after: Option<u64>,
}

impl Error {
    /// Build an error from a failed response consuming its body
    ///
    /// # Arguments
    ///
    /// * `resp` - The failed response to build an error from
    pub async fn from_response(resp: reqwest::Response) -> Self {
        // save the status code before we consume the body
        let code = resp.status();
        // try to read the body as text
        let text = resp.text().await.ok().filter(|body| !body.is_empty());
        // try to parse the structured error shape the api uses
        match text.as_deref().map(serde_json::from_str::<ApiErrorBody>) {
            Some(Ok(body)) => Error::Api {
                code,
                msg: Some(body.error),
                retry_after: body.retry_after,
            },
            // fall back to the raw body when its not the structured shape
            _ => Error::Api {
                code,
                msg: text,
                retry_after: None,
            },
        }
    }
}

impl std::fmt::Display for Error {
    /// display this error in a easy readble format
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match (self.status(), self.msg()) {
            (Some(code), Some(msg)) => write!(f, "Code: {} Error: {}", code, msg),
            (None, Some(msg)) => write!(f, "Error: {}", msg),
            (Some(code), None) => write!(f, "Code: {}", code),
            (None, None) => write!(f, "Kind: {}", self.kind()),
        }
    }
}

// mark that this is an error struct
impl std::error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Error::Reqwest(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::IO(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serde(error)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Error::SerdeYaml(error)
    }
}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Error::Config(error)
    }
}

impl From<url::ParseError> for Error {
    fn from(error: url::ParseError) -> Self {
        Error::UrlParse(error)
    }
}

impl From<uuid::Error> for Error {
    fn from(error: uuid::Error) -> Self {
        Error::Uuid(error)
    }
}

impl From<chrono::ParseError> for Error {
    fn from(error: chrono::ParseError) -> Self {
        Error::ChronoParse(error)
    }
}

impl From<base64::DecodeError> for Error {
    fn from(error: base64::DecodeError) -> Self {
        Error::Base64(error)
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(error: std::string::FromUtf8Error) -> Self {
        Error::StringFromUtf8(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_from_status() {
        // each interesting status code should land in the right category
        let cases = [
            (StatusCode::TOO_MANY_REQUESTS, ErrorKind::RateLimited),
            (StatusCode::UNAUTHORIZED, ErrorKind::Authentication),
            (StatusCode::FORBIDDEN, ErrorKind::Authorization),
            (StatusCode::NOT_FOUND, ErrorKind::NotFound),
            (StatusCode::CONFLICT, ErrorKind::Conflict),
            (StatusCode::BAD_REQUEST, ErrorKind::Validation),
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Server),
            (StatusCode::SERVICE_UNAVAILABLE, ErrorKind::Server),
            (StatusCode::GATEWAY_TIMEOUT, ErrorKind::Timeout),
        ];
        for (code, kind) in cases {
            let error = Error::Api {
                code,
                msg: None,
                retry_after: None,
            };
            assert_eq!(error.kind(), kind);
        }
    }

    #[test]
    fn validation_is_not_retryable() {
        assert!(!Error::validation("bad email").is_retryable());
        assert!(Error::Conflict("lost the write race".to_owned()).is_retryable());
    }
}
