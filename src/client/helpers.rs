//! Helpers shared by the EventCall route handlers

use super::{ClientSettings, Error};

/// Build a reqwest client for EventCall
///
/// # Arguments
///
/// * `settings` - The settings for building a client
pub(super) fn build_reqwest_client(settings: &ClientSettings) -> Result<reqwest::Client, Error> {
    // start building our client
    let builder = reqwest::Client::builder()
        .no_proxy()
        .timeout(std::time::Duration::from_secs(settings.timeout));
    // build our client
    Ok(builder.build()?)
}

/// Send a request through the retrying transport
#[doc(hidden)]
#[macro_export]
macro_rules! send {
    ($transport:expr, $req:expr, $endpoint:expr) => {
        // send this request through the retry layer
        $transport.send($req, $endpoint).await
    };
}

/// Send a request through the retrying transport and build a type from its body
#[doc(hidden)]
#[macro_export]
macro_rules! send_build {
    ($transport:expr, $req:expr, $endpoint:expr, $build:ty) => {
        // send this request through the retry layer
        match $transport.send($req, $endpoint).await {
            // attempt to build this response or return an error
            Ok(resp) => match resp.json::<$build>().await {
                // successfully built object
                Ok(val) => Ok(val),
                // failed to build object create error
                Err(e) => Err(Error::from(e)),
            },
            Err(e) => Err(e),
        }
    };
}

/// Adds a query param if it not None
#[doc(hidden)]
#[macro_export]
macro_rules! add_query {
    ($vec:expr, $key:expr, $value:expr) => {
        if let Some(value) = &$value {
            $vec.push(($key, value.to_string()));
        }
    };
}

/// Adds a query param if its true
#[doc(hidden)]
#[macro_export]
macro_rules! add_query_bool {
    ($vec:expr, $key:expr, $value:expr) => {
        if $value {
            $vec.push(($key, "true".to_string()));
        }
    };
}
