//! The images handler for the EventCall client

use super::auth::Auth;
use super::store::safe_image_name;
use super::transport::Transport;
use super::Error;
use crate::models::images::{ImageUpload, Photo, PhotoDelete};
use crate::send_build;

/// images handler for the EventCall client
#[derive(Clone)]
pub struct Images {
    /// url/ip of the EventCall api
    host: String,
    /// The transport to send requests through
    transport: Transport,
    /// The auth handler for csrf tokens
    auth: Auth,
}

impl Images {
    /// Creates a new images handler
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
        // build images route handler
        Images {
            host: host.to_owned(),
            transport: transport.clone(),
            auth: auth.clone(),
        }
    }

    /// Upload a photo for an event
    ///
    /// # Arguments
    ///
    /// * `upload` - The photo upload to send
    pub async fn upload(&self, upload: ImageUpload) -> Result<Photo, Error> {
        // reject filenames we would refuse to delete later
        if safe_image_name(&upload.file_name).is_none() {
            return Err(Error::validation(
                "image filename must be plain with a recognized extension",
            ));
        }
        if upload.event_id.is_empty() {
            return Err(Error::validation("an event id is required"));
        }
        // build url for uploading a photo
        let url = format!("{}/api/images/upload", self.host);
        // build request with the current csrf token attached
        let req = self
            .auth
            .attach_csrf(self.transport.raw().post(&url).json(&upload));
        // send request and build the stored photo
        send_build!(self.transport, req, "images_upload", Photo)
    }

    /// List the photos attached to an event
    ///
    /// # Arguments
    ///
    /// * `event_id` - The event to list photos for
    pub async fn list(&self, event_id: &str) -> Result<Vec<Photo>, Error> {
        // build url for listing photos
        let url = format!("{}/api/events/{}/photos", self.host, event_id);
        // build request
        let req = self.transport.raw().get(&url);
        // send request and build the listing
        send_build!(self.transport, req, "images_list", Vec<Photo>)
    }

    /// Delete a photo by its storage path
    ///
    /// # Arguments
    ///
    /// * `storage_path` - The path of the photo to delete
    pub async fn delete(&self, storage_path: &str) -> Result<(), Error> {
        // build the delete body
        let body = PhotoDelete {
            storage_path: storage_path.to_owned(),
        };
        // build url for deleting a photo
        let url = format!("{}/api/photos", self.host);
        // build request with the current csrf token attached
        let req = self
            .auth
            .attach_csrf(self.transport.raw().delete(&url).json(&body));
        // send request
        self.transport.send(req, "images_delete").await?;
        Ok(())
    }
}
