//! Wrappers for event photos within EventCall

use chrono::prelude::*;

/// The data needed to upload an event photo
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ImageUpload {
    /// The filename to store this photo under
    pub file_name: String,
    /// The base64 encoded photo body
    pub content_base64: String,
    /// The event this photo belongs to
    pub event_id: String,
    /// A caption for this photo if one was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Freeform tags on this photo
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl ImageUpload {
    /// Create a new [`ImageUpload`] object
    ///
    /// # Arguments
    ///
    /// * `file_name` - The filename to store this photo under
    /// * `bytes` - The raw photo body
    /// * `event_id` - The event this photo belongs to
    pub fn new<F: Into<String>, E: Into<String>>(file_name: F, bytes: &[u8], event_id: E) -> Self {
        ImageUpload {
            file_name: file_name.into(),
            content_base64: crate::client::store::encode_content(bytes),
            event_id: event_id.into(),
            caption: None,
            tags: Vec::default(),
        }
    }

    /// Set a caption on this photo
    ///
    /// # Arguments
    ///
    /// * `caption` - The caption to set
    #[must_use]
    pub fn caption<C: Into<String>>(mut self, caption: C) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// Add a tag to this photo
    ///
    /// # Arguments
    ///
    /// * `tag` - The tag to add
    #[must_use]
    pub fn tag<T: Into<String>>(mut self, tag: T) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// A photo attached to an event
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Photo {
    /// The public url this photo can be fetched at
    pub url: String,
    /// The path this photo is stored under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    /// A caption for this photo if one was given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Freeform tags on this photo
    #[serde(default)]
    pub tags: Vec<String>,
    /// When this photo was uploaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded: Option<DateTime<Utc>>,
}

/// The body sent when deleting a photo
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PhotoDelete {
    /// The path of the photo to delete
    pub storage_path: String,
}
