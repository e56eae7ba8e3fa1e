//! The git-contents fallback store for EventCall
//!
//! When the primary backend is unreachable the client persists JSON blobs
//! straight into a git hosted content repo over its contents api. Every blob
//! carries an opaque version tag; writes assert the tag they read and fail
//! with a conflict when another writer got there first.

use base64::Engine as _;
use percent_encoding::percent_decode_str;

use super::transport::Transport;
use super::Error;
use crate::send_build;

/// The image extensions we will agree to delete
const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "webp", "svg", "bmp"];

/// A blob in the content repo with its current version tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// The path of this blob under the repo root
    pub path: String,
    /// The opaque version tag for the blob currently at this path
    pub version: String,
}

/// The recursive tree listing the contents api answers with
#[derive(Deserialize, Debug)]
struct TreeResponse {
    /// The nodes in this tree
    tree: Vec<TreeNode>,
}

/// A single node in a tree listing
#[derive(Deserialize, Debug)]
struct TreeNode {
    /// The path of this node
    path: String,
    /// The version tag of this node
    sha: String,
    /// Whether this node is a blob or a subtree
    #[serde(rename = "type")]
    kind: String,
}

/// A blob body fetched by version tag
#[derive(Deserialize, Debug)]
struct BlobResponse {
    /// The base64 encoded content of this blob
    content: String,
}

/// The body sent when writing a blob
#[derive(Serialize, Debug)]
struct WritePayload<'a> {
    /// The commit message for this write
    message: &'a str,
    /// The base64 encoded content to write
    content: String,
    /// The branch to write on
    branch: &'a str,
    /// The version tag we expect the current blob to carry
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

/// The body sent when deleting a blob
#[derive(Serialize, Debug)]
struct DeletePayload<'a> {
    /// The commit message for this delete
    message: &'a str,
    /// The version tag of the blob we are deleting
    sha: &'a str,
    /// The branch to delete on
    branch: &'a str,
}

/// The response to a blob write
#[derive(Deserialize, Debug)]
struct WriteResponse {
    /// Info about the written blob
    content: Option<WrittenContent>,
}

/// Info about a blob after a write
#[derive(Deserialize, Debug)]
struct WrittenContent {
    /// The version tag of the newly written blob
    sha: String,
    /// The public url this blob can be fetched at
    download_url: Option<String>,
}

/// A client for the git hosted content repo
#[derive(Clone)]
pub struct ContentStore {
    /// The root url of the content repo api
    root: String,
    /// The branch to read and write blobs on
    branch: String,
    /// The transport to send requests through
    transport: Transport,
}

impl ContentStore {
    /// Create a new content store client
    ///
    /// # Arguments
    ///
    /// * `root` - The root url of the content repo api
    /// * `branch` - The branch to read and write blobs on
    /// * `transport` - The transport to send requests through
    #[must_use]
    pub fn new(root: &str, branch: &str, transport: Transport) -> Self {
        ContentStore {
            root: root.trim_end_matches('/').to_owned(),
            branch: branch.to_owned(),
            transport,
        }
    }

    /// List every blob in the content repo with its version tag
    ///
    /// A missing branch or empty repo lists as no blobs rather than an error.
    pub async fn read_tree(&self) -> Result<Vec<TreeEntry>, Error> {
        // build url for the recursive tree listing
        let url = format!("{}/git/trees/{}?recursive=1", self.root, self.branch);
        // build request
        let req = self.transport.raw().get(&url);
        // send request and build the listing
        let listing: TreeResponse = match send_build!(self.transport, req, "read_tree", TreeResponse)
        {
            Ok(listing) => listing,
            // absence is no data yet not an error
            Err(error) if error.kind() == crate::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };
        // keep only the blobs
        let entries = listing
            .tree
            .into_iter()
            .filter(|node| node.kind == "blob")
            .map(|node| TreeEntry {
                path: node.path,
                version: node.sha,
            })
            .collect();
        Ok(entries)
    }

    /// Read a blob body by its version tag
    ///
    /// Blobs are immutable under a tag so this is fetched by version and
    /// never by path.
    ///
    /// # Arguments
    ///
    /// * `version` - The version tag of the blob to read
    pub async fn read_blob(&self, version: &str) -> Result<Vec<u8>, Error> {
        // build url for fetching this blob
        let url = format!("{}/git/blobs/{}", self.root, version);
        // build request
        let req = self.transport.raw().get(&url);
        // send request and build the blob
        let blob = send_build!(self.transport, req, "read_blob", BlobResponse)?;
        // decode the base64 body
        decode_content(&blob.content)
    }

    /// Read the blob currently at a path along with its version tag
    ///
    /// # Arguments
    ///
    /// * `path` - The path to read
    pub async fn read_path(&self, path: &str) -> Result<Option<(Vec<u8>, String)>, Error> {
        // list the tree to find the current version at this path
        let tree = self.read_tree().await?;
        let Some(entry) = tree.into_iter().find(|entry| entry.path == path) else {
            return Ok(None);
        };
        // fetch the blob under that version tag
        let bytes = self.read_blob(&entry.version).await?;
        Ok(Some((bytes, entry.version)))
    }

    /// Write a blob asserting the version we expect to replace
    ///
    /// # Arguments
    ///
    /// * `path` - The path to write at
    /// * `bytes` - The blob body to write
    /// * `message` - The commit message for this write
    /// * `expected` - The version tag we expect the current blob to carry;
    ///   None means the path must not exist yet
    pub async fn write_blob(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
        expected: Option<&str>,
    ) -> Result<String, Error> {
        // build url for writing this blob
        let url = format!("{}/contents/{}", self.root, path);
        // build the write body
        let payload = WritePayload {
            message,
            content: encode_content(bytes),
            branch: &self.branch,
            sha: expected,
        };
        // build request
        let req = self.transport.raw().put(&url).json(&payload);
        // send request and build the write response
        let written = match send_build!(self.transport, req, "write_blob", WriteResponse) {
            Ok(written) => written,
            // a lost version race surfaces as a conflict the caller can retry
            Err(error) if error.kind() == crate::ErrorKind::Conflict => {
                return Err(Error::Conflict(format!(
                    "version tag moved under write of {path}"
                )))
            }
            Err(error) => return Err(error),
        };
        written
            .content
            .map(|content| content.sha)
            .ok_or_else(|| Error::new(format!("write of {path} returned no content")))
    }

    /// Delete the blob at a path asserting its version
    ///
    /// # Arguments
    ///
    /// * `path` - The path to delete
    /// * `message` - The commit message for this delete
    /// * `expected` - The version tag of the blob we are deleting
    pub async fn delete_blob(
        &self,
        path: &str,
        message: &str,
        expected: &str,
    ) -> Result<(), Error> {
        // build url for deleting this blob
        let url = format!("{}/contents/{}", self.root, path);
        // build the delete body
        let payload = DeletePayload {
            message,
            sha: expected,
            branch: &self.branch,
        };
        // build request
        let req = self.transport.raw().delete(&url).json(&payload);
        // send request
        match self.transport.send(req, "delete_blob").await {
            Ok(_) => Ok(()),
            Err(error) if error.kind() == crate::ErrorKind::Conflict => Err(Error::Conflict(
                format!("version tag moved under delete of {path}"),
            )),
            Err(error) => Err(error),
        }
    }

    /// Upload a binary blob returning the public url it can be fetched at
    ///
    /// # Arguments
    ///
    /// * `path` - The path to upload at
    /// * `bytes` - The binary body to upload
    /// * `message` - The commit message for this upload
    pub async fn upload_binary(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
    ) -> Result<String, Error> {
        // check whether something already sits at this path
        let expected = self.read_path(path).await?.map(|(_, version)| version);
        // build url for writing this blob
        let url = format!("{}/contents/{}", self.root, path);
        // build the write body
        let payload = WritePayload {
            message,
            content: encode_content(bytes),
            branch: &self.branch,
            sha: expected.as_deref(),
        };
        // build request
        let req = self.transport.raw().put(&url).json(&payload);
        // send request and build the write response
        let written = send_build!(self.transport, req, "upload_binary", WriteResponse)?;
        written
            .content
            .and_then(|content| content.download_url)
            .ok_or_else(|| Error::new(format!("upload of {path} returned no public url")))
    }

    /// Read, mutate and write a blob retrying lost version races
    ///
    /// The mutation closure gets the current blob body (None when the path
    /// does not exist yet) and returns the body to write. On a conflict the
    /// whole sequence restarts from a fresh read up to `bound` times.
    ///
    /// # Arguments
    ///
    /// * `path` - The path to update
    /// * `message` - The commit message for each write attempt
    /// * `bound` - How many version races to retry before giving up
    /// * `mutate` - The mutation to apply to the blob body
    pub async fn update_blob<F>(
        &self,
        path: &str,
        message: &str,
        bound: u32,
        mut mutate: F,
    ) -> Result<String, Error>
    where
        F: FnMut(Option<&[u8]>) -> Result<Vec<u8>, Error>,
    {
        let mut last = None;
        for round in 0..bound.max(1) {
            // read the current blob and capture its version tag
            let current = self.read_path(path).await?;
            let (bytes, expected) = match &current {
                Some((bytes, version)) => (Some(bytes.as_slice()), Some(version.as_str())),
                None => (None, None),
            };
            // apply the mutation in memory
            let mutated = mutate(bytes)?;
            // write asserting the version we read
            match self.write_blob(path, &mutated, message, expected).await {
                Ok(version) => return Ok(version),
                Err(error) if error.kind() == crate::ErrorKind::Conflict => {
                    tracing::debug!(path, round, "lost a version race, rereading");
                    last = Some(error);
                }
                Err(error) => return Err(error),
            }
        }
        Err(last.unwrap_or_else(|| Error::new(format!("update of {path} made no attempts"))))
    }
}

/// Build the blob path an event lives at
///
/// # Arguments
///
/// * `event_id` - The event to build a path for
#[must_use]
pub fn event_path(event_id: &str) -> String {
    format!("events/{event_id}.json")
}

/// Build the blob path an events responses live at
///
/// # Arguments
///
/// * `event_id` - The event to build a path for
#[must_use]
pub fn rsvps_path(event_id: &str) -> String {
    format!("rsvps/{event_id}.json")
}

/// Base64 encode a blob body for the wire
///
/// # Arguments
///
/// * `bytes` - The body to encode
pub fn encode_content(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode a base64 blob body from the wire
///
/// The contents api inserts newlines into long bodies so whitespace is
/// stripped before decoding.
///
/// # Arguments
///
/// * `raw` - The base64 body to decode
pub fn decode_content(raw: &str) -> Result<Vec<u8>, Error> {
    let stripped: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(stripped)?)
}

/// Extract a deletable image filename from a stored url
///
/// Returns None for anything that smells like traversal or carries an
/// unrecognized extension; callers skip the delete in that case and accept
/// the orphan.
///
/// # Arguments
///
/// * `url` - The stored image url to extract a filename from
pub fn safe_image_name(url: &str) -> Option<String> {
    // take the final path segment
    let raw = url.rsplit('/').next()?;
    // drop any query string or fragment riding on the segment
    let raw = raw.split(['?', '#']).next()?;
    // percent decode until the name stops changing so encoded traversal
    // can't hide behind double encoding
    let mut name = raw.to_owned();
    for _ in 0..3 {
        let decoded = percent_decode_str(&name).decode_utf8().ok()?.into_owned();
        if decoded == name {
            break;
        }
        name = decoded;
    }
    // reject anything that could escape the images directory
    if name.is_empty() || name.contains("..") || name.contains('/') || name.contains('\\') {
        return None;
    }
    // the extension must be one we recognize
    let (_, ext) = name.rsplit_once('.')?;
    if !IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
        return None;
    }
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_roundtrip_preserves_unicode() {
        let text = "Grüße 🎉 — こんにちは \u{10FFFF}";
        let encoded = encode_content(text.as_bytes());
        let decoded = decode_content(&encoded).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), text);
    }

    #[test]
    fn content_decode_ignores_wrapped_lines() {
        let encoded = encode_content(b"a long body that would wrap on the wire");
        // the contents api wraps bodies with newlines every 60 chars
        let wrapped = format!("{}\n{}", &encoded[..10], &encoded[10..]);
        assert_eq!(
            decode_content(&wrapped).unwrap(),
            b"a long body that would wrap on the wire"
        );
    }

    #[test]
    fn image_names_accept_valid_extensions() {
        let url = "https://raw.example.com/owner/repo/main/images/cover-1.PNG";
        assert_eq!(safe_image_name(url).as_deref(), Some("cover-1.PNG"));
        let url = "https://raw.example.com/owner/repo/main/images/photo.webp?token=abc";
        assert_eq!(safe_image_name(url).as_deref(), Some("photo.webp"));
    }

    #[test]
    fn image_names_reject_traversal() {
        // plain traversal
        assert_eq!(safe_image_name("https://x/images/..%2F..%2Fconf.yml"), None);
        // double encoded traversal
        assert_eq!(safe_image_name("https://x/images/%252e%252e%252fa.png"), None);
        // backslash smuggling
        assert_eq!(safe_image_name("https://x/images/a%5Cb.png"), None);
        // unrecognized extension
        assert_eq!(safe_image_name("https://x/images/payload.html"), None);
        // no extension at all
        assert_eq!(safe_image_name("https://x/images/noext"), None);
    }
}
