//! The shareable invite payload and its url encodings
//!
//! Invite links carry an events public fields as a `data=` query param so a
//! guest can render the invite without hitting the backend. New links carry
//! url encoded JSON; legacy links carry base64 JSON and are still accepted
//! on decode.

use base64::Engine as _;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::collections::HashMap;

use super::events::{Event, EventFlags, Question};
use crate::Error;

/// The characters to percent encode in a query param value
const QUERY_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'=')
    .add(b'{')
    .add(b'}');

/// The public fields of an event carried inside an invite link
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InvitePayload {
    /// The id of the event this invite is for
    pub id: String,
    /// The title of the event
    pub title: String,
    /// The calendar date the event happens on
    pub date: chrono::NaiveDate,
    /// The wall clock time the event starts at
    pub time: chrono::NaiveTime,
    /// Where the event happens
    pub location: String,
    /// The description shown on the invite
    #[serde(default)]
    pub description: String,
    /// The cover image url if one is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    /// The toggles set on the event
    #[serde(default)]
    pub flags: EventFlags,
    /// The custom questions on the event
    #[serde(default)]
    pub questions: Vec<Question>,
    /// Freeform detail fields shown on the invite
    #[serde(default)]
    pub details: HashMap<String, String>,
    /// The invite template the event renders with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl From<&Event> for InvitePayload {
    /// Pull the public fields out of an event
    fn from(event: &Event) -> Self {
        InvitePayload {
            id: event.id.clone(),
            title: event.title.clone(),
            date: event.date,
            time: event.time,
            location: event.location.clone(),
            description: event.description.clone(),
            cover_image_url: event.cover_image_url.clone(),
            flags: event.flags,
            questions: event.questions.clone(),
            details: event.details.clone(),
            template: event.template.clone(),
        }
    }
}

impl InvitePayload {
    /// Encode this payload for a `data=` query param
    pub fn encode(&self) -> Result<String, Error> {
        // serialize to json then percent encode for the query string
        let json = serde_json::to_string(self)?;
        Ok(utf8_percent_encode(&json, QUERY_SET).to_string())
    }

    /// Decode a payload from a `data=` query param value
    ///
    /// Url encoded JSON is tried first; base64 JSON is accepted for legacy
    /// links.
    ///
    /// # Arguments
    ///
    /// * `raw` - The query param value to decode
    pub fn decode(raw: &str) -> Result<Self, Error> {
        // the url layer may already have decoded the param for us
        if let Ok(payload) = serde_json::from_str::<InvitePayload>(raw) {
            return Ok(payload);
        }
        // try percent decoding before parsing
        if let Ok(decoded) = percent_encoding::percent_decode_str(raw).decode_utf8() {
            if let Ok(payload) = serde_json::from_str::<InvitePayload>(&decoded) {
                return Ok(payload);
            }
        }
        // fall back to the legacy base64 encoding
        let bytes = base64::engine::general_purpose::STANDARD.decode(raw.trim())?;
        let json = String::from_utf8(bytes)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Build the shareable invite url for this payload
    ///
    /// # Arguments
    ///
    /// * `origin` - The origin the app is hosted at
    /// * `base_path` - The base path under that origin
    pub fn invite_url(&self, origin: &str, base_path: &str) -> Result<String, Error> {
        let data = self.encode()?;
        Ok(format!(
            "{}{}?data={}#invite/{}",
            origin.trim_end_matches('/'),
            base_path,
            data,
            self.id
        ))
    }
}

/// Append the edit credentials to an invite url
///
/// # Arguments
///
/// * `invite_url` - The invite url to extend
/// * `rsvp_id` - The RSVP the edit link targets
/// * `edit_token` - The secret that authorizes the edit
#[must_use]
pub fn edit_url(invite_url: &str, rsvp_id: &uuid::Uuid, edit_token: &str) -> String {
    // the edit params ride the query string ahead of the fragment
    match invite_url.split_once('#') {
        Some((head, fragment)) => {
            format!("{head}&edit={edit_token}&rsvpId={rsvp_id}#{fragment}")
        }
        None => format!("{invite_url}&edit={edit_token}&rsvpId={rsvp_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    /// Build a payload for tests
    fn sample() -> InvitePayload {
        InvitePayload {
            id: "E1".to_owned(),
            title: "Dining Out & Awards".to_owned(),
            date: NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
            time: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
            location: "Fort Harmon Club".to_owned(),
            description: "Formal attire; see détails".to_owned(),
            cover_image_url: None,
            flags: EventFlags::default(),
            questions: Vec::new(),
            details: HashMap::new(),
            template: None,
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let payload = sample();
        let encoded = payload.encode().unwrap();
        // the encoded form is safe to carry in a query param
        assert!(!encoded.contains(' '));
        assert!(!encoded.contains('&'));
        let decoded = InvitePayload::decode(&encoded).unwrap();
        assert_eq!(decoded.id, payload.id);
        assert_eq!(decoded.title, payload.title);
        assert_eq!(decoded.description, payload.description);
    }

    #[test]
    fn legacy_base64_links_still_decode() {
        let payload = sample();
        let json = serde_json::to_string(&payload).unwrap();
        let legacy = base64::engine::general_purpose::STANDARD.encode(json);
        let decoded = InvitePayload::decode(&legacy).unwrap();
        assert_eq!(decoded.id, payload.id);
        assert_eq!(decoded.location, payload.location);
    }

    #[test]
    fn edit_url_rides_the_query_string() {
        let payload = sample();
        let invite = payload
            .invite_url("https://hart.github.io", "/eventcall/")
            .unwrap();
        let rsvp_id = uuid::Uuid::new_v4();
        let edit = edit_url(&invite, &rsvp_id, "tok123");
        // the edit params must land before the fragment
        let (head, fragment) = edit.split_once('#').unwrap();
        assert!(head.contains("&edit=tok123"));
        assert!(head.contains(&format!("&rsvpId={rsvp_id}")));
        assert_eq!(fragment, "invite/E1");
    }
}
