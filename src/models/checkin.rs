//! The payload encoded into event day check in QR codes

use chrono::prelude::*;
use uuid::Uuid;

/// The type tag every check in payload carries
pub const CHECKIN_TYPE: &str = "eventcall-checkin";

/// How long a check in payload stays valid after issuance
pub const CHECKIN_VALIDITY_HOURS: i64 = 48;

/// The payload encoded into a check in QR code
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CheckinPayload {
    /// The type tag so scanners can reject foreign QR codes
    #[serde(rename = "type")]
    pub kind: String,
    /// The event this check in is for
    pub event_id: String,
    /// The RSVP being checked in
    pub rsvp_id: Uuid,
    /// The check in token issued with the RSVP
    pub token: String,
    /// When this payload was issued
    pub timestamp: DateTime<Utc>,
}

impl CheckinPayload {
    /// Create a new check in payload stamped now
    ///
    /// # Arguments
    ///
    /// * `event_id` - The event this check in is for
    /// * `rsvp_id` - The RSVP being checked in
    /// * `token` - The check in token issued with the RSVP
    pub fn new<E: Into<String>, T: Into<String>>(event_id: E, rsvp_id: Uuid, token: T) -> Self {
        CheckinPayload {
            kind: CHECKIN_TYPE.to_owned(),
            event_id: event_id.into(),
            rsvp_id,
            token: token.into(),
            timestamp: Utc::now(),
        }
    }

    /// Check whether this payload is still valid at an instant
    ///
    /// Payloads expire 48 hours after issuance.
    ///
    /// # Arguments
    ///
    /// * `now` - The instant to check validity at
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        // reject foreign payload types outright
        if self.kind != CHECKIN_TYPE {
            return false;
        }
        let age = now.signed_duration_since(self.timestamp);
        age >= chrono::Duration::zero() && age < chrono::Duration::hours(CHECKIN_VALIDITY_HOURS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_window_is_48_hours() {
        let mut payload = CheckinPayload::new("E1", Uuid::new_v4(), "tok");
        let issued = Utc.with_ymd_and_hms(2026, 10, 17, 18, 0, 0).unwrap();
        payload.timestamp = issued;
        // 47h59m old is still accepted
        let almost = issued + chrono::Duration::hours(47) + chrono::Duration::minutes(59);
        assert!(payload.is_valid(almost));
        // 48h old is rejected
        let expired = issued + chrono::Duration::hours(48);
        assert!(!payload.is_valid(expired));
        // payloads from the future are rejected too
        let before = issued - chrono::Duration::minutes(1);
        assert!(!payload.is_valid(before));
    }

    #[test]
    fn foreign_types_are_rejected() {
        let mut payload = CheckinPayload::new("E1", Uuid::new_v4(), "tok");
        payload.kind = "other-app-checkin".to_owned();
        assert!(!payload.is_valid(Utc::now()));
    }

    #[test]
    fn wire_shape_uses_camel_case() {
        let payload = CheckinPayload::new("E1", Uuid::new_v4(), "tok");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], CHECKIN_TYPE);
        assert!(json.get("eventId").is_some());
        assert!(json.get("rsvpId").is_some());
    }
}
