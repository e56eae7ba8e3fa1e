//! Wrappers for interacting with RSVPs within EventCall

use chrono::prelude::*;
use std::collections::HashMap;
use uuid::Uuid;

use super::events::Answer;
use super::InvalidEnum;

/// A guests response to an event invite
///
/// Within an event the natural key is `(event_id, lowercase email)`; at most
/// one active RSVP exists per pair.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Rsvp {
    /// The unique id for this RSVP
    pub id: Uuid,
    /// The event this RSVP answers
    pub event_id: String,
    /// The guests name
    pub name: String,
    /// The guests email normalized to lowercase
    pub email: String,
    /// The guests phone number if given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Whether the guest is attending
    pub attending: bool,
    /// How many extra guests they are bringing
    #[serde(default)]
    pub guest_count: u8,
    /// Why the guest declined if they gave a reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// The guests service branch if given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// The guests rank if given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<String>,
    /// The guests unit if given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// The dietary restrictions the guest listed
    #[serde(default)]
    pub dietary: Vec<String>,
    /// Freeform allergy notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allergies: Option<String>,
    /// Answers to the events custom questions keyed by question id
    #[serde(default)]
    pub answers: HashMap<String, Answer>,
    /// When this RSVP was submitted
    pub timestamp: DateTime<Utc>,
    /// The token used for event day check in; only issued when attending
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_in_token: Option<String>,
    /// The secret that authorizes edits to this RSVP; immutable once issued
    pub edit_token: String,
    /// Whether this submission updated an earlier RSVP
    #[serde(default)]
    pub is_update: bool,
    /// When this RSVP was last modified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl Rsvp {
    /// Create a new RSVP with a fresh identity
    ///
    /// The email is normalized to lowercase and an edit token is minted. A
    /// check in token is only minted when the guest is attending.
    ///
    /// # Arguments
    ///
    /// * `event_id` - The event this RSVP answers
    /// * `name` - The guests name
    /// * `email` - The guests email
    /// * `attending` - Whether the guest is attending
    #[must_use]
    pub fn new<E, N, M>(event_id: E, name: N, email: M, attending: bool) -> Self
    where
        E: Into<String>,
        N: Into<String>,
        M: Into<String>,
    {
        Rsvp {
            id: Uuid::new_v4(),
            event_id: event_id.into(),
            name: name.into(),
            email: email.into().to_lowercase(),
            phone: None,
            attending,
            guest_count: 0,
            reason: None,
            branch: None,
            rank: None,
            unit: None,
            dietary: Vec::default(),
            allergies: None,
            answers: HashMap::default(),
            timestamp: Utc::now(),
            check_in_token: attending.then(|| Uuid::new_v4().simple().to_string()),
            edit_token: Uuid::new_v4().simple().to_string(),
            is_update: false,
            last_modified: None,
        }
    }

    /// Get the natural key for this RSVP within its event
    #[must_use]
    pub fn natural_key(&self) -> (&str, String) {
        (&self.event_id, self.email.to_lowercase())
    }
}

/// How a submission reached persistence
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionMethod {
    /// The primary REST backend accepted it
    #[serde(rename = "backend")]
    Backend,
    /// It was written straight into the content store
    #[serde(rename = "direct-store")]
    DirectStore,
    /// It only made it into the local spool
    #[serde(rename = "local-spool")]
    LocalSpool,
}

impl std::fmt::Display for SubmissionMethod {
    /// Cleanly print a submission method
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SubmissionMethod::Backend => write!(f, "backend"),
            SubmissionMethod::DirectStore => write!(f, "direct-store"),
            SubmissionMethod::LocalSpool => write!(f, "local-spool"),
        }
    }
}

impl std::str::FromStr for SubmissionMethod {
    type Err = InvalidEnum;

    /// Convert this str to a [`SubmissionMethod`]
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "backend" => Ok(SubmissionMethod::Backend),
            "direct-store" => Ok(SubmissionMethod::DirectStore),
            "local-spool" => Ok(SubmissionMethod::LocalSpool),
            _ => Err(InvalidEnum(format!("Unknown SubmissionMethod: {raw}"))),
        }
    }
}

/// An RSVP plus the metadata the pipeline stamps onto it
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubmissionEnvelope {
    /// The RSVP being submitted
    pub rsvp: Rsvp,
    /// A non cryptographic integrity tag for dedup and audit
    pub validation_hash: String,
    /// How this submission reached (or failed to reach) persistence
    pub method: SubmissionMethod,
    /// The csrf token attached to this submission if one is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf: Option<String>,
    /// The captcha token attached to this submission if one is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captcha: Option<String>,
}

impl SubmissionEnvelope {
    /// Wrap an RSVP stamping its integrity hash
    ///
    /// # Arguments
    ///
    /// * `rsvp` - The RSVP to wrap
    /// * `method` - How this submission is reaching persistence
    #[must_use]
    pub fn new(rsvp: Rsvp, method: SubmissionMethod) -> Self {
        let validation_hash = validation_hash(&rsvp.event_id, &rsvp.email, &rsvp.timestamp);
        SubmissionEnvelope {
            rsvp,
            validation_hash,
            method,
            csrf: None,
            captcha: None,
        }
    }
}

/// Stamp a stable integrity hash for a submission
///
/// This is FNV-1a over the event id, lowercased email and timestamp. It is
/// an integrity tag for dedup and audit, not authentication.
///
/// # Arguments
///
/// * `event_id` - The event being answered
/// * `email` - The submitting guests email
/// * `timestamp` - When the submission was stamped
#[must_use]
pub fn validation_hash(event_id: &str, email: &str, timestamp: &DateTime<Utc>) -> String {
    // fnv-1a 64 bit offset basis and prime
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let joined = format!(
        "{}|{}|{}",
        event_id,
        email.to_lowercase(),
        timestamp.to_rfc3339()
    );
    let mut hash = OFFSET;
    for byte in joined.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    format!("{hash:016x}")
}

/// The params for listing RSVPs
#[derive(Debug, Default, Clone)]
pub struct RsvpListParams {
    /// List the RSVPs for a single event
    pub event_id: Option<String>,
    /// List the RSVPs for a batch of events
    pub event_ids: Vec<String>,
}

impl RsvpListParams {
    /// List the RSVPs for a single event
    ///
    /// # Arguments
    ///
    /// * `event_id` - The event to list RSVPs for
    #[must_use]
    pub fn event<E: Into<String>>(event_id: E) -> Self {
        RsvpListParams {
            event_id: Some(event_id.into()),
            event_ids: Vec::default(),
        }
    }

    /// List the RSVPs for a batch of events
    ///
    /// # Arguments
    ///
    /// * `event_ids` - The events to list RSVPs for
    #[must_use]
    pub fn events<E: Into<String>, I: IntoIterator<Item = E>>(event_ids: I) -> Self {
        RsvpListParams {
            event_id: None,
            event_ids: event_ids.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_hash_is_stable_and_case_folded() {
        let when = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();
        let a = validation_hash("E1", "Alice@X.com", &when);
        let b = validation_hash("E1", "alice@x.com", &when);
        // same inputs modulo email case hash the same
        assert_eq!(a, b);
        // any input change moves the hash
        assert_ne!(a, validation_hash("E2", "alice@x.com", &when));
        let later = when + chrono::Duration::seconds(1);
        assert_ne!(a, validation_hash("E1", "alice@x.com", &later));
        // 64 bits of hex
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn method_roundtrips_through_str() {
        for method in [
            SubmissionMethod::Backend,
            SubmissionMethod::DirectStore,
            SubmissionMethod::LocalSpool,
        ] {
            let parsed: SubmissionMethod = method.to_string().parse().unwrap();
            assert_eq!(parsed, method);
        }
    }
}
