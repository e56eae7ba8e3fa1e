//! Wrappers for interacting with events within EventCall

use chrono::prelude::*;
use std::collections::HashMap;
use uuid::Uuid;

use super::InvalidEnum;

/// The lifecycle states an event can be in
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// The event is live and accepting RSVPs
    Active,
    /// The event is over and kept for the record
    Archived,
    /// The event was called off
    Cancelled,
}

impl Default for EventStatus {
    /// Create a default status of active
    fn default() -> Self {
        EventStatus::Active
    }
}

impl std::fmt::Display for EventStatus {
    /// Cleanly print an event status
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            EventStatus::Active => write!(f, "active"),
            EventStatus::Archived => write!(f, "archived"),
            EventStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for EventStatus {
    type Err = InvalidEnum;

    /// Convert this str to an [`EventStatus`]
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "active" => Ok(EventStatus::Active),
            "archived" => Ok(EventStatus::Archived),
            "cancelled" => Ok(EventStatus::Cancelled),
            _ => Err(InvalidEnum(format!("Unknown EventStatus: {raw}"))),
        }
    }
}

/// The toggles an organizer can set on an event
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EventFlags {
    /// Ask declining guests for a reason
    #[serde(default)]
    pub ask_reason: bool,
    /// Allow attendees to bring guests
    #[serde(default)]
    pub allow_guests: bool,
    /// Require a meal choice from attendees
    #[serde(default)]
    pub requires_meal_choice: bool,
}

/// The shape of a custom question on an event
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QuestionKind {
    /// A freeform text answer
    Text,
    /// One answer out of a fixed set of options
    Choice {
        /// The options a guest can pick from
        options: Vec<String>,
    },
    /// A calendar date answer
    Date,
    /// A date and time answer
    DateTime,
}

/// A custom question an organizer attached to an event
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// The id answers reference this question by
    pub id: String,
    /// The prompt shown to guests
    pub prompt: String,
    /// The shape of answer this question takes
    #[serde(flatten)]
    pub kind: QuestionKind,
    /// Whether guests must answer this question
    #[serde(default)]
    pub required: bool,
}

/// A guests answer to a custom question
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Answer {
    /// An answer to a date and time question
    DateTime(DateTime<Utc>),
    /// An answer to a date question
    Date(NaiveDate),
    /// An answer to a text or choice question
    Text(String),
}

impl Answer {
    /// Check whether this answer fits the shape a question expects
    ///
    /// # Arguments
    ///
    /// * `kind` - The question shape to check against
    pub fn fits(&self, kind: &QuestionKind) -> bool {
        match (self, kind) {
            (Answer::Text(_), QuestionKind::Text) => true,
            (Answer::Text(value), QuestionKind::Choice { options }) => options.contains(value),
            (Answer::Date(_), QuestionKind::Date) => true,
            (Answer::DateTime(_), QuestionKind::DateTime) => true,
            _ => false,
        }
    }
}

/// A table in an events seating chart
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SeatingTable {
    /// The name of this table
    pub name: String,
    /// How many seats this table has
    pub capacity: u32,
    /// The RSVPs assigned to this table
    #[serde(default)]
    pub assigned: Vec<Uuid>,
}

/// The seating chart for an event
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct SeatingChart {
    /// The tables in this chart
    pub tables: Vec<SeatingTable>,
}

/// An event in EventCall
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Event {
    /// The unique id for this event
    pub id: String,
    /// The title of this event
    pub title: String,
    /// The calendar date this event happens on
    pub date: NaiveDate,
    /// The wall clock time this event starts at
    pub time: NaiveTime,
    /// Where this event happens
    pub location: String,
    /// The description shown on the invite
    #[serde(default)]
    pub description: String,
    /// The cover image url if one is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    /// The lifecycle state of this event
    #[serde(default)]
    pub status: EventStatus,
    /// The username of the organizer that owns this event
    pub created_by: String,
    /// When this event was created
    pub created: DateTime<Utc>,
    /// The toggles set on this event
    #[serde(default)]
    pub flags: EventFlags,
    /// The custom questions on this event
    #[serde(default)]
    pub questions: Vec<Question>,
    /// Freeform detail fields shown on the invite
    #[serde(default)]
    pub details: HashMap<String, String>,
    /// The seating chart if one was built
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seating: Option<SeatingChart>,
    /// The invite template this event renders with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl Event {
    /// Get the instant this event starts at
    ///
    /// Date and time together form an orderable instant.
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.date.and_time(self.time).and_utc()
    }
}

/// Check whether a cover image url is acceptable
///
/// Cover urls must be well formed https urls; an empty string means no cover.
///
/// # Arguments
///
/// * `raw` - The url to check
pub fn valid_cover_url(raw: &str) -> bool {
    if raw.is_empty() {
        return true;
    }
    match url::Url::parse(raw) {
        Ok(parsed) => parsed.scheme() == "https",
        Err(_) => false,
    }
}

/// The data needed to create an event
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EventCreate {
    /// The title of this event
    pub title: String,
    /// The calendar date this event happens on
    pub date: NaiveDate,
    /// The wall clock time this event starts at
    pub time: NaiveTime,
    /// Where this event happens
    pub location: String,
    /// The description shown on the invite
    #[serde(default)]
    pub description: String,
    /// The cover image url if one is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    /// The toggles set on this event
    #[serde(default)]
    pub flags: EventFlags,
    /// The custom questions on this event
    #[serde(default)]
    pub questions: Vec<Question>,
    /// Freeform detail fields shown on the invite
    #[serde(default)]
    pub details: HashMap<String, String>,
    /// The invite template this event renders with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl EventCreate {
    /// Create an [`EventCreate`] object
    ///
    /// # Arguments
    ///
    /// * `title` - The title of the event
    /// * `date` - The calendar date the event happens on
    /// * `time` - The wall clock time the event starts at
    /// * `location` - Where the event happens
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{NaiveDate, NaiveTime};
    /// use eventcall::models::EventCreate;
    ///
    /// EventCreate::new(
    ///     "Dining Out",
    ///     NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
    ///     NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
    ///     "Fort Harmon Club",
    /// );
    /// ```
    pub fn new<T: Into<String>, L: Into<String>>(
        title: T,
        date: NaiveDate,
        time: NaiveTime,
        location: L,
    ) -> Self {
        EventCreate {
            title: title.into(),
            date,
            time,
            location: location.into(),
            description: String::default(),
            cover_image_url: None,
            flags: EventFlags::default(),
            questions: Vec::default(),
            details: HashMap::default(),
            template: None,
        }
    }

    /// Set the description for this event
    ///
    /// # Arguments
    ///
    /// * `description` - The description to set
    #[must_use]
    pub fn description<D: Into<String>>(mut self, description: D) -> Self {
        self.description = description.into();
        self
    }

    /// Set the cover image url for this event
    ///
    /// # Arguments
    ///
    /// * `url` - The cover image url to set
    #[must_use]
    pub fn cover_image_url<U: Into<String>>(mut self, url: U) -> Self {
        self.cover_image_url = Some(url.into());
        self
    }

    /// Set the toggles on this event
    ///
    /// # Arguments
    ///
    /// * `flags` - The flags to set
    #[must_use]
    pub fn flags(mut self, flags: EventFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Add a custom question to this event
    ///
    /// # Arguments
    ///
    /// * `question` - The question to add
    #[must_use]
    pub fn question(mut self, question: Question) -> Self {
        self.questions.push(question);
        self
    }

    /// Add a freeform detail field to this event
    ///
    /// # Arguments
    ///
    /// * `key` - The name of this detail
    /// * `value` - The value of this detail
    #[must_use]
    pub fn detail<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Set the invite template for this event
    ///
    /// # Arguments
    ///
    /// * `template` - The template tag to set
    #[must_use]
    pub fn template<T: Into<String>>(mut self, template: T) -> Self {
        self.template = Some(template.into());
        self
    }
}

/// The updatable fields on an event
///
/// The id and owner are immutable and so have no update fields.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct EventUpdate {
    /// A new title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// A new date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// A new start time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<NaiveTime>,
    /// A new location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// A new description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// A new cover image url
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    /// A new lifecycle state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EventStatus>,
    /// A new set of custom questions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<Question>>,
    /// A new set of detail fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, String>>,
    /// A new seating chart
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seating: Option<SeatingChart>,
}

impl EventUpdate {
    /// Create an empty event update
    #[must_use]
    pub fn new() -> Self {
        EventUpdate::default()
    }

    /// Set a new title
    #[must_use]
    pub fn title<T: Into<String>>(mut self, title: T) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set a new lifecycle state
    #[must_use]
    pub fn status(mut self, status: EventStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set a new seating chart
    #[must_use]
    pub fn seating(mut self, seating: SeatingChart) -> Self {
        self.seating = Some(seating);
        self
    }

    /// Check if this update actually changes anything
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.location.is_none()
            && self.description.is_none()
            && self.cover_image_url.is_none()
            && self.status.is_none()
            && self.questions.is_none()
            && self.details.is_none()
            && self.seating.is_none()
    }
}

/// The params for listing events
#[derive(Debug, Default, Clone)]
pub struct EventListParams {
    /// Only list events owned by this username
    pub created_by: Option<String>,
    /// Only list events with no owner assigned
    pub unassigned: bool,
    /// Only list events in this lifecycle state
    pub status: Option<EventStatus>,
}

impl EventListParams {
    /// Create a default set of list params
    #[must_use]
    pub fn new() -> Self {
        EventListParams::default()
    }

    /// Only list events owned by a username
    ///
    /// # Arguments
    ///
    /// * `username` - The owner to filter on
    #[must_use]
    pub fn created_by<U: Into<String>>(mut self, username: U) -> Self {
        self.created_by = Some(username.into());
        self
    }

    /// Only list events with no owner assigned
    #[must_use]
    pub fn unassigned(mut self) -> Self {
        self.unassigned = true;
        self
    }

    /// Only list events in a lifecycle state
    ///
    /// # Arguments
    ///
    /// * `status` - The state to filter on
    #[must_use]
    pub fn status(mut self, status: EventStatus) -> Self {
        self.status = Some(status);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_str() {
        for status in [
            EventStatus::Active,
            EventStatus::Archived,
            EventStatus::Cancelled,
        ] {
            let parsed: EventStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("deleted".parse::<EventStatus>().is_err());
    }

    #[test]
    fn answers_fit_their_questions() {
        let choice = QuestionKind::Choice {
            options: vec!["beef".to_owned(), "fish".to_owned()],
        };
        assert!(Answer::Text("beef".to_owned()).fits(&choice));
        // an option outside the set does not fit
        assert!(!Answer::Text("tofu".to_owned()).fits(&choice));
        assert!(!Answer::Text("beef".to_owned()).fits(&QuestionKind::Date));
    }

    #[test]
    fn cover_urls_must_be_https_or_empty() {
        assert!(valid_cover_url(""));
        assert!(valid_cover_url("https://img.example.com/cover.png"));
        assert!(!valid_cover_url("http://img.example.com/cover.png"));
        assert!(!valid_cover_url("not a url"));
    }

    #[test]
    fn date_and_time_order_as_an_instant() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let earlier = NaiveTime::from_hms_opt(17, 0, 0).unwrap();
        let later = NaiveTime::from_hms_opt(18, 30, 0).unwrap();
        let base = EventCreate::new("Dining Out", date, earlier, "Club");
        let mut first = sample_event(&base);
        let mut second = sample_event(&base);
        first.time = earlier;
        second.time = later;
        assert!(first.starts_at() < second.starts_at());
    }

    /// Build a bare event from a create request for tests
    fn sample_event(req: &EventCreate) -> Event {
        Event {
            id: "E1".to_owned(),
            title: req.title.clone(),
            date: req.date,
            time: req.time,
            location: req.location.clone(),
            description: req.description.clone(),
            cover_image_url: None,
            status: EventStatus::default(),
            created_by: "ahart".to_owned(),
            created: Utc::now(),
            flags: req.flags,
            questions: req.questions.clone(),
            details: req.details.clone(),
            seating: None,
            template: None,
        }
    }
}
