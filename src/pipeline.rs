//! The submission pipeline for RSVPs
//!
//! A submission moves through validation, identity minting and then a ladder
//! of persistence tiers: the primary backend, the content store fallback and
//! finally the local spool. Each tier gets a bounded number of attempts and
//! only retryable failures move the submission down the ladder.

use async_trait::async_trait;
use chrono::prelude::*;
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use crate::cache::{CacheManager, Mutation};
use crate::client::{Auth, ContentStore, EventCall, Rsvps};
use crate::models::calendar::event_ics;
use crate::models::invites::{edit_url, InvitePayload};
use crate::models::{
    Answer, CheckinPayload, Event, Rsvp, RsvpListParams, SubmissionEnvelope, SubmissionMethod,
};
use crate::spool::Spool;
use crate::Error;

/// How many times a single persistence tier is attempted
pub const SUBMIT_ATTEMPTS: u32 = 3;

/// How long to wait between attempts against a tier in milliseconds
pub const SUBMIT_SPACING_MS: u64 = 2000;

/// The most extra guests any RSVP can bring
pub const MAX_GUESTS: u8 = 10;

/// Throwaway email domains submissions are rejected from
const DISPOSABLE_DOMAINS: &[&str] = &[
    "mailinator.com",
    "guerrillamail.com",
    "10minutemail.com",
    "tempmail.com",
    "trashmail.com",
    "yopmail.com",
];

/// The domain placeholder emails from unfinished profiles carry
const PLACEHOLDER_DOMAIN: &str = "eventcall";

/// A permissive email shape check
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

/// Names are letters plus the usual name punctuation
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L}\p{M}][\p{L}\p{M} .,'-]*$").unwrap());

/// Phones must be E.164 once separators are stripped
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+[1-9]\d{6,14}$").unwrap());

/// Where a submission currently is in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    /// Nothing is being submitted
    Idle,
    /// The form passed validation
    Validated,
    /// A persistence tier is being attempted
    InFlight,
    /// A remote tier accepted the submission
    Succeeded,
    /// No remote tier accepted it; it sits in the local spool
    Spooled,
    /// The submission could not be persisted anywhere
    Failed,
}

/// A single field level validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// The form field at fault
    pub field: &'static str,
    /// Why it was rejected
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// The raw guest form before validation
#[derive(Debug, Default, Clone)]
pub struct SubmissionForm {
    /// The guests name
    pub name: String,
    /// The guests email
    pub email: String,
    /// The guests phone if given
    pub phone: Option<String>,
    /// Whether the guest is attending; unanswered until the guest picks
    pub attending: Option<bool>,
    /// How many extra guests they are bringing
    pub guest_count: u8,
    /// Why the guest declined if they gave a reason
    pub reason: Option<String>,
    /// The guests service branch if given
    pub branch: Option<String>,
    /// The guests rank if given
    pub rank: Option<String>,
    /// The guests unit if given
    pub unit: Option<String>,
    /// The dietary restrictions the guest listed
    pub dietary: Vec<String>,
    /// Freeform allergy notes
    pub allergies: Option<String>,
    /// Answers to the events custom questions keyed by question id
    pub answers: HashMap<String, Answer>,
}

impl SubmissionForm {
    /// Start a form with the required contact fields
    ///
    /// # Arguments
    ///
    /// * `name` - The guests name
    /// * `email` - The guests email
    #[must_use]
    pub fn new<N: Into<String>, E: Into<String>>(name: N, email: E) -> Self {
        SubmissionForm {
            name: name.into(),
            email: email.into(),
            ..SubmissionForm::default()
        }
    }

    /// Mark the guest as attending or declining
    #[must_use]
    pub fn attending(mut self, attending: bool) -> Self {
        self.attending = Some(attending);
        self
    }

    /// Set how many extra guests they are bringing
    #[must_use]
    pub fn guests(mut self, count: u8) -> Self {
        self.guest_count = count;
        self
    }
}

/// Validate a form against the event it answers
///
/// All failures are collected so the whole form can be annotated in one
/// pass instead of surfacing problems one at a time.
///
/// # Arguments
///
/// * `form` - The form to validate
/// * `event` - The event the form answers
#[must_use]
pub fn validate(form: &SubmissionForm, event: &Event) -> Vec<FieldError> {
    let mut errors = Vec::new();
    // names must be plain and present
    let name = form.name.trim();
    if name.is_empty() {
        errors.push(FieldError {
            field: "name",
            message: "a name is required".to_owned(),
        });
    } else if name.chars().count() > 100 {
        errors.push(FieldError {
            field: "name",
            message: "names are limited to 100 characters".to_owned(),
        });
    } else if !NAME_RE.is_match(name) {
        errors.push(FieldError {
            field: "name",
            message: "names may only contain letters and basic punctuation".to_owned(),
        });
    }
    // emails are checked for placeholders before shape so the guest gets
    // the profile message instead of a generic syntax error
    let email = form.email.trim().to_lowercase();
    if let Some((_, domain)) = email.rsplit_once('@') {
        if domain == PLACEHOLDER_DOMAIN || domain.starts_with("eventcall.") {
            errors.push(FieldError {
                field: "email",
                message: "finish setting up your profile before responding".to_owned(),
            });
        } else if DISPOSABLE_DOMAINS.contains(&domain) {
            errors.push(FieldError {
                field: "email",
                message: "throwaway email addresses are not accepted".to_owned(),
            });
        } else if !EMAIL_RE.is_match(&email) {
            errors.push(FieldError {
                field: "email",
                message: "a valid email is required".to_owned(),
            });
        }
    } else {
        errors.push(FieldError {
            field: "email",
            message: "a valid email is required".to_owned(),
        });
    }
    // phones are optional but must be E.164 when given
    if let Some(phone) = &form.phone {
        let stripped = strip_phone(phone);
        if !stripped.is_empty() && !PHONE_RE.is_match(&stripped) {
            errors.push(FieldError {
                field: "phone",
                message: "phone numbers must be in international format".to_owned(),
            });
        }
    }
    // attending is the one answer every RSVP must carry
    match form.attending {
        None => errors.push(FieldError {
            field: "attending",
            message: "please pick attending or declining".to_owned(),
        }),
        Some(false) if form.guest_count > 0 => errors.push(FieldError {
            field: "guest_count",
            message: "declined responses cannot bring guests".to_owned(),
        }),
        Some(true) if event.flags.requires_meal_choice && form.dietary.is_empty() => {
            errors.push(FieldError {
                field: "dietary",
                message: "this event requires a meal choice".to_owned(),
            });
        }
        _ => (),
    }
    if form.guest_count > MAX_GUESTS {
        errors.push(FieldError {
            field: "guest_count",
            message: format!("at most {MAX_GUESTS} extra guests are allowed"),
        });
    } else if form.guest_count > 0 && !event.flags.allow_guests {
        errors.push(FieldError {
            field: "guest_count",
            message: "this event does not allow extra guests".to_owned(),
        });
    }
    // every required question needs a fitting answer
    for question in &event.questions {
        match form.answers.get(&question.id) {
            Some(answer) if !answer.fits(&question.kind) => errors.push(FieldError {
                field: "answers",
                message: format!("the answer to '{}' has the wrong shape", question.prompt),
            }),
            None if question.required => errors.push(FieldError {
                field: "answers",
                message: format!("'{}' requires an answer", question.prompt),
            }),
            _ => (),
        }
    }
    errors
}

/// Strip the separators people type into phone numbers
fn strip_phone(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ' ' | '(' | ')' | '-' | '.'))
        .collect()
}

/// Mint an RSVP from a validated form
///
/// Editing an existing RSVP keeps its identity: the id, edit token and
/// original timestamp carry over and the row is marked as an update.
///
/// # Arguments
///
/// * `form` - The validated form
/// * `event` - The event the form answers
/// * `existing` - The prior RSVP when this is an edit
#[must_use]
pub fn mint(form: &SubmissionForm, event: &Event, existing: Option<&Rsvp>) -> Rsvp {
    let attending = form.attending.unwrap_or(false);
    let mut rsvp = Rsvp::new(&event.id, form.name.trim(), form.email.trim(), attending);
    rsvp.phone = form
        .phone
        .as_deref()
        .map(strip_phone)
        .filter(|p| !p.is_empty());
    rsvp.guest_count = form.guest_count;
    rsvp.reason = form.reason.clone().filter(|r| !r.trim().is_empty());
    rsvp.branch = form.branch.clone();
    rsvp.rank = form.rank.clone();
    rsvp.unit = form.unit.clone();
    rsvp.dietary = form.dietary.clone();
    rsvp.allergies = form.allergies.clone();
    rsvp.answers = form.answers.clone();
    if let Some(prior) = existing {
        // edits keep the rows identity and first seen time
        rsvp.id = prior.id;
        rsvp.edit_token = prior.edit_token.clone();
        rsvp.timestamp = prior.timestamp;
        rsvp.is_update = true;
        rsvp.last_modified = Some(Utc::now());
        // keep a previously issued check in token while still attending
        if attending && prior.check_in_token.is_some() {
            rsvp.check_in_token = prior.check_in_token.clone();
        }
    }
    rsvp
}

/// Fold an incoming RSVP into a response list
///
/// Rows match by id first and then by the `(event, lowercase email)` natural
/// key. A matched row keeps its identity and first seen time; anything else
/// appends.
pub(crate) fn upsert_into(rows: &mut Vec<Rsvp>, incoming: &Rsvp) -> Rsvp {
    let email = incoming.email.to_lowercase();
    let found = rows
        .iter_mut()
        .find(|row| row.id == incoming.id || row.email.to_lowercase() == email);
    match found {
        Some(row) => {
            let mut merged = incoming.clone();
            merged.id = row.id;
            merged.edit_token = row.edit_token.clone();
            merged.timestamp = row.timestamp;
            merged.is_update = true;
            merged.last_modified = Some(Utc::now());
            *row = merged.clone();
            merged
        }
        None => {
            rows.push(incoming.clone());
            incoming.clone()
        }
    }
}

/// A persistence tier the pipeline can push submissions into
#[async_trait]
pub trait ResponseStore: Send + Sync {
    /// The method tag stamped on envelopes headed to this tier
    fn method(&self) -> SubmissionMethod;

    /// Upsert a submission returning the persisted row
    async fn upsert(&self, envelope: &SubmissionEnvelope) -> Result<Rsvp, Error>;

    /// List the persisted responses for an event
    async fn list(&self, event_id: &str) -> Result<Vec<Rsvp>, Error>;
}

/// The primary REST backend as a persistence tier
pub struct BackendResponseStore {
    /// The rsvps handler to submit through
    rsvps: Rsvps,
    /// The auth handler csrf tokens come from
    auth: Auth,
}

impl BackendResponseStore {
    /// Wrap the backend handlers as a persistence tier
    #[must_use]
    pub fn new(rsvps: Rsvps, auth: Auth) -> Self {
        BackendResponseStore { rsvps, auth }
    }
}

#[async_trait]
impl ResponseStore for BackendResponseStore {
    fn method(&self) -> SubmissionMethod {
        SubmissionMethod::Backend
    }

    async fn upsert(&self, envelope: &SubmissionEnvelope) -> Result<Rsvp, Error> {
        // stamp the current csrf token into the envelope body
        let mut envelope = envelope.clone();
        envelope.csrf = self.auth.current_csrf().map(|token| token.token);
        let saved = self.rsvps.submit(&envelope).await?;
        // rotate csrf after a successful state change; a failed rotation
        // only costs the next request a token
        if let Err(error) = self.auth.rotate_csrf().await {
            tracing::warn!(error = %error, "csrf rotation failed after submission");
        }
        Ok(saved)
    }

    async fn list(&self, event_id: &str) -> Result<Vec<Rsvp>, Error> {
        self.rsvps.list(&RsvpListParams::event(event_id)).await
    }
}

/// The content store as a persistence tier
///
/// Responses live as one JSON blob per event; upserts ride the stores
/// read-modify-write loop so concurrent writers never clobber each other.
pub struct ContentResponseStore {
    /// The content store to write through
    store: ContentStore,
}

impl ContentResponseStore {
    /// Wrap a content store as a persistence tier
    #[must_use]
    pub fn new(store: ContentStore) -> Self {
        ContentResponseStore { store }
    }

    /// Build the blob path responses for an event live at
    fn path(event_id: &str) -> String {
        crate::client::store::rsvps_path(event_id)
    }
}

#[async_trait]
impl ResponseStore for ContentResponseStore {
    fn method(&self) -> SubmissionMethod {
        SubmissionMethod::DirectStore
    }

    async fn upsert(&self, envelope: &SubmissionEnvelope) -> Result<Rsvp, Error> {
        let path = Self::path(&envelope.rsvp.event_id);
        let message = format!("Update RSVPs for {}", envelope.rsvp.event_id);
        let mut saved = None;
        self.store
            .update_blob(&path, &message, 3, |current| {
                // parse the current list treating a missing blob as empty
                let mut rows: Vec<Rsvp> = match current {
                    Some(bytes) => serde_json::from_slice(bytes)?,
                    None => Vec::new(),
                };
                saved = Some(upsert_into(&mut rows, &envelope.rsvp));
                Ok(serde_json::to_vec_pretty(&rows)?)
            })
            .await?;
        saved.ok_or_else(|| Error::new("upsert mutation never ran"))
    }

    async fn list(&self, event_id: &str) -> Result<Vec<Rsvp>, Error> {
        match self.store.read_path(&Self::path(event_id)).await? {
            Some((bytes, _)) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }
}

/// An in memory persistence tier
///
/// This backs tests and also serves as the reference for upsert semantics.
/// Failures can be queued to exercise the retry ladder.
#[derive(Default)]
pub struct MemoryResponseStore {
    /// The persisted responses by event id
    responses: Mutex<HashMap<String, Vec<Rsvp>>>,
    /// Errors to fail the next upserts with in order
    failures: Mutex<VecDeque<Error>>,
}

impl MemoryResponseStore {
    /// Create an empty in memory tier
    #[must_use]
    pub fn new() -> Self {
        MemoryResponseStore::default()
    }

    /// Queue an error for the next upsert to fail with
    ///
    /// # Arguments
    ///
    /// * `error` - The error to fail with
    pub fn fail_with(&self, error: Error) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Get the persisted responses for an event
    ///
    /// # Arguments
    ///
    /// * `event_id` - The event to read
    #[must_use]
    pub fn rows(&self, event_id: &str) -> Vec<Rsvp> {
        self.responses
            .lock()
            .unwrap()
            .get(event_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResponseStore for MemoryResponseStore {
    fn method(&self) -> SubmissionMethod {
        SubmissionMethod::Backend
    }

    async fn upsert(&self, envelope: &SubmissionEnvelope) -> Result<Rsvp, Error> {
        // fail with any queued error first
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut responses = self.responses.lock().unwrap();
        let rows = responses
            .entry(envelope.rsvp.event_id.clone())
            .or_default();
        Ok(upsert_into(rows, &envelope.rsvp))
    }

    async fn list(&self, event_id: &str) -> Result<Vec<Rsvp>, Error> {
        Ok(self.rows(event_id))
    }
}

/// What a guest walks away with after a submission lands
#[derive(Debug, Clone)]
pub struct Confirmation {
    /// The persisted RSVP
    pub rsvp: Rsvp,
    /// Which tier accepted the submission
    pub method: SubmissionMethod,
    /// Downloadable calendar text when attending
    pub calendar: Option<String>,
    /// The event day check in payload when attending
    pub checkin: Option<CheckinPayload>,
    /// A link that lets the guest edit this RSVP later
    pub edit_link: Option<String>,
}

impl Confirmation {
    /// Build the confirmation for a persisted RSVP
    fn build(
        event: &Event,
        rsvp: Rsvp,
        method: SubmissionMethod,
        link_base: Option<&(String, String)>,
    ) -> Self {
        let calendar = rsvp
            .attending
            .then(|| event_ics(event, &format!("{}-{}@eventcall", event.id, rsvp.id)));
        let checkin = match (&rsvp.check_in_token, rsvp.attending) {
            (Some(token), true) => Some(CheckinPayload::new(&event.id, rsvp.id, token)),
            _ => None,
        };
        // the edit link needs to know where the app is hosted
        let edit_link = link_base.and_then(|(origin, base_path)| {
            let invite = InvitePayload::from(event).invite_url(origin, base_path).ok()?;
            Some(edit_url(&invite, &rsvp.id, &rsvp.edit_token))
        });
        Confirmation {
            rsvp,
            method,
            calendar,
            checkin,
            edit_link,
        }
    }
}

/// Drives submissions down the persistence ladder
pub struct SubmissionPipeline {
    /// The primary persistence tier
    primary: Option<Arc<dyn ResponseStore>>,
    /// The fallback persistence tier
    fallback: Option<Arc<dyn ResponseStore>>,
    /// The local spool for submissions nothing accepted
    spool: Spool,
    /// The cache to invalidate after successful mutations
    cache: Arc<CacheManager>,
    /// How many attempts each tier gets
    attempts: u32,
    /// How long to wait between attempts
    spacing: Duration,
    /// The origin and base path edit links are built against
    link_base: Option<(String, String)>,
    /// The captcha token to stamp onto every envelope if one is configured
    captcha: Option<String>,
    /// Whether a submission is currently in flight
    in_flight: AtomicBool,
    /// Broadcasts the pipelines current state
    state_tx: watch::Sender<SubmissionState>,
}

impl SubmissionPipeline {
    /// Create a pipeline with no tiers wired yet
    ///
    /// # Arguments
    ///
    /// * `spool` - The local spool for failed submissions
    /// * `cache` - The cache to invalidate after mutations
    #[must_use]
    pub fn new(spool: Spool, cache: Arc<CacheManager>) -> Self {
        let (state_tx, _) = watch::channel(SubmissionState::Idle);
        SubmissionPipeline {
            primary: None,
            fallback: None,
            spool,
            cache,
            attempts: SUBMIT_ATTEMPTS,
            spacing: Duration::from_millis(SUBMIT_SPACING_MS),
            link_base: None,
            captcha: None,
            in_flight: AtomicBool::new(false),
            state_tx,
        }
    }

    /// Wire a pipeline off an already built client
    ///
    /// The clients backend becomes the primary tier and its content store
    /// the fallback; missing surfaces just leave that tier unwired.
    ///
    /// # Arguments
    ///
    /// * `client` - The client to take tiers from
    /// * `cache` - The cache to invalidate after mutations
    #[must_use]
    pub fn from_client(client: &EventCall, cache: Arc<CacheManager>) -> Self {
        let mut pipeline = Self::new(Spool::new(client.state.clone()), cache);
        if let Some(backend) = &client.backend {
            pipeline.primary = Some(Arc::new(BackendResponseStore::new(
                backend.rsvps.clone(),
                backend.auth.clone(),
            )));
        }
        if let Some(store) = &client.store {
            pipeline.fallback = Some(Arc::new(ContentResponseStore::new(store.clone())));
        }
        pipeline
    }

    /// Set the primary persistence tier
    #[must_use]
    pub fn primary(mut self, store: Arc<dyn ResponseStore>) -> Self {
        self.primary = Some(store);
        self
    }

    /// Set the fallback persistence tier
    #[must_use]
    pub fn fallback(mut self, store: Arc<dyn ResponseStore>) -> Self {
        self.fallback = Some(store);
        self
    }

    /// Set how many attempts each tier gets
    #[must_use]
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Set how long to wait between attempts
    #[must_use]
    pub fn spacing(mut self, spacing: Duration) -> Self {
        self.spacing = spacing;
        self
    }

    /// Set the origin and base path edit links are built against
    ///
    /// # Arguments
    ///
    /// * `origin` - The origin the app is hosted at
    /// * `base_path` - The base path under that origin
    #[must_use]
    pub fn link_base<O: Into<String>, B: Into<String>>(mut self, origin: O, base_path: B) -> Self {
        self.link_base = Some((origin.into(), base_path.into()));
        self
    }

    /// Set a captcha token to stamp onto every envelope
    ///
    /// # Arguments
    ///
    /// * `token` - The solved captcha token from the embedding page
    #[must_use]
    pub fn captcha<T: Into<String>>(mut self, token: T) -> Self {
        self.captcha = Some(token.into());
        self
    }

    /// Get the pipelines current state
    #[must_use]
    pub fn state(&self) -> SubmissionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SubmissionState> {
        self.state_tx.subscribe()
    }

    /// Submit a fresh RSVP
    ///
    /// # Arguments
    ///
    /// * `form` - The guest form to submit
    /// * `event` - The event the form answers
    pub async fn submit(&self, form: &SubmissionForm, event: &Event) -> Result<Confirmation, Error> {
        self.run(form, event, None).await
    }

    /// Resubmit an existing RSVP keeping its identity
    ///
    /// # Arguments
    ///
    /// * `form` - The updated guest form
    /// * `event` - The event the form answers
    /// * `prior` - The RSVP being edited
    pub async fn edit(
        &self,
        form: &SubmissionForm,
        event: &Event,
        prior: &Rsvp,
    ) -> Result<Confirmation, Error> {
        self.run(form, event, Some(prior)).await
    }

    /// Replay spooled submissions for an event
    ///
    /// Returns how many spooled envelopes landed. Envelopes that fail again
    /// stay spooled for the next replay.
    ///
    /// # Arguments
    ///
    /// * `event_id` - The event to replay spooled submissions for
    pub async fn replay(&self, event_id: &str) -> Result<usize, Error> {
        let entries = self.spool.load(event_id);
        if entries.is_empty() {
            return Ok(0);
        }
        let mut landed = 0;
        for entry in entries {
            if let Some(saved) = self.push(&entry.envelope.rsvp).await {
                tracing::info!(event_id, rsvp = %saved.id, "replayed spooled submission");
                self.spool.remove(event_id, &saved.email);
                landed += 1;
            }
        }
        if landed > 0 {
            self.cache
                .invalidate_after_mutation(Mutation::Response, event_id);
        }
        Ok(landed)
    }

    /// Run a submission down the ladder
    async fn run(
        &self,
        form: &SubmissionForm,
        event: &Event,
        existing: Option<&Rsvp>,
    ) -> Result<Confirmation, Error> {
        // one submission at a time; double clicks just bounce off
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(Error::validation("a submission is already in flight"));
        }
        let result = self.run_inner(form, event, existing).await;
        self.in_flight.store(false, Ordering::Release);
        result
    }

    /// The guarded body of [`Self::run`]
    async fn run_inner(
        &self,
        form: &SubmissionForm,
        event: &Event,
        existing: Option<&Rsvp>,
    ) -> Result<Confirmation, Error> {
        let errors = validate(form, event);
        if !errors.is_empty() {
            self.set_state(SubmissionState::Idle);
            let joined = errors
                .iter()
                .map(FieldError::to_string)
                .collect::<Vec<String>>()
                .join("; ");
            return Err(Error::Validation(joined));
        }
        self.set_state(SubmissionState::Validated);
        let rsvp = mint(form, event, existing);
        self.set_state(SubmissionState::InFlight);
        // walk the remote tiers in order
        for store in [&self.primary, &self.fallback].into_iter().flatten() {
            match self.attempt_tier(store.as_ref(), &rsvp).await {
                TierOutcome::Accepted(saved, method) => {
                    self.cache
                        .invalidate_after_mutation(Mutation::Response, &event.id);
                    // a remote tier superseded any spooled copy
                    self.spool.remove(&event.id, &saved.email);
                    self.set_state(SubmissionState::Succeeded);
                    return Ok(Confirmation::build(
                        event,
                        saved,
                        method,
                        self.link_base.as_ref(),
                    ));
                }
                TierOutcome::Rejected(error) => {
                    self.set_state(SubmissionState::Failed);
                    return Err(error);
                }
                TierOutcome::Exhausted => (),
            }
        }
        // nothing remote accepted it, spool for later replay
        let envelope = self.envelope(&rsvp, SubmissionMethod::LocalSpool);
        match self.spool.save(&envelope) {
            Ok(()) => {
                tracing::warn!(event_id = %event.id, "submission spooled after all tiers failed");
                self.set_state(SubmissionState::Spooled);
                Ok(Confirmation::build(
                    event,
                    rsvp,
                    SubmissionMethod::LocalSpool,
                    self.link_base.as_ref(),
                ))
            }
            Err(error) => {
                self.set_state(SubmissionState::Failed);
                Err(error)
            }
        }
    }

    /// Push a minted RSVP through any remote tier once
    async fn push(&self, rsvp: &Rsvp) -> Option<Rsvp> {
        for store in [&self.primary, &self.fallback].into_iter().flatten() {
            let envelope = self.envelope(rsvp, store.method());
            match store.upsert(&envelope).await {
                Ok(saved) => return Some(saved),
                Err(error) => {
                    tracing::debug!(error = %error, "replay tier refused submission");
                }
            }
        }
        None
    }

    /// Attempt one tier with retries
    async fn attempt_tier(&self, store: &dyn ResponseStore, rsvp: &Rsvp) -> TierOutcome {
        let envelope = self.envelope(rsvp, store.method());
        for attempt in 0..self.attempts {
            match store.upsert(&envelope).await {
                Ok(saved) => return TierOutcome::Accepted(saved, store.method()),
                Err(error) if !error.is_retryable() => {
                    // the server rejected the content itself; no tier below
                    // will accept it either
                    if matches!(
                        error.kind(),
                        crate::ErrorKind::Validation
                            | crate::ErrorKind::Authentication
                            | crate::ErrorKind::Authorization
                    ) {
                        return TierOutcome::Rejected(error);
                    }
                    tracing::warn!(method = %store.method(), error = %error, "tier refused submission");
                    return TierOutcome::Exhausted;
                }
                Err(error) => {
                    tracing::warn!(
                        method = %store.method(),
                        attempt,
                        error = %error,
                        "submission attempt failed"
                    );
                    if attempt + 1 < self.attempts {
                        tokio::time::sleep(self.spacing).await;
                    }
                }
            }
        }
        TierOutcome::Exhausted
    }

    /// Wrap an RSVP stamping any configured captcha token
    fn envelope(&self, rsvp: &Rsvp, method: SubmissionMethod) -> SubmissionEnvelope {
        let mut envelope = SubmissionEnvelope::new(rsvp.clone(), method);
        envelope.captcha = self.captcha.clone();
        envelope
    }

    /// Broadcast a state change
    fn set_state(&self, state: SubmissionState) {
        // send_replace never fails even with no receivers
        self.state_tx.send_replace(state);
    }
}

/// How an attempt against a single tier ended
enum TierOutcome {
    /// The tier accepted the submission
    Accepted(Rsvp, SubmissionMethod),
    /// The tier rejected the content; stop the ladder
    Rejected(Error),
    /// The tier never accepted it; try the next one
    Exhausted,
}
