//! End to end submission flows over in memory tiers

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, Utc};
use eventcall::cache::{CacheKey, CacheManager};
use eventcall::models::{Event, EventFlags, EventStatus, SubmissionMethod};
use eventcall::pipeline::{MemoryResponseStore, SubmissionForm, SubmissionPipeline};
use eventcall::spool::Spool;
use eventcall::state::MemoryStateStore;
use eventcall::Error;

/// Turn on log output when a test run sets RUST_LOG
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Build an event for tests
fn event() -> Event {
    Event {
        id: "E1".to_owned(),
        title: "Dining Out".to_owned(),
        date: NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
        time: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
        location: "Fort Harmon Club".to_owned(),
        description: "Cocktails at 1800".to_owned(),
        cover_image_url: None,
        status: EventStatus::Active,
        created_by: "ahart".to_owned(),
        created: Utc::now(),
        flags: EventFlags::default(),
        questions: Vec::new(),
        details: HashMap::new(),
        seating: None,
        template: None,
    }
}

/// Build a valid attending form
fn form() -> SubmissionForm {
    SubmissionForm::new("Amy Calder", "amy@example.com").attending(true)
}

#[tokio::test]
async fn confirmation_carries_everything_a_guest_needs() {
    let store = Arc::new(MemoryResponseStore::new());
    let pipeline = SubmissionPipeline::new(
        Spool::new(Arc::new(MemoryStateStore::new())),
        Arc::new(CacheManager::new()),
    )
    .primary(store)
    .spacing(Duration::from_millis(0))
    .link_base("https://hart.github.io", "/eventcall/");
    let confirmation = pipeline.submit(&form(), &event()).await.unwrap();
    // the calendar text is a real vevent for the right instant
    let calendar = confirmation.calendar.unwrap();
    assert!(calendar.contains("DTSTART:20261017T183000Z"));
    assert!(calendar.contains("SUMMARY:Dining Out"));
    // the checkin payload is fresh and tied to the rsvp
    let checkin = confirmation.checkin.unwrap();
    assert!(checkin.is_valid(Utc::now()));
    assert_eq!(checkin.rsvp_id, confirmation.rsvp.id);
    // the edit link carries the rsvp id and edit token before the fragment
    let edit_link = confirmation.edit_link.unwrap();
    let (head, fragment) = edit_link.split_once('#').unwrap();
    assert!(head.contains(&format!("rsvpId={}", confirmation.rsvp.id)));
    assert!(head.contains(&format!("edit={}", confirmation.rsvp.edit_token)));
    assert_eq!(fragment, "invite/E1");
}

#[tokio::test]
async fn submit_then_edit_keeps_one_row() {
    let store = Arc::new(MemoryResponseStore::new());
    let pipeline = SubmissionPipeline::new(
        Spool::new(Arc::new(MemoryStateStore::new())),
        Arc::new(CacheManager::new()),
    )
    .primary(store.clone())
    .spacing(Duration::from_millis(0));
    let event = event();
    let first = pipeline.submit(&form(), &event).await.unwrap();
    // the guest comes back through their edit link and flips to declining
    let declined = SubmissionForm::new("Amy Calder", "amy@example.com").attending(false);
    let second = pipeline.edit(&declined, &event, &first.rsvp).await.unwrap();
    let rows = store.rows("E1");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, first.rsvp.id);
    assert!(!rows[0].attending);
    assert!(rows[0].is_update);
    // the edit token survives the edit
    assert_eq!(second.rsvp.edit_token, first.rsvp.edit_token);
}

#[tokio::test]
async fn successful_submissions_invalidate_cached_responses() {
    let cache = Arc::new(CacheManager::new());
    cache.set(CacheKey::Responses, serde_json::json!([{"stale": true}]));
    cache.set(CacheKey::Events, serde_json::json!([{"id": "E1"}]));
    let pipeline = SubmissionPipeline::new(
        Spool::new(Arc::new(MemoryStateStore::new())),
        cache.clone(),
    )
    .primary(Arc::new(MemoryResponseStore::new()))
    .spacing(Duration::from_millis(0));
    pipeline.submit(&form(), &event()).await.unwrap();
    // the response listing went stale but the event listing survived
    assert!(cache.stale(CacheKey::Responses).is_none());
    assert!(cache.get(CacheKey::Events).is_some());
}

#[tokio::test]
async fn offline_submissions_spool_and_replay_later() {
    init_tracing();
    // the browser state outlives any one pipeline
    let state = Arc::new(MemoryStateStore::new());
    let key = [11u8; 32];
    let event = event();
    // every attempt fails while offline
    let down = Arc::new(MemoryResponseStore::new());
    for _ in 0..eventcall::pipeline::SUBMIT_ATTEMPTS {
        down.fail_with(Error::new("network error: failed to fetch"));
    }
    let offline = SubmissionPipeline::new(
        Spool::with_key(state.clone(), &key),
        Arc::new(CacheManager::new()),
    )
    .primary(down)
    .spacing(Duration::from_millis(0));
    let confirmation = offline.submit(&form(), &event).await.unwrap();
    assert_eq!(confirmation.method, SubmissionMethod::LocalSpool);
    // later the backend is reachable again
    let up = Arc::new(MemoryResponseStore::new());
    let online = SubmissionPipeline::new(
        Spool::with_key(state, &key),
        Arc::new(CacheManager::new()),
    )
    .primary(up.clone())
    .spacing(Duration::from_millis(0));
    let landed = online.replay("E1").await.unwrap();
    assert_eq!(landed, 1);
    let rows = up.rows("E1");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].email, "amy@example.com");
    // a second replay finds nothing left
    assert_eq!(online.replay("E1").await.unwrap(), 0);
}

#[tokio::test]
async fn a_spooled_copy_is_superseded_by_a_later_success() {
    init_tracing();
    let state = Arc::new(MemoryStateStore::new());
    let spool = Spool::new(state);
    let event = event();
    // the first try fails everywhere and spools
    let down = Arc::new(MemoryResponseStore::new());
    for _ in 0..eventcall::pipeline::SUBMIT_ATTEMPTS {
        down.fail_with(Error::new("backend down"));
    }
    let pipeline = SubmissionPipeline::new(spool.clone(), Arc::new(CacheManager::new()))
        .primary(down)
        .spacing(Duration::from_millis(0));
    pipeline.submit(&form(), &event).await.unwrap();
    assert_eq!(spool.load("E1").len(), 1);
    // the guest resubmits once the backend is back
    let up = Arc::new(MemoryResponseStore::new());
    let pipeline = SubmissionPipeline::new(spool.clone(), Arc::new(CacheManager::new()))
        .primary(up)
        .spacing(Duration::from_millis(0));
    pipeline.submit(&form(), &event).await.unwrap();
    // the stale spooled copy is gone so replay cannot double submit
    assert!(spool.load("E1").is_empty());
}
