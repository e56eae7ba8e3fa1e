//! Deep link and login redirect flows

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use url::Url;

use eventcall::init::InitMutex;
use eventcall::models::{EventFlags, InvitePayload, User, UserRole};
use eventcall::router::{decode_invite, Dispatch, Route, Router, Scheme};
use eventcall::session::SessionStore;
use eventcall::state::MemoryStateStore;

/// Build a user for tests
fn user() -> User {
    User {
        id: "U1".to_owned(),
        username: "ahart".to_owned(),
        name: "Alice Hart".to_owned(),
        email: "alice@example.com".to_owned(),
        branch: None,
        rank: None,
        role: UserRole::User,
        created: Utc::now(),
    }
}

/// Build a router whose bootstrap already ran
async fn router(sessions: Arc<SessionStore>) -> Router {
    let init = Arc::new(InitMutex::new());
    init.initialize(|| async { Ok(()) }).await.unwrap();
    Router::new(
        Scheme::History {
            base_path: "/eventcall/".to_owned(),
        },
        init,
        sessions,
        Arc::new(MemoryStateStore::new()),
    )
    .poll_spacing(Duration::from_millis(0))
}

#[tokio::test]
async fn a_deep_link_replays_after_login() {
    let sessions = Arc::new(SessionStore::new(
        Arc::new(MemoryStateStore::new()),
        Arc::new(MemoryStateStore::new()),
    ));
    let router = router(sessions.clone()).await;
    // an organizer opens a manage link while logged out
    let target = Url::parse("https://hart.github.io/eventcall/manage/E1").unwrap();
    assert_eq!(router.dispatch(&target).await, Dispatch::Login);
    // they log in and the stashed path comes back exactly once
    sessions.save(user(), true).unwrap();
    let stashed = router.restore_redirect().unwrap();
    assert_eq!(stashed, "/eventcall/manage/E1");
    assert_eq!(router.restore_redirect(), None);
    // dispatching the restored path now lands on the page
    let restored = Url::parse(&format!("https://hart.github.io{stashed}")).unwrap();
    assert_eq!(
        router.dispatch(&restored).await,
        Dispatch::Page(Route::Manage("E1".to_owned()))
    );
}

#[tokio::test]
async fn invite_links_round_trip_through_the_router() {
    let payload = InvitePayload {
        id: "E1".to_owned(),
        title: "Dining Out & Awards".to_owned(),
        date: chrono::NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
        time: chrono::NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
        location: "Fort Harmon Club".to_owned(),
        description: "Formal attire".to_owned(),
        cover_image_url: None,
        flags: EventFlags::default(),
        questions: Vec::new(),
        details: HashMap::new(),
        template: None,
    };
    let raw = payload
        .invite_url("https://hart.github.io", "/eventcall/")
        .unwrap();
    let location = Url::parse(&raw).unwrap();
    // a logged out guest lands straight on the invite page
    let sessions = Arc::new(SessionStore::new(
        Arc::new(MemoryStateStore::new()),
        Arc::new(MemoryStateStore::new()),
    ));
    let router = router(sessions).await;
    assert_eq!(
        router.dispatch(&location).await,
        Dispatch::Page(Route::Invite("E1".to_owned()))
    );
    // and the page can rebuild the event from the link alone
    let decoded = decode_invite(&location).unwrap();
    assert_eq!(decoded.title, "Dining Out & Awards");
    assert_eq!(decoded.location, "Fort Harmon Club");
}

#[tokio::test]
async fn legacy_invite_links_still_dispatch() {
    use base64::Engine as _;
    let payload = InvitePayload {
        id: "E9".to_owned(),
        title: "Hail and Farewell".to_owned(),
        date: chrono::NaiveDate::from_ymd_opt(2026, 11, 5).unwrap(),
        time: chrono::NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        location: "Post Chapel Annex".to_owned(),
        description: String::new(),
        cover_image_url: None,
        flags: EventFlags::default(),
        questions: Vec::new(),
        details: HashMap::new(),
        template: None,
    };
    // legacy links carried base64 json in the data param
    let json = serde_json::to_string(&payload).unwrap();
    let legacy = base64::engine::general_purpose::STANDARD.encode(json);
    let raw = format!("https://hart.github.io/eventcall/?data={legacy}#invite/E9");
    let location = Url::parse(&raw).unwrap();
    let decoded = decode_invite(&location).unwrap();
    assert_eq!(decoded.id, "E9");
    assert_eq!(decoded.title, "Hail and Farewell");
}
