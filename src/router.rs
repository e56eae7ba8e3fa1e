//! Route parsing and dispatch
//!
//! The app runs under two url schemes: a history scheme with real paths for
//! project-page hosting (where the repo name is a base path to strip) and a
//! fragment scheme for hosts that cannot rewrite paths. Invite links always
//! ride the fragment so they survive both schemes.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

use crate::init::InitMutex;
use crate::models::invites::InvitePayload;
use crate::session::SessionStore;
use crate::state::StateStore;

/// How many times a manage dispatch polls for its data
pub const MANAGE_POLLS: u32 = 3;

/// How long a manage dispatch waits between polls in milliseconds
pub const MANAGE_POLL_MS: u64 = 500;

/// The state key stashed redirects live under
const REDIRECT_KEY: &str = "redirect_path";

/// How urls map to pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheme {
    /// Real paths under a base path
    History {
        /// The base path to strip from every url, with surrounding slashes
        base_path: String,
    },
    /// Routes ride the url fragment
    Fragment,
}

impl Scheme {
    /// Pick the scheme for the location the app loaded from
    ///
    /// Project page hosts serve the app under `/{repo}/` so the first path
    /// segment becomes the base path; everything else uses the fragment.
    ///
    /// # Arguments
    ///
    /// * `location` - The url the app loaded from
    #[must_use]
    pub fn for_location(location: &Url) -> Self {
        let is_project_pages = location
            .host_str()
            .is_some_and(|host| host.ends_with(".github.io"));
        if is_project_pages {
            // the repo name is the first path segment
            if let Some(repo) = location
                .path_segments()
                .and_then(|mut segments| segments.next())
                .filter(|segment| !segment.is_empty())
            {
                return Scheme::History {
                    base_path: format!("/{repo}/"),
                };
            }
        }
        Scheme::Fragment
    }
}

/// The pages the app can land on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The organizer dashboard
    Dashboard,
    /// The event creation page
    Create,
    /// The management page for one event
    Manage(String),
    /// The guest facing invite page for one event
    Invite(String),
}

impl Route {
    /// Parse the route out of a url
    ///
    /// The fragment always wins since invite links carry their route there
    /// under both schemes. Unknown routes land on the dashboard.
    ///
    /// # Arguments
    ///
    /// * `location` - The url to parse
    /// * `scheme` - The scheme the app is running under
    #[must_use]
    pub fn parse(location: &Url, scheme: &Scheme) -> Self {
        // the fragment wins under either scheme
        if let Some(route) = location.fragment().and_then(Route::from_segments) {
            return route;
        }
        if let Scheme::History { base_path } = scheme {
            let path = location.path();
            // only strip the base path when it actually leads the path
            let stripped = path.strip_prefix(base_path.as_str()).unwrap_or(path);
            if let Some(route) = Route::from_segments(stripped) {
                return route;
            }
        }
        Route::Dashboard
    }

    /// Parse a route from its slash separated form
    fn from_segments(raw: &str) -> Option<Self> {
        let mut segments = raw.trim_matches('/').splitn(2, '/');
        match (segments.next(), segments.next()) {
            (Some("") | None, _) => Some(Route::Dashboard),
            (Some("dashboard"), _) => Some(Route::Dashboard),
            (Some("create"), _) => Some(Route::Create),
            (Some("manage"), Some(id)) if !id.is_empty() => Some(Route::Manage(id.to_owned())),
            (Some("invite"), Some(id)) if !id.is_empty() => Some(Route::Invite(id.to_owned())),
            _ => None,
        }
    }

    /// Render this route as a location string under a scheme
    ///
    /// # Arguments
    ///
    /// * `scheme` - The scheme to render under
    #[must_use]
    pub fn path(&self, scheme: &Scheme) -> String {
        let tail = match self {
            Route::Dashboard => String::new(),
            Route::Create => "create".to_owned(),
            Route::Manage(id) => format!("manage/{id}"),
            Route::Invite(id) => format!("invite/{id}"),
        };
        match scheme {
            Scheme::History { base_path } => format!("{base_path}{tail}"),
            Scheme::Fragment => format!("#{tail}"),
        }
    }

    /// Whether this route needs a logged in organizer
    ///
    /// Invite pages render purely from their payload so guests never log in.
    #[must_use]
    pub fn requires_login(&self) -> bool {
        !matches!(self, Route::Invite(_))
    }
}

/// Pull the invite payload out of an invite url if one is carried
///
/// # Arguments
///
/// * `location` - The url to read the `data=` param from
#[must_use]
pub fn decode_invite(location: &Url) -> Option<InvitePayload> {
    let (_, data) = location.query_pairs().find(|(key, _)| key == "data")?;
    InvitePayload::decode(&data).ok()
}

/// Where a dispatch landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Render this page
    Page(Route),
    /// The route needs a login; the intended path was stashed for later
    Login,
}

/// Dispatches parsed routes once the app is ready for them
pub struct Router {
    /// The scheme the app is running under
    scheme: Scheme,
    /// The init mutex dispatches wait on
    init: Arc<InitMutex>,
    /// The session store gating organizer routes
    sessions: Arc<SessionStore>,
    /// The state store redirects are stashed in
    state: Arc<dyn StateStore>,
    /// Checks whether the data for an event has arrived
    data_ready: Option<Box<dyn Fn(&str) -> bool + Send + Sync>>,
    /// How many times a manage dispatch polls for data
    polls: u32,
    /// How long to wait between polls
    poll_spacing: Duration,
    /// Serializes dispatches so at most one runs at a time
    dispatching: Mutex<()>,
}

impl Router {
    /// Create a router
    ///
    /// # Arguments
    ///
    /// * `scheme` - The scheme the app is running under
    /// * `init` - The init mutex dispatches wait on
    /// * `sessions` - The session store gating organizer routes
    /// * `state` - The state store redirects are stashed in
    #[must_use]
    pub fn new(
        scheme: Scheme,
        init: Arc<InitMutex>,
        sessions: Arc<SessionStore>,
        state: Arc<dyn StateStore>,
    ) -> Self {
        Router {
            scheme,
            init,
            sessions,
            state,
            data_ready: None,
            polls: MANAGE_POLLS,
            poll_spacing: Duration::from_millis(MANAGE_POLL_MS),
            dispatching: Mutex::new(()),
        }
    }

    /// Set the check for whether an events data has arrived
    ///
    /// # Arguments
    ///
    /// * `check` - The check, given an event id
    #[must_use]
    pub fn data_ready<F: Fn(&str) -> bool + Send + Sync + 'static>(mut self, check: F) -> Self {
        self.data_ready = Some(Box::new(check));
        self
    }

    /// Set how long a manage dispatch waits between polls
    #[must_use]
    pub fn poll_spacing(mut self, spacing: Duration) -> Self {
        self.poll_spacing = spacing;
        self
    }

    /// Get the scheme this router runs under
    #[must_use]
    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// Dispatch a url to a page
    ///
    /// # Arguments
    ///
    /// * `location` - The url to dispatch
    pub async fn dispatch(&self, location: &Url) -> Dispatch {
        // dispatches are serialized so a slow one cannot interleave with
        // the next navigation
        let _guard = self.dispatching.lock().await;
        let route = Route::parse(location, &self.scheme);
        // invites render purely from their payload so they skip the
        // bootstrap wait and the session gate entirely
        if let Route::Invite(_) = route {
            return Dispatch::Page(route);
        }
        self.init.wait_for_ready().await;
        if route.requires_login() && self.sessions.current().is_none() {
            // stash where they were headed so login can send them back
            self.stash_redirect(&route.path(&self.scheme));
            return Dispatch::Login;
        }
        if let Route::Manage(id) = &route {
            self.wait_for_event_data(id).await;
        }
        Dispatch::Page(route)
    }

    /// Poll for an events data before a manage dispatch
    ///
    /// The page dispatches either way; a miss just renders its not found
    /// state until the data shows up.
    async fn wait_for_event_data(&self, event_id: &str) {
        let Some(check) = &self.data_ready else {
            return;
        };
        for poll in 0..self.polls {
            if check(event_id) {
                return;
            }
            if poll + 1 < self.polls {
                tokio::time::sleep(self.poll_spacing).await;
            }
        }
        tracing::debug!(event_id, "event data never arrived, dispatching anyway");
    }

    /// Stash the path a login redirect should restore
    fn stash_redirect(&self, path: &str) {
        self.state.set(REDIRECT_KEY, path);
    }

    /// Take the stashed redirect path if one exists
    ///
    /// Reading clears the stash so a redirect only ever fires once.
    #[must_use]
    pub fn restore_redirect(&self) -> Option<String> {
        self.state.remove(REDIRECT_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStateStore;

    /// Build a router whose bootstrap is already done
    async fn router(scheme: Scheme, logged_in: bool) -> Router {
        let init = Arc::new(InitMutex::new());
        init.initialize(|| async { Ok(()) }).await.unwrap();
        let sessions = Arc::new(SessionStore::new(
            Arc::new(MemoryStateStore::new()),
            Arc::new(MemoryStateStore::new()),
        ));
        if logged_in {
            let user = crate::models::User {
                id: "U1".to_owned(),
                username: "ahart".to_owned(),
                name: "Alice Hart".to_owned(),
                email: "alice@example.com".to_owned(),
                branch: None,
                rank: None,
                role: crate::models::UserRole::User,
                created: chrono::Utc::now(),
            };
            sessions.save(user, false).unwrap();
        }
        Router::new(scheme, init, sessions, Arc::new(MemoryStateStore::new()))
            .poll_spacing(Duration::from_millis(0))
    }

    #[test]
    fn project_page_hosts_get_a_history_scheme() {
        let location = Url::parse("https://hart.github.io/eventcall/manage/E1").unwrap();
        assert_eq!(
            Scheme::for_location(&location),
            Scheme::History {
                base_path: "/eventcall/".to_owned()
            }
        );
        // other hosts ride the fragment
        let other = Url::parse("https://events.example.com/#create").unwrap();
        assert_eq!(Scheme::for_location(&other), Scheme::Fragment);
    }

    #[test]
    fn history_paths_parse_with_the_base_stripped() {
        let scheme = Scheme::History {
            base_path: "/eventcall/".to_owned(),
        };
        let cases = [
            ("https://hart.github.io/eventcall/", Route::Dashboard),
            ("https://hart.github.io/eventcall/create", Route::Create),
            (
                "https://hart.github.io/eventcall/manage/E1",
                Route::Manage("E1".to_owned()),
            ),
        ];
        for (raw, expected) in cases {
            let location = Url::parse(raw).unwrap();
            assert_eq!(Route::parse(&location, &scheme), expected, "url: {raw}");
        }
    }

    #[test]
    fn fragments_parse_under_either_scheme() {
        let location = Url::parse("https://hart.github.io/eventcall/?data=x#invite/E1").unwrap();
        let history = Scheme::History {
            base_path: "/eventcall/".to_owned(),
        };
        assert_eq!(
            Route::parse(&location, &history),
            Route::Invite("E1".to_owned())
        );
        let fragment_url = Url::parse("https://events.example.com/#manage/E2").unwrap();
        assert_eq!(
            Route::parse(&fragment_url, &Scheme::Fragment),
            Route::Manage("E2".to_owned())
        );
    }

    #[test]
    fn unknown_routes_land_on_the_dashboard() {
        let scheme = Scheme::Fragment;
        for raw in [
            "https://events.example.com/#what/is/this",
            "https://events.example.com/#manage",
            "https://events.example.com/",
        ] {
            let location = Url::parse(raw).unwrap();
            assert_eq!(Route::parse(&location, &scheme), Route::Dashboard, "url: {raw}");
        }
    }

    #[test]
    fn routes_render_back_to_paths() {
        let history = Scheme::History {
            base_path: "/eventcall/".to_owned(),
        };
        assert_eq!(Route::Manage("E1".to_owned()).path(&history), "/eventcall/manage/E1");
        assert_eq!(Route::Create.path(&Scheme::Fragment), "#create");
        assert_eq!(Route::Dashboard.path(&history), "/eventcall/");
    }

    #[tokio::test]
    async fn organizer_routes_gate_on_login() {
        let router = router(Scheme::Fragment, false).await;
        let location = Url::parse("https://events.example.com/#manage/E1").unwrap();
        assert_eq!(router.dispatch(&location).await, Dispatch::Login);
        // the intended path was stashed and reads exactly once
        assert_eq!(router.restore_redirect(), Some("#manage/E1".to_owned()));
        assert_eq!(router.restore_redirect(), None);
    }

    #[tokio::test]
    async fn invites_bypass_the_session_gate() {
        let router = router(Scheme::Fragment, false).await;
        let location = Url::parse("https://events.example.com/?data=x#invite/E1").unwrap();
        assert_eq!(
            router.dispatch(&location).await,
            Dispatch::Page(Route::Invite("E1".to_owned()))
        );
    }

    #[tokio::test]
    async fn logged_in_dispatches_land_on_their_page() {
        let router = router(Scheme::Fragment, true).await;
        let location = Url::parse("https://events.example.com/#create").unwrap();
        assert_eq!(router.dispatch(&location).await, Dispatch::Page(Route::Create));
    }

    #[tokio::test]
    async fn manage_dispatches_poll_for_data_then_go_anyway() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let polls = Arc::new(AtomicU32::new(0));
        let counter = polls.clone();
        let router = router(Scheme::Fragment, true)
            .await
            .data_ready(move |_| {
                counter.fetch_add(1, Ordering::AcqRel);
                false
            });
        let location = Url::parse("https://events.example.com/#manage/E1").unwrap();
        // the page still dispatches after the polls run dry
        assert_eq!(
            router.dispatch(&location).await,
            Dispatch::Page(Route::Manage("E1".to_owned()))
        );
        assert_eq!(polls.load(Ordering::Acquire), MANAGE_POLLS);
    }

    #[test]
    fn invite_payloads_decode_from_the_query() {
        let payload = InvitePayload {
            id: "E1".to_owned(),
            title: "Dining Out".to_owned(),
            date: chrono::NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
            time: chrono::NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
            location: "Club".to_owned(),
            description: String::new(),
            cover_image_url: None,
            flags: crate::models::EventFlags::default(),
            questions: Vec::new(),
            details: std::collections::HashMap::new(),
            template: None,
        };
        let raw = payload
            .invite_url("https://hart.github.io", "/eventcall/")
            .unwrap();
        let location = Url::parse(&raw).unwrap();
        let decoded = decode_invite(&location).unwrap();
        assert_eq!(decoded.id, "E1");
        assert_eq!(decoded.title, "Dining Out");
    }
}
