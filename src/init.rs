//! Single flight app initialization and startup wait gates
//!
//! Several entry points can race to initialize the app (a route dispatch, a
//! deep link, a manual refresh). The init mutex makes sure the bootstrap
//! task runs exactly once while every other caller just waits for it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;

use crate::Error;

/// How often wait gates poll in milliseconds
pub const TICK_MS: u64 = 50;

/// The ceiling on waiting for session restoration in milliseconds
pub const SESSION_CEILING_MS: u64 = 10_000;

/// The ceiling on waiting for page data in milliseconds
pub const DATA_CEILING_MS: u64 = 5_000;

/// Where initialization currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    /// Nothing has started the bootstrap yet
    NotStarted,
    /// The bootstrap task is running
    Running,
    /// The bootstrap finished; waiters may proceed
    Ready,
}

/// Runs the bootstrap task exactly once
pub struct InitMutex {
    /// Whether any caller has claimed the bootstrap
    started: AtomicBool,
    /// Broadcasts the current init state
    state_tx: watch::Sender<InitState>,
}

impl Default for InitMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl InitMutex {
    /// Create a fresh init mutex
    #[must_use]
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(InitState::NotStarted);
        InitMutex {
            started: AtomicBool::new(false),
            state_tx,
        }
    }

    /// Get the current init state
    #[must_use]
    pub fn state(&self) -> InitState {
        *self.state_tx.borrow()
    }

    /// Run the bootstrap task if nobody else has
    ///
    /// The first caller runs the task; everyone else waits for it to finish.
    /// The state flips to ready even when the task errors so waiters never
    /// hang on a failed bootstrap.
    ///
    /// # Arguments
    ///
    /// * `task` - The bootstrap task to run
    pub async fn initialize<F, Fut>(&self, task: F) -> Result<(), Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), Error>>,
    {
        // only the first caller claims the bootstrap
        if self.started.swap(true, Ordering::AcqRel) {
            self.wait_for_ready().await;
            return Ok(());
        }
        self.state_tx.send_replace(InitState::Running);
        let result = task().await;
        self.state_tx.send_replace(InitState::Ready);
        if let Err(error) = &result {
            tracing::error!(error = %error, "bootstrap failed");
        }
        result
    }

    /// Wait until the bootstrap has finished
    ///
    /// This never errors; a bootstrap that has not been claimed yet still
    /// counts as something to wait for.
    pub async fn wait_for_ready(&self) {
        let mut rx = self.state_tx.subscribe();
        loop {
            if *rx.borrow_and_update() == InitState::Ready {
                return;
            }
            // the sender lives in self so this only fails if self is gone
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Poll a readiness check until it passes or a ceiling is hit
///
/// Returns whether the check ever passed.
///
/// # Arguments
///
/// * `ready` - The readiness check to poll
/// * `ceiling` - The longest to wait
pub async fn wait_for<F: Fn() -> bool>(ready: F, ceiling: Duration) -> bool {
    let tick = Duration::from_millis(TICK_MS);
    let deadline = tokio::time::Instant::now() + ceiling;
    loop {
        if ready() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(tick).await;
    }
}

/// Wait for session restoration with its standard ceiling
///
/// # Arguments
///
/// * `ready` - The readiness check to poll
pub async fn wait_for_session<F: Fn() -> bool>(ready: F) -> bool {
    wait_for(ready, Duration::from_millis(SESSION_CEILING_MS)).await
}

/// Wait for page data with its standard ceiling
///
/// # Arguments
///
/// * `ready` - The readiness check to poll
pub async fn wait_for_data<F: Fn() -> bool>(ready: F) -> bool {
    wait_for(ready, Duration::from_millis(DATA_CEILING_MS)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[tokio::test]
    async fn bootstrap_runs_exactly_once() {
        let init = Arc::new(InitMutex::new());
        let runs = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let init = init.clone();
            let runs = runs.clone();
            handles.push(tokio::spawn(async move {
                init.initialize(|| async {
                    runs.fetch_add(1, Ordering::AcqRel);
                    Ok(())
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(runs.load(Ordering::Acquire), 1);
        assert_eq!(init.state(), InitState::Ready);
    }

    #[tokio::test]
    async fn failed_bootstraps_still_release_waiters() {
        let init = Arc::new(InitMutex::new());
        let result = init
            .initialize(|| async { Err(Error::new("boot blew up")) })
            .await;
        assert!(result.is_err());
        // the state still flipped so waiters return immediately
        assert_eq!(init.state(), InitState::Ready);
        init.wait_for_ready().await;
    }

    #[tokio::test]
    async fn wait_for_passes_once_ready() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = flag.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            setter.store(true, Ordering::Release);
        });
        let checker = flag.clone();
        assert!(wait_for(move || checker.load(Ordering::Acquire), Duration::from_millis(1000)).await);
    }

    #[tokio::test]
    async fn wait_for_gives_up_at_the_ceiling() {
        assert!(!wait_for(|| false, Duration::from_millis(120)).await);
    }
}
