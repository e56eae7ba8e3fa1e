//! The retrying http transport every EventCall route handler rides on

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use super::Error;
use crate::state::StateStore;

/// The header the backend reports remaining rate limit quota in
const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// The state store key the credential rotation index is persisted under
const ROTATION_KEY: &str = "token_rotation_index";

/// Help serde default our max attempts to 4
fn default_max_attempts() -> u32 {
    4
}

/// Help serde default our base delay to 1000 milliseconds
fn default_base_delay_ms() -> u64 {
    1000
}

/// Help serde default jitter to enabled
fn default_jitter() -> bool {
    true
}

/// How a failed request gets retried
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RetryPolicy {
    /// The total number of attempts to make
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// The base delay in milliseconds between attempts
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Whether to add random jitter to each delay
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// Default to 4 attempts with a 1 second base delay and jitter
    fn default() -> Self {
        RetryPolicy {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// Get the delay to sleep before retrying after a failed attempt
    ///
    /// The delay for attempt n (0 indexed) is `base * 2^n` plus uniform
    /// jitter in `[0, base / 2)` when jitter is enabled.
    ///
    /// # Arguments
    ///
    /// * `attempt` - The 0 indexed attempt that just failed
    pub fn delay(&self, attempt: u32) -> Duration {
        // double the base delay for every attempt so far
        let backoff = self.base_delay_ms.saturating_mul(1u64 << attempt.min(16));
        // add jitter if its enabled and we have room to jitter in
        let jitter = if self.jitter && self.base_delay_ms >= 2 {
            rand::rng().random_range(0..self.base_delay_ms / 2)
        } else {
            0
        };
        Duration::from_millis(backoff + jitter)
    }
}

/// An ordered pool of credentials cycled on rate limit exhaustion
///
/// The current index is persisted in the per-tab state store so later
/// requests start at the credential the last rotation landed on.
#[derive(Clone)]
pub struct TokenPool {
    /// The tokens to cycle through
    tokens: Vec<String>,
    /// The auth scheme to prefix tokens with in the authorization header
    scheme: String,
    /// The per-tab store the rotation index is persisted in
    state: Arc<dyn StateStore>,
}

impl TokenPool {
    /// Create a new token pool
    ///
    /// # Arguments
    ///
    /// * `tokens` - The ordered credentials to cycle through
    /// * `state` - The per-tab store to persist the rotation index in
    #[must_use]
    pub fn new(tokens: Vec<String>, state: Arc<dyn StateStore>) -> Self {
        TokenPool {
            tokens,
            scheme: "token".to_owned(),
            state,
        }
    }

    /// Set the auth scheme to prefix tokens with
    ///
    /// # Arguments
    ///
    /// * `scheme` - The scheme to use (e.g. "Bearer")
    #[must_use]
    pub fn scheme<S: Into<String>>(mut self, scheme: S) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Get the index the pool currently points at
    fn index(&self) -> usize {
        self.state
            .get(ROTATION_KEY)
            .and_then(|raw| raw.parse::<usize>().ok())
            .map_or(0, |idx| idx % self.tokens.len().max(1))
    }

    /// Get the authorization header value for the current credential
    pub fn current(&self) -> Option<String> {
        let token = self.tokens.get(self.index())?;
        Some(format!("{} {}", self.scheme, token))
    }

    /// Advance to the next credential persisting the new index
    pub fn advance(&self) {
        if self.tokens.is_empty() {
            return;
        }
        // step the index forward wrapping around the pool
        let next = (self.index() + 1) % self.tokens.len();
        self.state.set(ROTATION_KEY, &next.to_string());
        tracing::debug!(index = next, "rotated to next credential");
    }
}

/// Check whether a successful response says our rate limit quota is spent
///
/// # Arguments
///
/// * `resp` - The response to inspect
fn quota_exhausted(resp: &reqwest::Response) -> bool {
    resp.headers()
        .get(REMAINING_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<i64>().ok())
        .is_some_and(|remaining| remaining <= 0)
}

/// The retrying transport under every route handler
///
/// Retries 5xx and 429 responses with exponential backoff and jitter; any
/// other 4xx fails immediately. When a credential pool is configured a rate
/// limited response advances the pool before the next attempt.
#[derive(Clone)]
pub struct Transport {
    /// The reqwest client to send requests with
    client: reqwest::Client,
    /// The retry policy for transiently failed requests
    policy: RetryPolicy,
    /// The credential rotation pool if one is configured
    pool: Option<TokenPool>,
}

impl Transport {
    /// Create a new transport
    ///
    /// # Arguments
    ///
    /// * `client` - The reqwest client to send requests with
    /// * `policy` - The retry policy to use
    #[must_use]
    pub fn new(client: &reqwest::Client, policy: RetryPolicy) -> Self {
        Transport {
            client: client.clone(),
            policy,
            pool: None,
        }
    }

    /// Set a credential rotation pool on this transport
    ///
    /// # Arguments
    ///
    /// * `pool` - The pool of credentials to cycle through
    #[must_use]
    pub fn pool(mut self, pool: TokenPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Get the underlying reqwest client to build requests with
    #[must_use]
    pub fn raw(&self) -> &reqwest::Client {
        &self.client
    }

    /// Send a request retrying transient failures
    ///
    /// # Arguments
    ///
    /// * `req` - The request to send
    /// * `endpoint` - A short name for the endpoint for logging
    pub async fn send(
        &self,
        req: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<reqwest::Response, Error> {
        // track the last error so we can surface it after our final attempt
        let mut last: Option<Error> = None;
        for attempt in 0..self.policy.max_attempts {
            // sleep out our backoff before every attempt after the first
            if attempt > 0 {
                tokio::time::sleep(self.policy.delay(attempt - 1)).await;
            }
            // reclone the builder since sending consumes it
            let Some(mut cloned) = req.try_clone() else {
                return Err(Error::new("request body is not retryable"));
            };
            // inject the current credential if a pool is configured
            if let Some(pool) = &self.pool {
                if let Some(auth) = pool.current() {
                    cloned = cloned.header("authorization", auth);
                }
            }
            match self.client.execute(cloned.build()?).await {
                Ok(resp) if resp.status().is_success() => {
                    // a spent quota on a success still rotates so the next
                    // request starts on a fresh credential
                    if quota_exhausted(&resp) {
                        if let Some(pool) = &self.pool {
                            pool.advance();
                        }
                    }
                    return Ok(resp);
                }
                Ok(resp) => {
                    let status = resp.status();
                    // a rate limited response advances the credential pool
                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        if let Some(pool) = &self.pool {
                            pool.advance();
                        }
                    }
                    let error = Error::from_response(resp).await;
                    // only 5xx and 429 are worth another attempt
                    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                    {
                        tracing::warn!(
                            endpoint,
                            attempt,
                            status = status.as_u16(),
                            "retrying failed request"
                        );
                        last = Some(error);
                        continue;
                    }
                    return Err(error);
                }
                Err(error) => {
                    // never got an answer so this is network or timeout
                    tracing::warn!(endpoint, attempt, %error, "retrying unsent request");
                    last = Some(Error::from(error));
                    continue;
                }
            }
        }
        // all attempts are spent so surface the last error we saw
        Err(last.unwrap_or_else(|| Error::new("request failed with no attempts made")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStateStore;

    #[test]
    fn backoff_delays() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay_ms: 1000,
            jitter: true,
        };
        // check the delay window for each attempt index
        for attempt in 0..4u32 {
            let base = 1000u64 * (1 << attempt);
            for _ in 0..32 {
                let delay = policy.delay(attempt).as_millis() as u64;
                // delay must land in [base * 2^n, base * 2^n + base / 2)
                assert!(delay >= base, "delay {delay} under floor {base}");
                assert!(delay < base + 500, "delay {delay} over ceiling");
            }
        }
    }

    #[test]
    fn backoff_without_jitter_is_exact() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay_ms: 200,
            jitter: false,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(200));
        assert_eq!(policy.delay(1), Duration::from_millis(400));
        assert_eq!(policy.delay(2), Duration::from_millis(800));
    }

    #[test]
    fn pool_rotation_persists() {
        let state = Arc::new(MemoryStateStore::new());
        let tokens = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
        let pool = TokenPool::new(tokens.clone(), state.clone());
        assert_eq!(pool.current().as_deref(), Some("token a"));
        // advancing steps through the pool and wraps
        pool.advance();
        assert_eq!(pool.current().as_deref(), Some("token b"));
        pool.advance();
        pool.advance();
        assert_eq!(pool.current().as_deref(), Some("token a"));
        // a fresh pool over the same state store starts where we left off
        pool.advance();
        let fresh = TokenPool::new(tokens, state);
        assert_eq!(fresh.current().as_deref(), Some("token b"));
    }
}
