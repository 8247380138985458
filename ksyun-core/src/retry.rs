//! Bounded retries around vendor calls
//!
//! Every error is sorted into one of three classes. Transient errors are
//! retried until either the attempt budget or the wall-clock deadline of the
//! policy runs out; not-found and fatal errors end the loop at once.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use log::{debug, info};

/// How an error should be treated by the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The target does not exist
    NotFound,
    /// Rate limiting, eventual consistency or a transient backend failure
    Transient,
    Fatal,
}

/// Errors that know their retry class
pub trait Classify {
    fn classify(&self) -> ErrorClass;
}

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 10;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Retry budget for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wall-clock deadline for the whole loop
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Sleep between attempts
    pub interval: Duration,
}

impl RetryPolicy {
    /// Key pair operations
    pub const KEY: Self = Self::with_timeout(Duration::from_secs(60));
    /// Most mutating calls
    pub const DEFAULT: Self = Self::with_timeout(Duration::from_secs(25 * 60));
    /// Reads right after a create
    pub const READ: Self = Self::with_timeout(Duration::from_secs(5 * 60));
    /// Detaching and deleting mitigation gateways
    pub const DISASSOCIATE: Self = Self::with_timeout(Duration::from_secs(15 * 60));
    pub const SHORT: Self = Self::with_timeout(Duration::from_secs(3 * 60));
    /// Bare-metal host lifecycle
    pub const INSTANCE: Self = Self::with_timeout(Duration::from_secs(3 * 60 * 60));

    pub const fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            max_retries: DEFAULT_MAX_RETRIES,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Why a retried operation gave up
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("{0}")]
    NotFound(E),

    #[error("{0}")]
    Fatal(E),

    #[error("giving up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("timed out after {elapsed:?}: {last}")]
    Timeout { elapsed: Duration, last: E },
}

impl<E> RetryError<E> {
    /// The last error seen
    pub fn last(&self) -> &E {
        match self {
            RetryError::NotFound(e) | RetryError::Fatal(e) => e,
            RetryError::Exhausted { last, .. } | RetryError::Timeout { last, .. } => last,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::NotFound(e) | RetryError::Fatal(e) => e,
            RetryError::Exhausted { last, .. } | RetryError::Timeout { last, .. } => last,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RetryError::NotFound(_))
    }
}

/// Run `op`, retrying transient failures
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, op: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + fmt::Display,
{
    run(policy, false, op).await
}

/// Run a delete; a not-found answer means the target is already gone
pub async fn retry_delete<T, E, F, Fut>(policy: &RetryPolicy, op: F) -> Result<(), RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + fmt::Display,
{
    match run(policy, false, op).await {
        Ok(_) => Ok(()),
        Err(RetryError::NotFound(e)) => {
            debug!("target already gone: {}", e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Run a lookup that may not see a freshly created target yet
///
/// Not-found answers are retried like transient failures.
pub async fn retry_until_found<T, E, F, Fut>(
    policy: &RetryPolicy,
    op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + fmt::Display,
{
    run(policy, true, op).await
}

async fn run<T, E, F, Fut>(
    policy: &RetryPolicy,
    retry_not_found: bool,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + fmt::Display,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        match err.classify() {
            ErrorClass::Fatal => return Err(RetryError::Fatal(err)),
            ErrorClass::NotFound if !retry_not_found => return Err(RetryError::NotFound(err)),
            ErrorClass::NotFound | ErrorClass::Transient => {}
        }

        if attempts > policy.max_retries {
            return Err(RetryError::Exhausted {
                attempts,
                last: err,
            });
        }
        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            return Err(RetryError::Timeout { elapsed, last: err });
        }

        info!(
            "Attempt {}/{} failed, retrying in {:?}: {}",
            attempts,
            policy.max_retries + 1,
            policy.interval,
            err
        );
        tokio::time::sleep(policy.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct TestError {
        class: ErrorClass,
        attempt: u32,
    }

    impl TestError {
        fn new(class: ErrorClass, attempt: u32) -> Self {
            Self { class, attempt }
        }
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?} on attempt {}", self.class, self.attempt)
        }
    }

    impl Classify for TestError {
        fn classify(&self) -> ErrorClass {
            self.class
        }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy::DEFAULT.with_interval(Duration::ZERO)
    }

    #[tokio::test]
    async fn nine_transient_failures_then_success() {
        let mut calls = 0;
        let result = retry(&fast(), || {
            calls += 1;
            let attempt = calls;
            async move {
                if attempt < 10 {
                    Err(TestError::new(ErrorClass::Transient, attempt))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 10);
        assert_eq!(calls, 10);
    }

    #[tokio::test]
    async fn eleventh_failure_is_reported_without_a_twelfth_call() {
        let mut calls = 0;
        let result: Result<(), _> = retry(&fast(), || {
            calls += 1;
            let attempt = calls;
            async move { Err(TestError::new(ErrorClass::Transient, attempt)) }
        })
        .await;

        assert_eq!(calls, 11);
        match result.unwrap_err() {
            RetryError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 11);
                assert_eq!(last.attempt, 11);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = retry(&fast(), || {
            calls += 1;
            async { Err(TestError::new(ErrorClass::Fatal, 1)) }
        })
        .await;

        assert_eq!(calls, 1);
        assert!(matches!(result, Err(RetryError::Fatal(_))));
    }

    #[tokio::test]
    async fn delete_of_missing_target_succeeds_after_one_call() {
        let mut calls = 0;
        let result = retry_delete(&fast(), || {
            calls += 1;
            async { Err::<(), _>(TestError::new(ErrorClass::NotFound, 1)) }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn plain_retry_reports_not_found() {
        let result: Result<(), _> = retry(&fast(), || async {
            Err(TestError::new(ErrorClass::NotFound, 1))
        })
        .await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn lookup_waits_for_target_to_appear() {
        let mut calls = 0;
        let result = retry_until_found(&fast(), || {
            calls += 1;
            let attempt = calls;
            async move {
                if attempt < 3 {
                    Err(TestError::new(ErrorClass::NotFound, attempt))
                } else {
                    Ok("knad-1")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "knad-1");
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn deadline_stops_the_loop() {
        let policy = RetryPolicy::with_timeout(Duration::ZERO).with_interval(Duration::ZERO);
        let mut calls = 0;
        let result: Result<(), _> = retry(&policy, || {
            calls += 1;
            async { Err(TestError::new(ErrorClass::Transient, 1)) }
        })
        .await;

        assert_eq!(calls, 1);
        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Timeout { .. }));
        assert_eq!(err.into_inner().attempt, 1);
    }

    #[test]
    fn presets_share_the_default_budget() {
        assert_eq!(RetryPolicy::KEY.timeout, Duration::from_secs(60));
        assert_eq!(RetryPolicy::INSTANCE.timeout, Duration::from_secs(10_800));
        assert_eq!(RetryPolicy::default().max_retries, DEFAULT_MAX_RETRIES);
    }
}
