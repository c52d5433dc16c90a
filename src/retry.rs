//! Bounded immediate retry for optimistic-version conflicts.
//!
//! Wraps a versioned read-modify-write. Only version conflicts are retried,
//! with no delay between attempts; any other error propagates at once.
use std::future::Future;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can report a stale-version write rejected by storage.
pub trait OptimisticConflict {
    fn is_version_conflict(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt hit a version conflict.
    #[error("{label}: still conflicting after {attempts} attempts")]
    Exhausted { label: String, attempts: u32 },
    #[error(transparent)]
    Operation(E),
}

impl<E> RetryError<E> {
    /// Exhaustion means "temporarily unavailable", not a data fault.
    pub fn is_transient(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

/// Run `operation` until it succeeds, fails with a non-conflict error, or
/// `max_attempts` tries (at least one) have all conflicted.
pub async fn execute<T, E, F, Fut>(
    label: &str,
    max_attempts: u32,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: OptimisticConflict,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_version_conflict() => {
                if attempt >= max_attempts {
                    warn!(label, attempts = attempt, "optimistic retry exhausted");
                    return Err(RetryError::Exhausted {
                        label: label.to_string(),
                        attempts: attempt,
                    });
                }
                debug!(label, attempt, max_attempts, "version conflict, retrying");
            }
            Err(err) => return Err(RetryError::Operation(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum Fake {
        Conflict,
        Broken,
    }

    impl std::fmt::Display for Fake {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl std::error::Error for Fake {}

    impl OptimisticConflict for Fake {
        fn is_version_conflict(&self) -> bool {
            matches!(self, Fake::Conflict)
        }
    }

    /// Fails with a conflict `conflicts` times, then returns the attempt number.
    async fn run_with_conflicts(conflicts: u32, max_attempts: u32) -> (Result<u32, RetryError<Fake>>, u32) {
        let calls = AtomicU32::new(0);
        let result = execute("increase view count", max_attempts, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n <= conflicts {
                    Err(Fake::Conflict)
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn success_after_fewer_conflicts_than_bound() {
        let (result, calls) = run_with_conflicts(4, 5).await;
        assert_eq!(result.unwrap(), 5);
        assert_eq!(calls, 5);

        let (result, calls) = run_with_conflicts(0, 5).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn exhausted_when_conflicts_reach_bound() {
        let (result, calls) = run_with_conflicts(5, 5).await;
        match result {
            Err(err @ RetryError::Exhausted { .. }) => {
                assert!(err.is_transient());
                if let RetryError::Exhausted { label, attempts } = err {
                    assert_eq!(label, "increase view count");
                    assert_eq!(attempts, 5);
                }
            }
            other => panic!("expected exhaustion, got {:?}", other.map(|_| ())),
        }
        assert_eq!(calls, 5);

        let (result, calls) = run_with_conflicts(10, 3).await;
        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute("delete post", 5, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Fake::Broken) }
        })
        .await;
        match result {
            Err(RetryError::Operation(err)) => assert_eq!(err, Fake::Broken),
            other => panic!("expected operation error, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let (result, calls) = run_with_conflicts(0, 0).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls, 1);
    }
}
