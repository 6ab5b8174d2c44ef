//! Retry wrapper for transient GATT errors (§5, §7), generalized from the
//! teacher's `transport::retry::RetryExecutor` (`crates/transport/src/retry.rs`).
//! The teacher's `CircuitBreaker` has no counterpart here — a single
//! pairing's link either works or it doesn't, there is no fleet of peers to
//! trip a breaker over, so it is dropped (see `DESIGN.md`).

use std::future::Future;

/// GATT operations get `DEFAULT_ATTEMPTS` attempts by default (§5); pairing
/// mutation (`add_pairing`/`remove_pairing`) uses `PAIRING_MUTATION_ATTEMPTS`.
pub const DEFAULT_ATTEMPTS: usize = 2;
pub const PAIRING_MUTATION_ATTEMPTS: usize = 10;

/// Retry an async GATT operation up to `attempts` times, the accessory
/// "is allowed to disconnect us any time" (original source comment),
/// surfacing the final attempt's error if every attempt fails.
pub async fn retry_gatt<F, Fut, T, E>(attempts: usize, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut last_err = None;
    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt + 1 == attempts {
                    return Err(err);
                }
                tracing::debug!(attempt, "GATT operation failed, retrying");
                last_err = Some(err);
            }
        }
    }
    // Unreachable given attempts >= 1, but keeps the compiler happy without
    // an `unwrap` on the caller-visible path.
    Err(last_err.expect("loop always returns before exhausting without an error"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_works() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), &str> = retry_gatt(DEFAULT_ATTEMPTS, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_up_to_the_attempt_budget() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), &str> = retry_gatt(DEFAULT_ATTEMPTS, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("transient")
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), DEFAULT_ATTEMPTS);
    }

    #[tokio::test]
    async fn succeeds_on_a_later_attempt() {
        let calls = AtomicUsize::new(0);
        let result: Result<&str, &str> = retry_gatt(3, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err("transient")
            } else {
                Ok("ok")
            }
        })
        .await;
        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn pairing_mutation_gets_ten_attempts() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), &str> = retry_gatt(PAIRING_MUTATION_ATTEMPTS, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("transient")
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), PAIRING_MUTATION_ATTEMPTS);
    }
}
