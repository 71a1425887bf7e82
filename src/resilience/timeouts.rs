//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap backend calls with a deadline
//! - Keep timeout errors distinct from transport errors
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - A timed-out forward is a failed outcome for the breaker and a 504 for the caller

use std::future::Future;
use std::time::Duration;

/// The deadline passed before the wrapped call finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineExceeded(pub Duration);

/// Run `fut` with a deadline.
pub async fn with_deadline<F, T>(deadline: Duration, fut: F) -> Result<T, DeadlineExceeded>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| DeadlineExceeded(deadline))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline() {
        let ok = with_deadline(Duration::from_secs(1), async { 7 }).await;
        assert_eq!(ok, Ok(7));

        let slow = with_deadline(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            7
        })
        .await;
        assert_eq!(slow, Err(DeadlineExceeded(Duration::from_secs(1))));
    }
}
