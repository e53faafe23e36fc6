//! Submission rate limiter.
//!
//! Bounds how many `submit_document` calls may be in flight at once across
//! the whole run, independent of how many collections are active. The
//! permit covers only the submission call itself, not the time the service
//! spends processing the upload.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::IngestError;

/// Counting semaphore over submission slots.
pub struct UploadLimiter {
    sem: Arc<Semaphore>,
}

/// A held submission slot. Dropping it releases the slot.
pub struct UploadPermit {
    _permit: OwnedSemaphorePermit,
}

impl UploadLimiter {
    /// Create a limiter with a fixed number of submission slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            sem: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Wait for a free slot.
    ///
    /// Returns `Cancelled` without consuming a slot if the token fires
    /// first, or if the limiter has been closed.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<UploadPermit, IngestError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(IngestError::Cancelled),
            permit = Arc::clone(&self.sem).acquire_owned() => match permit {
                Ok(permit) => Ok(UploadPermit { _permit: permit }),
                // Closed limiter means the run is shutting down.
                Err(_) => Err(IngestError::Cancelled),
            },
        }
    }

    /// Close the limiter; every blocked and future `acquire` fails promptly.
    pub fn close(&self) {
        self.sem.close();
    }

    /// Number of currently free slots.
    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let limiter = UploadLimiter::new(2);
        let cancel = CancellationToken::new();

        let p1 = limiter.acquire(&cancel).await.unwrap();
        let _p2 = limiter.acquire(&cancel).await.unwrap();
        assert_eq!(limiter.available(), 0);

        drop(p1);
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn test_acquire_blocks_at_capacity() {
        let limiter = Arc::new(UploadLimiter::new(1));
        let cancel = CancellationToken::new();

        let held = limiter.acquire(&cancel).await.unwrap();

        let waiter = {
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.acquire(&cancel).await.map(|_| ()) })
        };

        // The second acquire cannot complete while the slot is held.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_acquire_does_not_consume_slot() {
        let limiter = UploadLimiter::new(1);
        let cancel = CancellationToken::new();

        let _held = limiter.acquire(&cancel).await.unwrap();

        cancel.cancel();
        let result = limiter.acquire(&cancel).await;
        assert_eq!(result.err(), Some(IngestError::Cancelled));
        assert_eq!(limiter.available(), 0);
    }

    #[tokio::test]
    async fn test_close_unblocks_waiters() {
        let limiter = Arc::new(UploadLimiter::new(1));
        let cancel = CancellationToken::new();

        let _held = limiter.acquire(&cancel).await.unwrap();

        let waiter = {
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.acquire(&cancel).await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        limiter.close();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("blocked acquire must resolve after close")
            .unwrap();
        assert_eq!(result.err(), Some(IngestError::Cancelled));
    }
}
