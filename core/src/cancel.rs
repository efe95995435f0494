//! Caller-side cancellation and deadlines for in-flight calls.
//!
//! `CancellationToken::new()` returns the token the caller keeps and the
//! receiver handed to the call. Every suspension point of a call (each HTTP
//! leg, the `Retry-After` wait, each poll interval) is raced against the
//! receiver, so cancelling abandons the call at its next await.

use std::future::{pending, Future};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Self, CancellationReceiver) {
        let (sender, receiver) = watch::channel(false);
        let token = Self {
            sender: Arc::new(sender),
        };
        let receiver = CancellationReceiver {
            receiver: Some(receiver),
            deadline: None,
        };
        (token, receiver)
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancellationReceiver {
    receiver: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

impl CancellationReceiver {
    /// A receiver that never fires.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// A timeout too large to represent as an instant leaves no deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        let signalled = self.receiver.as_ref().is_some_and(|rx| *rx.borrow());
        let expired = self.deadline.is_some_and(|d| d <= Instant::now());
        signalled || expired
    }

    /// Run `fut` unless the call is cancelled first.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, ApiError> {
        if self.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(ApiError::Cancelled),
            out = fut => Ok(out),
        }
    }

    /// Timer wait that ends early with `Cancelled`.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ApiError> {
        self.guard(tokio::time::sleep(duration)).await
    }

    async fn cancelled(&self) {
        let deadline = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };
        let signal = async {
            match &self.receiver {
                Some(rx) => {
                    let mut rx = rx.clone();
                    // A dropped token can no longer cancel.
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        pending::<()>().await;
                    }
                }
                None => pending::<()>().await,
            }
        };
        tokio::select! {
            _ = deadline => {}
            _ = signal => {}
        }
    }
}
