//! Cooperative cancellation with a bounded grace window.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct CancelState {
    requested_at: Option<Instant>,
    grace_period: Duration,
    finalized: bool,
}

/// Issues and observes one cancellation.
///
/// Setting the signal is immediate. The grace window starts at the request
/// and bounds how long cleanup may take. Controllers are single-use: once
/// finalized, a fresh one must be built for the next operation.
///
/// Clones share the same signal, so the interrupt handler and the pipeline
/// can each hold one.
#[derive(Debug, Clone)]
pub struct CancellationController {
    token: CancellationToken,
    state: Arc<Mutex<CancelState>>,
}

impl CancellationController {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            state: Arc::new(Mutex::new(CancelState {
                requested_at: None,
                grace_period,
                finalized: false,
            })),
        }
    }

    /// Token handed to step executors.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signals cancellation with the given grace period.
    ///
    /// Only the first request counts; later ones neither move the deadline
    /// nor change the grace period.
    pub fn request_cancellation(&self, grace_period: Duration) {
        {
            let mut state = self.lock_state();
            if state.requested_at.is_some() {
                return;
            }
            state.requested_at = Some(Instant::now());
            state.grace_period = grace_period;
        }
        tracing::info!(grace_ms = grace_period.as_millis() as u64, "cancellation requested");
        self.token.cancel();
    }

    /// Signals cancellation with the grace period given at construction.
    pub fn cancel(&self) {
        let grace = self.grace_period();
        self.request_cancellation(grace);
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn grace_period(&self) -> Duration {
        self.lock_state().grace_period
    }

    /// When the grace window closes, if cancellation was requested.
    pub fn deadline(&self) -> Option<Instant> {
        let state = self.lock_state();
        state.requested_at.map(|at| at + state.grace_period)
    }

    /// Gives `cleanup` until the end of the grace window, then returns
    /// regardless. Yields `None` if the window closed first.
    ///
    /// Marks the controller finalized.
    pub async fn await_grace_window<F>(&self, cleanup: F) -> Option<F::Output>
    where
        F: Future,
    {
        let deadline = self
            .deadline()
            .unwrap_or_else(|| Instant::now() + self.grace_period());
        let result = tokio::time::timeout_at(deadline, cleanup).await.ok();
        self.finalize();
        result
    }

    /// Marks the controller as fully cancelled.
    pub fn finalize(&self) {
        self.lock_state().finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.lock_state().finalized
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CancelState> {
        // The state is plain data; a poisoned lock still holds a usable value.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_request_is_immediately_observable() {
        let controller = CancellationController::new(Duration::from_secs(5));
        assert!(!controller.is_cancelled());
        assert!(controller.deadline().is_none());

        controller.request_cancellation(Duration::from_secs(2));

        assert!(controller.is_cancelled());
        assert!(controller.token().is_cancelled());
        assert_eq!(controller.grace_period(), Duration::from_secs(2));
        assert_eq!(controller.deadline(), Some(Instant::now() + Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_does_not_move_deadline() {
        let controller = CancellationController::new(Duration::from_secs(5));
        controller.cancel();
        let first = controller.deadline();

        tokio::time::sleep(Duration::from_secs(1)).await;
        controller.request_cancellation(Duration::from_secs(60));

        assert_eq!(controller.deadline(), first);
        assert_eq!(controller.grace_period(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_window_returns_early_when_cleanup_finishes() {
        let controller = CancellationController::new(Duration::from_secs(5));
        controller.cancel();
        let start = Instant::now();

        let result = controller
            .await_grace_window(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                "cleaned"
            })
            .await;

        assert_eq!(result, Some("cleaned"));
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert!(controller.is_finalized());
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_window_never_blocks_past_deadline() {
        let controller = CancellationController::new(Duration::from_secs(5));
        controller.cancel();
        let start = Instant::now();

        let result = controller
            .await_grace_window(std::future::pending::<()>())
            .await;

        assert!(result.is_none());
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert!(controller.is_finalized());
    }

    #[tokio::test]
    async fn test_clones_share_the_signal() {
        let controller = CancellationController::new(Duration::from_millis(10));
        let handle = controller.clone();
        handle.cancel();
        assert!(controller.is_cancelled());
    }
}
