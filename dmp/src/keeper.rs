//! Background rotation of the access token.
//!
//! A [`SessionKeeper`] wakes up on a fixed period and trades the stored
//! refresh token for a new credential pair. It never gives up and never
//! backs off: a failed exchange leaves the stored pair untouched and the next
//! tick tries again with the same refresh token. A revoked refresh token
//! therefore fails silently on every tick until the user signs in again.
//!
//! # Example
//!
//! ```ignore
//! let keeper = SessionKeeper::new(exchange, store);
//! let handle = keeper.spawn();
//! // ... the session stays fresh while `handle` is alive ...
//! drop(handle); // stops the timer
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::backend::TokenExchange;
use crate::session::SessionStore;

/// What a single keeper tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No refresh token was stored; nothing was sent.
    Skipped,
    /// Both tokens were replaced.
    Refreshed,
    /// The exchange or the write-back failed; the stored pair is unchanged.
    Failed,
}

/// Periodically refreshes the stored credential pair.
#[derive(Clone)]
pub struct SessionKeeper {
    exchange: Arc<dyn TokenExchange>,
    store: Arc<dyn SessionStore>,
    period: Duration,
}

impl std::fmt::Debug for SessionKeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeeper")
            .field("store", &self.store)
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

impl SessionKeeper {
    /// Default refresh period (20 seconds).
    pub const DEFAULT_PERIOD: Duration = Duration::from_secs(20);

    /// Creates a keeper with the default period.
    #[must_use]
    pub fn new(exchange: Arc<dyn TokenExchange>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            exchange,
            store,
            period: Self::DEFAULT_PERIOD,
        }
    }

    /// Overrides the refresh period.
    ///
    /// A zero period is replaced by the default.
    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = if period.is_zero() {
            Self::DEFAULT_PERIOD
        } else {
            period
        };
        self
    }

    /// The refresh period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Runs one refresh cycle.
    pub async fn tick(&self) -> TickOutcome {
        let Some(refresh_token) = self.store.refresh_token() else {
            #[cfg(feature = "telemetry")]
            tracing::warn!("Refresh token not found, skipping token refresh");
            return TickOutcome::Skipped;
        };

        let credentials = match self.exchange.refresh(&refresh_token).await {
            Ok(credentials) => credentials,
            #[allow(unused_variables)]
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::error!(error = %err, "Failed to refresh access token");
                return TickOutcome::Failed;
            }
        };

        match self.store.set(&credentials) {
            Ok(()) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!("Access and refresh tokens rotated");
                TickOutcome::Refreshed
            }
            #[allow(unused_variables)]
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::error!(error = %err, "Failed to store refreshed tokens");
                TickOutcome::Failed
            }
        }
    }

    /// Runs one refresh cycle, giving up after one period.
    ///
    /// An exchange that has not answered by then counts as
    /// [`TickOutcome::Failed`] and the next tick tries again.
    async fn bounded_tick(&self) -> TickOutcome {
        match tokio::time::timeout(self.period, self.tick()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                #[cfg(feature = "telemetry")]
                tracing::error!(period = ?self.period, "Token refresh timed out");
                TickOutcome::Failed
            }
        }
    }

    /// Starts the timer on the current tokio runtime.
    ///
    /// The first refresh happens one period after the call. The timer runs
    /// until the returned handle is dropped or shut down; a tick in flight at
    /// that moment is abandoned.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use = "dropping the handle stops the keeper"]
    pub fn spawn(self) -> KeeperHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            #[cfg(feature = "telemetry")]
            tracing::info!(period = ?self.period, "Session keeper started");
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        tokio::select! {
                            () = token.cancelled() => break,
                            _ = self.bounded_tick() => {}
                        }
                    }
                }
            }
            #[cfg(feature = "telemetry")]
            tracing::info!("Session keeper stopped");
        });
        KeeperHandle {
            cancel,
            task: Some(task),
        }
    }
}

/// Owner of a running [`SessionKeeper`] timer.
///
/// Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct KeeperHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl KeeperHandle {
    /// Signals the timer to stop without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the timer has been asked to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stops the timer and waits for the background task to exit.
    ///
    /// A panic inside the task is logged, not propagated.
    #[allow(unused_variables)] // err is only used for tracing
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            #[cfg(feature = "telemetry")]
            tracing::error!(error = %err, "Session keeper task failed");
        }
    }
}

impl Drop for KeeperHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CredentialPair;
    use crate::session::MemorySessionStore;
    use crate::testing::FakeExchange;

    fn keeper(exchange: &Arc<FakeExchange>, store: &Arc<MemorySessionStore>) -> SessionKeeper {
        SessionKeeper::new(
            Arc::clone(exchange) as Arc<dyn TokenExchange>,
            Arc::clone(store) as Arc<dyn SessionStore>,
        )
    }

    #[tokio::test]
    async fn test_tick_rotates_both_tokens() {
        let exchange = Arc::new(FakeExchange::succeeding(CredentialPair::new("A2", "R2")));
        let store = Arc::new(MemorySessionStore::with_refresh_token("R1"));

        let outcome = keeper(&exchange, &store).tick().await;

        assert_eq!(outcome, TickOutcome::Refreshed);
        assert_eq!(exchange.seen_tokens(), vec!["R1".to_owned()]);
        assert_eq!(store.access_token().as_deref(), Some("A2"));
        assert_eq!(store.refresh_token().as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn test_tick_without_refresh_token_is_skipped() {
        let exchange = Arc::new(FakeExchange::succeeding(CredentialPair::new("A2", "R2")));
        let store = Arc::new(MemorySessionStore::new());

        let outcome = keeper(&exchange, &store).tick().await;

        assert_eq!(outcome, TickOutcome::Skipped);
        assert!(exchange.seen_tokens().is_empty());
        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token(), None);
    }

    #[tokio::test]
    async fn test_failed_exchange_keeps_credentials_and_retries() {
        let exchange = Arc::new(FakeExchange::failing());
        let store = Arc::new(MemorySessionStore::with_credentials(&CredentialPair::new(
            "A1", "R1",
        )));
        let keeper = keeper(&exchange, &store);

        assert_eq!(keeper.tick().await, TickOutcome::Failed);
        assert_eq!(keeper.tick().await, TickOutcome::Failed);

        assert_eq!(exchange.seen_tokens(), vec!["R1".to_owned(), "R1".to_owned()]);
        assert_eq!(store.access_token().as_deref(), Some("A1"));
        assert_eq!(store.refresh_token().as_deref(), Some("R1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once_per_period() {
        let exchange = Arc::new(FakeExchange::succeeding(CredentialPair::new("A2", "R2")));
        let store = Arc::new(MemorySessionStore::with_refresh_token("R1"));
        let handle = keeper(&exchange, &store).spawn();

        tokio::time::sleep(Duration::from_secs(19)).await;
        assert_eq!(exchange.calls(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(exchange.calls(), 1);
        assert_eq!(store.refresh_token().as_deref(), Some("R2"));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(exchange.calls(), 2);
        assert_eq!(exchange.seen_tokens()[1], "R2");

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_timer() {
        let exchange = Arc::new(FakeExchange::succeeding(CredentialPair::new("A2", "R2")));
        let store = Arc::new(MemorySessionStore::with_refresh_token("R1"));
        let handle = keeper(&exchange, &store)
            .with_period(Duration::from_secs(5))
            .spawn();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(exchange.calls(), 1);

        drop(handle);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(exchange.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_exchange_does_not_stall_timer_or_shutdown() {
        let exchange = Arc::new(FakeExchange::hanging());
        let store = Arc::new(MemorySessionStore::with_credentials(&CredentialPair::new(
            "A1", "R1",
        )));
        let handle = keeper(&exchange, &store).spawn();

        tokio::time::sleep(Duration::from_secs(121)).await;
        assert!(exchange.calls() >= 5, "calls: {}", exchange.calls());
        assert_eq!(store.refresh_token().as_deref(), Some("R1"));

        let stopped = tokio::time::timeout(Duration::from_secs(3600), handle.shutdown()).await;
        assert!(stopped.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_returns_after_task_panic() {
        let exchange = Arc::new(FakeExchange::panicking());
        let store = Arc::new(MemorySessionStore::with_refresh_token("R1"));
        let handle = keeper(&exchange, &store)
            .with_period(Duration::from_secs(5))
            .spawn();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(exchange.calls(), 1);

        handle.shutdown().await;
    }

    #[test]
    fn test_zero_period_falls_back_to_default() {
        let exchange = Arc::new(FakeExchange::failing());
        let store = Arc::new(MemorySessionStore::new());
        let keeper = keeper(&exchange, &store).with_period(Duration::ZERO);
        assert_eq!(keeper.period(), SessionKeeper::DEFAULT_PERIOD);
    }
}
