//! Sync Poller
//!
//! Retry-until-confirmed primitive. Calls a predicate on a fixed interval
//! until it answers `true`. A predicate error counts as "not yet".
//!
//! Unbounded by default: bridge checkpoints are externally timed, so
//! eventual completion wins over latency. Owners can bound a poll with
//! `max_attempts` / `max_duration` and stop it through a [`CancelToken`].

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::error::ChainError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("Polling cancelled")]
    Cancelled,

    #[error("Gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("Timed out after {attempts} attempts")]
    TimedOut { attempts: u32 },
}

impl SyncError {
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Cancelled => "SYNC_CANCELLED",
            SyncError::Exhausted { .. } => "SYNC_EXHAUSTED",
            SyncError::TimedOut { .. } => "SYNC_TIMED_OUT",
        }
    }
}

/// Polling policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// `None` polls forever
    pub max_attempts: Option<u32>,
    /// `None` polls forever
    pub max_duration: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
            max_duration: None,
        }
    }
}

impl PollConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }
}

/// Owner side of a cancellable poll
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Poller side of a cancellable poll
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Create a linked cancel handle / token pair
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        // No receivers left means the poll already finished
        let _ = self.tx.send(true);
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

impl CancelToken {
    /// Token that is never cancelled
    pub fn never() -> Self {
        // Sender dropped immediately: `cancelled()` then never resolves
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Never resolves if the handle is dropped
    /// without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Poll `predicate(id)` until it returns `Ok(true)`.
///
/// Returns the number of attempts made. `Ok(false)` and `Err(_)` both sleep
/// `config.interval` and retry with the same id.
pub async fn wait_for_sync<F, Fut>(
    id: &str,
    mut predicate: F,
    config: &PollConfig,
    mut cancel: CancelToken,
) -> Result<u32, SyncError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, ChainError>>,
{
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        attempts += 1;
        match predicate(id.to_string()).await {
            Ok(true) => {
                debug!(id, attempts, "Synced");
                return Ok(attempts);
            }
            Ok(false) => {
                debug!(id, attempts, "Not synced yet");
            }
            Err(e) => {
                warn!(id, attempts, error = %e, "Sync check failed, will retry");
            }
        }

        if let Some(max) = config.max_attempts
            && attempts >= max
        {
            return Err(SyncError::Exhausted { attempts });
        }

        let mut sleep_for = config.interval;
        if let Some(max_duration) = config.max_duration {
            let elapsed = started.elapsed();
            if elapsed >= max_duration {
                return Err(SyncError::TimedOut { attempts });
            }
            sleep_for = sleep_for.min(max_duration - elapsed);
        }

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
        }

        if let Some(max_duration) = config.max_duration
            && started.elapsed() >= max_duration
        {
            return Err(SyncError::TimedOut { attempts });
        }
    }
}
