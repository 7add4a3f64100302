//! Single-flight coordination of token refresh exchanges.
//!
//! The first request that fails authentication while nothing is in flight
//! starts an exchange; every request failing while that exchange runs joins a
//! FIFO queue of waiters. When the exchange settles, all waiters receive the
//! same outcome in registration order and the state returns to idle.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

use super::ApiError;
use crate::auth::SessionStore;

/// Why a refresh exchange did not produce a new credential pair.
#[derive(Error, Debug, Clone)]
pub enum RefreshError {
    /// The server answered and refused the refresh token. Never retried.
    #[error("Refresh token rejected: {0}")]
    Rejected(String),

    /// Network failure, 5xx or rate limit while talking to the server.
    #[error("Refresh exchange failed: {0}")]
    Transport(String),

    #[error("Refresh exchange timed out after {0:?}")]
    TimedOut(Duration),

    /// The session was cleared or replaced while the exchange ran; the new
    /// pair was discarded.
    #[error("Session changed during refresh")]
    Superseded,
}

impl RefreshError {
    /// Worth another attempt before giving up on the session
    pub fn is_transient(&self) -> bool {
        matches!(self, RefreshError::Transport(_) | RefreshError::TimedOut(_))
    }
}

impl From<ApiError> for RefreshError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::NetworkError(_) | ApiError::ServerError(_) | ApiError::RateLimited => {
                RefreshError::Transport(err.to_string())
            }
            other => RefreshError::Rejected(other.to_string()),
        }
    }
}

/// What each waiter receives when the exchange settles: the new access token.
pub(crate) type RefreshOutcome = Result<SecretString, RefreshError>;

enum RefreshState {
    Idle,
    Refreshing(VecDeque<oneshot::Sender<RefreshOutcome>>),
}

/// Next step for a request whose credential was rejected.
pub(crate) enum Recovery {
    /// The store already holds a different token than the one rejected
    Retry(SecretString),
    /// Joined an exchange already in flight
    Wait(oneshot::Receiver<RefreshOutcome>),
    /// Caller must run the exchange with this refresh token, then `settle`
    Start {
        refresh_token: SecretString,
        outcome: oneshot::Receiver<RefreshOutcome>,
    },
    /// No refresh token, the session cannot be recovered
    Unrecoverable,
}

pub(crate) struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    exchanges: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RefreshState::Idle),
            exchanges: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide how a request rejected while holding `sent` recovers.
    ///
    /// Token comparison and the state transition happen under the same lock
    /// that `settle` takes, so a request can never miss an exchange that has
    /// already replaced its token and start a redundant one.
    pub fn plan(&self, session: &SessionStore, sent: Option<&SecretString>) -> Recovery {
        let mut state = self.lock();

        if let RefreshState::Refreshing(waiters) = &mut *state {
            let (tx, rx) = oneshot::channel();
            waiters.push_back(tx);
            debug!(position = waiters.len(), "Joined in-flight token refresh");
            return Recovery::Wait(rx);
        }

        if let Some(current) = session.access_token() {
            let rotated = sent.map_or(true, |sent| sent.expose_secret() != current.expose_secret());
            if rotated {
                debug!("Credential already rotated, retrying without refresh");
                return Recovery::Retry(current);
            }
        }

        let Some(refresh_token) = session.refresh_token() else {
            return Recovery::Unrecoverable;
        };

        let (tx, rx) = oneshot::channel();
        *state = RefreshState::Refreshing(VecDeque::from([tx]));
        self.exchanges.fetch_add(1, Ordering::Relaxed);
        Recovery::Start {
            refresh_token,
            outcome: rx,
        }
    }

    /// Release every waiter, in registration order, and return to idle.
    /// Returns how many waiters were released.
    pub fn settle(&self, outcome: RefreshOutcome) -> usize {
        let waiters = self.take_waiters();
        let released = waiters.len();
        for waiter in waiters {
            // A waiter whose caller went away is simply skipped
            let _ = waiter.send(outcome.clone());
        }
        released
    }

    /// Return to idle, handing back the queue in registration order.
    fn take_waiters(&self) -> VecDeque<oneshot::Sender<RefreshOutcome>> {
        match std::mem::replace(&mut *self.lock(), RefreshState::Idle) {
            RefreshState::Refreshing(waiters) => waiters,
            RefreshState::Idle => VecDeque::new(),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock(), RefreshState::Refreshing(_))
    }

    /// Number of exchanges started since creation
    pub fn exchanges(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }
}
