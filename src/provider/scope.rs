//! Cancellation scope for a single relay call.

use super::error::TransportError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Far-future fallback when `now + timeout` overflows.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// One cancellation token plus one deadline, governing a whole relay call:
/// the request, the error body read, and every chunk read of the stream.
#[derive(Debug, Clone)]
pub struct CancelScope {
    token: CancellationToken,
    deadline: Instant,
    timeout: Duration,
}

impl CancelScope {
    /// Open a scope that fires when `parent` is cancelled or `timeout` elapses.
    pub fn new(parent: &CancellationToken, timeout: Duration) -> Self {
        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self {
            token: parent.child_token(),
            deadline,
            timeout,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Fail if the scope has already fired.
    pub fn check(&self) -> Result<(), TransportError> {
        if self.token.is_cancelled() {
            Err(TransportError::Cancelled)
        } else if Instant::now() >= self.deadline {
            Err(TransportError::Timeout(self.timeout))
        } else {
            Ok(())
        }
    }

    /// Drive `fut` to completion unless the scope fires first, in which case
    /// `fut` is dropped.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, TransportError> {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(TransportError::Cancelled),
            () = tokio::time::sleep_until(self.deadline) => Err(TransportError::Timeout(self.timeout)),
            out = fut => Ok(out),
        }
    }
}
