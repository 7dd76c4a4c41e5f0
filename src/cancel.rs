//! Cancellation and per-phase timeouts around every suspension point.

use crate::config::Timeout;
use crate::error::{Error, Result};
use std::fmt;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// A suspension point of a request, used to pick the timeout that applies
/// and to report which one elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    AcquireSlot,
    Send,
    ReceiveHeaders,
    ReceiveData,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::AcquireSlot => "connection slot acquisition",
            Phase::Send => "send",
            Phase::ReceiveHeaders => "receive headers",
            Phase::ReceiveData => "receive data",
        })
    }
}

/// Races an operation against the caller's token and the phase deadline.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancellationBridge {
    token: CancellationToken,
}

impl CancellationBridge {
    /// Without a caller token the bridge still enforces phase timeouts.
    pub(crate) fn new(token: Option<CancellationToken>) -> Self {
        Self {
            token: token.unwrap_or_default(),
        }
    }

    /// Fails with [`Error::Cancelled`] if the token already fired.
    pub(crate) fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Runs `op` until it completes, the token fires, or `timeout` elapses.
    ///
    /// The token wins every tie: an error that races with cancellation is
    /// reported as [`Error::Cancelled`].
    pub(crate) async fn run<T, F>(&self, phase: Phase, timeout: Timeout, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;

        let deadline = async {
            match timeout.duration() {
                Some(limit) => match tokio::time::timeout(limit, op).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::TimedOut { phase }),
                },
                None => op.await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::Cancelled),
            result = deadline => result,
        };

        match result {
            Err(Error::Cancelled) => {
                tracing::warn!(%phase, "request canceled");
                Err(Error::Cancelled)
            }
            Err(err) if self.token.is_cancelled() => {
                tracing::warn!(%phase, error = %err, "request canceled while failing");
                Err(Error::Cancelled)
            }
            Err(Error::TimedOut { phase }) => {
                tracing::warn!(%phase, ?timeout, "request timed out");
                Err(Error::TimedOut { phase })
            }
            other => other,
        }
    }
}
