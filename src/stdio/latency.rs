//! Per-request latency ceiling.
//!
//! A [`Deadline`] is fixed when a request's `seq` is registered and covers
//! the whole exchange: waiting for the stdin writer, writing the line, and
//! waiting for the response.
//! [`RequestChannel::send`](crate::stdio::channel::RequestChannel::send)
//! fixes it and bounds the write; [`LatencyGuard`] bounds the response wait
//! with it. On expiry the entry is removed from the [`PendingTable`] under
//! its lock before the caller is told, so a response that shows up later is
//! treated as stale. Without a ceiling the wait only ends on a response or
//! when the table is closed.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::stdio::channel::{PendingRequest, PendingTable, Reply};
use crate::stdio::wire::Response;
use crate::{AppError, Result};

/// Point in time by which a request must be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    /// When the request gives up.
    pub at: Instant,
    /// The ceiling the deadline was derived from.
    pub limit: Duration,
}

impl Deadline {
    /// A deadline `limit` from now.
    #[must_use]
    pub fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
            limit,
        }
    }

    /// The error reported to the caller of `seq` once this deadline passes.
    #[must_use]
    pub fn expired(&self, seq: u64) -> AppError {
        AppError::Timeout {
            seq,
            after: self.limit,
        }
    }
}

/// Run `fut` until `deadline`; `None` if it passed first.
pub(crate) async fn until<F: Future>(deadline: Option<Deadline>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline.at, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// Applies the configured latency ceiling to pending requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyGuard {
    max_latency: Option<Duration>,
}

impl LatencyGuard {
    /// Guard with the given ceiling; `None` waits without bound.
    #[must_use]
    pub fn new(max_latency: Option<Duration>) -> Self {
        Self { max_latency }
    }

    /// The configured ceiling.
    #[must_use]
    pub fn max_latency(&self) -> Option<Duration> {
        self.max_latency
    }

    /// Wait for the response to `request` until its deadline.
    ///
    /// # Errors
    ///
    /// - [`AppError::Timeout`] if the deadline passed first. The backend is
    ///   left running.
    /// - [`AppError::Protocol`] if the backend answered with a malformed
    ///   line carrying this `seq`.
    /// - [`AppError::Unavailable`] if the table was closed while waiting.
    pub async fn wait(&self, pending: &PendingTable, request: PendingRequest) -> Result<Response> {
        let PendingRequest {
            seq,
            mut rx,
            deadline,
        } = request;

        let Some(deadline) = deadline else {
            let received = (&mut rx).await;
            return settle(pending, seq, received).await;
        };

        match tokio::time::timeout_at(deadline.at, &mut rx).await {
            Ok(received) => settle(pending, seq, received).await,
            Err(_elapsed) => {
                if pending.expire(seq).await {
                    warn!(seq, limit = ?deadline.limit, "request exceeded latency ceiling");
                    return Err(deadline.expired(seq));
                }
                // The entry was already taken: either its response was
                // delivered at the deadline or the table closed.
                debug!(seq, "deadline raced with resolution");
                let received = rx.await;
                settle(pending, seq, received).await
            }
        }
    }
}

async fn settle(
    pending: &PendingTable,
    seq: u64,
    received: std::result::Result<Reply, oneshot::error::RecvError>,
) -> Result<Response> {
    match received {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(malformed)) => Err(AppError::Protocol(format!(
            "response to request {seq} is invalid: {}",
            malformed.reason
        ))),
        Err(_) => {
            let reason = pending
                .closed_reason()
                .await
                .unwrap_or_else(|| "dictionary is unavailable".to_owned());
            Err(AppError::Unavailable(reason))
        }
    }
}
