//! Request/response correlation.
//!
//! [`RequestChannel`] allocates sequence numbers, writes requests to the
//! backend's stdin and routes decoded stdout lines back to the waiting
//! caller through the [`PendingTable`].
//!
//! # Pending table
//!
//! One `tokio::sync::Mutex` guards the map from `seq` to the caller's
//! `oneshot` sender together with the `closed` marker. Every path that
//! removes an entry (response, latency expiry, shutdown) does so under that
//! lock, so a `seq` is resolved at most once and a late response for an
//! expired `seq` finds nothing to resolve.
//!
//! Responses are matched by `seq`, never by position: a backend may answer
//! pipelined requests in any order.
//!
//! # Stdin
//!
//! Writes are serialised by the writer lock. Waiting for that lock and the
//! write itself both count against the request's [`Deadline`] and both give
//! way to the cancellation token. A write that is cut off may have left half
//! a line in the pipe, so the writer is dropped (closing stdin) and the
//! table is closed: the backend is unavailable from then on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::{oneshot, Mutex};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::faults::{self, DictionaryFault, FaultSender};
use crate::stdio::codec::StdioCodec;
use crate::stdio::latency::{self, Deadline};
use crate::stdio::wire::{self, Inbound, MalformedLine, Request, RequestKind, Response};
use crate::{AppError, Result};

/// What a pending caller eventually receives from the stdout reader.
pub type Reply = std::result::Result<Response, MalformedLine>;

/// Boxed writer over the backend's stdin.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Default)]
struct PendingState {
    entries: HashMap<u64, oneshot::Sender<Reply>>,
    next_seq: u64,
    closed: Option<String>,
}

/// Shared map of requests awaiting a response, keyed by `seq`.
#[derive(Debug, Clone, Default)]
pub struct PendingTable {
    state: Arc<Mutex<PendingState>>,
}

impl PendingTable {
    /// Create an empty, open table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next free `seq` and register a waiter for it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Unavailable`] once the table has been closed.
    pub async fn register(&self) -> Result<(u64, oneshot::Receiver<Reply>)> {
        let mut state = self.state.lock().await;
        if let Some(reason) = &state.closed {
            return Err(AppError::Unavailable(reason.clone()));
        }

        // Seq values only come round again after a full wrap; skip any
        // that are somehow still outstanding.
        let mut seq = state.next_seq;
        while state.entries.contains_key(&seq) {
            seq = seq.wrapping_add(1);
        }
        state.next_seq = seq.wrapping_add(1);

        let (tx, rx) = oneshot::channel();
        state.entries.insert(seq, tx);
        Ok((seq, rx))
    }

    /// Remove `seq` and hand `reply` to its waiter.
    ///
    /// Returns `false` if `seq` was not pending (unknown, already resolved,
    /// or expired).
    pub async fn resolve(&self, seq: u64, reply: Reply) -> bool {
        let mut state = self.state.lock().await;
        match state.entries.remove(&seq) {
            Some(tx) => {
                if tx.send(reply).is_err() {
                    debug!(seq, "waiter dropped before its reply arrived");
                }
                true
            }
            None => false,
        }
    }

    /// Remove `seq` without resolving it.
    ///
    /// Returns `true` if this call removed the entry.
    pub async fn expire(&self, seq: u64) -> bool {
        self.state.lock().await.entries.remove(&seq).is_some()
    }

    /// Close the table: every current waiter and every later
    /// [`register`](Self::register) fails with [`AppError::Unavailable`].
    ///
    /// Returns the number of waiters released. Closing twice keeps the
    /// first reason.
    pub async fn close(&self, reason: &str) -> usize {
        let mut state = self.state.lock().await;
        if state.closed.is_none() {
            state.closed = Some(reason.to_owned());
        }
        let released = state.entries.len();
        // Dropping the senders wakes every waiter with a receive error.
        state.entries.clear();
        released
    }

    /// Why the table was closed, or `None` while it is open.
    pub async fn closed_reason(&self) -> Option<String> {
        self.state.lock().await.closed.clone()
    }

    /// Number of requests currently awaiting a response.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Whether no request is awaiting a response.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// A registered request whose response has not been awaited yet.
#[derive(Debug)]
pub struct PendingRequest {
    /// Sequence number written to the backend.
    pub seq: u64,
    pub(crate) rx: oneshot::Receiver<Reply>,
    /// Deadline fixed at registration, if the backend declared a ceiling.
    pub deadline: Option<Deadline>,
}

/// Writes requests to the backend and correlates its responses.
pub struct RequestChannel {
    dictionary: String,
    pending: PendingTable,
    writer: Mutex<Option<FramedWrite<BoxedWriter, StdioCodec>>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for RequestChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestChannel")
            .field("dictionary", &self.dictionary)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl RequestChannel {
    /// Wrap the backend's stdin.
    ///
    /// Writes in flight when `cancel` fires are abandoned.
    #[must_use]
    pub fn new(
        dictionary: impl Into<String>,
        stdin: BoxedWriter,
        pending: PendingTable,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            dictionary: dictionary.into(),
            pending,
            writer: Mutex::new(Some(FramedWrite::new(stdin, StdioCodec::new()))),
            cancel,
        }
    }

    /// The table this channel registers requests in.
    #[must_use]
    pub fn pending(&self) -> &PendingTable {
        &self.pending
    }

    /// Register a request and write it to the backend.
    ///
    /// The entry is registered before the line is written, so a response
    /// that arrives immediately always finds its waiter. `max_latency`
    /// starts counting at registration.
    ///
    /// # Errors
    ///
    /// - [`AppError::Timeout`] if the deadline passed while waiting for
    ///   another writer; nothing was written.
    /// - [`AppError::Unavailable`] if the table is closed, stdin has been
    ///   closed, the write fails or is cut off by the deadline, or the
    ///   channel is cancelled.
    ///
    /// The entry is removed again in each case.
    pub async fn send(
        &self,
        kind: RequestKind,
        max_latency: Option<Duration>,
    ) -> Result<PendingRequest> {
        let (seq, rx) = self.pending.register().await?;
        let deadline = max_latency.map(Deadline::after);
        let label = kind.label();

        if let Err(err) = self.write(seq, kind, deadline).await {
            self.pending.expire(seq).await;
            return Err(err);
        }

        debug!(dictionary = self.dictionary.as_str(), seq, kind = label, "request sent");
        Ok(PendingRequest { seq, rx, deadline })
    }

    async fn write(&self, seq: u64, kind: RequestKind, deadline: Option<Deadline>) -> Result<()> {
        let line = wire::encode_request(&Request { seq, kind })?;

        let mut writer = tokio::select! {
            biased;

            () = self.cancel.cancelled() => return Err(self.unavailable().await),

            locked = latency::until(deadline, self.writer.lock()) => match (locked, deadline) {
                (Some(writer), _) => writer,
                (None, Some(deadline)) => {
                    debug!(
                        dictionary = self.dictionary.as_str(),
                        seq, "deadline passed waiting for stdin"
                    );
                    return Err(deadline.expired(seq));
                }
                (None, None) => return Err(self.unavailable().await),
            },
        };

        let Some(framed) = writer.as_mut() else {
            return Err(AppError::Unavailable(format!(
                "{} stdin is closed",
                self.dictionary
            )));
        };

        let failure = tokio::select! {
            biased;

            () = self.cancel.cancelled() => "stdin write abandoned on shutdown".to_owned(),

            sent = latency::until(deadline, framed.send(line)) => match sent {
                Some(Ok(())) => return Ok(()),
                Some(Err(err)) => format!("stdin write failed: {err}"),
                None => format!(
                    "stdin write blocked past {:?}",
                    deadline.map(|d| d.limit).unwrap_or_default()
                ),
            },
        };

        // Whatever reached the pipe may end mid-line; stdin cannot be reused.
        writer.take();
        drop(writer);

        let reason = format!("{}: {failure}", self.dictionary);
        warn!(
            dictionary = self.dictionary.as_str(),
            seq,
            reason = failure.as_str(),
            "closing backend stdin"
        );
        self.pending.close(&reason).await;
        Err(self.unavailable().await)
    }

    async fn unavailable(&self) -> AppError {
        let reason = self
            .pending
            .closed_reason()
            .await
            .unwrap_or_else(|| format!("{} was shut down", self.dictionary));
        AppError::Unavailable(reason)
    }

    /// Route one stdout line to its waiter.
    ///
    /// - A response for a pending `seq` resolves that caller.
    /// - A response for any other `seq` is stale and dropped.
    /// - Anything else, blank lines included, is reported as a malformed
    ///   line; if it still carries a pending `seq`, that caller is resolved
    ///   with the decode failure.
    pub async fn on_line(&self, line: &str, faults: &FaultSender) {
        match wire::decode_line(line) {
            Inbound::Response(response) => {
                let seq = response.seq;
                if self.pending.resolve(seq, Ok(response)).await {
                    debug!(dictionary = self.dictionary.as_str(), seq, "response matched");
                } else {
                    warn!(
                        dictionary = self.dictionary.as_str(),
                        seq, "dropping response for unknown or expired seq"
                    );
                }
            }
            Inbound::Malformed(malformed) => {
                warn!(
                    dictionary = self.dictionary.as_str(),
                    reason = malformed.reason.as_str(),
                    raw_line = malformed.raw.as_str(),
                    "malformed line from backend"
                );
                faults::report(
                    faults,
                    DictionaryFault::MalformedLine {
                        dictionary: self.dictionary.clone(),
                        raw: malformed.raw.clone(),
                        reason: malformed.reason.clone(),
                    },
                );
                if let Some(seq) = malformed.seq {
                    self.pending.resolve(seq, Err(malformed)).await;
                }
            }
        }
    }

    /// Close stdin so the backend sees end of input. Idempotent.
    ///
    /// Call after cancelling the channel: a writer stuck on a full pipe
    /// holds the lock until cancellation makes it let go.
    pub async fn close_stdin(&self) {
        let Some(mut framed) = self.writer.lock().await.take() else {
            return;
        };
        if let Err(err) = framed.close().await {
            debug!(dictionary = self.dictionary.as_str(), error = %err, "closing stdin failed");
        }
    }
}
