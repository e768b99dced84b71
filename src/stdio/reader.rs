//! Stdout reader task.
//!
//! Reads newline-delimited JSON from the backend's stdout and hands each
//! line to [`RequestChannel::on_line`]. Malformed lines are reported and
//! skipped; they never stop the reader. When stdout closes or fails, the
//! pending table is closed so every waiting caller is released with
//! [`AppError::Unavailable`](crate::AppError::Unavailable).

use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::faults::FaultSender;
use crate::stdio::channel::RequestChannel;
use crate::{AppError, Result};

/// Stdout reader task: runs until EOF, a stream error, or `cancel`.
///
/// `stdout` is normally a [`FramedRead`](tokio_util::codec::FramedRead)
/// over the child's stdout with [`StdioCodec`](crate::stdio::codec::StdioCodec).
///
/// # Cancellation
///
/// When `cancel` fires the task exits without closing the table; the
/// shutdown path owns that.
pub async fn run_reader<S>(
    dictionary: String,
    mut stdout: S,
    channel: Arc<RequestChannel>,
    faults: FaultSender,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<String>> + Unpin + Send,
{
    let reason = loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(dictionary, "stdout reader: cancellation received, stopping");
                return;
            }

            item = stdout.next() => {
                match item {
                    None => {
                        debug!(dictionary, "stdout reader: EOF detected");
                        break format!("{dictionary} closed its stdout");
                    }

                    Some(Err(AppError::Protocol(ref msg))) => {
                        // Framing error; the framed stream ends right after it.
                        warn!(dictionary, error = msg.as_str(), "stdout reader: framing error");
                    }

                    Some(Err(e)) => {
                        warn!(dictionary, error = %e, "stdout reader: IO error, stopping");
                        break format!("{dictionary} stdout failed: {e}");
                    }

                    Some(Ok(line)) => channel.on_line(&line, &faults).await,
                }
            }
        }
    };

    let released = channel.pending().close(&reason).await;
    debug!(dictionary, released, "stdout reader: pending table closed");
}
