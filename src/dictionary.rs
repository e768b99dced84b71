//! The dictionary facade the host talks to.
//!
//! [`StdioDictionary`] composes the stdio transport: it launches the backend
//! (or adopts existing streams), reads the handshake, starts the stdout
//! reader and stderr relay, and then serves lookups.
//!
//! # Lifecycle
//!
//! 1. [`StdioDictionary::start`] spawns the process. Any failure before the
//!    handshake completes kills it and returns [`AppError::Startup`].
//! 2. [`translate`](StdioDictionary::translate) and
//!    [`untranslate`](StdioDictionary::untranslate) suspend the calling task
//!    until the backend answers, the latency ceiling elapses, or the
//!    backend goes away. The ceiling also bounds the stdin write, so a
//!    backend that stops reading cannot hold callers past it. Concurrent
//!    calls resolve independently.
//! 3. [`shutdown`](StdioDictionary::shutdown) releases every waiting caller,
//!    abandons any stuck write, closes stdin, and waits for the supervisor
//!    to reap the process.
//!    Dropping the dictionary without calling it still terminates the
//!    process.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::faults::FaultSender;
use crate::stdio::channel::{PendingTable, RequestChannel};
use crate::stdio::codec::StdioCodec;
use crate::stdio::handshake::{self, Configuration};
use crate::stdio::latency::LatencyGuard;
use crate::stdio::spawner::{self, BackendProcess, SpawnConfig};
use crate::stdio::wire::RequestKind;
use crate::stdio::{reader, stderr};
use crate::{AppError, Result};

/// A steno dictionary served by an external process.
#[derive(Debug)]
pub struct StdioDictionary {
    name: String,
    config: Configuration,
    channel: Arc<RequestChannel>,
    guard: LatencyGuard,
    cancel: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl StdioDictionary {
    /// Launch the backend described by `spawn` and complete its handshake.
    ///
    /// Stderr is relayed to `faults` from the moment the process starts, so
    /// diagnostics explaining a failed handshake still reach the host.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Startup`] if the process cannot be spawned, exits
    /// or times out before its handshake, or declares an invalid one. The
    /// process is killed before returning.
    pub async fn start(spawn: &SpawnConfig, faults: FaultSender) -> Result<Self> {
        let name = spawn.display_name();
        let BackendProcess {
            mut child,
            stdin,
            stdout,
            stderr,
        } = spawner::spawn_backend(spawn)?;

        tokio::spawn(stderr::run_error_relay(name.clone(), stderr, faults.clone()));

        let mut stdout = FramedRead::new(stdout, StdioCodec::new());
        let config = match handshake::read_handshake(&name, &mut stdout, spawn.startup_timeout).await
        {
            Ok(config) => config,
            Err(err) => {
                warn!(dictionary = name.as_str(), error = %err, "backend unusable");
                if let Err(kill_err) = child.kill().await {
                    warn!(dictionary = name.as_str(), %kill_err, "failed to kill unusable backend");
                }
                return Err(err);
            }
        };

        let dictionary = Self::assemble(name, config, Box::new(stdin), stdout, faults.clone());
        let supervisor = spawner::supervise(
            dictionary.name.clone(),
            child,
            dictionary.channel.pending().clone(),
            faults,
            dictionary.cancel.clone(),
            spawn.shutdown_grace,
        );
        *dictionary.supervisor.lock().await = Some(supervisor);

        Ok(dictionary)
    }

    /// Serve a backend whose streams are already connected.
    ///
    /// Used for backends the host launched itself, and for in-memory pipes.
    /// There is no process to supervise: the dictionary becomes unavailable
    /// when `stdout` closes or on [`shutdown`](Self::shutdown).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Startup`] if `stdout` closes, stays silent past
    /// `startup_timeout`, or yields an invalid handshake.
    pub async fn from_streams<W, R, E>(
        name: impl Into<String>,
        stdin: W,
        stdout: R,
        stderr: E,
        startup_timeout: Option<Duration>,
        faults: FaultSender,
    ) -> Result<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
        E: AsyncRead + Send + Unpin + 'static,
    {
        let name = name.into();
        tokio::spawn(stderr::run_error_relay(name.clone(), stderr, faults.clone()));

        let mut stdout = FramedRead::new(stdout, StdioCodec::new());
        let config = handshake::read_handshake(&name, &mut stdout, startup_timeout).await?;

        Ok(Self::assemble(name, config, Box::new(stdin), stdout, faults))
    }

    fn assemble<R>(
        name: String,
        config: Configuration,
        stdin: Box<dyn AsyncWrite + Send + Unpin>,
        stdout: FramedRead<R, StdioCodec>,
        faults: FaultSender,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let cancel = CancellationToken::new();
        let channel = Arc::new(RequestChannel::new(
            name.clone(),
            stdin,
            PendingTable::new(),
            cancel.clone(),
        ));

        tokio::spawn(reader::run_reader(
            name.clone(),
            stdout,
            Arc::clone(&channel),
            faults,
            cancel.clone(),
        ));

        info!(dictionary = name.as_str(), "dictionary ready");
        Self {
            guard: LatencyGuard::new(config.max_latency),
            name,
            config,
            channel,
            cancel,
            supervisor: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Name used to attribute logs and faults.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration declared by the backend's handshake.
    #[must_use]
    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    /// Maximum number of strokes a translation may consume.
    #[must_use]
    pub fn longest_key(&self) -> usize {
        self.config.longest_key
    }

    /// Whether the backend can still serve requests.
    pub async fn is_available(&self) -> bool {
        self.channel.pending().closed_reason().await.is_none()
    }

    /// Number of requests awaiting a response.
    pub async fn pending_count(&self) -> usize {
        self.channel.pending().len().await
    }

    /// Translate `strokes`.
    ///
    /// Returns `Ok(None)` when the backend has no entry.
    ///
    /// # Errors
    ///
    /// - [`AppError::Rejected`] if `strokes` is longer than the longest key;
    ///   the backend is not contacted.
    /// - [`AppError::Timeout`], [`AppError::Protocol`] or
    ///   [`AppError::Unavailable`] from the exchange itself.
    pub async fn translate<S>(&self, strokes: &[S]) -> Result<Option<String>>
    where
        S: AsRef<str>,
    {
        if strokes.len() > self.config.longest_key {
            return Err(AppError::Rejected(format!(
                "{} strokes exceed the longest key of {} ({})",
                strokes.len(),
                self.config.longest_key,
                self.name
            )));
        }

        let strokes = strokes.iter().map(|s| s.as_ref().to_owned()).collect();
        let request = self
            .channel
            .send(RequestKind::Translate(strokes), self.guard.max_latency())
            .await?;
        let response = self.guard.wait(self.channel.pending(), request).await?;
        Ok(response.translation)
    }

    /// Find the stroke sequences that produce `text`.
    ///
    /// Returns `Ok(None)` when the backend has no entry.
    ///
    /// # Errors
    ///
    /// - [`AppError::Rejected`] if the backend did not declare untranslate
    ///   support; the backend is not contacted.
    /// - [`AppError::Timeout`], [`AppError::Protocol`] or
    ///   [`AppError::Unavailable`] from the exchange itself.
    pub async fn untranslate(&self, text: &str) -> Result<Option<Vec<Vec<String>>>> {
        if !self.config.untranslate {
            return Err(AppError::Rejected(format!(
                "{} does not support untranslate",
                self.name
            )));
        }

        let request = self
            .channel
            .send(
                RequestKind::Untranslate(text.to_owned()),
                self.guard.max_latency(),
            )
            .await?;
        let response = self.guard.wait(self.channel.pending(), request).await?;
        Ok(response.reverse_translation)
    }

    /// Like [`translate`](Self::translate), but errors are logged and
    /// treated as "no entry".
    pub async fn get<S>(&self, strokes: &[S]) -> Option<String>
    where
        S: AsRef<str>,
    {
        match self.translate(strokes).await {
            Ok(translation) => translation,
            Err(AppError::Rejected(reason)) => {
                debug!(dictionary = self.name.as_str(), reason, "lookup rejected");
                None
            }
            Err(err) => {
                warn!(dictionary = self.name.as_str(), error = %err, "lookup failed");
                None
            }
        }
    }

    /// Whether the backend has an entry for `strokes`.
    pub async fn contains<S>(&self, strokes: &[S]) -> bool
    where
        S: AsRef<str>,
    {
        self.get(strokes).await.is_some()
    }

    /// Distinct stroke sequences producing `text`.
    ///
    /// Errors, including missing untranslate support, are logged and yield
    /// an empty set.
    pub async fn reverse_lookup(&self, text: &str) -> BTreeSet<Vec<String>> {
        match self.untranslate(text).await {
            Ok(found) => found.unwrap_or_default().into_iter().collect(),
            Err(AppError::Rejected(reason)) => {
                debug!(dictionary = self.name.as_str(), reason, "reverse lookup rejected");
                BTreeSet::new()
            }
            Err(err) => {
                warn!(dictionary = self.name.as_str(), error = %err, "reverse lookup failed");
                BTreeSet::new()
            }
        }
    }

    /// Stop the backend and release every waiting caller.
    ///
    /// Pending and later requests fail with [`AppError::Unavailable`].
    /// Idempotent.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let released = self
            .channel
            .pending()
            .close(&format!("{} was shut down", self.name))
            .await;
        info!(dictionary = self.name.as_str(), released, "shutting down dictionary");

        // Cancel first: it releases a writer stuck on a full stdin pipe and
        // starts the supervisor's grace period.
        self.cancel.cancel();
        self.channel.close_stdin().await;

        if let Some(handle) = self.supervisor.lock().await.take() {
            if let Err(err) = handle.await {
                warn!(dictionary = self.name.as_str(), %err, "supervisor task failed");
            }
        }
    }
}

impl Drop for StdioDictionary {
    fn drop(&mut self) {
        // The supervisor kills the process after its grace period.
        self.cancel.cancel();
    }
}
