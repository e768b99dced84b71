//! Shared helpers: an in-memory backend wired to the adapter with duplex
//! pipes, and the path of the demo backend binary.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};

use stdio_dictionary::faults::{self, FaultReceiver};
use stdio_dictionary::{DictionaryFault, Result, StdioDictionary};

/// How long helpers wait for something that is expected to happen.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// How long helpers wait to be sure something does not happen.
pub const QUIET: Duration = Duration::from_millis(150);

/// The backend side of the pipes.
pub struct FakeBackend {
    /// Lines the adapter wrote to the backend's stdin.
    pub requests: Lines<BufReader<DuplexStream>>,
    /// The backend's stdout.
    pub stdout: DuplexStream,
    /// The backend's stderr.
    pub stderr: DuplexStream,
}

impl FakeBackend {
    /// Next request written by the adapter, parsed as JSON.
    pub async fn next_request(&mut self) -> Value {
        let line = tokio::time::timeout(PATIENCE, self.requests.next_line())
            .await
            .expect("adapter wrote no request in time")
            .expect("read request")
            .expect("adapter closed stdin");
        serde_json::from_str(&line).expect("request is json")
    }

    /// Assert the adapter writes nothing (closing stdin also counts).
    pub async fn assert_no_request(&mut self) {
        match tokio::time::timeout(QUIET, self.requests.next_line()).await {
            Err(_) | Ok(Ok(None)) => {}
            Ok(other) => panic!("unexpected write to backend stdin: {other:?}"),
        }
    }

    /// Write one stdout line.
    pub async fn respond(&mut self, line: &str) {
        self.stdout
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("write stdout");
    }

    /// Write one stderr line.
    pub async fn diagnose(&mut self, line: &str) {
        self.stderr
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("write stderr");
    }
}

/// Connect an adapter to an in-memory backend that declares `handshake`.
pub async fn connect(handshake: &str) -> (Result<StdioDictionary>, FakeBackend, FaultReceiver) {
    open(handshake, 64 * 1024).await
}

/// Like [`connect_ok`], but the backend's stdin pipe only buffers
/// `capacity` bytes; writes block once it is full and nobody reads.
pub async fn connect_with_stdin_capacity(
    handshake: &str,
    capacity: usize,
) -> (StdioDictionary, FakeBackend, FaultReceiver) {
    let (dictionary, backend, faults) = open(handshake, capacity).await;
    (dictionary.expect("handshake accepted"), backend, faults)
}

async fn open(
    handshake: &str,
    stdin_capacity: usize,
) -> (Result<StdioDictionary>, FakeBackend, FaultReceiver) {
    let (adapter_stdin, backend_stdin) = tokio::io::duplex(stdin_capacity);
    let (mut backend_stdout, adapter_stdout) = tokio::io::duplex(64 * 1024);
    let (backend_stderr, adapter_stderr) = tokio::io::duplex(64 * 1024);

    backend_stdout
        .write_all(format!("{handshake}\n").as_bytes())
        .await
        .expect("write handshake");

    let (fault_tx, fault_rx) = faults::channel();
    let dictionary = StdioDictionary::from_streams(
        "fake",
        adapter_stdin,
        adapter_stdout,
        adapter_stderr,
        Some(PATIENCE),
        fault_tx,
    )
    .await;

    let backend = FakeBackend {
        requests: BufReader::new(backend_stdin).lines(),
        stdout: backend_stdout,
        stderr: backend_stderr,
    };
    (dictionary, backend, fault_rx)
}

/// Like [`connect`], for handshakes that must succeed.
pub async fn connect_ok(handshake: &str) -> (StdioDictionary, FakeBackend, FaultReceiver) {
    let (dictionary, backend, faults) = connect(handshake).await;
    (dictionary.expect("handshake accepted"), backend, faults)
}

/// Next fault, failing the test if none arrives in time.
pub async fn next_fault(faults: &mut FaultReceiver) -> DictionaryFault {
    tokio::time::timeout(PATIENCE, faults.recv())
        .await
        .expect("no fault reported in time")
        .expect("fault channel closed")
}

/// The `seq` of a request.
pub fn seq_of(request: &Value) -> u64 {
    request["seq"].as_u64().expect("request carries a seq")
}

/// Path of the demo backend binary built alongside the tests.
pub fn demo_backend() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_stdio-dictionary-demo"))
}
