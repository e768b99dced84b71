//! Faults reported to the host outside of any single request.
//!
//! The adapter pushes a [`DictionaryFault`] for every stderr line, every
//! undecodable stdout line and the backend's termination. Delivery uses an
//! unbounded channel so a host that drains slowly can never stall the
//! stderr relay (and, through a full pipe, the backend itself).

use tokio::sync::mpsc;
use tracing::debug;

/// Sender half handed to the adapter at start-up.
pub type FaultSender = mpsc::UnboundedSender<DictionaryFault>;

/// Receiver half kept by the host.
pub type FaultReceiver = mpsc::UnboundedReceiver<DictionaryFault>;

/// Create a fault channel.
#[must_use]
pub fn channel() -> (FaultSender, FaultReceiver) {
    mpsc::unbounded_channel()
}

/// A fault attributed to a dictionary backend rather than to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DictionaryFault {
    /// The backend wrote a diagnostic line to stderr.
    Stderr {
        /// Dictionary the line came from.
        dictionary: String,
        /// The line, verbatim minus its terminator.
        line: String,
    },
    /// The backend wrote a stdout line that is not a valid response.
    MalformedLine {
        /// Dictionary the line came from.
        dictionary: String,
        /// The line, verbatim.
        raw: String,
        /// Why decoding failed.
        reason: String,
    },
    /// The backend process exited or its stdout closed.
    Terminated {
        /// Dictionary that terminated.
        dictionary: String,
        /// Process exit code, if available.
        exit_code: Option<i32>,
        /// Human-readable reason for termination.
        reason: String,
    },
}

impl DictionaryFault {
    /// Name of the dictionary the fault is attributed to.
    #[must_use]
    pub fn dictionary(&self) -> &str {
        match self {
            Self::Stderr { dictionary, .. }
            | Self::MalformedLine { dictionary, .. }
            | Self::Terminated { dictionary, .. } => dictionary,
        }
    }
}

/// Deliver `fault`, logging at `DEBUG` if the host dropped its receiver.
pub(crate) fn report(faults: &FaultSender, fault: DictionaryFault) {
    if let Err(err) = faults.send(fault) {
        debug!(
            dictionary = err.0.dictionary(),
            "fault receiver closed, dropping fault"
        );
    }
}
