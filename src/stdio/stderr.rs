//! Stderr relay task.
//!
//! Every line the backend writes to stderr becomes one
//! [`DictionaryFault::Stderr`], in emission order. The relay runs on its own
//! task and only touches the fault channel, so a chatty or stuck stderr
//! never holds up requests.
//!
//! Lines are split on `\n` and decoded lossily: a backend that emits
//! invalid UTF-8 still has its diagnostics relayed.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, error};

use crate::faults::{self, DictionaryFault, FaultSender};

/// Relay stderr lines as faults until EOF or a read error.
pub async fn run_error_relay<R>(dictionary: String, stderr: R, faults: FaultSender)
where
    R: AsyncRead + Unpin + Send,
{
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!(dictionary, "stderr relay: EOF detected");
                break;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(strip_terminator(&buf)).into_owned();
                error!(dictionary, line = line.as_str(), "dictionary reported an error");
                faults::report(
                    &faults,
                    DictionaryFault::Stderr {
                        dictionary: dictionary.clone(),
                        line,
                    },
                );
            }
            Err(err) => {
                debug!(dictionary, error = %err, "stderr relay: read failed, stopping");
                break;
            }
        }
    }
}

fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
