//! Line-delimited JSON transport to an external dictionary process.
//!
//! Submodules, leaves first:
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based framing
//!   with a per-line size ceiling.
//! - `wire`: request encoding and the closed response decode result.
//! - `handshake`: the one-line configuration the backend declares first.
//! - `spawner`: process launch and supervision.
//! - `channel`: sequence numbers, stdin writes and the pending table.
//! - `latency`: the per-request latency ceiling.
//! - `reader`: the stdout task that resolves pending requests.
//! - `stderr`: the task that relays diagnostics as faults.

pub mod channel;
pub mod codec;
pub mod handshake;
pub mod latency;
pub mod reader;
pub mod spawner;
pub mod stderr;
pub mod wire;
