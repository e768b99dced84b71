#![forbid(unsafe_code)]

//! Steno dictionary adapter that delegates lookups to an external process.
//!
//! The backend is any program that speaks line-delimited JSON on its stdio:
//! it declares its configuration on the first stdout line, then answers
//! `translate` / `untranslate` requests correlated by sequence number.
//! Anything it writes to stderr is relayed to the host as a
//! [`DictionaryFault`].

pub mod config;
pub mod dictionary;
pub mod errors;
pub mod faults;
pub mod stdio;

pub use config::AdapterConfig;
pub use dictionary::StdioDictionary;
pub use errors::{AppError, Result};
pub use faults::DictionaryFault;
pub use stdio::handshake::Configuration;
pub use stdio::spawner::SpawnConfig;
