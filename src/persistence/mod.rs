//! Persistence Module
//!
//! The append-only log of mutating commands and its startup replay.
//!
//! ## Record format
//!
//! Each record is one RESP request frame holding the original argument
//! vector, command name included:
//!
//! ```text
//! *3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use driftkv::persistence::{replay_log, AppendLog};
//! use driftkv::storage::StorageEngine;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(StorageEngine::new());
//! let report = replay_log(Path::new("appendonly.aof"), Arc::clone(&storage)).unwrap();
//! println!("replayed {} records", report.records);
//!
//! let log = AppendLog::open("appendonly.aof").unwrap();
//! ```

pub mod aof;
pub mod replay;

pub use aof::{needs_replay, AppendGuard, AppendLog, PersistenceError};
pub use replay::{replay_log, ReplayError, ReplayReport};
