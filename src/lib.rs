//! # driftkv - A Durable In-Memory Key-Value Server
//!
//! driftkv speaks a RESP-framed request/reply protocol over TCP and keeps
//! string values (with optional expiry) and field maps in memory. Every
//! mutating command is appended to a log on disk before it becomes visible,
//! and the log is replayed at startup to rebuild the store.
//!
//! ## Features
//!
//! - **RESP framing**: Requests are arrays of bulk strings; replies use the
//!   usual status, error, integer, bulk and array shapes
//! - **Sharded storage**: Two namespaces (strings and hashes) spread over 64
//!   shards with per-shard read/write locks
//! - **TTL Support**: Lazy expiry on every read plus a background sweeper
//! - **Durability**: An append-only log, written and synced under one lock
//!   together with the store update
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              driftkv                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    ┌──────────┐  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │───>│AppendLog │  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │    │ (fsync)  │  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘    └────┬─────┘  │
//! │                                               │                │        │
//! │                                               ▼                │replay  │
//! │                     ┌──────────────────────────────────────┐   │        │
//! │                     │            StorageEngine             │<──┘        │
//! │                     │  strings + hashes, 64 RwLock shards  │            │
//! │                     └──────────────────────────────────────┘            │
//! │                                               ▲                         │
//! │                     ┌─────────────────────────┴──────────────────────┐  │
//! │                     │       ExpirySweeper (RecurringTask, 1s)        │  │
//! │                     └────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use driftkv::commands::CommandHandler;
//! use driftkv::connection::{handle_connection, ConnectionStats};
//! use driftkv::persistence::{replay_log, AppendLog};
//! use driftkv::storage::{start_expiry_sweeper, StorageEngine};
//! use std::path::Path;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = Arc::new(StorageEngine::new());
//!     replay_log(Path::new("appendonly.aof"), Arc::clone(&storage))?;
//!     let log = Arc::new(AppendLog::open("appendonly.aof")?);
//!
//!     let _sweeper = start_expiry_sweeper(Arc::clone(&storage));
//!     let stats = Arc::new(ConnectionStats::new());
//!     let listener = TcpListener::bind("127.0.0.1:6380").await?;
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         let handler = CommandHandler::with_log(Arc::clone(&storage), Arc::clone(&log));
//!         tokio::spawn(handle_connection(stream, addr, handler, Arc::clone(&stats)));
//!     }
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: request decoder and reply encoder
//! - [`storage`]: thread-safe storage engine and the expiry sweeper
//! - [`persistence`]: append-only log and startup replay
//! - [`commands`]: command validation and dispatch
//! - [`connection`]: client connection management
//! - [`config`]: command-line configuration
//!
//! ## Design Highlights
//!
//! ### Log, then apply
//!
//! A mutating command is validated, appended and synced to the log, and only
//! then applied to the store, all while holding the log's writer lock. A reply
//! therefore never reports a change the log does not hold, and the log order
//! is the order in which changes became visible.
//!
//! ### Lazy + Active Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: When a key is accessed, we check if it's expired
//! 2. **Active**: A background task periodically scans for expired keys

pub mod commands;
pub mod config;
pub mod connection;
pub mod persistence;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{Command, CommandError, CommandHandler};
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats};
pub use persistence::{replay_log, AppendLog, PersistenceError, ReplayError, ReplayReport};
pub use protocol::{ParseError, RequestParser, RespValue};
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port driftkv listens on
pub const DEFAULT_PORT: u16 = 6380;

/// The default host driftkv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of driftkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
