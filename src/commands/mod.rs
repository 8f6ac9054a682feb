//! Command Module
//!
//! The command processing layer for driftkv. Decoded requests are validated
//! into typed commands, logged when they mutate, and executed against the
//! storage engine.
//!
//! ## Architecture
//!
//! ```text
//! Client Request / Log Record
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ Command::parse  │  (command)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (handler)
//! │                 │
//! │  - Log          │
//! │  - Apply        │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! | Command | Reply |
//! |---|---|
//! | `PING [message]` | `PONG` or the message |
//! | `SET key value [EX seconds]` | `OK` |
//! | `GET key` | value or nil |
//! | `DEL key [key ...]` | number of live keys removed |
//! | `PEXPIRE key milliseconds` | 1 if the key was live, else 0 |
//! | `EXISTS key` | 1 or 0 |
//! | `TTL key` | seconds left, -1 without expiry, -2 when missing |
//! | `HSSET key field value` | 1 if the field is new, else 0 |
//! | `HSGET key field` | value or nil |
//! | `HSDEL key field` | 1 if the field existed, else 0 |
//! | `KEYS *` | every live string key and hash key |
//!
//! SET, DEL, PEXPIRE, HSSET and HSDEL are mutating and go through the
//! append log.

pub mod command;
pub mod handler;

pub use command::{Command, CommandError};
pub use handler::CommandHandler;
