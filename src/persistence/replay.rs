//! Startup Replay
//!
//! Rebuilds the store by decoding the append log front to back and feeding
//! each record through a replaying [`CommandHandler`], which never writes
//! back to the log.
//!
//! A crash in the middle of an append leaves an incomplete frame at the end of
//! the file. That tail is discarded and the file is truncated to the last
//! complete record, so later appends start on a frame boundary. A frame that
//! fails to decode anywhere is corruption and aborts replay: skipping it would
//! rebuild a state no client ever observed.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::commands::CommandHandler;
use crate::persistence::PersistenceError;
use crate::protocol::{ParseError, RequestParser};
use crate::storage::StorageEngine;

/// Errors that stop replay.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Io(#[from] PersistenceError),

    /// A record that is not the trailing one failed to decode
    #[error("corrupt append log record at byte offset {offset}: {source}")]
    Corrupt { offset: usize, source: ParseError },
}

/// Outcome of a successful replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Records decoded and executed
    pub records: u64,
    /// Records whose execution produced an error reply
    pub rejected: u64,
    /// Bytes of an incomplete trailing record that were cut off
    pub discarded_bytes: u64,
}

/// Replays the log at `path` into `storage`.
///
/// A missing file replays nothing.
pub fn replay_log(path: &Path, storage: Arc<StorageEngine>) -> Result<ReplayReport, ReplayError> {
    let mut report = ReplayReport::default();

    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No append log found, starting empty");
            return Ok(report);
        }
        Err(e) => return Err(PersistenceError::io("read", path, e).into()),
    };

    let handler = CommandHandler::replaying(storage);
    let mut parser = RequestParser::new();
    let mut offset = 0;

    while offset < data.len() {
        match parser.parse(&data[offset..]) {
            Ok(Some((request, consumed))) => {
                let reply = handler.execute(request);
                if reply.is_error() {
                    warn!(offset = offset, reply = %reply, "Replayed record was rejected");
                    report.rejected += 1;
                }
                report.records += 1;
                offset += consumed;
            }
            Ok(None) => break,
            Err(source) => return Err(ReplayError::Corrupt { offset, source }),
        }
    }

    if offset < data.len() {
        let discarded = (data.len() - offset) as u64;
        warn!(
            path = %path.display(),
            offset = offset,
            discarded_bytes = discarded,
            "Discarding incomplete trailing record"
        );
        truncate(path, offset as u64)?;
        report.discarded_bytes = discarded;
    }

    info!(
        path = %path.display(),
        records = report.records,
        rejected = report.rejected,
        "Append log replayed"
    );

    Ok(report)
}

/// Cuts the file back to `len` bytes and syncs the new length.
fn truncate(path: &Path, len: u64) -> Result<(), PersistenceError> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| PersistenceError::io("open for truncation", path, e))?;
    file.set_len(len)
        .map_err(|e| PersistenceError::io("truncate", path, e))?;
    file.sync_all()
        .map_err(|e| PersistenceError::io("sync", path, e))
}
