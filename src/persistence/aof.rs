//! Append-Only Log Writer
//!
//! Every mutating command is recorded as the same RESP array frame a client
//! would send, built from the original argument vector. There is no header,
//! checksum or separator; the frame format is the record format.
//!
//! Write ordering for one record:
//! 1. take the single writer lock ([`AppendLog::lock`])
//! 2. encode the argument vector as a RESP array
//! 3. write it straight to the file (no userspace buffer)
//! 4. `sync_data()` so the bytes reach stable storage
//! 5. the caller applies the mutation to the store, still holding the lock
//! 6. the lock is released and the reply goes out
//!
//! Holding the lock across step 5 makes the log order identical to the order
//! in which mutations become visible.
//!
//! If step 3 or 4 fails the file is cut back to the end of the last good
//! record, so a rejected command never reaches a later replay. When that cut
//! fails too, the log refuses every further append.

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::protocol::RespValue;

/// Errors raised while writing the append log.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// An I/O call on the log file failed
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    /// An earlier failed append could not be rolled back
    #[error("append log {} is unusable after a failed rollback", .path.display())]
    Unusable { path: PathBuf },
}

impl PersistenceError {
    pub(crate) fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        PersistenceError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Returns true when `path` exists and holds at least one byte.
pub fn needs_replay(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.len() > 0)
        .unwrap_or(false)
}

/// File state guarded by the writer lock.
#[derive(Debug)]
struct LogWriter {
    file: File,
    /// End of the last complete record (tracked to avoid stat calls)
    size: u64,
    /// Records appended since the log was opened
    records: u64,
    /// Set once a failed append could not be cut back out of the file
    unusable: bool,
}

impl LogWriter {
    fn write_record(&mut self, record: &[u8], path: &Path) -> Result<(), PersistenceError> {
        self.file
            .write_all(record)
            .map_err(|e| PersistenceError::io("write to", path, e))?;
        self.file
            .sync_data()
            .map_err(|e| PersistenceError::io("sync", path, e))
    }

    /// Truncates the file to the end of the last complete record.
    fn rollback(&mut self, path: &Path) -> Result<(), PersistenceError> {
        self.file
            .set_len(self.size)
            .and_then(|()| self.file.sync_all())
            .map_err(|e| PersistenceError::io("roll back", path, e))
    }
}

/// The durable, append-only record of mutating commands.
///
/// Share it between connections with an `Arc`; all appends go through one
/// writer lock.
#[derive(Debug)]
pub struct AppendLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
}

impl AppendLog {
    /// Opens (creating if needed) the log at `path` in append mode.
    ///
    /// Missing parent directories are created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| PersistenceError::io("create directory for", &path, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PersistenceError::io("open", &path, e))?;

        let size = file
            .metadata()
            .map_err(|e| PersistenceError::io("stat", &path, e))?
            .len();

        info!(path = %path.display(), size = size, "Append log opened");

        Ok(Self {
            path,
            writer: Mutex::new(LogWriter {
                file,
                size,
                records: 0,
                unusable: false,
            }),
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the log in bytes.
    pub fn size(&self) -> u64 {
        self.writer.lock().size
    }

    /// Records appended since the log was opened.
    pub fn records(&self) -> u64 {
        self.writer.lock().records
    }

    /// Takes the writer lock.
    ///
    /// Other appenders block until the returned guard is dropped, so a caller
    /// can append and then apply its mutation inside one critical section.
    pub fn lock(&self) -> AppendGuard<'_> {
        AppendGuard {
            path: &self.path,
            writer: self.writer.lock(),
        }
    }

    /// Appends one record under a short-lived lock.
    pub fn append(&self, args: &[Bytes]) -> Result<(), PersistenceError> {
        self.lock().append(args)
    }
}

/// Exclusive access to the log for the duration of one mutation.
pub struct AppendGuard<'a> {
    path: &'a Path,
    writer: MutexGuard<'a, LogWriter>,
}

impl AppendGuard<'_> {
    /// Encodes `args` as a RESP array, writes it and syncs it to disk.
    ///
    /// Returns only after the record is durable. On failure nothing of the
    /// record is left in the file.
    pub fn append(&mut self, args: &[Bytes]) -> Result<(), PersistenceError> {
        let writer = &mut *self.writer;
        if writer.unusable {
            return Err(PersistenceError::Unusable {
                path: self.path.to_path_buf(),
            });
        }

        let mut record = Vec::with_capacity(16 + args.iter().map(|a| a.len() + 16).sum::<usize>());
        RespValue::command(args).serialize_into(&mut record);

        if let Err(e) = writer.write_record(&record, self.path) {
            match writer.rollback(self.path) {
                Ok(()) => warn!(size = writer.size, "Rolled back failed log append"),
                Err(rollback) => {
                    writer.unusable = true;
                    error!(error = %rollback, "Append log is now refusing writes");
                }
            }
            return Err(e);
        }

        writer.size += record.len() as u64;
        writer.records += 1;
        debug!(bytes = record.len(), size = writer.size, "Appended log record");

        Ok(())
    }
}
