//! Command Dispatcher
//!
//! Takes a decoded request, validates it into a [`Command`], and runs it
//! against the [`StorageEngine`]. Mutating commands are written to the
//! [`AppendLog`] first, inside the same critical section as the store update.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      CommandHandler                          │
//! │                                                              │
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────┐       │
//! │  │ Command::   │──>│  AppendLog   │──>│   apply()    │       │
//! │  │  parse()    │   │ (mutating,   │   │              │       │
//! │  └─────────────┘   │  live only)  │   └──────┬───────┘       │
//! │                    └──────────────┘          │               │
//! │                                              ▼               │
//! │                                       StorageEngine          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The same entry point serves live traffic and startup replay. A handler
//! built with [`CommandHandler::replaying`] never writes to the log.

use crate::commands::command::{is_mutating_name, Command, CommandError};
use crate::persistence::AppendLog;
use crate::protocol::{Request, RespValue};
use crate::storage::{deadline_in_millis, StorageEngine, Ttl};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{error, trace};

/// Routes requests to the store, logging mutations when a log is attached.
#[derive(Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
    /// Append log for mutating commands (absent in memory-only and replay mode)
    log: Option<Arc<AppendLog>>,
    replaying: bool,
}

impl CommandHandler {
    /// Creates a handler with no append log (memory only).
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self {
            storage,
            log: None,
            replaying: false,
        }
    }

    /// Creates a handler that logs every mutating command before applying it.
    pub fn with_log(storage: Arc<StorageEngine>, log: Arc<AppendLog>) -> Self {
        Self {
            storage,
            log: Some(log),
            replaying: false,
        }
    }

    /// Creates a handler for feeding records back from the log at startup.
    pub fn replaying(storage: Arc<StorageEngine>) -> Self {
        Self {
            storage,
            log: None,
            replaying: true,
        }
    }

    /// True when this handler was built by [`CommandHandler::replaying`].
    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    /// The store this handler operates on.
    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// True when executing `request` would append to the log, which means
    /// waiting for the log lock and an fsync.
    pub fn writes_to_log(&self, request: &Request) -> bool {
        self.log.is_some()
            && matches!(request.first(), Some(RespValue::BulkString(name)) if is_mutating_name(name))
    }

    /// Executes one request and returns the reply.
    ///
    /// # Arguments
    ///
    /// * `request` - The decoded request elements (bulk strings or nulls)
    ///
    /// # Returns
    ///
    /// The RESP reply to send back to the client. Command errors and
    /// persistence failures are returned as error replies.
    pub fn execute(&self, request: Request) -> RespValue {
        let args = match into_arguments(request) {
            Ok(args) => args,
            Err(e) => return e.into(),
        };

        let command = match Command::parse(&args) {
            Ok(command) => command,
            Err(e) => return e.into(),
        };

        trace!(
            command = command.name(),
            replaying = self.replaying,
            "Executing command"
        );

        match &self.log {
            Some(log) if command.is_mutating() => {
                let mut guard = log.lock();
                if let Err(e) = guard.append(&args) {
                    error!(command = command.name(), error = %e, "Append log write failed");
                    return CommandError::Persistence(e.to_string()).into();
                }
                // Applied while the log lock is held: log order is visibility order.
                let reply = self.apply(command);
                drop(guard);
                reply
            }
            _ => self.apply(command),
        }
    }

    /// Runs a validated command against the store.
    fn apply(&self, command: Command) -> RespValue {
        match command {
            Command::Ping(None) => RespValue::pong(),
            Command::Ping(Some(message)) => RespValue::bulk_string(message),

            Command::Set {
                key,
                value,
                expire_secs,
            } => {
                let expires_at =
                    expire_secs.and_then(|secs| deadline_in_millis(secs.saturating_mul(1000)));
                self.storage.set_with_deadline(key, value, expires_at);
                RespValue::ok()
            }

            Command::Get(key) => RespValue::optional_bulk(self.storage.get(&key)),

            Command::Del(keys) => RespValue::integer(self.storage.delete_many(&keys) as i64),

            Command::PExpire { key, millis } => {
                let updated = self.storage.expire_at(&key, deadline_in_millis(millis));
                RespValue::integer(updated as i64)
            }

            Command::Exists(key) => RespValue::integer(self.storage.exists(&key) as i64),

            Command::Ttl(key) => RespValue::integer(ttl_reply(self.storage.ttl(&key))),

            Command::HSet { key, field, value } => {
                RespValue::integer(self.storage.hset(key, field, value) as i64)
            }

            Command::HGet { key, field } => {
                RespValue::optional_bulk(self.storage.hget(&key, &field))
            }

            Command::HDel { key, field } => {
                RespValue::integer(self.storage.hdel(&key, &field) as i64)
            }

            Command::Keys => RespValue::array(
                self.storage
                    .keys()
                    .into_iter()
                    .map(RespValue::bulk_string)
                    .collect(),
            ),
        }
    }
}

/// Extracts the raw arguments of a request, rejecting null elements.
fn into_arguments(request: Request) -> Result<Vec<Bytes>, CommandError> {
    if request.is_empty() {
        return Err(CommandError::Empty);
    }

    request
        .into_iter()
        .map(|value| match value {
            RespValue::BulkString(data) => Ok(data),
            _ => Err(CommandError::InvalidArgument),
        })
        .collect()
}

/// Maps a TTL lookup to its integer reply.
///
/// A remainder that rounds down to zero seconds counts as already expired.
fn ttl_reply(ttl: Ttl) -> i64 {
    match ttl {
        Ttl::Missing => -2,
        Ttl::Persistent => -1,
        Ttl::Remaining(left) => match left.as_secs() {
            0 => -2,
            secs => secs as i64,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn create_handler() -> CommandHandler {
        let storage = Arc::new(StorageEngine::new());
        CommandHandler::new(storage)
    }

    fn make_command(args: &[&str]) -> Request {
        args.iter()
            .map(|s| RespValue::bulk_string(Bytes::from(s.to_string())))
            .collect()
    }

    #[test]
    fn test_ping() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["PING"]));
        assert_eq!(response, RespValue::simple_string("PONG"));

        let response = handler.execute(make_command(&["PING", "hello"]));
        assert_eq!(response, RespValue::bulk_string(Bytes::from("hello")));
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["SET", "key", "value"]));
        assert_eq!(response, RespValue::ok());

        let response = handler.execute(make_command(&["GET", "key"]));
        assert_eq!(response, RespValue::bulk_string(Bytes::from("value")));
    }

    #[test]
    fn test_get_nonexistent() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["GET", "nonexistent"]));
        assert_eq!(response, RespValue::null());
    }

    #[test]
    fn test_del() {
        let handler = create_handler();

        handler.execute(make_command(&["SET", "key1", "value1"]));
        handler.execute(make_command(&["SET", "key2", "value2"]));

        let response = handler.execute(make_command(&["DEL", "key1", "key2", "key3"]));
        assert_eq!(response, RespValue::integer(2));
    }

    #[test]
    fn test_exists() {
        let handler = create_handler();

        handler.execute(make_command(&["SET", "key1", "value1"]));

        let response = handler.execute(make_command(&["EXISTS", "key1"]));
        assert_eq!(response, RespValue::integer(1));

        let response = handler.execute(make_command(&["EXISTS", "nonexistent"]));
        assert_eq!(response, RespValue::integer(0));
    }

    #[test]
    fn test_set_with_expiry() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["SET", "k", "v", "EX", "100"]));
        assert_eq!(response, RespValue::ok());

        let ttl = handler.execute(make_command(&["TTL", "k"])).as_integer().unwrap();
        assert!((99..=100).contains(&ttl), "ttl was {}", ttl);

        // SET without EX drops the old expiry
        handler.execute(make_command(&["SET", "k", "v2"]));
        assert_eq!(
            handler.execute(make_command(&["TTL", "k"])),
            RespValue::integer(-1)
        );
    }

    #[test]
    fn test_set_with_non_positive_expiry() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["SET", "k", "v", "EX", "0"]));
        assert_eq!(response, RespValue::ok());
        assert_eq!(handler.execute(make_command(&["GET", "k"])), RespValue::null());
    }

    #[test]
    fn test_ttl_states() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["TTL", "missing"])),
            RespValue::integer(-2)
        );

        handler.execute(make_command(&["SET", "plain", "v"]));
        assert_eq!(
            handler.execute(make_command(&["TTL", "plain"])),
            RespValue::integer(-1)
        );

        // Under one second left rounds down to zero, reported as gone
        handler.execute(make_command(&["SET", "short", "v"]));
        handler.execute(make_command(&["PEXPIRE", "short", "500"]));
        assert_eq!(
            handler.execute(make_command(&["TTL", "short"])),
            RespValue::integer(-2)
        );
    }

    #[test]
    fn test_pexpire() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["PEXPIRE", "missing", "100"])),
            RespValue::integer(0)
        );

        handler.execute(make_command(&["SET", "k", "v"]));
        assert_eq!(
            handler.execute(make_command(&["PEXPIRE", "k", "50"])),
            RespValue::integer(1)
        );
        assert!(handler.execute(make_command(&["GET", "k"])).as_bytes().is_some());

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(handler.execute(make_command(&["GET", "k"])), RespValue::null());
        assert_eq!(
            handler.execute(make_command(&["PEXPIRE", "k", "100"])),
            RespValue::integer(0)
        );
    }

    #[test]
    fn test_pexpire_non_positive_expires_key() {
        let handler = create_handler();

        handler.execute(make_command(&["SET", "k", "v"]));
        assert_eq!(
            handler.execute(make_command(&["PEXPIRE", "k", "-1"])),
            RespValue::integer(1)
        );
        assert_eq!(
            handler.execute(make_command(&["EXISTS", "k"])),
            RespValue::integer(0)
        );
    }

    #[test]
    fn test_hash_commands() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["HSSET", "h", "f", "v1"])),
            RespValue::integer(1)
        );
        assert_eq!(
            handler.execute(make_command(&["HSSET", "h", "f", "v2"])),
            RespValue::integer(0)
        );
        assert_eq!(
            handler.execute(make_command(&["HSGET", "h", "f"])),
            RespValue::bulk_string(Bytes::from("v2"))
        );
        assert_eq!(
            handler.execute(make_command(&["HSGET", "h", "nope"])),
            RespValue::null()
        );
        assert_eq!(
            handler.execute(make_command(&["HSDEL", "h", "f"])),
            RespValue::integer(1)
        );
        assert_eq!(
            handler.execute(make_command(&["HSDEL", "h", "f"])),
            RespValue::integer(0)
        );
    }

    #[test]
    fn test_keys() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["KEYS", "*"])),
            RespValue::array(vec![])
        );

        handler.execute(make_command(&["SET", "a", "1"]));
        handler.execute(make_command(&["HSSET", "b", "f", "v"]));
        handler.execute(make_command(&["HSSET", "a", "f", "v"]));

        let reply = handler.execute(make_command(&["KEYS", "*"]));
        let mut keys: Vec<&[u8]> = reply
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_bytes().unwrap())
            .collect();
        keys.sort();
        assert_eq!(keys, vec![&b"a"[..], &b"b"[..]]);

        assert_eq!(
            handler.execute(make_command(&["KEYS", "a*"])),
            RespValue::error("only KEYS * is supported")
        );
    }

    #[test]
    fn test_command_errors() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(vec![]),
            RespValue::error("empty command")
        );
        assert_eq!(
            handler.execute(make_command(&["nosuch", "x"])),
            RespValue::error("unknown command 'NOSUCH'")
        );
        assert_eq!(
            handler.execute(make_command(&["GET"])),
            RespValue::error("wrong number of arguments for 'get' command")
        );
        assert_eq!(
            handler.execute(make_command(&["PEXPIRE", "k", "soon"])),
            RespValue::error("value is not an integer or out of range")
        );
        assert_eq!(
            handler.execute(make_command(&["SET", "k", "v", "XX", "1"])),
            RespValue::error("syntax error")
        );
        assert_eq!(
            handler.execute(vec![RespValue::bulk_string("GET"), RespValue::null()]),
            RespValue::error("invalid argument")
        );
    }

    #[test]
    fn test_mutations_are_logged_before_reply() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("appendonly.aof");
        let log = Arc::new(AppendLog::open(&path).unwrap());
        let handler = CommandHandler::with_log(Arc::new(StorageEngine::new()), Arc::clone(&log));

        handler.execute(make_command(&["set", "k", "v"]));
        handler.execute(make_command(&["GET", "k"]));
        handler.execute(make_command(&["DEL", "missing"]));
        handler.execute(make_command(&["HSSET", "h", "f", "v"]));

        // Rejected commands are not logged
        handler.execute(make_command(&["SET", "k"]));
        handler.execute(make_command(&["PEXPIRE", "k", "later"]));

        assert_eq!(log.records(), 3);
        let contents = std::fs::read(&path).unwrap();
        assert_eq!(
            contents,
            b"*3\r\n$3\r\nset\r\n$1\r\nk\r\n$1\r\nv\r\n\
*2\r\n$3\r\nDEL\r\n$7\r\nmissing\r\n\
*4\r\n$5\r\nHSSET\r\n$1\r\nh\r\n$1\r\nf\r\n$1\r\nv\r\n"
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_append_leaves_store_untouched() {
        let log = Arc::new(AppendLog::open("/dev/full").unwrap());
        let handler = CommandHandler::with_log(Arc::new(StorageEngine::new()), Arc::clone(&log));

        let reply = handler.execute(make_command(&["SET", "ghost", "1"]));
        match &reply {
            RespValue::Error(msg) => assert!(
                msg.starts_with("persistence failure: failed to write to /dev/full"),
                "{}",
                msg
            ),
            other => panic!("expected error reply, got {:?}", other),
        }
        assert_eq!(handler.execute(make_command(&["GET", "ghost"])), RespValue::null());

        // Later mutations are refused too; reads keep working
        let reply = handler.execute(make_command(&["HSSET", "h", "f", "v"]));
        assert!(reply.is_error());
        assert_eq!(
            handler.execute(make_command(&["HSGET", "h", "f"])),
            RespValue::null()
        );
        assert_eq!(
            handler.execute(make_command(&["PING"])),
            RespValue::pong()
        );
        assert_eq!(log.records(), 0);
    }

    #[test]
    fn test_writes_to_log() {
        let dir = tempdir().unwrap();
        let log = Arc::new(AppendLog::open(dir.path().join("appendonly.aof")).unwrap());
        let storage = Arc::new(StorageEngine::new());
        let logged = CommandHandler::with_log(Arc::clone(&storage), log);

        assert!(logged.writes_to_log(&make_command(&["set", "k", "v"])));
        assert!(logged.writes_to_log(&make_command(&["HSDEL", "h", "f"])));
        assert!(!logged.writes_to_log(&make_command(&["GET", "k"])));
        assert!(!logged.writes_to_log(&vec![]));

        let memory = CommandHandler::new(storage);
        assert!(!memory.writes_to_log(&make_command(&["SET", "k", "v"])));
    }

    #[test]
    fn test_replaying_handler_never_logs() {
        let handler = CommandHandler::replaying(Arc::new(StorageEngine::new()));
        assert!(handler.is_replaying());

        handler.execute(make_command(&["SET", "k", "v"]));
        assert_eq!(
            handler.storage().get(&Bytes::from("k")),
            Some(Bytes::from("v"))
        );
    }

    #[test]
    fn test_concurrent_hsset_reports_new_once() {
        let handler = create_handler();

        let results: Vec<RespValue> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| s.spawn(|| handler.execute(make_command(&["HSSET", "h", "f", "v"]))))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let created = results
            .iter()
            .filter(|r| **r == RespValue::integer(1))
            .count();
        assert_eq!(created, 1);
    }
}
