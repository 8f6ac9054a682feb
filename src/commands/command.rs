//! Typed Commands
//!
//! Turns a raw argument vector into a [`Command`], checking the command name,
//! its arity and any numeric arguments. Nothing here touches the store or the
//! append log, so a command that fails to parse is never persisted.

use bytes::Bytes;
use thiserror::Error;

use crate::protocol::RespValue;

/// Command-level errors. They become `-ERR ...` replies and leave the
/// connection open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("value is not an integer or out of range")]
    NotInteger,

    #[error("syntax error")]
    Syntax,

    #[error("only KEYS * is supported")]
    KeysPattern,

    /// A null bulk element inside a request
    #[error("invalid argument")]
    InvalidArgument,

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<CommandError> for RespValue {
    fn from(err: CommandError) -> Self {
        RespValue::error(err.to_string())
    }
}

/// A validated command, ready to run against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping(Option<Bytes>),
    Set {
        key: Bytes,
        value: Bytes,
        /// Relative expiry from `EX <seconds>`
        expire_secs: Option<i64>,
    },
    Get(Bytes),
    Del(Vec<Bytes>),
    PExpire {
        key: Bytes,
        millis: i64,
    },
    Exists(Bytes),
    Ttl(Bytes),
    HSet {
        key: Bytes,
        field: Bytes,
        value: Bytes,
    },
    HGet {
        key: Bytes,
        field: Bytes,
    },
    HDel {
        key: Bytes,
        field: Bytes,
    },
    Keys,
}

impl Command {
    /// Parses an argument vector whose first element is the command name.
    ///
    /// The name is matched case-insensitively.
    pub fn parse(args: &[Bytes]) -> Result<Self, CommandError> {
        let (name, rest) = args.split_first().ok_or(CommandError::Empty)?;
        let name = String::from_utf8_lossy(name).to_ascii_uppercase();

        match name.as_str() {
            "PING" => match rest {
                [] => Ok(Command::Ping(None)),
                [message] => Ok(Command::Ping(Some(message.clone()))),
                _ => Err(CommandError::WrongArity("ping")),
            },
            "SET" => match rest {
                [key, value] => Ok(Command::Set {
                    key: key.clone(),
                    value: value.clone(),
                    expire_secs: None,
                }),
                [key, value, option, seconds] => {
                    if !option.eq_ignore_ascii_case(b"EX") {
                        return Err(CommandError::Syntax);
                    }
                    Ok(Command::Set {
                        key: key.clone(),
                        value: value.clone(),
                        expire_secs: Some(parse_integer(seconds)?),
                    })
                }
                _ => Err(CommandError::WrongArity("set")),
            },
            "GET" => match rest {
                [key] => Ok(Command::Get(key.clone())),
                _ => Err(CommandError::WrongArity("get")),
            },
            "DEL" => {
                if rest.is_empty() {
                    return Err(CommandError::WrongArity("del"));
                }
                Ok(Command::Del(rest.to_vec()))
            }
            "PEXPIRE" => match rest {
                [key, millis] => Ok(Command::PExpire {
                    key: key.clone(),
                    millis: parse_integer(millis)?,
                }),
                _ => Err(CommandError::WrongArity("pexpire")),
            },
            // Only the first key is examined; further keys are accepted and ignored.
            "EXISTS" => match rest {
                [key, ..] => Ok(Command::Exists(key.clone())),
                [] => Err(CommandError::WrongArity("exists")),
            },
            "TTL" => match rest {
                [key] => Ok(Command::Ttl(key.clone())),
                _ => Err(CommandError::WrongArity("ttl")),
            },
            "HSSET" => match rest {
                [key, field, value] => Ok(Command::HSet {
                    key: key.clone(),
                    field: field.clone(),
                    value: value.clone(),
                }),
                _ => Err(CommandError::WrongArity("hsset")),
            },
            "HSGET" => match rest {
                [key, field] => Ok(Command::HGet {
                    key: key.clone(),
                    field: field.clone(),
                }),
                _ => Err(CommandError::WrongArity("hsget")),
            },
            "HSDEL" => match rest {
                [key, field] => Ok(Command::HDel {
                    key: key.clone(),
                    field: field.clone(),
                }),
                _ => Err(CommandError::WrongArity("hsdel")),
            },
            "KEYS" => match rest {
                [pattern] if &pattern[..] == b"*" => Ok(Command::Keys),
                [_] => Err(CommandError::KeysPattern),
                _ => Err(CommandError::WrongArity("keys")),
            },
            _ => Err(CommandError::Unknown(name)),
        }
    }

    /// Lower-case command name, as used in error replies and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping(_) => "ping",
            Command::Set { .. } => "set",
            Command::Get(_) => "get",
            Command::Del(_) => "del",
            Command::PExpire { .. } => "pexpire",
            Command::Exists(_) => "exists",
            Command::Ttl(_) => "ttl",
            Command::HSet { .. } => "hsset",
            Command::HGet { .. } => "hsget",
            Command::HDel { .. } => "hsdel",
            Command::Keys => "keys",
        }
    }

    /// True for the commands that go through the append log:
    /// SET, DEL, PEXPIRE, HSSET and HSDEL.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Command::Set { .. }
                | Command::Del(_)
                | Command::PExpire { .. }
                | Command::HSet { .. }
                | Command::HDel { .. }
        )
    }
}

/// True when `name` (any case) is one of the mutating command names.
pub(crate) fn is_mutating_name(name: &[u8]) -> bool {
    const MUTATING: [&[u8]; 5] = [b"SET", b"DEL", b"PEXPIRE", b"HSSET", b"HSDEL"];
    MUTATING.iter().any(|m| name.eq_ignore_ascii_case(m))
}

/// Parses a signed 64-bit decimal integer argument.
fn parse_integer(arg: &Bytes) -> Result<i64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(CommandError::NotInteger)
}
