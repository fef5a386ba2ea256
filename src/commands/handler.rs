//! Command Table and Dispatch
//!
//! Every data command is a plain function registered under its lower-cased
//! name. A handler either receives the already-extracted key plus the
//! remaining arguments, or (for commands without a key) the raw argument
//! list. Handlers return `Result<Value, CommandError>`; the dispatcher
//! flattens errors into error replies.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        CommandTable                          │
//! │                                                              │
//! │  ┌───────────────┐   ┌──────────────┐   ┌────────────────┐   │
//! │  │ command_name()│──>│ lookup+arity │──>│ Keyed(f)       │   │
//! │  └───────────────┘   └──────────────┘   │ Keyless(f)     │   │
//! │                                         │ Unimplemented  │   │
//! │                                         └───────┬────────┘   │
//! │                                                 ▼            │
//! │                                  Database (CommandContext)   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use bytes::Bytes;
use std::collections::HashMap;
use thiserror::Error;

use crate::commands::{hashes, keys, lists, strings};
use crate::protocol::{ParseError, Value};
use crate::storage::{Database, DatabaseRegistry, Element, PatternError};

/// Every client-visible command failure.
///
/// The `Display` text is exactly what the client receives.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandError {
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR command '{0}' is not implemented")]
    NotImplemented(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("ERR Unknown parameter")]
    InvalidParameter,

    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpire(&'static str),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("NOAUTH Authentication required.")]
    NoAuth,

    #[error("ERR Invalid password")]
    InvalidPassword,

    #[error("ERR Client sent AUTH, but no password is set")]
    NoPasswordSet,

    #[error("ERR no such key")]
    NoSuchKey,

    #[error("ERR index out of range")]
    IndexOutOfRange,

    #[error("ERR increment or decrement would overflow")]
    Overflow,

    #[error("ERR source and destination objects are the same")]
    SameObject,

    #[error("ERR DB index is out of range")]
    InvalidDbIndex,

    #[error("ERR MULTI calls can not be nested")]
    NestedMulti,

    #[error("ERR EXEC without MULTI")]
    ExecWithoutMulti,

    #[error("ERR Invalid command")]
    InvalidCommand,

    #[error("ERR invalid pattern: {0}")]
    Pattern(#[from] PatternError),

    #[error("ERR Protocol error: {0}")]
    Protocol(#[from] ParseError),
}

impl From<CommandError> for Value {
    fn from(err: CommandError) -> Self {
        Value::Error(err.to_string())
    }
}

pub type CommandResult = Result<Value, CommandError>;

/// What a handler can reach while it runs.
pub struct CommandContext<'a> {
    /// The session's selected database
    pub db: &'a Database,
    /// Every database of the server (MOVE, FLUSHALL)
    pub databases: &'a DatabaseRegistry,
}

pub type KeyedFn = fn(&CommandContext<'_>, &Bytes, &[Value]) -> CommandResult;
pub type KeylessFn = fn(&CommandContext<'_>, &[Value]) -> CommandResult;

#[derive(Clone, Copy)]
pub enum Handler {
    /// Receives the key (first argument) and the arguments after it
    Keyed(KeyedFn),
    /// Receives every argument after the command name
    Keyless(KeylessFn),
    /// Known name without an implementation
    Unimplemented,
}

/// One entry of the command table.
#[derive(Clone, Copy)]
pub struct Command {
    pub name: &'static str,
    pub handler: Handler,
    /// Minimum number of arguments after the command name
    pub min_args: usize,
    /// Maximum number of arguments after the command name, if bounded
    pub max_args: Option<usize>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish()
    }
}

impl Command {
    /// Checks arity, extracts the key and runs the handler.
    pub fn invoke(&self, ctx: &CommandContext<'_>, args: &[Value]) -> CommandResult {
        match self.handler {
            Handler::Keyed(f) => {
                self.check_arity(args)?;
                let (key, rest) = args
                    .split_first()
                    .ok_or_else(|| CommandError::WrongArity(self.name.to_string()))?;
                f(ctx, &bytes_arg(key)?, rest)
            }
            Handler::Keyless(f) => {
                self.check_arity(args)?;
                f(ctx, args)
            }
            Handler::Unimplemented => Err(CommandError::NotImplemented(self.name.to_string())),
        }
    }

    fn check_arity(&self, args: &[Value]) -> Result<(), CommandError> {
        let too_many = self.max_args.is_some_and(|max| args.len() > max);
        if args.len() < self.min_args || too_many {
            return Err(CommandError::WrongArity(self.name.to_string()));
        }
        Ok(())
    }
}

/// Names that are recognised but answer "not implemented".
const UNIMPLEMENTED: &[&str] = &[
    "bitcount",
    "bitfield",
    "bitop",
    "bitpos",
    "getbit",
    "setbit",
    "getrange",
    "setrange",
    "incrbyfloat",
    "hincrbyfloat",
    "hscan",
    "scan",
    "randomkey",
    "dump",
    "restore",
    "object",
    "sort",
];

/// Fixed mapping from lower-cased command name to [`Command`].
#[derive(Debug)]
pub struct CommandTable {
    commands: HashMap<&'static str, Command>,
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTable {
    /// Builds the table with every data command registered.
    pub fn new() -> Self {
        let mut table = Self {
            commands: HashMap::new(),
        };
        keys::register(&mut table);
        strings::register(&mut table);
        lists::register(&mut table);
        hashes::register(&mut table);
        for &name in UNIMPLEMENTED {
            table.insert(name, Handler::Unimplemented, 0, None);
        }
        table
    }

    fn insert(
        &mut self,
        name: &'static str,
        handler: Handler,
        min_args: usize,
        max_args: Option<usize>,
    ) {
        self.commands.insert(
            name,
            Command {
                name,
                handler,
                min_args,
                max_args,
            },
        );
    }

    /// Registers a command whose first argument is a key.
    ///
    /// `min_args`/`max_args` count every argument after the command name,
    /// including the key.
    pub fn keyed(
        &mut self,
        name: &'static str,
        f: KeyedFn,
        min_args: usize,
        max_args: Option<usize>,
    ) {
        self.insert(name, Handler::Keyed(f), min_args.max(1), max_args);
    }

    pub fn keyless(
        &mut self,
        name: &'static str,
        f: KeylessFn,
        min_args: usize,
        max_args: Option<usize>,
    ) {
        self.insert(name, Handler::Keyless(f), min_args, max_args);
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Runs one request and returns its reply, errors included.
    pub fn dispatch(&self, ctx: &CommandContext<'_>, request: &[Value]) -> Value {
        match self.try_dispatch(ctx, request) {
            Ok(reply) => reply,
            Err(err) => err.into(),
        }
    }

    pub fn try_dispatch(&self, ctx: &CommandContext<'_>, request: &[Value]) -> CommandResult {
        let name = command_name(request)?;
        let command = self
            .get(&name)
            .ok_or(CommandError::UnknownCommand(name))?;
        command.invoke(ctx, &request[1..])
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

/// Lower-cased name of the command in `request`.
pub fn command_name(request: &[Value]) -> Result<String, CommandError> {
    request
        .first()
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase)
        .ok_or(CommandError::InvalidCommand)
}

/// Extracts a key or value argument.
pub fn bytes_arg(value: &Value) -> Result<Bytes, CommandError> {
    match value {
        Value::BulkString(b) => Ok(b.clone()),
        Value::SimpleString(s) => Ok(Bytes::from(s.clone())),
        Value::Integer(n) => Ok(Bytes::from(n.to_string())),
        _ => Err(CommandError::InvalidParameter),
    }
}

/// Extracts an integer argument.
pub fn int_arg(value: &Value) -> Result<i64, CommandError> {
    match value {
        Value::Integer(n) => Ok(*n),
        other => other
            .as_bytes()
            .and_then(parse_int)
            .ok_or(CommandError::NotInteger),
    }
}

/// Extracts an option token, upper-cased.
pub fn option_arg(value: &Value) -> Result<String, CommandError> {
    value
        .as_str()
        .map(str::to_ascii_uppercase)
        .ok_or(CommandError::Syntax)
}

/// Parses a decimal integer from raw bytes.
pub fn parse_int(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Payload of a stored string, or WRONGTYPE for lists and hashes.
pub fn string_value(value: &Value) -> Result<Bytes, CommandError> {
    match value {
        Value::BulkString(b) => Ok(b.clone()),
        Value::SimpleString(s) => Ok(Bytes::from(s.clone())),
        _ => Err(CommandError::WrongType),
    }
}

/// Runs a mutation that creates the key when it is missing.
pub fn upsert<T>(
    db: &Database,
    key: &Bytes,
    f: impl FnOnce(&mut Element) -> (Result<T, CommandError>, bool),
) -> Result<T, CommandError> {
    // With creation enabled the closure always runs
    db.mutate(key, true, f).unwrap_or(Err(CommandError::NoSuchKey))
}

/// Clamps a Redis-style inclusive `[start, stop]` range (negative indexes
/// count from the end) to `len`. Returns `None` for an empty range.
pub fn clamp_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// Resolves a possibly negative index against `len`.
pub fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { len + index } else { index };
    (0..len).contains(&index).then_some(index as usize)
}
