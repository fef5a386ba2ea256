//! String commands.
//!
//! - `GET key`, `SET key value [EX seconds | PX milliseconds] [NX | XX]`
//! - `APPEND key value`, `STRLEN key`, `GETSET key value`
//! - `INCR`, `DECR`, `INCRBY`, `DECRBY`
//! - `MGET key [key ...]`, `MSET key value [key value ...]`, `MSETNX ...`
//! - `SETNX key value`, `SETEX key seconds value`, `PSETEX key millis value`
//!
//! Strings are stored as bulk strings; counters are stored as their decimal
//! text and parsed on every update.

use bytes::{Bytes, BytesMut};

use crate::commands::handler::{
    bytes_arg, int_arg, option_arg, parse_int, string_value, upsert, CommandContext,
    CommandError, CommandResult, CommandTable,
};
use crate::protocol::Value;
use crate::storage::{now_millis, SetMode};

pub(crate) fn register(table: &mut CommandTable) {
    table.keyed("get", get, 1, Some(1));
    table.keyed("set", set, 2, Some(6));
    table.keyed("append", append, 2, Some(2));
    table.keyed("strlen", strlen, 1, Some(1));
    table.keyed("getset", getset, 2, Some(2));
    table.keyed("incr", incr, 1, Some(1));
    table.keyed("decr", decr, 1, Some(1));
    table.keyed("incrby", incrby, 2, Some(2));
    table.keyed("decrby", decrby, 2, Some(2));
    table.keyed("mget", mget, 1, None);
    table.keyed("mset", mset, 2, None);
    table.keyed("msetnx", msetnx, 2, None);
    table.keyed("setnx", setnx, 2, Some(2));
    table.keyed("setex", setex, 3, Some(3));
    table.keyed("psetex", psetex, 3, Some(3));
}

/// GET key
fn get(ctx: &CommandContext<'_>, key: &Bytes, _args: &[Value]) -> CommandResult {
    ctx.db
        .view(key, |element| string_value(&element.value).map(Value::BulkString))
        .unwrap_or(Ok(Value::Null))
}

/// Parsed trailing options of SET.
#[derive(Debug, Default, PartialEq)]
struct SetOptions {
    mode: SetMode,
    ttl_ms: i64,
}

impl SetOptions {
    fn parse(args: &[Value]) -> Result<Self, CommandError> {
        let mut options = SetOptions::default();
        let mut ttl_seen = false;
        let mut mode_seen = false;
        let mut i = 0;

        while i < args.len() {
            let token = option_arg(&args[i])?;
            match token.as_str() {
                "EX" | "PX" => {
                    if ttl_seen {
                        return Err(CommandError::Syntax);
                    }
                    ttl_seen = true;
                    i += 1;
                    let amount = args
                        .get(i)
                        .map(int_arg)
                        .and_then(Result::ok)
                        .filter(|n| *n > 0)
                        .ok_or(CommandError::Syntax)?;
                    options.ttl_ms = if token == "EX" {
                        amount.checked_mul(1000).ok_or(CommandError::Syntax)?
                    } else {
                        amount
                    };
                }
                "NX" | "XX" => {
                    if mode_seen {
                        return Err(CommandError::Syntax);
                    }
                    mode_seen = true;
                    options.mode = if token == "NX" {
                        SetMode::IfNotExists
                    } else {
                        SetMode::IfExists
                    };
                }
                _ => return Err(CommandError::Syntax),
            }
            i += 1;
        }

        Ok(options)
    }
}

/// SET key value [EX seconds | PX milliseconds] [NX | XX]
fn set(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let value = bytes_arg(&args[0])?;
    let options = SetOptions::parse(&args[1..])?;

    let (_, written) = ctx.db.set(
        key.clone(),
        Value::BulkString(value),
        options.mode,
        options.ttl_ms,
    );

    Ok(if written { Value::ok() } else { Value::Null })
}

/// APPEND key value
fn append(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let suffix = bytes_arg(&args[0])?;

    upsert(ctx.db, key, |element| {
        let joined = match &element.value {
            Value::Null => suffix,
            current => match string_value(current) {
                Ok(current) => {
                    let mut joined = BytesMut::with_capacity(current.len() + suffix.len());
                    joined.extend_from_slice(&current);
                    joined.extend_from_slice(&suffix);
                    joined.freeze()
                }
                Err(e) => return (Err(e), false),
            },
        };
        let len = joined.len() as i64;
        element.value = Value::BulkString(joined);
        (Ok(Value::Integer(len)), true)
    })
}

/// STRLEN key
fn strlen(ctx: &CommandContext<'_>, key: &Bytes, _args: &[Value]) -> CommandResult {
    ctx.db
        .view(key, |element| {
            string_value(&element.value).map(|s| Value::Integer(s.len() as i64))
        })
        .unwrap_or(Ok(Value::Integer(0)))
}

/// GETSET key value
///
/// Replaces the value, clears any deadline and returns the old value.
fn getset(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let value = bytes_arg(&args[0])?;

    upsert(ctx.db, key, |element| {
        let previous = match &element.value {
            Value::Null => Value::Null,
            current => match string_value(current) {
                Ok(bytes) => Value::BulkString(bytes),
                Err(e) => return (Err(e), false),
            },
        };
        element.value = Value::BulkString(value);
        element.expires_at = None;
        element.created_at = now_millis();
        (Ok(previous), true)
    })
}

/// Adds `delta` to the counter under `key`, starting from 0.
fn incr_by(ctx: &CommandContext<'_>, key: &Bytes, delta: i64) -> CommandResult {
    upsert(ctx.db, key, |element| {
        let current = match &element.value {
            Value::Null => 0,
            value => match string_value(value) {
                Ok(bytes) => match parse_int(&bytes) {
                    Some(n) => n,
                    None => return (Err(CommandError::NotInteger), false),
                },
                Err(e) => return (Err(e), false),
            },
        };

        match current.checked_add(delta) {
            Some(next) => {
                element.value = Value::BulkString(Bytes::from(next.to_string()));
                (Ok(Value::Integer(next)), true)
            }
            None => (Err(CommandError::Overflow), false),
        }
    })
}

/// INCR key
fn incr(ctx: &CommandContext<'_>, key: &Bytes, _args: &[Value]) -> CommandResult {
    incr_by(ctx, key, 1)
}

/// DECR key
fn decr(ctx: &CommandContext<'_>, key: &Bytes, _args: &[Value]) -> CommandResult {
    incr_by(ctx, key, -1)
}

/// INCRBY key increment
fn incrby(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    incr_by(ctx, key, int_arg(&args[0])?)
}

/// DECRBY key decrement
fn decrby(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let delta = int_arg(&args[0])?
        .checked_neg()
        .ok_or(CommandError::Overflow)?;
    incr_by(ctx, key, delta)
}

/// MGET key [key ...]
///
/// Missing keys and keys holding lists or hashes yield null.
fn mget(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let mut values = Vec::with_capacity(args.len() + 1);
    values.push(mget_one(ctx, key));
    for arg in args {
        values.push(mget_one(ctx, &bytes_arg(arg)?));
    }
    Ok(Value::Array(values))
}

fn mget_one(ctx: &CommandContext<'_>, key: &[u8]) -> Value {
    ctx.db
        .view(key, |element| match string_value(&element.value) {
            Ok(bytes) => Value::BulkString(bytes),
            Err(_) => Value::Null,
        })
        .unwrap_or(Value::Null)
}

/// Collects `key value [key value ...]`, failing on an odd count.
fn pairs(name: &str, key: &Bytes, args: &[Value]) -> Result<Vec<(Bytes, Bytes)>, CommandError> {
    if args.len() % 2 == 0 {
        return Err(CommandError::WrongArity(name.to_string()));
    }

    let mut pairs = Vec::with_capacity(args.len() / 2 + 1);
    pairs.push((key.clone(), bytes_arg(&args[0])?));
    for chunk in args[1..].chunks_exact(2) {
        pairs.push((bytes_arg(&chunk[0])?, bytes_arg(&chunk[1])?));
    }
    Ok(pairs)
}

/// MSET key value [key value ...]
fn mset(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    for (key, value) in pairs("mset", key, args)? {
        ctx.db.set(key, Value::BulkString(value), SetMode::Any, 0);
    }
    Ok(Value::ok())
}

/// MSETNX key value [key value ...]
///
/// Writes nothing if any of the keys exists. The check and the writes happen
/// under the same shard locks.
fn msetnx(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let entries = pairs("msetnx", key, args)?
        .into_iter()
        .map(|(key, value)| (key, Value::BulkString(value)))
        .collect();
    Ok(Value::Integer(i64::from(ctx.db.set_all_if_absent(entries))))
}

/// SETNX key value
fn setnx(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let value = bytes_arg(&args[0])?;
    let (_, written) = ctx
        .db
        .set(key.clone(), Value::BulkString(value), SetMode::IfNotExists, 0);
    Ok(Value::Integer(i64::from(written)))
}

fn set_with_ttl(
    ctx: &CommandContext<'_>,
    name: &'static str,
    key: &Bytes,
    args: &[Value],
    unit_ms: i64,
) -> CommandResult {
    let amount = int_arg(&args[0])?;
    let ttl_ms = amount
        .checked_mul(unit_ms)
        .filter(|ttl| *ttl > 0)
        .ok_or(CommandError::InvalidExpire(name))?;
    let value = bytes_arg(&args[1])?;
    ctx.db
        .set(key.clone(), Value::BulkString(value), SetMode::Any, ttl_ms);
    Ok(Value::ok())
}

/// SETEX key seconds value
fn setex(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    set_with_ttl(ctx, "setex", key, args, 1000)
}

/// PSETEX key milliseconds value
fn psetex(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    set_with_ttl(ctx, "psetex", key, args, 1)
}

#[cfg(test)]
mod tests {
    use crate::commands::handler::test_support::*;
    use crate::commands::handler::CommandError;
    use crate::protocol::Value;

    #[test]
    fn test_set_get_append() {
        let fx = Fixture::new();
        assert_eq!(fx.run(&["SET", "a", "1"]), Value::ok());
        assert_eq!(fx.run(&["GET", "a"]), bulk("1"));
        assert_eq!(fx.run(&["APPEND", "a", "2"]), Value::Integer(2));
        assert_eq!(fx.run(&["GET", "a"]), bulk("12"));
        assert_eq!(fx.run(&["STRLEN", "a"]), Value::Integer(2));
    }

    #[test]
    fn test_get_nonexistent() {
        let fx = Fixture::new();
        assert_eq!(fx.run(&["GET", "nonexistent"]), Value::Null);
        assert_eq!(fx.run(&["STRLEN", "nonexistent"]), Value::Integer(0));
    }

    #[test]
    fn test_append_creates_key() {
        let fx = Fixture::new();
        assert_eq!(fx.run(&["APPEND", "k", "hello"]), Value::Integer(5));
        assert_eq!(fx.run(&["GET", "k"]), bulk("hello"));
    }

    #[test]
    fn test_set_with_options() {
        let fx = Fixture::new();

        assert_eq!(fx.run(&["SET", "k", "v", "NX"]), Value::ok());
        assert_eq!(fx.run(&["SET", "k", "v2", "NX"]), Value::Null);
        assert_eq!(fx.run(&["GET", "k"]), bulk("v"));

        assert_eq!(fx.run(&["SET", "k", "v3", "XX"]), Value::ok());
        assert_eq!(fx.run(&["SET", "other", "v", "XX"]), Value::Null);
        assert_eq!(fx.run(&["GET", "other"]), Value::Null);

        assert_eq!(fx.run(&["SET", "t", "v", "EX", "100"]), Value::ok());
        let ttl = fx.run(&["TTL", "t"]).as_integer().unwrap();
        assert!(ttl > 90 && ttl <= 100);

        assert_eq!(fx.run(&["SET", "p", "v", "px", "5000", "nx"]), Value::ok());
        let pttl = fx.run(&["PTTL", "p"]).as_integer().unwrap();
        assert!(pttl > 4000 && pttl <= 5000);
    }

    #[test]
    fn test_set_option_errors() {
        let fx = Fixture::new();
        let syntax = err(CommandError::Syntax);
        assert_eq!(fx.run(&["SET", "k", "v", "EX"]), syntax);
        assert_eq!(fx.run(&["SET", "k", "v", "EX", "0"]), syntax);
        assert_eq!(fx.run(&["SET", "k", "v", "EX", "-5"]), syntax);
        assert_eq!(fx.run(&["SET", "k", "v", "EX", "ten"]), syntax);
        assert_eq!(fx.run(&["SET", "k", "v", "EX", "1", "PX", "1"]), syntax);
        assert_eq!(fx.run(&["SET", "k", "v", "NX", "XX"]), syntax);
        assert_eq!(fx.run(&["SET", "k", "v", "NX", "NX"]), syntax);
        assert_eq!(fx.run(&["SET", "k", "v", "KEEPTTL"]), syntax);
        assert_eq!(fx.run(&["GET", "k"]), Value::Null);
    }

    #[test]
    fn test_set_overwrites_other_types() {
        let fx = Fixture::new();
        fx.run(&["LPUSH", "l", "a"]);
        assert_eq!(fx.run(&["SET", "l", "v"]), Value::ok());
        assert_eq!(fx.run(&["TYPE", "l"]), Value::simple_string("string"));
    }

    #[test]
    fn test_incr_decr() {
        let fx = Fixture::new();
        assert_eq!(fx.run(&["INCR", "counter"]), Value::Integer(1));
        assert_eq!(fx.run(&["INCR", "counter"]), Value::Integer(2));
        assert_eq!(fx.run(&["INCRBY", "counter", "10"]), Value::Integer(12));
        assert_eq!(fx.run(&["DECR", "counter"]), Value::Integer(11));
        assert_eq!(fx.run(&["DECRBY", "counter", "20"]), Value::Integer(-9));
        assert_eq!(fx.run(&["GET", "counter"]), bulk("-9"));
    }

    #[test]
    fn test_incr_errors_leave_value_unchanged() {
        let fx = Fixture::new();
        fx.run(&["SET", "text", "abc"]);
        assert_eq!(fx.run(&["INCR", "text"]), err(CommandError::NotInteger));
        assert_eq!(fx.run(&["GET", "text"]), bulk("abc"));

        fx.run(&["SET", "big", &i64::MAX.to_string()]);
        assert_eq!(fx.run(&["INCR", "big"]), err(CommandError::Overflow));
        assert_eq!(fx.run(&["GET", "big"]), bulk(&i64::MAX.to_string()));

        assert_eq!(
            fx.run(&["INCRBY", "n", "x"]),
            err(CommandError::NotInteger)
        );
        assert_eq!(fx.run(&["GET", "n"]), Value::Null);
    }

    #[test]
    fn test_concurrent_incr() {
        let fx = Fixture::new();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        fx.run(&["INCR", "hits"]);
                    }
                });
            }
        });
        assert_eq!(fx.run(&["GET", "hits"]), bulk("800"));
    }

    #[test]
    fn test_wrong_type_leaves_value_unchanged() {
        let fx = Fixture::new();
        fx.run(&["RPUSH", "l", "a", "b"]);
        let wrong = err(CommandError::WrongType);
        assert_eq!(fx.run(&["GET", "l"]), wrong);
        assert_eq!(fx.run(&["APPEND", "l", "x"]), wrong);
        assert_eq!(fx.run(&["INCR", "l"]), wrong);
        assert_eq!(fx.run(&["STRLEN", "l"]), wrong);
        assert_eq!(fx.run(&["GETSET", "l", "x"]), wrong);
        assert_eq!(fx.run(&["LRANGE", "l", "0", "-1"]), bulks(&["a", "b"]));
    }

    #[test]
    fn test_mset_mget() {
        let fx = Fixture::new();
        assert_eq!(fx.run(&["MSET", "a", "1", "b", "2"]), Value::ok());
        fx.run(&["HSET", "h", "f", "v"]);
        assert_eq!(
            fx.run(&["MGET", "a", "b", "missing", "h"]),
            Value::array(vec![bulk("1"), bulk("2"), Value::Null, Value::Null])
        );
        assert_eq!(
            fx.run(&["MSET", "a", "1", "b"]),
            err(CommandError::WrongArity("mset".to_string()))
        );
    }

    #[test]
    fn test_msetnx() {
        let fx = Fixture::new();
        assert_eq!(fx.run(&["MSETNX", "a", "1", "b", "2"]), Value::Integer(1));
        assert_eq!(fx.run(&["MSETNX", "b", "3", "c", "4"]), Value::Integer(0));
        assert_eq!(fx.run(&["GET", "c"]), Value::Null);
        assert_eq!(fx.run(&["GET", "b"]), bulk("2"));
    }

    #[test]
    fn test_concurrent_msetnx_writes_one_side() {
        let fx = Fixture::new();
        std::thread::scope(|scope| {
            let left = scope.spawn(|| fx.run(&["MSETNX", "x", "left", "y", "left"]));
            let right = scope.spawn(|| fx.run(&["MSETNX", "y", "right", "x", "right"]));
            let wins = [left.join().unwrap(), right.join().unwrap()]
                .iter()
                .filter(|reply| **reply == Value::Integer(1))
                .count();
            assert_eq!(wins, 1);
        });
        assert_eq!(fx.run(&["GET", "x"]), fx.run(&["GET", "y"]));
    }

    #[test]
    fn test_setnx() {
        let fx = Fixture::new();
        assert_eq!(fx.run(&["SETNX", "k", "v"]), Value::Integer(1));
        assert_eq!(fx.run(&["SETNX", "k", "w"]), Value::Integer(0));
        assert_eq!(fx.run(&["GET", "k"]), bulk("v"));
    }

    #[test]
    fn test_setex_psetex() {
        let fx = Fixture::new();
        assert_eq!(fx.run(&["SETEX", "k", "10", "v"]), Value::ok());
        let ttl = fx.run(&["TTL", "k"]).as_integer().unwrap();
        assert!(ttl > 0 && ttl <= 10);

        assert_eq!(fx.run(&["PSETEX", "p", "1500", "v"]), Value::ok());
        assert_eq!(fx.run(&["GET", "p"]), bulk("v"));

        assert_eq!(
            fx.run(&["SETEX", "k", "0", "v"]),
            err(CommandError::InvalidExpire("setex"))
        );
        assert_eq!(
            fx.run(&["PSETEX", "k", "-1", "v"]),
            err(CommandError::InvalidExpire("psetex"))
        );
        assert_eq!(
            fx.run(&["SETEX", "k", "abc", "v"]),
            err(CommandError::NotInteger)
        );
    }

    #[test]
    fn test_getset() {
        let fx = Fixture::new();
        assert_eq!(fx.run(&["GETSET", "k", "v1"]), Value::Null);
        fx.run(&["EXPIRE", "k", "100"]);
        assert_eq!(fx.run(&["GETSET", "k", "v2"]), bulk("v1"));
        assert_eq!(fx.run(&["GET", "k"]), bulk("v2"));
        assert_eq!(fx.run(&["TTL", "k"]), Value::Integer(-1));
    }
}
