//! Hash commands.
//!
//! A hash is a [`Dictionary`] of field names to bulk strings. Field order in
//! HKEYS, HVALS and HGETALL is by field bytes.

use bytes::Bytes;

use crate::commands::handler::{
    bytes_arg, int_arg, parse_int, upsert, CommandContext, CommandError, CommandResult,
    CommandTable,
};
use crate::protocol::{Dictionary, Value};
use crate::storage::Element;

pub(crate) fn register(table: &mut CommandTable) {
    table.keyed("hset", hset, 3, None);
    table.keyed("hsetnx", hsetnx, 3, Some(3));
    table.keyed("hget", hget, 2, Some(2));
    table.keyed("hdel", hdel, 2, None);
    table.keyed("hexists", hexists, 2, Some(2));
    table.keyed("hlen", hlen, 1, Some(1));
    table.keyed("hstrlen", hstrlen, 2, Some(2));
    table.keyed("hkeys", hkeys, 1, Some(1));
    table.keyed("hvals", hvals, 1, Some(1));
    table.keyed("hgetall", hgetall, 1, Some(1));
    table.keyed("hincrby", hincrby, 3, Some(3));
    table.keyed("hmget", hmget, 2, None);
    table.keyed("hmset", hmset, 3, None);
}

fn hash_mut(element: &mut Element) -> Result<&mut Dictionary, CommandError> {
    if element.value.is_null() {
        element.value = Value::Dictionary(Dictionary::new());
    }
    element.value.as_dictionary_mut().ok_or(CommandError::WrongType)
}

fn hash_ref(value: &Value) -> Result<&Dictionary, CommandError> {
    value.as_dictionary().ok_or(CommandError::WrongType)
}

/// Reads from the hash under `key`, or returns `missing` if there is none.
fn read_hash(
    ctx: &CommandContext<'_>,
    key: &[u8],
    missing: Value,
    f: impl FnOnce(&Dictionary) -> Value,
) -> CommandResult {
    ctx.db
        .view(key, |element| hash_ref(&element.value).map(f))
        .unwrap_or(Ok(missing))
}

fn field_pairs(name: &str, args: &[Value]) -> Result<Vec<(Bytes, Bytes)>, CommandError> {
    if args.len() % 2 != 0 {
        return Err(CommandError::WrongArity(name.to_string()));
    }
    args.chunks_exact(2)
        .map(|pair| -> Result<_, CommandError> {
            Ok((bytes_arg(&pair[0])?, bytes_arg(&pair[1])?))
        })
        .collect()
}

/// HSET key field value [field value ...]
///
/// Replies with the number of fields that did not exist before.
fn hset(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let pairs = field_pairs("hset", args)?;

    upsert(ctx.db, key, |element| {
        let hash = match hash_mut(element) {
            Ok(hash) => hash,
            Err(e) => return (Err(e), false),
        };
        let mut added = 0;
        for (field, value) in pairs {
            if hash.insert(field, Value::BulkString(value)).is_none() {
                added += 1;
            }
        }
        (Ok(Value::Integer(added)), true)
    })
}

/// HMSET key field value [field value ...]
fn hmset(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let pairs = field_pairs("hmset", args)?;

    upsert(ctx.db, key, |element| {
        let hash = match hash_mut(element) {
            Ok(hash) => hash,
            Err(e) => return (Err(e), false),
        };
        for (field, value) in pairs {
            hash.insert(field, Value::BulkString(value));
        }
        (Ok(Value::ok()), true)
    })
}

/// HSETNX key field value
fn hsetnx(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let field = bytes_arg(&args[0])?;
    let value = bytes_arg(&args[1])?;

    upsert(ctx.db, key, |element| {
        let hash = match hash_mut(element) {
            Ok(hash) => hash,
            Err(e) => return (Err(e), false),
        };
        if hash.contains_key(&field) {
            return (Ok(Value::Integer(0)), false);
        }
        hash.insert(field, Value::BulkString(value));
        (Ok(Value::Integer(1)), true)
    })
}

/// HGET key field
fn hget(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let field = bytes_arg(&args[0])?;
    read_hash(ctx, key, Value::Null, |hash| {
        hash.get(&field).cloned().unwrap_or(Value::Null)
    })
}

/// HDEL key field [field ...]
fn hdel(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let fields = args.iter().map(bytes_arg).collect::<Result<Vec<_>, _>>()?;

    ctx.db
        .mutate(key, false, |element| {
            let hash = match hash_mut(element) {
                Ok(hash) => hash,
                Err(e) => return (Err(e), false),
            };
            let mut removed = 0;
            for field in &fields {
                if hash.remove(field).is_some() {
                    removed += 1;
                }
            }
            (Ok(Value::Integer(removed)), true)
        })
        .unwrap_or(Ok(Value::Integer(0)))
}

/// HEXISTS key field
fn hexists(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let field = bytes_arg(&args[0])?;
    read_hash(ctx, key, Value::Integer(0), |hash| {
        Value::Integer(i64::from(hash.contains_key(&field)))
    })
}

/// HLEN key
fn hlen(ctx: &CommandContext<'_>, key: &Bytes, _args: &[Value]) -> CommandResult {
    read_hash(ctx, key, Value::Integer(0), |hash| {
        Value::Integer(hash.len() as i64)
    })
}

/// HSTRLEN key field
fn hstrlen(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let field = bytes_arg(&args[0])?;
    read_hash(ctx, key, Value::Integer(0), |hash| {
        let len = hash
            .get(&field)
            .and_then(Value::as_bytes)
            .map_or(0, <[u8]>::len);
        Value::Integer(len as i64)
    })
}

/// HKEYS key
fn hkeys(ctx: &CommandContext<'_>, key: &Bytes, _args: &[Value]) -> CommandResult {
    read_hash(ctx, key, Value::Array(Vec::new()), |hash| {
        Value::Array(hash.keys().cloned().map(Value::BulkString).collect())
    })
}

/// HVALS key
fn hvals(ctx: &CommandContext<'_>, key: &Bytes, _args: &[Value]) -> CommandResult {
    read_hash(ctx, key, Value::Array(Vec::new()), |hash| {
        Value::Array(hash.values().cloned().collect())
    })
}

/// HGETALL key: fields and values interleaved.
fn hgetall(ctx: &CommandContext<'_>, key: &Bytes, _args: &[Value]) -> CommandResult {
    read_hash(ctx, key, Value::Array(Vec::new()), |hash| {
        let mut flat = Vec::with_capacity(hash.len() * 2);
        for (field, value) in hash {
            flat.push(Value::BulkString(field.clone()));
            flat.push(value.clone());
        }
        Value::Array(flat)
    })
}

/// HINCRBY key field increment
fn hincrby(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let field = bytes_arg(&args[0])?;
    let delta = int_arg(&args[1])?;

    upsert(ctx.db, key, |element| {
        let hash = match hash_mut(element) {
            Ok(hash) => hash,
            Err(e) => return (Err(e), false),
        };
        let current = match hash.get(&field) {
            None => 0,
            Some(value) => match value.as_bytes().and_then(parse_int) {
                Some(n) => n,
                None => return (Err(CommandError::NotInteger), false),
            },
        };
        match current.checked_add(delta) {
            Some(next) => {
                hash.insert(field, Value::BulkString(Bytes::from(next.to_string())));
                (Ok(Value::Integer(next)), true)
            }
            None => (Err(CommandError::Overflow), false),
        }
    })
}

/// HMGET key field [field ...]
fn hmget(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let fields = args.iter().map(bytes_arg).collect::<Result<Vec<_>, _>>()?;
    let lookup = |hash: Option<&Dictionary>| {
        Value::Array(
            fields
                .iter()
                .map(|field| {
                    hash.and_then(|h| h.get(field))
                        .cloned()
                        .unwrap_or(Value::Null)
                })
                .collect(),
        )
    };

    match ctx.db.view(key, |element| hash_ref(&element.value).map(|h| lookup(Some(h)))) {
        Some(reply) => reply,
        None => Ok(lookup(None)),
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::handler::test_support::*;
    use crate::commands::handler::CommandError;
    use crate::protocol::Value;

    #[test]
    fn test_hset_hget() {
        let fx = Fixture::new();
        assert_eq!(fx.run(&["HSET", "h", "f", "v"]), Value::Integer(1));
        assert_eq!(fx.run(&["HSET", "h", "f", "v2"]), Value::Integer(0));
        assert_eq!(fx.run(&["HGET", "h", "f"]), bulk("v2"));
        assert_eq!(fx.run(&["HGET", "h", "nope"]), Value::Null);
        assert_eq!(fx.run(&["HGET", "missing", "f"]), Value::Null);
    }

    #[test]
    fn test_hset_multiple_pairs() {
        let fx = Fixture::new();
        assert_eq!(
            fx.run(&["HSET", "h", "a", "1", "b", "2", "a", "3"]),
            Value::Integer(2)
        );
        assert_eq!(fx.run(&["HGET", "h", "a"]), bulk("3"));
        assert_eq!(
            fx.run(&["HSET", "h", "a", "1", "b"]),
            err(CommandError::WrongArity("hset".to_string()))
        );
    }

    #[test]
    fn test_hsetnx() {
        let fx = Fixture::new();
        assert_eq!(fx.run(&["HSETNX", "h", "f", "v"]), Value::Integer(1));
        assert_eq!(fx.run(&["HSETNX", "h", "f", "w"]), Value::Integer(0));
        assert_eq!(fx.run(&["HGET", "h", "f"]), bulk("v"));
    }

    #[test]
    fn test_hdel_removes_empty_hash() {
        let fx = Fixture::new();
        fx.run(&["HSET", "h", "a", "1", "b", "2"]);
        assert_eq!(fx.run(&["HDEL", "h", "a", "zz"]), Value::Integer(1));
        assert_eq!(fx.run(&["HLEN", "h"]), Value::Integer(1));
        assert_eq!(fx.run(&["HDEL", "h", "b"]), Value::Integer(1));
        assert_eq!(fx.run(&["EXISTS", "h"]), Value::Integer(0));
        assert_eq!(fx.run(&["HDEL", "h", "b"]), Value::Integer(0));
    }

    #[test]
    fn test_hexists_hlen_hstrlen() {
        let fx = Fixture::new();
        fx.run(&["HSET", "h", "f", "hello"]);
        assert_eq!(fx.run(&["HEXISTS", "h", "f"]), Value::Integer(1));
        assert_eq!(fx.run(&["HEXISTS", "h", "g"]), Value::Integer(0));
        assert_eq!(fx.run(&["HLEN", "h"]), Value::Integer(1));
        assert_eq!(fx.run(&["HLEN", "missing"]), Value::Integer(0));
        assert_eq!(fx.run(&["HSTRLEN", "h", "f"]), Value::Integer(5));
        assert_eq!(fx.run(&["HSTRLEN", "h", "g"]), Value::Integer(0));
    }

    #[test]
    fn test_hkeys_hvals_hgetall() {
        let fx = Fixture::new();
        fx.run(&["HMSET", "h", "b", "2", "a", "1"]);
        assert_eq!(fx.run(&["HKEYS", "h"]), bulks(&["a", "b"]));
        assert_eq!(fx.run(&["HVALS", "h"]), bulks(&["1", "2"]));
        assert_eq!(fx.run(&["HGETALL", "h"]), bulks(&["a", "1", "b", "2"]));
        assert_eq!(fx.run(&["HGETALL", "missing"]), bulks(&[]));
    }

    #[test]
    fn test_hincrby() {
        let fx = Fixture::new();
        assert_eq!(fx.run(&["HINCRBY", "h", "n", "5"]), Value::Integer(5));
        assert_eq!(fx.run(&["HINCRBY", "h", "n", "-7"]), Value::Integer(-2));
        assert_eq!(fx.run(&["HGET", "h", "n"]), bulk("-2"));

        fx.run(&["HSET", "h", "s", "abc"]);
        assert_eq!(
            fx.run(&["HINCRBY", "h", "s", "1"]),
            err(CommandError::NotInteger)
        );
        assert_eq!(fx.run(&["HGET", "h", "s"]), bulk("abc"));
        assert_eq!(
            fx.run(&["HINCRBY", "h", "n", "x"]),
            err(CommandError::NotInteger)
        );
    }

    #[test]
    fn test_hmget() {
        let fx = Fixture::new();
        fx.run(&["HSET", "h", "a", "1"]);
        assert_eq!(
            fx.run(&["HMGET", "h", "a", "b"]),
            Value::array(vec![bulk("1"), Value::Null])
        );
        assert_eq!(
            fx.run(&["HMGET", "missing", "a", "b"]),
            Value::array(vec![Value::Null, Value::Null])
        );
    }

    #[test]
    fn test_wrong_type() {
        let fx = Fixture::new();
        fx.run(&["SET", "s", "v"]);
        let wrong = err(CommandError::WrongType);
        assert_eq!(fx.run(&["HSET", "s", "f", "v"]), wrong);
        assert_eq!(fx.run(&["HGET", "s", "f"]), wrong);
        assert_eq!(fx.run(&["HGETALL", "s"]), wrong);
        assert_eq!(fx.run(&["HINCRBY", "s", "f", "1"]), wrong);
        assert_eq!(fx.run(&["GET", "s"]), bulk("v"));
    }
}
