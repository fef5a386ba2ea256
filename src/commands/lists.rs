//! List commands.
//!
//! A list is stored as an array of bulk strings. Indexes may be negative and
//! then count from the tail (`-1` is the last element). A list emptied by a
//! pop, trim or removal disappears from the database.

use bytes::Bytes;

use crate::commands::handler::{
    bytes_arg, clamp_range, int_arg, option_arg, resolve_index, CommandContext,
    CommandError, CommandResult, CommandTable,
};
use crate::protocol::Value;
use crate::storage::Element;

pub(crate) fn register(table: &mut CommandTable) {
    table.keyed("lpush", lpush, 2, None);
    table.keyed("rpush", rpush, 2, None);
    table.keyed("lpushx", lpushx, 2, None);
    table.keyed("rpushx", rpushx, 2, None);
    table.keyed("lpop", lpop, 1, Some(1));
    table.keyed("rpop", rpop, 1, Some(1));
    table.keyed("llen", llen, 1, Some(1));
    table.keyed("lindex", lindex, 2, Some(2));
    table.keyed("linsert", linsert, 4, Some(4));
    table.keyed("lrange", lrange, 3, Some(3));
    table.keyed("lset", lset, 3, Some(3));
    table.keyed("ltrim", ltrim, 3, Some(3));
    table.keyed("lrem", lrem, 3, Some(3));
}

/// The list held by `element`, turning a freshly created element into an
/// empty list.
fn list_mut(element: &mut Element) -> Result<&mut Vec<Value>, CommandError> {
    if element.value.is_null() {
        element.value = Value::Array(Vec::new());
    }
    element.value.as_array_mut().ok_or(CommandError::WrongType)
}

fn list_ref(value: &Value) -> Result<&[Value], CommandError> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(CommandError::WrongType),
    }
}

fn values(args: &[Value]) -> Result<Vec<Value>, CommandError> {
    args.iter()
        .map(|arg| bytes_arg(arg).map(Value::BulkString))
        .collect()
}

#[derive(Clone, Copy)]
enum End {
    Head,
    Tail,
}

fn push(
    ctx: &CommandContext<'_>,
    key: &Bytes,
    args: &[Value],
    end: End,
    create: bool,
) -> CommandResult {
    let items = values(args)?;

    let outcome = ctx.db.mutate(key, create, |element| {
        let list = match list_mut(element) {
            Ok(list) => list,
            Err(e) => return (Err(e), false),
        };
        match end {
            End::Head => {
                list.splice(0..0, items.into_iter().rev());
            }
            End::Tail => list.extend(items),
        }
        (Ok(Value::Integer(list.len() as i64)), true)
    });

    outcome.unwrap_or(Ok(Value::Integer(0)))
}

/// LPUSH key element [element ...]
///
/// Elements are pushed one after another, so the last one ends up first.
fn lpush(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    push(ctx, key, args, End::Head, true)
}

/// RPUSH key element [element ...]
fn rpush(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    push(ctx, key, args, End::Tail, true)
}

/// LPUSHX key element [element ...]: 0 when the key does not exist.
fn lpushx(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    push(ctx, key, args, End::Head, false)
}

/// RPUSHX key element [element ...]
fn rpushx(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    push(ctx, key, args, End::Tail, false)
}

fn pop(ctx: &CommandContext<'_>, key: &Bytes, end: End) -> CommandResult {
    ctx.db
        .mutate(key, false, |element| {
            let list = match list_mut(element) {
                Ok(list) => list,
                Err(e) => return (Err(e), false),
            };
            let popped = match end {
                End::Head if !list.is_empty() => Some(list.remove(0)),
                End::Head => None,
                End::Tail => list.pop(),
            };
            (Ok(popped.unwrap_or(Value::Null)), true)
        })
        .unwrap_or(Ok(Value::Null))
}

/// LPOP key
fn lpop(ctx: &CommandContext<'_>, key: &Bytes, _args: &[Value]) -> CommandResult {
    pop(ctx, key, End::Head)
}

/// RPOP key
fn rpop(ctx: &CommandContext<'_>, key: &Bytes, _args: &[Value]) -> CommandResult {
    pop(ctx, key, End::Tail)
}

/// LLEN key
fn llen(ctx: &CommandContext<'_>, key: &Bytes, _args: &[Value]) -> CommandResult {
    ctx.db
        .view(key, |element| {
            list_ref(&element.value).map(|list| Value::Integer(list.len() as i64))
        })
        .unwrap_or(Ok(Value::Integer(0)))
}

/// LINDEX key index
fn lindex(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let index = int_arg(&args[0])?;
    ctx.db
        .view(key, |element| -> CommandResult {
            let list = list_ref(&element.value)?;
            Ok(resolve_index(index, list.len())
                .map(|i| list[i].clone())
                .unwrap_or(Value::Null))
        })
        .unwrap_or(Ok(Value::Null))
}

/// LINSERT key BEFORE|AFTER pivot element
///
/// Replies with the new length, 0 when the pivot is not in the list, and -1
/// when the key does not exist.
fn linsert(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let after = match option_arg(&args[0])?.as_str() {
        "BEFORE" => false,
        "AFTER" => true,
        _ => return Err(CommandError::Syntax),
    };
    let pivot = bytes_arg(&args[1])?;
    let item = Value::BulkString(bytes_arg(&args[2])?);

    ctx.db
        .mutate(key, false, |element| {
            let list = match list_mut(element) {
                Ok(list) => list,
                Err(e) => return (Err(e), false),
            };
            let Some(position) = list
                .iter()
                .position(|v| v.as_bytes() == Some(&pivot[..]))
            else {
                return (Ok(Value::Integer(0)), false);
            };
            list.insert(position + usize::from(after), item);
            (Ok(Value::Integer(list.len() as i64)), true)
        })
        .unwrap_or(Ok(Value::Integer(-1)))
}

/// LRANGE key start stop
fn lrange(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let start = int_arg(&args[0])?;
    let stop = int_arg(&args[1])?;

    ctx.db
        .view(key, |element| -> CommandResult {
            let list = list_ref(&element.value)?;
            Ok(Value::Array(match clamp_range(start, stop, list.len()) {
                Some((from, to)) => list[from..=to].to_vec(),
                None => Vec::new(),
            }))
        })
        .unwrap_or(Ok(Value::Array(Vec::new())))
}

/// LSET key index element
fn lset(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let index = int_arg(&args[0])?;
    let item = Value::BulkString(bytes_arg(&args[1])?);

    ctx.db
        .mutate(key, false, |element| {
            let list = match list_mut(element) {
                Ok(list) => list,
                Err(e) => return (Err(e), false),
            };
            match resolve_index(index, list.len()) {
                Some(i) => {
                    list[i] = item;
                    (Ok(Value::ok()), true)
                }
                None => (Err(CommandError::IndexOutOfRange), false),
            }
        })
        .unwrap_or(Err(CommandError::NoSuchKey))
}

/// LTRIM key start stop
///
/// Keeps only the elements inside `[start, stop]`; an empty range removes
/// the key.
fn ltrim(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let start = int_arg(&args[0])?;
    let stop = int_arg(&args[1])?;

    ctx.db
        .mutate(key, false, |element| {
            let list = match list_mut(element) {
                Ok(list) => list,
                Err(e) => return (Err(e), false),
            };
            match clamp_range(start, stop, list.len()) {
                Some((from, to)) => {
                    list.truncate(to + 1);
                    list.drain(..from);
                }
                None => list.clear(),
            }
            (Ok(Value::ok()), true)
        })
        .unwrap_or(Ok(Value::ok()))
}

/// LREM key count element
///
/// Removes up to `count` matches from the head (count > 0), from the tail
/// (count < 0) or every match (count = 0).
fn lrem(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let count = int_arg(&args[0])?;
    let target = bytes_arg(&args[1])?;
    let limit = if count == 0 {
        usize::MAX
    } else {
        usize::try_from(count.unsigned_abs()).unwrap_or(usize::MAX)
    };

    ctx.db
        .mutate(key, false, |element| {
            let list = match list_mut(element) {
                Ok(list) => list,
                Err(e) => return (Err(e), false),
            };

            let mut removed = 0usize;
            let mut keep = |v: &Value| {
                if removed < limit && v.as_bytes() == Some(&target[..]) {
                    removed += 1;
                    false
                } else {
                    true
                }
            };

            if count < 0 {
                let mut kept: Vec<Value> = list.drain(..).rev().filter(|v| keep(v)).collect();
                kept.reverse();
                *list = kept;
            } else {
                list.retain(|v| keep(v));
            }

            (Ok(Value::Integer(removed as i64)), true)
        })
        .unwrap_or(Ok(Value::Integer(0)))
}

#[cfg(test)]
mod tests {
    use crate::commands::handler::test_support::*;
    use crate::commands::handler::CommandError;
    use crate::protocol::Value;

    #[test]
    fn test_push_and_range() {
        let fx = Fixture::new();
        assert_eq!(fx.run(&["LPUSH", "L", "a", "b", "c"]), Value::Integer(3));
        assert_eq!(fx.run(&["LRANGE", "L", "0", "-1"]), bulks(&["c", "b", "a"]));
        assert_eq!(fx.run(&["RPUSH", "L", "d", "e"]), Value::Integer(5));
        assert_eq!(
            fx.run(&["LRANGE", "L", "0", "-1"]),
            bulks(&["c", "b", "a", "d", "e"])
        );
        assert_eq!(fx.run(&["LRANGE", "L", "1", "2"]), bulks(&["b", "a"]));
        assert_eq!(fx.run(&["LRANGE", "L", "-2", "100"]), bulks(&["d", "e"]));
        assert_eq!(fx.run(&["LRANGE", "L", "3", "1"]), bulks(&[]));
        assert_eq!(fx.run(&["LRANGE", "missing", "0", "-1"]), bulks(&[]));
    }

    #[test]
    fn test_pushx_requires_existing_key() {
        let fx = Fixture::new();
        assert_eq!(fx.run(&["LPUSHX", "L", "a"]), Value::Integer(0));
        assert_eq!(fx.run(&["RPUSHX", "L", "a"]), Value::Integer(0));
        assert_eq!(fx.run(&["EXISTS", "L"]), Value::Integer(0));

        fx.run(&["RPUSH", "L", "a"]);
        assert_eq!(fx.run(&["LPUSHX", "L", "b"]), Value::Integer(2));
        assert_eq!(fx.run(&["RPUSHX", "L", "c"]), Value::Integer(3));
        assert_eq!(fx.run(&["LRANGE", "L", "0", "-1"]), bulks(&["b", "a", "c"]));
    }

    #[test]
    fn test_pop_removes_empty_list() {
        let fx = Fixture::new();
        fx.run(&["RPUSH", "L", "a", "b"]);
        assert_eq!(fx.run(&["LPOP", "L"]), bulk("a"));
        assert_eq!(fx.run(&["RPOP", "L"]), bulk("b"));
        assert_eq!(fx.run(&["LPOP", "L"]), Value::Null);
        assert_eq!(fx.run(&["EXISTS", "L"]), Value::Integer(0));
        assert_eq!(fx.run(&["TYPE", "L"]), Value::simple_string("none"));
    }

    #[test]
    fn test_llen_lindex() {
        let fx = Fixture::new();
        fx.run(&["RPUSH", "L", "a", "b", "c"]);
        assert_eq!(fx.run(&["LLEN", "L"]), Value::Integer(3));
        assert_eq!(fx.run(&["LLEN", "missing"]), Value::Integer(0));
        assert_eq!(fx.run(&["LINDEX", "L", "0"]), bulk("a"));
        assert_eq!(fx.run(&["LINDEX", "L", "-1"]), bulk("c"));
        assert_eq!(fx.run(&["LINDEX", "L", "3"]), Value::Null);
        assert_eq!(fx.run(&["LINDEX", "missing", "0"]), Value::Null);
        assert_eq!(fx.run(&["LINDEX", "L", "x"]), err(CommandError::NotInteger));
    }

    #[test]
    fn test_linsert() {
        let fx = Fixture::new();
        assert_eq!(fx.run(&["LINSERT", "L", "BEFORE", "a", "x"]), Value::Integer(-1));

        fx.run(&["RPUSH", "L", "a", "c"]);
        assert_eq!(fx.run(&["LINSERT", "L", "AFTER", "a", "b"]), Value::Integer(3));
        assert_eq!(fx.run(&["LINSERT", "L", "before", "a", "0"]), Value::Integer(4));
        assert_eq!(
            fx.run(&["LRANGE", "L", "0", "-1"]),
            bulks(&["0", "a", "b", "c"])
        );
        assert_eq!(fx.run(&["LINSERT", "L", "AFTER", "zz", "x"]), Value::Integer(0));
        assert_eq!(
            fx.run(&["LINSERT", "L", "AROUND", "a", "x"]),
            err(CommandError::Syntax)
        );
    }

    #[test]
    fn test_lset() {
        let fx = Fixture::new();
        fx.run(&["RPUSH", "L", "a", "b"]);
        assert_eq!(fx.run(&["LSET", "L", "-1", "z"]), Value::ok());
        assert_eq!(fx.run(&["LRANGE", "L", "0", "-1"]), bulks(&["a", "z"]));
        assert_eq!(
            fx.run(&["LSET", "L", "5", "z"]),
            err(CommandError::IndexOutOfRange)
        );
        assert_eq!(
            fx.run(&["LSET", "missing", "0", "z"]),
            err(CommandError::NoSuchKey)
        );
    }

    #[test]
    fn test_ltrim() {
        let fx = Fixture::new();
        fx.run(&["RPUSH", "L", "a", "b", "c", "d", "e"]);
        assert_eq!(fx.run(&["LTRIM", "L", "1", "-2"]), Value::ok());
        assert_eq!(fx.run(&["LRANGE", "L", "0", "-1"]), bulks(&["b", "c", "d"]));
        assert_eq!(fx.run(&["LTRIM", "L", "5", "10"]), Value::ok());
        assert_eq!(fx.run(&["EXISTS", "L"]), Value::Integer(0));
        assert_eq!(fx.run(&["LTRIM", "missing", "0", "1"]), Value::ok());
    }

    #[test]
    fn test_lrem() {
        let fx = Fixture::new();
        fx.run(&["RPUSH", "L", "x", "a", "x", "b", "x"]);
        assert_eq!(fx.run(&["LREM", "L", "1", "x"]), Value::Integer(1));
        assert_eq!(
            fx.run(&["LRANGE", "L", "0", "-1"]),
            bulks(&["a", "x", "b", "x"])
        );
        assert_eq!(fx.run(&["LREM", "L", "-1", "x"]), Value::Integer(1));
        assert_eq!(fx.run(&["LRANGE", "L", "0", "-1"]), bulks(&["a", "x", "b"]));

        fx.run(&["RPUSH", "L", "x"]);
        assert_eq!(fx.run(&["LREM", "L", "0", "x"]), Value::Integer(2));
        assert_eq!(fx.run(&["LRANGE", "L", "0", "-1"]), bulks(&["a", "b"]));
        assert_eq!(fx.run(&["LREM", "missing", "0", "x"]), Value::Integer(0));
    }

    #[test]
    fn test_wrong_type() {
        let fx = Fixture::new();
        fx.run(&["SET", "s", "v"]);
        let wrong = err(CommandError::WrongType);
        assert_eq!(fx.run(&["LPUSH", "s", "a"]), wrong);
        assert_eq!(fx.run(&["LPOP", "s"]), wrong);
        assert_eq!(fx.run(&["LRANGE", "s", "0", "-1"]), wrong);
        assert_eq!(fx.run(&["LLEN", "s"]), wrong);
        assert_eq!(fx.run(&["GET", "s"]), bulk("v"));
    }
}
