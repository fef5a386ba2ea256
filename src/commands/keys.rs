//! Generic key commands.
//!
//! Lifetime (`EXPIRE`, `PEXPIRE`, `EXPIREAT`, `PEXPIREAT`, `TTL`, `PTTL`,
//! `PERSIST`), naming (`RENAME`, `RENAMENX`, `MOVE`), inspection (`EXISTS`,
//! `TYPE`, `KEYS`, `DBSIZE`) and removal (`DEL`, `FLUSHDB`, `FLUSHALL`).

use bytes::Bytes;

use crate::commands::handler::{
    bytes_arg, int_arg, CommandContext, CommandError, CommandResult, CommandTable,
};
use crate::protocol::Value;
use crate::storage::RenameOutcome;

pub(crate) fn register(table: &mut CommandTable) {
    table.keyed("del", del, 1, None);
    table.keyed("exists", exists, 1, None);
    table.keyed("expire", expire, 2, Some(2));
    table.keyed("pexpire", pexpire, 2, Some(2));
    table.keyed("expireat", expireat, 2, Some(2));
    table.keyed("pexpireat", pexpireat, 2, Some(2));
    table.keyed("ttl", ttl, 1, Some(1));
    table.keyed("pttl", pttl, 1, Some(1));
    table.keyed("persist", persist, 1, Some(1));
    table.keyed("rename", rename, 2, Some(2));
    table.keyed("renamenx", renamenx, 2, Some(2));
    table.keyed("move", move_key, 2, Some(2));
    table.keyed("type", key_type, 1, Some(1));
    table.keyless("keys", keys, 1, Some(1));
    table.keyless("dbsize", dbsize, 0, Some(0));
    table.keyless("flushdb", flushdb, 0, Some(0));
    table.keyless("flushall", flushall, 0, Some(0));
}

/// Applies `f` to the key and every further key argument, counting hits.
fn count_keys(
    key: &Bytes,
    args: &[Value],
    mut f: impl FnMut(&[u8]) -> bool,
) -> CommandResult {
    let mut hits = i64::from(f(&key[..]));
    for arg in args {
        hits += i64::from(f(&bytes_arg(arg)?[..]));
    }
    Ok(Value::Integer(hits))
}

/// DEL key [key ...]
fn del(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    count_keys(key, args, |k| ctx.db.delete(k))
}

/// EXISTS key [key ...]
fn exists(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    count_keys(key, args, |k| ctx.db.exists(k))
}

fn set_ttl(ctx: &CommandContext<'_>, key: &Bytes, millis: i64) -> CommandResult {
    Ok(Value::Integer(i64::from(ctx.db.set_ttl(key, millis))))
}

/// EXPIRE key seconds
///
/// A negative lifetime deletes the key.
fn expire(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let seconds = int_arg(&args[0])?;
    set_ttl(ctx, key, seconds.saturating_mul(1000))
}

/// PEXPIRE key milliseconds
fn pexpire(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    set_ttl(ctx, key, int_arg(&args[0])?)
}

/// EXPIREAT key timestamp
///
/// The timestamp is applied as a lifetime relative to now, the same way
/// EXPIRE applies its argument. Clients relying on absolute deadlines will
/// see keys living far longer than intended.
fn expireat(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let timestamp = int_arg(&args[0])?;
    set_ttl(ctx, key, timestamp.saturating_mul(1000))
}

/// PEXPIREAT key timestamp-ms
///
/// Relative like [`expireat`].
fn pexpireat(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    set_ttl(ctx, key, int_arg(&args[0])?)
}

/// TTL key: -2 if missing, -1 without deadline, else whole seconds left.
fn ttl(ctx: &CommandContext<'_>, key: &Bytes, _args: &[Value]) -> CommandResult {
    Ok(Value::Integer(match ctx.db.get_ttl(key) {
        None => -2,
        Some(-1) => -1,
        Some(millis) => millis / 1000,
    }))
}

/// PTTL key
fn pttl(ctx: &CommandContext<'_>, key: &Bytes, _args: &[Value]) -> CommandResult {
    Ok(Value::Integer(ctx.db.get_ttl(key).unwrap_or(-2)))
}

/// PERSIST key
fn persist(ctx: &CommandContext<'_>, key: &Bytes, _args: &[Value]) -> CommandResult {
    Ok(Value::Integer(i64::from(ctx.db.persist(key))))
}

/// RENAME key newkey
fn rename(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let target = bytes_arg(&args[0])?;
    match ctx.db.rename(key, &target, true) {
        Some(_) => Ok(Value::ok()),
        None => Err(CommandError::NoSuchKey),
    }
}

/// RENAMENX key newkey
fn renamenx(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let target = bytes_arg(&args[0])?;
    match ctx.db.rename(key, &target, false) {
        Some(RenameOutcome::TargetExists) => Ok(Value::Integer(0)),
        Some(_) => Ok(Value::Integer(1)),
        None => Err(CommandError::NoSuchKey),
    }
}

/// MOVE key db
fn move_key(ctx: &CommandContext<'_>, key: &Bytes, args: &[Value]) -> CommandResult {
    let index = int_arg(&args[0])?;
    let target = ctx
        .databases
        .get_or_create(index)
        .ok_or(CommandError::InvalidDbIndex)?;
    if index == ctx.db.index() {
        return Err(CommandError::SameObject);
    }

    Ok(Value::Integer(i64::from(ctx.db.move_to(key, &target))))
}

/// TYPE key
fn key_type(ctx: &CommandContext<'_>, key: &Bytes, _args: &[Value]) -> CommandResult {
    let name = ctx
        .db
        .view(key, |element| element.value.type_name())
        .unwrap_or("none");
    Ok(Value::simple_string(name))
}

/// KEYS pattern
fn keys(ctx: &CommandContext<'_>, args: &[Value]) -> CommandResult {
    let pattern = bytes_arg(&args[0])?;
    let keys = ctx.db.keys(&pattern)?;
    Ok(Value::Array(keys.into_iter().map(Value::BulkString).collect()))
}

/// DBSIZE
fn dbsize(ctx: &CommandContext<'_>, _args: &[Value]) -> CommandResult {
    Ok(Value::Integer(ctx.db.count() as i64))
}

/// FLUSHDB
fn flushdb(ctx: &CommandContext<'_>, _args: &[Value]) -> CommandResult {
    ctx.db.flush();
    Ok(Value::ok())
}

/// FLUSHALL
///
/// Every other database's gate is held, in index order, while the flush
/// runs, so a transaction on another database sees all of it or none. The
/// session's own gate is already held by the caller.
fn flushall(ctx: &CommandContext<'_>, _args: &[Value]) -> CommandResult {
    let databases = ctx.databases.all();
    let _gates: Vec<_> = databases
        .iter()
        .filter(|db| db.index() != ctx.db.index())
        .map(|db| db.shared_recursive())
        .collect();

    for db in &databases {
        db.flush();
    }
    Ok(Value::ok())
}
