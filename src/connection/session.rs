//! Per-connection session state.
//!
//! A session tracks the selected database, whether the client has
//! authenticated, and the MULTI queue. It turns one decoded request into one
//! reply; the connection handler owns the socket.
//!
//! ## States
//!
//! ```text
//!            MULTI                 data command
//!   ┌──────┐ ─────────> ┌────────┐ ──────────> QUEUED
//!   │ Idle │            │Queuing │
//!   └──────┘ <───────── └────────┘
//!            EXEC / DISCARD
//! ```
//!
//! AUTH, SELECT, ECHO, PING and QUIT run immediately in either state.
//!
//! ## Locking
//!
//! A data command runs under the selected database's shared gate; EXEC runs
//! its whole queue under the exclusive gate, so no other connection's
//! command on that database interleaves with the batch.

use std::sync::Arc;
use tracing::{debug, trace};

use crate::commands::handler::{bytes_arg, command_name, int_arg};
use crate::commands::{CommandContext, CommandError, CommandResult};
use crate::protocol::Value;
use crate::server::Server;
use crate::storage::Database;

pub struct Session {
    server: Arc<Server>,
    db: Arc<Database>,
    authorized: bool,
    /// `Some` while queuing a transaction
    queue: Option<Vec<Vec<Value>>>,
    closing: bool,
}

impl Session {
    /// Starts a session on database 0. It is authorized up front when the
    /// server has no password.
    pub fn new(server: Arc<Server>) -> Self {
        let db = server.databases().primary();
        let authorized = server.password().is_none();
        Self {
            server,
            db,
            authorized,
            queue: None,
            closing: false,
        }
    }

    /// Index of the selected database.
    pub fn db_index(&self) -> i64 {
        self.db.index()
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized
    }

    pub fn in_transaction(&self) -> bool {
        self.queue.is_some()
    }

    /// Whether QUIT was received; the connection closes after flushing.
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Runs one request and returns its reply.
    pub fn execute(&mut self, request: Value) -> Value {
        let Some(args) = request.into_array() else {
            return CommandError::InvalidCommand.into();
        };
        match self.try_execute(args) {
            Ok(reply) => reply,
            Err(err) => err.into(),
        }
    }

    fn try_execute(&mut self, args: Vec<Value>) -> CommandResult {
        let name = command_name(&args)?;
        trace!(command = %name, db = self.db.index(), "Executing");

        match name.as_str() {
            "auth" => return self.auth(&args[1..]),
            "quit" => {
                self.closing = true;
                return Ok(Value::ok());
            }
            _ => {}
        }

        if !self.authorized {
            return Err(CommandError::NoAuth);
        }

        match name.as_str() {
            "ping" => ping(&args[1..]),
            "echo" => echo(&args[1..]),
            "select" => self.select(&args[1..]),
            "multi" => self.multi(),
            "exec" => self.exec(),
            "discard" => {
                self.queue = None;
                Ok(Value::ok())
            }
            _ => match self.queue.as_mut() {
                Some(queue) => {
                    queue.push(args);
                    Ok(Value::queued())
                }
                None => {
                    let _gate = self.db.shared();
                    Ok(self.dispatch(&args))
                }
            },
        }
    }

    fn dispatch(&self, request: &[Value]) -> Value {
        let ctx = CommandContext {
            db: &self.db,
            databases: self.server.databases(),
        };
        self.server.commands().dispatch(&ctx, request)
    }

    fn auth(&mut self, args: &[Value]) -> CommandResult {
        let [password] = args else {
            return Err(CommandError::WrongArity("auth".to_string()));
        };
        let Some(expected) = self.server.password() else {
            return Err(CommandError::NoPasswordSet);
        };

        if bytes_arg(password)?[..] == *expected.as_bytes() {
            self.authorized = true;
            Ok(Value::ok())
        } else {
            debug!("Rejected AUTH attempt");
            Err(CommandError::InvalidPassword)
        }
    }

    fn select(&mut self, args: &[Value]) -> CommandResult {
        let [index] = args else {
            return Err(CommandError::WrongArity("select".to_string()));
        };
        let index = int_arg(index)?;
        self.db = self
            .server
            .databases()
            .get_or_create(index)
            .ok_or(CommandError::InvalidDbIndex)?;
        Ok(Value::ok())
    }

    fn multi(&mut self) -> CommandResult {
        if self.queue.is_some() {
            return Err(CommandError::NestedMulti);
        }
        self.queue = Some(Vec::new());
        Ok(Value::ok())
    }

    fn exec(&mut self) -> CommandResult {
        let queue = self.queue.take().ok_or(CommandError::ExecWithoutMulti)?;

        let _gate = self.db.exclusive();
        let replies = queue.iter().map(|request| self.dispatch(request)).collect();
        debug!(db = self.db.index(), commands = queue.len(), "Transaction executed");
        Ok(Value::Array(replies))
    }
}

/// PING [message]
fn ping(args: &[Value]) -> CommandResult {
    match args {
        [] => Ok(Value::pong()),
        [Value::Integer(n)] => Ok(Value::Integer(*n)),
        [message] => Ok(Value::BulkString(bytes_arg(message)?)),
        _ => Err(CommandError::WrongArity("ping".to_string())),
    }
}

/// ECHO message
fn echo(args: &[Value]) -> CommandResult {
    match args {
        [message] => Ok(Value::BulkString(bytes_arg(message)?)),
        _ => Err(CommandError::WrongArity("echo".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::handler::test_support::{bulk, bulks, err, make_command};
    use crate::config::Config;

    fn session_with(config: Config) -> Session {
        Session::new(Arc::new(Server::new(config)))
    }

    fn session() -> Session {
        session_with(Config::default())
    }

    fn run(session: &mut Session, args: &[&str]) -> Value {
        session.execute(Value::array(make_command(args)))
    }

    #[test]
    fn test_ping_echo() {
        let mut s = session();
        assert_eq!(run(&mut s, &["PING"]), Value::pong());
        assert_eq!(run(&mut s, &["ping", "hello"]), bulk("hello"));
        assert_eq!(
            s.execute(Value::array(vec![bulk("PING"), Value::Integer(7)])),
            Value::Integer(7)
        );
        assert_eq!(run(&mut s, &["ECHO", "test"]), bulk("test"));
        assert_eq!(
            run(&mut s, &["ECHO"]),
            err(CommandError::WrongArity("echo".to_string()))
        );
    }

    #[test]
    fn test_invalid_requests() {
        let mut s = session();
        assert_eq!(s.execute(Value::array(vec![])), err(CommandError::InvalidCommand));
        assert_eq!(
            s.execute(Value::array(vec![Value::Integer(1)])),
            err(CommandError::InvalidCommand)
        );
        assert_eq!(s.execute(bulk("PING")), err(CommandError::InvalidCommand));
    }

    #[test]
    fn test_quit() {
        let mut s = session();
        assert!(!s.is_closing());
        assert_eq!(run(&mut s, &["QUIT"]), Value::ok());
        assert!(s.is_closing());
    }

    #[test]
    fn test_select() {
        let mut s = session();
        run(&mut s, &["SET", "k", "zero"]);
        assert_eq!(run(&mut s, &["SELECT", "2"]), Value::ok());
        assert_eq!(s.db_index(), 2);
        assert_eq!(run(&mut s, &["GET", "k"]), Value::Null);
        run(&mut s, &["SET", "k", "two"]);
        assert_eq!(run(&mut s, &["SELECT", "0"]), Value::ok());
        assert_eq!(run(&mut s, &["GET", "k"]), bulk("zero"));

        assert_eq!(run(&mut s, &["SELECT", "x"]), err(CommandError::NotInteger));
        assert_eq!(run(&mut s, &["SELECT", "-1"]), err(CommandError::InvalidDbIndex));
        assert_eq!(run(&mut s, &["SELECT", "16"]), err(CommandError::InvalidDbIndex));
        assert_eq!(s.db_index(), 0);
        assert_eq!(run(&mut s, &["SELECT", "15"]), Value::ok());
        assert_eq!(
            run(&mut s, &["SELECT"]),
            err(CommandError::WrongArity("select".to_string()))
        );
    }

    #[test]
    fn test_auth_required() {
        let mut s = session_with(Config {
            requirepass: Some("secret".to_string()),
            ..Config::default()
        });
        assert!(!s.is_authorized());

        assert_eq!(run(&mut s, &["GET", "k"]), err(CommandError::NoAuth));
        assert_eq!(run(&mut s, &["PING"]), err(CommandError::NoAuth));
        assert_eq!(run(&mut s, &["MULTI"]), err(CommandError::NoAuth));
        assert_eq!(run(&mut s, &["AUTH", "wrong"]), err(CommandError::InvalidPassword));
        assert!(!s.is_authorized());

        assert_eq!(run(&mut s, &["AUTH", "secret"]), Value::ok());
        assert!(s.is_authorized());
        assert_eq!(run(&mut s, &["SET", "k", "v"]), Value::ok());
    }

    #[test]
    fn test_quit_allowed_before_auth() {
        let mut s = session_with(Config {
            requirepass: Some("secret".to_string()),
            ..Config::default()
        });
        assert_eq!(run(&mut s, &["QUIT"]), Value::ok());
        assert!(s.is_closing());
    }

    #[test]
    fn test_auth_without_password() {
        let mut s = session();
        assert_eq!(run(&mut s, &["AUTH", "x"]), err(CommandError::NoPasswordSet));
    }

    #[test]
    fn test_multi_exec() {
        let mut s = session();
        assert_eq!(run(&mut s, &["MULTI"]), Value::ok());
        assert!(s.in_transaction());
        assert_eq!(run(&mut s, &["SET", "x", "1"]), Value::queued());
        assert_eq!(run(&mut s, &["SET", "y", "2"]), Value::queued());
        assert_eq!(run(&mut s, &["EXEC"]), Value::array(vec![Value::ok(), Value::ok()]));
        assert!(!s.in_transaction());
        assert_eq!(run(&mut s, &["GET", "x"]), bulk("1"));
        assert_eq!(run(&mut s, &["GET", "y"]), bulk("2"));
    }

    #[test]
    fn test_queued_commands_do_not_run_before_exec() {
        let mut s = session();
        run(&mut s, &["MULTI"]);
        run(&mut s, &["SET", "x", "1"]);
        assert_eq!(s.db.get(b"x"), None);
        // Connection commands still answer immediately
        assert_eq!(run(&mut s, &["PING"]), Value::pong());
        run(&mut s, &["EXEC"]);
        assert_eq!(s.db.get(b"x"), Some(bulk("1")));
    }

    #[test]
    fn test_exec_collects_errors() {
        let mut s = session();
        run(&mut s, &["SET", "s", "text"]);
        run(&mut s, &["MULTI"]);
        assert_eq!(run(&mut s, &["INCR", "s"]), Value::queued());
        assert_eq!(run(&mut s, &["NOSUCH"]), Value::queued());
        assert_eq!(run(&mut s, &["RPUSH", "l", "a"]), Value::queued());
        assert_eq!(
            run(&mut s, &["EXEC"]),
            Value::array(vec![
                err(CommandError::NotInteger),
                err(CommandError::UnknownCommand("nosuch".to_string())),
                Value::Integer(1),
            ])
        );
    }

    #[test]
    fn test_discard() {
        let mut s = session();
        run(&mut s, &["MULTI"]);
        run(&mut s, &["SET", "x", "1"]);
        assert_eq!(run(&mut s, &["DISCARD"]), Value::ok());
        assert!(!s.in_transaction());
        assert_eq!(run(&mut s, &["GET", "x"]), Value::Null);
        assert_eq!(run(&mut s, &["DISCARD"]), Value::ok());
    }

    #[test]
    fn test_transaction_errors() {
        let mut s = session();
        assert_eq!(run(&mut s, &["EXEC"]), err(CommandError::ExecWithoutMulti));
        run(&mut s, &["MULTI"]);
        run(&mut s, &["SET", "x", "1"]);
        assert_eq!(run(&mut s, &["MULTI"]), err(CommandError::NestedMulti));
        assert_eq!(run(&mut s, &["EXEC"]), Value::array(vec![Value::ok()]));
    }

    #[test]
    fn test_exec_uses_selected_database() {
        let mut s = session();
        run(&mut s, &["MULTI"]);
        run(&mut s, &["SET", "k", "v"]);
        run(&mut s, &["SELECT", "1"]);
        run(&mut s, &["EXEC"]);
        assert_eq!(run(&mut s, &["GET", "k"]), bulk("v"));
        run(&mut s, &["SELECT", "0"]);
        assert_eq!(run(&mut s, &["GET", "k"]), Value::Null);
    }

    #[test]
    fn test_sessions_share_databases() {
        let server = Arc::new(Server::new(Config::default()));
        let mut a = Session::new(Arc::clone(&server));
        let mut b = Session::new(server);
        run(&mut a, &["LPUSH", "l", "1", "2", "3"]);
        assert_eq!(run(&mut b, &["LRANGE", "l", "0", "-1"]), bulks(&["3", "2", "1"]));
    }

    #[test]
    fn test_concurrent_incr_across_sessions() {
        let server = Arc::new(Server::new(Config::default()));
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let server = Arc::clone(&server);
                scope.spawn(move || {
                    let mut s = Session::new(server);
                    for i in 0..100 {
                        if i % 10 == 0 {
                            run(&mut s, &["MULTI"]);
                            run(&mut s, &["INCR", "n"]);
                            run(&mut s, &["EXEC"]);
                        } else {
                            run(&mut s, &["INCR", "n"]);
                        }
                    }
                });
            }
        });
        let mut s = Session::new(server);
        assert_eq!(run(&mut s, &["GET", "n"]), bulk("800"));
    }

    #[test]
    fn test_flushall_inside_exec() {
        let mut s = session();
        run(&mut s, &["SELECT", "1"]);
        run(&mut s, &["SET", "a", "1"]);
        run(&mut s, &["SELECT", "0"]);
        run(&mut s, &["SET", "b", "2"]);

        run(&mut s, &["MULTI"]);
        run(&mut s, &["FLUSHALL"]);
        run(&mut s, &["DBSIZE"]);
        assert_eq!(
            run(&mut s, &["EXEC"]),
            Value::array(vec![Value::ok(), Value::Integer(0)])
        );
        run(&mut s, &["SELECT", "1"]);
        assert_eq!(run(&mut s, &["DBSIZE"]), Value::Integer(0));
    }

    #[test]
    fn test_flushall_does_not_split_transaction() {
        let server = Arc::new(Server::new(Config::default()));
        std::thread::scope(|scope| {
            let writer = Arc::clone(&server);
            scope.spawn(move || {
                let mut s = Session::new(writer);
                run(&mut s, &["SELECT", "1"]);
                for _ in 0..300 {
                    run(&mut s, &["MULTI"]);
                    run(&mut s, &["SET", "k", "v"]);
                    run(&mut s, &["GET", "k"]);
                    assert_eq!(
                        run(&mut s, &["EXEC"]),
                        Value::array(vec![Value::ok(), bulk("v")])
                    );
                }
            });

            let flusher = Arc::clone(&server);
            scope.spawn(move || {
                let mut s = Session::new(flusher);
                for _ in 0..300 {
                    assert_eq!(run(&mut s, &["FLUSHALL"]), Value::ok());
                }
            });
        });
    }
}
