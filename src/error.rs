//! Command Errors
//!
//! Every failure a command can report to a client. The `Display` output of
//! each variant is the exact error text a real server would send, so client
//! code that matches on error strings behaves the same against this engine.

use thiserror::Error;

/// Result type returned by every command handler.
pub type CommandResult<T = crate::reply::Reply> = Result<T, CommandError>;

/// Coarse classification of command errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownCommand,
    WrongArgsCount,
    InvalidArgumentType,
    WrongType,
    NonFiniteResult,
    ConnectionUnavailable,
    /// Any other argument or state validation failure
    Other,
}

/// Errors produced while dispatching or executing a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("ERR unknown command '{name}', with args beginning with: {args}")]
    UnknownCommand { name: String, args: String },

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArgsCount(String),

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR value is not a valid float")]
    NotAFloat,

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR increment would produce NaN or Infinity")]
    NonFiniteResult,

    #[error("ERR resulting score is not a number (NaN)")]
    ScoreNan,

    #[error("FakeRedis is emulating a connection error.")]
    ConnectionUnavailable,

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR increment or decrement would overflow")]
    Overflow,

    #[error("ERR index out of range")]
    IndexOutOfRange,

    #[error("ERR no such key")]
    NoSuchKey,

    #[error("ERR invalid cursor")]
    InvalidCursor,

    #[error("ERR DB index is out of range")]
    DbIndexOutOfRange,

    #[error("ERR timeout is not a float or out of range")]
    InvalidTimeout,

    #[error("ERR timeout is negative")]
    NegativeTimeout,

    #[error("ERR min or max is not a float")]
    InvalidScoreRange,

    #[error("ERR value is out of range, must be positive")]
    NotPositive,

    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpireTime(String),

    #[error("ERR XX and NX options at the same time are not compatible")]
    XxAndNx,

    #[error("ERR GT, LT, and/or NX options at the same time are not compatible")]
    GtLtNx,

    #[error("ERR INCR option supports a single increment-element pair")]
    IncrPair,

    #[error("ERR MULTI calls can not be nested")]
    NestedMulti,

    #[error("ERR EXEC without MULTI")]
    ExecWithoutMulti,

    #[error("ERR DISCARD without MULTI")]
    DiscardWithoutMulti,

    #[error("ERR WATCH inside MULTI is not allowed")]
    WatchInsideMulti,

    #[error("EXECABORT Transaction discarded because of previous errors.")]
    ExecAbort,

    #[error("ERR Can't execute '{0}': only (P|S)SUBSCRIBE / (P|S)UNSUBSCRIBE / PING / QUIT / RESET are allowed in this context")]
    SubscribedContext(String),
}

impl CommandError {
    /// Builds the unknown-command error, quoting the name and arguments the
    /// way the real server does.
    pub fn unknown_command(name: &[u8], args: &[bytes::Bytes]) -> Self {
        let args = args
            .iter()
            .map(|a| format!("'{}' ", String::from_utf8_lossy(a)))
            .collect::<String>();
        CommandError::UnknownCommand {
            name: String::from_utf8_lossy(name).into_owned(),
            args,
        }
    }

    pub fn wrong_args(command: &str) -> Self {
        CommandError::WrongArgsCount(command.to_lowercase())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::UnknownCommand { .. } => ErrorKind::UnknownCommand,
            CommandError::WrongArgsCount(_) => ErrorKind::WrongArgsCount,
            CommandError::NotAnInteger | CommandError::NotAFloat => {
                ErrorKind::InvalidArgumentType
            }
            CommandError::WrongType => ErrorKind::WrongType,
            CommandError::NonFiniteResult | CommandError::ScoreNan => ErrorKind::NonFiniteResult,
            CommandError::ConnectionUnavailable => ErrorKind::ConnectionUnavailable,
            _ => ErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_unknown_command_text() {
        let err = CommandError::unknown_command(b"foo", &[Bytes::from("a"), Bytes::from("b")]);
        assert_eq!(
            err.to_string(),
            "ERR unknown command 'foo', with args beginning with: 'a' 'b' "
        );
        assert_eq!(err.kind(), ErrorKind::UnknownCommand);
    }

    #[test]
    fn test_wrong_args_is_lowercase() {
        let err = CommandError::wrong_args("HSET");
        assert_eq!(
            err.to_string(),
            "ERR wrong number of arguments for 'hset' command"
        );
    }

    #[test]
    fn test_contract_texts() {
        assert_eq!(
            CommandError::NonFiniteResult.to_string(),
            "ERR increment would produce NaN or Infinity"
        );
        assert_eq!(
            CommandError::ScoreNan.to_string(),
            "ERR resulting score is not a number (NaN)"
        );
        assert_eq!(CommandError::ScoreNan.kind(), ErrorKind::NonFiniteResult);
        assert_eq!(
            CommandError::WrongType.to_string(),
            "WRONGTYPE Operation against a key holding the wrong kind of value"
        );
        assert_eq!(CommandError::NotAFloat.kind(), ErrorKind::InvalidArgumentType);
    }
}
