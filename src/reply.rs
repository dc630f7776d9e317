//! Command Replies
//!
//! This module defines the values a command hands back to its caller.
//! Encoding them onto a wire is left to whatever adapter sits in front of
//! the engine; here they are plain Rust values.
//!
//! ## Shapes
//!
//! - `Status` - a short status line such as `OK`, `QUEUED` or `PONG`
//! - `Integer` - a signed 64-bit integer
//! - `Bulk` - a binary-safe byte string
//! - `Nil` - the null bulk string
//! - `NilArray` - the null array (e.g. a timed-out BLPOP or an aborted EXEC)
//! - `Array` - an ordered sequence of replies, possibly nested
//! - `Error` - an error text, only found inside an EXEC result array

use bytes::Bytes;
use std::fmt;

/// A value returned by a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Status(String),
    Integer(i64),
    Bulk(Bytes),
    Nil,
    NilArray,
    Array(Vec<Reply>),
    Error(String),
}

impl Reply {
    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    pub fn array(values: Vec<Reply>) -> Self {
        Reply::Array(values)
    }

    /// Builds an array of bulk strings.
    pub fn bulk_array<I, B>(values: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Reply::Array(values.into_iter().map(|v| Reply::Bulk(v.into())).collect())
    }

    /// `Bulk` for `Some`, `Nil` for `None`.
    pub fn from_option(value: Option<Bytes>) -> Self {
        value.map(Reply::Bulk).unwrap_or(Reply::Nil)
    }

    pub fn from_bool(value: bool) -> Self {
        Reply::Integer(value as i64)
    }

    /// Common response for successful operations
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    /// Response to a command queued inside MULTI
    pub fn queued() -> Self {
        Reply::Status("QUEUED".to_string())
    }

    pub fn pong() -> Self {
        Reply::Status("PONG".to_string())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil | Reply::NilArray)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Bulk(b) => Some(b),
            Reply::Status(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Reply]> {
        match self {
            Reply::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Reply>> {
        match self {
            Reply::Array(arr) => Some(arr),
            _ => None,
        }
    }
}

impl From<crate::error::CommandError> for Reply {
    fn from(err: crate::error::CommandError) -> Self {
        Reply::Error(err.to_string())
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

impl Reply {
    /// Renders in redis-cli style, indenting nested arrays.
    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            Reply::Nil => write!(f, "(nil)"),
            Reply::NilArray => write!(f, "(nil array)"),
            Reply::Array(values) if values.is_empty() => write!(f, "(empty array)"),
            Reply::Array(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                        write!(f, "{:width$}", "", width = depth * 3)?;
                    }
                    write!(f, "{}) ", i + 1)?;
                    v.write_indented(f, depth + 1)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_scalars() {
        assert_eq!(Reply::ok().to_string(), "OK");
        assert_eq!(Reply::integer(42).to_string(), "(integer) 42");
        assert_eq!(Reply::bulk("hello").to_string(), "\"hello\"");
        assert_eq!(Reply::Nil.to_string(), "(nil)");
        assert_eq!(Reply::array(vec![]).to_string(), "(empty array)");
    }

    #[test]
    fn test_display_nested_array() {
        let reply = Reply::array(vec![
            Reply::bulk("0"),
            Reply::bulk_array(["a", "b"]),
        ]);
        assert_eq!(reply.to_string(), "1) \"0\"\n2) 1) \"a\"\n   2) \"b\"");
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Reply::from_option(None), Reply::Nil);
        assert_eq!(
            Reply::from_option(Some(Bytes::from("x"))),
            Reply::bulk("x")
        );
        assert!(Reply::NilArray.is_nil());
    }
}
