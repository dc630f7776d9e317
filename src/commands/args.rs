//! Argument Access and Numeric Encoding
//!
//! Handlers see their arguments through `Args`, a thin view over the raw
//! byte strings with typed accessors. The parsing rules are the server's:
//!
//! - integers are plain decimal, optional leading `-`, no `+`, no spaces
//! - floats additionally accept `inf`, `+inf` and `-inf` in any case, and
//!   reject NaN
//! - floats are written back in the shortest form that round-trips

use crate::error::{CommandError, CommandResult};
use crate::storage::ScoreBound;
use bytes::Bytes;
use std::time::Duration;

/// Arguments of one command invocation, excluding the command name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    raw: Vec<Bytes>,
}

impl Args {
    pub fn new(raw: Vec<Bytes>) -> Self {
        Self { raw }
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Raw argument. Arity has been checked, so indexes below `len` are
    /// always valid.
    pub fn bytes(&self, index: usize) -> &Bytes {
        &self.raw[index]
    }

    pub fn int(&self, index: usize) -> CommandResult<i64> {
        parse_int(&self.raw[index])
    }

    pub fn float(&self, index: usize) -> CommandResult<f64> {
        parse_float(&self.raw[index])
    }

    /// Arguments from `start` to the end.
    pub fn rest(&self, start: usize) -> &[Bytes] {
        &self.raw[start.min(self.raw.len())..]
    }

    pub fn all(&self) -> &[Bytes] {
        &self.raw
    }

    /// True if the argument equals `word`, ignoring ASCII case.
    pub fn is(&self, index: usize, word: &str) -> bool {
        self.raw
            .get(index)
            .map(|a| a.eq_ignore_ascii_case(word.as_bytes()))
            .unwrap_or(false)
    }
}

/// Parses a decimal 64-bit integer in canonical form: no sign other than
/// a leading `-`, no leading zeros and no `-0`.
pub fn parse_int(data: &[u8]) -> CommandResult<i64> {
    let digits = data.strip_prefix(b"-").unwrap_or(data);
    let canonical = match digits {
        [] => false,
        [b'0'] => digits.len() == data.len(),
        [b'0', ..] => false,
        _ => digits.iter().all(u8::is_ascii_digit),
    };
    if !canonical {
        return Err(CommandError::NotAnInteger);
    }
    std::str::from_utf8(data)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(CommandError::NotAnInteger)
}

/// Parses a float argument.
pub fn parse_float(data: &[u8]) -> CommandResult<f64> {
    parse_float_lenient(data).ok_or(CommandError::NotAFloat)
}

fn parse_float_lenient(data: &[u8]) -> Option<f64> {
    let s = std::str::from_utf8(data).ok()?;
    let value = match s.to_ascii_lowercase().as_str() {
        "inf" | "+inf" => f64::INFINITY,
        "-inf" => f64::NEG_INFINITY,
        _ => {
            // Rust also accepts "infinity" and "nan"; the server does not
            if !s.bytes().all(|b| b.is_ascii_digit() || b"+-.eE".contains(&b)) {
                return None;
            }
            s.parse::<f64>().ok()?
        }
    };
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}

/// Formats a float the way the server stores it: shortest round-trip
/// decimal, integral values without a fraction, infinities as `inf`/`-inf`.
pub fn format_float(value: f64) -> Bytes {
    if value.is_infinite() {
        return Bytes::from_static(if value > 0.0 { b"inf" } else { b"-inf" });
    }
    Bytes::from(format!("{}", value))
}

/// Parses one end of a ZRANGEBYSCORE/ZCOUNT range: `1.5`, `(1.5`, `-inf`,
/// `+inf`.
pub fn parse_score_bound(data: &[u8]) -> CommandResult<ScoreBound> {
    match data.split_first() {
        Some((b'(', rest)) => parse_float_lenient(rest)
            .map(ScoreBound::Exclusive)
            .ok_or(CommandError::InvalidScoreRange),
        _ => parse_float_lenient(data)
            .map(ScoreBound::Inclusive)
            .ok_or(CommandError::InvalidScoreRange),
    }
}

/// Parses a blocking-command timeout in seconds. Zero means no deadline.
pub fn parse_timeout(data: &[u8]) -> CommandResult<Option<Duration>> {
    let secs = parse_float_lenient(data).ok_or(CommandError::InvalidTimeout)?;
    if secs < 0.0 {
        return Err(CommandError::NegativeTimeout);
    }
    if secs == 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|_| CommandError::InvalidTimeout)
}

/// Resolves a possibly negative index against a length, Python style:
/// `-1` is the last element. Returns None when out of range.
pub fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { index + len } else { index };
    if (0..len).contains(&index) {
        Some(index as usize)
    } else {
        None
    }
}

/// Resolves an inclusive `start..=stop` range (LRANGE, ZRANGE, ...) to a
/// half-open slice range, empty when the range selects nothing.
pub fn resolve_range(start: i64, stop: i64, len: usize) -> std::ops::Range<usize> {
    let n = len as i64;
    let mut start = if start < 0 { start + n } else { start };
    let mut stop = if stop < 0 { stop + n } else { stop };
    start = start.max(0);
    stop = stop.min(n - 1);
    if start > stop || start >= n {
        return 0..0;
    }
    start as usize..(stop + 1) as usize
}
