//! Typed Values
//!
//! A key holds exactly one kind of container. Commands check the kind before
//! touching the container and fail with `WRONGTYPE` on a mismatch; the kind
//! only changes when the key is deleted or overwritten wholesale.

use super::sorted_set::SortedSet;
use crate::error::CommandError;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

/// The kind tag of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    Hash,
    Set,
    SortedSet,
    List,
}

impl ValueKind {
    /// The name reported by TYPE and matched by `SCAN ... TYPE`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Hash => "hash",
            ValueKind::Set => "set",
            ValueKind::SortedSet => "zset",
            ValueKind::List => "list",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(Bytes),
    Hash(BTreeMap<Bytes, Bytes>),
    Set(BTreeSet<Bytes>),
    SortedSet(SortedSet),
    List(VecDeque<Bytes>),
}

macro_rules! typed_access {
    ($as_ref:ident, $as_mut:ident, $variant:ident, $ty:ty) => {
        pub fn $as_ref(&self) -> Result<&$ty, CommandError> {
            match self {
                Value::$variant(v) => Ok(v),
                _ => Err(CommandError::WrongType),
            }
        }

        pub fn $as_mut(&mut self) -> Result<&mut $ty, CommandError> {
            match self {
                Value::$variant(v) => Ok(v),
                _ => Err(CommandError::WrongType),
            }
        }
    };
}

impl Value {
    /// An empty container of the given kind.
    pub fn empty(kind: ValueKind) -> Self {
        match kind {
            ValueKind::String => Value::String(Bytes::new()),
            ValueKind::Hash => Value::Hash(BTreeMap::new()),
            ValueKind::Set => Value::Set(BTreeSet::new()),
            ValueKind::SortedSet => Value::SortedSet(SortedSet::new()),
            ValueKind::List => Value::List(VecDeque::new()),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::Hash(_) => ValueKind::Hash,
            Value::Set(_) => ValueKind::Set,
            Value::SortedSet(_) => ValueKind::SortedSet,
            Value::List(_) => ValueKind::List,
        }
    }

    /// True for a container with no elements. An empty string is still a
    /// value and never counts as empty.
    pub fn is_empty_container(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::Hash(h) => h.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::SortedSet(z) => z.is_empty(),
            Value::List(l) => l.is_empty(),
        }
    }

    typed_access!(as_string, as_string_mut, String, Bytes);
    typed_access!(as_hash, as_hash_mut, Hash, BTreeMap<Bytes, Bytes>);
    typed_access!(as_set, as_set_mut, Set, BTreeSet<Bytes>);
    typed_access!(as_zset, as_zset_mut, SortedSet, SortedSet);
    typed_access!(as_list, as_list_mut, List, VecDeque<Bytes>);
}
