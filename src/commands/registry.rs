//! Command Registry
//!
//! Every command is described by a `CommandSpec`: its name, the argument
//! specs of its fixed prefix, an optional repeating group for trailing
//! variadic arguments, a few dispatch flags and the handler. Each data type
//! module exports a static table of specs; `CommandRegistry::standard`
//! composes them into one lookup map.
//!
//! ## Arity
//!
//! ```text
//!   HSET key field value [field value ...]
//!        └─── fixed ───┘ └─── repeat ────┘
//!
//!   valid counts: 3, 5, 7, ...
//! ```

use super::dispatcher::CommandContext;
use super::args::Args;
use crate::error::{CommandError, CommandResult};
use crate::storage::ValueKind;
use std::collections::HashMap;

/// A command handler.
pub type Handler = fn(&mut CommandContext<'_>, &Args) -> CommandResult;

/// How a single argument is validated before the handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSpec {
    /// Any bytes
    Bytes,
    /// Decimal 64-bit integer
    Int,
    /// Decimal float, `inf`/`-inf` allowed, NaN rejected
    Float,
    /// A key which, if present, must hold the given kind (None = any)
    Key(Option<ValueKind>),
}

pub const ARG: ArgSpec = ArgSpec::Bytes;
pub const INT: ArgSpec = ArgSpec::Int;
pub const FLOAT: ArgSpec = ArgSpec::Float;
pub const KEY: ArgSpec = ArgSpec::Key(None);
pub const STRING_KEY: ArgSpec = ArgSpec::Key(Some(ValueKind::String));
pub const HASH_KEY: ArgSpec = ArgSpec::Key(Some(ValueKind::Hash));
pub const SET_KEY: ArgSpec = ArgSpec::Key(Some(ValueKind::Set));
pub const ZSET_KEY: ArgSpec = ArgSpec::Key(Some(ValueKind::SortedSet));
pub const LIST_KEY: ArgSpec = ArgSpec::Key(Some(ValueKind::List));

/// Executed immediately even inside MULTI.
pub const TX_CONTROL: u8 = 1 << 0;
/// Allowed while the session has subscriptions.
pub const PUBSUB: u8 = 1 << 1;

/// Descriptor of one command.
pub struct CommandSpec {
    /// Lowercase command name
    pub name: &'static str,
    pub fixed: &'static [ArgSpec],
    pub repeat: Option<&'static [ArgSpec]>,
    pub flags: u8,
    pub handler: Handler,
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("fixed", &self.fixed)
            .field("repeat", &self.repeat)
            .field("flags", &self.flags)
            .finish()
    }
}

impl CommandSpec {
    /// A command taking exactly the `fixed` arguments.
    pub const fn new(name: &'static str, fixed: &'static [ArgSpec], handler: Handler) -> Self {
        Self {
            name,
            fixed,
            repeat: None,
            flags: 0,
            handler,
        }
    }

    /// Allows any number of trailing `repeat` groups.
    pub const fn variadic(self, repeat: &'static [ArgSpec]) -> Self {
        Self {
            repeat: Some(repeat),
            ..self
        }
    }

    pub const fn flags(self, flags: u8) -> Self {
        Self { flags, ..self }
    }

    /// Checks the argument count against the fixed prefix and repeating
    /// group.
    pub fn check_arity(&self, argc: usize) -> CommandResult<()> {
        let fixed = self.fixed.len();
        let ok = match self.repeat {
            None => argc == fixed,
            Some(group) => argc >= fixed && (argc - fixed) % group.len().max(1) == 0,
        };
        if ok {
            Ok(())
        } else {
            Err(CommandError::wrong_args(self.name))
        }
    }

    /// The `ArgSpec` governing argument `index`.
    pub fn arg_spec(&self, index: usize) -> Option<ArgSpec> {
        if let Some(spec) = self.fixed.get(index) {
            return Some(*spec);
        }
        let group = self.repeat?;
        if group.is_empty() {
            return None;
        }
        Some(group[(index - self.fixed.len()) % group.len()])
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// Normalizes a command name: everything from the first NUL byte on is
/// ignored and ASCII letters are lowercased.
pub fn normalize_name(name: &[u8]) -> Vec<u8> {
    let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
    name[..end].to_ascii_lowercase()
}

/// Maps command names to descriptors.
#[derive(Debug)]
pub struct CommandRegistry {
    commands: HashMap<&'static str, &'static CommandSpec>,
}

impl CommandRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// A registry with every supported command.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for table in [
            super::server::COMMANDS,
            super::keys::COMMANDS,
            super::string::COMMANDS,
            super::hash::COMMANDS,
            super::list::COMMANDS,
            super::set::COMMANDS,
            super::zset::COMMANDS,
            super::transaction::COMMANDS,
            super::pubsub::COMMANDS,
        ] {
            registry.register_all(table);
        }
        registry
    }

    pub fn register(&mut self, spec: &'static CommandSpec) {
        self.commands.insert(spec.name, spec);
    }

    pub fn register_all(&mut self, specs: &'static [CommandSpec]) {
        for spec in specs {
            self.register(spec);
        }
    }

    /// Looks up an already normalized name.
    pub fn lookup(&self, name: &[u8]) -> Option<&'static CommandSpec> {
        let name = std::str::from_utf8(name).ok()?;
        self.commands.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Registered names in alphabetical order.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
