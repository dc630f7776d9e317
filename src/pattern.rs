//! Glob Pattern Compiler
//!
//! Compiles the glob dialect used by `KEYS`, `SCAN ... MATCH` and
//! `PSUBSCRIBE` into a token list that is matched byte-wise against
//! arbitrary binary keys.
//!
//! ## Grammar
//!
//! - `?` matches exactly one byte
//! - `*` matches any run of bytes, including none
//! - `\x` matches a literal `x`; a trailing lone `\` is dropped
//! - `[...]` is a byte class: leading `^` negates it, `a-z` is an inclusive
//!   range (bounds are swapped when descending), `\x` escapes inside it.
//!   `[]` never matches and `[^]` matches any single byte.
//!
//! Matching is anchored at both ends and case-sensitive.

/// One element of a byte class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassItem {
    Byte(u8),
    Range(u8, u8),
}

impl ClassItem {
    #[inline]
    fn contains(&self, b: u8) -> bool {
        match *self {
            ClassItem::Byte(x) => x == b,
            ClassItem::Range(lo, hi) => lo <= b && b <= hi,
        }
    }
}

/// A compiled pattern element. Everything except `AnyRun` consumes
/// exactly one byte.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(u8),
    AnyByte,
    AnyRun,
    Class { negated: bool, items: Vec<ClassItem> },
    /// An empty class: no byte satisfies it.
    Never,
}

impl Token {
    #[inline]
    fn matches_byte(&self, b: u8) -> bool {
        match self {
            Token::Literal(x) => *x == b,
            Token::AnyByte => true,
            Token::Class { negated, items } => items.iter().any(|i| i.contains(b)) != *negated,
            Token::Never | Token::AnyRun => false,
        }
    }
}

/// A compiled glob pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    tokens: Vec<Token>,
}

impl Pattern {
    /// Compiles a raw glob pattern. Compilation never fails: malformed
    /// input (an unterminated class, a dangling escape) degrades the same
    /// way it does on the real server.
    pub fn compile(pattern: &[u8]) -> Self {
        let mut tokens = Vec::new();
        let len = pattern.len();
        let mut i = 0;

        while i < len {
            let c = pattern[i];
            i += 1;
            match c {
                b'?' => tokens.push(Token::AnyByte),
                b'*' => {
                    // consecutive stars are equivalent to one
                    if tokens.last() != Some(&Token::AnyRun) {
                        tokens.push(Token::AnyRun);
                    }
                }
                b'\\' => {
                    if i < len {
                        tokens.push(Token::Literal(pattern[i]));
                        i += 1;
                    }
                }
                b'[' => {
                    let negated = i < len && pattern[i] == b'^';
                    if negated {
                        i += 1;
                    }
                    let mut items = Vec::new();
                    while i < len {
                        if pattern[i] == b'\\' && i + 1 < len {
                            i += 1;
                            items.push(ClassItem::Byte(pattern[i]));
                        } else if pattern[i] == b']' {
                            i += 1;
                            break;
                        } else if i + 2 < len && pattern[i + 1] == b'-' {
                            let (mut lo, mut hi) = (pattern[i], pattern[i + 2]);
                            if lo > hi {
                                std::mem::swap(&mut lo, &mut hi);
                            }
                            items.push(ClassItem::Range(lo, hi));
                            i += 2;
                        } else {
                            items.push(ClassItem::Byte(pattern[i]));
                        }
                        i += 1;
                    }
                    tokens.push(match (items.is_empty(), negated) {
                        (true, false) => Token::Never,
                        (true, true) => Token::AnyByte,
                        (false, _) => Token::Class { negated, items },
                    });
                }
                other => tokens.push(Token::Literal(other)),
            }
        }

        Self { tokens }
    }

    /// Returns true if the whole of `text` matches the pattern.
    ///
    /// Greedy scan with single-point backtracking to the most recent `*`;
    /// every other token consumes exactly one byte, so this is linear in
    /// practice and never recurses.
    pub fn matches(&self, text: &[u8]) -> bool {
        let tokens = &self.tokens;
        let (mut t, mut s) = (0usize, 0usize);
        let mut star: Option<(usize, usize)> = None;

        while s < text.len() {
            match tokens.get(t) {
                Some(Token::AnyRun) => {
                    star = Some((t, s));
                    t += 1;
                }
                Some(tok) if tok.matches_byte(text[s]) => {
                    t += 1;
                    s += 1;
                }
                _ => match star {
                    Some((star_t, star_s)) => {
                        t = star_t + 1;
                        s = star_s + 1;
                        star = Some((star_t, star_s + 1));
                    }
                    None => return false,
                },
            }
        }

        tokens[t..].iter().all(|tok| *tok == Token::AnyRun)
    }

    /// True if the pattern is a bare `*`.
    pub fn matches_everything(&self) -> bool {
        self.tokens == [Token::AnyRun]
    }
}
