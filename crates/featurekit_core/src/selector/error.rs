//! Selector syntax errors.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Reason a selector failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorErrorKind {
    Empty,
    UnexpectedEnd,
    UnexpectedChar(char),
    ExpectedIdentifier,
    ExpectedSelector,
    UnterminatedString,
    UnsupportedPseudoClass(String),
}

impl Display for SelectorErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "selector is empty"),
            Self::UnexpectedEnd => write!(f, "unexpected end of selector"),
            Self::UnexpectedChar(c) => write!(f, "unexpected character `{c}`"),
            Self::ExpectedIdentifier => write!(f, "expected an identifier"),
            Self::ExpectedSelector => write!(f, "expected a compound selector"),
            Self::UnterminatedString => write!(f, "unterminated quoted string"),
            Self::UnsupportedPseudoClass(name) => write!(f, "unsupported pseudo-class `:{name}`"),
        }
    }
}

/// Malformed selector passed to the matcher or observer engine.
///
/// This is a programming error in the calling feature and is surfaced
/// synchronously; nothing in the engine retries or swallows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorSyntaxError {
    pub selector: String,
    /// Character offset into `selector`.
    pub position: usize,
    pub kind: SelectorErrorKind,
}

impl SelectorSyntaxError {
    pub(crate) fn new(selector: &str, position: usize, kind: SelectorErrorKind) -> Self {
        Self {
            selector: selector.to_string(),
            position,
            kind,
        }
    }
}

impl Display for SelectorSyntaxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SelectorSyntaxError: invalid selector `{}` at {}: {}",
            self.selector, self.position, self.kind
        )
    }
}

impl Error for SelectorSyntaxError {}
