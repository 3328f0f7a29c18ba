use std::error;
use std::fmt;
use std::result;

pub type Result<T> = result::Result<T, Error>;

/// An error that occurred while constructing a pattern or building a DFA.
#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
}

/// The kind of error that occurred.
#[derive(Clone, Debug)]
pub enum ErrorKind {
    /// Patterns with distinct accept values match the same string, and
    /// either no ambiguity resolver was supplied or the resolver refused
    /// to pick one. The `Debug` renderings of the conflicting accept
    /// values are carried so the error is self describing even though
    /// accept values are a generic type.
    Ambiguous(Vec<String>),
    /// A character range literal was constructed with `first > last`.
    InvalidRange { first: u16, last: u16 },
    /// A serialized DFA could not be loaded. The message describes which
    /// part of the byte stream was malformed.
    Deserialize(&'static str),
}

impl Error {
    /// Return the kind of this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub(crate) fn ambiguous<I>(candidates: I) -> Error
    where
        I: IntoIterator<Item = String>,
    {
        Error { kind: ErrorKind::Ambiguous(candidates.into_iter().collect()) }
    }

    pub(crate) fn invalid_range(first: u16, last: u16) -> Error {
        Error { kind: ErrorKind::InvalidRange { first, last } }
    }

    pub(crate) fn deserialize(what: &'static str) -> Error {
        Error { kind: ErrorKind::Deserialize(what) }
    }
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            ErrorKind::Ambiguous(ref candidates) => write!(
                f,
                "patterns for multiple accept values match the same string \
                 and no resolution was possible: {}",
                candidates.join(", "),
            ),
            ErrorKind::InvalidRange { first, last } => write!(
                f,
                "invalid character range: first U+{:04X} > last U+{:04X}",
                first, last,
            ),
            ErrorKind::Deserialize(what) => {
                write!(f, "malformed serialized DFA: {}", what)
            }
        }
    }
}
