use std::error::Error as StdError;
use std::fmt;

use crate::parser::ParseError;

/// A wrapper for the errors that can occur in this crate.
#[derive(Debug)]
pub enum Error {
  /// The backing allocator could not fulfill the request.
  OutOfMemory,
  /// The allocator does not implement the requested operation (e.g.
  /// `free_all` on the global heap, or growing a fixed-capacity builder).
  NotImplemented,
  /// A declaration failed to parse or resolve.
  Parse(ParseError),
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Error::OutOfMemory => write!(f, "out of memory"),
      Error::NotImplemented => write!(f, "allocation mode not implemented"),
      Error::Parse(error) => write!(f, "{}", error),
    }
  }
}

impl StdError for Error {
  fn source(&self) -> Option<&(dyn StdError + 'static)> {
    match self {
      Error::Parse(error) => Some(error),
      _ => None,
    }
  }
}

impl From<ParseError> for Error {
  fn from(error: ParseError) -> Self {
    Error::Parse(error)
  }
}

/// The result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;
