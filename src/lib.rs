//! An exploratory toolkit for analyzing C declaration specifiers.
//!
//! Three interlocking subsystems do the heavy lifting:
//!
//! - an [allocator capability](crate::alloc::Allocator) with swappable
//!   backends: the process heap, a panic-on-failure heap, a null backend
//!   for fixed buffers, and a page-backed [region allocator](crate::Arena)
//!   whose latest allocation can grow in place;
//! - a [string-interning table](crate::Interner) using open-addressed
//!   Robin-Hood hashing, where a record's address *is* its identity;
//! - a [declaration parser](crate::Parser) that resolves every legal
//!   ordering of C declaration specifiers (`long long int`,
//!   `int long long`, `unsigned long complex`, ...) and records distinct
//!   `(kind, qualifier-set)` tuples in a [type table](crate::TypeTable).
//!
//! # Examples
//!
//! ```
//! use cdecl::{Arena, Lexer, Parser, StringBuilder};
//!
//! # fn main() -> cdecl::Result<()> {
//! let arena = Arena::new()?;
//!
//! let mut parser = Parser::new();
//! let mut lexer = Lexer::new(b"unsigned long int");
//! assert!(parser.parse(&mut lexer).is_ok());
//!
//! let mut builder = StringBuilder::new(&arena);
//! assert_eq!(parser.canonicalize(&mut builder)?, "unsigned long");
//! # Ok(())
//! # }
//! ```

pub mod alloc;
mod arena;
mod ascii;
mod builder;
mod error;
mod intern;
mod lexer;
mod os;
mod parser;
mod types;

pub use crate::arena::{Arena, Usage, PAGE_SIZE};
pub use crate::builder::StringBuilder;
pub use crate::error::{Error, Result};
pub use crate::intern::{fnv1a, InternedStr, Interner};
pub use crate::lexer::{Lexer, Token, TokenKind};
pub use crate::parser::{ParseError, Parser};
pub use crate::types::{
  Basic, BasicFlags, BasicKind, BasicTypes, CType, Pointer, Qualifiers, TypeInfo, TypeTable,
  BASIC_TYPES,
};
