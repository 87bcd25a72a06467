use std::error::Error as StdError;
use std::fmt;

use crate::builder::StringBuilder;
use crate::lexer::{Lexer, TokenKind};
use crate::types::{BasicFlags, BasicKind, CType, Qualifiers};

/// Everything that can go wrong while resolving a declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError {
  /// The lexer produced a byte sequence outside the grammar.
  InvalidToken(String),
  /// A recognized token the parser has no semantics for: identifiers,
  /// aggregates and (for now) the pointer star.
  UnsupportedToken {
    word: String,
    kind: &'static str,
  },
  /// A basic specifier arrived after a non-basic type was resolved.
  MixedKinds {
    name: &'static str,
    kind: &'static str,
  },
  /// Two basic specifiers that cannot merge, e.g. `double char`.
  BadCombination {
    prev: &'static str,
    next: &'static str,
  },
  /// Modifiers are mutually exclusive, e.g. `signed unsigned`.
  DuplicateModifier {
    prev: &'static str,
    next: &'static str,
  },
  /// The same qualifier twice.
  DuplicateQualifier(&'static str),
  /// Qualifiers or nothing at all, but no base type.
  MissingBaseType,
  /// A modifier or qualifier applied to an incompatible type.
  Misuse {
    what: &'static str,
    name: &'static str,
  },
}

impl fmt::Display for ParseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ParseError::InvalidToken(word) => write!(f, "Invalid token '{}'.", word),
      ParseError::UnsupportedToken { word, kind } => {
        write!(f, "'{}' ('{}') is unsupported!", word, kind)
      }
      ParseError::MixedKinds { name, kind } => write!(f, "Cannot assign '{}' to '{}'", name, kind),
      ParseError::BadCombination { prev, next } => {
        write!(f, "Cannot combine '{}' with '{}'", prev, next)
      }
      ParseError::DuplicateModifier { prev, next } => {
        write!(f, "Cannot combine modifiers '{}' and '{}'", prev, next)
      }
      ParseError::DuplicateQualifier(name) => write!(f, "Duplicate qualifier '{}'", name),
      ParseError::MissingBaseType => write!(f, "No base type received."),
      ParseError::Misuse { what, name } => write!(f, "Cannot use {} with '{}'", what, name),
    }
  }
}

impl StdError for ParseError {}

fn modifier_name(flags: BasicFlags) -> &'static str {
  if flags.contains(BasicFlags::SIGNED) {
    "signed"
  } else if flags.contains(BasicFlags::UNSIGNED) {
    "unsigned"
  } else if flags.contains(BasicFlags::COMPLEX) {
    "complex"
  } else {
    "<none>"
  }
}

fn qualifier_name(qualifier: Qualifiers) -> &'static str {
  if qualifier.contains(Qualifiers::CONST) {
    "const"
  } else if qualifier.contains(Qualifiers::VOLATILE) {
    "volatile"
  } else {
    "restrict"
  }
}

fn display_name(ty: &CType) -> &'static str {
  match ty {
    CType::Basic(basic) => basic.name,
    other => other.kind_name(),
  }
}

/// Accumulates declaration specifiers until the input resolves to a
/// single type.
///
/// A parser is single-use: construct one per declaration, call
/// [`Parser::parse`], then read the resolved type and qualifiers. On
/// error the accumulator holds partial state and should be discarded
/// with the parser.
#[derive(Debug)]
pub struct Parser {
  ty: CType,
  qualifiers: Qualifiers,
  modifiers: BasicFlags,
}

impl Parser {
  pub fn new() -> Parser {
    Parser {
      ty: CType::Invalid,
      qualifiers: Qualifiers::empty(),
      modifiers: BasicFlags::empty(),
    }
  }

  /// The resolved type. Never [`CType::Invalid`] after a successful
  /// [`Parser::parse`].
  pub fn ctype(&self) -> &CType {
    &self.ty
  }

  /// The accumulated qualifier set.
  pub fn qualifiers(&self) -> Qualifiers {
    self.qualifiers
  }

  /// Drives `lexer` to exhaustion, updating the accumulator per token
  /// and running the semantic check at end of input.
  pub fn parse(&mut self, lexer: &mut Lexer<'_>) -> Result<(), ParseError> {
    loop {
      let token = lexer.scan();
      match token.kind {
        TokenKind::Eof => return self.check_semantics(),
        TokenKind::Invalid => return Err(ParseError::InvalidToken(token.text().into_owned())),

        TokenKind::Bool => self.set_basic(BasicKind::Bool)?,
        TokenKind::Char => self.set_basic(BasicKind::Char)?,
        TokenKind::Short => self.set_basic(BasicKind::Short)?,
        TokenKind::Int => self.set_basic(BasicKind::Int)?,
        TokenKind::Long => self.set_basic(BasicKind::Long)?,
        TokenKind::Float => self.set_basic(BasicKind::Float)?,
        TokenKind::Double => self.set_basic(BasicKind::Double)?,
        TokenKind::Void => self.set_basic(BasicKind::Void)?,

        TokenKind::Signed => self.set_modifier(BasicFlags::SIGNED)?,
        TokenKind::Unsigned => self.set_modifier(BasicFlags::UNSIGNED)?,
        TokenKind::Complex => self.set_modifier(BasicFlags::COMPLEX)?,

        TokenKind::Const => self.set_qualifier(Qualifiers::CONST)?,
        TokenKind::Volatile => self.set_qualifier(Qualifiers::VOLATILE)?,
        TokenKind::Restrict => self.set_qualifier(Qualifiers::RESTRICT)?,

        TokenKind::Struct
        | TokenKind::Enum
        | TokenKind::Union
        | TokenKind::Ident
        | TokenKind::Asterisk => {
          return Err(ParseError::UnsupportedToken {
            word: token.text().into_owned(),
            kind: token.kind.as_str(),
          });
        }
      }
    }
  }

  /// Folds one basic specifier into the accumulator.
  fn set_basic(&mut self, kind: BasicKind) -> Result<(), ParseError> {
    let current = match self.ty {
      CType::Invalid => BasicKind::Invalid,
      CType::Basic(basic) => basic.kind,
      _ => {
        return Err(ParseError::MixedKinds {
          name: kind.name(),
          kind: self.ty.kind_name(),
        });
      }
    };

    let merged = if current == BasicKind::Invalid {
      kind
    } else {
      self.combine(current, kind)?
    };

    // Re-fetch the canonical entry so the accumulator carries the
    // official name view.
    self.ty = CType::basic(merged);
    println!("{}: '{}'", self.ty.kind_name(), merged.name());
    Ok(())
  }

  /// The legal multi-word combinations; everything else is an error.
  /// Scrambled spellings like `long int long` merge transitively.
  fn combine(&self, current: BasicKind, incoming: BasicKind) -> Result<BasicKind, ParseError> {
    use self::BasicKind::*;

    let bad = || ParseError::BadCombination {
      prev: current.name(),
      next: incoming.name(),
    };

    let merged = match incoming {
      // `int short` keeps the narrower kind.
      Short if current == Int => Short,

      // `short int`, `long int`, `long long int`; nothing changes.
      Int if current == Short || current == Long || current == LongLong => current,

      Long => match current {
        Int => Long,
        Long => LongLong,
        Double => LongDouble,
        _ if current.flags().contains(BasicFlags::COMPLEX) => LongDoubleComplex,
        _ => return Err(bad()),
      },

      // `long long` is synthesized, never lexed; kept for completeness.
      LongLong if current == Int => LongLong,
      LongLong => current,

      Double if current == Long => LongDouble,

      // `bool` and `void` only ever stand alone.
      Bool | Void => {
        return Err(ParseError::MixedKinds {
          name: incoming.name(),
          kind: self.ty.kind_name(),
        });
      }

      _ => return Err(bad()),
    };
    Ok(merged)
  }

  /// Folds in one of `signed`, `unsigned`, `complex`. The three are
  /// mutually exclusive.
  fn set_modifier(&mut self, modifier: BasicFlags) -> Result<(), ParseError> {
    if self.modifiers.intersects(BasicFlags::MODIFIERS) {
      return Err(ParseError::DuplicateModifier {
        prev: modifier_name(self.modifiers),
        next: modifier_name(modifier),
      });
    }
    self.modifiers.insert(modifier);
    println!("modifier: '{}'", modifier_name(modifier));
    Ok(())
  }

  /// Folds in one qualifier. Duplicates are rejected; `const const int`
  /// is legal C99 but not accepted here.
  fn set_qualifier(&mut self, qualifier: Qualifiers) -> Result<(), ParseError> {
    if self.qualifiers.contains(qualifier) {
      return Err(ParseError::DuplicateQualifier(qualifier_name(qualifier)));
    }
    self.qualifiers.insert(qualifier);
    println!("qualifier: '{}'", qualifier_name(qualifier));
    Ok(())
  }

  /// End-of-input resolution: promote lone modifiers, specialize
  /// signed/unsigned/complex kinds and validate qualifier usage.
  fn check_semantics(&mut self) -> Result<(), ParseError> {
    use self::BasicKind::*;

    if let CType::Invalid = self.ty {
      self.ty = if self.modifiers.contains(BasicFlags::SIGNED) {
        CType::basic(Int)
      } else if self.modifiers.contains(BasicFlags::UNSIGNED) {
        CType::basic(UnsignedInt)
      } else if self.modifiers.contains(BasicFlags::COMPLEX) {
        CType::basic(DoubleComplex)
      } else {
        return Err(ParseError::MissingBaseType);
      };
    }

    if let CType::Basic(basic) = self.ty {
      let is_integer = basic.flags.contains(BasicFlags::INTEGER);
      if self.modifiers.contains(BasicFlags::SIGNED) {
        if !is_integer {
          return Err(ParseError::Misuse {
            what: "signed",
            name: basic.name,
          });
        }
        // Every other integer kind is already signed.
        if basic.kind == Char {
          self.ty = CType::basic(SignedChar);
        }
      } else if self.modifiers.contains(BasicFlags::UNSIGNED) {
        if !is_integer {
          return Err(ParseError::Misuse {
            what: "unsigned",
            name: basic.name,
          });
        }
        match basic.kind {
          Char => self.ty = CType::basic(UnsignedChar),
          Short => self.ty = CType::basic(UnsignedShort),
          Int => self.ty = CType::basic(UnsignedInt),
          Long => self.ty = CType::basic(UnsignedLong),
          LongLong => self.ty = CType::basic(UnsignedLongLong),
          _ => {}
        }
      }
    }

    if self.modifiers.contains(BasicFlags::COMPLEX) {
      if let CType::Basic(basic) = self.ty {
        let is_float = basic.flags.contains(BasicFlags::FLOAT);
        // `long complex` alone resolves to `long double complex`.
        if !is_float && basic.kind != Long {
          return Err(ParseError::Misuse {
            what: "complex",
            name: basic.name,
          });
        }
        match basic.kind {
          Float => self.ty = CType::basic(FloatComplex),
          Double => self.ty = CType::basic(DoubleComplex),
          Long | LongDouble => self.ty = CType::basic(LongDoubleComplex),
          _ => {}
        }
      }
    }

    if self.qualifiers.contains(Qualifiers::RESTRICT) {
      let is_pointer = matches!(self.ty, CType::Pointer(_));
      if !is_pointer {
        return Err(ParseError::Misuse {
          what: "restrict",
          name: display_name(&self.ty),
        });
      }
    }

    Ok(())
  }

  /// Writes the canonical spelling into `builder` and borrows it back:
  /// qualifiers in `const volatile restrict` order, then the resolved
  /// type name.
  pub fn canonicalize<'b>(&self, builder: &'b mut StringBuilder<'_>) -> crate::Result<&'b str> {
    if self.qualifiers.contains(Qualifiers::CONST) {
      builder.append_str("const ")?;
    }
    if self.qualifiers.contains(Qualifiers::VOLATILE) {
      builder.append_str("volatile ")?;
    }
    if self.qualifiers.contains(Qualifiers::RESTRICT) {
      builder.append_str("restrict ")?;
    }

    // Modifiers are already folded into the basic names.
    match &self.ty {
      CType::Invalid => builder.append_str("<invalid>")?,
      CType::Basic(basic) => builder.append_str(basic.name)?,
      _ => builder.append_str("<unimplemented>")?,
    }

    Ok(builder.as_str())
  }
}

impl Default for Parser {
  fn default() -> Self {
    Parser::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::alloc::HEAP;
  use crate::types::{BasicKind, Qualifiers};

  fn parse(src: &str) -> Result<Parser, ParseError> {
    let mut parser = Parser::new();
    let mut lexer = Lexer::new(src.as_bytes());
    parser.parse(&mut lexer).map(|()| parser)
  }

  fn parsed_kind(parser: &Parser) -> BasicKind {
    match parser.ctype() {
      CType::Basic(basic) => basic.kind,
      _ => BasicKind::Invalid,
    }
  }

  fn canonical(src: &str) -> String {
    let parser = parse(src).expect(src);
    let mut builder = StringBuilder::new(&HEAP);
    parser.canonicalize(&mut builder).expect(src).to_owned()
  }

  #[test]
  fn resolves_single_specifiers() {
    assert_eq!(parsed_kind(&parse("int").unwrap()), BasicKind::Int);
    assert_eq!(parsed_kind(&parse("char").unwrap()), BasicKind::Char);
    assert_eq!(parsed_kind(&parse("void").unwrap()), BasicKind::Void);
    assert_eq!(parsed_kind(&parse("_Bool").unwrap()), BasicKind::Bool);
  }

  #[test]
  fn resolves_every_long_long_spelling() {
    for src in &["long long", "long long int", "int long long", "long int long"] {
      assert_eq!(parsed_kind(&parse(src).unwrap()), BasicKind::LongLong, "{}", src);
    }
  }

  #[test]
  fn scrambled_spellings_agree() {
    assert_eq!(parsed_kind(&parse("int short").unwrap()), BasicKind::Short);
    assert_eq!(parsed_kind(&parse("short int").unwrap()), BasicKind::Short);
    assert_eq!(parsed_kind(&parse("int long").unwrap()), BasicKind::Long);
    assert_eq!(parsed_kind(&parse("double long").unwrap()), BasicKind::LongDouble);
  }

  #[test]
  fn unsigned_int_and_int_unsigned_agree() {
    let a = parse("unsigned int").unwrap();
    let b = parse("int unsigned").unwrap();
    assert_eq!(parsed_kind(&a), BasicKind::UnsignedInt);
    assert_eq!(parsed_kind(&a), parsed_kind(&b));
    assert_eq!(a.qualifiers(), b.qualifiers());
  }

  #[test]
  fn lone_modifiers_promote() {
    assert_eq!(parsed_kind(&parse("signed").unwrap()), BasicKind::Int);
    assert_eq!(parsed_kind(&parse("unsigned").unwrap()), BasicKind::UnsignedInt);
    assert_eq!(parsed_kind(&parse("complex").unwrap()), BasicKind::DoubleComplex);
  }

  #[test]
  fn signedness_specializes_char() {
    assert_eq!(parsed_kind(&parse("signed char").unwrap()), BasicKind::SignedChar);
    assert_eq!(parsed_kind(&parse("char signed").unwrap()), BasicKind::SignedChar);
    assert_eq!(parsed_kind(&parse("unsigned char").unwrap()), BasicKind::UnsignedChar);
    // Plain `char` stays its own kind.
    assert_eq!(parsed_kind(&parse("char").unwrap()), BasicKind::Char);
  }

  #[test]
  fn signed_integers_stay_put() {
    assert_eq!(parsed_kind(&parse("signed long").unwrap()), BasicKind::Long);
    assert_eq!(
      parsed_kind(&parse("signed long long int").unwrap()),
      BasicKind::LongLong
    );
  }

  #[test]
  fn unsigned_specializes_every_integer() {
    assert_eq!(parsed_kind(&parse("unsigned short").unwrap()), BasicKind::UnsignedShort);
    assert_eq!(parsed_kind(&parse("long unsigned").unwrap()), BasicKind::UnsignedLong);
    assert_eq!(
      parsed_kind(&parse("unsigned long long").unwrap()),
      BasicKind::UnsignedLongLong
    );
  }

  #[test]
  fn complex_specializes_floats_and_long() {
    assert_eq!(parsed_kind(&parse("float complex").unwrap()), BasicKind::FloatComplex);
    assert_eq!(parsed_kind(&parse("complex double").unwrap()), BasicKind::DoubleComplex);
    assert_eq!(
      parsed_kind(&parse("long complex").unwrap()),
      BasicKind::LongDoubleComplex
    );
    assert_eq!(
      parsed_kind(&parse("complex long").unwrap()),
      BasicKind::LongDoubleComplex
    );
    assert_eq!(
      parsed_kind(&parse("long double complex").unwrap()),
      BasicKind::LongDoubleComplex
    );
  }

  #[test]
  fn qualifiers_accumulate() {
    let parser = parse("const volatile long double").unwrap();
    assert_eq!(parsed_kind(&parser), BasicKind::LongDouble);
    assert_eq!(parser.qualifiers(), Qualifiers::CONST | Qualifiers::VOLATILE);
  }

  #[test]
  fn duplicate_modifiers_are_rejected() {
    let error = parse("signed signed int").unwrap_err();
    assert_eq!(
      error.to_string(),
      "Cannot combine modifiers 'signed' and 'signed'"
    );
    let error = parse("signed unsigned").unwrap_err();
    assert_eq!(
      error.to_string(),
      "Cannot combine modifiers 'signed' and 'unsigned'"
    );
  }

  #[test]
  fn duplicate_qualifiers_are_rejected() {
    let error = parse("const const int").unwrap_err();
    assert_eq!(error.to_string(), "Duplicate qualifier 'const'");
  }

  #[test]
  fn restrict_requires_a_pointer() {
    let error = parse("restrict int").unwrap_err();
    assert_eq!(error.to_string(), "Cannot use restrict with 'int'");
  }

  #[test]
  fn modifiers_require_compatible_types() {
    let error = parse("unsigned float").unwrap_err();
    assert_eq!(error.to_string(), "Cannot use unsigned with 'float'");
    let error = parse("signed bool").unwrap_err();
    assert_eq!(error.to_string(), "Cannot use signed with 'bool'");
    let error = parse("complex char").unwrap_err();
    assert_eq!(error.to_string(), "Cannot use complex with 'char'");
  }

  #[test]
  fn missing_base_type_is_reported() {
    let error = parse("const").unwrap_err();
    assert_eq!(error.to_string(), "No base type received.");
    assert!(matches!(parse("").unwrap_err(), ParseError::MissingBaseType));
  }

  #[test]
  fn impossible_combinations_are_rejected() {
    let error = parse("double char").unwrap_err();
    assert_eq!(error.to_string(), "Cannot combine 'double' with 'char'");
    assert!(matches!(
      parse("int int").unwrap_err(),
      ParseError::BadCombination { .. }
    ));
    assert!(matches!(
      parse("long long long").unwrap_err(),
      ParseError::BadCombination { .. }
    ));
    assert!(matches!(
      parse("float int").unwrap_err(),
      ParseError::BadCombination { .. }
    ));
  }

  #[test]
  fn bool_and_void_stand_alone() {
    let error = parse("int bool").unwrap_err();
    assert_eq!(error.to_string(), "Cannot assign 'bool' to 'basic'");
    let error = parse("long void").unwrap_err();
    assert_eq!(error.to_string(), "Cannot assign 'void' to 'basic'");
    assert!(matches!(
      parse("bool int").unwrap_err(),
      ParseError::BadCombination { .. }
    ));
  }

  #[test]
  fn unsupported_tokens_are_reported() {
    let error = parse("struct foo").unwrap_err();
    assert_eq!(error.to_string(), "'struct' ('struct') is unsupported!");
    let error = parse("size_t").unwrap_err();
    assert_eq!(error.to_string(), "'size_t' ('<identifier>') is unsupported!");
    let error = parse("int *").unwrap_err();
    assert_eq!(error.to_string(), "'*' ('<pointer>') is unsupported!");
  }

  #[test]
  fn invalid_bytes_are_reported() {
    let error = parse("int 42").unwrap_err();
    assert_eq!(error.to_string(), "Invalid token '4'.");
  }

  #[test]
  fn canonicalization_round_trips() {
    assert_eq!(canonical("int"), "int");
    assert_eq!(canonical("long long int"), "long long");
    assert_eq!(canonical("int long"), "long");
    assert_eq!(canonical("unsigned"), "unsigned int");
    assert_eq!(canonical("signed char"), "signed char");
    assert_eq!(canonical("const volatile long double"), "const volatile long double");
    assert_eq!(canonical("volatile const int"), "const volatile int");
    assert_eq!(canonical("complex long"), "long double complex");
  }

  #[test]
  fn parsed_spellings_deduplicate_in_the_table() -> crate::Result<()> {
    use crate::types::TypeTable;

    let mut table = TypeTable::new(&HEAP)?;

    // First spelling misses and inserts.
    let first = parse("unsigned int").unwrap();
    let kind = parsed_kind(&first);
    assert!(table.get_basic_qual(kind, first.qualifiers()).is_none());
    table.add_basic_qual(kind, first.qualifiers())?;

    // The scrambled spelling resolves to the same tuple and hits.
    let second = parse("int unsigned").unwrap();
    assert!(table
      .get_basic_qual(parsed_kind(&second), second.qualifiers())
      .is_some());
    assert_eq!(table.len(), 1);
    Ok(())
  }

  #[test]
  fn canonical_spellings_reparse_to_the_same_type() {
    // Round trip every basic kind crossed with const/volatile subsets.
    let quals = [
      Qualifiers::empty(),
      Qualifiers::CONST,
      Qualifiers::VOLATILE,
      Qualifiers::CONST | Qualifiers::VOLATILE,
    ];
    for ty in crate::types::BASIC_TYPES.iter() {
      let basic = match ty {
        CType::Basic(basic) => basic,
        _ => continue,
      };
      for &qualifiers in &quals {
        let mut spelling = String::new();
        if qualifiers.contains(Qualifiers::CONST) {
          spelling.push_str("const ");
        }
        if qualifiers.contains(Qualifiers::VOLATILE) {
          spelling.push_str("volatile ");
        }
        spelling.push_str(basic.name);

        let parser = parse(&spelling).expect(&spelling);
        assert_eq!(parsed_kind(&parser), basic.kind, "{}", spelling);
        assert_eq!(parser.qualifiers(), qualifiers, "{}", spelling);

        let mut builder = StringBuilder::new(&HEAP);
        let canonical = parser.canonicalize(&mut builder).unwrap();
        assert_eq!(canonical, spelling);
      }
    }
  }
}
