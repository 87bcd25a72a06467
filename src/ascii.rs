//! ASCII predicates the standard library spells differently.

/// C's `isspace`: space, tab, newline, vertical tab, form feed and
/// carriage return. `u8::is_ascii_whitespace` omits the vertical tab.
pub fn is_whitespace(byte: u8) -> bool {
  matches!(byte, b' ' | b'\t' | b'\n' | b'\x0b' | b'\x0c' | b'\r')
}

/// First byte of an identifier: a letter or an underscore.
pub fn is_ident_start(byte: u8) -> bool {
  byte.is_ascii_alphabetic() || byte == b'_'
}

/// Continuation byte of an identifier.
pub fn is_ident_part(byte: u8) -> bool {
  byte.is_ascii_alphanumeric() || byte == b'_'
}
