use std::alloc::Layout;
use std::io::{self, Write};
use std::ops::Index;
use std::ptr::{self, NonNull};

use bitflags::bitflags;

use crate::alloc::{self, Allocator};
use crate::builder::StringBuilder;
use crate::intern::{InternedStr, Interner};
use crate::Result;

/// Canonical identity of a C builtin type after modifier resolution.
///
/// `long long`, `long double` and the complex kinds are synthesized by
/// the parser; they never correspond to a single token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BasicKind {
  Invalid,
  Bool,

  // Integer kinds. `char` is distinct from both of its signed variants.
  Char,
  SignedChar,
  Short,
  Int,
  Long,
  LongLong,
  UnsignedChar,
  UnsignedShort,
  UnsignedInt,
  UnsignedLong,
  UnsignedLongLong,

  // Floating-point kinds. `_Complex` and `complex` are interchangeable.
  Float,
  Double,
  LongDouble,
  FloatComplex,
  DoubleComplex,
  LongDoubleComplex,

  Void,
}

impl BasicKind {
  /// Number of kinds, [`BasicKind::Invalid`] included.
  pub const COUNT: usize = 20;

  /// The official spelling, e.g. `"unsigned long long"`.
  pub fn name(self) -> &'static str {
    match BASIC_TYPES[self] {
      CType::Basic(basic) => basic.name,
      _ => "<invalid>",
    }
  }

  /// The classification flags of the canonical entry.
  pub fn flags(self) -> BasicFlags {
    match BASIC_TYPES[self] {
      CType::Basic(basic) => basic.flags,
      _ => BasicFlags::empty(),
    }
  }
}

bitflags! {
  /// Classification of a basic type, doubling as the parser's modifier
  /// set (`SIGNED`, `UNSIGNED`, `COMPLEX`).
  pub struct BasicFlags: u8 {
    const BOOLEAN  = 1 << 0;
    const INTEGER  = 1 << 1;
    const FLOAT    = 1 << 2;
    const SIGNED   = 1 << 3;
    const UNSIGNED = 1 << 4;
    const COMPLEX  = 1 << 5;

    const MODIFIERS = Self::SIGNED.bits | Self::UNSIGNED.bits | Self::COMPLEX.bits;
    const SIGNED_INTEGER = Self::INTEGER.bits | Self::SIGNED.bits;
    const UNSIGNED_INTEGER = Self::INTEGER.bits | Self::UNSIGNED.bits;
    const COMPLEX_FLOAT = Self::FLOAT.bits | Self::COMPLEX.bits;
  }
}

bitflags! {
  /// Qualifier bit-set. `const` and `volatile` apply to every type;
  /// `restrict` is only valid on pointers.
  pub struct Qualifiers: u8 {
    const CONST    = 1 << 0;
    const VOLATILE = 1 << 1;
    const RESTRICT = 1 << 2;
  }
}

/// Payload of a basic (builtin) type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Basic {
  pub kind: BasicKind,
  pub flags: BasicFlags,
  /// The official name view, shared by every accumulator holding this
  /// kind.
  pub name: &'static str,
}

/// Pointer types record their pointee by table identity so qualified
/// pointees stay distinct.
///
/// This is the data-model contract for the planned pointer extension; no
/// parse path constructs one yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pointer {
  pub pointee: NonNull<TypeInfo>,
  pub qualifiers: Qualifiers,
}

/// A C type: the accumulator the parser resolves token by token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CType {
  Invalid,
  Basic(Basic),
  Pointer(Pointer),
  Struct,
  Enum,
  Union,
}

impl CType {
  /// The canonical entry for `kind`, carrying the official name and
  /// flags.
  pub fn basic(kind: BasicKind) -> CType {
    BASIC_TYPES[kind]
  }

  /// Lower-case name of the kind tag, for reports.
  pub fn kind_name(&self) -> &'static str {
    match self {
      CType::Invalid => "invalid",
      CType::Basic(_) => "basic",
      CType::Pointer(_) => "pointer",
      CType::Struct => "struct",
      CType::Enum => "enum",
      CType::Union => "union",
    }
  }
}

const fn basic(kind: BasicKind, flags: BasicFlags, name: &'static str) -> CType {
  CType::Basic(Basic { kind, flags, name })
}

/// The canonical table of basic types, indexable by [`BasicKind`].
pub struct BasicTypes([CType; BasicKind::COUNT]);

impl Index<BasicKind> for BasicTypes {
  type Output = CType;

  fn index(&self, kind: BasicKind) -> &CType {
    &self.0[kind as usize]
  }
}

impl BasicTypes {
  pub fn iter(&self) -> std::slice::Iter<'_, CType> {
    self.0.iter()
  }
}

// The table holds no pointers and is never mutated, so sharing it across
// threads is fine even though `CType` itself is not `Sync`.
unsafe impl Sync for BasicTypes {}

/// One canonical [`CType`] per [`BasicKind`], in declaration order.
pub static BASIC_TYPES: BasicTypes = BasicTypes([
  CType::Invalid,
  basic(BasicKind::Bool, BasicFlags::BOOLEAN, "bool"),
  basic(BasicKind::Char, BasicFlags::INTEGER, "char"),
  basic(BasicKind::SignedChar, BasicFlags::SIGNED_INTEGER, "signed char"),
  basic(BasicKind::Short, BasicFlags::SIGNED_INTEGER, "short"),
  basic(BasicKind::Int, BasicFlags::SIGNED_INTEGER, "int"),
  basic(BasicKind::Long, BasicFlags::SIGNED_INTEGER, "long"),
  basic(BasicKind::LongLong, BasicFlags::SIGNED_INTEGER, "long long"),
  basic(BasicKind::UnsignedChar, BasicFlags::UNSIGNED_INTEGER, "unsigned char"),
  basic(BasicKind::UnsignedShort, BasicFlags::UNSIGNED_INTEGER, "unsigned short"),
  basic(BasicKind::UnsignedInt, BasicFlags::UNSIGNED_INTEGER, "unsigned int"),
  basic(BasicKind::UnsignedLong, BasicFlags::UNSIGNED_INTEGER, "unsigned long"),
  basic(
    BasicKind::UnsignedLongLong,
    BasicFlags::UNSIGNED_INTEGER,
    "unsigned long long",
  ),
  basic(BasicKind::Float, BasicFlags::FLOAT, "float"),
  basic(BasicKind::Double, BasicFlags::FLOAT, "double"),
  basic(BasicKind::LongDouble, BasicFlags::FLOAT, "long double"),
  basic(BasicKind::FloatComplex, BasicFlags::COMPLEX_FLOAT, "float complex"),
  basic(BasicKind::DoubleComplex, BasicFlags::COMPLEX_FLOAT, "double complex"),
  basic(
    BasicKind::LongDoubleComplex,
    BasicFlags::COMPLEX_FLOAT,
    "long double complex",
  ),
  basic(BasicKind::Void, BasicFlags::empty(), "void"),
]);

/// A concrete type as it exists in practice: a [`CType`] augmented with
/// outer qualifiers. Several infos may share one `CType`.
#[derive(Debug)]
pub struct TypeInfo {
  ty: NonNull<CType>,
  qualifiers: Qualifiers,
  /// Whether the table owns (and must free) the pointed-to `CType`.
  /// Entries referring to [`BASIC_TYPES`] do not.
  owns_type: bool,
}

impl TypeInfo {
  pub fn ctype(&self) -> &CType {
    unsafe { self.ty.as_ref() }
  }

  pub fn qualifiers(&self) -> Qualifiers {
    self.qualifiers
  }
}

impl PartialEq for TypeInfo {
  /// Structural equality: same type tag and payload, same outer
  /// qualifiers. Pointer payloads compare their pointee by identity.
  fn eq(&self, other: &Self) -> bool {
    self.qualifiers == other.qualifiers && self.ctype() == other.ctype()
  }
}

impl Eq for TypeInfo {}

fn static_info(kind: BasicKind, qualifiers: Qualifiers) -> TypeInfo {
  TypeInfo {
    ty: NonNull::from(&BASIC_TYPES[kind]),
    qualifiers,
    owns_type: false,
  }
}

struct TableEntry {
  /// Interned canonical spelling; identity comparison keys lookups by
  /// name.
  name: NonNull<InternedStr>,
  info: TypeInfo,
}

/// An ordered, deduplicating store of the types seen so far.
///
/// Lookup by `(kind, qualifiers)` is a linear scan: the working set is
/// bounded by the number of basic kinds times qualifier combinations.
pub struct TypeTable<'a> {
  allocator: &'a dyn Allocator,
  intern: Interner<'a>,
  entries: *mut TableEntry,
  len: usize,
  cap: usize,
}

impl<'a> TypeTable<'a> {
  /// Creates an empty table. The canonical, unqualified basics live in
  /// the static [`BASIC_TYPES`] array; the table only records the
  /// `(kind, qualifiers)` tuples actually encountered.
  pub fn new(allocator: &'a dyn Allocator) -> Result<TypeTable<'a>> {
    Ok(TypeTable {
      allocator,
      intern: Interner::new(allocator),
      entries: ptr::null_mut(),
      len: 0,
      cap: 0,
    })
  }

  /// Number of distinct types recorded.
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  fn entry(&self, index: usize) -> &TableEntry {
    debug_assert!(index < self.len);
    unsafe { &*self.entries.add(index) }
  }

  fn find_basic_qual(&self, kind: BasicKind, qualifiers: Qualifiers) -> Option<usize> {
    for i in 0..self.len {
      let info = &self.entry(i).info;
      if info.qualifiers != qualifiers {
        continue;
      }
      if let CType::Basic(basic) = info.ctype() {
        if basic.kind == kind {
          return Some(i);
        }
      }
    }
    None
  }

  /// Finds the entry for `(kind, qualifiers)` if one was recorded.
  pub fn get_basic_qual(&self, kind: BasicKind, qualifiers: Qualifiers) -> Option<&TypeInfo> {
    self
      .find_basic_qual(kind, qualifiers)
      .map(move |i| &self.entry(i).info)
  }

  /// Finds the unqualified entry for `kind`, if one was recorded.
  pub fn get_basic_unqual(&self, kind: BasicKind) -> Option<&TypeInfo> {
    self.get_basic_qual(kind, Qualifiers::empty())
  }

  /// Records `(kind, qualifiers)` if new and returns the canonical
  /// entry either way.
  pub fn add_basic_qual(&mut self, kind: BasicKind, qualifiers: Qualifiers) -> Result<&TypeInfo> {
    if let Some(i) = self.find_basic_qual(kind, qualifiers) {
      return Ok(&self.entry(i).info);
    }

    // The canonical spelling keys the new entry.
    let mut buf = [0u8; 64];
    let mut name = StringBuilder::fixed(&mut buf);
    if qualifiers.contains(Qualifiers::CONST) {
      name.append_str("const ")?;
    }
    if qualifiers.contains(Qualifiers::VOLATILE) {
      name.append_str("volatile ")?;
    }
    if qualifiers.contains(Qualifiers::RESTRICT) {
      name.append_str("restrict ")?;
    }
    name.append_str(kind.name())?;

    self.push(name.as_str(), static_info(kind, qualifiers))
  }

  /// Looks a type up by name through the interner; identity comparison
  /// of the interned records does the matching.
  pub fn get_by_name(&mut self, name: &str) -> Result<Option<&TypeInfo>> {
    let query = NonNull::from(self.intern.get_interned(name)?);
    for i in 0..self.len {
      if self.entry(i).name == query {
        return Ok(Some(&self.entry(i).info));
      }
    }
    Ok(None)
  }

  fn push(&mut self, name: &str, info: TypeInfo) -> Result<&TypeInfo> {
    if self.len >= self.cap {
      let new_cap = if self.cap == 0 { 8 } else { self.cap * 2 };
      let entries = match NonNull::new(self.entries) {
        Some(old) => alloc::resize_array(self.allocator, old, self.cap, new_cap)?,
        None => alloc::alloc_array(self.allocator, new_cap)?,
      };
      self.entries = entries.as_ptr();
      self.cap = new_cap;
    }

    let name = NonNull::from(self.intern.get_interned(name)?);
    unsafe {
      self.entries.add(self.len).write(TableEntry { name, info });
      self.len += 1;
      Ok(&(*self.entries.add(self.len - 1)).info)
    }
  }

  /// Writes every recorded entry, for inspection.
  pub fn dump<W: Write>(&self, out: &mut W) -> io::Result<()> {
    writeln!(out, "[TYPE TABLE]")?;
    for i in 0..self.len {
      let entry = self.entry(i);
      let name = unsafe { entry.name.as_ref() };
      writeln!(
        out,
        "\t[{}]: {:?} = {{kind = {}, qualifiers = {:?}}}",
        i,
        name.as_str(),
        entry.info.ctype().kind_name(),
        entry.info.qualifiers(),
      )?;
    }
    Ok(())
  }
}

impl<'a> Drop for TypeTable<'a> {
  fn drop(&mut self) {
    unsafe {
      for i in 0..self.len {
        let info = &(*self.entries.add(i)).info;
        if info.owns_type {
          let _ = self.allocator.free(info.ty.cast(), Layout::new::<CType>());
        }
      }
      if let Some(entries) = NonNull::new(self.entries) {
        alloc::free_array(self.allocator, entries, self.cap);
      }
    }
  }
}
