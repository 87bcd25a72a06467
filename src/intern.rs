use std::alloc::Layout;
use std::ffi::CStr;
use std::io::{self, Write};
use std::mem;
use std::ptr::{self, NonNull};
use std::slice;
use std::str;

use crate::alloc::{self, Allocator};
use crate::{Error, Result};

const FNV_OFFSET: u32 = 0x811C_9DC5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a over the raw bytes.
pub fn fnv1a(bytes: &[u8]) -> u32 {
  let mut hash = FNV_OFFSET;
  for &byte in bytes {
    hash ^= u32::from(byte);
    hash = hash.wrapping_mul(FNV_PRIME);
  }
  hash
}

/// Header of an owned, immutable string record. The `len + 1` bytes of
/// NUL-terminated text live directly after the header in the same
/// allocation.
///
/// The record address doubles as the string's identity: byte-equal inputs
/// interned in the same table share one record, so comparing record
/// addresses is equivalent to comparing contents.
#[repr(C)]
pub struct InternedStr {
  len: usize,
  hash: u32,
}

const RECORD_HEADER: usize = mem::size_of::<InternedStr>();

impl InternedStr {
  /// Length of the text in bytes, terminator excluded.
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// The FNV-1a hash computed when the record was created.
  pub fn hash(&self) -> u32 {
    self.hash
  }

  fn data(&self) -> *const u8 {
    unsafe { (self as *const InternedStr as *const u8).add(RECORD_HEADER) }
  }

  pub fn as_bytes(&self) -> &[u8] {
    unsafe { slice::from_raw_parts(self.data(), self.len) }
  }

  /// The interned text. Records are only ever created from `&str`, so the
  /// bytes are valid UTF-8.
  pub fn as_str(&self) -> &str {
    unsafe { str::from_utf8_unchecked(self.as_bytes()) }
  }

  /// The interned text including its NUL terminator.
  pub fn as_c_str(&self) -> &CStr {
    unsafe { CStr::from_bytes_with_nul_unchecked(slice::from_raw_parts(self.data(), self.len + 1)) }
  }
}

fn record_layout(len: usize) -> Result<Layout> {
  Layout::from_size_align(RECORD_HEADER + len + 1, mem::align_of::<InternedStr>())
    .map_err(|_| Error::OutOfMemory)
}

/// One slot of the open-addressed table. A null record marks an empty
/// slot; `probe` is the slot's distance from its home index
/// `hash % cap`.
struct Entry {
  record: *mut InternedStr,
  probe: u32,
}

/// Probes `entries` for `bytes`, starting at the hash's home slot.
///
/// Returns the matching slot or the first empty one, along with the probe
/// distance travelled. `None` only when the table has no slots at all.
///
/// Assumes `entries` holds `cap` initialized slots and, when non-empty,
/// at least one empty slot (the load factor guarantees this).
unsafe fn lookup(
  entries: *const Entry,
  cap: usize,
  bytes: &[u8],
  hash: u32,
) -> Option<(usize, u32)> {
  if cap == 0 {
    return None;
  }
  let mut probe = 0u32;
  let mut index = hash as usize % cap;
  loop {
    let entry = &*entries.add(index);
    if entry.record.is_null() {
      return Some((index, probe));
    }
    let record = &*entry.record;
    if record.hash == hash && record.len == bytes.len() && record.as_bytes() == bytes {
      return Some((index, probe));
    }
    probe += 1;
    index = (index + 1) % cap;
  }
}

/// A deduplicating string table using Robin-Hood open addressing.
///
/// Records live in the owning allocator until the interner is dropped;
/// every view handed out stays valid for exactly that long.
pub struct Interner<'a> {
  allocator: &'a dyn Allocator,
  entries: *mut Entry,
  count: usize,
  /// Always zero or a power of two.
  cap: usize,
  max_probe: u32,
}

impl<'a> Interner<'a> {
  /// Creates an empty interner that allocates through `allocator`.
  pub fn new(allocator: &'a dyn Allocator) -> Interner<'a> {
    Interner {
      allocator,
      entries: ptr::null_mut(),
      count: 0,
      cap: 0,
      max_probe: 0,
    }
  }

  /// Number of distinct strings interned so far.
  pub fn len(&self) -> usize {
    self.count
  }

  pub fn is_empty(&self) -> bool {
    self.count == 0
  }

  /// Number of slots in the table.
  pub fn capacity(&self) -> usize {
    self.cap
  }

  /// Largest probe distance of any live slot.
  pub fn max_probe(&self) -> u32 {
    self.max_probe
  }

  /// Interns `text`, returning its shared record. Byte-equal inputs
  /// always return the same record.
  pub fn get_interned(&mut self, text: &str) -> Result<&InternedStr> {
    let hash = fnv1a(text.as_bytes());
    unsafe {
      if let Some((index, _probe)) = lookup(self.entries, self.cap, text.as_bytes(), hash) {
        let record = (*self.entries.add(index)).record;
        if !record.is_null() {
          return Ok(&*record);
        }
      }
      let record = self.insert(text, hash)?;
      Ok(&*record.as_ptr())
    }
  }

  /// Interns `text` and returns the canonical string view.
  pub fn get(&mut self, text: &str) -> Result<&str> {
    Ok(self.get_interned(text)?.as_str())
  }

  /// Interns `text` and returns the NUL-terminated view.
  pub fn get_c_str(&mut self, text: &str) -> Result<&CStr> {
    Ok(self.get_interned(text)?.as_c_str())
  }

  fn insert(&mut self, text: &str, hash: u32) -> Result<NonNull<InternedStr>> {
    // Keep the load factor under 3/4 so probing always terminates on an
    // empty slot.
    if self.count * 4 >= self.cap * 3 {
      let new_cap = if self.cap == 0 { 8 } else { self.cap * 2 };
      self.resize(new_cap)?;
    }

    let record = self.alloc_record(text, hash)?;
    let mut entry = Entry {
      record: record.as_ptr(),
      probe: 0,
    };
    unsafe {
      let mut index = hash as usize % self.cap;
      loop {
        let slot = self.entries.add(index);
        if (*slot).record.is_null() {
          *slot = entry;
          self.count += 1;
          return Ok(record);
        }
        // Robin Hood: a resident closer to home yields its slot to the
        // in-transit entry that has travelled farther.
        if (*slot).probe < entry.probe {
          mem::swap(&mut *slot, &mut entry);
        }
        entry.probe += 1;
        if entry.probe > self.max_probe {
          self.max_probe = entry.probe;
        }
        index = (index + 1) % self.cap;
      }
    }
  }

  /// Allocates the record as one header + text + NUL allocation.
  fn alloc_record(&self, text: &str, hash: u32) -> Result<NonNull<InternedStr>> {
    let raw = self.allocator.alloc(record_layout(text.len())?)?;
    let record = raw.cast::<InternedStr>();
    unsafe {
      record.as_ptr().write(InternedStr {
        len: text.len(),
        hash,
      });
      let data = raw.as_ptr().add(RECORD_HEADER);
      ptr::copy_nonoverlapping(text.as_ptr(), data, text.len());
      *data.add(text.len()) = 0;
    }
    Ok(record)
  }

  /// Moves every live record into a zeroed table of `new_cap` slots.
  /// Probe distances are recomputed along the way.
  fn resize(&mut self, new_cap: usize) -> Result<()> {
    let new_entries = alloc::alloc_array::<Entry>(self.allocator, new_cap)?;
    unsafe {
      ptr::write_bytes(new_entries.as_ptr(), 0, new_cap);

      let mut new_count = 0;
      self.max_probe = 0;
      for i in 0..self.cap {
        let record = (*self.entries.add(i)).record;
        if record.is_null() {
          continue;
        }
        if let Some((index, probe)) =
          lookup(new_entries.as_ptr(), new_cap, (*record).as_bytes(), (*record).hash)
        {
          *new_entries.as_ptr().add(index) = Entry { record, probe };
          new_count += 1;
          if probe > self.max_probe {
            self.max_probe = probe;
          }
        }
      }

      if let Some(old) = NonNull::new(self.entries) {
        alloc::free_array(self.allocator, old, self.cap);
      }
      self.entries = new_entries.as_ptr();
      self.count = new_count;
      self.cap = new_cap;
    }
    Ok(())
  }

  /// Only displaced slots contribute to the collision bars.
  fn displaced_probe(&self, index: usize) -> u32 {
    let entry = unsafe { &*self.entries.add(index) };
    match unsafe { entry.record.as_ref() } {
      Some(record) if record.hash as usize % self.cap != index => entry.probe,
      _ => 0,
    }
  }

  /// Writes the slot table, the per-slot collision bars and summary
  /// statistics, mainly for poking at the Robin-Hood layout
  /// interactively.
  pub fn dump<W: Write>(&self, out: &mut W) -> io::Result<()> {
    writeln!(out, "[INTERNED]")?;
    let mut collisions = 0;
    for i in 0..self.cap {
      let entry = unsafe { &*self.entries.add(i) };
      write!(out, "\t- [{}]:", i)?;
      if let Some(record) = unsafe { entry.record.as_ref() } {
        write!(out, " {:?}", record.as_str())?;
        let home = record.hash as usize % self.cap;
        if home != i {
          write!(out, "; (collision @ {}, probe: {})", home, entry.probe)?;
          collisions += 1;
        }
      }
      writeln!(out)?;
    }
    writeln!(out)?;
    writeln!(out, "[COLLISIONS]")?;
    for i in 0..self.cap {
      write!(out, "\t- [{}]: ", i)?;
      for _ in 0..self.displaced_probe(i) {
        write!(out, "=")?;
      }
      writeln!(out)?;
    }
    writeln!(out)?;
    writeln!(out, "[STATISTICS]")?;
    writeln!(out, "\t- Count:      {}", self.count)?;
    writeln!(out, "\t- Cap:        {}", self.cap)?;
    writeln!(out, "\t- Unused:     {}", self.cap - self.count)?;
    writeln!(out, "\t- Collisions: {}", collisions)?;
    writeln!(out, "\t- Max. Probe: {}", self.max_probe)
  }
}

impl<'a> Drop for Interner<'a> {
  fn drop(&mut self) {
    unsafe {
      for i in 0..self.cap {
        let record = (*self.entries.add(i)).record;
        if record.is_null() {
          continue;
        }
        if let Ok(layout) = record_layout((*record).len) {
          let _ = self.allocator.free(NonNull::new_unchecked(record).cast(), layout);
        }
      }
      if let Some(entries) = NonNull::new(self.entries) {
        alloc::free_array(self.allocator, entries, self.cap);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::alloc::HEAP;
  use crate::arena::Arena;

  #[test]
  fn byte_equal_inputs_share_one_record() -> crate::Result<()> {
    let mut intern = Interner::new(&HEAP);
    let a = intern.get_interned("hello")? as *const InternedStr;
    let b = intern.get_interned("hello")? as *const InternedStr;
    let c = intern.get_interned("world")? as *const InternedStr;
    assert!(ptr::eq(a, b));
    assert!(!ptr::eq(a, c));
    assert_eq!(intern.len(), 2);
    Ok(())
  }

  #[test]
  fn records_carry_length_hash_and_terminator() -> crate::Result<()> {
    let mut intern = Interner::new(&HEAP);
    let record = intern.get_interned("abc")?;
    assert_eq!(record.len(), 3);
    assert_eq!(record.hash(), fnv1a(b"abc"));
    assert_eq!(record.as_bytes(), b"abc");
    assert_eq!(record.as_c_str().to_bytes_with_nul(), b"abc\0");
    Ok(())
  }

  #[test]
  fn empty_string_interns_like_any_other() -> crate::Result<()> {
    let mut intern = Interner::new(&HEAP);
    let a = intern.get_interned("")? as *const InternedStr;
    let b = intern.get_interned("")? as *const InternedStr;
    assert!(ptr::eq(a, b));
    unsafe { assert!((*a).is_empty()) };
    Ok(())
  }

  #[test]
  fn capacity_grows_from_zero_to_eight() -> crate::Result<()> {
    let mut intern = Interner::new(&HEAP);
    assert_eq!(intern.capacity(), 0);
    intern.get("first")?;
    assert_eq!(intern.capacity(), 8);
    assert_eq!(intern.len(), 1);
    Ok(())
  }

  #[test]
  fn table_doubles_at_three_quarters_load() -> crate::Result<()> {
    let mut intern = Interner::new(&HEAP);
    for i in 0..6 {
      intern.get(&format!("s{}", i))?;
    }
    assert_eq!(intern.capacity(), 8);
    // The seventh insert finds count * 4 >= cap * 3 and doubles first.
    intern.get("s6")?;
    assert_eq!(intern.capacity(), 16);
    assert_eq!(intern.len(), 7);
    Ok(())
  }

  #[test]
  fn resize_preserves_record_identity() -> crate::Result<()> {
    let mut intern = Interner::new(&HEAP);
    let before = intern.get_interned("stable")? as *const InternedStr;
    for i in 0..40 {
      intern.get(&format!("filler{}", i))?;
    }
    assert!(intern.capacity() >= 64);
    let after = intern.get_interned("stable")? as *const InternedStr;
    assert!(ptr::eq(before, after));
    Ok(())
  }

  #[test]
  fn interning_a_live_view_is_idempotent() -> crate::Result<()> {
    let mut intern = Interner::new(&HEAP);
    let record = intern.get_interned("round trip")?;
    let address = record as *const InternedStr;
    let text = record.as_str().to_owned();
    let again = intern.get_interned(&text)? as *const InternedStr;
    assert!(ptr::eq(address, again));
    Ok(())
  }

  #[test]
  fn max_probe_never_trails_a_live_slot() -> crate::Result<()> {
    let mut intern = Interner::new(&HEAP);
    for i in 0..100 {
      intern.get(&format!("probe{}", i))?;
    }
    unsafe {
      for i in 0..intern.capacity() {
        let entry = &*intern.entries.add(i);
        if !entry.record.is_null() {
          assert!(entry.probe <= intern.max_probe());
        }
      }
    }
    Ok(())
  }

  #[test]
  fn arena_backed_interner_reads_back() -> crate::Result<()> {
    let arena = Arena::new()?;
    let mut intern = Interner::new(&arena);
    intern.get("int")?;
    intern.get("unsigned long")?;
    assert_eq!(intern.get("int")?, "int");
    assert_eq!(intern.len(), 2);
    Ok(())
  }

  #[test]
  fn dump_reports_statistics() -> crate::Result<()> {
    let mut intern = Interner::new(&HEAP);
    intern.get("const")?;
    intern.get("volatile")?;
    let mut out = Vec::new();
    intern.dump(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("[INTERNED]"));
    assert!(text.contains("[COLLISIONS]"));
    assert!(text.contains("Count:      2"));
    // One collision-bar line per slot, displaced or not.
    assert_eq!(text.matches("\t- [").count(), 2 * intern.capacity());
    Ok(())
  }
}
