use std::cmp;
use std::ffi::CStr;
use std::ptr::{self, NonNull};
use std::slice;
use std::str;

use crate::alloc::{self, Allocator, NIL};
use crate::Result;

/// Smallest capacity a builder grows to.
const MIN_CAP: usize = 8;

/// A growable byte-string builder driven by an [`Allocator`] capability.
///
/// The buffer always keeps a NUL terminator one byte past the accumulated
/// text (whenever a buffer exists at all), so [`StringBuilder::as_c_str`]
/// is free. Writes that fail to allocate leave the builder unchanged.
pub struct StringBuilder<'a> {
  allocator: &'a dyn Allocator,
  buffer: *mut u8,
  len: usize,
  cap: usize,
}

impl<'a> StringBuilder<'a> {
  /// Creates an empty builder that grows through `allocator`.
  pub fn new(allocator: &'a dyn Allocator) -> StringBuilder<'a> {
    StringBuilder {
      allocator,
      buffer: ptr::null_mut(),
      len: 0,
      cap: 0,
    }
  }

  /// Wraps a caller-owned buffer. The builder never grows past the
  /// buffer's length; writes that would are reported as errors.
  pub fn fixed(buffer: &'a mut [u8]) -> StringBuilder<'a> {
    let cap = buffer.len();
    let builder = StringBuilder {
      allocator: &NIL,
      buffer: buffer.as_mut_ptr(),
      len: 0,
      cap,
    };
    if cap > 0 {
      unsafe { *builder.buffer = 0 };
    }
    builder
  }

  /// Number of accumulated bytes, terminator excluded.
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn capacity(&self) -> usize {
    self.cap
  }

  /// Truncates to the empty string, keeping the capacity.
  pub fn reset(&mut self) {
    self.len = 0;
    if self.cap > 0 {
      unsafe { *self.buffer = 0 };
    }
  }

  /// Makes room for `extra` bytes of text plus the terminator.
  fn reserve(&mut self, extra: usize) -> Result<()> {
    let needed = self.len + extra + 1;
    if needed < self.cap {
      return Ok(());
    }
    let mut new_cap = cmp::max(MIN_CAP, self.cap * 2);
    while new_cap < needed {
      new_cap *= 2;
    }
    let new_buffer = match NonNull::new(self.buffer) {
      Some(old) => self
        .allocator
        .resize(old, alloc::array_layout::<u8>(self.cap)?, new_cap)?,
      None => self.allocator.alloc(alloc::array_layout::<u8>(new_cap)?)?,
    };
    self.buffer = new_buffer.as_ptr();
    self.cap = new_cap;
    Ok(())
  }

  /// Appends `text` at the end of the accumulated string.
  pub fn append_str(&mut self, text: &str) -> Result<()> {
    self.reserve(text.len())?;
    unsafe {
      ptr::copy_nonoverlapping(text.as_ptr(), self.buffer.add(self.len), text.len());
      self.len += text.len();
      *self.buffer.add(self.len) = 0;
    }
    Ok(())
  }

  /// Appends a single character.
  pub fn append_char(&mut self, ch: char) -> Result<()> {
    let mut buf = [0u8; 4];
    self.append_str(ch.encode_utf8(&mut buf))
  }

  /// Inserts `text` in front of the accumulated string.
  pub fn prepend_str(&mut self, text: &str) -> Result<()> {
    self.reserve(text.len())?;
    unsafe {
      // Shift the existing text right, then fill the hole.
      ptr::copy(self.buffer, self.buffer.add(text.len()), self.len);
      ptr::copy_nonoverlapping(text.as_ptr(), self.buffer, text.len());
      self.len += text.len();
      *self.buffer.add(self.len) = 0;
    }
    Ok(())
  }

  /// Inserts a single character in front of the accumulated string.
  pub fn prepend_char(&mut self, ch: char) -> Result<()> {
    let mut buf = [0u8; 4];
    self.prepend_str(ch.encode_utf8(&mut buf))
  }

  /// Borrows the accumulated text.
  pub fn as_str(&self) -> &str {
    if self.len == 0 {
      return "";
    }
    unsafe { str::from_utf8_unchecked(slice::from_raw_parts(self.buffer, self.len)) }
  }

  /// Borrows the accumulated text including its NUL terminator.
  pub fn as_c_str(&self) -> &CStr {
    if self.cap == 0 {
      return Default::default();
    }
    unsafe { CStr::from_bytes_with_nul_unchecked(slice::from_raw_parts(self.buffer, self.len + 1)) }
  }
}

impl<'a> Drop for StringBuilder<'a> {
  fn drop(&mut self) {
    // Fixed and arena-backed buffers report NotImplemented; that is fine.
    if let Some(buffer) = NonNull::new(self.buffer) {
      if let Ok(layout) = alloc::array_layout::<u8>(self.cap) {
        let _ = unsafe { self.allocator.free(buffer, layout) };
      }
    }
  }
}
