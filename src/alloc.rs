use std::alloc::{self as sys, handle_alloc_error, Layout};
use std::ptr::NonNull;

use crate::{Error, Result};

/// A polymorphic allocation capability.
///
/// Every container in this crate allocates through a `&dyn Allocator`
/// handle rather than a concrete backend, so the same code can run over
/// the process heap, an [`Arena`](crate::Arena) or a caller-provided
/// fixed buffer.
///
/// `free` and `free_all` are defined-but-optional operations: a backend
/// that does not support them reports [`Error::NotImplemented`] and
/// callers must tolerate that signal.
pub trait Allocator {
  /// Allocates `layout.size()` bytes aligned to `layout.align()`.
  fn alloc(&self, layout: Layout) -> Result<NonNull<u8>>;

  /// Grows or shrinks an existing allocation to `new_size` bytes,
  /// preserving the old contents. The returned pointer may differ from
  /// `old_ptr`.
  fn resize(&self, old_ptr: NonNull<u8>, old_layout: Layout, new_size: usize)
    -> Result<NonNull<u8>>;

  /// Releases a single allocation.
  ///
  /// # Safety
  ///
  /// `ptr` must denote an allocation obtained from this allocator with
  /// this `layout`, and must not be used afterwards.
  unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) -> Result<()> {
    let _ = (ptr, layout);
    Err(Error::NotImplemented)
  }

  /// Releases every live allocation at once.
  fn free_all(&self) -> Result<()> {
    Err(Error::NotImplemented)
  }
}

// Zero-size requests bypass the system allocator entirely.
fn dangling(layout: Layout) -> NonNull<u8> {
  // An alignment is always nonzero.
  unsafe { NonNull::new_unchecked(layout.align() as *mut u8) }
}

/// The process heap. Reports [`Error::OutOfMemory`] on exhaustion and
/// does not implement `free_all`.
pub struct Heap;

/// Stateless global instance of [`Heap`].
pub static HEAP: Heap = Heap;

impl Allocator for Heap {
  fn alloc(&self, layout: Layout) -> Result<NonNull<u8>> {
    if layout.size() == 0 {
      return Ok(dangling(layout));
    }
    NonNull::new(unsafe { sys::alloc(layout) }).ok_or(Error::OutOfMemory)
  }

  fn resize(&self, old_ptr: NonNull<u8>, old_layout: Layout, new_size: usize)
    -> Result<NonNull<u8>>
  {
    if old_layout.size() == 0 {
      let layout = Layout::from_size_align(new_size, old_layout.align())
        .map_err(|_| Error::OutOfMemory)?;
      return self.alloc(layout);
    }
    if new_size == 0 {
      unsafe { self.free(old_ptr, old_layout)? };
      return Ok(dangling(old_layout));
    }
    NonNull::new(unsafe { sys::realloc(old_ptr.as_ptr(), old_layout, new_size) })
      .ok_or(Error::OutOfMemory)
  }

  unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) -> Result<()> {
    if layout.size() != 0 {
      sys::dealloc(ptr.as_ptr(), layout);
    }
    Ok(())
  }
}

/// The process heap, except exhaustion aborts the process instead of
/// surfacing [`Error::OutOfMemory`].
pub struct PanicHeap;

/// Stateless global instance of [`PanicHeap`].
pub static PANIC_HEAP: PanicHeap = PanicHeap;

impl Allocator for PanicHeap {
  fn alloc(&self, layout: Layout) -> Result<NonNull<u8>> {
    match HEAP.alloc(layout) {
      Err(Error::OutOfMemory) => handle_alloc_error(layout),
      other => other,
    }
  }

  fn resize(&self, old_ptr: NonNull<u8>, old_layout: Layout, new_size: usize)
    -> Result<NonNull<u8>>
  {
    match HEAP.resize(old_ptr, old_layout, new_size) {
      Err(Error::OutOfMemory) => handle_alloc_error(old_layout),
      other => other,
    }
  }

  unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) -> Result<()> {
    HEAP.free(ptr, layout)
  }
}

/// An allocator that refuses every request.
///
/// Useful for containers that require an allocator handle but run over
/// fixed-size memory, e.g. [`StringBuilder::fixed`](crate::StringBuilder::fixed):
/// the first write past the buffer surfaces [`Error::NotImplemented`]
/// instead of growing.
pub struct Nil;

/// Stateless global instance of [`Nil`].
pub static NIL: Nil = Nil;

impl Allocator for Nil {
  fn alloc(&self, _layout: Layout) -> Result<NonNull<u8>> {
    Err(Error::NotImplemented)
  }

  fn resize(&self, _old_ptr: NonNull<u8>, _old_layout: Layout, _new_size: usize)
    -> Result<NonNull<u8>>
  {
    Err(Error::NotImplemented)
  }

  // Nothing was ever handed out, so releasing is trivially fine.
  unsafe fn free(&self, _ptr: NonNull<u8>, _layout: Layout) -> Result<()> {
    Ok(())
  }

  fn free_all(&self) -> Result<()> {
    Ok(())
  }
}

pub(crate) fn array_layout<T>(count: usize) -> Result<Layout> {
  Layout::array::<T>(count).map_err(|_| Error::OutOfMemory)
}

/// Allocates an uninitialized array of `count` values of `T`, sized and
/// aligned for `T`.
pub fn alloc_array<T>(allocator: &dyn Allocator, count: usize) -> Result<NonNull<T>> {
  Ok(allocator.alloc(array_layout::<T>(count)?)?.cast())
}

/// Resizes an array previously obtained from [`alloc_array`]. Contents up
/// to the smaller of the two counts are preserved.
pub fn resize_array<T>(
  allocator: &dyn Allocator,
  old_ptr: NonNull<T>,
  old_count: usize,
  new_count: usize,
) -> Result<NonNull<T>> {
  let old_layout = array_layout::<T>(old_count)?;
  let new_layout = array_layout::<T>(new_count)?;
  Ok(allocator.resize(old_ptr.cast(), old_layout, new_layout.size())?.cast())
}

/// Releases an array previously obtained from [`alloc_array`]. Backends
/// without individual frees are tolerated.
///
/// # Safety
///
/// `ptr` must denote a live array of `count` values of `T` obtained from
/// `allocator`, and must not be used afterwards.
pub unsafe fn free_array<T>(allocator: &dyn Allocator, ptr: NonNull<T>, count: usize) {
  if let Ok(layout) = array_layout::<T>(count) {
    let _ = allocator.free(ptr.cast(), layout);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn heap_round_trips_an_allocation() -> crate::Result<()> {
    let layout = Layout::from_size_align(64, 8).unwrap();
    let ptr = HEAP.alloc(layout)?;
    unsafe {
      ptr.as_ptr().write_bytes(0xAB, 64);
      assert_eq!(*ptr.as_ptr().add(63), 0xAB);
      HEAP.free(ptr, layout)?;
    }
    Ok(())
  }

  #[test]
  fn heap_resize_preserves_contents() -> crate::Result<()> {
    let old_layout = Layout::from_size_align(8, 1).unwrap();
    let ptr = HEAP.alloc(old_layout)?;
    unsafe {
      ptr.as_ptr().write_bytes(0x5A, 8);
      let grown = HEAP.resize(ptr, old_layout, 256)?;
      assert_eq!(*grown.as_ptr(), 0x5A);
      assert_eq!(*grown.as_ptr().add(7), 0x5A);
      HEAP.free(grown, Layout::from_size_align(256, 1).unwrap())?;
    }
    Ok(())
  }

  #[test]
  fn heap_does_not_implement_free_all() {
    assert!(matches!(HEAP.free_all(), Err(Error::NotImplemented)));
  }

  #[test]
  fn nil_refuses_allocation_requests() {
    let layout = Layout::from_size_align(8, 8).unwrap();
    assert!(matches!(NIL.alloc(layout), Err(Error::NotImplemented)));
  }

  #[test]
  fn typed_helpers_scale_by_element() -> crate::Result<()> {
    let ptr = alloc_array::<u64>(&HEAP, 4)?;
    assert_eq!(ptr.as_ptr() as usize % std::mem::align_of::<u64>(), 0);
    let ptr = resize_array(&HEAP, ptr, 4, 8)?;
    unsafe { free_array(&HEAP, ptr, 8) };
    Ok(())
  }
}
