use std::alloc::Layout;
use std::cell::Cell;
use std::cmp;
use std::mem;
use std::ptr::{self, NonNull};

use crate::alloc::Allocator;
use crate::os;
use crate::{Error, Result};

/// Number of bytes reserved per memory block, header included.
pub const PAGE_SIZE: usize = 4096;

/// Header of a single page-backed memory block. The byte buffer lives
/// directly after the header in the same reservation.
#[repr(C)]
struct Block {
  /// The previous block, likely already filled up.
  prev: Option<NonNull<Block>>,
  /// Bytes of the buffer currently handed out, alignment padding included.
  used: usize,
  /// Total bytes in the buffer, header excluded.
  size: usize,
}

const HEADER: usize = mem::size_of::<Block>();

/// Byte usage across every block owned by an arena, headers excluded.
#[derive(Clone, Copy, Debug)]
pub struct Usage {
  /// Bytes currently handed out.
  pub used: usize,
  /// Bytes available across all buffers.
  pub total: usize,
}

/// A region allocator backed by a chain of whole-page reservations.
///
/// Allocation bumps a cursor through the newest block, falling back to
/// older blocks and finally to a fresh reservation. Individual frees are
/// not supported; instead the most recent allocation of a block can be
/// extended or shrunk in place, and [`Arena::free_all`] releases every
/// block except the permanent first one. This makes repeated
/// build-then-reset cycles (such as a read-eval loop) allocation-free in
/// the steady state.
///
/// The arena is a single-threaded structure; it is deliberately neither
/// `Send` nor `Sync`.
pub struct Arena {
  /// Newest block, the one allocations are first attempted from.
  begin: Cell<NonNull<Block>>,
  /// Oldest block; survives [`Arena::free_all`].
  end: Cell<NonNull<Block>>,
}

/// Aligns `addr` upwards to `align`, which must be a power of two.
fn align_up(addr: usize, align: usize) -> usize {
  debug_assert!(align.is_power_of_two());
  (addr + align - 1) & !(align - 1)
}

/// Carves `size` bytes out of `block` if the aligned request fits.
///
/// Assumes `block` is live and exclusively reachable through the arena.
unsafe fn bump(block: *mut Block, size: usize, align: usize) -> Option<NonNull<u8>> {
  let base = block as usize + HEADER;
  let start = align_up(base + (*block).used, align);
  let end = start + size;
  if end <= base + (*block).size {
    // The new cursor is simply one-past-the-end of this allocation.
    (*block).used = end - base;
    NonNull::new(start as *mut u8)
  } else {
    None
  }
}

fn reserve_block(block_size: usize, prev: Option<NonNull<Block>>) -> Option<NonNull<Block>> {
  let page = os::reserve_page(block_size)?;
  let block = page.cast::<Block>();
  unsafe {
    block.as_ptr().write(Block {
      prev,
      used: 0,
      // The reservation includes the header.
      size: block_size - HEADER,
    });
  }
  Some(block)
}

unsafe fn release_block(block: NonNull<Block>) {
  let block_size = (*block.as_ptr()).size + HEADER;
  os::release_page(block.cast(), block_size);
}

impl Arena {
  /// Creates an arena holding a single block of [`PAGE_SIZE`] bytes.
  ///
  /// # Errors
  ///
  /// Fails with [`Error::OutOfMemory`] when the platform refuses the
  /// initial reservation.
  pub fn new() -> Result<Arena> {
    let block = reserve_block(PAGE_SIZE, None).ok_or(Error::OutOfMemory)?;
    Ok(Arena {
      begin: Cell::new(block),
      end: Cell::new(block),
    })
  }

  /// Hands out `size` bytes aligned to `align` (a power of two).
  ///
  /// Walks the chain from the newest block to the oldest; when no block
  /// can accommodate the request, a fresh block of
  /// `max(size + header, PAGE_SIZE)` bytes is reserved and chained in
  /// front.
  ///
  /// # Errors
  ///
  /// Fails with [`Error::OutOfMemory`] only when that reservation fails.
  pub fn alloc_raw(&self, size: usize, align: usize) -> Result<NonNull<u8>> {
    let mut cursor = Some(self.begin.get());
    while let Some(block) = cursor {
      unsafe {
        let block = block.as_ptr();
        // Skip blocks without a chance of accommodating the request.
        if (*block).used + size <= (*block).size {
          if let Some(data) = bump(block, size, align) {
            return Ok(data);
          }
        }
        cursor = (*block).prev;
      }
    }

    let block_size = cmp::max(size + HEADER, PAGE_SIZE);
    let block = reserve_block(block_size, Some(self.begin.get())).ok_or(Error::OutOfMemory)?;
    // The fresh block is the primary block from here on.
    self.begin.set(block);
    unsafe { bump(block.as_ptr(), size, align) }.ok_or(Error::OutOfMemory)
  }

  /// Resizes an allocation previously handed out by this arena.
  ///
  /// If `old_ptr` is the most recent allocation of its block, the slice
  /// is shrunk or extended in place whenever possible. Otherwise a fresh
  /// slice is handed out and the old contents are copied over.
  pub fn resize_raw(
    &self,
    old_ptr: NonNull<u8>,
    old_size: usize,
    new_size: usize,
    align: usize,
  ) -> Result<NonNull<u8>> {
    let old_addr = old_ptr.as_ptr() as usize;
    let mut cursor = Some(self.begin.get());
    while let Some(block) = cursor {
      unsafe {
        let block = block.as_ptr();
        let base = block as usize + HEADER;
        // Only the allocation whose end sits at the cursor can be
        // adjusted in place.
        let is_last = (*block).used >= old_size && old_addr == base + (*block).used - old_size;
        if !is_last {
          cursor = (*block).prev;
          continue;
        }

        if new_size <= old_size {
          // Shrinking just marks the excess as reusable.
          (*block).used -= old_size - new_size;
          return Ok(old_ptr);
        }

        let grown = (*block).used + (new_size - old_size);
        if grown <= (*block).size {
          (*block).used = grown;
          return Ok(old_ptr);
        }

        // Cannot extend here. Retire the old slice and fall through to a
        // fresh allocation, which may reuse this block's tail later.
        (*block).used -= old_size;
        break;
      }
    }

    let new_ptr = self.alloc_raw(new_size, align)?;
    // The fresh slice never overlaps the retired one.
    unsafe {
      ptr::copy_nonoverlapping(old_ptr.as_ptr(), new_ptr.as_ptr(), cmp::min(old_size, new_size));
    }
    Ok(new_ptr)
  }

  /// Releases every block except the permanent first one and resets its
  /// cursor. All outstanding allocations become invalid.
  pub fn free_all(&self) {
    let end = self.end.get();
    let mut cursor = self.begin.get();
    while cursor != end {
      unsafe {
        let prev = (*cursor.as_ptr()).prev;
        release_block(cursor);
        cursor = match prev {
          Some(prev) => prev,
          None => break,
        };
      }
    }
    unsafe { (*end.as_ptr()).used = 0 };
    self.begin.set(end);
  }

  /// Sums `used` and `size` over the chain; buffer bytes only, headers
  /// excluded.
  pub fn usage(&self) -> Usage {
    let mut usage = Usage { used: 0, total: 0 };
    let mut cursor = Some(self.begin.get());
    while let Some(block) = cursor {
      unsafe {
        usage.used += (*block.as_ptr()).used;
        usage.total += (*block.as_ptr()).size;
        cursor = (*block.as_ptr()).prev;
      }
    }
    usage
  }

  /// Address of the newest block, for usage reports.
  pub fn begin_ptr(&self) -> *const u8 {
    self.begin.get().as_ptr() as *const u8
  }

  /// Address of the oldest (permanent) block, for usage reports.
  pub fn end_ptr(&self) -> *const u8 {
    self.end.get().as_ptr() as *const u8
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    let mut cursor = Some(self.begin.get());
    while let Some(block) = cursor {
      unsafe {
        let prev = (*block.as_ptr()).prev;
        release_block(block);
        cursor = prev;
      }
    }
  }
}

impl Allocator for Arena {
  fn alloc(&self, layout: Layout) -> Result<NonNull<u8>> {
    self.alloc_raw(layout.size(), layout.align())
  }

  fn resize(&self, old_ptr: NonNull<u8>, old_layout: Layout, new_size: usize)
    -> Result<NonNull<u8>>
  {
    self.resize_raw(old_ptr, old_layout.size(), new_size, old_layout.align())
  }

  // Individual frees are intentionally a no-op; reclamation happens in
  // bulk through `free_all`.
  unsafe fn free(&self, _ptr: NonNull<u8>, _layout: Layout) -> Result<()> {
    Err(Error::NotImplemented)
  }

  fn free_all(&self) -> Result<()> {
    Arena::free_all(self);
    Ok(())
  }
}
