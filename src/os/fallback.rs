use std::alloc::{self, Layout};
use std::ptr::NonNull;

// The system allocator makes no page-alignment promises, but it keeps the
// arena functional on targets without a virtual memory API.
const RESERVE_ALIGN: usize = 16;

/// Reserves `size` bytes of zeroed memory from the system allocator.
pub fn reserve_page(size: usize) -> Option<NonNull<u8>> {
  let layout = Layout::from_size_align(size, RESERVE_ALIGN).ok()?;
  NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
}

/// Returns a reservation of `size` bytes obtained from [`reserve_page`].
///
/// # Safety
///
/// `page` must be a live reservation of exactly `size` bytes; it must not
/// be used afterwards.
pub unsafe fn release_page(page: NonNull<u8>, size: usize) {
  if let Ok(layout) = Layout::from_size_align(size, RESERVE_ALIGN) {
    alloc::dealloc(page.as_ptr(), layout);
  }
}
