use std::ptr::{self, NonNull};

use winapi::um::memoryapi::{VirtualAlloc, VirtualFree};
use winapi::um::winnt::{MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE};

/// Reserves `size` bytes of zeroed, readable and writable memory from the
/// kernel. Returns `None` when the allocation cannot be established.
pub fn reserve_page(size: usize) -> Option<NonNull<u8>> {
  let data =
    unsafe { VirtualAlloc(ptr::null_mut(), size, MEM_RESERVE | MEM_COMMIT, PAGE_READWRITE) };
  NonNull::new(data as *mut u8)
}

/// Returns a reservation obtained from [`reserve_page`].
///
/// # Safety
///
/// `page` must be a live reservation; it must not be used afterwards.
pub unsafe fn release_page(page: NonNull<u8>, _size: usize) {
  // MEM_RELEASE requires the size to be zero.
  let ok = VirtualFree(page.as_ptr() as *mut _, 0, MEM_RELEASE);
  debug_assert_ne!(ok, 0, "releasing page: VirtualFree failed");
}
