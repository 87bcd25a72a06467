use std::ptr::{self, NonNull};

/// Reserves `size` bytes of zeroed, readable and writable memory from the
/// kernel. Returns `None` when the mapping cannot be established.
pub fn reserve_page(size: usize) -> Option<NonNull<u8>> {
  let data = unsafe {
    libc::mmap(
      ptr::null_mut(),
      size,
      libc::PROT_READ | libc::PROT_WRITE,
      libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
      -1,
      0,
    )
  };

  // `mmap` *can* technically map address zero, but not without MAP_FIXED.
  if data == libc::MAP_FAILED {
    None
  } else {
    NonNull::new(data as *mut u8)
  }
}

/// Returns a reservation of `size` bytes obtained from [`reserve_page`].
///
/// # Safety
///
/// `page` must be a live reservation of exactly `size` bytes; it must not
/// be used afterwards.
pub unsafe fn release_page(page: NonNull<u8>, size: usize) {
  let result = libc::munmap(page.as_ptr() as *mut libc::c_void, size);
  debug_assert_eq!(result, 0, "releasing page: bad address or length");
}
