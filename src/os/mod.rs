//! Platform primitives for reserving and releasing whole pages of memory.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use self::unix::{release_page, reserve_page};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use self::windows::{release_page, reserve_page};

#[cfg(not(any(unix, windows)))]
mod fallback;
#[cfg(not(any(unix, windows)))]
pub use self::fallback::{release_page, reserve_page};
