//! The C `errno` error channel.
//!
//! Native backends report failure details through `errno`. The value is
//! thread-local, so reads and writes here only observe calls made on the
//! current thread.

#[cfg(target_os = "linux")]
use libc::__errno_location as errno_location;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "tvos",
    target_os = "watchos",
    target_os = "freebsd"
))]
use libc::__error as errno_location;

#[cfg(any(target_os = "android", target_os = "openbsd", target_os = "netbsd"))]
use libc::__errno as errno_location;

/// Read the current thread's `errno`.
#[must_use]
pub fn get() -> i32 {
    // SAFETY: errno_location returns a valid pointer to the calling
    // thread's errno for the lifetime of the thread.
    unsafe { *errno_location() }
}

/// Set the current thread's `errno`.
pub fn set(code: i32) {
    // SAFETY: see `get`; errno is a plain thread-local int.
    unsafe {
        *errno_location() = code;
    }
}

/// Reset `errno` to 0 ("no error").
pub fn clear() {
    set(0);
}
