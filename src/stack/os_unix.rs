use std::fmt;
use std::io;
use std::ptr::null_mut;

use crate::config::MIN_STACK_SIZE;
use crate::error::{Error, Result};
use crate::stack::{account_alloc, account_release, Stack};

/// An `mmap`-backed coroutine stack with a guard page below the usable
/// region.
///
/// The whole mapping is reserved inaccessible first and the usable window is
/// then made readable and writable, so the lowest page stays `PROT_NONE` and
/// an overflow faults immediately.
pub struct OsStack {
    start: *mut u8, // base of the mapping, i.e. the guard page
    mmap_len: usize,
    guard: usize,
}

impl OsStack {
    /// Reserves a new stack with at least `size` usable bytes, rounded up to
    /// the page size. Sizes below [`MIN_STACK_SIZE`] are clamped up.
    pub fn new(size: usize) -> Result<OsStack> {
        let page = PageSize::get()?;
        let size = page.round(size.max(MIN_STACK_SIZE));
        let guard = page.size();
        let mmap_len = size + guard;

        // OpenBSD insists on MAP_STACK for anything used as a stack; the
        // other BSDs and Linux merely accept it.
        cfg_if::cfg_if! {
            if #[cfg(any(
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "linux",
                target_os = "netbsd",
                target_os = "openbsd",
            ))] {
                const FLAGS: libc::c_int =
                    libc::MAP_ANONYMOUS | libc::MAP_PRIVATE | libc::MAP_STACK;
            } else {
                const FLAGS: libc::c_int = libc::MAP_ANONYMOUS | libc::MAP_PRIVATE;
            }
        }

        unsafe {
            let start = libc::mmap(null_mut(), mmap_len, libc::PROT_NONE, FLAGS, -1, 0);
            if start == libc::MAP_FAILED {
                return Err(Error::Allocation(io::Error::last_os_error()));
            }

            // Construct before mprotect so the mapping is unmapped again if
            // opening the usable window fails.
            let out = OsStack {
                start: start as *mut u8,
                mmap_len,
                guard,
            };
            account_alloc(mmap_len);

            if libc::mprotect(
                out.start.add(guard).cast(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
            ) != 0
            {
                return Err(Error::Allocation(io::Error::last_os_error()));
            }

            Ok(out)
        }
    }
}

impl Drop for OsStack {
    fn drop(&mut self) {
        let ret = unsafe { libc::munmap(self.start.cast(), self.mmap_len) };
        debug_assert_eq!(ret, 0);
        account_release(self.mmap_len);
    }
}

unsafe impl Stack for OsStack {
    fn end(&self) -> *mut usize {
        // Page-aligned, which satisfies every supported stack ABI.
        unsafe { self.start.add(self.mmap_len) }.cast()
    }

    fn size(&self) -> usize {
        self.mmap_len - self.guard
    }
}

impl fmt::Debug for OsStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OsStack<{:x}-{:x}>",
            self.start as usize,
            self.end() as usize
        )
    }
}

/// A value holding the operating system's standard page size (probably 4k).
#[repr(transparent)]
#[derive(Clone, Copy, Debug)]
pub struct PageSize(usize);

impl PageSize {
    pub fn get() -> Result<PageSize> {
        match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
            -1 => Err(Error::Allocation(io::Error::last_os_error())),
            size => Ok(PageSize(size as usize)),
        }
    }

    pub fn size(self) -> usize {
        self.0
    }

    /// Rounds `size` up to the nearest page boundary.
    pub fn round(self, size: usize) -> usize {
        (size + self.0 - 1) & !(self.0 - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_rounding() {
        let page = PageSize::get().unwrap();
        let ps = page.size();
        assert!(ps.is_power_of_two());
        assert_eq!(page.round(1), ps);
        assert_eq!(page.round(ps), ps);
        assert_eq!(page.round(ps + 1), 2 * ps);
    }

    #[test]
    fn guard_page_excluded_from_size() {
        let s = OsStack::new(MIN_STACK_SIZE).unwrap();
        let page = PageSize::get().unwrap().size();
        assert_eq!(s.size() % page, 0);
        assert_eq!(s.end() as usize - s.size(), s.start as usize + s.guard);
    }
}
