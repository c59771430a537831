//! Coroutine stack allocation.
//!
//! Stacks are fixed-size memory regions reserved per context and released
//! exactly once when the context is deleted. Each region is guarded below by
//! an inaccessible page so an overflow faults instead of corrupting the
//! neighbouring mapping.

use std::cell::Cell;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod os_unix;
        pub use os_unix::{OsStack, PageSize};
    } else {
        compile_error!("unsupported target platform");
    }
}

/// A region of memory usable as a call stack.
///
/// # Safety
///
/// * `end()` must return a pointer one past the highest usable address,
///   aligned as the target's calling convention requires for a stack.
/// * The region `end() - size() .. end()` must stay valid and writable for
///   the lifetime of the value.
pub unsafe trait Stack {
    /// Returns a pointer past the end of the stack.
    fn end(&self) -> *mut usize;

    /// Usable size of the stack in bytes, excluding any guard page.
    fn size(&self) -> usize;
}

thread_local! {
    static LIVE_BYTES: Cell<usize> = const { Cell::new(0) };
    static LIVE_STACKS: Cell<usize> = const { Cell::new(0) };
}

/// Mapped stack bytes currently live on this thread, guard pages included.
///
/// Stacks never move between threads, so the accounting is kept per thread
/// and stays deterministic when several test threads allocate at once.
pub fn allocated_bytes() -> usize {
    LIVE_BYTES.with(|c| c.get())
}

/// Number of stacks currently live on this thread.
pub fn allocated_stacks() -> usize {
    LIVE_STACKS.with(|c| c.get())
}

fn account_alloc(bytes: usize) {
    LIVE_BYTES.with(|c| c.set(c.get() + bytes));
    LIVE_STACKS.with(|c| c.set(c.get() + 1));
}

fn account_release(bytes: usize) {
    // try_with: stacks owned by the registry are dropped during thread-local
    // teardown, possibly after these cells are gone.
    let _ = LIVE_BYTES.try_with(|c| c.set(c.get() - bytes));
    let _ = LIVE_STACKS.try_with(|c| c.set(c.get() - 1));
}
