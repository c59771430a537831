//! Stack size defaults, with a runtime environment override.

use std::sync::OnceLock;

/// Default coroutine stack size in bytes (64 KiB).
pub const DEFAULT_STACK_SIZE: usize = 1 << 16;

/// Smallest usable stack size. Requests below this are rounded up, never
/// rejected. Two pages: enough for the entry trampoline and a switch back
/// out even in unoptimized builds.
pub const MIN_STACK_SIZE: usize = 8192;

/// Default stack size, honouring the `COSTACK_STACK_SIZE` environment
/// variable (bytes). The variable is read once per process; malformed values
/// fall back to [`DEFAULT_STACK_SIZE`].
pub fn default_stack_size() -> usize {
    static SIZE: OnceLock<usize> = OnceLock::new();
    *SIZE.get_or_init(|| {
        std::env::var("COSTACK_STACK_SIZE")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_STACK_SIZE)
    })
}
