//! Architecture-specific context transfer.
//!
//! Each supported target provides a [`SavedRegs`] snapshot of the
//! callee-saved register file, a `switch_context` routine that suspends the
//! caller and resumes a saved snapshot, and an `init_context` routine that
//! prepares a fresh snapshot so the first switch-in enters a small assembly
//! trampoline. The trampoline calls `entry(arg)` on the new stack and, when
//! `entry` returns, a finalization hook that must never return.

/// Entry function invoked by the trampoline on the first switch into a
/// context. Runs on the context's own stack. Must not unwind.
pub type EntryFn = extern "C" fn(usize);

/// Hook the trampoline calls after the entry function returns. Must switch
/// away and never return; the trampoline traps if it ever does.
pub type FinishFn = extern "C" fn() -> !;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        mod x86_64;
        pub use x86_64::{init_context, switch_context, SavedRegs};
    } else if #[cfg(target_arch = "aarch64")] {
        mod aarch64;
        pub use aarch64::{init_context, switch_context, SavedRegs};
    } else {
        compile_error!("unsupported target architecture");
    }
}
