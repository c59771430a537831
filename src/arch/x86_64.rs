//! x86_64 (System V) context switching.

use core::arch::naked_asm;

use crate::arch::{EntryFn, FinishFn};

/// Callee-saved register snapshot for a suspended context.
///
/// Only the registers the System V AMD64 ABI requires a callee to preserve
/// are kept; everything else is dead across the `switch_context` call
/// boundary by construction.
#[repr(C)]
#[derive(Debug, Default)]
pub struct SavedRegs {
    rsp: u64, // 0x00
    rip: u64, // 0x08
    rbx: u64, // 0x10
    rbp: u64, // 0x18
    r12: u64, // 0x20
    r13: u64, // 0x28
    r14: u64, // 0x30
    r15: u64, // 0x38
}

/// Prepares `regs` so the first switch into it enters [`trampoline`] on the
/// given stack, which calls `entry(arg)` and then `finish()`.
///
/// # Safety
///
/// `stack_top` must point one past the end of a live, writable stack region.
pub unsafe fn init_context(
    regs: &mut SavedRegs,
    stack_top: *mut u8,
    entry: EntryFn,
    arg: usize,
    finish: FinishFn,
) {
    // 16-byte aligned at the trampoline, so rsp % 16 == 8 inside `entry`
    // after its call, as the ABI requires.
    regs.rsp = (stack_top as u64) & !0xF;
    regs.rip = trampoline as usize as u64;
    regs.rbx = 0;
    regs.rbp = 0; // top of the call chain
    regs.r12 = entry as usize as u64;
    regs.r13 = arg as u64;
    regs.r14 = finish as usize as u64;
    regs.r15 = 0;
}

/// First frame of every coroutine stack. `entry` and its argument arrive in
/// r12/r13 straight from the restored [`SavedRegs`]; the finalization hook in
/// r14 must never return.
#[unsafe(naked)]
unsafe extern "C" fn trampoline() {
    naked_asm!(
        "mov rdi, r13",
        "call r12",
        "call r14",
        "ud2",
    );
}

/// Saves the caller's callee-saved registers into `save` and resumes the
/// context captured in `restore`, exactly at its previous switch point.
///
/// # Safety
///
/// `restore` must hold a snapshot produced by `init_context` or by an
/// earlier pass through this function; its stack must still be mapped.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(_save: *mut SavedRegs, _restore: *const SavedRegs) {
    naked_asm!(
        // Spill the callee-saved file to save (rdi), with the resume point.
        "mov [rdi + 0x00], rsp",
        "lea rax, [rip + 1f]",
        "mov [rdi + 0x08], rax",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], rbp",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], r13",
        "mov [rdi + 0x30], r14",
        "mov [rdi + 0x38], r15",
        // Load the target's file from restore (rsi) and jump in.
        "mov rsp, [rsi + 0x00]",
        "mov rax, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov rbp, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov r13, [rsi + 0x28]",
        "mov r14, [rsi + 0x30]",
        "mov r15, [rsi + 0x38]",
        "jmp rax",
        // Resume point for the saved context: rsp holds the original return
        // address again.
        "1:",
        "ret",
    );
}
