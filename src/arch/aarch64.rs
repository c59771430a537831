//! aarch64 (AAPCS64) context switching.

use core::arch::naked_asm;

use crate::arch::{EntryFn, FinishFn};

/// Callee-saved register snapshot for a suspended context: x19-x28, the
/// frame pointer and link register, the stack pointer, a resume address and
/// the callee-saved low halves of v8-v15 (d8-d15).
#[repr(C)]
#[derive(Debug, Default)]
pub struct SavedRegs {
    sp: u64,     // 0x00
    pc: u64,     // 0x08
    x19: u64,    // 0x10
    x20: u64,    // 0x18
    x21: u64,    // 0x20
    x22: u64,    // 0x28
    x23: u64,    // 0x30
    x24: u64,    // 0x38
    x25: u64,    // 0x40
    x26: u64,    // 0x48
    x27: u64,    // 0x50
    x28: u64,    // 0x58
    fp: u64,     // 0x60
    lr: u64,     // 0x68
    d: [u64; 8], // 0x70: d8-d15
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
    // sp must stay 16-byte aligned at all times on aarch64.
    regs.sp = (stack_top as u64) & !0xF;
    regs.pc = trampoline as usize as u64;
    regs.x19 = entry as usize as u64;
    regs.x20 = arg as u64;
    regs.x21 = finish as usize as u64;
    regs.x22 = 0;
    regs.x23 = 0;
    regs.x24 = 0;
    regs.x25 = 0;
    regs.x26 = 0;
    regs.x27 = 0;
    regs.x28 = 0;
    regs.fp = 0; // top of the call chain
    regs.lr = 0;
    regs.d = [0; 8];
}

/// First frame of every coroutine stack. `entry`, its argument and the
/// finalization hook arrive in x19/x20/x21 straight from the restored
/// [`SavedRegs`]; the hook must never return.
#[unsafe(naked)]
unsafe extern "C" fn trampoline() {
    naked_asm!(
        "mov x0, x20",
        "blr x19",
        "blr x21",
        "brk #0x1",
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
        // Spill the callee-saved file to save (x0), with the resume point.
        "mov x9, sp",
        "str x9, [x0, #0x00]",
        "adr x9, 1f",
        "str x9, [x0, #0x08]",
        "stp x19, x20, [x0, #0x10]",
        "stp x21, x22, [x0, #0x20]",
        "stp x23, x24, [x0, #0x30]",
        "stp x25, x26, [x0, #0x40]",
        "stp x27, x28, [x0, #0x50]",
        "stp x29, x30, [x0, #0x60]",
        "stp d8, d9, [x0, #0x70]",
        "stp d10, d11, [x0, #0x80]",
        "stp d12, d13, [x0, #0x90]",
        "stp d14, d15, [x0, #0xa0]",
        // Load the target's file from restore (x1) and jump in.
        "ldr x9, [x1, #0x00]",
        "mov sp, x9",
        "ldr x10, [x1, #0x08]",
        "ldp x19, x20, [x1, #0x10]",
        "ldp x21, x22, [x1, #0x20]",
        "ldp x23, x24, [x1, #0x30]",
        "ldp x25, x26, [x1, #0x40]",
        "ldp x27, x28, [x1, #0x50]",
        "ldp x29, x30, [x1, #0x60]",
        "ldp d8, d9, [x1, #0x70]",
        "ldp d10, d11, [x1, #0x80]",
        "ldp d12, d13, [x1, #0x90]",
        "ldp d14, d15, [x1, #0xa0]",
        "br x10",
        // Resume point for the saved context: x30 holds the original return
        // address again.
        "1:",
        "ret",
    );
}
