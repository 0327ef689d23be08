use super::EntryFn;
use std::arch::global_asm;

/// Callee-saved state of AAPCS64: x19-x28, frame pointer, link register, sp
/// and the low halves of v8-v15.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct Registers {
    x19_x28: [u64; 10],
    fp: u64,
    lr: u64,
    sp: u64,
    d8_d15: [u64; 8],
}

impl Registers {
    /// # Safety
    ///
    /// Nothing is written to the stack on aarch64, the entry point travels in
    /// the link register.
    pub(super) unsafe fn launch(floor: usize, entry: EntryFn) -> Self {
        Self {
            lr: entry as usize as u64,
            sp: floor as u64,
            ..Default::default()
        }
    }

    pub(super) fn stack_pointer(&self) -> usize {
        self.sp as usize
    }
}

global_asm!(
    ".text",
    ".global heapros_switch",
    ".type heapros_switch, %function",
    ".p2align 2",
    "heapros_switch:",
    "stp x19, x20, [x0, #0x00]",
    "stp x21, x22, [x0, #0x10]",
    "stp x23, x24, [x0, #0x20]",
    "stp x25, x26, [x0, #0x30]",
    "stp x27, x28, [x0, #0x40]",
    "stp x29, x30, [x0, #0x50]",
    "mov x9, sp",
    "str x9, [x0, #0x60]",
    "stp d8, d9, [x0, #0x68]",
    "stp d10, d11, [x0, #0x78]",
    "stp d12, d13, [x0, #0x88]",
    "stp d14, d15, [x0, #0x98]",
    "ldp x19, x20, [x1, #0x00]",
    "ldp x21, x22, [x1, #0x10]",
    "ldp x23, x24, [x1, #0x20]",
    "ldp x25, x26, [x1, #0x30]",
    "ldp x27, x28, [x1, #0x40]",
    "ldp x29, x30, [x1, #0x50]",
    "ldr x9, [x1, #0x60]",
    "mov sp, x9",
    "ldp d8, d9, [x1, #0x68]",
    "ldp d10, d11, [x1, #0x78]",
    "ldp d12, d13, [x1, #0x88]",
    "ldp d14, d15, [x1, #0x98]",
    "ret",
    ".size heapros_switch, . - heapros_switch",
);
