use super::EntryFn;
use std::arch::global_asm;

/// Default MXCSR: all exceptions masked, round to nearest.
const DEFAULT_MXCSR: u32 = 0x1f80;

/// Default x87 control word: all exceptions masked, 64-bit precision.
const DEFAULT_FPU_CW: u16 = 0x037f;

/// Callee-saved state of the System V x86_64 ABI. The resume address is not
/// stored here: `call` pushes it right at `rsp`, which puts it inside the
/// stack snapshot.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct Registers {
    rsp: u64,
    rbp: u64,
    rbx: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
    mxcsr: u32,
    fpu_cw: u16,
    _pad: u16,
}

impl Registers {
    /// # Safety
    ///
    /// Writes the initial return frame into the 16 bytes below `floor`.
    pub(super) unsafe fn launch(floor: usize, entry: EntryFn) -> Self {
        // `ret` pops `entry`, leaving rsp == floor - 8, which is what a callee
        // expects right after a `call`. The fake return address above it is
        // null so unwinders stop there.
        let slot = (floor - 16) as *mut u64;
        unsafe {
            slot.write(entry as usize as u64);
            slot.add(1).write(0);
        }

        Self {
            rsp: slot as u64,
            mxcsr: DEFAULT_MXCSR,
            fpu_cw: DEFAULT_FPU_CW,
            ..Default::default()
        }
    }

    pub(super) fn stack_pointer(&self) -> usize {
        self.rsp as usize
    }
}

global_asm!(
    ".text",
    ".global heapros_switch",
    ".type heapros_switch, @function",
    ".p2align 4",
    "heapros_switch:",
    "mov [rdi + 0x00], rsp",
    "mov [rdi + 0x08], rbp",
    "mov [rdi + 0x10], rbx",
    "mov [rdi + 0x18], r12",
    "mov [rdi + 0x20], r13",
    "mov [rdi + 0x28], r14",
    "mov [rdi + 0x30], r15",
    "stmxcsr dword ptr [rdi + 0x38]",
    "fnstcw word ptr [rdi + 0x3c]",
    "mov rsp, [rsi + 0x00]",
    "mov rbp, [rsi + 0x08]",
    "mov rbx, [rsi + 0x10]",
    "mov r12, [rsi + 0x18]",
    "mov r13, [rsi + 0x20]",
    "mov r14, [rsi + 0x28]",
    "mov r15, [rsi + 0x30]",
    "ldmxcsr dword ptr [rsi + 0x38]",
    "fldcw word ptr [rsi + 0x3c]",
    // Launched contexts pop their entry point, resumed ones return into the
    // `switch` call that suspended them.
    "ret",
    ".size heapros_switch, . - heapros_switch",
);
