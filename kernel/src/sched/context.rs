//! Context switching seam
//!
//! The nucleus never performs the register save/restore itself. It
//! prepares a `Resume` (which process, which stack pointer, which EAX
//! value) and hands it to the embedder's `ContextSwitch` implementation,
//! which runs the process until control re-enters the kernel and reports
//! back the decoded `Request`. On bare metal that implementation is the
//! interrupt plumbing; on a host it is a process simulator.
//!
//! This module also owns the layout of the fabricated context frame that
//! both process creation and signal delivery push onto user stacks.

use crate::config::{CODE_SELECTOR, EFLAGS_USER};
use crate::drivers::IoctlRequest;
use crate::mm::MemoryPool;
use crate::sched::task::Pid;
use crate::sched::Kernel;

/// Size in bytes of the saved-register context frame: eight general
/// registers plus the iret triple (eip, cs, eflags), each 32 bits.
pub const CONTEXT_FRAME_SIZE: usize = 44;

/// Offsets of the frame fields the kernel actually writes.
pub const FRAME_EBP: usize = 8;
pub const FRAME_EIP: usize = 32;
pub const FRAME_CS: usize = 36;
pub const FRAME_EFLAGS: usize = 40;

/// Write a fresh context frame at `esp` that resumes execution at `eip`
/// with an empty register file.
pub(crate) fn write_initial_frame(mem: &mut MemoryPool, esp: usize, eip: u32) {
    mem.zero(esp, CONTEXT_FRAME_SIZE);
    mem.write_u32(esp + FRAME_EBP, (esp + CONTEXT_FRAME_SIZE) as u32);
    mem.write_u32(esp + FRAME_EIP, eip);
    mem.write_u32(esp + FRAME_CS, CODE_SELECTOR);
    mem.write_u32(esp + FRAME_EFLAGS, EFLAGS_USER);
}

/// A kernel event to service: one decoded system call or one hardware
/// interrupt. Every variant corresponds to a register-level request the
/// context switcher captured on kernel entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Create { entry: usize, stack_size: usize },
    Yield,
    Stop,
    GetPid,
    Puts { addr: usize },
    Kill { pid: Pid, signal: i32 },
    SetPriority { priority: i32 },
    Send { dest: Pid, word: u32 },
    Recv { from_ptr: usize, word_ptr: usize },
    Sleep { ms: u32 },
    GetCpuTimes { addr: usize },
    SigHandler { signal: i32, handler: usize, old_handler_ptr: usize },
    SigReturn { old_sp: usize },
    Wait { pid: Pid },
    Open { device: i32 },
    Close { fd: i32 },
    Write { fd: i32, buf: usize, len: usize },
    Read { fd: i32, buf: usize, len: usize },
    Ioctl { fd: i32, req: IoctlRequest },
    TimerInterrupt,
    KeyboardInterrupt,
}

/// What the context switcher needs to resume a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resume {
    /// Process being resumed; PID 0 is the idle process.
    pub pid: Pid,
    /// Saved stack pointer to switch to.
    pub esp: usize,
    /// Value the process sees in EAX, the result of its last request.
    pub result_code: i32,
}

/// The context-switch primitive supplied by the embedder.
pub trait ContextSwitch {
    /// Resume the process described by `resume` and run it until control
    /// returns to the kernel by system call or interrupt. Returns the
    /// decoded request. The kernel is available for user-memory access.
    fn resume(&mut self, kernel: &mut Kernel, resume: Resume) -> Request;
}
