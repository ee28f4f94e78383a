//! Signal infrastructure
//!
//! The kernel supports 32 signals per process, numbered 0 to 31, where a
//! larger number means higher priority. Signal 31 is the hard kill: its
//! handler is pinned to the process-exit stub and cannot be reassigned.
//! For all other signals a `None` handler means the signal is ignored,
//! and ignored signals are dropped at post time without waking anyone.
//!
//! Delivery happens just before a process is resumed: the highest
//! pending signal above the process's current handling level gets a
//! fabricated context frame spliced onto its stack, so the resumption
//! lands in the user-space trampoline, which calls the handler and then
//! issues sigreturn. A higher-priority signal may interrupt a running
//! handler the same way; equal or lower signals wait for sigreturn to
//! restore the previous level.
//!
//! Posting a signal at a process blocked in a system call pulls it off
//! its blocked queue; the interrupted call reports back through the
//! result codes of the syscall ABI.

use crate::config::{CODE_SELECTOR, EFLAGS_USER, SIGNAL_TABLE_SIZE, SIGTRAMP_ADDR, TIME_SLICE_MS};
use crate::log_debug;
use crate::sched::context::{
    CONTEXT_FRAME_SIZE, FRAME_CS, FRAME_EBP, FRAME_EFLAGS, FRAME_EIP,
};
use crate::sched::task::{BlockKind, Slot};
use crate::sched::{Current, Kernel};
use crate::sys::syscall::{INTERRUPTED_BY_SIGNAL, KILL_BAD_SIGNAL, KILL_NO_SUCH_PROCESS};

/// The hard-kill signal, highest priority, not reassignable.
pub const HARD_KILL_SIGNAL: i32 = SIGNAL_TABLE_SIZE as i32 - 1;

/// Size in bytes of the delivery frame spliced onto the user stack: a
/// full context frame followed by the trampoline call frame.
pub const SIG_FRAME_SIZE: usize = CONTEXT_FRAME_SIZE + 20;

/// Trampoline call frame offsets within the delivery frame. The context
/// frame is popped on resumption, leaving the stack pointer at the
/// return-address slot with the two trampoline arguments above it and
/// the saved delivery state above those.
pub const SIG_FRAME_HANDLER: usize = CONTEXT_FRAME_SIZE + 4;
pub const SIG_FRAME_CNTX: usize = CONTEXT_FRAME_SIZE + 8;
pub const SIG_FRAME_PREV_LEVEL: usize = CONTEXT_FRAME_SIZE + 12;
pub const SIG_FRAME_SAVED_RESULT: usize = CONTEXT_FRAME_SIZE + 16;

/// Return the bitmask with the given signal marked pending.
pub fn set_signal_bit(mask: u32, signal: i32) -> u32 {
    mask | (1 << signal)
}

/// Whether the given signal is marked in the bitmask.
pub fn is_signal_bit_set(mask: u32, signal: i32) -> bool {
    (mask >> signal) & 1 == 1
}

/// Return the bitmask with the given signal cleared.
pub fn clear_signal_bit(mask: u32, signal: i32) -> u32 {
    mask & !(1 << signal)
}

impl Kernel {
    /// Kernel side of `syskill`: register a signal for delivery.
    ///
    /// A signal whose handler is `None` is silently ignored; that counts
    /// as success. Posting at a blocked process interrupts its system
    /// call.
    pub(crate) fn post_signal(&mut self, target: Option<Slot>, signal: i32) -> i32 {
        let Some(slot) = target else {
            return KILL_NO_SUCH_PROCESS;
        };
        if !(0..SIGNAL_TABLE_SIZE as i32).contains(&signal) {
            return KILL_BAD_SIGNAL;
        }
        if self.pcbs[slot].signal_table[signal as usize].is_none() {
            return 0;
        }

        self.pcbs[slot].pending_signals =
            set_signal_bit(self.pcbs[slot].pending_signals, signal);
        log_debug!("SIG", "signal {} pending for pid {}", signal, self.pcbs[slot].pid);

        if self.pcbs[slot].state == crate::sched::task::ProcState::Blocked {
            self.unblock_on_signal(slot);
            self.ready(slot);
        }
        0
    }

    /// Pull a blocked process off whatever it is waiting on and set the
    /// result its interrupted call will report.
    fn unblock_on_signal(&mut self, slot: Slot) {
        let kind = self.pcbs[slot].block_kind;
        match kind {
            BlockKind::Sender | BlockKind::Receiver | BlockKind::Waiter => {
                let on = self.pcbs[slot]
                    .blocked_on
                    .expect("blocked process with no peer");
                let removed = self.remove_from_blocked(slot, on, kind);
                assert!(removed, "blocked process missing from its queue");
                self.pcbs[slot].result_code = INTERRUPTED_BY_SIGNAL;
            }
            BlockKind::ReceiveAny => {
                self.remove_from_receive_any(slot);
                self.pcbs[slot].result_code = INTERRUPTED_BY_SIGNAL;
            }
            BlockKind::Sleep => {
                // An interrupted sleep reports the time it still had left.
                let mut queue = core::mem::take(&mut self.sleep_queue);
                let ticks_left = queue.remove(&mut self.pcbs, slot);
                self.sleep_queue = queue;
                self.pcbs[slot].result_code = ticks_left * TIME_SLICE_MS as i32;
            }
            BlockKind::Read => {
                // An interrupted read reports what it already moved, and
                // the driver abandons the rest of the request.
                let transferred = self.kbd.chars_transferred;
                self.kbd.abort_read();
                self.pcbs[slot].result_code = if transferred == 0 {
                    INTERRUPTED_BY_SIGNAL
                } else {
                    transferred
                };
            }
            BlockKind::None => panic!("signal target is blocked but on no queue"),
        }
        self.pcbs[slot].blocked_on = None;
        self.pcbs[slot].block_kind = BlockKind::None;
    }

    /// Deliver the highest pending signal to the process about to be
    /// resumed, if it outranks the signal currently being handled.
    ///
    /// Delivery rewrites the user stack: a fresh context frame whose
    /// instruction pointer is the trampoline, the handler address and the
    /// interrupted context pointer as the trampoline's arguments, and the
    /// delivery level and result code to restore on sigreturn.
    pub(crate) fn handle_pending_signals(&mut self) {
        let Current::Proc(slot) = self.current else {
            return;
        };
        let pending = self.pcbs[slot].pending_signals;
        if pending == 0 {
            return;
        }
        let signal = 31 - pending.leading_zeros() as i32;
        if signal <= self.pcbs[slot].last_signal_delivered {
            return;
        }

        self.pcbs[slot].pending_signals = clear_signal_bit(pending, signal);
        let Some(handler) = self.pcbs[slot].signal_table[signal as usize] else {
            // Handler uninstalled after the signal was posted: drop it.
            return;
        };

        let old_esp = self.pcbs[slot].esp;
        let new_esp = old_esp - SIG_FRAME_SIZE;

        self.mem.zero(new_esp, SIG_FRAME_SIZE);
        self.mem.write_u32(new_esp + FRAME_EBP, (new_esp + CONTEXT_FRAME_SIZE) as u32);
        self.mem.write_u32(new_esp + FRAME_EIP, SIGTRAMP_ADDR as u32);
        self.mem.write_u32(new_esp + FRAME_CS, CODE_SELECTOR);
        self.mem.write_u32(new_esp + FRAME_EFLAGS, EFLAGS_USER);
        self.mem.write_u32(new_esp + SIG_FRAME_HANDLER, handler as u32);
        self.mem.write_u32(new_esp + SIG_FRAME_CNTX, old_esp as u32);
        self.mem.write_u32(
            new_esp + SIG_FRAME_PREV_LEVEL,
            self.pcbs[slot].last_signal_delivered as u32,
        );
        self.mem.write_u32(
            new_esp + SIG_FRAME_SAVED_RESULT,
            self.pcbs[slot].result_code as u32,
        );

        self.pcbs[slot].esp = new_esp;
        self.pcbs[slot].last_signal_delivered = signal;
        self.metrics.inc_signals_delivered();
        log_debug!(
            "SIG",
            "delivering signal {} to pid {} via handler {:#x}",
            signal,
            self.pcbs[slot].pid,
            handler
        );
    }

    /// Kernel side of `syssigreturn`: unwind a delivery frame. The two
    /// words just below the restored stack pointer are the saved result
    /// code and the saved delivery level.
    pub(crate) fn sigreturn(&mut self, slot: Slot, old_sp: usize) {
        self.pcbs[slot].esp = old_sp;
        self.pcbs[slot].result_code = self.mem.read_u32(old_sp - 4) as i32;
        self.pcbs[slot].last_signal_delivered = self.mem.read_u32(old_sp - 8) as i32;
    }
}
