//! Sleep device and timer tick handling
//!
//! Sleep requests are converted from milliseconds into time slices and
//! parked on the delta list; every timer interrupt ages the head of the
//! list by one tick and readies whatever has come due. The programmable
//! interval timer itself is the embedder's hardware, but the canonical
//! 100 Hz programming sequence is provided here.

use crate::config::TIME_SLICE_MS;
use crate::io::port::PortIo;
use crate::sched::task::{BlockKind, ProcState, Slot};
use crate::sched::Kernel;

/// Base frequency of the programmable interval timer in Hz.
const PIT_FREQUENCY: u32 = 1_193_182;
/// PIT command port.
const PIT_COMMAND: u16 = 0x43;
/// PIT channel 0 data port.
const PIT_CHANNEL_0: u16 = 0x40;
/// Channel 0, lobyte/hibyte access, square-wave mode.
const PIT_SQUARE_WAVE: u8 = 0x36;

/// Convert a sleep duration to time slices, rounding up so a process
/// never wakes early.
pub fn ms_to_ticks(ms: u32) -> i32 {
    (ms / TIME_SLICE_MS + u32::from(ms % TIME_SLICE_MS != 0)) as i32
}

/// Program channel 0 of the PIT for a periodic interrupt at `hz`.
pub fn program_pit(ports: &mut dyn PortIo, hz: u32) {
    let divisor = PIT_FREQUENCY / hz;
    ports.outb(PIT_COMMAND, PIT_SQUARE_WAVE);
    ports.outb(PIT_CHANNEL_0, (divisor & 0xff) as u8);
    ports.outb(PIT_CHANNEL_0, (divisor >> 8) as u8);
}

impl Kernel {
    /// Put a process to sleep for at least `ms` milliseconds.
    pub(crate) fn sleep(&mut self, slot: Slot, ms: u32) {
        let ticks = ms_to_ticks(ms);
        let mut queue = core::mem::take(&mut self.sleep_queue);
        queue.insert(&mut self.pcbs, slot, ticks);
        self.sleep_queue = queue;

        self.pcbs[slot].state = ProcState::Blocked;
        self.pcbs[slot].block_kind = BlockKind::Sleep;
    }

    /// Service one timer tick: age the head sleeper and wake every
    /// process that has come due, in list order.
    pub(crate) fn tick(&mut self) {
        self.metrics.inc_timer_ticks();

        let mut queue = core::mem::take(&mut self.sleep_queue);
        if let Some(head) = queue.peek() {
            self.pcbs[head].key -= 1;
            while let Some(head) = queue.peek() {
                if self.pcbs[head].key > 0 {
                    break;
                }
                queue.poll(&mut self.pcbs);
                self.unblock(head, 0);
            }
        }
        self.sleep_queue = queue;
    }
}
