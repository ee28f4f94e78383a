//! Process management
//!
//! This module defines the process control block (PCB) and process
//! creation: stack allocation, the initial context frame, and the
//! return-to-exit trap that catches processes running off the end of
//! their code.

use super::context::{self, CONTEXT_FRAME_SIZE};
use super::queue::ProcQueue;
use crate::config::{
    CODE_SELECTOR, EFLAGS_USER, EXIT_STUB_ADDR, FD_TABLE_SIZE, IDLE_PROCESS_STACK_SIZE,
    IDLE_STUB_ADDR, INIT_PRIORITY, PCB_TABLE_SIZE, PROCESS_STACK_SIZE, SIGNAL_TABLE_SIZE,
};
use crate::mm;
use crate::sched::Kernel;
use crate::{log_debug, log_error};

/// Process identifier. PID 0 is reserved for the idle process.
pub type Pid = u32;

/// Index of a PCB in the process table.
pub type Slot = usize;

/// PID of the idle process.
pub const IDLE_PROC_PID: Pid = 0;

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    /// Currently executing on the CPU
    Running,
    /// Runnable, waiting on a ready queue
    Ready,
    /// Waiting for some event; `block_kind` says which
    Blocked,
    /// Slot unused, PCB parked on the stopped queue
    Stopped,
}

impl ProcState {
    /// Stable numeric code used in the user-visible status table.
    pub const fn code(self) -> u32 {
        match self {
            ProcState::Running => 0,
            ProcState::Ready => 1,
            ProcState::Blocked => 2,
            ProcState::Stopped => 3,
        }
    }
}

/// What a blocked process is waiting for. The first three variants index
/// the per-PCB blocked sub-queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Blocked sending to another process
    Sender,
    /// Blocked receiving from a specific process
    Receiver,
    /// Blocked waiting for another process to terminate
    Waiter,
    /// Blocked receiving from any process
    ReceiveAny,
    /// Asleep on the delta list
    Sleep,
    /// Blocked in a device read
    Read,
    /// Not blocked
    None,
}

impl BlockKind {
    /// Stable numeric code used in the user-visible status table.
    pub const fn code(self) -> u32 {
        match self {
            BlockKind::Sender => 0,
            BlockKind::Receiver => 1,
            BlockKind::Waiter => 2,
            BlockKind::ReceiveAny => 3,
            BlockKind::Sleep => 4,
            BlockKind::Read => 5,
            BlockKind::None => 6,
        }
    }
}

/// Number of per-PCB blocked sub-queues (senders, receivers, waiters).
pub const BLOCKED_QUEUES: usize = 3;

/// Indices of the per-PCB blocked sub-queues.
pub const Q_SENDERS: usize = 0;
pub const Q_RECEIVERS: usize = 1;
pub const Q_WAITERS: usize = 2;

/// Arguments of the in-flight IPC call, captured while the caller is
/// blocked so the rendezvous partner can complete the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcArgs {
    None,
    /// Word waiting to be handed to a receiver
    Send { word: u32 },
    /// Destination addresses of a pending receive
    Recv { from_ptr: usize, word_ptr: usize },
}

/// Process control block.
///
/// One per slot in the fixed process table. A PCB is an intrusive queue
/// node: it is on at most one queue at any time via `prev`/`next`, and
/// the delta list reuses `next` together with the `key` delay field.
#[derive(Debug, Clone)]
pub struct Process {
    /// Process identifier; reused slots get `old + PCB_TABLE_SIZE`
    pub pid: Pid,
    pub state: ProcState,
    /// Backward intrusive link (unused by the delta list)
    pub prev: Option<Slot>,
    /// Forward intrusive link
    pub next: Option<Slot>,
    /// Base of the owned stack allocation, 0 when stopped
    pub mem_start: usize,
    /// Size of the owned stack allocation
    pub stack_size: usize,
    /// Saved stack pointer while not running
    pub esp: usize,
    /// Value handed back in EAX at the next resumption
    pub result_code: i32,
    /// Scheduling priority, 0 (highest) to 3 (lowest)
    pub priority: u8,
    /// Process this one is blocked on, for Sender/Receiver/Waiter
    pub blocked_on: Option<Slot>,
    /// Why this process is blocked
    pub block_kind: BlockKind,
    /// Queues of processes blocked on this one: senders, receivers,
    /// waiters
    pub blocked: [ProcQueue; BLOCKED_QUEUES],
    /// In-flight IPC arguments while blocked on send or receive
    pub ipc_args: IpcArgs,
    /// Delta-list delay relative to the predecessor, in ticks
    pub key: i32,
    /// CPU time consumed, in timer ticks
    pub cpu_ticks: u64,
    /// Per-signal handler addresses; `None` means the signal is ignored.
    /// The last slot is pinned to the process-exit stub.
    pub signal_table: [Option<usize>; SIGNAL_TABLE_SIZE],
    /// Bitmask of signals awaiting delivery
    pub pending_signals: u32,
    /// Highest signal currently being handled, -1 if none. Only signals
    /// above this level are delivered.
    pub last_signal_delivered: i32,
    /// Open devices, as indices into the system device table
    pub fd_table: [Option<usize>; FD_TABLE_SIZE],
}

impl Process {
    /// A stopped PCB as it sits in the table at boot.
    pub(crate) fn unused(pid: Pid) -> Self {
        Self {
            pid,
            state: ProcState::Stopped,
            prev: None,
            next: None,
            mem_start: 0,
            stack_size: 0,
            esp: 0,
            result_code: 0,
            priority: INIT_PRIORITY,
            blocked_on: None,
            block_kind: BlockKind::None,
            blocked: [ProcQueue::new(); BLOCKED_QUEUES],
            ipc_args: IpcArgs::None,
            key: 0,
            cpu_ticks: 0,
            signal_table: [None; SIGNAL_TABLE_SIZE],
            pending_signals: 0,
            last_signal_delivered: -1,
            fd_table: [None; FD_TABLE_SIZE],
        }
    }

    /// Reinitialize the per-process tables when the slot is handed out
    /// again. The hard-kill signal keeps its fixed handler.
    pub(crate) fn reset_for_reuse(&mut self) {
        self.cpu_ticks = 0;
        self.signal_table = [None; SIGNAL_TABLE_SIZE];
        self.signal_table[SIGNAL_TABLE_SIZE - 1] = Some(EXIT_STUB_ADDR);
        self.pending_signals = 0;
        self.last_signal_delivered = -1;
        self.ipc_args = IpcArgs::None;
        self.fd_table = [None; FD_TABLE_SIZE];
    }

    /// Compute the PID a slot gets when it is reused: the previous PID
    /// plus the table size, falling back to `old % PCB_TABLE_SIZE` on
    /// overflow. The wraparound can collide with a live PID; the reuse
    /// interval is large enough that this is accepted.
    pub(crate) fn next_pid(old: Pid) -> Pid {
        match old.checked_add(PCB_TABLE_SIZE as Pid) {
            Some(pid) => pid,
            None => old % PCB_TABLE_SIZE as Pid,
        }
    }
}

/// Process creation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateError {
    /// Entry point is not a usable address
    BadEntryPoint,
    /// No memory left for the stack
    OutOfMemory,
    /// Every PCB slot is live
    TableFull,
}

/// Result type for process creation
pub type CreateResult<T> = Result<T, CreateError>;

impl Kernel {
    /// Create a new process and place it on the ready queue.
    ///
    /// The stack is laid out so that a process returning from its entry
    /// function lands in the process-exit stub, which traps into the
    /// stop path: below the top of the stack sits that return address,
    /// and below it the initial context frame the context switcher will
    /// pop, with `iret_eip` aimed at `entry`.
    pub fn create(&mut self, entry: usize, stack_size: usize) -> CreateResult<Pid> {
        if !mm::valid_ptr(entry) {
            return Err(CreateError::BadEntryPoint);
        }
        let stack_size = stack_size.max(PROCESS_STACK_SIZE);

        let mem_start = self.mem.alloc(stack_size).ok_or_else(|| {
            log_error!("CREATE", "not enough memory for a {} byte stack", stack_size);
            CreateError::OutOfMemory
        })?;

        let Some(slot) = self.get_unused_pcb() else {
            self.mem.free(mem_start);
            return Err(CreateError::TableFull);
        };

        let proc = &mut self.pcbs[slot];
        proc.mem_start = mem_start;
        proc.stack_size = stack_size;
        proc.priority = INIT_PRIORITY;
        proc.result_code = 0;
        let pid = proc.pid;

        // Return-address slot at the very top of the stack: running off
        // the end of the process transfers control to the exit stub.
        let mem_end = mem_start + stack_size;
        let ret_slot = mem_end - 4;
        self.mem.write_u32(ret_slot, EXIT_STUB_ADDR as u32);

        let esp = ret_slot - CONTEXT_FRAME_SIZE;
        self.pcbs[slot].esp = esp;
        context::write_initial_frame(&mut self.mem, esp, entry as u32);

        self.ready(slot);
        self.user_proc_count += 1;
        log_debug!("CREATE", "created process {} entry {:#x}", pid, entry);
        Ok(pid)
    }

    /// Build the idle process. It owns a very small stack, has PID 0, and
    /// is never placed on a ready queue.
    pub(crate) fn create_idle_proc(&mut self) {
        let mem_start = self
            .mem
            .alloc(IDLE_PROCESS_STACK_SIZE)
            .expect("not enough memory for the idle process stack");

        let mem_end = mem_start + IDLE_PROCESS_STACK_SIZE;
        let esp = mem_end - CONTEXT_FRAME_SIZE;
        context::write_initial_frame(&mut self.mem, esp, IDLE_STUB_ADDR as u32);

        self.idle.pid = IDLE_PROC_PID;
        self.idle.mem_start = mem_start;
        self.idle.stack_size = IDLE_PROCESS_STACK_SIZE;
        self.idle.esp = esp;
    }
}

const _: () = {
    assert!(EFLAGS_USER & 0x200 != 0); // interrupts stay enabled in user code
    assert!(CODE_SELECTOR != 0);
};
