//! Dispatcher and scheduler
//!
//! The kernel is single threaded and cooperative with itself: a running
//! process hands control back by system call or interrupt, the dispatcher
//! services exactly one request, picks the next ready process, and
//! resumes it. Nothing in here is ever preempted.
//!
//! All kernel state lives in one `Kernel` value: the PCB table, the
//! per-priority ready queues, the stopped queue, the sleep delta list,
//! the receive-any queue, the device table, and the current-process
//! handle. The embedder owns it and passes it by exclusive reference.
//!
//! Notes on PCB selection and PID assignment:
//! - PCBs start on the stopped queue with PIDs 1..=32, one per slot.
//! - Handing out a slot advances its PID by the table size, wrapping to
//!   `old % PCB_TABLE_SIZE` on overflow. A PID therefore locates its
//!   slot in constant time as `(pid - 1) % PCB_TABLE_SIZE`, and a PID is
//!   live iff that slot still stores it and is not stopped. The reuse
//!   interval is the full PID space, which keeps stale-PID accidents
//!   rare.

pub mod context;
pub mod queue;
pub mod task;
pub mod timer;

use crate::config::{
    HOLE_END, HOLE_START, MAX_ADDR, NUM_PRIORITIES, PCB_TABLE_SIZE, TIME_SLICE_MS,
};
use crate::drivers::input::keyboard::{kbd_devsw, Keyboard, KBD_0, KBD_1};
use crate::drivers::DevSw;
use crate::io::irq::InterruptController;
use crate::io::port::PortIo;
use crate::io::Console;
use crate::log_info;
use crate::metrics::KernelMetrics;
use crate::mm::{self, MemoryPool};
use crate::sys::syscall::{
    CPUTIMES_ADDR_IN_HOLE, CPUTIMES_PAST_END, PS_BLOCK_OFFSET, PS_CPU_MS_OFFSET, PS_PID_OFFSET,
    PS_STATE_OFFSET, PS_TABLE_SIZE, READ_WOULD_BLOCK, RECV_BAD_FROM_PTR, RECV_BAD_WORD_PTR,
    RECV_NO_SUCH_PROCESS, RECV_ONLY_PROCESS, RECV_SELF, SEND_NO_SUCH_PROCESS, SEND_SELF, SYSERR,
};
use alloc::boxed::Box;
use context::{ContextSwitch, Request, Resume};
use queue::{DeltaList, ProcQueue};
use task::{
    BlockKind, IpcArgs, Pid, ProcState, Process, Slot, IDLE_PROC_PID, Q_RECEIVERS, Q_SENDERS,
    Q_WAITERS,
};

/// Handle to the process currently holding the CPU. The idle process
/// lives outside the PCB table and is never enqueued anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Current {
    Idle,
    Proc(Slot),
}

/// The whole kernel: every process-wide singleton, initialized in one
/// well-defined order and owned by the boot code.
pub struct Kernel {
    pub(crate) mem: MemoryPool,
    pub(crate) pcbs: [Process; PCB_TABLE_SIZE],
    pub(crate) idle: Process,
    pub(crate) ready_queues: [ProcQueue; NUM_PRIORITIES],
    pub(crate) stopped_queue: ProcQueue,
    pub(crate) receive_any_queue: ProcQueue,
    pub(crate) sleep_queue: DeltaList,
    pub(crate) current: Current,
    pub(crate) user_proc_count: usize,
    pub(crate) device_table: [DevSw; crate::config::DEVICE_TABLE_SIZE],
    pub(crate) kbd: Keyboard,
    pub(crate) console: Box<dyn Console>,
    pub(crate) ports: Box<dyn PortIo>,
    pub(crate) pic: Box<dyn InterruptController>,
    pub metrics: KernelMetrics,
}

impl Kernel {
    /// Bring the kernel up: memory pool, process table and queues,
    /// dispatcher state, the sleep device, and the device table, in that
    /// order. The caller supplies the hardware seams.
    pub fn new(
        console: Box<dyn Console>,
        ports: Box<dyn PortIo>,
        pic: Box<dyn InterruptController>,
    ) -> Self {
        log_info!("INIT", "bringing up the kernel");
        let mut kernel = Self {
            mem: MemoryPool::new(),
            pcbs: core::array::from_fn(|slot| Process::unused(slot as Pid + 1)),
            idle: Process::unused(IDLE_PROC_PID),
            ready_queues: [ProcQueue::new(); NUM_PRIORITIES],
            stopped_queue: ProcQueue::new(),
            receive_any_queue: ProcQueue::new(),
            sleep_queue: DeltaList::new(),
            current: Current::Idle,
            user_proc_count: 0,
            device_table: [kbd_devsw(KBD_0), kbd_devsw(KBD_1)],
            kbd: Keyboard::new(),
            console,
            ports,
            pic,
            metrics: KernelMetrics::new(),
        };

        // Every slot starts its life parked on the stopped queue.
        for slot in 0..PCB_TABLE_SIZE {
            kernel.stop(slot);
        }
        kernel.create_idle_proc();
        kernel.di_init();
        log_info!("INIT", "kernel up, {} process slots", PCB_TABLE_SIZE);
        kernel
    }

    /// Select the first process to run. Call once, after the boot code
    /// has created the initial processes.
    pub fn start(&mut self) {
        self.current = self.next();
    }

    /// The dispatcher: resume processes and service their requests
    /// forever.
    pub fn run(&mut self, switcher: &mut dyn ContextSwitch) -> ! {
        self.start();
        loop {
            self.step(switcher);
        }
    }

    /// One dispatcher iteration: deliver signals, resume the current
    /// process, service the request it comes back with.
    pub fn step(&mut self, switcher: &mut dyn ContextSwitch) {
        let resume = self.prepare_resume();
        let request = switcher.resume(self, resume);
        self.dispatch(request);
    }

    /// Deliver pending signals to the current process and describe it to
    /// the context switcher.
    pub fn prepare_resume(&mut self) -> Resume {
        self.handle_pending_signals();
        self.metrics.inc_context_switches();
        let proc = self.current_proc();
        Resume { pid: proc.pid, esp: proc.esp, result_code: proc.result_code }
    }

    /// Service one request on behalf of the current process.
    pub fn dispatch(&mut self, request: Request) {
        match request {
            Request::TimerInterrupt => {
                self.current_proc_mut().cpu_ticks += 1;
                self.metrics.inc_preemptions();
                self.tick();
                self.ready_current();
                self.current = self.next();
                self.pic.end_of_interrupt();
            }
            Request::KeyboardInterrupt => {
                self.kbd_isr();
                self.pic.end_of_interrupt();
            }
            _ => {
                self.metrics.inc_syscalls();
                self.service_syscall(request);
            }
        }
    }

    fn service_syscall(&mut self, request: Request) {
        let Current::Proc(slot) = self.current else {
            panic!("system call from the idle process");
        };
        match request {
            Request::Create { entry, stack_size } => {
                self.pcbs[slot].result_code = match self.create(entry, stack_size) {
                    Ok(pid) => pid as i32,
                    Err(_) => SYSERR,
                };
            }
            Request::Yield => {
                self.ready(slot);
                self.current = self.next();
            }
            Request::Stop => {
                self.cleanup(slot);
                self.current = self.next();
            }
            Request::GetPid => {
                self.pcbs[slot].result_code = self.pcbs[slot].pid as i32;
            }
            Request::Puts { addr } => self.service_puts(addr),
            Request::Kill { pid, signal } => {
                let target = self.get_pcb(pid);
                self.pcbs[slot].result_code = self.post_signal(target, signal);
            }
            Request::SetPriority { priority } => self.service_setprio(slot, priority),
            Request::Send { dest, word } => self.service_send(slot, dest, word),
            Request::Recv { from_ptr, word_ptr } => self.service_recv(slot, from_ptr, word_ptr),
            Request::Sleep { ms } => {
                if ms > 0 {
                    self.sleep(slot, ms);
                    self.current = self.next();
                } else {
                    self.pcbs[slot].result_code = 0;
                }
            }
            Request::GetCpuTimes { addr } => {
                self.pcbs[slot].result_code = self.get_cpu_times(addr);
            }
            Request::SigHandler { signal, handler, old_handler_ptr } => {
                self.service_sighandler(slot, signal, handler, old_handler_ptr);
            }
            Request::SigReturn { old_sp } => self.sigreturn(slot, old_sp),
            Request::Wait { pid } => self.service_wait(slot, pid),
            Request::Open { device } => {
                self.pcbs[slot].result_code = self.di_open(slot, device);
            }
            Request::Close { fd } => {
                self.pcbs[slot].result_code = self.di_close(slot, fd);
            }
            Request::Write { fd, buf, len } => {
                self.pcbs[slot].result_code = self.di_write(slot, fd, buf, len);
            }
            Request::Read { fd, buf, len } => {
                let result = self.di_read(slot, fd, buf, len);
                if result == READ_WOULD_BLOCK {
                    self.pcbs[slot].state = ProcState::Blocked;
                    self.pcbs[slot].block_kind = BlockKind::Read;
                    self.current = self.next();
                } else {
                    self.pcbs[slot].result_code = result;
                }
            }
            Request::Ioctl { fd, req } => {
                self.pcbs[slot].result_code = self.di_ioctl(slot, fd, req);
            }
            Request::TimerInterrupt | Request::KeyboardInterrupt => unreachable!(),
        }
    }

    /// Kernel side of sysputs. The kernel cannot be preempted, so the
    /// string goes to the console in one piece. Invalid addresses are
    /// ignored.
    fn service_puts(&mut self, addr: usize) {
        if mm::valid_ptr(addr) {
            let bytes = self.mem.cstr(addr);
            self.console.puts(bytes);
        }
    }

    /// Kernel side of syssetprio. Priority -1 queries without changing
    /// anything; a valid priority is installed and the previous one
    /// returned.
    fn service_setprio(&mut self, slot: Slot, priority: i32) {
        let previous = self.pcbs[slot].priority as i32;
        let valid = (0..NUM_PRIORITIES as i32).contains(&priority);
        if valid {
            self.pcbs[slot].priority = priority as u8;
        }
        self.pcbs[slot].result_code = if valid || priority == -1 { previous } else { SYSERR };
    }

    /// Kernel side of syssend: validate the target, then hand the word
    /// to the rendezvous. A blocked sender gives up the CPU here.
    fn service_send(&mut self, slot: Slot, dest: Pid, word: u32) {
        self.pcbs[slot].ipc_args = IpcArgs::Send { word };

        let mut blocked = false;
        let result = if self.pcbs[slot].pid == dest {
            SEND_SELF
        } else {
            match self.get_pcb(dest) {
                None => SEND_NO_SUCH_PROCESS,
                Some(receiver) => {
                    let r = self.ipc_send(slot, receiver, word);
                    blocked = r == -1;
                    r
                }
            }
        };
        self.pcbs[slot].result_code = result;
        if blocked {
            self.current = self.next();
        }
    }

    /// Kernel side of sysrecv: validate both user pointers and the
    /// source, then hand over to the rendezvous. A blocked receiver
    /// gives up the CPU here.
    fn service_recv(&mut self, slot: Slot, from_ptr: usize, word_ptr: usize) {
        self.pcbs[slot].ipc_args = IpcArgs::Recv { from_ptr, word_ptr };

        let mut blocked = false;
        let result = if !mm::valid_buf(from_ptr, 4) {
            RECV_BAD_FROM_PTR
        } else if !mm::valid_buf(word_ptr, 4) {
            RECV_BAD_WORD_PTR
        } else {
            let from_pid = self.mem.read_u32(from_ptr);
            if from_pid == 0 {
                // Receive-any, refused while nobody else could ever send.
                if self.only_process() {
                    RECV_ONLY_PROCESS
                } else {
                    let r = self.ipc_recv(slot, None, from_ptr, word_ptr);
                    blocked = r == -1;
                    r
                }
            } else if from_pid == self.pcbs[slot].pid {
                RECV_SELF
            } else {
                match self.get_pcb(from_pid) {
                    None => RECV_NO_SUCH_PROCESS,
                    Some(sender) => {
                        let r = self.ipc_recv(slot, Some(sender), from_ptr, word_ptr);
                        blocked = r == -1;
                        r
                    }
                }
            }
        };
        self.pcbs[slot].result_code = result;
        if blocked {
            self.current = self.next();
        }
    }

    /// Kernel side of syssighandler. Signal 31 is not reassignable, a
    /// null handler disables delivery, and the previous handler is
    /// reported through `old_handler_ptr`.
    fn service_sighandler(&mut self, slot: Slot, signal: i32, handler: usize, old_ptr: usize) {
        let result = if !(0..crate::signal::HARD_KILL_SIGNAL).contains(&signal) {
            crate::sys::syscall::SIGHANDLER_BAD_SIGNAL
        } else if handler != 0 && !mm::valid_ptr(handler) {
            crate::sys::syscall::SIGHANDLER_BAD_HANDLER
        } else if !mm::valid_ptr(old_ptr) {
            crate::sys::syscall::SIGHANDLER_BAD_OLD_PTR
        } else {
            let old = self.pcbs[slot].signal_table[signal as usize].unwrap_or(0);
            self.mem.write_u32(old_ptr, old as u32);
            self.pcbs[slot].signal_table[signal as usize] = (handler != 0).then_some(handler);
            0
        };
        self.pcbs[slot].result_code = result;
    }

    /// Kernel side of syswait: block until the target terminates.
    /// Waiting on a dead process or on yourself fails immediately.
    fn service_wait(&mut self, slot: Slot, pid: Pid) {
        match self.get_pcb(pid) {
            Some(target) if self.pcbs[slot].pid != pid => {
                self.enqueue_blocked(slot, target, BlockKind::Waiter);
                self.current = self.next();
            }
            _ => self.pcbs[slot].result_code = SYSERR,
        }
    }

    /// Fill the user-space status table with one entry per live process
    /// plus the idle process, reporting CPU time in milliseconds.
    /// Returns the last slot used.
    fn get_cpu_times(&mut self, addr: usize) -> i32 {
        if (HOLE_START..=HOLE_END).contains(&addr) {
            return CPUTIMES_ADDR_IN_HOLE;
        }
        if addr + PS_TABLE_SIZE > MAX_ADDR {
            return CPUTIMES_PAST_END;
        }

        let current_pid = self.current_pid();
        let mut used: i32 = -1;
        for slot in 0..PCB_TABLE_SIZE {
            if self.pcbs[slot].state == ProcState::Stopped {
                continue;
            }
            used += 1;
            let at = used as usize * 4;
            let state = if self.pcbs[slot].pid == current_pid {
                ProcState::Running
            } else {
                self.pcbs[slot].state
            };
            self.mem.write_u32(addr + PS_PID_OFFSET + at, self.pcbs[slot].pid);
            self.mem.write_u32(addr + PS_STATE_OFFSET + at, state.code());
            self.mem
                .write_u32(addr + PS_BLOCK_OFFSET + at, self.pcbs[slot].block_kind.code());
            self.mem.write_u32(
                addr + PS_CPU_MS_OFFSET + at,
                (self.pcbs[slot].cpu_ticks * TIME_SLICE_MS as u64) as u32,
            );
        }

        // The idle process is always reported, in the last slot.
        used += 1;
        let at = used as usize * 4;
        self.mem.write_u32(addr + PS_PID_OFFSET + at, IDLE_PROC_PID);
        self.mem.write_u32(addr + PS_STATE_OFFSET + at, ProcState::Ready.code());
        self.mem.write_u32(
            addr + PS_CPU_MS_OFFSET + at,
            (self.idle.cpu_ticks * TIME_SLICE_MS as u64) as u32,
        );
        used
    }

    /// Make a process runnable: clear its blocked bookkeeping and append
    /// it to the ready queue of its priority.
    pub(crate) fn ready(&mut self, slot: Slot) {
        let proc = &mut self.pcbs[slot];
        proc.blocked_on = None;
        proc.block_kind = BlockKind::None;
        proc.state = ProcState::Ready;
        let priority = proc.priority as usize;
        self.ready_queues[priority].enqueue(&mut self.pcbs, slot);
    }

    /// Ready the current process, unless the CPU was idling.
    fn ready_current(&mut self) {
        if let Current::Proc(slot) = self.current {
            self.ready(slot);
        }
    }

    /// Pick the next process to run: scan the ready queues from highest
    /// to lowest priority, falling back to the idle process.
    fn next(&mut self) -> Current {
        for priority in 0..NUM_PRIORITIES {
            if let Some(slot) = self.ready_queues[priority].dequeue(&mut self.pcbs) {
                self.pcbs[slot].state = ProcState::Running;
                return Current::Proc(slot);
            }
        }
        self.idle.state = ProcState::Running;
        Current::Idle
    }

    /// Take a PCB off the stopped queue and give it its next PID.
    pub(crate) fn get_unused_pcb(&mut self) -> Option<Slot> {
        let slot = self.stopped_queue.dequeue(&mut self.pcbs)?;
        let proc = &mut self.pcbs[slot];
        proc.pid = Process::next_pid(proc.pid);
        debug_assert!(proc.pid >= 1);
        proc.reset_for_reuse();
        Some(slot)
    }

    /// Look up a live process by PID in constant time.
    pub(crate) fn get_pcb(&self, pid: Pid) -> Option<Slot> {
        if pid < 1 {
            return None;
        }
        let slot = (pid as usize - 1) % PCB_TABLE_SIZE;
        let proc = &self.pcbs[slot];
        (proc.pid == pid && proc.state != ProcState::Stopped).then_some(slot)
    }

    /// Park a PCB on the stopped queue.
    fn stop(&mut self, slot: Slot) {
        self.pcbs[slot].state = ProcState::Stopped;
        self.stopped_queue.enqueue(&mut self.pcbs, slot);
    }

    /// Destroy a process: wake everything blocked on it, release its
    /// descriptors and stack, and return the PCB to the stopped queue.
    fn cleanup(&mut self, slot: Slot) {
        // Peers blocked on a rendezvous with a terminating process see
        // the peer-died code; waiters complete normally.
        for (queue, code) in [(Q_SENDERS, -1), (Q_RECEIVERS, -1), (Q_WAITERS, 0)] {
            let mut q = self.pcbs[slot].blocked[queue];
            while let Some(peer) = q.dequeue(&mut self.pcbs) {
                self.unblock(peer, code);
            }
            self.pcbs[slot].blocked[queue] = q;
        }

        // Release any devices the process still holds open.
        for fd in 0..crate::config::FD_TABLE_SIZE {
            if self.pcbs[slot].fd_table[fd].is_some() {
                self.di_close(slot, fd as i32);
            }
        }

        self.stop(slot);
        self.user_proc_count -= 1;

        // A lone survivor parked on receive-any can never be matched.
        if self.only_process() && self.receive_any_queue.len() == 1 {
            let survivor = self
                .receive_any_queue
                .dequeue(&mut self.pcbs)
                .expect("receive-any queue changed size");
            self.unblock(survivor, RECV_ONLY_PROCESS);
        }

        let mem_start = self.pcbs[slot].mem_start;
        self.pcbs[slot].mem_start = 0;
        if mem_start != 0 {
            self.mem.free(mem_start);
        }
    }

    /// Set the result a process will see on resumption and ready it.
    pub(crate) fn unblock(&mut self, slot: Slot, result_code: i32) {
        self.pcbs[slot].result_code = result_code;
        self.ready(slot);
    }

    /// Block a process on one of the sub-queues of `on`.
    pub(crate) fn enqueue_blocked(&mut self, slot: Slot, on: Slot, kind: BlockKind) {
        let queue = kind.code() as usize;
        debug_assert!(queue < task::BLOCKED_QUEUES);
        let mut q = self.pcbs[on].blocked[queue];
        q.enqueue(&mut self.pcbs, slot);
        self.pcbs[on].blocked[queue] = q;

        self.pcbs[slot].blocked_on = Some(on);
        self.pcbs[slot].block_kind = kind;
        self.pcbs[slot].state = ProcState::Blocked;
    }

    /// Remove a process from the sub-queue of `on` it blocked on, if it
    /// is in fact blocked there.
    pub(crate) fn remove_from_blocked(&mut self, slot: Slot, on: Slot, kind: BlockKind) -> bool {
        if self.pcbs[slot].blocked_on != Some(on) || self.pcbs[slot].block_kind != kind {
            return false;
        }
        let queue = kind.code() as usize;
        let mut q = self.pcbs[on].blocked[queue];
        q.remove(&mut self.pcbs, slot);
        self.pcbs[on].blocked[queue] = q;
        true
    }

    /// Remove a process from the receive-any queue, if it is on it.
    pub(crate) fn remove_from_receive_any(&mut self, slot: Slot) -> bool {
        if self.pcbs[slot].block_kind != BlockKind::ReceiveAny {
            return false;
        }
        self.receive_any_queue.remove(&mut self.pcbs, slot);
        true
    }

    /// Whether the current process is the only live user process.
    fn only_process(&self) -> bool {
        self.user_proc_count == 1
    }

    fn current_proc(&self) -> &Process {
        match self.current {
            Current::Idle => &self.idle,
            Current::Proc(slot) => &self.pcbs[slot],
        }
    }

    fn current_proc_mut(&mut self) -> &mut Process {
        match self.current {
            Current::Idle => &mut self.idle,
            Current::Proc(slot) => &mut self.pcbs[slot],
        }
    }

    /// PID of the process holding the CPU; 0 while idling.
    pub fn current_pid(&self) -> Pid {
        self.current_proc().pid
    }

    /// Number of live user processes.
    pub fn live_user_processes(&self) -> usize {
        self.user_proc_count
    }

    /// The stack region owned by a live process.
    pub fn process_stack_region(&self, pid: Pid) -> Option<(usize, usize)> {
        let slot = self.get_pcb(pid)?;
        let proc = &self.pcbs[slot];
        Some((proc.mem_start, proc.stack_size))
    }

    /// Read access to user memory, for program loading and inspection.
    pub fn user_memory(&self) -> &MemoryPool {
        &self.mem
    }

    /// Write access to user memory, for program loading.
    pub fn user_memory_mut(&mut self) -> &mut MemoryPool {
        &mut self.mem
    }
}
