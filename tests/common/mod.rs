//! Scripted user-process harness
//!
//! Integration tests drive the kernel the way the context-switch glue
//! does on real hardware: ask the dispatcher who runs next, then play
//! that process's part by issuing its next request. The harness also
//! emulates the user-space side of signal delivery. When a resumption
//! lands on a freshly spliced trampoline frame it surfaces a `Handler`
//! event, the test performs whatever the handler would do, and
//! `sigreturn` unwinds exactly as the real trampoline stub would.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use vireo_kernel::config::{EXIT_STUB_ADDR, SIGTRAMP_ADDR};
use vireo_kernel::io::irq::InterruptController;
use vireo_kernel::io::port::{PortIo, ScriptedPorts};
use vireo_kernel::io::Console;
use vireo_kernel::sched::context::FRAME_EIP;
use vireo_kernel::signal::{SIG_FRAME_CNTX, SIG_FRAME_HANDLER, SIG_FRAME_SIZE};
use vireo_kernel::{Kernel, Pid, Request};

/// Console sink that records everything printed.
#[derive(Clone, Default)]
pub struct SharedConsole(Rc<RefCell<Vec<u8>>>);

impl Console for SharedConsole {
    fn putc(&mut self, ch: u8) {
        self.0.borrow_mut().push(ch);
    }
}

impl SharedConsole {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

/// Port bus handle the test keeps while the kernel owns the other end.
#[derive(Clone, Default)]
pub struct SharedPorts(Rc<RefCell<ScriptedPorts>>);

impl PortIo for SharedPorts {
    fn inb(&mut self, port: u16) -> u8 {
        self.0.borrow_mut().inb(port)
    }

    fn outb(&mut self, port: u16, value: u8) {
        self.0.borrow_mut().outb(port, value);
    }
}

impl SharedPorts {
    pub fn push_read(&self, port: u16, value: u8) {
        self.0.borrow_mut().push_read(port, value);
    }

    pub fn writes(&self) -> Vec<(u16, u8)> {
        self.0.borrow().writes.clone()
    }
}

#[derive(Default)]
struct PicState {
    acks: usize,
    mask_ops: Vec<(u8, bool)>,
}

/// Interrupt controller that records acknowledgements and mask changes.
#[derive(Clone, Default)]
pub struct SharedPic(Rc<RefCell<PicState>>);

impl InterruptController for SharedPic {
    fn end_of_interrupt(&mut self) {
        self.0.borrow_mut().acks += 1;
    }

    fn set_irq_mask(&mut self, irq: u8, masked: bool) {
        self.0.borrow_mut().mask_ops.push((irq, masked));
    }
}

impl SharedPic {
    pub fn acks(&self) -> usize {
        self.0.borrow().acks
    }

    pub fn mask_ops(&self) -> Vec<(u8, bool)> {
        self.0.borrow().mask_ops.clone()
    }
}

/// What a resumption turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A process (or the idle process, pid 0) resumed normally; `result`
    /// is what its last request returned.
    Run { pid: Pid, result: i32 },
    /// A process entered a signal handler through the trampoline.
    Handler { pid: Pid, handler: usize, cntx: usize },
}

/// The kernel plus the harness bookkeeping that stands in for user code.
pub struct Sim {
    pub kernel: Kernel,
    pub console: SharedConsole,
    pub ports: SharedPorts,
    pub pic: SharedPic,
    /// Trampoline frames already entered, keyed by (pid, frame address).
    entered: HashSet<(Pid, usize)>,
    /// Per-process stack of interrupted-context pointers, innermost
    /// handler last.
    cntx_stack: HashMap<Pid, Vec<usize>>,
}

impl Sim {
    pub fn new() -> Self {
        let console = SharedConsole::default();
        let ports = SharedPorts::default();
        let pic = SharedPic::default();
        let kernel = Kernel::new(
            Box::new(console.clone()),
            Box::new(ports.clone()),
            Box::new(pic.clone()),
        );
        Self { kernel, console, ports, pic, entered: HashSet::new(), cntx_stack: HashMap::new() }
    }

    /// Create a process. Entry addresses only name the process here; the
    /// harness plays the code.
    pub fn spawn(&mut self, entry: usize) -> Pid {
        self.kernel.create(entry, 0).expect("process creation failed")
    }

    /// Pick the first process to run, once the initial processes exist.
    pub fn start(&mut self) {
        self.kernel.start();
    }

    /// Resume whoever the scheduler chose and report what happened.
    ///
    /// A resumption that lands on a fresh trampoline frame surfaces as
    /// `Handler`; the hard-kill pseudo handler is played out to its stop
    /// request right here.
    pub fn resume(&mut self) -> Event {
        loop {
            let resume = self.kernel.prepare_resume();
            let mem = self.kernel.user_memory();
            let eip = mem.read_u32(resume.esp + FRAME_EIP) as usize;
            if eip == SIGTRAMP_ADDR && !self.entered.contains(&(resume.pid, resume.esp)) {
                let handler = mem.read_u32(resume.esp + SIG_FRAME_HANDLER) as usize;
                let cntx = mem.read_u32(resume.esp + SIG_FRAME_CNTX) as usize;
                self.entered.insert((resume.pid, resume.esp));
                if handler == EXIT_STUB_ADDR {
                    // The fixed hard-kill handler is the exit stub.
                    self.kernel.dispatch(Request::Stop);
                    continue;
                }
                self.cntx_stack.entry(resume.pid).or_default().push(cntx);
                return Event::Handler { pid: resume.pid, handler, cntx };
            }
            return Event::Run { pid: resume.pid, result: resume.result_code };
        }
    }

    /// Resume and insist that `pid` runs normally; returns its result.
    pub fn expect_run(&mut self, pid: Pid) -> i32 {
        match self.resume() {
            Event::Run { pid: p, result } if p == pid => result,
            other => panic!("expected pid {} to run, got {:?}", pid, other),
        }
    }

    /// Resume and insist that `pid` enters a handler; returns (handler,
    /// cntx).
    pub fn expect_handler(&mut self, pid: Pid) -> (usize, usize) {
        match self.resume() {
            Event::Handler { pid: p, handler, cntx } if p == pid => (handler, cntx),
            other => panic!("expected pid {} to enter a handler, got {:?}", pid, other),
        }
    }

    /// Let the clock run until `pid` is scheduled: every other process
    /// simply absorbs a timer interrupt. Returns `pid`'s result.
    pub fn run_until(&mut self, target: Pid) -> i32 {
        for _ in 0..1000 {
            match self.resume() {
                Event::Run { pid, result } if pid == target => return result,
                Event::Run { .. } => self.tick(),
                other => panic!("unexpected {:?} while waiting for pid {}", other, target),
            }
        }
        panic!("pid {} never ran", target);
    }

    /// Issue a request as the process the last `resume` reported.
    pub fn call(&mut self, request: Request) {
        self.kernel.dispatch(request);
    }

    /// Finish the innermost handler of `pid` the way the trampoline
    /// does.
    pub fn sigreturn(&mut self, pid: Pid) {
        let cntx = self
            .cntx_stack
            .get_mut(&pid)
            .and_then(Vec::pop)
            .expect("sigreturn without an active handler");
        self.entered.remove(&(pid, cntx - SIG_FRAME_SIZE));
        self.kernel.dispatch(Request::SigReturn { old_sp: cntx });
    }

    /// Deliver one timer interrupt to whoever currently holds the CPU.
    pub fn tick(&mut self) {
        self.kernel.dispatch(Request::TimerInterrupt);
    }

    pub fn ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// One keystroke: queue the scan code at the controller and raise
    /// the keyboard interrupt.
    pub fn interrupt_key(&mut self, code: u8) {
        self.ports.push_read(0x64, 0x01);
        self.ports.push_read(0x60, code);
        self.kernel.dispatch(Request::KeyboardInterrupt);
    }

    /// Type a character, pressing and releasing shift around uppercase.
    pub fn type_char(&mut self, ch: char) {
        if ch.is_ascii_uppercase() {
            self.interrupt_key(0x2a);
            self.interrupt_key(scancode(ch.to_ascii_lowercase()));
            self.interrupt_key(0x2a | 0x80);
        } else {
            self.interrupt_key(scancode(ch));
        }
    }

    pub fn type_str(&mut self, s: &str) {
        for ch in s.chars() {
            self.type_char(ch);
        }
    }

    /// Type Ctrl-D, the default end-of-file character.
    pub fn type_ctrl_d(&mut self) {
        self.interrupt_key(0x1d);
        self.interrupt_key(scancode('d'));
        self.interrupt_key(0x1d | 0x80);
    }

    /// A user-memory address inside `pid`'s stack, safely away from the
    /// context frames at the top.
    pub fn scratch(&self, pid: Pid, offset: usize) -> usize {
        let (base, _len) = self
            .kernel
            .process_stack_region(pid)
            .expect("no stack region for pid");
        base + offset
    }

    pub fn read_u32(&self, addr: usize) -> u32 {
        self.kernel.user_memory().read_u32(addr)
    }

    pub fn write_u32(&mut self, addr: usize, value: u32) {
        self.kernel.user_memory_mut().write_u32(addr, value);
    }

    pub fn read_bytes(&self, addr: usize, len: usize) -> Vec<u8> {
        self.kernel.user_memory().bytes(addr, len).to_vec()
    }

    /// Write a NUL-terminated string into user memory.
    pub fn write_cstr(&mut self, addr: usize, s: &str) {
        self.kernel.user_memory_mut().write_bytes(addr, s.as_bytes());
        self.kernel.user_memory_mut().write_u8(addr + s.len(), 0);
    }

    /// Issue a receive on behalf of `caller`: the sender filter goes
    /// into scratch memory first, as user code would. Returns the two
    /// out-parameter addresses.
    pub fn recv_from(&mut self, caller: Pid, from: Pid) -> (usize, usize) {
        let from_ptr = self.scratch(caller, 8);
        let word_ptr = self.scratch(caller, 16);
        self.write_u32(from_ptr, from);
        self.call(Request::Recv { from_ptr, word_ptr });
        (from_ptr, word_ptr)
    }
}

/// US-layout make code for the characters the tests type.
pub fn scancode(ch: char) -> u8 {
    match ch {
        '1' => 0x02, '2' => 0x03, '3' => 0x04, '4' => 0x05, '5' => 0x06,
        '6' => 0x07, '7' => 0x08, '8' => 0x09, '9' => 0x0a, '0' => 0x0b,
        'q' => 0x10, 'w' => 0x11, 'e' => 0x12, 'r' => 0x13, 't' => 0x14,
        'y' => 0x15, 'u' => 0x16, 'i' => 0x17, 'o' => 0x18, 'p' => 0x19,
        'a' => 0x1e, 's' => 0x1f, 'd' => 0x20, 'f' => 0x21, 'g' => 0x22,
        'h' => 0x23, 'j' => 0x24, 'k' => 0x25, 'l' => 0x26,
        'z' => 0x2c, 'x' => 0x2d, 'c' => 0x2e, 'v' => 0x2f, 'b' => 0x30,
        'n' => 0x31, 'm' => 0x32,
        ',' => 0x33, '.' => 0x34, '/' => 0x35, ' ' => 0x39, '\n' => 0x1c,
        other => panic!("no scan code mapped for {:?}", other),
    }
}

/// Entry-point addresses for harness processes. The values only need to
/// be distinct and valid.
pub const ENTRY_A: usize = 0x2000;
pub const ENTRY_B: usize = 0x2100;
pub const ENTRY_C: usize = 0x2200;
pub const ENTRY_D: usize = 0x2300;

/// Handler addresses installed by tests.
pub const HANDLER_1: usize = 0x3000;
pub const HANDLER_2: usize = 0x3100;
pub const HANDLER_3: usize = 0x3200;
