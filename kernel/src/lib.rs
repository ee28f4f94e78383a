//! VireoOS kernel nucleus
//!
//! A small preemptive kernel for a single-CPU 32-bit x86-class machine:
//! prioritized round-robin dispatch over a fixed process table, word-size
//! rendezvous message passing, a delta-list sleep device, 32-level
//! prioritized signals delivered through a user-space trampoline, and a
//! device-independent driver interface fronting a PS/2 keyboard.
//!
//! The nucleus owns no hardware. Port I/O, interrupt acknowledgement,
//! console output, and the context-switch primitive come in as traits,
//! so the same kernel runs under the bare-metal glue or under a host
//! harness that scripts its processes.
//!
//! ```no_run
//! use vireo_kernel::io::irq::NullInterruptController;
//! use vireo_kernel::io::port::ScriptedPorts;
//! use vireo_kernel::io::NullConsole;
//! use vireo_kernel::Kernel;
//!
//! let mut kernel = Kernel::new(
//!     Box::new(NullConsole),
//!     Box::new(ScriptedPorts::new()),
//!     Box::new(NullInterruptController),
//! );
//! let init = kernel.create(0x2000, 0x4000).unwrap();
//! kernel.start();
//! assert_eq!(kernel.current_pid(), init);
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod drivers;
pub mod io;
pub mod log;
pub mod metrics;
pub mod mm;
pub mod sched;
pub mod signal;
pub mod sys;

pub use sched::context::{ContextSwitch, Request, Resume};
pub use sched::task::{BlockKind, CreateError, Pid, ProcState, Slot};
pub use sched::{Current, Kernel};
