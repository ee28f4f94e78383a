//! Configuration constants for the VireoOS kernel

/// Number of slots in the process table.
pub const PCB_TABLE_SIZE: usize = 32;

/// Number of priority levels. Priority 0 is the highest, 3 the lowest.
pub const NUM_PRIORITIES: usize = 4;

/// Priority assigned to newly created processes.
pub const INIT_PRIORITY: u8 = 3;

/// Length of one scheduler time slice in milliseconds (100 Hz timer).
pub const TIME_SLICE_MS: u32 = 10;

/// Minimum (and default) process stack size in bytes. Smaller requests
/// are silently promoted to this size.
pub const PROCESS_STACK_SIZE: usize = 8192;

/// Stack size of the idle process. The idle process never calls into the
/// kernel, so a very small stack is enough.
pub const IDLE_PROCESS_STACK_SIZE: usize = 512;

/// Number of signals supported per process (0..=31).
pub const SIGNAL_TABLE_SIZE: usize = 32;

/// Number of file descriptors each process can hold at once.
pub const FD_TABLE_SIZE: usize = 4;

/// Number of entries in the system device table.
pub const DEVICE_TABLE_SIZE: usize = 2;

/// Allocation granularity of the stack allocator (one x86 paragraph).
pub const PARAGRAPH_SIZE: usize = 16;

/// Top of physical memory as seen by the kernel.
pub const MAX_ADDR: usize = 0x40_0000;

/// Start of the conventional-memory hole (video RAM and adapter ROMs).
pub const HOLE_START: usize = 0xA_0000;

/// First byte past the hole.
pub const HOLE_END: usize = 0x10_0000;

/// First byte past the kernel image. Free memory starts here.
pub const KERNEL_END: usize = 0x1_0000;

/// Interrupt vector the system-call software interrupt arrives on.
pub const SYSCALL_INTERRUPT_NUMBER: u8 = 67;

/// Interrupt vector the timer IRQ is remapped to.
pub const TIMER_INTERRUPT_NUMBER: u8 = 32;

/// Interrupt vector the keyboard IRQ is remapped to.
pub const KEYBOARD_INTERRUPT_NUMBER: u8 = 33;

/// EFLAGS image loaded for every user context: interrupts enabled, IOPL 3.
pub const EFLAGS_USER: u32 = 0x0000_3200;

/// Code segment selector stored in fabricated interrupt frames.
pub const CODE_SELECTOR: u32 = 0x08;

/// Address of the process-exit stub in the system image. It is planted as
/// the return address of every process and as the fixed handler of the
/// hard-kill signal, so both "running off the end" and a hard kill trap
/// into the stop path.
pub const EXIT_STUB_ADDR: usize = 0xE000;

/// Address of the signal trampoline in the system image. Signal delivery
/// fabricates a context frame that resumes here; the trampoline calls the
/// handler and then issues sigreturn.
pub const SIGTRAMP_ADDR: usize = 0xE040;

/// Address of the idle loop in the system image.
pub const IDLE_STUB_ADDR: usize = 0xE080;
