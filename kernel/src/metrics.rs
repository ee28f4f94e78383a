//! Kernel metrics collection
//!
//! Tracks system-wide counters for observability. The nucleus is single
//! threaded (all state sits behind one `&mut Kernel`), so plain integers
//! are enough. Nothing in the syscall surface exposes these; they exist
//! for the embedder and for tests.

/// Global system counters, owned by the kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelMetrics {
    /// Timer interrupts serviced
    pub timer_ticks: u64,
    /// Resumptions of a process by the dispatcher
    pub context_switches: u64,
    /// Timer interrupts that preempted a running user process
    pub preemptions: u64,
    /// System calls serviced (interrupts excluded)
    pub syscalls: u64,
    /// Signal delivery frames spliced onto user stacks
    pub signals_delivered: u64,
    /// IPC words copied sender to receiver
    pub messages_delivered: u64,
    /// Keyboard characters accepted into the type-ahead buffer
    pub kbd_bytes_buffered: u64,
    /// Keyboard characters dropped because the buffer was full
    pub kbd_bytes_dropped: u64,
}

impl KernelMetrics {
    /// Create a new metrics block with all counters at zero
    pub const fn new() -> Self {
        Self {
            timer_ticks: 0,
            context_switches: 0,
            preemptions: 0,
            syscalls: 0,
            signals_delivered: 0,
            messages_delivered: 0,
            kbd_bytes_buffered: 0,
            kbd_bytes_dropped: 0,
        }
    }

    #[inline]
    pub fn inc_timer_ticks(&mut self) {
        self.timer_ticks += 1;
    }

    #[inline]
    pub fn inc_context_switches(&mut self) {
        self.context_switches += 1;
    }

    #[inline]
    pub fn inc_preemptions(&mut self) {
        self.preemptions += 1;
    }

    #[inline]
    pub fn inc_syscalls(&mut self) {
        self.syscalls += 1;
    }

    #[inline]
    pub fn inc_signals_delivered(&mut self) {
        self.signals_delivered += 1;
    }

    #[inline]
    pub fn inc_messages_delivered(&mut self) {
        self.messages_delivered += 1;
    }
}
