//! Interrupt controller seam
//!
//! The dispatcher acknowledges hardware interrupts and the keyboard driver
//! masks its IRQ line through this trait. The bare-metal embedder backs it
//! with the 8259 pair.

/// IRQ line of the programmable interval timer.
pub const TIMER_IRQ: u8 = 0;

/// IRQ line of the PS/2 keyboard controller.
pub const KEYBOARD_IRQ: u8 = 1;

/// 8259-style interrupt controller operations used by the kernel.
pub trait InterruptController {
    /// Acknowledge the interrupt currently being serviced.
    fn end_of_interrupt(&mut self);

    /// Mask (`true`) or unmask (`false`) a single IRQ line.
    fn set_irq_mask(&mut self, irq: u8, masked: bool);
}

/// Controller that ignores all requests, for embedders that keep the PIC
/// entirely outside the nucleus.
pub struct NullInterruptController;

impl InterruptController for NullInterruptController {
    fn end_of_interrupt(&mut self) {}

    fn set_irq_mask(&mut self, _irq: u8, _masked: bool) {}
}
