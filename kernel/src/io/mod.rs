//! Hardware seams consumed by the kernel nucleus
//!
//! The nucleus never touches hardware directly. Port I/O, the interrupt
//! controller, and the console are traits supplied by the embedder: the
//! bare-metal build wires them to the real ports and the 8259, host-side
//! tests wire them to scripted fakes.

pub mod irq;
pub mod port;

/// Byte-oriented output device used for `sysputs` and keyboard echo.
pub trait Console {
    /// Write a single byte to the console.
    fn putc(&mut self, ch: u8);

    /// Write a run of bytes to the console.
    fn puts(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.putc(b);
        }
    }
}

/// Console that discards all output.
pub struct NullConsole;

impl Console for NullConsole {
    fn putc(&mut self, _ch: u8) {}
}
