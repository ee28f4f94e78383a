//! PS/2 keyboard driver
//!
//! Two device table entries share this one piece of hardware: major 0
//! reads silently, major 1 echoes characters as they arrive. At most one
//! of the two may be open anywhere in the system.
//!
//! The driver is split in the classic two halves. The lower half is the
//! interrupt service routine: it reads scan codes from the controller,
//! tracks modifier state, translates to ASCII, and feeds a small
//! type-ahead ring buffer. The upper half implements the descriptor
//! operations; a read that cannot be satisfied from the ring buffer
//! reports the would-block sentinel, and the lower half completes it as
//! further keys arrive.

use crate::drivers::{DevSw, IoctlRequest};
use crate::io::irq::KEYBOARD_IRQ;
use crate::log_debug;
use crate::sched::task::{BlockKind, Slot};
use crate::sched::Kernel;
use crate::sys::syscall::READ_WOULD_BLOCK;
use bitflags::bitflags;

/// Major number of the silent keyboard device.
pub const KBD_0: u32 = 0;
/// Major number of the echoing keyboard device.
pub const KBD_1: u32 = 1;

/// Scan codes are read from here.
const DATA_PORT: u16 = 0x60;
/// Status reads and controller commands go through here.
const CONTROL_PORT: u16 = 0x64;
/// Low status bit set means a byte is waiting on the data port.
const CONTROL_READY_MASK: u8 = 0x01;
/// Controller command: enable the keyboard.
const ENABLE_KEYBOARD: u8 = 0xae;
/// Controller command: disable the keyboard.
const DISABLE_KEYBOARD: u8 = 0xad;

/// End-of-file character a fresh keyboard starts with (Ctrl-D).
pub const DEFAULT_EOF: u8 = 0x04;

/// Ring buffer cells. One cell always stays empty, so four characters
/// of type-ahead fit.
const KBD_BUFFER_SIZE: usize = 4 + 1;

/// High bit of a scan code marks a key-up event.
const KEY_UP: u8 = 0x80;

const LSHIFT: u8 = 0x2a;
const RSHIFT: u8 = 0x36;
const LMETA: u8 = 0x38;
const LCTL: u8 = 0x1d;
const CAPSL: u8 = 0x3a;

bitflags! {
    /// Modifier keys currently held down.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KbdState: u8 {
        const CTL = 0x01;
        const SHIFT = 0x02;
        const CAPSLOCK = 0x04;
        const META = 0x08;
    }
}

/// Plain scan code to ASCII translation, US layout.
static KBCODE: [u8; 58] = [
    0, 27, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 8, b'\t',
    b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n', 0, b'a',
    b's', b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`', 0, b'\\', b'z', b'x',
    b'c', b'v', b'b', b'n', b'm', b',', b'.', b'/', 0, 0, 0, b' ',
];

/// Shifted translation table.
static KBSHIFT: [u8; 58] = [
    0, 0, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 8, b'\t',
    b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\n', 0, b'A',
    b'S', b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~', 0, b'|', b'Z', b'X',
    b'C', b'V', b'B', b'N', b'M', b'<', b'>', b'?', 0, 0, 0, b' ',
];

/// Control-key translation table.
static KBCTL: [u8; 51] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 31, 0, 8, b'\t',
    17, 23, 5, 18, 20, 25, 21, 9, 15, 16, 27, 29, b'\n', 0, 1,
    19, 4, 6, 7, 8, 10, 11, 12, 0, 0, 0, 0, 28, 26, 24,
    3, 22, 2, 14, 13,
];

/// Driver state shared by the two halves.
#[derive(Debug)]
pub(crate) struct Keyboard {
    buf: [u8; KBD_BUFFER_SIZE],
    head: usize,
    tail: usize,
    /// User buffer of the read in progress, if any
    read_buf: Option<usize>,
    read_buflen: usize,
    /// Characters already moved to the user buffer of the current read
    pub(crate) chars_transferred: i32,
    /// The pending read has been completed by the lower half
    read_finished: bool,
    eof_char: u8,
    eof_seen: bool,
    echo: bool,
    /// Process holding the keyboard open, if any
    pub(crate) owner: Option<Slot>,
    state: KbdState,
}

impl Keyboard {
    pub(crate) fn new() -> Self {
        Self {
            buf: [0; KBD_BUFFER_SIZE],
            head: 0,
            tail: 0,
            read_buf: None,
            read_buflen: 0,
            chars_transferred: 0,
            read_finished: false,
            eof_char: DEFAULT_EOF,
            eof_seen: false,
            echo: false,
            owner: None,
            state: KbdState::empty(),
        }
    }

    /// Return the driver to its power-on state. Echo mode and ownership
    /// are managed by open and close, not here.
    fn reset(&mut self) {
        self.buf = [0; KBD_BUFFER_SIZE];
        self.head = 0;
        self.tail = 0;
        self.abort_read();
        self.eof_char = DEFAULT_EOF;
        self.eof_seen = false;
        self.state = KbdState::empty();
    }

    /// Forget the read in progress, if any.
    pub(crate) fn abort_read(&mut self) {
        self.read_buf = None;
        self.read_buflen = 0;
        self.chars_transferred = 0;
        self.read_finished = false;
    }

    fn buf_is_full(&self) -> bool {
        (self.head + 1) % KBD_BUFFER_SIZE == self.tail
    }

    /// Accept a character into the type-ahead buffer. A full buffer
    /// drops the character, whatever it is.
    fn push_char(&mut self, c: u8) -> bool {
        if self.buf_is_full() {
            return false;
        }
        self.buf[self.head] = c;
        self.head = (self.head + 1) % KBD_BUFFER_SIZE;
        true
    }

    fn pop_char(&mut self) -> Option<u8> {
        if self.tail == self.head {
            return None;
        }
        let c = self.buf[self.tail];
        self.tail = (self.tail + 1) % KBD_BUFFER_SIZE;
        Some(c)
    }

    /// Convert a scan code to ASCII, tracking modifier state. Returns
    /// `None` for key-up events, bare modifiers, and codes off the end
    /// of the active table; a 0 result means an untranslatable key.
    fn translate(&mut self, code: u8) -> Option<u8> {
        if code & KEY_UP != 0 {
            match code & 0x7f {
                LSHIFT | RSHIFT => self.state.remove(KbdState::SHIFT),
                CAPSL => self.state.remove(KbdState::CAPSLOCK),
                LCTL => self.state.remove(KbdState::CTL),
                LMETA => self.state.remove(KbdState::META),
                _ => {}
            }
            return None;
        }

        match code {
            LSHIFT | RSHIFT => {
                self.state.insert(KbdState::SHIFT);
                return None;
            }
            CAPSL => {
                self.state.insert(KbdState::CAPSLOCK);
                return None;
            }
            LCTL => {
                self.state.insert(KbdState::CTL);
                return None;
            }
            LMETA => {
                self.state.insert(KbdState::META);
                return None;
            }
            _ => {}
        }

        let caps = self.state.contains(KbdState::CAPSLOCK);
        let mut ch = match KBCODE.get(code as usize) {
            Some(_) if caps => Some(KBSHIFT[code as usize]),
            Some(&plain) => Some(plain),
            None => None,
        };
        if self.state.contains(KbdState::SHIFT) {
            if code as usize >= KBSHIFT.len() {
                return None;
            }
            ch = Some(if caps { KBCODE[code as usize] } else { KBSHIFT[code as usize] });
        }
        if self.state.contains(KbdState::CTL) {
            if code as usize >= KBCTL.len() {
                return None;
            }
            ch = Some(KBCTL[code as usize]);
        }
        if self.state.contains(KbdState::META) {
            ch = ch.map(|c| c.wrapping_add(0x80));
        }
        ch
    }
}

/// Build the device table entry for one keyboard major number.
pub(crate) fn kbd_devsw(major: u32) -> DevSw {
    DevSw {
        num: major,
        name: if major == KBD_0 { "/dev/keyboard0" } else { "/dev/keyboard1" },
        init: kbd_init,
        open: kbd_open,
        close: kbd_close,
        read: kbd_read,
        write: kbd_write,
        ioctl: kbd_ioctl,
    }
}

/// Device init: clear state and drain any byte a previous life of the
/// controller left pending.
fn kbd_init(k: &mut Kernel) -> i32 {
    k.kbd.reset();
    k.ports.inb(DATA_PORT);
    k.ports.inb(CONTROL_PORT);
    0
}

/// Device open. Only one keyboard instance may be open system-wide; the
/// major number chooses echo or silent mode.
fn kbd_open(k: &mut Kernel, slot: Slot, device_no: u32) -> i32 {
    if k.kbd.owner.is_some() {
        return -1;
    }
    k.kbd.reset();
    k.kbd.echo = device_no == KBD_1;
    k.kbd.owner = Some(slot);

    k.ports.outb(CONTROL_PORT, ENABLE_KEYBOARD);
    k.pic.set_irq_mask(KEYBOARD_IRQ, false);
    0
}

fn kbd_close(k: &mut Kernel, _slot: Slot) -> i32 {
    k.kbd.reset();
    k.kbd.echo = false;
    k.kbd.owner = None;
    k.kbd_disable_hardware();
    0
}

/// Upper half of read. After end-of-file every read reports 0. A read
/// the ring buffer can finish (length reached, newline, or the EOF
/// character) returns its count at once; anything else leaves the
/// request with the lower half and asks the dispatcher to block the
/// caller.
fn kbd_read(k: &mut Kernel, _slot: Slot, buf: usize, len: usize) -> i32 {
    if k.kbd.eof_seen {
        return 0;
    }
    k.kbd.read_buf = Some(buf);
    k.kbd.read_buflen = len;
    k.kbd.chars_transferred = 0;
    k.kbd.read_finished = false;

    if k.kbd_transfer_to_read_buf() {
        let n = k.kbd.chars_transferred;
        k.kbd.abort_read();
        return n;
    }
    READ_WOULD_BLOCK
}

/// The keyboard is input-only.
fn kbd_write(_k: &mut Kernel, _slot: Slot, _buf: usize, _len: usize) -> i32 {
    -1
}

fn kbd_ioctl(k: &mut Kernel, _slot: Slot, req: IoctlRequest) -> i32 {
    match req {
        IoctlRequest::ChangeEof { ch } => {
            if (1..=127).contains(&ch) {
                k.kbd.eof_char = ch as u8;
                0
            } else {
                -1
            }
        }
        IoctlRequest::EchoOff => {
            k.kbd.echo = false;
            0
        }
        IoctlRequest::EchoOn => {
            k.kbd.echo = true;
            0
        }
        IoctlRequest::Other(_) => -1,
    }
}

impl Kernel {
    /// Keyboard interrupt service routine, the driver's lower half.
    ///
    /// Runs only while some process holds the keyboard open, because the
    /// IRQ line is masked otherwise.
    pub(crate) fn kbd_isr(&mut self) {
        assert!(self.kbd.owner.is_some(), "keyboard interrupt with no open device");

        if self.ports.inb(CONTROL_PORT) & CONTROL_READY_MASK == 0 {
            return;
        }
        let code = self.ports.inb(DATA_PORT);
        let Some(c) = self.kbd.translate(code) else {
            return;
        };
        if !(1..=127).contains(&c) {
            return;
        }

        if self.kbd.push_char(c) {
            self.metrics.kbd_bytes_buffered += 1;
        } else {
            self.metrics.kbd_bytes_dropped += 1;
        }
        if self.kbd.echo {
            self.console.putc(c);
        }

        if self.kbd.read_buf.is_some() && !self.kbd.read_finished {
            if self.kbd_transfer_to_read_buf() {
                self.kbd.read_finished = true;
                let owner = self.kbd.owner.expect("read in progress with no owner");
                if self.pcbs[owner].block_kind == BlockKind::Read {
                    self.kbd_finish_read(owner);
                }
            }
        }
    }

    /// Drain the ring buffer into the user buffer of the read in
    /// progress. Returns whether the read is complete: length reached,
    /// newline delivered, or end-of-file hit.
    fn kbd_transfer_to_read_buf(&mut self) -> bool {
        let buf = self.kbd.read_buf.expect("transfer without a read in progress");
        while let Some(c) = self.kbd.pop_char() {
            if c == self.kbd.eof_char {
                self.kbd.eof_seen = true;
                self.kbd_disable_hardware();
                return true;
            }
            let done = self.kbd.chars_transferred as usize;
            self.mem.write_u8(buf + done, c);
            self.kbd.chars_transferred += 1;
            if self.kbd.chars_transferred as usize == self.kbd.read_buflen || c == b'\n' {
                return true;
            }
        }
        false
    }

    /// Complete a blocked read: report the transfer count and ready the
    /// reader.
    fn kbd_finish_read(&mut self, owner: Slot) {
        let n = self.kbd.chars_transferred;
        self.kbd.abort_read();
        log_debug!("KBD", "blocked read completed with {} bytes", n);
        self.unblock(owner, n);
    }

    /// Turn the keyboard off at the controller and mask its IRQ line.
    fn kbd_disable_hardware(&mut self) {
        self.ports.outb(CONTROL_PORT, DISABLE_KEYBOARD);
        self.pic.set_irq_mask(KEYBOARD_IRQ, true);
    }
}
