//! Device-independent interface (DII)
//!
//! Devices are records of operation function pointers in a fixed device
//! table. A process opens a device by major number: the DII finds a free
//! slot in the per-process fd table, invokes the device's open routine,
//! and hands back the descriptor. All further descriptor calls dispatch
//! through the table, so the dispatcher never knows which driver it is
//! talking to.

pub mod input;

use crate::config::{DEVICE_TABLE_SIZE, FD_TABLE_SIZE};
use crate::log_info;
use crate::mm;
use crate::sched::task::Slot;
use crate::sched::Kernel;

/// ioctl command word: change the end-of-file character.
pub const IOCTL_CHANGE_EOF: u64 = 53;
/// ioctl command word: stop echoing input.
pub const IOCTL_ECHO_OFF: u64 = 55;
/// ioctl command word: echo input as it arrives.
pub const IOCTL_ECHO_ON: u64 = 56;

/// Typed ioctl payload, decoded from the raw command word and its
/// argument before it reaches a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlRequest {
    /// Replace the end-of-file character.
    ChangeEof { ch: u32 },
    /// Disable echo.
    EchoOff,
    /// Enable echo.
    EchoOn,
    /// Any command this kernel does not define; drivers reject it.
    Other(u64),
}

/// One device table entry: identification plus the operation vector.
///
/// Every operation receives the kernel and the slot of the calling
/// process, mirroring the system call it implements. Reads and writes
/// take a user buffer address and length and return a byte count, an
/// error code, or the would-block sentinel.
#[derive(Debug, Clone, Copy)]
pub struct DevSw {
    /// Major device number, the index into the device table.
    pub num: u32,
    /// Device node name, for diagnostics.
    pub name: &'static str,
    pub init: fn(&mut Kernel) -> i32,
    pub open: fn(&mut Kernel, Slot, u32) -> i32,
    pub close: fn(&mut Kernel, Slot) -> i32,
    pub read: fn(&mut Kernel, Slot, usize, usize) -> i32,
    pub write: fn(&mut Kernel, Slot, usize, usize) -> i32,
    pub ioctl: fn(&mut Kernel, Slot, IoctlRequest) -> i32,
}

impl Kernel {
    /// Initialize every device in the table. Called once at boot, after
    /// the dispatcher state exists.
    pub(crate) fn di_init(&mut self) {
        for major in 0..DEVICE_TABLE_SIZE {
            let dev = self.device_table[major];
            (dev.init)(self);
            log_info!("DII", "device {} ({}) initialized", major, dev.name);
        }
    }

    /// DII call for sysopen. Returns a descriptor in 0..4, or -1.
    pub(crate) fn di_open(&mut self, slot: Slot, device_no: i32) -> i32 {
        if !(0..DEVICE_TABLE_SIZE as i32).contains(&device_no) {
            return -1;
        }
        let Some(fd) = self.pcbs[slot].fd_table.iter().position(|e| e.is_none()) else {
            return -1;
        };
        let dev = self.device_table[device_no as usize];
        if (dev.open)(self, slot, device_no as u32) != 0 {
            return -1;
        }
        self.pcbs[slot].fd_table[fd] = Some(device_no as usize);
        fd as i32
    }

    /// DII call for sysclose. Returns 0, or -1 on a bad descriptor.
    pub(crate) fn di_close(&mut self, slot: Slot, fd: i32) -> i32 {
        if !self.valid_fd(slot, fd) {
            return -1;
        }
        let major = self.pcbs[slot].fd_table[fd as usize].unwrap();
        let dev = self.device_table[major];
        if (dev.close)(self, slot) != 0 {
            return -1;
        }
        self.pcbs[slot].fd_table[fd as usize] = None;
        0
    }

    /// DII call for syswrite. Returns bytes written or -1.
    pub(crate) fn di_write(&mut self, slot: Slot, fd: i32, buf: usize, len: usize) -> i32 {
        if !mm::valid_buf(buf, len) || !self.valid_fd(slot, fd) {
            return -1;
        }
        let major = self.pcbs[slot].fd_table[fd as usize].unwrap();
        (self.device_table[major].write)(self, slot, buf, len)
    }

    /// DII call for sysread. Returns bytes read, 0 for end-of-file, -1
    /// on error, or the would-block sentinel the dispatcher turns into a
    /// blocked caller.
    pub(crate) fn di_read(&mut self, slot: Slot, fd: i32, buf: usize, len: usize) -> i32 {
        if !mm::valid_buf(buf, len) || !self.valid_fd(slot, fd) {
            return -1;
        }
        let major = self.pcbs[slot].fd_table[fd as usize].unwrap();
        (self.device_table[major].read)(self, slot, buf, len)
    }

    /// DII call for sysioctl. Returns 0 or -1.
    pub(crate) fn di_ioctl(&mut self, slot: Slot, fd: i32, req: IoctlRequest) -> i32 {
        if !self.valid_fd(slot, fd) {
            return -1;
        }
        let major = self.pcbs[slot].fd_table[fd as usize].unwrap();
        (self.device_table[major].ioctl)(self, slot, req)
    }

    /// A descriptor is valid when it is in range and names an open
    /// device.
    fn valid_fd(&self, slot: Slot, fd: i32) -> bool {
        (0..FD_TABLE_SIZE as i32).contains(&fd)
            && self.pcbs[slot].fd_table[fd as usize].is_some()
    }
}
