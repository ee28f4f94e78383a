//! System-call ABI
//!
//! User code enters the kernel through a software interrupt with the call
//! number in EAX and a pointer to the marshalled arguments in EDX. The
//! context switcher captures up to three argument words; `decode` turns
//! that raw pair into a typed `Request` for the dispatcher. Unknown call
//! numbers decode to `None` and are rejected before any state changes.
//!
//! The negative result codes below are ABI: user programs match on the
//! exact values.

use crate::config::PCB_TABLE_SIZE;
use crate::drivers::{self, IoctlRequest};
use crate::sched::context::Request;

pub const SYS_CREATE: u32 = 0;
pub const SYS_YIELD: u32 = 1;
pub const SYS_STOP: u32 = 2;
pub const SYS_GETPID: u32 = 3;
pub const SYS_PUTS: u32 = 4;
pub const SYS_KILL: u32 = 5;
pub const SYS_SETPRIO: u32 = 6;
pub const SYS_SEND: u32 = 7;
pub const SYS_RECV: u32 = 8;
pub const SYS_SLEEP: u32 = 9;
pub const SYS_GETCPUTIMES: u32 = 10;
pub const SYS_SIGHANDLER: u32 = 11;
pub const SYS_SIGRETURN: u32 = 12;
pub const SYS_WAIT: u32 = 13;
pub const SYS_OPEN: u32 = 14;
pub const SYS_CLOSE: u32 = 15;
pub const SYS_WRITE: u32 = 16;
pub const SYS_READ: u32 = 17;
pub const SYS_IOCTL: u32 = 18;

/// General failure.
pub const SYSERR: i32 = -1;

/// A blocked call was interrupted by signal delivery.
pub const INTERRUPTED_BY_SIGNAL: i32 = -666;

/// send: the receiver terminated before the rendezvous.
pub const SEND_PEER_DIED: i32 = -1;
/// send: no such receiving process.
pub const SEND_NO_SUCH_PROCESS: i32 = -2;
/// send: a process may not send to itself.
pub const SEND_SELF: i32 = -3;

/// recv: the sender terminated before the rendezvous.
pub const RECV_PEER_DIED: i32 = -1;
/// recv: no such sending process.
pub const RECV_NO_SUCH_PROCESS: i32 = -2;
/// recv: a process may not receive from itself.
pub const RECV_SELF: i32 = -3;
/// recv: the word destination address is invalid.
pub const RECV_BAD_WORD_PTR: i32 = -4;
/// recv: the sender-PID address is invalid.
pub const RECV_BAD_FROM_PTR: i32 = -5;
/// recv-any: the caller is the only user process left.
pub const RECV_ONLY_PROCESS: i32 = -10;

/// kill: no such target process.
pub const KILL_NO_SUCH_PROCESS: i32 = -514;
/// kill: signal number out of range.
pub const KILL_BAD_SIGNAL: i32 = -583;

/// sighandler: signal number invalid or not reassignable.
pub const SIGHANDLER_BAD_SIGNAL: i32 = -1;
/// sighandler: handler address invalid.
pub const SIGHANDLER_BAD_HANDLER: i32 = -2;
/// sighandler: old-handler output address invalid.
pub const SIGHANDLER_BAD_OLD_PTR: i32 = -3;

/// getcputimes: status table address falls in the adapter hole.
pub const CPUTIMES_ADDR_IN_HOLE: i32 = -1;
/// getcputimes: status table extends past the top of memory.
pub const CPUTIMES_PAST_END: i32 = -2;

/// Driver-to-dispatcher sentinel: this read must block the caller.
pub const READ_WOULD_BLOCK: i32 = -2;

/// Layout of the user-space process status table filled by getcputimes:
/// a slot-count word followed by four parallel 32-entry word arrays.
pub const PS_PID_OFFSET: usize = 4;
pub const PS_STATE_OFFSET: usize = PS_PID_OFFSET + 4 * PCB_TABLE_SIZE;
pub const PS_BLOCK_OFFSET: usize = PS_STATE_OFFSET + 4 * PCB_TABLE_SIZE;
pub const PS_CPU_MS_OFFSET: usize = PS_BLOCK_OFFSET + 4 * PCB_TABLE_SIZE;
pub const PS_TABLE_SIZE: usize = PS_CPU_MS_OFFSET + 4 * PCB_TABLE_SIZE;

/// Decode a raw `(call, args)` register capture into a typed request.
pub fn decode(call: u32, args: [u32; 3]) -> Option<Request> {
    let req = match call {
        SYS_CREATE => Request::Create {
            entry: args[0] as usize,
            stack_size: args[1] as usize,
        },
        SYS_YIELD => Request::Yield,
        SYS_STOP => Request::Stop,
        SYS_GETPID => Request::GetPid,
        SYS_PUTS => Request::Puts { addr: args[0] as usize },
        SYS_KILL => Request::Kill {
            pid: args[0],
            signal: args[1] as i32,
        },
        SYS_SETPRIO => Request::SetPriority { priority: args[0] as i32 },
        SYS_SEND => Request::Send { dest: args[0], word: args[1] },
        SYS_RECV => Request::Recv {
            from_ptr: args[0] as usize,
            word_ptr: args[1] as usize,
        },
        SYS_SLEEP => Request::Sleep { ms: args[0] },
        SYS_GETCPUTIMES => Request::GetCpuTimes { addr: args[0] as usize },
        SYS_SIGHANDLER => Request::SigHandler {
            signal: args[0] as i32,
            handler: args[1] as usize,
            old_handler_ptr: args[2] as usize,
        },
        SYS_SIGRETURN => Request::SigReturn { old_sp: args[0] as usize },
        SYS_WAIT => Request::Wait { pid: args[0] },
        SYS_OPEN => Request::Open { device: args[0] as i32 },
        SYS_CLOSE => Request::Close { fd: args[0] as i32 },
        SYS_WRITE => Request::Write {
            fd: args[0] as i32,
            buf: args[1] as usize,
            len: args[2] as usize,
        },
        SYS_READ => Request::Read {
            fd: args[0] as i32,
            buf: args[1] as usize,
            len: args[2] as usize,
        },
        SYS_IOCTL => Request::Ioctl {
            fd: args[0] as i32,
            req: decode_ioctl(args[1], args[2]),
        },
        _ => return None,
    };
    Some(req)
}

/// Turn the raw ioctl command word and its single argument word into a
/// typed per-command payload.
fn decode_ioctl(command: u32, arg: u32) -> IoctlRequest {
    match command as u64 {
        drivers::IOCTL_CHANGE_EOF => IoctlRequest::ChangeEof { ch: arg },
        drivers::IOCTL_ECHO_OFF => IoctlRequest::EchoOff,
        drivers::IOCTL_ECHO_ON => IoctlRequest::EchoOn,
        other => IoctlRequest::Other(other),
    }
}
