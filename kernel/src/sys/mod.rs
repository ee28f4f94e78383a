//! System-call surface
//!
//! `syscall` owns the numbered ABI: call numbers, register decoding, the
//! stable result codes, and the layout of the user-visible process status
//! table. `ipc` implements the message-passing rendezvous behind the send
//! and receive calls.

pub mod ipc;
pub mod syscall;
