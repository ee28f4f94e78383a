//! Message-passing rendezvous
//!
//! The unit of transfer is one machine word, copied by the kernel from
//! the sender into the receiver's buffer. There is no mailbox: whichever
//! side arrives first blocks on a queue hanging off its peer's PCB, and
//! the second arrival completes the transfer and readies both parties.
//!
//! Per-pair ordering is FIFO because the blocked queues are FIFO, and a
//! receive-any consumes the earliest blocked sender first.

use crate::sched::task::{BlockKind, IpcArgs, ProcState, Q_SENDERS, Slot};
use crate::sched::Kernel;

impl Kernel {
    /// Kernel side of a directed send from `sender` to `receiver`, both
    /// already validated by the dispatcher.
    ///
    /// Returns 0 when the word was delivered to a waiting receiver, or
    /// -1 after blocking the sender until the matching receive.
    pub(crate) fn ipc_send(&mut self, sender: Slot, receiver: Slot, word: u32) -> i32 {
        // A receiver is a match if it blocked on us specifically or sits
        // on the receive-any queue.
        let matched = self.remove_from_blocked(receiver, sender, BlockKind::Receiver)
            || self.remove_from_receive_any(receiver);
        if matched {
            let IpcArgs::Recv { from_ptr, word_ptr } = self.pcbs[receiver].ipc_args else {
                panic!("blocked receiver without receive arguments");
            };
            self.mem.write_u32(from_ptr, self.pcbs[sender].pid);
            self.mem.write_u32(word_ptr, word);
            self.metrics.inc_messages_delivered();
            self.unblock(receiver, 0);
            return 0;
        }

        // Send before the matching receive: park on the receiver's queue
        // of senders until it asks for us.
        self.enqueue_blocked(sender, receiver, BlockKind::Sender);
        -1
    }

    /// Kernel side of a receive by `receiver`. `sender` is the validated
    /// source process, or `None` for a receive-any.
    ///
    /// Returns 0 when a word was transferred, or -1 after blocking the
    /// receiver.
    pub(crate) fn ipc_recv(
        &mut self,
        receiver: Slot,
        sender: Option<Slot>,
        from_ptr: usize,
        word_ptr: usize,
    ) -> i32 {
        let Some(sender) = sender else {
            return self.ipc_recv_any(receiver, from_ptr, word_ptr);
        };

        if self.remove_from_blocked(sender, receiver, BlockKind::Sender) {
            let IpcArgs::Send { word } = self.pcbs[sender].ipc_args else {
                panic!("blocked sender without a send word");
            };
            self.mem.write_u32(word_ptr, word);
            self.metrics.inc_messages_delivered();
            self.unblock(sender, 0);
            return 0;
        }

        // Receive before the matching send: park on the sender's queue of
        // receivers.
        self.enqueue_blocked(receiver, sender, BlockKind::Receiver);
        -1
    }

    /// Receive from whichever process sent first. The earliest blocked
    /// sender wins; with none waiting, the receiver joins the global
    /// receive-any queue.
    fn ipc_recv_any(&mut self, receiver: Slot, from_ptr: usize, word_ptr: usize) -> i32 {
        let mut senders = self.pcbs[receiver].blocked[Q_SENDERS];
        let first = senders.dequeue(&mut self.pcbs);
        self.pcbs[receiver].blocked[Q_SENDERS] = senders;

        if let Some(sender) = first {
            let IpcArgs::Send { word } = self.pcbs[sender].ipc_args else {
                panic!("blocked sender without a send word");
            };
            self.mem.write_u32(word_ptr, word);
            self.mem.write_u32(from_ptr, self.pcbs[sender].pid);
            self.metrics.inc_messages_delivered();
            self.unblock(sender, 0);
            return 0;
        }

        self.pcbs[receiver].state = ProcState::Blocked;
        self.pcbs[receiver].block_kind = BlockKind::ReceiveAny;
        self.receive_any_queue.enqueue(&mut self.pcbs, receiver);
        -1
    }
}
