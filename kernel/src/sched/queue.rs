//! Process queues
//!
//! Queues are intrusive: a PCB carries `prev`/`next` slot indices and sits
//! on at most one queue at a time, so enqueue, dequeue, and removal are
//! all O(1). The queue itself is just a head/tail pair over the process
//! table arena, which every operation receives by reference.
//!
//! The delta list for sleeping processes is singly linked through `next`
//! and stores, in each PCB's `key`, the wake delay relative to its
//! predecessor.

use super::task::{Process, Slot};

/// Intrusive FIFO of processes. Enqueue at the tail, dequeue at the head.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcQueue {
    head: Option<Slot>,
    tail: Option<Slot>,
    len: usize,
}

impl ProcQueue {
    pub const fn new() -> Self {
        Self { head: None, tail: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn peek_head(&self) -> Option<Slot> {
        self.head
    }

    pub fn peek_tail(&self) -> Option<Slot> {
        self.tail
    }

    /// Add a process to the tail of the queue.
    pub fn enqueue(&mut self, table: &mut [Process], slot: Slot) {
        debug_assert!(table[slot].prev.is_none() && table[slot].next.is_none());
        table[slot].prev = self.tail;
        table[slot].next = None;
        match self.tail {
            Some(t) => table[t].next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.len += 1;
    }

    /// Remove and return the process at the head of the queue.
    pub fn dequeue(&mut self, table: &mut [Process]) -> Option<Slot> {
        let slot = self.head?;
        self.head = table[slot].next;
        match self.head {
            Some(n) => table[n].prev = None,
            None => self.tail = None,
        }
        table[slot].prev = None;
        table[slot].next = None;
        self.len -= 1;
        Some(slot)
    }

    /// Unlink a process from the middle of the queue. The caller must
    /// know the process is on this queue.
    pub fn remove(&mut self, table: &mut [Process], slot: Slot) {
        debug_assert!(self.contains(table, slot));
        let prev = table[slot].prev;
        let next = table[slot].next;
        match prev {
            Some(p) => table[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => table[n].prev = prev,
            None => self.tail = prev,
        }
        table[slot].prev = None;
        table[slot].next = None;
        self.len -= 1;
    }

    /// Whether `slot` is linked into this queue. O(n), used for
    /// diagnostics and tests.
    pub fn contains(&self, table: &[Process], slot: Slot) -> bool {
        let mut cur = self.head;
        while let Some(s) = cur {
            if s == slot {
                return true;
            }
            cur = table[s].next;
        }
        false
    }
}

/// Singly linked list of sleeping processes ordered by wake time, each
/// node keyed by its delay relative to the previous node.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaList {
    head: Option<Slot>,
    len: usize,
}

impl DeltaList {
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn peek(&self) -> Option<Slot> {
        self.head
    }

    /// Insert a process with `delay` ticks of total sleep. Equal delays
    /// keep insertion order, so the earlier sleeper wakes first.
    pub fn insert(&mut self, table: &mut [Process], slot: Slot, mut delay: i32) {
        debug_assert!(delay >= 0);
        debug_assert!(table[slot].next.is_none());

        let Some(first) = self.head else {
            table[slot].key = delay;
            self.head = Some(slot);
            self.len += 1;
            return;
        };

        let mut prev: Option<Slot> = None;
        let mut cur = Some(first);
        while let Some(c) = cur {
            if delay < table[c].key {
                // The new process wakes before `c`: it takes over part of
                // c's relative delay.
                table[slot].key = delay;
                table[slot].next = Some(c);
                table[c].key -= delay;
                match prev {
                    Some(p) => table[p].next = Some(slot),
                    None => self.head = Some(slot),
                }
                self.len += 1;
                return;
            }
            delay -= table[c].key;
            prev = cur;
            cur = table[c].next;
        }

        // Wakes after everything currently queued.
        table[slot].key = delay;
        table[prev.unwrap()].next = Some(slot);
        self.len += 1;
    }

    /// Remove and return the first process in the list. Its residual key
    /// is credited to the successor, if there is one.
    pub fn poll(&mut self, table: &mut [Process]) -> Option<Slot> {
        let slot = self.head?;
        let next = table[slot].next;
        if let Some(n) = next {
            table[n].key += table[slot].key;
        }
        self.head = next;
        table[slot].prev = None;
        table[slot].next = None;
        self.len -= 1;
        Some(slot)
    }

    /// Unlink an arbitrary process and return the absolute number of
    /// ticks it still had to sleep.
    ///
    /// Halts the kernel if the process is not on the list; callers vouch
    /// for membership.
    pub fn remove(&mut self, table: &mut [Process], slot: Slot) -> i32 {
        assert!(self.len > 0, "delta list: remove from empty list");

        if self.head == Some(slot) {
            let remaining = table[slot].key;
            self.poll(table);
            return remaining;
        }

        let mut prev = self.head.expect("delta list: empty despite nonzero len");
        let mut acc = table[prev].key;
        let mut cur = table[prev].next;
        while let Some(c) = cur {
            if c == slot {
                table[prev].next = table[c].next;
                if let Some(n) = table[c].next {
                    table[n].key += table[c].key;
                }
                acc += table[c].key;
                table[c].prev = None;
                table[c].next = None;
                self.len -= 1;
                return acc;
            }
            prev = c;
            acc += table[c].key;
            cur = table[c].next;
        }

        panic!("delta list: process {} is not on the list", table[slot].pid);
    }
}
