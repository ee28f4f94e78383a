//! Signal installation, delivery priority, and interruption of blocked
//! system calls.

mod common;

use common::{Sim, ENTRY_A, ENTRY_B, HANDLER_1, HANDLER_2, HANDLER_3};
use vireo_kernel::config::HOLE_START;
use vireo_kernel::Request;

fn install(sim: &mut Sim, pid: u32, signal: i32, handler: usize) {
    let old_ptr = sim.scratch(pid, 24);
    sim.call(Request::SigHandler { signal, handler, old_handler_ptr: old_ptr });
    assert_eq!(sim.expect_run(pid), 0);
}

#[test]
fn sighandler_validation_codes() {
    let mut sim = Sim::new();
    let a = sim.spawn(ENTRY_A);
    sim.start();
    sim.expect_run(a);

    let old_ptr = sim.scratch(a, 24);

    // Signal 31 is pinned, and out-of-range numbers are rejected.
    sim.call(Request::SigHandler { signal: 31, handler: HANDLER_1, old_handler_ptr: old_ptr });
    assert_eq!(sim.expect_run(a), -1);
    sim.call(Request::SigHandler { signal: 32, handler: HANDLER_1, old_handler_ptr: old_ptr });
    assert_eq!(sim.expect_run(a), -1);
    sim.call(Request::SigHandler { signal: -1, handler: HANDLER_1, old_handler_ptr: old_ptr });
    assert_eq!(sim.expect_run(a), -1);

    sim.call(Request::SigHandler {
        signal: 5,
        handler: HOLE_START + 8,
        old_handler_ptr: old_ptr,
    });
    assert_eq!(sim.expect_run(a), -2);

    sim.call(Request::SigHandler { signal: 5, handler: HANDLER_1, old_handler_ptr: 0 });
    assert_eq!(sim.expect_run(a), -3);
}

#[test]
fn sighandler_reports_and_restores_the_old_handler() {
    let mut sim = Sim::new();
    let a = sim.spawn(ENTRY_A);
    sim.start();
    sim.expect_run(a);

    let old_ptr = sim.scratch(a, 24);

    sim.call(Request::SigHandler { signal: 9, handler: HANDLER_1, old_handler_ptr: old_ptr });
    assert_eq!(sim.expect_run(a), 0);
    assert_eq!(sim.read_u32(old_ptr), 0);

    sim.call(Request::SigHandler { signal: 9, handler: HANDLER_2, old_handler_ptr: old_ptr });
    assert_eq!(sim.expect_run(a), 0);
    assert_eq!(sim.read_u32(old_ptr) as usize, HANDLER_1);

    // Reinstalling what came back leaves the table as it started.
    let old = sim.read_u32(old_ptr) as usize;
    sim.call(Request::SigHandler { signal: 9, handler: old, old_handler_ptr: old_ptr });
    assert_eq!(sim.expect_run(a), 0);
    assert_eq!(sim.read_u32(old_ptr) as usize, HANDLER_2);
}

#[test]
fn kill_validation_codes() {
    let mut sim = Sim::new();
    let a = sim.spawn(ENTRY_A);
    sim.start();
    sim.expect_run(a);

    sim.call(Request::Kill { pid: 444, signal: 3 });
    assert_eq!(sim.expect_run(a), -514);
    sim.call(Request::Kill { pid: a, signal: 32 });
    assert_eq!(sim.expect_run(a), -583);
    sim.call(Request::Kill { pid: a, signal: -1 });
    assert_eq!(sim.expect_run(a), -583);
}

#[test]
fn handler_runs_on_next_resumption_and_sigreturn_restores_the_result() {
    let mut sim = Sim::new();
    let a = sim.spawn(ENTRY_A);
    sim.start();
    sim.expect_run(a);
    install(&mut sim, a, 5, HANDLER_1);

    sim.call(Request::Kill { pid: a, signal: 5 });
    let (handler, _cntx) = sim.expect_handler(a);
    assert_eq!(handler, HANDLER_1);

    sim.sigreturn(a);
    // The interrupted computation sees the kill's own result.
    assert_eq!(sim.expect_run(a), 0);
}

#[test]
fn ignored_signals_neither_deliver_nor_unblock() {
    let mut sim = Sim::new();
    let a = sim.spawn(ENTRY_A);
    let b = sim.spawn(ENTRY_B);
    sim.start();

    // a blocks receiving from b; no handler for signal 4 anywhere.
    sim.expect_run(a);
    let (_, word_ptr) = sim.recv_from(a, b);

    sim.expect_run(b);
    sim.call(Request::Kill { pid: a, signal: 4 });
    assert_eq!(sim.expect_run(b), 0);

    // a stayed blocked: the send still pairs up normally.
    sim.call(Request::Send { dest: a, word: 11 });
    assert_eq!(sim.expect_run(b), 0);
    sim.call(Request::Yield);
    assert_eq!(sim.expect_run(a), 0);
    assert_eq!(sim.read_u32(word_ptr), 11);
}

#[test]
fn higher_priority_signal_interrupts_a_running_handler() {
    let mut sim = Sim::new();
    let a = sim.spawn(ENTRY_A);
    sim.start();
    sim.expect_run(a);
    install(&mut sim, a, 1, HANDLER_1);
    install(&mut sim, a, 30, HANDLER_3);

    // Raise signal 1 against ourselves; its handler then raises 30.
    sim.call(Request::Kill { pid: a, signal: 1 });
    let (handler, _) = sim.expect_handler(a);
    assert_eq!(handler, HANDLER_1);

    sim.call(Request::Kill { pid: a, signal: 30 });
    // Signal 30 outranks the running level-1 handler and preempts it.
    let (handler, _) = sim.expect_handler(a);
    assert_eq!(handler, HANDLER_3);

    // The 30-handler finishes first, then the 1-handler resumes and
    // finishes.
    sim.sigreturn(a);
    assert_eq!(sim.expect_run(a), 0);
    sim.call(Request::Yield);
    sim.expect_run(a);
    sim.sigreturn(a);
    sim.expect_run(a);
}

#[test]
fn equal_and_lower_signals_wait_for_the_running_handler() {
    let mut sim = Sim::new();
    let a = sim.spawn(ENTRY_A);
    sim.start();
    sim.expect_run(a);
    install(&mut sim, a, 6, HANDLER_1);
    install(&mut sim, a, 2, HANDLER_2);

    sim.call(Request::Kill { pid: a, signal: 6 });
    let (handler, _) = sim.expect_handler(a);
    assert_eq!(handler, HANDLER_1);

    // While handling 6, neither another 6 nor a 2 may be dispatched.
    sim.call(Request::Kill { pid: a, signal: 6 });
    assert_eq!(sim.expect_run(a), 0);
    sim.call(Request::Kill { pid: a, signal: 2 });
    assert_eq!(sim.expect_run(a), 0);

    // After sigreturn both come through, highest first.
    sim.sigreturn(a);
    let (handler, _) = sim.expect_handler(a);
    assert_eq!(handler, HANDLER_1);
    sim.sigreturn(a);
    let (handler, _) = sim.expect_handler(a);
    assert_eq!(handler, HANDLER_2);
    sim.sigreturn(a);
    sim.expect_run(a);
}

#[test]
fn interrupted_sleep_reports_remaining_milliseconds() {
    let mut sim = Sim::new();
    let a = sim.spawn(ENTRY_A);
    let b = sim.spawn(ENTRY_B);
    sim.start();

    sim.expect_run(a);
    install(&mut sim, a, 5, HANDLER_1);
    sim.call(Request::Sleep { ms: 100 });

    // Four slices pass while b runs, then b interrupts the sleep.
    sim.expect_run(b);
    sim.ticks(4);
    sim.expect_run(b);
    sim.call(Request::Kill { pid: a, signal: 5 });
    assert_eq!(sim.expect_run(b), 0);
    sim.call(Request::Yield);

    let (handler, _) = sim.expect_handler(a);
    assert_eq!(handler, HANDLER_1);
    sim.sigreturn(a);
    assert_eq!(sim.expect_run(a), 60);
}

#[test]
fn interrupted_send_and_wait_report_the_signal_code() {
    let mut sim = Sim::new();
    let a = sim.spawn(ENTRY_A);
    let b = sim.spawn(ENTRY_B);
    sim.start();

    sim.expect_run(a);
    install(&mut sim, a, 7, HANDLER_2);
    sim.call(Request::Send { dest: b, word: 1 });

    sim.expect_run(b);
    sim.call(Request::Kill { pid: a, signal: 7 });
    assert_eq!(sim.expect_run(b), 0);
    sim.call(Request::Yield);

    sim.expect_handler(a);
    sim.sigreturn(a);
    assert_eq!(sim.expect_run(a), -666);

    // Same story for a wait.
    sim.call(Request::Wait { pid: b });
    sim.expect_run(b);
    sim.call(Request::Kill { pid: a, signal: 7 });
    assert_eq!(sim.expect_run(b), 0);
    sim.call(Request::Yield);

    sim.expect_handler(a);
    sim.sigreturn(a);
    assert_eq!(sim.expect_run(a), -666);
}

#[test]
fn interrupted_receive_any_reports_the_signal_code() {
    let mut sim = Sim::new();
    let a = sim.spawn(ENTRY_A);
    let b = sim.spawn(ENTRY_B);
    sim.start();

    sim.expect_run(a);
    install(&mut sim, a, 3, HANDLER_1);
    sim.recv_from(a, 0);

    sim.expect_run(b);
    sim.call(Request::Kill { pid: a, signal: 3 });
    assert_eq!(sim.expect_run(b), 0);
    sim.call(Request::Yield);

    sim.expect_handler(a);
    sim.sigreturn(a);
    assert_eq!(sim.expect_run(a), -666);
}

#[test]
fn hard_kill_terminates_the_target() {
    let mut sim = Sim::new();
    let a = sim.spawn(ENTRY_A);
    let b = sim.spawn(ENTRY_B);
    sim.start();

    // a naps; b delivers signal 31, whose fixed handler is the exit
    // stub.
    sim.expect_run(a);
    sim.call(Request::Sleep { ms: 500 });
    sim.expect_run(b);
    sim.call(Request::Kill { pid: a, signal: 31 });
    assert_eq!(sim.expect_run(b), 0);
    sim.call(Request::Yield);

    // The harness plays the exit stub, so a never surfaces again.
    assert_eq!(sim.expect_run(b), 0);
    sim.call(Request::Kill { pid: a, signal: 0 });
    assert_eq!(sim.expect_run(b), -514);
    assert_eq!(sim.kernel.live_user_processes(), 1);
}

#[test]
fn hard_kill_releases_processes_blocked_on_the_target() {
    let mut sim = Sim::new();
    let a = sim.spawn(ENTRY_A);
    let b = sim.spawn(ENTRY_B);
    sim.start();

    sim.expect_run(a);
    sim.call(Request::Send { dest: b, word: 9 });

    sim.expect_run(b);
    sim.call(Request::Kill { pid: b, signal: 31 });

    // b exits through the trampoline; the blocked sender fails with the
    // peer-died code.
    assert_eq!(sim.expect_run(a), -1);
}
