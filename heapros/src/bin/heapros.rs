//! Walks through the life of a few coroutines sharing one execution stack.
//!
//! The root coroutine spawns a worker that hands control straight back, then
//! spawns a second kind of worker twice in a loop. None of the workers is
//! ever resumed after handing control back, so their second line never
//! prints. The root ends the whole run with exit code 0.
use heapros::task::{self, Pid};
use heapros::{exit, spawn, yield_to};

fn say(msg: &str) {
    println!("[pid {}] {}", task::id(), msg);
}

fn first_worker(root: Pid) {
    say("first worker: started, handing control back to root");
    if let Err(err) = yield_to(root) {
        eprintln!("first worker: {err}");
        exit(1);
    }
    say("first worker: resumed");
}

fn second_worker(root: Pid, round: usize) {
    say(&format!("second worker #{round}: started, handing control back to root"));
    if let Err(err) = yield_to(root) {
        eprintln!("second worker #{round}: {err}");
        exit(1);
    }
    say(&format!("second worker #{round}: resumed"));
}

#[heapros::main]
fn main() {
    let root = task::id();
    say("root: spawning the first worker");

    match spawn(move || first_worker(root)) {
        Ok(pid) => say(&format!("root: back from first worker (pid {pid})")),
        Err(err) => {
            eprintln!("root: {err}");
            exit(1);
        }
    }

    for round in 0..2 {
        match spawn(move || second_worker(root, round)) {
            Ok(pid) => say(&format!("root: back from second worker #{round} (pid {pid})")),
            Err(err) => {
                eprintln!("root: {err}");
                exit(1);
            }
        }
    }

    say("root: exiting");
    exit(0);
}
