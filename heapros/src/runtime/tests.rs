use super::*;
use crate as heapros;
use crate::context;
use crate::task::{self, ROOT_PID};
use crate::test_utils::*;
use crate::utils::scheduler::*;
use anyhow::Result;
use rstest::rstest;
use static_assertions::assert_not_impl_any;
use std::collections::HashMap;
use std::hint::black_box;
use std::panic::{self, AssertUnwindSafe};

assert_not_impl_any!(Scheduler: Send, Sync);

/// Renders the tracker history as `"<method> <pid>"` lines.
fn trace(history: &[Call]) -> Vec<String> {
    history
        .iter()
        .map(|call| {
            let method = match call {
                Call::Launch { .. } => "launch",
                Call::Resume { .. } => "resume",
                Call::Suspend { .. } => "suspend",
                Call::Release { .. } => "release",
            };
            format!("{} {}", method, call.pid())
        })
        .collect()
}

#[test]
fn test_root_runs_to_completion() -> Result<()> {
    let (runtime, scheduler) = init_runtime_and_scheduler(None)?;
    let journal = Journal::new();

    let j = journal.clone();
    let outcome = runtime.run(move || {
        j.push(task::id());
    })?;

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(journal.entries(), vec!["1"]);
    assert_eq!(trace(&scheduler.tracker.history()), vec!["launch 1", "release 1"]);
    assert_eq!(scheduler.tracker.num_calls(&Method::Suspend), 0);
    Ok(())
}

#[test]
fn test_locals_survive_suspension() -> Result<()> {
    let runtime = Builder::new().try_build()?;
    let journal = Journal::new();

    let j = journal.clone();
    let outcome = runtime.run(move || {
        let mut buf = [0u64; 64];
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = i as u64 * 3;
        }
        let tenth = &buf[10];

        // The child scribbles over the addresses our frames were using.
        spawn(|| {
            let noise = [0xaau8; 4096];
            black_box(&noise);
        })
        .unwrap();
        yield_now().unwrap();

        j.push(*tenth);
        j.push(buf.iter().sum::<u64>());
    })?;

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(journal.entries(), vec!["30", "6048"]);
    Ok(())
}

#[test]
fn test_pids_are_monotonic() -> Result<()> {
    let runtime = Builder::new().try_build()?;
    let journal = Journal::new();

    let j = journal.clone();
    runtime.run(move || {
        assert_eq!(task::id(), ROOT_PID);

        for _ in 0..3 {
            let child = j.clone();
            let pid = spawn(move || child.push(format!("child {}", task::id()))).unwrap();
            j.push(format!("spawned {pid}"));
        }
    })?;

    assert_eq!(
        journal.entries(),
        vec![
            "child 2", "spawned 2", "child 3", "spawned 3", "child 4", "spawned 4",
        ]
    );
    Ok(())
}

#[test]
fn test_stacks_are_isolated() -> Result<()> {
    let runtime = Builder::new().try_build()?;
    let journal = Journal::new();

    let j = journal.clone();
    let outcome = runtime.run(move || {
        for tag in [0x11u8, 0x22, 0x33] {
            let j = j.clone();
            spawn(move || {
                let mut buf = [tag; 512];
                for round in 0..5 {
                    buf[round] = tag.wrapping_add(round as u8);
                    yield_now().unwrap();

                    assert!(buf[5..].iter().all(|b| *b == tag));
                    assert!((0..=round).all(|r| buf[r] == tag.wrapping_add(r as u8)));
                }
                j.push(format!("{tag:#x}"));
            })
            .unwrap();
        }
    })?;

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(journal.entries(), vec!["0x11", "0x22", "0x33"]);
    Ok(())
}

#[test]
fn test_spawned_coroutine_runs_before_its_parent_continues() -> Result<()> {
    let (runtime, scheduler) = init_runtime_and_scheduler(None)?;
    let journal = Journal::new();

    let j = journal.clone();
    runtime.run(move || {
        let b = j.clone();
        spawn(move || {
            b.push("b");
            yield_now().unwrap();
            b.push("b again");
        })
        .unwrap();
        j.push("a after b");

        let c = j.clone();
        spawn(move || c.push("c")).unwrap();
        j.push("a after c");
    })?;

    assert_eq!(
        journal.entries(),
        vec!["b", "a after b", "c", "a after c", "b again"]
    );

    let launched: Vec<u64> = scheduler
        .tracker
        .get_calls(&Method::Launch)
        .iter()
        .map(|call| call.pid().as_u64())
        .collect();
    assert_eq!(launched, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn test_yield_now_round_robin() -> Result<()> {
    let (runtime, scheduler) = init_runtime_and_scheduler(None)?;
    let journal = Journal::new();

    let j = journal.clone();
    runtime.run(move || {
        let a = j.clone();
        spawn(move || {
            a.push("a1");
            yield_now().unwrap();
            a.push("a2");
        })
        .unwrap();

        j.push("r1");
        yield_now().unwrap();
        j.push("r2");
    })?;

    assert_eq!(journal.entries(), vec!["a1", "r1", "a2", "r2"]);
    assert_eq!(
        trace(&scheduler.tracker.history()),
        vec![
            "launch 1",
            "suspend 1",
            "launch 2",
            "suspend 2",
            "resume 1",
            "suspend 1",
            "resume 2",
            "release 2",
            "resume 1",
            "release 1",
        ]
    );
    Ok(())
}

#[test]
fn test_resume_restores_what_suspend_captured() -> Result<()> {
    let (runtime, scheduler) = init_runtime_and_scheduler(None)?;

    runtime.run(|| {
        for _ in 0..3 {
            spawn(|| {
                let deep = [7u8; 2048];
                yield_now().unwrap();
                black_box(&deep);
            })
            .unwrap();
        }
        yield_now().unwrap();
    })?;

    let usable = scheduler.cfg.stack_size;
    let mut captured: HashMap<u64, usize> = HashMap::new();

    for call in scheduler.tracker.history() {
        match call {
            Call::Suspend { pid, snapshot_len } => {
                assert!(snapshot_len > 0 && snapshot_len <= usable);
                captured.insert(pid.as_u64(), snapshot_len);
            }
            Call::Resume { pid, snapshot_len } => {
                assert_eq!(captured.remove(&pid.as_u64()), Some(snapshot_len));
            }
            _ => {}
        }
    }

    assert!(captured.is_empty());
    Ok(())
}

#[test]
fn test_yield_to_parks_the_caller() -> Result<()> {
    let runtime = Builder::new().try_build()?;
    let journal = Journal::new();

    let j = journal.clone();
    let outcome = runtime.run(move || {
        let root = task::id();

        let w = j.clone();
        let worker = spawn(move || {
            w.push("w1");
            yield_to(root).unwrap();
            w.push("w2");
        })
        .unwrap();

        j.push("r1");
        yield_to(worker).unwrap();
        j.push("never");
    })?;

    // The worker finished while the root was parked: nobody is left to
    // resume it.
    assert_eq!(outcome, Outcome::Stalled { parked: vec![ROOT_PID] });
    assert_eq!(journal.entries(), vec!["w1", "r1", "w2"]);
    Ok(())
}

#[test]
fn test_yield_to_self_returns_immediately() -> Result<()> {
    let (runtime, scheduler) = init_runtime_and_scheduler(None)?;

    let outcome = runtime.run(|| {
        assert_eq!(yield_to(task::id()), Ok(()));
    })?;

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(scheduler.tracker.num_calls(&Method::Suspend), 0);
    Ok(())
}

#[test]
fn test_end_to_end_exit() -> Result<()> {
    let runtime = Builder::new().try_build()?;
    let journal = Journal::new();

    let j = journal.clone();
    let outcome = runtime.run(move || {
        let root = task::id();
        j.push("R pre");

        let w = j.clone();
        spawn(move || {
            w.push("W1");
            yield_to(root).unwrap();
            w.push("W1 again");
        })
        .unwrap();
        j.push("R post-W1");

        for i in 0..2 {
            let w = j.clone();
            spawn(move || {
                w.push("W2");
                yield_to(root).unwrap();
                w.push("W2 again");
            })
            .unwrap();
            j.push(format!("R loop {i}"));
        }

        exit(0);
    })?;

    assert_eq!(outcome, Outcome::Exited(0));
    assert_eq!(
        journal.entries(),
        vec!["R pre", "W1", "R post-W1", "W2", "R loop 0", "W2", "R loop 1"]
    );
    Ok(())
}

#[rstest]
#[case::zero(0)]
#[case::one(1)]
#[case::negative(-3)]
fn test_exit_code_ends_the_run(#[case] code: i32) -> Result<()> {
    let runtime = Builder::new().try_build()?;
    let journal = Journal::new();

    let j = journal.clone();
    let outcome = runtime.run(move || {
        let w = j.clone();
        spawn(move || {
            yield_now().unwrap();
            w.push("worker resumed");
        })
        .unwrap();

        exit(code);
    })?;

    assert_eq!(outcome, Outcome::Exited(code));
    assert_eq!(outcome.code(), code);
    assert!(journal.entries().is_empty());
    Ok(())
}

#[test]
fn test_finished_coroutines_are_released() -> Result<()> {
    let (runtime, scheduler) = init_runtime_and_scheduler(None)?;

    let outcome = runtime.run(|| {
        let child = spawn(|| {}).unwrap();
        assert_eq!(yield_to(child), Err(SchedulerError::UnknownCoroutine(child)));

        let parked = spawn(|| {
            yield_to(ROOT_PID).unwrap();
        })
        .unwrap();
        assert_eq!(yield_to(parked), Ok(()));
    })?;

    assert_eq!(outcome, Outcome::Stalled { parked: vec![ROOT_PID] });

    let released: Vec<u64> = scheduler
        .tracker
        .get_calls(&Method::Release)
        .iter()
        .map(|call| call.pid().as_u64())
        .collect();
    assert_eq!(released, vec![2, 3]);
    Ok(())
}

#[test]
fn test_capacity_exceeded() -> Result<()> {
    let runtime = Builder::new().max_coroutines(2).try_build()?;
    let journal = Journal::new();

    let j = journal.clone();
    let outcome = runtime.run(move || {
        spawn(|| yield_now().unwrap()).unwrap();

        assert_eq!(
            spawn(|| {}),
            Err(SchedulerError::CapacityExceeded { capacity: 2 })
        );

        // Let the first child finish, which frees a slot.
        yield_now().unwrap();

        let pid = spawn(|| {}).unwrap();
        j.push(pid);
    })?;

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(journal.entries(), vec!["3"]);
    Ok(())
}

/// Goes one frame deeper after every successful yield, returning the depth
/// at which yielding failed.
fn dive(depth: usize) -> (usize, SchedulerError) {
    let pad = black_box([depth as u8; 512]);
    if let Err(err) = yield_now() {
        return (depth, err);
    }

    let res = dive(depth + 1);
    assert_eq!(pad[0], depth as u8);
    assert_eq!(pad[511], depth as u8);
    res
}

#[test]
fn test_stack_overflow_is_reported() -> Result<()> {
    let stack_size = 16 * 1024;
    let runtime = Builder::new().stack_size(stack_size).try_build()?;
    let journal = Journal::new();

    let j = journal.clone();
    let outcome = runtime.run(move || {
        let (depth, err) = dive(0);
        assert!(depth > 0);

        match err {
            SchedulerError::StackOverflow { used, usable } => {
                assert_eq!(usable, stack_size);
                assert!(used > stack_size / 2 && used < usable);
            }
            other => panic!("unexpected error: {other}"),
        }

        // Back at the top, the coroutine can suspend again.
        yield_now().unwrap();
        j.push("recovered");
    })?;

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(journal.entries(), vec!["recovered"]);
    Ok(())
}

#[test]
fn test_primitives_outside_a_run() {
    assert_eq!(spawn(|| {}), Err(SchedulerError::NotInCoroutine));
    assert_eq!(yield_now(), Err(SchedulerError::NotInCoroutine));
    assert_eq!(yield_to(ROOT_PID), Err(SchedulerError::NotInCoroutine));
    assert_eq!(task::try_id(), None);
}

#[test]
fn test_nested_run_is_rejected() -> Result<()> {
    let runtime = Builder::new().try_build()?;
    let inner = Builder::new().try_build()?;

    let outcome = runtime.run(move || {
        assert!(inner.run(|| {}).is_err());
    })?;

    assert_eq!(outcome, Outcome::Completed);
    Ok(())
}

#[test]
fn test_panic_resumes_on_caller() -> Result<()> {
    let runtime = Builder::new().try_build()?;

    let res = panic::catch_unwind(AssertUnwindSafe(|| {
        runtime.run(|| {
            spawn(|| panic!("boom")).unwrap();
            unreachable!("the run ends with the panic");
        })
    }));

    let payload = match res {
        Err(payload) => payload,
        Ok(_) => panic!("run should have panicked"),
    };
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));
    assert!(!context::is_active());

    // The runtime is usable again and starts from a clean slate.
    let outcome = runtime.run(|| {
        assert_eq!(task::id(), ROOT_PID);
        assert_eq!(spawn(|| {}).unwrap().as_u64(), 2);
    })?;
    assert_eq!(outcome, Outcome::Completed);
    Ok(())
}

#[test]
fn test_runtime_can_run_repeatedly() -> Result<()> {
    let runtime = Builder::new().try_build()?;

    for _ in 0..3 {
        let outcome = runtime.run(|| {
            let parked = spawn(|| yield_to(ROOT_PID).unwrap()).unwrap();
            assert_eq!(parked.as_u64(), 2);
        })?;

        match outcome {
            Outcome::Stalled { parked } => {
                assert_eq!(parked.iter().map(|p| p.as_u64()).collect::<Vec<_>>(), vec![2]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    Ok(())
}

#[heapros::test]
fn test_macro_runs_body_as_root() -> Result<()> {
    assert_eq!(task::id(), ROOT_PID);

    let child = spawn(|| {})?;
    assert_eq!(child.as_u64(), 2);
    Ok(())
}

#[heapros::test(stack_size = 32768, max_coroutines = 1)]
fn test_macro_applies_config() {
    assert_eq!(
        spawn(|| {}),
        Err(SchedulerError::CapacityExceeded { capacity: 1 })
    );
}
