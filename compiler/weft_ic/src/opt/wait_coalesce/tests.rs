use pretty_assertions::assert_eq;
use weft_ir::{Arg, BuiltinOp, Var};

use crate::cont::{Continuation, WaitMode, WaitStatement};
use crate::instr::{Instr, TaskMode};
use crate::test_helpers::{add_wait, int_array, int_future, make_func, store, wait_mut};
use crate::tree::{ContId, Function};

use super::{coalesce_waits, CoalesceStats};

fn wait(func: &Function, c: ContId) -> &WaitStatement {
    match func.cont(c) {
        Continuation::Wait(w) => w,
        other => panic!("expected wait, found {}", other.kind_name()),
    }
}

fn only_cont(func: &Function) -> ContId {
    let &[c] = func.main_block().conts.as_slice() else {
        panic!("expected one continuation in main, found {}", func.main_block().conts.len());
    };
    c
}

fn work(arg: &Var) -> Instr {
    Instr::Call {
        func: "work".into(),
        outputs: vec![],
        inputs: vec![Arg::from(arg)],
        mode: TaskMode::Local,
    }
}

fn stats(merged: usize, pushed_down: usize) -> CoalesceStats {
    CoalesceStats {
        merged,
        pushed_down,
    }
}

// Merging

#[test]
fn waits_sharing_a_future_nest_under_one_wait() {
    let (x, y, z) = (int_future("x"), int_future("y"), int_future("z"));
    let mut func = make_func(vec![x.clone(), y.clone(), z.clone()], vec![]);
    let main = func.main;
    let (first, first_body) = add_wait(&mut func, main, &[x.clone(), y.clone()], WaitMode::WaitOnly);
    func.block_mut(first_body).add_instr(work(&y));
    let (second, second_body) = add_wait(&mut func, main, &[z.clone(), x.clone()], WaitMode::WaitOnly);
    func.block_mut(second_body).add_instr(work(&z));

    assert_eq!(coalesce_waits(&mut func), stats(2, 0));
    let merged = wait(&func, only_cont(&func));
    assert_eq!(merged.wait_vars, vec![x.clone()]);
    assert_eq!(merged.mode, WaitMode::WaitOnly);
    assert_eq!(merged.passed_in, vec![x, y.clone(), z.clone()]);
    assert_eq!(func.block(merged.body).conts, vec![first, second]);
    assert_eq!(wait(&func, first).wait_vars, vec![y]);
    assert_eq!(wait(&func, second).wait_vars, vec![z]);
}

#[test]
fn satisfied_waits_are_spliced_into_the_merged_body() {
    let x = int_future("x");
    let mut func = make_func(vec![x.clone()], vec![]);
    let main = func.main;
    let (_, a) = add_wait(&mut func, main, &[x.clone()], WaitMode::Explicit);
    func.block_mut(a).add_instr(work(&x));
    let (_, b) = add_wait(&mut func, main, &[x.clone()], WaitMode::WaitOnly);
    func.block_mut(b).add_instr(store(&int_future("x2"), Arg::int(1)));

    assert_eq!(coalesce_waits(&mut func), stats(2, 0));
    let merged = wait(&func, only_cont(&func));
    assert_eq!(merged.mode, WaitMode::Explicit);
    let body = func.block(merged.body);
    assert!(body.conts.is_empty());
    assert_eq!(
        body.instrs,
        vec![work(&x), store(&int_future("x2"), Arg::int(1))]
    );
}

#[test]
fn dispatch_wait_stays_nested() {
    let x = int_future("x");
    let mut func = make_func(vec![x.clone()], vec![]);
    let main = func.main;
    let (dispatch, d) = add_wait(&mut func, main, &[x.clone()], WaitMode::TaskDispatch);
    wait_mut(&mut func, dispatch).target = TaskMode::Worker;
    func.block_mut(d).add_instr(work(&x));
    let (_, b) = add_wait(&mut func, main, &[x.clone()], WaitMode::WaitOnly);
    func.block_mut(b).add_instr(work(&x));

    assert_eq!(coalesce_waits(&mut func), stats(2, 0));
    let merged = wait(&func, only_cont(&func));
    assert_eq!(merged.target, TaskMode::Local);
    assert_eq!(func.block(merged.body).conts, vec![dispatch]);
    assert!(wait(&func, dispatch).wait_vars.is_empty());
}

/// A shallow wait closes an array but not its members, so a recursive
/// wait nested under it keeps the array.
#[test]
fn recursive_wait_keeps_container_under_shallow_merge() {
    let arr = int_array("arr");
    let mut func = make_func(vec![arr.clone()], vec![]);
    let main = func.main;
    let (deep, d) = add_wait(&mut func, main, &[arr.clone()], WaitMode::WaitOnly);
    wait_mut(&mut func, deep).recursive = true;
    func.block_mut(d).add_instr(work(&arr));
    let (_, s) = add_wait(&mut func, main, &[arr.clone()], WaitMode::WaitOnly);
    func.block_mut(s).add_instr(work(&arr));

    assert_eq!(coalesce_waits(&mut func), stats(2, 0));
    let merged = wait(&func, only_cont(&func));
    assert!(!merged.recursive);
    assert_eq!(func.block(merged.body).conts, vec![deep]);
    assert_eq!(wait(&func, deep).wait_vars, vec![arr]);
}

#[test]
fn all_recursive_merge_is_recursive() {
    let arr = int_array("arr");
    let mut func = make_func(vec![arr.clone()], vec![]);
    let main = func.main;
    for _ in 0..2 {
        let (c, body) = add_wait(&mut func, main, &[arr.clone()], WaitMode::WaitOnly);
        wait_mut(&mut func, c).recursive = true;
        func.block_mut(body).add_instr(work(&arr));
    }
    assert_eq!(coalesce_waits(&mut func), stats(2, 0));
    let merged = wait(&func, only_cont(&func));
    assert!(merged.recursive);
    assert!(func.block(merged.body).conts.is_empty());
    assert_eq!(func.block(merged.body).instrs.len(), 2);
}

// Push-down

/// `x` is written inside the wait on `a`; whatever waits on `x` moves in
/// after it.
fn writer_and_waiter() -> (Function, ContId) {
    let (a, x) = (int_future("a"), int_future("x"));
    let mut func = make_func(vec![a.clone()], vec![]);
    let main = func.main;
    func.main_block_mut().declare(x.clone());
    let (writer, body) = add_wait(&mut func, main, &[a.clone()], WaitMode::WaitOnly);
    func.block_mut(body).add_instr(store(&x, Arg::int(1)));
    (func, writer)
}

#[test]
fn waiter_moves_after_the_write() {
    let (mut func, writer) = writer_and_waiter();
    let main = func.main;
    let x = int_future("x");
    let (waiter, body) = add_wait(&mut func, main, &[x.clone()], WaitMode::Explicit);
    func.block_mut(body).add_instr(work(&x));

    assert_eq!(coalesce_waits(&mut func), stats(0, 1));
    assert_eq!(func.main_block().conts, vec![writer]);
    let w = wait(&func, writer);
    assert_eq!(func.block(w.body).conts, vec![waiter]);
    assert_eq!(w.passed_in, vec![int_future("a"), x]);
}

#[test]
fn async_instruction_moves_after_the_write() {
    let (mut func, writer) = writer_and_waiter();
    let (x, y) = (int_future("x"), int_future("y"));
    func.main_block_mut().declare(y.clone());
    let op = Instr::AsyncOp {
        op: BuiltinOp::PlusInt,
        dst: Some(y.clone()),
        inputs: vec![Arg::from(&x), Arg::int(1)],
    };
    func.main_block_mut().add_instr(op.clone());

    assert_eq!(coalesce_waits(&mut func), stats(0, 1));
    assert!(func.main_block().instrs.is_empty());
    let w = wait(&func, writer);
    assert_eq!(func.block(w.body).instrs, vec![store(&x, Arg::int(1)), op]);
}

/// The body writes its own `x`, which is not the `x` the sibling waits on.
#[test]
fn shadowed_future_is_not_a_signal() {
    let (mut func, writer) = writer_and_waiter();
    let main = func.main;
    let x = int_future("x");
    let body = wait(&func, writer).body;
    func.block_mut(body).declare(x.clone());
    let (_, waiter_body) = add_wait(&mut func, main, &[x.clone()], WaitMode::Explicit);
    func.block_mut(waiter_body).add_instr(work(&x));

    assert_eq!(coalesce_waits(&mut func), stats(0, 0));
    assert_eq!(func.main_block().conts.len(), 2);
}

#[test]
fn worker_dispatch_is_a_barrier() {
    let (mut func, writer) = writer_and_waiter();
    let main = func.main;
    {
        let w = wait_mut(&mut func, writer);
        w.mode = WaitMode::TaskDispatch;
        w.target = TaskMode::Worker;
    }
    let x = int_future("x");
    let (_, body) = add_wait(&mut func, main, &[x.clone()], WaitMode::Explicit);
    func.block_mut(body).add_instr(work(&x));

    assert_eq!(coalesce_waits(&mut func), stats(0, 0));
    assert_eq!(func.main_block().conts.len(), 2);
}

#[test]
fn second_run_is_a_no_op() {
    let (mut func, _) = writer_and_waiter();
    let main = func.main;
    let x = int_future("x");
    for _ in 0..2 {
        let (_, body) = add_wait(&mut func, main, &[x.clone()], WaitMode::WaitOnly);
        func.block_mut(body).add_instr(work(&x));
    }
    let first = coalesce_waits(&mut func);
    assert_eq!(first, stats(2, 1));
    let after = func.to_string();
    assert_eq!(coalesce_waits(&mut func), stats(0, 0));
    assert_eq!(func.to_string(), after);
}
