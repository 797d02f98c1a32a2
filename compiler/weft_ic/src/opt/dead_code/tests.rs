use pretty_assertions::assert_eq;
use weft_ir::{Arg, BuiltinOp};

use crate::cont::{Continuation, RcAdjust, WaitMode};
use crate::instr::{CallProps, Instr, TaskMode};
use crate::refcount::RefCountType;
use crate::test_helpers::{
    add_if, add_range, add_wait, bool_value, decr, int_future, int_value, make_func, plus, range_mut, store,
};

use super::eliminate_dead_code;

fn work(arg: impl Into<Arg>) -> Instr {
    Instr::Call {
        func: "work".into(),
        outputs: vec![],
        inputs: vec![arg.into()],
        mode: TaskMode::Local,
    }
}

// Variables

#[test]
fn unused_variable_and_its_writer_are_removed() {
    let x = int_value("x");
    let mut func = make_func(vec![], vec![]);
    func.main_block_mut().declare(x.clone());
    func.main_block_mut().add_instr(plus(&x, Arg::int(1), Arg::int(2)));

    assert_eq!(eliminate_dead_code(&mut func), Ok(2));
    assert!(func.main_block().is_empty());
    assert!(func.main_block().vars.is_empty());
}

/// Removing `y` leaves `x` unread, so the chain goes in two rounds.
#[test]
fn dead_chain_is_removed_completely() {
    let (x, y) = (int_value("x"), int_value("y"));
    let mut func = make_func(vec![], vec![]);
    func.main_block_mut().declare(x.clone());
    func.main_block_mut().declare(y.clone());
    func.main_block_mut().add_instr(plus(&x, Arg::int(1), Arg::int(2)));
    func.main_block_mut().add_instr(plus(&y, &x, Arg::int(2)));

    assert_eq!(eliminate_dead_code(&mut func), Ok(4));
    assert!(func.main_block().instrs.is_empty());
}

#[test]
fn variable_read_by_side_effect_is_kept() {
    let x = int_value("x");
    let mut func = make_func(vec![], vec![]);
    func.main_block_mut().declare(x.clone());
    func.main_block_mut().add_instr(plus(&x, Arg::int(1), Arg::int(2)));
    func.main_block_mut().add_instr(work(&x));

    assert_eq!(eliminate_dead_code(&mut func), Ok(0));
    assert_eq!(func.main_block().instrs.len(), 2);
}

#[test]
fn writes_to_outputs_are_kept() {
    let out = int_future("out");
    let mut func = make_func(vec![], vec![out.clone()]);
    func.main_block_mut().add_instr(store(&out, Arg::int(1)));
    assert_eq!(eliminate_dead_code(&mut func), Ok(0));
}

/// A dead variable written together with a live one pins the writer.
#[test]
fn writer_of_live_output_pins_dead_partner() {
    let out = int_future("out");
    let t = int_future("t");
    let mut func = make_func(vec![], vec![out.clone()]);
    func.main_block_mut().declare(t.clone());
    func.main_block_mut().add_instr(Instr::CallForeign {
        func: "divmod".into(),
        outputs: vec![out.clone(), t.clone()],
        inputs: vec![Arg::int(7), Arg::int(2)],
        mode: TaskMode::Local,
        props: CallProps::default(),
    });

    assert_eq!(eliminate_dead_code(&mut func), Ok(0));
    assert!(func.main_block().declares(&t.name));
}

// Instructions

#[test]
fn result_free_pure_instruction_is_removed() {
    let mut func = make_func(vec![], vec![]);
    func.main_block_mut().add_instr(Instr::LocalOp {
        op: BuiltinOp::PlusInt,
        dst: None,
        inputs: vec![Arg::int(1), Arg::int(2)],
    });
    assert_eq!(eliminate_dead_code(&mut func), Ok(1));
}

#[test]
fn refcount_operations_are_kept() {
    let a = int_future("a");
    let mut func = make_func(vec![a.clone()], vec![]);
    func.main_block_mut().add_instr(decr(&a, RefCountType::Readers, 1));
    assert_eq!(eliminate_dead_code(&mut func), Ok(0));
}

// Continuations

#[test]
fn empty_if_is_removed() {
    let c = bool_value("c");
    let mut func = make_func(vec![c.clone()], vec![]);
    let main = func.main;
    add_if(&mut func, main, &c);
    assert_eq!(eliminate_dead_code(&mut func), Ok(1));
    assert!(func.main_block().conts.is_empty());
}

/// Emptying a branch makes its enclosing conditional removable.
#[test]
fn nested_dead_code_cascades_outward() {
    let c = bool_value("c");
    let x = int_value("x");
    let mut func = make_func(vec![c.clone()], vec![]);
    let main = func.main;
    let (_, then_block, _) = add_if(&mut func, main, &c);
    func.block_mut(then_block).declare(x.clone());
    func.block_mut(then_block).add_instr(plus(&x, Arg::int(1), Arg::int(1)));

    assert_eq!(eliminate_dead_code(&mut func), Ok(3));
    assert!(func.main_block().conts.is_empty());
}

#[test]
fn loop_holding_refcounts_is_kept() {
    let a = int_future("a");
    let mut func = make_func(vec![a.clone()], vec![]);
    let main = func.main;
    let (c, _) = add_range(&mut func, main, &int_value("i"), Arg::int(0), Arg::int(9), Arg::int(1));
    range_mut(&mut func, c).refcounts.const_incrs.push(RcAdjust {
        var: a,
        kind: RefCountType::Readers,
        amount: Arg::int(1),
    });
    assert_eq!(eliminate_dead_code(&mut func), Ok(0));
}

#[test]
fn dispatch_wait_survives_empty() {
    let x = int_future("x");
    let mut func = make_func(vec![x.clone()], vec![]);
    let main = func.main;
    let (c, _) = add_wait(&mut func, main, &[x], WaitMode::TaskDispatch);
    assert_eq!(eliminate_dead_code(&mut func), Ok(1));
    assert_eq!(func.main_block().conts, vec![c]);
    assert!(func.cont(c).blocking_vars().is_empty());
}

// Wait variables

/// A generated wait only needs the futures its body reads; an explicit
/// wait keeps everything it names.
#[test]
fn generated_wait_drops_unread_vars() {
    let (x, y, out) = (int_future("x"), int_future("y"), int_future("out"));
    let mut func = make_func(vec![x.clone(), y.clone()], vec![out.clone()]);
    let main = func.main;
    let (generated, body) = add_wait(&mut func, main, &[x.clone(), y.clone()], WaitMode::WaitOnly);
    func.block_mut(body).add_instr(work(&y));
    let (explicit, body) = add_wait(&mut func, main, &[x.clone(), y.clone()], WaitMode::Explicit);
    func.block_mut(body).add_instr(store(&out, Arg::int(1)));

    assert_eq!(eliminate_dead_code(&mut func), Ok(1));
    assert_eq!(func.cont(generated).blocking_vars(), vec![&y]);
    assert_eq!(func.cont(explicit).blocking_vars(), vec![&x, &y]);
}

#[test]
fn keep_open_counts_as_read() {
    let (x, out) = (int_future("x"), int_future("out"));
    let mut func = make_func(vec![x.clone()], vec![out.clone()]);
    let main = func.main;
    let (c, body) = add_wait(&mut func, main, &[x.clone(), out.clone()], WaitMode::WaitOnly);
    func.block_mut(body).add_instr(work(&x));
    if let Continuation::Wait(w) = func.cont_mut(c) {
        w.keep_open.push(out.clone());
    }
    assert_eq!(eliminate_dead_code(&mut func), Ok(0));
    assert_eq!(func.cont(c).blocking_vars(), vec![&x, &out]);
}

#[test]
fn second_run_is_a_no_op() {
    let c = bool_value("c");
    let (x, out) = (int_value("x"), int_future("out"));
    let mut func = make_func(vec![c.clone()], vec![out.clone()]);
    let main = func.main;
    func.main_block_mut().declare(x.clone());
    func.main_block_mut().add_instr(plus(&x, Arg::int(1), Arg::int(1)));
    let (_, then_block, _) = add_if(&mut func, main, &c);
    func.block_mut(then_block).add_instr(store(&out, Arg::int(1)));

    assert_eq!(eliminate_dead_code(&mut func), Ok(2));
    let after = func.to_string();
    assert_eq!(eliminate_dead_code(&mut func), Ok(0));
    assert_eq!(func.to_string(), after);
}
