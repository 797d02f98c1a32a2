#![allow(
    clippy::disallowed_types,
    reason = "proptest macros internally use Arc"
)]

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use weft_ir::Arg;

use crate::cont::RcAdjust;
use crate::instr::{Instr, TaskMode};
use crate::refcount::{RcLedger, RefCountType};
use crate::test_helpers::{add_range, decr, incr, int_future, int_value, make_func, range_mut};
use crate::tree::Function;

use super::eliminate_refcounts;

const R: RefCountType = RefCountType::Readers;
const W: RefCountType = RefCountType::Writers;

fn read_into(v: &str, src: &str, decr_read: i64) -> Instr {
    Instr::Load {
        dst: int_value(v),
        src: int_future(src),
        decr_read: Arg::int(decr_read),
    }
}

fn touch(name: &str) -> Instr {
    Instr::Call {
        func: "touch".into(),
        outputs: vec![],
        inputs: vec![Arg::from(&int_future(name))],
        mode: TaskMode::Local,
    }
}

fn func_with(instrs: Vec<Instr>) -> Function {
    let mut func = make_func(vec![int_future("a"), int_future("b")], vec![]);
    func.main_block_mut().instrs = instrs;
    func
}

// Cancellation

#[test]
fn matching_incr_and_decr_cancel() {
    let a = int_future("a");
    let mut func = func_with(vec![incr(&a, R, 2), decr(&a, R, 2)]);
    assert_eq!(eliminate_refcounts(&mut func), 2);
    assert!(func.main_block().instrs.is_empty());
}

#[test]
fn partial_cancel_keeps_the_difference() {
    let a = int_future("a");
    let mut func = func_with(vec![incr(&a, R, 3), decr(&a, R, 1)]);
    assert_eq!(eliminate_refcounts(&mut func), 1);
    assert_eq!(func.main_block().instrs, vec![incr(&a, R, 2)]);
}

#[test]
fn different_counters_do_not_cancel() {
    let a = int_future("a");
    let mut func = func_with(vec![incr(&a, R, 1), decr(&a, W, 1)]);
    assert_eq!(eliminate_refcounts(&mut func), 0);
}

/// An intervening use keeps the increment alive across it.
#[test]
fn use_between_blocks_cancel() {
    let a = int_future("a");
    let mut func = func_with(vec![incr(&a, W, 1), touch("a"), decr(&a, W, 1)]);
    assert_eq!(eliminate_refcounts(&mut func), 0);
    assert_eq!(func.main_block().instrs.len(), 3);
}

// Merging

#[test]
fn increments_merge_into_the_first() {
    let a = int_future("a");
    let mut func = func_with(vec![incr(&a, R, 1), touch("a"), incr(&a, R, 2)]);
    assert_eq!(eliminate_refcounts(&mut func), 1);
    assert_eq!(func.main_block().instrs, vec![incr(&a, R, 3), touch("a")]);
}

#[test]
fn decrements_merge_into_the_last() {
    let b = int_future("b");
    let mut func = func_with(vec![decr(&b, W, 1), touch("b"), decr(&b, W, 2)]);
    assert_eq!(eliminate_refcounts(&mut func), 1);
    assert_eq!(func.main_block().instrs, vec![touch("b"), decr(&b, W, 3)]);
}

// Piggybacking

#[test]
fn decrement_rides_on_preceding_load() {
    let a = int_future("a");
    let mut func = func_with(vec![incr(&a, R, 1), read_into("v", "a", 0), decr(&a, R, 1)]);
    assert_eq!(eliminate_refcounts(&mut func), 1);
    assert_eq!(
        func.main_block().instrs,
        vec![incr(&a, R, 1), read_into("v", "a", 1)]
    );
}

#[test]
fn decrement_does_not_jump_back_over_a_use() {
    let a = int_future("a");
    let mut func = func_with(vec![read_into("v", "a", 0), touch("a"), decr(&a, R, 1)]);
    assert_eq!(eliminate_refcounts(&mut func), 0);
}

// Loop folding

fn with_loop_incr(instrs: Vec<Instr>) -> Function {
    let mut func = func_with(instrs);
    let main = func.main;
    let (c, _) = add_range(&mut func, main, &int_value("i"), Arg::int(0), Arg::int(9), Arg::int(1));
    range_mut(&mut func, c).refcounts.const_incrs.push(RcAdjust {
        var: int_future("a"),
        kind: R,
        amount: Arg::int(1),
    });
    func
}

#[test]
fn trailing_increment_folds_into_loop_start() {
    let a = int_future("a");
    let mut func = with_loop_incr(vec![incr(&a, R, 2)]);
    let before = RcLedger::of_function(&func);
    assert_eq!(eliminate_refcounts(&mut func), 1);
    assert!(func.main_block().instrs.is_empty());
    let c = func.main_block().conts[0];
    assert_eq!(range_mut(&mut func, c).refcounts.const_incrs[0].amount, Arg::int(3));
    assert_eq!(RcLedger::of_function(&func), before);
}

#[test]
fn later_use_keeps_increment_in_block() {
    let a = int_future("a");
    let mut func = with_loop_incr(vec![incr(&a, R, 2), touch("a")]);
    assert_eq!(eliminate_refcounts(&mut func), 0);
}

// Property tests

fn arb_instr() -> impl Strategy<Value = Instr> {
    (0usize..6, 1i64..4).prop_map(|(op, n)| {
        let (a, b) = (int_future("a"), int_future("b"));
        match op {
            0 => incr(&a, R, n),
            1 => decr(&a, R, n),
            2 => incr(&a, W, n),
            3 => decr(&b, W, n),
            4 => read_into("v", "a", n - 1),
            _ => touch(if n % 2 == 0 { "a" } else { "b" }),
        }
    })
}

proptest! {
    /// Elimination moves deltas around but never changes their net sum.
    #[test]
    fn ledger_is_conserved(instrs in proptest::collection::vec(arb_instr(), 0..16)) {
        let mut func = with_loop_incr(instrs);
        let before = RcLedger::of_function(&func);
        eliminate_refcounts(&mut func);
        prop_assert_eq!(RcLedger::of_function(&func), before);
    }

    #[test]
    fn second_run_finds_nothing(instrs in proptest::collection::vec(arb_instr(), 0..16)) {
        let mut func = func_with(instrs);
        eliminate_refcounts(&mut func);
        prop_assert_eq!(eliminate_refcounts(&mut func), 0);
    }
}
