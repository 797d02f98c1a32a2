use pretty_assertions::assert_eq;
use weft_ir::{Arg, BuiltinOp, Name, PrimType, Type, Var};

use crate::config::UnrollConfig;
use crate::cont::Continuation;
use crate::instr::{Instr, TaskMode};
use crate::test_helpers::{add_range, int_value, make_func, plus, range_mut};
use crate::tree::{BlockId, ContId, Function};

use super::unroll_loops;

/// Expansion only for loops of at most four iterations.
fn no_large_expansion() -> UnrollConfig {
    UnrollConfig {
        expand_threshold_iters: 4,
        ..UnrollConfig::default()
    }
}

fn work(arg: impl Into<Arg>) -> Instr {
    Instr::Call {
        func: "work".into(),
        outputs: vec![],
        inputs: vec![arg.into()],
        mode: TaskMode::Local,
    }
}

fn induction(name: &str) -> Var {
    Var::temp(name, Type::Value(PrimType::Int))
}

/// `for i = start to end incr 1 { work(i) }` asking for `factor`.
fn loop_func(start: impl Into<Arg>, end: impl Into<Arg>, factor: u32) -> (Function, ContId, BlockId) {
    let i = int_value("i");
    let mut func = make_func(vec![int_value("n")], vec![]);
    let main = func.main;
    let (c, body) = add_range(&mut func, main, &i, start, end, Arg::int(1));
    func.block_mut(body).add_instr(work(&i));
    range_mut(&mut func, c).desired_unroll = factor;
    (func, c, body)
}

fn if_count(func: &Function, block: BlockId) -> usize {
    func.subtree(block)
        .into_iter()
        .flat_map(|b| func.block(b).conts.clone())
        .filter(|&c| matches!(func.cont(c), Continuation::If(_)))
        .count()
}

// Unrolling

/// Ten iterations unrolled by four leave a partial group of two, guarded
/// by exactly one check placed before the third copy.
#[test]
fn partial_final_group_gets_single_check() {
    let (mut func, c, body) = loop_func(Arg::int(0), Arg::int(9), 4);
    assert_eq!(unroll_loops(&mut func, &no_large_expansion()), 1);

    let l = range_mut(&mut func, c);
    assert_eq!(l.incr, Arg::int(4));
    assert_eq!(l.desired_unroll, 1);
    assert_eq!(if_count(&func, body), 1);

    let (i1, i2, i3) = (induction("i@1"), induction("i@2"), induction("i@3"));
    let ok = Var::temp("i@2:ok", Type::Value(PrimType::Bool));
    assert_eq!(
        func.block(body).instrs,
        vec![
            work(&int_value("i")),
            plus(&i1, &int_value("i"), Arg::int(1)),
            work(&i1),
            plus(&i2, &i1, Arg::int(1)),
            Instr::LocalOp {
                op: BuiltinOp::LteInt,
                dst: Some(ok),
                inputs: vec![Arg::from(&i2), Arg::int(9)],
            },
        ]
    );
    let guard = func.block(body).conts[0];
    let then_block = func.cont(guard).blocks()[0];
    assert_eq!(
        func.block(then_block).instrs,
        vec![work(&i2), plus(&i3, &i2, Arg::int(1)), work(&i3)]
    );
}

#[test]
fn evenly_divided_loop_needs_no_check() {
    let (mut func, c, body) = loop_func(Arg::int(0), Arg::int(7), 4);
    assert_eq!(unroll_loops(&mut func, &no_large_expansion()), 1);
    assert_eq!(if_count(&func, body), 0);
    assert_eq!(func.block(body).instrs.len(), 7);
    assert_eq!(range_mut(&mut func, c).incr, Arg::int(4));
}

#[test]
fn unknown_bound_checks_every_extra_copy() {
    let (mut func, _, body) = loop_func(Arg::int(0), &int_value("n"), 3);
    assert_eq!(unroll_loops(&mut func, &no_large_expansion()), 1);
    assert_eq!(if_count(&func, body), 2);
}

#[test]
fn factor_is_capped_by_config() {
    let (mut func, c, _) = loop_func(Arg::int(0), &int_value("n"), 64);
    let config = UnrollConfig {
        max_unroll_factor: 2,
        ..no_large_expansion()
    };
    assert_eq!(unroll_loops(&mut func, &config), 1);
    assert_eq!(range_mut(&mut func, c).incr, Arg::int(2));
}

#[test]
fn loop_not_asking_is_left_alone() {
    let (mut func, _, _) = loop_func(Arg::int(0), Arg::int(99), 1);
    let before = func.to_string();
    assert_eq!(unroll_loops(&mut func, &UnrollConfig::default()), 0);
    assert_eq!(func.to_string(), before);
}

#[test]
fn iteration_counter_refuses_unroll() {
    let (mut func, c, _) = loop_func(Arg::int(0), &int_value("n"), 4);
    range_mut(&mut func, c).count_var = Some(int_value("k"));
    assert_eq!(unroll_loops(&mut func, &no_large_expansion()), 0);
    assert_eq!(range_mut(&mut func, c).desired_unroll, 1);
    assert_eq!(range_mut(&mut func, c).incr, Arg::int(1));
}

// Expansion

/// A three-iteration loop becomes a nested block of three body copies,
/// each with its own declarations.
#[test]
fn small_literal_loop_is_expanded() {
    let i = int_value("i");
    let t = int_value("t");
    let mut func = make_func(vec![], vec![]);
    let main = func.main;
    let (c, body) = add_range(&mut func, main, &i, Arg::int(0), Arg::int(2), Arg::int(1));
    func.block_mut(body).declare(t.clone());
    func.block_mut(body).add_instr(plus(&t, &i, Arg::int(1)));
    func.block_mut(body).add_instr(work(&t));

    assert_eq!(unroll_loops(&mut func, &UnrollConfig::default()), 1);
    let Continuation::Nested(target) = *func.cont(c) else {
        panic!("expected a nested block, found {}", func.cont(c).kind_name());
    };
    assert!(func.try_block(body).is_err());
    assert_eq!(func.block(target).parent, Some(c));

    let copies: Vec<Var> = (0..3)
        .map(|k| t.renamed(Name::new(format!("t@{k}"))))
        .collect();
    assert_eq!(func.block(target).vars, copies);
    assert_eq!(
        func.block(target).instrs,
        vec![
            plus(&copies[0], Arg::int(0), Arg::int(1)),
            work(&copies[0]),
            plus(&copies[1], Arg::int(1), Arg::int(1)),
            work(&copies[1]),
            plus(&copies[2], Arg::int(2), Arg::int(1)),
            work(&copies[2]),
        ]
    );
}

#[test]
fn expansion_respects_instruction_budget() {
    let (mut func, c, _) = loop_func(Arg::int(0), Arg::int(2), 1);
    let config = UnrollConfig {
        expand_threshold_insts: 2,
        ..UnrollConfig::default()
    };
    assert_eq!(unroll_loops(&mut func, &config), 0);
    assert!(matches!(func.cont(c), Continuation::RangeLoop(_)));
}
