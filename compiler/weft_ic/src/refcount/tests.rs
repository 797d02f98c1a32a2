use pretty_assertions::assert_eq;
use weft_ir::{Arg, Literal, Name};

use crate::cont::RcAdjust;
use crate::instr::Instr;
use crate::test_helpers::{add_if, add_range, decr, incr, int_future, int_value, make_func, range_mut};

use super::{RcLedger, RefCountType};

#[test]
fn counter_names() {
    assert_eq!(RefCountType::Readers.to_string(), "read");
    assert_eq!(RefCountType::ALL.map(RefCountType::name), ["read", "write"]);
}

#[test]
fn ledger_sums_explicit_and_piggybacked_deltas() {
    let a = int_future("a");
    let mut func = make_func(vec![], vec![]);
    func.main_block_mut().declare(a.clone());
    func.main_block_mut().declare(int_value("v"));
    func.main_block_mut().add_instr(incr(&a, RefCountType::Readers, 3));
    func.main_block_mut().add_instr(Instr::Load {
        dst: int_value("v"),
        src: a.clone(),
        decr_read: Arg::int(1),
    });
    func.main_block_mut().add_instr(decr(&a, RefCountType::Writers, 1));

    let ledger = RcLedger::of_function(&func);
    assert_eq!(ledger.get(&a.name, RefCountType::Readers), 2);
    assert_eq!(ledger.get(&a.name, RefCountType::Writers), -1);
    assert_eq!(ledger.get(&Name::new("b"), RefCountType::Readers), 0);
    assert!(ledger.symbolic.is_empty());
}

#[test]
fn ledger_prunes_cancelled_entries() {
    let a = int_future("a");
    let mut func = make_func(vec![], vec![]);
    func.main_block_mut().add_instr(incr(&a, RefCountType::Readers, 2));
    func.main_block_mut().add_instr(decr(&a, RefCountType::Readers, 2));
    assert_eq!(RcLedger::of_function(&func), RcLedger::default());
}

/// Loop adjustments count once; deltas in the body count once per body,
/// not once per iteration.
#[test]
fn ledger_includes_loop_refcounts_and_bodies() {
    let a = int_future("a");
    let n = int_value("n");
    let mut func = make_func(vec![], vec![]);
    let main = func.main;
    let (c, body) = add_range(&mut func, main, &int_value("i"), Arg::int(0), Arg::int(9), Arg::int(1));
    func.block_mut(body).add_instr(decr(&a, RefCountType::Readers, 1));
    let refcounts = &mut range_mut(&mut func, c).refcounts;
    refcounts.const_incrs.push(RcAdjust {
        var: a.clone(),
        kind: RefCountType::Writers,
        amount: Arg::int(4),
    });
    refcounts.end_decrs.push(RcAdjust {
        var: a.clone(),
        kind: RefCountType::Writers,
        amount: Arg::int(1),
    });
    refcounts.per_iter_incrs.push(RcAdjust {
        var: a.clone(),
        kind: RefCountType::Readers,
        amount: Arg::from(&n),
    });

    let ledger = RcLedger::of_function(&func);
    assert_eq!(ledger.get(&a.name, RefCountType::Writers), 3);
    assert_eq!(ledger.get(&a.name, RefCountType::Readers), -1);
    assert_eq!(
        ledger
            .symbolic
            .get(&((a.name.clone(), RefCountType::Readers), n.name.clone())),
        Some(&1)
    );
}

/// One run of a three-trip loop applies its body and per-iteration
/// increments three times; a branch on a literal applies one side.
#[test]
fn execution_ledger_counts_trips_and_taken_branches() {
    let (a, b) = (int_future("a"), int_future("b"));
    let mut func = make_func(vec![a.clone(), b.clone()], vec![]);
    let main = func.main;
    let (c, body) = add_range(&mut func, main, &int_value("i"), Arg::int(0), Arg::int(4), Arg::int(2));
    func.block_mut(body).add_instr(decr(&a, RefCountType::Readers, 1));
    let refcounts = &mut range_mut(&mut func, c).refcounts;
    refcounts.per_iter_incrs.push(RcAdjust {
        var: a.clone(),
        kind: RefCountType::Readers,
        amount: Arg::int(2),
    });
    refcounts.end_decrs.push(RcAdjust {
        var: a.clone(),
        kind: RefCountType::Writers,
        amount: Arg::int(1),
    });
    let (_, then_block, else_block) = add_if(&mut func, main, Arg::Lit(Literal::Bool(false)));
    func.block_mut(then_block).add_instr(decr(&b, RefCountType::Writers, 5));
    func.block_mut(else_block).add_instr(incr(&b, RefCountType::Readers, 1));

    let run = RcLedger::of_execution(&func);
    assert_eq!(run.get(&a.name, RefCountType::Readers), 3);
    assert_eq!(run.get(&a.name, RefCountType::Writers), -1);
    assert_eq!(run.get(&b.name, RefCountType::Readers), 1);
    assert_eq!(run.get(&b.name, RefCountType::Writers), 0);

    let once = RcLedger::of_function(&func);
    assert_eq!(once.get(&a.name, RefCountType::Readers), 1);
    assert_eq!(once.get(&b.name, RefCountType::Writers), -5);
}

#[test]
fn execution_ledger_skips_empty_ranges() {
    let a = int_future("a");
    let mut func = make_func(vec![a.clone()], vec![]);
    let main = func.main;
    let (c, body) = add_range(&mut func, main, &int_value("i"), Arg::int(3), Arg::int(1), Arg::int(1));
    func.block_mut(body).add_instr(decr(&a, RefCountType::Readers, 1));
    range_mut(&mut func, c).refcounts.const_incrs.push(RcAdjust {
        var: a.clone(),
        kind: RefCountType::Writers,
        amount: Arg::int(2),
    });

    let run = RcLedger::of_execution(&func);
    assert_eq!(run.get(&a.name, RefCountType::Readers), 0);
    assert_eq!(run.get(&a.name, RefCountType::Writers), 2);
}
