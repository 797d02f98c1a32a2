use pretty_assertions::assert_eq;
use weft_ir::Arg;

use crate::test_helpers::{add_if, add_range, bool_value, int_future, int_value, make_func, store};

use super::fuse_continuations;

/// Two conditionals on the same variable merge into one whose branches
/// run both original branches in order.
#[test]
fn sibling_ifs_on_same_condition_merge() {
    let c = bool_value("c");
    let (p, q) = (int_future("p"), int_future("q"));
    let mut func = make_func(vec![c.clone()], vec![p.clone(), q.clone()]);
    let main = func.main;
    let (first, then1, else1) = add_if(&mut func, main, &c);
    let (_, then2, else2) = add_if(&mut func, main, &c);
    func.block_mut(then1).add_instr(store(&p, Arg::int(1)));
    func.block_mut(else1).add_instr(store(&p, Arg::int(2)));
    func.block_mut(then2).add_instr(store(&q, Arg::int(3)));
    func.block_mut(else2).add_instr(store(&q, Arg::int(4)));

    assert_eq!(fuse_continuations(&mut func), 1);
    assert_eq!(func.main_block().conts, vec![first]);
    assert_eq!(
        func.block(then1).instrs,
        vec![store(&p, Arg::int(1)), store(&q, Arg::int(3))]
    );
    assert_eq!(
        func.block(else1).instrs,
        vec![store(&p, Arg::int(2)), store(&q, Arg::int(4))]
    );
}

#[test]
fn different_conditions_stay_separate() {
    let (c, d) = (bool_value("c"), bool_value("d"));
    let mut func = make_func(vec![c.clone(), d.clone()], vec![]);
    let main = func.main;
    add_if(&mut func, main, &c);
    add_if(&mut func, main, &d);
    assert_eq!(fuse_continuations(&mut func), 0);
    assert_eq!(func.main_block().conts.len(), 2);
}

#[test]
fn clashing_body_declarations_block_fusion() {
    let c = bool_value("c");
    let mut func = make_func(vec![c.clone()], vec![]);
    let main = func.main;
    let (_, then1, _) = add_if(&mut func, main, &c);
    let (_, then2, _) = add_if(&mut func, main, &c);
    func.block_mut(then1).declare(int_value("t"));
    func.block_mut(then2).declare(int_value("t"));
    assert_eq!(fuse_continuations(&mut func), 0);
}

#[test]
fn fused_range_body_uses_first_loop_variable() {
    let (i, j) = (int_value("i"), int_value("j"));
    let (p, q) = (int_future("p"), int_future("q"));
    let mut func = make_func(vec![], vec![p.clone(), q.clone()]);
    let main = func.main;
    let (_, body1) = add_range(&mut func, main, &i, Arg::int(0), Arg::int(9), Arg::int(1));
    let (_, body2) = add_range(&mut func, main, &j, Arg::int(0), Arg::int(9), Arg::int(1));
    func.block_mut(body1).add_instr(store(&p, &i));
    func.block_mut(body2).add_instr(store(&q, &j));

    assert_eq!(fuse_continuations(&mut func), 1);
    assert_eq!(
        func.block(body1).instrs,
        vec![store(&p, &i), store(&q, &i)]
    );
}

#[test]
fn three_matching_siblings_collapse_to_one() {
    let c = bool_value("c");
    let mut func = make_func(vec![c.clone()], vec![]);
    let main = func.main;
    for _ in 0..3 {
        add_if(&mut func, main, &c);
    }
    assert_eq!(fuse_continuations(&mut func), 2);
    assert_eq!(func.main_block().conts.len(), 1);
}
