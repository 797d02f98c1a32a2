//! Shared test utilities for tree, instruction and optimizer tests.
//!
//! Factory functions for variables, instructions and continuations used
//! across `tree`, `cont`, `refcount`, `opt` and `codegen` tests. Only
//! compiled in test builds.

use weft_ir::{Arg, BuiltinOp, PrimType, Type, Var};

use crate::cont::{
    Continuation, ForeachLoop, IfStatement, LoopRefcounts, RangeLoop, WaitMode, WaitStatement,
};
use crate::instr::{Instr, TaskMode};
use crate::refcount::RefCountType;
use crate::tree::{BlockId, ContId, Function};

/// Integer future with stack storage.
pub(crate) fn int_future(name: &str) -> Var {
    Var::future(name, PrimType::Int)
}

/// Temporary array of integer futures keyed by integer.
pub(crate) fn int_array(name: &str) -> Var {
    Var::temp(name, Type::array(PrimType::Int, Type::Future(PrimType::Int)))
}

/// Local integer value.
pub(crate) fn int_value(name: &str) -> Var {
    Var::value(name, PrimType::Int)
}

/// Local boolean value.
pub(crate) fn bool_value(name: &str) -> Var {
    Var::value(name, PrimType::Bool)
}

/// Async function `f` with the given inputs and outputs and an empty main
/// block.
pub(crate) fn make_func(inputs: Vec<Var>, outputs: Vec<Var>) -> Function {
    Function::new("f", inputs, outputs, TaskMode::Local)
}

/// `Store dst <- src`.
pub(crate) fn store(dst: &Var, src: impl Into<Arg>) -> Instr {
    Instr::Store {
        dst: dst.clone(),
        src: src.into(),
    }
}

/// Value-level `dst = a + b`.
pub(crate) fn plus(dst: &Var, a: impl Into<Arg>, b: impl Into<Arg>) -> Instr {
    Instr::LocalOp {
        op: BuiltinOp::PlusInt,
        dst: Some(dst.clone()),
        inputs: vec![a.into(), b.into()],
    }
}

pub(crate) fn incr(var: &Var, kind: RefCountType, amount: i64) -> Instr {
    Instr::IncrRef {
        var: var.clone(),
        kind,
        amount: Arg::int(amount),
    }
}

pub(crate) fn decr(var: &Var, kind: RefCountType, amount: i64) -> Instr {
    Instr::DecrRef {
        var: var.clone(),
        kind,
        amount: Arg::int(amount),
    }
}

/// Attach `if (cond) {} else {}` to `block`. Returns the continuation and
/// its then/else blocks.
pub(crate) fn add_if(func: &mut Function, block: BlockId, cond: impl Into<Arg>) -> (ContId, BlockId, BlockId) {
    let then_block = func.new_block();
    let else_block = func.new_block();
    let c = func.add_continuation(
        block,
        Continuation::If(IfStatement {
            cond: cond.into(),
            then_block,
            else_block: Some(else_block),
        }),
    );
    (c, then_block, else_block)
}

/// Attach a range loop `for i = start to end incr step` over value loop
/// variable `i` to `block`. Returns the continuation and its body.
pub(crate) fn add_range(
    func: &mut Function,
    block: BlockId,
    loop_var: &Var,
    start: impl Into<Arg>,
    end: impl Into<Arg>,
    step: impl Into<Arg>,
) -> (ContId, BlockId) {
    let body = func.new_block();
    let c = func.add_continuation(
        block,
        Continuation::RangeLoop(RangeLoop {
            name: "loop".into(),
            loop_var: loop_var.clone(),
            count_var: None,
            start: start.into(),
            end: end.into(),
            incr: step.into(),
            desired_unroll: 1,
            split_degree: 0,
            body,
            passed_in: Vec::new(),
            keep_open: Vec::new(),
            refcounts: LoopRefcounts::default(),
        }),
    );
    (c, body)
}

/// Attach `foreach member in array` to `block`, with the array not yet
/// known closed. Returns the continuation and its body.
pub(crate) fn add_foreach(func: &mut Function, block: BlockId, array: &Var, member: &Var) -> (ContId, BlockId) {
    let body = func.new_block();
    let c = func.add_continuation(
        block,
        Continuation::ForeachLoop(ForeachLoop {
            name: "each".into(),
            array: array.clone(),
            member_var: member.clone(),
            counter_var: None,
            split_degree: 0,
            array_closed: false,
            body,
            passed_in: vec![array.clone()],
            keep_open: Vec::new(),
            refcounts: LoopRefcounts::default(),
        }),
    );
    (c, body)
}

/// Attach a wait on `vars` to `block`. Returns the continuation and its
/// body.
pub(crate) fn add_wait(func: &mut Function, block: BlockId, vars: &[Var], mode: WaitMode) -> (ContId, BlockId) {
    let body = func.new_block();
    let c = func.add_continuation(
        block,
        Continuation::Wait(WaitStatement {
            name: "wait".into(),
            wait_vars: vars.to_vec(),
            mode,
            recursive: false,
            target: TaskMode::Local,
            passed_in: vars.to_vec(),
            keep_open: Vec::new(),
            priority: None,
            body,
        }),
    );
    (c, body)
}

/// Mutable access to the range loop at `c`.
///
/// # Panics
///
/// Panics if `c` is not a range loop.
pub(crate) fn range_mut(func: &mut Function, c: ContId) -> &mut RangeLoop {
    match func.cont_mut(c) {
        Continuation::RangeLoop(l) => l,
        other => panic!("expected range loop, found {}", other.kind_name()),
    }
}

/// Mutable access to the wait at `c`.
///
/// # Panics
///
/// Panics if `c` is not a wait.
pub(crate) fn wait_mut(func: &mut Function, c: ContId) -> &mut WaitStatement {
    match func.cont_mut(c) {
        Continuation::Wait(w) => w,
        other => panic!("expected wait, found {}", other.kind_name()),
    }
}
