//! Range-loop unrolling and full expansion.
//!
//! A loop with a small literal trip count is expanded into a nested block
//! holding one copy of the body per iteration. Otherwise, a loop asking
//! for an unroll factor `u` gets `u - 1` extra body copies per iteration,
//! each on its own induction value `i@k = i@(k-1) + incr`, and the step
//! becomes `incr * u`.
//!
//! # Boundary checks
//!
//! With literal bounds the trip count `n` is known. If `u` divides `n`, no
//! check is needed. Otherwise the final group is partial with
//! `n mod u` valid copies, and a single check `i@(n mod u) <= end` guards
//! every copy from that one on: it holds in every full group and fails
//! only in the last. With non-literal bounds every copy after the first is
//! guarded, each check nested inside the previous one.

use weft_ir::{Arg, BuiltinOp, PrimType, Type, Var};

use crate::config::UnrollConfig;
use crate::cont::{Continuation, IfStatement, RangeLoop};
use crate::instr::Instr;
use crate::rename::{RenameMode, Renames};
use crate::tree::{BlockId, ContId, Function};

enum Plan {
    Skip,
    Refuse(&'static str),
    Expand { trips: i64, start: i64, incr: i64 },
    Unroll { factor: u32, incr: i64, trips: Option<i64> },
}

/// Unroll or expand every range loop in `func` that asks for it or is
/// small enough. Returns the number of loops transformed.
pub fn unroll_loops(func: &mut Function, config: &UnrollConfig) -> usize {
    let mut unrolled = 0;
    let conts: Vec<ContId> = func.cont_ids().collect();
    for c in conts {
        let Ok(node) = func.try_cont(c) else {
            continue;
        };
        let Continuation::RangeLoop(l) = &node.cont else {
            continue;
        };
        match plan(func, l, config) {
            Plan::Skip => {}
            Plan::Refuse(reason) => {
                tracing::warn!(
                    function = %func.name,
                    loop_name = %l.name,
                    reason,
                    "loop not unrolled"
                );
                if let Continuation::RangeLoop(l) = func.cont_mut(c) {
                    l.desired_unroll = 1;
                }
            }
            Plan::Expand { trips, start, incr } => {
                let l = l.clone();
                expand(func, c, &l, trips, start, incr);
                unrolled += 1;
            }
            Plan::Unroll {
                factor,
                incr,
                trips,
            } => {
                let l = l.clone();
                unroll(func, c, &l, factor, incr, trips);
                unrolled += 1;
            }
        }
    }
    if unrolled > 0 {
        tracing::debug!(function = %func.name, unrolled, "loop unrolling");
    }
    unrolled
}

fn plan(func: &Function, l: &RangeLoop, config: &UnrollConfig) -> Plan {
    let Some(incr) = l.incr.as_int().filter(|&i| i > 0) else {
        return Plan::Skip;
    };
    if !l.loop_var.ty.is_value() {
        return Plan::Skip;
    }
    let trips = match (l.start.as_int(), l.end.as_int()) {
        (Some(s), Some(e)) if e < s => Some(0),
        (Some(s), Some(e)) => match e.checked_sub(s) {
            Some(span) => Some(span / incr + 1),
            None => return Plan::Skip,
        },
        _ => None,
    };

    if let (Some(n), Some(start)) = (trips, l.start.as_int()) {
        let body = u64::try_from(func.block_instruction_count(l.body)).unwrap_or(u64::MAX);
        let small = u64::try_from(n).is_ok_and(|n| {
            n >= 2
                && n <= config.expand_threshold_iters
                && n.saturating_mul(body.max(1)) <= config.expand_threshold_insts
        });
        let counter_ok = l.count_var.as_ref().map_or(true, |v| v.ty.is_value());
        if small && l.split_degree == 0 && l.refcounts.is_empty() && counter_ok {
            return Plan::Expand {
                trips: n,
                start,
                incr,
            };
        }
    }

    let factor = l.desired_unroll.min(config.max_unroll_factor);
    if factor <= 1 || trips == Some(0) {
        return Plan::Skip;
    }
    if l.count_var.is_some() {
        return Plan::Refuse("loop has an iteration counter");
    }
    if incr.checked_mul(i64::from(factor)).is_none() {
        return Plan::Skip;
    }
    let needs_check = trips.map_or(true, |n| n % i64::from(factor) != 0);
    if needs_check && !l.refcounts.per_iter_incrs.is_empty() {
        return Plan::Refuse("per-iteration refcounts with a partial final group");
    }
    if l.refcounts.per_iter_incrs.iter().any(|a| !a.amount.is_const()) {
        return Plan::Refuse("per-iteration refcount amount is not a literal");
    }
    Plan::Unroll {
        factor,
        incr,
        trips,
    }
}

/// Rename the declarations of a detached body copy to fresh names ending
/// in `@k`, adding the substitutions to `renames`.
fn suffix_decls(func: &Function, copy: BlockId, k: i64, renames: &mut Renames) {
    for v in &func.block(copy).vars {
        let fresh = func.unique_var_name(v.name.with_suffix(format_args!("@{k}")));
        renames.insert(v.name.clone(), Arg::Var(v.renamed(fresh)));
    }
}

fn expand(func: &mut Function, c: ContId, l: &RangeLoop, trips: i64, start: i64, incr: i64) {
    let target = func.new_block();
    let mut value = start;
    for j in 0..trips {
        let copy = func.clone_block(l.body);
        let mut renames = Renames::single(l.loop_var.name.clone(), Arg::int(value));
        if let Some(counter) = &l.count_var {
            renames.insert(counter.name.clone(), Arg::int(j));
        }
        suffix_decls(func, copy, j, &mut renames);
        func.rename_vars(copy, &renames, RenameMode::Replace);
        func.insert_inline(target, copy, false);
        value = value.saturating_add(incr);
    }
    func.free_block(l.body);
    func.block_mut(target).parent = Some(c);
    *func.cont_mut(c) = Continuation::Nested(target);
    tracing::trace!(function = %func.name, loop_name = %l.name, trips, "loop expanded");
}

fn unroll(
    func: &mut Function,
    c: ContId,
    l: &RangeLoop,
    factor: u32,
    incr: i64,
    trips: Option<i64>,
) {
    let step = i64::from(factor);
    let copies: Vec<BlockId> = (1..factor).map(|_| func.clone_block(l.body)).collect();
    let partial = trips.map(|n| n % step);

    let mut target = l.body;
    let mut prev = l.loop_var.clone();
    for (k, copy) in (1i64..).zip(copies) {
        let name = func.unique_var_name(l.loop_var.name.with_suffix(format_args!("@{k}")));
        let current = Var::temp(name, l.loop_var.ty.clone());
        let b = func.block_mut(target);
        b.declare(current.clone());
        b.add_instr(Instr::LocalOp {
            op: BuiltinOp::PlusInt,
            dst: Some(current.clone()),
            inputs: vec![Arg::from(&prev), l.incr.clone()],
        });

        let check = partial.map_or(true, |extra| extra != 0 && k == extra);
        if check {
            let ok_name = func.unique_var_name(current.name.with_suffix(":ok"));
            let ok = Var::temp(ok_name, Type::Value(PrimType::Bool));
            let b = func.block_mut(target);
            b.declare(ok.clone());
            b.add_instr(Instr::LocalOp {
                op: BuiltinOp::LteInt,
                dst: Some(ok.clone()),
                inputs: vec![Arg::from(&current), l.end.clone()],
            });
            let then_block = func.new_block();
            func.add_continuation(
                target,
                Continuation::If(IfStatement {
                    cond: Arg::from(&ok),
                    then_block,
                    else_block: None,
                }),
            );
            target = then_block;
        }

        let mut renames = Renames::single(l.loop_var.name.clone(), Arg::from(&current));
        suffix_decls(func, copy, k, &mut renames);
        func.rename_vars(copy, &renames, RenameMode::Replace);
        func.insert_inline(target, copy, false);
        prev = current;
    }

    if let Continuation::RangeLoop(l) = func.cont_mut(c) {
        l.incr = Arg::int(incr * step);
        l.desired_unroll = 1;
        for adj in &mut l.refcounts.per_iter_incrs {
            if let Some(n) = adj.amount.as_int() {
                adj.amount = Arg::int(n.saturating_mul(step));
            }
        }
    }
    tracing::trace!(function = %func.name, loop_name = %l.name, factor, "loop unrolled");
}

#[cfg(test)]
mod tests;
