//! Reference-count operation elimination.
//!
//! Works on one block at a time and only moves deltas in directions that
//! keep a datum alive at least as long as before:
//!
//! - literal increments of one counter merge into the first of them,
//!   literal decrements into the last
//! - an increment followed by a decrement of the same counter, with no
//!   use of the variable in between, cancel
//! - a literal decrement is absorbed by another instruction that already
//!   releases references on the same counter
//! - a literal increment moves into a loop's start increment when nothing
//!   after it in the block touches the variable
//!
//! Every rewrite preserves the function's [`RcLedger`](crate::refcount::RcLedger).

use std::mem;

use rustc_hash::FxHashMap;
use weft_ir::{Arg, Name, Var};

use crate::cont::{Continuation, LoopRefcounts};
use crate::instr::Instr;
use crate::refcount::RefCountType;
use crate::tree::{BlockId, ContId, Function};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Dir {
    Incr,
    Decr,
}

/// A refcount instruction with a literal amount.
fn literal_rc(instr: &Instr) -> Option<(Dir, &Var, RefCountType, i64)> {
    match instr {
        Instr::IncrRef { var, kind, amount } => amount.as_int().map(|n| (Dir::Incr, var, *kind, n)),
        Instr::DecrRef { var, kind, amount } => amount.as_int().map(|n| (Dir::Decr, var, *kind, n)),
        _ => None,
    }
}

fn set_amount(instr: &mut Instr, n: i64) {
    if let Instr::IncrRef { amount, .. } | Instr::DecrRef { amount, .. } = instr {
        *amount = Arg::int(n);
    }
}

fn uses(instr: &Instr, name: &Name) -> bool {
    instr.reads(name) || instr.writes(name)
}

/// Eliminate redundant refcount operations throughout `func`.
///
/// Returns the number of instructions removed.
pub fn eliminate_refcounts(func: &mut Function) -> usize {
    let mut removed = 0;
    for id in func.subtree(func.main) {
        loop {
            let n = merge(func, id) + cancel(func, id) + piggyback(func, id) + fold_into_loops(func, id);
            if n == 0 {
                break;
            }
            removed += n;
        }
    }
    if removed > 0 {
        tracing::debug!(function = %func.name, removed, "refcount elimination");
    }
    removed
}

// ── Merging ─────────────────────────────────────────────────────────

fn merge(func: &mut Function, id: BlockId) -> usize {
    // (direction, var, counter) -> (target index, total, members)
    let mut groups: FxHashMap<(Dir, Name, RefCountType), (usize, i64, usize)> =
        FxHashMap::default();
    for (i, instr) in func.block(id).instrs.iter().enumerate() {
        if let Some((dir, var, kind, n)) = literal_rc(instr) {
            let group = groups
                .entry((dir, var.name.clone(), kind))
                .or_insert((i, 0, 0));
            if dir == Dir::Decr {
                group.0 = i;
            }
            group.1 += n;
            group.2 += 1;
        }
    }
    groups.retain(|_, g| g.2 > 1);
    if groups.is_empty() {
        return 0;
    }

    let old = mem::take(&mut func.block_mut(id).instrs);
    let mut kept = Vec::with_capacity(old.len());
    let mut removed = 0;
    for (i, instr) in old.into_iter().enumerate() {
        let key = literal_rc(&instr).map(|(dir, var, kind, _)| (dir, var.name.clone(), kind));
        match key.and_then(|k| groups.get(&k).copied()) {
            Some((target, total, _)) if i == target && total != 0 => {
                let mut instr = instr;
                set_amount(&mut instr, total);
                kept.push(instr);
            }
            Some(_) => removed += 1,
            None => kept.push(instr),
        }
    }
    func.block_mut(id).instrs = kept;
    if removed > 0 {
        tracing::trace!(function = %func.name, removed, "merge refcount ops");
    }
    removed
}

// ── Cancellation ────────────────────────────────────────────────────

fn find_cancel_pair(instrs: &[Instr]) -> Option<(usize, usize, i64)> {
    for (i, instr) in instrs.iter().enumerate() {
        let Some((Dir::Incr, var, kind, n)) = literal_rc(instr) else {
            continue;
        };
        if n <= 0 {
            continue;
        }
        for (j, later) in instrs.iter().enumerate().skip(i + 1) {
            match literal_rc(later) {
                Some((Dir::Decr, v, k, m)) if v.name == var.name && k == kind && m > 0 => {
                    return Some((i, j, n.min(m)));
                }
                _ if uses(later, &var.name) => break,
                _ => {}
            }
        }
    }
    None
}

fn cancel(func: &mut Function, id: BlockId) -> usize {
    let mut removed = 0;
    while let Some((i, j, amount)) = find_cancel_pair(&func.block(id).instrs) {
        let instrs = &mut func.block_mut(id).instrs;
        tracing::trace!(incr = %instrs[i], decr = %instrs[j], amount, "cancel refcount ops");
        for idx in [i, j] {
            if let Some((_, _, _, n)) = literal_rc(&instrs[idx]) {
                set_amount(&mut instrs[idx], n - amount);
            }
        }
        // Higher index first so `i` stays valid.
        for idx in [j, i] {
            if literal_rc(&instrs[idx]).is_some_and(|(_, _, _, n)| n == 0) {
                instrs.remove(idx);
                removed += 1;
            }
        }
    }
    removed
}

// ── Piggybacking ────────────────────────────────────────────────────

/// A decrement at `i` and an instruction at `j` that can absorb it.
fn find_piggyback(instrs: &[Instr]) -> Option<(usize, usize, Name, RefCountType, i64)> {
    for (i, instr) in instrs.iter().enumerate() {
        let Some((Dir::Decr, var, kind, m)) = literal_rc(instr) else {
            continue;
        };
        if m <= 0 {
            continue;
        }
        for (j, host) in instrs.iter().enumerate() {
            if j == i || !host.can_piggyback(&var.name, kind, -m) {
                continue;
            }
            // Moving the decrement earlier must not skip over a use.
            let between_clear = j > i
                || instrs[j + 1..i]
                    .iter()
                    .all(|other| !uses(other, &var.name));
            if between_clear {
                return Some((i, j, var.name.clone(), kind, m));
            }
        }
    }
    None
}

fn piggyback(func: &mut Function, id: BlockId) -> usize {
    let mut removed = 0;
    while let Some((i, j, var, kind, m)) = find_piggyback(&func.block(id).instrs) {
        let instrs = &mut func.block_mut(id).instrs;
        if !instrs[j].try_piggyback(&var, kind, -m) {
            break;
        }
        let old = instrs.remove(i);
        tracing::trace!(decr = %old, "piggyback refcount op");
        removed += 1;
    }
    removed
}

// ── Loop folding ────────────────────────────────────────────────────

/// Whether continuation `c` mentions `name` anywhere.
fn cont_mentions(func: &Function, c: ContId, name: &Name) -> bool {
    let cont = func.cont(c);
    let direct = cont
        .required_vars()
        .into_iter()
        .chain(cont.passed_in())
        .chain(cont.keep_open())
        .any(|v| &v.name == name);
    let in_refcounts = match cont {
        Continuation::RangeLoop(l) => refcounts_mention(&l.refcounts, name),
        Continuation::ForeachLoop(l) => refcounts_mention(&l.refcounts, name),
        _ => false,
    };
    direct
        || in_refcounts
        || cont
            .blocks()
            .into_iter()
            .any(|b| func.find_essential_vars_in(b).contains(name))
}

fn refcounts_mention(rc: &LoopRefcounts, name: &Name) -> bool {
    rc.per_iter_incrs
        .iter()
        .chain(&rc.const_incrs)
        .chain(&rc.end_decrs)
        .any(|a| &a.var.name == name)
}

/// An increment at `i` that can move into loop `c`'s start increment at
/// position `pos`.
fn find_loop_fold(func: &Function, id: BlockId) -> Option<(usize, ContId, usize)> {
    let block = func.block(id);
    for (i, instr) in block.instrs.iter().enumerate() {
        let Some((Dir::Incr, var, kind, _)) = literal_rc(instr) else {
            continue;
        };
        if block.instrs[i + 1..].iter().any(|later| uses(later, &var.name))
            || block.cleanups.iter().any(|c| c.var.name == var.name || c.action.reads(&var.name))
        {
            continue;
        }
        let target = block.conts.iter().find_map(|&c| {
            let pos = match func.cont(c) {
                Continuation::RangeLoop(l) => l.refcounts.const_incr_for(&var.name, kind),
                Continuation::ForeachLoop(l) => l.refcounts.const_incr_for(&var.name, kind),
                _ => None,
            }?;
            Some((c, pos))
        });
        let Some((c, pos)) = target else {
            continue;
        };
        let others_clear = block
            .conts
            .iter()
            .filter(|&&other| other != c)
            .all(|&other| !cont_mentions(func, other, &var.name));
        if others_clear {
            return Some((i, c, pos));
        }
    }
    None
}

fn fold_into_loops(func: &mut Function, id: BlockId) -> usize {
    let mut removed = 0;
    while let Some((i, c, pos)) = find_loop_fold(func, id) {
        let instr = func.block_mut(id).instrs.remove(i);
        let Some((_, _, _, n)) = literal_rc(&instr) else {
            break;
        };
        if let Some(adj) = func
            .cont_mut(c)
            .refcounts_mut()
            .and_then(|rc| rc.const_incrs.get_mut(pos))
        {
            let total = adj.amount.as_int().unwrap_or(0) + n;
            adj.amount = Arg::int(total);
        }
        tracing::trace!(incr = %instr, "fold refcount op into loop");
        removed += 1;
    }
    removed
}

#[cfg(test)]
mod tests;
