//! Wait coalescing.
//!
//! Two rewrites, applied block by block from the main block down:
//!
//! - **Merging.** Sibling waits sharing a future are gathered under one new
//!   wait on the futures they all share. Each old wait drops the shared
//!   futures it no longer needs; one left with nothing to wait for is
//!   spliced into the new body, the others nest inside it.
//! - **Push-down.** An async continuation or async instruction that
//!   blocks on a future written inside a sibling wait's body moves into
//!   that body, after the write. It then starts once its input can be
//!   ready instead of suspending alongside the writer.
//!
//! Push-down only descends through waits that stay in the current
//! execution context. A task dispatch to a control or worker context is a
//! barrier.

use rustc_hash::{FxHashMap, FxHashSet};
use weft_ir::{Name, Storage, Var};

use crate::cont::{wait_satisfied, Continuation, Prediction, WaitMode, WaitStatement};
use crate::instr::{ClosedSet, Instr, TaskMode};
use crate::rename::Renames;
use crate::tree::{BlockId, ContId, Function};

/// What a run of [`coalesce_waits`] changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoalesceStats {
    /// Waits gathered under a merged wait.
    pub merged: usize,
    /// Instructions and continuations moved into a wait body.
    pub pushed_down: usize,
}

/// Merge and push down the waits of every block in `func`.
pub fn coalesce_waits(func: &mut Function) -> CoalesceStats {
    let mut stats = CoalesceStats::default();
    coalesce_block(func, func.main, &mut stats);
    if stats.merged + stats.pushed_down > 0 {
        tracing::debug!(
            function = %func.name,
            merged = stats.merged,
            pushed_down = stats.pushed_down,
            "wait coalescing"
        );
    }
    stats
}

fn coalesce_block(func: &mut Function, block: BlockId, stats: &mut CoalesceStats) {
    stats.merged += merge_waits(func, block);
    stats.pushed_down += push_down(func, block);
    let children: Vec<BlockId> = func
        .block(block)
        .conts
        .iter()
        .flat_map(|&c| func.cont(c).blocks())
        .collect();
    for child in children {
        coalesce_block(func, child, stats);
    }
}

fn extend_unique(into: &mut Vec<Var>, from: &[Var]) {
    for v in from {
        if !into.iter().any(|x| x.name == v.name) {
            into.push(v.clone());
        }
    }
}

// ── Merging ─────────────────────────────────────────────────────────

/// The waits of `block` sharing the future most of them wait on, if at
/// least two share one. Ties go to the future seen first.
fn most_shared(func: &Function, block: BlockId) -> Option<Vec<ContId>> {
    let mut order: Vec<&Name> = Vec::new();
    let mut waiters: FxHashMap<&Name, Vec<ContId>> = FxHashMap::default();
    for &c in &func.block(block).conts {
        let Continuation::Wait(w) = func.cont(c) else {
            continue;
        };
        for v in &w.wait_vars {
            let entry = waiters.entry(&v.name).or_default();
            if entry.is_empty() {
                order.push(&v.name);
            }
            if !entry.contains(&c) {
                entry.push(c);
            }
        }
    }
    let mut best: Option<&Name> = None;
    let mut best_count = 1;
    for name in order {
        let count = waiters.get(name).map_or(0, Vec::len);
        if count > best_count {
            best = Some(name);
            best_count = count;
        }
    }
    best.and_then(|name| waiters.remove(name))
}

fn merge_waits(func: &mut Function, block: BlockId) -> usize {
    let mut merged = 0;
    while let Some(group) = most_shared(func, block) {
        merged += group.len();
        merge_group(func, block, &group);
    }
    merged
}

fn merge_group(func: &mut Function, block: BlockId, group: &[ContId]) {
    let waits: Vec<WaitStatement> = group
        .iter()
        .filter_map(|&c| match func.cont(c) {
            Continuation::Wait(w) => Some(w.clone()),
            _ => None,
        })
        .collect();
    let Some(first) = waits.first() else {
        return;
    };
    let shared: Vec<Var> = first
        .wait_vars
        .iter()
        .filter(|v| waits.iter().all(|w| w.wait_vars.iter().any(|x| x.name == v.name)))
        .cloned()
        .collect();
    let explicit = waits.iter().any(|w| w.mode != WaitMode::WaitOnly);
    let all_recursive = waits.iter().all(|w| w.recursive);
    let mut passed_in = Vec::new();
    let mut keep_open = Vec::new();
    for w in &waits {
        extend_unique(&mut passed_in, &w.passed_in);
        extend_unique(&mut keep_open, &w.keep_open);
    }

    let name = format!("{}-merged", func.name);
    let body = func.new_block();
    let closed = ClosedSet::from_names(shared.iter().map(|v| v.name.clone()));
    func.add_continuation(
        block,
        Continuation::Wait(WaitStatement {
            name: name.into(),
            wait_vars: shared,
            mode: if explicit {
                WaitMode::Explicit
            } else {
                WaitMode::WaitOnly
            },
            recursive: all_recursive,
            target: TaskMode::Local,
            passed_in,
            keep_open,
            priority: None,
            body,
        }),
    );

    for &c in group {
        let Continuation::Wait(w) = func.cont_mut(c) else {
            continue;
        };
        // A recursive wait under a shallow one still needs its containers.
        let deep = w.recursive && !all_recursive;
        w.wait_vars.retain(|v| !wait_satisfied(v, deep, &closed));
        let spliceable =
            w.wait_vars.is_empty() && w.mode != WaitMode::TaskDispatch && w.priority.is_none();
        let old_body = w.body;
        func.move_continuation(c, body);
        let clash = func
            .block(old_body)
            .vars
            .iter()
            .any(|v| func.block(body).declares(&v.name));
        if spliceable && !clash {
            let inline = Prediction {
                block: Some(old_body),
                renames: Renames::new(),
            };
            func.inline_continuation(c, &inline);
        }
    }
    tracing::trace!(function = %func.name, waits = group.len(), "merge waits");
}

// ── Push-down ───────────────────────────────────────────────────────

/// Something in a block that suspends until a future closes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Waiter {
    Instr(usize),
    Cont(ContId),
}

/// A block below a wait where futures are written.
struct Site {
    block: BlockId,
    /// Waits entered to reach `block`, outermost first.
    ancestors: Vec<ContId>,
    /// Per ancestor, the names declared from its body down to `block`.
    declared: Vec<FxHashSet<Name>>,
    /// Futures written by instructions in `block`, in order.
    written: Vec<Name>,
}

/// Whether writing `v` can let something blocked on it proceed.
fn is_signal(v: &Var) -> bool {
    v.ty.is_scalar_future() || v.ty.is_ref()
}

/// Whether work moved into this continuation's body stays in the same
/// execution context.
fn enters_same_context(cont: &Continuation) -> bool {
    matches!(cont, Continuation::Wait(w) if w.mode != WaitMode::TaskDispatch || !w.target.needs_dispatch())
}

/// An async instruction writing only plain futures.
fn relocatable(instr: &Instr) -> bool {
    let outs = instr.outputs();
    !outs.is_empty()
        && outs.iter().all(|v| is_signal(v) && v.storage != Storage::Alias)
        && !instr.is_sync()
        && instr.rc_contributions().is_empty()
}

/// Waiters of `block`, keyed by each future they block on.
fn waiters_of(func: &Function, block: BlockId) -> Vec<(Name, Waiter)> {
    let b = func.block(block);
    let mut waiters = Vec::new();
    for (i, instr) in b.instrs.iter().enumerate() {
        if !relocatable(instr) {
            continue;
        }
        for v in instr.blocking_inputs().into_iter().filter(|v| !v.ty.is_value()) {
            waiters.push((v.name.clone(), Waiter::Instr(i)));
        }
    }
    for &c in &b.conts {
        let cont = func.cont(c);
        if !cont.is_async() {
            continue;
        }
        for v in cont.blocking_vars() {
            waiters.push((v.name.clone(), Waiter::Cont(c)));
        }
    }
    waiters
}

fn collect_sites(
    func: &Function,
    cont: ContId,
    ancestors: &mut Vec<ContId>,
    path: &mut Vec<BlockId>,
    sites: &mut Vec<Site>,
) {
    ancestors.push(cont);
    for child in func.cont(cont).blocks() {
        path.push(child);
        let b = func.block(child);
        let written: Vec<Name> = b
            .instrs
            .iter()
            .flat_map(Instr::outputs)
            .filter(|v| is_signal(v))
            .map(|v| v.name.clone())
            .collect();
        if !written.is_empty() {
            let declared = (0..ancestors.len())
                .map(|k| {
                    path.get(k..)
                        .unwrap_or_default()
                        .iter()
                        .flat_map(|&p| func.block(p).vars.iter().map(|v| v.name.clone()))
                        .collect()
                })
                .collect();
            sites.push(Site {
                block: child,
                ancestors: ancestors.clone(),
                declared,
                written,
            });
        }
        for &inner in &b.conts {
            if enters_same_context(func.cont(inner)) {
                collect_sites(func, inner, ancestors, path, sites);
            }
        }
        path.pop();
    }
    ancestors.pop();
}

/// Every variable a continuation or anything below it mentions.
fn mentioned(func: &Function, c: ContId) -> Vec<Var> {
    let cont = func.cont(c);
    let mut vars: Vec<Var> = cont
        .required_vars()
        .into_iter()
        .chain(cont.passed_in())
        .chain(cont.keep_open())
        .chain(cont.blocking_vars())
        .cloned()
        .collect();
    for child in cont.blocks() {
        for id in func.subtree(child) {
            let b = func.block(id);
            for instr in &b.instrs {
                vars.extend(instr.input_vars().into_iter().chain(instr.outputs()).cloned());
            }
            for cleanup in &b.cleanups {
                vars.push(cleanup.var.clone());
                vars.extend(cleanup.action.input_vars().into_iter().cloned());
            }
            for &inner in &b.conts {
                let inner = func.cont(inner);
                vars.extend(
                    inner
                        .required_vars()
                        .into_iter()
                        .chain(inner.passed_in())
                        .chain(inner.keep_open())
                        .cloned(),
                );
            }
        }
    }
    vars
}

/// Pass `uses` and `keep_open` through every wait between the moved item
/// and the block it came from.
fn widen_ancestors(func: &mut Function, site: &Site, uses: &[Var], keep_open: &[Var]) {
    for (&a, local) in site.ancestors.iter().zip(&site.declared) {
        let outer = |v: &&Var| v.storage != Storage::GlobalConst && !local.contains(&v.name);
        let uses: Vec<Var> = uses.iter().filter(outer).cloned().collect();
        let keep: Vec<Var> = keep_open.iter().filter(outer).cloned().collect();
        if let Continuation::Wait(w) = func.cont_mut(a) {
            extend_unique(&mut w.passed_in, &uses);
            extend_unique(&mut w.keep_open, &keep);
        }
    }
}

fn push_down(func: &mut Function, block: BlockId) -> usize {
    let waiters = waiters_of(func, block);
    if waiters.is_empty() {
        return 0;
    }
    let tops: Vec<ContId> = func
        .block(block)
        .conts
        .iter()
        .copied()
        .filter(|&c| enters_same_context(func.cont(c)))
        .collect();

    let mut moved_instrs: FxHashSet<usize> = FxHashSet::default();
    let mut moved = 0;
    for top in tops {
        if func.cont_node(top).parent != block {
            continue;
        }
        let mut sites = Vec::new();
        collect_sites(func, top, &mut Vec::new(), &mut Vec::new(), &mut sites);
        for site in &sites {
            let Some(rebound) = site.declared.first() else {
                continue;
            };
            for name in &site.written {
                for (key, waiter) in &waiters {
                    if key != name {
                        continue;
                    }
                    match *waiter {
                        Waiter::Instr(i) => {
                            if moved_instrs.contains(&i) {
                                continue;
                            }
                            let Some(instr) = func.block(block).instrs.get(i).cloned() else {
                                continue;
                            };
                            let uses: Vec<Var> =
                                instr.input_vars().into_iter().chain(instr.outputs()).cloned().collect();
                            if uses.iter().any(|v| rebound.contains(&v.name)) {
                                continue;
                            }
                            func.block_mut(site.block).add_instr(instr);
                            moved_instrs.insert(i);
                            widen_ancestors(func, site, &uses, &[]);
                        }
                        Waiter::Cont(c) => {
                            if c == top || func.cont_node(c).parent != block {
                                continue;
                            }
                            let uses = mentioned(func, c);
                            if uses.iter().any(|v| rebound.contains(&v.name)) {
                                continue;
                            }
                            let keep_open = func.cont(c).keep_open().to_vec();
                            func.move_continuation(c, site.block);
                            widen_ancestors(func, site, &uses, &keep_open);
                        }
                    }
                    tracing::trace!(function = %func.name, future = %name, "push down waiter");
                    moved += 1;
                }
            }
        }
    }

    if !moved_instrs.is_empty() {
        let mut i = 0;
        func.block_mut(block).instrs.retain(|_| {
            let keep = !moved_instrs.contains(&i);
            i += 1;
            keep
        });
    }
    moved
}

#[cfg(test)]
mod tests;
