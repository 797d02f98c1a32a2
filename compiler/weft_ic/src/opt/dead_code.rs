//! Dead-code elimination.
//!
//! Repeats its removals until none applies: continuations whose child
//! blocks are all empty, instructions with neither outputs nor side
//! effects, declared variables that are not essential together with
//! the instructions that only write them, and variables a
//! compiler-generated wait suspends on but never reads.

use rustc_hash::FxHashSet;
use weft_ir::Name;

use crate::cont::{Continuation, WaitMode};
use crate::error::IcResult;
use crate::tree::{BlockId, ContId, Function};

/// Remove dead code from `func`.
///
/// Returns the number of continuations, instructions and variable
/// declarations removed.
pub fn eliminate_dead_code(func: &mut Function) -> IcResult<usize> {
    let mut removed = 0;
    loop {
        let round = remove_empty_conts(func)
            + remove_useless_instrs(func)
            + remove_unused_wait_vars(func)
            + remove_dead_vars(func)?;
        if round == 0 {
            break;
        }
        removed += round;
    }
    if removed > 0 {
        tracing::debug!(function = %func.name, removed, "dead code elimination");
    }
    Ok(removed)
}

fn remove_empty_conts(func: &mut Function) -> usize {
    let candidates: Vec<ContId> = func
        .cont_ids()
        .filter(|&c| {
            let cont = func.cont(c);
            cont.can_remove_when_empty()
                && cont
                    .blocks()
                    .into_iter()
                    .all(|b| func.block(b).is_empty())
        })
        .collect();
    for &c in &candidates {
        let cont = func.remove_continuation(c);
        tracing::trace!(function = %func.name, kind = cont.kind_name(), "remove empty continuation");
    }
    candidates.len()
}

fn remove_useless_instrs(func: &mut Function) -> usize {
    let mut removed = 0;
    for id in func.subtree(func.main) {
        let instrs = &mut func.block_mut(id).instrs;
        let before = instrs.len();
        instrs.retain(|i| !i.outputs().is_empty() || i.has_side_effects());
        removed += before - instrs.len();
    }
    removed
}

fn remove_unused_wait_vars(func: &mut Function) -> usize {
    let waits: Vec<ContId> = func
        .cont_ids()
        .filter(|&c| matches!(func.cont(c), Continuation::Wait(w) if w.mode != WaitMode::Explicit))
        .collect();
    let mut removed = 0;
    for c in waits {
        let Continuation::Wait(w) = func.cont(c) else {
            continue;
        };
        let mut used = func.find_essential_vars_in(w.body);
        used.extend(w.keep_open.iter().map(|v| v.name.clone()));
        removed += func.cont_mut(c).remove_unused_wait_vars(&used);
    }
    removed
}

/// Narrow `dead` until no instruction in the subtree writes both a dead
/// and a live variable.
fn unpin(func: &Function, block: BlockId, dead: &mut FxHashSet<Name>) {
    loop {
        let mut pinned = Vec::new();
        for id in func.subtree(block) {
            for instr in &func.block(id).instrs {
                let outs = instr.outputs();
                if outs.iter().any(|o| !dead.contains(&o.name)) {
                    pinned.extend(
                        outs.iter()
                            .filter(|o| dead.contains(&o.name))
                            .map(|o| o.name.clone()),
                    );
                }
            }
        }
        if pinned.is_empty() {
            return;
        }
        for name in pinned {
            dead.remove(&name);
        }
    }
}

fn remove_dead_vars(func: &mut Function) -> IcResult<usize> {
    let essential = func.find_essential_vars();
    let mut removed = 0;
    for id in func.subtree(func.main) {
        let mut dead: FxHashSet<Name> = func
            .block(id)
            .vars
            .iter()
            .filter(|v| !essential.contains(&v.name))
            .map(|v| v.name.clone())
            .collect();
        unpin(func, id, &mut dead);
        if dead.is_empty() {
            continue;
        }
        tracing::trace!(function = %func.name, count = dead.len(), "remove dead variables");
        removed += dead.len() + func.remove_vars(id, &dead)?;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests;
