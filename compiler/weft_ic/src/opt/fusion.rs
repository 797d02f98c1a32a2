//! Fusion of matching sibling continuations.
//!
//! Two continuations of the same block with identical control parameters
//! (same condition, same bounds, same array, same wait set) merge into
//! the first: the second's bound variables are renamed onto the first's
//! and its bodies are appended to the corresponding bodies of the first.

use rustc_hash::FxHashSet;
use weft_ir::Name;

use crate::tree::{BlockId, ContId, Function};

/// Fuse every fusable pair of sibling continuations in `func`.
///
/// Returns the number of continuations merged away.
pub fn fuse_continuations(func: &mut Function) -> usize {
    let mut fused = 0;
    for id in func.subtree(func.main) {
        if func.try_block(id).is_err() {
            continue;
        }
        while let Some((first, second)) = find_pair(func, id) {
            tracing::trace!(
                function = %func.name,
                kind = func.cont(first).kind_name(),
                "fuse continuations"
            );
            func.fuse_continuations(first, second);
            fused += 1;
        }
    }
    if fused > 0 {
        tracing::debug!(function = %func.name, fused, "continuation fusion");
    }
    fused
}

fn find_pair(func: &Function, block: BlockId) -> Option<(ContId, ContId)> {
    let conts = &func.block(block).conts;
    for (i, &a) in conts.iter().enumerate() {
        for &b in &conts[i + 1..] {
            let (ca, cb) = (func.cont(a), func.cont(b));
            if ca.fusable_with(cb) && bodies_disjoint(func, &ca.blocks(), &cb.blocks()) {
                return Some((a, b));
            }
        }
    }
    None
}

/// Appending one body to another must not merge two declarations of the
/// same name.
fn bodies_disjoint(func: &Function, first: &[BlockId], second: &[BlockId]) -> bool {
    first.iter().zip(second).all(|(&a, &b)| {
        let declared: FxHashSet<&Name> = func.block(a).vars.iter().map(|v| &v.name).collect();
        !func.block(b).vars.iter().any(|v| declared.contains(&v.name))
    })
}

#[cfg(test)]
mod tests;
