//! Constant folding, constant substitution and branch prediction.
//!
//! Walks each block in order, tracking which variables provably hold a
//! literal. Known literals are substituted into literal-capable operand
//! slots and continuation control parameters; builtins over known inputs
//! are evaluated; conditionals, switches and range loops whose control
//! parameters became constant are replaced by the single path they take.
//!
//! Facts are scoped: a literal learned inside a block is forgotten when
//! the block ends, and a re-declaration hides an outer fact.

use rustc_hash::FxHashMap;
use weft_ir::{Arg, Literal, Name};

use super::{shadows_parent, substitute, try_inline};
use crate::cont::Continuation;
use crate::instr::{ClosedSet, Folded, Instr};
use crate::refcount::RefCountType;
use crate::tree::{BlockId, Function};

/// What [`constant_fold`] changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FoldStats {
    pub folded: usize,
    pub substituted: usize,
    pub predicted: usize,
    pub warnings: Vec<String>,
}

/// Scoped map of variables known to hold a literal.
struct Known<'g> {
    globals: &'g FxHashMap<Name, Literal>,
    /// `None` marks a name re-declared in that scope.
    scopes: Vec<FxHashMap<Name, Option<Literal>>>,
}

impl Known<'_> {
    fn get(&self, name: &Name) -> Option<Literal> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get(name) {
                return value.clone();
            }
        }
        self.globals.get(name).cloned()
    }

    fn set(&mut self, name: Name, value: Literal) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, Some(value));
        }
    }

    fn hide(&mut self, name: Name) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, None);
        }
    }

    fn enter(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    fn exit(&mut self) {
        self.scopes.pop();
    }
}

/// What to do with an instruction whose output value is known.
enum Action {
    Keep,
    Remove,
    Replace(Instr),
}

/// Fold constants throughout `func`.
///
/// `globals` maps global-constant names to their values.
pub fn constant_fold(func: &mut Function, globals: &FxHashMap<Name, Literal>) -> FoldStats {
    let mut known = Known {
        globals,
        scopes: Vec::new(),
    };
    let mut stats = FoldStats::default();
    let main = func.main;
    fold_block(func, main, &mut known, &mut stats);

    if stats.folded + stats.substituted + stats.predicted > 0 {
        tracing::debug!(
            function = %func.name,
            folded = stats.folded,
            substituted = stats.substituted,
            predicted = stats.predicted,
            "constant folding"
        );
    }
    stats
}

fn fold_block(func: &mut Function, id: BlockId, known: &mut Known<'_>, stats: &mut FoldStats) {
    known.enter();
    let declared: Vec<Name> = func.block(id).vars.iter().map(|v| v.name.clone()).collect();
    for name in declared {
        known.hide(name);
    }

    let mut next_instr = 0;
    let mut next_cont = 0;
    loop {
        next_instr = fold_instrs(func, id, next_instr, known, stats);
        if !fold_conts(func, id, &mut next_cont, known, stats) {
            break;
        }
    }
    known.exit();
}

/// Fold instructions from `start` to the end of the block. Returns the
/// index one past the last instruction visited.
fn fold_instrs(
    func: &mut Function,
    id: BlockId,
    start: usize,
    known: &mut Known<'_>,
    stats: &mut FoldStats,
) -> usize {
    let mut i = start;
    while i < func.block(id).instrs.len() {
        let folded = {
            let lookup = |n: &Name| known.get(n);
            let instr = &mut func.block_mut(id).instrs[i];
            if instr.constant_replace(&lookup) {
                stats.substituted += 1;
            }
            instr.constant_fold(&lookup)
        };

        match folded {
            Some(Folded::Value { dst, value }) => {
                known.set(dst.name.clone(), value.clone());
                let local = func.block(id).declares(&dst.name) && !func.is_argument(&dst.name);
                let action = match &func.block(id).instrs[i] {
                    Instr::LocalOp { .. } if local => Action::Remove,
                    Instr::Load { src, decr_read, .. } if local => {
                        if decr_read.as_int() == Some(0) {
                            Action::Remove
                        } else {
                            Action::Replace(Instr::DecrRef {
                                var: src.clone(),
                                kind: RefCountType::Readers,
                                amount: decr_read.clone(),
                            })
                        }
                    }
                    Instr::AsyncOp { .. } => Action::Replace(Instr::Store {
                        dst: dst.clone(),
                        src: Arg::Lit(value.clone()),
                    }),
                    _ => Action::Keep,
                };
                match action {
                    Action::Keep => i += 1,
                    Action::Remove => {
                        let old = func.block_mut(id).instrs.remove(i);
                        tracing::trace!(instr = %old, %value, "fold");
                        substitute(func, id, &dst.name, Arg::Lit(value));
                        stats.folded += 1;
                    }
                    Action::Replace(new) => {
                        tracing::trace!(instr = %func.block(id).instrs[i], new = %new, "fold");
                        let still_written = new.writes(&dst.name);
                        func.block_mut(id).instrs[i] = new;
                        if local && !still_written {
                            substitute(func, id, &dst.name, Arg::Lit(value));
                        }
                        i += 1;
                        stats.folded += 1;
                    }
                }
            }
            Some(Folded::AssertPass) => {
                let old = func.block_mut(id).instrs.remove(i);
                tracing::trace!(instr = %old, "assertion holds");
                stats.folded += 1;
            }
            Some(Folded::AssertFail { message }) => {
                tracing::warn!(function = %func.name, %message, "assertion will always fail");
                let warning = format!("{}: assertion will always fail: {message}", func.name);
                if !stats.warnings.contains(&warning) {
                    stats.warnings.push(warning);
                }
                i += 1;
            }
            None => i += 1,
        }
    }
    i
}

/// Substitute constants into continuations from `*next` onwards, predict
/// constant branches and descend into the rest. Returns `true` after
/// inlining a prediction, so the caller can fold the spliced instructions.
fn fold_conts(
    func: &mut Function,
    id: BlockId,
    next: &mut usize,
    known: &mut Known<'_>,
    stats: &mut FoldStats,
) -> bool {
    while let Some(&c) = func.block(id).conts.get(*next) {
        let prediction = {
            let lookup = |n: &Name| known.get(n);
            if func.cont_mut(c).constant_replace(&lookup) {
                stats.substituted += 1;
            }
            let cont = func.cont(c);
            let constant_driven = matches!(
                cont,
                Continuation::If(_) | Continuation::Switch(_) | Continuation::RangeLoop(_)
            );
            if constant_driven {
                cont.branch_predict(&lookup, &ClosedSet::new())
            } else {
                None
            }
        };
        if let Some(p) = prediction {
            if try_inline(func, c, &p) {
                stats.predicted += 1;
                return true;
            }
        }

        let cont = func.cont(c);
        let bound: Vec<Name> = cont.defined_vars().iter().map(|v| v.name.clone()).collect();
        let children = cont.blocks();
        known.enter();
        for name in &bound {
            known.hide(name.clone());
        }
        for child in children {
            if !shadows_parent(func, id, child, &bound) {
                fold_block(func, child, known, stats);
            }
        }
        known.exit();
        *next += 1;
    }
    false
}
