//! Optimization pipeline.
//!
//! Each pass is a free function over one [`Function`], mutating it in place
//! and returning what it changed. [`optimize`] runs the passes enabled in
//! an [`OptConfig`] over every function of a program until nothing changes
//! or the iteration limit is reached.
//!
//! # Pass order (per iteration)
//!
//! 1. [`constant_fold`]: fold builtins, substitute constants, predict
//!    branches with constant control parameters
//! 2. [`unroll_loops`]: only every third iteration, so folding and
//!    prediction run on the loop before it is expanded
//! 3. [`forward_dataflow`]: value numbering, closedness tracking and
//!    make-immediate rewriting, wait elimination
//! 4. [`coalesce_waits`]: merge waits on shared futures and push waiters
//!    down to where their inputs are written
//! 5. [`fuse_continuations`]: merge matching sibling continuations
//! 6. [`eliminate_refcounts`]: cancel, merge and piggyback refcount ops
//! 7. [`eliminate_dead_code`]: drop unused variables, unread wait
//!    variables and empty continuations
//!
//! With `validate` set, [`validate`] checks every function after each
//! iteration.

mod constant_fold;
mod dead_code;
mod forward;
mod fusion;
mod rc_elim;
mod unroll;
mod validate;
mod wait_coalesce;

use rustc_hash::FxHashMap;
use weft_ir::{Arg, Literal, Name};

use crate::config::OptConfig;
use crate::cont::Prediction;
use crate::error::IcResult;
use crate::rename::{RenameMode, Renames};
use crate::tree::{BlockId, ContId, Function, Program};

pub use constant_fold::{constant_fold, FoldStats};
pub use dead_code::eliminate_dead_code;
pub use forward::{forward_dataflow, ForwardStats};
pub use fusion::fuse_continuations;
pub use rc_elim::eliminate_refcounts;
pub use unroll::unroll_loops;
pub use validate::validate;
pub use wait_coalesce::{coalesce_waits, CoalesceStats};

/// What a run of [`optimize`] changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptReport {
    pub iterations: u32,
    /// Instructions folded away or rewritten to constant stores.
    pub folded: usize,
    /// Constants substituted into operands or control parameters.
    pub substituted: usize,
    /// Continuations replaced by the single path they take.
    pub predicted: usize,
    pub value_numbered: usize,
    pub made_immediate: usize,
    /// Wait variables dropped because they were proved closed.
    pub wait_vars_removed: usize,
    /// Waits merged plus waiters pushed into wait bodies.
    pub coalesced: usize,
    pub fused: usize,
    pub unrolled: usize,
    pub rc_eliminated: usize,
    pub dead_removed: usize,
    /// Provably failing assertions, one entry each.
    pub warnings: Vec<String>,
}

impl OptReport {
    /// Total number of changes of every kind.
    pub fn total_changes(&self) -> usize {
        self.folded
            + self.substituted
            + self.predicted
            + self.value_numbered
            + self.made_immediate
            + self.wait_vars_removed
            + self.coalesced
            + self.fused
            + self.unrolled
            + self.rc_eliminated
            + self.dead_removed
    }

    fn warn(&mut self, warning: String) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }
}

/// Run the enabled passes over every function until a fixed point.
///
/// Iteration stops early once an iteration changes nothing, but never
/// before an iteration that was allowed to unroll.
pub fn optimize(program: &mut Program, config: &OptConfig) -> IcResult<OptReport> {
    let globals: FxHashMap<Name, Literal> = program
        .global_consts()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    let mut report = OptReport::default();

    for iteration in 0..config.max_iterations {
        let before = report.total_changes();
        for func in &mut program.functions {
            optimize_function(func, config, iteration, &globals, &mut report)?;
        }
        report.iterations = iteration + 1;
        let changed = report.total_changes() - before;
        tracing::debug!(iteration, changed, "optimizer iteration");
        if changed == 0 && (!config.unroll_loops || config.unroll_in_iteration(iteration)) {
            break;
        }
    }

    tracing::debug!(
        iterations = report.iterations,
        changes = report.total_changes(),
        warnings = report.warnings.len(),
        "optimization finished"
    );
    Ok(report)
}

/// One iteration of the pipeline over a single function.
pub fn optimize_function(
    func: &mut Function,
    config: &OptConfig,
    iteration: u32,
    globals: &FxHashMap<Name, Literal>,
    report: &mut OptReport,
) -> IcResult<()> {
    if config.constant_fold {
        let stats = constant_fold(func, globals);
        report.folded += stats.folded;
        report.substituted += stats.substituted;
        report.predicted += stats.predicted;
        for warning in stats.warnings {
            report.warn(warning);
        }
    }
    if config.unroll_loops && config.unroll_in_iteration(iteration) {
        report.unrolled += unroll_loops(func, &config.unroll);
    }
    if config.value_number {
        let stats = forward_dataflow(func)?;
        report.value_numbered += stats.value_numbered;
        report.made_immediate += stats.made_immediate;
        report.wait_vars_removed += stats.wait_vars_removed;
        report.predicted += stats.predicted;
    }
    if config.wait_coalesce {
        let stats = coalesce_waits(func);
        report.coalesced += stats.merged + stats.pushed_down;
    }
    if config.fusion {
        report.fused += fuse_continuations(func);
    }
    if config.refcount_elim {
        report.rc_eliminated += eliminate_refcounts(func);
    }
    if config.dead_code {
        report.dead_removed += eliminate_dead_code(func)?;
    }
    if config.validate {
        validate(func)?;
    }
    Ok(())
}

// ── Shared rewrites ─────────────────────────────────────────────────

/// Drop `name`'s declaration from `block` and replace every read of it in
/// the block's subtree by `with`.
fn substitute(func: &mut Function, block: BlockId, name: &Name, with: Arg) {
    func.block_mut(block).vars.retain(|v| &v.name != name);
    func.rename_vars(
        block,
        &Renames::single(name.clone(), with),
        RenameMode::InputsOnly,
    );
}

/// Whether any of `names` is visible from `block`.
fn any_visible<'a>(func: &Function, block: BlockId, mut names: impl Iterator<Item = &'a Name>) -> bool {
    names.any(|n| func.lookup_var(block, n).is_some())
}

/// Inline a predicted continuation unless the chosen block declares a name
/// already visible from the parent, which splicing would merge.
fn try_inline(func: &mut Function, cont: ContId, prediction: &Prediction) -> bool {
    let parent = func.cont_node(cont).parent;
    if let Some(chosen) = prediction.block {
        let names: Vec<Name> = func.block(chosen).vars.iter().map(|v| v.name.clone()).collect();
        if any_visible(func, parent, names.iter()) {
            return false;
        }
    }
    tracing::trace!(
        function = %func.name,
        kind = func.cont(cont).kind_name(),
        "inline predicted continuation"
    );
    func.inline_continuation(cont, prediction);
    true
}

/// Whether descending into `child` would meet a re-declaration of a name
/// visible from `parent`.
fn shadows_parent(func: &Function, parent: BlockId, child: BlockId, bound: &[Name]) -> bool {
    let declared = func.block(child).vars.iter().map(|v| &v.name);
    any_visible(func, parent, declared.chain(bound.iter()))
}
