//! Continuation catalog.
//!
//! A [`Continuation`] is a control-flow node owning child blocks. Each
//! variant carries only the fields its kind needs and reports the
//! variables it reads itself ([`required_vars`](Continuation::required_vars)),
//! the variables it binds for its children
//! ([`defined_vars`](Continuation::defined_vars)), and whether its
//! children may run as an independent task
//! ([`is_async`](Continuation::is_async)).

mod predict;

use rustc_hash::FxHashSet;
use smallvec::{smallvec, SmallVec};
use weft_ir::{Arg, Name, Var};

use crate::instr::TaskMode;
use crate::refcount::RefCountType;
use crate::rename::Renames;
use crate::tree::BlockId;

pub use predict::Prediction;
pub(crate) use predict::{truthy, wait_satisfied};

// ── Refcount adjustments ────────────────────────────────────────────

/// A refcount adjustment a loop applies around its iterations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RcAdjust {
    pub var: Var,
    pub kind: RefCountType,
    pub amount: Arg,
}

/// Refcount adjustments of a range or collection loop.
///
/// `per_iter_incrs` are applied once per iteration actually run (their
/// total is only known at runtime); `const_incrs` once before the first
/// iteration; `end_decrs` once after the last.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopRefcounts {
    pub per_iter_incrs: Vec<RcAdjust>,
    pub const_incrs: Vec<RcAdjust>,
    pub end_decrs: Vec<RcAdjust>,
}

impl LoopRefcounts {
    pub fn is_empty(&self) -> bool {
        self.per_iter_incrs.is_empty() && self.const_incrs.is_empty() && self.end_decrs.is_empty()
    }

    fn all(&self) -> impl Iterator<Item = &RcAdjust> {
        self.per_iter_incrs
            .iter()
            .chain(&self.const_incrs)
            .chain(&self.end_decrs)
    }

    fn all_mut(&mut self) -> impl Iterator<Item = &mut RcAdjust> {
        self.per_iter_incrs
            .iter_mut()
            .chain(&mut self.const_incrs)
            .chain(&mut self.end_decrs)
    }

    /// Append another loop's adjustments.
    pub fn merge(&mut self, other: LoopRefcounts) {
        self.per_iter_incrs.extend(other.per_iter_incrs);
        self.const_incrs.extend(other.const_incrs);
        self.end_decrs.extend(other.end_decrs);
    }

    /// Position of a literal start increment for `name` on `kind`.
    pub fn const_incr_for(&self, name: &Name, kind: RefCountType) -> Option<usize> {
        self.const_incrs
            .iter()
            .position(|a| &a.var.name == name && a.kind == kind && a.amount.as_int().is_some())
    }
}

// ── Variants ────────────────────────────────────────────────────────

/// Two-way conditional.
#[derive(Clone, Debug, PartialEq)]
pub struct IfStatement {
    pub cond: Arg,
    pub then_block: BlockId,
    pub else_block: Option<BlockId>,
}

/// Integer switch. `labels[i]` selects `cases[i]`.
#[derive(Clone, Debug, PartialEq)]
pub struct SwitchStatement {
    pub var: Arg,
    pub labels: Vec<i64>,
    pub cases: Vec<BlockId>,
    pub default: Option<BlockId>,
}

/// Bounded integer loop over `start..=end` by `incr`.
#[derive(Clone, Debug, PartialEq)]
pub struct RangeLoop {
    pub name: Name,
    pub loop_var: Var,
    /// Zero-based iteration counter, if the body uses one.
    pub count_var: Option<Var>,
    pub start: Arg,
    pub end: Arg,
    pub incr: Arg,
    /// Requested unroll factor; 1 means none.
    pub desired_unroll: u32,
    /// Split into sub-ranges of this many iterations for parallel
    /// dispatch; 0 runs all iterations in the enclosing task.
    pub split_degree: u32,
    pub body: BlockId,
    pub passed_in: Vec<Var>,
    pub keep_open: Vec<Var>,
    pub refcounts: LoopRefcounts,
}

/// Loop over the members of a closed array.
#[derive(Clone, Debug, PartialEq)]
pub struct ForeachLoop {
    pub name: Name,
    pub array: Var,
    pub member_var: Var,
    /// Key of the current member, if the body uses it.
    pub counter_var: Option<Var>,
    pub split_degree: u32,
    /// The array is known closed on entry, so the loop starts without
    /// suspending.
    pub array_closed: bool,
    pub body: BlockId,
    pub passed_in: Vec<Var>,
    pub keep_open: Vec<Var>,
    pub refcounts: LoopRefcounts,
}

/// General recursive loop.
///
/// `loop_vars[0]` is the boolean continuation condition; `init_vals`
/// gives each loop variable's first binding. The body ends in
/// [`Instr::LoopContinue`](crate::instr::Instr::LoopContinue) or
/// [`Instr::LoopBreak`](crate::instr::Instr::LoopBreak).
#[derive(Clone, Debug, PartialEq)]
pub struct Loop {
    pub name: Name,
    pub loop_vars: Vec<Var>,
    pub init_vals: Vec<Arg>,
    /// Per loop variable: whether an iteration waits on it before starting.
    pub blocking: Vec<bool>,
    pub body: BlockId,
    pub passed_in: Vec<Var>,
    pub keep_open: Vec<Var>,
}

/// Why a wait-block exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WaitMode {
    /// The body genuinely needs the wait variables closed.
    Explicit,
    /// Kept for its dispatch effect: the body runs as a separate task in
    /// the target context even once its inputs are available.
    TaskDispatch,
    /// Compiler-generated wait whose variables only order the body.
    WaitOnly,
}

impl WaitMode {
    pub const fn name(self) -> &'static str {
        match self {
            WaitMode::Explicit => "explicit",
            WaitMode::TaskDispatch => "task_dispatch",
            WaitMode::WaitOnly => "wait_only",
        }
    }
}

/// Suspend until variables are closed, then run the body.
#[derive(Clone, Debug, PartialEq)]
pub struct WaitStatement {
    pub name: Name,
    pub wait_vars: Vec<Var>,
    pub mode: WaitMode,
    /// Wait for containers to be closed recursively.
    pub recursive: bool,
    pub target: TaskMode,
    pub passed_in: Vec<Var>,
    pub keep_open: Vec<Var>,
    pub priority: Option<Arg>,
    pub body: BlockId,
}

/// A control-flow node owning child blocks.
#[derive(Clone, Debug, PartialEq)]
pub enum Continuation {
    If(IfStatement),
    Switch(SwitchStatement),
    RangeLoop(RangeLoop),
    ForeachLoop(ForeachLoop),
    Loop(Loop),
    Wait(WaitStatement),
    /// Plain nested scope.
    Nested(BlockId),
}

fn push_arg_var<'a>(out: &mut Vec<&'a Var>, arg: &'a Arg) {
    if let Arg::Var(v) = arg {
        out.push(v);
    }
}

impl Continuation {
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Continuation::If(_) => "if",
            Continuation::Switch(_) => "switch",
            Continuation::RangeLoop(_) => "range_loop",
            Continuation::ForeachLoop(_) => "foreach_loop",
            Continuation::Loop(_) => "loop",
            Continuation::Wait(_) => "wait",
            Continuation::Nested(_) => "nested",
        }
    }

    /// Child blocks in execution/printing order.
    pub fn blocks(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Continuation::If(s) => {
                let mut out = smallvec![s.then_block];
                out.extend(s.else_block);
                out
            }
            Continuation::Switch(s) => s.cases.iter().copied().chain(s.default).collect(),
            Continuation::RangeLoop(l) => smallvec![l.body],
            Continuation::ForeachLoop(l) => smallvec![l.body],
            Continuation::Loop(l) => smallvec![l.body],
            Continuation::Wait(w) => smallvec![w.body],
            Continuation::Nested(b) => smallvec![*b],
        }
    }

    /// Apply `f` to every child block id.
    pub fn for_each_block_mut(&mut self, mut f: impl FnMut(&mut BlockId)) {
        match self {
            Continuation::If(s) => {
                f(&mut s.then_block);
                if let Some(b) = &mut s.else_block {
                    f(b);
                }
            }
            Continuation::Switch(s) => {
                s.cases.iter_mut().for_each(&mut f);
                if let Some(b) = &mut s.default {
                    f(b);
                }
            }
            Continuation::RangeLoop(l) => f(&mut l.body),
            Continuation::ForeachLoop(l) => f(&mut l.body),
            Continuation::Loop(l) => f(&mut l.body),
            Continuation::Wait(w) => f(&mut w.body),
            Continuation::Nested(b) => f(b),
        }
    }

    /// Variables the continuation itself reads before or while starting
    /// its children.
    pub fn required_vars(&self) -> Vec<&Var> {
        let mut out = Vec::new();
        match self {
            Continuation::If(s) => push_arg_var(&mut out, &s.cond),
            Continuation::Switch(s) => push_arg_var(&mut out, &s.var),
            Continuation::RangeLoop(l) => {
                push_arg_var(&mut out, &l.start);
                push_arg_var(&mut out, &l.end);
                push_arg_var(&mut out, &l.incr);
                out.extend(l.refcounts.all().filter_map(|a| a.amount.as_var()));
            }
            Continuation::ForeachLoop(l) => {
                out.push(&l.array);
                out.extend(l.refcounts.all().filter_map(|a| a.amount.as_var()));
            }
            Continuation::Loop(l) => {
                for arg in &l.init_vals {
                    push_arg_var(&mut out, arg);
                }
            }
            Continuation::Wait(w) => {
                if w.mode != WaitMode::WaitOnly {
                    out.extend(&w.wait_vars);
                }
                if let Some(p) = &w.priority {
                    push_arg_var(&mut out, p);
                }
            }
            Continuation::Nested(_) => {}
        }
        out
    }

    /// Variables bound by the continuation and visible in its children.
    pub fn defined_vars(&self) -> SmallVec<[&Var; 2]> {
        match self {
            Continuation::RangeLoop(l) => {
                let mut out = smallvec![&l.loop_var];
                out.extend(l.count_var.as_ref());
                out
            }
            Continuation::ForeachLoop(l) => {
                let mut out = smallvec![&l.member_var];
                out.extend(l.counter_var.as_ref());
                out
            }
            Continuation::Loop(l) => l.loop_vars.iter().collect(),
            Continuation::If(_)
            | Continuation::Switch(_)
            | Continuation::Wait(_)
            | Continuation::Nested(_) => SmallVec::new(),
        }
    }

    /// Variables an async continuation keeps open for its children.
    pub fn keep_open(&self) -> &[Var] {
        match self {
            Continuation::RangeLoop(l) => &l.keep_open,
            Continuation::ForeachLoop(l) => &l.keep_open,
            Continuation::Loop(l) => &l.keep_open,
            Continuation::Wait(w) => &w.keep_open,
            Continuation::If(_) | Continuation::Switch(_) | Continuation::Nested(_) => &[],
        }
    }

    /// Variables passed into an async continuation's task.
    pub fn passed_in(&self) -> &[Var] {
        match self {
            Continuation::RangeLoop(l) => &l.passed_in,
            Continuation::ForeachLoop(l) => &l.passed_in,
            Continuation::Loop(l) => &l.passed_in,
            Continuation::Wait(w) => &w.passed_in,
            Continuation::If(_) | Continuation::Switch(_) | Continuation::Nested(_) => &[],
        }
    }

    /// Futures the continuation suspends on before running its children.
    pub fn blocking_vars(&self) -> Vec<&Var> {
        match self {
            Continuation::Wait(w) if w.mode != WaitMode::WaitOnly || !w.wait_vars.is_empty() => {
                w.wait_vars.iter().collect()
            }
            Continuation::ForeachLoop(l) => vec![&l.array],
            Continuation::Loop(l) => l
                .loop_vars
                .iter()
                .zip(&l.blocking)
                .filter(|(_, b)| **b)
                .map(|(v, _)| v)
                .collect(),
            Continuation::If(s) => s.cond.as_var().filter(|v| !v.ty.is_value()).into_iter().collect(),
            Continuation::Switch(s) => s.var.as_var().filter(|v| !v.ty.is_value()).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Whether the children may run as a task independent of the parent.
    pub fn is_async(&self) -> bool {
        match self {
            Continuation::RangeLoop(l) => l.split_degree > 0,
            Continuation::ForeachLoop(l) => !l.array_closed || l.split_degree > 0,
            Continuation::Loop(_) | Continuation::Wait(_) => true,
            Continuation::If(_) | Continuation::Switch(_) | Continuation::Nested(_) => false,
        }
    }

    /// Whether the continuation carries refcount adjustments of its own.
    pub fn has_refcounts(&self) -> bool {
        match self {
            Continuation::RangeLoop(l) => !l.refcounts.is_empty(),
            Continuation::ForeachLoop(l) => !l.refcounts.is_empty(),
            _ => false,
        }
    }

    pub fn refcounts_mut(&mut self) -> Option<&mut LoopRefcounts> {
        match self {
            Continuation::RangeLoop(l) => Some(&mut l.refcounts),
            Continuation::ForeachLoop(l) => Some(&mut l.refcounts),
            _ => None,
        }
    }

    /// Whether removing the continuation is always safe given that every
    /// child block is empty.
    ///
    /// The check is conservative: a general loop is never a no-op, and a
    /// task-dispatch wait is kept for its dispatch effect.
    pub fn can_remove_when_empty(&self) -> bool {
        match self {
            Continuation::Loop(_) => false,
            Continuation::Wait(w) => w.mode != WaitMode::TaskDispatch,
            Continuation::RangeLoop(_) | Continuation::ForeachLoop(_) => !self.has_refcounts(),
            Continuation::If(_) | Continuation::Switch(_) | Continuation::Nested(_) => true,
        }
    }

    /// Substitute variables read by the continuation itself.
    ///
    /// Bound variables are never renamed: they are binding occurrences for
    /// the children. Literal replacements only land in operand slots.
    pub fn rename_vars(&mut self, renames: &Renames) -> bool {
        if renames.is_empty() {
            return false;
        }
        let mut changed = false;
        let var_list = |vars: &mut Vec<Var>| {
            vars.iter_mut()
                .fold(false, |acc, v| renames.apply_var(v) | acc)
        };
        match self {
            Continuation::If(s) => changed |= renames.apply_arg(&mut s.cond),
            Continuation::Switch(s) => changed |= renames.apply_arg(&mut s.var),
            Continuation::RangeLoop(l) => {
                changed |= var_list(&mut l.passed_in);
                changed |= var_list(&mut l.keep_open);
                for a in l.refcounts.all_mut() {
                    changed |= renames.apply_var(&mut a.var);
                    changed |= renames.apply_arg(&mut a.amount);
                }
                for arg in [&mut l.start, &mut l.end, &mut l.incr] {
                    changed |= renames.apply_arg(arg);
                }
            }
            Continuation::ForeachLoop(l) => {
                changed |= var_list(&mut l.passed_in);
                changed |= var_list(&mut l.keep_open);
                for a in l.refcounts.all_mut() {
                    changed |= renames.apply_var(&mut a.var);
                    changed |= renames.apply_arg(&mut a.amount);
                }
                changed |= renames.apply_var(&mut l.array);
            }
            Continuation::Loop(l) => {
                changed |= var_list(&mut l.passed_in);
                changed |= var_list(&mut l.keep_open);
                for arg in &mut l.init_vals {
                    changed |= renames.apply_arg(arg);
                }
            }
            Continuation::Wait(w) => {
                changed |= var_list(&mut w.passed_in);
                changed |= var_list(&mut w.keep_open);
                changed |= var_list(&mut w.wait_vars);
                if let Some(p) = &mut w.priority {
                    changed |= renames.apply_arg(p);
                }
            }
            Continuation::Nested(_) => {}
        }
        changed
    }

    /// Drop `names` from the passed-in and keep-open lists, and from the
    /// wait list of a compiler-generated wait.
    pub fn forget_vars(&mut self, names: &FxHashSet<Name>) {
        let keep = |v: &Var| !names.contains(&v.name);
        match self {
            Continuation::RangeLoop(l) => {
                l.passed_in.retain(keep);
                l.keep_open.retain(keep);
            }
            Continuation::ForeachLoop(l) => {
                l.passed_in.retain(keep);
                l.keep_open.retain(keep);
            }
            Continuation::Loop(l) => {
                l.passed_in.retain(keep);
                l.keep_open.retain(keep);
            }
            Continuation::Wait(w) => {
                w.passed_in.retain(keep);
                w.keep_open.retain(keep);
                if w.mode == WaitMode::WaitOnly {
                    w.wait_vars.retain(keep);
                }
            }
            Continuation::If(_) | Continuation::Switch(_) | Continuation::Nested(_) => {}
        }
    }

    /// Drop wait variables of a compiler-generated wait that are not in
    /// `used`. Returns how many were dropped.
    pub fn remove_unused_wait_vars(&mut self, used: &FxHashSet<Name>) -> usize {
        match self {
            Continuation::Wait(w) if w.mode != WaitMode::Explicit => {
                let before = w.wait_vars.len();
                w.wait_vars.retain(|v| used.contains(&v.name));
                before - w.wait_vars.len()
            }
            _ => 0,
        }
    }

    /// Whether `self` and `other` have identical control parameters, so
    /// that running both is the same as running the concatenation of
    /// their bodies under `self`.
    pub fn fusable_with(&self, other: &Continuation) -> bool {
        match (self, other) {
            (Continuation::If(a), Continuation::If(b)) => a.cond.is_var() && a.cond == b.cond,
            (Continuation::Switch(a), Continuation::Switch(b)) => {
                a.var.is_var()
                    && a.var == b.var
                    && a.labels == b.labels
                    && a.default.is_some() == b.default.is_some()
            }
            (Continuation::RangeLoop(a), Continuation::RangeLoop(b)) => {
                a.start == b.start
                    && a.end == b.end
                    && a.incr == b.incr
                    && a.split_degree == b.split_degree
                    && a.desired_unroll == b.desired_unroll
                    && a.count_var.is_some() == b.count_var.is_some()
                    && a.loop_var.ty == b.loop_var.ty
            }
            (Continuation::ForeachLoop(a), Continuation::ForeachLoop(b)) => {
                a.array == b.array
                    && a.split_degree == b.split_degree
                    && a.counter_var.is_some() == b.counter_var.is_some()
            }
            (Continuation::Wait(a), Continuation::Wait(b)) => {
                a.mode == b.mode
                    && a.target == b.target
                    && a.recursive == b.recursive
                    && a.priority == b.priority
                    && same_names(&a.wait_vars, &b.wait_vars)
            }
            _ => false,
        }
    }

    /// Substitution mapping `other`'s bound variables onto `self`'s.
    pub fn fusion_renames(&self, other: &Continuation) -> Renames {
        let mut renames = Renames::new();
        for (mine, theirs) in self.defined_vars().into_iter().zip(other.defined_vars()) {
            if mine.name != theirs.name {
                renames.insert(theirs.name.clone(), Arg::from(mine));
            }
        }
        renames
    }
}

fn same_names(a: &[Var], b: &[Var]) -> bool {
    let mut a: Vec<&Name> = a.iter().map(|v| &v.name).collect();
    let mut b: Vec<&Name> = b.iter().map(|v| &v.name).collect();
    a.sort();
    b.sort();
    a == b
}
