//! Branch prediction and constant substitution for continuations.

use weft_ir::{Arg, Literal, Name, Var};

use super::{Continuation, WaitMode};
use crate::instr::ClosedSet;
use crate::rename::Renames;
use crate::tree::BlockId;

/// The single path a continuation provably takes.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    /// Block to splice into the parent in place of the continuation, or
    /// `None` if nothing runs at all.
    pub block: Option<BlockId>,
    /// Bindings for variables the continuation would have defined.
    pub renames: Renames,
}

impl Prediction {
    fn inline(block: BlockId) -> Self {
        Prediction {
            block: Some(block),
            renames: Renames::new(),
        }
    }

    fn empty() -> Self {
        Prediction {
            block: None,
            renames: Renames::new(),
        }
    }
}

fn resolve(arg: &Arg, known: &impl Fn(&Name) -> Option<Literal>) -> Option<Literal> {
    match arg {
        Arg::Lit(lit) => Some(lit.clone()),
        Arg::Var(v) => known(&v.name),
    }
}

/// Branch a literal condition selects, if it is a boolean or integer.
pub(crate) fn truthy(lit: &Literal) -> Option<bool> {
    match lit {
        Literal::Bool(b) => Some(*b),
        Literal::Int(i) => Some(*i != 0),
        Literal::Float(_) | Literal::Str(_) => None,
    }
}

impl Continuation {
    /// Substitute known constants into control parameters.
    pub fn constant_replace(&mut self, known: &impl Fn(&Name) -> Option<Literal>) -> bool {
        let mut changed = false;
        let mut subst = |arg: &mut Arg| {
            if let Some(lit) = arg.var_name().and_then(known) {
                *arg = Arg::Lit(lit);
                changed = true;
            }
        };
        match self {
            Continuation::If(s) => subst(&mut s.cond),
            Continuation::Switch(s) => subst(&mut s.var),
            Continuation::RangeLoop(l) => {
                subst(&mut l.start);
                subst(&mut l.end);
                subst(&mut l.incr);
            }
            Continuation::Wait(w) => {
                if let Some(p) = &mut w.priority {
                    subst(p);
                }
            }
            Continuation::ForeachLoop(_) | Continuation::Loop(_) | Continuation::Nested(_) => {}
        }
        changed
    }

    /// The path this continuation provably takes, if any.
    ///
    /// `known` resolves variables to constants; `closed` lists variables
    /// proved closed at this point. Returns `None` when more than one path
    /// is possible.
    pub fn branch_predict(
        &self,
        known: &impl Fn(&Name) -> Option<Literal>,
        closed: &ClosedSet,
    ) -> Option<Prediction> {
        match self {
            Continuation::If(s) => {
                let taken = truthy(&resolve(&s.cond, known)?)?;
                Some(match (taken, s.else_block) {
                    (true, _) => Prediction::inline(s.then_block),
                    (false, Some(b)) => Prediction::inline(b),
                    (false, None) => Prediction::empty(),
                })
            }
            Continuation::Switch(s) => {
                let value = resolve(&s.var, known)?.as_int()?;
                let chosen = s
                    .labels
                    .iter()
                    .position(|&l| l == value)
                    .and_then(|i| s.cases.get(i).copied())
                    .or(s.default);
                Some(match chosen {
                    Some(b) => Prediction::inline(b),
                    None => Prediction::empty(),
                })
            }
            Continuation::RangeLoop(l) => {
                let start = resolve(&l.start, known)?.as_int()?;
                let end = resolve(&l.end, known)?.as_int()?;
                let incr = resolve(&l.incr, known)?.as_int()?;
                if incr <= 0 {
                    return None;
                }
                // Splicing the body would drop the loop's own count adjustments.
                if !l.refcounts.is_empty() {
                    return None;
                }
                if end < start {
                    return Some(Prediction::empty());
                }
                let single = start.checked_add(incr).map_or(true, |next| next > end);
                if !single {
                    return None;
                }
                let mut renames = Renames::single(l.loop_var.name.clone(), Arg::int(start));
                if let Some(count) = &l.count_var {
                    renames.insert(count.name.clone(), Arg::int(0));
                }
                Some(Prediction {
                    block: Some(l.body),
                    renames,
                })
            }
            Continuation::Wait(w) => {
                if w.mode == WaitMode::TaskDispatch {
                    return None;
                }
                let waiting = w
                    .wait_vars
                    .iter()
                    .filter(|v| {
                        let const_scalar = v.ty.is_scalar_future() && known(&v.name).is_some();
                        !v.ty.is_value() && !wait_satisfied(v, w.recursive, closed) && !const_scalar
                    })
                    .count();
                (waiting == 0).then(|| Prediction::inline(w.body))
            }
            Continuation::Nested(b) => Some(Prediction::inline(*b)),
            Continuation::ForeachLoop(_) | Continuation::Loop(_) => None,
        }
    }

    /// Drop wait variables already proved closed from an explicit or
    /// compiler-generated wait. Returns how many were dropped.
    pub fn remove_closed_wait_vars(&mut self, closed: &ClosedSet) -> usize {
        match self {
            Continuation::Wait(w) if w.mode != WaitMode::TaskDispatch => {
                let before = w.wait_vars.len();
                let recursive = w.recursive;
                w.wait_vars.retain(|v| !wait_satisfied(v, recursive, closed));
                before - w.wait_vars.len()
            }
            _ => 0,
        }
    }

    /// Record that a foreach loop's array is already closed. Returns
    /// whether the loop changed.
    pub fn mark_array_closed(&mut self, closed: &ClosedSet) -> bool {
        match self {
            Continuation::ForeachLoop(l) if !l.array_closed && closed.is_closed(&l.array.name) => {
                l.array_closed = true;
                true
            }
            _ => false,
        }
    }
}

/// Whether a wait on `v` is already met. A recursive wait on a container
/// also needs every member closed, which the closed set does not track.
pub(crate) fn wait_satisfied(v: &Var, recursive: bool, closed: &ClosedSet) -> bool {
    closed.is_closed(&v.name) && !(recursive && !v.ty.is_scalar_future())
}
