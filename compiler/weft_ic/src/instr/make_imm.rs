//! Closedness-driven make-immediate rewrite.
//!
//! A suspending instruction may be replaced by a non-suspending form once
//! the futures it would wait on are proved closed. The rewrite is split in
//! two steps so the caller controls how values are fetched:
//!
//! 1. [`Instr::can_make_immediate`] reports which inputs must be fetched
//!    into local values (and which outputs will be produced locally), or
//!    `None` when nothing cheaper is available.
//! 2. [`Instr::make_immediate`] builds the replacement from the fetched
//!    values. If the replacement writes a differently-typed output, the
//!    old/new output pair is reported so every use can be redirected.
//!
//! Already-immediate opcodes are never eligible, so repeated application
//! terminates.

use rustc_hash::FxHashSet;
use weft_ir::{Arg, BuiltinOp, Name, Var};

use super::{Instr, TaskMode};
use crate::error::{IcError, IcResult};

/// Prefix for aliases introduced when an output changes type.
pub const ALIAS_PREFIX: &str = "__alias:";

// ── Closed-variable set ─────────────────────────────────────────────

/// Variables proved closed, scoped by block nesting.
///
/// Closedness is monotone: a variable closed in a scope stays closed in
/// every nested scope and for the rest of the enclosing block.
#[derive(Clone, Debug)]
pub struct ClosedSet {
    scopes: Vec<FxHashSet<Name>>,
}

impl Default for ClosedSet {
    fn default() -> Self {
        ClosedSet {
            scopes: vec![FxHashSet::default()],
        }
    }
}

impl ClosedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names(names: impl IntoIterator<Item = Name>) -> Self {
        let mut set = Self::new();
        for name in names {
            set.close(name);
        }
        set
    }

    pub fn is_closed(&self, name: &Name) -> bool {
        self.scopes.iter().any(|s| s.contains(name))
    }

    /// Record `name` as closed in the innermost scope.
    pub fn close(&mut self, name: Name) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name);
        }
    }

    /// Open a nested scope.
    pub fn enter(&mut self) {
        self.scopes.push(FxHashSet::default());
    }

    /// Close the innermost scope, forgetting facts learned inside it.
    pub fn exit(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn len(&self) -> usize {
        self.scopes.iter().map(FxHashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Request / response ──────────────────────────────────────────────

/// What the caller must provide before [`Instr::make_immediate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MakeImmRequest {
    /// Outputs the replacement produces as local values; the caller
    /// declares value variables for them and stores them back afterwards.
    pub out: Vec<Var>,
    /// Inputs to fetch into local values (or aliases, for references).
    pub inputs: Vec<Var>,
    /// Context the replacement sequence must run in.
    pub mode: TaskMode,
}

impl MakeImmRequest {
    fn fetch(inputs: Vec<Var>) -> Self {
        MakeImmRequest {
            out: Vec::new(),
            inputs,
            mode: TaskMode::Sync,
        }
    }
}

/// An output replaced by a differently-typed one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputChange {
    pub old_out: Var,
    pub new_out: Var,
}

/// Replacement produced by [`Instr::make_immediate`].
#[derive(Clone, Debug, PartialEq)]
pub struct MakeImmChange {
    pub new_instr: Instr,
    pub output_change: Option<OutputChange>,
}

impl MakeImmChange {
    fn simple(new_instr: Instr) -> Self {
        MakeImmChange {
            new_instr,
            output_change: None,
        }
    }

    /// Replace reference output `old_out` by an alias of its target.
    fn via_alias(old_out: &Var, build: impl FnOnce(Var) -> Instr) -> IcResult<Self> {
        let target = old_out.ty.deref().cloned().ok_or_else(|| IcError::OperandMismatch {
            instr: old_out.to_string(),
            detail: format!("output `{old_out}` is not a reference"),
        })?;
        let new_out = Var::alias(old_out.name.with_prefix(ALIAS_PREFIX), target);
        Ok(MakeImmChange {
            new_instr: build(new_out.clone()),
            output_change: Some(OutputChange {
                old_out: old_out.clone(),
                new_out,
            }),
        })
    }
}

/// Fetched inputs of a request, looked up by variable.
struct Fetched<'a> {
    instr: &'a Instr,
    names: &'a [Var],
    values: &'a [Arg],
}

impl Fetched<'_> {
    fn arg(&self, var: &Var) -> Option<&Arg> {
        self.names
            .iter()
            .position(|v| v.name == var.name)
            .and_then(|i| self.values.get(i))
    }

    /// Fetched alias or local value for a variable slot.
    fn var(&self, var: &Var) -> IcResult<Option<Var>> {
        match self.arg(var) {
            None => Ok(None),
            Some(Arg::Var(v)) => Ok(Some(v.clone())),
            Some(Arg::Lit(lit)) => Err(IcError::OperandMismatch {
                instr: self.instr.to_string(),
                detail: format!("`{var}` fetched as literal {lit}, expected a variable"),
            }),
        }
    }

    fn subst(&self, args: &[Arg]) -> Vec<Arg> {
        args.iter()
            .map(|a| match a.as_var().and_then(|v| self.arg(v)) {
                Some(fetched) => fetched.clone(),
                None => a.clone(),
            })
            .collect()
    }
}

fn closed_in(closed: &ClosedSet, assume_all: bool, var: &Var) -> bool {
    assume_all || var.ty.is_value() || closed.is_closed(&var.name)
}

fn future_args(args: &[Arg]) -> Vec<Var> {
    args.iter()
        .filter_map(Arg::as_var)
        .filter(|v| !v.ty.is_value())
        .cloned()
        .collect()
}

impl Instr {
    /// Which inputs must be fetched to switch to a cheaper form.
    ///
    /// `None` means no cheaper form is reachable with the current closed
    /// set. With `assume_all_closed`, every input is treated as closed.
    pub fn can_make_immediate(
        &self,
        closed: &ClosedSet,
        assume_all_closed: bool,
    ) -> Option<MakeImmRequest> {
        let is_closed = |v: &Var| closed_in(closed, assume_all_closed, v);
        let some_of = |vars: &[&Var]| {
            let picked: Vec<Var> = vars
                .iter()
                .copied()
                .filter(|&v| is_closed(v))
                .cloned()
                .collect();
            (!picked.is_empty()).then(|| MakeImmRequest::fetch(picked))
        };
        match self {
            Instr::ArrayLookupRefImm { array, .. } => {
                is_closed(array).then(|| MakeImmRequest::fetch(Vec::new()))
            }
            Instr::ArrayLookupFuture { index, .. }
            | Instr::ArrayInsertFuture { index, .. }
            | Instr::ArrayCreateNestedFuture { index, .. } => {
                is_closed(index).then(|| MakeImmRequest::fetch(vec![index.clone()]))
            }
            Instr::ArrayRefLookupFuture {
                array_ref, index, ..
            }
            | Instr::ArrayRefInsertFuture {
                array_ref, index, ..
            }
            | Instr::ArrayRefCreateNestedFuture {
                array_ref, index, ..
            } => some_of(&[array_ref, index]),
            Instr::ArrayRefLookupImm { array_ref, .. }
            | Instr::ArrayRefInsertImm { array_ref, .. }
            | Instr::ArrayRefCreateNestedImm { array_ref, .. } => {
                is_closed(array_ref).then(|| MakeImmRequest::fetch(vec![array_ref.clone()]))
            }
            Instr::StructRefLookup { strct_ref, .. } => {
                is_closed(strct_ref).then(|| MakeImmRequest::fetch(vec![strct_ref.clone()]))
            }
            Instr::Deref { dst, src } => (is_closed(src) && dst.ty.prim().is_some())
                .then(|| MakeImmRequest::fetch(vec![src.clone()])),
            Instr::Update { value, .. } => {
                is_closed(value).then(|| MakeImmRequest::fetch(vec![value.clone()]))
            }
            Instr::AsyncOp { dst, inputs, .. } => {
                let inputs = future_args(inputs);
                if !inputs.iter().all(is_closed) {
                    return None;
                }
                let out = match dst {
                    Some(d) if d.ty.is_scalar_future() => vec![d.clone()],
                    Some(_) => return None,
                    None => Vec::new(),
                };
                Some(MakeImmRequest {
                    out,
                    inputs,
                    mode: TaskMode::Sync,
                })
            }
            Instr::CallForeign {
                outputs,
                inputs,
                mode,
                props,
                ..
            } => {
                let inputs = future_args(inputs);
                if !props.has_local_form
                    || !inputs.iter().all(is_closed)
                    || !outputs.iter().all(|o| o.ty.is_scalar_future())
                {
                    return None;
                }
                Some(MakeImmRequest {
                    out: outputs.clone(),
                    inputs,
                    mode: *mode,
                })
            }
            Instr::Store { .. }
            | Instr::Load { .. }
            | Instr::StoreRef { .. }
            | Instr::LoadRef { .. }
            | Instr::CopyRef { .. }
            | Instr::ArrayLookupImm { .. }
            | Instr::ArrayInsertImm { .. }
            | Instr::ArrayCreateNestedImm { .. }
            | Instr::ArrayBuild { .. }
            | Instr::ArrayCreateBag { .. }
            | Instr::BagInsert { .. }
            | Instr::StructInitField { .. }
            | Instr::StructLookup { .. }
            | Instr::InitUpdateable { .. }
            | Instr::UpdateImm { .. }
            | Instr::LatestValue { .. }
            | Instr::LocalOp { .. }
            | Instr::CallForeignLocal { .. }
            | Instr::Call { .. }
            | Instr::RunExternal { .. }
            | Instr::IncrRef { .. }
            | Instr::DecrRef { .. }
            | Instr::LoopContinue { .. }
            | Instr::LoopBreak { .. } => None,
        }
    }

    /// Build the cheaper replacement from fetched values.
    ///
    /// `request` is the request this instruction returned; `out` holds
    /// the local variables declared for `request.out` and `values` the
    /// fetched contents of `request.inputs`, both in request order. A
    /// fetched reference must be an alias variable; a fetched scalar may
    /// be a local value or a literal.
    pub fn make_immediate(
        &self,
        request: &MakeImmRequest,
        out: &[Var],
        values: &[Arg],
    ) -> IcResult<MakeImmChange> {
        if values.len() != request.inputs.len() || out.len() != request.out.len() {
            return Err(IcError::OperandMismatch {
                instr: self.to_string(),
                detail: format!(
                    "expected {} fetched inputs and {} local outputs, got {} and {}",
                    request.inputs.len(),
                    request.out.len(),
                    values.len(),
                    out.len()
                ),
            });
        }
        let fetched = Fetched {
            instr: self,
            names: &request.inputs,
            values,
        };
        let no_form = || IcError::NoImmediateForm {
            instr: self.to_string(),
        };

        let change = match self {
            Instr::ArrayLookupRefImm { dst, array, index } => {
                MakeImmChange::via_alias(dst, |alias| Instr::ArrayLookupImm {
                    dst: alias,
                    array: array.clone(),
                    index: index.clone(),
                })?
            }
            Instr::ArrayLookupFuture { dst, array, index } => {
                let index = fetched.arg(index).cloned().ok_or_else(no_form)?;
                MakeImmChange::simple(Instr::ArrayLookupRefImm {
                    dst: dst.clone(),
                    array: array.clone(),
                    index,
                })
            }
            Instr::ArrayRefLookupFuture {
                dst,
                array_ref,
                index,
            } => match (fetched.var(array_ref)?, fetched.arg(index).cloned()) {
                (Some(array), Some(index)) => MakeImmChange::simple(Instr::ArrayLookupRefImm {
                    dst: dst.clone(),
                    array,
                    index,
                }),
                (Some(array), None) => MakeImmChange::simple(Instr::ArrayLookupFuture {
                    dst: dst.clone(),
                    array,
                    index: index.clone(),
                }),
                (None, Some(index)) => MakeImmChange::simple(Instr::ArrayRefLookupImm {
                    dst: dst.clone(),
                    array_ref: array_ref.clone(),
                    index,
                }),
                (None, None) => return Err(no_form()),
            },
            Instr::ArrayRefLookupImm {
                dst,
                array_ref,
                index,
            } => {
                let array = fetched.var(array_ref)?.ok_or_else(no_form)?;
                MakeImmChange::simple(Instr::ArrayLookupRefImm {
                    dst: dst.clone(),
                    array,
                    index: index.clone(),
                })
            }
            Instr::ArrayInsertFuture {
                array,
                index,
                member,
            } => {
                let index = fetched.arg(index).cloned().ok_or_else(no_form)?;
                MakeImmChange::simple(Instr::ArrayInsertImm {
                    array: array.clone(),
                    index,
                    member: member.clone(),
                })
            }
            Instr::ArrayRefInsertFuture {
                array_ref,
                index,
                member,
            } => {
                let member = member.clone();
                match (fetched.var(array_ref)?, fetched.arg(index).cloned()) {
                    (Some(array), Some(index)) => MakeImmChange::simple(Instr::ArrayInsertImm {
                        array,
                        index,
                        member,
                    }),
                    (Some(array), None) => MakeImmChange::simple(Instr::ArrayInsertFuture {
                        array,
                        index: index.clone(),
                        member,
                    }),
                    (None, Some(index)) => MakeImmChange::simple(Instr::ArrayRefInsertImm {
                        array_ref: array_ref.clone(),
                        index,
                        member,
                    }),
                    (None, None) => return Err(no_form()),
                }
            }
            Instr::ArrayRefInsertImm {
                array_ref,
                index,
                member,
            } => {
                let array = fetched.var(array_ref)?.ok_or_else(no_form)?;
                MakeImmChange::simple(Instr::ArrayInsertImm {
                    array,
                    index: index.clone(),
                    member: member.clone(),
                })
            }
            Instr::ArrayCreateNestedFuture { dst, array, index } => {
                let index = fetched.arg(index).cloned().ok_or_else(no_form)?;
                MakeImmChange::via_alias(dst, |alias| Instr::ArrayCreateNestedImm {
                    dst: alias,
                    array: array.clone(),
                    index,
                })?
            }
            Instr::ArrayRefCreateNestedFuture {
                dst,
                array_ref,
                index,
            } => match (fetched.var(array_ref)?, fetched.arg(index).cloned()) {
                (Some(array), Some(index)) => {
                    MakeImmChange::via_alias(dst, |alias| Instr::ArrayCreateNestedImm {
                        dst: alias,
                        array,
                        index,
                    })?
                }
                (Some(array), None) => MakeImmChange::simple(Instr::ArrayCreateNestedFuture {
                    dst: dst.clone(),
                    array,
                    index: index.clone(),
                }),
                (None, Some(index)) => MakeImmChange::simple(Instr::ArrayRefCreateNestedImm {
                    dst: dst.clone(),
                    array_ref: array_ref.clone(),
                    index,
                }),
                (None, None) => return Err(no_form()),
            },
            Instr::ArrayRefCreateNestedImm {
                dst,
                array_ref,
                index,
            } => {
                let array = fetched.var(array_ref)?.ok_or_else(no_form)?;
                MakeImmChange::via_alias(dst, |alias| Instr::ArrayCreateNestedImm {
                    dst: alias,
                    array,
                    index: index.clone(),
                })?
            }
            Instr::StructRefLookup {
                dst,
                strct_ref,
                field,
            } => {
                let strct = fetched.var(strct_ref)?.ok_or_else(no_form)?;
                MakeImmChange::via_alias(dst, |alias| Instr::StructLookup {
                    dst: alias,
                    strct,
                    field: field.clone(),
                })?
            }
            Instr::Deref { dst, src } => {
                let target = fetched.var(src)?.ok_or_else(no_form)?;
                let prim = dst.ty.prim().ok_or_else(no_form)?;
                MakeImmChange::simple(Instr::AsyncOp {
                    op: BuiltinOp::copy_for(prim),
                    dst: Some(dst.clone()),
                    inputs: vec![Arg::Var(target)],
                })
            }
            Instr::Update { mode, cell, value } => {
                let value = fetched.arg(value).cloned().ok_or_else(no_form)?;
                MakeImmChange::simple(Instr::UpdateImm {
                    mode: *mode,
                    cell: cell.clone(),
                    value,
                })
            }
            Instr::AsyncOp { op, inputs, .. } => MakeImmChange::simple(Instr::LocalOp {
                op: *op,
                dst: out.first().cloned(),
                inputs: fetched.subst(inputs),
            }),
            Instr::CallForeign {
                func,
                inputs,
                props,
                ..
            } => MakeImmChange::simple(Instr::CallForeignLocal {
                func: func.clone(),
                outputs: out.to_vec(),
                inputs: fetched.subst(inputs),
                props: *props,
            }),
            _ => return Err(no_form()),
        };
        tracing::trace!(
            old = %self,
            new = %change.new_instr,
            "make immediate"
        );
        Ok(change)
    }
}
