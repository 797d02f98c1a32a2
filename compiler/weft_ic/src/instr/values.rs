//! Computed-value facts and constant folding.
//!
//! A [`ComputedValue`] names an abstract computation (an operator applied to
//! operands). Value numbering records which operand holds each computation's
//! result; a later instruction computing the same thing is redundant.

use std::fmt;

use smallvec::{smallvec, SmallVec};
use weft_ir::{Arg, BuiltinOp, Literal, Name, Var};

use super::Instr;

/// Operator of a computed value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CvOp {
    /// Contents of a scalar future or reference.
    Retrieve,
    /// Target of a reference, copied into a fresh future.
    Deref,
    /// Member of an array at a key.
    ArrayMember,
    /// Named field of a struct.
    StructField(Name),
    /// Builtin over local values.
    Builtin(BuiltinOp),
    /// Builtin over futures.
    AsyncBuiltin(BuiltinOp),
}

/// An operator applied to operands.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ComputedValue {
    pub op: CvOp,
    pub inputs: SmallVec<[Arg; 2]>,
}

impl ComputedValue {
    pub fn new(op: CvOp, inputs: impl IntoIterator<Item = Arg>) -> Self {
        ComputedValue {
            op,
            inputs: inputs.into_iter().collect(),
        }
    }

    /// Contents of `var`.
    pub fn retrieve(var: &Var) -> Self {
        ComputedValue::new(CvOp::Retrieve, [Arg::from(var)])
    }
}

impl fmt::Display for ComputedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            CvOp::Retrieve => f.write_str("retrieve")?,
            CvOp::Deref => f.write_str("deref")?,
            CvOp::ArrayMember => f.write_str("member")?,
            CvOp::StructField(field) => write!(f, "field.{field}")?,
            CvOp::Builtin(op) => write!(f, "{op}")?,
            CvOp::AsyncBuiltin(op) => write!(f, "async {op}")?,
        }
        f.write_str("(")?;
        for (i, input) in self.inputs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{input}")?;
        }
        f.write_str(")")
    }
}

/// `value` is held by `result`.
///
/// When `defines_output` is set, `result` is an output of the instruction
/// that reported the fact, and the instruction is redundant if the value
/// is already held elsewhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueFact {
    pub value: ComputedValue,
    pub result: Arg,
    pub defines_output: bool,
}

impl ValueFact {
    fn output(value: ComputedValue, out: &Var) -> Self {
        ValueFact {
            value,
            result: Arg::from(out),
            defines_output: true,
        }
    }

    fn known(value: ComputedValue, result: Arg) -> Self {
        ValueFact {
            value,
            result,
            defines_output: false,
        }
    }
}

/// Outcome of folding an instruction over known constants.
#[derive(Clone, Debug, PartialEq)]
pub enum Folded {
    /// `dst` provably holds `value`.
    Value { dst: Var, value: Literal },
    /// An assertion that provably holds.
    AssertPass,
    /// An assertion that provably fails.
    AssertFail { message: String },
}

fn builtin_inputs(op: BuiltinOp, inputs: &[Arg]) -> SmallVec<[Arg; 2]> {
    let mut inputs: SmallVec<[Arg; 2]> = inputs.iter().cloned().collect();
    if op.is_commutative() {
        inputs.sort_by_cached_key(ToString::to_string);
    }
    inputs
}

impl Instr {
    /// Facts about values this instruction computes or makes available.
    pub fn computed_values(&self) -> SmallVec<[ValueFact; 1]> {
        match self {
            Instr::Store { dst, src } => {
                smallvec![ValueFact::known(ComputedValue::retrieve(dst), src.clone())]
            }
            Instr::StoreRef { dst, src } => {
                smallvec![ValueFact::known(ComputedValue::retrieve(dst), Arg::from(src))]
            }
            Instr::Load { dst, src, .. } | Instr::LoadRef { dst, src } => {
                smallvec![ValueFact::output(ComputedValue::retrieve(src), dst)]
            }
            Instr::Deref { dst, src } => smallvec![ValueFact::output(
                ComputedValue::new(CvOp::Deref, [Arg::from(src)]),
                dst
            )],
            Instr::ArrayInsertImm {
                array,
                index,
                member,
            } => smallvec![ValueFact::known(
                ComputedValue::new(CvOp::ArrayMember, [Arg::from(array), index.clone()]),
                Arg::from(member)
            )],
            Instr::ArrayLookupImm { dst, array, index }
            | Instr::ArrayCreateNestedImm { dst, array, index } => smallvec![ValueFact::output(
                ComputedValue::new(CvOp::ArrayMember, [Arg::from(array), index.clone()]),
                dst
            )],
            Instr::StructInitField {
                strct,
                field,
                value,
            } => smallvec![ValueFact::known(
                ComputedValue::new(CvOp::StructField(field.clone()), [Arg::from(strct)]),
                Arg::from(value)
            )],
            Instr::StructLookup { dst, strct, field } => smallvec![ValueFact::output(
                ComputedValue::new(CvOp::StructField(field.clone()), [Arg::from(strct)]),
                dst
            )],
            Instr::LocalOp {
                op,
                dst: Some(dst),
                inputs,
            } if !op.has_side_effects() => smallvec![ValueFact::output(
                ComputedValue::new(CvOp::Builtin(*op), builtin_inputs(*op, inputs)),
                dst
            )],
            Instr::AsyncOp {
                op,
                dst: Some(dst),
                inputs,
            } if !op.has_side_effects() => smallvec![ValueFact::output(
                ComputedValue::new(CvOp::AsyncBuiltin(*op), builtin_inputs(*op, inputs)),
                dst
            )],
            _ => SmallVec::new(),
        }
    }

    /// The operand an identity copy forwards, with its output.
    pub fn copy_source(&self) -> Option<(&Var, &Arg)> {
        match self {
            Instr::LocalOp {
                op,
                dst: Some(dst),
                inputs,
            }
            | Instr::AsyncOp {
                op,
                dst: Some(dst),
                inputs,
            } if op.is_copy() => match inputs.as_slice() {
                [src] => Some((dst, src)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Substitute known constants into literal-capable input slots.
    ///
    /// Future-index variants whose index becomes a literal switch to their
    /// immediate-index form. Returns whether anything changed.
    pub fn constant_replace(&mut self, known: &impl Fn(&Name) -> Option<Literal>) -> bool {
        let mut changed = false;
        {
            let mut subst = |arg: &mut Arg| {
                if let Some(lit) = arg.var_name().and_then(known) {
                    *arg = Arg::Lit(lit);
                    changed = true;
                }
            };
            match self {
                Instr::Store { src, .. } => subst(src),
                Instr::ArrayBuild { keys, vals, .. } => {
                    keys.iter_mut().for_each(&mut subst);
                    vals.iter_mut().for_each(&mut subst);
                }
                Instr::ArrayLookupRefImm { index, .. }
                | Instr::ArrayLookupImm { index, .. }
                | Instr::ArrayRefLookupImm { index, .. }
                | Instr::ArrayInsertImm { index, .. }
                | Instr::ArrayRefInsertImm { index, .. }
                | Instr::ArrayCreateNestedImm { index, .. }
                | Instr::ArrayRefCreateNestedImm { index, .. }
                | Instr::ArrayCreateBag { index, .. } => subst(index),
                Instr::BagInsert { member, .. } => subst(member),
                Instr::InitUpdateable { value, .. } | Instr::UpdateImm { value, .. } => subst(value),
                Instr::LocalOp { inputs, .. }
                | Instr::AsyncOp { inputs, .. }
                | Instr::CallForeign { inputs, .. }
                | Instr::CallForeignLocal { inputs, .. } => inputs.iter_mut().for_each(&mut subst),
                Instr::RunExternal { cmd, args, .. } => {
                    subst(cmd);
                    args.iter_mut().for_each(&mut subst);
                }
                _ => {}
            }
        }

        let lit_of = |v: &Var| known(&v.name).map(Arg::Lit);
        let replacement = match self {
            Instr::ArrayLookupFuture { dst, array, index } => {
                lit_of(index).map(|index| Instr::ArrayLookupRefImm {
                    dst: dst.clone(),
                    array: array.clone(),
                    index,
                })
            }
            Instr::ArrayRefLookupFuture {
                dst,
                array_ref,
                index,
            } => lit_of(index).map(|index| Instr::ArrayRefLookupImm {
                dst: dst.clone(),
                array_ref: array_ref.clone(),
                index,
            }),
            Instr::ArrayInsertFuture {
                array,
                index,
                member,
            } => lit_of(index).map(|index| Instr::ArrayInsertImm {
                array: array.clone(),
                index,
                member: member.clone(),
            }),
            Instr::ArrayRefInsertFuture {
                array_ref,
                index,
                member,
            } => lit_of(index).map(|index| Instr::ArrayRefInsertImm {
                array_ref: array_ref.clone(),
                index,
                member: member.clone(),
            }),
            Instr::ArrayRefCreateNestedFuture {
                dst,
                array_ref,
                index,
            } => lit_of(index).map(|index| Instr::ArrayRefCreateNestedImm {
                dst: dst.clone(),
                array_ref: array_ref.clone(),
                index,
            }),
            Instr::Update { mode, cell, value } => lit_of(value).map(|value| Instr::UpdateImm {
                mode: *mode,
                cell: cell.clone(),
                value,
            }),
            _ => None,
        };
        if let Some(replacement) = replacement {
            *self = replacement;
            changed = true;
        }
        changed
    }

    /// Evaluate this instruction over known constants.
    ///
    /// `known` resolves variables to constants; literal operands are used
    /// as they are.
    pub fn constant_fold(&self, known: &impl Fn(&Name) -> Option<Literal>) -> Option<Folded> {
        let resolve = |arg: &Arg| match arg {
            Arg::Lit(lit) => Some(lit.clone()),
            Arg::Var(v) => known(&v.name),
        };
        match self {
            Instr::LocalOp { op, dst, inputs } | Instr::AsyncOp { op, dst, inputs } => {
                let lits = inputs.iter().map(resolve).collect::<Option<Vec<_>>>()?;
                if op.is_assertion() {
                    if op.check_assertion(&lits)? {
                        return Some(Folded::AssertPass);
                    }
                    let message = lits
                        .last()
                        .and_then(Literal::as_str)
                        .unwrap_or("assertion failed");
                    return Some(Folded::AssertFail {
                        message: message.to_owned(),
                    });
                }
                let value = op.eval(&lits)?;
                Some(Folded::Value {
                    dst: dst.clone()?,
                    value,
                })
            }
            Instr::Store { dst, src } => {
                let value = resolve(src)?;
                dst.ty.prim().filter(|p| p.has_literals())?;
                Some(Folded::Value {
                    dst: dst.clone(),
                    value,
                })
            }
            Instr::Load { dst, src, .. } => Some(Folded::Value {
                dst: dst.clone(),
                value: known(&src.name)?,
            }),
            _ => None,
        }
    }
}
