//! Side effects, task modes and blocking inputs.

use smallvec::SmallVec;
use weft_ir::{Arg, Var};

use super::{Instr, TaskMode};

/// Writing through an alias or into a mapped variable is observable outside
/// the current block.
#[inline]
fn observable(var: &Var) -> bool {
    var.is_alias() || var.is_mapped()
}

fn blocking_args(inputs: &[Arg]) -> SmallVec<[&Var; 2]> {
    inputs
        .iter()
        .filter_map(Arg::as_var)
        .filter(|v| !v.ty.is_value())
        .collect()
}

impl Instr {
    /// Whether removing this instruction could change program behavior
    /// beyond the values of its outputs.
    pub fn has_side_effects(&self) -> bool {
        match self {
            Instr::Store { dst, .. }
            | Instr::StoreRef { dst, .. }
            | Instr::Deref { dst, .. }
            | Instr::ArrayBuild { dst, .. } => observable(dst),
            Instr::ArrayInsertFuture { array, .. } | Instr::ArrayInsertImm { array, .. } => {
                observable(array)
            }
            Instr::BagInsert { bag, .. } => observable(bag),
            Instr::StructInitField { strct, .. } => observable(strct),
            Instr::Load { decr_read, .. } => decr_read.as_int() != Some(0),
            Instr::LocalOp { op, dst, .. } | Instr::AsyncOp { op, dst, .. } => {
                op.has_side_effects() || dst.as_ref().is_some_and(observable)
            }
            Instr::CallForeign { props, .. }
            | Instr::CallForeignLocal { props, .. }
            | Instr::RunExternal { props, .. } => props.side_effects,
            Instr::ArrayRefInsertFuture { .. }
            | Instr::ArrayRefInsertImm { .. }
            | Instr::Update { .. }
            | Instr::UpdateImm { .. }
            | Instr::Call { .. }
            | Instr::IncrRef { .. }
            | Instr::DecrRef { .. }
            | Instr::LoopContinue { .. }
            | Instr::LoopBreak { .. } => true,
            Instr::LoadRef { .. }
            | Instr::CopyRef { .. }
            | Instr::ArrayLookupFuture { .. }
            | Instr::ArrayLookupRefImm { .. }
            | Instr::ArrayLookupImm { .. }
            | Instr::ArrayRefLookupFuture { .. }
            | Instr::ArrayRefLookupImm { .. }
            | Instr::ArrayCreateNestedFuture { .. }
            | Instr::ArrayCreateNestedImm { .. }
            | Instr::ArrayRefCreateNestedFuture { .. }
            | Instr::ArrayRefCreateNestedImm { .. }
            | Instr::ArrayCreateBag { .. }
            | Instr::StructLookup { .. }
            | Instr::StructRefLookup { .. }
            | Instr::InitUpdateable { .. }
            | Instr::LatestValue { .. } => false,
        }
    }

    /// Execution context of this instruction.
    pub fn mode(&self) -> TaskMode {
        match self {
            Instr::CallForeign { mode, .. } | Instr::Call { mode, .. } => *mode,
            Instr::LoopContinue { .. } => TaskMode::Control,
            Instr::Deref { .. }
            | Instr::ArrayLookupFuture { .. }
            | Instr::ArrayRefLookupFuture { .. }
            | Instr::ArrayRefLookupImm { .. }
            | Instr::ArrayInsertFuture { .. }
            | Instr::ArrayRefInsertFuture { .. }
            | Instr::ArrayRefInsertImm { .. }
            | Instr::ArrayCreateNestedFuture { .. }
            | Instr::ArrayRefCreateNestedFuture { .. }
            | Instr::ArrayRefCreateNestedImm { .. }
            | Instr::StructRefLookup { .. }
            | Instr::Update { .. }
            | Instr::AsyncOp { .. } => TaskMode::Local,
            Instr::Store { .. }
            | Instr::Load { .. }
            | Instr::StoreRef { .. }
            | Instr::LoadRef { .. }
            | Instr::CopyRef { .. }
            | Instr::ArrayLookupRefImm { .. }
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
            | Instr::RunExternal { .. }
            | Instr::IncrRef { .. }
            | Instr::DecrRef { .. }
            | Instr::LoopBreak { .. } => TaskMode::Sync,
        }
    }

    /// Futures the runtime suspends on before this instruction can run.
    pub fn blocking_inputs(&self) -> SmallVec<[&Var; 2]> {
        let mut out = SmallVec::new();
        match self {
            Instr::Deref { src, .. } => out.push(src),
            Instr::ArrayLookupFuture { index, .. }
            | Instr::ArrayInsertFuture { index, .. }
            | Instr::ArrayCreateNestedFuture { index, .. } => out.push(index),
            Instr::ArrayRefLookupFuture {
                array_ref, index, ..
            }
            | Instr::ArrayRefInsertFuture {
                array_ref, index, ..
            }
            | Instr::ArrayRefCreateNestedFuture {
                array_ref, index, ..
            } => {
                out.push(array_ref);
                out.push(index);
            }
            Instr::ArrayRefLookupImm { array_ref, .. }
            | Instr::ArrayRefInsertImm { array_ref, .. }
            | Instr::ArrayRefCreateNestedImm { array_ref, .. } => out.push(array_ref),
            Instr::StructRefLookup { strct_ref, .. } => out.push(strct_ref),
            Instr::Update { value, .. } => out.push(value),
            Instr::AsyncOp { inputs, .. } | Instr::CallForeign { inputs, .. } => {
                out = blocking_args(inputs);
            }
            Instr::Store { .. }
            | Instr::Load { .. }
            | Instr::StoreRef { .. }
            | Instr::LoadRef { .. }
            | Instr::CopyRef { .. }
            | Instr::ArrayLookupRefImm { .. }
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
            | Instr::LoopBreak { .. } => {}
        }
        out
    }

    /// Outputs that are closed as soon as this instruction completes.
    pub fn closed_outputs(&self) -> SmallVec<[&Var; 1]> {
        let mut out = SmallVec::new();
        match self {
            Instr::Store { dst, .. } | Instr::StoreRef { dst, .. } | Instr::ArrayBuild { dst, .. } => {
                out.push(dst);
            }
            Instr::InitUpdateable { dst, .. } => out.push(dst),
            _ => {}
        }
        out
    }

    /// Inputs this instruction requires to be closed already.
    ///
    /// Synchronous reads never suspend, so the input must be proved closed
    /// before the instruction is placed.
    pub fn closed_inputs(&self) -> SmallVec<[&Var; 1]> {
        let mut out = SmallVec::new();
        if let Instr::Load { src, .. } | Instr::LoadRef { src, .. } = self {
            out.push(src);
        }
        out
    }

    /// Whether the instruction only touches local state and never waits.
    #[inline]
    pub fn is_sync(&self) -> bool {
        self.mode() == TaskMode::Sync
    }
}
