//! Per-instruction reference-count contract.

use smallvec::SmallVec;
use weft_ir::{Arg, Name, Var};

use super::Instr;
use crate::refcount::RefCountType;

/// One counter an instruction consumes (input side) or produces (output
/// side) a reference on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefCountUse<'a> {
    pub var: &'a Var,
    pub kind: RefCountType,
}

/// A delta an instruction itself applies: `sign * amount` on `var`'s
/// `kind` counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RcContribution<'a> {
    pub var: &'a Var,
    pub kind: RefCountType,
    pub amount: &'a Arg,
    pub sign: i64,
}

type Uses<'a> = SmallVec<[RefCountUse<'a>; 2]>;

fn push<'a>(uses: &mut Uses<'a>, var: &'a Var, kind: RefCountType) {
    if var.is_refcounted() {
        uses.push(RefCountUse { var, kind });
    }
}

fn push_args<'a>(uses: &mut Uses<'a>, args: &'a [Arg], kind: RefCountType) {
    for var in args.iter().filter_map(Arg::as_var) {
        push(uses, var, kind);
    }
}

impl Instr {
    /// References the instruction consumes from its inputs once it runs.
    ///
    /// The caller must have acquired one reference of the given kind for
    /// each entry before the instruction is reached.
    pub fn in_ref_counts(&self) -> Uses<'_> {
        use RefCountType::{Readers as R, Writers as W};

        let mut uses = Uses::new();
        match self {
            Instr::Deref { src, .. } | Instr::StoreRef { src, .. } => push(&mut uses, src, R),
            Instr::CopyRef { src, .. } => {
                push(&mut uses, src, R);
                push(&mut uses, src, W);
            }
            Instr::ArrayLookupRefImm { array, .. } | Instr::ArrayLookupImm { array, .. } => {
                push(&mut uses, array, R);
            }
            Instr::ArrayLookupFuture { array, index, .. } => {
                push(&mut uses, array, R);
                push(&mut uses, index, R);
            }
            Instr::ArrayRefLookupFuture {
                array_ref, index, ..
            } => {
                push(&mut uses, array_ref, R);
                push(&mut uses, index, R);
            }
            Instr::ArrayRefLookupImm { array_ref, .. } => push(&mut uses, array_ref, R),
            Instr::ArrayInsertFuture {
                array,
                index,
                member,
            } => {
                push(&mut uses, index, R);
                push(&mut uses, member, R);
                push(&mut uses, array, W);
            }
            Instr::ArrayInsertImm { member, .. } => push(&mut uses, member, R),
            Instr::ArrayRefInsertFuture {
                array_ref,
                index,
                member,
            } => {
                push(&mut uses, array_ref, R);
                push(&mut uses, index, R);
                push(&mut uses, member, R);
                push(&mut uses, array_ref, W);
            }
            Instr::ArrayRefInsertImm {
                array_ref, member, ..
            } => {
                push(&mut uses, array_ref, R);
                push(&mut uses, member, R);
                push(&mut uses, array_ref, W);
            }
            Instr::ArrayCreateNestedFuture { index, array, .. } => {
                push(&mut uses, index, R);
                push(&mut uses, array, W);
            }
            Instr::ArrayRefCreateNestedFuture {
                array_ref, index, ..
            } => {
                push(&mut uses, array_ref, R);
                push(&mut uses, index, R);
                push(&mut uses, array_ref, W);
            }
            Instr::ArrayRefCreateNestedImm { array_ref, .. } => {
                push(&mut uses, array_ref, R);
                push(&mut uses, array_ref, W);
            }
            Instr::StructInitField { value, .. } => push(&mut uses, value, R),
            Instr::StructRefLookup { strct_ref, .. } => push(&mut uses, strct_ref, R),
            Instr::Update { value, cell, .. } => {
                push(&mut uses, value, R);
                push(&mut uses, cell, W);
            }
            Instr::BagInsert { member, .. } => {
                if let Some(member) = member.as_var() {
                    push(&mut uses, member, R);
                }
            }
            Instr::AsyncOp { inputs, dst, .. } => {
                push_args(&mut uses, inputs, R);
                if let Some(dst) = dst {
                    push(&mut uses, dst, W);
                }
            }
            Instr::CallForeign {
                inputs, outputs, ..
            }
            | Instr::Call {
                inputs, outputs, ..
            } => {
                push_args(&mut uses, inputs, R);
                for out in outputs {
                    push(&mut uses, out, W);
                }
            }
            Instr::Store { .. }
            | Instr::Load { .. }
            | Instr::LoadRef { .. }
            | Instr::ArrayCreateNestedImm { .. }
            | Instr::ArrayBuild { .. }
            | Instr::ArrayCreateBag { .. }
            | Instr::StructLookup { .. }
            | Instr::InitUpdateable { .. }
            | Instr::UpdateImm { .. }
            | Instr::LatestValue { .. }
            | Instr::LocalOp { .. }
            | Instr::CallForeignLocal { .. }
            | Instr::RunExternal { .. }
            | Instr::IncrRef { .. }
            | Instr::DecrRef { .. }
            | Instr::LoopContinue { .. }
            | Instr::LoopBreak { .. } => {}
        }
        uses
    }

    /// References the instruction hands to its outputs.
    pub fn out_ref_counts(&self) -> Uses<'_> {
        use RefCountType::{Readers as R, Writers as W};

        let mut uses = Uses::new();
        match self {
            Instr::CopyRef { dst, .. } => {
                push(&mut uses, dst, R);
                push(&mut uses, dst, W);
            }
            Instr::LoadRef { dst, .. } => push(&mut uses, dst, R),
            Instr::ArrayCreateNestedFuture { dst, .. }
            | Instr::ArrayRefCreateNestedFuture { dst, .. } => {
                push(&mut uses, dst, R);
                push(&mut uses, dst, W);
            }
            _ => {}
        }
        uses
    }

    /// Deltas this instruction applies directly, explicit or piggybacked.
    pub fn rc_contributions(&self) -> SmallVec<[RcContribution<'_>; 1]> {
        let mut out = SmallVec::new();
        match self {
            Instr::IncrRef { var, kind, amount } => out.push(RcContribution {
                var,
                kind: *kind,
                amount,
                sign: 1,
            }),
            Instr::DecrRef { var, kind, amount } => out.push(RcContribution {
                var,
                kind: *kind,
                amount,
                sign: -1,
            }),
            Instr::Load { src, decr_read, .. } => out.push(RcContribution {
                var: src,
                kind: RefCountType::Readers,
                amount: decr_read,
                sign: -1,
            }),
            Instr::BagInsert {
                bag, writers_decr, ..
            } => out.push(RcContribution {
                var: bag,
                kind: RefCountType::Writers,
                amount: writers_decr,
                sign: -1,
            }),
            _ => {}
        }
        out
    }

    /// Whether this instruction can absorb `delta` on `name`'s `kind`
    /// counter without changing its own semantics.
    pub fn can_piggyback(&self, name: &Name, kind: RefCountType, delta: i64) -> bool {
        if delta >= 0 {
            return false;
        }
        match self {
            Instr::Load { src, decr_read, .. } => {
                kind == RefCountType::Readers && &src.name == name && decr_read.as_int().is_some()
            }
            Instr::BagInsert {
                bag, writers_decr, ..
            } => {
                kind == RefCountType::Writers && &bag.name == name && writers_decr.as_int().is_some()
            }
            _ => false,
        }
    }

    /// Absorb `delta` into this instruction's own amount operand.
    ///
    /// Only decrements can be absorbed, and only by an instruction that
    /// already releases references on the same counter. Returns whether
    /// the delta was absorbed.
    pub fn try_piggyback(&mut self, name: &Name, kind: RefCountType, delta: i64) -> bool {
        if !self.can_piggyback(name, kind, delta) {
            return false;
        }
        let slot = match self {
            Instr::Load { decr_read, .. } => decr_read,
            Instr::BagInsert { writers_decr, .. } => writers_decr,
            _ => return false,
        };
        let Some(current) = slot.as_int() else {
            return false;
        };
        match current.checked_sub(delta) {
            Some(total) => {
                *slot = Arg::int(total);
                true
            }
            None => false,
        }
    }
}
