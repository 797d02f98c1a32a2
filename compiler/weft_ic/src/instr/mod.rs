//! Instruction catalog.
//!
//! [`Instr`] is a closed set of primitive operations over futures, values,
//! containers and reference counts. Every variant carries exactly the
//! operands its opcode needs; per-opcode behavior (side effects, blocking
//! inputs, refcount contract, computed values, make-immediate) lives in the
//! sibling modules as exhaustive matches over this enum.
//!
//! # Container operation variants
//!
//! Each array operation exists in up to four forms:
//!
//! - **future index** (`*Future`): the index is a future the runtime waits on
//! - **immediate index** (`*Imm`, `*RefImm`): the index is a literal or local
//!   value
//! - **through reference** (`ArrayRef*`): the container is reached through a
//!   reference that must be dereferenced first
//!
//! The forms are semantically interchangeable once their operands are
//! known closed; swapping one for a cheaper form is the make-immediate
//! rewrite in [`make_imm`].

mod effects;
pub mod make_imm;
mod refcount;
pub mod values;

use std::fmt;

use smallvec::SmallVec;
use weft_ir::{Arg, BuiltinOp, Name, Var};

use crate::refcount::RefCountType;
use crate::rename::{RenameMode, Renames};

pub use make_imm::{ClosedSet, MakeImmChange, MakeImmRequest, OutputChange};
pub use refcount::{RcContribution, RefCountUse};
pub use values::{ComputedValue, CvOp, Folded, ValueFact};

// ── Supporting enums ────────────────────────────────────────────────

/// Execution context an instruction runs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskMode {
    /// Inline in the current task, without suspending.
    Sync,
    /// As a lightweight task on the local engine once inputs close.
    Local,
    /// As a local task that must run in a control context.
    LocalControl,
    /// Dispatched to a control worker.
    Control,
    /// Dispatched to a compute worker.
    Worker,
}

impl TaskMode {
    /// Whether running in this mode may suspend or migrate.
    #[inline]
    pub fn is_async(self) -> bool {
        self != TaskMode::Sync
    }

    /// Whether work in this mode must be wrapped in a dispatching wait when
    /// moved into the current task.
    #[inline]
    pub fn needs_dispatch(self) -> bool {
        !matches!(self, TaskMode::Sync | TaskMode::Local)
    }

    pub const fn name(self) -> &'static str {
        match self {
            TaskMode::Sync => "sync",
            TaskMode::Local => "local",
            TaskMode::LocalControl => "local_control",
            TaskMode::Control => "control",
            TaskMode::Worker => "worker",
        }
    }
}

/// Monotonic update applied to an updateable cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateMode {
    Min,
    Incr,
    Scale,
}

impl UpdateMode {
    pub const fn name(self) -> &'static str {
        match self {
            UpdateMode::Min => "min",
            UpdateMode::Incr => "incr",
            UpdateMode::Scale => "scale",
        }
    }
}

/// Declared properties of a foreign function or external command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallProps {
    /// Observable effects beyond writing outputs.
    pub side_effects: bool,
    /// Same inputs always give the same outputs.
    pub deterministic: bool,
    /// A local (value-level) implementation exists.
    pub has_local_form: bool,
}

impl CallProps {
    /// A pure function with a local implementation.
    pub const PURE_LOCAL: CallProps = CallProps {
        side_effects: false,
        deterministic: true,
        has_local_form: true,
    };
}

impl Default for CallProps {
    fn default() -> Self {
        Self {
            side_effects: true,
            deterministic: false,
            has_local_form: false,
        }
    }
}

// ── Instructions ────────────────────────────────────────────────────

/// A single intermediate-code instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Instr {
    // Scalar futures
    /// Write a local value or literal into scalar future `dst`.
    Store { dst: Var, src: Arg },
    /// Read closed scalar future `src` into local value `dst`, releasing
    /// `decr_read` read references on `src`.
    Load { dst: Var, src: Var, decr_read: Arg },
    /// Copy the scalar referenced by `src` into future `dst`.
    Deref { dst: Var, src: Var },

    // References
    /// Make reference `dst` point at `src`.
    StoreRef { dst: Var, src: Var },
    /// Read closed reference `src` into alias `dst`.
    LoadRef { dst: Var, src: Var },
    /// Make `dst` an alias of the datum `src` refers to.
    CopyRef { dst: Var, src: Var },

    // Arrays
    ArrayLookupFuture { dst: Var, array: Var, index: Var },
    ArrayLookupRefImm { dst: Var, array: Var, index: Arg },
    ArrayLookupImm { dst: Var, array: Var, index: Arg },
    ArrayRefLookupFuture { dst: Var, array_ref: Var, index: Var },
    ArrayRefLookupImm { dst: Var, array_ref: Var, index: Arg },
    ArrayInsertFuture { array: Var, index: Var, member: Var },
    ArrayInsertImm { array: Var, index: Arg, member: Var },
    ArrayRefInsertFuture { array_ref: Var, index: Var, member: Var },
    ArrayRefInsertImm { array_ref: Var, index: Arg, member: Var },
    ArrayCreateNestedFuture { dst: Var, array: Var, index: Var },
    ArrayCreateNestedImm { dst: Var, array: Var, index: Arg },
    ArrayRefCreateNestedFuture { dst: Var, array_ref: Var, index: Var },
    ArrayRefCreateNestedImm { dst: Var, array_ref: Var, index: Arg },
    /// Build a closed array from parallel key/member lists.
    ArrayBuild { dst: Var, keys: Vec<Arg>, vals: Vec<Arg> },

    // Bags
    /// Alias `dst` to the bag at `array[index]`, creating it if absent.
    ArrayCreateBag { dst: Var, array: Var, index: Arg },
    BagInsert { bag: Var, member: Arg, writers_decr: Arg },

    // Structs
    StructInitField { strct: Var, field: Name, value: Var },
    StructLookup { dst: Var, strct: Var, field: Name },
    StructRefLookup { dst: Var, strct_ref: Var, field: Name },

    // Updateable cells
    InitUpdateable { dst: Var, value: Arg },
    Update { mode: UpdateMode, cell: Var, value: Var },
    UpdateImm { mode: UpdateMode, cell: Var, value: Arg },
    LatestValue { dst: Var, cell: Var },

    // Builtin operators
    /// Builtin over local values. `dst` is `None` for assertions.
    LocalOp { op: BuiltinOp, dst: Option<Var>, inputs: Vec<Arg> },
    /// Builtin over futures, run once all inputs close.
    AsyncOp { op: BuiltinOp, dst: Option<Var>, inputs: Vec<Arg> },

    // Invocation
    CallForeign {
        func: Name,
        outputs: Vec<Var>,
        inputs: Vec<Arg>,
        mode: TaskMode,
        props: CallProps,
    },
    CallForeignLocal {
        func: Name,
        outputs: Vec<Var>,
        inputs: Vec<Arg>,
        props: CallProps,
    },
    /// Call a composite (intermediate-code) function.
    Call {
        func: Name,
        outputs: Vec<Var>,
        inputs: Vec<Arg>,
        mode: TaskMode,
    },
    RunExternal {
        cmd: Arg,
        args: Vec<Arg>,
        outputs: Vec<Var>,
        props: CallProps,
    },

    // Reference counts
    IncrRef { var: Var, kind: RefCountType, amount: Arg },
    DecrRef { var: Var, kind: RefCountType, amount: Arg },

    // Loop control
    /// Start the next iteration of the enclosing general loop.
    LoopContinue {
        new_vals: Vec<Arg>,
        passed_in: Vec<Var>,
        keep_open: Vec<Var>,
    },
    /// Leave the enclosing general loop, releasing `keep_open`.
    LoopBreak { keep_open: Vec<Var> },
}

// ── Operand access ──────────────────────────────────────────────────

/// Whether an operand slot is read or written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Input,
    Output,
}

/// Shared view of an operand slot.
#[derive(Clone, Copy, Debug)]
pub enum Operand<'a> {
    Var(&'a Var),
    Arg(&'a Arg),
}

impl<'a> Operand<'a> {
    /// The variable in this slot, if any.
    pub fn var(self) -> Option<&'a Var> {
        match self {
            Operand::Var(v) => Some(v),
            Operand::Arg(a) => a.as_var(),
        }
    }
}

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Var(v) => write!(f, "{v}"),
            Operand::Arg(a) => write!(f, "{a}"),
        }
    }
}

/// Mutable view of an operand slot.
pub enum OperandMut<'a> {
    Var(&'a mut Var),
    Arg(&'a mut Arg),
}

type Operands<'a> = SmallVec<[(Slot, Operand<'a>); 6]>;
type OperandsMut<'a> = SmallVec<[(Slot, OperandMut<'a>); 6]>;

impl Instr {
    /// Every operand slot in printing order: outputs first, then inputs.
    pub fn operands(&self) -> Operands<'_> {
        use Operand::{Arg as A, Var as V};
        use Slot::{Input as In, Output as Out};

        let mut ops = Operands::new();
        match self {
            Instr::Store { dst, src } => {
                ops.push((Out, V(dst)));
                ops.push((In, A(src)));
            }
            Instr::Load {
                dst,
                src,
                decr_read,
            } => {
                ops.push((Out, V(dst)));
                ops.push((In, V(src)));
                ops.push((In, A(decr_read)));
            }
            Instr::Deref { dst, src }
            | Instr::StoreRef { dst, src }
            | Instr::LoadRef { dst, src }
            | Instr::CopyRef { dst, src } => {
                ops.push((Out, V(dst)));
                ops.push((In, V(src)));
            }
            Instr::ArrayLookupFuture { dst, array, index }
            | Instr::ArrayCreateNestedFuture { dst, array, index } => {
                ops.push((Out, V(dst)));
                ops.push((In, V(array)));
                ops.push((In, V(index)));
            }
            Instr::ArrayLookupRefImm { dst, array, index }
            | Instr::ArrayLookupImm { dst, array, index }
            | Instr::ArrayCreateNestedImm { dst, array, index }
            | Instr::ArrayCreateBag { dst, array, index } => {
                ops.push((Out, V(dst)));
                ops.push((In, V(array)));
                ops.push((In, A(index)));
            }
            Instr::ArrayRefLookupFuture {
                dst,
                array_ref,
                index,
            }
            | Instr::ArrayRefCreateNestedFuture {
                dst,
                array_ref,
                index,
            } => {
                ops.push((Out, V(dst)));
                ops.push((In, V(array_ref)));
                ops.push((In, V(index)));
            }
            Instr::ArrayRefLookupImm {
                dst,
                array_ref,
                index,
            }
            | Instr::ArrayRefCreateNestedImm {
                dst,
                array_ref,
                index,
            } => {
                ops.push((Out, V(dst)));
                ops.push((In, V(array_ref)));
                ops.push((In, A(index)));
            }
            Instr::ArrayInsertFuture {
                array,
                index,
                member,
            } => {
                ops.push((Out, V(array)));
                ops.push((In, V(index)));
                ops.push((In, V(member)));
            }
            Instr::ArrayInsertImm {
                array,
                index,
                member,
            } => {
                ops.push((Out, V(array)));
                ops.push((In, A(index)));
                ops.push((In, V(member)));
            }
            Instr::ArrayRefInsertFuture {
                array_ref,
                index,
                member,
            } => {
                ops.push((In, V(array_ref)));
                ops.push((In, V(index)));
                ops.push((In, V(member)));
            }
            Instr::ArrayRefInsertImm {
                array_ref,
                index,
                member,
            } => {
                ops.push((In, V(array_ref)));
                ops.push((In, A(index)));
                ops.push((In, V(member)));
            }
            Instr::ArrayBuild { dst, keys, vals } => {
                ops.push((Out, V(dst)));
                ops.extend(keys.iter().map(|k| (In, A(k))));
                ops.extend(vals.iter().map(|v| (In, A(v))));
            }
            Instr::BagInsert {
                bag,
                member,
                writers_decr,
            } => {
                ops.push((Out, V(bag)));
                ops.push((In, A(member)));
                ops.push((In, A(writers_decr)));
            }
            Instr::StructInitField { strct, value, .. } => {
                ops.push((Out, V(strct)));
                ops.push((In, V(value)));
            }
            Instr::StructLookup { dst, strct, .. } => {
                ops.push((Out, V(dst)));
                ops.push((In, V(strct)));
            }
            Instr::StructRefLookup { dst, strct_ref, .. } => {
                ops.push((Out, V(dst)));
                ops.push((In, V(strct_ref)));
            }
            Instr::InitUpdateable { dst, value } => {
                ops.push((Out, V(dst)));
                ops.push((In, A(value)));
            }
            Instr::Update { cell, value, .. } => {
                ops.push((Out, V(cell)));
                ops.push((In, V(value)));
            }
            Instr::UpdateImm { cell, value, .. } => {
                ops.push((Out, V(cell)));
                ops.push((In, A(value)));
            }
            Instr::LatestValue { dst, cell } => {
                ops.push((Out, V(dst)));
                ops.push((In, V(cell)));
            }
            Instr::LocalOp { dst, inputs, .. } | Instr::AsyncOp { dst, inputs, .. } => {
                ops.extend(dst.iter().map(|d| (Out, V(d))));
                ops.extend(inputs.iter().map(|i| (In, A(i))));
            }
            Instr::CallForeign {
                outputs, inputs, ..
            }
            | Instr::CallForeignLocal {
                outputs, inputs, ..
            }
            | Instr::Call {
                outputs, inputs, ..
            } => {
                ops.extend(outputs.iter().map(|o| (Out, V(o))));
                ops.extend(inputs.iter().map(|i| (In, A(i))));
            }
            Instr::RunExternal {
                cmd, args, outputs, ..
            } => {
                ops.extend(outputs.iter().map(|o| (Out, V(o))));
                ops.push((In, A(cmd)));
                ops.extend(args.iter().map(|a| (In, A(a))));
            }
            Instr::IncrRef { var, amount, .. } | Instr::DecrRef { var, amount, .. } => {
                ops.push((In, V(var)));
                ops.push((In, A(amount)));
            }
            Instr::LoopContinue {
                new_vals,
                passed_in,
                keep_open,
            } => {
                ops.extend(new_vals.iter().map(|v| (In, A(v))));
                ops.extend(passed_in.iter().map(|v| (In, V(v))));
                ops.extend(keep_open.iter().map(|v| (In, V(v))));
            }
            Instr::LoopBreak { keep_open } => {
                ops.extend(keep_open.iter().map(|v| (In, V(v))));
            }
        }
        ops
    }

    /// Mutable access to every operand slot, in the same order as
    /// [`operands`](Self::operands).
    pub fn operands_mut(&mut self) -> OperandsMut<'_> {
        use OperandMut::{Arg as A, Var as V};
        use Slot::{Input as In, Output as Out};

        let mut ops = OperandsMut::new();
        match self {
            Instr::Store { dst, src } => {
                ops.push((Out, V(dst)));
                ops.push((In, A(src)));
            }
            Instr::Load {
                dst,
                src,
                decr_read,
            } => {
                ops.push((Out, V(dst)));
                ops.push((In, V(src)));
                ops.push((In, A(decr_read)));
            }
            Instr::Deref { dst, src }
            | Instr::StoreRef { dst, src }
            | Instr::LoadRef { dst, src }
            | Instr::CopyRef { dst, src } => {
                ops.push((Out, V(dst)));
                ops.push((In, V(src)));
            }
            Instr::ArrayLookupFuture { dst, array, index }
            | Instr::ArrayCreateNestedFuture { dst, array, index } => {
                ops.push((Out, V(dst)));
                ops.push((In, V(array)));
                ops.push((In, V(index)));
            }
            Instr::ArrayLookupRefImm { dst, array, index }
            | Instr::ArrayLookupImm { dst, array, index }
            | Instr::ArrayCreateNestedImm { dst, array, index }
            | Instr::ArrayCreateBag { dst, array, index } => {
                ops.push((Out, V(dst)));
                ops.push((In, V(array)));
                ops.push((In, A(index)));
            }
            Instr::ArrayRefLookupFuture {
                dst,
                array_ref,
                index,
            }
            | Instr::ArrayRefCreateNestedFuture {
                dst,
                array_ref,
                index,
            } => {
                ops.push((Out, V(dst)));
                ops.push((In, V(array_ref)));
                ops.push((In, V(index)));
            }
            Instr::ArrayRefLookupImm {
                dst,
                array_ref,
                index,
            }
            | Instr::ArrayRefCreateNestedImm {
                dst,
                array_ref,
                index,
            } => {
                ops.push((Out, V(dst)));
                ops.push((In, V(array_ref)));
                ops.push((In, A(index)));
            }
            Instr::ArrayInsertFuture {
                array,
                index,
                member,
            } => {
                ops.push((Out, V(array)));
                ops.push((In, V(index)));
                ops.push((In, V(member)));
            }
            Instr::ArrayInsertImm {
                array,
                index,
                member,
            } => {
                ops.push((Out, V(array)));
                ops.push((In, A(index)));
                ops.push((In, V(member)));
            }
            Instr::ArrayRefInsertFuture {
                array_ref,
                index,
                member,
            } => {
                ops.push((In, V(array_ref)));
                ops.push((In, V(index)));
                ops.push((In, V(member)));
            }
            Instr::ArrayRefInsertImm {
                array_ref,
                index,
                member,
            } => {
                ops.push((In, V(array_ref)));
                ops.push((In, A(index)));
                ops.push((In, V(member)));
            }
            Instr::ArrayBuild { dst, keys, vals } => {
                ops.push((Out, V(dst)));
                ops.extend(keys.iter_mut().map(|k| (In, A(k))));
                ops.extend(vals.iter_mut().map(|v| (In, A(v))));
            }
            Instr::BagInsert {
                bag,
                member,
                writers_decr,
            } => {
                ops.push((Out, V(bag)));
                ops.push((In, A(member)));
                ops.push((In, A(writers_decr)));
            }
            Instr::StructInitField { strct, value, .. } => {
                ops.push((Out, V(strct)));
                ops.push((In, V(value)));
            }
            Instr::StructLookup { dst, strct, .. } => {
                ops.push((Out, V(dst)));
                ops.push((In, V(strct)));
            }
            Instr::StructRefLookup { dst, strct_ref, .. } => {
                ops.push((Out, V(dst)));
                ops.push((In, V(strct_ref)));
            }
            Instr::InitUpdateable { dst, value } => {
                ops.push((Out, V(dst)));
                ops.push((In, A(value)));
            }
            Instr::Update { cell, value, .. } => {
                ops.push((Out, V(cell)));
                ops.push((In, V(value)));
            }
            Instr::UpdateImm { cell, value, .. } => {
                ops.push((Out, V(cell)));
                ops.push((In, A(value)));
            }
            Instr::LatestValue { dst, cell } => {
                ops.push((Out, V(dst)));
                ops.push((In, V(cell)));
            }
            Instr::LocalOp { dst, inputs, .. } | Instr::AsyncOp { dst, inputs, .. } => {
                ops.extend(dst.iter_mut().map(|d| (Out, V(d))));
                ops.extend(inputs.iter_mut().map(|i| (In, A(i))));
            }
            Instr::CallForeign {
                outputs, inputs, ..
            }
            | Instr::CallForeignLocal {
                outputs, inputs, ..
            }
            | Instr::Call {
                outputs, inputs, ..
            } => {
                ops.extend(outputs.iter_mut().map(|o| (Out, V(o))));
                ops.extend(inputs.iter_mut().map(|i| (In, A(i))));
            }
            Instr::RunExternal {
                cmd, args, outputs, ..
            } => {
                ops.extend(outputs.iter_mut().map(|o| (Out, V(o))));
                ops.push((In, A(cmd)));
                ops.extend(args.iter_mut().map(|a| (In, A(a))));
            }
            Instr::IncrRef { var, amount, .. } | Instr::DecrRef { var, amount, .. } => {
                ops.push((In, V(var)));
                ops.push((In, A(amount)));
            }
            Instr::LoopContinue {
                new_vals,
                passed_in,
                keep_open,
            } => {
                ops.extend(new_vals.iter_mut().map(|v| (In, A(v))));
                ops.extend(passed_in.iter_mut().map(|v| (In, V(v))));
                ops.extend(keep_open.iter_mut().map(|v| (In, V(v))));
            }
            Instr::LoopBreak { keep_open } => {
                ops.extend(keep_open.iter_mut().map(|v| (In, V(v))));
            }
        }
        ops
    }

    /// Variables this instruction writes or modifies.
    pub fn outputs(&self) -> SmallVec<[&Var; 2]> {
        self.operands()
            .into_iter()
            .filter(|(slot, _)| *slot == Slot::Output)
            .filter_map(|(_, op)| op.var())
            .collect()
    }

    /// Variables this instruction reads.
    pub fn input_vars(&self) -> SmallVec<[&Var; 4]> {
        self.operands()
            .into_iter()
            .filter(|(slot, _)| *slot == Slot::Input)
            .filter_map(|(_, op)| op.var())
            .collect()
    }

    /// Whether `name` is read by this instruction.
    pub fn reads(&self, name: &Name) -> bool {
        self.input_vars().iter().any(|v| &v.name == name)
    }

    /// Whether `name` is written by this instruction.
    pub fn writes(&self, name: &Name) -> bool {
        self.outputs().iter().any(|v| &v.name == name)
    }

    /// Substitute variables in place. Returns whether anything changed.
    ///
    /// In [`RenameMode::InputsOnly`] output slots are untouched. Literal
    /// replacements only land in operand slots that accept literals.
    pub fn rename_vars(&mut self, renames: &Renames, mode: RenameMode) -> bool {
        if renames.is_empty() {
            return false;
        }
        let mut changed = false;
        for (slot, op) in self.operands_mut() {
            if slot == Slot::Output && mode == RenameMode::InputsOnly {
                continue;
            }
            changed |= match op {
                OperandMut::Var(v) => renames.apply_var(v),
                OperandMut::Arg(a) => renames.apply_arg(a),
            };
        }
        changed
    }

    /// Opcode mnemonic.
    pub const fn name(&self) -> &'static str {
        match self {
            Instr::Store { .. } => "store",
            Instr::Load { .. } => "load",
            Instr::Deref { .. } => "deref",
            Instr::StoreRef { .. } => "store_ref",
            Instr::LoadRef { .. } => "load_ref",
            Instr::CopyRef { .. } => "copy_ref",
            Instr::ArrayLookupFuture { .. } => "array_lookup_future",
            Instr::ArrayLookupRefImm { .. } => "array_lookup_ref_imm",
            Instr::ArrayLookupImm { .. } => "array_lookup_imm",
            Instr::ArrayRefLookupFuture { .. } => "arrayref_lookup_future",
            Instr::ArrayRefLookupImm { .. } => "arrayref_lookup_imm",
            Instr::ArrayInsertFuture { .. } => "array_insert_future",
            Instr::ArrayInsertImm { .. } => "array_insert_imm",
            Instr::ArrayRefInsertFuture { .. } => "arrayref_insert_future",
            Instr::ArrayRefInsertImm { .. } => "arrayref_insert_imm",
            Instr::ArrayCreateNestedFuture { .. } => "array_create_nested_future",
            Instr::ArrayCreateNestedImm { .. } => "array_create_nested_imm",
            Instr::ArrayRefCreateNestedFuture { .. } => "arrayref_create_nested_future",
            Instr::ArrayRefCreateNestedImm { .. } => "arrayref_create_nested_imm",
            Instr::ArrayBuild { .. } => "array_build",
            Instr::ArrayCreateBag { .. } => "array_create_bag",
            Instr::BagInsert { .. } => "bag_insert",
            Instr::StructInitField { .. } => "struct_init_field",
            Instr::StructLookup { .. } => "struct_lookup",
            Instr::StructRefLookup { .. } => "structref_lookup",
            Instr::InitUpdateable { .. } => "init_updateable",
            Instr::Update { .. } => "update",
            Instr::UpdateImm { .. } => "update_imm",
            Instr::LatestValue { .. } => "latest_value",
            Instr::LocalOp { .. } => "local_op",
            Instr::AsyncOp { .. } => "async_op",
            Instr::CallForeign { .. } => "call_foreign",
            Instr::CallForeignLocal { .. } => "call_foreign_local",
            Instr::Call { .. } => "call",
            Instr::RunExternal { .. } => "run_external",
            Instr::IncrRef { .. } => "incr_ref",
            Instr::DecrRef { .. } => "decr_ref",
            Instr::LoopContinue { .. } => "loop_continue",
            Instr::LoopBreak { .. } => "loop_break",
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::StructInitField { field, .. }
            | Instr::StructLookup { field, .. }
            | Instr::StructRefLookup { field, .. } => write!(f, "{} .{field}", self.name())?,
            Instr::Update { mode, .. } | Instr::UpdateImm { mode, .. } => {
                write!(f, "{}_{}", self.name(), mode.name())?;
            }
            Instr::LocalOp { op, .. } | Instr::AsyncOp { op, .. } => {
                write!(f, "{} {op}", self.name())?;
            }
            Instr::CallForeign { func, mode, .. } | Instr::Call { func, mode, .. } => {
                write!(f, "{} {func} <{}>", self.name(), mode.name())?;
            }
            Instr::CallForeignLocal { func, .. } => write!(f, "{} {func}", self.name())?,
            Instr::IncrRef { kind, .. } | Instr::DecrRef { kind, .. } => {
                write!(f, "{}_{}", self.name(), kind.name())?;
            }
            _ => f.write_str(self.name())?,
        }

        let ops = self.operands();
        for (_, op) in ops.iter().filter(|(s, _)| *s == Slot::Output) {
            write!(f, " {op}")?;
        }
        let mut inputs = ops.iter().filter(|(s, _)| *s == Slot::Input).peekable();
        if inputs.peek().is_some() {
            f.write_str(" <-")?;
            for (_, op) in inputs {
                write!(f, " {op}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
