//! Generation contract.
//!
//! A [`Backend`] receives the final tree as a stream of calls: one per
//! instruction opcode, with that opcode's operands, and a matched
//! start/end pair per continuation kind, bracketed by whole-program calls.
//! [`generate`] walks a [`Program`] depth-first and left to right,
//! emitting every nested block in full (declarations, instructions,
//! continuations, cleanups) before the closing call of the continuation that owns it.
//!
//! Nothing flows back from the backend into the tree.

use weft_ir::{Arg, BuiltinOp, Literal, Name, Var};

use crate::cont::{Continuation, ForeachLoop, Loop, RangeLoop, WaitStatement};
use crate::error::IcResult;
use crate::instr::{CallProps, Instr, TaskMode, UpdateMode};
use crate::refcount::RefCountType;
use crate::tree::{BlockId, ContId, ForeignFunction, Function, Program};

/// Receiver of the generation walk.
pub trait Backend {
    // -- Program --

    fn header(&mut self);

    fn footer(&mut self);

    fn foreign_function(&mut self, func: &ForeignFunction);

    /// Declare a global constant. Called in name order.
    fn global_const(&mut self, name: &Name, value: &Literal);

    fn start_function(&mut self, func: &Function);

    fn end_function(&mut self, func: &Function);

    /// Declare a block-local variable.
    fn declare(&mut self, var: &Var);

    // -- Instructions --

    fn store(&mut self, dst: &Var, src: &Arg);

    /// Read closed `src` into a local value, releasing `decr_read` read
    /// references.
    fn load(&mut self, dst: &Var, src: &Var, decr_read: &Arg);

    fn deref(&mut self, dst: &Var, src: &Var);

    fn store_ref(&mut self, dst: &Var, src: &Var);

    fn load_ref(&mut self, dst: &Var, src: &Var);

    fn copy_ref(&mut self, dst: &Var, src: &Var);

    fn array_lookup_future(&mut self, dst: &Var, array: &Var, index: &Var);

    fn array_lookup_ref_imm(&mut self, dst: &Var, array: &Var, index: &Arg);

    fn array_lookup_imm(&mut self, dst: &Var, array: &Var, index: &Arg);

    fn array_ref_lookup_future(&mut self, dst: &Var, array_ref: &Var, index: &Var);

    fn array_ref_lookup_imm(&mut self, dst: &Var, array_ref: &Var, index: &Arg);

    fn array_insert_future(&mut self, array: &Var, index: &Var, member: &Var);

    fn array_insert_imm(&mut self, array: &Var, index: &Arg, member: &Var);

    fn array_ref_insert_future(&mut self, array_ref: &Var, index: &Var, member: &Var);

    fn array_ref_insert_imm(&mut self, array_ref: &Var, index: &Arg, member: &Var);

    fn array_create_nested_future(&mut self, dst: &Var, array: &Var, index: &Var);

    fn array_create_nested_imm(&mut self, dst: &Var, array: &Var, index: &Arg);

    fn array_ref_create_nested_future(&mut self, dst: &Var, array_ref: &Var, index: &Var);

    fn array_ref_create_nested_imm(&mut self, dst: &Var, array_ref: &Var, index: &Arg);

    /// Build a closed array from parallel key and member lists.
    fn array_build(&mut self, dst: &Var, keys: &[Arg], vals: &[Arg]);

    fn array_create_bag(&mut self, dst: &Var, array: &Var, index: &Arg);

    fn bag_insert(&mut self, bag: &Var, member: &Arg, writers_decr: &Arg);

    fn struct_init_field(&mut self, strct: &Var, field: &Name, value: &Var);

    fn struct_lookup(&mut self, dst: &Var, strct: &Var, field: &Name);

    fn struct_ref_lookup(&mut self, dst: &Var, strct_ref: &Var, field: &Name);

    fn init_updateable(&mut self, dst: &Var, value: &Arg);

    fn update(&mut self, mode: UpdateMode, cell: &Var, value: &Var);

    fn update_imm(&mut self, mode: UpdateMode, cell: &Var, value: &Arg);

    fn latest_value(&mut self, dst: &Var, cell: &Var);

    /// A builtin over local values. `dst` is `None` for assertions.
    fn local_op(&mut self, op: BuiltinOp, dst: Option<&Var>, inputs: &[Arg]);

    /// A builtin over futures, run once its inputs close.
    fn async_op(&mut self, op: BuiltinOp, dst: Option<&Var>, inputs: &[Arg]);

    fn call_foreign(&mut self, func: &Name, outputs: &[Var], inputs: &[Arg], mode: TaskMode, props: CallProps);

    fn call_foreign_local(&mut self, func: &Name, outputs: &[Var], inputs: &[Arg], props: CallProps);

    fn call(&mut self, func: &Name, outputs: &[Var], inputs: &[Arg], mode: TaskMode);

    fn run_external(&mut self, cmd: &Arg, args: &[Arg], outputs: &[Var], props: CallProps);

    fn incr_ref(&mut self, var: &Var, kind: RefCountType, amount: &Arg);

    fn decr_ref(&mut self, var: &Var, kind: RefCountType, amount: &Arg);

    fn loop_continue(&mut self, new_vals: &[Arg], passed_in: &[Var], keep_open: &[Var]);

    fn loop_break(&mut self, keep_open: &[Var]);

    // -- Continuations --

    fn start_if(&mut self, cond: &Arg, has_else: bool);

    fn start_else(&mut self);

    fn end_if(&mut self);

    fn start_switch(&mut self, var: &Arg, labels: &[i64], has_default: bool);

    /// Start a case; `None` is the default case.
    fn start_case(&mut self, label: Option<i64>);

    fn end_case(&mut self);

    fn end_switch(&mut self);

    fn start_range_loop(&mut self, l: &RangeLoop);

    fn end_range_loop(&mut self, l: &RangeLoop);

    fn start_foreach_loop(&mut self, l: &ForeachLoop);

    fn end_foreach_loop(&mut self, l: &ForeachLoop);

    fn start_loop(&mut self, l: &Loop);

    fn end_loop(&mut self, l: &Loop);

    fn start_wait(&mut self, w: &WaitStatement);

    fn end_wait(&mut self, w: &WaitStatement);

    fn start_nested(&mut self);

    fn end_nested(&mut self);

    /// Open the cleanup tied to `var`. Its action is emitted next, then
    /// [`end_cleanup`](Self::end_cleanup).
    fn start_cleanup(&mut self, var: &Var);

    fn end_cleanup(&mut self, var: &Var);
}

/// Walk `program` against `backend`.
///
/// Fails only on a dangling block or continuation id.
pub fn generate(program: &Program, backend: &mut impl Backend) -> IcResult<()> {
    backend.header();
    for foreign in &program.foreign {
        backend.foreign_function(foreign);
    }
    for (name, value) in program.global_consts() {
        backend.global_const(name, value);
    }
    for func in &program.functions {
        generate_function(func, backend)?;
    }
    backend.footer();
    tracing::debug!(functions = program.functions.len(), "generation finished");
    Ok(())
}

/// Walk a single function against `backend`.
pub fn generate_function(func: &Function, backend: &mut impl Backend) -> IcResult<()> {
    backend.start_function(func);
    emit_block(func, func.main, backend)?;
    backend.end_function(func);
    Ok(())
}

fn emit_block(func: &Function, id: BlockId, backend: &mut impl Backend) -> IcResult<()> {
    let block = func.try_block(id)?;
    for var in &block.vars {
        backend.declare(var);
    }
    for instr in &block.instrs {
        emit_instr(instr, backend);
    }
    for &c in &block.conts {
        emit_cont(func, c, backend)?;
    }
    for cleanup in &block.cleanups {
        backend.start_cleanup(&cleanup.var);
        emit_instr(&cleanup.action, backend);
        backend.end_cleanup(&cleanup.var);
    }
    Ok(())
}

fn emit_instr(instr: &Instr, backend: &mut impl Backend) {
    match instr {
        Instr::Store { dst, src } => backend.store(dst, src),
        Instr::Load {
            dst,
            src,
            decr_read,
        } => backend.load(dst, src, decr_read),
        Instr::Deref { dst, src } => backend.deref(dst, src),
        Instr::StoreRef { dst, src } => backend.store_ref(dst, src),
        Instr::LoadRef { dst, src } => backend.load_ref(dst, src),
        Instr::CopyRef { dst, src } => backend.copy_ref(dst, src),
        Instr::ArrayLookupFuture { dst, array, index } => backend.array_lookup_future(dst, array, index),
        Instr::ArrayLookupRefImm { dst, array, index } => backend.array_lookup_ref_imm(dst, array, index),
        Instr::ArrayLookupImm { dst, array, index } => backend.array_lookup_imm(dst, array, index),
        Instr::ArrayRefLookupFuture {
            dst,
            array_ref,
            index,
        } => backend.array_ref_lookup_future(dst, array_ref, index),
        Instr::ArrayRefLookupImm {
            dst,
            array_ref,
            index,
        } => backend.array_ref_lookup_imm(dst, array_ref, index),
        Instr::ArrayInsertFuture {
            array,
            index,
            member,
        } => backend.array_insert_future(array, index, member),
        Instr::ArrayInsertImm {
            array,
            index,
            member,
        } => backend.array_insert_imm(array, index, member),
        Instr::ArrayRefInsertFuture {
            array_ref,
            index,
            member,
        } => backend.array_ref_insert_future(array_ref, index, member),
        Instr::ArrayRefInsertImm {
            array_ref,
            index,
            member,
        } => backend.array_ref_insert_imm(array_ref, index, member),
        Instr::ArrayCreateNestedFuture { dst, array, index } => {
            backend.array_create_nested_future(dst, array, index);
        }
        Instr::ArrayCreateNestedImm { dst, array, index } => backend.array_create_nested_imm(dst, array, index),
        Instr::ArrayRefCreateNestedFuture {
            dst,
            array_ref,
            index,
        } => backend.array_ref_create_nested_future(dst, array_ref, index),
        Instr::ArrayRefCreateNestedImm {
            dst,
            array_ref,
            index,
        } => backend.array_ref_create_nested_imm(dst, array_ref, index),
        Instr::ArrayBuild { dst, keys, vals } => backend.array_build(dst, keys, vals),
        Instr::ArrayCreateBag { dst, array, index } => backend.array_create_bag(dst, array, index),
        Instr::BagInsert {
            bag,
            member,
            writers_decr,
        } => backend.bag_insert(bag, member, writers_decr),
        Instr::StructInitField { strct, field, value } => backend.struct_init_field(strct, field, value),
        Instr::StructLookup { dst, strct, field } => backend.struct_lookup(dst, strct, field),
        Instr::StructRefLookup {
            dst,
            strct_ref,
            field,
        } => backend.struct_ref_lookup(dst, strct_ref, field),
        Instr::InitUpdateable { dst, value } => backend.init_updateable(dst, value),
        Instr::Update { mode, cell, value } => backend.update(*mode, cell, value),
        Instr::UpdateImm { mode, cell, value } => backend.update_imm(*mode, cell, value),
        Instr::LatestValue { dst, cell } => backend.latest_value(dst, cell),
        Instr::LocalOp { op, dst, inputs } => backend.local_op(*op, dst.as_ref(), inputs),
        Instr::AsyncOp { op, dst, inputs } => backend.async_op(*op, dst.as_ref(), inputs),
        Instr::CallForeign {
            func,
            outputs,
            inputs,
            mode,
            props,
        } => backend.call_foreign(func, outputs, inputs, *mode, *props),
        Instr::CallForeignLocal {
            func,
            outputs,
            inputs,
            props,
        } => backend.call_foreign_local(func, outputs, inputs, *props),
        Instr::Call {
            func,
            outputs,
            inputs,
            mode,
        } => backend.call(func, outputs, inputs, *mode),
        Instr::RunExternal {
            cmd,
            args,
            outputs,
            props,
        } => backend.run_external(cmd, args, outputs, *props),
        Instr::IncrRef { var, kind, amount } => backend.incr_ref(var, *kind, amount),
        Instr::DecrRef { var, kind, amount } => backend.decr_ref(var, *kind, amount),
        Instr::LoopContinue {
            new_vals,
            passed_in,
            keep_open,
        } => backend.loop_continue(new_vals, passed_in, keep_open),
        Instr::LoopBreak { keep_open } => backend.loop_break(keep_open),
    }
}

fn emit_cont(func: &Function, c: ContId, backend: &mut impl Backend) -> IcResult<()> {
    match &func.try_cont(c)?.cont {
        Continuation::If(s) => {
            backend.start_if(&s.cond, s.else_block.is_some());
            emit_block(func, s.then_block, backend)?;
            if let Some(else_block) = s.else_block {
                backend.start_else();
                emit_block(func, else_block, backend)?;
            }
            backend.end_if();
        }
        Continuation::Switch(s) => {
            backend.start_switch(&s.var, &s.labels, s.default.is_some());
            for (&label, &case) in s.labels.iter().zip(&s.cases) {
                backend.start_case(Some(label));
                emit_block(func, case, backend)?;
                backend.end_case();
            }
            if let Some(default) = s.default {
                backend.start_case(None);
                emit_block(func, default, backend)?;
                backend.end_case();
            }
            backend.end_switch();
        }
        Continuation::RangeLoop(l) => {
            backend.start_range_loop(l);
            emit_block(func, l.body, backend)?;
            backend.end_range_loop(l);
        }
        Continuation::ForeachLoop(l) => {
            backend.start_foreach_loop(l);
            emit_block(func, l.body, backend)?;
            backend.end_foreach_loop(l);
        }
        Continuation::Loop(l) => {
            backend.start_loop(l);
            emit_block(func, l.body, backend)?;
            backend.end_loop(l);
        }
        Continuation::Wait(w) => {
            backend.start_wait(w);
            emit_block(func, w.body, backend)?;
            backend.end_wait(w);
        }
        Continuation::Nested(body) => {
            backend.start_nested();
            emit_block(func, *body, backend)?;
            backend.end_nested();
        }
    }
    Ok(())
}
