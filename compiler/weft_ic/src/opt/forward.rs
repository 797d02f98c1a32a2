//! Forward dataflow: value numbering, closedness and make-immediate.
//!
//! One top-down walk carries two scoped facts:
//!
//! - **available values**: which operand already holds each
//!   [`ComputedValue`]; an instruction recomputing one is removed and its
//!   output replaced by the earlier holder
//! - **closed variables**: a [`ClosedSet`] grown by stores, synchronous
//!   reads, waits, collection-loop arrays and blocking inputs of completed
//!   synchronous instructions
//!
//! Whenever an instruction can switch to a cheaper form under the current
//! closed set, its blocking inputs are fetched into local values, the
//! immediate form is emitted, and local results are stored back. Rewrites
//! whose task mode needs a dispatch are wrapped in a task-dispatch wait.
//! Explicit waits lose every variable already closed and are inlined once
//! none remain.

use rustc_hash::{FxHashMap, FxHashSet};
use weft_ir::{Arg, Literal, Name, Storage, Type, Var};

use super::{shadows_parent, substitute, try_inline};
use crate::cont::{Continuation, WaitMode, WaitStatement};
use crate::error::IcResult;
use crate::instr::make_imm::ALIAS_PREFIX;
use crate::instr::{ClosedSet, ComputedValue, Instr};
use crate::refcount::RcLedger;
use crate::rename::{RenameMode, Renames};
use crate::tree::{BlockId, Function};

/// Prefix of local values holding fetched futures.
pub const VALUE_PREFIX: &str = "__v:";

/// What [`forward_dataflow`] changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub value_numbered: usize,
    pub made_immediate: usize,
    pub wait_vars_removed: usize,
    pub predicted: usize,
}

#[derive(Default)]
struct Scope {
    /// Facts of enclosing scopes are not visible past an async boundary.
    barrier: bool,
    values: FxHashMap<ComputedValue, Arg>,
}

struct State {
    scopes: Vec<Scope>,
    closed: ClosedSet,
    /// Variables with a net refcount delta; never merged into another.
    counted: FxHashSet<Name>,
}

impl State {
    fn enter(&mut self, barrier: bool) {
        self.scopes.push(Scope {
            barrier,
            values: FxHashMap::default(),
        });
        self.closed.enter();
    }

    fn exit(&mut self) {
        self.scopes.pop();
        self.closed.exit();
    }

    fn value(&self, cv: &ComputedValue) -> Option<&Arg> {
        for scope in self.scopes.iter().rev() {
            if let Some(held) = scope.values.get(cv) {
                return Some(held);
            }
            if scope.barrier {
                break;
            }
        }
        None
    }

    fn record(&mut self, cv: ComputedValue, holder: Arg) {
        if self.value(&cv).is_some() {
            return;
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.values.insert(cv, holder);
        }
    }
}

/// Run value numbering and make-immediate rewriting over `func`.
pub fn forward_dataflow(func: &mut Function) -> IcResult<ForwardStats> {
    let ledger = RcLedger::of_function(func);
    let counted = ledger
        .constant
        .keys()
        .map(|(name, _)| name.clone())
        .chain(ledger.symbolic.keys().map(|((name, _), _)| name.clone()))
        .collect();
    let mut state = State {
        scopes: Vec::new(),
        closed: ClosedSet::from_names(func.blocking_inputs.iter().cloned()),
        counted,
    };
    let mut stats = ForwardStats::default();
    let main = func.main;
    visit_block(func, main, &mut state, &mut stats)?;

    if stats.value_numbered + stats.made_immediate + stats.wait_vars_removed + stats.predicted > 0 {
        tracing::debug!(
            function = %func.name,
            value_numbered = stats.value_numbered,
            made_immediate = stats.made_immediate,
            wait_vars_removed = stats.wait_vars_removed,
            predicted = stats.predicted,
            "forward dataflow"
        );
    }
    Ok(stats)
}

fn visit_block(
    func: &mut Function,
    id: BlockId,
    state: &mut State,
    stats: &mut ForwardStats,
) -> IcResult<()> {
    state.enter(false);
    let mut i = 0;
    let mut next_cont = 0;
    loop {
        while i < func.block(id).instrs.len() {
            if number_value(func, id, i, state) {
                stats.value_numbered += 1;
                continue;
            }
            if make_immediate_at(func, id, i, state)? {
                stats.made_immediate += 1;
                continue;
            }
            record_instr(&func.block(id).instrs[i], state);
            i += 1;
        }
        if !visit_conts(func, id, &mut next_cont, state, stats)? {
            break;
        }
    }
    state.exit();
    Ok(())
}

fn record_instr(instr: &Instr, state: &mut State) {
    for fact in instr.computed_values() {
        state.record(fact.value, fact.result);
    }
    for v in instr.closed_outputs().into_iter().chain(instr.closed_inputs()) {
        state.closed.close(v.name.clone());
    }
    if instr.is_sync() {
        for v in instr.blocking_inputs() {
            state.closed.close(v.name.clone());
        }
    }
}

// ── Value numbering ─────────────────────────────────────────────────

/// Remove instruction `i` if it recomputes an available value. Returns
/// whether it was removed.
fn number_value(func: &mut Function, id: BlockId, i: usize, state: &State) -> bool {
    let instr = &func.block(id).instrs[i];
    if instr.has_side_effects() || instr.outputs().len() != 1 {
        return false;
    }
    let found = instr.computed_values().into_iter().find_map(|fact| {
        if !fact.defines_output {
            return None;
        }
        let out = fact.result.as_var()?.clone();
        let prev = state.value(&fact.value)?.clone();
        Some((out, prev))
    });
    let Some((out, prev)) = found else {
        return false;
    };
    let replaceable = prev.var_name() != Some(&out.name)
        && prev.ty() == out.ty
        && !out.is_mapped()
        && !state.counted.contains(&out.name)
        && !func.is_argument(&out.name)
        && func.block(id).declares(&out.name);
    if !replaceable {
        return false;
    }
    let old = func.block_mut(id).instrs.remove(i);
    tracing::trace!(instr = %old, with = %prev, "value numbered");
    substitute(func, id, &out.name, prev);
    true
}

// ── Make immediate ──────────────────────────────────────────────────

/// Fetch instruction and local variable for a blocking input.
fn fetch(func: &Function, input: &Var) -> Option<(Var, Instr)> {
    match &input.ty {
        Type::Ref(target) => {
            let name = func.unique_var_name(input.name.with_prefix(ALIAS_PREFIX));
            let alias = Var::alias(name, (**target).clone());
            let load = Instr::LoadRef {
                dst: alias.clone(),
                src: input.clone(),
            };
            Some((alias, load))
        }
        Type::Updateable(p) => {
            let name = func.unique_var_name(input.name.with_prefix(VALUE_PREFIX));
            let value = Var::temp(name, Type::Value(*p));
            let read = Instr::LatestValue {
                dst: value.clone(),
                cell: input.clone(),
            };
            Some((value, read))
        }
        Type::Future(p) => {
            let name = func.unique_var_name(input.name.with_prefix(VALUE_PREFIX));
            let value = Var::temp(name, Type::Value(*p));
            let load = Instr::Load {
                dst: value.clone(),
                src: input.clone(),
                decr_read: Arg::int(0),
            };
            Some((value, load))
        }
        _ => None,
    }
}

/// Switch instruction `i` to a cheaper form if the closed set allows it.
/// Returns whether the instruction was replaced.
fn make_immediate_at(func: &mut Function, id: BlockId, i: usize, state: &State) -> IcResult<bool> {
    let instr = func.block(id).instrs[i].clone();
    let Some(request) = instr.can_make_immediate(&state.closed, false) else {
        return Ok(false);
    };

    let dispatch = request.mode.needs_dispatch();
    let mut decls = Vec::new();
    let mut seq = Vec::new();
    let mut values: Vec<Arg> = Vec::new();
    for (idx, input) in request.inputs.iter().enumerate() {
        if let Some(earlier) = request.inputs[..idx].iter().position(|v| v.name == input.name) {
            let held = values[earlier].clone();
            values.push(held);
            continue;
        }
        if input.ty.is_value() {
            values.push(Arg::from(input));
            continue;
        }
        // Local values of this task are not visible inside a dispatched task.
        let reusable = state.value(&ComputedValue::retrieve(input)).filter(|held| {
            held.is_const()
                || (!dispatch && (held.is_immediate() || (input.ty.is_ref() && held.is_var())))
        });
        if let Some(held) = reusable {
            values.push(held.clone());
            continue;
        }
        let Some((local, read)) = fetch(func, input) else {
            return Ok(false);
        };
        decls.push(local.clone());
        seq.push(read);
        values.push(Arg::Var(local));
    }

    let mut outs = Vec::new();
    for o in &request.out {
        let Some(ty) = o.ty.fetched() else {
            return Ok(false);
        };
        let name = func.unique_var_name(o.name.with_prefix(VALUE_PREFIX));
        outs.push(Var::temp(name, ty));
    }

    let mut change = instr.make_immediate(&request, &outs, &values)?;
    decls.extend(outs.iter().cloned());

    let mut post = Vec::new();
    if let Some(oc) = &change.output_change {
        let fresh = func.unique_var_name(oc.new_out.name.clone());
        let new_out = oc.new_out.renamed(fresh);
        if new_out.name != oc.new_out.name {
            change.new_instr.rename_vars(
                &Renames::single(oc.new_out.name.clone(), Arg::from(&new_out)),
                RenameMode::Replace,
            );
        }
        decls.push(new_out.clone());
        post.push(Instr::StoreRef {
            dst: oc.old_out.clone(),
            src: new_out,
        });
        make_temp(func, id, &oc.old_out.name);
    }
    for (o, local) in request.out.iter().zip(&outs) {
        post.push(Instr::Store {
            dst: o.clone(),
            src: Arg::from(local),
        });
    }
    seq.push(change.new_instr);
    seq.extend(post);

    tracing::trace!(
        function = %func.name,
        instr = %instr,
        mode = request.mode.name(),
        "make immediate"
    );

    if dispatch {
        func.block_mut(id).instrs.remove(i);
        let body = func.new_block();
        let b = func.block_mut(body);
        b.vars = decls;
        b.instrs = seq;
        let wait_vars: Vec<Var> = request
            .inputs
            .iter()
            .filter(|v| !v.ty.is_value())
            .cloned()
            .collect();
        let mut passed_in = request.inputs.clone();
        passed_in.extend(request.out.iter().cloned());
        let wait = WaitStatement {
            name: Name::new(format!("dispatch-{}", instr.name())),
            wait_vars,
            mode: WaitMode::TaskDispatch,
            recursive: false,
            target: request.mode,
            passed_in,
            keep_open: request.out.clone(),
            priority: None,
            body,
        };
        func.add_continuation(id, Continuation::Wait(wait));
    } else {
        let b = func.block_mut(id);
        b.vars.extend(decls);
        b.instrs.splice(i..=i, seq);
    }
    Ok(true)
}

/// An alias output now written through a reference store becomes a plain
/// temporary.
fn make_temp(func: &mut Function, from: BlockId, name: &Name) {
    let mut current = Some(from);
    while let Some(id) = current {
        let block = func.block_mut(id);
        if let Some(v) = block.vars.iter_mut().find(|v| &v.name == name) {
            if v.storage == Storage::Alias {
                v.storage = Storage::Temp;
            }
            return;
        }
        let parent = block.parent;
        current = parent.map(|c| func.cont_node(c).parent);
    }
}

// ── Continuations ───────────────────────────────────────────────────

fn no_constants(_: &Name) -> Option<Literal> {
    None
}

/// Prune closed wait variables, inline waits and nested blocks that no
/// longer wait on anything, and descend into the rest. Returns `true`
/// after inlining, so the caller can visit the spliced instructions.
fn visit_conts(
    func: &mut Function,
    id: BlockId,
    next: &mut usize,
    state: &mut State,
    stats: &mut ForwardStats,
) -> IcResult<bool> {
    while let Some(&c) = func.block(id).conts.get(*next) {
        stats.wait_vars_removed += func.cont_mut(c).remove_closed_wait_vars(&state.closed);
        func.cont_mut(c).mark_array_closed(&state.closed);

        let cont = func.cont(c);
        if matches!(cont, Continuation::Wait(_) | Continuation::Nested(_)) {
            if let Some(p) = cont.branch_predict(&no_constants, &state.closed) {
                if try_inline(func, c, &p) {
                    stats.predicted += 1;
                    return Ok(true);
                }
            }
        }

        let cont = func.cont(c);
        let bound: Vec<Name> = cont.defined_vars().iter().map(|v| v.name.clone()).collect();
        let closes: Vec<Name> = cont.blocking_vars().iter().map(|v| v.name.clone()).collect();
        let children = cont.blocks();
        state.enter(cont.is_async());
        for name in closes {
            state.closed.close(name);
        }
        for child in children {
            if !shadows_parent(func, id, child, &bound) {
                visit_block(func, child, state, stats)?;
            }
        }
        state.exit();
        *next += 1;
    }
    Ok(false)
}
