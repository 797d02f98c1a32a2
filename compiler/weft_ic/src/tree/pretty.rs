//! Stable textual form of functions and programs.
//!
//! Output depends only on tree content, never on arena ids, so a cloned
//! subtree prints identically to its source.

use std::fmt::{self, Write};

use weft_ir::Var;

use super::{BlockId, Function, Program};
use crate::cont::{Continuation, LoopRefcounts};

const INDENT: &str = "  ";

fn pad(f: &mut impl Write, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        f.write_str(INDENT)?;
    }
    Ok(())
}

fn write_decl(f: &mut impl Write, v: &Var) -> fmt::Result {
    write!(f, "{}:{}", v.name, v.ty)
}

fn write_list<T: fmt::Display>(f: &mut impl Write, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_async_vars(f: &mut impl Write, passed_in: &[Var], keep_open: &[Var]) -> fmt::Result {
    if !passed_in.is_empty() {
        f.write_str(" passin[")?;
        write_list(f, passed_in)?;
        f.write_str("]")?;
    }
    if !keep_open.is_empty() {
        f.write_str(" keepopen[")?;
        write_list(f, keep_open)?;
        f.write_str("]")?;
    }
    Ok(())
}

fn write_refcounts(f: &mut impl Write, rc: &LoopRefcounts) -> fmt::Result {
    let groups = [
        ("incr_per_iter", &rc.per_iter_incrs),
        ("incr_start", &rc.const_incrs),
        ("decr_end", &rc.end_decrs),
    ];
    for (label, adjs) in groups {
        if adjs.is_empty() {
            continue;
        }
        write!(f, " {label}[")?;
        for (i, a) in adjs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}_{}+{}", a.var, a.kind, a.amount)?;
        }
        f.write_str("]")?;
    }
    Ok(())
}

impl Function {
    fn write_block(&self, f: &mut impl Write, id: BlockId, depth: usize) -> fmt::Result {
        let block = self.block(id);
        for v in &block.vars {
            pad(f, depth)?;
            f.write_str("declare ")?;
            write_decl(f, v)?;
            if let Some(m) = &v.mapping {
                write!(f, " @mapping={m}")?;
            }
            f.write_str("\n")?;
        }
        for instr in &block.instrs {
            pad(f, depth)?;
            writeln!(f, "{instr}")?;
        }
        for &c in &block.conts {
            self.write_cont(f, self.cont(c), depth)?;
        }
        for cleanup in &block.cleanups {
            pad(f, depth)?;
            writeln!(f, "cleanup {}: {}", cleanup.var, cleanup.action)?;
        }
        Ok(())
    }

    fn write_body(&self, f: &mut impl Write, id: BlockId, depth: usize) -> fmt::Result {
        f.write_str(" {\n")?;
        self.write_block(f, id, depth + 1)?;
        pad(f, depth)?;
        f.write_str("}")
    }

    fn write_cont(&self, f: &mut impl Write, cont: &Continuation, depth: usize) -> fmt::Result {
        pad(f, depth)?;
        match cont {
            Continuation::If(s) => {
                write!(f, "if ({})", s.cond)?;
                self.write_body(f, s.then_block, depth)?;
                if let Some(e) = s.else_block {
                    f.write_str(" else")?;
                    self.write_body(f, e, depth)?;
                }
            }
            Continuation::Switch(s) => {
                writeln!(f, "switch ({}) {{", s.var)?;
                for (label, &case) in s.labels.iter().zip(&s.cases) {
                    pad(f, depth + 1)?;
                    write!(f, "case {label}")?;
                    self.write_body(f, case, depth + 1)?;
                    f.write_str("\n")?;
                }
                if let Some(d) = s.default {
                    pad(f, depth + 1)?;
                    f.write_str("default")?;
                    self.write_body(f, d, depth + 1)?;
                    f.write_str("\n")?;
                }
                pad(f, depth)?;
                f.write_str("}")?;
            }
            Continuation::RangeLoop(l) => {
                write!(f, "for {} ", l.name)?;
                write_decl(f, &l.loop_var)?;
                if let Some(c) = &l.count_var {
                    f.write_str(" count ")?;
                    write_decl(f, c)?;
                }
                write!(f, " = {} to {} incr {}", l.start, l.end, l.incr)?;
                if l.split_degree > 0 {
                    write!(f, " /*split={}*/", l.split_degree)?;
                }
                if l.desired_unroll > 1 {
                    write!(f, " /*unroll={}*/", l.desired_unroll)?;
                }
                write_async_vars(f, &l.passed_in, &l.keep_open)?;
                write_refcounts(f, &l.refcounts)?;
                self.write_body(f, l.body, depth)?;
            }
            Continuation::ForeachLoop(l) => {
                write!(f, "foreach {} ", l.name)?;
                write_decl(f, &l.member_var)?;
                if let Some(c) = &l.counter_var {
                    f.write_str(", ")?;
                    write_decl(f, c)?;
                }
                write!(f, " in {}", l.array)?;
                if l.array_closed {
                    f.write_str(" /*closed*/")?;
                }
                if l.split_degree > 0 {
                    write!(f, " /*split={}*/", l.split_degree)?;
                }
                write_async_vars(f, &l.passed_in, &l.keep_open)?;
                write_refcounts(f, &l.refcounts)?;
                self.write_body(f, l.body, depth)?;
            }
            Continuation::Loop(l) => {
                write!(f, "loop {} [", l.name)?;
                for (i, (v, init)) in l.loop_vars.iter().zip(&l.init_vals).enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    let blocking = l.blocking.get(i).copied().unwrap_or(false);
                    write_decl(f, v)?;
                    write!(f, "={init}{}", if blocking { " (blocking)" } else { "" })?;
                }
                f.write_str("]")?;
                write_async_vars(f, &l.passed_in, &l.keep_open)?;
                self.write_body(f, l.body, depth)?;
            }
            Continuation::Wait(w) => {
                write!(f, "wait <{}> {} (", w.mode.name(), w.name)?;
                write_list(f, &w.wait_vars)?;
                write!(f, ") <{}>", w.target.name())?;
                if w.recursive {
                    f.write_str(" recursive")?;
                }
                if let Some(p) = &w.priority {
                    write!(f, " priority={p}")?;
                }
                write_async_vars(f, &w.passed_in, &w.keep_open)?;
                self.write_body(f, w.body, depth)?;
            }
            Continuation::Nested(b) => {
                f.write_str("block")?;
                self.write_body(f, *b, depth)?;
            }
        }
        f.write_str("\n")
    }

    /// Printed form of the subtree rooted at `block`.
    pub fn block_to_string(&self, block: BlockId) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_block(&mut out, block, 0);
        out
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function <{}> {}(", self.mode.name(), self.name)?;
        for (i, v) in self.inputs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_decl(f, v)?;
        }
        f.write_str(") -> (")?;
        for (i, v) in self.outputs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_decl(f, v)?;
        }
        f.write_str(")")?;
        if !self.blocking_inputs.is_empty() {
            f.write_str(" wait[")?;
            write_list(f, &self.blocking_inputs)?;
            f.write_str("]")?;
        }
        self.write_body(f, self.main, 0)?;
        f.write_str("\n")
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for foreign in &self.foreign {
            write!(f, "foreign {}(", foreign.name)?;
            write_list(f, &foreign.inputs)?;
            f.write_str(") -> (")?;
            write_list(f, &foreign.outputs)?;
            f.write_str(")\n")?;
        }
        for (name, value) in self.global_consts() {
            writeln!(f, "const {name} = {value}")?;
        }
        for func in &self.functions {
            write!(f, "{func}")?;
        }
        Ok(())
    }
}
