//! Reference-count protocol.
//!
//! Every non-value datum carries two independent counters, readers and
//! writers, and is reclaimed once both reach zero. A delta on either
//! counter is carried by exactly one of:
//!
//! - an explicit [`Instr::IncrRef`] / [`Instr::DecrRef`]
//! - an amount piggybacked onto an instruction that already touches the
//!   variable ([`Instr::try_piggyback`])
//! - a continuation's entry/exit adjustment ([`LoopRefcounts`])
//!
//! [`RcLedger`] sums all three so a pass can be checked for conservation.

use std::fmt;

use rustc_hash::FxHashMap;
use weft_ir::{Arg, Literal, Name};

use crate::cont::{truthy, Continuation, LoopRefcounts, RangeLoop};
use crate::instr::Instr;
use crate::tree::{Block, BlockId, Function};

/// Which of a datum's two counters is adjusted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RefCountType {
    Readers,
    Writers,
}

impl RefCountType {
    pub const ALL: [RefCountType; 2] = [RefCountType::Readers, RefCountType::Writers];

    pub const fn name(self) -> &'static str {
        match self {
            RefCountType::Readers => "read",
            RefCountType::Writers => "write",
        }
    }
}

impl fmt::Display for RefCountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ledger key: variable and counter.
pub type RcKey = (Name, RefCountType);

/// Net reference-count deltas carried by a function.
///
/// Literal amounts are summed into `constant`. Amounts carried by a
/// variable (deferred, iteration-proportional adjustments) are summed per
/// amount variable into `symbolic`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RcLedger {
    pub constant: FxHashMap<RcKey, i64>,
    pub symbolic: FxHashMap<(RcKey, Name), i64>,
}

impl RcLedger {
    /// Ledger of every delta in `func`, each block body counted once.
    pub fn of_function(func: &Function) -> Self {
        let mut ledger = RcLedger::default();
        ledger.add_block(func, func.main);
        ledger.prune();
        ledger
    }

    /// Ledger of the deltas one run of `func` applies.
    ///
    /// A range loop with literal bounds counts its body and per-iteration
    /// increments once per iteration, and a branch on a literal counts
    /// only the path it takes. Undecided branches count every path, and
    /// loops with unknown trip counts count one iteration.
    pub fn of_execution(func: &Function) -> Self {
        let mut ledger = RcLedger::default();
        ledger.run_block(func, func.main, 1);
        ledger.prune();
        ledger
    }

    /// Net constant delta for one variable and counter.
    pub fn get(&self, name: &Name, kind: RefCountType) -> i64 {
        self.constant
            .get(&(name.clone(), kind))
            .copied()
            .unwrap_or(0)
    }

    fn add(&mut self, name: &Name, kind: RefCountType, amount: &Arg, delta: i64) {
        let key = (name.clone(), kind);
        match amount {
            Arg::Lit(lit) => {
                if let Some(n) = lit.as_int() {
                    *self.constant.entry(key).or_insert(0) += delta.saturating_mul(n);
                }
            }
            Arg::Var(v) => {
                *self.symbolic.entry((key, v.name.clone())).or_insert(0) += delta;
            }
        }
    }

    fn add_instr(&mut self, instr: &Instr, times: i64) {
        for c in instr.rc_contributions() {
            self.add(&c.var.name, c.kind, &c.amount, c.sign * times);
        }
    }

    fn add_loop(&mut self, refcounts: &LoopRefcounts, trips: i64, times: i64) {
        for adj in &refcounts.per_iter_incrs {
            self.add(&adj.var.name, adj.kind, &adj.amount, trips.saturating_mul(times));
        }
        for adj in &refcounts.const_incrs {
            self.add(&adj.var.name, adj.kind, &adj.amount, times);
        }
        for adj in &refcounts.end_decrs {
            self.add(&adj.var.name, adj.kind, &adj.amount, -times);
        }
    }

    fn add_own(&mut self, block: &Block, times: i64) {
        for instr in &block.instrs {
            self.add_instr(instr, times);
        }
        for cleanup in &block.cleanups {
            self.add_instr(&cleanup.action, times);
        }
    }

    fn add_block(&mut self, func: &Function, block: BlockId) {
        let b = func.block(block);
        self.add_own(b, 1);
        for &cont in &b.conts {
            let cont = func.cont(cont);
            match cont {
                Continuation::RangeLoop(r) => self.add_loop(&r.refcounts, 1, 1),
                Continuation::ForeachLoop(f) => self.add_loop(&f.refcounts, 1, 1),
                _ => {}
            }
            for child in cont.blocks() {
                self.add_block(func, child);
            }
        }
    }

    fn run_block(&mut self, func: &Function, block: BlockId, times: i64) {
        let b = func.block(block);
        self.add_own(b, times);
        for &cont in &b.conts {
            match func.cont(cont) {
                Continuation::RangeLoop(r) => {
                    let trips = literal_trips(r).unwrap_or(1);
                    self.add_loop(&r.refcounts, trips, times);
                    if trips > 0 {
                        self.run_block(func, r.body, times.saturating_mul(trips));
                    }
                }
                Continuation::ForeachLoop(f) => {
                    self.add_loop(&f.refcounts, 1, times);
                    self.run_block(func, f.body, times);
                }
                Continuation::If(s) => match s.cond.as_lit().and_then(truthy) {
                    Some(true) => self.run_block(func, s.then_block, times),
                    Some(false) => {
                        if let Some(b) = s.else_block {
                            self.run_block(func, b, times);
                        }
                    }
                    None => {
                        for child in [Some(s.then_block), s.else_block].into_iter().flatten() {
                            self.run_block(func, child, times);
                        }
                    }
                },
                Continuation::Switch(s) => match s.var.as_lit().and_then(Literal::as_int) {
                    Some(value) => {
                        let chosen = s
                            .labels
                            .iter()
                            .position(|&l| l == value)
                            .and_then(|i| s.cases.get(i).copied())
                            .or(s.default);
                        if let Some(b) = chosen {
                            self.run_block(func, b, times);
                        }
                    }
                    None => {
                        for child in s.cases.iter().copied().chain(s.default) {
                            self.run_block(func, child, times);
                        }
                    }
                },
                other => {
                    for child in other.blocks() {
                        self.run_block(func, child, times);
                    }
                }
            }
        }
    }

    /// Drop zero entries so ledgers compare by net effect only.
    fn prune(&mut self) {
        self.constant.retain(|_, v| *v != 0);
        self.symbolic.retain(|_, v| *v != 0);
    }
}

/// Iterations of a range loop whose bounds and step are all literal.
fn literal_trips(l: &RangeLoop) -> Option<i64> {
    let (start, end, incr) = (l.start.as_int()?, l.end.as_int()?, l.incr.as_int()?);
    if incr <= 0 {
        return None;
    }
    if end < start {
        return Some(0);
    }
    Some(end.checked_sub(start)? / incr + 1)
}

#[cfg(test)]
mod tests;
