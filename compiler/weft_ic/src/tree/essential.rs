//! Essential-variable analysis.
//!
//! A variable is essential if removing it could change behavior: it is
//! read by an instruction, cleanup or continuation; it is written by a
//! side-effecting instruction; or it is file-mapped (with its mapping).
//! Function arguments are always essential.

use rustc_hash::FxHashSet;
use weft_ir::{Name, Var};

use super::{BlockId, Function};

fn insert_var(set: &mut FxHashSet<Name>, var: &Var) {
    set.insert(var.name.clone());
    if let Some(mapping) = &var.mapping {
        set.insert(mapping.clone());
    }
}

impl Function {
    /// Names of every essential variable in the function.
    pub fn find_essential_vars(&self) -> FxHashSet<Name> {
        let mut set = FxHashSet::default();
        for v in self.inputs.iter().chain(&self.outputs) {
            insert_var(&mut set, v);
        }
        self.collect_essential(self.main, &mut set);
        set
    }

    /// Names of essential variables used in the subtree rooted at `block`.
    pub fn find_essential_vars_in(&self, block: BlockId) -> FxHashSet<Name> {
        let mut set = FxHashSet::default();
        self.collect_essential(block, &mut set);
        set
    }

    fn collect_essential(&self, root: BlockId, set: &mut FxHashSet<Name>) {
        for id in self.subtree(root) {
            let block = self.block(id);
            for v in block.vars.iter().filter(|v| v.is_mapped()) {
                insert_var(set, v);
            }
            for instr in &block.instrs {
                for v in instr.input_vars() {
                    insert_var(set, v);
                }
                if instr.has_side_effects() {
                    for v in instr.outputs() {
                        insert_var(set, v);
                    }
                }
            }
            for cleanup in &block.cleanups {
                insert_var(set, &cleanup.var);
                for v in cleanup.action.input_vars() {
                    insert_var(set, v);
                }
            }
            for &c in &block.conts {
                for v in self.cont(c).required_vars() {
                    insert_var(set, v);
                }
            }
        }
    }
}
