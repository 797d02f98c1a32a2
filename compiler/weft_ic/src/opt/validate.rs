//! Structural validation of a function tree.
//!
//! Run between optimizer iterations to catch a pass that broke parent
//! links, declared a name twice in one block, or left a reference to a
//! variable that is no longer in scope.

use rustc_hash::FxHashSet;
use weft_ir::{Name, Storage, Var};

use crate::error::{IcError, IcResult};
use crate::tree::{BlockId, Function};

/// Check the structural invariants of `func`.
pub fn validate(func: &Function) -> IcResult<()> {
    let invalid = |detail: String| IcError::Invalid {
        function: func.name.to_string(),
        detail,
    };

    if func.try_block(func.main)?.parent.is_some() {
        return Err(invalid("main block has a parent".to_owned()));
    }

    for id in func.subtree(func.main) {
        let block = func.try_block(id)?;

        let mut seen: FxHashSet<&Name> = FxHashSet::default();
        if let Some(dup) = block.vars.iter().find(|v| !seen.insert(&v.name)) {
            return Err(invalid(format!("`{}` declared twice in block {id}", dup.name)));
        }

        for instr in &block.instrs {
            for v in instr.input_vars().into_iter().chain(instr.outputs()) {
                if !visible(func, id, v) {
                    return Err(invalid(format!("`{}` not in scope in `{instr}`", v.name)));
                }
            }
        }
        for cleanup in &block.cleanups {
            let vars = std::iter::once(&cleanup.var).chain(cleanup.action.input_vars());
            for v in vars {
                if !visible(func, id, v) {
                    return Err(invalid(format!("`{}` not in scope in cleanup", v.name)));
                }
            }
        }

        for &c in &block.conts {
            let node = func.try_cont(c)?;
            if node.parent != id {
                return Err(invalid(format!("continuation {c} listed in block {id} but parented by {}", node.parent)));
            }
            for child in node.cont.blocks() {
                if func.try_block(child)?.parent != Some(c) {
                    return Err(invalid(format!("block {child} not parented by continuation {c}")));
                }
            }
            let used = node
                .cont
                .required_vars()
                .into_iter()
                .chain(node.cont.passed_in())
                .chain(node.cont.keep_open());
            for v in used {
                if !visible(func, id, v) {
                    return Err(invalid(format!(
                        "`{}` not in scope in {} continuation",
                        v.name,
                        node.cont.kind_name()
                    )));
                }
            }
        }
    }
    Ok(())
}

fn visible(func: &Function, block: BlockId, var: &Var) -> bool {
    var.storage == Storage::GlobalConst || func.lookup_var(block, &var.name).is_some()
}
