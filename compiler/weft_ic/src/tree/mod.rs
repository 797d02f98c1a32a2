//! Block / function / program tree.
//!
//! A [`Function`] owns an arena of [`Block`]s and continuation nodes
//! addressed by [`BlockId`] and [`ContId`]. Parent links are ids, so
//! splicing, fusion and cloning never fight the borrow checker: a pass
//! looks a node up, copies out the ids it needs, and mutates by id.
//!
//! Freed slots stay `None` and are never reused, so an id that was valid
//! once either still names the same node or is detectably dangling.

mod edit;
mod essential;
mod pretty;
mod program;

use std::fmt;

use rustc_hash::FxHashSet;
use weft_ir::{Name, Var};

use crate::cont::Continuation;
use crate::error::{IcError, IcResult};
use crate::instr::{Instr, TaskMode};

pub use program::{ForeignFunction, Program, GLOBAL_CONST_PREFIX};

// ── IDs ─────────────────────────────────────────────────────────────

/// Block ID within a function's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// Create a new block ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Continuation ID within a function's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ContId(u32);

impl ContId {
    /// Create a new continuation ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

impl fmt::Display for ContId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Convert an arena length to the next id.
///
/// # Panics
///
/// Panics if the arena exceeds `u32::MAX` entries.
fn next_id(len: usize) -> u32 {
    u32::try_from(len).unwrap_or_else(|_| panic!("arena overflow: {len} entries exceeds u32::MAX"))
}

// ── Blocks ──────────────────────────────────────────────────────────

/// An action run when the enclosing block finishes, tied to a variable.
#[derive(Clone, Debug, PartialEq)]
pub struct Cleanup {
    pub var: Var,
    pub action: Instr,
}

/// Ordered declarations, instructions, continuations and cleanups.
///
/// Instructions run first; continuations start once the instruction list
/// has been issued; cleanups run when everything else in the block is
/// done.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block {
    pub parent: Option<ContId>,
    pub vars: Vec<Var>,
    pub instrs: Vec<Instr>,
    pub conts: Vec<ContId>,
    pub cleanups: Vec<Cleanup>,
}

impl Block {
    /// Whether the block does nothing at all.
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty() && self.conts.is_empty() && self.cleanups.is_empty()
    }

    /// Declared variable with the given name.
    pub fn var(&self, name: &Name) -> Option<&Var> {
        self.vars.iter().find(|v| &v.name == name)
    }

    pub fn declares(&self, name: &Name) -> bool {
        self.var(name).is_some()
    }

    pub fn declare(&mut self, var: Var) {
        self.vars.push(var);
    }

    pub fn add_instr(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    pub fn add_instr_front(&mut self, instr: Instr) {
        self.instrs.insert(0, instr);
    }

    pub fn add_cleanup(&mut self, var: Var, action: Instr) {
        self.cleanups.push(Cleanup { var, action });
    }
}

/// A continuation with its parent block.
#[derive(Clone, Debug, PartialEq)]
pub struct ContNode {
    pub parent: BlockId,
    pub cont: Continuation,
}

// ── Functions ───────────────────────────────────────────────────────

/// A composite function: signature plus a tree of blocks.
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: Name,
    pub inputs: Vec<Var>,
    pub outputs: Vec<Var>,
    /// Inputs the caller must close before the body starts.
    pub blocking_inputs: Vec<Name>,
    /// `Sync` functions run inline in the caller's task.
    pub mode: TaskMode,
    pub main: BlockId,
    blocks: Vec<Option<Block>>,
    conts: Vec<Option<ContNode>>,
}

impl Function {
    /// A function with an empty main block.
    pub fn new(name: impl Into<Name>, inputs: Vec<Var>, outputs: Vec<Var>, mode: TaskMode) -> Self {
        Function {
            name: name.into(),
            inputs,
            outputs,
            blocking_inputs: Vec::new(),
            mode,
            main: BlockId::new(0),
            blocks: vec![Some(Block::default())],
            conts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_blocking_inputs(mut self, names: impl IntoIterator<Item = Name>) -> Self {
        self.blocking_inputs = names.into_iter().collect();
        self
    }

    // ── Arena access ────────────────────────────────────────────────

    /// # Panics
    ///
    /// Panics if `id` is dangling.
    pub fn block(&self, id: BlockId) -> &Block {
        self.blocks
            .get(id.index())
            .and_then(Option::as_ref)
            .unwrap_or_else(|| panic!("dangling block id {id} in `{}`", self.name))
    }

    /// # Panics
    ///
    /// Panics if `id` is dangling.
    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        let name = &self.name;
        self.blocks
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("dangling block id {id} in `{name}`"))
    }

    pub fn try_block(&self, id: BlockId) -> IcResult<&Block> {
        self.blocks
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(IcError::UnknownBlock(id.raw()))
    }

    /// # Panics
    ///
    /// Panics if `id` is dangling.
    pub fn cont(&self, id: ContId) -> &Continuation {
        &self.cont_node(id).cont
    }

    /// # Panics
    ///
    /// Panics if `id` is dangling.
    pub fn cont_mut(&mut self, id: ContId) -> &mut Continuation {
        let name = &self.name;
        &mut self
            .conts
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("dangling continuation id {id} in `{name}`"))
            .cont
    }

    /// # Panics
    ///
    /// Panics if `id` is dangling.
    pub fn cont_node(&self, id: ContId) -> &ContNode {
        self.conts
            .get(id.index())
            .and_then(Option::as_ref)
            .unwrap_or_else(|| panic!("dangling continuation id {id} in `{}`", self.name))
    }

    pub fn try_cont(&self, id: ContId) -> IcResult<&ContNode> {
        self.conts
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(IcError::UnknownContinuation(id.raw()))
    }

    pub fn main_block(&self) -> &Block {
        self.block(self.main)
    }

    pub fn main_block_mut(&mut self) -> &mut Block {
        let main = self.main;
        self.block_mut(main)
    }

    /// Allocate a detached, empty block.
    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId::new(next_id(self.blocks.len()));
        self.blocks.push(Some(Block::default()));
        id
    }

    /// Live block ids in allocation order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_some())
            .map(|(i, _)| BlockId::new(next_id(i)))
    }

    /// Live continuation ids in allocation order.
    pub fn cont_ids(&self) -> impl Iterator<Item = ContId> + '_ {
        self.conts
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_some())
            .map(|(i, _)| ContId::new(next_id(i)))
    }

    /// Blocks reachable from `root`, parents before children.
    pub fn subtree(&self, root: BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            for &c in self.block(id).conts.iter().rev() {
                stack.extend(self.cont(c).blocks().into_iter().rev());
            }
        }
        out
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Total instructions in the function, including cleanups.
    pub fn instruction_count(&self) -> usize {
        self.block_instruction_count(self.main)
    }

    /// Instructions in the subtree rooted at `block`.
    pub fn block_instruction_count(&self, block: BlockId) -> usize {
        self.subtree(block)
            .into_iter()
            .map(|id| {
                let b = self.block(id);
                b.instrs.len() + b.cleanups.len()
            })
            .sum()
    }

    /// Every variable name bound anywhere in the function.
    pub fn all_var_names(&self) -> FxHashSet<Name> {
        let mut names: FxHashSet<Name> = self
            .inputs
            .iter()
            .chain(&self.outputs)
            .map(|v| v.name.clone())
            .collect();
        for id in self.subtree(self.main) {
            let block = self.block(id);
            names.extend(block.vars.iter().map(|v| v.name.clone()));
            for &c in &block.conts {
                names.extend(self.cont(c).defined_vars().iter().map(|v| v.name.clone()));
            }
        }
        names
    }

    /// A name starting with `base` that is not bound anywhere in the
    /// function.
    pub fn unique_var_name(&self, base: impl Into<Name>) -> Name {
        let base = base.into();
        let taken = self.all_var_names();
        if !taken.contains(&base) {
            return base;
        }
        (1u32..)
            .map(|n| base.with_suffix(format_args!("-{n}")))
            .find(|name| !taken.contains(name))
            .unwrap_or(base)
    }

    /// Whether `name` is a function input or output.
    pub fn is_argument(&self, name: &Name) -> bool {
        self.inputs.iter().chain(&self.outputs).any(|v| &v.name == name)
    }

    /// Innermost declaration of `name` visible from `block`, walking up
    /// through enclosing blocks and continuation bindings.
    pub fn lookup_var(&self, block: BlockId, name: &Name) -> Option<&Var> {
        let mut current = Some(block);
        while let Some(id) = current {
            let b = self.block(id);
            if let Some(v) = b.var(name) {
                return Some(v);
            }
            current = match b.parent {
                Some(c) => {
                    if let Some(v) = self.cont(c).defined_vars().into_iter().find(|v| &v.name == name) {
                        return Some(v);
                    }
                    Some(self.cont_node(c).parent)
                }
                None => None,
            };
        }
        self.inputs.iter().chain(&self.outputs).find(|v| &v.name == name)
    }
}
