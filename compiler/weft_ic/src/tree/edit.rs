//! Structural edits: continuations, splicing, cloning, renaming, removal.

use std::mem;

use rustc_hash::FxHashSet;
use weft_ir::{Arg, Name, Storage, Var};

use super::{next_id, Block, BlockId, ContId, ContNode, Function};
use crate::cont::{Continuation, Prediction};
use crate::error::{IcError, IcResult};
use crate::rename::{RenameMode, Renames};

impl Function {
    // ── Continuations ───────────────────────────────────────────────

    /// Attach `cont` to the end of `block`'s continuation list.
    ///
    /// The continuation's child blocks must already be allocated; their
    /// parent links are set here.
    pub fn add_continuation(&mut self, block: BlockId, cont: Continuation) -> ContId {
        let id = ContId::new(next_id(self.conts.len()));
        for child in cont.blocks() {
            self.block_mut(child).parent = Some(id);
        }
        self.conts.push(Some(ContNode {
            parent: block,
            cont,
        }));
        self.block_mut(block).conts.push(id);
        id
    }

    /// Move a continuation, with everything below it, to the end of
    /// `target`'s continuation list. Its id stays valid.
    pub fn move_continuation(&mut self, id: ContId, target: BlockId) {
        let old = self.cont_node(id).parent;
        self.block_mut(old).conts.retain(|&c| c != id);
        if let Some(node) = self.conts.get_mut(id.index()).and_then(Option::as_mut) {
            node.parent = target;
        }
        self.block_mut(target).conts.push(id);
    }

    /// Unlink a continuation from its parent, leaving its child blocks
    /// allocated. Returns the continuation and its former position in the
    /// parent's continuation list.
    fn detach(&mut self, id: ContId) -> (Continuation, usize) {
        let node = self
            .conts
            .get_mut(id.index())
            .and_then(Option::take)
            .unwrap_or_else(|| panic!("dangling continuation id {id}"));
        let parent = self.block_mut(node.parent);
        let pos = parent.conts.iter().position(|&c| c == id).unwrap_or(parent.conts.len());
        if pos < parent.conts.len() {
            parent.conts.remove(pos);
        }
        (node.cont, pos)
    }

    /// Remove a continuation and free every block below it.
    pub fn remove_continuation(&mut self, id: ContId) -> Continuation {
        let (cont, _) = self.detach(id);
        for child in cont.blocks() {
            self.free_block(child);
        }
        cont
    }

    /// Free a block and everything below it.
    pub fn free_block(&mut self, id: BlockId) {
        let Some(block) = self.blocks.get_mut(id.index()).and_then(Option::take) else {
            return;
        };
        for c in block.conts {
            if let Some(node) = self.conts.get_mut(c.index()).and_then(Option::take) {
                for child in node.cont.blocks() {
                    self.free_block(child);
                }
            }
        }
    }

    fn take_block(&mut self, id: BlockId) -> Block {
        self.blocks
            .get_mut(id.index())
            .and_then(Option::take)
            .unwrap_or_else(|| panic!("dangling block id {id}"))
    }

    /// Replace a continuation by the path it provably takes.
    ///
    /// The chosen block (if any) is renamed with the prediction's bindings
    /// and spliced into the parent where the continuation was; every other
    /// child is freed.
    pub fn inline_continuation(&mut self, id: ContId, prediction: &Prediction) {
        let parent = self.cont_node(id).parent;
        let (cont, pos) = self.detach(id);
        for child in cont.blocks() {
            if Some(child) != prediction.block {
                self.free_block(child);
            }
        }
        if let Some(chosen) = prediction.block {
            self.rename_vars(chosen, &prediction.renames, RenameMode::Replace);
            self.splice(parent, chosen, false, pos);
        }
    }

    /// Merge `second` into `first`.
    ///
    /// The caller has checked [`Continuation::fusable_with`]. Bound
    /// variables of `second` are renamed onto `first`'s, then each child
    /// block of `second` is appended to the corresponding block of
    /// `first`.
    pub fn fuse_continuations(&mut self, first: ContId, second: ContId) {
        let renames = self.cont(first).fusion_renames(self.cont(second));
        let (other, _) = self.detach(second);

        let mut pairs: Vec<(BlockId, BlockId)> = Vec::new();
        let mut adopted = Vec::new();
        let mut orphans = Vec::new();
        match (self.cont_mut(first), other) {
            (Continuation::If(a), Continuation::If(b)) => {
                pairs.push((a.then_block, b.then_block));
                match (a.else_block, b.else_block) {
                    (Some(x), Some(y)) => pairs.push((x, y)),
                    (None, Some(y)) => {
                        a.else_block = Some(y);
                        adopted.push(y);
                    }
                    (_, None) => {}
                }
            }
            (Continuation::Switch(a), Continuation::Switch(b)) => {
                pairs.extend(a.cases.iter().copied().zip(b.cases.iter().copied()));
                if let (Some(x), Some(y)) = (a.default, b.default) {
                    pairs.push((x, y));
                }
            }
            (Continuation::RangeLoop(a), Continuation::RangeLoop(b)) => {
                pairs.push((a.body, b.body));
                a.refcounts.merge(b.refcounts);
                extend_unique(&mut a.passed_in, b.passed_in);
                extend_unique(&mut a.keep_open, b.keep_open);
            }
            (Continuation::ForeachLoop(a), Continuation::ForeachLoop(b)) => {
                pairs.push((a.body, b.body));
                a.refcounts.merge(b.refcounts);
                extend_unique(&mut a.passed_in, b.passed_in);
                extend_unique(&mut a.keep_open, b.keep_open);
            }
            (Continuation::Wait(a), Continuation::Wait(b)) => {
                pairs.push((a.body, b.body));
                extend_unique(&mut a.passed_in, b.passed_in);
                extend_unique(&mut a.keep_open, b.keep_open);
            }
            (_, other) => orphans.extend(other.blocks()),
        }
        for y in adopted {
            self.block_mut(y).parent = Some(first);
            self.rename_vars(y, &renames, RenameMode::Replace);
        }
        for orphan in orphans {
            self.free_block(orphan);
        }
        for (into, from) in pairs {
            self.rename_vars(from, &renames, RenameMode::Replace);
            self.insert_inline(into, from, false);
        }
    }

    // ── Splicing and cloning ────────────────────────────────────────

    /// Move `src`'s content into `target` and free `src`.
    ///
    /// Declarations already present in `target`, and global constants,
    /// are not re-declared. Instructions go before (`at_top`) or after
    /// `target`'s own; continuations and cleanups are appended.
    pub fn insert_inline(&mut self, target: BlockId, src: BlockId, at_top: bool) {
        let pos = if at_top {
            0
        } else {
            self.block(target).conts.len()
        };
        self.splice(target, src, at_top, pos);
    }

    fn splice(&mut self, target: BlockId, src: BlockId, at_top: bool, cont_pos: usize) {
        let src_block = self.take_block(src);
        for &c in &src_block.conts {
            if let Some(node) = self.conts.get_mut(c.index()).and_then(Option::as_mut) {
                node.parent = target;
            }
        }
        let t = self.block_mut(target);
        for var in src_block.vars {
            if var.storage == Storage::GlobalConst || t.declares(&var.name) {
                continue;
            }
            t.vars.push(var);
        }
        if at_top {
            t.instrs.splice(0..0, src_block.instrs);
        } else {
            t.instrs.extend(src_block.instrs);
        }
        let cont_pos = cont_pos.min(t.conts.len());
        t.conts.splice(cont_pos..cont_pos, src_block.conts);
        t.cleanups.extend(src_block.cleanups);
    }

    /// Deep-copy the subtree rooted at `src` into fresh arena slots.
    ///
    /// The copy is detached: its parent link is `None` until it is
    /// attached to a continuation.
    pub fn clone_block(&mut self, src: BlockId) -> BlockId {
        let mut block = self.block(src).clone();
        block.parent = None;
        let conts = mem::take(&mut block.conts);
        let id = BlockId::new(next_id(self.blocks.len()));
        self.blocks.push(Some(block));
        for c in conts {
            let mut cont = self.cont(c).clone();
            let copies: Vec<BlockId> = cont
                .blocks()
                .into_iter()
                .map(|child| self.clone_block(child))
                .collect();
            let mut copies = copies.into_iter();
            cont.for_each_block_mut(|b| {
                if let Some(copy) = copies.next() {
                    *b = copy;
                }
            });
            self.add_continuation(id, cont);
        }
        id
    }

    // ── Renaming ────────────────────────────────────────────────────

    /// Substitute variables throughout the subtree rooted at `block`.
    ///
    /// In [`RenameMode::Replace`], declarations in `block` itself are
    /// renamed, and a declaration renamed to a literal is dropped. Nested
    /// blocks and continuations that re-bind a renamed name shadow it:
    /// the substitution is suppressed inside them.
    pub fn rename_vars(&mut self, block: BlockId, renames: &Renames, mode: RenameMode) -> bool {
        self.rename_block(block, renames, mode, true)
    }

    fn rename_block(&mut self, id: BlockId, renames: &Renames, mode: RenameMode, root: bool) -> bool {
        if renames.is_empty() {
            return false;
        }
        let shadowed: Vec<Name> = if root {
            Vec::new()
        } else {
            self.block(id)
                .vars
                .iter()
                .filter(|v| renames.contains(&v.name))
                .map(|v| v.name.clone())
                .collect()
        };
        let scoped;
        let renames = if shadowed.is_empty() {
            renames
        } else {
            scoped = renames.without(&shadowed);
            &scoped
        };

        let mut changed = false;
        let block = self.block_mut(id);
        if root && mode == RenameMode::Replace {
            let before = block.vars.len();
            block.vars.retain(|v| !matches!(renames.get(&v.name), Some(Arg::Lit(_))));
            changed |= block.vars.len() != before;
            for v in &mut block.vars {
                changed |= renames.apply_var(v);
            }
        }
        for instr in &mut block.instrs {
            changed |= instr.rename_vars(renames, mode);
        }
        for cleanup in &mut block.cleanups {
            changed |= renames.apply_var(&mut cleanup.var);
            changed |= cleanup.action.rename_vars(renames, mode);
        }

        let conts = block.conts.clone();
        for c in conts {
            changed |= self.cont_mut(c).rename_vars(renames);
            let cont = self.cont(c);
            let bound: Vec<Name> = cont
                .defined_vars()
                .iter()
                .filter(|v| renames.contains(&v.name))
                .map(|v| v.name.clone())
                .collect();
            let children = cont.blocks();
            let inner;
            let inner_renames = if bound.is_empty() {
                renames
            } else {
                inner = renames.without(&bound);
                &inner
            };
            for child in children {
                changed |= self.rename_block(child, inner_renames, mode, false);
            }
        }
        changed
    }

    // ── Removal ─────────────────────────────────────────────────────

    /// Remove variables declared in `block`, with every instruction that
    /// only writes them and every cleanup tied to them.
    ///
    /// Returns the number of instructions removed. Fails without changing
    /// anything if a variable is still read, is written by a side-effecting
    /// instruction, is written together with a variable not being removed,
    /// or is required by a continuation.
    pub fn remove_vars(&mut self, block: BlockId, names: &FxHashSet<Name>) -> IcResult<usize> {
        if names.is_empty() {
            return Ok(0);
        }
        self.check_removal(block, names, true)?;
        let removed = self.remove_writers(block, names, true);
        let b = self.block_mut(block);
        b.vars.retain(|v| !names.contains(&v.name));
        b.cleanups.retain(|c| !names.contains(&c.var.name));
        for id in self.subtree(block) {
            for c in self.block(id).conts.clone() {
                self.cont_mut(c).forget_vars(names);
            }
        }
        Ok(removed)
    }

    /// Names still in scope below `block` after its own re-declarations.
    fn unshadowed(&self, block: BlockId, names: &FxHashSet<Name>, root: bool) -> FxHashSet<Name> {
        if root {
            return names.clone();
        }
        let b = self.block(block);
        names
            .iter()
            .filter(|n| !b.declares(n))
            .cloned()
            .collect()
    }

    fn check_removal(&self, block: BlockId, names: &FxHashSet<Name>, root: bool) -> IcResult<()> {
        let names = self.unshadowed(block, names, root);
        if names.is_empty() {
            return Ok(());
        }
        let b = self.block(block);
        for instr in &b.instrs {
            let outs = instr.outputs();
            let hit = outs.iter().filter(|o| names.contains(&o.name)).count();
            let removable = hit > 0 && hit == outs.len() && !instr.has_side_effects();
            if hit > 0 && hit < outs.len() {
                return Err(IcError::PartialOutputRemoval {
                    instr: instr.to_string(),
                });
            }
            if hit > 0 && instr.has_side_effects() {
                return Err(IcError::RequiredVarRemoval {
                    var: outs
                        .iter()
                        .find(|o| names.contains(&o.name))
                        .map(|o| o.name.to_string())
                        .unwrap_or_default(),
                    user: instr.to_string(),
                });
            }
            if !removable {
                if let Some(read) = instr.input_vars().into_iter().find(|v| names.contains(&v.name)) {
                    return Err(IcError::RequiredVarRemoval {
                        var: read.name.to_string(),
                        user: instr.to_string(),
                    });
                }
            }
        }
        for cleanup in b.cleanups.iter().filter(|c| !names.contains(&c.var.name)) {
            if let Some(read) = cleanup
                .action
                .input_vars()
                .into_iter()
                .find(|v| names.contains(&v.name))
            {
                return Err(IcError::RequiredVarRemoval {
                    var: read.name.to_string(),
                    user: cleanup.action.to_string(),
                });
            }
        }
        for &c in &b.conts {
            let cont = self.cont(c);
            if let Some(v) = cont.required_vars().into_iter().find(|v| names.contains(&v.name)) {
                return Err(IcError::RequiredVarRemoval {
                    var: v.name.to_string(),
                    user: format!("{} continuation", cont.kind_name()),
                });
            }
            let bound: FxHashSet<&Name> = cont.defined_vars().iter().map(|v| &v.name).collect();
            let inner: FxHashSet<Name> = names.iter().filter(|n| !bound.contains(n)).cloned().collect();
            for child in cont.blocks() {
                self.check_removal(child, &inner, false)?;
            }
        }
        Ok(())
    }

    fn remove_writers(&mut self, block: BlockId, names: &FxHashSet<Name>, root: bool) -> usize {
        let names = self.unshadowed(block, names, root);
        if names.is_empty() {
            return 0;
        }
        let b = self.block_mut(block);
        let before = b.instrs.len();
        b.instrs.retain(|instr| {
            let outs = instr.outputs();
            outs.is_empty() || !outs.iter().all(|o| names.contains(&o.name))
        });
        let mut removed = before - b.instrs.len();
        for c in b.conts.clone() {
            let cont = self.cont(c);
            let bound: FxHashSet<&Name> = cont.defined_vars().iter().map(|v| &v.name).collect();
            let inner: FxHashSet<Name> = names.iter().filter(|n| !bound.contains(n)).cloned().collect();
            for child in cont.blocks() {
                removed += self.remove_writers(child, &inner, false);
            }
        }
        removed
    }
}

fn extend_unique(into: &mut Vec<Var>, from: Vec<Var>) {
    for v in from {
        if !into.iter().any(|x| x.name == v.name) {
            into.push(v);
        }
    }
}
