//! Variable substitution maps.

use rustc_hash::FxHashMap;
use weft_ir::{Arg, Name, Var};

/// How a substitution treats binding occurrences.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenameMode {
    /// Rename every occurrence, including declarations and instruction
    /// outputs.
    Replace,
    /// Rename only operands that are read. Declarations and outputs keep
    /// their original names.
    InputsOnly,
}

/// A substitution from variable names to replacement operands.
///
/// A replacement may be a literal; such replacements only apply to slots
/// that accept literals, and a declaration replaced by a literal is
/// dropped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Renames {
    map: FxHashMap<Name, Arg>,
}

impl Renames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-entry substitution.
    pub fn single(from: Name, to: Arg) -> Self {
        let mut renames = Self::new();
        renames.insert(from, to);
        renames
    }

    pub fn insert(&mut self, from: Name, to: Arg) {
        self.map.insert(from, to);
    }

    #[inline]
    pub fn get(&self, name: &Name) -> Option<&Arg> {
        self.map.get(name)
    }

    #[inline]
    pub fn contains(&self, name: &Name) -> bool {
        self.map.contains_key(name)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Copy of this map with the given names removed.
    ///
    /// Used when descending into a scope that re-declares (shadows) some
    /// of the renamed names.
    #[must_use]
    pub fn without<'a>(&self, shadowed: impl IntoIterator<Item = &'a Name>) -> Self {
        let mut map = self.map.clone();
        for name in shadowed {
            map.remove(name);
        }
        Renames { map }
    }

    /// Substitute a variable slot. Literal replacements are ignored.
    pub(crate) fn apply_var(&self, var: &mut Var) -> bool {
        match self.map.get(&var.name) {
            Some(Arg::Var(replacement)) if replacement != var => {
                *var = replacement.clone();
                true
            }
            _ => false,
        }
    }

    /// Substitute an operand slot.
    pub(crate) fn apply_arg(&self, arg: &mut Arg) -> bool {
        let Arg::Var(var) = arg else {
            return false;
        };
        match self.map.get(&var.name) {
            Some(replacement) if replacement != arg => {
                *arg = replacement.clone();
                true
            }
            _ => false,
        }
    }
}
