//! Named, typed storage.

use std::fmt;

use crate::{Name, PrimType, Type};

/// Where a variable's storage lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Storage {
    /// Remote datum allocated when the enclosing block starts.
    Stack,
    /// Handle to a datum allocated elsewhere (container member, deref).
    Alias,
    /// Local value held by the running task.
    Local,
    /// Compiler-introduced temporary datum.
    Temp,
    /// Program-wide constant.
    GlobalConst,
}

/// How a variable came into existence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DefKind {
    InArg,
    OutArg,
    Local,
    /// Local introduced by an optimizer or lowering step.
    LocalCompiler,
    GlobalConst,
}

/// A variable: name, type, storage class, definition kind and an optional
/// file mapping (the name of a string future holding the mapped path).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Var {
    pub name: Name,
    pub ty: Type,
    pub storage: Storage,
    pub def: DefKind,
    pub mapping: Option<Name>,
}

impl Var {
    pub fn new(name: impl Into<Name>, ty: Type, storage: Storage, def: DefKind) -> Self {
        Var {
            name: name.into(),
            ty,
            storage,
            def,
            mapping: None,
        }
    }

    /// A user-level scalar future with stack storage.
    pub fn future(name: impl Into<Name>, prim: PrimType) -> Self {
        Var::new(name, Type::Future(prim), Storage::Stack, DefKind::Local)
    }

    /// A local value.
    pub fn value(name: impl Into<Name>, prim: PrimType) -> Self {
        Var::new(name, Type::Value(prim), Storage::Local, DefKind::Local)
    }

    /// An alias of a datum owned elsewhere.
    pub fn alias(name: impl Into<Name>, ty: Type) -> Self {
        Var::new(name, ty, Storage::Alias, DefKind::Local)
    }

    /// A compiler temporary of type `ty`.
    ///
    /// Value types get local storage; everything else gets temporary
    /// storage.
    pub fn temp(name: impl Into<Name>, ty: Type) -> Self {
        let storage = if ty.is_value() {
            Storage::Local
        } else {
            Storage::Temp
        };
        Var::new(name, ty, storage, DefKind::LocalCompiler)
    }

    #[must_use]
    pub fn with_mapping(mut self, mapping: impl Into<Name>) -> Self {
        self.mapping = Some(mapping.into());
        self
    }

    #[must_use]
    pub fn with_def(mut self, def: DefKind) -> Self {
        self.def = def;
        self
    }

    /// Same variable under a different name.
    #[must_use]
    pub fn renamed(&self, name: Name) -> Self {
        Var {
            name,
            ..self.clone()
        }
    }

    /// Whether this variable carries read/write reference counts.
    #[inline]
    pub fn is_refcounted(&self) -> bool {
        self.ty.is_refcounted()
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    #[inline]
    pub fn is_alias(&self) -> bool {
        self.storage == Storage::Alias
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())
    }
}

#[cfg(test)]
mod tests;
