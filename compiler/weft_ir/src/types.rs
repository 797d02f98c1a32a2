//! Types of intermediate-code variables.
//!
//! Every type is one of: a scalar future, a local value, a container
//! future (array, bag, struct), a reference to another type, or an
//! updateable cell. Only value types escape reference counting.

use std::fmt;
use std::sync::Arc;

use crate::Name;

/// Primitive element kinds shared by futures, values and updateables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimType {
    Int,
    Float,
    String,
    Bool,
    Blob,
    Void,
    File,
}

impl PrimType {
    /// Short tag used in generated names (`i`, `f`, `s`, `b`, ...).
    pub const fn tag(self) -> &'static str {
        match self {
            PrimType::Int => "i",
            PrimType::Float => "f",
            PrimType::String => "s",
            PrimType::Bool => "b",
            PrimType::Blob => "blob",
            PrimType::Void => "v",
            PrimType::File => "file",
        }
    }

    /// Whether values of this kind can be written as a literal operand.
    pub const fn has_literals(self) -> bool {
        matches!(
            self,
            PrimType::Int | PrimType::Float | PrimType::String | PrimType::Bool
        )
    }
}

impl fmt::Display for PrimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PrimType::Int => "int",
            PrimType::Float => "float",
            PrimType::String => "string",
            PrimType::Bool => "boolean",
            PrimType::Blob => "blob",
            PrimType::Void => "void",
            PrimType::File => "file",
        })
    }
}

/// A named struct with ordered, typed fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructType {
    pub name: Name,
    pub fields: Vec<(Name, Type)>,
}

/// Type of a variable in the intermediate code.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// Single-assignment scalar future.
    Future(PrimType),
    /// Local value held by the running task. Never reference counted.
    Value(PrimType),
    /// Associative array future, closed once all writers are done.
    Array { key: PrimType, member: Box<Type> },
    /// Unordered multiset future.
    Bag(Box<Type>),
    /// Struct future; fields are initialized individually.
    Struct(Arc<StructType>),
    /// Future holding a reference to a datum of the inner type.
    Ref(Box<Type>),
    /// Mutable cell with monotonic update operations.
    Updateable(PrimType),
}

impl Type {
    /// Reference to `inner`.
    pub fn ref_to(inner: Type) -> Self {
        Type::Ref(Box::new(inner))
    }

    /// Array keyed by `key` holding `member`.
    pub fn array(key: PrimType, member: Type) -> Self {
        Type::Array {
            key,
            member: Box::new(member),
        }
    }

    /// Bag of `member`.
    pub fn bag(member: Type) -> Self {
        Type::Bag(Box::new(member))
    }

    /// Struct named `name` with the given fields, in order.
    pub fn structure(name: impl Into<Name>, fields: Vec<(Name, Type)>) -> Self {
        Type::Struct(Arc::new(StructType {
            name: name.into(),
            fields,
        }))
    }

    #[inline]
    pub fn is_value(&self) -> bool {
        matches!(self, Type::Value(_))
    }

    #[inline]
    pub fn is_scalar_future(&self) -> bool {
        matches!(self, Type::Future(_))
    }

    #[inline]
    pub fn is_ref(&self) -> bool {
        matches!(self, Type::Ref(_))
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }

    #[inline]
    pub fn is_bag(&self) -> bool {
        matches!(self, Type::Bag(_))
    }

    #[inline]
    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }

    #[inline]
    pub fn is_updateable(&self) -> bool {
        matches!(self, Type::Updateable(_))
    }

    /// Whether this type carries read/write reference counts.
    ///
    /// Value types never do; every other kind of storage does.
    #[inline]
    pub fn is_refcounted(&self) -> bool {
        !self.is_value()
    }

    /// Primitive kind of a scalar future, value or updateable.
    pub fn prim(&self) -> Option<PrimType> {
        match self {
            Type::Future(p) | Type::Value(p) | Type::Updateable(p) => Some(*p),
            _ => None,
        }
    }

    /// Target type of a reference.
    pub fn deref(&self) -> Option<&Type> {
        match self {
            Type::Ref(inner) => Some(inner),
            _ => None,
        }
    }

    /// Member type of an array or bag.
    pub fn member(&self) -> Option<&Type> {
        match self {
            Type::Array { member, .. } | Type::Bag(member) => Some(member),
            _ => None,
        }
    }

    /// Key type of an array.
    pub fn array_key(&self) -> Option<PrimType> {
        match self {
            Type::Array { key, .. } => Some(*key),
            _ => None,
        }
    }

    /// Type of a named struct field.
    pub fn field(&self, field: &Name) -> Option<&Type> {
        match self {
            Type::Struct(st) => st
                .fields
                .iter()
                .find(|(name, _)| name == field)
                .map(|(_, ty)| ty),
            _ => None,
        }
    }

    /// The local value type obtained by fetching this type, if it has one.
    ///
    /// Scalar futures and updateables fetch to values. References fetch
    /// to their target, which is not a value type.
    pub fn fetched(&self) -> Option<Type> {
        match self {
            Type::Future(p) | Type::Updateable(p) => Some(Type::Value(*p)),
            Type::Ref(inner) => Some((**inner).clone()),
            _ => None,
        }
    }

    /// Whether `self` is a reference whose target is exactly `target`.
    pub fn is_ref_to(&self, target: &Type) -> bool {
        self.deref() == Some(target)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Future(p) => write!(f, "{p}"),
            Type::Value(p) => write!(f, "${p}"),
            Type::Array { key, member } => write!(f, "{member}[{key}]"),
            Type::Bag(member) => write!(f, "bag<{member}>"),
            Type::Struct(st) => write!(f, "struct {}", st.name),
            Type::Ref(inner) => write!(f, "*({inner})"),
            Type::Updateable(p) => write!(f, "updateable_{p}"),
        }
    }
}

#[cfg(test)]
mod tests;
