//! Operands: literal constants or variable references.

use std::fmt;

use crate::{Name, PrimType, Type, Var};

/// Literal constant.
///
/// Floats are stored as `u64` bits so literals are `Eq + Hash`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Literal {
    Int(i64),
    Float(u64),
    Bool(bool),
    Str(Name),
}

impl Literal {
    pub fn float(f: f64) -> Self {
        Literal::Float(f.to_bits())
    }

    pub fn str(s: impl Into<Name>) -> Self {
        Literal::Str(s.into())
    }

    pub fn prim(&self) -> PrimType {
        match self {
            Literal::Int(_) => PrimType::Int,
            Literal::Float(_) => PrimType::Float,
            Literal::Bool(_) => PrimType::Bool,
            Literal::Str(_) => PrimType::String,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Literal::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Literal::Float(bits) => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(bits) => write!(f, "{:?}", f64::from_bits(*bits)),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Str(s) => write!(f, "{:?}", s.as_str()),
        }
    }
}

/// An instruction or continuation operand.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Arg {
    Lit(Literal),
    Var(Var),
}

impl Arg {
    pub fn int(i: i64) -> Self {
        Arg::Lit(Literal::Int(i))
    }

    pub fn float(f: f64) -> Self {
        Arg::Lit(Literal::float(f))
    }

    pub fn bool(b: bool) -> Self {
        Arg::Lit(Literal::Bool(b))
    }

    pub fn str(s: impl Into<Name>) -> Self {
        Arg::Lit(Literal::str(s))
    }

    #[inline]
    pub fn is_const(&self) -> bool {
        matches!(self, Arg::Lit(_))
    }

    #[inline]
    pub fn is_var(&self) -> bool {
        matches!(self, Arg::Var(_))
    }

    pub fn as_var(&self) -> Option<&Var> {
        match self {
            Arg::Var(v) => Some(v),
            Arg::Lit(_) => None,
        }
    }

    pub fn as_lit(&self) -> Option<&Literal> {
        match self {
            Arg::Lit(l) => Some(l),
            Arg::Var(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        self.as_lit().and_then(Literal::as_int)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_lit().and_then(Literal::as_bool)
    }

    /// Name of the referenced variable, if this is a variable operand.
    pub fn var_name(&self) -> Option<&Name> {
        self.as_var().map(|v| &v.name)
    }

    /// Type of the operand. Literals are local values.
    pub fn ty(&self) -> Type {
        match self {
            Arg::Lit(l) => Type::Value(l.prim()),
            Arg::Var(v) => v.ty.clone(),
        }
    }

    /// Whether reading this operand never requires a wait.
    pub fn is_immediate(&self) -> bool {
        match self {
            Arg::Lit(_) => true,
            Arg::Var(v) => v.ty.is_value(),
        }
    }
}

impl From<Var> for Arg {
    fn from(v: Var) -> Self {
        Arg::Var(v)
    }
}

impl From<&Var> for Arg {
    fn from(v: &Var) -> Self {
        Arg::Var(v.clone())
    }
}

impl From<Literal> for Arg {
    fn from(l: Literal) -> Self {
        Arg::Lit(l)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Lit(l) => write!(f, "{l}"),
            Arg::Var(v) => write!(f, "{v}"),
        }
    }
}
