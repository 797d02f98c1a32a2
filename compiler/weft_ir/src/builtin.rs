//! Builtin operators and their constant evaluation.
//!
//! The same operator set is used for local (value) and async (future)
//! builtin instructions. Constant evaluation is conservative: any operand
//! mismatch, overflow or division by zero yields `None` and the
//! instruction is left for the runtime.

use std::fmt;

use crate::{Literal, Name, PrimType};

/// A builtin operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuiltinOp {
    // Integer arithmetic
    PlusInt,
    MinusInt,
    MultInt,
    DivInt,
    ModInt,
    NegateInt,
    MaxInt,
    MinInt,
    AbsInt,

    // Float arithmetic
    PlusFloat,
    MinusFloat,
    MultFloat,
    DivFloat,
    NegateFloat,
    MaxFloat,
    MinFloat,

    // Comparison
    EqInt,
    NeqInt,
    GtInt,
    GteInt,
    LtInt,
    LteInt,
    EqFloat,
    NeqFloat,
    GtFloat,
    GteFloat,
    LtFloat,
    LteFloat,
    EqString,
    NeqString,
    EqBool,
    NeqBool,

    // Logic
    Not,
    And,
    Or,
    Xor,

    // Strings and conversions
    Strcat,
    IntToStr,
    FloatToStr,
    IntToFloat,
    ParseInt,
    ParseFloat,

    // Copies
    CopyInt,
    CopyFloat,
    CopyBool,
    CopyString,
    CopyBlob,
    CopyVoid,

    // Assertions: (condition, message) and (lhs, rhs, message)
    Assert,
    AssertEq,
}

impl BuiltinOp {
    /// Lower-case mnemonic used in printed intermediate code.
    pub const fn name(self) -> &'static str {
        match self {
            Self::PlusInt => "plus_int",
            Self::MinusInt => "minus_int",
            Self::MultInt => "mult_int",
            Self::DivInt => "div_int",
            Self::ModInt => "mod_int",
            Self::NegateInt => "negate_int",
            Self::MaxInt => "max_int",
            Self::MinInt => "min_int",
            Self::AbsInt => "abs_int",
            Self::PlusFloat => "plus_float",
            Self::MinusFloat => "minus_float",
            Self::MultFloat => "mult_float",
            Self::DivFloat => "div_float",
            Self::NegateFloat => "negate_float",
            Self::MaxFloat => "max_float",
            Self::MinFloat => "min_float",
            Self::EqInt => "eq_int",
            Self::NeqInt => "neq_int",
            Self::GtInt => "gt_int",
            Self::GteInt => "gte_int",
            Self::LtInt => "lt_int",
            Self::LteInt => "lte_int",
            Self::EqFloat => "eq_float",
            Self::NeqFloat => "neq_float",
            Self::GtFloat => "gt_float",
            Self::GteFloat => "gte_float",
            Self::LtFloat => "lt_float",
            Self::LteFloat => "lte_float",
            Self::EqString => "eq_string",
            Self::NeqString => "neq_string",
            Self::EqBool => "eq_bool",
            Self::NeqBool => "neq_bool",
            Self::Not => "not",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Strcat => "strcat",
            Self::IntToStr => "inttostr",
            Self::FloatToStr => "floattostr",
            Self::IntToFloat => "inttofloat",
            Self::ParseInt => "parse_int",
            Self::ParseFloat => "parse_float",
            Self::CopyInt => "copy_int",
            Self::CopyFloat => "copy_float",
            Self::CopyBool => "copy_bool",
            Self::CopyString => "copy_string",
            Self::CopyBlob => "copy_blob",
            Self::CopyVoid => "copy_void",
            Self::Assert => "assert",
            Self::AssertEq => "assert_eq",
        }
    }

    /// Primitive kind of the result, `None` for assertions.
    pub const fn result_type(self) -> Option<PrimType> {
        match self {
            Self::PlusInt
            | Self::MinusInt
            | Self::MultInt
            | Self::DivInt
            | Self::ModInt
            | Self::NegateInt
            | Self::MaxInt
            | Self::MinInt
            | Self::AbsInt
            | Self::ParseInt
            | Self::CopyInt => Some(PrimType::Int),
            Self::PlusFloat
            | Self::MinusFloat
            | Self::MultFloat
            | Self::DivFloat
            | Self::NegateFloat
            | Self::MaxFloat
            | Self::MinFloat
            | Self::IntToFloat
            | Self::ParseFloat
            | Self::CopyFloat => Some(PrimType::Float),
            Self::EqInt
            | Self::NeqInt
            | Self::GtInt
            | Self::GteInt
            | Self::LtInt
            | Self::LteInt
            | Self::EqFloat
            | Self::NeqFloat
            | Self::GtFloat
            | Self::GteFloat
            | Self::LtFloat
            | Self::LteFloat
            | Self::EqString
            | Self::NeqString
            | Self::EqBool
            | Self::NeqBool
            | Self::Not
            | Self::And
            | Self::Or
            | Self::Xor
            | Self::CopyBool => Some(PrimType::Bool),
            Self::Strcat | Self::IntToStr | Self::FloatToStr | Self::CopyString => {
                Some(PrimType::String)
            }
            Self::CopyBlob => Some(PrimType::Blob),
            Self::CopyVoid => Some(PrimType::Void),
            Self::Assert | Self::AssertEq => None,
        }
    }

    /// Fixed operand count, or `None` for variadic operators.
    pub const fn arity(self) -> Option<usize> {
        match self {
            Self::Strcat => None,
            Self::NegateInt
            | Self::AbsInt
            | Self::NegateFloat
            | Self::Not
            | Self::IntToStr
            | Self::FloatToStr
            | Self::IntToFloat
            | Self::ParseInt
            | Self::ParseFloat
            | Self::CopyInt
            | Self::CopyFloat
            | Self::CopyBool
            | Self::CopyString
            | Self::CopyBlob
            | Self::CopyVoid => Some(1),
            Self::AssertEq => Some(3),
            _ => Some(2),
        }
    }

    /// Assertions are the only builtins observable beyond their result.
    #[inline]
    pub const fn has_side_effects(self) -> bool {
        self.is_assertion()
    }

    #[inline]
    pub const fn is_assertion(self) -> bool {
        matches!(self, Self::Assert | Self::AssertEq)
    }

    /// Whether operand order is irrelevant to the result.
    pub const fn is_commutative(self) -> bool {
        matches!(
            self,
            Self::PlusInt
                | Self::MultInt
                | Self::MaxInt
                | Self::MinInt
                | Self::PlusFloat
                | Self::MultFloat
                | Self::MaxFloat
                | Self::MinFloat
                | Self::EqInt
                | Self::NeqInt
                | Self::EqFloat
                | Self::NeqFloat
                | Self::EqString
                | Self::NeqString
                | Self::EqBool
                | Self::NeqBool
                | Self::And
                | Self::Or
                | Self::Xor
        )
    }

    /// Whether this is an identity copy of its single operand.
    pub const fn is_copy(self) -> bool {
        matches!(
            self,
            Self::CopyInt
                | Self::CopyFloat
                | Self::CopyBool
                | Self::CopyString
                | Self::CopyBlob
                | Self::CopyVoid
        )
    }

    /// The copy operator for a primitive kind.
    pub const fn copy_for(prim: PrimType) -> Self {
        match prim {
            PrimType::Int => Self::CopyInt,
            PrimType::Float => Self::CopyFloat,
            PrimType::Bool => Self::CopyBool,
            PrimType::String | PrimType::File => Self::CopyString,
            PrimType::Blob => Self::CopyBlob,
            PrimType::Void => Self::CopyVoid,
        }
    }

    /// Evaluate over literal operands.
    ///
    /// Returns `None` for assertions, for operand kind mismatches, and for
    /// anything the runtime must decide (overflow, division by zero,
    /// unparseable strings).
    pub fn eval(self, inputs: &[Literal]) -> Option<Literal> {
        if let Some(n) = self.arity() {
            if inputs.len() != n {
                return None;
            }
        }
        let int = |i: usize| inputs.get(i).and_then(Literal::as_int);
        let float = |i: usize| inputs.get(i).and_then(Literal::as_float);
        let boolean = |i: usize| inputs.get(i).and_then(Literal::as_bool);
        let string = |i: usize| inputs.get(i).and_then(Literal::as_str);

        let lit = match self {
            Self::PlusInt => Literal::Int(int(0)?.checked_add(int(1)?)?),
            Self::MinusInt => Literal::Int(int(0)?.checked_sub(int(1)?)?),
            Self::MultInt => Literal::Int(int(0)?.checked_mul(int(1)?)?),
            Self::DivInt => Literal::Int(int(0)?.checked_div(int(1)?)?),
            Self::ModInt => Literal::Int(int(0)?.checked_rem(int(1)?)?),
            Self::NegateInt => Literal::Int(int(0)?.checked_neg()?),
            Self::MaxInt => Literal::Int(int(0)?.max(int(1)?)),
            Self::MinInt => Literal::Int(int(0)?.min(int(1)?)),
            Self::AbsInt => Literal::Int(int(0)?.checked_abs()?),
            Self::PlusFloat => Literal::float(float(0)? + float(1)?),
            Self::MinusFloat => Literal::float(float(0)? - float(1)?),
            Self::MultFloat => Literal::float(float(0)? * float(1)?),
            Self::DivFloat => Literal::float(float(0)? / float(1)?),
            Self::NegateFloat => Literal::float(-float(0)?),
            Self::MaxFloat => Literal::float(float(0)?.max(float(1)?)),
            Self::MinFloat => Literal::float(float(0)?.min(float(1)?)),
            Self::EqInt => Literal::Bool(int(0)? == int(1)?),
            Self::NeqInt => Literal::Bool(int(0)? != int(1)?),
            Self::GtInt => Literal::Bool(int(0)? > int(1)?),
            Self::GteInt => Literal::Bool(int(0)? >= int(1)?),
            Self::LtInt => Literal::Bool(int(0)? < int(1)?),
            Self::LteInt => Literal::Bool(int(0)? <= int(1)?),
            #[allow(
                clippy::float_cmp,
                reason = "literal equality is exact by definition"
            )]
            Self::EqFloat => Literal::Bool(float(0)? == float(1)?),
            #[allow(
                clippy::float_cmp,
                reason = "literal equality is exact by definition"
            )]
            Self::NeqFloat => Literal::Bool(float(0)? != float(1)?),
            Self::GtFloat => Literal::Bool(float(0)? > float(1)?),
            Self::GteFloat => Literal::Bool(float(0)? >= float(1)?),
            Self::LtFloat => Literal::Bool(float(0)? < float(1)?),
            Self::LteFloat => Literal::Bool(float(0)? <= float(1)?),
            Self::EqString => Literal::Bool(string(0)? == string(1)?),
            Self::NeqString => Literal::Bool(string(0)? != string(1)?),
            Self::EqBool => Literal::Bool(boolean(0)? == boolean(1)?),
            Self::NeqBool => Literal::Bool(boolean(0)? != boolean(1)?),
            Self::Not => Literal::Bool(!boolean(0)?),
            Self::And => Literal::Bool(boolean(0)? && boolean(1)?),
            Self::Or => Literal::Bool(boolean(0)? || boolean(1)?),
            Self::Xor => Literal::Bool(boolean(0)? ^ boolean(1)?),
            Self::Strcat => {
                let mut out = String::new();
                for l in inputs {
                    out.push_str(l.as_str()?);
                }
                Literal::Str(Name::from(out))
            }
            Self::IntToStr => Literal::Str(Name::from(int(0)?.to_string())),
            Self::FloatToStr => Literal::Str(Name::from(format!("{:?}", float(0)?))),
            #[allow(
                clippy::cast_precision_loss,
                reason = "matches the runtime's int-to-float conversion"
            )]
            Self::IntToFloat => Literal::float(int(0)? as f64),
            Self::ParseInt => Literal::Int(string(0)?.trim().parse().ok()?),
            Self::ParseFloat => Literal::float(string(0)?.trim().parse().ok()?),
            Self::CopyInt => Literal::Int(int(0)?),
            Self::CopyFloat => Literal::float(float(0)?),
            Self::CopyBool => Literal::Bool(boolean(0)?),
            Self::CopyString => Literal::Str(Name::new(string(0)?)),
            Self::CopyBlob | Self::CopyVoid | Self::Assert | Self::AssertEq => return None,
        };
        Some(lit)
    }

    /// Decide an assertion over literal operands.
    ///
    /// `Some(true)` if it provably holds, `Some(false)` if it provably
    /// fails, `None` if undecidable or not an assertion.
    pub fn check_assertion(self, inputs: &[Literal]) -> Option<bool> {
        match self {
            Self::Assert => inputs.first().and_then(Literal::as_bool),
            Self::AssertEq => match (inputs.first(), inputs.get(1)) {
                (Some(a), Some(b)) if a.prim() == b.prim() => Some(a == b),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for BuiltinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
