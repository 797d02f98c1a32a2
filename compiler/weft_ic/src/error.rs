//! Internal consistency errors.
//!
//! Every variant indicates a bug in an earlier pass or in the lowering that
//! built the tree: user programs cannot trigger them. Messages carry the
//! printed form of the offending instruction or continuation.

use thiserror::Error;

/// A structural invariant of the intermediate code was violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IcError {
    /// A variable still needed by an instruction or continuation was
    /// requested for removal.
    #[error("cannot remove variable `{var}`: still required by {user}")]
    RequiredVarRemoval { var: String, user: String },

    /// Only some outputs of an instruction were requested for removal.
    #[error("cannot remove instruction `{instr}`: not all outputs are being removed")]
    PartialOutputRemoval { instr: String },

    /// `make_immediate` was applied to an opcode without an immediate form.
    #[error("instruction `{instr}` has no immediate form")]
    NoImmediateForm { instr: String },

    /// An operand does not match the instruction's fixed contract.
    #[error("operand mismatch in `{instr}`: {detail}")]
    OperandMismatch { instr: String, detail: String },

    /// A block id does not refer to a live block of the function.
    #[error("dangling block id {0}")]
    UnknownBlock(u32),

    /// A continuation id does not refer to a live continuation.
    #[error("dangling continuation id {0}")]
    UnknownContinuation(u32),

    /// Structural validation failed.
    #[error("invalid intermediate code in `{function}`: {detail}")]
    Invalid { function: String, detail: String },
}

/// Result alias used by every fallible tree operation and pass.
pub type IcResult<T> = Result<T, IcError>;
