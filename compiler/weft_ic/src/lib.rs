//! Intermediate code for the Weft compiler.
//!
//! This crate sits between front-end lowering and code generation. It
//! provides:
//!
//! - **Tree** ([`Program`], [`Function`], [`Block`]): an arena of blocks and
//!   continuations addressed by [`BlockId`] / [`ContId`], with structural
//!   edits (splice, fuse, clone, rename, remove) and a printed form.
//!
//! - **Instructions** ([`Instr`]) and **continuations**
//!   ([`Continuation`]): closed catalogs whose variants report operands,
//!   side effects, refcount contracts, computed values and closedness
//!   facts.
//!
//! - **Reference counting** ([`refcount`]): the two-counter protocol and an
//!   [`RcLedger`] used to check that passes conserve deltas.
//!
//! - **Optimizer** ([`opt`]): constant folding, loop unrolling, forward
//!   dataflow (value numbering, make-immediate, wait elimination), fusion,
//!   refcount elimination, dead-code elimination and validation, driven by
//!   [`optimize`] under an [`OptConfig`].
//!
//! - **Generation contract** ([`codegen`]): the [`Backend`] trait and the
//!   [`generate`] walk.
//!
//! # Execution Model
//!
//! Every non-value variable is a single-assignment future. Instructions in
//! a block are issued in order; a block's continuations start once its
//! instructions have been issued; cleanups run when both are done. A
//! continuation may run its children as an independent task, in which
//! case it lists the variables passed in and kept open for them.
//!
//! # Crate Dependencies
//!
//! `weft_ic` depends only on `weft_ir` for names, types, variables,
//! operands and builtin operators.

pub mod codegen;
pub mod config;
pub mod cont;
pub mod error;
pub mod instr;
pub mod opt;
pub mod refcount;
pub mod rename;
pub mod tree;

#[cfg(test)]
mod test_helpers;

use std::sync::Once;

pub use codegen::{generate, Backend};
pub use config::{OptConfig, UnrollConfig};
pub use cont::{Continuation, Prediction, WaitMode};
pub use error::{IcError, IcResult};
pub use instr::{CallProps, ClosedSet, Instr, TaskMode, UpdateMode};
pub use opt::{optimize, OptReport};
pub use refcount::{RcLedger, RefCountType};
pub use rename::{RenameMode, Renames};
pub use tree::{Block, BlockId, ContId, ForeignFunction, Function, Program};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Enable with `RUST_LOG=weft_ic=debug` or
/// `RUST_LOG=weft_ic=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}
