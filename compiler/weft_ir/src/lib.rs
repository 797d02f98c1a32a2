//! Weft IR - value model for the intermediate code.
//!
//! This crate contains the leaf data structures every intermediate-code
//! pass works with:
//! - [`Name`] for variable and function identifiers
//! - [`Type`] for futures, local values, containers, references and
//!   updateable cells
//! - [`Var`] for typed, named storage with a storage class and definition
//!   kind
//! - [`Arg`] and [`Literal`] for operands
//! - [`BuiltinOp`] for the builtin operator set and its constant evaluation
//!
//! # Design Philosophy
//!
//! - **Futures by default**: a variable of a non-value type is a
//!   single-assignment future whose readers suspend until it is closed.
//! - **Values are local**: value-typed variables never carry reference
//!   counts and never need a wait.
//! - **Hashable operands**: floats are stored as `u64` bits so that
//!   [`Arg`] can be a map key in value numbering.

mod arg;
mod builtin;
mod name;
mod types;
mod var;

pub use arg::{Arg, Literal};
pub use builtin::BuiltinOp;
pub use name::Name;
pub use types::{PrimType, StructType, Type};
pub use var::{DefKind, Storage, Var};
