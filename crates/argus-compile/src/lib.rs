//! Encoder and expression compiler.
//!
//! The [`enc::EncodingMgr`] translates types into decision-diagram
//! vectors and maps solver assignments back to expression-level values;
//! the [`compiler::Compiler`] lowers typed expressions into
//! [`unit::CompilationUnit`]s, memoized per (context, expression, time).
//! Operators with no direct diagram lowering (multiplication, division,
//! shifts, algebraic comparators, complement/negation) are deferred as
//! micro descriptors; conditional selections over algebraic values go
//! through multiplexer descriptors with one-hot priority activation.

pub mod compiler;
pub mod enc;
pub mod unit;

pub use compiler::Compiler;
pub use enc::{Encoding, EncodingId, EncodingKind, EncodingMgr};
pub use unit::{CompilationUnit, MicroDescriptor, MicroOp, MuxDescriptor, MuxMap, OpTriple};
