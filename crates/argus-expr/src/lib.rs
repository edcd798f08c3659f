//! Expression DAG, type system, symbols and model values for argus.
//!
//! This crate holds everything the verification pipeline treats as
//! write-once input: the hash-consed expression pool, the interned type
//! descriptors, the symbol table and the module-structured model. All of
//! these are plain values constructed once by the driver (usually through
//! [`model::ModelBuilder`] or the `argus-parser` crate) and then shared
//! read-only with the compiler and the verification algorithms.
//!
//! Expressions are stored in a directed acyclic graph for sharing; a node
//! is identified by its [`ExprId`], and two structurally equal expressions
//! always receive the same id, so identity comparison is equality.

pub mod errors;
pub mod model;
pub mod pool;
pub mod printer;
pub mod symbol;
pub mod typecheck;
pub mod types;
pub mod walker;

pub use errors::ModelError;
pub use pool::{Atom, BinOp, ExprId, ExprNode, ExprPool};
pub use symbol::{Symbol, SymbolTable};
pub use types::{Type, TypeId, TypeStore, NIBBLE_SIZE};

/// Scalar value domain of the checker: enough bits for any supported
/// algebraic width (16 nibbles).
pub type Value = i64;

/// Time step index. Forward unrolling counts up from 0, backward
/// unrolling counts down from [`BACKWARD_ANCHOR`]; the two never meet.
pub type Step = u64;

/// Anchor time index for backward unrolling.
pub const BACKWARD_ANCHOR: Step = Step::MAX;

/// Fully-qualified timed expression: the universal memoization key of the
/// pipeline (encoder, compiler, witness evaluator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimedExpr {
    /// Context the expression is interpreted in (a dotted instance path)
    pub ctx: ExprId,
    /// The expression itself
    pub expr: ExprId,
    /// Time step
    pub time: Step,
}

impl TimedExpr {
    /// Create a new fully-qualified timed expression
    pub fn new(ctx: ExprId, expr: ExprId, time: Step) -> Self {
        Self { ctx, expr, time }
    }
}

/// A concrete value of a scalar-typed expression, as recovered from a
/// solver model or computed by the witness evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarValue {
    /// Boolean value
    Bool(bool),
    /// Algebraic or finite-range integer value
    Int(Value),
    /// Enumeration literal
    Literal(Atom),
}

impl ScalarValue {
    /// Render the value; enumeration literals need the pool for their name
    pub fn display<'a>(&'a self, pool: &'a ExprPool) -> ScalarValueDisplay<'a> {
        ScalarValueDisplay { value: self, pool }
    }
}

/// Display adapter for [`ScalarValue`]
pub struct ScalarValueDisplay<'a> {
    value: &'a ScalarValue,
    pool: &'a ExprPool,
}

impl std::fmt::Display for ScalarValueDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.value {
            ScalarValue::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            ScalarValue::Int(v) => write!(f, "{v}"),
            ScalarValue::Literal(a) => write!(f, "{}", self.pool.atom_name(*a)),
        }
    }
}
