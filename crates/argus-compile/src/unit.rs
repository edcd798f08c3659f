//! Compilation units and the descriptors collected while lowering.
//!
//! A compilation unit is the result of lowering one expression: the
//! diagram vector (one diagram per semantic digit, little-endian), the
//! micro-operator descriptors emitted during the walk, and the
//! multiplexer map grouped by top-level expression. Micro descriptors
//! defer operators that have no direct diagram lowering to the CNF
//! layer's template library; multiplexer descriptors guard conditional
//! selections with an auxiliary activation bit.

use std::collections::HashMap;
use std::fmt;

use argus_add::Add;
use argus_expr::ExprId;

/// Operators expanded by the CNF template library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MicroOp {
    /// Bitwise complement
    Not,
    /// Two's-complement negation
    Neg,
    /// Multiplication
    Mul,
    /// Division
    Div,
    /// Modulus
    Mod,
    /// Left shift
    Lshift,
    /// Right shift
    Rshift,
    /// Strictly-less comparison
    Lt,
    /// Less-or-equal comparison
    Le,
}

impl fmt::Display for MicroOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MicroOp::Not => "not",
            MicroOp::Neg => "neg",
            MicroOp::Mul => "mul",
            MicroOp::Div => "div",
            MicroOp::Mod => "mod",
            MicroOp::Lshift => "lshift",
            MicroOp::Rshift => "rshift",
            MicroOp::Lt => "lt",
            MicroOp::Le => "le",
        };
        write!(f, "{s}")
    }
}

/// `<signed?, op, width>`: the key identifying one clause template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpTriple {
    /// Signed operand interpretation
    pub signed: bool,
    /// The deferred operator
    pub op: MicroOp,
    /// Operand width in nibbles
    pub width: u16,
}

impl fmt::Display for OpTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            if self.signed { "s" } else { "u" },
            self.op,
            self.width
        )
    }
}

/// A deferred micro-operator instance.
///
/// `z`, `x` and `y` are digit vectors (little-endian); the `*_bits`
/// vectors carry the corresponding 0/1 bit diagrams, four per digit,
/// least significant first, precomputed so the CNF layer can bind solver
/// literals without touching the diagram manager.
#[derive(Debug, Clone)]
pub struct MicroDescriptor {
    /// Template key
    pub triple: OpTriple,
    /// Output digits (a single auxiliary bit for relational operators)
    pub z: Vec<Add>,
    /// First operand digits
    pub x: Vec<Add>,
    /// Second operand digits; empty for unary operators
    pub y: Vec<Add>,
    /// Output bit diagrams
    pub z_bits: Vec<Add>,
    /// First operand bit diagrams
    pub x_bits: Vec<Add>,
    /// Second operand bit diagrams
    pub y_bits: Vec<Add>,
}

impl MicroDescriptor {
    /// One-diagram result (comparator)
    pub fn is_relational(&self) -> bool {
        self.z.len() == 1 && matches!(self.triple.op, MicroOp::Lt | MicroOp::Le)
    }

    /// No second operand
    pub fn is_unary(&self) -> bool {
        self.y.is_empty()
    }

    /// Digit-for-digit binary operator
    pub fn is_binary_shape(&self) -> bool {
        self.z.len() == self.x.len() && self.z.len() == self.y.len()
    }
}

impl fmt::Display for MicroDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "micro {} ({} -> {} digits)",
            self.triple,
            self.x.len(),
            self.z.len()
        )
    }
}

/// A deferred multiplexer: `z = aux ? x : y`, with `aux` tied to the
/// one-hot priority activation of its chain during post-processing.
#[derive(Debug, Clone)]
pub struct MuxDescriptor {
    /// Digits per branch
    pub width: u16,
    /// Output digits
    pub z: Vec<Add>,
    /// The branch condition
    pub cnd: Add,
    /// The activation bit standing in for the condition
    pub aux: Add,
    /// Then-branch digits
    pub x: Vec<Add>,
    /// Else-branch digits
    pub y: Vec<Add>,
}

impl fmt::Display for MuxDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mux (width {})", self.width)
    }
}

/// Multiplexer chains grouped by their top-level expression
pub type MuxMap = HashMap<ExprId, Vec<MuxDescriptor>>;

/// The result of lowering one expression
#[derive(Debug, Clone, Default)]
pub struct CompilationUnit {
    /// Result diagrams, little-endian digits; for boolean formulas the
    /// first entry is the formula and any further entries are activation
    /// constraints that must be asserted alongside it
    pub dds: Vec<Add>,
    /// Micro descriptors emitted during the walk
    pub micros: Vec<MicroDescriptor>,
    /// Multiplexer chains by top-level expression
    pub muxes: MuxMap,
}

impl CompilationUnit {
    /// All multiplexer descriptors regardless of top-level
    pub fn mux_descriptors(&self) -> impl Iterator<Item = &MuxDescriptor> {
        self.muxes.values().flatten()
    }
}
