//! Algebraic decision diagrams (ADDs) for argus.
//!
//! An ADD is a DAG over boolean decision variables with integer-valued
//! terminals. The compiler uses 0/1-valued ADDs for formulas and small
//! integer terminals (one hexadecimal digit, 0..16) for algebraic digit
//! vectors. Nodes are hash-consed in an [`AddManager`], so node references
//! ([`Add`]) compare and hash as plain integers and structurally equal
//! diagrams are pointer-equal.
//!
//! The manager is deliberately small: node storage with a unique table,
//! memoized apply/ite, evaluation under a bit assignment, and support
//! computation. Variable order is creation order.

mod manager;

pub use manager::{Add, AddManager, AddOp};
