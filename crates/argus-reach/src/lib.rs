//! Reachability algorithms for argus.
//!
//! The crate ties the pipeline together: [`fsm::FsmUnits`] precompiles a
//! model's INIT/TRANS/INVAR sections, [`reach::Reachability`] races a
//! forward and a backward bounded search over them, and the `witness` /
//! `eval` modules materialise and interrogate the resulting trajectory.
//! Initial-state consistency checking lives in [`fsm`] as well.

pub mod eval;
pub mod fsm;
pub mod reach;
pub mod witness;

pub use eval::Evaluator;
pub use fsm::{check_init_consistency, CompiledFsm, ConsistencyStatus, FsmUnits, StateVar};
pub use reach::{ReachStatus, Reachability, StatusCell};
pub use witness::{TimeFrame, Witness};
