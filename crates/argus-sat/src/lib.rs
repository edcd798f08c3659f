//! SAT engine facade and CNF projection.
//!
//! [`Engine`] wraps an incremental CaDiCaL solver with assumption groups,
//! per-(diagram-variable, time) solver variables and cooperative
//! interruption; [`EngineMgr`] broadcasts interrupts across engines. The
//! `cnf` module projects 0/1 decision diagrams into clauses ("no-cut"
//! path scheme) and the `microcode` module expands deferred operator
//! descriptors through a clause template library.

pub mod cnf;
pub mod engine;
pub mod microcode;

pub use engine::{Engine, EngineMgr, Group, SolverStatus};
pub use microcode::{MicroLoader, Template, MICROCODE_PATH_ENV};
