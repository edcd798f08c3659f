//! Bounded reachability: forward and backward strategies racing on OS
//! threads.
//!
//! Both strategies unroll the transition relation step by step in their
//! own SAT engine. The forward side anchors INIT at time 0 and probes the
//! target under a retractable group at each depth; the backward side
//! anchors the target at `u64::MAX` and probes INIT at decreasing times,
//! reversing the witness on success. State-uniqueness constraints let
//! either side conclude unreachability once the model admits no further
//! distinct states.
//!
//! The shared status cell leaves `Unknown` exactly once; the winning
//! strategy installs its witness in the same critical transition, then
//! interrupts every engine so the loser backs off promptly.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use std::thread;

use argus_compile::CompilationUnit;
use argus_expr::{Step, BACKWARD_ANCHOR};
use argus_sat::{Engine, EngineMgr, MicroLoader, SolverStatus};
use log::{debug, info};

use crate::fsm::CompiledFsm;
use crate::witness::{autoincrement, Witness};

/// Global verdict of a reachability run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReachStatus {
    /// No verdict yet
    Unknown = 0,
    /// A trajectory reaches the target
    Reachable = 1,
    /// No trajectory reaches the target
    Unreachable = 2,
    /// A strategy failed unexpectedly
    Error = 3,
}

impl std::fmt::Display for ReachStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReachStatus::Unknown => write!(f, "UNKNOWN"),
            ReachStatus::Reachable => write!(f, "REACHABLE"),
            ReachStatus::Unreachable => write!(f, "UNREACHABLE"),
            ReachStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// The monotonic status cell: transitions out of `Unknown` at most once,
/// first writer wins.
#[derive(Debug, Default)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    /// Fresh cell in the `Unknown` state
    pub fn new() -> Self {
        Self(AtomicU8::new(ReachStatus::Unknown as u8))
    }

    /// Current status
    pub fn get(&self) -> ReachStatus {
        match self.0.load(Ordering::Acquire) {
            0 => ReachStatus::Unknown,
            1 => ReachStatus::Reachable,
            2 => ReachStatus::Unreachable,
            3 => ReachStatus::Error,
            other => panic!("corrupted status cell: {other}"),
        }
    }

    /// Attempt the single transition out of `Unknown`; true iff this
    /// call performed it.
    pub fn try_conclude(&self, status: ReachStatus) -> bool {
        assert_ne!(status, ReachStatus::Unknown, "cannot conclude UNKNOWN");
        self.0
            .compare_exchange(
                ReachStatus::Unknown as u8,
                status as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// A reachability query over a compiled FSM
pub struct Reachability {
    fsm: CompiledFsm,
    target_desc: String,
    target: CompilationUnit,
    forward_constraints: Vec<CompilationUnit>,
    backward_constraints: Vec<CompilationUnit>,
    global_constraints: Vec<CompilationUnit>,
    status: StatusCell,
    witness: Mutex<Option<Witness>>,
    mgr: EngineMgr,
}

impl Reachability {
    /// Assemble a query. Forward-only constraints never reach the
    /// backward strategy and vice versa; global constraints reach both.
    pub fn new(
        fsm: CompiledFsm,
        target_desc: String,
        target: CompilationUnit,
        forward_constraints: Vec<CompilationUnit>,
        backward_constraints: Vec<CompilationUnit>,
        global_constraints: Vec<CompilationUnit>,
    ) -> Self {
        Self {
            fsm,
            target_desc,
            target,
            forward_constraints,
            backward_constraints,
            global_constraints,
            status: StatusCell::new(),
            witness: Mutex::new(None),
            mgr: EngineMgr::new(),
        }
    }

    /// The engine manager (drivers may interrupt it on a wall-clock
    /// timeout)
    pub fn engine_mgr(&self) -> &EngineMgr {
        &self.mgr
    }

    /// Current verdict
    pub fn status(&self) -> ReachStatus {
        self.status.get()
    }

    /// The installed witness, if the verdict was REACHABLE
    pub fn take_witness(&self) -> Option<Witness> {
        self.witness.lock().expect("witness slot poisoned").take()
    }

    /// Run both strategies to a verdict (or mutual exhaustion)
    pub fn process(&self) -> ReachStatus {
        info!("reachability analysis of `{}` starts", self.target_desc);
        thread::scope(|s| {
            s.spawn(|| self.forward_strategy());
            s.spawn(|| self.backward_strategy());
        });
        let status = self.status.get();
        info!("reachability analysis of `{}`: {status}", self.target_desc);
        status
    }

    /// Install a witness and the REACHABLE verdict atomically; the loser
    /// observes the cell already taken and drops its own trajectory.
    fn conclude_reachable(&self, witness: Witness) -> bool {
        let mut slot = self.witness.lock().expect("witness slot poisoned");
        if !self.status.try_conclude(ReachStatus::Reachable) {
            return false;
        }
        *slot = Some(witness);
        true
    }

    fn forward_strategy(&self) {
        let mut engine = Engine::new("forward", self.fsm.enc().clone(), &self.mgr);
        let mut loader = MicroLoader::from_env();
        let fsm = &self.fsm;

        // the base of the trajectory: initial states under the invariant
        fsm.assert_init(&mut engine, 0, None, &mut loader);
        fsm.assert_invar(&mut engine, 0, None, &mut loader);
        for cu in &self.forward_constraints {
            engine.assert_unit(cu, 0, None, &mut loader);
        }
        for cu in &self.global_constraints {
            engine.assert_unit(cu, 0, None, &mut loader);
        }

        let mut k: Step = 0;
        loop {
            if self.status.get() != ReachStatus::Unknown {
                break;
            }

            // probe the target at the current depth under a retractable
            // group
            let group = engine.new_group();
            engine.assert_unit(&self.target, k, Some(group), &mut loader);
            fsm.assert_invar(&mut engine, k, Some(group), &mut loader);

            info!("forward: looking for a reachability witness (k = {k})");
            match engine.solve() {
                SolverStatus::Unknown => break,
                SolverStatus::Sat => {
                    let mut witness = self.fresh_witness();
                    if let Err(e) = fsm.collect_frames(&engine, &mut witness, 0..=k) {
                        debug!("forward: witness extraction failed: {e}");
                        self.status.try_conclude(ReachStatus::Error);
                        break;
                    }
                    if self.conclude_reachable(witness) {
                        info!("forward: target reachable at depth {k}");
                    }
                    break;
                }
                SolverStatus::Unsat => {
                    info!("forward: no reachability witness (k = {k})");
                    engine.invert_last_group();
                }
            }

            // unroll one more step with the uniqueness constraints
            k += 1;
            fsm.assert_trans(&mut engine, k - 1, None, &mut loader);
            fsm.assert_invar(&mut engine, k, None, &mut loader);
            for cu in &self.global_constraints {
                engine.assert_unit(cu, k, None, &mut loader);
            }
            for j in 0..k {
                fsm.assert_uniqueness(&mut engine, j, k);
            }

            if self.status.get() != ReachStatus::Unknown {
                break;
            }

            info!("forward: looking for an unreachability proof (k = {k})");
            match engine.solve() {
                SolverStatus::Unknown => break,
                SolverStatus::Sat => {
                    info!("forward: no unreachability proof (k = {k})");
                }
                SolverStatus::Unsat => {
                    info!("forward: found an unreachability proof (k = {k})");
                    self.status.try_conclude(ReachStatus::Unreachable);
                    break;
                }
            }
        }

        // tell the other side to go home
        self.mgr.interrupt();
        debug!("forward: done ({} clauses)", engine.clause_count());
    }

    fn backward_strategy(&self) {
        let mut engine = Engine::new("backward", self.fsm.enc().clone(), &self.mgr);
        let mut loader = MicroLoader::from_env();
        let fsm = &self.fsm;

        // goal states under the invariant, anchored at the top of the
        // mirrored namespace
        engine.assert_unit(&self.target, BACKWARD_ANCHOR, None, &mut loader);
        fsm.assert_invar(&mut engine, BACKWARD_ANCHOR, None, &mut loader);
        for cu in &self.backward_constraints {
            engine.assert_unit(cu, BACKWARD_ANCHOR, None, &mut loader);
        }
        for cu in &self.global_constraints {
            engine.assert_unit(cu, BACKWARD_ANCHOR, None, &mut loader);
        }

        match engine.solve() {
            SolverStatus::Unknown => {
                self.mgr.interrupt();
                return;
            }
            SolverStatus::Unsat => {
                info!("backward: empty final states, target is trivially unreachable");
                self.status.try_conclude(ReachStatus::Unreachable);
                self.mgr.interrupt();
                return;
            }
            SolverStatus::Sat => {
                info!("backward: goal consistency check ok");
            }
        }

        let mut k: Step = 0;
        loop {
            if self.status.get() != ReachStatus::Unknown {
                break;
            }

            // a trajectory exists iff an initial state lies k steps below
            // the goal
            let group = engine.new_group();
            fsm.assert_init(&mut engine, BACKWARD_ANCHOR - k, Some(group), &mut loader);

            info!("backward: looking for a reachability witness (k = {k})");
            match engine.solve() {
                SolverStatus::Unknown => break,
                SolverStatus::Sat => {
                    let mut witness = self.fresh_witness();
                    let bases = (0..=k).map(|j| BACKWARD_ANCHOR - k + j);
                    if let Err(e) = fsm.collect_frames(&engine, &mut witness, bases) {
                        debug!("backward: witness extraction failed: {e}");
                        self.status.try_conclude(ReachStatus::Error);
                        break;
                    }
                    if self.conclude_reachable(witness) {
                        info!("backward: target reachable at depth {k}");
                    }
                    break;
                }
                SolverStatus::Unsat => {
                    info!("backward: no reachability witness (k = {k})");
                    engine.invert_last_group();
                }
            }

            // extend the unrolling one step further down
            k += 1;
            fsm.assert_trans(&mut engine, BACKWARD_ANCHOR - k, None, &mut loader);
            fsm.assert_invar(&mut engine, BACKWARD_ANCHOR - k, None, &mut loader);
            for cu in &self.global_constraints {
                engine.assert_unit(cu, BACKWARD_ANCHOR - k, None, &mut loader);
            }
            for j in 0..k {
                fsm.assert_uniqueness(&mut engine, BACKWARD_ANCHOR - j, BACKWARD_ANCHOR - k);
            }

            if self.status.get() != ReachStatus::Unknown {
                break;
            }

            info!("backward: looking for an unreachability proof (k = {k})");
            match engine.solve() {
                SolverStatus::Unknown => break,
                SolverStatus::Sat => {
                    info!("backward: no unreachability proof (k = {k})");
                }
                SolverStatus::Unsat => {
                    info!("backward: found an unreachability proof (k = {k})");
                    self.status.try_conclude(ReachStatus::Unreachable);
                    break;
                }
            }
        }

        self.mgr.interrupt();
        debug!("backward: done ({} clauses)", engine.clause_count());
    }

    fn fresh_witness(&self) -> Witness {
        Witness::new(
            format!("reach_{}", autoincrement()),
            format!("reachability witness for target `{}`", self.target_desc),
        )
    }
}
