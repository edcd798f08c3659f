//! The SAT engine facade.
//!
//! An [`Engine`] wraps one incremental CaDiCaL solver with the services
//! the verification pipeline needs: clause push, retractable assumption
//! groups, stable solver variables per (diagram variable, absolute time),
//! and cooperative interruption. Absolute time is the assertion base time
//! plus the time offset the bit variable was created with (wrapping, so
//! backward unrolling anchored at `u64::MAX` stays disjoint from forward
//! unrolling).
//!
//! The [`EngineMgr`] tracks the interrupt flags of all live engines and
//! can interrupt every solver at once; CaDiCaL polls the flag between
//! conflicts through its terminate callback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use argus_compile::EncodingMgr;
use argus_expr::Step;
use log::{debug, info, trace};

/// Outcome of a solver call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    /// Satisfiable under the active assumptions
    Sat,
    /// Unsatisfiable under the active assumptions
    Unsat,
    /// No verdict (interrupted or resource-limited)
    Unknown,
}

impl std::fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverStatus::Sat => write!(f, "SAT"),
            SolverStatus::Unsat => write!(f, "UNSAT"),
            SolverStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A retractable clause group: clauses added under a group carry the
/// negated activation literal and hold only while the group is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Group(i32);

/// Terminate callback polling the shared interrupt flag
struct Interrupt(Arc<AtomicBool>);

impl cadical::Callbacks for Interrupt {
    fn started(&mut self) {}

    fn terminate(&mut self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Registry of live engines; interruption broadcasts to all of them
#[derive(Default)]
pub struct EngineMgr {
    flags: Mutex<Vec<Arc<AtomicBool>>>,
}

impl EngineMgr {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, flag: Arc<AtomicBool>) {
        self.flags.lock().expect("engine registry poisoned").push(flag);
    }

    /// Interrupt every registered engine
    pub fn interrupt(&self) {
        let flags = self.flags.lock().expect("engine registry poisoned");
        info!("interrupting {} engine(s)", flags.len());
        for f in flags.iter() {
            f.store(true, Ordering::Relaxed);
        }
    }
}

/// One incremental SAT engine
pub struct Engine {
    name: String,
    solver: cadical::Solver<Interrupt>,
    enc: Arc<EncodingMgr>,
    var_map: HashMap<(u32, Step), i32>,
    next_var: i32,
    assumptions: Vec<i32>,
    interrupt: Arc<AtomicBool>,
    true_lit: Option<i32>,
    clauses: usize,
}

impl Engine {
    /// Create an engine over the (frozen) encoding manager and register
    /// its interrupt flag with `mgr`.
    pub fn new(name: &str, enc: Arc<EncodingMgr>, mgr: &EngineMgr) -> Self {
        let interrupt = Arc::new(AtomicBool::new(false));
        mgr.register(interrupt.clone());

        let mut solver = cadical::Solver::new();
        solver.set_callbacks(Some(Interrupt(interrupt.clone())));

        debug!("created engine `{name}`");
        Self {
            name: name.to_string(),
            solver,
            enc,
            var_map: HashMap::new(),
            next_var: 0,
            assumptions: Vec::new(),
            interrupt,
            true_lit: None,
            clauses: 0,
        }
    }

    /// Engine name (used in log lines)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The encoding manager this engine resolves diagram variables
    /// against
    pub fn enc(&self) -> &EncodingMgr {
        &self.enc
    }

    /// Allocate a fresh solver variable
    pub fn fresh_var(&mut self) -> i32 {
        self.next_var += 1;
        self.next_var
    }

    /// Solver variable for a diagram variable asserted at `base` time.
    /// Total: equal (variable, absolute time) always yields the same
    /// solver variable.
    pub fn find_dd_var(&mut self, dd_var: u32, base: Step) -> i32 {
        let absolute = base.wrapping_add(self.enc.bit_time(dd_var));
        if let Some(v) = self.var_map.get(&(dd_var, absolute)) {
            return *v;
        }
        let v = self.fresh_var();
        self.var_map.insert((dd_var, absolute), v);
        v
    }

    /// Solver variable for a diagram variable if it was ever allocated
    pub fn lookup_dd_var(&self, dd_var: u32, base: Step) -> Option<i32> {
        let absolute = base.wrapping_add(self.enc.bit_time(dd_var));
        self.var_map.get(&(dd_var, absolute)).copied()
    }

    /// A literal that is true in every model
    pub fn true_lit(&mut self) -> i32 {
        if let Some(t) = self.true_lit {
            return t;
        }
        let t = self.fresh_var();
        self.solver.add_clause([t]);
        self.clauses += 1;
        self.true_lit = Some(t);
        t
    }

    /// Open a fresh retractable group
    pub fn new_group(&mut self) -> Group {
        let g = self.fresh_var();
        self.assumptions.push(g);
        trace!("engine `{}`: new group {g}", self.name);
        Group(g)
    }

    /// Retract the most recently opened group: its activation literal is
    /// asserted negatively, permanently satisfying its clauses.
    pub fn invert_last_group(&mut self) {
        let g = self
            .assumptions
            .pop()
            .expect("no group left to invert");
        self.solver.add_clause([-g]);
        self.clauses += 1;
        trace!("engine `{}`: inverted group {g}", self.name);
    }

    /// Push one clause, optionally guarded by a group
    pub fn add_clause(&mut self, mut lits: Vec<i32>, group: Option<Group>) {
        if let Some(Group(g)) = group {
            lits.push(-g);
        }
        self.solver.add_clause(lits);
        self.clauses += 1;
    }

    /// Solve under the active groups
    pub fn solve(&mut self) -> SolverStatus {
        debug!(
            "engine `{}`: solving ({} clauses, {} variables, {} active groups)",
            self.name,
            self.clauses,
            self.next_var,
            self.assumptions.len()
        );
        let status = match self.solver.solve_with(self.assumptions.iter().copied()) {
            Some(true) => SolverStatus::Sat,
            Some(false) => SolverStatus::Unsat,
            None => SolverStatus::Unknown,
        };
        debug!("engine `{}`: {status}", self.name);
        status
    }

    /// Model value of a solver literal after a SAT verdict
    pub fn value(&self, lit: i32) -> Option<bool> {
        self.solver.value(lit)
    }

    /// Model value of a diagram variable at `base` time; `None` when the
    /// variable never reached the solver or the solver left it open.
    pub fn dd_var_value(&self, dd_var: u32, base: Step) -> Option<bool> {
        let v = self.lookup_dd_var(dd_var, base)?;
        self.value(v)
    }

    /// This engine's interrupt flag
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    /// Clauses pushed so far
    pub fn clause_count(&self) -> usize {
        self.clauses
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Engine {{ name: {}, clauses: {}, vars: {} }}",
            self.name, self.clauses, self.next_var
        )
    }
}
