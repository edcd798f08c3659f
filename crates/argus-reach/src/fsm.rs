//! The compiled FSM and its assertion layer.
//!
//! [`FsmUnits::compile`] drives the compiler over the model's INIT, TRANS
//! and INVAR conjuncts once, on the driver thread, and records every
//! state variable's encoding and bit variables at time offset 0. The
//! result is frozen into a [`CompiledFsm`] shared read-only by the
//! strategy threads, which only project the precompiled units at their
//! unrolling times and add state-uniqueness clauses.

use std::collections::HashMap;
use std::sync::Arc;

use argus_compile::{CompilationUnit, Compiler, EncodingId, EncodingMgr};
use argus_expr::{model::Model, Atom, ExprId, ModelError, ScalarValue, Step};
use argus_sat::{Engine, EngineMgr, Group, MicroLoader, SolverStatus};
use log::{debug, info};

use crate::witness::{TimeFrame, Witness};

/// One state variable: identity plus its time-0 encoding
#[derive(Debug, Clone)]
pub struct StateVar {
    /// Instance context
    pub ctx: ExprId,
    /// Variable name
    pub name: Atom,
    /// Encoding at time offset 0
    pub enc: EncodingId,
    /// Diagram variables of the encoding's bits
    pub bits: Vec<u32>,
    /// Arrays are part of uniqueness but not of witness frames
    pub scalar: bool,
}

/// Precompiled FSM sections
#[derive(Debug, Default)]
pub struct FsmUnits {
    init: Vec<CompilationUnit>,
    trans: Vec<CompilationUnit>,
    invar: Vec<CompilationUnit>,
    state_vars: Vec<StateVar>,
}

impl FsmUnits {
    /// Compile every section of the model at time 0 and materialise the
    /// time-0 encoding of every state variable.
    pub fn compile(compiler: &mut Compiler<'_>, model: &Model) -> Result<Self, ModelError> {
        let mut units = FsmUnits::default();

        for (ctx, e) in model.init() {
            units.init.push(compiler.compile(*ctx, *e, 0)?);
        }
        for (ctx, e) in model.trans() {
            units.trans.push(compiler.compile(*ctx, *e, 0)?);
        }
        for (ctx, e) in model.invar() {
            units.invar.push(compiler.compile(*ctx, *e, 0)?);
        }

        for (ctx, name, ty) in model.state_variables() {
            let enc = compiler.encoding_at(ctx, name, ty, 0)?;
            let encoding = compiler.enc().get(enc);
            let scalar = !matches!(encoding.kind(), argus_compile::EncodingKind::Array { .. });
            let bits = encoding
                .bits()
                .iter()
                .map(|b| compiler.enc().add().support(*b)[0])
                .collect();
            units.state_vars.push(StateVar {
                ctx,
                name,
                enc,
                bits,
                scalar,
            });
        }

        debug!(
            "compiled FSM: {} INIT / {} TRANS / {} INVAR unit(s), {} state variable(s)",
            units.init.len(),
            units.trans.len(),
            units.invar.len(),
            units.state_vars.len()
        );
        Ok(units)
    }

    /// State variables in declaration order
    pub fn state_vars(&self) -> &[StateVar] {
        &self.state_vars
    }
}

/// The frozen FSM: precompiled units plus the (now read-only) encoding
/// manager
#[derive(Debug)]
pub struct CompiledFsm {
    units: FsmUnits,
    enc: Arc<EncodingMgr>,
}

impl CompiledFsm {
    /// Freeze compiled units over their encoding manager
    pub fn new(units: FsmUnits, enc: Arc<EncodingMgr>) -> Self {
        Self { units, enc }
    }

    /// The shared encoding manager
    pub fn enc(&self) -> &Arc<EncodingMgr> {
        &self.enc
    }

    /// State variables in declaration order
    pub fn state_vars(&self) -> &[StateVar] {
        self.units.state_vars()
    }

    /// Assert INIT at time `t`
    pub fn assert_init(
        &self,
        engine: &mut Engine,
        t: Step,
        group: Option<Group>,
        loader: &mut MicroLoader,
    ) {
        for unit in &self.units.init {
            engine.assert_unit(unit, t, group, loader);
        }
    }

    /// Assert TRANS at time `t` (its `next` variables land at `t + 1`)
    pub fn assert_trans(
        &self,
        engine: &mut Engine,
        t: Step,
        group: Option<Group>,
        loader: &mut MicroLoader,
    ) {
        for unit in &self.units.trans {
            engine.assert_unit(unit, t, group, loader);
        }
    }

    /// Assert INVAR at time `t`
    pub fn assert_invar(
        &self,
        engine: &mut Engine,
        t: Step,
        group: Option<Group>,
        loader: &mut MicroLoader,
    ) {
        for unit in &self.units.invar {
            engine.assert_unit(unit, t, group, loader);
        }
    }

    /// Assert that the states at steps `j` and `k` differ in at least
    /// one variable: a difference bit per state bit, aggregated into a
    /// single disjunction.
    pub fn assert_uniqueness(&self, engine: &mut Engine, j: Step, k: Step) {
        let mut diffs = Vec::new();
        for var in self.state_vars() {
            for bit in &var.bits {
                let vj = engine.find_dd_var(*bit, j);
                let vk = engine.find_dd_var(*bit, k);
                let d = engine.fresh_var();
                engine.add_clause(vec![-d, vj, vk], None);
                engine.add_clause(vec![-d, -vj, -vk], None);
                engine.add_clause(vec![d, vj, -vk], None);
                engine.add_clause(vec![d, -vj, vk], None);
                diffs.push(d);
            }
        }
        engine.add_clause(diffs, None);
    }

    /// Collect witness frames from a satisfied engine. `bases` lists the
    /// absolute solver times in trajectory order; frame `k` of the result
    /// holds the state at `bases[k]`.
    pub fn collect_frames(
        &self,
        engine: &Engine,
        witness: &mut Witness,
        bases: impl Iterator<Item = Step>,
    ) -> Result<(), ModelError> {
        for base in bases {
            let mut frame = TimeFrame::new();
            for var in self.state_vars() {
                if !var.scalar {
                    continue;
                }
                let mut assignment = HashMap::new();
                for bit in &var.bits {
                    let value = engine.dd_var_value(*bit, base).unwrap_or(false);
                    assignment.insert(*bit, value);
                }
                let value: ScalarValue =
                    self.enc.get(var.enc).value(self.enc.add(), &assignment)?;
                frame.set_value(var.ctx, var.name, value);
            }
            witness.push_frame(frame);
        }
        Ok(())
    }
}

/// Verdict of the initial-state consistency check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyStatus {
    /// INIT, INVAR and the given constraints admit a state
    Ok,
    /// The conjunction is unsatisfiable: the model has no initial state
    Ko,
    /// The solver gave no verdict
    Undecided,
}

impl std::fmt::Display for ConsistencyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsistencyStatus::Ok => write!(f, "OK"),
            ConsistencyStatus::Ko => write!(f, "KO"),
            ConsistencyStatus::Undecided => write!(f, "UNDECIDED"),
        }
    }
}

/// Check INIT ∧ INVAR ∧ constraints at time 0
pub fn check_init_consistency(
    fsm: &CompiledFsm,
    constraints: &[CompilationUnit],
    mgr: &EngineMgr,
) -> ConsistencyStatus {
    let mut engine = Engine::new("initial", fsm.enc().clone(), mgr);
    let mut loader = MicroLoader::from_env();

    fsm.assert_init(&mut engine, 0, None, &mut loader);
    fsm.assert_invar(&mut engine, 0, None, &mut loader);
    for unit in constraints {
        engine.assert_unit(unit, 0, None, &mut loader);
    }

    let status = match engine.solve() {
        SolverStatus::Sat => ConsistencyStatus::Ok,
        SolverStatus::Unsat => ConsistencyStatus::Ko,
        SolverStatus::Unknown => ConsistencyStatus::Undecided,
    };
    info!("initial-state consistency: {status}");
    status
}
