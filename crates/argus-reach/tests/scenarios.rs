//! End-to-end reachability scenarios over parsed models.

use std::sync::Arc;

use argus_compile::{CompilationUnit, Compiler, EncodingMgr};
use argus_expr::{
    model::Model, ExprPool, ModelError, ScalarValue, TypeStore,
};
use argus_parser::{parse_expression, ModelParser, ParseModel};
use argus_reach::{
    check_init_consistency, CompiledFsm, ConsistencyStatus, Evaluator, FsmUnits, ReachStatus,
    Reachability, Witness,
};
use argus_sat::{Engine, EngineMgr, MicroLoader, SolverStatus};

#[derive(Debug)]
struct Session {
    pool: ExprPool,
    model: Model,
    target: argus_expr::ExprId,
    ctx: argus_expr::ExprId,
}

/// Parse, compile and run a reachability query
fn run(src: &str, target: &str) -> Result<(Session, ReachStatus, Option<Witness>), ModelError> {
    let mut pool = ExprPool::new();
    let mut types = TypeStore::new();
    let model = ModelParser::new()
        .parse_model(src, &mut pool, &mut types)
        .expect("scenario model parses");
    let target_expr = parse_expression(target, &mut pool).expect("scenario target parses");

    let mut enc = EncodingMgr::new();
    let ctx = pool.empty();
    let (units, target_cu) = {
        let mut compiler = Compiler::new(&pool, &mut types, model.symbols(), &mut enc);
        let units = FsmUnits::compile(&mut compiler, &model)?;
        let target_cu = compiler.compile(ctx, target_expr, 0)?;
        (units, target_cu)
    };

    let fsm = CompiledFsm::new(units, Arc::new(enc));
    let reach = Reachability::new(
        fsm,
        pool.render(target_expr),
        target_cu,
        Vec::new(),
        Vec::new(),
        Vec::new(),
    );
    let status = reach.process();
    let witness = reach.take_witness();

    Ok((
        Session {
            pool,
            model,
            target: target_expr,
            ctx,
        },
        status,
        witness,
    ))
}

/// The winning witness must satisfy INIT at step 0, TRANS along every
/// step, INVAR everywhere and the target at the end.
fn assert_witness_consistent(session: &Session, witness: &Witness) {
    let mut ev = Evaluator::new(&session.pool, session.model.symbols(), witness);
    let last = (witness.len() - 1) as u64;

    for (ctx, e) in session.model.init() {
        assert_eq!(
            ev.process(*ctx, *e, 0).unwrap(),
            ScalarValue::Bool(true),
            "witness violates INIT"
        );
    }
    for k in 0..last {
        for (ctx, e) in session.model.trans() {
            assert_eq!(
                ev.process(*ctx, *e, k).unwrap(),
                ScalarValue::Bool(true),
                "witness violates TRANS at step {k}"
            );
        }
    }
    for k in 0..=last {
        for (ctx, e) in session.model.invar() {
            assert_eq!(
                ev.process(*ctx, *e, k).unwrap(),
                ScalarValue::Bool(true),
                "witness violates INVAR at step {k}"
            );
        }
    }
    assert_eq!(
        ev.process(session.ctx, session.target, last).unwrap(),
        ScalarValue::Bool(true),
        "witness misses the target"
    );
}

const TOGGLE: &str = "
    MODULE main
    VAR x : boolean;
    INIT x = 0;
    TRANS next(x) = !x;
";

#[test]
fn test_s1_trivial_reachable() {
    let (session, status, witness) = run(TOGGLE, "x = 1").unwrap();
    assert_eq!(status, ReachStatus::Reachable);

    let witness = witness.expect("a witness accompanies REACHABLE");
    assert_eq!(witness.len(), 2);

    let x = session.pool.probe_atom("x").unwrap();
    assert_eq!(
        witness.value(session.ctx, x, 0),
        Some(ScalarValue::Bool(false))
    );
    assert_eq!(
        witness.value(session.ctx, x, 1),
        Some(ScalarValue::Bool(true))
    );

    assert_witness_consistent(&session, &witness);
}

#[test]
fn test_s2_type_error_target() {
    let err = run(TOGGLE, "x = 2").unwrap_err();
    assert!(matches!(err, ModelError::TypeMismatch { .. }));
}

const COUNTER: &str = "
    MODULE main
    VAR c : unsigned int(2);
    INIT c = 0;
    TRANS next(c) = c + 1;
";

#[test]
fn test_s3_modular_counter() {
    let (session, status, witness) = run(COUNTER, "c = 5").unwrap();
    assert_eq!(status, ReachStatus::Reachable);

    let witness = witness.expect("a witness accompanies REACHABLE");
    assert_eq!(witness.len(), 6);

    let c = session.pool.probe_atom("c").unwrap();
    for k in 0..6 {
        assert_eq!(
            witness.value(session.ctx, c, k),
            Some(ScalarValue::Int(k as i64)),
            "counter value at step {k}"
        );
    }

    assert_witness_consistent(&session, &witness);
}

const BLOCKED_COUNTER: &str = "
    MODULE main
    VAR c : unsigned int(2);
    INIT c = 0;
    TRANS next(c) = c + 1;
    INVAR c != 5;
";

#[test]
fn test_s4_invariant_blocked_target() {
    let (_, status, witness) = run(BLOCKED_COUNTER, "c = 5").unwrap();
    assert_eq!(status, ReachStatus::Unreachable);
    assert!(witness.is_none());
}

const SHORT_HOP: &str = "
    MODULE main
    VAR c : unsigned int(2);
    INIT c = 0;
    TRANS next(c) = c + 1;
";

#[test]
fn test_s5_race_winner_witness_is_sound() {
    // the target sits one step from the unique initial state; both
    // strategies are allowed to race and either may win — the witness
    // must satisfy INIT, TRANS and the target regardless
    let (session, status, witness) = run(SHORT_HOP, "c = 1").unwrap();
    assert_eq!(status, ReachStatus::Reachable);

    let witness = witness.expect("a witness accompanies REACHABLE");
    assert_eq!(witness.len(), 2);
    assert_witness_consistent(&session, &witness);
}

const CONTRADICTORY: &str = "
    MODULE main
    VAR x : boolean;
    INIT x = 0;
    INIT x = 1;
";

#[test]
fn test_s6_init_inconsistency() {
    let mut pool = ExprPool::new();
    let mut types = TypeStore::new();
    let model = ModelParser::new()
        .parse_model(CONTRADICTORY, &mut pool, &mut types)
        .unwrap();

    let mut enc = EncodingMgr::new();
    let units = {
        let mut compiler = Compiler::new(&pool, &mut types, model.symbols(), &mut enc);
        FsmUnits::compile(&mut compiler, &model).unwrap()
    };
    let fsm = CompiledFsm::new(units, Arc::new(enc));

    let mgr = EngineMgr::new();
    let status = check_init_consistency(&fsm, &[], &mgr);
    assert_eq!(status, ConsistencyStatus::Ko);

    // reachability over the empty initial set short-circuits
    let (_, status, witness) = run(CONTRADICTORY, "x = 1").unwrap();
    assert_eq!(status, ReachStatus::Unreachable);
    assert!(witness.is_none());
}

#[test]
fn test_constraint_units_restrict_the_search() {
    // a global constraint pinning the counter below 3 makes c = 4
    // unreachable even though the plain system reaches it
    let mut pool = ExprPool::new();
    let mut types = TypeStore::new();
    let model = ModelParser::new()
        .parse_model(COUNTER, &mut pool, &mut types)
        .unwrap();
    let target_expr = parse_expression("c = 4", &mut pool).unwrap();
    let constraint_expr = parse_expression("c < 3", &mut pool).unwrap();

    let mut enc = EncodingMgr::new();
    let ctx = pool.empty();
    let (units, target_cu, constraint_cu): (FsmUnits, CompilationUnit, CompilationUnit) = {
        let mut compiler = Compiler::new(&pool, &mut types, model.symbols(), &mut enc);
        let units = FsmUnits::compile(&mut compiler, &model).unwrap();
        let t = compiler.compile(ctx, target_expr, 0).unwrap();
        let c = compiler.compile(ctx, constraint_expr, 0).unwrap();
        (units, t, c)
    };

    let fsm = CompiledFsm::new(units, Arc::new(enc));
    let reach = Reachability::new(
        fsm,
        pool.render(target_expr),
        target_cu,
        Vec::new(),
        Vec::new(),
        vec![constraint_cu],
    );
    assert_eq!(reach.process(), ReachStatus::Unreachable);
}

#[test]
fn test_uniqueness_forbids_repeated_states() {
    // a stuttering system: after the uniqueness constraint over steps 0
    // and 1 the unrolled frame admits no trajectory at all
    let src = "
        MODULE main
        VAR x : boolean;
        TRANS next(x) = x;
    ";
    let mut pool = ExprPool::new();
    let mut types = TypeStore::new();
    let model = ModelParser::new()
        .parse_model(src, &mut pool, &mut types)
        .unwrap();

    let mut enc = EncodingMgr::new();
    let units = {
        let mut compiler = Compiler::new(&pool, &mut types, model.symbols(), &mut enc);
        FsmUnits::compile(&mut compiler, &model).unwrap()
    };
    let fsm = CompiledFsm::new(units, Arc::new(enc));

    let mgr = EngineMgr::new();
    let mut engine = Engine::new("uniq", fsm.enc().clone(), &mgr);
    let mut loader = MicroLoader::builtin();
    fsm.assert_trans(&mut engine, 0, None, &mut loader);
    assert_eq!(engine.solve(), SolverStatus::Sat);

    fsm.assert_uniqueness(&mut engine, 0, 1);
    assert_eq!(engine.solve(), SolverStatus::Unsat);
}

#[test]
fn test_enum_model_reaches_literal() {
    let src = "
        MODULE main
        VAR s : { IDLE, BUSY, DONE };
        INIT s = IDLE;
        TRANS next(s) = (s = IDLE ? BUSY : DONE);
    ";
    let (session, status, witness) = run(src, "s = DONE").unwrap();
    assert_eq!(status, ReachStatus::Reachable);

    let witness = witness.expect("a witness accompanies REACHABLE");
    assert_eq!(witness.len(), 3);
    assert_witness_consistent(&session, &witness);
}

#[test]
fn test_instance_model() {
    let src = "
        MODULE cell
        VAR y : boolean;
        INIT y = 0;
        TRANS next(y) = !y;

        MODULE main
        VAR m : cell;
    ";
    let (session, status, witness) = run(src, "m.y = 1").unwrap();
    assert_eq!(status, ReachStatus::Reachable);
    let witness = witness.expect("a witness accompanies REACHABLE");
    assert_eq!(witness.len(), 2);
    assert_witness_consistent(&session, &witness);
}
