//! Compiler behaviour tests: memoization, digit arithmetic, promotion,
//! deferred operators and multiplexer activation. Compiled diagrams are
//! checked by direct evaluation under bit assignments.

use std::collections::HashMap;

use argus_compile::{Compiler, EncodingMgr, MicroOp};
use argus_expr::{
    model::{Model, ModelBuilder, ModuleBuilder},
    BinOp, ExprPool, ModelError, ScalarValue, Step, TypeStore,
};

struct Fixture {
    pool: ExprPool,
    types: TypeStore,
    model: Model,
    enc: EncodingMgr,
}

fn fixture() -> Fixture {
    let mut pool = ExprPool::new();
    let mut types = TypeStore::new();
    let b = types.boolean();
    let u2 = types.find_unsigned(2);
    let arr = types.find_array(u2, 3);

    let module = ModuleBuilder::new(&mut pool, "main")
        .var(&mut pool, "x", b)
        .unwrap()
        .var(&mut pool, "c", u2)
        .unwrap()
        .var(&mut pool, "d", u2)
        .unwrap()
        .var(&mut pool, "a", arr)
        .unwrap()
        .build();
    let model = ModelBuilder::new()
        .module(module)
        .build(&mut pool, &mut types)
        .unwrap();

    Fixture {
        pool,
        types,
        model,
        enc: EncodingMgr::new(),
    }
}

/// Bit assignment setting an algebraic variable to `value` at `time`
fn assign_var(
    fx: &mut Fixture,
    assignment: &mut HashMap<u32, bool>,
    name: &str,
    value: i64,
    time: Step,
) {
    let ctx = fx.pool.empty();
    let atom = fx.pool.atom(name);
    let ty = fx
        .model
        .symbols()
        .fetch(ctx, atom)
        .and_then(|s| s.var_type())
        .unwrap();
    let id = fx
        .enc
        .encoding_for(&fx.types, ctx, atom, ty, time)
        .unwrap();
    let bits = fx.enc.get(id).bits().to_vec();
    for (pos, bit) in bits.iter().enumerate() {
        let var = fx.enc.add().support(*bit)[0];
        assignment.insert(var, (value >> pos) & 1 == 1);
    }
}

#[test]
fn test_compile_idempotence() {
    let mut fx = fixture();
    let ctx = fx.pool.empty();
    let c = fx.pool.ident("c");
    let d = fx.pool.ident("d");
    let prod = fx.pool.binary(BinOp::Mul, c, d);

    let mut compiler = Compiler::new(&fx.pool, &mut fx.types, fx.model.symbols(), &mut fx.enc);
    let u1 = compiler.compile(ctx, prod, 0).unwrap();
    let u2 = compiler.compile(ctx, prod, 0).unwrap();

    assert_eq!(u1.dds, u2.dds);
    assert_eq!(u1.micros.len(), u2.micros.len());
    for (a, b) in u1.micros.iter().zip(u2.micros.iter()) {
        assert_eq!(a.triple, b.triple);
        assert_eq!(a.z, b.z);
        assert_eq!(a.x, b.x);
        assert_eq!(a.y, b.y);
    }
    assert_eq!(u1.muxes.len(), u2.muxes.len());
}

#[test]
fn test_variable_round_trip() {
    let mut fx = fixture();
    let ctx = fx.pool.empty();
    let c = fx.pool.ident("c");

    let mut compiler = Compiler::new(&fx.pool, &mut fx.types, fx.model.symbols(), &mut fx.enc);
    let unit = compiler.compile(ctx, c, 0).unwrap();
    assert_eq!(unit.dds.len(), 2);

    for value in [0i64, 1, 41, 255] {
        let mut assignment = HashMap::new();
        assign_var(&mut fx, &mut assignment, "c", value, 0);
        let lo = fx.enc.add().eval(unit.dds[0], &assignment).unwrap();
        let hi = fx.enc.add().eval(unit.dds[1], &assignment).unwrap();
        assert_eq!(lo + (hi << 4), value);
    }
}

#[test]
fn test_ripple_add_wraps() {
    let mut fx = fixture();
    let ctx = fx.pool.empty();
    let c = fx.pool.ident("c");
    let one = fx.pool.num(1);
    let sum = fx.pool.binary(BinOp::Add, c, one);

    let mut compiler = Compiler::new(&fx.pool, &mut fx.types, fx.model.symbols(), &mut fx.enc);
    let unit = compiler.compile(ctx, sum, 0).unwrap();
    assert_eq!(unit.dds.len(), 2);
    assert!(unit.micros.is_empty(), "plus has a native lowering");

    for value in [0i64, 7, 15, 16, 127, 254, 255] {
        let mut assignment = HashMap::new();
        assign_var(&mut fx, &mut assignment, "c", value, 0);
        let lo = fx.enc.add().eval(unit.dds[0], &assignment).unwrap();
        let hi = fx.enc.add().eval(unit.dds[1], &assignment).unwrap();
        assert_eq!(lo + (hi << 4), (value + 1) % 256, "at c = {value}");
    }
}

#[test]
fn test_ripple_sub_borrows() {
    let mut fx = fixture();
    let ctx = fx.pool.empty();
    let c = fx.pool.ident("c");
    let d = fx.pool.ident("d");
    let diff = fx.pool.binary(BinOp::Sub, c, d);

    let mut compiler = Compiler::new(&fx.pool, &mut fx.types, fx.model.symbols(), &mut fx.enc);
    let unit = compiler.compile(ctx, diff, 0).unwrap();

    for (cv, dv) in [(5i64, 3i64), (3, 5), (0, 1), (255, 255), (16, 1)] {
        let mut assignment = HashMap::new();
        assign_var(&mut fx, &mut assignment, "c", cv, 0);
        assign_var(&mut fx, &mut assignment, "d", dv, 0);
        let lo = fx.enc.add().eval(unit.dds[0], &assignment).unwrap();
        let hi = fx.enc.add().eval(unit.dds[1], &assignment).unwrap();
        assert_eq!(lo + (hi << 4), (cv - dv).rem_euclid(256), "{cv} - {dv}");
    }
}

#[test]
fn test_equality_conjoins_digits() {
    let mut fx = fixture();
    let ctx = fx.pool.empty();
    let c = fx.pool.ident("c");
    let d = fx.pool.ident("d");
    let eq = fx.pool.eq(c, d);

    let mut compiler = Compiler::new(&fx.pool, &mut fx.types, fx.model.symbols(), &mut fx.enc);
    let unit = compiler.compile(ctx, eq, 0).unwrap();
    assert_eq!(unit.dds.len(), 1);

    for (cv, dv, expect) in [(9i64, 9i64, 1i64), (9, 10, 0), (0x21, 0x12, 0)] {
        let mut assignment = HashMap::new();
        assign_var(&mut fx, &mut assignment, "c", cv, 0);
        assign_var(&mut fx, &mut assignment, "d", dv, 0);
        assert_eq!(
            fx.enc.add().eval(unit.dds[0], &assignment).unwrap(),
            expect
        );
    }
}

#[test]
fn test_constant_promotion_wraps_to_width() {
    let mut fx = fixture();
    let ctx = fx.pool.empty();
    let c = fx.pool.ident("c");
    let big = fx.pool.num(300);
    let eq = fx.pool.eq(c, big);

    let mut compiler = Compiler::new(&fx.pool, &mut fx.types, fx.model.symbols(), &mut fx.enc);
    let unit = compiler.compile(ctx, eq, 0).unwrap();

    // 300 promoted to unsigned(2) is 300 mod 256 = 44
    for (cv, expect) in [(44i64, 1i64), (300 % 256, 1), (45, 0)] {
        let mut assignment = HashMap::new();
        assign_var(&mut fx, &mut assignment, "c", cv, 0);
        assert_eq!(
            fx.enc.add().eval(unit.dds[0], &assignment).unwrap(),
            expect
        );
    }
}

#[test]
fn test_next_shifts_time() {
    let mut fx = fixture();
    let ctx = fx.pool.empty();
    let c = fx.pool.ident("c");
    let one = fx.pool.num(1);
    let sum = fx.pool.binary(BinOp::Add, c, one);
    let nc = fx.pool.next(c);
    let trans = fx.pool.eq(nc, sum);

    let mut compiler = Compiler::new(&fx.pool, &mut fx.types, fx.model.symbols(), &mut fx.enc);
    let unit = compiler.compile(ctx, trans, 0).unwrap();
    assert_eq!(unit.dds.len(), 1);

    let mut assignment = HashMap::new();
    assign_var(&mut fx, &mut assignment, "c", 4, 0);
    assign_var(&mut fx, &mut assignment, "c", 5, 1);
    assert_eq!(fx.enc.add().eval(unit.dds[0], &assignment).unwrap(), 1);

    let mut assignment = HashMap::new();
    assign_var(&mut fx, &mut assignment, "c", 4, 0);
    assign_var(&mut fx, &mut assignment, "c", 6, 1);
    assert_eq!(fx.enc.add().eval(unit.dds[0], &assignment).unwrap(), 0);
}

#[test]
fn test_multiplication_defers_to_microcode() {
    let mut fx = fixture();
    let ctx = fx.pool.empty();
    let c = fx.pool.ident("c");
    let d = fx.pool.ident("d");
    let prod = fx.pool.binary(BinOp::Mul, c, d);

    let mut compiler = Compiler::new(&fx.pool, &mut fx.types, fx.model.symbols(), &mut fx.enc);
    let unit = compiler.compile(ctx, prod, 0).unwrap();

    assert_eq!(unit.micros.len(), 1);
    let md = &unit.micros[0];
    assert_eq!(md.triple.op, MicroOp::Mul);
    assert_eq!(md.triple.width, 2);
    assert!(!md.triple.signed);
    assert!(md.is_binary_shape());
    assert_eq!(md.x_bits.len(), 8);
    assert_eq!(md.y_bits.len(), 8);
    assert_eq!(md.z_bits.len(), 8);
    // the result digits are the descriptor's output digits
    assert_eq!(unit.dds, md.z);
}

#[test]
fn test_relational_defers_single_bit() {
    let mut fx = fixture();
    let ctx = fx.pool.empty();
    let c = fx.pool.ident("c");
    let d = fx.pool.ident("d");
    let lt = fx.pool.binary(BinOp::Lt, c, d);

    let mut compiler = Compiler::new(&fx.pool, &mut fx.types, fx.model.symbols(), &mut fx.enc);
    let unit = compiler.compile(ctx, lt, 0).unwrap();

    assert_eq!(unit.dds.len(), 1);
    assert_eq!(unit.micros.len(), 1);
    let md = &unit.micros[0];
    assert!(md.is_relational());
    assert_eq!(md.z.len(), 1);
}

#[test]
fn test_signed_division_is_a_capability_error() {
    let mut pool = ExprPool::new();
    let mut types = TypeStore::new();
    let s2 = types.find_signed(2);
    let module = ModuleBuilder::new(&mut pool, "main")
        .var(&mut pool, "p", s2)
        .unwrap()
        .var(&mut pool, "q", s2)
        .unwrap()
        .build();
    let model = ModelBuilder::new()
        .module(module)
        .build(&mut pool, &mut types)
        .unwrap();
    let mut enc = EncodingMgr::new();

    let ctx = pool.empty();
    let p = pool.ident("p");
    let q = pool.ident("q");
    let quot = pool.binary(BinOp::Div, p, q);

    let mut compiler = Compiler::new(&pool, &mut types, model.symbols(), &mut enc);
    assert!(matches!(
        compiler.compile(ctx, quot, 0),
        Err(ModelError::Capability { .. })
    ));
}

#[test]
fn test_boolean_against_two_is_a_model_error() {
    let mut fx = fixture();
    let ctx = fx.pool.empty();
    let x = fx.pool.ident("x");
    let two = fx.pool.num(2);
    let bad = fx.pool.eq(x, two);

    let mut compiler = Compiler::new(&fx.pool, &mut fx.types, fx.model.symbols(), &mut fx.enc);
    assert!(matches!(
        compiler.compile(ctx, bad, 0),
        Err(ModelError::TypeMismatch { .. })
    ));
}

#[test]
fn test_algebraic_ite_activation() {
    let mut fx = fixture();
    let ctx = fx.pool.empty();
    let x = fx.pool.ident("x");
    let c = fx.pool.ident("c");
    let d = fx.pool.ident("d");
    let sel = fx.pool.ite(x, c, d);

    let mut compiler = Compiler::new(&fx.pool, &mut fx.types, fx.model.symbols(), &mut fx.enc);
    let unit = compiler.compile(ctx, sel, 0).unwrap();

    // two result digits plus one activation link
    assert_eq!(unit.dds.len(), 3);
    assert_eq!(unit.mux_descriptors().count(), 1);
    let mux = unit.mux_descriptors().next().unwrap().clone();

    let mut assignment = HashMap::new();
    assign_var(&mut fx, &mut assignment, "c", 0x2A, 0);
    assign_var(&mut fx, &mut assignment, "d", 0x15, 0);
    let xvar = {
        let xa = fx.pool.atom("x");
        let b = fx.types.boolean();
        let id = fx.enc.encoding_for(&fx.types, ctx, xa, b, 0).unwrap();
        fx.enc.add().support(fx.enc.get(id).dds()[0])[0]
    };
    let auxvar = fx.enc.add().support(mux.aux)[0];

    // condition true, activation bit set: the selection follows the
    // then-branch and the activation link evaluates to 1
    assignment.insert(xvar, true);
    assignment.insert(auxvar, true);
    let lo = fx.enc.add().eval(unit.dds[0], &assignment).unwrap();
    let hi = fx.enc.add().eval(unit.dds[1], &assignment).unwrap();
    assert_eq!(lo + (hi << 4), 0x2A);
    assert_eq!(fx.enc.add().eval(unit.dds[2], &assignment).unwrap(), 1);

    // activation bit out of sync with the condition: the link fails
    assignment.insert(auxvar, false);
    assert_eq!(fx.enc.add().eval(unit.dds[2], &assignment).unwrap(), 0);

    // condition false, activation clear: else-branch selected
    assignment.insert(xvar, false);
    let lo = fx.enc.add().eval(unit.dds[0], &assignment).unwrap();
    let hi = fx.enc.add().eval(unit.dds[1], &assignment).unwrap();
    assert_eq!(lo + (hi << 4), 0x15);
    assert_eq!(fx.enc.add().eval(unit.dds[2], &assignment).unwrap(), 1);
}

#[test]
fn test_subscript_selects_rows() {
    let mut fx = fixture();
    let ctx = fx.pool.empty();
    let a = fx.pool.ident("a");
    let c = fx.pool.ident("c");
    let pick = fx.pool.binary(BinOp::Subscript, a, c);

    let mut compiler = Compiler::new(&fx.pool, &mut fx.types, fx.model.symbols(), &mut fx.enc);
    let unit = compiler.compile(ctx, pick, 0).unwrap();
    assert_eq!(unit.dds.len(), 2);

    // array rows hold 10, 20, 30; select each through the index variable
    let rows = [10i64, 20, 30];
    let aatom = fx.pool.atom("a");
    let arr_ty = fx
        .model
        .symbols()
        .fetch(ctx, aatom)
        .and_then(|s| s.var_type())
        .unwrap();
    let arr_id = fx
        .enc
        .encoding_for(&fx.types, ctx, aatom, arr_ty, 0)
        .unwrap();
    let arr_bits = fx.enc.get(arr_id).bits().to_vec();

    for (idx, expect) in rows.iter().enumerate() {
        let mut assignment = HashMap::new();
        for (pos, bit) in arr_bits.iter().enumerate() {
            let row = pos / 8;
            let within = pos % 8;
            let var = fx.enc.add().support(*bit)[0];
            assignment.insert(var, (rows[row] >> within) & 1 == 1);
        }
        assign_var(&mut fx, &mut assignment, "c", idx as i64, 0);

        let lo = fx.enc.add().eval(unit.dds[0], &assignment).unwrap();
        let hi = fx.enc.add().eval(unit.dds[1], &assignment).unwrap();
        assert_eq!(lo + (hi << 4), *expect, "row {idx}");
    }
}

#[test]
fn test_constant_subscript_is_direct() {
    let mut fx = fixture();
    let ctx = fx.pool.empty();
    let a = fx.pool.ident("a");
    let one = fx.pool.num(1);
    let pick = fx.pool.binary(BinOp::Subscript, a, one);

    let mut compiler = Compiler::new(&fx.pool, &mut fx.types, fx.model.symbols(), &mut fx.enc);
    let unit = compiler.compile(ctx, pick, 0).unwrap();
    assert_eq!(unit.dds.len(), 2);
    assert!(unit.micros.is_empty());
    assert!(unit.muxes.is_empty());
}

#[test]
fn test_scalar_value_display() {
    let mut pool = ExprPool::new();
    let a = pool.atom("IDLE");
    assert_eq!(ScalarValue::Bool(true).display(&pool).to_string(), "TRUE");
    assert_eq!(ScalarValue::Int(42).display(&pool).to_string(), "42");
    assert_eq!(ScalarValue::Literal(a).display(&pool).to_string(), "IDLE");
}
