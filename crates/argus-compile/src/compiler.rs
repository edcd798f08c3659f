//! The expression compiler: lowers typed expressions to decision-diagram
//! vectors plus deferred operator descriptors.
//!
//! The engine is a post-order expression walk: the pre-visit returns true
//! iff the node has not been compiled yet for the current (context, time)
//! — a cache hit pushes the memoized result instead of descending — and
//! the post-visit pops operand diagrams off the working stack and pushes
//! the node's own. Operand classification (boolean, constant, monolithic
//! enumerative, algebraic) selects the lowering per operator.
//!
//! Working-stack discipline: digits are pushed most significant first, so
//! the top of the stack is always the least significant digit of the most
//! recent operand, and popping `width` entries yields a little-endian
//! digit vector.

use std::collections::HashMap;

use argus_add::{Add, AddOp};
use argus_expr::{
    model::resolve_path,
    walker::{walk, Walker},
    Atom, BinOp, ExprId, ExprNode, ExprPool, ModelError, Step, Symbol, SymbolTable, TimedExpr,
    Type, TypeId, TypeStore, Value, NIBBLE_SIZE,
};
use argus_expr::typecheck::TypeChecker;
use log::{debug, trace};

use crate::enc::EncodingMgr;
use crate::unit::{
    CompilationUnit, MicroDescriptor, MicroOp, MuxDescriptor, MuxMap, OpTriple,
};

const BASE: Value = 16;

/// Nibbles needed to index `size` array rows
fn selector_width(size: u16) -> u16 {
    let mut bits = 0u16;
    while (1u32 << bits) < size as u32 {
        bits += 1;
    }
    bits.div_ceil(NIBBLE_SIZE).max(1)
}

#[derive(Debug, Clone)]
struct CachedUnit {
    dds: Vec<Add>,
    ty: TypeId,
    micros: Vec<MicroDescriptor>,
    muxes: Vec<MuxDescriptor>,
}

/// The expression compiler. Holds the memoization cache; one instance is
/// meant to live for a whole verification session.
pub struct Compiler<'a> {
    pool: &'a ExprPool,
    tc: TypeChecker<'a>,
    symbols: &'a SymbolTable,
    enc: &'a mut EncodingMgr,
    cache: HashMap<TimedExpr, CachedUnit>,

    add_stack: Vec<Add>,
    type_stack: Vec<TypeId>,
    ctx_stack: Vec<ExprId>,
    time_stack: Vec<Step>,
    micros: Vec<MicroDescriptor>,
    mux_chain: Vec<MuxDescriptor>,
    marks: Vec<(usize, usize)>,
}

impl<'a> Compiler<'a> {
    /// Create a compiler over a resolved model's pool, types and symbols
    pub fn new(
        pool: &'a ExprPool,
        types: &'a mut TypeStore,
        symbols: &'a SymbolTable,
        enc: &'a mut EncodingMgr,
    ) -> Self {
        Self {
            pool,
            tc: TypeChecker::new(pool, types, symbols),
            symbols,
            enc,
            cache: HashMap::new(),
            add_stack: Vec::new(),
            type_stack: Vec::new(),
            ctx_stack: Vec::new(),
            time_stack: Vec::new(),
            micros: Vec::new(),
            mux_chain: Vec::new(),
            marks: Vec::new(),
        }
    }

    /// The encoding manager the compiler allocates bits through
    pub fn enc(&self) -> &EncodingMgr {
        self.enc
    }

    /// Materialise (or fetch) the encoding of a symbol at a time step
    pub fn encoding_at(
        &mut self,
        ctx: ExprId,
        name: Atom,
        ty: TypeId,
        time: Step,
    ) -> Result<crate::enc::EncodingId, ModelError> {
        self.enc.encoding_for(self.tc.types(), ctx, name, ty, time)
    }

    /// Lower `expr` in `ctx` at time step `time`. Idempotent: a repeated
    /// call with the same key returns a unit with identical diagram
    /// references and descriptor sequences.
    pub fn compile(
        &mut self,
        ctx: ExprId,
        expr: ExprId,
        time: Step,
    ) -> Result<CompilationUnit, ModelError> {
        // surface model errors before lowering starts
        self.tc.type_of(ctx, expr)?;

        self.add_stack.clear();
        self.type_stack.clear();
        self.ctx_stack.clear();
        self.time_stack.clear();
        self.micros.clear();
        self.mux_chain.clear();
        self.marks.clear();

        self.ctx_stack.push(ctx);
        self.time_stack.push(time);

        debug!(
            "compiling `{}` (time = {time})",
            self.pool.render(expr)
        );

        let pool = self.pool;
        walk(pool, expr, self)?;

        // stack sanity: exactly one type and its digit count of diagrams
        let ty = *self
            .type_stack
            .last()
            .unwrap_or_else(|| panic!("compiler type stack empty after walk"));
        let n = self.dd_count(ty);
        assert_eq!(self.type_stack.len(), 1, "compiler type stack imbalance");
        assert_eq!(self.add_stack.len(), n, "compiler diagram stack imbalance");
        assert_eq!(self.ctx_stack.len(), 1, "compiler context stack imbalance");
        assert_eq!(self.time_stack.len(), 1, "compiler time stack imbalance");

        let mut dds = self.pop_digits(n);

        // multiplexer post-processing: one-hot priority activation over
        // the chain, outermost condition first
        let chain = std::mem::take(&mut self.mux_chain);
        let mut prev = self.enc.add_mut().zero();
        for m in chain.iter().rev() {
            let not_prev = self.enc.add_mut().cmpl(prev);
            let act = self.enc.add_mut().apply(AddOp::And, not_prev, m.cnd);
            let link = self.enc.add_mut().apply(AddOp::Xnor, act, m.aux);
            dds.push(link);
            prev = act;
        }

        let mut muxes = MuxMap::new();
        if !chain.is_empty() {
            muxes.insert(expr, chain);
        }

        Ok(CompilationUnit {
            dds,
            micros: std::mem::take(&mut self.micros),
            muxes,
        })
    }

    // -- stack helpers -------------------------------------------------

    fn cur_ctx(&self) -> ExprId {
        *self.ctx_stack.last().expect("context stack empty")
    }

    fn cur_time(&self) -> Step {
        *self.time_stack.last().expect("time stack empty")
    }

    /// Diagrams an operand of this type occupies on the stack
    fn dd_count(&mut self, ty: TypeId) -> usize {
        let types = self.tc.types();
        if types.is_constant(ty) {
            1
        } else {
            types.width(ty) as usize
        }
    }

    /// Push a digit vector (little-endian input, most significant first
    /// onto the stack so the least significant digit ends on top)
    fn push_digits(&mut self, digits: &[Add]) {
        for d in digits.iter().rev() {
            self.add_stack.push(*d);
        }
    }

    /// Pop `n` diagrams, yielding a little-endian digit vector
    fn pop_digits(&mut self, n: usize) -> Vec<Add> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.add_stack.pop().expect("compiler diagram stack underflow"));
        }
        out
    }

    fn pop_type(&mut self) -> TypeId {
        self.type_stack.pop().expect("compiler type stack underflow")
    }

    // -- memoization ---------------------------------------------------

    fn cache_key(&self, expr: ExprId) -> TimedExpr {
        TimedExpr::new(self.cur_ctx(), expr, self.cur_time())
    }

    /// On hit, replay the cached unit: push the diagram vector and type,
    /// merge descriptors into the ongoing lists. Returns true on hit.
    fn cache_hit(&mut self, expr: ExprId) -> bool {
        let key = self.cache_key(expr);
        let Some(unit) = self.cache.get(&key) else {
            return false;
        };
        let unit = unit.clone();
        trace!("cache hit for `{}`", self.pool.render(expr));
        self.push_digits(&unit.dds);
        self.type_stack.push(unit.ty);
        self.micros.extend(unit.micros);
        self.mux_chain.extend(unit.muxes);
        true
    }

    fn store_cache(&mut self, expr: ExprId) {
        let key = self.cache_key(expr);
        let ty = *self.type_stack.last().expect("no result type to cache");
        let n = self.dd_count(ty);
        assert!(
            n <= self.add_stack.len(),
            "fewer diagrams than the result type announces"
        );
        let len = self.add_stack.len();
        // top of stack is the least significant digit
        let dds: Vec<Add> = self.add_stack[len - n..].iter().rev().cloned().collect();

        let (micro_mark, mux_mark) = self.marks.pop().expect("mark stack underflow");
        let micros = self.micros[micro_mark..].to_vec();
        let muxes = self.mux_chain[mux_mark..].to_vec();

        let fresh = CachedUnit {
            dds,
            ty,
            micros,
            muxes,
        };
        if let Some(old) = self.cache.insert(key, fresh.clone()) {
            assert_eq!(old.dds, fresh.dds, "compiler cache key collision");
        }
    }

    // -- leaves --------------------------------------------------------

    fn push_const(&mut self, value: Value) {
        let dd = self.enc.add_mut().constant(value);
        self.add_stack.push(dd);
        let ty = self.tc.types().int_const();
        self.type_stack.push(ty);
    }

    fn resolve_leaf(&mut self, name: Atom) -> Result<(), ModelError> {
        let ctx = self.cur_ctx();
        let time = self.cur_time();

        let Some(symbol) = self.symbols.fetch(ctx, name) else {
            return Err(ModelError::Unresolved {
                ctx: self.pool.render(ctx),
                name: self.pool.atom_name(name).to_string(),
            });
        };

        match *symbol {
            Symbol::Constant { value, ty } | Symbol::Literal { value, ty } => {
                let dd = self.enc.add_mut().constant(value);
                self.add_stack.push(dd);
                self.type_stack.push(ty);
            }
            Symbol::Variable { ty } | Symbol::Temporary { ty } => {
                if self.tc.types().is_instance(ty) {
                    return Err(ModelError::TypeMismatch {
                        expr: self.pool.atom_name(name).to_string(),
                        detail: "a module instance is not a value".to_string(),
                    });
                }
                let id = self.enc.encoding_for(self.tc.types(), ctx, name, ty, time)?;
                let dds = self.enc.get(id).dds().to_vec();
                self.push_digits(&dds);
                self.type_stack.push(ty);
            }
            Symbol::Define { body } => {
                // inline: compile the body in place
                let pool = self.pool;
                walk(pool, body, self)?;
            }
        }
        Ok(())
    }

    // -- operand promotion ---------------------------------------------

    /// Expand a single constant-typed diagram into `width` little-endian
    /// digit diagrams, wrapping modulo `16^width` (two's complement for
    /// negative values). Works for plain terminals and for compound
    /// diagrams such as conditionals over constants.
    fn promote_const(&mut self, dd: Add, width: u16) -> Vec<Add> {
        let mgr = self.enc.add_mut();
        let mask = mgr.constant(0xF);
        (0..width)
            .map(|k| {
                let amount = mgr.constant((k as u32 * NIBBLE_SIZE as u32) as Value);
                let shifted = mgr.apply(AddOp::RShift, dd, amount);
                mgr.apply(AddOp::BwAnd, shifted, mask)
            })
            .collect()
    }

    /// Pop one operand of declared type `ty`, promoted to `width`
    /// algebraic digits when it is an abstract constant.
    fn pop_algebraic(&mut self, ty: TypeId, width: u16) -> Vec<Add> {
        let n = self.dd_count(ty);
        let raw = self.pop_digits(n);
        if self.tc.types().is_constant(ty) {
            self.promote_const(raw[0], width)
        } else {
            debug_assert_eq!(raw.len(), width as usize);
            raw
        }
    }

    // -- micro descriptors ---------------------------------------------

    /// Bit diagrams of a digit vector, four per digit, least significant
    /// first
    fn extract_bits(&mut self, digits: &[Add]) -> Vec<Add> {
        let mgr = self.enc.add_mut();
        let one = mgr.one();
        let mut out = Vec::with_capacity(digits.len() * NIBBLE_SIZE as usize);
        for d in digits {
            for j in 0..NIBBLE_SIZE {
                let amount = mgr.constant(j as Value);
                let shifted = mgr.apply(AddOp::RShift, *d, amount);
                out.push(mgr.apply(AddOp::BwAnd, shifted, one));
            }
        }
        out
    }

    /// Defer a binary operator to the template library; the result is a
    /// fresh temporary digit vector.
    fn micro_binary(
        &mut self,
        op: MicroOp,
        width: u16,
        signed: bool,
        x: Vec<Add>,
        y: Vec<Add>,
    ) -> Vec<Add> {
        let time = self.cur_time();
        let zid = self.enc.fresh_algebraic(width, time);
        let z = self.enc.get(zid).dds().to_vec();
        let z_bits = self.enc.get(zid).bits().to_vec();
        let x_bits = self.extract_bits(&x);
        let y_bits = self.extract_bits(&y);

        let md = MicroDescriptor {
            triple: OpTriple { signed, op, width },
            z: z.clone(),
            x,
            y,
            z_bits,
            x_bits,
            y_bits,
        };
        debug!("registered {md}");
        self.micros.push(md);
        z
    }

    /// Defer a unary operator to the template library
    fn micro_unary(&mut self, op: MicroOp, width: u16, signed: bool, x: Vec<Add>) -> Vec<Add> {
        let time = self.cur_time();
        let zid = self.enc.fresh_algebraic(width, time);
        let z = self.enc.get(zid).dds().to_vec();
        let z_bits = self.enc.get(zid).bits().to_vec();
        let x_bits = self.extract_bits(&x);

        let md = MicroDescriptor {
            triple: OpTriple { signed, op, width },
            z: z.clone(),
            x,
            y: Vec::new(),
            z_bits,
            x_bits,
            y_bits: Vec::new(),
        };
        debug!("registered {md}");
        self.micros.push(md);
        z
    }

    /// Defer a comparator; the result is a single auxiliary bit.
    fn micro_relational(
        &mut self,
        op: MicroOp,
        width: u16,
        signed: bool,
        x: Vec<Add>,
        y: Vec<Add>,
    ) -> Add {
        let time = self.cur_time();
        let aux = self.enc.make_bit(time);
        let x_bits = self.extract_bits(&x);
        let y_bits = self.extract_bits(&y);

        let md = MicroDescriptor {
            triple: OpTriple { signed, op, width },
            z: vec![aux],
            x,
            y,
            z_bits: vec![aux],
            x_bits,
            y_bits,
        };
        debug!("registered {md}");
        self.micros.push(md);
        aux
    }

    // -- lowerings -----------------------------------------------------

    fn lower_not(&mut self, expr: ExprId) -> Result<(), ModelError> {
        let ty = self.pop_type();
        let types = self.tc.types();
        if types.is_boolean(ty) || types.is_constant(ty) {
            let x = self.pop_digits(1)[0];
            let r = self.enc.add_mut().cmpl(x);
            self.add_stack.push(r);
            self.type_stack.push(ty);
            return Ok(());
        }
        if self.tc.types().is_algebraic(ty) {
            let width = self.tc.types().width(ty);
            let signed = self.tc.types().is_signed(ty);
            let x = self.pop_digits(width as usize);
            let z = self.micro_unary(MicroOp::Not, width, signed, x);
            self.push_digits(&z);
            self.type_stack.push(ty);
            return Ok(());
        }
        panic!("complement on unexpected operand class in `{}`", self.pool.render(expr));
    }

    fn lower_neg(&mut self, expr: ExprId) -> Result<(), ModelError> {
        let ty = self.pop_type();
        if self.tc.types().is_constant(ty) {
            let x = self.pop_digits(1)[0];
            let r = self.enc.add_mut().negate(x);
            self.add_stack.push(r);
            self.type_stack.push(ty);
            return Ok(());
        }
        if self.tc.types().is_fixed(ty) {
            return Err(ModelError::Capability {
                detail: "fixed-point negation".to_string(),
            });
        }
        if self.tc.types().is_algebraic(ty) {
            let width = self.tc.types().width(ty);
            let signed = self.tc.types().is_signed(ty);
            let x = self.pop_digits(width as usize);
            let z = self.micro_unary(MicroOp::Neg, width, signed, x);
            self.push_digits(&z);
            self.type_stack.push(ty);
            return Ok(());
        }
        panic!("negation on unexpected operand class in `{}`", self.pool.render(expr));
    }

    fn lower_binary(&mut self, op: BinOp, expr: ExprId) -> Result<(), ModelError> {
        if op == BinOp::Subscript {
            return self.lower_subscript();
        }
        if op == BinOp::Comma {
            return Err(ModelError::Capability {
                detail: "inline non-determinism (comma lists)".to_string(),
            });
        }

        let rt = self.pop_type();
        let lt = self.pop_type();

        let (l_bool, r_bool, l_const, r_const, l_enum, r_enum, l_alg, r_alg) = {
            let types = self.tc.types();
            (
                types.is_boolean(lt),
                types.is_boolean(rt),
                types.is_constant(lt),
                types.is_constant(rt),
                types.is_enum(lt),
                types.is_enum(rt),
                types.is_algebraic(lt),
                types.is_algebraic(rt),
            )
        };

        // booleans, possibly against the constants 0/1
        if (l_bool && (r_bool || r_const)) || (l_const && r_bool) {
            return self.binary_boolean(op, lt, rt);
        }

        // two abstract constants fold directly on terminals
        if l_const && r_const {
            return self.binary_constant(op);
        }

        if l_enum && r_enum {
            return self.binary_enumerative(op);
        }

        if l_alg || r_alg {
            return self.binary_algebraic(op, lt, rt);
        }

        panic!(
            "operand classification failed for `{}`",
            self.pool.render(expr)
        );
    }

    fn binary_boolean(&mut self, op: BinOp, _lt: TypeId, _rt: TypeId) -> Result<(), ModelError> {
        let y = self.pop_digits(1)[0];
        let x = self.pop_digits(1)[0];
        let mgr = self.enc.add_mut();
        let r = match op {
            BinOp::And => mgr.apply(AddOp::And, x, y),
            BinOp::Or => mgr.apply(AddOp::Or, x, y),
            BinOp::Xor | BinOp::Ne => mgr.apply(AddOp::Xor, x, y),
            BinOp::Xnor | BinOp::Iff => mgr.apply(AddOp::Xnor, x, y),
            BinOp::Implies => {
                let nx = mgr.cmpl(x);
                mgr.apply(AddOp::Or, nx, y)
            }
            BinOp::Eq => mgr.apply(AddOp::Equals, x, y),
            _ => {
                return Err(ModelError::Capability {
                    detail: "arithmetic on boolean operands".to_string(),
                })
            }
        };
        self.add_stack.push(r);
        let b = self.tc.types().boolean();
        self.type_stack.push(b);
        Ok(())
    }

    fn binary_constant(&mut self, op: BinOp) -> Result<(), ModelError> {
        let y = self.pop_digits(1)[0];
        let x = self.pop_digits(1)[0];
        let mgr = self.enc.add_mut();
        let (r, relational) = match op {
            BinOp::And => (mgr.apply(AddOp::And, x, y), false),
            BinOp::Or => (mgr.apply(AddOp::Or, x, y), false),
            BinOp::Xor => (mgr.apply(AddOp::Xor, x, y), false),
            BinOp::Xnor | BinOp::Iff => (mgr.apply(AddOp::Xnor, x, y), false),
            BinOp::Implies => {
                let nx = mgr.cmpl(x);
                (mgr.apply(AddOp::Or, nx, y), false)
            }
            BinOp::Add => (mgr.apply(AddOp::Plus, x, y), false),
            BinOp::Sub => (mgr.apply(AddOp::Minus, x, y), false),
            BinOp::Mul => (mgr.apply(AddOp::Times, x, y), false),
            BinOp::Div => (mgr.apply(AddOp::Divide, x, y), false),
            BinOp::Mod => (mgr.apply(AddOp::Modulus, x, y), false),
            BinOp::Lshift => (mgr.apply(AddOp::LShift, x, y), false),
            BinOp::Rshift => (mgr.apply(AddOp::RShift, x, y), false),
            BinOp::Eq => (mgr.apply(AddOp::Equals, x, y), true),
            BinOp::Ne => {
                let e = mgr.apply(AddOp::Equals, x, y);
                (mgr.cmpl(e), true)
            }
            BinOp::Lt => (mgr.apply(AddOp::Lt, x, y), true),
            BinOp::Le => (mgr.apply(AddOp::Leq, x, y), true),
            BinOp::Gt => (mgr.apply(AddOp::Lt, y, x), true),
            BinOp::Ge => (mgr.apply(AddOp::Leq, y, x), true),
            BinOp::Dot | BinOp::Subscript | BinOp::Comma => unreachable!(),
        };
        self.add_stack.push(r);
        let ty = if relational {
            self.tc.types().boolean()
        } else {
            self.tc.types().int_const()
        };
        self.type_stack.push(ty);
        Ok(())
    }

    fn binary_enumerative(&mut self, op: BinOp) -> Result<(), ModelError> {
        let y = self.pop_digits(1)[0];
        let x = self.pop_digits(1)[0];
        let mgr = self.enc.add_mut();
        let r = match op {
            BinOp::Eq => mgr.apply(AddOp::Equals, x, y),
            BinOp::Ne => {
                let e = mgr.apply(AddOp::Equals, x, y);
                mgr.cmpl(e)
            }
            BinOp::Lt => mgr.apply(AddOp::Lt, x, y),
            BinOp::Le => mgr.apply(AddOp::Leq, x, y),
            BinOp::Gt => mgr.apply(AddOp::Lt, y, x),
            BinOp::Ge => mgr.apply(AddOp::Leq, y, x),
            _ => {
                return Err(ModelError::Capability {
                    detail: "only equality and ordering exist on enumerations".to_string(),
                })
            }
        };
        self.add_stack.push(r);
        let b = self.tc.types().boolean();
        self.type_stack.push(b);
        Ok(())
    }

    fn binary_algebraic(&mut self, op: BinOp, lt: TypeId, rt: TypeId) -> Result<(), ModelError> {
        // the algebraic side fixes width and signedness; the type checker
        // guarantees agreement when both sides are algebraic
        let aty = if self.tc.types().is_algebraic(lt) { lt } else { rt };
        let width = self.tc.types().width(aty);
        let signed = self.tc.types().is_signed(aty);
        let fixed = self.tc.types().is_fixed(aty);

        if fixed && !(op.is_logical() || matches!(op, BinOp::Eq | BinOp::Ne)) {
            return Err(ModelError::Capability {
                detail: "fixed-point arithmetic and ordering".to_string(),
            });
        }
        if signed && matches!(op, BinOp::Div | BinOp::Mod) {
            return Err(ModelError::Capability {
                detail: "signed division and modulus".to_string(),
            });
        }

        // operands: right one is on top
        let y = self.pop_algebraic(rt, width);
        let x = self.pop_algebraic(lt, width);

        match op {
            BinOp::And | BinOp::Or | BinOp::Xor | BinOp::Xnor | BinOp::Iff => {
                let bw = match op {
                    BinOp::And => AddOp::BwAnd,
                    BinOp::Or => AddOp::BwOr,
                    BinOp::Xor => AddOp::BwXor,
                    _ => AddOp::BwXnor,
                };
                let z: Vec<Add> = x
                    .iter()
                    .zip(y.iter())
                    .map(|(a, b)| self.enc.add_mut().apply(bw, *a, *b))
                    .collect();
                self.push_digits(&z);
                self.type_stack.push(aty);
            }

            BinOp::Implies => {
                let z: Vec<Add> = x
                    .iter()
                    .zip(y.iter())
                    .map(|(a, b)| {
                        let mgr = self.enc.add_mut();
                        let na = mgr.bw_not(*a);
                        mgr.apply(AddOp::BwXor, na, *b)
                    })
                    .collect();
                self.push_digits(&z);
                self.type_stack.push(aty);
            }

            BinOp::Add => {
                // positional ripple: t = x[i] + y[i] + c, carry when the
                // base fits into t, result digit wraps; overflow past the
                // most significant digit wraps around
                let mut z = Vec::with_capacity(width as usize);
                let mgr = self.enc.add_mut();
                let base = mgr.constant(BASE);
                let mut carry = mgr.zero();
                for i in 0..width as usize {
                    let mgr = self.enc.add_mut();
                    let sum = mgr.apply(AddOp::Plus, x[i], y[i]);
                    let t = mgr.apply(AddOp::Plus, sum, carry);
                    z.push(mgr.apply(AddOp::Modulus, t, base));
                    carry = mgr.apply(AddOp::Leq, base, t);
                }
                self.push_digits(&z);
                self.type_stack.push(aty);
            }

            BinOp::Sub => {
                // borrow ripple; t lies in -16..16, so one added base
                // brings it into remainder range before wrapping
                let mut z = Vec::with_capacity(width as usize);
                let mgr = self.enc.add_mut();
                let base = mgr.constant(BASE);
                let zero = mgr.zero();
                let mut borrow = zero;
                for i in 0..width as usize {
                    let mgr = self.enc.add_mut();
                    let diff = mgr.apply(AddOp::Minus, x[i], y[i]);
                    let t = mgr.apply(AddOp::Minus, diff, borrow);
                    let shifted = mgr.apply(AddOp::Plus, t, base);
                    z.push(mgr.apply(AddOp::Modulus, shifted, base));
                    borrow = mgr.apply(AddOp::Lt, t, zero);
                }
                self.push_digits(&z);
                self.type_stack.push(aty);
            }

            BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Lshift | BinOp::Rshift => {
                let mop = match op {
                    BinOp::Mul => MicroOp::Mul,
                    BinOp::Div => MicroOp::Div,
                    BinOp::Mod => MicroOp::Mod,
                    BinOp::Lshift => MicroOp::Lshift,
                    _ => MicroOp::Rshift,
                };
                let z = self.micro_binary(mop, width, signed, x, y);
                self.push_digits(&z);
                self.type_stack.push(aty);
            }

            BinOp::Eq | BinOp::Ne => {
                let mut acc = self.enc.add_mut().one();
                for (a, b) in x.iter().zip(y.iter()) {
                    let mgr = self.enc.add_mut();
                    let e = mgr.apply(AddOp::Equals, *a, *b);
                    acc = mgr.apply(AddOp::And, acc, e);
                }
                if op == BinOp::Ne {
                    acc = self.enc.add_mut().cmpl(acc);
                }
                self.add_stack.push(acc);
                let b = self.tc.types().boolean();
                self.type_stack.push(b);
            }

            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let r = match op {
                    BinOp::Lt => self.micro_relational(MicroOp::Lt, width, signed, x, y),
                    BinOp::Le => self.micro_relational(MicroOp::Le, width, signed, x, y),
                    BinOp::Gt => self.micro_relational(MicroOp::Lt, width, signed, y, x),
                    _ => self.micro_relational(MicroOp::Le, width, signed, y, x),
                };
                self.add_stack.push(r);
                let b = self.tc.types().boolean();
                self.type_stack.push(b);
            }

            BinOp::Dot | BinOp::Subscript | BinOp::Comma => unreachable!(),
        }
        Ok(())
    }

    fn lower_ite(&mut self) -> Result<(), ModelError> {
        let et = self.pop_type();
        let tt = self.pop_type();
        let _ct = self.pop_type();

        let (t_alg, e_alg) = {
            let types = self.tc.types();
            (types.is_algebraic(tt), types.is_algebraic(et))
        };

        if !(t_alg || e_alg) {
            // boolean, enumerative, monolithic or constant branches fit a
            // plain diagram-level conditional
            let e = self.pop_digits(1)[0];
            let t = self.pop_digits(1)[0];
            let c = self.pop_digits(1)[0];
            let r = self.enc.add_mut().ite(c, t, e);
            self.add_stack.push(r);
            self.type_stack.push(tt);
            return Ok(());
        }

        let aty = if t_alg { tt } else { et };
        let width = self.tc.types().width(aty);
        let y = self.pop_algebraic(et, width);
        let x = self.pop_algebraic(tt, width);
        let c = self.pop_digits(1)[0];

        // select through a fresh activation bit; the post-processing ties
        // it to the one-hot priority activation of the chain
        let time = self.cur_time();
        let aux = self.enc.make_bit(time);
        let z: Vec<Add> = x
            .iter()
            .zip(y.iter())
            .map(|(a, b)| self.enc.add_mut().ite(aux, *a, *b))
            .collect();

        let md = MuxDescriptor {
            width,
            z: z.clone(),
            cnd: c,
            aux,
            x,
            y,
        };
        debug!("registered {md}");
        self.mux_chain.push(md);

        self.push_digits(&z);
        self.type_stack.push(aty);
        Ok(())
    }

    fn lower_subscript(&mut self) -> Result<(), ModelError> {
        let it = self.pop_type();
        let at = self.pop_type();

        let (element, size) = match self.tc.types().get(at) {
            Type::Array { element, size } => (*element, *size),
            _ => panic!("subscript on a non-array survived type checking"),
        };
        let ew = self.tc.types().width(element) as usize;

        let index_is_const = self.tc.types().is_constant(it);
        let n = self.dd_count(it);
        let mut index = self.pop_digits(n);
        let arr = self.pop_digits(ew * size as usize);

        if index_is_const {
            if let Some(v) = self.enc.add().terminal_value(index[0]) {
                // a plain literal selects its row directly; bounds were
                // established by the type checker
                let row = arr[v as usize * ew..(v as usize + 1) * ew].to_vec();
                self.push_digits(&row);
                self.type_stack.push(element);
                return Ok(());
            }
            // compound constant selectors (e.g. conditionals over
            // literals) go through the guarded chain like variables
            let needed = selector_width(size);
            index = self.promote_const(index[0], needed);
        }

        // guarded selection: for each legal row j, the selector equals j
        // digit by digit; rows are chained through conditionals
        let iw = index.len();
        let mut out = Vec::with_capacity(ew);
        for i in 0..ew {
            let mut res = self.enc.add_mut().zero();
            for j in 0..size as usize {
                let mut cond = self.enc.add_mut().one();
                for (k, sel) in index.iter().enumerate().take(iw) {
                    let mgr = self.enc.add_mut();
                    let digit = mgr.constant(((j >> (k as u32 * NIBBLE_SIZE as u32)) & 0xF) as Value);
                    let eq = mgr.apply(AddOp::Equals, *sel, digit);
                    cond = mgr.apply(AddOp::And, cond, eq);
                }
                res = self.enc.add_mut().ite(cond, arr[j * ew + i], res);
            }
            out.push(res);
        }

        self.push_digits(&out);
        self.type_stack.push(element);
        Ok(())
    }
}

impl Walker for Compiler<'_> {
    type Error = ModelError;

    fn previsit(&mut self, pool: &ExprPool, expr: ExprId) -> Result<bool, ModelError> {
        if self.cache_hit(expr) {
            return Ok(false);
        }

        match *pool.node(expr) {
            ExprNode::Next(_) => {
                self.marks.push((self.micros.len(), self.mux_chain.len()));
                let t = self.cur_time();
                self.time_stack.push(t.wrapping_add(1));
                Ok(true)
            }
            ExprNode::Binary(BinOp::Dot, _, _) => {
                // member access resolves through the instance context and
                // never descends generically
                self.marks.push((self.micros.len(), self.mux_chain.len()));
                let ctx = self.cur_ctx();
                let (inner_ctx, field) = resolve_path(pool, ctx, expr)?;
                self.ctx_stack.push(inner_ctx);
                let res = self.resolve_leaf(field);
                self.ctx_stack.pop();
                res?;
                self.store_cache(expr);
                Ok(false)
            }
            _ => {
                self.marks.push((self.micros.len(), self.mux_chain.len()));
                Ok(true)
            }
        }
    }

    fn postvisit(&mut self, pool: &ExprPool, expr: ExprId) -> Result<(), ModelError> {
        match *pool.node(expr) {
            ExprNode::Num(v) => self.push_const(v),
            ExprNode::Ident(name) => self.resolve_leaf(name)?,
            ExprNode::Not(_) => self.lower_not(expr)?,
            ExprNode::Neg(_) => self.lower_neg(expr)?,
            ExprNode::Next(_) => {
                // the child compiled one step ahead; restore the clock
                self.time_stack.pop();
            }
            ExprNode::Binary(op, _, _) => self.lower_binary(op, expr)?,
            ExprNode::Ite(_, _, _) => self.lower_ite()?,
        }
        self.store_cache(expr);
        Ok(())
    }
}
