//! Micro-operator template library.
//!
//! Operators the compiler defers (multiplication, division, modulus,
//! shifts, algebraic comparators, complement and negation) are expanded
//! into clauses here. A template is a clause set over placeholder
//! variables with a fixed numbering — first operand bits, second operand
//! bits, output bits, then auxiliaries — instantiated per descriptor by
//! binding placeholders to solver literals and allocating fresh variables
//! for the auxiliaries. Templates are cached per `<signedness, op,
//! width>` triple.
//!
//! When the environment variable named by [`MICROCODE_PATH_ENV`] points
//! at a directory, `<triple>.cnf` fragments found there take precedence
//! over the builtin synthesiser. A fragment starts with a header line
//! `t <nx> <ny> <nz> <naux>` followed by one zero-terminated clause per
//! line in the placeholder numbering.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use argus_compile::{CompilationUnit, MicroDescriptor, MicroOp, OpTriple};
use argus_expr::{Step, NIBBLE_SIZE};
use log::{debug, trace, warn};

use crate::engine::{Engine, Group};

/// Environment variable naming the template fragment directory
pub const MICROCODE_PATH_ENV: &str = "ARGUS_MICROCODE_PATH";

/// A clause template over placeholder variables
#[derive(Debug, Clone)]
pub struct Template {
    /// First operand bit count
    pub nx: usize,
    /// Second operand bit count (0 for unary operators)
    pub ny: usize,
    /// Output bit count
    pub nz: usize,
    /// Auxiliary variable count
    pub naux: usize,
    /// Clauses in placeholder numbering (1-based; x, y, z, aux)
    pub clauses: Vec<Vec<i32>>,
}

/// Loads templates from disk when available, synthesising them otherwise
#[derive(Debug, Default)]
pub struct MicroLoader {
    dir: Option<PathBuf>,
    cache: HashMap<OpTriple, Arc<Template>>,
}

impl MicroLoader {
    /// Loader honouring [`MICROCODE_PATH_ENV`]
    pub fn from_env() -> Self {
        let dir = std::env::var_os(MICROCODE_PATH_ENV).map(PathBuf::from);
        if let Some(d) = &dir {
            debug!("micro-operator templates from {}", d.display());
        }
        Self {
            dir,
            cache: HashMap::new(),
        }
    }

    /// Loader ignoring the environment (builtin synthesis only)
    pub fn builtin() -> Self {
        Self::default()
    }

    /// The template for one operator triple
    pub fn get(&mut self, triple: OpTriple) -> Arc<Template> {
        if let Some(t) = self.cache.get(&triple) {
            return t.clone();
        }

        let template = self
            .load_fragment(triple)
            .unwrap_or_else(|| Arc::new(synthesize(triple)));
        self.cache.insert(triple, template.clone());
        template
    }

    fn load_fragment(&self, triple: OpTriple) -> Option<Arc<Template>> {
        let dir = self.dir.as_ref()?;
        let path = dir.join(format!("{triple}.cnf"));
        let text = std::fs::read_to_string(&path).ok()?;
        match parse_fragment(&text) {
            Ok(t) => {
                debug!("loaded template {} from {}", triple, path.display());
                Some(Arc::new(t))
            }
            Err(e) => {
                warn!(
                    "ignoring malformed template fragment {}: {e}",
                    path.display()
                );
                None
            }
        }
    }
}

fn parse_fragment(text: &str) -> Result<Template, String> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next().ok_or("empty fragment")?;
    let mut parts = header.split_whitespace();
    if parts.next() != Some("t") {
        return Err("missing `t` header".to_string());
    }
    let mut field = || -> Result<usize, String> {
        parts
            .next()
            .ok_or("truncated header")?
            .parse()
            .map_err(|e| format!("bad header field: {e}"))
    };
    let nx = field()?;
    let ny = field()?;
    let nz = field()?;
    let naux = field()?;
    let max_var = (nx + ny + nz + naux) as i32;

    let mut clauses = Vec::new();
    for line in lines {
        let mut clause = Vec::new();
        for tok in line.split_whitespace() {
            let lit: i32 = tok.parse().map_err(|e| format!("bad literal: {e}"))?;
            if lit == 0 {
                break;
            }
            if lit.abs() > max_var {
                return Err(format!("literal {lit} outside the placeholder range"));
            }
            clause.push(lit);
        }
        if !clause.is_empty() {
            clauses.push(clause);
        }
    }

    Ok(Template {
        nx,
        ny,
        nz,
        naux,
        clauses,
    })
}

// -- builtin synthesis -------------------------------------------------

/// Gate-level template builder over placeholder variables
struct Tb {
    nx: usize,
    ny: usize,
    nz: usize,
    next: i32,
    true_lit: Option<i32>,
    clauses: Vec<Vec<i32>>,
}

impl Tb {
    fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self {
            nx,
            ny,
            nz,
            next: (nx + ny + nz) as i32,
            true_lit: None,
            clauses: Vec::new(),
        }
    }

    fn x(&self, i: usize) -> i32 {
        (i + 1) as i32
    }

    fn y(&self, i: usize) -> i32 {
        (self.nx + i + 1) as i32
    }

    fn z(&self, i: usize) -> i32 {
        (self.nx + self.ny + i + 1) as i32
    }

    fn fresh(&mut self) -> i32 {
        self.next += 1;
        self.next
    }

    fn clause(&mut self, lits: Vec<i32>) {
        self.clauses.push(lits);
    }

    fn tru(&mut self) -> i32 {
        if let Some(t) = self.true_lit {
            return t;
        }
        let t = self.fresh();
        self.clause(vec![t]);
        self.true_lit = Some(t);
        t
    }

    fn fls(&mut self) -> i32 {
        -self.tru()
    }

    fn and(&mut self, a: i32, b: i32) -> i32 {
        let c = self.fresh();
        self.clause(vec![-a, -b, c]);
        self.clause(vec![a, -c]);
        self.clause(vec![b, -c]);
        c
    }

    fn or(&mut self, a: i32, b: i32) -> i32 {
        let c = self.fresh();
        self.clause(vec![a, b, -c]);
        self.clause(vec![-a, c]);
        self.clause(vec![-b, c]);
        c
    }

    fn xor(&mut self, a: i32, b: i32) -> i32 {
        let c = self.fresh();
        self.clause(vec![-a, -b, -c]);
        self.clause(vec![a, b, -c]);
        self.clause(vec![a, -b, c]);
        self.clause(vec![-a, b, c]);
        c
    }

    /// `s ? a : b`
    fn mux(&mut self, s: i32, a: i32, b: i32) -> i32 {
        let o = self.fresh();
        self.clause(vec![-s, -a, o]);
        self.clause(vec![-s, a, -o]);
        self.clause(vec![s, -b, o]);
        self.clause(vec![s, b, -o]);
        o
    }

    fn equiv(&mut self, a: i32, b: i32) {
        self.clause(vec![-a, b]);
        self.clause(vec![a, -b]);
    }

    fn full_adder(&mut self, a: i32, b: i32, cin: i32) -> (i32, i32) {
        let t = self.xor(a, b);
        let s = self.xor(t, cin);
        let ab = self.and(a, b);
        let tc = self.and(t, cin);
        let cout = self.or(ab, tc);
        (s, cout)
    }

    /// `a + b + cin` over equal-length vectors, final carry dropped
    fn ripple_add(&mut self, a: &[i32], b: &[i32], cin: i32) -> Vec<i32> {
        let mut carry = cin;
        let mut out = Vec::with_capacity(a.len());
        for (ai, bi) in a.iter().zip(b.iter()) {
            let (s, c) = self.full_adder(*ai, *bi, carry);
            out.push(s);
            carry = c;
        }
        out
    }

    /// Unsigned `a < b` over equal-length vectors, least significant
    /// first
    fn less_than(&mut self, a: &[i32], b: &[i32]) -> i32 {
        let mut lt = self.fls();
        for (ai, bi) in a.iter().zip(b.iter()) {
            let gtless = self.and(-*ai, *bi);
            let ne = self.xor(*ai, *bi);
            let keep = self.and(-ne, lt);
            lt = self.or(gtless, keep);
        }
        lt
    }

    fn or_chain(&mut self, lits: &[i32]) -> i32 {
        let mut acc = self.fls();
        for l in lits {
            acc = self.or(acc, *l);
        }
        acc
    }
}

/// Synthesise the builtin template for a triple
pub fn synthesize(triple: OpTriple) -> Template {
    let n = triple.width as usize * NIBBLE_SIZE as usize;
    let mut tb = match triple.op {
        MicroOp::Not | MicroOp::Neg => Tb::new(n, 0, n),
        MicroOp::Lt | MicroOp::Le => Tb::new(n, n, 1),
        _ => Tb::new(n, n, n),
    };

    match triple.op {
        MicroOp::Not => {
            for i in 0..n {
                let x = tb.x(i);
                let z = tb.z(i);
                tb.equiv(z, -x);
            }
        }

        MicroOp::Neg => {
            // two's complement: ~x + 1 through a half-adder chain
            let mut carry = tb.tru();
            for i in 0..n {
                let nx = -tb.x(i);
                let s = tb.xor(nx, carry);
                carry = tb.and(nx, carry);
                let z = tb.z(i);
                tb.equiv(z, s);
            }
        }

        MicroOp::Mul => {
            // shift-and-add, wrapping modulo 2^n (identical for signed
            // two's complement)
            let y0 = tb.y(0);
            let mut acc: Vec<i32> = (0..n)
                .map(|j| {
                    let xj = tb.x(j);
                    tb.and(xj, y0)
                })
                .collect();
            for i in 1..n {
                let yi = tb.y(i);
                let row: Vec<i32> = (0..n - i)
                    .map(|j| {
                        let xj = tb.x(j);
                        tb.and(xj, yi)
                    })
                    .collect();
                let upper = acc[i..].to_vec();
                let zero = tb.fls();
                let sum = tb.ripple_add(&upper, &row, zero);
                acc[i..].copy_from_slice(&sum);
            }
            for j in 0..n {
                let z = tb.z(j);
                tb.equiv(z, acc[j]);
            }
        }

        MicroOp::Div | MicroOp::Mod => {
            // restoring long division; a zero divisor pins the result to 0
            let fls = tb.fls();
            let tru = tb.tru();
            let mut r: Vec<i32> = (0..=n).map(|_| fls).collect();
            let mut q: Vec<i32> = (0..n).map(|_| fls).collect();

            // y extended to n+1 bits, and its complement for subtraction
            let y_ext: Vec<i32> = (0..n).map(|i| tb.y(i)).chain([fls]).collect();
            let not_y: Vec<i32> = y_ext.iter().map(|l| -*l).collect();

            for i in (0..n).rev() {
                // r = (r << 1) | x_i
                let mut shifted = Vec::with_capacity(n + 1);
                shifted.push(tb.x(i));
                shifted.extend_from_slice(&r[..n]);

                let lt = tb.less_than(&shifted, &y_ext);
                let ge = -lt;
                q[i] = ge;

                let diff = tb.ripple_add(&shifted, &not_y, tru);
                r = (0..=n)
                    .map(|j| tb.mux(ge, diff[j], shifted[j]))
                    .collect();
            }

            let y_bits: Vec<i32> = (0..n).map(|i| tb.y(i)).collect();
            let nonzero = tb.or_chain(&y_bits);
            let out = if triple.op == MicroOp::Div { q } else { r[..n].to_vec() };
            for j in 0..n {
                let gated = tb.and(nonzero, out[j]);
                let z = tb.z(j);
                tb.equiv(z, gated);
            }
        }

        MicroOp::Lshift | MicroOp::Rshift => {
            let right = triple.op == MicroOp::Rshift;
            // arithmetic right shift for signed operands
            let fill = if right && triple.signed {
                tb.x(n - 1)
            } else {
                tb.fls()
            };

            let mut cur: Vec<i32> = (0..n).map(|i| tb.x(i)).collect();
            let mut stage = 0;
            while (1usize << stage) < n {
                let dist = 1usize << stage;
                let ys = tb.y(stage);
                cur = (0..n)
                    .map(|j| {
                        let from = if right {
                            if j + dist < n { cur[j + dist] } else { fill }
                        } else if j >= dist {
                            cur[j - dist]
                        } else {
                            tb.fls()
                        };
                        tb.mux(ys, from, cur[j])
                    })
                    .collect();
                stage += 1;
            }

            // any shift amount >= n saturates
            let high_bits: Vec<i32> = (stage..n).map(|s| tb.y(s)).collect();
            let saturate = tb.or_chain(&high_bits);
            for j in 0..n {
                let sat = tb.mux(saturate, fill, cur[j]);
                let z = tb.z(j);
                tb.equiv(z, sat);
            }
        }

        MicroOp::Lt | MicroOp::Le => {
            // a signed comparison is the unsigned one with inverted sign
            // bits
            let mut a: Vec<i32> = (0..n).map(|i| tb.x(i)).collect();
            let mut b: Vec<i32> = (0..n).map(|i| tb.y(i)).collect();
            if triple.signed {
                a[n - 1] = -a[n - 1];
                b[n - 1] = -b[n - 1];
            }
            let lt = tb.less_than(&a, &b);
            let result = if triple.op == MicroOp::Le {
                let mut all_eq = tb.tru();
                for (ai, bi) in a.iter().zip(b.iter()) {
                    let ne = tb.xor(*ai, *bi);
                    all_eq = tb.and(all_eq, -ne);
                }
                tb.or(lt, all_eq)
            } else {
                lt
            };
            let z = tb.z(0);
            tb.equiv(z, result);
        }
    }

    let naux = tb.next as usize - (tb.nx + tb.ny + tb.nz);
    trace!(
        "synthesized template {} ({} clauses, {} auxiliaries)",
        triple,
        tb.clauses.len(),
        naux
    );
    Template {
        nx: tb.nx,
        ny: tb.ny,
        nz: tb.nz,
        naux,
        clauses: tb.clauses,
    }
}

// -- instantiation -----------------------------------------------------

impl Engine {
    /// Expand a micro descriptor into clauses at `time`
    pub fn assert_micro(
        &mut self,
        md: &MicroDescriptor,
        time: Step,
        group: Option<Group>,
        loader: &mut MicroLoader,
    ) {
        let x_lits: Vec<i32> = md
            .x_bits
            .iter()
            .map(|b| self.literal_for(*b, time, group))
            .collect();
        let y_lits: Vec<i32> = md
            .y_bits
            .iter()
            .map(|b| self.literal_for(*b, time, group))
            .collect();
        let z_lits: Vec<i32> = md
            .z_bits
            .iter()
            .map(|b| self.literal_for(*b, time, group))
            .collect();

        let template = loader.get(md.triple);
        assert_eq!(template.nx, x_lits.len(), "template arity mismatch");
        assert_eq!(template.ny, y_lits.len(), "template arity mismatch");
        assert_eq!(template.nz, z_lits.len(), "template arity mismatch");

        let aux: Vec<i32> = (0..template.naux).map(|_| self.fresh_var()).collect();
        let bind = |lit: i32| -> i32 {
            let id = lit.unsigned_abs() as usize;
            let mapped = if id <= template.nx {
                x_lits[id - 1]
            } else if id <= template.nx + template.ny {
                y_lits[id - template.nx - 1]
            } else if id <= template.nx + template.ny + template.nz {
                z_lits[id - template.nx - template.ny - 1]
            } else {
                aux[id - template.nx - template.ny - template.nz - 1]
            };
            if lit < 0 {
                -mapped
            } else {
                mapped
            }
        };

        for clause in &template.clauses {
            let lits = clause.iter().map(|l| bind(*l)).collect();
            self.add_clause(lits, group);
        }
        trace!(
            "engine `{}`: expanded {} at time {time}",
            self.name(),
            md.triple
        );
    }

    /// Assert a compiled boolean formula at `time`: project every result
    /// diagram and expand every micro descriptor. Multiplexer chains need
    /// no extra clauses; their activation constraints are part of the
    /// unit's diagram vector.
    pub fn assert_unit(
        &mut self,
        unit: &CompilationUnit,
        time: Step,
        group: Option<Group>,
        loader: &mut MicroLoader,
    ) {
        for dd in &unit.dds {
            self.push_no_cut(*dd, time, group);
        }
        for md in &unit.micros {
            self.assert_micro(md, time, group, loader);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fragment_round_trip() {
        let text = "t 2 2 2 1\n1 -3 0\n-2 4 5 0\n";
        let t = parse_fragment(text).unwrap();
        assert_eq!((t.nx, t.ny, t.nz, t.naux), (2, 2, 2, 1));
        assert_eq!(t.clauses, vec![vec![1, -3], vec![-2, 4, 5]]);
    }

    #[test]
    fn test_parse_fragment_rejects_out_of_range() {
        let text = "t 1 1 1 0\n9 0\n";
        assert!(parse_fragment(text).is_err());
    }

    #[test]
    fn test_parse_fragment_rejects_missing_header() {
        assert!(parse_fragment("1 2 0\n").is_err());
    }

    #[test]
    fn test_synthesize_shapes() {
        let mul = synthesize(OpTriple {
            signed: false,
            op: MicroOp::Mul,
            width: 1,
        });
        assert_eq!((mul.nx, mul.ny, mul.nz), (4, 4, 4));
        assert!(!mul.clauses.is_empty());

        let lt = synthesize(OpTriple {
            signed: true,
            op: MicroOp::Lt,
            width: 2,
        });
        assert_eq!((lt.nx, lt.ny, lt.nz), (8, 8, 1));

        let not = synthesize(OpTriple {
            signed: false,
            op: MicroOp::Not,
            width: 1,
        });
        assert_eq!((not.nx, not.ny, not.nz), (4, 0, 4));
    }

    #[test]
    fn test_loader_caches() {
        let mut loader = MicroLoader::builtin();
        let triple = OpTriple {
            signed: false,
            op: MicroOp::Mul,
            width: 1,
        };
        let a = loader.get(triple);
        let b = loader.get(triple);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
