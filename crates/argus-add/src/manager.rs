//! The ADD manager: hash-consed node storage and memoized operators.

use std::collections::{BTreeSet, HashMap};

use log::trace;

/// Scalar terminal value
pub type Value = i64;

/// Reference to a node owned by an [`AddManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Add(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Terminal(Value),
    Internal { var: u32, high: Add, low: Add },
}

/// Binary terminal operators.
///
/// The logical group treats values as truth (nonzero = true) and yields
/// 0/1 terminals; the bitwise group operates on nibble digits; the
/// arithmetic group wraps on 64 bits (digit arithmetic never comes close).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddOp {
    /// Logical conjunction over 0/1 diagrams
    And,
    /// Logical disjunction over 0/1 diagrams
    Or,
    /// Logical exclusive-or over 0/1 diagrams
    Xor,
    /// Logical equivalence over 0/1 diagrams
    Xnor,
    /// Arithmetic sum
    Plus,
    /// Arithmetic difference
    Minus,
    /// Arithmetic product
    Times,
    /// Arithmetic quotient; division by zero yields 0
    Divide,
    /// Truncating remainder (sign follows the dividend); modulus by zero
    /// yields 0
    Modulus,
    /// Strictly-less comparison, 0/1 result
    Lt,
    /// Less-or-equal comparison, 0/1 result
    Leq,
    /// Equality comparison, 0/1 result
    Equals,
    /// Bitwise conjunction on nibble digits
    BwAnd,
    /// Bitwise disjunction on nibble digits
    BwOr,
    /// Bitwise exclusive-or on nibble digits
    BwXor,
    /// Bitwise equivalence on nibble digits (nibble-masked)
    BwXnor,
    /// Left shift; shifts ≥ 64 yield 0
    LShift,
    /// Right shift; shifts ≥ 64 yield 0
    RShift,
}

const NIBBLE_MASK: Value = 0xF;

impl AddOp {
    fn eval(self, x: Value, y: Value) -> Value {
        match self {
            AddOp::And => ((x != 0) && (y != 0)) as Value,
            AddOp::Or => ((x != 0) || (y != 0)) as Value,
            AddOp::Xor => ((x != 0) != (y != 0)) as Value,
            AddOp::Xnor => ((x != 0) == (y != 0)) as Value,
            AddOp::Plus => x.wrapping_add(y),
            AddOp::Minus => x.wrapping_sub(y),
            AddOp::Times => x.wrapping_mul(y),
            AddOp::Divide => {
                if y == 0 {
                    0
                } else {
                    x.wrapping_div(y)
                }
            }
            AddOp::Modulus => {
                if y == 0 {
                    0
                } else {
                    // truncating remainder, following the dividend's sign
                    x.wrapping_rem(y)
                }
            }
            AddOp::Lt => (x < y) as Value,
            AddOp::Leq => (x <= y) as Value,
            AddOp::Equals => (x == y) as Value,
            AddOp::BwAnd => x & y,
            AddOp::BwOr => x | y,
            AddOp::BwXor => x ^ y,
            AddOp::BwXnor => !(x ^ y) & NIBBLE_MASK,
            AddOp::LShift => {
                if !(0..64).contains(&y) {
                    0
                } else {
                    x.wrapping_shl(y as u32)
                }
            }
            AddOp::RShift => {
                if !(0..64).contains(&y) {
                    0
                } else {
                    x.wrapping_shr(y as u32)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum UnOp {
    Cmpl,
    Negate,
    BwNot,
}

impl UnOp {
    fn eval(self, x: Value) -> Value {
        match self {
            UnOp::Cmpl => (x == 0) as Value,
            UnOp::Negate => x.wrapping_neg(),
            UnOp::BwNot => !x & NIBBLE_MASK,
        }
    }
}

/// Hash-consed ADD node storage with memoized operators
#[derive(Debug)]
pub struct AddManager {
    nodes: Vec<Node>,
    terminal_ids: HashMap<Value, Add>,
    unique: HashMap<(u32, Add, Add), Add>,
    apply_cache: HashMap<(AddOp, Add, Add), Add>,
    unary_cache: HashMap<(UnOp, Add), Add>,
    ite_cache: HashMap<(Add, Add, Add), Add>,
    var_count: u32,
    zero: Add,
    one: Add,
}

impl Default for AddManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AddManager {
    /// Create a manager with the 0 and 1 terminals preallocated
    pub fn new() -> Self {
        let mut mgr = Self {
            nodes: Vec::new(),
            terminal_ids: HashMap::new(),
            unique: HashMap::new(),
            apply_cache: HashMap::new(),
            unary_cache: HashMap::new(),
            ite_cache: HashMap::new(),
            var_count: 0,
            zero: Add(0),
            one: Add(0),
        };
        mgr.zero = mgr.constant(0);
        mgr.one = mgr.constant(1);
        mgr
    }

    /// The constant-0 diagram
    pub fn zero(&self) -> Add {
        self.zero
    }

    /// The constant-1 diagram
    pub fn one(&self) -> Add {
        self.one
    }

    /// Number of allocated decision variables
    pub fn var_count(&self) -> u32 {
        self.var_count
    }

    /// Number of interned nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Materialise a constant terminal
    pub fn constant(&mut self, value: Value) -> Add {
        if let Some(id) = self.terminal_ids.get(&value) {
            return *id;
        }
        let id = Add(self.nodes.len() as u32);
        self.nodes.push(Node::Terminal(value));
        self.terminal_ids.insert(value, id);
        id
    }

    /// Allocate a fresh boolean decision variable and return its 0/1
    /// indicator diagram
    pub fn bit(&mut self) -> Add {
        let var = self.var_count;
        self.var_count += 1;
        let one = self.one;
        let zero = self.zero;
        let node = self.mk_node(var, one, zero);
        trace!("allocated bit variable {var}");
        node
    }

    fn mk_node(&mut self, var: u32, high: Add, low: Add) -> Add {
        if high == low {
            return high;
        }
        if let Some(id) = self.unique.get(&(var, high, low)) {
            return *id;
        }
        let id = Add(self.nodes.len() as u32);
        self.nodes.push(Node::Internal { var, high, low });
        self.unique.insert((var, high, low), id);
        id
    }

    // -- structural accessors ------------------------------------------

    /// True for terminal nodes
    pub fn is_terminal(&self, n: Add) -> bool {
        matches!(self.nodes[n.0 as usize], Node::Terminal(_))
    }

    /// Terminal value, if `n` is a terminal
    pub fn terminal_value(&self, n: Add) -> Option<Value> {
        match self.nodes[n.0 as usize] {
            Node::Terminal(v) => Some(v),
            Node::Internal { .. } => None,
        }
    }

    /// Decision variable of an internal node
    pub fn var(&self, n: Add) -> Option<u32> {
        match self.nodes[n.0 as usize] {
            Node::Terminal(_) => None,
            Node::Internal { var, .. } => Some(var),
        }
    }

    /// High (then) child of an internal node
    pub fn high(&self, n: Add) -> Option<Add> {
        match self.nodes[n.0 as usize] {
            Node::Terminal(_) => None,
            Node::Internal { high, .. } => Some(high),
        }
    }

    /// Low (else) child of an internal node
    pub fn low(&self, n: Add) -> Option<Add> {
        match self.nodes[n.0 as usize] {
            Node::Terminal(_) => None,
            Node::Internal { low, .. } => Some(low),
        }
    }

    fn top_var(&self, ns: &[Add]) -> Option<u32> {
        ns.iter()
            .filter_map(|n| self.var(*n))
            .min()
    }

    fn cofactors(&self, n: Add, var: u32) -> (Add, Add) {
        match self.nodes[n.0 as usize] {
            Node::Terminal(_) => (n, n),
            Node::Internal { var: v, high, low } => {
                if v == var {
                    (high, low)
                } else {
                    (n, n)
                }
            }
        }
    }

    // -- operators -----------------------------------------------------

    /// Apply a binary terminal operator with Shannon expansion
    pub fn apply(&mut self, op: AddOp, a: Add, b: Add) -> Add {
        if let (Some(x), Some(y)) = (self.terminal_value(a), self.terminal_value(b)) {
            return self.constant(op.eval(x, y));
        }
        if let Some(r) = self.apply_cache.get(&(op, a, b)) {
            return *r;
        }

        let var = self
            .top_var(&[a, b])
            .expect("non-terminal apply without a decision variable");
        let (a1, a0) = self.cofactors(a, var);
        let (b1, b0) = self.cofactors(b, var);
        let high = self.apply(op, a1, b1);
        let low = self.apply(op, a0, b0);
        let r = self.mk_node(var, high, low);
        self.apply_cache.insert((op, a, b), r);
        r
    }

    fn apply_unary(&mut self, op: UnOp, a: Add) -> Add {
        if let Some(x) = self.terminal_value(a) {
            return self.constant(op.eval(x));
        }
        if let Some(r) = self.unary_cache.get(&(op, a)) {
            return *r;
        }
        let var = self.var(a).expect("internal node");
        let (a1, a0) = self.cofactors(a, var);
        let high = self.apply_unary(op, a1);
        let low = self.apply_unary(op, a0);
        let r = self.mk_node(var, high, low);
        self.unary_cache.insert((op, a), r);
        r
    }

    /// Logical complement of a 0/1 diagram
    pub fn cmpl(&mut self, a: Add) -> Add {
        self.apply_unary(UnOp::Cmpl, a)
    }

    /// Arithmetic negation
    pub fn negate(&mut self, a: Add) -> Add {
        self.apply_unary(UnOp::Negate, a)
    }

    /// Nibble-masked bitwise complement
    pub fn bw_not(&mut self, a: Add) -> Add {
        self.apply_unary(UnOp::BwNot, a)
    }

    /// If-then-else: `f` is a 0/1 diagram selecting between `g` and `h`
    pub fn ite(&mut self, f: Add, g: Add, h: Add) -> Add {
        if let Some(v) = self.terminal_value(f) {
            return if v != 0 { g } else { h };
        }
        if g == h {
            return g;
        }
        if let Some(r) = self.ite_cache.get(&(f, g, h)) {
            return *r;
        }

        let var = self
            .top_var(&[f, g, h])
            .expect("non-terminal ite without a decision variable");
        let (f1, f0) = self.cofactors(f, var);
        let (g1, g0) = self.cofactors(g, var);
        let (h1, h0) = self.cofactors(h, var);
        let high = self.ite(f1, g1, h1);
        let low = self.ite(f0, g0, h0);
        let r = self.mk_node(var, high, low);
        self.ite_cache.insert((f, g, h), r);
        r
    }

    /// Evaluate under a (partial) bit assignment; `None` if a decision
    /// variable on the chosen path is unassigned.
    pub fn eval(&self, n: Add, assignment: &HashMap<u32, bool>) -> Option<Value> {
        let mut cur = n;
        loop {
            match self.nodes[cur.0 as usize] {
                Node::Terminal(v) => return Some(v),
                Node::Internal { var, high, low } => match assignment.get(&var) {
                    Some(true) => cur = high,
                    Some(false) => cur = low,
                    None => return None,
                },
            }
        }
    }

    /// Decision variables the diagram depends on, ascending
    pub fn support(&self, n: Add) -> Vec<u32> {
        let mut seen = BTreeSet::new();
        let mut visited = BTreeSet::new();
        self.support_rec(n, &mut seen, &mut visited);
        seen.into_iter().collect()
    }

    fn support_rec(&self, n: Add, seen: &mut BTreeSet<u32>, visited: &mut BTreeSet<Add>) {
        if !visited.insert(n) {
            return;
        }
        if let Node::Internal { var, high, low } = self.nodes[n.0 as usize] {
            seen.insert(var);
            self.support_rec(high, seen, visited);
            self.support_rec(low, seen, visited);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_are_interned() {
        let mut mgr = AddManager::new();
        assert_eq!(mgr.constant(0), mgr.zero());
        assert_eq!(mgr.constant(1), mgr.one());
        assert_eq!(mgr.constant(7), mgr.constant(7));
    }

    #[test]
    fn test_terminal_arithmetic() {
        let mut mgr = AddManager::new();
        let a = mgr.constant(6);
        let b = mgr.constant(4);

        let sum = mgr.apply(AddOp::Plus, a, b);
        assert_eq!(mgr.terminal_value(sum), Some(10));

        let prod = mgr.apply(AddOp::Times, a, b);
        assert_eq!(mgr.terminal_value(prod), Some(24));

        let div = mgr.apply(AddOp::Divide, a, b);
        assert_eq!(mgr.terminal_value(div), Some(1));

        let zero = mgr.zero();
        let by_zero = mgr.apply(AddOp::Divide, a, zero);
        assert_eq!(mgr.terminal_value(by_zero), Some(0));

        let rem = mgr.apply(AddOp::Modulus, a, b);
        assert_eq!(mgr.terminal_value(rem), Some(2));

        // remainder follows the dividend's sign and honours a/b*b + a%b
        let neg = mgr.constant(-7);
        let three = mgr.constant(3);
        let q = mgr.apply(AddOp::Divide, neg, three);
        let r = mgr.apply(AddOp::Modulus, neg, three);
        assert_eq!(mgr.terminal_value(q), Some(-2));
        assert_eq!(mgr.terminal_value(r), Some(-1));
    }

    #[test]
    fn test_bit_and_logic() {
        let mut mgr = AddManager::new();
        let x = mgr.bit();
        let y = mgr.bit();

        let both = mgr.apply(AddOp::And, x, y);
        let mut assignment = HashMap::new();
        assignment.insert(0, true);
        assignment.insert(1, false);
        assert_eq!(mgr.eval(both, &assignment), Some(0));
        assignment.insert(1, true);
        assert_eq!(mgr.eval(both, &assignment), Some(1));

        let not_x = mgr.cmpl(x);
        assert_eq!(mgr.eval(not_x, &assignment), Some(0));
    }

    #[test]
    fn test_eval_partial_assignment() {
        let mut mgr = AddManager::new();
        let x = mgr.bit();
        let y = mgr.bit();
        let or = mgr.apply(AddOp::Or, x, y);

        let assignment = HashMap::from([(0, false)]);
        assert_eq!(mgr.eval(or, &assignment), None);

        let assignment = HashMap::from([(0, true)]);
        // short-circuits on the high branch of x
        assert_eq!(mgr.eval(or, &assignment), Some(1));
    }

    #[test]
    fn test_monolithic_sum() {
        // res = x*2 + y encodes a 2-bit value; check all four paths
        let mut mgr = AddManager::new();
        let x = mgr.bit();
        let y = mgr.bit();
        let two = mgr.constant(2);
        let scaled = mgr.apply(AddOp::Times, x, two);
        let packed = mgr.apply(AddOp::Plus, scaled, y);

        for (xv, yv, expect) in [
            (false, false, 0),
            (false, true, 1),
            (true, false, 2),
            (true, true, 3),
        ] {
            let assignment = HashMap::from([(0, xv), (1, yv)]);
            assert_eq!(mgr.eval(packed, &assignment), Some(expect));
        }
    }

    #[test]
    fn test_ite() {
        let mut mgr = AddManager::new();
        let c = mgr.bit();
        let a = mgr.constant(5);
        let b = mgr.constant(9);
        let sel = mgr.ite(c, a, b);

        assert_eq!(mgr.eval(sel, &HashMap::from([(0, true)])), Some(5));
        assert_eq!(mgr.eval(sel, &HashMap::from([(0, false)])), Some(9));

        // constant condition collapses
        let one = mgr.one();
        assert_eq!(mgr.ite(one, a, b), a);
    }

    #[test]
    fn test_equals_builds_predicate() {
        let mut mgr = AddManager::new();
        let x = mgr.bit();
        let five = mgr.constant(5);
        let two = mgr.constant(2);
        let scaled = mgr.apply(AddOp::Times, x, two);
        // (2x) == 2 iff x
        let pred = mgr.apply(AddOp::Equals, scaled, two);
        assert_eq!(mgr.eval(pred, &HashMap::from([(0, true)])), Some(1));
        assert_eq!(mgr.eval(pred, &HashMap::from([(0, false)])), Some(0));

        let never = mgr.apply(AddOp::Equals, scaled, five);
        assert_eq!(never, mgr.zero());
    }

    #[test]
    fn test_support() {
        let mut mgr = AddManager::new();
        let x = mgr.bit();
        let _skip = mgr.bit();
        let z = mgr.bit();
        let e = mgr.apply(AddOp::Xor, x, z);
        assert_eq!(mgr.support(e), vec![0, 2]);
        assert!(mgr.support(mgr.one()).is_empty());
    }

    #[test]
    fn test_hash_consing_shares_nodes() {
        let mut mgr = AddManager::new();
        let x = mgr.bit();
        let y = mgr.bit();
        let e1 = mgr.apply(AddOp::And, x, y);
        let e2 = mgr.apply(AddOp::And, x, y);
        assert_eq!(e1, e2);
    }

    #[test]
    fn test_bitwise_nibble_ops() {
        let mut mgr = AddManager::new();
        let a = mgr.constant(0b1100);
        let b = mgr.constant(0b1010);

        let and = mgr.apply(AddOp::BwAnd, a, b);
        assert_eq!(mgr.terminal_value(and), Some(0b1000));

        let xnor = mgr.apply(AddOp::BwXnor, a, b);
        assert_eq!(mgr.terminal_value(xnor), Some(0b1001));

        let not = mgr.bw_not(a);
        assert_eq!(mgr.terminal_value(not), Some(0b0011));
    }
}
