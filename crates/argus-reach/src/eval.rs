//! Witness-backed expression evaluation.
//!
//! The evaluator walks an expression and looks leaf variables up in a
//! [`Witness`] frame; defines recurse on their body, `next` moves one
//! frame ahead. Results are memoized per (context, expression, time) for
//! the duration of one `process` call.

use std::collections::HashMap;

use argus_expr::{
    model::resolve_path,
    walker::{walk, Walker},
    Atom, BinOp, ExprId, ExprNode, ExprPool, ModelError, ScalarValue, Step, Symbol, SymbolTable,
    TimedExpr, Value,
};
use log::trace;

use crate::witness::Witness;

/// Evaluator over one witness
pub struct Evaluator<'a> {
    pool: &'a ExprPool,
    symbols: &'a SymbolTable,
    witness: &'a Witness,
    stack: Vec<ScalarValue>,
    ctx_stack: Vec<ExprId>,
    time_stack: Vec<Step>,
    cache: HashMap<TimedExpr, ScalarValue>,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator over a witness
    pub fn new(pool: &'a ExprPool, symbols: &'a SymbolTable, witness: &'a Witness) -> Self {
        Self {
            pool,
            symbols,
            witness,
            stack: Vec::new(),
            ctx_stack: Vec::new(),
            time_stack: Vec::new(),
            cache: HashMap::new(),
        }
    }

    /// Evaluate `expr` in `ctx` over the witness, anchored at `time`
    pub fn process(
        &mut self,
        ctx: ExprId,
        expr: ExprId,
        time: Step,
    ) -> Result<ScalarValue, ModelError> {
        self.stack.clear();
        self.ctx_stack.clear();
        self.time_stack.clear();
        self.cache.clear();

        self.ctx_stack.push(ctx);
        self.time_stack.push(time);
        trace!("evaluating `{}` at step {time}", self.pool.render(expr));

        let pool = self.pool;
        walk(pool, expr, self)?;

        assert_eq!(self.stack.len(), 1, "evaluator value stack imbalance");
        assert_eq!(self.ctx_stack.len(), 1, "evaluator context stack imbalance");
        assert_eq!(self.time_stack.len(), 1, "evaluator time stack imbalance");
        Ok(self.stack.pop().expect("one result"))
    }

    fn cur_ctx(&self) -> ExprId {
        *self.ctx_stack.last().expect("context stack empty")
    }

    fn cur_time(&self) -> Step {
        *self.time_stack.last().expect("time stack empty")
    }

    fn pop(&mut self) -> ScalarValue {
        self.stack.pop().expect("evaluator value stack underflow")
    }

    fn truth(&self, v: ScalarValue) -> Result<bool, ModelError> {
        match v {
            ScalarValue::Bool(b) => Ok(b),
            ScalarValue::Int(i) => Ok(i != 0),
            ScalarValue::Literal(_) => Err(ModelError::Eval {
                detail: "an enumeration literal has no truth value".to_string(),
            }),
        }
    }

    fn int(&self, v: ScalarValue) -> Result<Value, ModelError> {
        match v {
            ScalarValue::Int(i) => Ok(i),
            ScalarValue::Bool(b) => Ok(b as Value),
            ScalarValue::Literal(_) => Err(ModelError::Eval {
                detail: "an enumeration literal has no numeric value".to_string(),
            }),
        }
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
            Symbol::Constant { value, .. } => self.stack.push(ScalarValue::Int(value)),
            Symbol::Literal { .. } => self.stack.push(ScalarValue::Literal(name)),
            Symbol::Variable { .. } | Symbol::Temporary { .. } => {
                let Some(v) = self.witness.value(ctx, name, time) else {
                    return Err(ModelError::Eval {
                        detail: format!(
                            "witness holds no value for `{}` at step {time}",
                            self.pool.atom_name(name)
                        ),
                    });
                };
                self.stack.push(v);
            }
            Symbol::Define { body } => {
                let pool = self.pool;
                walk(pool, body, self)?;
            }
        }
        Ok(())
    }

    fn apply_binary(&mut self, op: BinOp, expr: ExprId) -> Result<(), ModelError> {
        let rhs = self.pop();
        let lhs = self.pop();

        let result = match op {
            BinOp::And => ScalarValue::Bool(self.truth(lhs)? && self.truth(rhs)?),
            BinOp::Or => ScalarValue::Bool(self.truth(lhs)? || self.truth(rhs)?),
            BinOp::Xor => ScalarValue::Bool(self.truth(lhs)? != self.truth(rhs)?),
            BinOp::Xnor | BinOp::Iff => ScalarValue::Bool(self.truth(lhs)? == self.truth(rhs)?),
            BinOp::Implies => ScalarValue::Bool(!self.truth(lhs)? || self.truth(rhs)?),

            BinOp::Add => ScalarValue::Int(self.int(lhs)?.wrapping_add(self.int(rhs)?)),
            BinOp::Sub => ScalarValue::Int(self.int(lhs)?.wrapping_sub(self.int(rhs)?)),
            BinOp::Mul => ScalarValue::Int(self.int(lhs)?.wrapping_mul(self.int(rhs)?)),
            BinOp::Div => {
                let d = self.int(rhs)?;
                if d == 0 {
                    return Err(ModelError::Eval {
                        detail: format!("division by zero in `{}`", self.pool.render(expr)),
                    });
                }
                ScalarValue::Int(self.int(lhs)?.wrapping_div(d))
            }
            BinOp::Mod => {
                let d = self.int(rhs)?;
                if d == 0 {
                    return Err(ModelError::Eval {
                        detail: format!("modulus by zero in `{}`", self.pool.render(expr)),
                    });
                }
                // truncating remainder, paired with the truncating
                // division above so a == (a/b)*b + a%b holds
                ScalarValue::Int(self.int(lhs)?.wrapping_rem(d))
            }
            BinOp::Lshift => {
                let s = self.int(rhs)?;
                let v = self.int(lhs)?;
                ScalarValue::Int(if (0..64).contains(&s) {
                    v.wrapping_shl(s as u32)
                } else {
                    0
                })
            }
            BinOp::Rshift => {
                let s = self.int(rhs)?;
                let v = self.int(lhs)?;
                ScalarValue::Int(if (0..64).contains(&s) {
                    v.wrapping_shr(s as u32)
                } else {
                    0
                })
            }

            BinOp::Eq | BinOp::Ne => {
                let same = match (lhs, rhs) {
                    (ScalarValue::Literal(a), ScalarValue::Literal(b)) => a == b,
                    (a, b) => self.int(a)? == self.int(b)?,
                };
                ScalarValue::Bool(if op == BinOp::Eq { same } else { !same })
            }
            BinOp::Lt => ScalarValue::Bool(self.int(lhs)? < self.int(rhs)?),
            BinOp::Le => ScalarValue::Bool(self.int(lhs)? <= self.int(rhs)?),
            BinOp::Gt => ScalarValue::Bool(self.int(lhs)? > self.int(rhs)?),
            BinOp::Ge => ScalarValue::Bool(self.int(lhs)? >= self.int(rhs)?),

            BinOp::Subscript | BinOp::Comma => {
                return Err(ModelError::Capability {
                    detail: "the witness evaluator does not index arrays".to_string(),
                })
            }
            BinOp::Dot => unreachable!("member access resolves in the pre-visit"),
        };

        self.stack.push(result);
        Ok(())
    }
}

impl Walker for Evaluator<'_> {
    type Error = ModelError;

    fn previsit(&mut self, pool: &ExprPool, expr: ExprId) -> Result<bool, ModelError> {
        let key = TimedExpr::new(self.cur_ctx(), expr, self.cur_time());
        if let Some(v) = self.cache.get(&key) {
            self.stack.push(*v);
            return Ok(false);
        }

        match *pool.node(expr) {
            ExprNode::Next(_) => {
                let t = self.cur_time();
                self.time_stack.push(t.wrapping_add(1));
                Ok(true)
            }
            ExprNode::Binary(BinOp::Dot, _, _) => {
                let ctx = self.cur_ctx();
                let (inner_ctx, field) = resolve_path(pool, ctx, expr)?;
                self.ctx_stack.push(inner_ctx);
                let res = self.resolve_leaf(field);
                self.ctx_stack.pop();
                res?;
                let v = *self.stack.last().expect("leaf pushed a value");
                self.cache.insert(key, v);
                Ok(false)
            }
            _ => Ok(true),
        }
    }

    fn postvisit(&mut self, pool: &ExprPool, expr: ExprId) -> Result<(), ModelError> {
        match *pool.node(expr) {
            ExprNode::Num(v) => self.stack.push(ScalarValue::Int(v)),
            ExprNode::Ident(name) => self.resolve_leaf(name)?,
            ExprNode::Not(_) => {
                let v = self.pop();
                let b = self.truth(v)?;
                self.stack.push(ScalarValue::Bool(!b));
            }
            ExprNode::Neg(_) => {
                let v = self.pop();
                let i = self.int(v)?;
                self.stack.push(ScalarValue::Int(i.wrapping_neg()));
            }
            ExprNode::Next(_) => {
                self.time_stack.pop();
            }
            ExprNode::Binary(op, _, _) => self.apply_binary(op, expr)?,
            ExprNode::Ite(_, _, _) => {
                let els = self.pop();
                let then = self.pop();
                let cond = self.pop();
                let v = if self.truth(cond)? { then } else { els };
                self.stack.push(v);
            }
        }

        let key = TimedExpr::new(self.cur_ctx(), expr, self.cur_time());
        let v = *self.stack.last().expect("postvisit pushed a value");
        self.cache.insert(key, v);
        Ok(())
    }
}
