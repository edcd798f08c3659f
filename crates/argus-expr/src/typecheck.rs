//! Type inference and checking.
//!
//! Typing is performed once per (context, expression) pair and cached; the
//! compiler consults the same checker instance while lowering. Integer
//! constants carry the abstract [`Type::IntConst`] type and are promoted
//! at the consuming operator: against an algebraic operand they take that
//! operand's exact width and signedness, two constant operands stay
//! abstract until compilation picks the smallest fitting width.

use std::collections::HashMap;

use crate::errors::ModelError;
use crate::model::resolve_path;
use crate::pool::{BinOp, ExprId, ExprNode, ExprPool};
use crate::symbol::{Symbol, SymbolTable};
use crate::types::{Type, TypeId, TypeStore};
use crate::Value;

/// Type checker with a per-(context, expression) cache
pub struct TypeChecker<'a> {
    pool: &'a ExprPool,
    types: &'a mut TypeStore,
    symbols: &'a SymbolTable,
    cache: HashMap<(ExprId, ExprId), TypeId>,
}

impl<'a> TypeChecker<'a> {
    /// Create a checker over the given pool, type store and symbols
    pub fn new(pool: &'a ExprPool, types: &'a mut TypeStore, symbols: &'a SymbolTable) -> Self {
        Self {
            pool,
            types,
            symbols,
            cache: HashMap::new(),
        }
    }

    /// The type store the checker interns into
    pub fn types(&mut self) -> &mut TypeStore {
        self.types
    }

    /// Infer the type of `expr` in `ctx`
    pub fn type_of(&mut self, ctx: ExprId, expr: ExprId) -> Result<TypeId, ModelError> {
        self.infer(ctx, expr, false)
    }

    fn infer(&mut self, ctx: ExprId, expr: ExprId, in_next: bool) -> Result<TypeId, ModelError> {
        if let Some(ty) = self.cache.get(&(ctx, expr)) {
            return Ok(*ty);
        }

        let ty = self.infer_uncached(ctx, expr, in_next)?;
        self.cache.insert((ctx, expr), ty);
        Ok(ty)
    }

    fn infer_uncached(
        &mut self,
        ctx: ExprId,
        expr: ExprId,
        in_next: bool,
    ) -> Result<TypeId, ModelError> {
        match *self.pool.node(expr) {
            ExprNode::Num(_) => Ok(self.types.int_const()),

            ExprNode::Ident(name) => {
                let Some(symbol) = self.symbols.fetch(ctx, name) else {
                    return Err(ModelError::Unresolved {
                        ctx: self.pool.render(ctx),
                        name: self.pool.atom_name(name).to_string(),
                    });
                };
                match *symbol {
                    Symbol::Variable { ty }
                    | Symbol::Temporary { ty }
                    | Symbol::Constant { ty, .. }
                    | Symbol::Literal { ty, .. } => Ok(ty),
                    Symbol::Define { body } => self.infer(ctx, body, in_next),
                }
            }

            ExprNode::Next(sub) => {
                if in_next {
                    return Err(ModelError::NestedNext {
                        expr: self.pool.render(expr),
                    });
                }
                self.infer(ctx, sub, true)
            }

            ExprNode::Not(sub) => {
                let t = self.infer(ctx, sub, in_next)?;
                if self.types.is_boolean(t) || self.types.is_algebraic(t) || self.types.is_constant(t)
                {
                    Ok(t)
                } else {
                    Err(self.mismatch(expr, "complement needs a boolean or algebraic operand"))
                }
            }

            ExprNode::Neg(sub) => {
                let t = self.infer(ctx, sub, in_next)?;
                if self.types.is_algebraic(t) || self.types.is_constant(t) {
                    Ok(t)
                } else {
                    Err(self.mismatch(expr, "negation needs an algebraic operand"))
                }
            }

            ExprNode::Binary(BinOp::Dot, _, _) => {
                let (inner_ctx, name) = resolve_path(self.pool, ctx, expr)?;
                let ident = self
                    .pool
                    .probe(ExprNode::Ident(name))
                    .expect("path member must be interned");
                self.infer(inner_ctx, ident, in_next)
            }

            ExprNode::Binary(BinOp::Subscript, lhs, rhs) => {
                let lhs_ty = self.infer(ctx, lhs, in_next)?;
                let rhs_ty = self.infer(ctx, rhs, in_next)?;
                let Type::Array { element, size } = self.types.get(lhs_ty).clone() else {
                    return Err(ModelError::BadSubscript {
                        expr: self.pool.render(expr),
                        detail: "subscripted expression is not an array".to_string(),
                    });
                };
                if !self.types.is_algebraic(rhs_ty) && !self.types.is_constant(rhs_ty) {
                    return Err(ModelError::BadSubscript {
                        expr: self.pool.render(expr),
                        detail: "index must be algebraic or constant".to_string(),
                    });
                }
                if let Some(v) = self.const_value(ctx, rhs) {
                    if v < 0 || v >= size as Value {
                        return Err(ModelError::BadSubscript {
                            expr: self.pool.render(expr),
                            detail: format!("constant index {v} outside 0..{size}"),
                        });
                    }
                }
                Ok(element)
            }

            ExprNode::Binary(BinOp::Comma, _, _) => Err(ModelError::Capability {
                detail: "inline non-determinism (comma lists)".to_string(),
            }),

            ExprNode::Binary(op, lhs, rhs) => {
                let lt = self.infer(ctx, lhs, in_next)?;
                let rt = self.infer(ctx, rhs, in_next)?;
                self.binary_type(expr, op, ctx, lhs, rhs, lt, rt)
            }

            ExprNode::Ite(c, t, e) => {
                let ct = self.infer(ctx, c, in_next)?;
                if !self.types.is_boolean(ct) {
                    return Err(self.mismatch(expr, "condition must be boolean"));
                }
                let tt = self.infer(ctx, t, in_next)?;
                let et = self.infer(ctx, e, in_next)?;
                self.unify_branches(expr, tt, et)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn binary_type(
        &mut self,
        expr: ExprId,
        op: BinOp,
        ctx: ExprId,
        lhs: ExprId,
        rhs: ExprId,
        lt: TypeId,
        rt: TypeId,
    ) -> Result<TypeId, ModelError> {
        let types = &*self.types;
        let both_bool = types.is_boolean(lt) && types.is_boolean(rt);
        let both_enum = types.is_enum(lt) && types.is_enum(rt);

        if op.is_logical() {
            if both_bool {
                return Ok(lt);
            }
            return self.unify_algebraic(expr, lt, rt);
        }

        if op.is_arithmetical() {
            return self.unify_algebraic(expr, lt, rt);
        }

        debug_assert!(op.is_relational());

        if matches!(op, BinOp::Eq | BinOp::Ne) {
            if both_bool {
                return Ok(lt);
            }
            // booleans compare against the constants 0 and 1 only
            if types.is_boolean(lt) && types.is_constant(rt) {
                return self.boolean_constant(expr, ctx, rhs);
            }
            if types.is_constant(lt) && types.is_boolean(rt) {
                return self.boolean_constant(expr, ctx, lhs);
            }
        }

        if both_enum {
            if lt != rt {
                return Err(self.mismatch(expr, "enum operands of different types"));
            }
            return Ok(self.types.boolean());
        }

        // algebraic comparison
        self.unify_algebraic(expr, lt, rt)?;
        Ok(self.types.boolean())
    }

    /// Both operands algebraic of equal width and signedness, or one an
    /// abstract constant promoted to the other's type.
    fn unify_algebraic(
        &mut self,
        expr: ExprId,
        lt: TypeId,
        rt: TypeId,
    ) -> Result<TypeId, ModelError> {
        let types = &*self.types;
        if types.is_algebraic(lt) && types.is_algebraic(rt) {
            if lt != rt {
                return Err(self.mismatch(
                    expr,
                    "algebraic operands must agree in width and signedness",
                ));
            }
            return Ok(lt);
        }
        if types.is_algebraic(lt) && types.is_constant(rt) {
            return Ok(lt);
        }
        if types.is_constant(lt) && types.is_algebraic(rt) {
            return Ok(rt);
        }
        if types.is_constant(lt) && types.is_constant(rt) {
            return Ok(self.types.int_const());
        }
        Err(self.mismatch(expr, "operands are not algebraic"))
    }

    fn unify_branches(
        &mut self,
        expr: ExprId,
        tt: TypeId,
        et: TypeId,
    ) -> Result<TypeId, ModelError> {
        if tt == et {
            return Ok(tt);
        }
        let types = &*self.types;
        if types.is_algebraic(tt) && types.is_constant(et) {
            return Ok(tt);
        }
        if types.is_constant(tt) && types.is_algebraic(et) {
            return Ok(et);
        }
        Err(self.mismatch(expr, "branches of conditional differ in type"))
    }

    /// A constant compared against a boolean must be the literal 0 or 1
    fn boolean_constant(
        &mut self,
        expr: ExprId,
        ctx: ExprId,
        operand: ExprId,
    ) -> Result<TypeId, ModelError> {
        match self.const_value(ctx, operand) {
            Some(0) | Some(1) => Ok(self.types.boolean()),
            _ => Err(self.mismatch(expr, "boolean compared against a non-boolean constant")),
        }
    }

    /// Constant value of an expression, when statically evident
    pub fn const_value(&self, ctx: ExprId, expr: ExprId) -> Option<Value> {
        match *self.pool.node(expr) {
            ExprNode::Num(v) => Some(v),
            ExprNode::Neg(sub) => self.const_value(ctx, sub).map(|v| -v),
            ExprNode::Ident(name) => match self.symbols.fetch(ctx, name) {
                Some(Symbol::Constant { value, .. }) => Some(*value),
                Some(Symbol::Define { body }) => self.const_value(ctx, *body),
                _ => None,
            },
            _ => None,
        }
    }

    fn mismatch(&self, expr: ExprId, detail: &str) -> ModelError {
        ModelError::TypeMismatch {
            expr: self.pool.render(expr),
            detail: detail.to_string(),
        }
    }
}
