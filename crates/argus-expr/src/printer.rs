//! Expression rendering for diagnostics and witness output.

use std::fmt;

use crate::pool::{BinOp, ExprId, ExprNode, ExprPool};

impl ExprPool {
    /// Display adapter for an expression
    pub fn display(&self, expr: ExprId) -> ExprDisplay<'_> {
        ExprDisplay { pool: self, expr }
    }

    /// Render an expression to a string
    pub fn render(&self, expr: ExprId) -> String {
        self.display(expr).to_string()
    }
}

/// Display adapter borrowing the pool
pub struct ExprDisplay<'a> {
    pool: &'a ExprPool,
    expr: ExprId,
}

impl fmt::Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(self.pool, self.expr, f)
    }
}

fn op_str(op: BinOp) -> &'static str {
    match op {
        BinOp::And => "&",
        BinOp::Or => "|",
        BinOp::Xor => "xor",
        BinOp::Xnor => "xnor",
        BinOp::Implies => "->",
        BinOp::Iff => "<->",
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Lshift => "<<",
        BinOp::Rshift => ">>",
        BinOp::Eq => "=",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::Dot => ".",
        BinOp::Subscript => "",
        BinOp::Comma => ",",
    }
}

fn write_expr(pool: &ExprPool, expr: ExprId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match *pool.node(expr) {
        ExprNode::Num(v) => write!(f, "{v}"),
        ExprNode::Ident(a) => write!(f, "{}", pool.atom_name(a)),
        ExprNode::Not(e) => {
            write!(f, "!")?;
            write_operand(pool, e, f)
        }
        ExprNode::Neg(e) => {
            write!(f, "-")?;
            write_operand(pool, e, f)
        }
        ExprNode::Next(e) => {
            write!(f, "next(")?;
            write_expr(pool, e, f)?;
            write!(f, ")")
        }
        ExprNode::Binary(BinOp::Dot, lhs, rhs) => {
            write_expr(pool, lhs, f)?;
            write!(f, ".")?;
            write_expr(pool, rhs, f)
        }
        ExprNode::Binary(BinOp::Subscript, lhs, rhs) => {
            write_operand(pool, lhs, f)?;
            write!(f, "[")?;
            write_expr(pool, rhs, f)?;
            write!(f, "]")
        }
        ExprNode::Binary(op, lhs, rhs) => {
            write_operand(pool, lhs, f)?;
            write!(f, " {} ", op_str(op))?;
            write_operand(pool, rhs, f)
        }
        ExprNode::Ite(c, t, e) => {
            write_operand(pool, c, f)?;
            write!(f, " ? ")?;
            write_operand(pool, t, f)?;
            write!(f, " : ")?;
            write_operand(pool, e, f)
        }
    }
}

/// Parenthesize compound operands; atoms and applications with their own
/// brackets stay bare.
fn write_operand(pool: &ExprPool, expr: ExprId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let bare = matches!(
        pool.node(expr),
        ExprNode::Num(_)
            | ExprNode::Ident(_)
            | ExprNode::Next(_)
            | ExprNode::Binary(BinOp::Dot, _, _)
            | ExprNode::Binary(BinOp::Subscript, _, _)
    );
    if bare {
        write_expr(pool, expr, f)
    } else {
        write!(f, "(")?;
        write_expr(pool, expr, f)?;
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_flat() {
        let mut pool = ExprPool::new();
        let x = pool.ident("x");
        let one = pool.num(1);
        let e = pool.binary(BinOp::Eq, x, one);
        assert_eq!(pool.render(e), "x = 1");
    }

    #[test]
    fn test_render_nested() {
        let mut pool = ExprPool::new();
        let c = pool.ident("c");
        let one = pool.num(1);
        let sum = pool.binary(BinOp::Add, c, one);
        let nx = pool.next(c);
        let e = pool.binary(BinOp::Eq, nx, sum);
        assert_eq!(pool.render(e), "next(c) = (c + 1)");
    }

    #[test]
    fn test_render_subscript_and_dot() {
        let mut pool = ExprPool::new();
        let a = pool.ident("a");
        let i = pool.ident("i");
        let sub = pool.binary(BinOp::Subscript, a, i);
        assert_eq!(pool.render(sub), "a[i]");

        let m = pool.ident("m");
        let x = pool.ident("x");
        let dotted = pool.dot(m, x);
        assert_eq!(pool.render(dotted), "m.x");
    }

    #[test]
    fn test_render_ite_and_not() {
        let mut pool = ExprPool::new();
        let c = pool.ident("c");
        let a = pool.num(0);
        let b = pool.num(1);
        let ite = pool.ite(c, a, b);
        assert_eq!(pool.render(ite), "c ? 0 : 1");

        let n = pool.not(c);
        assert_eq!(pool.render(n), "!c");
    }
}
