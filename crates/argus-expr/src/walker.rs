//! The shared expression-walk contract.
//!
//! Every tree-shaped subsystem of the pipeline (compilation, witness
//! evaluation, type checking) is an implementation of [`Walker`]: a
//! pre-visit that decides whether to descend (a cached result counts as
//! "already pushed, do not descend"), an in-order hook between the
//! children of binary nodes, and a post-visit that consumes operand
//! results from the implementation's own working stacks. Walk state lives
//! in the implementation, never in the driver.

use crate::pool::{ExprId, ExprNode, ExprPool};

/// Visitor contract for expression walks
pub trait Walker {
    /// Error type of this walk
    type Error;

    /// Called before descending into a node. Return `false` to skip the
    /// subtree entirely — the implementation has already produced (e.g.
    /// cached) the node's result.
    fn previsit(&mut self, pool: &ExprPool, expr: ExprId) -> Result<bool, Self::Error>;

    /// Called between the children of nodes with more than one child
    fn invisit(&mut self, _pool: &ExprPool, _expr: ExprId) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Called after all children have been walked (also for leaves)
    fn postvisit(&mut self, pool: &ExprPool, expr: ExprId) -> Result<(), Self::Error>;
}

/// Drive a post-order walk of `root`
pub fn walk<W: Walker>(pool: &ExprPool, root: ExprId, walker: &mut W) -> Result<(), W::Error> {
    if !walker.previsit(pool, root)? {
        return Ok(());
    }

    match *pool.node(root) {
        ExprNode::Num(_) | ExprNode::Ident(_) => {}
        ExprNode::Not(e) | ExprNode::Neg(e) | ExprNode::Next(e) => {
            walk(pool, e, walker)?;
        }
        ExprNode::Binary(_, lhs, rhs) => {
            walk(pool, lhs, walker)?;
            walker.invisit(pool, root)?;
            walk(pool, rhs, walker)?;
        }
        ExprNode::Ite(c, t, e) => {
            walk(pool, c, walker)?;
            walker.invisit(pool, root)?;
            walk(pool, t, walker)?;
            walk(pool, e, walker)?;
        }
    }

    walker.postvisit(pool, root)
}
