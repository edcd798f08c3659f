//! Parser for the argus model language.
//!
//! The surface syntax is SMV-flavoured: modules with typed variable
//! declarations, DEFINE bindings and INIT/TRANS/INVAR predicate sections.
//! The grammar lives in `grammar.pest` and is compiled by
//! [pest](https://pest.rs); operator precedence is handled by a Pratt
//! parser. Parsing produces interned expressions in the caller's
//! [`ExprPool`] and a resolved [`Model`]. Within the expression helpers
//! the pool travels behind a `RefCell` because the Pratt parser's primary
//! and infix callbacks both intern nodes and must share one mutable pool;
//! the `PoolCell` alias below carries the details.
//!
//! ```
//! use argus_expr::{ExprPool, TypeStore};
//! use argus_parser::{ModelParser, ParseModel};
//!
//! let src = "
//!     MODULE main
//!     VAR x : boolean;
//!     INIT x = 0;
//!     TRANS next(x) = !x;
//! ";
//! let mut pool = ExprPool::new();
//! let mut types = TypeStore::new();
//! let model = ModelParser::new().parse_model(src, &mut pool, &mut types).unwrap();
//! assert_eq!(model.state_variables().count(), 1);
//! ```

use std::cell::RefCell;

use anyhow::{anyhow, Context, Error};
use lazy_static::lazy_static;
use log::debug;
use pest::{
    iterators::Pair,
    pratt_parser::{Assoc, Op, PrattParser},
    Parser,
};
use pest_derive::Parser;

use argus_expr::{
    model::{Model, ModelBuilder, ModuleBuilder},
    BinOp, ExprId, ExprPool, Type, TypeId, TypeStore, Value,
};

#[allow(missing_docs)]
#[derive(Parser)]
#[grammar = "grammar.pest"]
struct PestModelParser;

// precedence from lowest to highest, borrowed from C++ with the usual
// adjustments for the model-language connectives
lazy_static! {
    static ref PRATT_PARSER: PrattParser<Rule> = {
        PrattParser::new()
            .op(Op::infix(Rule::op_iff, Assoc::Left))
            .op(Op::infix(Rule::op_implies, Assoc::Right))
            .op(Op::infix(Rule::op_or, Assoc::Left))
            .op(Op::infix(Rule::op_xor, Assoc::Left) | Op::infix(Rule::op_xnor, Assoc::Left))
            .op(Op::infix(Rule::op_and, Assoc::Left))
            .op(Op::infix(Rule::op_eq, Assoc::Left) | Op::infix(Rule::op_ne, Assoc::Left))
            .op(Op::infix(Rule::op_le, Assoc::Left)
                | Op::infix(Rule::op_lt, Assoc::Left)
                | Op::infix(Rule::op_ge, Assoc::Left)
                | Op::infix(Rule::op_gt, Assoc::Left))
            .op(Op::infix(Rule::op_lshift, Assoc::Left) | Op::infix(Rule::op_rshift, Assoc::Left))
            .op(Op::infix(Rule::op_add, Assoc::Left) | Op::infix(Rule::op_sub, Assoc::Left))
            .op(Op::infix(Rule::op_mul, Assoc::Left)
                | Op::infix(Rule::op_div, Assoc::Left)
                | Op::infix(Rule::op_mod, Assoc::Left))
    };
}

/// Parse a complete model
pub trait ParseModel {
    /// Parse `input` into a resolved [`Model`], interning expressions and
    /// types into the given stores
    fn parse_model(
        &self,
        input: &str,
        pool: &mut ExprPool,
        types: &mut TypeStore,
    ) -> Result<Model, Error>;
}

/// Parser for the argus model language
#[derive(Debug, Default)]
pub struct ModelParser;

impl ModelParser {
    /// Create a parser
    pub fn new() -> Self {
        ModelParser
    }
}

impl ParseModel for ModelParser {
    fn parse_model(
        &self,
        input: &str,
        pool: &mut ExprPool,
        types: &mut TypeStore,
    ) -> Result<Model, Error> {
        let mut pairs =
            PestModelParser::parse(Rule::model, input).with_context(|| "syntax error in model")?;
        let model_pair = pairs.next().expect("grammar yields one model");

        let mut builder = ModelBuilder::new();
        for module_pair in model_pair.into_inner() {
            if module_pair.as_rule() != Rule::module {
                continue; // EOI
            }
            let module = parse_module(module_pair, pool, types)
                .with_context(|| "failed to parse module")?;
            builder = builder.module(module);
        }

        let model = builder
            .build(pool, types)
            .with_context(|| "failed to resolve model")?;
        debug!(
            "parsed model with {} state variables",
            model.state_variables().count()
        );
        Ok(model)
    }
}

/// Parse a standalone expression (targets and constraints on the command
/// surface)
pub fn parse_expression(input: &str, pool: &mut ExprPool) -> Result<ExprId, Error> {
    let mut pairs = PestModelParser::parse(Rule::expr_input, input)
        .with_context(|| format!("syntax error in expression `{input}`"))?;
    let root = pairs.next().expect("grammar yields one expression");
    let expr_pair = root
        .into_inner()
        .next()
        .ok_or_else(|| anyhow!("empty expression"))?;
    let cell = RefCell::new(pool);
    parse_expr(expr_pair, &cell)
}

fn parse_module(
    pair: Pair<'_, Rule>,
    pool: &mut ExprPool,
    types: &mut TypeStore,
) -> Result<argus_expr::model::Module, Error> {
    let mut inner = pair.into_inner();
    let name = inner.next().expect("module name").as_str().to_string();
    let mut builder = ModuleBuilder::new(pool, &name);

    for section in inner {
        match section.as_rule() {
            Rule::var_section => {
                for decl in section.into_inner() {
                    let mut parts = decl.into_inner();
                    let var_name = parts.next().expect("variable name").as_str().to_string();
                    let ty_pair = parts.next().expect("variable type");
                    let ty = parse_type(ty_pair, pool, types)?;
                    builder = builder
                        .var(pool, &var_name, ty)
                        .with_context(|| format!("declaring variable `{var_name}`"))?;
                }
            }
            Rule::define_section => {
                for decl in section.into_inner() {
                    let mut parts = decl.into_inner();
                    let def_name = parts.next().expect("define name").as_str().to_string();
                    let body_pair = parts.next().expect("define body");
                    let cell = RefCell::new(&mut *pool);
                    let body = parse_expr(body_pair, &cell)?;
                    builder = builder
                        .define(pool, &def_name, body)
                        .with_context(|| format!("declaring define `{def_name}`"))?;
                }
            }
            Rule::init_section => {
                let e = parse_section_expr(section, pool)?;
                builder = builder.init(e);
            }
            Rule::trans_section => {
                let e = parse_section_expr(section, pool)?;
                builder = builder.trans(e);
            }
            Rule::invar_section => {
                let e = parse_section_expr(section, pool)?;
                builder = builder.invar(e);
            }
            other => unreachable!("unexpected section rule {other:?}"),
        }
    }

    Ok(builder.build())
}

fn parse_section_expr(section: Pair<'_, Rule>, pool: &mut ExprPool) -> Result<ExprId, Error> {
    let pair = section
        .into_inner()
        .next()
        .expect("predicate sections hold one expression");
    let cell = RefCell::new(pool);
    parse_expr(pair, &cell)
}

fn parse_type(
    pair: Pair<'_, Rule>,
    pool: &mut ExprPool,
    types: &mut TypeStore,
) -> Result<TypeId, Error> {
    let mut inner = pair.into_inner();
    let base_pair = inner.next().expect("base type");
    let base = match base_pair.as_rule() {
        Rule::boolean_type => types.boolean(),
        Rule::unsigned_int_type => {
            let w = parse_number_pair(base_pair.into_inner().next().expect("width"))?;
            types.find_unsigned(w as u16)
        }
        Rule::signed_int_type => {
            let w = parse_number_pair(base_pair.into_inner().next().expect("width"))?;
            types.find_signed(w as u16)
        }
        Rule::unsigned_fxd_type => {
            let mut ps = base_pair.into_inner();
            let w = parse_number_pair(ps.next().expect("width"))? as u16;
            let f = parse_number_pair(ps.next().expect("fract"))? as u16;
            types.intern(Type::UnsignedFxd { width: w, fract: f })
        }
        Rule::signed_fxd_type => {
            let mut ps = base_pair.into_inner();
            let w = parse_number_pair(ps.next().expect("width"))? as u16;
            let f = parse_number_pair(ps.next().expect("fract"))? as u16;
            types.intern(Type::SignedFxd { width: w, fract: f })
        }
        Rule::enum_type => {
            let literals = base_pair
                .into_inner()
                .map(|l| pool.atom(l.as_str()))
                .collect();
            types.find_enum(literals)
        }
        Rule::instance_type => {
            let module = pool.atom(base_pair.as_str());
            types.intern(Type::Instance { module })
        }
        other => unreachable!("unexpected type rule {other:?}"),
    };

    match inner.next() {
        None => Ok(base),
        Some(suffix) => {
            let size = parse_number_pair(suffix.into_inner().next().expect("array size"))?;
            Ok(types.find_array(base, size as u16))
        }
    }
}

/// Shared handle on the expression pool for the expression helpers.
///
/// The Pratt parser takes *two* closures — `map_primary` and `map_infix`
/// — that live side by side for the whole `parse` call, and both need to
/// intern nodes. Two closures cannot each capture `&mut ExprPool`, so the
/// pool is passed behind a `RefCell` and every intern takes a short
/// `borrow_mut`; pest drives the closures strictly sequentially, so the
/// borrows never overlap.
type PoolCell<'a> = RefCell<&'a mut ExprPool>;

fn parse_expr(pair: Pair<'_, Rule>, pool: &PoolCell<'_>) -> Result<ExprId, Error> {
    debug_assert_eq!(pair.as_rule(), Rule::expr);
    let mut inner = pair.into_inner();
    let head = parse_binary(inner.next().expect("binary expression"), pool)?;

    match inner.next() {
        None => Ok(head),
        Some(then_pair) => {
            let then = parse_expr(then_pair, pool)?;
            let els = parse_expr(inner.next().expect("else branch"), pool)?;
            Ok(pool.borrow_mut().ite(head, then, els))
        }
    }
}

fn parse_binary(pair: Pair<'_, Rule>, pool: &PoolCell<'_>) -> Result<ExprId, Error> {
    debug_assert_eq!(pair.as_rule(), Rule::binary);
    PRATT_PARSER
        .map_primary(|p| parse_unary(p, pool))
        .map_infix(|lhs, op, rhs| {
            let lhs = lhs?;
            let rhs = rhs?;
            let bin = match op.as_rule() {
                Rule::op_iff => BinOp::Iff,
                Rule::op_implies => BinOp::Implies,
                Rule::op_or => BinOp::Or,
                Rule::op_xor => BinOp::Xor,
                Rule::op_xnor => BinOp::Xnor,
                Rule::op_and => BinOp::And,
                Rule::op_eq => BinOp::Eq,
                Rule::op_ne => BinOp::Ne,
                Rule::op_lt => BinOp::Lt,
                Rule::op_le => BinOp::Le,
                Rule::op_gt => BinOp::Gt,
                Rule::op_ge => BinOp::Ge,
                Rule::op_lshift => BinOp::Lshift,
                Rule::op_rshift => BinOp::Rshift,
                Rule::op_add => BinOp::Add,
                Rule::op_sub => BinOp::Sub,
                Rule::op_mul => BinOp::Mul,
                Rule::op_div => BinOp::Div,
                Rule::op_mod => BinOp::Mod,
                other => unreachable!("unexpected operator rule {other:?}"),
            };
            Ok(pool.borrow_mut().binary(bin, lhs, rhs))
        })
        .parse(pair.into_inner())
}

fn parse_unary(pair: Pair<'_, Rule>, pool: &PoolCell<'_>) -> Result<ExprId, Error> {
    debug_assert_eq!(pair.as_rule(), Rule::unary);
    let mut prefixes = Vec::new();
    let mut postfix = None;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::not_op | Rule::neg_op => prefixes.push(p.as_rule()),
            Rule::postfix => postfix = Some(p),
            other => unreachable!("unexpected unary rule {other:?}"),
        }
    }

    let mut expr = parse_postfix(postfix.expect("unary holds a postfix"), pool)?;
    for rule in prefixes.into_iter().rev() {
        expr = match rule {
            Rule::not_op => pool.borrow_mut().not(expr),
            _ => pool.borrow_mut().neg(expr),
        };
    }
    Ok(expr)
}

fn parse_postfix(pair: Pair<'_, Rule>, pool: &PoolCell<'_>) -> Result<ExprId, Error> {
    let mut inner = pair.into_inner();
    let mut expr = parse_primary(inner.next().expect("postfix holds a primary"), pool)?;

    for op in inner {
        expr = match op.as_rule() {
            Rule::subscript => {
                let idx = parse_expr(op.into_inner().next().expect("index"), pool)?;
                pool.borrow_mut().binary(BinOp::Subscript, expr, idx)
            }
            Rule::dot_access => {
                let field = op.into_inner().next().expect("field").as_str().to_string();
                let mut p = pool.borrow_mut();
                let rhs = p.ident(&field);
                p.dot(expr, rhs)
            }
            other => unreachable!("unexpected postfix rule {other:?}"),
        };
    }
    Ok(expr)
}

fn parse_primary(pair: Pair<'_, Rule>, pool: &PoolCell<'_>) -> Result<ExprId, Error> {
    match pair.as_rule() {
        Rule::next_expr => {
            let sub = parse_expr(pair.into_inner().next().expect("next operand"), pool)?;
            Ok(pool.borrow_mut().next(sub))
        }
        Rule::bool_lit => {
            let truth = pair.as_str().eq_ignore_ascii_case("TRUE");
            Ok(pool.borrow_mut().num(if truth { 1 } else { 0 }))
        }
        Rule::number => {
            let value = parse_number(pair.as_str())?;
            Ok(pool.borrow_mut().num(value))
        }
        Rule::ident => Ok(pool.borrow_mut().ident(pair.as_str())),
        Rule::expr => parse_expr(pair, pool),
        other => unreachable!("unexpected primary rule {other:?}"),
    }
}

fn parse_number_pair(pair: Pair<'_, Rule>) -> Result<Value, Error> {
    parse_number(pair.as_str())
}

fn parse_number(text: &str) -> Result<Value, Error> {
    if let Some(hex) = text.strip_prefix("0x") {
        Value::from_str_radix(hex, 16).with_context(|| format!("bad hex literal `{text}`"))
    } else {
        text.parse()
            .with_context(|| format!("bad numeric literal `{text}`"))
    }
}
