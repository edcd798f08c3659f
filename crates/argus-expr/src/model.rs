//! Module-structured models.
//!
//! A model is a set of modules with typed variables, defines and
//! INIT/TRANS/INVAR predicate sections. [`ModelBuilder::build`] resolves
//! the module graph into the flat form the pipeline works on: every symbol
//! registered under its dotted instance context, instance sections folded
//! into the model-wide section lists, defines checked for cycles. After
//! `build` the model is immutable; verification only reads it.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::errors::ModelError;
use crate::pool::{Atom, BinOp, ExprId, ExprNode, ExprPool};
use crate::symbol::{Symbol, SymbolTable};
use crate::types::{Type, TypeId, TypeStore};
use crate::Value;

/// One module: variables, defines and predicate sections
#[derive(Debug, Clone)]
pub struct Module {
    name: Atom,
    variables: Vec<(Atom, TypeId)>,
    constants: Vec<(Atom, Value, TypeId)>,
    defines: Vec<(Atom, ExprId)>,
    init: Vec<ExprId>,
    trans: Vec<ExprId>,
    invar: Vec<ExprId>,
}

impl Module {
    /// Module name
    pub fn name(&self) -> Atom {
        self.name
    }

    /// Declared variables in declaration order
    pub fn variables(&self) -> &[(Atom, TypeId)] {
        &self.variables
    }
}

/// Builder for a single module
#[derive(Debug)]
pub struct ModuleBuilder {
    module: Module,
    names: HashSet<Atom>,
}

impl ModuleBuilder {
    /// Start a module with the given name
    pub fn new(pool: &mut ExprPool, name: &str) -> Self {
        let name = pool.atom(name);
        Self {
            module: Module {
                name,
                variables: Vec::new(),
                constants: Vec::new(),
                defines: Vec::new(),
                init: Vec::new(),
                trans: Vec::new(),
                invar: Vec::new(),
            },
            names: HashSet::new(),
        }
    }

    fn claim(&mut self, pool: &ExprPool, name: Atom) -> Result<(), ModelError> {
        if !self.names.insert(name) {
            return Err(ModelError::DuplicateSymbol {
                name: pool.atom_name(name).to_string(),
            });
        }
        Ok(())
    }

    /// Declare a variable
    pub fn var(mut self, pool: &mut ExprPool, name: &str, ty: TypeId) -> Result<Self, ModelError> {
        let name = pool.atom(name);
        self.claim(pool, name)?;
        self.module.variables.push((name, ty));
        Ok(self)
    }

    /// Declare a named constant
    pub fn constant(
        mut self,
        pool: &mut ExprPool,
        name: &str,
        value: Value,
        ty: TypeId,
    ) -> Result<Self, ModelError> {
        let name = pool.atom(name);
        self.claim(pool, name)?;
        self.module.constants.push((name, value, ty));
        Ok(self)
    }

    /// Declare a define
    pub fn define(
        mut self,
        pool: &mut ExprPool,
        name: &str,
        body: ExprId,
    ) -> Result<Self, ModelError> {
        let name = pool.atom(name);
        self.claim(pool, name)?;
        self.module.defines.push((name, body));
        Ok(self)
    }

    /// Add an INIT conjunct
    pub fn init(mut self, expr: ExprId) -> Self {
        self.module.init.push(expr);
        self
    }

    /// Add a TRANS conjunct
    pub fn trans(mut self, expr: ExprId) -> Self {
        self.module.trans.push(expr);
        self
    }

    /// Add an INVAR conjunct
    pub fn invar(mut self, expr: ExprId) -> Self {
        self.module.invar.push(expr);
        self
    }

    /// Finish the module
    pub fn build(self) -> Module {
        self.module
    }
}

/// A fully resolved model
#[derive(Debug)]
pub struct Model {
    main: Atom,
    modules: Vec<Module>,
    symbols: SymbolTable,
    init: Vec<(ExprId, ExprId)>,
    trans: Vec<(ExprId, ExprId)>,
    invar: Vec<(ExprId, ExprId)>,
}

impl Model {
    /// Name of the main module
    pub fn main(&self) -> Atom {
        self.main
    }

    /// The resolved symbol table
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// INIT conjuncts as (context, expression) pairs
    pub fn init(&self) -> &[(ExprId, ExprId)] {
        &self.init
    }

    /// TRANS conjuncts as (context, expression) pairs
    pub fn trans(&self) -> &[(ExprId, ExprId)] {
        &self.trans
    }

    /// INVAR conjuncts as (context, expression) pairs
    pub fn invar(&self) -> &[(ExprId, ExprId)] {
        &self.invar
    }

    /// All modules
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// State variables over all instance contexts, in declaration order
    pub fn state_variables(&self) -> impl Iterator<Item = (ExprId, Atom, TypeId)> + '_ {
        self.symbols.variables()
    }
}

/// Resolve an identifier or dotted path to its defining (context, name)
/// pair. `expr` must be an identifier or a `.`-chain of identifiers.
pub fn resolve_path(
    pool: &ExprPool,
    ctx: ExprId,
    expr: ExprId,
) -> Result<(ExprId, Atom), ModelError> {
    match *pool.node(expr) {
        ExprNode::Ident(name) => Ok((ctx, name)),
        ExprNode::Binary(BinOp::Dot, lhs, rhs) => {
            // the left part extends the context path, the right part is
            // resolved below it
            let ExprNode::Ident(field) = *pool.node(rhs) else {
                return Err(ModelError::TypeMismatch {
                    expr: pool.render(expr),
                    detail: "right operand of `.` must be an identifier".to_string(),
                });
            };
            let (lhs_ctx, lhs_name) = resolve_path(pool, ctx, lhs)?;
            // re-create the dotted context without mutating the pool:
            // contexts are built during model flattening, so the id must
            // already exist
            let inner = lookup_ctx(pool, lhs_ctx, lhs_name).ok_or_else(|| {
                ModelError::Unresolved {
                    ctx: pool.render(ctx),
                    name: pool.render(expr),
                }
            })?;
            Ok((inner, field))
        }
        _ => Err(ModelError::TypeMismatch {
            expr: pool.render(expr),
            detail: "expected an identifier or instance path".to_string(),
        }),
    }
}

/// Find the interned id of `ctx.name` without inserting; present whenever
/// the model flattening created the instance context.
fn lookup_ctx(pool: &ExprPool, ctx: ExprId, name: Atom) -> Option<ExprId> {
    // the flattening interned both the plain identifier and the dotted
    // extension, so probing the existing nodes is enough
    let ident = probe(pool, ExprNode::Ident(name))?;
    let empty = probe(pool, ExprNode::Ident(pool_empty_atom(pool)?))?;
    if ctx == empty {
        Some(ident)
    } else {
        probe(pool, ExprNode::Binary(BinOp::Dot, ctx, ident))
    }
}

fn pool_empty_atom(pool: &ExprPool) -> Option<Atom> {
    // atom "" is interned by every builder before use
    pool.probe_atom("")
}

fn probe(pool: &ExprPool, node: ExprNode) -> Option<ExprId> {
    pool.probe(node)
}

/// Builder resolving a set of modules into a [`Model`]
#[derive(Debug, Default)]
pub struct ModelBuilder {
    modules: Vec<Module>,
}

impl ModelBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module
    pub fn module(mut self, module: Module) -> Self {
        self.modules.push(module);
        self
    }

    /// Resolve the module graph. The module named `main` is the root; its
    /// instance tree is flattened into dotted contexts.
    pub fn build(
        self,
        pool: &mut ExprPool,
        types: &mut TypeStore,
    ) -> Result<Model, ModelError> {
        let main_atom = pool.atom("main");
        let by_name: HashMap<Atom, usize> = self
            .modules
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name, i))
            .collect();

        if !by_name.contains_key(&main_atom) {
            return Err(ModelError::UnknownModule {
                name: "main".to_string(),
            });
        }

        let mut model = Model {
            main: main_atom,
            modules: Vec::new(),
            symbols: SymbolTable::new(),
            init: Vec::new(),
            trans: Vec::new(),
            invar: Vec::new(),
        };

        let root_ctx = pool.empty();
        let mut instance_stack = Vec::new();
        flatten(
            pool,
            types,
            &self.modules,
            &by_name,
            main_atom,
            root_ctx,
            &mut instance_stack,
            &mut model,
        )?;

        check_define_cycles(pool, &model.symbols)?;

        debug!(
            "resolved model: {} symbols, {} INIT / {} TRANS / {} INVAR conjuncts",
            model.symbols.len(),
            model.init.len(),
            model.trans.len(),
            model.invar.len()
        );

        model.modules = self.modules;
        Ok(model)
    }
}

#[allow(clippy::too_many_arguments)]
fn flatten(
    pool: &mut ExprPool,
    types: &mut TypeStore,
    modules: &[Module],
    by_name: &HashMap<Atom, usize>,
    current: Atom,
    ctx: ExprId,
    instance_stack: &mut Vec<Atom>,
    model: &mut Model,
) -> Result<(), ModelError> {
    if instance_stack.contains(&current) {
        return Err(ModelError::RecursiveInstance {
            name: pool.atom_name(current).to_string(),
        });
    }
    instance_stack.push(current);

    let module = modules[by_name[&current]].clone();

    for (name, value, ty) in &module.constants {
        register(pool, model, ctx, *name, Symbol::Constant { value: *value, ty: *ty })?;
    }

    for (name, ty) in &module.variables {
        if let Type::Instance { module: sub } = types.get(*ty).clone() {
            if !by_name.contains_key(&sub) {
                return Err(ModelError::UnknownModule {
                    name: pool.atom_name(sub).to_string(),
                });
            }
            let sub_ctx = pool.extend_ctx(ctx, *name);
            flatten(
                pool, types, modules, by_name, sub, sub_ctx, instance_stack, model,
            )?;
            continue;
        }

        register(pool, model, ctx, *name, Symbol::Variable { ty: *ty })?;
        register_enum_literals(pool, types, model, ctx, *ty)?;
    }

    for (name, body) in &module.defines {
        register(pool, model, ctx, *name, Symbol::Define { body: *body })?;
    }

    for e in &module.init {
        model.init.push((ctx, *e));
    }
    for e in &module.trans {
        model.trans.push((ctx, *e));
    }
    for e in &module.invar {
        model.invar.push((ctx, *e));
    }

    instance_stack.pop();
    Ok(())
}

fn register(
    pool: &ExprPool,
    model: &mut Model,
    ctx: ExprId,
    name: Atom,
    symbol: Symbol,
) -> Result<(), ModelError> {
    if !model.symbols.register(ctx, name, symbol) {
        // identical re-registration is tolerated (shared enum literals)
        if model.symbols.fetch(ctx, name) == Some(&symbol) {
            return Ok(());
        }
        return Err(ModelError::DuplicateSymbol {
            name: pool.atom_name(name).to_string(),
        });
    }
    Ok(())
}

/// Every literal of an enum variable becomes a symbol in the variable's
/// context, carrying its index within the (sorted) literal set.
fn register_enum_literals(
    pool: &ExprPool,
    types: &TypeStore,
    model: &mut Model,
    ctx: ExprId,
    ty: TypeId,
) -> Result<(), ModelError> {
    let literals = match types.get(ty) {
        Type::Enum { literals } => literals.clone(),
        Type::Array { element, .. } => {
            return register_enum_literals(pool, types, model, ctx, *element)
        }
        _ => return Ok(()),
    };

    for (index, lit) in literals.iter().enumerate() {
        register(
            pool,
            model,
            ctx,
            *lit,
            Symbol::Literal {
                value: index as Value,
                ty,
            },
        )?;
    }
    Ok(())
}

/// Reject self- or mutually-recursive defines with a depth-first search
/// over define references (closed fixed-point with cycle detection).
fn check_define_cycles(pool: &ExprPool, symbols: &SymbolTable) -> Result<(), ModelError> {
    let mut done: HashSet<(ExprId, Atom)> = HashSet::new();

    for (ctx, name, sym) in symbols.iter() {
        if let Symbol::Define { .. } = sym {
            let mut visiting = Vec::new();
            visit_define(pool, symbols, ctx, name, &mut visiting, &mut done)?;
        }
    }
    Ok(())
}

fn visit_define(
    pool: &ExprPool,
    symbols: &SymbolTable,
    ctx: ExprId,
    name: Atom,
    visiting: &mut Vec<(ExprId, Atom)>,
    done: &mut HashSet<(ExprId, Atom)>,
) -> Result<(), ModelError> {
    if done.contains(&(ctx, name)) {
        return Ok(());
    }
    if visiting.contains(&(ctx, name)) {
        return Err(ModelError::RecursiveDefine {
            name: pool.atom_name(name).to_string(),
        });
    }

    let Some(Symbol::Define { body }) = symbols.fetch(ctx, name) else {
        return Ok(());
    };
    visiting.push((ctx, name));

    let mut refs = Vec::new();
    collect_idents(pool, *body, &mut refs);
    for r in refs {
        visit_define(pool, symbols, ctx, r, visiting, done)?;
    }

    visiting.pop();
    done.insert((ctx, name));
    Ok(())
}

fn collect_idents(pool: &ExprPool, expr: ExprId, out: &mut Vec<Atom>) {
    match *pool.node(expr) {
        ExprNode::Num(_) => {}
        ExprNode::Ident(a) => out.push(a),
        ExprNode::Not(e) | ExprNode::Neg(e) | ExprNode::Next(e) => collect_idents(pool, e, out),
        ExprNode::Binary(_, lhs, rhs) => {
            collect_idents(pool, lhs, out);
            collect_idents(pool, rhs, out);
        }
        ExprNode::Ite(c, t, e) => {
            collect_idents(pool, c, out);
            collect_idents(pool, t, out);
            collect_idents(pool, e, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boolean_main(
        pool: &mut ExprPool,
        types: &mut TypeStore,
    ) -> Result<Model, ModelError> {
        let b = types.boolean();
        let x = pool.ident("x");
        let zero = pool.num(0);
        let init = pool.eq(x, zero);
        let module = ModuleBuilder::new(pool, "main")
            .var(pool, "x", b)?
            .init(init)
            .build();
        ModelBuilder::new().module(module).build(pool, types)
    }

    #[test]
    fn test_simple_model_resolves() {
        let mut pool = ExprPool::new();
        let mut types = TypeStore::new();
        let model = boolean_main(&mut pool, &mut types).unwrap();

        assert_eq!(model.state_variables().count(), 1);
        assert_eq!(model.init().len(), 1);
        assert!(model.trans().is_empty());
    }

    #[test]
    fn test_missing_main_is_an_error() {
        let mut pool = ExprPool::new();
        let mut types = TypeStore::new();
        let module = ModuleBuilder::new(&mut pool, "aux").build();
        let err = ModelBuilder::new()
            .module(module)
            .build(&mut pool, &mut types)
            .unwrap_err();
        assert!(matches!(err, ModelError::UnknownModule { .. }));
    }

    #[test]
    fn test_define_cycle_is_rejected() {
        let mut pool = ExprPool::new();
        let mut types = TypeStore::new();
        let b = types.boolean();

        // d1 := d2, d2 := d1
        let d1_ref = pool.ident("d1");
        let d2_ref = pool.ident("d2");
        let module = ModuleBuilder::new(&mut pool, "main")
            .var(&mut pool, "x", b)
            .unwrap()
            .define(&mut pool, "d1", d2_ref)
            .unwrap()
            .define(&mut pool, "d2", d1_ref)
            .unwrap()
            .build();

        let err = ModelBuilder::new()
            .module(module)
            .build(&mut pool, &mut types)
            .unwrap_err();
        assert!(matches!(err, ModelError::RecursiveDefine { .. }));
    }

    #[test]
    fn test_self_recursive_define_is_rejected() {
        let mut pool = ExprPool::new();
        let mut types = TypeStore::new();

        let d_ref = pool.ident("d");
        let one = pool.num(1);
        let body = pool.binary(BinOp::Add, d_ref, one);
        let module = ModuleBuilder::new(&mut pool, "main")
            .define(&mut pool, "d", body)
            .unwrap()
            .build();

        let err = ModelBuilder::new()
            .module(module)
            .build(&mut pool, &mut types)
            .unwrap_err();
        assert!(matches!(err, ModelError::RecursiveDefine { .. }));
    }

    #[test]
    fn test_instance_flattening() {
        let mut pool = ExprPool::new();
        let mut types = TypeStore::new();
        let b = types.boolean();

        let y = pool.ident("y");
        let zero = pool.num(0);
        let sub_init = pool.eq(y, zero);
        let sub = ModuleBuilder::new(&mut pool, "cell")
            .var(&mut pool, "y", b)
            .unwrap()
            .init(sub_init)
            .build();

        let cell_atom = pool.atom("cell");
        let inst_ty = types.intern(Type::Instance { module: cell_atom });
        let main = ModuleBuilder::new(&mut pool, "main")
            .var(&mut pool, "m", inst_ty)
            .unwrap()
            .build();

        let model = ModelBuilder::new()
            .module(sub)
            .module(main)
            .build(&mut pool, &mut types)
            .unwrap();

        // y lives under context `m`
        let vars: Vec<_> = model.state_variables().collect();
        assert_eq!(vars.len(), 1);
        let (ctx, name, _) = vars[0];
        assert_eq!(pool.render(ctx), "m");
        assert_eq!(pool.atom_name(name), "y");

        // the instance INIT is part of the model under that context
        assert_eq!(model.init().len(), 1);
        assert_eq!(model.init()[0].0, ctx);
    }

    #[test]
    fn test_recursive_instance_is_rejected() {
        let mut pool = ExprPool::new();
        let mut types = TypeStore::new();

        let main_atom = pool.atom("main");
        let self_ty = types.intern(Type::Instance { module: main_atom });
        let main = ModuleBuilder::new(&mut pool, "main")
            .var(&mut pool, "m", self_ty)
            .unwrap()
            .build();

        let err = ModelBuilder::new()
            .module(main)
            .build(&mut pool, &mut types)
            .unwrap_err();
        assert!(matches!(err, ModelError::RecursiveInstance { .. }));
    }

    #[test]
    fn test_enum_literals_registered() {
        let mut pool = ExprPool::new();
        let mut types = TypeStore::new();
        let idle = pool.atom("IDLE");
        let busy = pool.atom("BUSY");
        let e = types.find_enum(vec![idle, busy]);

        let module = ModuleBuilder::new(&mut pool, "main")
            .var(&mut pool, "s", e)
            .unwrap()
            .build();
        let model = ModelBuilder::new()
            .module(module)
            .build(&mut pool, &mut types)
            .unwrap();

        let ctx = pool.empty();
        assert!(matches!(
            model.symbols().fetch(ctx, idle),
            Some(Symbol::Literal { value: _, ty }) if *ty == e
        ));
        assert!(matches!(
            model.symbols().fetch(ctx, busy),
            Some(Symbol::Literal { .. })
        ));
    }
}
