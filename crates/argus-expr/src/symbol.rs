//! Symbols and the symbol table.
//!
//! A symbol ties an identifier in a context to its meaning: a constant, an
//! enumeration literal, a (state) variable, a compiler-synthesised
//! temporary, or a define whose body inlines on reference. The table is
//! keyed by (context, identifier) and remembers insertion order so that
//! witness frames list variables deterministically.

use std::collections::HashMap;

use crate::pool::{Atom, ExprId};
use crate::types::TypeId;
use crate::Value;

/// Meaning of an identifier in a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    /// Named constant
    Constant {
        /// Constant value
        value: Value,
        /// Constant type
        ty: TypeId,
    },
    /// Enumeration literal; `value` is its index in the literal set
    Literal {
        /// Index within the enumeration
        value: Value,
        /// The enumeration type
        ty: TypeId,
    },
    /// State variable
    Variable {
        /// Declared type
        ty: TypeId,
    },
    /// Compiler-synthesised temporary variable
    Temporary {
        /// Synthesised type
        ty: TypeId,
    },
    /// Define: the body inlines wherever the name is referenced
    Define {
        /// Body expression
        body: ExprId,
    },
}

impl Symbol {
    /// Declared type of variables and temporaries
    pub fn var_type(&self) -> Option<TypeId> {
        match self {
            Symbol::Variable { ty } | Symbol::Temporary { ty } => Some(*ty),
            _ => None,
        }
    }
}

/// Symbol table keyed by (context, identifier)
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    map: HashMap<(ExprId, Atom), Symbol>,
    order: Vec<(ExprId, Atom)>,
}

impl SymbolTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a symbol; returns false if the (context, name) pair is
    /// already taken.
    pub fn register(&mut self, ctx: ExprId, name: Atom, symbol: Symbol) -> bool {
        if self.map.contains_key(&(ctx, name)) {
            return false;
        }
        self.map.insert((ctx, name), symbol);
        self.order.push((ctx, name));
        true
    }

    /// Look up a symbol
    pub fn fetch(&self, ctx: ExprId, name: Atom) -> Option<&Symbol> {
        self.map.get(&(ctx, name))
    }

    /// All symbols in registration order
    pub fn iter(&self) -> impl Iterator<Item = (ExprId, Atom, &Symbol)> {
        self.order.iter().map(move |(ctx, name)| {
            (
                *ctx,
                *name,
                self.map.get(&(*ctx, *name)).expect("ordered key vanished"),
            )
        })
    }

    /// State variables (temporaries excluded) in registration order
    pub fn variables(&self) -> impl Iterator<Item = (ExprId, Atom, TypeId)> + '_ {
        self.iter().filter_map(|(ctx, name, sym)| match sym {
            Symbol::Variable { ty } => Some((ctx, name, *ty)),
            _ => None,
        })
    }

    /// Number of registered symbols
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True iff no symbols are registered
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
