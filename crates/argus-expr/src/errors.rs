//! Model-level errors raised while building, resolving or type checking a
//! model. These surface as command failures at the driver boundary;
//! internal invariant violations panic instead.

use core::fmt;
use std::error;

/// Error raised while building, resolving or type checking a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// An identifier could not be resolved in its context
    Unresolved {
        /// Context path the lookup ran in
        ctx: String,
        /// The identifier
        name: String,
    },
    /// Operand types do not fit the operator
    TypeMismatch {
        /// Rendering of the offending expression
        expr: String,
        /// What went wrong
        detail: String,
    },
    /// `next` applied inside another `next`
    NestedNext {
        /// Rendering of the offending expression
        expr: String,
    },
    /// Array subscription with a non-index operand or out-of-range constant
    BadSubscript {
        /// Rendering of the offending expression
        expr: String,
        /// What went wrong
        detail: String,
    },
    /// A define references itself, directly or through other defines
    RecursiveDefine {
        /// Name of a define on the cycle
        name: String,
    },
    /// Two symbols with the same name in one context
    DuplicateSymbol {
        /// The clashing name
        name: String,
    },
    /// An instance variable names a module the model does not contain
    UnknownModule {
        /// The missing module name
        name: String,
    },
    /// Module instantiation cycle
    RecursiveInstance {
        /// Name of a module on the cycle
        name: String,
    },
    /// The operation is not supported on these operand types
    Capability {
        /// What is unsupported
        detail: String,
    },
    /// An encoding could not be evaluated back to a scalar value
    Eval {
        /// What went wrong
        detail: String,
    },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Unresolved { ctx, name } => {
                if ctx.is_empty() {
                    write!(f, "unresolved identifier `{name}`")
                } else {
                    write!(f, "unresolved identifier `{name}` in context `{ctx}`")
                }
            }
            ModelError::TypeMismatch { expr, detail } => {
                write!(f, "type error in `{expr}`: {detail}")
            }
            ModelError::NestedNext { expr } => {
                write!(f, "nested next-time shift in `{expr}`")
            }
            ModelError::BadSubscript { expr, detail } => {
                write!(f, "bad subscript in `{expr}`: {detail}")
            }
            ModelError::RecursiveDefine { name } => {
                write!(f, "define `{name}` is recursive")
            }
            ModelError::DuplicateSymbol { name } => {
                write!(f, "duplicate symbol `{name}`")
            }
            ModelError::UnknownModule { name } => {
                write!(f, "unknown module `{name}`")
            }
            ModelError::RecursiveInstance { name } => {
                write!(f, "module `{name}` instantiates itself")
            }
            ModelError::Capability { detail } => {
                write!(f, "operation not supported: {detail}")
            }
            ModelError::Eval { detail } => {
                write!(f, "evaluation failure: {detail}")
            }
        }
    }
}

impl error::Error for ModelError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ModelError::Unresolved {
            ctx: String::new(),
            name: "x".to_string(),
        };
        assert_eq!(err.to_string(), "unresolved identifier `x`");

        let err = ModelError::Unresolved {
            ctx: "m".to_string(),
            name: "x".to_string(),
        };
        assert_eq!(err.to_string(), "unresolved identifier `x` in context `m`");

        let err = ModelError::RecursiveDefine {
            name: "d".to_string(),
        };
        assert_eq!(err.to_string(), "define `d` is recursive");
    }
}
