//! Compiler errors raised during specialization.
//!
//! Every error carries a message and the anchor that was active when the
//! inconsistency was detected. Errors are never recovered locally; they
//! unwind with `?` to the boundary of the compile request.

use crate::anchor::Anchor;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CompilerError>;

fn located(anchor: &Option<Anchor>) -> String {
    match anchor {
        Some(anchor) => format!("{}: ", anchor),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompilerError {
    /// A type conflict, e.g. retyping a parameter or continuation.
    #[error("{}type error: {}", located(.1), .0)]
    TypeError(String, Option<Anchor>),

    /// Wrong number or kind of arguments for a callee signature.
    #[error("{}arity error: {}", located(.1), .0)]
    ArityError(String, Option<Anchor>),

    /// Non-terminating recursion or an exceeded unrolling limit.
    #[error("{}recursion error: {}", located(.1), .0)]
    RecursionError(String, Option<Anchor>),

    /// Illegal control transfer, including incompatible merges.
    #[error("{}control flow error: {}", located(.1), .0)]
    ControlFlowError(String, Option<Anchor>),

    /// Capability violations: pointer access rights, escaping values, stack depth.
    #[error("{}capability error: {}", located(.1), .0)]
    CapabilityError(String, Option<Anchor>),

    /// Operand-shape failures inside a builtin.
    #[error("{}builtin error: {}", located(.1), .0)]
    BuiltinError(String, Option<Anchor>),

    /// Failure reported by the foreign-call collaborator.
    #[error("{}foreign call error: {}", located(.1), .0)]
    ForeignError(String, Option<Anchor>),
}

impl CompilerError {
    pub fn message(&self) -> &str {
        match self {
            CompilerError::TypeError(msg, _)
            | CompilerError::ArityError(msg, _)
            | CompilerError::RecursionError(msg, _)
            | CompilerError::ControlFlowError(msg, _)
            | CompilerError::CapabilityError(msg, _)
            | CompilerError::BuiltinError(msg, _)
            | CompilerError::ForeignError(msg, _) => msg,
        }
    }

    pub fn anchor(&self) -> Option<&Anchor> {
        match self {
            CompilerError::TypeError(_, anchor)
            | CompilerError::ArityError(_, anchor)
            | CompilerError::RecursionError(_, anchor)
            | CompilerError::ControlFlowError(_, anchor)
            | CompilerError::CapabilityError(_, anchor)
            | CompilerError::BuiltinError(_, anchor)
            | CompilerError::ForeignError(_, anchor) => anchor.as_ref(),
        }
    }

    /// Attach an anchor if the error does not carry one yet.
    pub fn with_anchor(self, at: &Anchor) -> Self {
        if self.anchor().is_some() {
            return self;
        }
        let at = Some(at.clone());
        match self {
            CompilerError::TypeError(msg, _) => CompilerError::TypeError(msg, at),
            CompilerError::ArityError(msg, _) => CompilerError::ArityError(msg, at),
            CompilerError::RecursionError(msg, _) => CompilerError::RecursionError(msg, at),
            CompilerError::ControlFlowError(msg, _) => CompilerError::ControlFlowError(msg, at),
            CompilerError::CapabilityError(msg, _) => CompilerError::CapabilityError(msg, at),
            CompilerError::BuiltinError(msg, _) => CompilerError::BuiltinError(msg, at),
            CompilerError::ForeignError(msg, _) => CompilerError::ForeignError(msg, at),
        }
    }
}

// =============================================================================
// Error construction macros
// =============================================================================

#[macro_export]
macro_rules! err_type_at {
    ($anchor:expr, $($arg:tt)*) => {
        $crate::error::CompilerError::TypeError(format!($($arg)*), Some(($anchor).clone()))
    };
}

#[macro_export]
macro_rules! bail_type_at {
    ($anchor:expr, $($arg:tt)*) => {
        return Err($crate::err_type_at!($anchor, $($arg)*))
    };
}

#[macro_export]
macro_rules! err_type {
    ($($arg:tt)*) => {
        $crate::error::CompilerError::TypeError(format!($($arg)*), None)
    };
}

#[macro_export]
macro_rules! err_arity_at {
    ($anchor:expr, $($arg:tt)*) => {
        $crate::error::CompilerError::ArityError(format!($($arg)*), Some(($anchor).clone()))
    };
}

#[macro_export]
macro_rules! bail_arity_at {
    ($anchor:expr, $($arg:tt)*) => {
        return Err($crate::err_arity_at!($anchor, $($arg)*))
    };
}

#[macro_export]
macro_rules! err_recursion_at {
    ($anchor:expr, $($arg:tt)*) => {
        $crate::error::CompilerError::RecursionError(format!($($arg)*), Some(($anchor).clone()))
    };
}

#[macro_export]
macro_rules! bail_recursion_at {
    ($anchor:expr, $($arg:tt)*) => {
        return Err($crate::err_recursion_at!($anchor, $($arg)*))
    };
}

#[macro_export]
macro_rules! err_control_at {
    ($anchor:expr, $($arg:tt)*) => {
        $crate::error::CompilerError::ControlFlowError(format!($($arg)*), Some(($anchor).clone()))
    };
}

#[macro_export]
macro_rules! bail_control_at {
    ($anchor:expr, $($arg:tt)*) => {
        return Err($crate::err_control_at!($anchor, $($arg)*))
    };
}

#[macro_export]
macro_rules! err_capability_at {
    ($anchor:expr, $($arg:tt)*) => {
        $crate::error::CompilerError::CapabilityError(format!($($arg)*), Some(($anchor).clone()))
    };
}

#[macro_export]
macro_rules! bail_capability_at {
    ($anchor:expr, $($arg:tt)*) => {
        return Err($crate::err_capability_at!($anchor, $($arg)*))
    };
}

#[macro_export]
macro_rules! err_builtin_at {
    ($anchor:expr, $($arg:tt)*) => {
        $crate::error::CompilerError::BuiltinError(format!($($arg)*), Some(($anchor).clone()))
    };
}

#[macro_export]
macro_rules! bail_builtin_at {
    ($anchor:expr, $($arg:tt)*) => {
        return Err($crate::err_builtin_at!($anchor, $($arg)*))
    };
}

#[macro_export]
macro_rules! err_builtin {
    ($($arg:tt)*) => {
        $crate::error::CompilerError::BuiltinError(format!($($arg)*), None)
    };
}

#[macro_export]
macro_rules! bail_builtin {
    ($($arg:tt)*) => {
        return Err($crate::err_builtin!($($arg)*))
    };
}

#[macro_export]
macro_rules! err_foreign_at {
    ($anchor:expr, $($arg:tt)*) => {
        $crate::error::CompilerError::ForeignError(format!($($arg)*), Some(($anchor).clone()))
    };
}
