//! Error types for generic instantiation

use crate::specializer::SpecializedPackage;
use sable_frontend::{EvalError, SourceSpan};
use thiserror::Error;

/// Errors detected while binding, specializing or rewriting generic packages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstantiationError {
    /// Argument count differs from the declared parameter count
    #[error("{site}: package '{package}' expects {expected} generic argument(s), found {found}")]
    ArityMismatch {
        package: String,
        expected: usize,
        found: usize,
        site: SourceSpan,
    },

    /// Expression cannot be reduced to a compile-time constant
    #[error("{site}: {what} is not a compile-time constant: {reason}")]
    NotConstant {
        what: String,
        reason: String,
        site: SourceSpan,
    },

    /// Value type incompatible with the declared type
    #[error("{site}: {what} has type {found}, expected {expected}")]
    TypeMismatch {
        what: String,
        expected: String,
        found: String,
        site: SourceSpan,
    },

    /// Instance id never allocated for a base package
    #[error("no instance {id} of package '{package}'")]
    UnknownInstance { package: String, id: u32 },

    /// Every instance id of a base package is in use
    #[error("package '{package}' has run out of instance ids")]
    InstanceOverflow { package: String },

    /// Referenced package or member does not exist
    #[error("{site}: cannot resolve '{name}'")]
    UnresolvedDependency { name: String, site: SourceSpan },

    /// Constant evaluation loops back on itself
    #[error("{site}: cyclic constant dependency: {}", .chain.join(" -> "))]
    CyclicConstantDependency { chain: Vec<String>, site: SourceSpan },

    /// Constant evaluation failed for another reason
    #[error("{site}: failed to evaluate {what}: {error}")]
    Evaluation {
        what: String,
        error: EvalError,
        site: SourceSpan,
    },

    /// Nested instantiation went deeper than the configured limit
    #[error("{site}: instantiating '{package}' exceeds the nesting limit of {limit}")]
    RecursionLimit {
        package: String,
        limit: usize,
        site: SourceSpan,
    },

    /// Two top-level declarations share a name
    #[error("{site}: '{name}' is declared more than once")]
    DuplicateDeclaration { name: String, site: SourceSpan },

    /// Source identifier uses the prefix reserved for generated names
    #[error("{site}: identifier '{name}' uses the reserved '__' prefix")]
    ReservedIdentifier { name: String, site: SourceSpan },
}

impl InstantiationError {
    /// Location the error points at, if any
    pub fn site(&self) -> Option<&SourceSpan> {
        match self {
            InstantiationError::UnknownInstance { .. }
            | InstantiationError::InstanceOverflow { .. } => None,
            InstantiationError::ArityMismatch { site, .. }
            | InstantiationError::NotConstant { site, .. }
            | InstantiationError::TypeMismatch { site, .. }
            | InstantiationError::UnresolvedDependency { site, .. }
            | InstantiationError::CyclicConstantDependency { site, .. }
            | InstantiationError::Evaluation { site, .. }
            | InstantiationError::RecursionLimit { site, .. }
            | InstantiationError::DuplicateDeclaration { site, .. }
            | InstantiationError::ReservedIdentifier { site, .. } => Some(site),
        }
    }
}

/// Failure of a whole pass
///
/// Carries every error plus the instances that were specialized successfully.
#[derive(Debug, Clone, Error)]
#[error("generic instantiation failed with {} error(s)", .errors.len())]
pub struct InstantiationFailure {
    /// Errors in the order they were detected
    pub errors: Vec<InstantiationError>,
    /// Instances completed before or despite the failures
    pub packages: Vec<SpecializedPackage>,
}

/// Error raised while resolving names during constant evaluation
///
/// Evaluator errors still need a description of what was being evaluated and
/// where; instantiation errors raised by nested work are already complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveFailure {
    Eval(EvalError),
    Instantiation(InstantiationError),
}

impl From<EvalError> for ResolveFailure {
    fn from(error: EvalError) -> Self {
        ResolveFailure::Eval(error)
    }
}

impl From<InstantiationError> for ResolveFailure {
    fn from(error: InstantiationError) -> Self {
        ResolveFailure::Instantiation(error)
    }
}

impl ResolveFailure {
    /// Attach context to an evaluator error
    pub fn into_error(self, what: &str, site: &SourceSpan) -> InstantiationError {
        let error = match self {
            ResolveFailure::Instantiation(error) => return error,
            ResolveFailure::Eval(error) => error,
        };
        match error {
            EvalError::UndefinedSymbol(name) => InstantiationError::UnresolvedDependency {
                name,
                site: site.clone(),
            },
            EvalError::NotConstant(reason) => InstantiationError::NotConstant {
                what: what.to_string(),
                reason,
                site: site.clone(),
            },
            EvalError::TypeMismatch(found) => InstantiationError::TypeMismatch {
                what: what.to_string(),
                expected: "a compatible operand".to_string(),
                found,
                site: site.clone(),
            },
            error => InstantiationError::Evaluation {
                what: what.to_string(),
                error,
                site: site.clone(),
            },
        }
    }
}
