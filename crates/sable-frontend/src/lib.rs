//! Sable Frontend - AST and constant evaluation
//!
//! This crate holds what the elaboration passes consume from parsing:
//! - The AST of a source unit (packages, modules, expressions, types)
//! - Source spans for diagnostics
//! - Compile-time constant evaluation with width-aware integers

pub mod ast;
pub mod const_eval;
pub mod span;

pub use ast::{Description, Expr, PackageDecl, QualifiedPath, SourceUnit, TypeExpr};
pub use const_eval::{
    ConstEvaluator, ConstResolver, ConstValue, EvalError, IntValue, NoExternalConstants,
};
pub use span::SourceSpan;
