//! Sable Generic Instantiation
//!
//! Lowers generic packages to plain ones. Every distinct binding of a
//! generic package's parameters becomes one specialized package named
//! `__<base>__<id>`, and every qualified reference in the unit is rewritten
//! to the specialized package it resolves to.
//!
//! The pass is split into:
//! - Parameter binding (`binder`)
//! - Instance deduplication and numbering (`registry`)
//! - Name mangling (`mangle`)
//! - Body specialization (`specializer`)
//! - Reference rewriting (`rewriter`)
//! - The driver tying them together (`engine`)

pub mod binder;
pub mod config;
pub mod engine;
pub mod error;
pub mod mangle;
pub mod registry;
pub mod report;
mod rewriter;
pub mod specializer;

pub use binder::{bind_arguments, ParameterValueSet};
pub use config::{ConfigError, InstantiationConfig};
pub use engine::{instantiate, InstantiatedUnit, Instantiator};
pub use error::{InstantiationError, InstantiationFailure, ResolveFailure};
pub use mangle::{demangle, is_reserved_identifier, mangle, MangledName};
pub use registry::{Allocation, InstanceId, InstanceRegistry};
pub use report::{InstanceRecord, InstanceReport};
pub use specializer::SpecializedPackage;
