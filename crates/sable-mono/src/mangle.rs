//! Mangled names for specialized package instances
//!
//! A specialized package is named `__<base>__<id>`. Source identifiers may not
//! begin with `__`, so no user-declared name can take this form. The id is
//! the per-base instance counter, never the parameter values.

use crate::registry::InstanceId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Delimiter reserved for generated names
pub const MANGLE_MARKER: &str = "__";

/// Identifier of a specialized package
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MangledName(String);

impl MangledName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse back into the base package name and instance id
    pub fn demangle(&self) -> Option<(String, InstanceId)> {
        demangle(&self.0)
    }
}

impl fmt::Display for MangledName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MangledName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Name of instance `id` of package `base`
pub fn mangle(base: &str, id: InstanceId) -> MangledName {
    MangledName(format!("{MANGLE_MARKER}{base}{MANGLE_MARKER}{id}"))
}

/// Split a mangled name into base package name and instance id
///
/// The id follows the last marker, so bases that themselves contain `__`
/// demangle correctly. Non-canonical ids (`07`, `0`, `+1`) are rejected.
pub fn demangle(name: &str) -> Option<(String, InstanceId)> {
    let rest = name.strip_prefix(MANGLE_MARKER)?;
    let (base, digits) = rest.rsplit_once(MANGLE_MARKER)?;
    if base.is_empty() || digits.is_empty() || digits.starts_with('0') {
        return None;
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let id = InstanceId::new(digits.parse().ok()?)?;
    Some((base.to_string(), id))
}

/// Whether a source identifier collides with the generated-name space
pub fn is_reserved_identifier(name: &str) -> bool {
    name.starts_with(MANGLE_MARKER)
}
