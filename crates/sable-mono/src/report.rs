//! Instance report for tooling
//!
//! Lists every specialized instance with its mangled name and bound
//! arguments, so debuggers and rebuild caches can map generated package
//! names back to source-level instantiations.

use crate::engine::InstantiatedUnit;
use serde::{Deserialize, Serialize};

/// One specialized instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Mangled package name
    pub name: String,
    /// Generic package the instance was made from
    pub base: String,
    /// Instance number within the base package
    pub id: u32,
    /// Bound arguments rendered as source literals
    pub arguments: Vec<String>,
}

/// All instances of one unit, grouped by base package in id order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceReport {
    pub unit: String,
    pub instances: Vec<InstanceRecord>,
}

impl InstanceReport {
    pub fn from_unit(unit: &InstantiatedUnit) -> Self {
        let instances = unit
            .registry
            .iter()
            .map(|(base, id, values)| InstanceRecord {
                name: crate::mangle::mangle(base, id).to_string(),
                base: base.to_string(),
                id: id.get(),
                arguments: values.iter().map(|value| value.to_string()).collect(),
            })
            .collect();

        Self {
            unit: unit.name.clone(),
            instances,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Record for a mangled name
    pub fn find(&self, name: &str) -> Option<&InstanceRecord> {
        self.instances.iter().find(|record| record.name == name)
    }
}
