//! Instance Registry
//!
//! Maps `(base package, parameter values)` to a per-base instance id and back.
//! Ids start at 1 for every base package and grow by one for each new value
//! set, in the order value sets are first seen. Ids are never reused.

use crate::binder::ParameterValueSet;
use crate::error::InstantiationError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;

/// Instance number of a specialized package, unique per base package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(NonZeroU32);

impl InstanceId {
    /// Id from its number; `None` for zero
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of [`InstanceRegistry::lookup_or_allocate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation {
    /// The value set was seen before
    Existing(InstanceId),
    /// A fresh id was allocated
    New(InstanceId),
}

impl Allocation {
    pub fn id(self) -> InstanceId {
        match self {
            Allocation::Existing(id) | Allocation::New(id) => id,
        }
    }

    pub fn is_new(self) -> bool {
        matches!(self, Allocation::New(_))
    }
}

/// Instances of one base package
#[derive(Debug, Clone, Default)]
struct BaseInstances {
    /// Value set -> id
    ids: HashMap<ParameterValueSet, InstanceId>,
    /// Value sets indexed by `id - 1`
    values: Vec<ParameterValueSet>,
}

/// Registry of all instances allocated during one pass
#[derive(Debug, Clone, Default)]
pub struct InstanceRegistry {
    /// Base packages in first-allocation order
    bases: IndexMap<String, BaseInstances>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id for this value set, allocating the next one if unseen
    ///
    /// Fails once a base package has used up every id.
    pub fn lookup_or_allocate(
        &mut self,
        base: &str,
        values: ParameterValueSet,
    ) -> Result<Allocation, InstantiationError> {
        let entry = self.bases.entry(base.to_string()).or_default();
        if let Some(&id) = entry.ids.get(&values) {
            return Ok(Allocation::Existing(id));
        }

        let id = next_id(entry.values.len()).ok_or_else(|| {
            InstantiationError::InstanceOverflow {
                package: base.to_string(),
            }
        })?;
        entry.ids.insert(values.clone(), id);
        entry.values.push(values);
        Ok(Allocation::New(id))
    }

    /// Id previously allocated for this value set
    pub fn lookup(&self, base: &str, values: &ParameterValueSet) -> Option<InstanceId> {
        self.bases.get(base)?.ids.get(values).copied()
    }

    /// Value set an id was allocated for
    pub fn resolve(
        &self,
        base: &str,
        id: InstanceId,
    ) -> Result<&ParameterValueSet, InstantiationError> {
        self.bases
            .get(base)
            .and_then(|instances| instances.values.get(id.get() as usize - 1))
            .ok_or_else(|| InstantiationError::UnknownInstance {
                package: base.to_string(),
                id: id.get(),
            })
    }

    /// Number of instances allocated for a base package
    pub fn instance_count(&self, base: &str) -> usize {
        self.bases.get(base).map_or(0, |instances| instances.values.len())
    }

    /// Total number of instances across all base packages
    pub fn len(&self) -> usize {
        self.bases.values().map(|instances| instances.values.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All instances, grouped by base package, each group in id order
    pub fn iter(&self) -> impl Iterator<Item = (&str, InstanceId, &ParameterValueSet)> {
        self.bases.iter().flat_map(|(base, instances)| {
            instances.values.iter().enumerate().filter_map(move |(index, values)| {
                let id = InstanceId::new(index as u32 + 1)?;
                Some((base.as_str(), id, values))
            })
        })
    }
}

/// Id following `allocated` existing ids
fn next_id(allocated: usize) -> Option<InstanceId> {
    u32::try_from(allocated)
        .ok()
        .and_then(|n| n.checked_add(1))
        .and_then(InstanceId::new)
}
