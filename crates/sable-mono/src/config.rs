//! Instantiation settings
//!
//! Read from the `[generics]` table of a project manifest:
//!
//! ```toml
//! [generics]
//! default_integer_width = 32
//! max_instantiation_depth = 64
//! ```

use sable_frontend::const_eval::{DEFAULT_INTEGER_WIDTH, MAX_WIDTH};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading settings
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the manifest
    #[error("I/O error: {0}")]
    Io(String),

    /// TOML parsing error
    #[error("Failed to parse manifest: {0}")]
    Parse(String),

    /// Setting outside its valid range
    #[error("Invalid generics setting: {0}")]
    Invalid(String),
}

/// Settings for the instantiation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstantiationConfig {
    /// Width of integer literals written without a size
    pub default_integer_width: u32,
    /// Maximum nesting of instantiations triggered by other instantiations
    pub max_instantiation_depth: usize,
}

impl Default for InstantiationConfig {
    fn default() -> Self {
        Self {
            default_integer_width: DEFAULT_INTEGER_WIDTH,
            max_instantiation_depth: 64,
        }
    }
}

/// Manifest view holding only the table this pass reads
#[derive(Debug, Default, Deserialize)]
struct ManifestSection {
    #[serde(default)]
    generics: InstantiationConfig,
}

impl InstantiationConfig {
    /// Parse the `[generics]` table of a manifest; other tables are ignored
    pub fn from_manifest_str(s: &str) -> Result<Self, ConfigError> {
        let section: ManifestSection =
            toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        section.generics.validate()?;
        Ok(section.generics)
    }

    /// Load settings from a manifest file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_manifest_str(&contents)
    }

    /// Check every setting is in range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_integer_width == 0 || self.default_integer_width > MAX_WIDTH {
            return Err(ConfigError::Invalid(format!(
                "default_integer_width must be between 1 and {}, got {}",
                MAX_WIDTH, self.default_integer_width
            )));
        }
        if self.max_instantiation_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_instantiation_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
