//! # State Configuration
//!
//! Settings for the device manager, loaded from TOML.
//!
//! ```toml
//! update_modes = ["dynamic", "fixed"]
//! validate_migration_layouts = true
//! initial_device_capacity = 16
//! ```

use std::path::Path;

use serde::Deserialize;

use inputstate_core::{UpdateMask, UpdateMode};

use crate::error::{ManagerError, ManagerResult};

/// Device manager configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateConfig {
    /// Update modes that get their own double buffers.
    pub update_modes: UpdateMask,
    /// Skip migrating devices whose layout changed between allocations.
    pub validate_migration_layouts: bool,
    /// Devices to reserve room for in the device list.
    pub initial_device_capacity: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            update_modes: UpdateMask::from(UpdateMode::Dynamic),
            validate_migration_layouts: true,
            initial_device_capacity: 8,
        }
    }
}

impl StateConfig {
    /// Parses a configuration from TOML. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for malformed TOML, unknown fields or unknown modes.
    pub fn from_toml_str(source: &str) -> ManagerResult<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// `ConfigRead` if the file cannot be read, otherwise as
    /// [`StateConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> ManagerResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ManagerError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
}
