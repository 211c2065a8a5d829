// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Service configuration loaded from TOML; a missing file yields the defaults.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use physmem_mm::LayoutKind;
use physmem_wire::control::{FAMILY_NAME_MAX, GENL_ID_CTRL};
use physmem_wire::DEFAULT_FAMILY_NAME;
use serde::{Deserialize, Serialize};

use crate::service::Family;

/// Default location of the service configuration.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/physmem/physmemd.toml";

/// Errors raised while loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Runtime settings of the service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Family name clients resolve.
    pub family_name: String,
    /// Channel id announced for the family.
    pub family_id: u16,
    /// Paging layout of the platform.
    pub layout: LayoutKind,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            family_name: DEFAULT_FAMILY_NAME.to_owned(),
            family_id: 0x20,
            layout: LayoutKind::default(),
        }
    }
}

impl ServiceConfig {
    /// Loads `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!("{} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io { path: path.to_owned(), source }),
        }
    }

    /// Parses and validates TOML text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.family_name.is_empty() || self.family_name.len() >= FAMILY_NAME_MAX {
            return Err(ConfigError::Invalid("family_name must be 1..16 bytes"));
        }
        if self.family_id <= GENL_ID_CTRL {
            return Err(ConfigError::Invalid("family_id must be above the control id"));
        }
        Ok(())
    }

    /// Family registration described by this config.
    pub fn family(&self) -> Family {
        Family { name: self.family_name.clone(), id: self.family_id }
    }
}
