//! Configuration management for disclose verification sessions
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (DISCLOSE_* prefix, `__` between sections)
//! 2. disclose.local.toml (gitignored, local overrides)
//! 3. disclose.toml (git-tracked, project config)
//! 4. ~/.config/disclose/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)
//!
//! ```toml
//! [verification]
//! capture_backtrace = false
//! dump_components = true
//! fail_fast = false
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main disclose configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscloseConfig {
    pub verification: VerificationSettings,
}

/// Knobs that change how a verification session reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    /// Capture a full backtrace for every failed verification.
    ///
    /// When disabled only the caller location is recorded.
    pub capture_backtrace: bool,
    /// Emit `description = value` lines for every component of a result.
    pub dump_components: bool,
    /// Treat every verification as blocking.
    pub fail_fast: bool,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            capture_backtrace: true,
            dump_components: true,
            fail_fast: false,
        }
    }
}

impl DiscloseConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Parse a single TOML file, without merging any other source.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Configuration suited to CI: stop at the first failure, keep traces.
    pub fn strict() -> Self {
        Self {
            verification: VerificationSettings {
                fail_fast: true,
                ..Default::default()
            },
        }
    }

    /// Configuration that keeps log output short.
    pub fn quiet() -> Self {
        Self {
            verification: VerificationSettings {
                capture_backtrace: false,
                dump_components: false,
                fail_fast: false,
            },
        }
    }
}
