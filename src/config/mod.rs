//! Analysis configuration: file loading and environment overrides.
//!
//! Priority, lowest first: built-in defaults, config file, environment,
//! CLI flags (applied by the binary).

pub mod schema;

use std::path::Path;

use tracing::debug;

use crate::error::{Result, RetentionError};

pub use schema::{AnalysisConfig, OutputConfig, OutputFormat};

/// Environment variable overriding `strong_references_only`.
pub const ENV_STRONG_ONLY: &str = "HEAP_RETENTION_STRONG_ONLY";

impl AnalysisConfig {
    /// Load from a `.yaml`/`.yml` or `.json` file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&text)?,
            Some("json") => serde_json::from_str(&text)?,
            other => {
                return Err(RetentionError::Config(format!(
                    "unsupported config file {}: expected .yaml, .yml or .json (got {:?})",
                    path.display(),
                    other
                )))
            }
        };
        debug!(path = %path.display(), "loaded analysis config");
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = lookup(ENV_STRONG_ONLY) {
            self.strong_references_only = parse_flag(ENV_STRONG_ONLY, &raw)?;
        }
        Ok(self)
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(RetentionError::Config(format!(
            "{key} must be one of 1/true/yes or 0/false/no, got {raw:?}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
