//! Engine configuration.
//!
//! Settings are plain data loaded from YAML; every field has a default so a
//! partial document is a valid configuration.
//!
//! ```yaml
//! call_depth_budget: 10
//! hex_inline_limit: 511
//! read_timeout_ms: 2000
//! default_output: results.log
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serscript_protocol::MAX_PAYLOAD_LEN;

use crate::error::{ScriptError, ScriptResult};

/// Default number of jumps allowed per run.
pub const DEFAULT_CALL_DEPTH_BUDGET: u32 = 10;

/// Hex strings shorter than this are sent as binary `D` frames.
pub const DEFAULT_HEX_INLINE_LIMIT: usize = 511;

/// Configuration for the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Total jumps allowed across the whole call tree of one run.
    pub call_depth_budget: u32,
    /// Hex length (in characters) below which hex commands are sent as raw bytes.
    pub hex_inline_limit: usize,
    /// Read timeout for the device link, applied by whoever opens the transport.
    pub read_timeout_ms: Option<u64>,
    /// File that `W` appends to when the command names no path.
    pub default_output: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            call_depth_budget: DEFAULT_CALL_DEPTH_BUDGET,
            hex_inline_limit: DEFAULT_HEX_INLINE_LIMIT,
            read_timeout_ms: None,
            default_output: None,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from YAML text.
    pub fn from_yaml_str(text: &str) -> ScriptResult<Self> {
        let config: EngineConfig = serde_yaml::from_str(text)
            .map_err(|e| ScriptError::Config(format!("invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ScriptResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ScriptError::File {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Check that the settings are usable.
    pub fn validate(&self) -> ScriptResult<()> {
        if self.hex_inline_limit == 0 {
            return Err(ScriptError::Config(
                "hex_inline_limit must be greater than zero".to_string(),
            ));
        }
        // Inline hex must still fit one binary frame
        let max = 2 * MAX_PAYLOAD_LEN + 1;
        if self.hex_inline_limit > max {
            return Err(ScriptError::Config(format!(
                "hex_inline_limit must be at most {}",
                max
            )));
        }
        Ok(())
    }
}
