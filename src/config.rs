//! Bridge configuration
//!
//! The strategy is a build/config-time decision: it is read once when the
//! controller is created and never re-selected at runtime.
//!
//! ```json
//! { "kind": "mailbox", "chunk_length": 128 }
//! ```

use crate::bridge::BridgeKind;
use crate::{Ch8AudioError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest chunk a host is allowed to request (one second at 192 kHz)
pub const MAX_CHUNK_LENGTH: usize = 192_000;

/// Configuration for the session's bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Strategy
    pub kind: BridgeKind,
    /// Samples per chunk; `None` uses the strategy default (512 polled, 128 mailbox)
    pub chunk_length: Option<usize>,
}

impl BridgeConfig {
    /// Polled strategy with its default chunk
    pub fn polled() -> Self {
        BridgeConfig {
            kind: BridgeKind::Polled,
            chunk_length: None,
        }
    }

    /// Mailbox strategy with its default chunk
    pub fn mailbox() -> Self {
        BridgeConfig {
            kind: BridgeKind::Mailbox,
            chunk_length: None,
        }
    }

    /// Override the chunk length
    pub fn with_chunk_length(mut self, samples: usize) -> Self {
        self.chunk_length = Some(samples);
        self
    }

    /// Effective chunk length
    pub fn chunk_length(&self) -> usize {
        self.chunk_length.unwrap_or_else(|| self.kind.default_chunk())
    }

    /// Check ranges
    pub fn validate(&self) -> Result<()> {
        match self.chunk_length {
            Some(0) => Err(Ch8AudioError::Config(
                "chunk_length must be greater than 0".into(),
            )),
            Some(n) if n > MAX_CHUNK_LENGTH => Err(Ch8AudioError::Config(format!(
                "chunk_length {n} exceeds maximum {MAX_CHUNK_LENGTH}"
            ))),
            _ => Ok(()),
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: BridgeConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serialize to pretty JSON
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
