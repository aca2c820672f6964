//! Stop hook wire format.
//!
//! The agent runtime writes a JSON object to stdin and reads an optional JSON
//! object from stdout. Only `cwd` is consulted on input; malformed input is
//! treated as empty so a broken payload never wedges the agent.

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::decision::BlockReason;

/// Payload the runtime sends on stdin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl HookInput {
    /// Parse a payload, falling back to an empty input.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        serde_json::from_str(raw).unwrap_or_else(|e| {
            debug!("Ignoring malformed hook input: {e}");
            Self::default()
        })
    }

    /// Read and parse the payload from `reader`.
    pub fn read_from(mut reader: impl Read) -> Self {
        let mut raw = String::new();
        if let Err(e) = reader.read_to_string(&mut raw) {
            debug!("Could not read hook input: {e}");
            return Self::default();
        }
        Self::parse(&raw)
    }

    /// Directory to inspect: the payload's `cwd`, else `fallback`.
    #[must_use]
    pub fn working_dir(&self, fallback: &Path) -> PathBuf {
        self.cwd
            .clone()
            .filter(|cwd| !cwd.as_os_str().is_empty())
            .unwrap_or_else(|| fallback.to_path_buf())
    }
}

/// Payload written to stdout when the stop is blocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookOutput {
    pub decision: &'static str,
    pub reason: String,
}

impl HookOutput {
    #[must_use]
    pub fn block(reason: &BlockReason) -> Self {
        Self {
            decision: "block",
            reason: reason.text.clone(),
        }
    }

    /// Serialize as a single-line JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
