//! Iteration fingerprints

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Compact summary of one agent reasoning iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFingerprint {
    pub tool_call_names: Vec<String>,
    pub touched_files: Vec<PathBuf>,
    /// Hex SHA-256 over the response text plus tool and file lists
    pub response_hash: String,
    pub iteration_number: u32,
}

impl StateFingerprint {
    pub fn new(
        tool_call_names: Vec<String>,
        touched_files: Vec<PathBuf>,
        response_text: &str,
        iteration_number: u32,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(response_text.as_bytes());
        hasher.update(b"\n");
        for name in &tool_call_names {
            hasher.update(name.as_bytes());
            hasher.update(b",");
        }
        hasher.update(b"\n");
        for file in &touched_files {
            hasher.update(file.to_string_lossy().as_bytes());
            hasher.update(b",");
        }
        let response_hash = hex::encode(hasher.finalize());

        Self {
            tool_call_names,
            touched_files,
            response_hash,
            iteration_number,
        }
    }
}
