//! Policy documents: the behavioral instructions sent as the system prompt.
//!
//! A policy is a versioned TOML file kept outside the binary:
//!
//! ```toml
//! name = "default"
//! version = "1.0.0"
//! description = "Honest privacy framing"
//! text = """
//! You are ...
//! """
//! ```
//!
//! Deployments pick one with `policy.active`; a request never chooses.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    pub text: String,
}

impl Policy {
    /// Read and validate a policy document.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let content = std::fs::read_to_string(path).map_err(|e| PolicyError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let policy = Self::parse(&content).map_err(|reason| PolicyError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;
        tracing::info!(
            policy = %policy.name,
            version = %policy.version,
            chars = policy.text.len(),
            "Policy loaded"
        );
        Ok(policy)
    }

    fn parse(content: &str) -> Result<Self, String> {
        let policy: Self = toml::from_str(content).map_err(|e| e.to_string())?;
        if policy.name.trim().is_empty() {
            return Err("policy name is empty".into());
        }
        if policy.text.trim().is_empty() {
            return Err("policy text is empty".into());
        }
        Ok(policy)
    }

    /// `name@version`, as written to decision records.
    pub fn label(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Failed to read policy at {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Invalid policy at {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}
