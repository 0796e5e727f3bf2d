//! Whole-document JSON persistence.
//!
//! The entire dataset lives in a single JSON file with two top-level
//! collections. Every operation reads the full document and every mutation
//! rewrites it; there is no locking, so concurrent writers race and the last
//! writer wins.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::models::{ClientRecord, User};

/// The full persisted dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    pub users: Vec<User>,
    pub clients: Vec<ClientRecord>,
}

#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads the full document. A missing or unparsable file degrades to an
    /// empty document instead of an error; callers never see read failures.
    pub async fn load(&self) -> Document {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(document) => document,
                Err(e) => {
                    warn!(
                        "Data file {} is unparsable, continuing with an empty document: {e}",
                        self.path.display()
                    );
                    Document::default()
                }
            },
            Err(_) => Document::default(),
        }
    }

    /// Serializes and overwrites the full document. Not atomic: a crash
    /// mid-write can leave a truncated file, which the next load treats as
    /// an empty dataset.
    pub async fn save(&self, document: &Document) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(document)
            .context("Failed to serialize data document")?;

        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write data file {}", self.path.display()))?;

        Ok(())
    }
}
