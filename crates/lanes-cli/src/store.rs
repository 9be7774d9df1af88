//! File-backed system of record: a JSON board file guarded by an advisory
//! lock for the whole command.
//!
//! ```json
//! { "workspace": "acme", "project": "web", "states": [...], "issues": [...] }
//! ```

use anyhow::{Context, Result};
use lanes_core::error::ErrorCode;
use lanes_core::lock::BoardLock;
use lanes_core::memory::MemoryService;
use lanes_core::model::{Issue, State};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("board file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to write board file {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}

impl StoreError {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::BoardNotFound,
            Self::Write { .. } => ErrorCode::BoardWriteFailed,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BoardFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default)]
    pub states: Vec<State>,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

/// An open board file. The lock is held until the store is dropped.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    workspace: Option<String>,
    project: Option<String>,
    _lock: BoardLock,
}

impl JsonFileStore {
    /// Lock and load `path`, returning the store and an in-memory service
    /// seeded with its contents.
    pub fn open(path: &Path) -> Result<(Self, MemoryService)> {
        if !path.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()).into());
        }
        let lock = BoardLock::acquire(&BoardLock::path_for(path), LOCK_TIMEOUT)?;

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file: BoardFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        debug!(
            path = %path.display(),
            states = file.states.len(),
            issues = file.issues.len(),
            "board file loaded"
        );

        let store = Self {
            path: path.to_path_buf(),
            workspace: file.workspace,
            project: file.project,
            _lock: lock,
        };
        Ok((store, MemoryService::new(file.states, file.issues)))
    }

    pub fn workspace(&self) -> Option<&str> {
        self.workspace.as_deref()
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    /// Write the service's states and issues back, replacing the file
    /// atomically.
    pub fn save(&self, service: MemoryService) -> Result<()> {
        let (states, issues) = service.into_parts();
        let file = BoardFile {
            workspace: self.workspace.clone(),
            project: self.project.clone(),
            states,
            issues,
        };
        let body = serde_json::to_string_pretty(&file).context("Failed to encode board")?;

        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);
        fs::write(&tmp, body + "\n")
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), "board file saved");
        Ok(())
    }
}
