//! Flow discovery and directory scanning
//!
//! Loads every `*.flow.json` file found in a directory. One bad file never
//! stops the scan.

use crate::loader::{FlowLoader, LoadedFlow, LoaderError};
use flow_api::Grants;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name suffix of flow definitions
pub const FLOW_SUFFIX: &str = ".flow.json";

/// Errors that can occur during flow discovery
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Failed to read directory: {0}")]
    ReadDirectory(#[source] std::io::Error),

    #[error("Failed to load flow {path}: {source}")]
    LoadFlow {
        path: PathBuf,
        #[source]
        source: LoaderError,
    },
}

/// Result of a scan
#[derive(Debug)]
pub struct DiscoveryResult {
    pub flows: Vec<LoadedFlow>,
    pub failures: Vec<(PathBuf, DiscoveryError)>,
}

impl DiscoveryResult {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total number of flow files found
    pub fn total_found(&self) -> usize {
        self.flows.len() + self.failures.len()
    }
}

/// Flow directory scanner
#[derive(Debug)]
pub struct FlowScanner {
    loader: FlowLoader,
    grants: Grants,
}

impl FlowScanner {
    /// Scanner whose flows are checked against `grants`
    pub fn new(loader: FlowLoader, grants: Grants) -> Self {
        Self { loader, grants }
    }

    /// Scan a directory for flow files, sorted by file name
    pub fn scan_directory(&self, dir: impl AsRef<Path>) -> Result<DiscoveryResult, DiscoveryError> {
        let dir = dir.as_ref();

        if !dir.is_dir() {
            return Err(DiscoveryError::DirectoryNotFound(dir.to_path_buf()));
        }

        let entries = std::fs::read_dir(dir).map_err(DiscoveryError::ReadDirectory)?;

        let mut paths = Vec::new();
        let mut failures = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if is_flow_file(&path) {
                        paths.push(path);
                    }
                }
                Err(e) => failures.push((dir.to_path_buf(), DiscoveryError::ReadDirectory(e))),
            }
        }
        paths.sort();

        let mut flows = Vec::new();
        for path in paths {
            match self.loader.load_file(&path, &self.grants) {
                Ok(flow) => flows.push(flow),
                Err(source) => {
                    tracing::warn!(path = %path.display(), error = %source, "Failed to load flow");
                    failures.push((
                        path.clone(),
                        DiscoveryError::LoadFlow { path, source },
                    ));
                }
            }
        }

        tracing::info!(dir = %dir.display(), loaded = flows.len(), failed = failures.len(), "Scanned flow directory");
        Ok(DiscoveryResult { flows, failures })
    }

    /// Scan several directories; missing ones are reported as failures
    pub fn scan_directories(
        &self,
        dirs: impl IntoIterator<Item = impl AsRef<Path>>,
    ) -> DiscoveryResult {
        let mut flows = Vec::new();
        let mut failures = Vec::new();

        for dir in dirs {
            let dir = dir.as_ref();
            match self.scan_directory(dir) {
                Ok(result) => {
                    flows.extend(result.flows);
                    failures.extend(result.failures);
                }
                Err(e) => failures.push((dir.to_path_buf(), e)),
            }
        }

        DiscoveryResult { flows, failures }
    }
}

fn is_flow_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(FLOW_SUFFIX))
}

/// Default flow directories for the current platform
pub fn default_flow_dirs(app_name: &str) -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Some(data_dir) = dirs::data_local_dir() {
        dirs.push(data_dir.join(app_name).join("flows"));
    }

    dirs.push(PathBuf::from("flows"));

    dirs
}
