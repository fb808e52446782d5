//! Local event directory layout:
//!
//! ```text
//! <event>/
//!   metadata.json
//!   baseline.json
//!   comparator.json
//!   lookups.json
//!   recalculations/
//!     aggregate_results.json
//!     raw_results.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use crate::config::RecalcMetadata;
use crate::dataset::DatasetRole;
use crate::error::{RecalcError, Result};
use crate::lookup::StaticLookup;
use crate::pipeline::RecalculationReport;

pub const METADATA_FILE: &str = "metadata.json";
pub const LOOKUPS_FILE: &str = "lookups.json";
pub const RESULTS_DIR: &str = "recalculations";
pub const AGGREGATE_RESULTS_FILE: &str = "aggregate_results.json";
pub const RAW_RESULTS_FILE: &str = "raw_results.json";

#[derive(Debug, Clone)]
pub struct EventDirectory {
    root: PathBuf,
}

impl EventDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn read_metadata(&self) -> Result<RecalcMetadata> {
        RecalcMetadata::from_json(&read_file(&self.root.join(METADATA_FILE))?)
    }

    /// Raw JSON of `baseline.json` or `comparator.json`.
    pub fn read_dataset(&self, role: DatasetRole) -> Result<Value> {
        let path = self.root.join(format!("{}.json", role.prefix()));
        Ok(serde_json::from_str(&read_file(&path)?)?)
    }

    /// Lookup tables from `path`, or from the event's own `lookups.json`.
    pub fn read_lookups(&self, path: Option<&Path>) -> Result<StaticLookup> {
        let path = path.map_or_else(|| self.root.join(LOOKUPS_FILE), Path::to_path_buf);
        StaticLookup::from_json(&read_file(&path)?)
    }

    /// Write both results under `recalculations/`, returning their paths.
    pub fn write_results(&self, report: &RecalculationReport) -> Result<(PathBuf, PathBuf)> {
        let dir = self.root.join(RESULTS_DIR);
        fs::create_dir_all(&dir).map_err(|source| RecalcError::File {
            path: dir.clone(),
            source,
        })?;

        let aggregate_path = dir.join(AGGREGATE_RESULTS_FILE);
        write_file(&aggregate_path, &report.aggregate_json()?)?;
        let raw_path = dir.join(RAW_RESULTS_FILE);
        write_file(&raw_path, &report.raw_json()?)?;

        info!(dir = %dir.display(), "results written");
        Ok((aggregate_path, raw_path))
    }
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| RecalcError::File {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|source| RecalcError::File {
        path: path.to_path_buf(),
        source,
    })
}
