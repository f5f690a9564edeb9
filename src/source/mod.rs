// src/source/mod.rs

use anyhow::{Context, Result};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::debug;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Ordered places the export may live in.
#[derive(Debug, Clone)]
pub struct SourceLocations {
    candidates: Vec<PathBuf>,
}

impl SourceLocations {
    /// `<home>/Downloads/<file>` first, then `<root>/<file>`.
    pub fn new(home: Option<&Path>, project_root: &Path, file_name: &str) -> Self {
        let mut candidates = Vec::with_capacity(2);
        if let Some(home) = home {
            candidates.push(home.join("Downloads").join(file_name));
        }
        candidates.push(project_root.join(file_name));
        Self { candidates }
    }

    /// Same as [`SourceLocations::new`] with the home directory taken from the environment.
    pub fn from_env(project_root: &Path, file_name: &str) -> Self {
        Self::new(home_dir().as_deref(), project_root, file_name)
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// First candidate that exists as a file.
    pub fn locate(&self) -> Option<PathBuf> {
        self.candidates
            .iter()
            .inspect(|p| debug!(path = %p.display(), "checking for CSV"))
            .find(|p| p.is_file())
            .cloned()
    }
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Header plus data rows of a CSV file.
#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Read the whole CSV into memory, tolerating a UTF-8 byte-order mark.
pub fn read_rows(path: &Path) -> Result<CsvTable> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let data = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let headers = rdr
        .headers()
        .with_context(|| format!("reading CSV header of {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec.with_context(|| format!("reading CSV row {} of {}", i + 1, path.display()))?;
        rows.push(rec.iter().map(str::to_string).collect());
    }

    Ok(CsvTable { headers, rows })
}
