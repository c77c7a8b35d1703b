//! CSV result files with one lock per file path

use crate::output::{OutputResult, ResultSink, Row};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Writes result rows and artifacts under one results directory
pub struct CsvSinks {
    root: PathBuf,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl CsvSinks {
    /// Creates the sink set; `root` is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The results directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    fn resolve(&self, file: &str) -> OutputResult<PathBuf> {
        let path = self.root.join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(path)
    }
}

impl ResultSink for CsvSinks {
    fn append_rows(&self, file: &str, rows: &[Row]) -> OutputResult<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        let path = self.resolve(file)?;
        let header: Vec<&str> = first.columns().collect();

        let lock = self.path_lock(&path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let is_new = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let handle = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(handle);

        if is_new {
            writer.write_record(&header)?;
        }
        for row in rows {
            writer.write_record(header.iter().map(|column| row.get(column).unwrap_or("")))?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_artifact(&self, file: &str, bytes: &[u8]) -> OutputResult<()> {
        let path = self.resolve(file)?;
        let lock = self.path_lock(&path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        fs::write(&path, bytes)?;
        Ok(())
    }
}
