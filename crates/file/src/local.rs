//! CSV files on the local filesystem

use crate::{ordered_values, FileRole, FileStore, Record, RecordWriter};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Buffer size for CSV writers (64KB)
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Writer for a single CSV file with a fixed header.
pub struct CsvRecordWriter {
    path: PathBuf,
    headers: Vec<String>,
    writer: csv::Writer<BufWriter<File>>,
}

impl CsvRecordWriter {
    /// Create (truncating) the file at `path` and write the header row.
    pub fn create(path: &Path, headers: &[String]) -> Result<Self> {
        create_parent_dir(path)?;
        let file = File::create(path)
            .with_context(|| format!("Failed to create file: {}", path.display()))?;
        Self::from_file(path, file, headers, true)
    }

    /// Open the file at `path` for appending.
    ///
    /// The header row is written only when the file is new or empty; rows
    /// already in the file are kept.
    pub fn append(path: &Path, headers: &[String]) -> Result<Self> {
        create_parent_dir(path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open file for appending: {}", path.display()))?;
        let is_empty = file
            .metadata()
            .with_context(|| format!("Failed to read metadata of {}", path.display()))?
            .len()
            == 0;
        Self::from_file(path, file, headers, is_empty)
    }

    fn from_file(path: &Path, file: File, headers: &[String], write_header: bool) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(BufWriter::with_capacity(WRITE_BUFFER_SIZE, file));
        if write_header {
            writer
                .write_record(headers)
                .with_context(|| format!("Failed to write CSV header to {}", path.display()))?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            headers: headers.to_vec(),
            writer,
        })
    }
}

fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

impl RecordWriter for CsvRecordWriter {
    fn write(&mut self, record: &Record) -> Result<()> {
        self.writer
            .write_record(ordered_values(&self.headers, record))
            .with_context(|| format!("Failed to write CSV row to {}", self.path.display()))
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))
    }
}

/// File store backed by CSV files in a base directory.
///
/// Paths can be set per object type and role; otherwise they default to
/// `<base>/<ObjectType>.csv` for input and output files and
/// `<base>/<ObjectType>-results.csv` for result files.
pub struct CsvFileStore {
    base_dir: PathBuf,
    paths: HashMap<(String, FileRole), PathBuf>,
    writers: HashMap<(String, FileRole), CsvRecordWriter>,
}

impl CsvFileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            paths: HashMap::new(),
            writers: HashMap::new(),
        }
    }

    /// Override the file used for `object_type` and `role`.
    ///
    /// Relative paths are resolved against the base directory.
    pub fn with_file(mut self, object_type: &str, role: FileRole, path: impl Into<PathBuf>) -> Self {
        self.set_file(object_type, role, path);
        self
    }

    pub fn set_file(&mut self, object_type: &str, role: FileRole, path: impl Into<PathBuf>) {
        self.paths.insert((object_type.to_string(), role), path.into());
    }

    /// Resolve the path for `object_type` and `role`.
    pub fn path_for(&self, object_type: &str, role: FileRole) -> PathBuf {
        match self.paths.get(&(object_type.to_string(), role)) {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.base_dir.join(path),
            None => match role {
                FileRole::Input | FileRole::Output => {
                    self.base_dir.join(format!("{object_type}.csv"))
                }
                FileRole::Result => self.base_dir.join(format!("{object_type}-results.csv")),
            },
        }
    }
}

impl FileStore for CsvFileStore {
    fn read(&mut self, object_type: &str, role: FileRole) -> Result<Vec<Record>> {
        let path = self.path_for(object_type, role);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

        let headers = reader
            .headers()
            .with_context(|| format!("Failed to read CSV headers from {}", path.display()))?
            .clone();

        let mut records = Vec::new();
        for (row, result) in reader.records().enumerate() {
            let row_values = result.with_context(|| {
                format!("Failed to read CSV row {} of {}", row + 1, path.display())
            })?;

            if row_values.len() != headers.len() {
                anyhow::bail!(
                    "Column count mismatch in {} row {}: expected {} columns, found {}",
                    path.display(),
                    row + 1,
                    headers.len(),
                    row_values.len()
                );
            }

            let record: Record = headers
                .iter()
                .zip(row_values.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect();
            records.push(record);
        }

        tracing::debug!(
            "Read {} {} rows for {} from {}",
            records.len(),
            role,
            object_type,
            path.display()
        );

        Ok(records)
    }

    fn writer(
        &mut self,
        object_type: &str,
        role: FileRole,
        headers: &[String],
    ) -> Result<&mut dyn RecordWriter> {
        let key = (object_type.to_string(), role);
        if !self.writers.contains_key(&key) {
            let path = self.path_for(object_type, role);
            tracing::debug!("Opening {} file for {}: {}", role, object_type, path.display());
            // Result rows of an earlier run stay in place
            let writer = match role {
                FileRole::Result => CsvRecordWriter::append(&path, headers)?,
                FileRole::Input | FileRole::Output => CsvRecordWriter::create(&path, headers)?,
            };
            self.writers.insert(key.clone(), writer);
        }

        match self.writers.get_mut(&key) {
            Some(writer) => Ok(writer as &mut dyn RecordWriter),
            None => anyhow::bail!("No {role} writer open for {object_type}"),
        }
    }

    fn flush(&mut self) -> Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}
