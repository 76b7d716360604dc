//! In-memory file store
//!
//! Handles are cheap clones sharing the same rows, so a caller can hand one
//! clone to an operation and inspect what was written through another.

use crate::{FileRole, FileStore, Record, RecordWriter};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

type FileKey = (String, FileRole);

#[derive(Default)]
struct MemoryFile {
    headers: Vec<String>,
    rows: Vec<Record>,
}

#[derive(Default)]
struct MemoryFiles {
    files: HashMap<FileKey, MemoryFile>,
}

/// File store keeping every file in memory.
#[derive(Clone, Default)]
pub struct MemoryFileStore {
    inner: Arc<Mutex<MemoryFiles>>,
    writers: HashMap<FileKey, MemoryRecordWriter>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> MutexGuard<'_, MemoryFiles> {
        // A poisoned lock only means a test panicked mid-write; the rows are still usable
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the rows of the file for `object_type` and `role`.
    pub fn insert_rows(&self, object_type: &str, role: FileRole, rows: Vec<Record>) {
        let mut files = self.files();
        let file = files
            .files
            .entry((object_type.to_string(), role))
            .or_default();
        file.rows = rows;
    }

    /// Rows currently held for `object_type` and `role`.
    pub fn rows(&self, object_type: &str, role: FileRole) -> Vec<Record> {
        self.files()
            .files
            .get(&(object_type.to_string(), role))
            .map(|f| f.rows.clone())
            .unwrap_or_default()
    }

    /// Header the writer for `object_type` and `role` was opened with.
    pub fn headers(&self, object_type: &str, role: FileRole) -> Vec<String> {
        self.files()
            .files
            .get(&(object_type.to_string(), role))
            .map(|f| f.headers.clone())
            .unwrap_or_default()
    }
}

impl FileStore for MemoryFileStore {
    fn read(&mut self, object_type: &str, role: FileRole) -> Result<Vec<Record>> {
        let files = self.files();
        match files.files.get(&(object_type.to_string(), role)) {
            Some(file) => Ok(file.rows.clone()),
            None => anyhow::bail!("No {role} file for {object_type}"),
        }
    }

    fn writer(
        &mut self,
        object_type: &str,
        role: FileRole,
        headers: &[String],
    ) -> Result<&mut dyn RecordWriter> {
        let key = (object_type.to_string(), role);
        if !self.writers.contains_key(&key) {
            let mut files = self.files();
            let file = files.files.entry(key.clone()).or_default();
            file.headers = headers.to_vec();
            // Result rows of an earlier run stay, like the CSV store's appends
            if role != FileRole::Result {
                file.rows.clear();
            }
            drop(files);

            let writer = MemoryRecordWriter {
                inner: Arc::clone(&self.inner),
                key: key.clone(),
                headers: headers.to_vec(),
            };
            self.writers.insert(key.clone(), writer);
        }

        match self.writers.get_mut(&key) {
            Some(writer) => Ok(writer as &mut dyn RecordWriter),
            None => anyhow::bail!("No {role} writer open for {object_type}"),
        }
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
struct MemoryRecordWriter {
    inner: Arc<Mutex<MemoryFiles>>,
    key: FileKey,
    headers: Vec<String>,
}

impl RecordWriter for MemoryRecordWriter {
    fn write(&mut self, record: &Record) -> Result<()> {
        // Keep only header columns, matching what a CSV file would hold
        let row: Record = self
            .headers
            .iter()
            .map(|h| (h.clone(), record.get(h).cloned().unwrap_or_default()))
            .collect();

        let mut files = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        files.files.entry(self.key.clone()).or_default().rows.push(row);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_rows_visible_through_clone() {
        let handle = MemoryFileStore::new();
        let mut store = handle.clone();
        let headers = vec!["Id".to_string(), "Name".to_string()];

        let mut record = Record::new();
        record.insert("Id".to_string(), "001".to_string());
        record.insert("Extra".to_string(), "dropped".to_string());
        store
            .writer("Account", FileRole::Output, &headers)
            .unwrap()
            .write(&record)
            .unwrap();

        let rows = handle.rows("Account", FileRole::Output);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Id"], "001");
        assert_eq!(rows[0]["Name"], "");
        assert!(!rows[0].contains_key("Extra"));
        assert_eq!(handle.headers("Account", FileRole::Output), headers);
    }

    #[test]
    fn test_read_inserted_rows() {
        let mut store = MemoryFileStore::new();
        let mut record = Record::new();
        record.insert("Id".to_string(), "003".to_string());
        store.insert_rows("Contact", FileRole::Input, vec![record]);

        assert_eq!(store.read("Contact", FileRole::Input).unwrap().len(), 1);
        assert!(store.read("Account", FileRole::Input).is_err());
    }
}
