//! File store abstraction for reading and writing per object type tabular files
//!
//! Every object type taking part in an operation owns up to three files, one
//! per [`FileRole`]:
//!
//! - **Input**: rows to load into the record store
//! - **Output**: rows extracted from the record store
//! - **Result**: identifier mappings and error rows written by the engine
//!
//! # Result Rows
//!
//! The engine writes two row shapes to the result file, both using the fixed
//! [`RESULT_HEADERS`] columns:
//!
//! - `{ Original Id, New Id }` for every record created during a load
//! - `{ Original Id, Error }` for every failure (`Original Id` left empty when
//!   the failure is not tied to a record)
//!
//! # Example
//!
//! ```ignore
//! use sobject_sync_file::{CsvFileStore, FileRole, FileStore};
//!
//! let mut files = CsvFileStore::new("data/");
//! let rows = files.read("Account", FileRole::Input)?;
//! let writer = files.writer("Account", FileRole::Result, &result_headers())?;
//! writer.write(&rows[0])?;
//! ```

mod local;
mod memory;

use anyhow::Result;
use std::collections::BTreeMap;

pub use local::{CsvFileStore, CsvRecordWriter};
pub use memory::MemoryFileStore;

/// A single tabular row: field name to string value.
///
/// An empty string means the field is unset.
pub type Record = BTreeMap<String, String>;

/// Column holding the record identifier in input and output files
pub const ID_COLUMN: &str = "Id";

/// Result file column holding the source-side record identifier
pub const ORIGINAL_ID_COLUMN: &str = "Original Id";

/// Result file column holding the identifier assigned by the record store
pub const NEW_ID_COLUMN: &str = "New Id";

/// Result file column holding an error message
pub const ERROR_COLUMN: &str = "Error";

/// Column layout shared by every result file
pub const RESULT_HEADERS: [&str; 3] = [ORIGINAL_ID_COLUMN, NEW_ID_COLUMN, ERROR_COLUMN];

/// Owned copy of [`RESULT_HEADERS`], in the form [`FileStore::writer`] takes.
pub fn result_headers() -> Vec<String> {
    RESULT_HEADERS.iter().map(|h| h.to_string()).collect()
}

/// Role a file plays for one object type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileRole {
    /// Rows read during a load
    Input,
    /// Rows written during an extraction
    Output,
    /// Identifier mappings and errors written by the engine
    Result,
}

impl FileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileRole::Input => "input",
            FileRole::Output => "output",
            FileRole::Result => "result",
        }
    }
}

impl std::fmt::Display for FileRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink accepting rows for one object type and role.
///
/// Values are emitted in the writer's header order; fields missing from a
/// record are written empty and fields outside the header are ignored.
pub trait RecordWriter: Send {
    fn write(&mut self, record: &Record) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

/// Capability supplying readable and writable tabular files per object type.
pub trait FileStore: Send {
    /// Read every row of the file for `object_type` and `role`.
    fn read(&mut self, object_type: &str, role: FileRole) -> Result<Vec<Record>>;

    /// Get the writer for `object_type` and `role`, opening it on first use.
    ///
    /// `headers` fixes the column layout when the writer is opened and is
    /// ignored on later calls.
    fn writer(
        &mut self,
        object_type: &str,
        role: FileRole,
        headers: &[String],
    ) -> Result<&mut dyn RecordWriter>;

    /// Flush every open writer.
    fn flush(&mut self) -> Result<()>;
}

/// Order `record`'s values according to `headers`.
pub(crate) fn ordered_values<'a>(headers: &[String], record: &'a Record) -> Vec<&'a str> {
    headers
        .iter()
        .map(|h| record.get(h).map(String::as_str).unwrap_or(""))
        .collect()
}
