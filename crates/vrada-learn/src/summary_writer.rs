//! JSON-lines sink for [`SummaryRecord`]s.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use vrada_core::{SummaryRecord, VradaError};

/// Appends one JSON object per summary record to a file.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use vrada_learn::summary_writer::SummaryWriter;
///
/// let mut writer = SummaryWriter::create(Path::new("summaries.jsonl")).unwrap();
/// writer.flush().unwrap();
/// ```
#[derive(Debug)]
pub struct SummaryWriter {
    out: BufWriter<File>,
    path: PathBuf,
    written: usize,
}

impl SummaryWriter {
    /// Opens `path` for appending, creating it and its parent directory.
    ///
    /// # Errors
    ///
    /// Returns [`VradaError::StorageError`] if the file cannot be opened.
    pub fn create(path: &Path) -> Result<Self, VradaError> {
        let storage_err = |e: std::io::Error| VradaError::StorageError {
            message: format!("summary file {}: {e}", path.display()),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(storage_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(storage_err)?;
        Ok(Self {
            out: BufWriter::new(file),
            path: path.to_path_buf(),
            written: 0,
        })
    }

    /// Writes a single record as one line.
    pub fn write(&mut self, record: &SummaryRecord) -> Result<(), VradaError> {
        serde_json::to_writer(&mut self.out, record).map_err(|e| VradaError::StorageError {
            message: format!("failed to serialize summary '{}': {e}", record.name),
        })?;
        self.out.write_all(b"\n").map_err(|e| VradaError::StorageError {
            message: format!("summary file {}: {e}", self.path.display()),
        })?;
        self.written += 1;
        Ok(())
    }

    pub fn write_all(&mut self, records: &[SummaryRecord]) -> Result<(), VradaError> {
        records.iter().try_for_each(|r| self.write(r))
    }

    pub fn flush(&mut self) -> Result<(), VradaError> {
        self.out.flush().map_err(|e| VradaError::StorageError {
            message: format!("summary file {}: {e}", self.path.display()),
        })
    }

    /// Records written through this writer.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SummaryWriter {
    fn drop(&mut self) {
        let _ = self.out.flush();
    }
}
