//! Persistence of recognized results.
//!
//! Results are appended to a JSON-lines file, one record per line, opened in
//! append mode for every write so completed records survive a crash.

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::ocr::Recognition;

/// Stores one recognition result and returns its id.
pub trait ResultStore {
    fn save(&mut self, image_path: &Path, recognition: &Recognition) -> Result<u64>;
}

/// One line of the results file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
    pub id: u64,
    pub image_path: String,
    pub ocr_text: String,
    pub debug_info: String,
    pub json_data: String,
    pub raw_text: String,
    pub created_at: String,
}

/// Append-only JSON-lines store.
///
/// Ids keep increasing across restarts: opening an existing file resumes
/// after the highest id found in it.
pub struct JsonlStore {
    path: PathBuf,
    next_id: u64,
}

impl JsonlStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let last_id = if path.exists() {
            read_records(&path)?.iter().map(|r| r.id).max().unwrap_or(0)
        } else {
            0
        };

        Ok(Self {
            path,
            next_id: last_id + 1,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultStore for JsonlStore {
    fn save(&mut self, image_path: &Path, recognition: &Recognition) -> Result<u64> {
        let record = StoredResult {
            id: self.next_id,
            image_path: image_path.display().to_string(),
            ocr_text: recognition.text.clone(),
            debug_info: recognition.parsed.debug_info.clone(),
            json_data: recognition.parsed.json_data.clone(),
            raw_text: recognition.parsed.raw_text.clone(),
            created_at: Local::now().to_rfc3339(),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("Failed to open results file for append")?;
        let line = serde_json::to_string(&record).context("Failed to serialize result")?;
        writeln!(file, "{}", line).context("Failed to write result")?;

        self.next_id += 1;
        Ok(record.id)
    }
}

/// Reads every well-formed record; malformed lines are logged and skipped.
pub fn read_records(path: &Path) -> Result<Vec<StoredResult>> {
    let file = File::open(path).context("Failed to open results file")?;
    let mut records = Vec::new();

    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("Failed to read results file")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StoredResult>(&line) {
            Ok(record) => records.push(record),
            Err(e) => crate::log(&format!(
                "Warning: skipping malformed line {} in {}: {}",
                n + 1,
                path.display(),
                e
            )),
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::parse::ParsedOutput;
    use tempfile::tempdir;

    fn recognition(raw: &str) -> Recognition {
        Recognition {
            text: format!("debug\n{{\"raw\":\"{}\"}}", raw),
            parsed: ParsedOutput {
                debug_info: "debug".into(),
                json_data: "{}".into(),
                raw_text: raw.into(),
            },
        }
    }

    #[test]
    fn test_save_assigns_increasing_ids() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let mut store = JsonlStore::open(&path).unwrap();

        assert_eq!(store.save(Path::new("a.png"), &recognition("one")).unwrap(), 1);
        assert_eq!(store.save(Path::new("b.png"), &recognition("two")).unwrap(), 2);

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].image_path, "a.png");
        assert_eq!(records[1].raw_text, "two");
        assert_eq!(records[1].debug_info, "debug");
    }

    #[test]
    fn test_ids_continue_after_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.jsonl");

        {
            let mut store = JsonlStore::open(&path).unwrap();
            store.save(Path::new("a.png"), &recognition("one")).unwrap();
            store.save(Path::new("b.png"), &recognition("two")).unwrap();
        }

        let mut store = JsonlStore::open(&path).unwrap();
        assert_eq!(store.save(Path::new("c.png"), &recognition("three")).unwrap(), 3);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        std::fs::write(&path, "not json\n\n").unwrap();

        let mut store = JsonlStore::open(&path).unwrap();
        assert_eq!(store.save(Path::new("a.png"), &recognition("one")).unwrap(), 1);
        assert_eq!(read_records(&path).unwrap().len(), 1);
    }
}
