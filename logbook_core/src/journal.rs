//! Append-only journal of outings.
//!
//! Every added or modified outing is appended as one JSON line, with file
//! locking for safe concurrent access. On replay the last line written for
//! an id wins.

use crate::{Error, OutingId, OutingInfo, Result};
use fs2::FileExt;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Sink for persisting outing records
pub trait OutingSink {
    fn append(&mut self, outing: &OutingInfo) -> Result<()>;
}

/// JSONL-based outing journal with file locking
pub struct OutingJournal {
    path: PathBuf,
}

impl OutingJournal {
    /// Create a journal for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the parent directory exists
    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Replay the journal, keeping the latest record per outing
    pub fn replay(&self) -> Result<Vec<OutingInfo>> {
        self.replay_valid(|_| true)
    }

    /// Replay the journal, keeping per outing the latest record `valid` accepts
    ///
    /// A rejected record belongs to a change whose snapshot never made it to
    /// disk, so the record before it is used. An outing with no accepted
    /// record at all is a database error.
    pub fn replay_valid<F>(&self, valid: F) -> Result<Vec<OutingInfo>>
    where
        F: Fn(&OutingInfo) -> bool,
    {
        let mut latest = BTreeMap::<OutingId, OutingInfo>::new();
        let mut orphans = BTreeSet::<OutingId>::new();

        for outing in read_outings(&self.path)? {
            if valid(&outing) {
                orphans.remove(&outing.id);
                latest.insert(outing.id, outing);
            } else {
                tracing::warn!("Ignoring uncommitted journal record for outing {}", outing.id);
                if !latest.contains_key(&outing.id) {
                    orphans.insert(outing.id);
                }
            }
        }

        if let Some(id) = orphans.first() {
            return Err(Error::Database(format!(
                "journal {:?} has no usable record for outing {}",
                self.path, id
            )));
        }
        Ok(latest.into_values().collect())
    }

    /// Atomically replace the journal with one line per outing
    pub fn rewrite<'a, I>(&self, outings: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a OutingInfo>,
    {
        self.ensure_parent_dir()?;
        let temp = NamedTempFile::new_in(self.path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "journal path missing parent")
        })?)?;

        temp.as_file().lock_exclusive()?;
        let mut count = 0;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            for outing in outings {
                let line = serde_json::to_string(outing)?;
                writer.write_all(line.as_bytes())?;
                writer.write_all(b"\n")?;
                count += 1;
            }
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::info!("Rewrote journal {:?} with {} outings", self.path, count);
        Ok(count)
    }
}

impl OutingSink for OutingJournal {
    fn append(&mut self, outing: &OutingInfo) -> Result<()> {
        self.ensure_parent_dir()?;

        let mut record = serde_json::to_string(outing)?;
        record.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;
        let written = file
            .write_all(record.as_bytes())
            .and_then(|()| file.sync_data());
        file.unlock()?;
        written?;

        tracing::debug!("Journaled outing {}", outing.id);
        Ok(())
    }
}

/// Read every record from a journal file, in write order
///
/// Only the final line may fail to parse: that is an append cut short and
/// is dropped. A bad line anywhere else means the journal is corrupt.
pub fn read_outings(path: &Path) -> Result<Vec<OutingInfo>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;
    let lines: std::io::Result<Vec<String>> = BufReader::new(&file).lines().collect();
    file.unlock()?;

    let mut outings = Vec::new();
    let mut torn: Option<(usize, serde_json::Error)> = None;
    for (index, line) in lines?.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some((at, e)) = torn.take() {
            return Err(Error::Database(format!(
                "journal {:?} is corrupt at line {}: {}",
                path, at, e
            )));
        }
        match serde_json::from_str::<OutingInfo>(line) {
            Ok(outing) => outings.push(outing),
            Err(e) => torn = Some((index + 1, e)),
        }
    }

    if let Some((at, e)) = torn {
        tracing::warn!("Dropping incomplete journal line {}: {}", at, e);
    }
    tracing::debug!("Read {} outing records from journal", outings.len());
    Ok(outings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn create_test_outing(id: OutingId, boat: &str) -> OutingInfo {
        OutingInfo {
            id,
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            rowers: vec![1, 2],
            cox: Some(3),
            time_out: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
            time_in: Some(NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
            comment: None,
            destination: Some("Lock".into()),
            boat_name: boat.into(),
            distance: 14,
        }
    }

    #[test]
    fn test_append_and_replay() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut journal = OutingJournal::new(temp_dir.path().join("outings.wal"));

        journal.append(&create_test_outing(1, "Nixe")).unwrap();
        journal.append(&create_test_outing(2, "Undine")).unwrap();

        let outings = journal.replay().unwrap();
        assert_eq!(outings.len(), 2);
        assert_eq!(outings[0], create_test_outing(1, "Nixe"));
    }

    #[test]
    fn test_replay_keeps_latest_record() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut journal = OutingJournal::new(temp_dir.path().join("outings.wal"));

        journal.append(&create_test_outing(1, "Nixe")).unwrap();
        journal.append(&create_test_outing(1, "Undine")).unwrap();

        let outings = journal.replay().unwrap();
        assert_eq!(outings.len(), 1);
        assert_eq!(outings[0].boat_name, "Undine");
        assert_eq!(read_outings(journal.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_torn_last_line_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("outings.wal");
        let mut journal = OutingJournal::new(&path);
        journal.append(&create_test_outing(1, "Nixe")).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"id\": 2, \"date\": \"2024-").unwrap();

        let outings = journal.replay().unwrap();
        assert_eq!(outings.len(), 1);
    }

    #[test]
    fn test_corrupt_middle_line_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("outings.wal");
        let mut journal = OutingJournal::new(&path);
        for id in 1..=3 {
            journal.append(&create_test_outing(id, "Nixe")).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<&str> = contents.lines().collect();
        lines[1] = "{garbage";
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        let result = journal.replay();
        assert!(matches!(result, Err(Error::Database(_))));
    }

    #[test]
    fn test_replay_valid_falls_back_to_earlier_record() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut journal = OutingJournal::new(temp_dir.path().join("outings.wal"));
        journal.append(&create_test_outing(1, "Nixe")).unwrap();
        journal.append(&create_test_outing(1, "Neptun")).unwrap();
        journal.append(&create_test_outing(2, "Undine")).unwrap();

        let outings = journal
            .replay_valid(|o| o.boat_name != "Neptun")
            .unwrap();
        assert_eq!(outings.len(), 2);
        assert_eq!(outings[0].boat_name, "Nixe");

        let result = journal.replay_valid(|o| o.boat_name != "Undine");
        assert!(matches!(result, Err(Error::Database(_))));
    }

    #[test]
    fn test_rewrite_compacts() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut journal = OutingJournal::new(temp_dir.path().join("outings.wal"));
        for boat in ["Nixe", "Undine", "Amsel"] {
            journal.append(&create_test_outing(1, boat)).unwrap();
        }

        let latest = journal.replay().unwrap();
        assert_eq!(journal.rewrite(&latest).unwrap(), 1);
        assert_eq!(read_outings(journal.path()).unwrap().len(), 1);
        assert_eq!(journal.replay().unwrap()[0].boat_name, "Amsel");
    }

    #[test]
    fn test_read_missing_journal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let outings = read_outings(&temp_dir.path().join("nonexistent.wal")).unwrap();
        assert!(outings.is_empty());
    }
}
