//! File-backed logbook with file locking.
//!
//! A data directory holds two files:
//! - `club.json`: snapshot of boats, groups, members and admins, replaced
//!   atomically on every roster change
//! - `outings.wal`: the outing journal (see [`crate::journal`])
//!
//! Every mutation is applied to a copy of the in-memory state first and
//! only becomes visible once it has been written.

use crate::journal::{OutingJournal, OutingSink};
use crate::memory::{ClubData, MemoryDatabase};
use crate::{
    AdminInfo, BoatInfo, BoatStatistic, Colour, Database, Error, GroupId, GroupInfo,
    GroupStatistic, MemberId, MemberInfo, MemberStatistic, OutingDraft, OutingId, OutingInfo,
    Result, SortMode,
};
use chrono::NaiveDate;
use fs2::FileExt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Snapshot file name inside the data directory
pub const SNAPSHOT_FILE: &str = "club.json";

/// Outing journal file name inside the data directory
pub const JOURNAL_FILE: &str = "outings.wal";

impl ClubData {
    /// Load roster data from a file with shared locking
    ///
    /// Returns empty data if the file doesn't exist. A file that cannot be
    /// read or parsed is a database error: roster data is never dropped
    /// silently.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No snapshot found at {:?}, starting with an empty club", path);
            return Ok(Self::default());
        }

        let file = File::open(path)
            .map_err(|e| Error::Database(format!("cannot open {:?}: {}", path, e)))?;
        file.lock_shared()?;

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read.map_err(|e| Error::Database(format!("cannot read {:?}: {}", path, e)))?;

        let club = serde_json::from_str::<ClubData>(&contents)
            .map_err(|e| Error::Database(format!("snapshot {:?} is corrupt: {}", path, e)))?;
        tracing::debug!("Loaded club snapshot from {:?}", path);
        Ok(club)
    }

    /// Replace the snapshot at `path` via a locked, synced temp file
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| Error::Database(format!("snapshot path {:?} has no parent", path)))?;
        std::fs::create_dir_all(dir)?;

        let contents = serde_json::to_vec_pretty(self)?;
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.as_file().lock_exclusive()?;
        let written = temp
            .write_all(&contents)
            .and_then(|()| temp.as_file().sync_all());
        temp.as_file().unlock()?;
        written?;

        temp.persist(path).map_err(|e| Error::Io(e.error))?;
        tracing::debug!("Saved club snapshot to {:?}", path);
        Ok(())
    }
}

/// Logbook stored in a data directory
pub struct FileDatabase {
    dir: PathBuf,
    snapshot_path: PathBuf,
    journal: OutingJournal,
    inner: MemoryDatabase,
}

impl FileDatabase {
    /// Open the logbook in `dir`, which must be an existing directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(Error::Database(format!(
                "data directory {:?} does not exist",
                dir
            )));
        }

        let snapshot_path = dir.join(SNAPSHOT_FILE);
        let journal = OutingJournal::new(dir.join(JOURNAL_FILE));
        let club = ClubData::load(&snapshot_path)?;
        let outings = journal.replay_valid(|o| club.boats.contains_key(&o.boat_name))?;

        tracing::info!(
            "Opened logbook at {:?}: {} members, {} boats, {} outings",
            dir,
            club.members.len(),
            club.boats.len(),
            outings.len()
        );

        Ok(Self {
            dir,
            snapshot_path,
            journal,
            inner: MemoryDatabase::from_parts(club, outings),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read-only view of the loaded state
    pub fn memory(&self) -> &MemoryDatabase {
        &self.inner
    }

    /// Compute statistics relative to `date` instead of today
    pub fn set_reference_date(&mut self, date: Option<NaiveDate>) {
        self.inner.set_reference_date(date);
    }

    /// Rewrite the outing journal with one record per outing
    pub fn compact(&mut self) -> Result<usize> {
        self.journal.rewrite(self.inner.all_outings())
    }

    /// Apply `change` to a copy of the state, persist what changed, then keep it
    ///
    /// Outing records go to the journal before the snapshot is replaced, so
    /// a failure never leaves a snapshot on disk that memory does not hold.
    /// Journal records written ahead of a snapshot that failed are undone
    /// here, or skipped on the next open if the process died in between.
    fn commit<T, F>(&mut self, change: F) -> Result<T>
    where
        F: FnOnce(&mut MemoryDatabase) -> Result<T>,
    {
        let mut next = self.inner.clone();
        let value = change(&mut next)?;

        let changed: Vec<&OutingInfo> = next
            .all_outings()
            .filter(|o| self.inner.outing(o.id) != Some(*o))
            .collect();
        for (done, outing) in changed.iter().enumerate() {
            if let Err(e) = self.journal.append(outing) {
                self.revert(&changed[..done]);
                return Err(e);
            }
        }

        if next.club() != self.inner.club() {
            if let Err(e) = next.club().save(&self.snapshot_path) {
                self.revert(&changed);
                return Err(e);
            }
        }

        self.inner = next;
        Ok(value)
    }

    /// Journal the current version of outings whose new records were written
    fn revert(&mut self, written: &[&OutingInfo]) {
        for outing in written {
            let Some(previous) = self.inner.outing(outing.id) else {
                continue;
            };
            if let Err(e) = self.journal.append(previous) {
                tracing::error!("Could not undo journal record for outing {}: {}", outing.id, e);
            }
        }
    }
}

impl Database for FileDatabase {
    fn add_boat(&mut self, name: &str, boat_type: Option<&str>, in_house: bool) -> Result<()> {
        self.commit(|db| db.add_boat(name, boat_type, in_house))
    }

    fn get_boat(&self, name: &str) -> Result<Option<BoatInfo>> {
        self.inner.get_boat(name)
    }

    fn modify_boat(
        &mut self,
        old: &BoatInfo,
        name: &str,
        boat_type: Option<&str>,
        in_house: bool,
    ) -> Result<()> {
        self.commit(|db| db.modify_boat(old, name, boat_type, in_house))
    }

    fn get_boats(&self) -> Result<Vec<BoatInfo>> {
        self.inner.get_boats()
    }

    fn get_boat_statistic(&self, name: &str) -> Result<Option<BoatStatistic>> {
        self.inner.get_boat_statistic(name)
    }

    fn get_boats_statistics(&self) -> Result<Vec<BoatStatistic>> {
        self.inner.get_boats_statistics()
    }

    fn add_member(
        &mut self,
        surname: &str,
        forename: Option<&str>,
        date_of_birth: NaiveDate,
        group_id: GroupId,
    ) -> Result<MemberId> {
        self.commit(|db| db.add_member(surname, forename, date_of_birth, group_id))
    }

    fn get_member(&self, id: MemberId) -> Result<Option<MemberInfo>> {
        self.inner.get_member(id)
    }

    fn modify_member(
        &mut self,
        id: MemberId,
        surname: &str,
        forename: Option<&str>,
        date_of_birth: NaiveDate,
        group_id: GroupId,
    ) -> Result<()> {
        self.commit(|db| db.modify_member(id, surname, forename, date_of_birth, group_id))
    }

    fn get_members_sorted(&self, sorting: SortMode) -> Result<Vec<MemberInfo>> {
        self.inner.get_members_sorted(sorting)
    }

    fn get_member_statistics(&self, id: MemberId) -> Result<Option<MemberStatistic>> {
        self.inner.get_member_statistics(id)
    }

    fn get_members_statistics_sorted(&self, sorting: SortMode) -> Result<Vec<MemberStatistic>> {
        self.inner.get_members_statistics_sorted(sorting)
    }

    fn add_group(
        &mut self,
        name: &str,
        description: Option<&str>,
        colour: Colour,
        is_default: bool,
    ) -> Result<GroupId> {
        self.commit(|db| db.add_group(name, description, colour, is_default))
    }

    fn modify_group(
        &mut self,
        id: GroupId,
        name: &str,
        description: Option<&str>,
        colour: Colour,
        is_default: bool,
    ) -> Result<()> {
        self.commit(|db| db.modify_group(id, name, description, colour, is_default))
    }

    fn get_group(&self, id: GroupId) -> Result<Option<GroupInfo>> {
        self.inner.get_group(id)
    }

    fn get_groups(&self) -> Result<Vec<GroupInfo>> {
        self.inner.get_groups()
    }

    fn get_group_statistic(&self, id: GroupId) -> Result<Option<GroupStatistic>> {
        self.inner.get_group_statistic(id)
    }

    fn get_groups_statistics(&self) -> Result<Vec<GroupStatistic>> {
        self.inner.get_groups_statistics()
    }

    fn add_outing(&mut self, outing: OutingDraft) -> Result<OutingId> {
        self.commit(|db| db.add_outing(outing))
    }

    fn get_outings(&self, date: NaiveDate) -> Result<Vec<OutingInfo>> {
        self.inner.get_outings(date)
    }

    fn modify_outing(&mut self, id: OutingId, outing: OutingDraft) -> Result<()> {
        self.commit(|db| db.modify_outing(id, outing))
    }

    fn add_admin(
        &mut self,
        username: &str,
        password: &str,
        name: &str,
        is_root: bool,
        comment: Option<&str>,
    ) -> Result<()> {
        self.commit(|db| db.add_admin(username, password, name, is_root, comment))
    }

    fn get_admin(&self, username: &str) -> Result<Option<AdminInfo>> {
        self.inner.get_admin(username)
    }

    fn get_admins(&self) -> Result<Vec<AdminInfo>> {
        self.inner.get_admins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::read_outings;
    use chrono::NaiveTime;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn draft(day: NaiveDate, rower: MemberId, boat: &str) -> OutingDraft {
        OutingDraft {
            date: day,
            rowers: vec![rower],
            cox: None,
            time_out: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            time_in: None,
            comment: None,
            destination: None,
            boat_name: boat.into(),
            distance: 0,
        }
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = FileDatabase::open(temp_dir.path().join("missing"));
        assert!(matches!(result, Err(Error::Database(_))));
    }

    #[test]
    fn test_data_survives_reopen() {
        crate::logging::init_test();
        let temp_dir = tempfile::tempdir().unwrap();
        let (member, outing) = {
            let mut db = FileDatabase::open(temp_dir.path()).unwrap();
            let senior = db.add_group("Senior", None, Colour::rgb(255, 0, 0), true).unwrap();
            db.add_boat("Nixe", Some("4x"), true).unwrap();
            db.add_admin("root", "secret", "Captain", true, None).unwrap();
            let member = db.add_member("Smith", Some("Jo"), date(1990, 1, 1), senior).unwrap();
            let outing = db.add_outing(draft(date(2024, 6, 1), member, "Nixe")).unwrap();
            (member, outing)
        };

        let db = FileDatabase::open(temp_dir.path()).unwrap();
        assert_eq!(db.get_member(member).unwrap().unwrap().name(), "Smith,Jo");
        assert_eq!(db.get_default_group().unwrap().unwrap().name, "Senior");
        assert!(db.get_boat("Nixe").unwrap().is_some());
        assert!(db.get_admin("root").unwrap().is_some());
        let outings = db.get_outings(date(2024, 6, 1)).unwrap();
        assert_eq!(outings.len(), 1);
        assert_eq!(outings[0].id, outing);
    }

    #[test]
    fn test_failed_validation_writes_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut db = FileDatabase::open(temp_dir.path()).unwrap();

        assert!(db.add_boat("", None, true).is_err());
        assert!(!temp_dir.path().join(SNAPSHOT_FILE).exists());
        assert!(db.add_outing(draft(date(2024, 6, 1), 1, "Nixe")).is_err());
        assert!(!temp_dir.path().join(JOURNAL_FILE).exists());
    }

    #[test]
    fn test_modify_outing_and_boat_rename_are_journaled() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut db = FileDatabase::open(temp_dir.path()).unwrap();
        let group = db.add_group("Senior", None, Colour::rgb(0, 0, 0), true).unwrap();
        db.add_boat("Nixe", None, true).unwrap();
        let member = db.add_member("Smith", None, date(1990, 1, 1), group).unwrap();
        let id = db.add_outing(draft(date(2024, 6, 1), member, "Nixe")).unwrap();

        let mut finished = draft(date(2024, 6, 1), member, "Nixe");
        finished.time_in = NaiveTime::from_hms_opt(11, 0, 0);
        finished.distance = 9;
        db.modify_outing(id, finished).unwrap();

        let boat = db.get_boat("Nixe").unwrap().unwrap();
        db.modify_boat(&boat, "Neptun", None, true).unwrap();

        let journal_path = temp_dir.path().join(JOURNAL_FILE);
        assert_eq!(read_outings(&journal_path).unwrap().len(), 3);

        let reopened = FileDatabase::open(temp_dir.path()).unwrap();
        let outing = &reopened.get_outings(date(2024, 6, 1)).unwrap()[0];
        assert_eq!(outing.distance, 9);
        assert_eq!(outing.boat_name, "Neptun");

        let mut reopened = reopened;
        assert_eq!(reopened.compact().unwrap(), 1);
        assert_eq!(read_outings(&journal_path).unwrap().len(), 1);
    }

    /// Data dir with boat Nixe and one outing on it
    fn rename_fixture(dir: &Path) -> (FileDatabase, OutingId) {
        let mut db = FileDatabase::open(dir).unwrap();
        let group = db.add_group("Senior", None, Colour::rgb(0, 0, 0), true).unwrap();
        db.add_boat("Nixe", None, true).unwrap();
        let member = db.add_member("Smith", None, date(1990, 1, 1), group).unwrap();
        let id = db.add_outing(draft(date(2024, 6, 1), member, "Nixe")).unwrap();
        (db, id)
    }

    #[test]
    fn test_rename_with_unwritable_journal_changes_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (mut db, id) = rename_fixture(temp_dir.path());
        let journal_path = temp_dir.path().join(JOURNAL_FILE);
        let journal = std::fs::read(&journal_path).unwrap();
        std::fs::remove_file(&journal_path).unwrap();
        std::fs::create_dir(&journal_path).unwrap();

        let boat = db.get_boat("Nixe").unwrap().unwrap();
        assert!(db.modify_boat(&boat, "Neptun", None, true).is_err());
        assert!(db.get_boat("Nixe").unwrap().is_some());
        assert_eq!(db.memory().outing(id).unwrap().boat_name, "Nixe");

        std::fs::remove_dir(&journal_path).unwrap();
        std::fs::write(&journal_path, journal).unwrap();

        let reopened = FileDatabase::open(temp_dir.path()).unwrap();
        assert!(reopened.get_boat("Nixe").unwrap().is_some());
        assert!(reopened.get_boat("Neptun").unwrap().is_none());
        assert_eq!(reopened.memory().outing(id).unwrap().boat_name, "Nixe");
    }

    #[test]
    fn test_rename_with_unwritable_snapshot_is_undone() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (mut db, id) = rename_fixture(temp_dir.path());
        let snapshot_path = temp_dir.path().join(SNAPSHOT_FILE);
        let snapshot = std::fs::read(&snapshot_path).unwrap();
        std::fs::remove_file(&snapshot_path).unwrap();
        std::fs::create_dir(&snapshot_path).unwrap();

        let boat = db.get_boat("Nixe").unwrap().unwrap();
        assert!(db.modify_boat(&boat, "Neptun", None, true).is_err());
        assert_eq!(db.memory().outing(id).unwrap().boat_name, "Nixe");

        std::fs::remove_dir(&snapshot_path).unwrap();
        std::fs::write(&snapshot_path, snapshot).unwrap();

        // Adding a boat under the abandoned name must not pull the outing over
        db.add_boat("Neptun", None, true).unwrap();
        let reopened = FileDatabase::open(temp_dir.path()).unwrap();
        assert_eq!(reopened.memory().outing(id).unwrap().boat_name, "Nixe");
    }

    #[test]
    fn test_crash_before_snapshot_keeps_old_boat() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (db, id) = rename_fixture(temp_dir.path());

        // Journal record of a rename whose snapshot was never written
        let mut renamed = db.memory().outing(id).unwrap().clone();
        renamed.boat_name = "Neptun".into();
        OutingJournal::new(temp_dir.path().join(JOURNAL_FILE))
            .append(&renamed)
            .unwrap();

        let reopened = FileDatabase::open(temp_dir.path()).unwrap();
        assert_eq!(reopened.memory().outing(id).unwrap().boat_name, "Nixe");
        assert_eq!(reopened.get_outings(date(2024, 6, 1)).unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_journal_line_is_fatal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (mut db, _) = rename_fixture(temp_dir.path());
        let member = db.get_members().unwrap()[0].id;
        for day in [2, 3] {
            db.add_outing(draft(date(2024, 6, day), member, "Nixe")).unwrap();
        }

        let journal_path = temp_dir.path().join(JOURNAL_FILE);
        let contents = std::fs::read_to_string(&journal_path).unwrap();
        let mut lines: Vec<&str> = contents.lines().collect();
        lines[1] = "{garbage";
        std::fs::write(&journal_path, lines.join("\n") + "\n").unwrap();

        match FileDatabase::open(temp_dir.path()) {
            Err(e) => assert!(e.is_fatal()),
            Ok(_) => panic!("corrupt journal should not open"),
        }
    }

    #[test]
    fn test_statistics_use_reference_date() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut db = FileDatabase::open(temp_dir.path()).unwrap();
        let group = db.add_group("Senior", None, Colour::rgb(0, 0, 0), true).unwrap();
        db.add_boat("Nixe", None, true).unwrap();
        let member = db.add_member("Smith", None, date(1990, 1, 1), group).unwrap();
        db.add_outing(draft(date(2023, 6, 1), member, "Nixe")).unwrap();

        db.set_reference_date(Some(date(2023, 12, 31)));
        let stat = db.get_member_statistics(member).unwrap().unwrap().statistic;
        assert_eq!((stat.this_year_outings, stat.last_year_outings), (1, 0));

        db.set_reference_date(Some(date(2024, 1, 1)));
        let stat = db.get_boat_statistic("Nixe").unwrap().unwrap().statistic;
        assert_eq!((stat.this_year_outings, stat.last_year_outings), (0, 1));
        assert_eq!(db.memory().outings_in_year(2023).len(), 1);
    }

    #[test]
    fn test_corrupt_snapshot_is_fatal() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join(SNAPSHOT_FILE), "{ invalid json }").unwrap();

        match FileDatabase::open(temp_dir.path()) {
            Err(e) => {
                assert!(matches!(e, Error::Database(_)));
                assert!(e.is_fatal());
            }
            Ok(_) => panic!("corrupt snapshot should not open"),
        }
    }

    #[test]
    fn test_atomic_save() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut db = FileDatabase::open(temp_dir.path()).unwrap();
        db.add_boat("Nixe", None, true).unwrap();

        let extras: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != SNAPSHOT_FILE)
            .collect();
        assert!(
            extras.is_empty(),
            "Expected only {}, found extras: {:?}",
            SNAPSHOT_FILE,
            extras
        );
    }
}
