//! Versioned snapshot persistence with a "latest" pointer.
//!
//! Layout per user namespace:
//!
//! ```text
//! <root>/<user>/latest.json
//! <root>/<user>/history/<snapshot-id>.json
//! ```
//!
//! Every file is written to a temp file in the same directory and renamed
//! into place, so a crash never leaves a partial `latest.json`.

use chrono::{Local, NaiveDateTime, SubsecRound};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{LedgerError, LedgerResult, PersistenceError};
use crate::types::PortfolioState;

const TS_FORMAT: &str = "%Y-%m-%d_%H%M%S";
const LATEST_FILE: &str = "latest.json";
const HISTORY_DIR: &str = "history";

/// Wall-clock stamp plus a per-namespace sequence number.
/// Ordering is by sequence only, so rapid writes never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotId {
    pub seq: u64,
    pub taken_at: NaiveDateTime,
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:06}", self.taken_at.format(TS_FORMAT), self.seq)
    }
}

impl FromStr for SnapshotId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || LedgerError::VersionNotFound(s.to_string());
        let (ts, seq) = s.trim().rsplit_once('-').ok_or_else(bad)?;
        Ok(Self {
            seq: seq.parse().map_err(|_| bad())?,
            taken_at: NaiveDateTime::parse_from_str(ts, TS_FORMAT).map_err(|_| bad())?,
        })
    }
}

pub trait VersionedStore {
    /// Append a snapshot and point "latest" at the same content.
    fn persist(&mut self, state: &PortfolioState) -> LedgerResult<SnapshotId>;

    /// Most recently persisted state, or the store's fresh default.
    fn latest(&self) -> LedgerResult<PortfolioState>;

    fn get(&self, id: &SnapshotId) -> LedgerResult<PortfolioState>;

    /// Most recent `limit` ids, newest first.
    fn list(&self, limit: usize) -> LedgerResult<Vec<SnapshotId>>;

    /// Make snapshot `id` current again. The restore is itself a new
    /// trailing snapshot, so it can be undone like any other change.
    fn restore(&mut self, id: &SnapshotId) -> LedgerResult<(SnapshotId, PortfolioState)> {
        let state = self.get(id)?;
        let new_id = self.persist(&state)?;
        info!(from = %id, snapshot = %new_id, "Restored snapshot");
        Ok((new_id, state))
    }
}

/// Directory-backed store for one user namespace.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    fresh: PortfolioState,
    next_seq: u64,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> LedgerError + '_ {
    move |source| {
        PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }
        .into()
    }
}

fn json_err(path: &Path) -> impl FnOnce(serde_json::Error) -> LedgerError + '_ {
    move |source| {
        PersistenceError::Json {
            path: path.to_path_buf(),
            source,
        }
        .into()
    }
}

fn write_atomic(path: &Path, state: &PortfolioState) -> LedgerResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let body = serde_json::to_vec_pretty(state).map_err(json_err(path))?;
    let mut tmp = NamedTempFile::new_in(parent).map_err(io_err(path))?;
    tmp.write_all(&body).map_err(io_err(path))?;
    tmp.as_file().sync_all().map_err(io_err(path))?;
    tmp.persist(path).map_err(|e| io_err(path)(e.error))?;
    Ok(())
}

fn read_state(path: &Path) -> LedgerResult<PortfolioState> {
    let s = fs::read_to_string(path).map_err(io_err(path))?;
    serde_json::from_str(&s).map_err(json_err(path))
}

impl FileStore {
    /// Open (creating if needed) `<root>/<user>`. `fresh` is what `latest`
    /// returns before anything was ever persisted.
    pub fn open(root: &Path, user: &str, fresh: PortfolioState) -> LedgerResult<Self> {
        let dir = root.join(user);
        let hist = dir.join(HISTORY_DIR);
        fs::create_dir_all(&hist).map_err(io_err(&hist))?;
        let mut me = Self {
            dir,
            fresh,
            next_seq: 1,
        };
        me.next_seq = me.scan()?.iter().map(|id| id.seq).max().unwrap_or(0) + 1;
        debug!(dir = %me.dir.display(), next_seq = me.next_seq, "Opened snapshot store");
        Ok(me)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn has_snapshots(&self) -> bool {
        self.next_seq > 1
    }

    fn snapshot_path(&self, id: &SnapshotId) -> PathBuf {
        self.dir.join(HISTORY_DIR).join(format!("{id}.json"))
    }

    fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_FILE)
    }

    /// All snapshot ids on disk, unordered. Foreign files are ignored.
    fn scan(&self) -> LedgerResult<Vec<SnapshotId>> {
        let hist = self.dir.join(HISTORY_DIR);
        let mut out = Vec::new();
        for entry in fs::read_dir(&hist).map_err(io_err(&hist))? {
            let entry = entry.map_err(io_err(&hist))?;
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if let Ok(id) = stem.parse::<SnapshotId>() {
                out.push(id);
            }
        }
        Ok(out)
    }
}

impl VersionedStore for FileStore {
    fn persist(&mut self, state: &PortfolioState) -> LedgerResult<SnapshotId> {
        let id = SnapshotId {
            seq: self.next_seq,
            // Whole seconds, so an id equals its own parsed file name.
            taken_at: Local::now().naive_local().trunc_subsecs(0),
        };
        let snapshot = self.snapshot_path(&id);
        write_atomic(&snapshot, state)?;
        if let Err(e) = write_atomic(&self.latest_path(), state) {
            // A snapshot that "latest" never pointed at must not be listed.
            if let Err(rm) = fs::remove_file(&snapshot) {
                warn!(snapshot = %id, error = %rm, "Could not drop orphaned snapshot");
                self.next_seq += 1;
            }
            return Err(e);
        }
        self.next_seq += 1;
        debug!(snapshot = %id, "Persisted snapshot");
        Ok(id)
    }

    fn latest(&self) -> LedgerResult<PortfolioState> {
        let path = self.latest_path();
        if !path.exists() {
            info!(path = %path.display(), "No saved portfolio, starting fresh");
            return Ok(self.fresh.clone());
        }
        read_state(&path)
    }

    fn get(&self, id: &SnapshotId) -> LedgerResult<PortfolioState> {
        let path = self.snapshot_path(id);
        if !path.exists() {
            return Err(LedgerError::VersionNotFound(id.to_string()));
        }
        read_state(&path)
    }

    fn list(&self, limit: usize) -> LedgerResult<Vec<SnapshotId>> {
        let mut ids = self.scan()?;
        ids.sort_by(|a, b| b.seq.cmp(&a.seq));
        ids.truncate(limit);
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(tmp: &TempDir, user: &str) -> FileStore {
        FileStore::open(tmp.path(), user, PortfolioState::seeded([("SOXL", 1.0)])).unwrap()
    }

    #[test]
    fn latest_falls_back_to_fresh_state() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, "alice");
        assert!(!store.has_snapshots());
        assert_eq!(store.latest().unwrap().tickers(), vec!["SOXL"]);
        assert!(store.list(10).unwrap().is_empty());
    }

    #[test]
    fn persist_updates_latest_and_appends() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp, "alice");
        let mut st = store.latest().unwrap();
        let v1 = store.persist(&st).unwrap();
        st.add_purchase("SOXL", 3.0, 20.0).unwrap();
        let v2 = store.persist(&st).unwrap();

        assert!(v2.seq > v1.seq);
        assert_ne!(v1.to_string(), v2.to_string());
        assert_eq!(store.latest().unwrap(), st);
        assert_eq!(store.list(10).unwrap(), vec![v2.clone(), v1.clone()]);
        assert_eq!(store.list(1).unwrap(), vec![v2]);
        assert_eq!(store.get(&v1).unwrap().position("SOXL").unwrap().shares, 0.0);
    }

    #[test]
    fn rapid_writes_get_distinct_ids() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp, "bob");
        let st = store.latest().unwrap();
        let ids: Vec<_> = (0..25).map(|_| store.persist(&st).unwrap()).collect();
        let listed = store.list(100).unwrap();
        assert_eq!(listed.len(), 25);
        assert_eq!(listed.first(), ids.last());
    }

    #[test]
    fn restore_round_trips_and_is_undoable() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp, "carol");
        let mut st = store.latest().unwrap();
        st.add_purchase("SOXL", 10.0, 25.0).unwrap();
        let v = store.persist(&st).unwrap();
        let captured = st.clone();
        st.sell("SOXL", 4.0).unwrap();
        let after = store.persist(&st).unwrap();

        let (trailing, restored) = store.restore(&v).unwrap();
        assert_eq!(restored, captured);
        assert_eq!(store.latest().unwrap(), captured);
        assert!(trailing.seq > after.seq);
        assert_eq!(store.list(1).unwrap(), vec![trailing]);

        // Undo the restore.
        let (_, undone) = store.restore(&after).unwrap();
        assert_eq!(undone.position("SOXL").unwrap().shares, 6.0);
    }

    #[test]
    fn restore_unknown_version_fails() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp, "dave");
        let st = store.latest().unwrap();
        let v = store.persist(&st).unwrap();
        let ghost = SnapshotId { seq: v.seq + 40, taken_at: v.taken_at };
        assert!(matches!(store.restore(&ghost), Err(LedgerError::VersionNotFound(_))));
        assert!(matches!("garbage".parse::<SnapshotId>(), Err(LedgerError::VersionNotFound(_))));
        assert_eq!(store.list(10).unwrap().len(), 1);
    }

    #[test]
    fn sequence_survives_reopen_and_namespaces_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let mut a = open(&tmp, "erin");
        let st = a.latest().unwrap();
        a.persist(&st).unwrap();
        let last = a.persist(&st).unwrap();
        drop(a);

        let mut a = open(&tmp, "erin");
        assert!(a.has_snapshots());
        assert!(a.persist(&st).unwrap().seq > last.seq);

        let b = open(&tmp, "frank");
        assert!(b.list(10).unwrap().is_empty());
    }

    #[test]
    fn id_text_round_trips() {
        let id: SnapshotId = "2025-01-09_142501-000017".parse().unwrap();
        assert_eq!(id.seq, 17);
        assert_eq!(id.to_string(), "2025-01-09_142501-000017");
    }

    #[test]
    fn corrupt_latest_is_a_persistence_error() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, "gina");
        fs::write(store.dir().join(LATEST_FILE), "{not json").unwrap();
        assert!(matches!(
            store.latest(),
            Err(LedgerError::Persistence(PersistenceError::Json { .. }))
        ));
    }

    #[test]
    fn failed_latest_write_leaves_no_snapshot_behind() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp, "hank");
        let base = store.latest().unwrap();
        let v1 = store.persist(&base).unwrap();

        // A non-empty directory where latest.json lives makes the rename fail.
        let latest = store.dir().join(LATEST_FILE);
        fs::remove_file(&latest).unwrap();
        fs::create_dir(&latest).unwrap();
        fs::write(latest.join("keep"), "x").unwrap();

        let mut next = base.clone();
        next.add_purchase("SOXL", 99.0, 10.0).unwrap();
        assert!(matches!(
            store.persist(&next),
            Err(LedgerError::Persistence(PersistenceError::Io { .. }))
        ));
        assert_eq!(store.list(10).unwrap(), vec![v1.clone()]);

        // Once latest.json is writable again the sequence carries on.
        fs::remove_dir_all(&latest).unwrap();
        let v2 = store.persist(&next).unwrap();
        assert_eq!(v2.seq, v1.seq + 1);
        assert_eq!(store.latest().unwrap(), next);
    }
}
