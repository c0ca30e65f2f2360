//! File-based job store — lightweight persistence.
//! Jobs are saved as a JSON array, human-readable and hand-editable.
//! Every mutation rewrites the file atomically (temp sibling, then rename).
//!
//! Single writer per file: two stores on the same path only see each
//! other's writes after an explicit [`JobStore::load`].

use std::io::Write;
use std::path::{Path, PathBuf};

use vigil_core::Result;

use crate::job::{Job, JobKind};

/// Durable collection of jobs keyed by id, in insertion order.
pub struct JobStore {
    path: PathBuf,
    jobs: Vec<Job>,
}

impl JobStore {
    /// Open the store at `path`, loading whatever is on disk.
    pub fn open(path: &Path) -> Self {
        let mut store = Self {
            path: path.to_path_buf(),
            jobs: Vec::new(),
        };
        store.load();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload from disk. A missing or undecodable file yields an empty store.
    pub fn load(&mut self) {
        self.jobs.clear();
        if !self.path.exists() {
            return;
        }
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("⚠️ Failed to read {}: {e}", self.path.display());
                return;
            }
        };
        match serde_json::from_str::<Vec<Job>>(&json) {
            Ok(jobs) => {
                for job in jobs {
                    self.upsert(job);
                }
                tracing::debug!("Loaded {} jobs from {}", self.jobs.len(), self.path.display());
            }
            Err(e) => {
                tracing::warn!(
                    "⚠️ Failed to parse {}, starting empty: {e}",
                    self.path.display()
                );
            }
        }
    }

    /// Persist all jobs. Writes a temp sibling and renames it over the target.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = temp_sibling(&self.path);
        let json = serde_json::to_vec_pretty(&self.jobs)?;
        let written = std::fs::File::create(&tmp_path).and_then(|mut file| {
            file.write_all(&json)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|_| std::fs::rename(&tmp_path, &self.path)) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        tracing::debug!("💾 Saved {} jobs to {}", self.jobs.len(), self.path.display());
        Ok(())
    }

    /// Add a job and persist. An existing job with the same id is replaced.
    pub fn add(&mut self, job: Job) -> Result<()> {
        self.update(job)
    }

    /// Replace (or insert) a job and persist.
    ///
    /// If the write fails the in-memory collection is rolled back.
    pub fn update(&mut self, job: Job) -> Result<()> {
        let id = job.id.clone();
        let previous = self.upsert(job);
        if let Err(e) = self.save() {
            match previous {
                Some(old) => {
                    self.upsert(old);
                }
                None => self.jobs.retain(|j| j.id != id),
            }
            return Err(e);
        }
        Ok(())
    }

    /// Remove a job by id and persist. Returns whether it existed.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        let Some(index) = self.jobs.iter().position(|j| j.id == id) else {
            return Ok(false);
        };
        let removed = self.jobs.remove(index);
        if let Err(e) = self.save() {
            self.jobs.insert(index, removed);
            return Err(e);
        }
        Ok(true)
    }

    pub fn get(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn all(&self) -> &[Job] {
        &self.jobs
    }

    pub fn find_by_kind(&self, kind: JobKind) -> Vec<&Job> {
        self.jobs.iter().filter(|j| j.kind == kind).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn upsert(&mut self, job: Job) -> Option<Job> {
        match self.jobs.iter_mut().find(|j| j.id == job.id) {
            Some(slot) => Some(std::mem::replace(slot, job)),
            None => {
                self.jobs.push(job);
                None
            }
        }
    }
}

/// `<file name>.tmp` next to `path`, never equal to `path` itself.
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn store_in(dir: &tempfile::TempDir) -> JobStore {
        JobStore::open(&dir.path().join("cron_jobs.json"))
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_add_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        let job = Job::new("Ping", "*/5 * * * *", "ping");
        let id = job.id.clone();

        store.add(job).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&id).unwrap().name, "Ping");

        assert!(store.remove(&id).unwrap());
        assert!(!store.remove(&id).unwrap());
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn test_update_replaces_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        let first = Job::new("first", "0 * * * *", "a");
        let second = Job::new("second", "0 * * * *", "b");
        store.add(first.clone()).unwrap();
        store.add(second.clone()).unwrap();

        let mut edited = first.clone();
        edited.name = "renamed".into();
        store.update(edited).unwrap();

        let names: Vec<_> = store.all().iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["renamed", "second"]);
    }

    #[test]
    fn test_round_trip_through_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        let mut job = Job::new("Digest", "0 18 * * 1-5", "send the digest")
            .with_timezone("Europe/London")
            .with_kind(JobKind::System);
        job.last_run = Some(Utc::now());
        job.next_run = Some(Utc::now() + chrono::Duration::hours(3));
        job.last_result = Some("Done".into());
        job.run_count = 7;
        store.add(job.clone()).unwrap();

        let reloaded = store_in(&dir);
        assert_eq!(reloaded.all(), &[job][..]);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.add(Job::new("a", "* * * * *", "x")).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec!["cron_jobs.json".to_string()]);
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cron_jobs.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JobStore::open(&path);
        assert!(store.all().is_empty());
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("jobs.json");
        let mut store = JobStore::open(&path);
        store.add(Job::new("a", "* * * * *", "x")).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_instances_see_writes_after_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = store_in(&dir);
        let mut reader = store_in(&dir);

        writer.add(Job::new("a", "* * * * *", "x")).unwrap();
        assert!(reader.is_empty());
        reader.load();
        assert_eq!(reader.len(), 1);
    }

    #[test]
    fn test_find_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.add(Job::new("u", "* * * * *", "x")).unwrap();
        store
            .add(Job::new("h", "* * * * *", "y").with_kind(JobKind::Heartbeat))
            .unwrap();

        let heartbeats = store.find_by_kind(JobKind::Heartbeat);
        assert_eq!(heartbeats.len(), 1);
        assert_eq!(heartbeats[0].name, "h");
        assert_eq!(store.find_by_kind(JobKind::System).len(), 0);
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        // The target path is a directory, so the final rename fails.
        let path = dir.path().join("occupied");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        let mut store = JobStore::open(&path);
        assert!(store.add(Job::new("a", "* * * * *", "x")).is_err());
        assert!(store.is_empty());
        assert!(!dir.path().join("occupied.tmp").exists());
    }

    #[test]
    fn test_tmp_named_store_is_written_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.tmp");
        let mut store = JobStore::open(&path);
        store.add(Job::new("a", "* * * * *", "x")).unwrap();
        store.add(Job::new("b", "* * * * *", "y")).unwrap();

        assert_eq!(JobStore::open(&path).len(), 2);
        assert!(!dir.path().join("jobs.tmp.tmp").exists());
        assert_eq!(temp_sibling(&path), dir.path().join("jobs.tmp.tmp"));
    }
}
