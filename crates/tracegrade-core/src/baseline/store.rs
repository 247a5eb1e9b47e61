//! On-disk golden runs: one JSON file per test id.
//!
//! Reads take no lock. Writes hold an exclusive lock on `.tracegrade.lock` in the store directory
//! and land through a temp file plus rename, so readers never observe a partial file.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::BaselineEntry;

pub const BASELINE_FORMAT_VERSION: u32 = 1;

const LOCK_FILE: &str = ".tracegrade.lock";
const SLUG_MAX: usize = 48;

#[derive(Debug, thiserror::Error)]
pub enum BaselineError {
    #[error("baseline io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("baseline file {} is invalid: {message}", path.display())]
    Invalid { path: PathBuf, message: String },

    #[error("baseline file {} has format version {found}, expected {expected}", path.display())]
    Version {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("baseline was captured for '{found}', not '{expected}'")]
    Mismatch { expected: String, found: String },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> BaselineError + '_ {
    move |source| BaselineError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct BaselineStore {
    dir: PathBuf,
}

impl BaselineStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, BaselineError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<slug>-<first 12 hex chars of sha256(test_id)>.json`
    pub fn path_for(&self, test_id: &str) -> PathBuf {
        self.dir.join(file_name(test_id))
    }

    pub fn load(&self, test_id: &str) -> Result<Option<BaselineEntry>, BaselineError> {
        let path = self.path_for(test_id);
        if !path.exists() {
            return Ok(None);
        }
        let entry = read_entry(&path)?;
        if entry.test_id != test_id {
            return Err(BaselineError::Mismatch {
                expected: test_id.to_string(),
                found: entry.test_id,
            });
        }
        Ok(Some(entry))
    }

    pub fn save(&self, entry: &BaselineEntry) -> Result<PathBuf, BaselineError> {
        let path = self.path_for(&entry.test_id);
        let content = serde_json::to_string_pretty(entry).map_err(|e| BaselineError::Invalid {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let lock_path = self.dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(io_err(&lock_path))?;
        FileExt::lock_exclusive(&lock).map_err(io_err(&lock_path))?;

        let temp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        fs::write(&temp_path, content).map_err(io_err(&temp_path))?;
        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(io_err(&path)(e));
        }

        debug!(test_id = %entry.test_id, path = %path.display(), "baseline saved");
        drop(lock);
        Ok(path)
    }

    /// Every readable baseline, sorted by test id. Unreadable files are skipped with a warning.
    pub fn list(&self) -> Result<Vec<BaselineEntry>, BaselineError> {
        let mut entries = Vec::new();
        for dirent in fs::read_dir(&self.dir).map_err(io_err(&self.dir))? {
            let dirent = dirent.map_err(io_err(&self.dir))?;
            let path = dirent.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_entry(&path) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable baseline"),
            }
        }
        entries.sort_by(|a, b| a.test_id.cmp(&b.test_id));
        Ok(entries)
    }
}

fn read_entry(path: &Path) -> Result<BaselineEntry, BaselineError> {
    let content = fs::read_to_string(path).map_err(io_err(path))?;
    let raw: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| BaselineError::Invalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    let found = raw
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0);
    if found != BASELINE_FORMAT_VERSION {
        return Err(BaselineError::Version {
            path: path.to_path_buf(),
            found,
            expected: BASELINE_FORMAT_VERSION,
        });
    }
    serde_json::from_value(raw).map_err(|e| BaselineError::Invalid {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn file_name(test_id: &str) -> String {
    let mut slug = String::with_capacity(test_id.len());
    for c in test_id.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug: String = slug.trim_matches('-').chars().take(SLUG_MAX).collect();
    let slug = if slug.is_empty() { "case".to_string() } else { slug };

    let digest = hex::encode(Sha256::digest(test_id.as_bytes()));
    format!("{}-{}.json", slug, &digest[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExecutionTrace, Terminal, Usage, Verdict};
    use std::sync::Arc;

    fn entry(test_id: &str, output: &str) -> BaselineEntry {
        let trace = ExecutionTrace {
            output: output.into(),
            steps: vec![],
            usage: Usage::new(10, 5, 0),
            cost: 0.001,
            latency_ms: 120,
            terminal: Terminal::Ok,
            violations: vec![],
            diagnostic: None,
        };
        let verdict = Verdict {
            deterministic_score: 100.0,
            judge_score: None,
            final_score: 100.0,
            passed: true,
            failure_reasons: vec![],
            checks: vec![],
            warnings: vec![],
            judge_rationale: None,
        };
        BaselineEntry::new(test_id, trace, verdict)
    }

    #[test]
    fn file_names_are_stable_and_distinct() {
        let a = file_name("Weather / Paris");
        assert!(a.starts_with("weather-paris-"), "{}", a);
        assert!(a.ends_with(".json"));
        assert_eq!(a, file_name("Weather / Paris"));
        assert_ne!(a, file_name("weather paris"));
        assert!(file_name("???").starts_with("case-"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = BaselineStore::open(dir.path()).unwrap();
        assert!(store.load("weather").unwrap().is_none());

        let path = store.save(&entry("weather", "sunny")).unwrap();
        assert_eq!(path, store.path_for("weather"));
        let back = store.load("weather").unwrap().unwrap();
        assert_eq!(back.test_id, "weather");
        assert_eq!(back.trace.output, "sunny");
    }

    #[test]
    fn concurrent_saves_leave_a_parseable_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(BaselineStore::open(dir.path()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for j in 0..5 {
                        store.save(&entry("shared", &format!("run {i}.{j}"))).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let back = store.load("shared").unwrap().unwrap();
        assert!(back.trace.output.starts_with("run "));
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|d| d.path().extension().is_some_and(|e| e == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn unknown_format_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = BaselineStore::open(dir.path()).unwrap();
        let mut raw = serde_json::to_value(entry("weather", "sunny")).unwrap();
        raw["version"] = serde_json::json!(99);
        fs::write(store.path_for("weather"), raw.to_string()).unwrap();

        let err = store.load("weather").unwrap_err();
        assert!(
            matches!(err, BaselineError::Version { found: 99, expected: BASELINE_FORMAT_VERSION, .. }),
            "{err}"
        );
    }

    #[test]
    fn entry_for_another_case_is_a_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = BaselineStore::open(dir.path()).unwrap();
        let foreign = serde_json::to_string(&entry("someone-else", "x")).unwrap();
        fs::write(store.path_for("weather"), foreign).unwrap();

        match store.load("weather").unwrap_err() {
            BaselineError::Mismatch { expected, found } => {
                assert_eq!(expected, "weather");
                assert_eq!(found, "someone-else");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn list_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = BaselineStore::open(dir.path()).unwrap();
        store.save(&entry("b-case", "two")).unwrap();
        store.save(&entry("a-case", "one")).unwrap();
        fs::write(dir.path().join("garbage.json"), "{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let ids: Vec<String> = store.list().unwrap().into_iter().map(|e| e.test_id).collect();
        assert_eq!(ids, vec!["a-case", "b-case"]);
    }
}
