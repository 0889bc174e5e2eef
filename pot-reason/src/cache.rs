use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use pot_verify::VerificationResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{Span, debug, warn};

use crate::error::CacheError;
use crate::generator::GenerationResult;

/// A verified answer, stored once per key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub question_id: String,
    /// The accepted program, in document form.
    pub program: Value,
    pub generation: GenerationResult,
    pub result: VerificationResult,
    pub attempts: usize,
}

/// Write-once store of verified answers, in memory and optionally mirrored
/// to one JSON file per key.
pub struct ProgramCache {
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
    dir: Option<PathBuf>,
    span: Span,
}

impl ProgramCache {
    pub fn in_memory() -> Self {
        ProgramCache {
            entries: RwLock::new(HashMap::new()),
            dir: None,
            span: Span::none(),
        }
    }

    /// Cache backed by `dir`, created if missing.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(ProgramCache {
            entries: RwLock::new(HashMap::new()),
            dir: Some(dir),
            span: Span::none(),
        })
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Stable key for a question under one backend configuration.
    pub fn key(question_id: &str, backend: &str) -> String {
        let mut h = Sha256::new();
        h.update(question_id.as_bytes());
        h.update([0u8]);
        h.update(backend.as_bytes());
        hex::encode(h.finalize())
    }

    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        if let Some(hit) = self.entries.read().unwrap_or_else(PoisonError::into_inner).get(key) {
            return Some(Arc::clone(hit));
        }

        let entry = Arc::new(self.load(key)?);
        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Some(Arc::clone(map.entry(key.to_string()).or_insert(entry)))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store `entry` unless its key is already present. Returns whether it was written.
    ///
    /// The file is written to a temporary sibling and moved into place without
    /// clobbering, so readers never observe a partial record and the first
    /// writer of a key wins. The map lock is only taken to publish the entry.
    pub fn put(&self, entry: CacheEntry) -> Result<bool, CacheError> {
        if self.entries.read().unwrap_or_else(PoisonError::into_inner).contains_key(&entry.key) {
            debug!(parent: &self.span, key = %entry.key, "cache entry already present");
            return Ok(false);
        }

        if let Some(dir) = &self.dir {
            if !self.persist(dir, &entry)? {
                if let Some(existing) = self.load(&entry.key) {
                    self.publish(existing);
                }
                return Ok(false);
            }
        }

        let (key, question) = (entry.key.clone(), entry.question_id.clone());
        let written = self.publish(entry);
        if written {
            debug!(parent: &self.span, key = %key, question = %question, "cached verified answer");
        }
        Ok(written)
    }

    /// Write the entry's file unless one is already there.
    fn persist(&self, dir: &Path, entry: &CacheEntry) -> Result<bool, CacheError> {
        let path = entry_path(dir, &entry.key);
        if path.exists() {
            return Ok(false);
        }

        let io_err = |source: io::Error| CacheError::Io {
            path: path.clone(),
            source,
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        serde_json::to_writer_pretty(&mut tmp, entry)?;
        tmp.flush().map_err(io_err)?;
        match tmp.persist_noclobber(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(io_err(e.error)),
        }
    }

    /// Insert unless another writer got there first.
    fn publish(&self, entry: CacheEntry) -> bool {
        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(&entry.key) {
            return false;
        }
        map.insert(entry.key.clone(), Arc::new(entry));
        true
    }

    fn load(&self, key: &str) -> Option<CacheEntry> {
        let path = entry_path(self.dir.as_ref()?, key);
        let text = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(parent: &self.span, path = %path.display(), error = %e, "ignoring unreadable cache file");
                None
            }
        }
    }
}

fn entry_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pot_verify::Verdict;
    use serde_json::json;

    fn entry(key: &str, answer: Verdict) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            question_id: "q1".to_string(),
            program: json!({"knowledge_base": ["p"]}),
            generation: GenerationResult {
                program: Some(json!({"knowledge_base": ["p"]})),
                raw_response: "{}".to_string(),
                success: true,
                error: None,
            },
            result: VerificationResult {
                answer,
                goals: Vec::new(),
                optimization: None,
            },
            attempts: 1,
        }
    }

    #[test]
    fn key_depends_on_question_and_backend() {
        let a = ProgramCache::key("q1", "z3|10000ms");
        assert_eq!(a, ProgramCache::key("q1", "z3|10000ms"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, ProgramCache::key("q1", "z3|5000ms"));
        assert_ne!(a, ProgramCache::key("q2", "z3|10000ms"));
        // The separator keeps ("ab", "c") and ("a", "bc") apart.
        assert_ne!(ProgramCache::key("ab", "c"), ProgramCache::key("a", "bc"));
    }

    #[test]
    fn entries_are_write_once() {
        let cache = ProgramCache::in_memory();
        assert!(cache.put(entry("k", Verdict::True)).unwrap());
        assert!(!cache.put(entry("k", Verdict::False)).unwrap());
        assert_eq!(cache.get("k").unwrap().result.answer, Verdict::True);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn disk_entries_survive_a_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = ProgramCache::with_dir(dir.path()).unwrap();
            assert!(cache.put(entry("k", Verdict::False)).unwrap());
        }
        assert!(dir.path().join("k.json").exists());

        let reopened = ProgramCache::with_dir(dir.path()).unwrap();
        assert!(reopened.is_empty());
        let hit = reopened.get("k").unwrap();
        assert_eq!(hit.result.answer, Verdict::False);
        assert!(!reopened.put(entry("k", Verdict::True)).unwrap());
        assert_eq!(reopened.get("k").unwrap().result.answer, Verdict::False);
    }

    #[test]
    fn unreadable_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "{ truncated").unwrap();
        let cache = ProgramCache::with_dir(dir.path()).unwrap();
        assert!(cache.get("bad").is_none());
    }

    #[test]
    fn concurrent_writers_leave_one_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ProgramCache::with_dir(dir.path()).unwrap();
        let written: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let cache = &cache;
                    s.spawn(move || {
                        let verdict = if i % 2 == 0 { Verdict::True } else { Verdict::False };
                        cache.put(entry("same", verdict)).unwrap() as usize
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(written, 1);
        let files = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 1);
    }

    #[test]
    fn disk_write_does_not_need_the_exclusive_map_lock() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ProgramCache::with_dir(dir.path()).unwrap();
        let file = dir.path().join("k.json");

        let written = std::thread::scope(|s| {
            let reader = cache.entries.read().unwrap();
            let writer = s.spawn(|| cache.put(entry("k", Verdict::True)).unwrap());
            let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
            while !file.exists() && std::time::Instant::now() < deadline {
                std::thread::sleep(std::time::Duration::from_millis(5));
            }
            assert!(file.exists(), "file was not written while the map was locked");
            drop(reader);
            writer.join().unwrap()
        });
        assert!(written);
        assert_eq!(cache.get("k").unwrap().result.answer, Verdict::True);
    }

    #[test]
    fn losing_writer_adopts_the_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let first = ProgramCache::with_dir(dir.path()).unwrap();
        let second = ProgramCache::with_dir(dir.path()).unwrap();
        assert!(first.put(entry("k", Verdict::True)).unwrap());

        assert!(!second.put(entry("k", Verdict::False)).unwrap());
        assert_eq!(second.len(), 1);
        assert_eq!(second.get("k").unwrap().result.answer, Verdict::True);
    }
}
