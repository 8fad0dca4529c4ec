//! On-disk record of the last successful run of each stage.
//!
//! `<stages_dir>/<stage>.hash` holds the input digest. An entry is only a hit
//! when the digest matches and every declared output still exists.

use std::fs;
use std::path::{Path, PathBuf};

use crate::digest::ContentHash;
use crate::error::{OrchestrationError, Result};
use crate::stage::Stage;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

#[derive(Debug)]
pub struct StageCache {
    dir: PathBuf,
    hits: usize,
    misses: usize,
}

impl StageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn hash_path(&self, stage: Stage) -> PathBuf {
        self.dir.join(format!("{}.hash", stage.id()))
    }

    pub fn log_path(&self, stage: Stage) -> PathBuf {
        self.dir.join(format!("{}.log", stage.id()))
    }

    /// The digest recorded for `stage`, if any.
    pub fn recorded(&self, stage: Stage) -> Option<ContentHash> {
        let text = fs::read_to_string(self.hash_path(stage)).ok()?;
        ContentHash::parse(&text)
    }

    /// Whether `stage` can be skipped for `digest`.
    pub fn lookup(&mut self, stage: Stage, digest: &ContentHash, outputs: &[PathBuf]) -> bool {
        let hit = stage.cacheable()
            && self.recorded(stage).as_ref() == Some(digest)
            && outputs.iter().all(|p| p.exists());
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        tracing::debug!(stage = %stage, hit, "stage cache lookup");
        hit
    }

    /// Record a successful run.
    pub fn store(&self, stage: Stage, digest: &ContentHash) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(OrchestrationError::io(&self.dir))?;
        let path = self.hash_path(stage);
        fs::write(&path, format!("{digest}\n")).map_err(OrchestrationError::io(&path))
    }

    /// Forget `stage`; called before it re-runs so an interrupted run is never
    /// mistaken for a finished one.
    pub fn invalidate(&self, stage: Stage) -> Result<()> {
        let path = self.hash_path(stage);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OrchestrationError::Io { path, source: e }),
        }
    }

    pub fn statistics(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_requires_matching_digest_and_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("zephyr.elf");
        let mut cache = StageCache::new(dir.path().join(".stages"));
        let digest = ContentHash::compute(b"inputs");

        assert!(!cache.lookup(Stage::Build, &digest, &[]));
        cache.store(Stage::Build, &digest).unwrap();
        assert!(cache.lookup(Stage::Build, &digest, &[]));
        assert!(!cache.lookup(Stage::Build, &ContentHash::compute(b"other"), &[]));

        assert!(!cache.lookup(Stage::Build, &digest, &[output.clone()]));
        fs::write(&output, "elf").unwrap();
        assert!(cache.lookup(Stage::Build, &digest, &[output]));

        assert_eq!(cache.statistics(), CacheStats { hits: 2, misses: 3 });
    }

    #[test]
    fn invalidate_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = StageCache::new(dir.path());
        let digest = ContentHash::compute(b"inputs");
        cache.store(Stage::PrepareBoard, &digest).unwrap();
        cache.invalidate(Stage::PrepareBoard).unwrap();
        cache.invalidate(Stage::PrepareBoard).unwrap();
        assert!(!cache.lookup(Stage::PrepareBoard, &digest, &[]));
    }

    #[test]
    fn simulate_never_hits() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = StageCache::new(dir.path());
        let digest = ContentHash::compute(b"inputs");
        cache.store(Stage::Simulate, &digest).unwrap();
        assert!(!cache.lookup(Stage::Simulate, &digest, &[]));
    }

    #[test]
    fn corrupt_hash_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = StageCache::new(dir.path());
        fs::write(cache.hash_path(Stage::Build), "garbage").unwrap();
        assert_eq!(cache.recorded(Stage::Build), None);
        assert!(!cache.lookup(Stage::Build, &ContentHash::compute(b""), &[]));
    }
}
