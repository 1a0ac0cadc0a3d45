use std::path::{Path, PathBuf};
use std::process;

use crate::host::Host;
use crate::varlist::position_of;

/// Allocates synthetic names for one invocation.
///
/// A single monotonic counter backs every kind of name, and candidates that
/// are already taken are skipped, so allocated names never collide with each
/// other or with what exists at allocation time.
#[derive(Debug, Clone)]
pub struct NameAllocator {
    variable_prefix: String,
    dataset_prefix: String,
    next: u64,
}

impl NameAllocator {
    pub fn with_prefixes(variable_prefix: &str, dataset_prefix: &str) -> Self {
        Self {
            variable_prefix: variable_prefix.to_string(),
            dataset_prefix: dataset_prefix.to_string(),
            next: 1,
        }
    }

    fn bump(&mut self) -> u64 {
        let current = self.next;
        self.next += 1;
        current
    }

    /// A variable name not present in `taken` (case-insensitive).
    pub fn variable(&mut self, taken: &[String]) -> String {
        loop {
            let n = self.bump();
            let candidate = format!("{}{n}", self.variable_prefix);
            if position_of(&candidate, taken).is_none() {
                return candidate;
            }
        }
    }

    /// A dataset name neither registered with `host` nor listed in `reserved`.
    pub fn dataset<H: Host + ?Sized>(&mut self, host: &H, reserved: &[String]) -> String {
        loop {
            let n = self.bump();
            let candidate = format!("{}{n}", self.dataset_prefix);
            if !host.has_dataset(&candidate) && position_of(&candidate, reserved).is_none() {
                return candidate;
            }
        }
    }

    /// A path inside `dir` that does not exist yet.
    pub fn file(&mut self, dir: &Path, extension: &str) -> PathBuf {
        let pid = process::id();
        loop {
            let n = self.bump();
            let candidate = dir.join(format!("cartprod-{pid}-{n}.{extension}"));
            if !candidate.exists() {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Dataset, MemoryEngine};
    use tempfile::tempdir;

    #[test]
    fn skips_taken_variable_names() {
        let mut names = NameAllocator::with_prefixes("V", "D");
        let taken = vec!["v1".to_string(), "V2".to_string()];
        assert_eq!(names.variable(&taken), "V3");
        assert_eq!(names.variable(&taken), "V4");
    }

    #[test]
    fn one_counter_backs_every_kind_of_name() {
        let mut engine = MemoryEngine::new();
        engine.insert("D2", Dataset::new(Vec::new(), Vec::new()).unwrap());

        let mut names = NameAllocator::with_prefixes("V", "D");
        assert_eq!(names.variable(&[]), "V1");
        assert_eq!(names.dataset(&engine, &[]), "D3");
        assert_eq!(names.variable(&[]), "V4");
    }

    #[test]
    fn skips_registered_and_reserved_datasets() {
        let mut engine = MemoryEngine::new();
        engine.insert("D1", Dataset::new(Vec::new(), Vec::new()).unwrap());

        let mut names = NameAllocator::with_prefixes("V", "D");
        assert_eq!(names.dataset(&engine, &["d2".to_string()]), "D3");
    }

    #[test]
    fn skips_existing_files() {
        let dir = tempdir().unwrap();
        let mut names = NameAllocator::with_prefixes("V", "D");
        let occupied = dir
            .path()
            .join(format!("cartprod-{}-1.jsonl", process::id()));
        std::fs::write(&occupied, "").unwrap();

        let allocated = names.file(dir.path(), "jsonl");
        assert_ne!(allocated, occupied);
        assert!(!allocated.exists());
    }
}
