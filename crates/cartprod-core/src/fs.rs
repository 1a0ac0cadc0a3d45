use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::Builder;

use crate::error::CartResult;

/// Atomically replace `path` with `content`: readers see either the old file
/// or the complete new one.
pub fn write_atomic(path: &Path, content: &[u8]) -> CartResult<()> {
    let parent = parent_dir(path);
    fs::create_dir_all(&parent)?;

    let mut tmp = Builder::new().prefix(".cartprod").tempfile_in(&parent)?;
    tmp.as_file_mut().write_all(content)?;
    tmp.as_file_mut().sync_all()?;

    tmp.persist(path).map(|_| ()).map_err(|err| err.error.into())
}

/// Whether two paths name the same file. The target need not exist yet.
pub fn same_file(a: &Path, b: &Path) -> bool {
    normalize(a) == normalize(b)
}

fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }

    let parent = parent_dir(path);
    let parent = fs::canonicalize(&parent).unwrap_or(parent);
    match path.file_name() {
        Some(name) => parent.join(name),
        None => parent,
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
