//! Whole-directory replacement through a sibling staging directory.
//!
//! The new content is built in `.<name>.staging`, then swapped in with renames:
//! the old directory moves to `.<name>.old`, staging takes its place, and the
//! backup is deleted. A failure while filling staging leaves the old output
//! untouched.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{GenerationError, Result};

fn sibling(target: &Path, suffix: &str) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.{suffix}"))
}

fn remove_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path).map_err(GenerationError::io(path))?;
    }
    Ok(())
}

/// Replace `target` with a directory produced by `fill`.
///
/// With `force = false` an existing `target` is [`GenerationError::OutputExists`].
pub fn replace_dir<F>(target: &Path, force: bool, fill: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    if target.exists() && !force {
        return Err(GenerationError::OutputExists {
            path: target.to_path_buf(),
        });
    }
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(GenerationError::io(parent))?;
    }

    let staging = sibling(target, "staging");
    remove_if_exists(&staging)?;
    fs::create_dir(&staging).map_err(GenerationError::io(&staging))?;
    if let Err(e) = fill(&staging) {
        let _ = fs::remove_dir_all(&staging);
        return Err(e);
    }

    if !target.exists() {
        return fs::rename(&staging, target).map_err(GenerationError::io(target));
    }

    let backup = sibling(target, "old");
    remove_if_exists(&backup)?;
    fs::rename(target, &backup).map_err(GenerationError::io(target))?;
    if let Err(source) = fs::rename(&staging, target) {
        let _ = fs::rename(&backup, target);
        return Err(GenerationError::Io {
            path: target.to_path_buf(),
            source,
        });
    }
    remove_if_exists(&backup)?;
    tracing::debug!(path = %target.display(), "output directory replaced");
    Ok(())
}

/// Write every `(path, contents)` pair to a sibling temporary file first, then
/// rename them all into place. Nothing is renamed unless every write succeeded.
pub fn write_files(files: &[(&Path, &str)]) -> Result<()> {
    let mut staged = Vec::with_capacity(files.len());
    for (path, contents) in files {
        let tmp = sibling(path, "tmp");
        if let Err(e) = fs::write(&tmp, contents) {
            for (tmp, _) in &staged {
                let _ = fs::remove_file(tmp);
            }
            return Err(GenerationError::Io { path: tmp, source: e });
        }
        staged.push((tmp, *path));
    }
    for (tmp, path) in &staged {
        fs::rename(tmp, path).map_err(GenerationError::io(path))?;
    }
    Ok(())
}

/// Recursively copy `src` into the existing directory `dst`.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    let entries = fs::read_dir(src).map_err(GenerationError::io(src))?;
    let mut entries: Vec<_> = entries
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(GenerationError::io(src))?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(GenerationError::io(&from))?;
        if file_type.is_dir() {
            fs::create_dir(&to).map_err(GenerationError::io(&to))?;
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(GenerationError::io(&to))?;
        }
    }
    Ok(())
}
