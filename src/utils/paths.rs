use super::permissions::RepoOwnership;
use crate::error::{CageError, IoResultExt, Result};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Normalizes a manifest entry path to its repository-relative form.
///
/// Leading `/` and `./`, trailing `/` and repeated separators are removed.
/// `etc/profile`, `/etc/profile` and `etc/profile/` all normalize to
/// `etc/profile`.
///
/// # Errors
///
/// Returns a validation error for empty paths and paths containing `..`
pub fn normalize_entry_path(path: &str) -> Result<String> {
    let mut parts = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(CageError::Validation(format!(
                    "path {path:?} must not leave the target directory"
                )));
            }
        }
    }
    if parts.is_empty() {
        return Err(CageError::Validation(format!(
            "path {path:?} does not name a file"
        )));
    }
    Ok(parts.join("/"))
}

/// Converts a path given on the command line to a manifest entry path.
///
/// Absolute paths below `target_root` have the root stripped; every other
/// path is taken relative to the target root.
///
/// # Errors
///
/// Returns a validation error if the path is empty or escapes the target root
pub fn normalize_target_path(input: &str, target_root: &Path) -> Result<String> {
    let path = Path::new(input);
    let relative = if path.is_absolute() {
        path.strip_prefix(target_root).unwrap_or(path)
    } else {
        path
    };
    normalize_entry_path(&relative.to_string_lossy())
}

/// Joins a repository-relative entry path onto a base directory
#[must_use]
pub fn path_as_child_of(base: &Path, entry_path: &str) -> PathBuf {
    base.join(entry_path.trim_start_matches('/'))
}

/// Ensures parent directories exist for a given path
///
/// # Errors
///
/// Returns an error if the parent directories cannot be created
pub fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).at(parent)?;
    }
    Ok(())
}

/// Ensures parent directories exist, handing every directory this creates
/// to `ownership`
///
/// # Errors
///
/// Returns an error if a directory cannot be created or its ownership set
pub fn ensure_parent_dirs_owned(path: &Path, ownership: Option<&RepoOwnership>) -> Result<()> {
    let Some(ownership) = ownership else {
        return ensure_parent_dirs(path);
    };
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    let missing: Vec<&Path> = parent
        .ancestors()
        .take_while(|dir| !dir.as_os_str().is_empty() && !dir.exists())
        .collect();
    for dir in missing.into_iter().rev() {
        match fs::create_dir(dir) {
            Ok(()) => ownership.apply_to_dir(dir)?,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(CageError::from_io(dir, e)),
        }
    }
    Ok(())
}
