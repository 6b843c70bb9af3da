//! Error taxonomy for the reconciliation engine.
//!
//! Library code returns [`CageError`]; the command layer wraps it in
//! `anyhow` with additional context. Each variant names the offending
//! path, tag or hook so a message can be printed as-is.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading the manifest or reconciling entries.
#[derive(Error, Debug)]
pub enum CageError {
    /// Malformed entry, hook or manifest document.
    #[error("Invalid manifest: {0}")]
    Validation(String),

    /// A file, tag, host or entry does not exist.
    #[error("No such {kind}: {name}")]
    NotFound {
        /// What was looked up ("tag", "entry", "source", ...)
        kind: &'static str,
        /// The name or path that was not found
        name: String,
    },

    /// Permission denied on a filesystem operation.
    #[error("Permission denied: {}: {source}", path.display())]
    Access {
        /// Path the operation was attempted on
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// `add` onto a path that the tag already holds.
    #[error("Unable to add {path}: already added to tag {tag}")]
    DuplicateEntry {
        /// Tag holding the entry
        tag: String,
        /// Repository-relative path
        path: String,
    },

    /// No tags given and the hostname has no host entry.
    #[error("No host entry for {0} and no tags given")]
    UnknownHost(String),

    /// The object on disk has a different type than the entry declares.
    #[error("Unable to update {}: it exists and is not a {expected}", path.display())]
    TypeConflict {
        /// Target path
        path: PathBuf,
        /// Type the entry declares
        expected: &'static str,
    },

    /// A hook exited non-zero, could not be started, or its script failed.
    #[error("Error executing hook \"{hook}\": {message}")]
    HookExecution {
        /// Hook name as written in the manifest
        hook: String,
        /// What went wrong
        message: String,
    },

    /// Any other I/O failure.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path the operation was attempted on
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, CageError>;

impl CageError {
    /// Classifies an I/O error raised while operating on `path`.
    #[must_use]
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound {
                kind: "path",
                name: path.display().to_string(),
            },
            io::ErrorKind::PermissionDenied => Self::Access {
                path: path.to_path_buf(),
                source: err,
            },
            _ => Self::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// True for a missing file, tag, host or entry.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Extension for attaching a path to raw `io::Result`s.
pub trait IoResultExt<T> {
    /// Converts the error with [`CageError::from_io`].
    ///
    /// # Errors
    ///
    /// Returns the classified error if `self` is an error.
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|e| CageError::from_io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_classification() {
        let path = Path::new("/nope");

        let err = CageError::from_io(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_not_found());

        let err = CageError::from_io(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, CageError::Access { .. }));
        assert!(err.to_string().contains("/nope"));

        let err = CageError::from_io(path, io::Error::other("boom"));
        assert!(matches!(err, CageError::Io { .. }));
    }

    #[test]
    fn test_messages_name_the_offender() {
        let err = CageError::DuplicateEntry {
            tag: "all".to_string(),
            path: "etc/hosts".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unable to add etc/hosts: already added to tag all"
        );

        let err = CageError::HookExecution {
            hook: "pre-save".to_string(),
            message: "exit status: 3".to_string(),
        };
        assert!(err.to_string().contains("pre-save"));
    }
}
