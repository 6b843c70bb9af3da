//! Tree comparator: what differs between an entry's target object and its
//! repository representation.
//!
//! The repository side of an entry is its manifest metadata plus, for files,
//! the stored blob. The result is a set of [`Difference`]s; several may hold
//! at once (content and mode, say). An empty set means identical.

use crate::error::{IoResultExt, Result};
use crate::manifest::{Capture, Entry, EntryKind};
use crate::utils::path_as_child_of;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use tracing::{Level, debug, span};

/// One way in which target and repository disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Difference {
    /// Nothing exists at the target path
    MissingInTarget,
    /// The repository has no blob for a file entry
    MissingInRepo,
    /// The target object has a different type than the entry
    TypeMismatch,
    /// File bytes differ
    ContentDiffers,
    /// Owner name differs
    OwnerDiffers,
    /// Group name differs
    GroupDiffers,
    /// Permission bits differ
    ModeDiffers,
    /// Symlink destination differs
    LinkTargetDiffers,
}

impl Difference {
    /// Short label for listings
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::MissingInTarget => "missing in target",
            Self::MissingInRepo => "missing in repository",
            Self::TypeMismatch => "type",
            Self::ContentDiffers => "content",
            Self::OwnerDiffers => "owner",
            Self::GroupDiffers => "group",
            Self::ModeDiffers => "mode",
            Self::LinkTargetDiffers => "link target",
        }
    }
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of comparing one entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comparison {
    differences: BTreeSet<Difference>,
    /// What was found at the target path, if anything
    pub target: Option<Capture>,
}

impl Comparison {
    /// True if no difference was found
    #[must_use]
    pub fn is_identical(&self) -> bool {
        self.differences.is_empty()
    }

    /// True if `difference` was found
    #[must_use]
    pub fn has(&self, difference: Difference) -> bool {
        self.differences.contains(&difference)
    }

    /// All differences, in a fixed order
    pub fn iter(&self) -> impl Iterator<Item = Difference> + '_ {
        self.differences.iter().copied()
    }

    /// Number of differences
    #[must_use]
    pub fn len(&self) -> usize {
        self.differences.len()
    }

    /// Same as [`Comparison::is_identical`]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.is_identical()
    }

    fn flag(&mut self, difference: Difference) {
        self.differences.insert(difference);
    }
}

/// Compare `entry` below `target_root` with its representation in `tag_storage`
/// (the tag's directory in the repository).
///
/// Absence on either side short-circuits every other check, and so does a
/// type mismatch. Files are compared byte for byte; links only by
/// destination; owner and group by name, and only when the entry manages them.
///
/// # Errors
///
/// Returns an error if an object exists but cannot be read
pub fn compare(entry: &Entry, target_root: &Path, tag_storage: &Path) -> Result<Comparison> {
    let span = span!(Level::DEBUG, "compare", path = %entry.path);
    let _guard = span.enter();

    let mut result = Comparison::default();

    let captured = match entry.capture_from(target_root) {
        Ok(capture) => Some(capture),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e),
    };
    let blob = path_as_child_of(tag_storage, &entry.path);
    let repo_present = match entry.kind {
        EntryKind::File => fs::metadata(&blob).is_ok_and(|m| m.is_file()),
        EntryKind::Dir | EntryKind::Link => true,
    };

    if captured.is_none() {
        result.flag(Difference::MissingInTarget);
    }
    if !repo_present {
        result.flag(Difference::MissingInRepo);
    }
    let Some(actual) = captured else {
        return Ok(result);
    };
    if !repo_present {
        result.target = Some(actual);
        return Ok(result);
    }

    if actual.kind != entry.kind {
        result.flag(Difference::TypeMismatch);
        result.target = Some(actual);
        return Ok(result);
    }

    match entry.kind {
        EntryKind::Link => {
            if actual.link_target.as_deref() != entry.target.as_deref() {
                result.flag(Difference::LinkTargetDiffers);
            }
        }
        EntryKind::File | EntryKind::Dir => {
            if entry.kind == EntryKind::File {
                let target_file = path_as_child_of(target_root, &entry.path);
                if !files_equal(&blob, &target_file)? {
                    result.flag(Difference::ContentDiffers);
                }
            }
            if entry.owner.as_ref().is_some_and(|o| *o != actual.owner) {
                result.flag(Difference::OwnerDiffers);
            }
            if entry.group.as_ref().is_some_and(|g| *g != actual.group) {
                result.flag(Difference::GroupDiffers);
            }
            if entry.mode.is_some_and(|m| m != actual.mode) {
                result.flag(Difference::ModeDiffers);
            }
        }
    }

    debug!(differences = result.len(), "compared");
    result.target = Some(actual);
    Ok(result)
}

/// Byte-for-byte equality of two files
///
/// # Errors
///
/// Returns an error if either file cannot be read
pub fn files_equal(a: &Path, b: &Path) -> Result<bool> {
    let meta_a = fs::metadata(a).at(a)?;
    let meta_b = fs::metadata(b).at(b)?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }

    let mut file_a = io::BufReader::new(fs::File::open(a).at(a)?);
    let mut file_b = io::BufReader::new(fs::File::open(b).at(b)?);
    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];
    loop {
        let n = file_a.read(&mut buf_a).at(a)?;
        if n == 0 {
            // equal lengths, so b must be exhausted too
            return Ok(true);
        }
        file_b.read_exact(&mut buf_b[..n]).at(b)?;
        if buf_a[..n] != buf_b[..n] {
            return Ok(false);
        }
    }
}
