//! One managed filesystem object: a file, a directory or a symlink.

use super::mode::Mode;
use crate::error::{CageError, IoResultExt, Result};
use crate::utils::paths::{ensure_parent_dirs, path_as_child_of};
use crate::utils::permissions::{self, FilePermissions};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use tracing::trace;

/// Type of a managed object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file; content is stored in the repository
    #[default]
    File,
    /// Directory; only its own metadata is managed
    Dir,
    /// Symbolic link; only its destination is managed
    Link,
}

impl EntryKind {
    /// Type character as shown by `ls -l`
    #[must_use]
    pub const fn type_char(self) -> char {
        match self {
            Self::File => '-',
            Self::Dir => 'd',
            Self::Link => 'l',
        }
    }

    /// Name as written in the manifest
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Dir => "dir",
            Self::Link => "link",
        }
    }

    /// Kind of an object on disk, if it is one we manage
    #[must_use]
    pub fn of(file_type: fs::FileType) -> Option<Self> {
        if file_type.is_symlink() {
            Some(Self::Link)
        } else if file_type.is_dir() {
            Some(Self::Dir)
        } else if file_type.is_file() {
            Some(Self::File)
        } else {
            None
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A managed object, identified by its repository-relative path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Path relative to the target root, e.g. `etc/profile`
    #[serde(skip)]
    pub path: String,

    /// Object type
    #[serde(rename = "type", default)]
    pub kind: EntryKind,

    /// Owning user name; `None` means ownership is not managed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Owning group name; `None` means the group is not managed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Permission bits, required for files and directories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,

    /// Link destination, required for links
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Metadata read from an object on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    /// Object type
    pub kind: EntryKind,
    /// Owner name (numeric id if the user is unknown)
    pub owner: String,
    /// Group name (numeric id if the group is unknown)
    pub group: String,
    /// Permission bits
    pub mode: Mode,
    /// Link destination, for links
    pub link_target: Option<String>,
    /// Size in bytes
    pub size: u64,
    /// Modification time, seconds since the epoch
    pub modified: i64,
}

/// Reads the metadata of `root/path` without following a final symlink.
///
/// # Errors
///
/// `NotFound` if nothing exists at the path, `Access` on permission failure,
/// `Validation` for sockets, devices and other unmanageable types
pub fn capture(root: &Path, path: &str) -> Result<Capture> {
    let full = path_as_child_of(root, path);
    let metadata = fs::symlink_metadata(&full).at(&full)?;
    let kind = EntryKind::of(metadata.file_type()).ok_or_else(|| {
        CageError::Validation(format!(
            "{} is neither a file, a directory nor a symlink",
            full.display()
        ))
    })?;
    let link_target = if kind == EntryKind::Link {
        Some(
            fs::read_link(&full)
                .at(&full)?
                .to_string_lossy()
                .into_owned(),
        )
    } else {
        None
    };
    trace!(path = %full.display(), %kind, "captured");

    Ok(Capture {
        kind,
        owner: permissions::owner_of(&metadata),
        group: permissions::group_of(&metadata),
        mode: Mode::new(metadata.mode()),
        link_target,
        size: metadata.len(),
        modified: metadata.mtime(),
    })
}

impl Entry {
    /// Build an entry describing a captured object
    #[must_use]
    pub fn from_capture(path: &str, capture: &Capture) -> Self {
        match capture.kind {
            EntryKind::Link => Self {
                path: path.to_string(),
                kind: EntryKind::Link,
                target: capture.link_target.clone(),
                ..Self::default()
            },
            kind => Self {
                path: path.to_string(),
                kind,
                owner: Some(capture.owner.clone()),
                group: Some(capture.group.clone()),
                mode: Some(capture.mode),
                target: None,
            },
        }
    }

    /// Check the entry is complete for its type.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the entry if a link has no target or
    /// a file or directory has no mode
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            EntryKind::Link if self.target.as_deref().is_none_or(str::is_empty) => Err(
                CageError::Validation(format!("entry {}: link without target", self.path)),
            ),
            EntryKind::File | EntryKind::Dir if self.mode.is_none() => Err(CageError::Validation(
                format!("entry {}: {} without mode", self.path, self.kind),
            )),
            _ => Ok(()),
        }
    }

    /// Read the actual state of this entry's object below `target_root`
    ///
    /// # Errors
    ///
    /// See [`capture`]
    pub fn capture_from(&self, target_root: &Path) -> Result<Capture> {
        capture(target_root, &self.path)
    }

    /// Write this entry to `target_root`.
    ///
    /// Parent directories are created as needed. Links are replaced, never
    /// followed; directories are created non-recursively with respect to
    /// their content; files get the bytes stored at `blob`. Only fields that
    /// differ are touched, so re-applying an applied entry changes nothing.
    ///
    /// # Errors
    ///
    /// `TypeConflict` if an object of another type is in the way, `NotFound`
    /// if the blob is missing, `Access`/`Io` on filesystem failures
    pub fn apply_to(&self, target_root: &Path, blob: &Path) -> Result<()> {
        self.validate()?;
        let full = path_as_child_of(target_root, &self.path);
        let existing = match fs::symlink_metadata(&full) {
            Ok(metadata) => Some(metadata),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(CageError::from_io(&full, e)),
        };
        let existing_kind = existing.as_ref().and_then(|m| EntryKind::of(m.file_type()));
        if existing.is_some() && existing_kind != Some(self.kind) {
            return Err(CageError::TypeConflict {
                path: full,
                expected: self.kind.name(),
            });
        }

        match self.kind {
            EntryKind::Link => {
                let wanted = self.target.as_deref().unwrap_or_default();
                if existing.is_some() {
                    if fs::read_link(&full).at(&full)? == Path::new(wanted) {
                        return Ok(());
                    }
                    fs::remove_file(&full).at(&full)?;
                } else {
                    ensure_parent_dirs(&full)?;
                }
                std::os::unix::fs::symlink(wanted, &full).at(&full)?;
                // ownership and mode of links are not tracked
                return Ok(());
            }
            EntryKind::Dir => {
                if existing.is_none() {
                    fs::create_dir_all(&full).at(&full)?;
                }
            }
            EntryKind::File => {
                let content = fs::read(blob).map_err(|e| match e.kind() {
                    io::ErrorKind::NotFound => CageError::NotFound {
                        kind: "source",
                        name: blob.display().to_string(),
                    },
                    _ => CageError::from_io(blob, e),
                })?;
                let current = if existing.is_some() {
                    Some(fs::read(&full).at(&full)?)
                } else {
                    ensure_parent_dirs(&full)?;
                    None
                };
                if current.as_deref() != Some(content.as_slice()) {
                    fs::write(&full, &content).at(&full)?;
                }
            }
        }

        self.fix_metadata(&full)
    }

    /// Bring owner, group and mode of `full` in line with the entry.
    fn fix_metadata(&self, full: &Path) -> Result<()> {
        let metadata = fs::symlink_metadata(full).at(full)?;

        // chown before chmod: changing ownership may clear setuid/setgid
        let owner = self
            .owner
            .as_deref()
            .filter(|owner| *owner != permissions::owner_of(&metadata));
        let group = self
            .group
            .as_deref()
            .filter(|group| *group != permissions::group_of(&metadata));
        if owner.is_some() || group.is_some() {
            permissions::set_owner(full, owner, group)?;
        }

        if let Some(mode) = self.mode {
            let current = FilePermissions::from_mode(metadata.mode());
            if current.mode() != mode.bits() || owner.is_some() || group.is_some() {
                FilePermissions::from_mode(mode.bits()).apply_to_path(full)?;
            }
        }
        Ok(())
    }
}

/// Entries of a tag, keyed by path, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entries(Vec<Entry>);

impl Entries {
    /// Look up an entry by normalized path
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.0.iter().find(|e| e.path == path)
    }

    /// True if an entry exists for `path`
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Insert an entry, replacing (in place) any entry with the same path.
    /// Returns the replaced entry.
    pub fn insert(&mut self, entry: Entry) -> Option<Entry> {
        match self.0.iter_mut().find(|e| e.path == entry.path) {
            Some(slot) => Some(std::mem::replace(slot, entry)),
            None => {
                self.0.push(entry);
                None
            }
        }
    }

    /// Remove the entry for `path`
    pub fn remove(&mut self, path: &str) -> Option<Entry> {
        let pos = self.0.iter().position(|e| e.path == path)?;
        Some(self.0.remove(pos))
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.0.iter()
    }

    /// Mutable iteration in insertion order
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entry> {
        self.0.iter_mut()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the tag has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Entries {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for Entries {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in &self.0 {
            map.serialize_entry(&entry.path, entry)?;
        }
        map.end()
    }
}

/// Collects `path: {...}` pairs in document order.
struct EntriesVisitor;

impl<'de> Visitor<'de> for EntriesVisitor {
    type Value = Entries;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping of paths to entries")
    }

    fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<Entries, E> {
        Ok(Entries::default())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Entries, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((path, mut entry)) = map.next_entry::<String, Entry>()? {
            entry.path = path;
            entries.push(entry);
        }
        Ok(Entries(entries))
    }
}

impl<'de> Deserialize<'de> for Entries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(EntriesVisitor)
    }
}
