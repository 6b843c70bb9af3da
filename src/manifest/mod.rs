//! The manifest: every host, tag and managed entry.
//!
//! The manifest is a hand-editable YAML document:
//!
//! ```yaml
//! hosts:
//!   web1.example.com:
//!     tags: [all, web]
//! tags:
//!   all:
//!     description: files that apply to all hosts
//!     entries:
//!       etc/profile:
//!         type: file
//!         owner: root
//!         group: wheel
//!         mode: 0o644
//!     hooks:
//!       post-apply:
//!         type: shell
//!         command: service sshd reload
//! ```
//!
//! It is loaded wholesale when a command starts, mutated in memory, and
//! written back once at the end through a temporary file that replaces the
//! previous document atomically.

/// Managed filesystem objects
pub mod entry;
/// Host definitions
pub mod host;
/// Octal permission values
pub mod mode;
/// Tags and hook definitions
pub mod tag;

pub use entry::{Capture, Entries, Entry, EntryKind};
pub use host::Host;
pub use mode::Mode;
pub use tag::{HookSpec, HookType, Tag, validate_tag_name};

use crate::error::{CageError, IoResultExt, Result};
use crate::utils::permissions::FilePermissions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, info};

/// Default tag created by `init`
pub const DEFAULT_TAG: &str = "all";

/// Description of [`DEFAULT_TAG`]
pub const DEFAULT_TAG_DESCRIPTION: &str = "files that apply to all hosts";

/// Root aggregate of hosts and tags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Hosts keyed by hostname
    #[serde(default)]
    pub hosts: BTreeMap<String, Host>,

    /// Tags keyed by name
    #[serde(default)]
    pub tags: BTreeMap<String, Tag>,

    /// Set whenever the in-memory manifest diverges from what was loaded
    #[serde(skip)]
    dirty: bool,
}

impl Manifest {
    /// A fresh manifest for `hostname` with the default tag.
    #[must_use]
    pub fn initial(hostname: &str) -> Self {
        let mut manifest = Self::default();
        manifest.hosts.insert(
            hostname.to_string(),
            Host::new(hostname, vec![DEFAULT_TAG.to_string()]),
        );
        manifest.tags.insert(
            DEFAULT_TAG.to_string(),
            Tag::new(DEFAULT_TAG, DEFAULT_TAG_DESCRIPTION),
        );
        manifest.dirty = true;
        manifest
    }

    /// Load and validate the manifest at `path`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the file does not exist, `Validation` if it is not a
    /// well-formed manifest
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CageError::NotFound {
                kind: "manifest",
                name: path.display().to_string(),
            },
            _ => CageError::from_io(path, e),
        })?;
        let manifest = Self::from_yaml(&text)
            .map_err(|e| CageError::Validation(format!("{}: {e}", path.display())))?;
        debug!(
            path = %path.display(),
            hosts = manifest.hosts.len(),
            tags = manifest.tags.len(),
            "manifest loaded"
        );
        Ok(manifest)
    }

    /// Parse a manifest document.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed YAML, unknown entry types,
    /// bad modes and incomplete entries
    pub fn from_yaml(text: &str) -> Result<Self> {
        let mut manifest: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text).map_err(|e| CageError::Validation(e.to_string()))?
        };
        for (name, host) in &mut manifest.hosts {
            host.name.clone_from(name);
        }
        for (name, tag) in &mut manifest.tags {
            tag.finish_load(name)?;
        }
        Ok(manifest)
    }

    /// Render the manifest as YAML.
    ///
    /// # Errors
    ///
    /// Returns a validation error if serialization fails
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| CageError::Validation(e.to_string()))
    }

    /// Write the manifest to `path`, replacing any previous file atomically.
    ///
    /// The document is written to a temporary file in the same directory and
    /// renamed over `path`, so a failure never leaves a truncated manifest.
    /// The permissions of an existing manifest are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be written or renamed
    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = self.to_yaml()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let permissions = match FilePermissions::from_path(path) {
            Ok(existing) => existing,
            Err(e) if e.is_not_found() => FilePermissions::default_file(),
            Err(e) => return Err(e),
        };

        let mut temp = tempfile::NamedTempFile::new_in(dir).at(dir)?;
        temp.write_all(yaml.as_bytes()).at(temp.path())?;
        temp.as_file().sync_all().at(temp.path())?;
        permissions.apply_to_path(temp.path())?;
        temp.persist(path).map_err(|e| CageError::from_io(path, e.error))?;

        info!(path = %path.display(), "manifest written");
        Ok(())
    }

    /// True if the manifest was changed since it was loaded
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Host entry for `hostname`
    #[must_use]
    pub fn host(&self, hostname: &str) -> Option<&Host> {
        self.hosts.get(hostname)
    }

    /// Tag by name
    ///
    /// # Errors
    ///
    /// `NotFound` if the tag does not exist
    pub fn tag(&self, name: &str) -> Result<&Tag> {
        self.tags.get(name).ok_or_else(|| CageError::NotFound {
            kind: "tag",
            name: name.to_string(),
        })
    }

    /// Entry `path` of tag `tag`
    ///
    /// # Errors
    ///
    /// `NotFound` if the tag or the entry does not exist
    pub fn entry(&self, tag: &str, path: &str) -> Result<&Entry> {
        self.tag(tag)?
            .entry(path)
            .ok_or_else(|| CageError::NotFound {
                kind: "entry",
                name: format!("{path} in tag {tag}"),
            })
    }

    /// Create a tag unless it exists. Returns true if it was created.
    pub fn ensure_tag(&mut self, name: &str, description: &str) -> bool {
        if self.tags.contains_key(name) {
            return false;
        }
        self.tags
            .insert(name.to_string(), Tag::new(name, description));
        self.dirty = true;
        true
    }

    /// Insert or replace an entry in an existing tag. Returns the replaced entry.
    ///
    /// # Errors
    ///
    /// `NotFound` if the tag does not exist
    pub fn insert_entry(&mut self, tag: &str, entry: Entry) -> Result<Option<Entry>> {
        let slot = self.tags.get_mut(tag).ok_or_else(|| CageError::NotFound {
            kind: "tag",
            name: tag.to_string(),
        })?;
        if slot.entries.get(&entry.path) == Some(&entry) {
            return Ok(Some(entry));
        }
        self.dirty = true;
        Ok(slot.entries.insert(entry))
    }

    /// Remove an entry from a tag. Returns the removed entry.
    ///
    /// # Errors
    ///
    /// `NotFound` if the tag or the entry does not exist
    pub fn remove_entry(&mut self, tag: &str, path: &str) -> Result<Entry> {
        let slot = self.tags.get_mut(tag).ok_or_else(|| CageError::NotFound {
            kind: "tag",
            name: tag.to_string(),
        })?;
        let removed = slot.entries.remove(path).ok_or_else(|| CageError::NotFound {
            kind: "entry",
            name: format!("{path} in tag {tag}"),
        })?;
        self.dirty = true;
        Ok(removed)
    }

    /// Soft consistency problems: dangling host tag references and hook
    /// names the dispatcher will never match.
    #[must_use]
    pub fn check(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for host in self.hosts.values() {
            for tag in &host.tags {
                if !self.tags.contains_key(tag) {
                    problems.push(format!(
                        "host {} references unknown tag {tag}",
                        host.name
                    ));
                }
            }
        }
        for tag in self.tags.values() {
            for hook in tag.hooks.values() {
                if !hook.has_known_name() {
                    problems.push(format!(
                        "tag {}: hook {} does not match <pre|post|*>-<add|apply|diff|save|*> and never runs",
                        tag.name, hook.name
                    ));
                }
            }
        }
        problems
    }
}
