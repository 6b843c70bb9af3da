//! Tags group entries and carry the hooks run around commands.

use super::entry::{Entries, Entry};
use crate::error::{CageError, Result};
use crate::utils::normalize_entry_path;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How a hook's command is run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookType {
    /// Spawn the named program with `<command> <step> <tag>`
    #[serde(rename = "exec")]
    Exec,
    /// Pass the command string to `sh -c`
    #[serde(rename = "shell")]
    Shell,
    /// Run a script with the manifest bindings exposed to it
    #[serde(rename = "script-in-process", alias = "script")]
    Script,
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Exec => "exec",
            Self::Shell => "shell",
            Self::Script => "script-in-process",
        })
    }
}

/// A hook definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookSpec {
    /// `<step>-<command>`, `*-<command>`, `<step>-*` or `*`
    #[serde(skip)]
    pub name: String,

    /// How `command` is run
    #[serde(rename = "type")]
    pub kind: HookType,

    /// Program, shell command line or script path
    pub command: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,
}

/// Steps a hook name may start with
const HOOK_STEPS: [&str; 3] = ["pre", "post", "*"];
/// Commands a hook name may end with
const HOOK_COMMANDS: [&str; 5] = ["add", "apply", "diff", "save", "*"];

impl HookSpec {
    /// True if the name is one of the forms the dispatcher can match
    #[must_use]
    pub fn has_known_name(&self) -> bool {
        if self.name == "*" {
            return true;
        }
        self.name.split_once('-').is_some_and(|(step, command)| {
            HOOK_STEPS.contains(&step) && HOOK_COMMANDS.contains(&command)
        })
    }
}

/// Check that `name` can be used as a tag name.
///
/// Tag names are map keys in the manifest and appear in hook arguments, so
/// they must be non-empty and free of path separators and dot components.
///
/// # Errors
///
/// Returns a validation error naming the rejected tag
pub fn validate_tag_name(name: &str) -> Result<()> {
    if name.trim().is_empty()
        || name.contains(['/', '\\'])
        || name == "."
        || name == ".."
        || name.chars().any(char::is_control)
    {
        return Err(CageError::Validation(format!("invalid tag name {name:?}")));
    }
    Ok(())
}

/// A named group of entries plus hooks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag name, the key in the manifest
    #[serde(skip)]
    pub name: String,

    /// Free-form description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Managed objects
    #[serde(default, skip_serializing_if = "Entries::is_empty")]
    pub entries: Entries,

    /// Hooks keyed by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hooks: BTreeMap<String, HookSpec>,
}

impl Tag {
    /// Create an empty tag
    #[must_use]
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            ..Self::default()
        }
    }

    /// Fill in names from map keys, normalize entry paths and validate entries.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the tag and entry
    pub(crate) fn finish_load(&mut self, name: &str) -> Result<()> {
        validate_tag_name(name)?;
        self.name = name.to_string();

        let mut seen = Vec::with_capacity(self.entries.len());
        for entry in self.entries.iter_mut() {
            entry.path = normalize_entry_path(&entry.path)
                .map_err(|e| CageError::Validation(format!("tag {name}: {e}")))?;
            entry
                .validate()
                .map_err(|e| CageError::Validation(format!("tag {name}: {e}")))?;
            if seen.contains(&entry.path) {
                return Err(CageError::Validation(format!(
                    "tag {name}: entry {} is listed twice",
                    entry.path
                )));
            }
            seen.push(entry.path.clone());
        }

        for (hook_name, hook) in &mut self.hooks {
            hook.name.clone_from(hook_name);
        }
        Ok(())
    }

    /// Look up an entry by normalized path
    #[must_use]
    pub fn entry(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    /// Find the most specific hook for a step and command.
    ///
    /// Tries `<step>-<command>`, `*-<command>`, `<step>-*`, then `*`.
    #[must_use]
    pub fn find_hook(&self, step: &str, command: &str) -> Option<&HookSpec> {
        [
            format!("{step}-{command}"),
            format!("*-{command}"),
            format!("{step}-*"),
            "*".to_string(),
        ]
        .iter()
        .find_map(|name| self.hooks.get(name))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} entries)", self.name, self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hook(name: &str) -> HookSpec {
        HookSpec {
            name: name.to_string(),
            kind: HookType::Shell,
            command: format!("echo {name}"),
            description: String::new(),
        }
    }

    #[test]
    fn test_hook_names() {
        assert!(hook("pre-save").has_known_name());
        assert!(hook("*-apply").has_known_name());
        assert!(hook("post-*").has_known_name());
        assert!(hook("*").has_known_name());
        assert!(!hook("pre-commit").has_known_name());
        assert!(!hook("during-save").has_known_name());
    }

    #[test]
    fn test_finish_load_normalizes_and_rejects_duplicates() {
        let mut tag: Tag = serde_yaml::from_str(
            "entries:\n  /etc/hosts:\n    type: file\n    mode: '0644'\n",
        )
        .unwrap();
        tag.finish_load("all").unwrap();
        assert!(tag.entry("etc/hosts").is_some());

        let mut tag: Tag = serde_yaml::from_str(
            "entries:\n  etc/hosts:\n    mode: 644\n  /etc/hosts/:\n    mode: 600\n",
        )
        .unwrap();
        let err = tag.finish_load("all").unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn test_tag_names() {
        assert!(validate_tag_name("all").is_ok());
        assert!(validate_tag_name("web-servers").is_ok());
        for bad in ["", " ", ".", "..", "../x", "a/b", "a\\b", "x\ny"] {
            assert!(validate_tag_name(bad).is_err(), "{bad:?} accepted");
        }

        let mut tag = Tag::default();
        let err = tag.finish_load("../etc").unwrap_err();
        assert!(matches!(err, CageError::Validation(_)));
    }

    #[test]
    fn test_hook_type_names() {
        let spec: HookSpec =
            serde_yaml::from_str("type: script-in-process\ncommand: hooks/x.sh\n").unwrap();
        assert_eq!(spec.kind, HookType::Script);

        let spec: HookSpec = serde_yaml::from_str("type: exec\ncommand: bin/x\n").unwrap();
        assert_eq!(spec.kind, HookType::Exec);

        assert!(serde_yaml::from_str::<HookSpec>("type: cron\ncommand: x\n").is_err());
    }
}
