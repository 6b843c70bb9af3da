use serde::{Deserialize, Serialize};

/// A target machine and the tags applied to it by default
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Fully-qualified hostname, the key in the manifest
    #[serde(skip)]
    pub name: String,

    /// Free-form description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Tag names, in the order they are processed
    pub tags: Vec<String>,
}

impl Host {
    /// Create a host with the given default tags
    #[must_use]
    pub fn new(name: &str, tags: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            tags,
        }
    }
}
