//! Octal permission bits as written in the manifest.
//!
//! Hand-edited manifests write modes as `644`, `0644`, `0o644` or quoted
//! strings. All of these are read as octal. A bare value containing the
//! digits 8 or 9 is rejected rather than silently reinterpreted.

use crate::error::{CageError, Result};
use crate::utils::permissions::MODE_MASK;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Permission bits of a file or directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode(u32);

impl Mode {
    /// Create a mode from raw bits; file type bits are dropped.
    #[must_use]
    pub const fn new(bits: u32) -> Self {
        Self(bits & MODE_MASK)
    }

    /// Raw permission bits
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Parse a textual mode, always as octal.
    ///
    /// # Errors
    ///
    /// Returns a validation error for non-octal digits or values above `0o7777`
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let digits = trimmed
            .strip_prefix("0o")
            .or_else(|| trimmed.strip_prefix("0O"))
            .unwrap_or(trimmed);
        if digits.is_empty() || !digits.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
            return Err(CageError::Validation(format!(
                "mode {text:?} is not an octal permission value"
            )));
        }
        let bits = u32::from_str_radix(digits, 8).map_err(|_| {
            CageError::Validation(format!("mode {text:?} is out of range"))
        })?;
        if bits > MODE_MASK {
            return Err(CageError::Validation(format!(
                "mode {text:?} is out of range"
            )));
        }
        Ok(Self(bits))
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0o{:o}", self.0)
    }
}

impl Serialize for Mode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Reads both the raw scalar text and already-typed integers as octal.
struct ModeVisitor;

impl Visitor<'_> for ModeVisitor {
    type Value = Mode;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an octal permission value such as 644 or \"0o644\"")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<Mode, E> {
        Mode::parse(value).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<Mode, E> {
        // the decimal digits of a bare integer are the octal digits the author wrote
        Mode::parse(&value.to_string()).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<Mode, E> {
        match u64::try_from(value) {
            Ok(v) => self.visit_u64(v),
            Err(_) => Err(E::custom(format!("mode {value} is negative"))),
        }
    }
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_str(ModeVisitor)
    }
}
