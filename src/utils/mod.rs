//! Utility functions and helpers.
//!
//! - [`formatters`]: `ls`-style mode strings, short dates, tables
//! - [`paths`]: entry path normalization
//! - [`permissions`]: permission bits and owner/group resolution

/// Output formatting for listings
pub mod formatters;
/// Path manipulation and resolution utilities
pub mod paths;
/// Unix permission and ownership handling
pub mod permissions;

pub use paths::{normalize_entry_path, normalize_target_path, path_as_child_of};

/// Returns the name of this host as reported by `gethostname(2)`.
#[must_use]
pub fn hostname() -> Option<String> {
    let mut buf = vec![0 as libc::c_char; 256];
    // SAFETY: buf is valid for buf.len() bytes for the duration of the call.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let bytes: Vec<u8> = buf
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8(bytes).ok().filter(|name| !name.is_empty())
}
