use crate::error::{CageError, IoResultExt, Result};
use std::ffi::{CStr, CString};
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

/// Mask of the permission bits tracked in the manifest (rwx plus setuid/setgid/sticky)
pub const MODE_MASK: u32 = 0o7777;

/// Permission bits of a file or directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilePermissions {
    mode: u32,
}

impl FilePermissions {
    /// Create permissions from a raw mode value, dropping the file type bits
    #[must_use]
    pub const fn from_mode(mode: u32) -> Self {
        Self {
            mode: mode & MODE_MASK,
        }
    }

    /// Get the raw mode value
    #[must_use]
    pub const fn mode(&self) -> u32 {
        self.mode
    }

    /// Read permissions from a path without following a final symlink
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be read
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = fs::symlink_metadata(path).at(path)?;
        Ok(Self::from_mode(metadata.mode()))
    }

    /// Apply permissions to a file or directory
    ///
    /// # Errors
    ///
    /// Returns an error if the permissions cannot be set
    pub fn apply_to_path(&self, path: &Path) -> Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(self.mode)).at(path)
    }

    /// Default mode for new files
    #[must_use]
    pub const fn default_file() -> Self {
        Self::from_mode(0o644)
    }

    /// Directory mode derived from a file mode: every read bit also grants
    /// search, so 0o640 becomes 0o750
    #[must_use]
    pub const fn searchable(&self) -> Self {
        Self::from_mode(self.mode | ((self.mode & 0o444) >> 2))
    }
}

impl Default for FilePermissions {
    fn default() -> Self {
        Self::default_file()
    }
}

/// Owner, group and mode given to directories created in the repository.
///
/// Taken from the manifest file, so a run as root against a repository owned
/// by someone else leaves directories that owner can still manage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepoOwnership {
    /// Numeric owner
    pub uid: u32,
    /// Numeric group
    pub gid: u32,
    /// Mode of new directories
    pub dir_mode: FilePermissions,
}

impl RepoOwnership {
    /// Ownership derived from the file at `path`, `None` if it does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be read for another reason
    pub fn of_file(path: &Path) -> Result<Option<Self>> {
        match fs::metadata(path) {
            Ok(metadata) => Ok(Some(Self {
                uid: metadata.uid(),
                gid: metadata.gid(),
                dir_mode: FilePermissions::from_mode(metadata.mode()).searchable(),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CageError::from_io(path, e)),
        }
    }

    /// Give the freshly created directory `path` this owner, group and mode
    ///
    /// # Errors
    ///
    /// Returns `Access` if the caller may not change ownership
    pub fn apply_to_dir(&self, path: &Path) -> Result<()> {
        let metadata = fs::symlink_metadata(path).at(path)?;
        if metadata.uid() != self.uid || metadata.gid() != self.gid {
            lchown_ids(path, self.uid, self.gid)?;
        }
        // after chown, which may clear setgid
        self.dir_mode.apply_to_path(path)
    }
}

/// Size of the scratch buffer handed to the reentrant passwd/group lookups
const LOOKUP_BUFFER: usize = 1024;

/// Runs a reentrant libc lookup, growing the buffer on `ERANGE`.
fn with_lookup_buffer<T>(mut lookup: impl FnMut(&mut [libc::c_char]) -> LookupStep<T>) -> Option<T> {
    let mut size = LOOKUP_BUFFER;
    loop {
        let mut buf = vec![0 as libc::c_char; size];
        match lookup(&mut buf) {
            LookupStep::Found(value) => return Some(value),
            LookupStep::Missing => return None,
            LookupStep::Retry if size < 1 << 20 => size *= 4,
            LookupStep::Retry => return None,
        }
    }
}

/// Result of one attempt at a reentrant lookup
enum LookupStep<T> {
    Found(T),
    Missing,
    Retry,
}

/// Resolve a numeric user id to its name
#[must_use]
pub fn user_name(uid: u32) -> Option<String> {
    with_lookup_buffer(|buf| {
        // SAFETY: every pointer handed to getpwuid_r is valid for the call and
        // pw_name points into `buf`, which outlives the CStr read below.
        unsafe {
            let mut pwd: libc::passwd = std::mem::zeroed();
            let mut result: *mut libc::passwd = std::ptr::null_mut();
            let rc = libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result);
            if rc == libc::ERANGE {
                LookupStep::Retry
            } else if rc != 0 || result.is_null() {
                LookupStep::Missing
            } else {
                LookupStep::Found(CStr::from_ptr(pwd.pw_name).to_string_lossy().into_owned())
            }
        }
    })
}

/// Resolve a numeric group id to its name
#[must_use]
pub fn group_name(gid: u32) -> Option<String> {
    with_lookup_buffer(|buf| {
        // SAFETY: see `user_name`; gr_name points into `buf`.
        unsafe {
            let mut grp: libc::group = std::mem::zeroed();
            let mut result: *mut libc::group = std::ptr::null_mut();
            let rc = libc::getgrgid_r(gid, &mut grp, buf.as_mut_ptr(), buf.len(), &mut result);
            if rc == libc::ERANGE {
                LookupStep::Retry
            } else if rc != 0 || result.is_null() {
                LookupStep::Missing
            } else {
                LookupStep::Found(CStr::from_ptr(grp.gr_name).to_string_lossy().into_owned())
            }
        }
    })
}

/// Resolve a user name to its id. Numeric names without a passwd entry are used as-is.
///
/// # Errors
///
/// Returns `NotFound` if the user does not exist
pub fn user_id(name: &str) -> Result<u32> {
    let c_name = CString::new(name)
        .map_err(|_| CageError::Validation(format!("invalid user name {name:?}")))?;
    let found = with_lookup_buffer(|buf| {
        // SAFETY: c_name is NUL-terminated and all out-pointers are valid.
        unsafe {
            let mut pwd: libc::passwd = std::mem::zeroed();
            let mut result: *mut libc::passwd = std::ptr::null_mut();
            let rc = libc::getpwnam_r(
                c_name.as_ptr(),
                &mut pwd,
                buf.as_mut_ptr(),
                buf.len(),
                &mut result,
            );
            if rc == libc::ERANGE {
                LookupStep::Retry
            } else if rc != 0 || result.is_null() {
                LookupStep::Missing
            } else {
                LookupStep::Found(pwd.pw_uid)
            }
        }
    });
    found
        .or_else(|| name.parse().ok())
        .ok_or_else(|| CageError::NotFound {
            kind: "user",
            name: name.to_string(),
        })
}

/// Resolve a group name to its id. Numeric names without a group entry are used as-is.
///
/// # Errors
///
/// Returns `NotFound` if the group does not exist
pub fn group_id(name: &str) -> Result<u32> {
    let c_name = CString::new(name)
        .map_err(|_| CageError::Validation(format!("invalid group name {name:?}")))?;
    let found = with_lookup_buffer(|buf| {
        // SAFETY: c_name is NUL-terminated and all out-pointers are valid.
        unsafe {
            let mut grp: libc::group = std::mem::zeroed();
            let mut result: *mut libc::group = std::ptr::null_mut();
            let rc = libc::getgrnam_r(
                c_name.as_ptr(),
                &mut grp,
                buf.as_mut_ptr(),
                buf.len(),
                &mut result,
            );
            if rc == libc::ERANGE {
                LookupStep::Retry
            } else if rc != 0 || result.is_null() {
                LookupStep::Missing
            } else {
                LookupStep::Found(grp.gr_gid)
            }
        }
    });
    found
        .or_else(|| name.parse().ok())
        .ok_or_else(|| CageError::NotFound {
            kind: "group",
            name: name.to_string(),
        })
}

/// Name of the owner of `metadata`, falling back to the numeric id
#[must_use]
pub fn owner_of(metadata: &fs::Metadata) -> String {
    user_name(metadata.uid()).unwrap_or_else(|| metadata.uid().to_string())
}

/// Name of the group of `metadata`, falling back to the numeric id
#[must_use]
pub fn group_of(metadata: &fs::Metadata) -> String {
    group_name(metadata.gid()).unwrap_or_else(|| metadata.gid().to_string())
}

/// Change owner and/or group of `path` without following a final symlink.
///
/// `None` leaves the respective id unchanged.
///
/// # Errors
///
/// Returns `NotFound` for unknown names and `Access` if the caller may not
/// change ownership
pub fn set_owner(path: &Path, owner: Option<&str>, group: Option<&str>) -> Result<()> {
    // -1 as uid_t/gid_t means "leave unchanged" for lchown
    let uid = owner.map(user_id).transpose()?.unwrap_or(u32::MAX);
    let gid = group.map(group_id).transpose()?.unwrap_or(u32::MAX);
    lchown_ids(path, uid, gid)
}

/// `lchown(2)` with numeric ids
fn lchown_ids(path: &Path, uid: u32, gid: u32) -> Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| CageError::Validation(format!("invalid path {}", path.display())))?;
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
    let rc = unsafe { libc::lchown(c_path.as_ptr(), uid, gid) };
    if rc != 0 {
        return Err(CageError::from_io(path, io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_mode_drops_type_bits() {
        let perms = FilePermissions::from_mode(0o100_644);
        assert_eq!(perms.mode(), 0o644);

        let perms = FilePermissions::from_mode(0o4755);
        assert_eq!(perms.mode(), 0o4755);
    }

    #[test]
    fn test_apply_and_read_back() -> Result<()> {
        let temp = TempDir::new().expect("tempdir");
        let file = temp.path().join("f");
        fs::write(&file, "x").expect("write");

        FilePermissions::from_mode(0o640).apply_to_path(&file)?;
        assert_eq!(FilePermissions::from_path(&file)?.mode(), 0o640);
        Ok(())
    }

    #[test]
    fn test_searchable_copies_read_to_search() {
        assert_eq!(FilePermissions::from_mode(0o640).searchable().mode(), 0o750);
        assert_eq!(FilePermissions::from_mode(0o644).searchable().mode(), 0o755);
        assert_eq!(FilePermissions::from_mode(0o600).searchable().mode(), 0o700);
    }

    #[test]
    fn test_repo_ownership_of_manifest() -> Result<()> {
        let temp = TempDir::new().expect("tempdir");
        let manifest = temp.path().join("hamstercage.yaml");
        assert_eq!(RepoOwnership::of_file(&manifest)?, None);

        fs::write(&manifest, "tags: {}\n").expect("write");
        FilePermissions::from_mode(0o640).apply_to_path(&manifest)?;
        let ownership = RepoOwnership::of_file(&manifest)?.expect("ownership");
        let metadata = fs::metadata(&manifest).expect("metadata");
        assert_eq!(ownership.uid, metadata.uid());
        assert_eq!(ownership.dir_mode.mode(), 0o750);

        let dir = temp.path().join("tags");
        fs::create_dir(&dir).expect("mkdir");
        ownership.apply_to_dir(&dir)?;
        assert_eq!(FilePermissions::from_path(&dir)?.mode(), 0o750);
        assert_eq!(fs::metadata(&dir).expect("metadata").gid(), ownership.gid);
        Ok(())
    }

    #[test]
    fn test_current_user_round_trip() {
        let temp = TempDir::new().expect("tempdir");
        let metadata = fs::metadata(temp.path()).expect("metadata");

        let name = owner_of(&metadata);
        assert_eq!(user_id(&name).expect("uid"), metadata.uid());

        let group = group_of(&metadata);
        assert_eq!(group_id(&group).expect("gid"), metadata.gid());
    }

    #[test]
    fn test_unknown_user() {
        let err = user_id("no-such-user-hamstercage").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_set_owner_to_self_is_allowed() -> Result<()> {
        let temp = TempDir::new().expect("tempdir");
        let file = temp.path().join("f");
        fs::write(&file, "x").expect("write");
        let metadata = fs::metadata(&file).expect("metadata");

        set_owner(&file, Some(&owner_of(&metadata)), Some(&group_of(&metadata)))?;
        set_owner(&file, None, None)?;
        Ok(())
    }
}
