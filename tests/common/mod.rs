#![allow(dead_code)]

use anyhow::Result;
use assert_cmd::Command;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const HOST: &str = "box.example.com";

/// A target tree and a repository for driving the binary
pub struct TestCage {
    pub temp_dir: TempDir,
    pub target: PathBuf,
    pub repo: PathBuf,
    pub manifest: PathBuf,
}

impl TestCage {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let target = temp_dir.path().join("target");
        let repo = temp_dir.path().join("repo");
        fs::create_dir_all(&target)?;
        fs::create_dir_all(&repo)?;
        let manifest = repo.join("hamstercage.yaml");
        Ok(Self {
            temp_dir,
            target,
            repo,
            manifest,
        })
    }

    /// Fixture with an initialized manifest
    pub fn initialized() -> Result<Self> {
        let cage = Self::new()?;
        cage.cmd().arg("init").assert().success();
        Ok(cage)
    }

    /// The binary, pointed at this fixture through the environment
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("hamstercage").unwrap();
        cmd.env("HAMSTERCAGE_TARGET", &self.target)
            .env("HAMSTERCAGE_MANIFEST", &self.manifest)
            .env("HAMSTERCAGE_HOSTNAME", HOST)
            .env("NO_COLOR", "1")
            .env_remove("HAMSTERCAGE_REPO")
            .env_remove("RUST_LOG");
        cmd
    }

    pub fn write_manifest(&self, yaml: &str) -> Result<()> {
        fs::write(&self.manifest, yaml)?;
        Ok(())
    }

    pub fn read_manifest(&self) -> Result<String> {
        Ok(fs::read_to_string(&self.manifest)?)
    }

    /// Write a target file with mode 0644
    pub fn write_target(&self, path: &str, content: &str) -> Result<PathBuf> {
        let full = self.target.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, content)?;
        fs::set_permissions(&full, fs::Permissions::from_mode(0o644))?;
        Ok(full)
    }

    pub fn read_target(&self, path: &str) -> Result<String> {
        Ok(fs::read_to_string(self.target.join(path))?)
    }

    pub fn blob(&self, tag: &str, path: &str) -> PathBuf {
        self.repo.join("tags").join(tag).join(path)
    }

    pub fn mode_of(&self, path: &str) -> Result<u32> {
        Ok(fs::metadata(self.target.join(path))?.permissions().mode() & 0o7777)
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}
