pub mod fixtures {
    use crate::CageContext;
    use crate::manifest::Manifest;
    use crate::sync::SyncEngine;
    use crate::utils::permissions::FilePermissions;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    pub const TEST_HOST: &str = "test.example.com";

    /// A target tree and a repository in one temporary directory
    pub struct TestCage {
        pub temp_dir: TempDir,
        pub target: PathBuf,
        pub repo: PathBuf,
        pub manifest_path: PathBuf,
        pub ctx: CageContext,
    }

    impl TestCage {
        pub fn new() -> Self {
            let temp_dir = tempfile::tempdir().unwrap();
            let target = temp_dir.path().join("target");
            let repo = temp_dir.path().join("repo");
            fs::create_dir_all(&target).unwrap();
            fs::create_dir_all(&repo).unwrap();
            let manifest_path = repo.join(crate::DEFAULT_MANIFEST_FILE);

            let ctx = CageContext::new(
                target.clone(),
                manifest_path.clone(),
                None,
                Some(TEST_HOST.to_string()),
            )
            .unwrap();

            Self {
                temp_dir,
                target,
                repo,
                manifest_path,
                ctx,
            }
        }

        /// Fixture whose manifest file holds `yaml`
        pub fn with_manifest(yaml: &str) -> Self {
            let cage = Self::new();
            fs::write(&cage.manifest_path, yaml).unwrap();
            cage
        }

        pub fn manifest(&self) -> Manifest {
            Manifest::load(&self.manifest_path).unwrap()
        }

        pub fn engine(&self) -> SyncEngine<'_> {
            SyncEngine::new(&self.ctx)
        }

        pub fn with_tags(mut self, tags: &[&str]) -> Self {
            self.ctx.tags = tags.iter().map(|t| (*t).to_string()).collect();
            self
        }

        /// Write a target file with mode 0644
        pub fn write_target(&self, path: &str, content: &str) -> PathBuf {
            let full = self.target.join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&full, content).unwrap();
            self.set_mode(path, 0o644);
            full
        }

        pub fn write_blob(&self, tag: &str, path: &str, content: &str) -> PathBuf {
            let full = self.ctx.blob_path(tag, path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&full, content).unwrap();
            full
        }

        pub fn read_target(&self, path: &str) -> String {
            fs::read_to_string(self.target.join(path)).unwrap()
        }

        pub fn read_blob(&self, tag: &str, path: &str) -> String {
            fs::read_to_string(self.ctx.blob_path(tag, path)).unwrap()
        }

        pub fn blob_exists(&self, tag: &str, path: &str) -> bool {
            self.ctx.blob_path(tag, path).exists()
        }

        pub fn set_mode(&self, path: &str, mode: u32) {
            FilePermissions::from_mode(mode)
                .apply_to_path(&self.target.join(path))
                .unwrap();
        }

        pub fn mode_of(&self, path: &str) -> u32 {
            FilePermissions::from_path(&self.target.join(path))
                .unwrap()
                .mode()
        }

        pub fn path(&self) -> &Path {
            self.temp_dir.path()
        }
    }

    impl Default for TestCage {
        fn default() -> Self {
            Self::new()
        }
    }
}
