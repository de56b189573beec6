use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current store format version. Incremented on incompatible layout changes.
pub const STORE_FORMAT_VERSION: u32 = 1;
const VERSION_FILE: &str = "version";
const RECORD_FILE: &str = "package.toml";

/// Directory layout of a kiln package store.
///
/// ```text
/// <root>/store/version
/// <root>/store/.lock
/// <root>/packages/<name>/<version>/package.toml
/// ```
///
/// Directories are created lazily on [`initialize`](Self::initialize).
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreVersion {
    format_version: u32,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn store_dir(&self) -> PathBuf {
        self.root.join("store")
    }

    #[inline]
    pub fn packages_dir(&self) -> PathBuf {
        self.root.join("packages")
    }

    #[inline]
    pub fn package_versions_dir(&self, name: &str) -> PathBuf {
        self.packages_dir().join(name)
    }

    /// Root of one package version; handed to the build tool as a prefix path.
    #[inline]
    pub fn package_dir(&self, name: &str, version: &str) -> PathBuf {
        self.package_versions_dir(name).join(version)
    }

    #[inline]
    pub fn record_path(&self, name: &str, version: &str) -> PathBuf {
        self.package_dir(name, version).join(RECORD_FILE)
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.store_dir().join(".lock")
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.store_dir())?;
        fs::create_dir_all(self.packages_dir())?;

        let version_path = self.store_dir().join(VERSION_FILE);
        if version_path.exists() {
            self.verify_version()?;
        } else {
            let ver = StoreVersion {
                format_version: STORE_FORMAT_VERSION,
            };
            let content = serde_json::to_string_pretty(&ver)?;
            let store_dir = self.store_dir();
            let mut tmp = NamedTempFile::new_in(&store_dir)?;
            tmp.write_all(content.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&version_path)
                .map_err(|e| StoreError::Io(e.error))?;
            crate::fsync_dir(&store_dir)?;
        }

        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.store_dir().join(VERSION_FILE).exists()
    }

    pub fn verify_version(&self) -> Result<(), StoreError> {
        let version_path = self.store_dir().join(VERSION_FILE);
        let content = fs::read_to_string(&version_path)?;
        let ver: StoreVersion = serde_json::from_str(&content)?;

        if ver.format_version != STORE_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: STORE_FORMAT_VERSION,
                found: ver.format_version,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_are_correct() {
        let layout = StoreLayout::new("/tmp/kiln-test");
        assert_eq!(layout.store_dir(), PathBuf::from("/tmp/kiln-test/store"));
        assert_eq!(
            layout.packages_dir(),
            PathBuf::from("/tmp/kiln-test/packages")
        );
        assert_eq!(
            layout.package_dir("fmt", "9.1.0"),
            PathBuf::from("/tmp/kiln-test/packages/fmt/9.1.0")
        );
        assert_eq!(
            layout.record_path("fmt", "9.1.0"),
            PathBuf::from("/tmp/kiln-test/packages/fmt/9.1.0/package.toml")
        );
        assert_eq!(
            layout.lock_file(),
            PathBuf::from("/tmp/kiln-test/store/.lock")
        );
    }

    #[test]
    fn initialize_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        assert!(!layout.is_initialized());
        layout.initialize().unwrap();

        assert!(layout.store_dir().is_dir());
        assert!(layout.packages_dir().is_dir());
        assert!(layout.is_initialized());
    }

    #[test]
    fn initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        layout.initialize().unwrap();
        layout.verify_version().unwrap();
    }

    #[test]
    fn future_format_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        fs::write(
            layout.store_dir().join(VERSION_FILE),
            r#"{"format_version": 99}"#,
        )
        .unwrap();
        assert!(matches!(
            layout.verify_version(),
            Err(StoreError::VersionMismatch { found: 99, .. })
        ));
    }
}
