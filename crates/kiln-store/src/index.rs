use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use kiln_schema::PackageReference;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Record describing one installed package version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// package_id of the lock this package was built from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    #[serde(default)]
    pub libs: Vec<String>,
    #[serde(default)]
    pub include_dirs: Vec<String>,
    /// blake3 checksum over the record content. `None` for hand-written records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl PackageRecord {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_owned(),
            version: version.to_owned(),
            description: None,
            package_id: None,
            libs: Vec::new(),
            include_dirs: Vec::new(),
            checksum: None,
        }
    }

    pub fn reference(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }

    /// Check that name and version are safe to use as store path components.
    pub fn validate(&self) -> Result<(), StoreError> {
        validate_record(&self.name, &self.version)
    }

    fn compute_checksum(&self) -> Result<String, StoreError> {
        let mut copy = self.clone();
        copy.checksum = None;
        let json = serde_json::to_string(&copy)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

/// Name and version must form a valid exact reference; they become path components.
fn validate_record(name: &str, version: &str) -> Result<(), StoreError> {
    let raw = format!("{name}/{version}");
    let reference =
        PackageReference::parse(&raw).map_err(|e| StoreError::InvalidReference(e.to_string()))?;
    if version.starts_with('[') || version.contains(['/', '\\']) || version.starts_with('.') {
        return Err(StoreError::InvalidReference(format!(
            "'{reference}' is not an exact version"
        )));
    }
    Ok(())
}

/// Directory-backed index of package records under `packages/<name>/<version>/`.
pub struct PackageIndex {
    layout: StoreLayout,
}

impl PackageIndex {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn put(&self, record: &PackageRecord) -> Result<PathBuf, StoreError> {
        record.validate()?;
        let dir = self.layout.package_dir(&record.name, &record.version);
        fs::create_dir_all(&dir)?;

        let mut with_checksum = record.clone();
        with_checksum.checksum = Some(with_checksum.compute_checksum()?);
        let content = toml::to_string_pretty(&with_checksum)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.layout.record_path(&record.name, &record.version))
            .map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;

        tracing::debug!("recorded package {}", record.reference());
        Ok(dir)
    }

    pub fn get(&self, name: &str, version: &str) -> Result<PackageRecord, StoreError> {
        let path = self.layout.record_path(name, version);
        if !path.exists() {
            return Err(StoreError::PackageNotFound(format!("{name}/{version}")));
        }
        let content = fs::read_to_string(&path)?;
        let record: PackageRecord = toml::from_str(&content)?;

        if let Some(ref expected) = record.checksum {
            let actual = record.compute_checksum()?;
            if actual != *expected {
                return Err(StoreError::IntegrityFailure {
                    name: record.reference(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(record)
    }

    pub fn exists(&self, name: &str, version: &str) -> bool {
        self.layout.record_path(name, version).is_file()
    }

    /// Remove a package version and its directory. Removing the last version
    /// also removes the package directory.
    pub fn remove(&self, name: &str, version: &str) -> Result<(), StoreError> {
        validate_record(name, version)?;
        if !self.exists(name, version) {
            return Err(StoreError::PackageNotFound(format!("{name}/{version}")));
        }
        fs::remove_dir_all(self.layout.package_dir(name, version))?;
        let versions_dir = self.layout.package_versions_dir(name);
        if fs::read_dir(&versions_dir)?.next().is_none() {
            fs::remove_dir(&versions_dir)?;
        }
        Ok(())
    }

    /// Versions of `name` that carry a record, sorted lexically.
    pub fn versions(&self, name: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.layout.package_versions_dir(name);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(version) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if self.exists(name, &version) {
                versions.push(version);
            }
        }
        versions.sort();
        Ok(versions)
    }

    pub fn list(&self) -> Result<Vec<PackageRecord>, StoreError> {
        let dir = self.layout.packages_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            for version in self.versions(name)? {
                match self.get(name, &version) {
                    Ok(record) => results.push(record),
                    Err(e) => {
                        tracing::warn!("skipping corrupted package record '{name}/{version}': {e}");
                    }
                }
            }
        }
        results.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
        Ok(results)
    }
}
