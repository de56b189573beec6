use crate::index::PackageIndex;
use crate::StoreError;
use kiln_schema::reference::parse_lenient;
use kiln_schema::{PackageReference, ResolvedDependency, VersionConstraint};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Mutex;

/// Lookup capability handed to the dependency planner.
///
/// Implementations only answer "which versions of this package exist and
/// where do they live". Version selection is shared in [`locate`](Self::locate).
pub trait PackageSource: Send + Sync {
    fn name(&self) -> &str;

    /// Every available version of `package`, in any order.
    fn versions(&self, package: &str) -> Result<Vec<String>, StoreError>;

    /// Root directory of an available package version.
    fn package_root(&self, package: &str, version: &str) -> PathBuf;

    /// Find the best available version satisfying `reference`: the exact
    /// version for exact constraints, the highest matching one for ranges.
    fn locate(
        &self,
        reference: &PackageReference,
    ) -> Result<Option<ResolvedDependency>, StoreError> {
        let available = self.versions(&reference.name)?;
        let Some(version) = select_version(&reference.constraint, &available) else {
            return Ok(None);
        };
        Ok(Some(ResolvedDependency {
            name: reference.name.clone(),
            root: self.package_root(&reference.name, &version),
            version,
            constraint: reference.constraint.to_string(),
        }))
    }
}

/// Pick the version to use for `constraint` out of `available`.
pub fn select_version(constraint: &VersionConstraint, available: &[String]) -> Option<String> {
    match constraint {
        VersionConstraint::Exact(v) => available.iter().find(|a| *a == v).cloned(),
        VersionConstraint::Range { .. } => available
            .iter()
            .filter(|a| constraint.matches(a))
            .filter_map(|a| parse_lenient(a).map(|parsed| (parsed, a)))
            .max_by(|(x, _), (y, _)| x.cmp(y))
            .map(|(_, a)| a.clone()),
    }
}

impl PackageSource for PackageIndex {
    fn name(&self) -> &'static str {
        "local"
    }

    fn versions(&self, package: &str) -> Result<Vec<String>, StoreError> {
        PackageIndex::versions(self, package)
    }

    fn package_root(&self, package: &str, version: &str) -> PathBuf {
        self.layout().package_dir(package, version)
    }
}

/// In-memory package source. Package roots are synthetic paths under `root`.
pub struct MemorySource {
    root: PathBuf,
    packages: Mutex<BTreeMap<String, BTreeSet<String>>>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/memory"),
            packages: Mutex::new(BTreeMap::new()),
        }
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source pre-populated from `name/version` references.
    pub fn with_packages<'a>(references: impl IntoIterator<Item = &'a str>) -> Self {
        let source = Self::new();
        for reference in references {
            if let Some((name, version)) = reference.split_once('/') {
                source.insert(name, version);
            }
        }
        source
    }

    pub fn insert(&self, name: &str, version: &str) {
        let mut packages = self
            .packages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        packages
            .entry(name.to_owned())
            .or_default()
            .insert(version.to_owned());
    }
}

impl PackageSource for MemorySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn versions(&self, package: &str) -> Result<Vec<String>, StoreError> {
        let packages = self
            .packages
            .lock()
            .map_err(|e| StoreError::LockFailed(format!("memory source poisoned: {e}")))?;
        Ok(packages
            .get(package)
            .map(|v| v.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn package_root(&self, package: &str, version: &str) -> PathBuf {
        self.root.join(package).join(version)
    }
}
