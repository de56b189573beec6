use crate::identity::{hash_identity, PackageIdentity};
use crate::manifest::RecipeError;
use crate::normalize::{BuildStep, PackageInfo, Recipe, ToolchainValue};
use crate::resolved::Resolution;
use crate::value::OptionValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const LOCK_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("recipe error: {0}")]
    Recipe(#[from] RecipeError),
    #[error("lock file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("lock file parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("lock file serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("recipe digest error: {0}")]
    Digest(#[from] serde_json::Error),
    #[error("unsupported lock_version {0}, expected {LOCK_VERSION}")]
    UnsupportedVersion(u32),
    #[error("lock file package_id mismatch: lock has '{lock_id}', recomputed '{computed_id}'")]
    PackageIdMismatch {
        lock_id: String,
        computed_id: String,
    },
    #[error("lock file drift: {0}")]
    Drift(String),
}

/// A dependency as pinned in the lock file. Store paths are deliberately absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockedDependency {
    pub name: String,
    pub version: String,
}

impl LockedDependency {
    pub fn reference(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}

/// Fully resolved build configuration of a recipe for one platform.
///
/// The package_id is computed from the locked fields, so the same lock file
/// always describes the same binary package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockFile {
    pub lock_version: u32,
    pub package_id: String,
    pub short_id: String,
    pub reference: String,
    pub recipe_digest: String,

    /// Values of the settings axes the recipe declares.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,
    /// In declaration order.
    #[serde(default)]
    pub dependencies: Vec<LockedDependency>,

    #[serde(default)]
    pub cache_variables: BTreeMap<String, ToolchainValue>,
    #[serde(default)]
    pub steps: Vec<BuildStep>,

    #[serde(default)]
    pub package_info: PackageInfo,
}

impl LockFile {
    pub fn from_resolved(recipe: &Recipe, resolution: &Resolution) -> Result<Self, LockError> {
        let lock = LockFile {
            lock_version: LOCK_VERSION,
            package_id: String::new(), // computed below
            short_id: String::new(),
            reference: recipe.reference(),
            recipe_digest: recipe.digest()?.into_inner(),
            settings: resolution
                .platform
                .restricted_to(&recipe.settings)
                .settings()
                .clone(),
            options: resolution.options.as_map().clone(),
            dependencies: resolution
                .dependencies
                .iter()
                .map(|d| LockedDependency {
                    name: d.name.clone(),
                    version: d.version.clone(),
                })
                .collect(),
            cache_variables: resolution.cache_variables.clone(),
            steps: resolution.steps.clone(),
            package_info: recipe.package_info.clone(),
        };

        let identity = lock.compute_identity();
        Ok(LockFile {
            package_id: identity.package_id.into_inner(),
            short_id: identity.short_id.into_inner(),
            ..lock
        })
    }

    /// Recompute the package identity from the locked fields. Matches
    /// [`compute_package_id`](crate::compute_package_id) for the same inputs.
    pub fn compute_identity(&self) -> PackageIdentity {
        let deps: Vec<String> = self
            .dependencies
            .iter()
            .map(LockedDependency::reference)
            .collect();
        hash_identity(
            &self.reference,
            self.settings.iter(),
            self.options.iter(),
            deps.iter().map(String::as_str),
        )
    }

    /// Check that the stored package_id matches the locked content.
    pub fn verify_integrity(&self) -> Result<PackageIdentity, LockError> {
        if self.lock_version != LOCK_VERSION {
            return Err(LockError::UnsupportedVersion(self.lock_version));
        }
        let identity = self.compute_identity();
        if self.package_id != identity.package_id.as_str() {
            return Err(LockError::PackageIdMismatch {
                lock_id: self.package_id.clone(),
                computed_id: identity.package_id.into_inner(),
            });
        }
        Ok(identity)
    }

    /// Check that the recipe still says what it said when the lock was written.
    pub fn verify_recipe_intent(&self, recipe: &Recipe) -> Result<(), LockError> {
        if self.reference != recipe.reference() {
            return Err(LockError::Drift(format!(
                "package changed: lock has '{}', recipe has '{}'",
                self.reference,
                recipe.reference()
            )));
        }
        let digest = recipe.digest()?;
        if self.recipe_digest != digest.as_str() {
            return Err(LockError::Drift(
                "recipe content changed since the lock was written. Run 'kiln lock' to re-resolve."
                    .to_owned(),
            ));
        }
        Ok(())
    }

    /// Compare a freshly resolved lock against this one.
    pub fn verify_matches(&self, fresh: &LockFile) -> Result<(), LockError> {
        if self.package_id == fresh.package_id
            && self.cache_variables == fresh.cache_variables
            && self.steps == fresh.steps
        {
            return Ok(());
        }
        let mut reasons = Vec::new();
        if self.settings != fresh.settings {
            reasons.push("settings");
        }
        if self.options != fresh.options {
            reasons.push("options");
        }
        if self.dependencies != fresh.dependencies {
            reasons.push("dependencies");
        }
        if self.cache_variables != fresh.cache_variables {
            reasons.push("cache variables");
        }
        if self.steps != fresh.steps {
            reasons.push("build steps");
        }
        Err(LockError::Drift(format!(
            "resolved plan differs from lock ({})",
            reasons.join(", ")
        )))
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), LockError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| LockError::Io(e.error))?;
        // Fsync parent directory so the rename survives power loss.
        if let Ok(f) = fs::File::open(dir) {
            let _ = f.sync_all();
        }
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::compute_package_id;
    use crate::manifest::parse_recipe_str;
    use crate::platform::Platform;
    use crate::resolved::{ResolvedDependency, ResolvedOptions};
    use std::path::PathBuf;

    fn sample_recipe() -> Recipe {
        parse_recipe_str(
            r#"
recipe_version = 1
settings = ["os", "build_type"]
[package]
name = "matrixlib"
version = "0.0.3"
[options]
shared = [true, false]
[default_options]
shared = false
[[requires]]
reference = "fmt/9.1.0"
[package_info]
libs = ["matrixlib"]
"#,
        )
        .unwrap()
        .normalize()
        .unwrap()
    }

    fn sample_resolution() -> Resolution {
        let options: ResolvedOptions = [("shared".to_owned(), OptionValue::Bool(false))]
            .into_iter()
            .collect();
        let mut cache_variables = BTreeMap::new();
        cache_variables.insert("BUILD_SHARED_LIBS".to_owned(), ToolchainValue::Bool(false));
        Resolution {
            platform: Platform::new()
                .with("os", "Linux")
                .with("build_type", "Release")
                .with("compiler", "gcc"),
            options,
            dependencies: vec![ResolvedDependency {
                name: "fmt".to_owned(),
                version: "9.1.0".to_owned(),
                constraint: "9.1.0".to_owned(),
                root: PathBuf::from("/store/packages/fmt/9.1.0"),
            }],
            cache_variables,
            steps: vec![BuildStep::Configure, BuildStep::Build],
        }
    }

    #[test]
    fn lock_roundtrip() {
        let lock = LockFile::from_resolved(&sample_recipe(), &sample_resolution()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.lock");

        lock.write_to_file(&path).unwrap();
        let loaded = LockFile::read_from_file(&path).unwrap();
        assert_eq!(lock, loaded);
        assert!(!loaded.settings.contains_key("compiler"));
    }

    #[test]
    fn lock_identity_matches_direct_computation() {
        let recipe = sample_recipe();
        let resolution = sample_resolution();
        let lock = LockFile::from_resolved(&recipe, &resolution).unwrap();
        let direct = compute_package_id(
            &recipe,
            &resolution.platform,
            &resolution.options,
            &resolution.dependencies,
        );
        assert_eq!(lock.package_id, direct.package_id.as_str());
        assert_eq!(lock.verify_integrity().unwrap(), direct);
    }

    #[test]
    fn tampered_lock_fails_integrity() {
        let mut lock = LockFile::from_resolved(&sample_recipe(), &sample_resolution()).unwrap();
        lock.dependencies[0].version = "10.0.0".to_owned();
        assert!(matches!(
            lock.verify_integrity(),
            Err(LockError::PackageIdMismatch { .. })
        ));
    }

    #[test]
    fn recipe_change_is_detected_as_drift() {
        let lock = LockFile::from_resolved(&sample_recipe(), &sample_resolution()).unwrap();
        assert!(lock.verify_recipe_intent(&sample_recipe()).is_ok());

        let mut changed = sample_recipe();
        changed.package_info.libs.push("matrixlib_extra".to_owned());
        assert!(matches!(
            lock.verify_recipe_intent(&changed),
            Err(LockError::Drift(_))
        ));
    }

    #[test]
    fn verify_matches_names_differing_parts() {
        let recipe = sample_recipe();
        let lock = LockFile::from_resolved(&recipe, &sample_resolution()).unwrap();

        let mut resolution = sample_resolution();
        resolution.options = [("shared".to_owned(), OptionValue::Bool(true))]
            .into_iter()
            .collect();
        let fresh = LockFile::from_resolved(&recipe, &resolution).unwrap();

        let err = lock.verify_matches(&fresh).unwrap_err().to_string();
        assert!(err.contains("options"), "{err}");
        assert!(lock.verify_matches(&lock.clone()).is_ok());
    }
}
