//! Values produced by resolution and consumed by later pipeline stages,
//! identity hashing, and the lock file.

use crate::normalize::{BuildStep, ToolchainValue};
use crate::platform::Platform;
use crate::value::OptionValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Effective option values for one platform. Options removed for the platform
/// are absent, never present with a placeholder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedOptions(BTreeMap<String, OptionValue>);

impl ResolvedOptions {
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, OptionValue> {
        &self.0
    }
}

impl From<BTreeMap<String, OptionValue>> for ResolvedOptions {
    fn from(map: BTreeMap<String, OptionValue>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, OptionValue)> for ResolvedOptions {
    fn from_iter<I: IntoIterator<Item = (String, OptionValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A requirement located in a package store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub name: String,
    pub version: String,
    /// Constraint as declared in the recipe.
    pub constraint: String,
    /// Package root inside the store. Machine-specific; never hashed.
    pub root: PathBuf,
}

impl ResolvedDependency {
    pub fn reference(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}

/// Everything the pipeline resolved for one run, in the shape the lock file records.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub platform: Platform,
    pub options: ResolvedOptions,
    pub dependencies: Vec<ResolvedDependency>,
    pub cache_variables: BTreeMap<String, ToolchainValue>,
    pub steps: Vec<BuildStep>,
}
