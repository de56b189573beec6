use crate::normalize::Recipe;
use crate::platform::Platform;
use crate::resolved::{ResolvedDependency, ResolvedOptions};
use crate::types::{PackageId, ShortId};
use crate::value::OptionValue;
use serde::Serialize;

/// Deterministic identity of one binary configuration of a package.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PackageIdentity {
    pub package_id: PackageId,
    pub short_id: ShortId,
}

/// Compute the package id from the resolved configuration.
///
/// Hashes the package reference, the values of the settings axes the recipe
/// declares, the resolved options, and the resolved dependency references in
/// declaration order. Store paths and undeclared settings never participate,
/// so the same configuration yields the same id on every machine.
pub fn compute_package_id(
    recipe: &Recipe,
    platform: &Platform,
    options: &ResolvedOptions,
    dependencies: &[ResolvedDependency],
) -> PackageIdentity {
    let declared = platform.restricted_to(&recipe.settings);
    let deps: Vec<String> = dependencies.iter().map(ResolvedDependency::reference).collect();
    hash_identity(
        &recipe.reference(),
        declared.settings().iter(),
        options.iter(),
        deps.iter().map(String::as_str),
    )
}

pub(crate) fn hash_identity<'a>(
    reference: &str,
    settings: impl Iterator<Item = (&'a String, &'a String)>,
    options: impl Iterator<Item = (&'a String, &'a OptionValue)>,
    dependencies: impl Iterator<Item = &'a str>,
) -> PackageIdentity {
    let mut hasher = blake3::Hasher::new();

    hasher.update(format!("ref:{reference}").as_bytes());

    for (axis, value) in settings {
        hasher.update(format!("setting:{axis}={value}").as_bytes());
    }
    for (name, value) in options {
        let encoded = match value {
            OptionValue::Bool(b) => format!("option:{name}=bool:{b}"),
            OptionValue::Str(s) => format!("option:{name}=str:{s}"),
        };
        hasher.update(encoded.as_bytes());
    }
    for dep in dependencies {
        hasher.update(format!("require:{dep}").as_bytes());
    }

    let package_id = PackageId::from_hash(&hasher.finalize());
    PackageIdentity {
        short_id: package_id.short(),
        package_id,
    }
}
