//! Recipe parsing, validation, platform profiles, package identity, and lock files for kiln.
//!
//! This crate defines the schema layer: TOML recipe parsing (`RecipeV1`), the
//! validated immutable `Recipe`, option values and domains, requirement
//! conditions, target platforms and built-in profiles, deterministic package
//! identity (`compute_package_id`), and lock file generation/verification
//! (`LockFile`).

pub mod condition;
pub mod identity;
pub mod lock;
pub mod manifest;
pub mod normalize;
pub mod platform;
pub mod profile;
pub mod reference;
pub mod resolved;
pub mod template;
pub mod types;
pub mod value;

pub use condition::Condition;
pub use identity::{compute_package_id, PackageIdentity};
pub use lock::{LockError, LockFile, LockedDependency, LOCK_VERSION};
pub use manifest::{parse_recipe_file, parse_recipe_str, RecipeError, RecipeV1};
pub use normalize::{
    ApplicabilityRule, BuildStep, InstallRule, PackageInfo, Recipe, Requirement, SourceSpec,
    Toolchain, ToolchainValue, VariableSource,
};
pub use platform::{parse_assignment, Platform};
pub use profile::{
    get_builtin_profile, list_builtin_profiles, resolve_profile, BuiltinProfile, Profile,
    BUILTIN_PROFILES,
};
pub use reference::{PackageReference, VersionConstraint};
pub use resolved::{Resolution, ResolvedDependency, ResolvedOptions};
pub use template::{get_template, list_templates, Template, BUILTIN_TEMPLATES};
pub use types::{PackageId, RecipeDigest, ShortId};
pub use value::{OptionDomain, OptionValue};
