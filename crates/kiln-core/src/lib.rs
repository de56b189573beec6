//! Resolution pipeline for kiln recipes.
//!
//! This crate turns a validated `Recipe` plus a target `Platform` into
//! everything an external build tool needs: effective option values
//! (`options`), the ordered dependency set (`deps`), cache variables and build
//! steps (`toolchain`), and the mapping of build outputs into the package tree
//! (`layout`). The `Engine` chains the stages for a recipe file and maintains
//! its `kiln.lock`.

pub mod config;
pub mod deps;
pub mod engine;
pub mod layout;
pub mod options;
pub mod toolchain;

pub use config::KilnConfig;
pub use deps::{plan_dependencies, select_requirements};
pub use engine::{lock_path_for, Engine, PlanRequest, PlanResult, LOCK_FILE_NAME};
pub use layout::{collect_outputs, plan_layout, BuildOutput, FileKind, LayoutPlan, Placement};
pub use options::{removed_options, resolve_options};
pub use toolchain::{plan_build, BuildPlan, StepCommand};

use kiln_schema::Platform;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("recipe error: {0}")]
    Recipe(#[from] kiln_schema::RecipeError),
    #[error("lock error: {0}")]
    Lock(#[from] kiln_schema::LockError),
    #[error("store error: {0}")]
    Store(#[from] kiln_store::StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid option '{option}': {reason}")]
    InvalidOption { option: String, reason: String },
    #[error("unresolved requirement '{reference}': not found in {source_name} package source")]
    UnresolvedRequirement {
        reference: String,
        source_name: String,
    },
    #[error("cannot configure '{variable}': {reason}")]
    Configuration { variable: String, reason: String },
    #[error("config error: {0}")]
    UserConfig(String),
    #[error("{package} [{platform}]: {source}")]
    Context {
        package: String,
        platform: Platform,
        #[source]
        source: Box<CoreError>,
    },
}

impl CoreError {
    pub(crate) fn in_context(self, package: &str, platform: &Platform) -> Self {
        match self {
            already @ CoreError::Context { .. } => already,
            other => CoreError::Context {
                package: package.to_owned(),
                platform: platform.clone(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through any diagnostic context.
    pub fn root(&self) -> &CoreError {
        match self {
            CoreError::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_wraps_once_and_exposes_root() {
        let platform = Platform::new().with("os", "Windows");
        let err = CoreError::InvalidOption {
            option: "fPIC".to_owned(),
            reason: "unknown option".to_owned(),
        }
        .in_context("matrixlib/0.0.3", &platform)
        .in_context("other/1.0", &platform);

        let msg = err.to_string();
        assert!(msg.starts_with("matrixlib/0.0.3 [os=Windows]"), "{msg}");
        assert!(matches!(err.root(), CoreError::InvalidOption { .. }));
    }
}
