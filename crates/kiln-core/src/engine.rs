use crate::deps::plan_dependencies;
use crate::layout::{collect_outputs, plan_layout, BuildOutput, LayoutPlan};
use crate::options::resolve_options;
use crate::toolchain::{plan_build, BuildPlan};
use crate::CoreError;
use kiln_schema::{
    compute_package_id, parse_recipe_file, LockFile, PackageIdentity, Platform, Recipe,
    Resolution, ResolvedDependency, ResolvedOptions,
};
use kiln_store::{PackageIndex, PackageSource, StoreLayout};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const LOCK_FILE_NAME: &str = "kiln.lock";

/// Runs the resolution pipeline against an injected package source.
pub struct Engine {
    source: Box<dyn PackageSource>,
}

/// Inputs of one resolution run besides the recipe itself.
#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    pub platform: Platform,
    /// Raw `option -> value` overrides.
    pub overrides: BTreeMap<String, String>,
    /// Refuse to proceed when the fresh plan differs from the existing lock.
    pub locked: bool,
    /// Write `kiln.lock` next to the recipe after a successful run.
    pub write_lock: bool,
}

/// Everything resolved for one recipe and platform.
#[derive(Debug, Clone)]
pub struct PlanResult {
    pub recipe: Recipe,
    pub platform: Platform,
    pub options: ResolvedOptions,
    pub dependencies: Vec<ResolvedDependency>,
    pub build: BuildPlan,
    pub identity: PackageIdentity,
    pub lock_file: LockFile,
}

impl PlanResult {
    /// Ordered `(name, constraint)` pairs of the selected requirements.
    pub fn dependency_pairs(&self) -> Vec<(String, String)> {
        self.dependencies
            .iter()
            .map(|d| (d.name.clone(), d.constraint.clone()))
            .collect()
    }
}

/// `kiln.lock` path for a recipe file.
pub fn lock_path_for(recipe_path: &Path) -> PathBuf {
    recipe_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .join(LOCK_FILE_NAME)
}

impl Engine {
    pub fn new(source: Box<dyn PackageSource>) -> Self {
        Self { source }
    }

    /// Engine backed by the local package store at `store_root`. Lookups never
    /// create the store; a missing store has no packages.
    pub fn with_store(store_root: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let layout = StoreLayout::new(store_root);
        if layout.is_initialized() {
            layout.verify_version()?;
        } else {
            debug!("no package store at {}", layout.root().display());
        }
        Ok(Self::new(Box::new(PackageIndex::new(layout))))
    }

    pub fn source(&self) -> &dyn PackageSource {
        self.source.as_ref()
    }

    pub fn load_recipe(recipe_path: &Path) -> Result<Recipe, CoreError> {
        debug!("loading recipe {}", recipe_path.display());
        let raw = parse_recipe_file(recipe_path)?;
        Ok(raw.normalize()?)
    }

    /// Resolve options, dependencies, and the build plan for an already
    /// loaded recipe. Does not touch the lock file.
    pub fn resolve(&self, recipe: &Recipe, request: &PlanRequest) -> Result<PlanResult, CoreError> {
        let reference = recipe.reference();
        let platform = &request.platform;
        self.resolve_stages(recipe, request)
            .map_err(|e| e.in_context(&reference, platform))
    }

    fn resolve_stages(&self, recipe: &Recipe, request: &PlanRequest) -> Result<PlanResult, CoreError> {
        let platform = &request.platform;
        info!("resolving {} for {platform}", recipe.reference());

        let options = resolve_options(recipe, platform, &request.overrides)?;
        info!("resolved {} option(s)", options.len());

        let dependencies = plan_dependencies(recipe, &options, self.source.as_ref())?;
        info!(
            "resolved {} dependenc{} from {} source",
            dependencies.len(),
            if dependencies.len() == 1 { "y" } else { "ies" },
            self.source.name()
        );

        let build = plan_build(recipe, platform, &options, &dependencies)?;
        info!(
            "build plan: {} cache variable(s), {} step(s)",
            build.cache_variables.len(),
            build.steps.len()
        );

        let identity = compute_package_id(recipe, platform, &options, &dependencies);
        let resolution = Resolution {
            platform: platform.clone(),
            options: options.clone(),
            dependencies: dependencies.clone(),
            cache_variables: build.cache_variables.clone(),
            steps: build.steps.clone(),
        };
        let lock_file = LockFile::from_resolved(recipe, &resolution)?;
        debug!("package id {}", identity.package_id);

        Ok(PlanResult {
            recipe: recipe.clone(),
            platform: platform.clone(),
            options,
            dependencies,
            build,
            identity,
            lock_file,
        })
    }

    /// Run the full pipeline for a recipe file and maintain its lock.
    pub fn plan(&self, recipe_path: &Path, request: &PlanRequest) -> Result<PlanResult, CoreError> {
        let recipe = Self::load_recipe(recipe_path)?;
        let result = self.resolve(&recipe, request)?;
        let lock_path = lock_path_for(recipe_path);

        if request.locked {
            let existing = LockFile::read_from_file(&lock_path)?;
            existing.verify_integrity()?;
            existing.verify_recipe_intent(&recipe)?;
            existing.verify_matches(&result.lock_file)?;
            info!("plan matches {}", lock_path.display());
        } else if request.write_lock {
            result.lock_file.write_to_file(&lock_path)?;
            info!("wrote {}", lock_path.display());
        }

        Ok(result)
    }

    /// Map the files under `build_dir` into the recipe's package layout.
    pub fn layout(recipe: &Recipe, build_dir: &Path) -> Result<LayoutPlan, CoreError> {
        let outputs: Vec<BuildOutput> = collect_outputs(build_dir)?;
        info!(
            "found {} build output(s) under {}",
            outputs.len(),
            build_dir.display()
        );
        plan_layout(&outputs, &recipe.install)
    }

    /// Lay out and copy the build outputs into `package_dir`.
    pub fn package(
        recipe: &Recipe,
        build_dir: &Path,
        package_dir: &Path,
    ) -> Result<(LayoutPlan, usize), CoreError> {
        let plan = Self::layout(recipe, build_dir)?;
        let copied = plan.apply(build_dir, package_dir)?;
        info!("packaged {copied} file(s) into {}", package_dir.display());
        Ok((plan, copied))
    }
}
