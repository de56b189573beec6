use crate::CoreError;
use kiln_schema::{
    BuildStep, OptionValue, Platform, Recipe, ResolvedDependency, ResolvedOptions, SourceSpec,
    ToolchainValue, VariableSource,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PREFIX_PATH_VARIABLE: &str = "CMAKE_PREFIX_PATH";

/// Configuration handed to the external build tool. Nothing here is executed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BuildPlan {
    pub generator: Option<String>,
    /// Portable cache variables. These are recorded in the lock file.
    pub cache_variables: BTreeMap<String, ToolchainValue>,
    /// Dependency package roots, in dependency order. Machine-specific, so kept
    /// apart from `cache_variables` and only rendered into command lines.
    pub prefix_paths: Vec<PathBuf>,
    pub steps: Vec<BuildStep>,
    pub source: Option<SourceSpec>,
}

/// One rendered step: the opaque identifier plus the argv to run for it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StepCommand {
    pub step: BuildStep,
    pub argv: Vec<String>,
}

/// Produce the cache variables and step sequence for a resolved configuration.
///
/// Implicit CMake variables are derived from the `build_type` setting and the
/// `shared` and `fPIC` options when those have values; variables declared in
/// the recipe take precedence. A declared variable that references an option
/// or setting without a value is a configuration error.
pub fn plan_build(
    recipe: &Recipe,
    platform: &Platform,
    options: &ResolvedOptions,
    dependencies: &[ResolvedDependency],
) -> Result<BuildPlan, CoreError> {
    let declared_settings = platform.restricted_to(&recipe.settings);
    let mut cache_variables = BTreeMap::new();

    if let Some(build_type) = declared_settings.get("build_type") {
        cache_variables.insert(
            "CMAKE_BUILD_TYPE".to_owned(),
            ToolchainValue::Str(build_type.to_owned()),
        );
    }
    for (option, variable) in [
        ("shared", "BUILD_SHARED_LIBS"),
        ("fPIC", "CMAKE_POSITION_INDEPENDENT_CODE"),
    ] {
        if let Some(value @ OptionValue::Bool(_)) = options.get(option) {
            cache_variables.insert(variable.to_owned(), ToolchainValue::from(value));
        }
    }

    for (name, source) in &recipe.toolchain.cache_variables {
        let value = match source {
            VariableSource::Literal(value) => value.clone(),
            VariableSource::Option(option) => {
                options
                    .get(option)
                    .map(ToolchainValue::from)
                    .ok_or_else(|| CoreError::Configuration {
                        variable: name.clone(),
                        reason: format!("option '{option}' has no value on {platform}"),
                    })?
            }
            VariableSource::Setting(setting) => declared_settings
                .get(setting)
                .map(|v| ToolchainValue::Str(v.to_owned()))
                .ok_or_else(|| CoreError::Configuration {
                    variable: name.clone(),
                    reason: format!("setting '{setting}' is not set"),
                })?,
        };
        debug!("cache variable {name}={value}");
        cache_variables.insert(name.clone(), value);
    }

    let mut steps = Vec::with_capacity(recipe.toolchain.steps.len() + 1);
    if recipe.source.is_some() {
        steps.push(BuildStep::Source);
    }
    steps.extend(recipe.toolchain.steps.iter().copied());

    Ok(BuildPlan {
        generator: recipe.toolchain.generator.clone(),
        cache_variables,
        prefix_paths: dependencies.iter().map(|d| d.root.clone()).collect(),
        steps,
        source: recipe.source.clone(),
    })
}

impl BuildPlan {
    /// Cache variables including `CMAKE_PREFIX_PATH`, unless the recipe
    /// declared its own.
    pub fn effective_cache_variables(&self) -> BTreeMap<String, ToolchainValue> {
        let mut vars = self.cache_variables.clone();
        if !self.prefix_paths.is_empty() && !vars.contains_key(PREFIX_PATH_VARIABLE) {
            let joined: Vec<String> = self
                .prefix_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            vars.insert(
                PREFIX_PATH_VARIABLE.to_owned(),
                ToolchainValue::Str(joined.join(";")),
            );
        }
        vars
    }

    /// Render every step as an argv for the external tools.
    pub fn command_lines(&self, source_dir: &Path, build_dir: &Path) -> Vec<StepCommand> {
        let src = source_dir.display().to_string();
        let build = build_dir.display().to_string();
        let mut commands = Vec::new();

        for step in &self.steps {
            match step {
                BuildStep::Source => {
                    let Some(source) = &self.source else {
                        continue;
                    };
                    commands.push(StepCommand {
                        step: *step,
                        argv: argv(&["git", "clone", &source.git, &src]),
                    });
                    if let Some(checkout) = &source.checkout {
                        commands.push(StepCommand {
                            step: *step,
                            argv: argv(&["git", "-C", &src, "checkout", checkout]),
                        });
                    }
                }
                BuildStep::Configure => {
                    let mut args = argv(&["cmake", "-S", &src, "-B", &build]);
                    for (name, value) in self.effective_cache_variables() {
                        args.push(format!("-D{name}={}", value.to_cmake()));
                    }
                    commands.push(StepCommand { step: *step, argv: args });
                }
                BuildStep::Build => {
                    let mut args = argv(&["cmake", "--build", &build]);
                    if let Some(ToolchainValue::Str(config)) =
                        self.cache_variables.get("CMAKE_BUILD_TYPE")
                    {
                        args.push("--config".to_owned());
                        args.push(config.clone());
                    }
                    commands.push(StepCommand { step: *step, argv: args });
                }
                BuildStep::Test => commands.push(StepCommand {
                    step: *step,
                    argv: argv(&["ctest", "--test-dir", &build, "--output-on-failure"]),
                }),
                BuildStep::Install => commands.push(StepCommand {
                    step: *step,
                    argv: argv(&["cmake", "--install", &build]),
                }),
            }
        }
        commands
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_owned()).collect()
}
