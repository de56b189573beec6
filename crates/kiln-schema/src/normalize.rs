use crate::condition::Condition;
use crate::manifest::{
    validate_package_name, validate_package_version, RawOptionDomain, RawVariable, RecipeError,
    RecipeV1,
};
use crate::platform::Platform;
use crate::reference::PackageReference;
use crate::types::RecipeDigest;
use crate::value::{OptionDomain, OptionValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Validated, immutable recipe. Produced by [`RecipeV1::normalize`] or built
/// directly in code and checked with [`Recipe::validate`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipe {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub license: Option<String>,
    pub settings: BTreeSet<String>,
    pub source: Option<SourceSpec>,
    pub options: BTreeMap<String, OptionDomain>,
    pub default_options: BTreeMap<String, OptionValue>,
    pub option_rules: Vec<ApplicabilityRule>,
    pub requires: Vec<Requirement>,
    pub toolchain: Toolchain,
    pub install: Vec<InstallRule>,
    pub package_info: PackageInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceSpec {
    pub git: String,
    pub checkout: Option<String>,
}

/// Removes `option` on platforms where every `remove_when` setting matches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicabilityRule {
    pub option: String,
    pub remove_when: BTreeMap<String, String>,
}

impl ApplicabilityRule {
    pub fn excludes(&self, platform: &Platform) -> bool {
        self.remove_when
            .iter()
            .all(|(axis, value)| platform.get(axis) == Some(value.as_str()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Requirement {
    pub reference: PackageReference,
    pub condition: Condition,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.condition.is_unconditional() {
            write!(f, "{}", self.reference)
        } else {
            write!(f, "{} if {}", self.reference, self.condition)
        }
    }
}

/// Opaque build step identifiers handed to the external build tool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BuildStep {
    Source,
    Configure,
    Build,
    Test,
    Install,
}

impl BuildStep {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildStep::Source => "source",
            BuildStep::Configure => "configure",
            BuildStep::Build => "build",
            BuildStep::Test => "test",
            BuildStep::Install => "install",
        }
    }

    fn parse_declared(raw: &str) -> Result<Self, RecipeError> {
        match raw.trim() {
            "configure" => Ok(BuildStep::Configure),
            "build" => Ok(BuildStep::Build),
            "test" => Ok(BuildStep::Test),
            "install" => Ok(BuildStep::Install),
            other => Err(RecipeError::InvalidStep(other.to_owned())),
        }
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a toolchain cache variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(untagged)]
pub enum ToolchainValue {
    Bool(bool),
    Str(String),
}

impl ToolchainValue {
    /// CMake spelling: booleans become `ON`/`OFF`.
    pub fn to_cmake(&self) -> String {
        match self {
            ToolchainValue::Bool(true) => "ON".to_owned(),
            ToolchainValue::Bool(false) => "OFF".to_owned(),
            ToolchainValue::Str(s) => s.clone(),
        }
    }
}

impl From<&OptionValue> for ToolchainValue {
    fn from(value: &OptionValue) -> Self {
        match value {
            OptionValue::Bool(b) => ToolchainValue::Bool(*b),
            OptionValue::Str(s) => ToolchainValue::Str(s.clone()),
        }
    }
}

impl fmt::Display for ToolchainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolchainValue::Bool(b) => write!(f, "{b}"),
            ToolchainValue::Str(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VariableSource {
    Literal(ToolchainValue),
    Option(String),
    Setting(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Toolchain {
    pub generator: Option<String>,
    pub steps: Vec<BuildStep>,
    pub cache_variables: BTreeMap<String, VariableSource>,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            generator: None,
            steps: vec![BuildStep::Configure, BuildStep::Build],
            cache_variables: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallRule {
    /// Glob matched against the output path relative to `src`.
    pub pattern: String,
    pub dst: String,
    pub src: Option<String>,
    /// `false` flattens the relative directory structure.
    pub keep_path: bool,
}

impl InstallRule {
    pub fn new(pattern: &str, dst: &str) -> Self {
        Self {
            pattern: pattern.to_owned(),
            dst: dst.to_owned(),
            src: None,
            keep_path: true,
        }
    }

    #[must_use]
    pub fn flatten(mut self) -> Self {
        self.keep_path = false;
        self
    }

    #[must_use]
    pub fn from_dir(mut self, src: &str) -> Self {
        self.src = Some(src.to_owned());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageInfo {
    pub libs: Vec<String>,
    pub include_dirs: Vec<String>,
}

impl RecipeV1 {
    /// Normalize the recipe: check the version, convert raw sections to typed
    /// values, trim strings, and validate cross-references.
    pub fn normalize(&self) -> Result<Recipe, RecipeError> {
        if self.recipe_version != 1 {
            return Err(RecipeError::UnsupportedVersion(self.recipe_version));
        }

        let mut options = BTreeMap::new();
        for (name, raw) in &self.options {
            let domain = match raw {
                RawOptionDomain::Keyword(k) if k == "ANY" => OptionDomain::Any,
                RawOptionDomain::Keyword(k) => {
                    return Err(RecipeError::InvalidDomain {
                        option: name.clone(),
                        reason: format!("unknown keyword '{k}' (expected \"ANY\" or a list)"),
                    })
                }
                RawOptionDomain::Values(values) => OptionDomain::Values(values.clone()),
            };
            options.insert(name.trim().to_owned(), domain);
        }

        let mut requires = Vec::with_capacity(self.requires.len());
        for req in &self.requires {
            requires.push(Requirement {
                reference: PackageReference::parse(&req.reference)?,
                condition: Condition::from_tables(&req.when, &req.unless),
            });
        }

        let steps = self
            .toolchain
            .steps
            .iter()
            .map(|s| BuildStep::parse_declared(s))
            .collect::<Result<Vec<_>, _>>()?;

        let cache_variables = self
            .toolchain
            .cache_variables
            .iter()
            .map(|(name, raw)| {
                let source = match raw {
                    RawVariable::Bool(b) => VariableSource::Literal(ToolchainValue::Bool(*b)),
                    RawVariable::Str(s) => VariableSource::Literal(ToolchainValue::Str(s.clone())),
                    RawVariable::Option { option } => VariableSource::Option(option.trim().to_owned()),
                    RawVariable::Setting { setting } => {
                        VariableSource::Setting(setting.trim().to_owned())
                    }
                };
                (name.trim().to_owned(), source)
            })
            .collect();

        let recipe = Recipe {
            name: self.package.name.trim().to_owned(),
            version: self.package.version.trim().to_owned(),
            description: trimmed(self.package.description.as_deref()),
            url: trimmed(self.package.url.as_deref()),
            license: trimmed(self.package.license.as_deref()),
            settings: self
                .settings
                .iter()
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty())
                .collect(),
            source: self.source.as_ref().map(|s| SourceSpec {
                git: s.git.trim().to_owned(),
                checkout: trimmed(s.checkout.as_deref()),
            }),
            options,
            default_options: self
                .default_options
                .iter()
                .map(|(k, v)| (k.trim().to_owned(), v.clone()))
                .collect(),
            option_rules: self
                .option_rules
                .iter()
                .map(|r| ApplicabilityRule {
                    option: r.option.trim().to_owned(),
                    remove_when: r.remove_when.clone(),
                })
                .collect(),
            requires,
            toolchain: Toolchain {
                generator: trimmed(self.toolchain.generator.as_deref()),
                steps,
                cache_variables,
            },
            install: self
                .install
                .iter()
                .map(|i| InstallRule {
                    pattern: i.pattern.trim().to_owned(),
                    dst: i.dst.trim().trim_end_matches('/').to_owned(),
                    src: i
                        .src
                        .as_deref()
                        .map(|s| s.trim().trim_matches('/').to_owned())
                        .filter(|s| !s.is_empty()),
                    keep_path: i.keep_path,
                })
                .collect(),
            package_info: PackageInfo {
                libs: self.package_info.libs.clone(),
                include_dirs: self.package_info.include_dirs.clone(),
            },
        };

        recipe.validate()?;
        Ok(recipe)
    }
}

impl Recipe {
    /// `name/version`.
    pub fn reference(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }

    /// Check every structural invariant. Called on load; call it yourself for
    /// recipes built in code.
    pub fn validate(&self) -> Result<(), RecipeError> {
        validate_package_name(&self.name)?;
        validate_package_version(&self.version)?;

        for (name, domain) in &self.options {
            if let OptionDomain::Values(values) = domain {
                if values.is_empty() {
                    return Err(RecipeError::InvalidDomain {
                        option: name.clone(),
                        reason: "allowed value list is empty".to_owned(),
                    });
                }
            }
        }

        for (name, value) in &self.default_options {
            let Some(domain) = self.options.get(name) else {
                return Err(RecipeError::UndeclaredDefault(name.clone()));
            };
            if !domain.allows(value) {
                return Err(RecipeError::DisallowedDefault {
                    option: name.clone(),
                    value: value.to_string(),
                    allowed: domain.to_string(),
                });
            }
        }

        for rule in &self.option_rules {
            let context = format!("option rule for '{}'", rule.option);
            if !self.options.contains_key(&rule.option) {
                return Err(RecipeError::UndeclaredOption {
                    context,
                    option: rule.option.clone(),
                });
            }
            for axis in rule.remove_when.keys() {
                if !self.settings.contains(axis) {
                    return Err(RecipeError::UndeclaredSetting {
                        context,
                        setting: axis.clone(),
                    });
                }
            }
        }

        for req in &self.requires {
            let context = format!("requirement '{}'", req.reference);
            self.validate_condition(&req.condition, &context)?;
        }

        self.validate_steps()?;

        for (var, source) in &self.toolchain.cache_variables {
            let context = format!("cache variable '{var}'");
            match source {
                VariableSource::Option(option) if !self.options.contains_key(option) => {
                    return Err(RecipeError::UndeclaredOption {
                        context,
                        option: option.clone(),
                    });
                }
                VariableSource::Setting(setting) if !self.settings.contains(setting) => {
                    return Err(RecipeError::UndeclaredSetting {
                        context,
                        setting: setting.clone(),
                    });
                }
                _ => {}
            }
        }

        for rule in &self.install {
            glob::Pattern::new(&rule.pattern).map_err(|e| RecipeError::InvalidPattern {
                pattern: rule.pattern.clone(),
                reason: e.to_string(),
            })?;
            if rule.dst.is_empty() {
                return Err(RecipeError::EmptyDestination(rule.pattern.clone()));
            }
        }

        Ok(())
    }

    fn validate_condition(&self, condition: &Condition, context: &str) -> Result<(), RecipeError> {
        let mut stack = vec![condition];
        while let Some(c) = stack.pop() {
            match c {
                Condition::Always => {}
                Condition::OptionEquals { option, value } => {
                    let Some(domain) = self.options.get(option) else {
                        return Err(RecipeError::UndeclaredOption {
                            context: context.to_owned(),
                            option: option.clone(),
                        });
                    };
                    if !domain.allows(value) {
                        return Err(RecipeError::DisallowedConditionValue {
                            context: context.to_owned(),
                            option: option.clone(),
                            value: value.to_string(),
                        });
                    }
                }
                Condition::All(parts) => stack.extend(parts),
                Condition::Not(inner) => stack.push(inner),
            }
        }
        Ok(())
    }

    fn validate_steps(&self) -> Result<(), RecipeError> {
        let steps = &self.toolchain.steps;
        let mut seen = BTreeSet::new();
        for step in steps {
            if *step == BuildStep::Source {
                return Err(RecipeError::StepOrder(
                    "'source' is implied by the [source] section and cannot be listed".to_owned(),
                ));
            }
            if !seen.insert(*step) {
                return Err(RecipeError::StepOrder(format!("'{step}' listed twice")));
            }
        }
        // Declared steps must follow configure < build < test/install.
        let rank = |s: BuildStep| match s {
            BuildStep::Source => 0,
            BuildStep::Configure => 1,
            BuildStep::Build => 2,
            BuildStep::Test | BuildStep::Install => 3,
        };
        for pair in steps.windows(2) {
            if rank(pair[0]) > rank(pair[1]) {
                return Err(RecipeError::StepOrder(format!(
                    "'{}' must come before '{}'",
                    pair[1], pair[0]
                )));
            }
        }
        if seen.contains(&BuildStep::Build) && !seen.contains(&BuildStep::Configure) {
            return Err(RecipeError::StepOrder(
                "'build' requires a preceding 'configure'".to_owned(),
            ));
        }
        Ok(())
    }

    /// Options declared without a default value.
    pub fn options_without_default(&self) -> Vec<&str> {
        self.options
            .keys()
            .filter(|k| !self.default_options.contains_key(*k))
            .map(String::as_str)
            .collect()
    }

    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Blake3 digest of the canonical JSON form; changes whenever the recipe's
    /// meaning changes.
    pub fn digest(&self) -> Result<RecipeDigest, serde_json::Error> {
        let json = self.canonical_json()?;
        Ok(RecipeDigest::of(json.as_bytes()))
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_recipe_str;

    const BASE: &str = r#"
recipe_version = 1
settings = ["os", "build_type"]

[package]
name = "matrixlib"
version = "0.0.3"

[options]
shared = [true, false]
fPIC = [true, false]
build_tests = [true, false]

[default_options]
shared = false
fPIC = true
build_tests = false
"#;

    fn normalize(extra: &str) -> Result<Recipe, RecipeError> {
        parse_recipe_str(&format!("{BASE}{extra}"))
            .unwrap()
            .normalize()
    }

    #[test]
    fn normalizes_typed_sections() {
        let recipe = normalize(
            r#"
[[option_rules]]
option = "fPIC"
remove_when = { os = "Windows" }

[[requires]]
reference = "fmt/9.1.0"

[[requires]]
reference = "gtest/1.12.1"
when = { build_tests = true }

[toolchain.cache_variables]
ENABLE_TESTING = { option = "build_tests" }
BUILD_KIND = { setting = "build_type" }

[[install]]
pattern = " *.h "
dst = "include/"
src = "/matrixes/include/"
"#,
        )
        .unwrap();

        assert_eq!(recipe.reference(), "matrixlib/0.0.3");
        assert_eq!(recipe.requires.len(), 2);
        assert!(recipe.requires[0].condition.is_unconditional());
        assert_eq!(recipe.requires[1].to_string(), "gtest/1.12.1 if build_tests==true");
        assert_eq!(
            recipe.toolchain.cache_variables["ENABLE_TESTING"],
            VariableSource::Option("build_tests".to_owned())
        );
        assert_eq!(recipe.install[0].pattern, "*.h");
        assert_eq!(recipe.install[0].dst, "include");
        assert_eq!(recipe.install[0].src.as_deref(), Some("matrixes/include"));
        assert!(recipe.option_rules[0]
            .excludes(&Platform::new().with("os", "Windows")));
        assert!(!recipe.option_rules[0].excludes(&Platform::new().with("os", "Linux")));
    }

    #[test]
    fn rejects_default_for_undeclared_option() {
        let err = parse_recipe_str(
            r#"
recipe_version = 1
[package]
name = "x"
version = "1"
[options]
shared = [true, false]
[default_options]
static = true
"#,
        )
        .unwrap()
        .normalize()
        .unwrap_err();
        assert!(matches!(err, RecipeError::UndeclaredDefault(ref o) if o == "static"));
    }

    #[test]
    fn rejects_default_outside_allowed_values() {
        let err = parse_recipe_str(
            r#"
recipe_version = 1
[package]
name = "x"
version = "1"
[options]
linkage = ["static", "dynamic"]
[default_options]
linkage = "both"
"#,
        )
        .unwrap()
        .normalize()
        .unwrap_err();
        assert!(matches!(err, RecipeError::DisallowedDefault { .. }));
    }

    #[test]
    fn rejects_rule_on_undeclared_setting() {
        let err = normalize(
            r#"
[[option_rules]]
option = "fPIC"
remove_when = { compiler = "msvc" }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, RecipeError::UndeclaredSetting { .. }));
    }

    #[test]
    fn rejects_condition_on_undeclared_option() {
        let err = normalize(
            r#"
[[requires]]
reference = "benchmark/1.8.0"
when = { with_bench = true }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, RecipeError::UndeclaredOption { ref option, .. } if option == "with_bench"));
    }

    #[test]
    fn rejects_build_before_configure() {
        let err = normalize(
            r#"
[toolchain]
steps = ["build", "configure"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, RecipeError::StepOrder(_)));

        let err = normalize(
            r#"
[toolchain]
steps = ["configure", "compile"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, RecipeError::InvalidStep(ref s) if s == "compile"));
    }

    #[test]
    fn rejects_unknown_domain_keyword() {
        let err = parse_recipe_str(
            r#"
recipe_version = 1
[package]
name = "x"
version = "1"
[options]
simd = "SOME"
"#,
        )
        .unwrap()
        .normalize()
        .unwrap_err();
        assert!(matches!(err, RecipeError::InvalidDomain { .. }));
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = parse_recipe_str(
            r#"
recipe_version = 2
[package]
name = "x"
version = "1"
"#,
        )
        .unwrap()
        .normalize()
        .unwrap_err();
        assert!(matches!(err, RecipeError::UnsupportedVersion(2)));
    }

    #[test]
    fn rejects_path_like_version() {
        let err = parse_recipe_str(&BASE.replace("version = \"0.0.3\"", "version = \"../../escaped\""))
            .unwrap()
            .normalize()
            .unwrap_err();
        assert!(matches!(err, RecipeError::InvalidVersion(_)), "{err}");
    }

    #[test]
    fn equivalent_recipes_share_digest() {
        let a = normalize("").unwrap();
        let b = parse_recipe_str(&BASE.replace("name = \"matrixlib\"", "name = \"  matrixlib \""))
            .unwrap()
            .normalize()
            .unwrap();
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());

        let c = normalize(
            r#"
[[requires]]
reference = "fmt/9.1.0"
"#,
        )
        .unwrap();
        assert_ne!(a.digest().unwrap(), c.digest().unwrap());
    }

    #[test]
    fn code_built_recipe_is_validated() {
        let mut recipe = normalize("").unwrap();
        recipe
            .default_options
            .insert("undeclared".to_owned(), OptionValue::Bool(true));
        assert!(recipe.validate().is_err());
    }
}
