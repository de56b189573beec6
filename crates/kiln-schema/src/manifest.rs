use crate::value::OptionValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("failed to read recipe file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse recipe: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported recipe_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("package.{0} must not be empty")]
    EmptyField(&'static str),
    #[error("invalid package name '{0}': expected [A-Za-z0-9_.+-]")]
    InvalidName(String),
    #[error("invalid package version '{0}': expected [A-Za-z0-9_.+-], not starting with '.'")]
    InvalidVersion(String),
    #[error("invalid option '{option}': {reason}")]
    InvalidDomain { option: String, reason: String },
    #[error("default for '{0}' names an option that is not declared in [options]")]
    UndeclaredDefault(String),
    #[error("default for '{option}' is '{value}', which is not one of {allowed}")]
    DisallowedDefault {
        option: String,
        value: String,
        allowed: String,
    },
    #[error("{context} refers to undeclared option '{option}'")]
    UndeclaredOption { context: String, option: String },
    #[error("{context} refers to undeclared setting '{setting}'")]
    UndeclaredSetting { context: String, setting: String },
    #[error("{context}: value '{value}' is not allowed for option '{option}'")]
    DisallowedConditionValue {
        context: String,
        option: String,
        value: String,
    },
    #[error("invalid requirement '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },
    #[error("invalid build step '{0}' (expected configure, build, test, or install)")]
    InvalidStep(String),
    #[error("invalid build step order: {0}")]
    StepOrder(String),
    #[error("invalid install pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("install rule for '{0}' has an empty destination")]
    EmptyDestination(String),
    #[error("invalid assignment '{0}', expected '<key>=<value>'")]
    InvalidAssignment(String),
}

/// Recipe as written on disk (`kiln.toml`), before validation.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RecipeV1 {
    pub recipe_version: u32,
    #[serde(default)]
    pub settings: Vec<String>,
    pub package: PackageSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceSection>,
    #[serde(default)]
    pub options: BTreeMap<String, RawOptionDomain>,
    #[serde(default)]
    pub default_options: BTreeMap<String, OptionValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub option_rules: Vec<OptionRuleSection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<RequireSection>,
    #[serde(default)]
    pub toolchain: ToolchainSection,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub install: Vec<InstallSection>,
    #[serde(default)]
    pub package_info: PackageInfoSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PackageSection {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SourceSection {
    pub git: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout: Option<String>,
}

/// `[true, false]`, `["a", "b"]`, or the keyword `"ANY"`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RawOptionDomain {
    Values(Vec<OptionValue>),
    Keyword(String),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OptionRuleSection {
    pub option: String,
    pub remove_when: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RequireSection {
    pub reference: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub when: BTreeMap<String, OptionValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unless: BTreeMap<String, OptionValue>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ToolchainSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    #[serde(default = "default_steps")]
    pub steps: Vec<String>,
    #[serde(default)]
    pub cache_variables: BTreeMap<String, RawVariable>,
}

impl Default for ToolchainSection {
    fn default() -> Self {
        Self {
            generator: None,
            steps: default_steps(),
            cache_variables: BTreeMap::new(),
        }
    }
}

fn default_steps() -> Vec<String> {
    vec!["configure".to_owned(), "build".to_owned()]
}

/// A cache variable value: a literal, or a reference to an option or setting.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RawVariable {
    Bool(bool),
    Str(String),
    Option { option: String },
    Setting { setting: String },
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InstallSection {
    pub pattern: String,
    pub dst: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default = "default_keep_path")]
    pub keep_path: bool,
}

fn default_keep_path() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PackageInfoSection {
    #[serde(default)]
    pub libs: Vec<String>,
    #[serde(default)]
    pub include_dirs: Vec<String>,
}

pub fn parse_recipe_str(input: &str) -> Result<RecipeV1, RecipeError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_recipe_file(path: impl AsRef<Path>) -> Result<RecipeV1, RecipeError> {
    let content = fs::read_to_string(path)?;
    parse_recipe_str(&content)
}

pub(crate) fn validate_package_name(name: &str) -> Result<(), RecipeError> {
    if name.is_empty() {
        return Err(RecipeError::EmptyField("name"));
    }
    if name.starts_with('.')
        || !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'+'))
    {
        return Err(RecipeError::InvalidName(name.to_owned()));
    }
    Ok(())
}

/// Exact versions name store directories, so they share the name alphabet.
pub(crate) fn validate_package_version(version: &str) -> Result<(), RecipeError> {
    if version.is_empty() {
        return Err(RecipeError::EmptyField("version"));
    }
    if version.starts_with('.')
        || !version
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'+'))
    {
        return Err(RecipeError::InvalidVersion(version.to_owned()));
    }
    Ok(())
}
