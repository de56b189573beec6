use crate::manifest::RecipeError;
use crate::platform::Platform;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A named target platform plus option overrides, loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
    /// `option = "value"` overrides applied as if passed with `-o`.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl Profile {
    pub fn parse_str(input: &str) -> Result<Self, RecipeError> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: &Path) -> Result<Self, RecipeError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    pub fn platform(&self) -> Platform {
        let mut platform = Platform::new();
        for (axis, value) in &self.settings {
            platform.set(axis, value);
        }
        platform
    }

    /// Overrides rendered as `name=value` assignments, sorted by name.
    pub fn option_assignments(&self) -> Vec<String> {
        self.options
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BuiltinProfile {
    pub name: &'static str,
    pub description: &'static str,
    pub profile: &'static str,
}

pub const BUILTIN_PROFILES: &[BuiltinProfile] = &[
    BuiltinProfile {
        name: "linux-gcc-release",
        description: "Linux x86_64, GCC, release build",
        profile: r#"[settings]
os = "Linux"
arch = "x86_64"
compiler = "gcc"
build_type = "Release"
"#,
    },
    BuiltinProfile {
        name: "linux-gcc-debug",
        description: "Linux x86_64, GCC, debug build with tests",
        profile: r#"[settings]
os = "Linux"
arch = "x86_64"
compiler = "gcc"
build_type = "Debug"

[options]
build_tests = "true"
"#,
    },
    BuiltinProfile {
        name: "linux-clang-release",
        description: "Linux x86_64, Clang, release build",
        profile: r#"[settings]
os = "Linux"
arch = "x86_64"
compiler = "clang"
build_type = "Release"
"#,
    },
    BuiltinProfile {
        name: "macos-armv8-release",
        description: "macOS on Apple silicon, Apple Clang, release build",
        profile: r#"[settings]
os = "Macos"
arch = "armv8"
compiler = "apple-clang"
build_type = "Release"
"#,
    },
    BuiltinProfile {
        name: "windows-msvc-release",
        description: "Windows x86_64, MSVC, release build",
        profile: r#"[settings]
os = "Windows"
arch = "x86_64"
compiler = "msvc"
build_type = "Release"
"#,
    },
];

pub fn get_builtin_profile(name: &str) -> Option<&'static BuiltinProfile> {
    BUILTIN_PROFILES.iter().find(|p| p.name == name)
}

pub fn list_builtin_profiles() -> Vec<(&'static str, &'static str)> {
    BUILTIN_PROFILES
        .iter()
        .map(|p| (p.name, p.description))
        .collect()
}

/// Resolve a profile reference: `default` (the host), a built-in name, or a
/// path to a profile TOML file.
pub fn resolve_profile(reference: &str) -> Result<Profile, RecipeError> {
    if reference == "default" {
        return Ok(Profile {
            settings: Platform::host().settings().clone(),
            options: BTreeMap::new(),
        });
    }
    if let Some(builtin) = get_builtin_profile(reference) {
        return Profile::parse_str(builtin.profile);
    }
    Profile::load(Path::new(reference))
}
