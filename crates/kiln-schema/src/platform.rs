use crate::manifest::RecipeError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Target platform: a value for each settings axis (`os`, `compiler`, `build_type`, `arch`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Platform {
    settings: BTreeMap<String, String>,
}

impl Platform {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, axis: &str, value: &str) -> Self {
        self.set(axis, value);
        self
    }

    pub fn set(&mut self, axis: &str, value: &str) {
        self.settings
            .insert(axis.trim().to_owned(), value.trim().to_owned());
    }

    pub fn get(&self, axis: &str) -> Option<&str> {
        self.settings.get(axis).map(String::as_str)
    }

    pub fn settings(&self) -> &BTreeMap<String, String> {
        &self.settings
    }

    /// Keep only the axes a recipe declares.
    #[must_use]
    pub fn restricted_to(&self, axes: &BTreeSet<String>) -> Self {
        Self {
            settings: self
                .settings
                .iter()
                .filter(|(axis, _)| axes.contains(*axis))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Apply `axis=value` assignments on top of this platform.
    pub fn apply_assignments<S: AsRef<str>>(&mut self, assignments: &[S]) -> Result<(), RecipeError> {
        for raw in assignments {
            let (axis, value) = parse_assignment(raw.as_ref())?;
            self.set(&axis, &value);
        }
        Ok(())
    }

    /// Settings of the machine running kiln, spelled the way recipes spell them.
    pub fn host() -> Self {
        let os = match std::env::consts::OS {
            "linux" => "Linux",
            "windows" => "Windows",
            "macos" => "Macos",
            "freebsd" => "FreeBSD",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "aarch64" => "armv8",
            "x86" => "x86",
            other => other,
        };
        Self::new()
            .with("os", os)
            .with("arch", arch)
            .with("build_type", "Release")
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.settings.is_empty() {
            return f.write_str("(no settings)");
        }
        let parts: Vec<String> = self
            .settings
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        f.write_str(&parts.join(" "))
    }
}

/// Split `key=value`, trimming both sides. Both parts must be non-empty.
pub fn parse_assignment(raw: &str) -> Result<(String, String), RecipeError> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(RecipeError::InvalidAssignment(raw.to_owned()));
    };
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() || value.is_empty() {
        return Err(RecipeError::InvalidAssignment(raw.to_owned()));
    }
    Ok((key.to_owned(), value.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments_override_existing_axes() {
        let mut platform = Platform::new().with("os", "Linux").with("arch", "x86_64");
        platform
            .apply_assignments(&["os=Windows", " build_type = Debug "])
            .unwrap();
        assert_eq!(platform.get("os"), Some("Windows"));
        assert_eq!(platform.get("build_type"), Some("Debug"));
        assert_eq!(platform.get("arch"), Some("x86_64"));
    }

    #[test]
    fn malformed_assignment_is_rejected() {
        assert!(parse_assignment("os").is_err());
        assert!(parse_assignment("=Linux").is_err());
        assert!(parse_assignment("os=").is_err());
    }

    #[test]
    fn restricted_to_drops_undeclared_axes() {
        let platform = Platform::new()
            .with("os", "Linux")
            .with("compiler", "gcc");
        let axes: BTreeSet<String> = ["os".to_owned()].into_iter().collect();
        let restricted = platform.restricted_to(&axes);
        assert_eq!(restricted.settings().len(), 1);
        assert_eq!(restricted.get("compiler"), None);
    }

    #[test]
    fn display_is_sorted_by_axis() {
        let platform = Platform::new().with("os", "Linux").with("arch", "armv8");
        assert_eq!(platform.to_string(), "arch=armv8 os=Linux");
        assert_eq!(Platform::new().to_string(), "(no settings)");
    }

    #[test]
    fn host_platform_has_core_axes() {
        let host = Platform::host();
        assert!(host.get("os").is_some());
        assert!(host.get("arch").is_some());
    }
}
