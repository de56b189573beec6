use crate::manifest::{validate_package_name, RecipeError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version constraint of a requirement: either an exact version or a
/// bracketed semver range such as `[>=1.0 <2.0]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VersionConstraint {
    Exact(String),
    Range {
        raw: String,
        req: semver::VersionReq,
    },
}

impl VersionConstraint {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("empty version".to_owned());
        }
        let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) else {
            if raw.contains(char::is_whitespace) {
                return Err(format!("version '{raw}' contains whitespace"));
            }
            return Ok(VersionConstraint::Exact(raw.to_owned()));
        };
        let req = semver::VersionReq::parse(&range_to_semver(inner))
            .map_err(|e| format!("invalid version range '{raw}': {e}"))?;
        Ok(VersionConstraint::Range {
            raw: raw.to_owned(),
            req,
        })
    }

    pub fn matches(&self, version: &str) -> bool {
        match self {
            VersionConstraint::Exact(v) => v == version,
            VersionConstraint::Range { req, .. } => {
                parse_lenient(version).is_some_and(|v| req.matches(&v))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            VersionConstraint::Exact(v) => v,
            VersionConstraint::Range { raw, .. } => raw,
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for VersionConstraint {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionConstraint> for String {
    fn from(value: VersionConstraint) -> Self {
        value.as_str().to_owned()
    }
}

/// Recipe ranges separate comparators with spaces or commas and allow a space
/// between operator and version; semver wants `op version, op version`.
fn range_to_semver(inner: &str) -> String {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;
    for token in inner
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^')) {
            pending_op = Some(token.to_owned());
            continue;
        }
        match pending_op.take() {
            Some(op) => comparators.push(format!("{op}{token}")),
            None => comparators.push(token.to_owned()),
        }
    }
    comparators.join(", ")
}

/// Parse `1`, `1.2`, or `1.2.3[-pre]` as a semver version, padding missing
/// numeric components with zero.
pub fn parse_lenient(version: &str) -> Option<semver::Version> {
    if let Ok(v) = semver::Version::parse(version) {
        return Some(v);
    }
    let (core, rest) = match version.find(['-', '+']) {
        Some(idx) => version.split_at(idx),
        None => (version, ""),
    };
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.parse::<u64>().is_err()) {
        return None;
    }
    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    semver::Version::parse(&format!("{padded}{rest}")).ok()
}

/// `name/constraint`, e.g. `fmt/9.1.0` or `zlib/[>=1.2 <2]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageReference {
    pub name: String,
    pub constraint: VersionConstraint,
}

impl PackageReference {
    pub fn parse(raw: &str) -> Result<Self, RecipeError> {
        let invalid = |reason: String| RecipeError::InvalidReference {
            reference: raw.to_owned(),
            reason,
        };
        let Some((name, constraint)) = raw.trim().split_once('/') else {
            return Err(invalid("expected '<name>/<version>'".to_owned()));
        };
        let name = name.trim();
        validate_package_name(name).map_err(|e| invalid(e.to_string()))?;
        let constraint = VersionConstraint::parse(constraint).map_err(invalid)?;
        Ok(Self {
            name: name.to_owned(),
            constraint,
        })
    }
}

impl fmt::Display for PackageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.constraint)
    }
}

impl TryFrom<String> for PackageReference {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).map_err(|e| e.to_string())
    }
}

impl From<PackageReference> for String {
    fn from(value: PackageReference) -> Self {
        value.to_string()
    }
}
