use serde::{Deserialize, Serialize};
use std::fmt;

/// A concrete option value as written in a recipe or supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Str(String),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            OptionValue::Str(_) => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{b}"),
            OptionValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        OptionValue::Bool(b)
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Str(s.to_owned())
    }
}

/// The set of values an option accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionDomain {
    /// Any value is accepted (`"ANY"` in a recipe).
    Any,
    /// Enumerated allowed values, in declaration order.
    Values(Vec<OptionValue>),
}

impl OptionDomain {
    pub fn allows(&self, value: &OptionValue) -> bool {
        match self {
            OptionDomain::Any => true,
            OptionDomain::Values(values) => values.contains(value),
        }
    }

    /// Interpret a raw command-line string against this domain.
    ///
    /// Boolean members accept the usual spellings (`true`, `True`, `1`, `on`, ...).
    /// Returns `None` when no allowed value matches.
    pub fn parse_value(&self, raw: &str) -> Option<OptionValue> {
        let raw = raw.trim();
        match self {
            OptionDomain::Any => Some(
                parse_bool(raw).map_or_else(|| OptionValue::Str(raw.to_owned()), OptionValue::Bool),
            ),
            OptionDomain::Values(values) => values
                .iter()
                .find(|candidate| match candidate {
                    OptionValue::Bool(b) => parse_bool(raw) == Some(*b),
                    OptionValue::Str(s) => s == raw,
                })
                .cloned(),
        }
    }
}

impl fmt::Display for OptionDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionDomain::Any => f.write_str("ANY"),
            OptionDomain::Values(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bool_domain() -> OptionDomain {
        OptionDomain::Values(vec![OptionValue::Bool(true), OptionValue::Bool(false)])
    }

    #[test]
    fn bool_domain_accepts_common_spellings() {
        let domain = bool_domain();
        assert_eq!(domain.parse_value("True"), Some(OptionValue::Bool(true)));
        assert_eq!(domain.parse_value("false"), Some(OptionValue::Bool(false)));
        assert_eq!(domain.parse_value("ON"), Some(OptionValue::Bool(true)));
        assert_eq!(domain.parse_value("maybe"), None);
    }

    #[test]
    fn string_domain_requires_exact_member() {
        let domain = OptionDomain::Values(vec!["static".into(), "dynamic".into()]);
        assert_eq!(domain.parse_value("static"), Some(OptionValue::from("static")));
        assert_eq!(domain.parse_value("Static"), None);
        assert!(!domain.allows(&OptionValue::Bool(true)));
    }

    #[test]
    fn any_domain_accepts_everything() {
        let domain = OptionDomain::Any;
        assert_eq!(domain.parse_value("avx2"), Some(OptionValue::from("avx2")));
        assert_eq!(domain.parse_value("true"), Some(OptionValue::Bool(true)));
        assert!(domain.allows(&OptionValue::from("whatever")));
    }

    #[test]
    fn untagged_values_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            values: Vec<OptionValue>,
        }
        let doc: Doc = toml::from_str(r#"values = [true, "x"]"#).unwrap();
        assert_eq!(doc.values, vec![OptionValue::Bool(true), OptionValue::from("x")]);
    }

    #[test]
    fn display_matches_recipe_spelling() {
        assert_eq!(OptionValue::Bool(false).to_string(), "false");
        assert_eq!(bool_domain().to_string(), "[true, false]");
        assert_eq!(OptionDomain::Any.to_string(), "ANY");
    }
}
