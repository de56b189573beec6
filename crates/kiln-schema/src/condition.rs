use crate::resolved::ResolvedOptions;
use crate::value::OptionValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Declarative predicate over resolved options, attached to a requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Always,
    OptionEquals { option: String, value: OptionValue },
    All(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    /// Build a condition from the recipe's `when`/`unless` tables.
    ///
    /// `when` requires every listed option to equal its value; `unless` is the
    /// negation of the same form. Both may be present.
    pub fn from_tables(
        when: &BTreeMap<String, OptionValue>,
        unless: &BTreeMap<String, OptionValue>,
    ) -> Self {
        let mut parts = Vec::new();
        if !when.is_empty() {
            parts.push(Self::all_equal(when));
        }
        if !unless.is_empty() {
            parts.push(Condition::Not(Box::new(Self::all_equal(unless))));
        }
        match parts.len() {
            0 => Condition::Always,
            1 => parts.remove(0),
            _ => Condition::All(parts),
        }
    }

    fn all_equal(table: &BTreeMap<String, OptionValue>) -> Self {
        let mut eqs: Vec<Condition> = table
            .iter()
            .map(|(option, value)| Condition::OptionEquals {
                option: option.clone(),
                value: value.clone(),
            })
            .collect();
        if eqs.len() == 1 {
            eqs.remove(0)
        } else {
            Condition::All(eqs)
        }
    }

    /// Evaluate against resolved options. An option that has no resolved value
    /// (removed for the platform, or never given one) never equals anything.
    pub fn evaluate(&self, options: &ResolvedOptions) -> bool {
        match self {
            Condition::Always => true,
            Condition::OptionEquals { option, value } => options.get(option) == Some(value),
            Condition::All(parts) => parts.iter().all(|c| c.evaluate(options)),
            Condition::Not(inner) => !inner.evaluate(options),
        }
    }

    /// Names of every option this condition reads.
    pub fn referenced_options(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_options(&mut out);
        out
    }

    fn collect_options<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Always => {}
            Condition::OptionEquals { option, .. } => out.push(option),
            Condition::All(parts) => {
                for part in parts {
                    part.collect_options(out);
                }
            }
            Condition::Not(inner) => inner.collect_options(out),
        }
    }

    pub fn is_unconditional(&self) -> bool {
        matches!(self, Condition::Always)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Always => f.write_str("always"),
            Condition::OptionEquals { option, value } => write!(f, "{option}=={value}"),
            Condition::All(parts) => {
                let rendered: Vec<String> = parts.iter().map(ToString::to_string).collect();
                f.write_str(&rendered.join(" && "))
            }
            Condition::Not(inner) => write!(f, "!({inner})"),
        }
    }
}
