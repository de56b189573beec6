use crate::CoreError;
use kiln_schema::{OptionValue, Platform, Recipe, ResolvedOptions};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Options the recipe's applicability rules remove on `platform`.
pub fn removed_options<'a>(recipe: &'a Recipe, platform: &Platform) -> BTreeSet<&'a str> {
    recipe
        .option_rules
        .iter()
        .filter(|rule| rule.excludes(platform))
        .map(|rule| rule.option.as_str())
        .collect()
}

/// Compute the effective option values for a platform.
///
/// Defaults are taken from the recipe, then `overrides` (raw `name -> value`
/// strings as given on the command line or in a profile) are checked against
/// each option's declared domain and applied. Finally every option removed on
/// the platform is filtered out. The recipe is never modified, and resolving
/// the same inputs twice yields the same map.
pub fn resolve_options(
    recipe: &Recipe,
    platform: &Platform,
    overrides: &BTreeMap<String, String>,
) -> Result<ResolvedOptions, CoreError> {
    let mut values: BTreeMap<String, OptionValue> = recipe.default_options.clone();

    for (name, raw) in overrides {
        let Some(domain) = recipe.options.get(name) else {
            return Err(CoreError::InvalidOption {
                option: name.clone(),
                reason: "not declared by the recipe".to_owned(),
            });
        };
        let Some(value) = domain.parse_value(raw) else {
            return Err(CoreError::InvalidOption {
                option: name.clone(),
                reason: format!("value '{raw}' is not one of {domain}"),
            });
        };
        debug!("option override {name}={value}");
        values.insert(name.clone(), value);
    }

    let removed = removed_options(recipe, platform);
    for name in &removed {
        if overrides.contains_key(*name) {
            warn!("option '{name}' does not apply on {platform}; ignoring override");
        } else {
            debug!("option '{name}' removed on {platform}");
        }
    }

    Ok(values
        .into_iter()
        .filter(|(name, _)| !removed.contains(name.as_str()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::matrixlib;

    fn linux() -> Platform {
        Platform::new()
            .with("os", "Linux")
            .with("compiler", "gcc")
            .with("build_type", "Release")
            .with("arch", "x86_64")
    }

    fn overrides(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn defaults_apply_without_overrides() {
        let resolved = resolve_options(&matrixlib(), &linux(), &BTreeMap::new()).unwrap();
        assert_eq!(resolved.get("shared"), Some(&OptionValue::Bool(false)));
        assert_eq!(resolved.get("fPIC"), Some(&OptionValue::Bool(true)));
        assert_eq!(resolved.get("build_tests"), Some(&OptionValue::Bool(false)));
        assert_eq!(resolved.len(), 3);
    }

    #[test]
    fn overrides_replace_defaults() {
        let resolved = resolve_options(
            &matrixlib(),
            &linux(),
            &overrides(&[("shared", "True"), ("build_tests", "1")]),
        )
        .unwrap();
        assert_eq!(resolved.get("shared"), Some(&OptionValue::Bool(true)));
        assert_eq!(resolved.get("build_tests"), Some(&OptionValue::Bool(true)));
    }

    #[test]
    fn windows_removes_fpic_regardless_of_default() {
        let windows = linux().with("os", "Windows").with("compiler", "msvc");
        let resolved = resolve_options(&matrixlib(), &windows, &BTreeMap::new()).unwrap();
        assert!(!resolved.contains("fPIC"));
        assert!(resolved.contains("shared"));
    }

    #[test]
    fn override_of_removed_option_is_dropped() {
        let windows = linux().with("os", "Windows");
        let resolved =
            resolve_options(&matrixlib(), &windows, &overrides(&[("fPIC", "true")])).unwrap();
        assert!(!resolved.contains("fPIC"));
    }

    #[test]
    fn unknown_option_is_rejected() {
        let err = resolve_options(&matrixlib(), &linux(), &overrides(&[("lto", "true")]))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOption { ref option, .. } if option == "lto"));
    }

    #[test]
    fn disallowed_value_is_rejected() {
        let err = resolve_options(&matrixlib(), &linux(), &overrides(&[("shared", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("maybe"));
    }

    #[test]
    fn resolution_is_idempotent() {
        let recipe = matrixlib();
        let given = overrides(&[("shared", "true")]);
        let first = resolve_options(&recipe, &linux(), &given).unwrap();
        let second = resolve_options(&recipe, &linux(), &given).unwrap();
        assert_eq!(first, second);
        assert_eq!(recipe, matrixlib());
    }

    #[test]
    fn rule_requires_every_setting_to_match() {
        let mut recipe = matrixlib();
        recipe.option_rules[0]
            .remove_when
            .insert("compiler".to_owned(), "msvc".to_owned());

        let mingw = linux().with("os", "Windows").with("compiler", "gcc");
        let resolved = resolve_options(&recipe, &mingw, &BTreeMap::new()).unwrap();
        assert!(resolved.contains("fPIC"));

        let msvc = mingw.with("compiler", "msvc");
        let resolved = resolve_options(&recipe, &msvc, &BTreeMap::new()).unwrap();
        assert!(!resolved.contains("fPIC"));
    }
}
