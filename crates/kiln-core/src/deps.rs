use crate::CoreError;
use kiln_schema::{Recipe, Requirement, ResolvedDependency, ResolvedOptions};
use kiln_store::PackageSource;
use tracing::debug;

/// Requirements whose condition holds for `options`, in declaration order.
///
/// Each condition is evaluated exactly once.
pub fn select_requirements<'a>(
    recipe: &'a Recipe,
    options: &ResolvedOptions,
) -> Vec<&'a Requirement> {
    recipe
        .requires
        .iter()
        .filter(|req| {
            let selected = req.condition.evaluate(options);
            if !selected {
                debug!("skipping requirement {req}");
            }
            selected
        })
        .collect()
}

/// Locate every selected requirement in `source`, preserving declaration order.
///
/// The first requirement the source cannot satisfy aborts planning.
pub fn plan_dependencies(
    recipe: &Recipe,
    options: &ResolvedOptions,
    source: &dyn PackageSource,
) -> Result<Vec<ResolvedDependency>, CoreError> {
    let mut resolved = Vec::new();
    for requirement in select_requirements(recipe, options) {
        let Some(dep) = source.locate(&requirement.reference)? else {
            return Err(CoreError::UnresolvedRequirement {
                reference: requirement.reference.to_string(),
                source_name: source.name().to_owned(),
            });
        };
        debug!(
            "resolved {} -> {} at {}",
            requirement.reference,
            dep.reference(),
            dep.root.display()
        );
        resolved.push(dep);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::matrixlib;
    use kiln_schema::OptionValue;
    use kiln_store::MemorySource;

    fn options(build_tests: bool) -> ResolvedOptions {
        [
            ("shared".to_owned(), OptionValue::Bool(false)),
            ("fPIC".to_owned(), OptionValue::Bool(true)),
            ("build_tests".to_owned(), OptionValue::Bool(build_tests)),
        ]
        .into_iter()
        .collect()
    }

    fn names(deps: &[ResolvedDependency]) -> Vec<String> {
        deps.iter().map(ResolvedDependency::reference).collect()
    }

    #[test]
    fn tests_disabled_selects_fmt_only() {
        let recipe = matrixlib();
        let selected = select_requirements(&recipe, &options(false));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].reference.to_string(), "fmt/9.1.0");
    }

    #[test]
    fn tests_enabled_appends_gtest_in_order() {
        let source = MemorySource::with_packages(["fmt/9.1.0", "gtest/1.12.1"]);
        let deps = plan_dependencies(&matrixlib(), &options(true), &source).unwrap();
        assert_eq!(names(&deps), vec!["fmt/9.1.0", "gtest/1.12.1"]);
    }

    #[test]
    fn condition_on_absent_option_is_false() {
        let recipe = matrixlib();
        let without: ResolvedOptions = [("shared".to_owned(), OptionValue::Bool(false))]
            .into_iter()
            .collect();
        let selected = select_requirements(&recipe, &without);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn missing_package_is_unresolved() {
        let source = MemorySource::with_packages(["fmt/9.1.0"]);
        let err = plan_dependencies(&matrixlib(), &options(true), &source).unwrap_err();
        match err {
            CoreError::UnresolvedRequirement {
                reference,
                source_name,
            } => {
                assert_eq!(reference, "gtest/1.12.1");
                assert_eq!(source_name, "memory");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn declaration_order_is_preserved() {
        let mut recipe = matrixlib();
        recipe.requires.reverse();
        let source = MemorySource::with_packages(["fmt/9.1.0", "gtest/1.12.1"]);
        let deps = plan_dependencies(&recipe, &options(true), &source).unwrap();
        assert_eq!(names(&deps), vec!["gtest/1.12.1", "fmt/9.1.0"]);
    }
}
