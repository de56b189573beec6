use serde::Serialize;

/// Starter recipe used by `kiln new`. The package name is replaced on write.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Template {
    pub name: &'static str,
    pub description: &'static str,
    pub recipe: &'static str,
}

pub const BUILTIN_TEMPLATES: &[Template] = &[
    Template {
        name: "minimal",
        description: "Package identity only, default configure and build steps",
        recipe: r#"recipe_version = 1
settings = ["os", "compiler", "build_type", "arch"]

[package]
name = "example"
version = "0.1.0"
"#,
    },
    Template {
        name: "cmake-library",
        description: "CMake library with shared/fPIC options, optional tests, and install rules",
        recipe: r#"recipe_version = 1
settings = ["os", "compiler", "build_type", "arch"]

[package]
name = "example"
version = "0.1.0"

[options]
shared = [true, false]
fPIC = [true, false]
build_tests = [true, false]

[default_options]
shared = false
fPIC = true
build_tests = false

[[option_rules]]
option = "fPIC"
remove_when = { os = "Windows" }

[[requires]]
reference = "fmt/9.1.0"

[[requires]]
reference = "gtest/1.12.1"
when = { build_tests = true }

[toolchain]
generator = "CMakeDeps"
steps = ["configure", "build"]

[toolchain.cache_variables]
ENABLE_TESTING = { option = "build_tests" }
ENABLE_DEVELOPER_MODE = false

[[install]]
pattern = "*.h"
dst = "include"
src = "include"

[[install]]
pattern = "*.dll"
dst = "bin"
keep_path = false

[[install]]
pattern = "*.so"
dst = "lib"
keep_path = false

[[install]]
pattern = "*.dylib"
dst = "lib"
keep_path = false

[[install]]
pattern = "*.a"
dst = "lib"
keep_path = false
"#,
    },
    Template {
        name: "header-only",
        description: "Header-only library: no build steps beyond configure, headers installed as-is",
        recipe: r#"recipe_version = 1

[package]
name = "example"
version = "0.1.0"

[toolchain]
steps = ["configure"]

[[install]]
pattern = "*.h*"
dst = "include"
src = "include"
"#,
    },
];

pub fn get_template(name: &str) -> Option<&'static Template> {
    BUILTIN_TEMPLATES.iter().find(|t| t.name == name)
}

pub fn list_templates() -> Vec<(&'static str, &'static str)> {
    BUILTIN_TEMPLATES
        .iter()
        .map(|t| (t.name, t.description))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_recipe_str;

    #[test]
    fn all_templates_normalize() {
        for t in BUILTIN_TEMPLATES {
            let recipe = parse_recipe_str(t.recipe)
                .unwrap_or_else(|e| panic!("template '{}' failed to parse: {e}", t.name));
            recipe
                .normalize()
                .unwrap_or_else(|e| panic!("template '{}' failed to validate: {e}", t.name));
        }
    }

    #[test]
    fn get_template_by_name() {
        assert!(get_template("cmake-library").is_some());
        assert!(get_template("nonexistent").is_none());
        assert_eq!(list_templates().len(), BUILTIN_TEMPLATES.len());
    }
}
