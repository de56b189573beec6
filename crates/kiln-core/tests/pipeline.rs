use kiln_core::{
    plan_layout, resolve_options, BuildOutput, CoreError, Engine, PlanRequest, LOCK_FILE_NAME,
};
use kiln_schema::{parse_recipe_str, InstallRule, LockFile, Platform, Recipe, RecipeError};
use kiln_store::{MemorySource, PackageIndex, PackageRecord, StoreLayout};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const MATRIXLIB: &str = r#"
recipe_version = 1
settings = ["os", "compiler", "build_type", "arch"]

[package]
name = "matrixlib"
version = "0.0.3"

[source]
git = "https://github.com/example/matrixlib.git"
checkout = "conan_update"

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

[toolchain.cache_variables]
ENABLE_TESTING = { option = "build_tests" }
ENABLE_DEVELOPER_MODE = false

[[install]]
pattern = "*.h"
dst = "include/matrixlib"
src = "matrixes/include"

[[install]]
pattern = "*.so"
dst = "lib"
keep_path = false

[[install]]
pattern = "*.a"
dst = "lib"
keep_path = false
"#;

fn write_recipe(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("kiln.toml");
    fs::write(&path, content).unwrap();
    path
}

fn recipe() -> Recipe {
    parse_recipe_str(MATRIXLIB).unwrap().normalize().unwrap()
}

fn platform(os: &str) -> Platform {
    Platform::new()
        .with("os", os)
        .with("compiler", "gcc")
        .with("build_type", "Release")
        .with("arch", "x86_64")
}

fn memory_engine() -> Engine {
    Engine::new(Box::new(MemorySource::with_packages([
        "fmt/9.1.0",
        "gtest/1.12.1",
    ])))
}

fn request(os: &str, overrides: &[(&str, &str)]) -> PlanRequest {
    PlanRequest {
        platform: platform(os),
        overrides: overrides
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect(),
        ..PlanRequest::default()
    }
}

#[test]
fn tests_disabled_depends_on_fmt_only() {
    let result = memory_engine()
        .resolve(&recipe(), &request("Linux", &[]))
        .unwrap();
    assert_eq!(
        result.dependency_pairs(),
        vec![("fmt".to_owned(), "9.1.0".to_owned())]
    );
}

#[test]
fn tests_enabled_adds_gtest_after_fmt() {
    let result = memory_engine()
        .resolve(&recipe(), &request("Linux", &[("build_tests", "true")]))
        .unwrap();
    assert_eq!(
        result.dependency_pairs(),
        vec![
            ("fmt".to_owned(), "9.1.0".to_owned()),
            ("gtest".to_owned(), "1.12.1".to_owned()),
        ]
    );
    assert_eq!(
        result.build.cache_variables["ENABLE_TESTING"],
        kiln_schema::ToolchainValue::Bool(true)
    );
}

#[test]
fn windows_has_no_fpic_anywhere() {
    let result = memory_engine()
        .resolve(&recipe(), &request("Windows", &[]))
        .unwrap();
    assert!(!result.options.contains("fPIC"));
    assert!(!result.lock_file.options.contains_key("fPIC"));
    assert!(!result
        .build
        .cache_variables
        .contains_key("CMAKE_POSITION_INDEPENDENT_CODE"));
}

#[test]
fn default_options_must_be_declared() {
    let broken = MATRIXLIB.replace("build_tests = false\n", "build_tests = false\nlto = true\n");
    let err = parse_recipe_str(&broken).unwrap().normalize().unwrap_err();
    assert!(matches!(err, RecipeError::UndeclaredDefault(ref name) if name == "lto"));
}

#[test]
fn option_resolution_is_idempotent() {
    let recipe = recipe();
    let overrides: BTreeMap<String, String> =
        [("shared".to_owned(), "true".to_owned())].into_iter().collect();
    let first = resolve_options(&recipe, &platform("Linux"), &overrides).unwrap();
    let second = resolve_options(&recipe, &platform("Linux"), &overrides).unwrap();
    assert_eq!(first, second);
}

#[test]
fn identical_inputs_give_identical_package_ids() {
    let engine = memory_engine();
    let a = engine.resolve(&recipe(), &request("Linux", &[])).unwrap();
    let b = engine.resolve(&recipe(), &request("Linux", &[])).unwrap();
    let c = engine.resolve(&recipe(), &request("Windows", &[])).unwrap();
    assert_eq!(a.identity, b.identity);
    assert_ne!(a.identity.package_id, c.identity.package_id);
    assert_eq!(a.lock_file, b.lock_file);
}

#[test]
fn layout_example_places_header_and_library() {
    let rules = vec![
        InstallRule::new("*.h", "include"),
        InstallRule::new("*.so", "lib").flatten(),
    ];
    let outputs = vec![
        BuildOutput::new("core/matrix.h"),
        BuildOutput::new("build/libmatrix.so"),
    ];
    let plan = plan_layout(&outputs, &rules).unwrap();
    let mapping: BTreeMap<&str, &str> = plan
        .placements
        .iter()
        .map(|p| (p.source.as_str(), p.destination.as_str()))
        .collect();
    assert_eq!(mapping["core/matrix.h"], "include/core/matrix.h");
    assert_eq!(mapping["build/libmatrix.so"], "lib/libmatrix.so");
    assert!(plan.unplaced.is_empty());
}

#[test]
fn local_store_backs_the_engine_and_lock() {
    let store = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let layout = StoreLayout::new(store.path());
    layout.initialize().unwrap();
    PackageIndex::new(layout.clone())
        .put(&PackageRecord::new("fmt", "9.1.0"))
        .unwrap();

    let engine = Engine::with_store(store.path()).unwrap();
    let recipe_path = write_recipe(project.path(), MATRIXLIB);
    let result = engine
        .plan(
            &recipe_path,
            &PlanRequest {
                write_lock: true,
                ..request("Linux", &[])
            },
        )
        .unwrap();

    assert_eq!(
        result.build.prefix_paths,
        vec![layout.package_dir("fmt", "9.1.0")]
    );
    let lock_text = fs::read_to_string(project.path().join(LOCK_FILE_NAME)).unwrap();
    assert!(!lock_text.contains(&store.path().display().to_string()));
    let lock = LockFile::read_from_file(project.path().join(LOCK_FILE_NAME)).unwrap();
    assert_eq!(lock.package_id, result.identity.package_id.as_str());

    let err = engine
        .plan(&recipe_path, &request("Linux", &[("build_tests", "true")]))
        .unwrap_err();
    assert!(matches!(err.root(), CoreError::UnresolvedRequirement { .. }));
}

#[test]
fn recipe_edit_is_detected_by_locked_run() {
    let project = tempfile::tempdir().unwrap();
    let engine = memory_engine();
    let recipe_path = write_recipe(project.path(), MATRIXLIB);
    engine
        .plan(
            &recipe_path,
            &PlanRequest {
                write_lock: true,
                ..request("Linux", &[])
            },
        )
        .unwrap();

    write_recipe(
        project.path(),
        &MATRIXLIB.replace("ENABLE_DEVELOPER_MODE = false", "ENABLE_DEVELOPER_MODE = true"),
    );
    let err = engine
        .plan(
            &recipe_path,
            &PlanRequest {
                locked: true,
                ..request("Linux", &[])
            },
        )
        .unwrap_err();
    assert!(err.to_string().contains("drift"), "{err}");
}

#[test]
fn package_copies_build_tree_into_layout() {
    let build = tempfile::tempdir().unwrap();
    let package = tempfile::tempdir().unwrap();
    fs::create_dir_all(build.path().join("matrixes/include")).unwrap();
    fs::create_dir_all(build.path().join("out")).unwrap();
    fs::write(build.path().join("matrixes/include/matrix.h"), "#pragma once\n").unwrap();
    fs::write(build.path().join("out/libmatrix.a"), b"!<arch>\n").unwrap();
    fs::write(build.path().join("out/CMakeCache.txt"), "").unwrap();

    let (plan, copied) = Engine::package(&recipe(), build.path(), package.path()).unwrap();
    assert_eq!(copied, 2);
    assert_eq!(plan.unplaced.len(), 1);
    assert!(package.path().join("include/matrixlib/matrix.h").is_file());
    assert!(package.path().join("lib/libmatrix.a").is_file());
}
