use crate::CoreError;
use kiln_schema::{InstallRule, RecipeError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path};
use tracing::{debug, warn};

/// Classification of a build output by file name.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Header,
    SharedLibrary,
    StaticLibrary,
    Other,
}

impl FileKind {
    pub fn of(path: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path);
        let ext = name.rsplit_once('.').map_or("", |(_, ext)| ext);
        match ext {
            "h" | "hh" | "hpp" | "hxx" => FileKind::Header,
            "so" | "dylib" | "dll" => FileKind::SharedLibrary,
            "a" | "lib" => FileKind::StaticLibrary,
            _ if is_versioned_shared_object(name) => FileKind::SharedLibrary,
            _ => FileKind::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Header => "header",
            FileKind::SharedLibrary => "shared library",
            FileKind::StaticLibrary => "static library",
            FileKind::Other => "other",
        }
    }
}

/// `libfoo.so.1` and `libfoo.so.1.2.3`.
fn is_versioned_shared_object(name: &str) -> bool {
    name.split_once(".so.").is_some_and(|(stem, version)| {
        !stem.is_empty()
            && !version.is_empty()
            && version
                .split('.')
                .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
    })
}

/// A file produced by the build, relative to the build tree root with `/` separators.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct BuildOutput {
    pub path: String,
    pub kind: FileKind,
}

impl BuildOutput {
    pub fn new(path: &str) -> Self {
        let path = path.replace('\\', "/");
        let path = path.trim_start_matches("./").to_owned();
        let kind = FileKind::of(&path);
        Self { path, kind }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Placement {
    pub source: String,
    pub destination: String,
    pub kind: FileKind,
    /// Index of the install rule that placed the file.
    pub rule: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct LayoutPlan {
    pub placements: Vec<Placement>,
    pub unplaced: Vec<BuildOutput>,
}

/// Relative path of `path` below `src`, or the whole path when `src` is unset.
fn relative_to<'a>(path: &'a str, src: Option<&str>) -> Option<&'a str> {
    match src {
        None | Some("") => Some(path),
        Some(prefix) => path
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty()),
    }
}

/// Map build outputs to their places in the package tree.
///
/// Each output is placed by the first rule whose `src` directory contains it
/// and whose pattern matches its path relative to `src`. Outputs no rule
/// matches are reported in [`LayoutPlan::unplaced`] and logged; they are not
/// an error.
pub fn plan_layout(outputs: &[BuildOutput], rules: &[InstallRule]) -> Result<LayoutPlan, CoreError> {
    let patterns = rules
        .iter()
        .map(|rule| {
            glob::Pattern::new(&rule.pattern).map_err(|e| {
                CoreError::Recipe(RecipeError::InvalidPattern {
                    pattern: rule.pattern.clone(),
                    reason: e.to_string(),
                })
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut plan = LayoutPlan::default();
    let mut claimed: BTreeMap<String, String> = BTreeMap::new();

    for output in outputs {
        let placed = rules.iter().zip(&patterns).enumerate().find_map(|(idx, (rule, pattern))| {
            let relative = relative_to(&output.path, rule.src.as_deref())?;
            if !pattern.matches(relative) {
                return None;
            }
            let tail = if rule.keep_path {
                relative
            } else {
                relative.rsplit('/').next().unwrap_or(relative)
            };
            Some(Placement {
                source: output.path.clone(),
                destination: format!("{}/{tail}", rule.dst),
                kind: output.kind,
                rule: idx,
            })
        });

        match placed {
            Some(placement) => {
                debug!("{} -> {}", placement.source, placement.destination);
                if let Some(previous) =
                    claimed.insert(placement.destination.clone(), placement.source.clone())
                {
                    warn!(
                        "{} and {} both install to {}; the later one wins",
                        previous, placement.source, placement.destination
                    );
                }
                plan.placements.push(placement);
            }
            None => {
                warn!(
                    "build output '{}' ({}) matches no install rule; not packaged",
                    output.path,
                    output.kind.as_str()
                );
                plan.unplaced.push(output.clone());
            }
        }
    }

    Ok(plan)
}

/// Recursively list the files under `dir`, sorted by path. Symlinks to files
/// are listed like the files they point at; symlinked directories are not
/// descended into.
pub fn collect_outputs(dir: &Path) -> Result<Vec<BuildOutput>, CoreError> {
    let mut outputs = Vec::new();
    if dir.is_dir() {
        walk(dir, dir, &mut outputs)?;
    }
    outputs.sort();
    Ok(outputs)
}

fn walk(base: &Path, current: &Path, outputs: &mut Vec<BuildOutput>) -> Result<(), CoreError> {
    for entry in fs::read_dir(current)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(base, &path, outputs)?;
            continue;
        }
        if file_type.is_symlink() {
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => {
                    warn!("not following directory symlink {}", path.display());
                    continue;
                }
                Err(e) => {
                    warn!("skipping broken symlink {}: {e}", path.display());
                    continue;
                }
            }
        } else if !file_type.is_file() {
            continue;
        }
        let rel = path.strip_prefix(base).unwrap_or(&path);
        let rel: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        outputs.push(BuildOutput::new(&rel.join("/")));
    }
    Ok(())
}

fn is_contained(relative: &str) -> bool {
    Path::new(relative)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

impl LayoutPlan {
    pub fn is_complete(&self) -> bool {
        self.unplaced.is_empty()
    }

    /// Destinations grouped by file kind, for summaries.
    pub fn counts_by_kind(&self) -> BTreeMap<FileKind, usize> {
        let mut counts = BTreeMap::new();
        for placement in &self.placements {
            *counts.entry(placement.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Copy every placed file from `src_root` into `dest_root`. Returns the
    /// number of files copied.
    pub fn apply(&self, src_root: &Path, dest_root: &Path) -> Result<usize, CoreError> {
        for placement in &self.placements {
            if !is_contained(&placement.destination) || !is_contained(&placement.source) {
                return Err(CoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!(
                        "refusing to copy '{}' to '{}': path escapes its root",
                        placement.source, placement.destination
                    ),
                )));
            }
        }

        let mut copied = 0;
        for placement in &self.placements {
            let from = src_root.join(&placement.source);
            let to = dest_root.join(&placement.destination);
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&from, &to)?;
            copied += 1;
        }
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::matrixlib;

    fn outputs(paths: &[&str]) -> Vec<BuildOutput> {
        paths.iter().map(|p| BuildOutput::new(p)).collect()
    }

    fn destinations(plan: &LayoutPlan) -> Vec<(&str, &str)> {
        plan.placements
            .iter()
            .map(|p| (p.source.as_str(), p.destination.as_str()))
            .collect()
    }

    #[test]
    fn file_kinds() {
        assert_eq!(FileKind::of("core/matrix.h"), FileKind::Header);
        assert_eq!(FileKind::of("matrix.hpp"), FileKind::Header);
        assert_eq!(FileKind::of("build/libmatrix.so"), FileKind::SharedLibrary);
        assert_eq!(FileKind::of("build/libmatrix.so.1.2"), FileKind::SharedLibrary);
        assert_eq!(FileKind::of("bin/matrix.dll"), FileKind::SharedLibrary);
        assert_eq!(FileKind::of("libmatrix.a"), FileKind::StaticLibrary);
        assert_eq!(FileKind::of("matrix.lib"), FileKind::StaticLibrary);
        assert_eq!(FileKind::of("CMakeCache.txt"), FileKind::Other);
        assert_eq!(FileKind::of("notes.so.txt"), FileKind::Other);
    }

    #[test]
    fn keep_path_and_flatten() {
        let rules = vec![
            InstallRule::new("*.h", "include"),
            InstallRule::new("*.so", "lib").flatten(),
        ];
        let plan = plan_layout(&outputs(&["core/matrix.h", "build/libmatrix.so"]), &rules).unwrap();
        assert_eq!(
            destinations(&plan),
            vec![
                ("core/matrix.h", "include/core/matrix.h"),
                ("build/libmatrix.so", "lib/libmatrix.so"),
            ]
        );
        assert!(plan.is_complete());
    }

    #[test]
    fn src_prefix_scopes_rule() {
        let plan = plan_layout(
            &outputs(&["matrixes/include/matrix.h", "tests/helper.h"]),
            &matrixlib().install,
        )
        .unwrap();
        assert_eq!(
            destinations(&plan),
            vec![("matrixes/include/matrix.h", "include/matrixlib/matrix.h")]
        );
        assert_eq!(plan.unplaced, outputs(&["tests/helper.h"]));
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = vec![
            InstallRule::new("*.so", "lib").flatten(),
            InstallRule::new("*", "share"),
        ];
        let plan = plan_layout(&outputs(&["out/libm.so", "out/readme.txt"]), &rules).unwrap();
        assert_eq!(plan.placements[0].rule, 0);
        assert_eq!(plan.placements[1].destination, "share/out/readme.txt");
        assert_eq!(plan.placements[1].rule, 1);
    }

    #[test]
    fn unmatched_outputs_are_reported() {
        let rules = vec![InstallRule::new("*.h", "include")];
        let plan = plan_layout(&outputs(&["build/CMakeCache.txt"]), &rules).unwrap();
        assert!(plan.placements.is_empty());
        assert_eq!(plan.unplaced.len(), 1);
        assert!(!plan.is_complete());
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let rules = vec![InstallRule::new("[", "include")];
        assert!(plan_layout(&outputs(&["a.h"]), &rules).is_err());
    }

    #[test]
    fn collect_and_apply() {
        let build = tempfile::tempdir().unwrap();
        fs::create_dir_all(build.path().join("core")).unwrap();
        fs::create_dir_all(build.path().join("build")).unwrap();
        fs::write(build.path().join("core/matrix.h"), "#pragma once\n").unwrap();
        fs::write(build.path().join("build/libmatrix.so"), b"\x7fELF").unwrap();

        let found = collect_outputs(build.path()).unwrap();
        assert_eq!(found, outputs(&["build/libmatrix.so", "core/matrix.h"]));

        let rules = vec![
            InstallRule::new("*.h", "include"),
            InstallRule::new("*.so", "lib").flatten(),
        ];
        let plan = plan_layout(&found, &rules).unwrap();
        let package = tempfile::tempdir().unwrap();
        assert_eq!(plan.apply(build.path(), package.path()).unwrap(), 2);
        assert!(package.path().join("include/core/matrix.h").is_file());
        assert!(package.path().join("lib/libmatrix.so").is_file());
        assert_eq!(plan.counts_by_kind()[&FileKind::Header], 1);
    }

    #[test]
    fn apply_refuses_escaping_destinations() {
        let rules = vec![InstallRule::new("*.h", "../outside")];
        let plan = plan_layout(&outputs(&["a.h"]), &rules).unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(plan.apply(dir.path(), dir.path()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_library_is_collected_and_packaged() {
        let build = tempfile::tempdir().unwrap();
        fs::create_dir_all(build.path().join("out")).unwrap();
        fs::write(build.path().join("out/libmatrix.so.1"), b"\x7fELF").unwrap();
        std::os::unix::fs::symlink("libmatrix.so.1", build.path().join("out/libmatrix.so"))
            .unwrap();
        std::os::unix::fs::symlink("missing.so.2", build.path().join("out/libdangling.so"))
            .unwrap();

        let found = collect_outputs(build.path()).unwrap();
        assert_eq!(found, outputs(&["out/libmatrix.so", "out/libmatrix.so.1"]));

        let rules = vec![
            InstallRule::new("*.so", "lib").flatten(),
            InstallRule::new("*.so.*", "lib").flatten(),
        ];
        let plan = plan_layout(&found, &rules).unwrap();
        assert!(plan.is_complete());
        let package = tempfile::tempdir().unwrap();
        assert_eq!(plan.apply(build.path(), package.path()).unwrap(), 2);
        assert!(package.path().join("lib/libmatrix.so").is_file());
    }
}
