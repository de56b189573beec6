use super::layout::print_plan;
use super::{
    describe, json_pretty, load_recipe, spin_fail, spin_ok, spinner, Session, EXIT_SUCCESS,
};
use kiln_core::{lock_path_for, Engine};
use kiln_schema::LockFile;
use kiln_store::{PackageIndex, PackageRecord, StoreLayout, StoreLock};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Remove a half-installed package directory.
fn discard(target: &Path) {
    if let Err(e) = std::fs::remove_dir_all(target) {
        warn!("failed to clean up {}: {e}", target.display());
    }
}

pub fn run(
    session: &Session,
    recipe_path: &Path,
    build_dir: &Path,
    dest: &Path,
    install: bool,
    strict: bool,
) -> Result<u8, String> {
    let recipe = load_recipe(recipe_path)?;
    if !build_dir.is_dir() {
        return Err(format!("build directory {} not found", build_dir.display()));
    }

    let layout = Engine::layout(&recipe, build_dir).map_err(|e| describe(&e))?;
    if strict && !layout.is_complete() {
        return Err(format!(
            "{} build output(s) match no install rule (first: {})",
            layout.unplaced.len(),
            layout.unplaced[0].path
        ));
    }

    let store_layout = StoreLayout::new(&session.store);
    let record = if install {
        let mut record = PackageRecord::new(&recipe.name, &recipe.version);
        record.description.clone_from(&recipe.description);
        record.libs.clone_from(&recipe.package_info.libs);
        record.include_dirs.clone_from(&recipe.package_info.include_dirs);
        record.package_id = LockFile::read_from_file(lock_path_for(recipe_path))
            .ok()
            .map(|lock| lock.package_id);
        record.validate().map_err(|e| format!("store error: {e}"))?;
        Some(record)
    } else {
        None
    };

    let _lock = if install {
        store_layout
            .initialize()
            .map_err(|e| format!("store error: {e}"))?;
        Some(StoreLock::acquire(&store_layout.lock_file()).map_err(|e| format!("store lock: {e}"))?)
    } else {
        None
    };
    let target: PathBuf = if install {
        store_layout.package_dir(&recipe.name, &recipe.version)
    } else {
        dest.to_path_buf()
    };

    let pb = if session.json {
        None
    } else {
        Some(spinner("copying build outputs..."))
    };
    let copied = match layout.apply(build_dir, &target) {
        Ok(n) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &format!("{n} file(s) packaged"));
            }
            n
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "packaging failed");
            }
            if install {
                discard(&target);
            }
            return Err(describe(&e));
        }
    };

    if let Some(record) = &record {
        if let Err(e) = PackageIndex::new(store_layout).put(record) {
            discard(&target);
            return Err(format!("store error: {e}"));
        }
    }

    if session.json {
        let payload = serde_json::json!({
            "package": recipe.reference(),
            "destination": target,
            "copied": copied,
            "installed": install,
            "placements": layout.placements,
            "unplaced": layout.unplaced,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        print_plan(&layout);
        if install {
            println!("installed {} into {}", recipe.reference(), target.display());
        } else {
            println!("packaged {} into {}", recipe.reference(), target.display());
        }
    }
    Ok(EXIT_SUCCESS)
}
