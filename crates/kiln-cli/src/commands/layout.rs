use super::{describe, dim, json_pretty, load_recipe, EXIT_SUCCESS};
use kiln_core::{Engine, LayoutPlan};
use std::path::Path;

pub fn print_plan(plan: &LayoutPlan) {
    for placement in &plan.placements {
        println!(
            "  {} -> {} {}",
            placement.source,
            placement.destination,
            dim(&format!("({})", placement.kind.as_str()))
        );
    }
    for output in &plan.unplaced {
        println!("  {} {}", output.path, dim("(no matching install rule)"));
    }
}

pub fn run(recipe_path: &Path, build_dir: &Path, json: bool) -> Result<u8, String> {
    let recipe = load_recipe(recipe_path)?;
    if !build_dir.is_dir() {
        return Err(format!("build directory {} not found", build_dir.display()));
    }
    let plan = Engine::layout(&recipe, build_dir).map_err(|e| describe(&e))?;

    if json {
        println!("{}", json_pretty(&plan)?);
    } else {
        println!(
            "{}: {} placed, {} unplaced",
            recipe.reference(),
            plan.placements.len(),
            plan.unplaced.len()
        );
        print_plan(&plan);
    }
    Ok(EXIT_SUCCESS)
}
