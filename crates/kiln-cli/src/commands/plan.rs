use super::{describe, json_pretty, load_recipe, ResolveArgs, Session, EXIT_SUCCESS};
use std::path::Path;

pub fn run(
    session: &Session,
    args: &ResolveArgs,
    source_dir: &Path,
    build_dir: &Path,
) -> Result<u8, String> {
    let recipe = load_recipe(&args.recipe)?;
    let request = args.request(session)?;
    let engine = session.engine()?;
    let result = engine
        .resolve(&recipe, &request)
        .map_err(|e| describe(&e))?;
    let commands = result.build.command_lines(source_dir, build_dir);

    if session.json {
        let payload = serde_json::json!({
            "package": recipe.reference(),
            "platform": result.platform,
            "generator": result.build.generator,
            "cache_variables": result.build.effective_cache_variables(),
            "steps": result.build.steps,
            "commands": commands,
        });
        println!("{}", json_pretty(&payload)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("{} [{}]", recipe.reference(), result.platform);
    if let Some(generator) = &result.build.generator {
        println!("generator: {generator}");
    }
    println!("cache variables:");
    for (name, value) in result.build.effective_cache_variables() {
        println!("  {name} = {}", value.to_cmake());
    }
    println!("steps:");
    for command in &commands {
        println!("  [{}] {}", command.step, command.argv.join(" "));
    }
    Ok(EXIT_SUCCESS)
}
