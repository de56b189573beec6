use super::{colorize_value, dim, json_pretty, load_recipe, ResolveArgs, Session, EXIT_SUCCESS};
use kiln_core::{removed_options, resolve_options};

pub fn run(session: &Session, args: &ResolveArgs) -> Result<u8, String> {
    let recipe = load_recipe(&args.recipe)?;
    let request = args.request(session)?;
    let resolved = resolve_options(&recipe, &request.platform, &request.overrides)
        .map_err(|e| e.to_string())?;
    let removed: Vec<&str> = removed_options(&recipe, &request.platform)
        .into_iter()
        .collect();

    if session.json {
        let payload = serde_json::json!({
            "package": recipe.reference(),
            "platform": request.platform,
            "options": resolved,
            "removed": removed,
        });
        println!("{}", json_pretty(&payload)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("{} [{}]", recipe.reference(), request.platform);
    if resolved.is_empty() {
        println!("no options");
    }
    for (name, value) in resolved.iter() {
        println!("  {name:<16} {}", colorize_value(value));
    }
    for name in removed {
        println!("  {name:<16} {}", dim("(removed on this platform)"));
    }
    Ok(EXIT_SUCCESS)
}
