use super::{json_pretty, EXIT_SUCCESS};
use kiln_schema::{list_builtin_profiles, resolve_profile};

pub fn run(name: Option<&str>, json: bool) -> Result<u8, String> {
    let Some(name) = name else {
        let profiles = list_builtin_profiles();
        if json {
            let payload: Vec<_> = profiles
                .iter()
                .map(|(n, d)| serde_json::json!({ "name": n, "description": d }))
                .collect();
            println!("{}", json_pretty(&payload)?);
        } else {
            println!("{:<22} host platform, release build", "default");
            for (n, d) in profiles {
                println!("{n:<22} {d}");
            }
        }
        return Ok(EXIT_SUCCESS);
    };

    let profile = resolve_profile(name).map_err(|e| format!("profile '{name}': {e}"))?;
    if json {
        println!("{}", json_pretty(&profile)?);
    } else {
        println!("[settings]");
        for (axis, value) in &profile.settings {
            println!("{axis} = \"{value}\"");
        }
        if !profile.options.is_empty() {
            println!("\n[options]");
            for (option, value) in &profile.options {
                println!("{option} = \"{value}\"");
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
