use super::{dim, json_pretty, load_recipe, EXIT_SUCCESS};
use std::path::Path;

pub fn run(recipe_path: &Path, json: bool) -> Result<u8, String> {
    let recipe = load_recipe(recipe_path)?;
    if json {
        println!("{}", json_pretty(&recipe)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("package:     {}", recipe.reference());
    if let Some(description) = &recipe.description {
        println!("description: {description}");
    }
    if let Some(license) = &recipe.license {
        println!("license:     {license}");
    }
    if let Some(source) = &recipe.source {
        match &source.checkout {
            Some(checkout) => println!("source:      {} @ {checkout}", source.git),
            None => println!("source:      {}", source.git),
        }
    }
    let settings: Vec<&str> = recipe.settings.iter().map(String::as_str).collect();
    println!("settings:    {}", settings.join(", "));

    if !recipe.options.is_empty() {
        println!("options:");
        for (name, domain) in &recipe.options {
            let default = recipe
                .default_options
                .get(name)
                .map_or_else(|| dim("(no default)"), ToString::to_string);
            println!("  {name:<16} {:<16} default {default}", domain.to_string());
        }
    }
    for rule in &recipe.option_rules {
        let when: Vec<String> = rule
            .remove_when
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        println!("  {} removed when {}", rule.option, when.join(" "));
    }

    if !recipe.requires.is_empty() {
        println!("requires:");
        for requirement in &recipe.requires {
            println!("  {requirement}");
        }
    }

    let steps: Vec<&str> = recipe.toolchain.steps.iter().map(|s| s.as_str()).collect();
    println!("steps:       {}", steps.join(" -> "));
    if let Some(generator) = &recipe.toolchain.generator {
        println!("generator:   {generator}");
    }

    if !recipe.install.is_empty() {
        println!("install:");
        for rule in &recipe.install {
            let from = rule.src.as_deref().unwrap_or(".");
            let mode = if rule.keep_path { "" } else { " (flatten)" };
            println!("  {from}/{} -> {}/{mode}", rule.pattern, rule.dst);
        }
    }
    Ok(EXIT_SUCCESS)
}
