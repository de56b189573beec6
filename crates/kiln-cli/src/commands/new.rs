use super::{json_pretty, EXIT_SUCCESS};
use dialoguer::{Confirm, Input, Select};
use kiln_schema::{get_template, list_templates, parse_recipe_str, PackageReference};
use std::io::{stderr, stdin, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const DEST_RECIPE: &str = "kiln.toml";
const DEFAULT_VERSION: &str = "0.1.0";

/// Render a template for `name`/`version` and check that the result is a valid recipe.
fn render_template(template: &str, name: &str, version: &str) -> Result<String, String> {
    let tpl = get_template(template).ok_or_else(|| {
        let known: Vec<&str> = list_templates().into_iter().map(|(n, _)| n).collect();
        format!(
            "unknown template '{template}' (expected: {})",
            known.join(", ")
        )
    })?;
    let rendered = tpl
        .recipe
        .replacen("name = \"example\"", &format!("name = \"{name}\""), 1)
        .replacen(
            &format!("version = \"{DEFAULT_VERSION}\""),
            &format!("version = \"{version}\""),
            1,
        );
    parse_recipe_str(&rendered)
        .and_then(|r| r.normalize())
        .map_err(|e| format!("template '{template}' does not validate: {e}"))?;
    Ok(rendered)
}

fn write_atomic(dest: &Path, content: &str) -> Result<(), String> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| format!("write temp file: {e}"))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| format!("write temp file: {e}"))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| format!("fsync temp file: {e}"))?;
    tmp.persist(dest)
        .map_err(|e| format!("persist recipe: {}", e.error))?;
    Ok(())
}

fn ensure_can_write(dest: &Path, force: bool, is_tty: bool) -> Result<(), String> {
    if !dest.exists() || force {
        return Ok(());
    }
    let refusal = format!("refusing to overwrite existing ./{DEST_RECIPE} (pass --force)");
    if !is_tty {
        return Err(refusal);
    }
    let overwrite = Confirm::new()
        .with_prompt(format!("overwrite ./{DEST_RECIPE}?"))
        .default(false)
        .interact()
        .map_err(|e| format!("prompt failed: {e}"))?;
    if overwrite {
        Ok(())
    } else {
        Err(refusal)
    }
}

fn prompt_template() -> Result<(String, String), String> {
    let templates = list_templates();
    let items: Vec<String> = templates
        .iter()
        .map(|(name, description)| format!("{name:<14} {description}"))
        .collect();
    let idx = Select::new()
        .with_prompt("template")
        .items(&items)
        .default(0)
        .interact()
        .map_err(|e| format!("prompt failed: {e}"))?;
    let version: String = Input::new()
        .with_prompt("version")
        .default(DEFAULT_VERSION.to_owned())
        .interact_text()
        .map_err(|e| format!("prompt failed: {e}"))?;
    Ok((templates[idx].0.to_owned(), version))
}

pub fn run(name: &str, template: Option<&str>, force: bool, json: bool) -> Result<u8, String> {
    PackageReference::parse(&format!("{name}/{DEFAULT_VERSION}"))
        .map_err(|_| format!("invalid package name '{name}'"))?;

    let dest = Path::new(DEST_RECIPE);
    let is_tty = stdin().is_terminal() && stderr().is_terminal();

    let (template, version) = match template {
        Some(t) => (t.to_owned(), DEFAULT_VERSION.to_owned()),
        None if is_tty => prompt_template()?,
        None => ("minimal".to_owned(), DEFAULT_VERSION.to_owned()),
    };
    let content = render_template(&template, name, &version)?;
    ensure_can_write(dest, force, is_tty)?;
    write_atomic(dest, &content)?;

    if json {
        let payload = serde_json::json!({
            "status": "written",
            "path": format!("./{DEST_RECIPE}"),
            "name": name,
            "version": version,
            "template": template,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("wrote ./{DEST_RECIPE} for '{name}/{version}'");
        println!("template: {template}");
    }
    Ok(EXIT_SUCCESS)
}
