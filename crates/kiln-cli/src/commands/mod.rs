pub mod completions;
pub mod deps;
pub mod id;
pub mod inspect;
pub mod layout;
pub mod lock;
pub mod man_pages;
pub mod new;
pub mod options;
pub mod package;
pub mod plan;
pub mod profiles;
pub mod store;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use kiln_core::{CoreError, Engine, PlanRequest};
use kiln_schema::{parse_assignment, resolve_profile, OptionValue, Recipe};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_RECIPE_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;

/// Settings shared by every command after flags and config are merged.
#[derive(Debug, Clone)]
pub struct Session {
    pub store: PathBuf,
    pub profile: String,
    pub json: bool,
}

impl Session {
    pub fn engine(&self) -> Result<Engine, String> {
        Engine::with_store(&self.store).map_err(|e| describe(&e))
    }
}

/// Recipe path plus the platform and option selection of a resolution run.
#[derive(Debug, Clone, Args)]
pub struct ResolveArgs {
    /// Path to recipe TOML file.
    #[arg(default_value = "kiln.toml")]
    pub recipe: PathBuf,
    /// Profile: a built-in name, a profile file, or `default` for the host.
    #[arg(short, long)]
    pub profile: Option<String>,
    /// Override a setting (repeatable), e.g. -s os=Windows.
    #[arg(short = 's', long = "setting", value_name = "KEY=VALUE")]
    pub settings: Vec<String>,
    /// Override an option (repeatable), e.g. -o shared=true.
    #[arg(short = 'o', long = "option", value_name = "NAME=VALUE")]
    pub options: Vec<String>,
}

impl ResolveArgs {
    /// Build the request: profile settings and options first, then `-s`/`-o`.
    pub fn request(&self, session: &Session) -> Result<PlanRequest, String> {
        let name = self.profile.as_deref().unwrap_or(&session.profile);
        let profile = resolve_profile(name).map_err(|e| format!("profile '{name}': {e}"))?;

        let mut platform = profile.platform();
        platform
            .apply_assignments(&self.settings)
            .map_err(|e| e.to_string())?;

        let mut overrides = profile.options.clone();
        for raw in &self.options {
            let (key, value) = parse_assignment(raw).map_err(|e| e.to_string())?;
            overrides.insert(key, value);
        }

        Ok(PlanRequest {
            platform,
            overrides,
            ..PlanRequest::default()
        })
    }
}

pub fn load_recipe(path: &Path) -> Result<Recipe, String> {
    Engine::load_recipe(path).map_err(|e| describe(&e))
}

/// Render a pipeline error so that store and recipe failures keep their
/// category prefix in front, where the exit code is read from.
pub fn describe(err: &CoreError) -> String {
    match err {
        CoreError::Context {
            package, platform, ..
        } => match err.root() {
            root @ (CoreError::Store(_) | CoreError::Recipe(_)) => {
                format!("{root} (while resolving {package} [{platform}])")
            }
            _ => err.to_string(),
        },
        other => other.to_string(),
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish(pb: &ProgressBar, msg: String) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(msg);
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✗ {msg}"));
}

pub fn colorize_value(value: &OptionValue) -> String {
    use console::Style;
    match value {
        OptionValue::Bool(true) => Style::new().green().apply_to("true").to_string(),
        OptionValue::Bool(false) => Style::new().dim().apply_to("false").to_string(),
        OptionValue::Str(s) => Style::new().cyan().apply_to(s).to_string(),
    }
}

pub fn dim(text: &str) -> String {
    console::Style::new().dim().apply_to(text).to_string()
}
