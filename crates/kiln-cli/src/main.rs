mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{ResolveArgs, Session, EXIT_FAILURE, EXIT_RECIPE_ERROR, EXIT_STORE_ERROR};
use kiln_core::KilnConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(
    name = "kiln",
    version,
    about = "Resolve package recipes into reproducible build and install plans"
)]
struct Cli {
    /// Path to the local package store (default: ~/.local/share/kiln).
    #[arg(long, global = true)]
    store: Option<String>,

    /// Path to the user config file (default: ~/.config/kiln/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a new kiln.toml from a template.
    New {
        /// Package name.
        name: String,
        /// Template to start from (minimal, cmake-library, header-only).
        #[arg(long)]
        template: Option<String>,
        /// Overwrite an existing kiln.toml.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Show a recipe as declared.
    Inspect {
        /// Path to recipe TOML file.
        #[arg(default_value = "kiln.toml")]
        recipe: PathBuf,
    },
    /// Show the effective option values for a platform.
    Options(ResolveArgs),
    /// Show the ordered dependency set for a platform.
    Deps(ResolveArgs),
    /// Show cache variables, build steps, and the commands that run them.
    Plan {
        #[command(flatten)]
        resolve: ResolveArgs,
        /// Source directory used when rendering commands.
        #[arg(long, default_value = ".")]
        source_dir: PathBuf,
        /// Build directory used when rendering commands.
        #[arg(long, default_value = "build")]
        build_dir: PathBuf,
    },
    /// Show where each build output would be placed in the package.
    Layout {
        /// Path to recipe TOML file.
        #[arg(default_value = "kiln.toml")]
        recipe: PathBuf,
        /// Build tree to scan.
        #[arg(long, default_value = "build")]
        build_dir: PathBuf,
    },
    /// Copy build outputs into the package layout.
    Package {
        /// Path to recipe TOML file.
        #[arg(default_value = "kiln.toml")]
        recipe: PathBuf,
        /// Build tree to scan.
        #[arg(long, default_value = "build")]
        build_dir: PathBuf,
        /// Destination directory (ignored with --install).
        #[arg(long, default_value = "package")]
        dest: PathBuf,
        /// Install into the local store instead of --dest.
        #[arg(long, default_value_t = false)]
        install: bool,
        /// Fail if any build output matches no install rule.
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
    /// Resolve and write kiln.lock next to the recipe.
    Lock {
        #[command(flatten)]
        resolve: ResolveArgs,
        /// Verify the existing lock instead of writing it.
        #[arg(long, default_value_t = false)]
        check: bool,
    },
    /// Print the package id for a platform.
    Id {
        #[command(flatten)]
        resolve: ResolveArgs,
        /// Require the resolved plan to match kiln.lock.
        #[arg(long, default_value_t = false)]
        locked: bool,
    },
    /// List built-in profiles, or show one.
    Profiles {
        /// Profile name to show.
        name: Option<String>,
    },
    /// Manage the local package store.
    #[command(subcommand)]
    Store(StoreCommand),
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum StoreCommand {
    /// Register a package version in the store.
    Add {
        /// Package reference, e.g. fmt/9.1.0.
        reference: String,
        #[arg(long)]
        description: Option<String>,
        /// Library name provided by the package (repeatable).
        #[arg(long = "lib")]
        libs: Vec<String>,
        /// Include directory relative to the package root (repeatable).
        #[arg(long = "include-dir")]
        include_dirs: Vec<String>,
    },
    /// List packages in the store.
    List,
    /// Remove a package version from the store.
    Remove {
        /// Package reference, e.g. fmt/9.1.0.
        reference: String,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("KILN_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let session = match load_session(&cli) {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("error: {msg}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let result = match cli.command {
        Commands::New {
            name,
            template,
            force,
        } => commands::new::run(&name, template.as_deref(), force, session.json),
        Commands::Inspect { recipe } => commands::inspect::run(&recipe, session.json),
        Commands::Options(resolve) => commands::options::run(&session, &resolve),
        Commands::Deps(resolve) => commands::deps::run(&session, &resolve),
        Commands::Plan {
            resolve,
            source_dir,
            build_dir,
        } => commands::plan::run(&session, &resolve, &source_dir, &build_dir),
        Commands::Layout { recipe, build_dir } => {
            commands::layout::run(&recipe, &build_dir, session.json)
        }
        Commands::Package {
            recipe,
            build_dir,
            dest,
            install,
            strict,
        } => commands::package::run(&session, &recipe, &build_dir, &dest, install, strict),
        Commands::Lock { resolve, check } => commands::lock::run(&session, &resolve, check),
        Commands::Id { resolve, locked } => commands::id::run(&session, &resolve, locked),
        Commands::Profiles { name } => commands::profiles::run(name.as_deref(), session.json),
        Commands::Store(StoreCommand::Add {
            reference,
            description,
            libs,
            include_dirs,
        }) => commands::store::add(
            &session,
            &reference,
            description.as_deref(),
            &libs,
            &include_dirs,
        ),
        Commands::Store(StoreCommand::List) => commands::store::list(&session),
        Commands::Store(StoreCommand::Remove { reference }) => {
            commands::store::remove(&session, &reference)
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("recipe error:")
                || msg.starts_with("failed to parse recipe")
                || msg.starts_with("failed to read recipe")
            {
                EXIT_RECIPE_ERROR
            } else if msg.starts_with("store error:") || msg.starts_with("store lock:") {
                EXIT_STORE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

/// Merge flags over the user config over built-in defaults.
fn load_session(cli: &Cli) -> Result<Session, String> {
    let config = match &cli.config {
        Some(path) => KilnConfig::load(path).map_err(|e| e.to_string())?,
        None => KilnConfig::load_default().map_err(|e| e.to_string())?,
    };
    let store = match &cli.store {
        Some(path) => expand_tilde(path),
        None => config.store_root().map_err(|e| e.to_string())?,
    };
    debug!(
        "store {} profile {}",
        store.display(),
        config.profile_name()
    );
    Ok(Session {
        store,
        profile: config.profile_name().to_owned(),
        json: cli.json,
    })
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
