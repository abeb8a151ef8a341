//! Operator CLI over the extension registry.
//!
//! # Responsibility
//! - Wire a `RegistryConfig` into an `Environment`.
//! - Expose detect/list/activate/deactivate/load without adding behavior.

use clap::{Parser, Subcommand};
use extension_core::{
    core_version, init_logging, Collaborators, Environment, RegistryConfig, ShellBootstrapHook,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Discover, activate and start extensions.
#[derive(Parser, Debug)]
#[command(name = "extension")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// JSON registry config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project root used when no config file is given.
    #[arg(short, long, global = true, default_value = ".")]
    base: PathBuf,

    /// Extra search-path pattern, searched after the configured ones.
    #[arg(short, long = "path", global = true)]
    paths: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan search paths and record the available extensions.
    Detect,
    /// Show available extensions and their activation state.
    List,
    /// Mark an available extension as active.
    Activate { name: String },
    /// Remove an extension from the active set.
    Deactivate { name: String },
    /// Start every active extension, then shut them down.
    Load {
        /// Run `src/<bootstrap entry>` scripts through `sh`.
        #[arg(long)]
        run_bootstrap: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), String> {
    let config = match &args.config {
        Some(path) => RegistryConfig::from_json_file(path).map_err(|err| err.to_string())?,
        None => RegistryConfig::for_base(&args.base),
    };
    if let Some(log_dir) = &config.log_dir {
        init_logging(&config.log_level, &log_dir.to_string_lossy())?;
    }
    log::info!(
        "event=cli_start module=cli status=ok version={} command={:?}",
        core_version(),
        args.command
    );

    let mut collaborators = Collaborators::default();
    if let Command::Load {
        run_bootstrap: true,
    } = args.command
    {
        collaborators.bootstrap = Arc::new(ShellBootstrapHook::new());
    }
    let mut env = Environment::from_config(&config, collaborators).map_err(|err| err.to_string())?;
    for path in &args.paths {
        env.finder_mut().add_path(path.as_str());
    }
    if !env.store().is_durable() {
        eprintln!("warning: state store unavailable, changes will not persist");
    }

    match args.command {
        Command::Detect => {
            let catalog = env.detect().map_err(|err| err.to_string())?;
            for (name, descriptor) in &catalog {
                println!("{name}\t{}", descriptor.path.display());
            }
            println!("{} extension(s) available", catalog.len());
        }
        Command::List => {
            let available = env.available().map_err(|err| err.to_string())?;
            let active = env.active().map_err(|err| err.to_string())?;
            for (name, descriptor) in &available {
                let state = if active.contains_key(name) {
                    "active"
                } else {
                    "available"
                };
                println!("{name}\t{}\t{state}", descriptor.metadata.version);
            }
            for name in active.keys().filter(|name| !available.contains_key(*name)) {
                println!("{name}\t-\tstale");
            }
        }
        Command::Activate { name } => {
            if !env.activate(&name).map_err(|err| err.to_string())? {
                return Err(format!("extension `{name}` is not available; run `detect` first"));
            }
            println!("activated {name}");
        }
        Command::Deactivate { name } => {
            let was_active = env.deactivate(&name).map_err(|err| err.to_string())?;
            println!(
                "{} {name}",
                if was_active { "deactivated" } else { "already inactive:" }
            );
        }
        Command::Load { .. } => {
            let started = env.load().map_err(|err| err.to_string())?;
            for name in env.started_names() {
                println!("started {name}");
            }
            env.shutdown().map_err(|err| err.to_string())?;
            println!("{started} extension(s) started and shut down");
        }
    }

    Ok(())
}
