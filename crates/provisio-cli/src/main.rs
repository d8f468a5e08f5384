mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::run::{RunArgs, Switches};
use commands::{exit_code_for, ManifestArgs, EXIT_FAILURE};
use provisio_core::{install_signal_handler, load_catalog, Engine, ProvisioConfig};
use provisio_runtime::Operation;
use provisio_store::WorkspaceLayout;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "provisio",
    version,
    about = "Compile resource manifests and drive Pulumi or OpenTofu modules"
)]
struct Cli {
    /// Root for workspaces and the module clone cache.
    #[arg(long, global = true, env = "PROVISIO_HOME", value_name = "DIR")]
    home: Option<PathBuf>,

    /// Config file (default: ~/.config/provisio/config.toml).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Extra kind catalog merged over the built-in one.
    #[arg(long, global = true, value_name = "FILE")]
    catalog: Option<PathBuf>,

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
    /// Initialize the engine for a manifest's module and stack.
    Init {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Show the changes the engine would make.
    #[command(visible_alias = "preview")]
    Plan {
        #[command(flatten)]
        run: RunArgs,
        /// Plan a destroy instead of an update.
        #[arg(long, default_value_t = false)]
        destroy: bool,
        /// Show a detailed diff (Pulumi).
        #[arg(long, default_value_t = false)]
        diff: bool,
    },
    /// Create or update the resource.
    #[command(visible_alias = "update")]
    Apply {
        #[command(flatten)]
        run: RunArgs,
        /// Skip the engine's confirmation prompt.
        #[arg(short, long, default_value_t = false)]
        yes: bool,
        /// Show a detailed diff (Pulumi).
        #[arg(long, default_value_t = false)]
        diff: bool,
    },
    /// Tear the resource down.
    Destroy {
        #[command(flatten)]
        run: RunArgs,
        /// Skip the engine's confirmation prompt.
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },
    /// Reconcile engine state with the real resource.
    Refresh {
        #[command(flatten)]
        run: RunArgs,
        /// Skip the engine's confirmation prompt.
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },
    /// Cancel an in-progress update (Pulumi only).
    Cancel {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Remove the stack (Pulumi only).
    #[command(visible_alias = "remove")]
    Delete {
        #[command(flatten)]
        run: RunArgs,
        /// Remove the stack even if it still has resources.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Validate a manifest after overrides and defaults.
    Validate {
        #[command(flatten)]
        manifest: ManifestArgs,
    },
    /// Print Tofu variable declarations for a kind.
    Variables {
        /// Resource kind, e.g. AwsVpc.
        #[arg(long, conflicts_with_all = ["manifest", "input_dir", "kustomize_dir"])]
        kind: Option<String>,
        #[command(flatten)]
        manifest: ManifestArgs,
    },
    /// Print the tfvars document compiled from a manifest.
    Tfvars {
        #[command(flatten)]
        manifest: ManifestArgs,
        /// Write to a file instead of stdout.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Run diagnostic checks on engines, tools and the home directory.
    Doctor,
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

/// Engine for one invocation plus the config file it was built from.
fn build_engine(cli: &Cli) -> Result<(Engine, Option<PathBuf>), String> {
    let (config, config_path) =
        ProvisioConfig::discover(cli.config.as_deref()).map_err(|e| e.to_string())?;
    let home = config
        .resolve_home(cli.home.as_deref())
        .map_err(|e| e.to_string())?;
    let catalog = load_catalog(cli.catalog.as_deref().or(config.catalog.as_deref()))
        .map_err(|e| e.to_string())?;
    tracing::debug!("home {}", home.display());
    let engine = Engine::new(
        catalog,
        WorkspaceLayout::new(home),
        config.binaries(),
        config.module_repo.clone(),
    );
    Ok((engine, config_path))
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
            tracing_subscriber::EnvFilter::try_from_env("PROVISIO_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Completions { shell } => {
            return finish(commands::completions::run::<Cli>(*shell));
        }
        Commands::ManPages { dir } => return finish(commands::man_pages::run::<Cli>(dir)),
        _ => {}
    }

    install_signal_handler();

    let (engine, config_path) = match build_engine(&cli) {
        Ok(built) => built,
        Err(msg) => {
            eprintln!("error: {msg}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    let json = cli.json;

    let result = match &cli.command {
        Commands::Init { run } => {
            commands::run::run(&engine, Operation::Init, run, Switches::default(), json)
        }
        Commands::Plan { run, destroy, diff } => commands::run::run(
            &engine,
            Operation::Plan,
            run,
            Switches {
                destroy_plan: *destroy,
                diff: *diff,
                ..Switches::default()
            },
            json,
        ),
        Commands::Apply { run, yes, diff } => commands::run::run(
            &engine,
            Operation::Apply,
            run,
            Switches {
                yes: *yes,
                diff: *diff,
                ..Switches::default()
            },
            json,
        ),
        Commands::Destroy { run, yes } => commands::run::run(
            &engine,
            Operation::Destroy,
            run,
            Switches {
                yes: *yes,
                ..Switches::default()
            },
            json,
        ),
        Commands::Refresh { run, yes } => commands::run::run(
            &engine,
            Operation::Refresh,
            run,
            Switches {
                yes: *yes,
                ..Switches::default()
            },
            json,
        ),
        Commands::Cancel { run } => {
            commands::run::run(&engine, Operation::Cancel, run, Switches::default(), json)
        }
        Commands::Delete { run, force } => commands::run::run(
            &engine,
            Operation::Remove,
            run,
            Switches {
                force: *force,
                ..Switches::default()
            },
            json,
        ),
        Commands::Validate { manifest } => commands::validate::run(&engine, manifest, json),
        Commands::Variables { kind, manifest } => {
            commands::variables::run(&engine, kind.as_deref(), manifest)
        }
        Commands::Tfvars { manifest, output } => {
            commands::tfvars::run(&engine, manifest, output.as_deref())
        }
        Commands::Doctor => commands::doctor::run(&engine, config_path.as_deref(), json),
        Commands::Completions { .. } | Commands::ManPages { .. } => Ok(commands::EXIT_SUCCESS),
    };

    finish(result)
}

fn finish(result: Result<u8, String>) -> ExitCode {
    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}
