mod action_commands;
mod plugin_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    kadai_config::{KadaiConfig, KadaiPaths},
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "kadai", version, about = "kadai: run your project's scripts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Project directory (defaults to the nearest ancestor holding `.kadai`).
    #[arg(short = 'C', long, global = true, env = "KADAI_PROJECT")]
    project: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available actions.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Include hidden actions.
        #[arg(long)]
        all: bool,
    },
    /// Run an action by id.
    Run {
        /// Action id, e.g. `db/reset` or `tasks:deploy`.
        id: String,
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
        /// Extra arguments passed to the script.
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Fetch or refresh configured plugins.
    Sync,
    /// Show configured plugins and their cached versions.
    Plugins {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Paths and config for this invocation.
pub(crate) struct Project {
    pub paths: KadaiPaths,
    pub config: KadaiConfig,
}

impl Project {
    fn discover(dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let cwd = match dir {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        let paths = KadaiPaths::discover(&cwd);
        let config = kadai_config::discover_and_load(&paths);
        debug!(
            root = %paths.project_root.display(),
            plugins = config.plugins.len(),
            "project resolved"
        );
        Ok(Self { paths, config })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    let project = Project::discover(cli.project)?;

    match cli.command {
        Commands::List { json, all } => action_commands::list(&project, json, all),
        Commands::Run { id, yes, args } => {
            let code = action_commands::run(&project, &id, yes, &args).await?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        },
        Commands::Sync => plugin_commands::sync(&project).await,
        Commands::Plugins { json } => plugin_commands::list(&project, json),
    }
}
