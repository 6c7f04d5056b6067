mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::event::EventKindArg;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "mbranch",
    about = "Keep one project per branch in sync with its repository sources",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .multibranch/)
    #[arg(long, global = true, env = "MBRANCH_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize .multibranch/ in the current directory
    Init {
        /// Container name (default: directory name)
        #[arg(long)]
        name: Option<String>,

        /// Source in priority order: ID=git:REMOTE or ID=manifest:PATH
        #[arg(long = "source", value_name = "SPEC")]
        sources: Vec<String>,
    },

    /// Check the configuration for mistakes
    Validate,

    /// Reconcile every source against the branch projects
    Scan {
        /// Print the reconciliation log
        #[arg(long)]
        log: bool,
    },

    /// Apply a single change notification
    Event {
        #[arg(long, value_enum)]
        kind: EventKindArg,

        /// Source ids the event concerns (default: all)
        #[arg(long = "source", value_name = "ID")]
        sources: Vec<String>,

        /// Affected head as NAME or NAME=REVISION
        #[arg(long = "head", value_name = "HEAD")]
        heads: Vec<String>,

        /// Where the event came from
        #[arg(long, default_value = "cli")]
        origin: String,

        /// Print the reconciliation log
        #[arg(long)]
        log: bool,
    },

    /// List branch projects
    List,

    /// Show one branch project
    Show {
        /// Raw branch name or encoded project name
        name: String,
    },

    /// Print the encoded project name for branch names
    Mangle {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Delete dead branch projects selected by the orphan policy
    Prune,

    /// Request a build of one branch project
    Build {
        /// Raw branch name or encoded project name
        name: String,

        /// Recorded as the requesting user
        #[arg(long, env = "USER", default_value = "cli")]
        user: String,
    },

    /// Scan periodically until interrupted
    Watch {
        /// Seconds between scans
        #[arg(long, default_value = "300")]
        interval: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Watch { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { name, sources } => cmd::init::run(&root, name.as_deref(), &sources),
        Commands::Validate => cmd::validate::run(&root, cli.json),
        Commands::Scan { log } => cmd::scan::run(&root, log, cli.json),
        Commands::Event {
            kind,
            sources,
            heads,
            origin,
            log,
        } => cmd::event::run(&root, kind, &sources, &heads, &origin, log, cli.json),
        Commands::List => cmd::list::run(&root, cli.json),
        Commands::Show { name } => cmd::show::run(&root, &name, cli.json),
        Commands::Mangle { names } => cmd::mangle::run(&names, cli.json),
        Commands::Prune => cmd::prune::run(&root, cli.json),
        Commands::Build { name, user } => cmd::build::run(&root, &name, &user, cli.json),
        Commands::Watch { interval } => cmd::watch::run(&root, interval),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
