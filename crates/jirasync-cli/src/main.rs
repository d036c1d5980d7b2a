mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::sync::SyncArgs;
use jirasync_core::sync::Operation;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "jirasync",
    about = "Keep Markdown issue records and Jira in step: create, pull, push",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from jirasync.yaml or .git/)
    #[arg(long, global = true, env = "JIRASYNC_ROOT")]
    root: Option<PathBuf>,

    /// Env file with JIRA_BASE_URL, JIRA_EMAIL and JIRA_API_TOKEN
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create Jira issues from draft records and rename them with their keys
    Create {
        #[command(flatten)]
        args: SyncArgs,
    },

    /// Overwrite local records with the current Jira state
    Pull {
        #[command(flatten)]
        args: SyncArgs,
    },

    /// Send changed fields and status to Jira
    Push {
        #[command(flatten)]
        args: SyncArgs,

        /// Leave workflow status untouched
        #[arg(long)]
        no_transition: bool,
    },

    /// Validate records offline
    Check {
        /// Record files or glob patterns
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Write a new draft record
    New {
        /// Issue type: epic, feature, story or subtask
        #[arg(long = "type")]
        issue_type: String,

        /// Issue title, also used in the file name
        title: String,

        /// Directory to write into (default: current directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Write jirasync.yaml and .env.example and ignore .env
    Init,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level.as_str())),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let env_file = cli.env_file.as_deref();

    let result = match cli.command {
        Commands::Create { args } => {
            cmd::sync::run(&root, env_file, Operation::Create, args, false, cli.json)
        }
        Commands::Pull { args } => {
            cmd::sync::run(&root, env_file, Operation::Pull, args, false, cli.json)
        }
        Commands::Push {
            args,
            no_transition,
        } => cmd::sync::run(&root, env_file, Operation::Push, args, no_transition, cli.json),
        Commands::Check { files } => cmd::check::run(&root, &files, cli.json),
        Commands::New {
            issue_type,
            title,
            dir,
        } => cmd::new::run(&root, &issue_type, &title, dir.as_deref(), cli.json),
        Commands::Init => cmd::init::run(&root),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
