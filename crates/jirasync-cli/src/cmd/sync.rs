use crate::output::{print_json, print_report};
use anyhow::Context;
use clap::Args;
use jirasync_core::client::JiraClient;
use jirasync_core::config::{self, Config, Credentials};
use jirasync_core::paths;
use jirasync_core::schema::IssueType;
use jirasync_core::sync::{Engine, Operation, SyncOptions};
use std::path::Path;

#[derive(Args)]
pub struct SyncArgs {
    /// Record files or glob patterns (e.g. "epics/**/*.md")
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Only process records of this type: epic, feature, story or subtask
    #[arg(long = "type")]
    pub issue_type: Option<String>,

    /// Show what would change without sending anything to Jira
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(
    root: &Path,
    env_file: Option<&Path>,
    op: Operation,
    args: SyncArgs,
    no_transition: bool,
    json: bool,
) -> anyhow::Result<()> {
    let only_type = args
        .issue_type
        .as_deref()
        .map(str::parse::<IssueType>)
        .transpose()?;

    if let Some(path) = config::load_env_file(env_file, root)? {
        tracing::info!(path = %path.display(), "credentials loaded from env file");
    }
    let creds = Credentials::from_env()?;
    let cfg = Config::load(root).context("failed to load jirasync.yaml")?;
    let files = paths::expand_patterns(&args.files)?;

    let client = JiraClient::new(&creds)?;
    let opts = SyncOptions {
        dry_run: args.dry_run,
        no_transition,
        only_type,
    };
    tracing::info!(op = %op, files = files.len(), dry_run = opts.dry_run, "starting batch");
    let report = Engine::new(&client, &cfg, opts).run(op, &files);

    if json {
        print_json(&report)?;
    } else {
        print_report(&report)?;
    }

    if report.has_failures() {
        anyhow::bail!(
            "{} of {} file(s) failed to {op}",
            report.failed(),
            report.files.len()
        );
    }
    Ok(())
}
