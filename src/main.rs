mod config;
mod grouping;
mod orchestrator;
mod paths;
mod report;
mod source;
mod storage;

use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info, info_span};
use tracing_subscriber::EnvFilter;

/// Config Blob Sync mirrors tenant/device configuration files changed by a
/// push into the matching Azure Blob Storage containers.
///
/// Trigger inputs come from the environment: REPOSITORY_ACCESS_TOKEN,
/// REPO_NAME, BRANCH_REF, BEFORE_COMMIT_SHA and AFTER_COMMIT_SHA.
#[derive(Parser, Debug)]
#[command(name = "config-blob-sync", version, about)]
struct Cli {
    /// Path to a TOML config file (defaults to .config-sync.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Optional output file path for a markdown run summary
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// GitHub API root, for GitHub Enterprise
    #[arg(long, default_value = source::github::GITHUB_API_URL)]
    github_api_url: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let env = config::Environment::capture();
    let trigger = config::TriggerContext::from_env(&env)?;

    let _main_span = info_span!("config_sync", repository = %trigger.repository).entered();
    info!(
        branch = %trigger.branch_ref,
        before = %trigger.before_commit,
        after = %trigger.after_commit,
        "starting configuration sync"
    );

    info!("loading configuration");
    let config = config::Config::load(cli.config.as_deref())?;
    debug!(?config, "loaded configuration");

    info!("connecting to GitHub");
    let github = source::GitHubClient::new(&trigger.repository, &trigger.access_token)?
        .with_api_url(&cli.github_api_url)?;
    let connector = storage::AzureConnector;

    let orchestrator =
        orchestrator::SyncOrchestrator::new(&github, &connector, &env, &config.sync);
    let sync_report = orchestrator.run(&trigger).await?;

    report::output(&sync_report, config.sync.terminology, cli.output.as_deref())?;
    info!(outcome = %sync_report.outcome, "done");

    Ok(())
}
