pub mod types;

pub use types::{RunOutcome, SyncReport};

use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::paths::Terminology;
use types::{DestinationReport, TenantReport};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Output the report to the terminal (default) or to a markdown file.
#[instrument(skip(report, terminology), fields(outcome = %report.outcome))]
pub fn output(
    report: &SyncReport,
    terminology: Terminology,
    output_path: Option<&Path>,
) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            print_terminal_report(report, terminology);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            std::fs::write(path, render_markdown(report, terminology))?;
            Ok(())
        }
    }
}

/// Sync of org/config refs/heads/main (1a2b3c4..5d6e7f8)
/// Eligible files: 3 | Uploaded: 2 | Deleted: 1
///
/// ═══ Tenant acme ═══
///   tenant account: 2 uploaded, 1 deleted
///     + acme-device1/config.yaml
///     - acme-device2/old.yaml
///   general account: skipped (STORAGE_ACCOUNT_CONNECTION_STRING is not set)
///
/// ═══ Outcome: SYNCHRONIZED ═══
fn print_terminal_report(report: &SyncReport, terminology: Terminology) {
    println!();
    println!(
        "Sync of {} {} ({}..{})",
        report.repository,
        report.branch_ref,
        short_sha(&report.before_commit),
        short_sha(&report.after_commit)
    );
    println!(
        "Eligible files: {} | Uploaded: {} | Deleted: {}",
        report.eligible_files,
        report.total_uploaded(),
        report.total_deleted()
    );
    println!();

    for tenant in &report.tenants {
        println!("═══ {} ═══", tenant_heading(tenant, terminology));
        for destination in &tenant.destinations {
            println!("  {}", destination_summary(destination));
            for container in &destination.changes.containers_created {
                println!("    {} container {}", "*".green(), container);
            }
            for blob in &destination.changes.uploaded {
                println!("    {} {}", "+".green(), blob);
            }
            for blob in &destination.changes.deleted {
                println!("    {} {}", "-".red(), blob);
            }
            for container in &destination.changes.containers_deleted {
                println!("    {} container {}", "x".red(), container);
            }
        }
        for skipped in &tenant.skipped {
            println!(
                "  {}: {} ({})",
                skipped.kind,
                "skipped".yellow(),
                skipped.reason
            );
        }
        println!();
    }

    println!("═══ Outcome: {} ═══", colorize_outcome(&report.outcome));
    println!();
}

fn render_markdown(report: &SyncReport, terminology: Terminology) -> String {
    let mut md = String::new();
    md.push_str(&format!(
        "# Sync of {} `{}`\n\n",
        report.repository, report.branch_ref
    ));
    md.push_str(&format!(
        "**Commits:** `{}..{}` | **Eligible files:** {} | **Uploaded:** {} | **Deleted:** {}\n\n",
        short_sha(&report.before_commit),
        short_sha(&report.after_commit),
        report.eligible_files,
        report.total_uploaded(),
        report.total_deleted()
    ));

    for tenant in &report.tenants {
        md.push_str(&format!("## {}\n\n", tenant_heading(tenant, terminology)));
        for destination in &tenant.destinations {
            md.push_str(&format!("**{}**\n\n", destination_summary(destination)));
            for container in &destination.changes.containers_created {
                md.push_str(&format!("- created container `{}`\n", container));
            }
            for blob in &destination.changes.uploaded {
                md.push_str(&format!("- uploaded `{}`\n", blob));
            }
            for blob in &destination.changes.deleted {
                md.push_str(&format!("- deleted `{}`\n", blob));
            }
            for container in &destination.changes.containers_deleted {
                md.push_str(&format!("- removed empty container `{}`\n", container));
            }
            md.push('\n');
        }
        for skipped in &tenant.skipped {
            md.push_str(&format!("- {} skipped: {}\n", skipped.kind, skipped.reason));
        }
        if !tenant.skipped.is_empty() {
            md.push('\n');
        }
    }

    md.push_str(&format!("## Outcome: {}\n", report.outcome));
    md
}

fn tenant_heading(tenant: &TenantReport, terminology: Terminology) -> String {
    let owner = terminology.owner();
    let mut chars = owner.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    format!("{} {}", capitalized, tenant.tenant)
}

fn destination_summary(destination: &DestinationReport) -> String {
    format!(
        "{}: {} uploaded, {} deleted",
        destination.kind,
        destination.changes.uploaded.len(),
        destination.changes.deleted.len()
    )
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

fn colorize_outcome(outcome: &RunOutcome) -> colored::ColoredString {
    match outcome {
        RunOutcome::Synchronized => outcome.to_string().green().bold(),
        RunOutcome::NoChanges | RunOutcome::BranchSkipped => outcome.to_string().yellow().bold(),
    }
}
