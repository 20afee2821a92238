use thiserror::Error;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::config::{Environment, SyncConfig, TriggerContext};
use crate::grouping::{ChangeSetGrouper, ContainerMap, GroupingError, TenantContents};
use crate::paths::{self, Terminology};
use crate::report::types::{
    DestinationKind, DestinationReport, RunOutcome, SkippedDestination, SyncReport, TenantReport,
};
use crate::source::{self, ChangedFile, SourceControl, SourceError};
use crate::storage::{BlobSyncError, BlobSynchronizer, StoreConnector};

/// Connection string of the shared account written during the transition phase.
pub const GENERAL_CONNECTION_ENV: &str = "STORAGE_ACCOUNT_CONNECTION_STRING";

/// Environment variable holding a tenant's own connection string,
/// e.g. `ACME_STORAGE_ACCOUNT_CONNECTION_STRING`.
pub fn tenant_connection_env(tenant: &str) -> String {
    format!("{}_{}", tenant.to_uppercase(), GENERAL_CONNECTION_ENV)
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to read repository changes: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Grouping(#[from] GroupingError),

    #[error("Failed to update {tenant} in the {kind}: {source}")]
    Storage {
        tenant: String,
        kind: DestinationKind,
        #[source]
        source: BlobSyncError,
    },
}

/// A storage account a tenant's changes go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub kind: DestinationKind,
    pub connection_string: String,
}

/// Where one tenant's changes go, and which candidates were passed over.
#[derive(Debug, Default)]
pub struct Route {
    pub destinations: Vec<Destination>,
    pub skipped: Vec<SkippedDestination>,
}

/// Resolve a tenant's destinations: its own account if configured, then the
/// general account unless it is unset or the same connection string.
pub fn route_tenant(tenant: &str, env: &Environment, terminology: Terminology) -> Route {
    let mut route = Route::default();

    let tenant_key = tenant_connection_env(tenant);
    let primary = env.get(&tenant_key);
    match primary {
        Some(connection_string) => route.destinations.push(Destination {
            kind: DestinationKind::Tenant,
            connection_string: connection_string.to_string(),
        }),
        None => {
            warn!(
                tenant,
                "{} {} does not have the connection string of its storage account set; set the environment variable {} in your workflow file",
                terminology.owner(),
                tenant,
                tenant_key
            );
            info!(
                tenant,
                "configuration files are uploaded to the general storage account (transition phase)"
            );
            route.skipped.push(SkippedDestination {
                kind: DestinationKind::Tenant,
                reason: format!("{} is not set", tenant_key),
            });
        }
    }

    match env.get(GENERAL_CONNECTION_ENV) {
        None => {
            info!(
                "general connection string of the storage account not set; set the environment variable {} in your workflow file",
                GENERAL_CONNECTION_ENV
            );
            route.skipped.push(SkippedDestination {
                kind: DestinationKind::General,
                reason: format!("{} is not set", GENERAL_CONNECTION_ENV),
            });
        }
        Some(general) if Some(general) == primary => {
            debug!(tenant, "general account is the tenant account, not writing twice");
            route.skipped.push(SkippedDestination {
                kind: DestinationKind::General,
                reason: "same connection string as the tenant account".to_string(),
            });
        }
        Some(general) => route.destinations.push(Destination {
            kind: DestinationKind::General,
            connection_string: general.to_string(),
        }),
    }

    route
}

/// Runs one synchronization for a push.
pub struct SyncOrchestrator<'a> {
    source: &'a dyn SourceControl,
    connector: &'a dyn StoreConnector,
    env: &'a Environment,
    settings: &'a SyncConfig,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(
        source: &'a dyn SourceControl,
        connector: &'a dyn StoreConnector,
        env: &'a Environment,
        settings: &'a SyncConfig,
    ) -> Self {
        Self {
            source,
            connector,
            env,
            settings,
        }
    }

    /// Compare the two commits, fetch the changed contents, and mirror them
    /// into every tenant's destinations.
    ///
    /// Pushes with no added, modified or renamed file, and pushes outside the
    /// allowed branches, finish without touching storage.
    #[instrument(
        skip(self, trigger),
        fields(repository = %trigger.repository, branch = %trigger.branch_ref)
    )]
    pub async fn run(&self, trigger: &TriggerContext) -> Result<SyncReport, SyncError> {
        info!(before = %trigger.before_commit, after = %trigger.after_commit, "comparing commits");
        let compared = self
            .source
            .compare(&trigger.before_commit, &trigger.after_commit)
            .await?;
        info!(files = compared.len(), "commits compared");

        let eligible: Vec<ChangedFile> = compared
            .into_iter()
            .filter(|f| paths::is_eligible(&f.path, &self.settings.reserved_prefixes))
            .collect();

        let mut report = SyncReport {
            repository: trigger.repository.clone(),
            branch_ref: trigger.branch_ref.clone(),
            before_commit: trigger.before_commit.clone(),
            after_commit: trigger.after_commit.clone(),
            eligible_files: eligible.len(),
            outcome: RunOutcome::NoChanges,
            tenants: Vec::new(),
        };

        let content_paths: Vec<String> = eligible
            .iter()
            .filter(|f| f.status.has_content())
            .map(|f| f.path.clone())
            .collect();
        if content_paths.is_empty() {
            info!("no changed files, no configurations updated");
            return Ok(report);
        }
        info!(files = %content_paths.join(", "), "changed files");

        let contents = source::fetch_contents(
            self.source,
            &content_paths,
            &trigger.after_commit,
            self.settings.fetch_concurrency,
        )
        .await?;

        if !self
            .settings
            .allowed_branches
            .iter()
            .any(|branch| branch == &trigger.branch_ref)
        {
            info!("change not on an allowed branch, no configurations updated");
            report.outcome = RunOutcome::BranchSkipped;
            return Ok(report);
        }
        info!("change on allowed branch, updating configurations");

        let grouper = ChangeSetGrouper::new(self.settings.terminology);
        let (grouped, grouped_contents) = grouper.group(&eligible, contents)?;

        let no_contents = TenantContents::new();
        for (tenant, containers) in &grouped {
            let tenant_contents = grouped_contents.get(tenant).unwrap_or(&no_contents);
            let tenant_report = self
                .sync_tenant(tenant, containers, tenant_contents)
                .instrument(info_span!("tenant", tenant = %tenant))
                .await?;
            report.tenants.push(tenant_report);
        }

        report.outcome = RunOutcome::Synchronized;
        info!(tenants = report.tenants.len(), "finished updating all configurations");
        Ok(report)
    }

    async fn sync_tenant(
        &self,
        tenant: &str,
        containers: &ContainerMap,
        contents: &TenantContents,
    ) -> Result<TenantReport, SyncError> {
        let route = route_tenant(tenant, self.env, self.settings.terminology);
        let mut report = TenantReport {
            tenant: tenant.to_string(),
            destinations: Vec::new(),
            skipped: route.skipped,
        };

        for destination in route.destinations {
            let store = self
                .connector
                .connect(&destination.connection_string)
                .map_err(|err| SyncError::Storage {
                    tenant: tenant.to_string(),
                    kind: destination.kind,
                    source: err.into(),
                })?;

            info!(kind = %destination.kind, "updating configurations");
            let changes = BlobSynchronizer::new(store.as_ref(), &self.settings.bump_metadata_key)
                .synchronize(containers, contents)
                .await
                .map_err(|source| SyncError::Storage {
                    tenant: tenant.to_string(),
                    kind: destination.kind,
                    source,
                })?;
            info!(
                kind = %destination.kind,
                uploaded = changes.uploaded.len(),
                deleted = changes.deleted.len(),
                "finished updating configurations"
            );

            report.destinations.push(DestinationReport {
                kind: destination.kind,
                changes,
            });
        }

        Ok(report)
    }
}
