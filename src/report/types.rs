/// Which storage account a tenant's changes were written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationKind {
    /// The tenant's own account
    Tenant,
    /// The shared account kept in sync during the transition phase
    General,
}

impl std::fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DestinationKind::Tenant => write!(f, "tenant account"),
            DestinationKind::General => write!(f, "general account"),
        }
    }
}

/// Storage mutations applied to one destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncChanges {
    /// `<container>/<blob>` entries uploaded
    pub uploaded: Vec<String>,
    /// `<container>/<blob>` entries deleted
    pub deleted: Vec<String>,
    pub containers_created: Vec<String>,
    pub containers_deleted: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DestinationReport {
    pub kind: DestinationKind,
    pub changes: SyncChanges,
}

/// A destination that was not written, and why.
#[derive(Debug, Clone)]
pub struct SkippedDestination {
    pub kind: DestinationKind,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct TenantReport {
    pub tenant: String,
    pub destinations: Vec<DestinationReport>,
    pub skipped: Vec<SkippedDestination>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No eligible file was added, modified or renamed.
    NoChanges,
    /// The push was not to an allowed branch.
    BranchSkipped,
    Synchronized,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::NoChanges => write!(f, "NO CHANGES"),
            RunOutcome::BranchSkipped => write!(f, "BRANCH SKIPPED"),
            RunOutcome::Synchronized => write!(f, "SYNCHRONIZED"),
        }
    }
}

/// Summary of one run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Repository (`owner/name`)
    pub repository: String,
    pub branch_ref: String,
    pub before_commit: String,
    pub after_commit: String,
    /// Eligible files in the comparison
    pub eligible_files: usize,
    pub outcome: RunOutcome,
    /// One entry per routed tenant, in routing order
    pub tenants: Vec<TenantReport>,
}

impl SyncReport {
    pub fn total_uploaded(&self) -> usize {
        self.destinations().map(|d| d.changes.uploaded.len()).sum()
    }

    pub fn total_deleted(&self) -> usize {
        self.destinations().map(|d| d.changes.deleted.len()).sum()
    }

    fn destinations(&self) -> impl Iterator<Item = &DestinationReport> {
        self.tenants.iter().flat_map(|t| t.destinations.iter())
    }
}
