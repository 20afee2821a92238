use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::paths::{self, Terminology};
use crate::source::ChangedFile;

/// filename → changed file, for one container.
pub type FileMap = IndexMap<String, ChangedFile>;
/// container → files, for one tenant.
pub type ContainerMap = IndexMap<String, FileMap>;
/// tenant → containers.
pub type GroupedChanges = IndexMap<String, ContainerMap>;
/// full repository path → content, for one tenant.
pub type TenantContents = IndexMap<String, Vec<u8>>;
/// tenant → contents.
pub type GroupedContents = IndexMap<String, TenantContents>;

#[derive(Debug, Error)]
pub enum GroupingError {
    #[error("Fetched content for {0} which is not of the form <tenant>/<device>/<file>")]
    MalformedContentPath(String),
}

/// Partitions a flat change set into tenant → container → filename.
pub struct ChangeSetGrouper {
    terminology: Terminology,
}

impl ChangeSetGrouper {
    pub fn new(terminology: Terminology) -> Self {
        Self { terminology }
    }

    /// Group eligible changed files and their fetched contents.
    ///
    /// Every container derived from an input path gets an entry, even when
    /// none of its files survive (deletion-only containers and paths with
    /// nested directories both still get visited). Files whose path is not
    /// exactly `<tenant>/<device>/<file>` are logged and left out.
    pub fn group(
        &self,
        files: &[ChangedFile],
        contents: IndexMap<String, Vec<u8>>,
    ) -> Result<(GroupedChanges, GroupedContents), GroupingError> {
        let mut grouped = GroupedChanges::new();

        for file in files {
            grouped
                .entry(paths::tenant_of(&file.path).to_string())
                .or_default()
                .entry(paths::container_name_of(&file.path))
                .or_default();
        }

        for file in files {
            match paths::split_path(&file.path) {
                Some((tenant, device, filename)) => {
                    let container = paths::container_name(tenant, device);
                    grouped
                        .entry(tenant.to_string())
                        .or_default()
                        .entry(container)
                        .or_default()
                        .insert(filename.to_string(), file.clone());
                }
                None => {
                    warn!(
                        path = %file.path,
                        "could not process file: expected <{}>/<{}>/<file>",
                        self.terminology.owner(),
                        self.terminology.group()
                    );
                }
            }
        }

        let mut grouped_contents = GroupedContents::new();
        for (path, content) in contents {
            let (tenant, _, _) = paths::split_path(&path)
                .ok_or_else(|| GroupingError::MalformedContentPath(path.clone()))?;
            grouped_contents
                .entry(tenant.to_string())
                .or_default()
                .insert(path, content);
        }

        debug!(
            tenants = grouped.len(),
            containers = grouped.values().map(|c| c.len()).sum::<usize>(),
            "grouped change set"
        );
        Ok((grouped, grouped_contents))
    }
}
