use thiserror::Error;
use tracing::{debug, info, instrument};

use super::{BlobStore, StorageError};
use crate::grouping::{ContainerMap, TenantContents};
use crate::report::types::SyncChanges;
use crate::source::FileStatus;

#[derive(Debug, Error)]
pub enum BlobSyncError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("No fetched content for {0}")]
    MissingContent(String),
}

/// Applies one tenant's grouped changes to one storage account.
pub struct BlobSynchronizer<'a> {
    store: &'a dyn BlobStore,
    bump_metadata_key: &'a str,
}

impl<'a> BlobSynchronizer<'a> {
    pub fn new(store: &'a dyn BlobStore, bump_metadata_key: &'a str) -> Self {
        Self {
            store,
            bump_metadata_key,
        }
    }

    /// For every container: make sure it exists, bump its metadata so its
    /// last-modified time moves, then upload or delete each file. A container
    /// left without blobs after a deletion is removed.
    ///
    /// Nothing is rolled back if a call fails halfway.
    #[instrument(skip_all, fields(containers = containers.len()))]
    pub async fn synchronize(
        &self,
        containers: &ContainerMap,
        contents: &TenantContents,
    ) -> Result<SyncChanges, BlobSyncError> {
        let mut changes = SyncChanges::default();

        for (container, files) in containers {
            if self.ensure_container(container).await? {
                changes.containers_created.push(container.clone());
            }

            let bump = [(
                self.bump_metadata_key.to_string(),
                chrono::Utc::now().to_rfc3339(),
            )];
            self.store.set_container_metadata(container, &bump).await?;

            let mut container_deleted = false;
            for (index, (filename, file)) in files.iter().enumerate() {
                info!(path = %file.path, status = %file.status, "file changed");
                match &file.status {
                    FileStatus::Added | FileStatus::Modified | FileStatus::Renamed => {
                        let content = contents
                            .get(&file.path)
                            .ok_or_else(|| BlobSyncError::MissingContent(file.path.clone()))?;
                        self.store.upload_blob(container, filename, content).await?;
                        info!(path = %file.path, container = %container, "file uploaded");
                        changes.uploaded.push(format!("{}/{}", container, filename));
                    }
                    FileStatus::Removed => {
                        if container_deleted {
                            debug!(
                                path = %file.path,
                                container = %container,
                                "container already deleted"
                            );
                            continue;
                        }
                        self.store.delete_blob(container, filename).await?;
                        info!(path = %file.path, container = %container, "file deleted");
                        changes.deleted.push(format!("{}/{}", container, filename));

                        let uploads_pending = files
                            .values()
                            .skip(index + 1)
                            .any(|f| f.status.has_content());
                        if !uploads_pending
                            && self.store.list_blobs(container, Some(1)).await?.is_empty()
                        {
                            self.store.delete_container(container).await?;
                            info!(container = %container, "deleted empty container");
                            container_deleted = true;
                            changes.containers_deleted.push(container.clone());
                        }
                    }
                    FileStatus::Other(status) => {
                        debug!(path = %file.path, status = %status, "ignoring file");
                    }
                }
            }
        }

        Ok(changes)
    }

    /// Returns true if the container had to be created.
    async fn ensure_container(&self, container: &str) -> Result<bool, StorageError> {
        if self.store.container_exists(container).await? {
            return Ok(false);
        }
        let created = self.store.create_container(container).await?;
        if !created {
            debug!(container, "container was created concurrently");
        }
        Ok(created)
    }
}
