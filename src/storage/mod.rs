pub mod azure;
pub mod connection;
#[cfg(test)]
pub mod memory;
pub mod sync;

pub use azure::AzureBlobStore;
pub use connection::ConnectionString;
pub use sync::{BlobSyncError, BlobSynchronizer};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid storage connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Blob storage request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Blob storage {operation} failed with status {status}: {code}")]
    Service {
        operation: &'static str,
        status: u16,
        code: String,
    },

    #[error("Invalid account key: {0}")]
    InvalidAccountKey(String),
}

/// The subset of a blob service the synchronizer needs.
/// One instance is bound to one storage account.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn container_exists(&self, container: &str) -> Result<bool, StorageError>;

    /// Create a container. Returns false if it already existed.
    async fn create_container(&self, container: &str) -> Result<bool, StorageError>;

    /// Replace the container's metadata.
    async fn set_container_metadata(
        &self,
        container: &str,
        metadata: &[(String, String)],
    ) -> Result<(), StorageError>;

    /// Upload a blob, overwriting any existing one.
    async fn upload_blob(
        &self,
        container: &str,
        blob: &str,
        content: &[u8],
    ) -> Result<(), StorageError>;

    async fn delete_blob(&self, container: &str, blob: &str) -> Result<(), StorageError>;

    /// Names of the blobs in a container, at most `limit` if given.
    async fn list_blobs(
        &self,
        container: &str,
        limit: Option<usize>,
    ) -> Result<Vec<String>, StorageError>;

    async fn delete_container(&self, container: &str) -> Result<(), StorageError>;
}

/// Opens a [`BlobStore`] for a connection string.
pub trait StoreConnector: Send + Sync {
    fn connect(&self, connection_string: &str) -> Result<Box<dyn BlobStore>, StorageError>;
}

/// Connects to Azure Blob Storage over its REST API.
pub struct AzureConnector;

impl StoreConnector for AzureConnector {
    fn connect(&self, connection_string: &str) -> Result<Box<dyn BlobStore>, StorageError> {
        let connection: ConnectionString = connection_string.parse()?;
        Ok(Box::new(AzureBlobStore::new(connection)))
    }
}
