//! In-memory blob service for tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{BlobStore, StorageError, StoreConnector};

#[derive(Debug, Default, Clone)]
pub struct MemoryContainer {
    pub metadata: Vec<(String, String)>,
    pub blobs: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct MemoryAccount {
    pub containers: BTreeMap<String, MemoryContainer>,
    /// Every mutating call, e.g. "upload acme-device1/config.yaml".
    pub mutations: Vec<String>,
}

/// Clones share the same account.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlobStore {
    account: Arc<Mutex<MemoryAccount>>,
}

fn not_found(operation: &'static str, code: &str) -> StorageError {
    StorageError::Service {
        operation,
        status: 404,
        code: code.to_string(),
    }
}

impl InMemoryBlobStore {
    pub fn state(&self) -> MutexGuard<'_, MemoryAccount> {
        self.account.lock().unwrap()
    }

    pub fn with_blob(self, container: &str, blob: &str, content: &[u8]) -> Self {
        self.state()
            .containers
            .entry(container.to_string())
            .or_default()
            .blobs
            .insert(blob.to_string(), content.to_vec());
        self
    }

    pub fn container_names(&self) -> Vec<String> {
        self.state().containers.keys().cloned().collect()
    }

    pub fn blob(&self, container: &str, blob: &str) -> Option<Vec<u8>> {
        self.state()
            .containers
            .get(container)
            .and_then(|c| c.blobs.get(blob).cloned())
    }

    pub fn mutations(&self) -> Vec<String> {
        self.state().mutations.clone()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn container_exists(&self, container: &str) -> Result<bool, StorageError> {
        Ok(self.state().containers.contains_key(container))
    }

    async fn create_container(&self, container: &str) -> Result<bool, StorageError> {
        let mut state = self.state();
        if state.containers.contains_key(container) {
            return Ok(false);
        }
        state.containers.insert(container.to_string(), MemoryContainer::default());
        state.mutations.push(format!("create {}", container));
        Ok(true)
    }

    async fn set_container_metadata(
        &self,
        container: &str,
        metadata: &[(String, String)],
    ) -> Result<(), StorageError> {
        let mut state = self.state();
        let entry = state
            .containers
            .get_mut(container)
            .ok_or_else(|| not_found("set container metadata", "ContainerNotFound"))?;
        entry.metadata = metadata.to_vec();
        state.mutations.push(format!("metadata {}", container));
        Ok(())
    }

    async fn upload_blob(
        &self,
        container: &str,
        blob: &str,
        content: &[u8],
    ) -> Result<(), StorageError> {
        let mut state = self.state();
        state
            .containers
            .get_mut(container)
            .ok_or_else(|| not_found("put blob", "ContainerNotFound"))?
            .blobs
            .insert(blob.to_string(), content.to_vec());
        state.mutations.push(format!("upload {}/{}", container, blob));
        Ok(())
    }

    async fn delete_blob(&self, container: &str, blob: &str) -> Result<(), StorageError> {
        let mut state = self.state();
        state
            .containers
            .get_mut(container)
            .ok_or_else(|| not_found("delete blob", "ContainerNotFound"))?
            .blobs
            .remove(blob)
            .ok_or_else(|| not_found("delete blob", "BlobNotFound"))?;
        state.mutations.push(format!("delete {}/{}", container, blob));
        Ok(())
    }

    async fn list_blobs(
        &self,
        container: &str,
        limit: Option<usize>,
    ) -> Result<Vec<String>, StorageError> {
        let state = self.state();
        let blobs = &state
            .containers
            .get(container)
            .ok_or_else(|| not_found("list blobs", "ContainerNotFound"))?
            .blobs;
        Ok(blobs
            .keys()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn delete_container(&self, container: &str) -> Result<(), StorageError> {
        let mut state = self.state();
        state
            .containers
            .remove(container)
            .ok_or_else(|| not_found("delete container", "ContainerNotFound"))?;
        state.mutations.push(format!("delete container {}", container));
        Ok(())
    }
}

/// One in-memory account per connection string. Strings starting with
/// "invalid" are rejected the way a malformed connection string would be.
#[derive(Default)]
pub struct MemoryConnector {
    accounts: Mutex<HashMap<String, InMemoryBlobStore>>,
    connections: Mutex<Vec<String>>,
}

impl MemoryConnector {
    pub fn insert(&self, connection_string: &str, store: InMemoryBlobStore) {
        self.accounts
            .lock()
            .unwrap()
            .insert(connection_string.to_string(), store);
    }

    pub fn store(&self, connection_string: &str) -> InMemoryBlobStore {
        self.accounts
            .lock()
            .unwrap()
            .entry(connection_string.to_string())
            .or_default()
            .clone()
    }

    /// Connection strings in the order they were opened.
    pub fn connections(&self) -> Vec<String> {
        self.connections.lock().unwrap().clone()
    }
}

impl StoreConnector for MemoryConnector {
    fn connect(&self, connection_string: &str) -> Result<Box<dyn BlobStore>, StorageError> {
        if connection_string.starts_with("invalid") {
            return Err(StorageError::InvalidConnectionString(
                "missing AccountName".to_string(),
            ));
        }
        self.connections
            .lock()
            .unwrap()
            .push(connection_string.to_string());
        Ok(Box::new(self.store(connection_string)))
    }
}
