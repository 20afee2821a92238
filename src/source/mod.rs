pub mod github;
pub mod types;

pub use github::GitHubClient;
pub use types::{ChangedFile, FileStatus};

use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("GitHub API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("Invalid repository name: {0} (expected owner/name)")]
    InvalidRepository(String),

    #[error("Invalid GitHub API URL: {0}")]
    InvalidApiUrl(String),
}

/// Read access to the configuration repository.
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Files changed between two commits, in the order the API reports them.
    async fn compare(&self, base: &str, head: &str) -> Result<Vec<ChangedFile>, SourceError>;

    /// Raw content of a file at the given commit.
    async fn file_content(&self, path: &str, reference: &str) -> Result<Vec<u8>, SourceError>;
}

/// Fetch the content of every path at `reference`, at most `concurrency`
/// requests in flight. The returned map keeps the order of `paths`.
/// The first failing request aborts the whole fetch.
#[instrument(skip(source, paths), fields(files = paths.len()))]
pub async fn fetch_contents(
    source: &dyn SourceControl,
    paths: &[String],
    reference: &str,
    concurrency: usize,
) -> Result<IndexMap<String, Vec<u8>>, SourceError> {
    let fetched: Vec<(String, Vec<u8>)> = stream::iter(paths.iter().cloned())
        .map(|path| async move {
            let content = source.file_content(&path, reference).await?;
            debug!(path = %path, bytes = content.len(), "fetched file content");
            Ok::<_, SourceError>((path, content))
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    Ok(fetched.into_iter().collect())
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory repository: a fixed comparison and contents keyed by path.
    #[derive(Default)]
    pub struct FakeSource {
        pub files: Vec<ChangedFile>,
        pub contents: HashMap<String, Vec<u8>>,
        pub fail_compare: bool,
        pub content_requests: AtomicUsize,
    }

    impl FakeSource {
        pub fn new(files: Vec<(&str, FileStatus)>) -> Self {
            let files: Vec<ChangedFile> = files
                .into_iter()
                .map(|(path, status)| ChangedFile::new(path, status))
                .collect();
            let contents = files
                .iter()
                .filter(|f| f.status.has_content())
                .map(|f| (f.path.clone(), format!("content of {}", f.path).into_bytes()))
                .collect();
            Self {
                files,
                contents,
                ..Default::default()
            }
        }

        pub fn requests(&self) -> usize {
            self.content_requests.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceControl for FakeSource {
        async fn compare(&self, _base: &str, _head: &str) -> Result<Vec<ChangedFile>, SourceError> {
            if self.fail_compare {
                return Err(SourceError::InvalidRepository("unreachable".to_string()));
            }
            Ok(self.files.clone())
        }

        async fn file_content(&self, path: &str, _reference: &str) -> Result<Vec<u8>, SourceError> {
            self.content_requests.fetch_add(1, Ordering::SeqCst);
            // Later paths finish first so out-of-order completion is exercised.
            let delay = 20u64.saturating_sub(self.requests() as u64 * 5);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.contents
                .get(path)
                .cloned()
                .ok_or_else(|| SourceError::InvalidRepository(format!("no content for {}", path)))
        }
    }

    #[tokio::test]
    async fn test_fetch_contents_preserves_order() {
        let source = FakeSource::new(vec![
            ("a/b/1.json", FileStatus::Added),
            ("a/b/2.json", FileStatus::Modified),
            ("a/c/3.json", FileStatus::Renamed),
            ("a/c/4.json", FileStatus::Added),
        ]);
        let paths: Vec<String> = source.files.iter().map(|f| f.path.clone()).collect();

        let contents = fetch_contents(&source, &paths, "after", 4).await.unwrap();

        let keys: Vec<&String> = contents.keys().collect();
        assert_eq!(keys, paths.iter().collect::<Vec<_>>());
        assert_eq!(contents["a/b/2.json"], b"content of a/b/2.json".to_vec());
        assert_eq!(source.requests(), 4);
    }

    #[tokio::test]
    async fn test_fetch_contents_fails_on_missing_file() {
        let source = FakeSource::new(vec![("a/b/1.json", FileStatus::Added)]);
        let paths = vec!["a/b/1.json".to_string(), "a/b/missing.json".to_string()];

        let result = fetch_contents(&source, &paths, "after", 0).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fetch_contents_empty() {
        let source = FakeSource::default();
        let contents = fetch_contents(&source, &[], "after", 4).await.unwrap();
        assert!(contents.is_empty());
        assert_eq!(source.requests(), 0);
    }
}
