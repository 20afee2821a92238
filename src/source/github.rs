use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::types::{ChangedFile, FileStatus};
use super::{SourceControl, SourceError};

pub const GITHUB_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "config-blob-sync";

/// The compare endpoint lists at most this many files.
const COMPARE_FILE_LIMIT: usize = 300;

#[derive(Debug, Deserialize)]
struct CompareResponse {
    #[serde(default)]
    files: Vec<CompareFile>,
}

#[derive(Debug, Deserialize)]
struct CompareFile {
    filename: String,
    status: String,
}

impl CompareResponse {
    fn into_changed_files(self) -> Vec<ChangedFile> {
        self.files
            .into_iter()
            .map(|f| ChangedFile::new(f.filename, FileStatus::parse(&f.status)))
            .collect()
    }
}

/// GitHub REST client scoped to a single repository.
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    repository: String,
    token: String,
}

impl GitHubClient {
    /// `repository` is the `owner/name` form GitHub Actions exposes.
    pub fn new(repository: &str, token: &str) -> Result<Self, SourceError> {
        let (owner, name) = repository
            .split_once('/')
            .ok_or_else(|| SourceError::InvalidRepository(repository.to_string()))?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(SourceError::InvalidRepository(repository.to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_url: GITHUB_API_URL.to_string(),
            repository: repository.to_string(),
            token: token.to_string(),
        })
    }

    /// Point the client at another API root (GitHub Enterprise).
    pub fn with_api_url(mut self, api_url: &str) -> Result<Self, SourceError> {
        reqwest::Url::parse(api_url).map_err(|_| SourceError::InvalidApiUrl(api_url.to_string()))?;
        self.api_url = api_url.trim_end_matches('/').to_string();
        Ok(self)
    }

    fn compare_url(&self, base: &str, head: &str) -> String {
        format!(
            "{}/repos/{}/compare/{}...{}",
            self.api_url, self.repository, base, head
        )
    }

    fn contents_url(&self, path: &str, reference: &str) -> String {
        let encoded_path = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/repos/{}/contents/{}?ref={}",
            self.api_url,
            self.repository,
            encoded_path,
            urlencoding::encode(reference)
        )
    }
}

#[async_trait]
impl SourceControl for GitHubClient {
    #[instrument(skip(self), fields(repository = %self.repository))]
    async fn compare(&self, base: &str, head: &str) -> Result<Vec<ChangedFile>, SourceError> {
        debug!("comparing commits");
        let response = self
            .client
            .get(self.compare_url(base, head))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;

        let files = response.json::<CompareResponse>().await?.into_changed_files();
        debug!(files = files.len(), "received comparison");
        if files.len() >= COMPARE_FILE_LIMIT {
            warn!(
                files = files.len(),
                "comparison lists the maximum number of files GitHub returns; later files may be missing"
            );
        }
        Ok(files)
    }

    #[instrument(skip(self), fields(repository = %self.repository))]
    async fn file_content(&self, path: &str, reference: &str) -> Result<Vec<u8>, SourceError> {
        let bytes = self
            .client
            .get(self.contents_url(path, reference))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github.raw+json")
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPARE_JSON: &str = r#"{
        "status": "ahead",
        "ahead_by": 1,
        "files": [
            {"sha": "1", "filename": "acme/device1/config.yaml", "status": "added", "additions": 3},
            {"sha": "2", "filename": "acme/device1/old.yaml", "status": "removed"},
            {"sha": "3", "filename": "README.md", "status": "modified"},
            {"sha": "4", "filename": "acme/device2/copy.yaml", "status": "copied"}
        ]
    }"#;

    #[test]
    fn test_parse_compare_response() {
        let response: CompareResponse = serde_json::from_str(COMPARE_JSON).unwrap();
        let files = response.into_changed_files();
        assert_eq!(files.len(), 4);
        assert_eq!(files[0], ChangedFile::new("acme/device1/config.yaml", FileStatus::Added));
        assert_eq!(files[1].status, FileStatus::Removed);
        assert_eq!(files[3].status, FileStatus::Other("copied".to_string()));
    }

    #[test]
    fn test_parse_compare_response_without_files() {
        let response: CompareResponse = serde_json::from_str(r#"{"status": "identical"}"#).unwrap();
        assert!(response.into_changed_files().is_empty());
    }

    #[test]
    fn test_new_validates_repository() {
        assert!(GitHubClient::new("org/config", "token").is_ok());
        assert!(GitHubClient::new("config", "token").is_err());
        assert!(GitHubClient::new("/config", "token").is_err());
        assert!(GitHubClient::new("org/config/extra", "token").is_err());
    }

    #[test]
    fn test_urls() {
        let client = GitHubClient::new("org/config", "token").unwrap();
        assert_eq!(
            client.compare_url("abc", "def"),
            "https://api.github.com/repos/org/config/compare/abc...def"
        );
        assert_eq!(
            client.contents_url("acme/Device 1/config.yaml", "def"),
            "https://api.github.com/repos/org/config/contents/acme/Device%201/config.yaml?ref=def"
        );
    }

    #[test]
    fn test_with_api_url() {
        let client = GitHubClient::new("org/config", "token")
            .unwrap()
            .with_api_url("https://ghe.example.com/api/v3/")
            .unwrap();
        assert_eq!(
            client.compare_url("a", "b"),
            "https://ghe.example.com/api/v3/repos/org/config/compare/a...b"
        );
        assert!(GitHubClient::new("org/config", "token")
            .unwrap()
            .with_api_url("not a url")
            .is_err());
    }
}
