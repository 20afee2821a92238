use std::fmt;

/// Status of a file within a commit comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Modified,
    Renamed,
    Removed,
    /// Any other status reported by the API (e.g. "copied", "changed").
    /// Such files are neither uploaded nor deleted.
    Other(String),
}

impl FileStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "added" => FileStatus::Added,
            "modified" => FileStatus::Modified,
            "renamed" => FileStatus::Renamed,
            "removed" => FileStatus::Removed,
            other => FileStatus::Other(other.to_string()),
        }
    }

    /// Whether the file exists at the after-commit and its content is synced.
    pub fn has_content(&self) -> bool {
        matches!(
            self,
            FileStatus::Added | FileStatus::Modified | FileStatus::Renamed
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            FileStatus::Added => "added",
            FileStatus::Modified => "modified",
            FileStatus::Renamed => "renamed",
            FileStatus::Removed => "removed",
            FileStatus::Other(status) => status,
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single file entry of a commit comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    /// Repository-relative path at the after-commit (e.g., "acme/device1/config.yaml")
    pub path: String,
    pub status: FileStatus,
}

impl ChangedFile {
    pub fn new(path: impl Into<String>, status: FileStatus) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }
}
