use serde::Deserialize;

/// Segment separator used in repository-relative paths.
pub const SEPARATOR: char = '/';

/// Naming scheme for the two levels of the hierarchy.
///
/// Repositories are laid out either as `<tenant>/<device>/<file>` or as
/// `<storage account>/<container>/<file>`. The layout and the grouping are
/// identical; only the wording in logs and reports differs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Terminology {
    #[default]
    TenantDevice,
    StorageAccountContainer,
}

impl Terminology {
    /// Word for the first path segment (e.g., "tenant").
    pub fn owner(&self) -> &'static str {
        match self {
            Terminology::TenantDevice => "tenant",
            Terminology::StorageAccountContainer => "storage account",
        }
    }

    /// Word for the second path segment (e.g., "device").
    pub fn group(&self) -> &'static str {
        match self {
            Terminology::TenantDevice => "device",
            Terminology::StorageAccountContainer => "container",
        }
    }
}

/// First segment of a path.
pub fn tenant_of(path: &str) -> &str {
    path.split_once(SEPARATOR).map_or(path, |(tenant, _)| tenant)
}

/// Blob container name for a tenant/device pair: `<tenant>-<device>`,
/// spaces replaced with `-`, lower-cased.
pub fn container_name(tenant: &str, device: &str) -> String {
    normalize(&format!("{}-{}", tenant, device))
}

/// Blob container name derived from the first two segments of a path.
pub fn container_name_of(path: &str) -> String {
    let mut segments = path.splitn(3, SEPARATOR);
    let tenant = segments.next().unwrap_or_default();
    match segments.next() {
        Some(device) => container_name(tenant, device),
        None => normalize(tenant),
    }
}

/// Whether a path belongs to some tenant/device: at least three segments
/// and not under a reserved prefix.
pub fn is_eligible(path: &str, reserved_prefixes: &[String]) -> bool {
    path.split(SEPARATOR).count() >= 3
        && !reserved_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
}

/// Split a path into `(tenant, device, filename)`.
/// Returns None unless the path has exactly three segments.
pub fn split_path(path: &str) -> Option<(&str, &str, &str)> {
    let mut segments = path.split(SEPARATOR);
    match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(tenant), Some(device), Some(filename), None) => Some((tenant, device, filename)),
        _ => None,
    }
}

fn normalize(name: &str) -> String {
    name.replace(' ', "-").to_lowercase()
}
