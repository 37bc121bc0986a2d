use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use synccoord_core::{AppError, AppResult};

use crate::SyncDomain;

/// Identifier of one connector-credential pair, the unit of synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(i64);

impl ResourceId {
    /// Creates a resource identifier from its database value.
    #[must_use]
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the database value.
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for ResourceId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for ResourceId {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|error| AppError::Validation(format!("invalid resource id '{value}': {error}")))
    }
}

/// Connector type of one resource, used to resolve enumerators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorType {
    /// Atlassian Confluence.
    Confluence,
    /// Atlassian Jira.
    Jira,
    /// Google Drive.
    GoogleDrive,
    /// Gmail.
    Gmail,
    /// Slack workspace.
    Slack,
    /// Microsoft Teams.
    Teams,
    /// Egnyte file storage.
    Egnyte,
    /// Public web crawl.
    Web,
    /// Uploaded files.
    File,
}

impl ConnectorType {
    /// Every supported connector type.
    pub const ALL: [Self; 9] = [
        Self::Confluence,
        Self::Jira,
        Self::GoogleDrive,
        Self::Gmail,
        Self::Slack,
        Self::Teams,
        Self::Egnyte,
        Self::Web,
        Self::File,
    ];

    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confluence => "confluence",
            Self::Jira => "jira",
            Self::GoogleDrive => "google_drive",
            Self::Gmail => "gmail",
            Self::Slack => "slack",
            Self::Teams => "teams",
            Self::Egnyte => "egnyte",
            Self::Web => "web",
            Self::File => "file",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        Self::ALL
            .into_iter()
            .find(|connector_type| connector_type.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown connector type '{value}'")))
    }

    /// Returns whether documents of this connector carry source-side access control.
    #[must_use]
    pub fn has_external_access(&self) -> bool {
        !matches!(self, Self::Web | Self::File)
    }
}

impl Display for ConnectorType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Lifecycle status of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Resource is synchronized on schedule.
    Active,
    /// Resource is excluded from scheduled sync.
    Paused,
    /// Resource was scheduled for deletion.
    Deleting,
}

impl ResourceStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Deleting => "deleting",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "deleting" => Ok(Self::Deleting),
            _ => Err(AppError::Validation(format!(
                "unknown resource status '{value}'"
            ))),
        }
    }
}

/// Persisted connector-credential pair as seen by the sync coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResource {
    /// Resource identifier.
    pub id: ResourceId,
    /// Connector type used for enumerator resolution.
    pub connector_type: ConnectorType,
    /// Lifecycle status.
    pub status: ResourceStatus,
    /// Optional per-resource sync period override.
    pub sync_period_seconds: Option<u32>,
    /// Last successful indexing run.
    pub last_indexed_at: Option<DateTime<Utc>>,
    /// Last successful permission sync.
    pub last_permission_sync_at: Option<DateTime<Utc>>,
    /// Last successful external group sync.
    pub last_external_group_sync_at: Option<DateTime<Utc>>,
    /// Last successful prune.
    pub last_pruned_at: Option<DateTime<Utc>>,
}

impl SyncResource {
    /// Returns the last successful completion for one domain.
    ///
    /// Deletion has no completion timestamp because a completed deletion
    /// removes the resource.
    #[must_use]
    pub fn last_synced_at(&self, domain: SyncDomain) -> Option<DateTime<Utc>> {
        match domain {
            SyncDomain::Indexing => self.last_indexed_at,
            SyncDomain::PermissionSync => self.last_permission_sync_at,
            SyncDomain::ExternalGroupSync => self.last_external_group_sync_at,
            SyncDomain::Pruning => self.last_pruned_at,
            SyncDomain::Deletion => None,
        }
    }
}
