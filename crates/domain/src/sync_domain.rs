use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use synccoord_core::{AppError, AppResult};

use crate::TaskPriority;

/// One family of fenced background work performed per resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDomain {
    /// Fetches documents from the source and writes them into the index.
    Indexing,
    /// Copies source-side document permissions into the index.
    PermissionSync,
    /// Copies source-side user group membership.
    ExternalGroupSync,
    /// Removes documents that no longer exist at the source.
    Pruning,
    /// Removes every document of a resource scheduled for deletion.
    Deletion,
}

impl SyncDomain {
    /// Every fenced domain.
    pub const ALL: [Self; 5] = [
        Self::Indexing,
        Self::PermissionSync,
        Self::ExternalGroupSync,
        Self::Pruning,
        Self::Deletion,
    ];

    /// Returns stable key and storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Indexing => "indexing",
            Self::PermissionSync => "permission_sync",
            Self::ExternalGroupSync => "external_group_sync",
            Self::Pruning => "pruning",
            Self::Deletion => "deletion",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        Self::ALL
            .into_iter()
            .find(|domain| domain.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown sync domain '{value}'")))
    }

    /// Domains whose fence on the same resource blocks a dispatch in this domain.
    ///
    /// Always contains the domain itself first.
    #[must_use]
    pub fn blocking_domains(&self) -> &'static [SyncDomain] {
        match self {
            Self::Indexing => &[Self::Indexing, Self::Deletion, Self::Pruning],
            Self::PermissionSync => &[Self::PermissionSync, Self::Deletion, Self::Pruning],
            Self::ExternalGroupSync => &[Self::ExternalGroupSync, Self::Deletion],
            Self::Pruning => &[
                Self::Pruning,
                Self::Deletion,
                Self::PermissionSync,
                Self::Indexing,
            ],
            Self::Deletion => &[
                Self::Deletion,
                Self::Indexing,
                Self::Pruning,
                Self::PermissionSync,
                Self::ExternalGroupSync,
            ],
        }
    }

    /// Returns whether dispatches of this domain are tracked as index attempts.
    #[must_use]
    pub fn tracks_index_attempts(&self) -> bool {
        matches!(self, Self::Indexing)
    }

    /// Queue priority of this domain's generator task.
    #[must_use]
    pub fn generator_priority(&self) -> TaskPriority {
        match self {
            Self::Pruning => TaskPriority::Medium,
            Self::Indexing
            | Self::PermissionSync
            | Self::ExternalGroupSync
            | Self::Deletion => TaskPriority::High,
        }
    }
}

impl Display for SyncDomain {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}
