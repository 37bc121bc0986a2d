use serde::{Deserialize, Serialize};

/// Source-side access control of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAccess {
    /// Source user emails allowed to read the document.
    pub external_user_emails: Vec<String>,
    /// Source group ids allowed to read the document.
    pub external_user_group_ids: Vec<String>,
    /// Whether the document is public at the source.
    pub is_public: bool,
}

/// One unit of per-document work emitted by a generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWorkItem {
    /// Document (or group) identifier the item applies to.
    pub document_id: String,
    /// Work to perform.
    pub payload: WorkItemPayload,
}

/// Work carried by one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkItemPayload {
    /// Write one fetched document into the database and the index.
    IndexDocument {
        /// Display title.
        title: String,
        /// Indexed text content.
        content: String,
        /// Link back to the source.
        source_url: Option<String>,
    },
    /// Replace the document's source-side access control.
    ExternalAccess {
        /// New access control.
        access: DocumentAccess,
    },
    /// Replace one source-side group's membership.
    ExternalGroup {
        /// Member emails.
        user_emails: Vec<String>,
    },
    /// Remove the document from the index and the database.
    RemoveDocument,
}

impl WorkItemPayload {
    /// Returns stable payload type value.
    #[must_use]
    pub fn payload_type(&self) -> &'static str {
        match self {
            Self::IndexDocument { .. } => "index_document",
            Self::ExternalAccess { .. } => "external_access",
            Self::ExternalGroup { .. } => "external_group",
            Self::RemoveDocument => "remove_document",
        }
    }
}

impl SyncWorkItem {
    /// Creates an item that removes one document.
    #[must_use]
    pub fn remove_document(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            payload: WorkItemPayload::RemoveDocument,
        }
    }
}
