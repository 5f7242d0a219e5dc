use serde::{Deserialize, Serialize};

use crate::dao::models::SessionEntity;

/// Prefix of every session document id.
pub const SESSION_PREFIX: &str = "planning_poker:";

/// Session document as stored by CouchDB, carrying its revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchSessionDocument {
    /// Card identifier.
    #[serde(rename = "_id")]
    pub id: String,
    /// Present once the document exists; required to replace it.
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// Session fields, stored at the top level of the document.
    #[serde(flatten)]
    pub session: SessionEntity,
}

/// Minimal projection used when only the revision of a document is needed.
#[derive(Debug, Deserialize)]
pub struct RevisionOnly {
    /// Current revision.
    #[serde(rename = "_rev")]
    pub rev: String,
}

impl CouchSessionDocument {
    /// Wrap a session for storage under its project document id.
    pub fn from_entity(session: SessionEntity, rev: Option<String>) -> Self {
        Self {
            id: session_doc_id(&session.project_id),
            rev,
            session,
        }
    }

    /// Strip the CouchDB bookkeeping fields.
    pub fn into_entity(self) -> SessionEntity {
        self.session
    }
}

/// Document id of the session of `project_id`.
pub fn session_doc_id(project_id: &str) -> String {
    format!("{SESSION_PREFIX}{project_id}")
}
