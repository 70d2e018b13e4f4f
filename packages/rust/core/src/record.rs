//! The conversation record threaded through one triage run.
//!
//! Entries are appended in stage order and never mutated. Each entry carries
//! the semantic [`EntryRole`] it fills, so stages look up their inputs by role
//! instead of by position.

use serde::Serialize;

use ticketdesk_shared::{Result, TicketDeskError};

/// Who authored an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Originator {
    Client,
    System,
}

/// The semantic slot an entry fills in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryRole {
    Complaint,
    RetrievedContext,
    ProblemSummary,
    DeveloperNote,
    ClientReply,
    StorageStatus,
}

impl EntryRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complaint => "complaint",
            Self::RetrievedContext => "retrieved_context",
            Self::ProblemSummary => "problem_summary",
            Self::DeveloperNote => "developer_note",
            Self::ClientReply => "client_reply",
            Self::StorageStatus => "storage_status",
        }
    }
}

impl std::fmt::Display for EntryRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role-tagged entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordEntry {
    pub originator: Originator,
    pub role: EntryRole,
    pub content: String,
}

/// Append-only, role-addressed log of one ticket's processing.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ConversationRecord {
    entries: Vec<RecordEntry>,
}

impl ConversationRecord {
    /// Start a record with the client's complaint as its only entry.
    pub fn seeded(complaint: impl Into<String>) -> Self {
        Self {
            entries: vec![RecordEntry {
                originator: Originator::Client,
                role: EntryRole::Complaint,
                content: complaint.into(),
            }],
        }
    }

    /// Append an entry. Each role may be written once per run.
    pub fn append(
        &mut self,
        originator: Originator,
        role: EntryRole,
        content: impl Into<String>,
    ) -> Result<()> {
        if self.contains(role) {
            return Err(TicketDeskError::pipeline(
                "record",
                format!("role `{role}` was already written"),
            ));
        }
        self.entries.push(RecordEntry {
            originator,
            role,
            content: content.into(),
        });
        Ok(())
    }

    /// Content of the entry filling `role`, if it has been written.
    pub fn get(&self, role: EntryRole) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.role == role)
            .map(|e| e.content.as_str())
    }

    pub fn contains(&self, role: EntryRole) -> bool {
        self.entries.iter().any(|e| e.role == role)
    }

    /// The seed entry.
    pub fn first(&self) -> Option<&RecordEntry> {
        self.entries.first()
    }

    pub fn entries(&self) -> &[RecordEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
