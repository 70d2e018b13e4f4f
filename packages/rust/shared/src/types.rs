//! Core domain types for TicketDesk triage runs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TicketDeskError};

// ---------------------------------------------------------------------------
// TicketId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one triage run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub Uuid);

impl TicketId {
    /// Generate a new time-sortable ticket identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TicketId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Ticket context
// ---------------------------------------------------------------------------

/// The client who filed the complaint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub name: String,
    pub phone: String,
}

impl ClientIdentity {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
        }
    }
}

impl std::fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "NAME: {}", self.name)?;
        write!(f, "PHONE: {}", self.phone)
    }
}

/// Static company metadata injected into client replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: String,
    pub email: String,
    pub phone_numbers: Vec<String>,
}

impl std::fmt::Display for CompanyProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "NAME: {}", self.name)?;
        writeln!(f, "EMAIL: {}", self.email)?;
        write!(f, "PHONE NUMBERS: {}", self.phone_numbers.join(", "))
    }
}

/// Immutable context carried alongside one triage run.
///
/// Read by the reply-composition stage (company + client) and by the
/// store stage (client only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketContext {
    pub client: ClientIdentity,
    pub company: CompanyProfile,
}

impl TicketContext {
    pub fn new(client: ClientIdentity, company: CompanyProfile) -> Self {
        Self { client, company }
    }

    /// Reject contexts with any blank field.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("client name", self.client.name.as_str()),
            ("client phone", self.client.phone.as_str()),
            ("company name", self.company.name.as_str()),
            ("company email", self.company.email.as_str()),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(TicketDeskError::validation(format!(
                    "ticket context is missing the {field}"
                )));
            }
        }
        if self.company.phone_numbers.iter().all(|p| p.trim().is_empty()) {
            return Err(TicketDeskError::validation(
                "ticket context is missing company phone numbers",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ArchivedDocument
// ---------------------------------------------------------------------------

/// A historical complaint returned by the archive's similarity search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedDocument {
    /// Document identifier (archive file stem, e.g. `"12"`).
    pub id: String,
    /// Full document text.
    pub content: String,
}
