//! Seams to the services a triage run depends on.
//!
//! The pipeline only talks to these traits. [`ArchiveStore`] implements the
//! retrieval and persistence sides; [`crate::generation::HttpGenerator`]
//! implements generation.

use async_trait::async_trait;
use serde_json::{Map, Value};

use ticketdesk_shared::{ArchivedDocument, ClientIdentity, Result};
use ticketdesk_storage::ArchiveStore;

/// Similarity search over archived complaints.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `k` documents relevant to `text`, best first. May be empty.
    async fn query(&self, text: &str, k: u32) -> Result<Vec<ArchivedDocument>>;

    /// Bulk-load documents. Slices must have equal length.
    async fn add(
        &self,
        documents: &[String],
        metadatas: &[Map<String, Value>],
        ids: &[String],
    ) -> Result<()>;

    /// Drop every stored document, returning how many were removed.
    async fn reset(&self) -> Result<u64>;
}

/// Opaque prompt-to-text service.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Durable storage for new complaints.
#[async_trait]
pub trait TicketArchive: Send + Sync {
    /// Persist `complaint` so later queries can find it. Returns the document id.
    async fn store(&self, complaint: &str, client: &ClientIdentity) -> Result<String>;
}

#[async_trait]
impl Retriever for ArchiveStore {
    async fn query(&self, text: &str, k: u32) -> Result<Vec<ArchivedDocument>> {
        ArchiveStore::query(self, text, k).await
    }

    async fn add(
        &self,
        documents: &[String],
        metadatas: &[Map<String, Value>],
        ids: &[String],
    ) -> Result<()> {
        self.add_documents(documents, metadatas, ids).await
    }

    async fn reset(&self) -> Result<u64> {
        ArchiveStore::reset(self).await
    }
}

#[async_trait]
impl TicketArchive for ArchiveStore {
    async fn store(&self, complaint: &str, client: &ClientIdentity) -> Result<String> {
        self.store_complaint(complaint, client).await
    }
}
