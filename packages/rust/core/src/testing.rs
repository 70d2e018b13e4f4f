//! Test doubles for the collaborator traits.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use ticketdesk_shared::{
    ArchivedDocument, ClientIdentity, CompanyProfile, Result, TicketContext, TicketDeskError,
};

use crate::collaborators::{Generator, Retriever, TicketArchive};

pub(crate) fn company() -> CompanyProfile {
    CompanyProfile {
        name: "Acme Support".into(),
        email: "help@acme.test".into(),
        phone_numbers: vec!["+1 555 0100".into()],
    }
}

pub(crate) fn ticket() -> TicketContext {
    TicketContext::new(ClientIdentity::new("Dana", "555-0199"), company())
}

// ---------------------------------------------------------------------------
// Retrievers
// ---------------------------------------------------------------------------

/// Returns its documents in insertion order, ignoring the query text.
#[derive(Default)]
pub(crate) struct MemoryRetriever {
    docs: Mutex<Vec<ArchivedDocument>>,
}

impl MemoryRetriever {
    pub(crate) fn with(docs: Vec<ArchivedDocument>) -> Self {
        Self {
            docs: Mutex::new(docs),
        }
    }
}

#[async_trait]
impl Retriever for MemoryRetriever {
    async fn query(&self, _text: &str, k: u32) -> Result<Vec<ArchivedDocument>> {
        let docs = self.docs.lock().unwrap();
        Ok(docs.iter().take(k as usize).cloned().collect())
    }

    async fn add(
        &self,
        documents: &[String],
        _metadatas: &[Map<String, Value>],
        ids: &[String],
    ) -> Result<()> {
        let mut docs = self.docs.lock().unwrap();
        for (content, id) in documents.iter().zip(ids) {
            docs.push(ArchivedDocument {
                id: id.clone(),
                content: content.clone(),
            });
        }
        Ok(())
    }

    async fn reset(&self) -> Result<u64> {
        let mut docs = self.docs.lock().unwrap();
        let removed = docs.len() as u64;
        docs.clear();
        Ok(removed)
    }
}

pub(crate) struct FailingRetriever;

#[async_trait]
impl Retriever for FailingRetriever {
    async fn query(&self, _text: &str, _k: u32) -> Result<Vec<ArchivedDocument>> {
        Err(TicketDeskError::unavailable("retrieval", "index offline"))
    }

    async fn add(&self, _: &[String], _: &[Map<String, Value>], _: &[String]) -> Result<()> {
        Err(TicketDeskError::unavailable("retrieval", "index offline"))
    }

    async fn reset(&self) -> Result<u64> {
        Err(TicketDeskError::unavailable("retrieval", "index offline"))
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Returns the prompt unchanged.
pub(crate) struct EchoPrompt;

#[async_trait]
impl Generator for EchoPrompt {
    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(prompt.to_string())
    }
}

/// Returns the last non-blank line of the prompt.
pub(crate) struct EchoLastLine;

#[async_trait]
impl Generator for EchoLastLine {
    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(prompt
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or_default()
            .to_string())
    }
}

/// Always returns the same text.
pub(crate) struct FixedGenerator(String);

impl FixedGenerator {
    pub(crate) fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }
}

#[async_trait]
impl Generator for FixedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Succeeds for the first `ok_calls` calls, then fails.
pub(crate) struct FailAfter {
    ok_calls: usize,
    calls: Mutex<usize>,
}

impl FailAfter {
    pub(crate) fn new(ok_calls: usize) -> Self {
        Self {
            ok_calls,
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl Generator for FailAfter {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        if *calls > self.ok_calls {
            Err(TicketDeskError::unavailable("generation", "model unloaded"))
        } else {
            Ok(format!("generated #{calls}"))
        }
    }
}

/// Sleeps before answering.
pub(crate) struct SlowGenerator(pub(crate) Duration);

#[async_trait]
impl Generator for SlowGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        tokio::time::sleep(self.0).await;
        Ok("too late".into())
    }
}

// ---------------------------------------------------------------------------
// Archives
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct RecordingArchive {
    stored: Mutex<Vec<(String, ClientIdentity)>>,
}

impl RecordingArchive {
    pub(crate) fn stored(&self) -> Vec<(String, ClientIdentity)> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl TicketArchive for RecordingArchive {
    async fn store(&self, complaint: &str, client: &ClientIdentity) -> Result<String> {
        let mut stored = self.stored.lock().unwrap();
        stored.push((complaint.to_string(), client.clone()));
        Ok(stored.len().to_string())
    }
}

pub(crate) struct FailingArchive;

#[async_trait]
impl TicketArchive for FailingArchive {
    async fn store(&self, _complaint: &str, _client: &ClientIdentity) -> Result<String> {
        Err(TicketDeskError::Storage("disk full".into()))
    }
}
