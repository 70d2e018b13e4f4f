//! The five triage stages.
//!
//! Every stage declares the roles it reads and the single role it writes.
//! The pipeline checks the declared reads before invoking a stage and appends
//! the returned content under the declared write role. Stages never touch the
//! record directly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use ticketdesk_shared::{ArchivedDocument, Result, TicketContext, TicketDeskError};

use crate::collaborators::{Generator, Retriever, TicketArchive};
use crate::prompts;
use crate::record::{ConversationRecord, EntryRole};

/// Documents requested from the retriever when not configured otherwise.
pub const DEFAULT_RETRIEVAL_K: u32 = 3;

/// Developer-note lines carrying this marker never reach the client.
pub const INTERNAL_ONLY_MARKER: &str = "[internal-only]";

const NO_DOCUMENTS: &str =
    "Based on the complaint, no relevant documents were found in the archive.";

// ---------------------------------------------------------------------------
// Stage contract
// ---------------------------------------------------------------------------

/// Read-only view handed to a stage: its declared inputs plus the ticket context.
pub struct StageInput<'a> {
    stage: &'static str,
    reads: &'static [EntryRole],
    record: &'a ConversationRecord,
    pub ticket: &'a TicketContext,
}

impl<'a> StageInput<'a> {
    pub(crate) fn new(
        stage: &'static str,
        reads: &'static [EntryRole],
        record: &'a ConversationRecord,
        ticket: &'a TicketContext,
    ) -> Self {
        Self {
            stage,
            reads,
            record,
            ticket,
        }
    }

    /// Content of a declared input role.
    pub fn read(&self, role: EntryRole) -> Result<&'a str> {
        if !self.reads.contains(&role) {
            return Err(TicketDeskError::pipeline(
                self.stage,
                format!("read of undeclared role `{role}`"),
            ));
        }
        self.record.get(role).ok_or_else(|| {
            TicketDeskError::pipeline(self.stage, format!("declared input `{role}` is missing"))
        })
    }

    /// Content of the seed entry (the very first one in the record).
    pub fn seed(&self) -> Result<&'a str> {
        match self.record.first() {
            Some(entry) if entry.role == EntryRole::Complaint => Ok(entry.content.as_str()),
            _ => Err(TicketDeskError::pipeline(
                self.stage,
                "record does not start with the complaint",
            )),
        }
    }
}

/// One step of the triage workflow.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Roles that must be present before this stage runs.
    fn reads(&self) -> &'static [EntryRole];

    /// The role this stage's output fills.
    fn writes(&self) -> EntryRole;

    /// Produce the content of the new entry.
    async fn run(&self, input: StageInput<'_>) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Bounded generation
// ---------------------------------------------------------------------------

/// A [`Generator`] call with a time bound and an empty-output check.
#[derive(Clone)]
pub struct BoundedGenerator {
    inner: Arc<dyn Generator>,
    timeout: Duration,
}

impl BoundedGenerator {
    pub fn new(inner: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Generate text, failing on timeout or blank output.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let text = tokio::time::timeout(self.timeout, self.inner.generate(prompt))
            .await
            .map_err(|_| TicketDeskError::Timeout {
                collaborator: "generation",
                secs: self.timeout.as_secs(),
            })??;

        if text.trim().is_empty() {
            return Err(TicketDeskError::malformed(
                "generation",
                "generated text is empty",
            ));
        }
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Retrieval
// ---------------------------------------------------------------------------

/// Fetches similar archived complaints and formats them as one history block.
pub struct RetrievalStage {
    retriever: Arc<dyn Retriever>,
    k: u32,
}

impl RetrievalStage {
    pub fn new(retriever: Arc<dyn Retriever>, k: u32) -> Self {
        Self { retriever, k }
    }
}

/// Render retrieved documents in collaborator order. Never returns an empty string.
pub fn format_retrieved(documents: &[ArchivedDocument]) -> String {
    if documents.is_empty() {
        return NO_DOCUMENTS.to_string();
    }

    let block = documents
        .iter()
        .map(|doc| format!("Document ID: {}\nContent: {}", doc.id, doc.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("Based on the complaint, here are some relevant documents:\n\n{block}")
}

#[async_trait]
impl Stage for RetrievalStage {
    fn name(&self) -> &'static str {
        "retrieval"
    }

    fn reads(&self) -> &'static [EntryRole] {
        &[EntryRole::Complaint]
    }

    fn writes(&self) -> EntryRole {
        EntryRole::RetrievedContext
    }

    async fn run(&self, input: StageInput<'_>) -> Result<String> {
        let complaint = input.read(EntryRole::Complaint)?;
        let documents = self.retriever.query(complaint, self.k).await?;

        let ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        info!(?ids, found = documents.len(), "retrieved archived documents");

        Ok(format_retrieved(&documents))
    }
}

// ---------------------------------------------------------------------------
// Understanding
// ---------------------------------------------------------------------------

/// Summarizes the complaint against the retrieved history.
pub struct UnderstandingStage {
    generator: BoundedGenerator,
}

impl UnderstandingStage {
    pub fn new(generator: BoundedGenerator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Stage for UnderstandingStage {
    fn name(&self) -> &'static str {
        "understanding"
    }

    fn reads(&self) -> &'static [EntryRole] {
        &[EntryRole::Complaint, EntryRole::RetrievedContext]
    }

    fn writes(&self) -> EntryRole {
        EntryRole::ProblemSummary
    }

    async fn run(&self, input: StageInput<'_>) -> Result<String> {
        let prompt = prompts::understanding(
            input.read(EntryRole::Complaint)?,
            input.read(EntryRole::RetrievedContext)?,
        );
        self.generator.generate(&prompt).await
    }
}

// ---------------------------------------------------------------------------
// Developer note
// ---------------------------------------------------------------------------

/// Writes the Markdown handoff note for engineers.
pub struct DeveloperNoteStage {
    generator: BoundedGenerator,
}

impl DeveloperNoteStage {
    pub fn new(generator: BoundedGenerator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Stage for DeveloperNoteStage {
    fn name(&self) -> &'static str {
        "developer_note"
    }

    fn reads(&self) -> &'static [EntryRole] {
        &[
            EntryRole::Complaint,
            EntryRole::RetrievedContext,
            EntryRole::ProblemSummary,
        ]
    }

    fn writes(&self) -> EntryRole {
        EntryRole::DeveloperNote
    }

    async fn run(&self, input: StageInput<'_>) -> Result<String> {
        let prompt = prompts::developer_note(
            input.read(EntryRole::Complaint)?,
            input.read(EntryRole::RetrievedContext)?,
            input.read(EntryRole::ProblemSummary)?,
        );
        self.generator.generate(&prompt).await
    }
}

// ---------------------------------------------------------------------------
// Client reply
// ---------------------------------------------------------------------------

/// Composes the client-facing email.
pub struct ClientReplyStage {
    generator: BoundedGenerator,
}

impl ClientReplyStage {
    pub fn new(generator: BoundedGenerator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Stage for ClientReplyStage {
    fn name(&self) -> &'static str {
        "client_reply"
    }

    fn reads(&self) -> &'static [EntryRole] {
        &[
            EntryRole::Complaint,
            EntryRole::RetrievedContext,
            EntryRole::ProblemSummary,
            EntryRole::DeveloperNote,
        ]
    }

    fn writes(&self) -> EntryRole {
        EntryRole::ClientReply
    }

    async fn run(&self, input: StageInput<'_>) -> Result<String> {
        let (shareable_note, withheld) = withhold_internal(input.read(EntryRole::DeveloperNote)?);
        if !withheld.is_empty() {
            info!(lines = withheld.len(), "withholding internal-only developer note lines");
        }

        let prompt = prompts::client_reply(
            input.read(EntryRole::Complaint)?,
            input.read(EntryRole::RetrievedContext)?,
            input.read(EntryRole::ProblemSummary)?,
            &shareable_note,
            input.ticket,
        );
        let reply = self.generator.generate(&prompt).await?;

        let reply = match scrub_reply(&reply, &withheld) {
            Some(scrubbed) => {
                warn!("generated reply leaked internal-only content; scrubbed");
                scrubbed
            }
            None => reply,
        };
        if reply.trim().is_empty() {
            return Err(TicketDeskError::malformed(
                "generation",
                "client reply is empty after removing internal-only content",
            ));
        }
        Ok(reply)
    }
}

/// Byte offset of the marker in `line`, matched ASCII case-insensitively.
fn marker_position(line: &str) -> Option<usize> {
    line.to_ascii_lowercase().find(INTERNAL_ONLY_MARKER)
}

/// Split a developer note into the shareable text and the internal-only lines.
fn withhold_internal(note: &str) -> (String, Vec<String>) {
    let mut shareable = Vec::new();
    let mut withheld = Vec::new();
    for line in note.lines() {
        if marker_position(line).is_some() {
            withheld.push(line.to_string());
        } else {
            shareable.push(line);
        }
    }
    (shareable.join("\n"), withheld)
}

/// Text fragments of a withheld line that must not appear in the reply.
fn leaked_fragments(line: &str) -> Vec<String> {
    let Some(pos) = marker_position(line) else {
        return Vec::new();
    };
    let before = line[..pos].trim_matches(|c: char| c.is_whitespace() || "-*#>".contains(c));
    let after = line[pos + INTERNAL_ONLY_MARKER.len()..].trim_matches(|c: char| {
        c.is_whitespace() || ":-".contains(c)
    });
    [before, after]
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Withheld fragments shorter than this (and under three words) are not
/// matched against the reply.
const MIN_FRAGMENT_CHARS: usize = 12;
const MIN_FRAGMENT_WORDS: usize = 3;

fn is_distinctive(fragment: &str) -> bool {
    fragment.chars().count() >= MIN_FRAGMENT_CHARS
        || fragment.split_whitespace().count() >= MIN_FRAGMENT_WORDS
}

fn line_leaks(line: &str, fragments: &[String]) -> bool {
    if marker_position(line).is_some() {
        return true;
    }
    let line = line.to_lowercase();
    fragments.iter().any(|f| line.contains(f.as_str()))
}

/// Drop reply lines that carry the marker or a distinctive withheld fragment.
///
/// Returns `None` when the reply needs no change.
fn scrub_reply(reply: &str, withheld: &[String]) -> Option<String> {
    let fragments: Vec<String> = withheld
        .iter()
        .flat_map(|l| leaked_fragments(l))
        .filter(|f| is_distinctive(f))
        .map(|f| f.to_lowercase())
        .collect();

    if !reply.lines().any(|line| line_leaks(line, &fragments)) {
        return None;
    }

    Some(
        reply
            .lines()
            .filter(|line| !line_leaks(line, &fragments))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

// ---------------------------------------------------------------------------
// Store ticket
// ---------------------------------------------------------------------------

/// Archives the original complaint. Failures become a status entry, never an error.
pub struct StoreTicketStage {
    archive: Arc<dyn TicketArchive>,
}

impl StoreTicketStage {
    pub fn new(archive: Arc<dyn TicketArchive>) -> Self {
        Self { archive }
    }
}

#[async_trait]
impl Stage for StoreTicketStage {
    fn name(&self) -> &'static str {
        "store_ticket"
    }

    fn reads(&self) -> &'static [EntryRole] {
        &[EntryRole::Complaint]
    }

    fn writes(&self) -> EntryRole {
        EntryRole::StorageStatus
    }

    async fn run(&self, input: StageInput<'_>) -> Result<String> {
        let stored = match input.seed() {
            Ok(complaint) => self.archive.store(complaint, &input.ticket.client).await,
            Err(e) => Err(e),
        };

        match stored {
            Ok(id) => {
                info!(document_id = %id, "complaint stored");
                Ok(format!(
                    "Complaint successfully stored to knowledge base as document {id}."
                ))
            }
            Err(e) => {
                warn!(error = %e, "failed to store complaint");
                Ok(format!("Failed to store complaint: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Originator;
    use crate::testing::{
        EchoPrompt, FailingArchive, FailingRetriever, FixedGenerator, MemoryRetriever,
        RecordingArchive, SlowGenerator, ticket,
    };

    fn doc(id: &str, content: &str) -> ArchivedDocument {
        ArchivedDocument {
            id: id.into(),
            content: content.into(),
        }
    }

    fn bounded(generator: impl Generator + 'static) -> BoundedGenerator {
        BoundedGenerator::new(Arc::new(generator), Duration::from_secs(5))
    }

    fn record_through_summary() -> ConversationRecord {
        let mut record = ConversationRecord::seeded("login fails after update");
        record
            .append(Originator::System, EntryRole::RetrievedContext, "HISTORY BLOCK")
            .unwrap();
        record
            .append(Originator::System, EntryRole::ProblemSummary, "SUMMARY TEXT")
            .unwrap();
        record
    }

    #[test]
    fn formats_documents_in_given_order() {
        let block = format_retrieved(&[doc("9", "second best"), doc("2", "third")]);
        assert_eq!(
            block,
            "Based on the complaint, here are some relevant documents:\n\n\
             Document ID: 9\nContent: second best\n\n\
             Document ID: 2\nContent: third"
        );
    }

    #[test]
    fn empty_results_still_produce_text() {
        let block = format_retrieved(&[]);
        assert!(!block.is_empty());
        assert!(block.contains("no relevant documents"));
    }

    #[tokio::test]
    async fn retrieval_is_idempotent_for_unchanged_store() {
        let retriever = Arc::new(MemoryRetriever::with(vec![
            doc("1", "App crashes on login, fixed in v2.3"),
            doc("2", "Dark mode flickers"),
        ]));
        let stage = RetrievalStage::new(retriever, DEFAULT_RETRIEVAL_K);
        let record = ConversationRecord::seeded("app crashes");
        let ticket = ticket();

        let first = stage
            .run(StageInput::new(stage.name(), stage.reads(), &record, &ticket))
            .await
            .unwrap();
        let second = stage
            .run(StageInput::new(stage.name(), stage.reads(), &record, &ticket))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert!(first.contains("Document ID: 1"));
    }

    #[tokio::test]
    async fn retrieval_passes_k_through() {
        let retriever = Arc::new(MemoryRetriever::with(
            (0..10).map(|i| doc(&i.to_string(), "crash")).collect(),
        ));
        let stage = RetrievalStage::new(retriever, 3);
        let record = ConversationRecord::seeded("crash");
        let ticket = ticket();
        let block = stage
            .run(StageInput::new(stage.name(), stage.reads(), &record, &ticket))
            .await
            .unwrap();
        assert_eq!(block.matches("Document ID:").count(), 3);
    }

    #[tokio::test]
    async fn retrieval_failure_propagates() {
        let stage = RetrievalStage::new(Arc::new(FailingRetriever), 3);
        let record = ConversationRecord::seeded("crash");
        let ticket = ticket();
        let result = stage
            .run(StageInput::new(stage.name(), stage.reads(), &record, &ticket))
            .await;
        assert!(matches!(
            result,
            Err(TicketDeskError::CollaboratorUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn reading_an_undeclared_role_is_rejected() {
        let record = record_through_summary();
        let ticket = ticket();
        let input = StageInput::new("retrieval", &[EntryRole::Complaint], &record, &ticket);
        let err = input.read(EntryRole::ProblemSummary).unwrap_err();
        assert!(err.to_string().contains("undeclared role `problem_summary`"));
    }

    #[tokio::test]
    async fn developer_note_prompt_sees_all_three_inputs() {
        let stage = DeveloperNoteStage::new(bounded(EchoPrompt));
        let record = record_through_summary();
        let ticket = ticket();
        let note = stage
            .run(StageInput::new(stage.name(), stage.reads(), &record, &ticket))
            .await
            .unwrap();
        assert!(note.contains("login fails after update"));
        assert!(note.contains("HISTORY BLOCK"));
        assert!(note.contains("SUMMARY TEXT"));
    }

    #[tokio::test]
    async fn blank_generation_is_malformed() {
        let stage = UnderstandingStage::new(bounded(FixedGenerator::new("  \n ")));
        let record = record_through_summary();
        let ticket = ticket();
        let result = stage
            .run(StageInput::new(stage.name(), stage.reads(), &record, &ticket))
            .await;
        assert!(matches!(
            result,
            Err(TicketDeskError::MalformedResponse { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_generation_times_out() {
        let generator = BoundedGenerator::new(
            Arc::new(SlowGenerator(Duration::from_secs(600))),
            Duration::from_secs(30),
        );
        let err = generator.generate("prompt").await.unwrap_err();
        assert!(matches!(
            err,
            TicketDeskError::Timeout {
                collaborator: "generation",
                secs: 30
            }
        ));
    }

    #[tokio::test]
    async fn client_reply_never_contains_internal_only_lines() {
        let mut record = record_through_summary();
        record
            .append(
                Originator::System,
                EntryRole::DeveloperNote,
                "# Login failure\n- Check the session refresh path\n\
                 - [internal-only] rotate SENTINEL-7f3a in auth/keys.rs",
            )
            .unwrap();
        let ticket = ticket();

        // Echoes the whole prompt, so anything placed in the prompt would leak.
        let stage = ClientReplyStage::new(bounded(EchoPrompt));
        let reply = stage
            .run(StageInput::new(stage.name(), stage.reads(), &record, &ticket))
            .await
            .unwrap();
        assert!(!reply.contains("SENTINEL-7f3a"));
        assert!(!reply.to_ascii_lowercase().contains("[internal-only]"));
        assert!(reply.contains("Check the session refresh path"));
    }

    #[tokio::test]
    async fn client_reply_scrubs_leaks_from_generated_text() {
        let mut record = record_through_summary();
        record
            .append(
                Originator::System,
                EntryRole::DeveloperNote,
                "[INTERNAL-ONLY]: token SENTINEL-7f3a",
            )
            .unwrap();
        let ticket = ticket();

        let stage = ClientReplyStage::new(bounded(FixedGenerator::new(
            "Dear Dana,\nWe noticed token SENTINEL-7f3a in our logs.\nKind regards",
        )));
        let reply = stage
            .run(StageInput::new(stage.name(), stage.reads(), &record, &ticket))
            .await
            .unwrap();
        assert!(!reply.contains("SENTINEL-7f3a"));
        assert!(reply.starts_with("Dear Dana,"));
    }

    #[test]
    fn short_withheld_fragments_leave_the_reply_intact() {
        let (_, withheld) = withhold_internal("- check auth\n- [internal-only] a\n[internal-only] login");
        let reply = "Dear Dana,\nThank you for your patience with the login issue.\nKind regards";
        assert_eq!(scrub_reply(reply, &withheld), None);
    }

    #[test]
    fn clean_reply_is_returned_unchanged() {
        let (_, withheld) = withhold_internal("- [internal-only] rotate the signing key in vault");
        assert_eq!(scrub_reply("Dear Dana,\r\nKind regards\r\n", &withheld), None);
        assert_eq!(scrub_reply("Dear Dana,\nKind regards\n", &[]), None);
    }

    #[test]
    fn leaking_lines_are_dropped_whole() {
        let (_, withheld) = withhold_internal("- [internal-only] rotate the signing key in vault");
        let reply = "Dear Dana,\nWe will Rotate the signing key in vault today.\nKind regards";
        assert_eq!(
            scrub_reply(reply, &withheld).as_deref(),
            Some("Dear Dana,\nKind regards")
        );
    }

    #[tokio::test]
    async fn reply_with_common_words_passes_through_untouched() {
        let mut record = record_through_summary();
        record
            .append(
                Originator::System,
                EntryRole::DeveloperNote,
                "- check auth\n- [internal-only] a",
            )
            .unwrap();
        let ticket = ticket();

        let reply = "Dear Dana,\nThank you for your patience.\nKind regards";
        let stage = ClientReplyStage::new(bounded(FixedGenerator::new(reply)));
        let out = stage
            .run(StageInput::new(stage.name(), stage.reads(), &record, &ticket))
            .await
            .unwrap();
        assert_eq!(out, reply);
    }

    #[test]
    fn withheld_lines_are_split_out() {
        let (shareable, withheld) =
            withhold_internal("keep me\n* [Internal-Only] secret path\nkeep me too");
        assert_eq!(shareable, "keep me\nkeep me too");
        assert_eq!(withheld.len(), 1);
        assert_eq!(leaked_fragments(&withheld[0]), vec!["secret path".to_string()]);
    }

    #[tokio::test]
    async fn store_ticket_persists_the_seed_entry() {
        let archive = Arc::new(RecordingArchive::default());
        let stage = StoreTicketStage::new(archive.clone());
        let record = record_through_summary();
        let ticket = ticket();

        let status = stage
            .run(StageInput::new(stage.name(), stage.reads(), &record, &ticket))
            .await
            .unwrap();
        assert!(status.starts_with("Complaint successfully stored"));

        let stored = archive.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].0, "login fails after update");
        assert_eq!(stored[0].1.name, ticket.client.name);
    }

    #[tokio::test]
    async fn store_ticket_absorbs_failures() {
        let stage = StoreTicketStage::new(Arc::new(FailingArchive));
        let record = record_through_summary();
        let ticket = ticket();

        let status = stage
            .run(StageInput::new(stage.name(), stage.reads(), &record, &ticket))
            .await
            .expect("store stage never fails");
        assert!(status.starts_with("Failed to store complaint"));
    }
}
