//! End-to-end triage pipeline: complaint → retrieval → summary → developer
//! note → client reply → archive.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{Instrument, info, info_span};

use ticketdesk_shared::{
    AppConfig, ClientIdentity, CompanyProfile, Result, TicketContext, TicketDeskError, TicketId,
};

use crate::collaborators::{Generator, Retriever, TicketArchive};
use crate::record::{ConversationRecord, EntryRole, Originator};
use crate::stages::{
    BoundedGenerator, ClientReplyStage, DEFAULT_RETRIEVAL_K, DeveloperNoteStage, RetrievalStage,
    Stage, StageInput, StoreTicketStage, UnderstandingStage,
};

/// Runtime settings for a pipeline, merged from config + CLI flags.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Number of archived documents fetched per complaint.
    pub retrieval_k: u32,
    /// Upper bound for each generation call.
    pub generation_timeout: Duration,
    /// Company metadata quoted in client replies.
    pub company: CompanyProfile,
}

impl From<&AppConfig> for TriageConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            retrieval_k: config.archive.retrieval_k,
            generation_timeout: Duration::from_secs(config.generation.timeout_secs),
            company: CompanyProfile::from(&config.company),
        }
    }
}

/// The services a pipeline calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub retriever: Arc<dyn Retriever>,
    pub generator: Arc<dyn Generator>,
    pub archive: Arc<dyn TicketArchive>,
}

/// Result of one successful triage run.
#[derive(Debug, Serialize)]
pub struct TriageOutcome {
    pub ticket_id: TicketId,
    /// Markdown handoff note for engineers.
    pub developer_note: String,
    /// Email to send to the client.
    pub client_reply: String,
    /// Archive status message (success or the absorbed failure).
    pub storage_status: String,
    /// Full audit trail of the run.
    pub record: ConversationRecord,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called before stage `index` (0-based) of `total` runs.
    fn stage_started(&self, name: &str, index: usize, total: usize);
    /// Called after a stage's entry was appended.
    fn stage_finished(&self, name: &str, record_len: usize);
    /// Called when the run completes.
    fn done(&self, outcome: &TriageOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage_started(&self, _name: &str, _index: usize, _total: usize) {}
    fn stage_finished(&self, _name: &str, _record_len: usize) {}
    fn done(&self, _outcome: &TriageOutcome) {}
}

/// Fixed, ordered list of stages plus the company profile they reply on behalf of.
pub struct TriagePipeline {
    stages: Vec<Box<dyn Stage>>,
    company: CompanyProfile,
}

impl TriagePipeline {
    /// Build the standard five-stage pipeline.
    pub fn new(collaborators: Collaborators, config: TriageConfig) -> Result<Self> {
        let generator = BoundedGenerator::new(collaborators.generator, config.generation_timeout);
        let k = if config.retrieval_k == 0 {
            DEFAULT_RETRIEVAL_K
        } else {
            config.retrieval_k
        };

        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(RetrievalStage::new(collaborators.retriever, k)),
            Box::new(UnderstandingStage::new(generator.clone())),
            Box::new(DeveloperNoteStage::new(generator.clone())),
            Box::new(ClientReplyStage::new(generator)),
            Box::new(StoreTicketStage::new(collaborators.archive)),
        ];
        Self::with_stages(stages, config.company)
    }

    /// Build a pipeline from explicit stages, checking their wiring.
    ///
    /// Every declared read must be the complaint or the write of an earlier
    /// stage, each role may be written once, and the developer note and
    /// client reply must both be produced.
    pub fn with_stages(stages: Vec<Box<dyn Stage>>, company: CompanyProfile) -> Result<Self> {
        let mut available = vec![EntryRole::Complaint];
        for stage in &stages {
            if let Some(missing) = stage.reads().iter().find(|r| !available.contains(*r)) {
                return Err(TicketDeskError::pipeline(
                    stage.name(),
                    format!("reads `{missing}` before any stage writes it"),
                ));
            }
            if available.contains(&stage.writes()) {
                return Err(TicketDeskError::pipeline(
                    stage.name(),
                    format!("`{}` is written more than once", stage.writes()),
                ));
            }
            available.push(stage.writes());
        }
        for artifact in [EntryRole::DeveloperNote, EntryRole::ClientReply] {
            if !available.contains(&artifact) {
                return Err(TicketDeskError::pipeline(
                    "pipeline",
                    format!("no stage writes `{artifact}`"),
                ));
            }
        }

        Ok(Self { stages, company })
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Triage a complaint for a client, using the configured company profile.
    pub async fn process(
        &self,
        client_name: &str,
        client_phone: &str,
        complaint_text: &str,
    ) -> Result<TriageOutcome> {
        let ticket = TicketContext::new(
            ClientIdentity::new(client_name, client_phone),
            self.company.clone(),
        );
        self.run(complaint_text, &ticket, &SilentProgress).await
    }

    /// Run every stage in order for one complaint.
    ///
    /// Any stage error aborts the run; no partial outcome is returned.
    pub async fn run(
        &self,
        complaint_text: &str,
        ticket: &TicketContext,
        progress: &dyn ProgressReporter,
    ) -> Result<TriageOutcome> {
        let ticket_id = TicketId::new();
        let span = info_span!("triage", %ticket_id, client = %ticket.client.name);
        self.run_inner(ticket_id, complaint_text, ticket, progress)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        ticket_id: TicketId,
        complaint_text: &str,
        ticket: &TicketContext,
        progress: &dyn ProgressReporter,
    ) -> Result<TriageOutcome> {
        if complaint_text.trim().is_empty() {
            return Err(TicketDeskError::validation("complaint text is empty"));
        }
        ticket.validate()?;

        let start = Instant::now();
        let total = self.stages.len();
        let mut record = ConversationRecord::seeded(complaint_text);

        info!(stages = total, "starting triage run");

        for (index, stage) in self.stages.iter().enumerate() {
            let name = stage.name();

            if record.len() != 1 + index {
                return Err(TicketDeskError::pipeline(
                    name,
                    format!(
                        "record holds {} entries, expected {}",
                        record.len(),
                        1 + index
                    ),
                ));
            }
            if let Some(missing) = stage.reads().iter().find(|r| !record.contains(**r)) {
                return Err(TicketDeskError::pipeline(
                    name,
                    format!("declared input `{missing}` is missing"),
                ));
            }

            progress.stage_started(name, index, total);
            let stage_start = Instant::now();

            let content = stage
                .run(StageInput::new(name, stage.reads(), &record, ticket))
                .await?;
            record.append(Originator::System, stage.writes(), content)?;

            info!(
                stage = name,
                entries = record.len(),
                elapsed_ms = stage_start.elapsed().as_millis(),
                "stage complete"
            );
            progress.stage_finished(name, record.len());
        }

        let artifact = |role: EntryRole| -> Result<String> {
            record
                .get(role)
                .map(str::to_string)
                .ok_or_else(|| TicketDeskError::pipeline("pipeline", format!("`{role}` was not produced")))
        };
        let developer_note = artifact(EntryRole::DeveloperNote)?;
        let client_reply = artifact(EntryRole::ClientReply)?;
        let storage_status = record
            .get(EntryRole::StorageStatus)
            .unwrap_or_default()
            .to_string();

        let outcome = TriageOutcome {
            ticket_id,
            developer_note,
            client_reply,
            storage_status,
            record,
            elapsed: start.elapsed(),
        };

        progress.done(&outcome);

        info!(
            entries = outcome.record.len(),
            elapsed_ms = outcome.elapsed.as_millis(),
            "triage run complete"
        );

        Ok(outcome)
    }
}
