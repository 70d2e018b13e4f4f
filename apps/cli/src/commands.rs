//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use ticketdesk_core::generation::HttpGenerator;
use ticketdesk_core::pipeline::{
    Collaborators, ProgressReporter, TriageConfig, TriageOutcome, TriagePipeline,
};
use ticketdesk_shared::{
    AppConfig, ClientIdentity, CompanyProfile, TicketContext, init_config, load_config,
    validate_api_key,
};
use ticketdesk_storage::ArchiveStore;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// TicketDesk — triage support complaints against your ticket history.
#[derive(Parser)]
#[command(
    name = "ticketdesk",
    version,
    about = "Turn client complaints into developer notes and client replies.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Triage one complaint: developer note, client reply, and archive entry.
    Process {
        /// Client name.
        #[arg(long)]
        name: String,

        /// Client phone number.
        #[arg(long)]
        phone: String,

        /// Complaint text.
        #[arg(
            long,
            conflicts_with = "complaint_file",
            required_unless_present = "complaint_file"
        )]
        complaint: Option<String>,

        /// Read the complaint text from a file.
        #[arg(long)]
        complaint_file: Option<PathBuf>,

        /// Number of archived complaints to retrieve (overrides config).
        #[arg(short, long)]
        k: Option<u32>,

        /// Generation model (overrides config).
        #[arg(long)]
        model: Option<String>,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Archive index management.
    Archive {
        #[command(subcommand)]
        action: ArchiveAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Archive subcommands.
#[derive(Subcommand)]
pub(crate) enum ArchiveAction {
    /// Rebuild the index from the Markdown files in the archive folder.
    Sync,
    /// Search archived complaints.
    Search {
        /// Free-text query.
        query: String,

        /// Maximum number of results.
        #[arg(short, long, default_value = "3")]
        k: u32,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "ticketdesk=info",
        1 => "ticketdesk=debug",
        _ => "ticketdesk=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so `--json` output on stdout stays machine-readable.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Process {
            name,
            phone,
            complaint,
            complaint_file,
            k,
            model,
            json,
        } => {
            let complaint = read_complaint(complaint, complaint_file.as_deref())?;
            let overrides = Overrides { k, model };
            cmd_process(&name, &phone, &complaint, overrides, json).await
        }
        Command::Archive { action } => match action {
            ArchiveAction::Sync => cmd_archive_sync().await,
            ArchiveAction::Search { query, k } => cmd_archive_search(&query, k).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// CLI flags that take precedence over the config file.
struct Overrides {
    k: Option<u32>,
    model: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut AppConfig) {
        if let Some(k) = self.k {
            config.archive.retrieval_k = k;
        }
        if let Some(model) = self.model {
            config.generation.model = model;
        }
    }
}

fn read_complaint(text: Option<String>, file: Option<&Path>) -> Result<String> {
    match (text, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => std::fs::read_to_string(path)
            .wrap_err_with(|| format!("cannot read complaint file '{}'", path.display())),
        (None, None) => Err(eyre!("either --complaint or --complaint-file is required")),
    }
}

async fn open_store(config: &AppConfig) -> Result<ArchiveStore> {
    let store = ArchiveStore::open(
        Path::new(&config.archive.db_path),
        Path::new(&config.archive.archive_dir),
    )
    .await?;
    Ok(store)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_process(
    name: &str,
    phone: &str,
    complaint: &str,
    overrides: Overrides,
    json: bool,
) -> Result<()> {
    let mut config = load_config()?;
    overrides.apply(&mut config);
    validate_api_key(&config)?;

    let store = Arc::new(open_store(&config).await?);
    if config.archive.reload_on_start {
        let loaded = store.warm_up().await?;
        info!(loaded, "archive index warmed up");
    }

    let generator = Arc::new(HttpGenerator::from_config(&config.generation)?);
    let triage = TriageConfig::from(&config);
    let ticket = TicketContext::new(
        ClientIdentity::new(name, phone),
        CompanyProfile::from(&config.company),
    );

    let pipeline = TriagePipeline::new(
        Collaborators {
            retriever: store.clone(),
            generator,
            archive: store,
        },
        triage,
    )?;

    info!(client = name, "processing complaint");

    let reporter = CliProgress::new();
    let outcome = pipeline.run(complaint, &ticket, &reporter).await;
    reporter.spinner.finish_and_clear();
    let outcome = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!();
    println!("  Ticket:  {}", outcome.ticket_id);
    println!("  Archive: {}", outcome.storage_status);
    println!("  Time:    {:.1}s", outcome.elapsed.as_secs_f64());
    println!();
    println!("── Developer note ──────────────────────────────");
    println!("{}", outcome.developer_note.trim_end());
    println!();
    println!("── Client reply ────────────────────────────────");
    println!("{}", outcome.client_reply.trim_end());
    println!();

    Ok(())
}

async fn cmd_archive_sync() -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config).await?;
    let loaded = store.warm_up().await?;
    println!(
        "Indexed {loaded} document(s) from {}",
        store.archive_dir().display()
    );
    Ok(())
}

async fn cmd_archive_search(query: &str, k: u32) -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config).await?;
    let documents = store.query(query, k).await?;

    if documents.is_empty() {
        println!("No matching documents.");
        return Ok(());
    }
    for doc in documents {
        let first_line = doc.content.lines().next().unwrap_or_default();
        println!("{:>6}  {first_line}", doc.id);
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage_started(&self, name: &str, index: usize, total: usize) {
        self.spinner
            .set_message(format!("[{}/{total}] {}", index + 1, stage_label(name)));
    }

    fn stage_finished(&self, _name: &str, _record_len: usize) {}

    fn done(&self, _outcome: &TriageOutcome) {
        self.spinner.finish_and_clear();
    }
}

fn stage_label(name: &str) -> &str {
    match name {
        "retrieval" => "Searching archived complaints",
        "understanding" => "Summarizing the problem",
        "developer_note" => "Writing developer note",
        "client_reply" => "Drafting client reply",
        "store_ticket" => "Archiving complaint",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_requires_some_complaint_source() {
        let parsed = Cli::try_parse_from(["ticketdesk", "process", "--name", "Dana", "--phone", "1"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn complaint_sources_are_mutually_exclusive() {
        let parsed = Cli::try_parse_from([
            "ticketdesk",
            "process",
            "--name",
            "Dana",
            "--phone",
            "1",
            "--complaint",
            "broken",
            "--complaint-file",
            "c.txt",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn flags_override_config_values() {
        let mut config = AppConfig::default();
        Overrides {
            k: Some(7),
            model: Some("llama3.1:8b".into()),
        }
        .apply(&mut config);
        assert_eq!(config.archive.retrieval_k, 7);
        assert_eq!(config.generation.model, "llama3.1:8b");
    }

    #[test]
    fn inline_complaint_wins_over_file() {
        let text = read_complaint(Some("inline".into()), None).unwrap();
        assert_eq!(text, "inline");
        assert!(read_complaint(None, Some(Path::new("/nonexistent/td.txt"))).is_err());
    }
}
