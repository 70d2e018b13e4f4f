//! libSQL-backed complaint archive (offline mode).
//!
//! The [`ArchiveStore`] wraps a libSQL database holding archived complaint
//! documents and an FTS5 index used for similarity search. The Markdown files
//! in the archive folder are the source of truth; the database is an index
//! that can be rebuilt from them at any time (see [`ArchiveStore::warm_up`]).
//!
//! **Concurrency:** every mutation (reset, bulk add, storing a complaint)
//! goes through a single async writer lock, so one store can be shared
//! behind an `Arc` by concurrent runs.

mod archive;
mod migrations;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Utc;
use libsql::{Connection, Database, params};
use regex::Regex;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use ticketdesk_shared::{ArchivedDocument, ClientIdentity, Result, TicketDeskError};

pub use archive::render_complaint;

/// Upper bound on query terms sent to FTS5.
const MAX_QUERY_TERMS: usize = 32;

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("valid word regex"));

/// Archive handle: libSQL index plus the Markdown folder it mirrors.
pub struct ArchiveStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    archive_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl ArchiveStore {
    /// Open or create the index at `db_path` for the archive folder `archive_dir`.
    pub async fn open(db_path: &Path, archive_dir: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TicketDeskError::io(parent, e))?;
        }
        std::fs::create_dir_all(archive_dir).map_err(|e| TicketDeskError::io(archive_dir, e))?;

        let db = libsql::Builder::new_local(db_path)
            .build()
            .await
            .map_err(|e| TicketDeskError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| TicketDeskError::Storage(e.to_string()))?;

        let store = Self {
            db,
            conn,
            archive_dir: archive_dir.to_path_buf(),
            write_lock: Mutex::new(()),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// The Markdown folder backing this index.
    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        TicketDeskError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Document operations
    // -----------------------------------------------------------------------

    /// Bulk-add documents. The three slices must have the same length.
    ///
    /// Existing ids are overwritten.
    #[instrument(skip_all, fields(count = documents.len()))]
    pub async fn add_documents(
        &self,
        documents: &[String],
        metadatas: &[Map<String, Value>],
        ids: &[String],
    ) -> Result<()> {
        if documents.len() != metadatas.len() || documents.len() != ids.len() {
            return Err(TicketDeskError::validation(format!(
                "add_documents needs same-length inputs (documents={}, metadatas={}, ids={})",
                documents.len(),
                metadatas.len(),
                ids.len()
            )));
        }

        let _guard = self.write_lock.lock().await;
        for ((content, metadata), id) in documents.iter().zip(metadatas).zip(ids) {
            self.upsert_document(id, content, metadata).await?;
        }
        Ok(())
    }

    async fn upsert_document(
        &self,
        id: &str,
        content: &str,
        metadata: &Map<String, Value>,
    ) -> Result<()> {
        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| TicketDeskError::Storage(format!("metadata for {id}: {e}")))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO documents (id, content, metadata_json, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                   content = excluded.content,
                   metadata_json = excluded.metadata_json",
                params![id, content, metadata_json.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| TicketDeskError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Delete every indexed document. Returns how many were removed.
    ///
    /// Archive files on disk are left untouched.
    pub async fn reset(&self) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let removed = self
            .conn
            .execute("DELETE FROM documents", params![])
            .await
            .map_err(|e| TicketDeskError::Storage(e.to_string()))?;
        if removed > 0 {
            info!(removed, "reset archive index");
        } else {
            info!("archive index is already empty");
        }
        Ok(removed)
    }

    /// Number of indexed documents.
    pub async fn count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM documents", params![])
            .await
            .map_err(|e| TicketDeskError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| TicketDeskError::Storage(e.to_string()))?;
                Ok(count.max(0) as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(TicketDeskError::Storage(e.to_string())),
        }
    }

    /// Highest purely numeric document id in the index, or 0.
    async fn max_numeric_id(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT id FROM documents", params![])
            .await
            .map_err(|e| TicketDeskError::Storage(e.to_string()))?;

        let mut highest = 0;
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| TicketDeskError::Storage(e.to_string()))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| TicketDeskError::Storage(e.to_string()))?;
            if let Ok(n) = id.parse::<u64>() {
                highest = highest.max(n);
            }
        }
        Ok(highest)
    }

    // -----------------------------------------------------------------------
    // FTS search
    // -----------------------------------------------------------------------

    /// Return up to `k` documents most relevant to `text`, best first.
    #[instrument(skip(self, text))]
    pub async fn query(&self, text: &str, k: u32) -> Result<Vec<ArchivedDocument>> {
        let Some(match_expr) = fts_match_expression(text) else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }
        self.search_fts(&match_expr, k).await
    }

    async fn search_fts(&self, match_expr: &str, k: u32) -> Result<Vec<ArchivedDocument>> {
        let mut rows = self
            .conn
            .query(
                "SELECT d.id, d.content
                 FROM documents_fts fts
                 JOIN documents d ON d.rowid = fts.rowid
                 WHERE documents_fts MATCH ?1
                 ORDER BY rank, d.id
                 LIMIT ?2",
                params![match_expr, k],
            )
            .await
            .map_err(|e| TicketDeskError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| TicketDeskError::Storage(e.to_string()))?
        {
            results.push(ArchivedDocument {
                id: row
                    .get::<String>(0)
                    .map_err(|e| TicketDeskError::Storage(e.to_string()))?,
                content: row
                    .get::<String>(1)
                    .map_err(|e| TicketDeskError::Storage(e.to_string()))?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Archive folder operations
    // -----------------------------------------------------------------------

    /// Index every `*.md` file in the archive folder. Returns how many were loaded.
    ///
    /// Unreadable files are logged and skipped.
    #[instrument(skip_all, fields(dir = %self.archive_dir.display()))]
    pub async fn load_archive_folder(&self) -> Result<usize> {
        let files = archive::list_markdown_files(&self.archive_dir)?;

        let mut documents = Vec::with_capacity(files.len());
        let mut metadatas = Vec::with_capacity(files.len());
        let mut ids = Vec::with_capacity(files.len());

        for path in files {
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    documents.push(content);
                    metadatas.push(archive::file_metadata(&path));
                    ids.push(archive::file_id(&path));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read archive file, skipping");
                }
            }
        }

        if documents.is_empty() {
            info!("no markdown files found in archive folder");
            return Ok(0);
        }

        self.add_documents(&documents, &metadatas, &ids).await?;
        info!(loaded = documents.len(), "loaded archive files");
        Ok(documents.len())
    }

    /// Rebuild the index from the archive folder (reset, then load).
    ///
    /// Intended to run once per process before any ticket is handled.
    pub async fn warm_up(&self) -> Result<usize> {
        self.reset().await?;
        self.load_archive_folder().await
    }

    /// Archive a new complaint as `{N}.md` and index it. Returns the document id.
    #[instrument(skip_all, fields(client = %client.name))]
    pub async fn store_complaint(&self, complaint: &str, client: &ClientIdentity) -> Result<String> {
        if complaint.trim().is_empty() {
            return Err(TicketDeskError::validation("cannot store an empty complaint"));
        }

        let _guard = self.write_lock.lock().await;

        let number = archive::next_complaint_number(&self.archive_dir)?
            .max(self.max_numeric_id().await? + 1);
        let id = number.to_string();
        let path = self.archive_dir.join(format!("{id}.md"));
        let content = render_complaint(number, complaint, client);

        std::fs::write(&path, &content).map_err(|e| TicketDeskError::io(&path, e))?;
        self.upsert_document(&id, &content, &archive::file_metadata(&path))
            .await?;

        info!(id = %id, path = %path.display(), "complaint archived");
        Ok(id)
    }
}

/// Build an FTS5 `MATCH` expression from free text.
///
/// Each distinct word becomes a quoted term joined with `OR`, so punctuation in
/// complaints can never break the FTS query syntax. Returns `None` when the
/// text has no words.
fn fts_match_expression(text: &str) -> Option<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in WORD_RE.find_iter(text) {
        let term = word.as_str().to_lowercase();
        if !terms.contains(&term) {
            terms.push(term);
        }
        if terms.len() == MAX_QUERY_TERMS {
            break;
        }
    }

    if terms.is_empty() {
        return None;
    }

    Some(
        terms
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}
