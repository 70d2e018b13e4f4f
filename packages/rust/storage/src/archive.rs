//! Markdown archive folder helpers.
//!
//! One file per historical complaint. The file stem is the document id.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use ticketdesk_shared::{ClientIdentity, Result, TicketDeskError};

/// List `*.md` files directly inside `dir`, sorted by file name.
pub(crate) fn list_markdown_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| TicketDeskError::io(dir, e))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "md"))
        .collect();
    files.sort();
    Ok(files)
}

/// Document id for an archive file (its stem).
pub(crate) fn file_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Metadata recorded alongside an indexed archive file.
pub(crate) fn file_metadata(path: &Path) -> Map<String, Value> {
    let mut metadata = Map::new();
    let filename = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    metadata.insert("filename".into(), Value::String(filename));
    metadata.insert(
        "filepath".into(),
        Value::String(path.to_string_lossy().into_owned()),
    );
    metadata
}

/// Next free complaint number: one past the highest numeric stem in `dir`.
///
/// Non-numeric stems (hand-written archive notes) are ignored.
pub(crate) fn next_complaint_number(dir: &Path) -> Result<u64> {
    let highest = list_markdown_files(dir)?
        .iter()
        .filter_map(|p| file_id(p).parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    Ok(highest + 1)
}

/// Render the Markdown body of an archived complaint.
pub fn render_complaint(number: u64, complaint: &str, client: &ClientIdentity) -> String {
    format!(
        "# Complaint #{number}\n\n## Content\n{complaint}\n\n## Client Details\nName: {}\nPhone: {}\n",
        client.name, client.phone
    )
}
