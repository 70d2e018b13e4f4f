//! Shared types, error model, and configuration for TicketDesk.
//!
//! This crate is the foundation depended on by all other TicketDesk crates.
//! It provides:
//! - [`TicketDeskError`] — the unified error type
//! - Domain types ([`TicketId`], [`ClientIdentity`], [`CompanyProfile`], [`TicketContext`],
//!   [`ArchivedDocument`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ArchiveConfig, CompanyConfig, GenerationConfig, GenerationProvider, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{Result, TicketDeskError};
pub use types::{ArchivedDocument, ClientIdentity, CompanyProfile, TicketContext, TicketId};
