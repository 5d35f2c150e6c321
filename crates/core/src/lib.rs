//! insidebar-core: local record store for the insidebar.ai side panel
//!
//! Keeps the two collections the side panel works with:
//! - Saved conversations (save, overwrite, search, filter, import/export)
//! - Prompt library (save, categories, usage tracking, default library import)
//!
//! ## Architecture
//!
//! - **db**: versioned SQLite store, one handle shared by both managers
//! - **validation / search**: input rules and the conversation query language
//! - **commands / bridge**: "category.action" registry and a JSON text boundary
//!   for hosts that cannot call async Rust directly
//!
//! Every store operation goes through a bounded retry loop; quota exhaustion
//! is reported once with a fixed message and never retried.

// Module declarations
pub mod bridge;
pub mod commands;
pub mod config;
pub mod db;
pub mod errors;
pub mod logging;
pub mod runtime;
pub mod search;
pub mod validation;

pub use config::StoreConfig;
pub use db::{
    Conversation, ConversationDraft, ConversationStats, ConversationUpdate, Db, HistoryManager, ImportFailure,
    ImportSummary, LocalStore, MergeStrategy, Prompt, PromptDraft, PromptManager, PromptUpdate, PromptVariable,
    RetryPolicy,
};
pub use errors::{Result, SidebarError};

/// Read configuration from the environment, install logging and open the store
///
/// Convenience for hosts that have no configuration of their own.
pub async fn open_from_env() -> Result<LocalStore> {
    let config = StoreConfig::from_env()?;
    logging::init(&config.log_filter)?;
    LocalStore::open(&config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modules_exist() {
        // Ensure modules compile and are accessible
        let _error: errors::SidebarError = "test".into();
        assert!(commands::list_commands().contains(&"ping".to_string()));
        assert_eq!(db::schema::CURRENT_VERSION, 3);
    }
}
