//! Command registry and dispatch system
//!
//! This module provides a static registry of commands that hosts call by name.
//! Commands are registered as "category.action" (e.g., "conversations.save",
//! "prompts.import_default_library") and dispatched to handler functions.
//!
//! ## Adding a new command
//!
//! 1. Create handler function: `pub fn my_command(store: &LocalStore, args: Value) -> Result<Value>`
//! 2. Register in `REGISTRY`: `("category.action", my_command as CommandHandler)`
//! 3. Add tests for the command

use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;

use crate::db::LocalStore;
use crate::errors::{Result, SidebarError};

pub mod conversations;
pub mod prompts;

/// Type alias for command handler functions
///
/// All command handlers take the store and a JSON Value (arguments) and
/// return a Result<Value>
pub type CommandHandler = fn(&LocalStore, Value) -> Result<Value>;

/// Static command registry
///
/// Maps command names to handler functions. Initialized lazily on first access.
static REGISTRY: Lazy<HashMap<&'static str, CommandHandler>> = Lazy::new(|| {
    let mut map = HashMap::new();

    // Test command
    map.insert("ping", ping as CommandHandler);

    // Conversation history
    map.insert("conversations.save", conversations::save as CommandHandler);
    map.insert("conversations.get", conversations::get as CommandHandler);
    map.insert("conversations.list", conversations::list as CommandHandler);
    map.insert("conversations.update", conversations::update as CommandHandler);
    map.insert("conversations.delete", conversations::delete as CommandHandler);
    map.insert("conversations.search", conversations::search as CommandHandler);
    map.insert("conversations.by_provider", conversations::by_provider as CommandHandler);
    map.insert("conversations.by_tag", conversations::by_tag as CommandHandler);
    map.insert("conversations.favorites", conversations::favorites as CommandHandler);
    map.insert("conversations.toggle_favorite", conversations::toggle_favorite as CommandHandler);
    map.insert("conversations.by_date_range", conversations::by_date_range as CommandHandler);
    map.insert("conversations.tags", conversations::tags as CommandHandler);
    map.insert(
        "conversations.find_by_conversation_id",
        conversations::find_by_conversation_id as CommandHandler,
    );
    map.insert("conversations.export", conversations::export as CommandHandler);
    map.insert("conversations.import", conversations::import as CommandHandler);
    map.insert("conversations.clear", conversations::clear as CommandHandler);
    map.insert("conversations.stats", conversations::stats as CommandHandler);
    map.insert("conversations.auto_title", conversations::auto_title as CommandHandler);

    // Prompt library
    map.insert("prompts.save", prompts::save as CommandHandler);
    map.insert("prompts.get", prompts::get as CommandHandler);
    map.insert("prompts.list", prompts::list as CommandHandler);
    map.insert("prompts.update", prompts::update as CommandHandler);
    map.insert("prompts.delete", prompts::delete as CommandHandler);
    map.insert("prompts.search", prompts::search as CommandHandler);
    map.insert("prompts.by_category", prompts::by_category as CommandHandler);
    map.insert("prompts.by_tag", prompts::by_tag as CommandHandler);
    map.insert("prompts.favorites", prompts::favorites as CommandHandler);
    map.insert("prompts.toggle_favorite", prompts::toggle_favorite as CommandHandler);
    map.insert("prompts.use", prompts::use_prompt as CommandHandler);
    map.insert("prompts.categories", prompts::categories as CommandHandler);
    map.insert("prompts.tags", prompts::tags as CommandHandler);
    map.insert("prompts.export", prompts::export as CommandHandler);
    map.insert("prompts.import", prompts::import as CommandHandler);
    map.insert(
        "prompts.import_default_library",
        prompts::import_default_library as CommandHandler,
    );
    map.insert("prompts.clear", prompts::clear as CommandHandler);

    map
});

/// Dispatch a command by name
///
/// Looks up the command in the registry and executes it with the provided arguments.
///
/// # Arguments
/// * `store` - Open store the command operates on
/// * `command` - Command name (e.g., "ping", "prompts.list")
/// * `args` - Command arguments as JSON Value
///
/// # Returns
/// Command result as JSON Value, or error if command not found
pub fn dispatch(store: &LocalStore, command: &str, args: Value) -> Result<Value> {
    match REGISTRY.get(command) {
        Some(handler) => {
            tracing::debug!(command, "Dispatching command");
            handler(store, args)
        },
        None => Err(SidebarError::CommandNotFound(command.to_string())),
    }
}

/// List all available commands
///
/// Returns a sorted list of all registered command names.
pub fn list_commands() -> Vec<String> {
    let mut commands: Vec<String> = REGISTRY.keys().map(|&k| k.to_string()).collect();
    commands.sort();
    commands
}

// ============================================================================
// Argument helpers
// ============================================================================

fn invalid(command: &str, reason: impl Into<String>) -> SidebarError {
    SidebarError::InvalidArgs {
        command: command.to_string(),
        reason:  reason.into(),
    }
}

/// Required integer argument
pub(crate) fn arg_i64(command: &str, args: &Value, key: &str) -> Result<i64> {
    args.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| invalid(command, format!("missing integer '{}'", key)))
}

/// Required string argument; empty strings are allowed
pub(crate) fn arg_str<'a>(command: &str, args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(command, format!("missing string '{}'", key)))
}

/// Decode `args[key]`, treating a missing key as `null`
pub(crate) fn arg_as<T: DeserializeOwned>(command: &str, args: &Value, key: &str) -> Result<T> {
    let value = args.get(key).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| invalid(command, format!("'{}': {}", key, e)))
}

// ============================================================================
// Test Commands
// ============================================================================

/// Ping command - simple test to verify command dispatch works
///
/// Returns the input arguments with an added "pong" field.
///
/// # Example
/// ```json
/// // Input:  {"message": "hello"}
/// // Output: {"message": "hello", "pong": true}
/// ```
fn ping(_store: &LocalStore, args: Value) -> Result<Value> {
    let mut result = match args {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    result.insert("pong".to_string(), Value::Bool(true));
    Ok(Value::Object(result))
}

#[cfg(test)]
pub(crate) mod test_support {
    use tempfile::{tempdir, TempDir};

    use crate::config::StoreConfig;
    use crate::db::LocalStore;
    use crate::runtime;

    /// Fresh store for synchronous command tests
    pub fn open_store() -> (TempDir, LocalStore) {
        let dir = tempdir().unwrap();
        let config = StoreConfig::at(dir.path().join("commands.db"));
        let store = runtime::block_on(LocalStore::open(&config)).unwrap();
        (dir, store)
    }
}
