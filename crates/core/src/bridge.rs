//! Host bridge for string-in/string-out callers
//!
//! This module provides the boundary between the side panel's messaging layer
//! and Rust, handling:
//! - Command dispatch from JSON text
//! - Autocomplete
//! - Error conversion to host-friendly objects

use std::collections::BTreeSet;

use serde_json::{json, Value};

use crate::commands;
use crate::db::LocalStore;
use crate::errors::{Result, SidebarError};
use crate::runtime;

/// Main entry point for command execution
///
/// # Arguments
/// * `command` - Command name in format "category.action" (e.g., "prompts.list")
/// * `args_json` - Command arguments as JSON text; empty means `null`
///
/// # Returns
/// Result as JSON text, or an error object (see [`create_error_object`])
pub fn call(store: &LocalStore, command: &str, args_json: &str) -> String {
    let result = parse_args(args_json).and_then(|args| commands::dispatch(store, command, args));

    let value = match result {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(command, category = err.category(), "Command failed: {}", err);
            create_error_object(&err)
        },
    };
    value.to_string()
}

/// Autocomplete handler for the side panel's inputs
///
/// # Arguments
/// * `kind` - Type of completion ("tag", "category", "provider", "prompt")
/// * `prefix` - User-typed prefix to filter by, case-insensitive
///
/// # Returns
/// Sorted list of completion items
pub fn autocomplete(store: &LocalStore, kind: &str, prefix: &str) -> Vec<String> {
    match autocomplete_impl(store, kind, prefix) {
        Ok(items) => items,
        Err(err) => {
            // Log error but return empty list (autocomplete should never fail visibly)
            tracing::warn!(kind, "Autocomplete error: {}", err);
            vec![]
        },
    }
}

fn parse_args(args_json: &str) -> Result<Value> {
    if args_json.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(args_json)?)
}

fn autocomplete_impl(store: &LocalStore, kind: &str, prefix: &str) -> Result<Vec<String>> {
    let candidates: BTreeSet<String> = runtime::block_on(async {
        let items = match kind {
            "tag" => {
                let mut tags = store.history.get_all_conversation_tags().await?;
                tags.extend(store.prompts.get_all_tags().await?);
                tags
            },
            "category" => store.prompts.get_all_categories().await?,
            "provider" => store
                .history
                .get_conversation_stats()
                .await?
                .by_provider
                .into_keys()
                .collect(),
            "prompt" => store
                .prompts
                .get_all_prompts()
                .await?
                .into_iter()
                .map(|p| p.title)
                .collect(),
            other => {
                return Err(SidebarError::InvalidArgs {
                    command: "autocomplete".into(),
                    reason:  format!("unknown kind '{}'", other),
                })
            },
        };
        Ok::<_, SidebarError>(items.into_iter().collect())
    })?;

    let prefix = prefix.to_lowercase();
    Ok(candidates
        .into_iter()
        .filter(|item| item.to_lowercase().starts_with(&prefix))
        .collect())
}

/// Create a structured error object for the host
///
/// Returns an object with fields:
/// - `error`: true (marker that this is an error response)
/// - `message`: user-friendly error message
/// - `category`: error category for logging/handling
fn create_error_object(err: &SidebarError) -> Value {
    json!({
        "error": true,
        "message": err.user_message(),
        "category": err.category(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::open_store;

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    // ========================================
    // call() function tests
    // ========================================

    #[test]
    fn test_call_unknown_command_returns_error_object() {
        let (_dir, store) = open_store();
        let result = parse(&call(&store, "unknown.command", "{}"));

        assert_eq!(result["error"], true, "error field should be true");
        assert!(
            result["message"].as_str().unwrap().contains("unknown.command"),
            "message should contain command name"
        );
        assert_eq!(result["category"], "command", "category should be 'command'");
    }

    #[test]
    fn test_call_with_empty_args() {
        let (_dir, store) = open_store();
        let result = parse(&call(&store, "ping", ""));
        assert_eq!(result["pong"], true);
    }

    #[test]
    fn test_call_with_malformed_json() {
        let (_dir, store) = open_store();
        let result = parse(&call(&store, "ping", "{not json"));
        assert_eq!(result["error"], true);
        assert_eq!(result["category"], "serialization");
    }

    #[test]
    fn test_call_reports_validation_and_quota_categories() {
        let (_dir, store) = open_store();

        let result = parse(&call(&store, "conversations.save", r#"{"content": "  "}"#));
        assert_eq!(result["category"], "validation");
        assert_eq!(result["message"], "Conversation content is required");

        let result = parse(&call(&store, "prompts.get", r#"{"id": "seven"}"#));
        assert_eq!(result["category"], "arguments");
    }

    #[test]
    fn test_call_round_trip() {
        let (_dir, store) = open_store();
        let saved = parse(&call(
            &store,
            "prompts.save",
            r#"{"title": "Greeting", "content": "Say hi to {name}"}"#,
        ));
        let id = saved["id"].as_i64().unwrap();

        let loaded = parse(&call(&store, "prompts.get", &format!(r#"{{"id": {}}}"#, id)));
        assert_eq!(loaded, saved);
    }

    // ========================================
    // autocomplete() function tests
    // ========================================

    #[test]
    fn test_autocomplete_kinds() {
        let (_dir, store) = open_store();
        call(
            &store,
            "conversations.save",
            r#"{"content": "c", "provider": "claude", "tags": ["Rust", "react"]}"#,
        );
        call(
            &store,
            "prompts.save",
            r#"{"title": "Refactor", "content": "c", "category": "Coding", "tags": ["rust"]}"#,
        );

        assert_eq!(autocomplete(&store, "tag", "r"), vec!["Rust", "react", "rust"]);
        assert_eq!(autocomplete(&store, "tag", "RUS"), vec!["Rust", "rust"]);
        assert_eq!(autocomplete(&store, "category", ""), vec!["Coding"]);
        assert_eq!(autocomplete(&store, "provider", "cl"), vec!["claude"]);
        assert_eq!(autocomplete(&store, "prompt", "ref"), vec!["Refactor"]);
    }

    #[test]
    fn test_autocomplete_never_fails() {
        let (_dir, store) = open_store();
        assert!(autocomplete(&store, "unknown", "").is_empty());
        assert!(autocomplete(&store, "tag", "zzz").is_empty());
    }
}
