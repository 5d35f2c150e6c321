//! `conversations.*` commands

use serde_json::{json, Value};

use super::{arg_as, arg_i64, arg_str};
use crate::db::conversations::{generate_auto_title, AUTO_TITLE_LENGTH};
use crate::db::{ConversationDraft, ConversationUpdate, LocalStore, MergeStrategy};
use crate::errors::Result;
use crate::runtime;

/// Args: the conversation payload itself, optionally with `overwriteId`
pub fn save(store: &LocalStore, args: Value) -> Result<Value> {
    let draft: ConversationDraft = serde_json::from_value(args)?;
    let conversation = runtime::block_on(store.history.save_conversation(draft))?;
    Ok(json!(conversation))
}

pub fn get(store: &LocalStore, args: Value) -> Result<Value> {
    let id = arg_i64("conversations.get", &args, "id")?;
    let conversation = runtime::block_on(store.history.get_conversation(id))?;
    Ok(json!(conversation))
}

pub fn list(store: &LocalStore, _args: Value) -> Result<Value> {
    let conversations = runtime::block_on(store.history.get_all_conversations())?;
    Ok(json!({ "conversations": conversations }))
}

/// Args: `{id, updates: {...}}`
pub fn update(store: &LocalStore, args: Value) -> Result<Value> {
    let id = arg_i64("conversations.update", &args, "id")?;
    let updates: Option<ConversationUpdate> = arg_as("conversations.update", &args, "updates")?;

    let conversation = runtime::block_on(
        store
            .history
            .update_conversation(id, updates.unwrap_or_default()),
    )?;
    Ok(json!(conversation))
}

pub fn delete(store: &LocalStore, args: Value) -> Result<Value> {
    let id = arg_i64("conversations.delete", &args, "id")?;
    runtime::block_on(store.history.delete_conversation(id))?;
    Ok(json!({ "success": true }))
}

pub fn search(store: &LocalStore, args: Value) -> Result<Value> {
    let query = arg_str("conversations.search", &args, "query")?;
    let conversations = runtime::block_on(store.history.search_conversations(query))?;
    Ok(json!({ "conversations": conversations }))
}

pub fn by_provider(store: &LocalStore, args: Value) -> Result<Value> {
    let provider = args.get("provider").and_then(Value::as_str).unwrap_or_default();
    let conversations = runtime::block_on(store.history.get_conversations_by_provider(provider))?;
    Ok(json!({ "conversations": conversations }))
}

pub fn by_tag(store: &LocalStore, args: Value) -> Result<Value> {
    let tag = arg_str("conversations.by_tag", &args, "tag")?;
    let conversations = runtime::block_on(store.history.get_conversations_by_tag(tag))?;
    Ok(json!({ "conversations": conversations }))
}

pub fn favorites(store: &LocalStore, _args: Value) -> Result<Value> {
    let conversations = runtime::block_on(store.history.get_favorite_conversations())?;
    Ok(json!({ "conversations": conversations }))
}

pub fn toggle_favorite(store: &LocalStore, args: Value) -> Result<Value> {
    let id = arg_i64("conversations.toggle_favorite", &args, "id")?;
    let conversation = runtime::block_on(store.history.toggle_conversation_favorite(id))?;
    Ok(json!(conversation))
}

/// Args: `{start, end}` in epoch milliseconds, both inclusive
pub fn by_date_range(store: &LocalStore, args: Value) -> Result<Value> {
    let start = arg_i64("conversations.by_date_range", &args, "start")?;
    let end = arg_i64("conversations.by_date_range", &args, "end")?;
    let conversations = runtime::block_on(store.history.get_conversations_by_date_range(start, end))?;
    Ok(json!({ "conversations": conversations }))
}

pub fn tags(store: &LocalStore, _args: Value) -> Result<Value> {
    let tags = runtime::block_on(store.history.get_all_conversation_tags())?;
    Ok(json!({ "tags": tags }))
}

pub fn find_by_conversation_id(store: &LocalStore, args: Value) -> Result<Value> {
    let conversation_id = args
        .get("conversationId")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let conversation = runtime::block_on(
        store
            .history
            .find_conversation_by_conversation_id(conversation_id),
    )?;
    Ok(json!(conversation))
}

pub fn export(store: &LocalStore, _args: Value) -> Result<Value> {
    let export = runtime::block_on(store.history.export_conversations())?;
    Ok(json!(export))
}

/// Args: `{data: {conversations: [...]}, strategy?: "skip" | "overwrite"}`
pub fn import(store: &LocalStore, args: Value) -> Result<Value> {
    let strategy: Option<MergeStrategy> = arg_as("conversations.import", &args, "strategy")?;
    let data = args.get("data").cloned().unwrap_or(Value::Null);

    let summary = runtime::block_on(
        store
            .history
            .import_conversations(&data, strategy.unwrap_or_default()),
    )?;
    Ok(json!(summary))
}

pub fn clear(store: &LocalStore, _args: Value) -> Result<Value> {
    runtime::block_on(store.history.clear_all_conversations())?;
    Ok(json!({ "success": true }))
}

pub fn stats(store: &LocalStore, _args: Value) -> Result<Value> {
    let stats = runtime::block_on(store.history.get_conversation_stats())?;
    Ok(json!(stats))
}

/// Args: `{content, maxLength?}`
pub fn auto_title(_store: &LocalStore, args: Value) -> Result<Value> {
    let content = args.get("content").and_then(Value::as_str).unwrap_or_default();
    let max_length = args
        .get("maxLength")
        .and_then(Value::as_u64)
        .map_or(AUTO_TITLE_LENGTH, |n| n as usize);
    Ok(json!({ "title": generate_auto_title(content, max_length) }))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::commands::dispatch;
    use crate::commands::test_support::open_store;

    #[test]
    fn test_save_update_delete_cycle() {
        let (_dir, store) = open_store();

        let saved = dispatch(
            &store,
            "conversations.save",
            json!({"content": "Explain ownership", "provider": "claude", "tags": ["rust"]}),
        )
        .unwrap();
        let id = saved["id"].as_i64().unwrap();
        assert_eq!(saved["title"], "Explain ownership");
        assert_eq!(saved["isFavorite"], false);

        let updated = dispatch(
            &store,
            "conversations.update",
            json!({"id": id, "updates": {"notes": "great answer"}}),
        )
        .unwrap();
        assert_eq!(updated["notes"], "great answer");

        let found = dispatch(&store, "conversations.search", json!({"query": "GREAT"})).unwrap();
        assert_eq!(found["conversations"].as_array().unwrap().len(), 1);

        let deleted = dispatch(&store, "conversations.delete", json!({"id": id})).unwrap();
        assert_eq!(deleted["success"], true);

        let missing = dispatch(&store, "conversations.get", json!({"id": id})).unwrap();
        assert!(missing.is_null());
    }

    #[test]
    fn test_missing_id_is_invalid_args() {
        let (_dir, store) = open_store();
        let err = dispatch(&store, "conversations.delete", json!({})).unwrap_err();
        assert_eq!(err.category(), "arguments");
    }

    #[test]
    fn test_import_defaults_to_skip() {
        let (_dir, store) = open_store();
        let data = json!({"conversations": [
            {"title": "A", "content": "x", "timestamp": 1000},
            {"title": "A", "content": "y", "timestamp": 2000}
        ]});

        let summary = dispatch(&store, "conversations.import", json!({ "data": data })).unwrap();
        assert_eq!(summary["imported"], 1);
        assert_eq!(summary["skipped"], 1);

        let err = dispatch(&store, "conversations.import", json!({"data": {}})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid import data format");
    }

    #[test]
    fn test_auto_title_command() {
        let (_dir, store) = open_store();
        let result = dispatch(&store, "conversations.auto_title", json!({"content": "Hi\nthere"})).unwrap();
        assert_eq!(result["title"], "Hi");

        let result = dispatch(
            &store,
            "conversations.auto_title",
            json!({"content": "abcdefghij", "maxLength": 8}),
        )
        .unwrap();
        assert_eq!(result["title"], "abcde...");
    }
}
