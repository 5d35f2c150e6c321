use serde_json::{json, Value};

use super::{arg_as, arg_i64, arg_str};
use crate::db::{LocalStore, MergeStrategy, PromptDraft, PromptUpdate};
use crate::errors::Result;
use crate::runtime;

pub fn save(store: &LocalStore, args: Value) -> Result<Value> {
    let draft: PromptDraft = serde_json::from_value(args)?;
    let prompt = runtime::block_on(store.prompts.save_prompt(draft))?;
    Ok(json!(prompt))
}

pub fn get(store: &LocalStore, args: Value) -> Result<Value> {
    let id = arg_i64("prompts.get", &args, "id")?;
    let prompt = runtime::block_on(store.prompts.get_prompt(id))?;
    Ok(json!(prompt))
}

pub fn list(store: &LocalStore, _args: Value) -> Result<Value> {
    let prompts = runtime::block_on(store.prompts.get_all_prompts())?;
    Ok(json!({ "prompts": prompts }))
}

pub fn update(store: &LocalStore, args: Value) -> Result<Value> {
    let id = arg_i64("prompts.update", &args, "id")?;
    let updates: Option<PromptUpdate> = arg_as("prompts.update", &args, "updates")?;

    let prompt = runtime::block_on(store.prompts.update_prompt(id, updates.unwrap_or_default()))?;
    Ok(json!(prompt))
}

pub fn delete(store: &LocalStore, args: Value) -> Result<Value> {
    let id = arg_i64("prompts.delete", &args, "id")?;
    runtime::block_on(store.prompts.delete_prompt(id))?;
    Ok(json!({ "success": true }))
}

pub fn search(store: &LocalStore, args: Value) -> Result<Value> {
    let query = arg_str("prompts.search", &args, "query")?;
    let prompts = runtime::block_on(store.prompts.search_prompts(query))?;
    Ok(json!({ "prompts": prompts }))
}

pub fn by_category(store: &LocalStore, args: Value) -> Result<Value> {
    let category = arg_str("prompts.by_category", &args, "category")?;
    let prompts = runtime::block_on(store.prompts.get_prompts_by_category(category))?;
    Ok(json!({ "prompts": prompts }))
}

pub fn by_tag(store: &LocalStore, args: Value) -> Result<Value> {
    let tag = arg_str("prompts.by_tag", &args, "tag")?;
    let prompts = runtime::block_on(store.prompts.get_prompts_by_tag(tag))?;
    Ok(json!({ "prompts": prompts }))
}

pub fn favorites(store: &LocalStore, _args: Value) -> Result<Value> {
    let prompts = runtime::block_on(store.prompts.get_favorite_prompts())?;
    Ok(json!({ "prompts": prompts }))
}

pub fn toggle_favorite(store: &LocalStore, args: Value) -> Result<Value> {
    let id = arg_i64("prompts.toggle_favorite", &args, "id")?;
    let prompt = runtime::block_on(store.prompts.toggle_favorite(id))?;
    Ok(json!(prompt))
}

/// Record that a prompt was inserted into a provider
pub fn use_prompt(store: &LocalStore, args: Value) -> Result<Value> {
    let id = arg_i64("prompts.use", &args, "id")?;
    let prompt = runtime::block_on(store.prompts.record_prompt_usage(id))?;
    Ok(json!(prompt))
}

pub fn categories(store: &LocalStore, _args: Value) -> Result<Value> {
    let categories = runtime::block_on(store.prompts.get_all_categories())?;
    Ok(json!({ "categories": categories }))
}

pub fn tags(store: &LocalStore, _args: Value) -> Result<Value> {
    let tags = runtime::block_on(store.prompts.get_all_tags())?;
    Ok(json!({ "tags": tags }))
}

pub fn export(store: &LocalStore, _args: Value) -> Result<Value> {
    let export = runtime::block_on(store.prompts.export_prompts())?;
    Ok(json!(export))
}

pub fn import(store: &LocalStore, args: Value) -> Result<Value> {
    let strategy: Option<MergeStrategy> = arg_as("prompts.import", &args, "strategy")?;
    let data = args.get("data").cloned().unwrap_or(Value::Null);

    let summary = runtime::block_on(
        store
            .prompts
            .import_prompts(&data, strategy.unwrap_or_default()),
    )?;
    Ok(json!(summary))
}

/// Args: `{data: {prompts: [...]}}`, the bundled library file
pub fn import_default_library(store: &LocalStore, args: Value) -> Result<Value> {
    let data = args.get("data").cloned().unwrap_or(Value::Null);
    let summary = runtime::block_on(store.prompts.import_default_library(&data))?;
    Ok(json!(summary))
}

pub fn clear(store: &LocalStore, _args: Value) -> Result<Value> {
    runtime::block_on(store.prompts.clear_all_prompts())?;
    Ok(json!({ "success": true }))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::commands::dispatch;
    use crate::commands::test_support::open_store;

    #[test]
    fn test_prompt_commands() {
        let (_dir, store) = open_store();

        let saved = dispatch(
            &store,
            "prompts.save",
            json!({"title": "Review", "content": "Review {code}", "category": "Coding", "variables": ["code"]}),
        )
        .unwrap();
        let id = saved["id"].as_i64().unwrap();
        assert_eq!(saved["variables"], json!([{"name": "code"}]));
        assert_eq!(saved["lastUsed"], json!(null));

        let used = dispatch(&store, "prompts.use", json!({"id": id})).unwrap();
        assert_eq!(used["useCount"], 1);

        let categories = dispatch(&store, "prompts.categories", json!({})).unwrap();
        assert_eq!(categories["categories"], json!(["Coding"]));

        let toggled = dispatch(&store, "prompts.toggle_favorite", json!({"id": id})).unwrap();
        assert_eq!(toggled["isFavorite"], true);

        let updated = dispatch(
            &store,
            "prompts.update",
            json!({"id": id, "updates": {"category": "Review"}}),
        )
        .unwrap();
        assert_eq!(updated["category"], "Review");
        assert_eq!(updated["isFavorite"], true);

        let err = dispatch(&store, "prompts.delete", json!({"id": id + 1})).unwrap_err();
        assert_eq!(err.category(), "not_found");
    }

    #[test]
    fn test_validation_error_surfaces_joined_message() {
        let (_dir, store) = open_store();
        let err = dispatch(
            &store,
            "prompts.save",
            json!({"content": "", "tags": vec!["t"; 21]}),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Prompt content is required, Maximum 20 tags allowed"
        );
    }

    #[test]
    fn test_default_library_command() {
        let (_dir, store) = open_store();
        let library = json!({"prompts": [
            {"title": "Outline", "content": "Outline {topic}", "category": "Writing"},
            {"title": "outline ", "content": "dup"}
        ]});

        let summary = dispatch(
            &store,
            "prompts.import_default_library",
            json!({ "data": library }),
        )
        .unwrap();
        assert_eq!(summary["imported"], 1);
        assert_eq!(summary["skipped"], 1);

        let err = dispatch(&store, "prompts.import_default_library", json!({})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid library data format");
    }
}
