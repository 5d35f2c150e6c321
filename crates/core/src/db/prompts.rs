use std::collections::HashSet;
use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::retry::RetryPolicy;
use super::transfer::{self, ImportSummary, MergeStrategy, EXPORT_FORMAT_VERSION};
use super::{json_column, now_millis, write_tag_index, Db};
use crate::errors::{RecordKind, Result, SidebarError};
use crate::validation::{
    char_len, check, is_blank, lenient, sanitize_string, sanitize_tags, Violation, MAX_CATEGORY_LENGTH,
    MAX_PROMPT_CONTENT_LENGTH, MAX_TAGS_COUNT, MAX_TITLE_LENGTH,
};

pub const UNTITLED_PROMPT: &str = "Untitled Prompt";
pub const DEFAULT_CATEGORY: &str = "General";

const TAG_TABLE: &str = "prompt_tags";
const COLUMNS: &str = "id, title, content, category, tags, variables, is_favorite, created_at, \
                       last_used, use_count, extra";
const RESERVED_FIELDS: &[&str] = &["id", "createdAt"];

/// Template placeholder inside a prompt's content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawVariable")]
pub struct PromptVariable {
    pub name:          String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description:   Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl PromptVariable {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name:          name.into(),
            description:   None,
            default_value: None,
        }
    }
}

/// Libraries list placeholders either by bare name or as full descriptors
#[derive(Deserialize)]
#[serde(untagged)]
enum RawVariable {
    Name(String),
    #[serde(rename_all = "camelCase")]
    Descriptor {
        name:          String,
        #[serde(default)]
        description:   Option<String>,
        #[serde(default)]
        default_value: Option<String>,
    },
}

impl From<RawVariable> for PromptVariable {
    fn from(raw: RawVariable) -> Self {
        match raw {
            RawVariable::Name(name) => PromptVariable::named(name),
            RawVariable::Descriptor {
                name,
                description,
                default_value,
            } => PromptVariable {
                name,
                description,
                default_value,
            },
        }
    }
}

/// Keep the placeholders that decode, ignore anything that is not a list
fn lenient_variables<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<PromptVariable>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_array().map(|items| {
        items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect()
    }))
}

/// A stored prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub id:          i64,
    pub title:       String,
    pub content:     String,
    pub category:    String,
    pub tags:        Vec<String>,
    pub variables:   Vec<PromptVariable>,
    pub is_favorite: bool,
    pub created_at:  i64,
    pub last_used:   Option<i64>,
    pub use_count:   i64,
    #[serde(flatten)]
    pub extra:       Map<String, Value>,
}

/// Payload for saving a prompt
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptDraft {
    #[serde(default, deserialize_with = "lenient::string")]
    pub title:       Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub content:     Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub category:    Option<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub tags:        Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_variables")]
    pub variables:   Option<Vec<PromptVariable>>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_favorite: bool,
}

impl PromptDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Vec<Violation> {
        validate_fields(
            true,
            self.title.as_deref(),
            self.content.as_deref(),
            self.category.as_deref(),
            self.tags.as_deref(),
        )
    }

    pub fn effective_title(&self) -> String {
        let title = self.title.as_deref().filter(|t| !t.trim().is_empty());
        sanitize_string(Some(title.unwrap_or(UNTITLED_PROMPT)), MAX_TITLE_LENGTH)
    }

    fn into_prompt(self, now: i64) -> Prompt {
        let category = self.category.as_deref().filter(|c| !c.trim().is_empty());

        Prompt {
            id:          0,
            title:       self.effective_title(),
            content:     sanitize_string(self.content.as_deref(), MAX_PROMPT_CONTENT_LENGTH),
            category:    sanitize_string(Some(category.unwrap_or(DEFAULT_CATEGORY)), MAX_CATEGORY_LENGTH),
            tags:        sanitize_tags(self.tags.as_deref()),
            variables:   self.variables.unwrap_or_default(),
            is_favorite: self.is_favorite,
            created_at:  now,
            last_used:   None,
            use_count:   0,
            extra:       Map::new(),
        }
    }
}

/// Partial update merged over a stored prompt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title:       Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content:     Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category:    Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags:        Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables:   Option<Vec<PromptVariable>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used:   Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_count:   Option<i64>,
    #[serde(flatten)]
    pub extra:       Map<String, Value>,
}

impl PromptUpdate {
    pub fn validate(&self) -> Vec<Violation> {
        validate_fields(
            self.content.is_some(),
            self.title.as_deref(),
            self.content.as_deref(),
            self.category.as_deref(),
            self.tags.as_deref(),
        )
    }

    fn sanitized(mut self) -> Self {
        let clip = |value: Option<String>, max: usize| {
            value
                .map(|v| sanitize_string(Some(&v), max))
                .filter(|v| !v.is_empty())
        };

        self.title = clip(self.title, MAX_TITLE_LENGTH);
        self.content = clip(self.content, MAX_PROMPT_CONTENT_LENGTH);
        self.category = clip(self.category, MAX_CATEGORY_LENGTH);
        self.tags = self.tags.map(|tags| sanitize_tags(Some(tags.as_slice())));
        self.extra.retain(|key, _| !RESERVED_FIELDS.contains(&key.as_str()));
        self
    }

    fn apply_to(&self, prompt: &mut Prompt) {
        if let Some(title) = &self.title {
            prompt.title = title.clone();
        }
        if let Some(content) = &self.content {
            prompt.content = content.clone();
        }
        if let Some(category) = &self.category {
            prompt.category = category.clone();
        }
        if let Some(tags) = &self.tags {
            prompt.tags = tags.clone();
        }
        if let Some(variables) = &self.variables {
            prompt.variables = variables.clone();
        }
        if let Some(is_favorite) = self.is_favorite {
            prompt.is_favorite = is_favorite;
        }
        if let Some(last_used) = self.last_used {
            prompt.last_used = Some(last_used);
        }
        if let Some(use_count) = self.use_count {
            prompt.use_count = use_count;
        }
        prompt
            .extra
            .extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

fn validate_fields(
    content_required: bool,
    title: Option<&str>,
    content: Option<&str>,
    category: Option<&str>,
    tags: Option<&[String]>,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    if content_required && is_blank(content) {
        violations.push(Violation::Required("Prompt content"));
    }
    if content.is_some_and(|c| char_len(c) > MAX_PROMPT_CONTENT_LENGTH) {
        violations.push(Violation::TooLong {
            field: "Prompt content",
            max:   MAX_PROMPT_CONTENT_LENGTH,
        });
    }
    if title.is_some_and(|t| char_len(t) > MAX_TITLE_LENGTH) {
        violations.push(Violation::TooLong {
            field: "Title",
            max:   MAX_TITLE_LENGTH,
        });
    }
    if category.is_some_and(|c| char_len(c) > MAX_CATEGORY_LENGTH) {
        violations.push(Violation::TooLong {
            field: "Category",
            max:   MAX_CATEGORY_LENGTH,
        });
    }
    if tags.is_some_and(|t| t.len() > MAX_TAGS_COUNT) {
        violations.push(Violation::TooMany {
            what: "tags",
            max:  MAX_TAGS_COUNT,
        });
    }

    violations
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptExport {
    pub version:     String,
    pub export_date: String,
    pub prompts:     Vec<Prompt>,
}

// ============================================================================
// Manager
// ============================================================================

/// Data access for the prompt library
pub struct PromptManager {
    db:    Arc<Db>,
    retry: RetryPolicy,
}

impl PromptManager {
    pub fn new(db: Arc<Db>, retry: RetryPolicy) -> Self {
        Self { db, retry }
    }

    pub async fn save_prompt(&self, draft: PromptDraft) -> Result<Prompt> {
        check(draft.validate())?;

        let prompt = draft.into_prompt(now_millis());
        let row = prompt.clone();
        let id = self
            .db
            .execute(&self.retry, move |conn| insert_prompt(conn, &row))
            .await?;

        debug!(id, category = %prompt.category, "Saved prompt");
        Ok(Prompt { id, ..prompt })
    }

    pub async fn get_prompt(&self, id: i64) -> Result<Option<Prompt>> {
        self.db
            .execute(&self.retry, move |conn| select_prompt(conn, id))
            .await
    }

    pub async fn get_all_prompts(&self) -> Result<Vec<Prompt>> {
        self.select_where("", []).await
    }

    pub async fn update_prompt(&self, id: i64, updates: PromptUpdate) -> Result<Prompt> {
        check(updates.validate())?;
        let updates = updates.sanitized();

        self.modify(id, move |prompt| updates.apply_to(prompt)).await
    }

    pub async fn delete_prompt(&self, id: i64) -> Result<bool> {
        self.db
            .execute(&self.retry, move |conn| {
                let tx = conn.transaction()?;
                if tx.execute("DELETE FROM prompts WHERE id = ?1", params![id])? == 0 {
                    return Err(not_found(id));
                }
                write_tag_index(&tx, TAG_TABLE, id, &[])?;
                tx.commit()?;
                Ok(true)
            })
            .await
    }

    /// Case-insensitive substring match on title, content or any tag
    pub async fn search_prompts(&self, text: &str) -> Result<Vec<Prompt>> {
        let needle = text.to_lowercase();
        let prompts = self.get_all_prompts().await?;

        Ok(prompts
            .into_iter()
            .filter(|p| {
                p.title.to_lowercase().contains(&needle)
                    || p.content.to_lowercase().contains(&needle)
                    || p.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            })
            .collect())
    }

    pub async fn get_prompts_by_category(&self, category: &str) -> Result<Vec<Prompt>> {
        self.select_where("WHERE category = ?1", [category.to_owned()]).await
    }

    pub async fn get_prompts_by_tag(&self, tag: &str) -> Result<Vec<Prompt>> {
        self.select_where(
            "WHERE id IN (SELECT record_id FROM prompt_tags WHERE tag = ?1)",
            [tag.to_owned()],
        )
        .await
    }

    pub async fn get_favorite_prompts(&self) -> Result<Vec<Prompt>> {
        self.select_where("WHERE is_favorite = 1", []).await
    }

    pub async fn toggle_favorite(&self, id: i64) -> Result<Prompt> {
        self.modify(id, |prompt| prompt.is_favorite = !prompt.is_favorite)
            .await
    }

    /// Stamp `last_used` and bump `use_count`
    pub async fn record_prompt_usage(&self, id: i64) -> Result<Prompt> {
        self.modify(id, |prompt| {
            prompt.last_used = Some(now_millis());
            prompt.use_count += 1;
        })
        .await
    }

    pub async fn get_all_categories(&self) -> Result<Vec<String>> {
        self.distinct("SELECT DISTINCT category FROM prompts ORDER BY category")
            .await
    }

    pub async fn get_all_tags(&self) -> Result<Vec<String>> {
        self.distinct("SELECT DISTINCT tag FROM prompt_tags ORDER BY tag")
            .await
    }

    pub async fn export_prompts(&self) -> Result<PromptExport> {
        Ok(PromptExport {
            version:     EXPORT_FORMAT_VERSION.to_string(),
            export_date: transfer::export_date(),
            prompts:     self.get_all_prompts().await?,
        })
    }

    /// Bulk import from an export bundle
    ///
    /// With [`MergeStrategy::Skip`] a prompt whose title exactly matches an
    /// existing one is skipped.
    pub async fn import_prompts(&self, data: &Value, strategy: MergeStrategy) -> Result<ImportSummary> {
        let items = transfer::records(data, "prompts", || SidebarError::ImportFormatError)?;

        let mut titles: HashSet<String> = match strategy {
            MergeStrategy::Skip => self
                .get_all_prompts()
                .await?
                .into_iter()
                .map(|p| p.title)
                .collect(),
            MergeStrategy::Overwrite => HashSet::new(),
        };

        let summary = self
            .import_each(items, |draft| {
                strategy == MergeStrategy::Overwrite || titles.insert(draft.effective_title())
            })
            .await;

        info!(
            imported = summary.imported,
            skipped = summary.skipped,
            failed = summary.errors.len(),
            "Imported prompts"
        );
        Ok(summary)
    }

    /// Load a bundled prompt library
    ///
    /// Titles are compared trimmed and case-insensitively, against the
    /// library already stored and against earlier entries of the same batch.
    pub async fn import_default_library(&self, data: &Value) -> Result<ImportSummary> {
        let items = transfer::records(data, "prompts", || SidebarError::LibraryFormatError)?;

        let mut seen: HashSet<String> = self
            .get_all_prompts()
            .await?
            .iter()
            .map(|p| library_key(&p.title))
            .collect();

        let summary = self
            .import_each(items, |draft| seen.insert(library_key(&draft.effective_title())))
            .await;

        info!(
            imported = summary.imported,
            skipped = summary.skipped,
            failed = summary.errors.len(),
            "Imported default prompt library"
        );
        Ok(summary)
    }

    pub async fn clear_all_prompts(&self) -> Result<bool> {
        self.db
            .execute(&self.retry, |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM prompt_tags", [])?;
                tx.execute("DELETE FROM prompts", [])?;
                tx.commit()?;
                Ok(true)
            })
            .await?;

        info!("Cleared prompt library");
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Decode and save every item, asking `admit` whether a decoded draft is new
    async fn import_each<F>(&self, items: &[Value], mut admit: F) -> ImportSummary
    where
        F: FnMut(&PromptDraft) -> bool,
    {
        let mut summary = ImportSummary::default();

        for item in items {
            let draft = match serde_json::from_value::<PromptDraft>(item.clone()) {
                Ok(draft) => draft,
                Err(err) => {
                    summary.fail(RecordKind::Prompt, item, &err.into());
                    continue;
                },
            };

            // Failed validation must not reserve the title
            if let Err(err) = check(draft.validate()) {
                summary.fail(RecordKind::Prompt, item, &err);
                continue;
            }
            if !admit(&draft) {
                summary.skipped += 1;
                continue;
            }

            match self.save_prompt(draft).await {
                Ok(_) => summary.imported += 1,
                Err(err) => {
                    warn!("Skipping prompt during import: {}", err);
                    summary.fail(RecordKind::Prompt, item, &err);
                },
            }
        }

        summary
    }

    /// Read-modify-write of one prompt inside a single transaction
    async fn modify<F>(&self, id: i64, change: F) -> Result<Prompt>
    where
        F: Fn(&mut Prompt) + Send + Sync + 'static,
    {
        self.db
            .execute(&self.retry, move |conn| {
                let tx = conn.transaction()?;
                let mut prompt = select_prompt(&tx, id)?.ok_or_else(|| not_found(id))?;

                change(&mut prompt);

                put_prompt(&tx, &prompt)?;
                tx.commit()?;
                Ok(prompt)
            })
            .await
    }

    async fn select_where<P>(&self, clause: &'static str, params: P) -> Result<Vec<Prompt>>
    where
        P: Params + Clone + Send + Sync + 'static,
    {
        self.db
            .execute(&self.retry, move |conn| select_prompts(conn, clause, params.clone()))
            .await
    }

    async fn distinct(&self, sql: &'static str) -> Result<Vec<String>> {
        self.db
            .execute(&self.retry, move |conn| {
                let mut stmt = conn.prepare(sql)?;
                let values = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(values)
            })
            .await
    }
}

fn not_found(id: i64) -> SidebarError {
    SidebarError::NotFoundError {
        kind: RecordKind::Prompt,
        id,
    }
}

fn library_key(title: &str) -> String {
    title.trim().to_lowercase()
}

// ============================================================================
// Row mapping
// ============================================================================

fn prompt_from_row(row: &Row<'_>) -> rusqlite::Result<Prompt> {
    Ok(Prompt {
        id:          row.get(0)?,
        title:       row.get(1)?,
        content:     row.get(2)?,
        category:    row.get(3)?,
        tags:        json_column(row, 4)?,
        variables:   json_column(row, 5)?,
        is_favorite: row.get(6)?,
        created_at:  row.get(7)?,
        last_used:   row.get(8)?,
        use_count:   row.get(9)?,
        extra:       json_column(row, 10)?,
    })
}

fn select_prompt(conn: &Connection, id: i64) -> Result<Option<Prompt>> {
    let sql = format!("SELECT {} FROM prompts WHERE id = ?1", COLUMNS);
    Ok(conn.query_row(&sql, params![id], prompt_from_row).optional()?)
}

fn select_prompts<P: Params>(conn: &Connection, clause: &str, params: P) -> Result<Vec<Prompt>> {
    let sql = format!("SELECT {} FROM prompts {} ORDER BY id", COLUMNS, clause);
    let mut stmt = conn.prepare(&sql)?;
    let prompts = stmt
        .query_map(params, prompt_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(prompts)
}

fn insert_prompt(conn: &mut Connection, prompt: &Prompt) -> Result<i64> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO prompts (title, content, category, tags, variables, is_favorite, created_at,
                              last_used, use_count, extra)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            prompt.title,
            prompt.content,
            prompt.category,
            serde_json::to_string(&prompt.tags)?,
            serde_json::to_string(&prompt.variables)?,
            prompt.is_favorite,
            prompt.created_at,
            prompt.last_used,
            prompt.use_count,
            serde_json::to_string(&prompt.extra)?,
        ],
    )?;
    let id = tx.last_insert_rowid();

    write_tag_index(&tx, TAG_TABLE, id, &prompt.tags)?;
    tx.commit()?;
    Ok(id)
}

fn put_prompt(conn: &Connection, prompt: &Prompt) -> Result<()> {
    conn.execute(
        "UPDATE prompts
         SET title = ?2, content = ?3, category = ?4, tags = ?5, variables = ?6, is_favorite = ?7,
             last_used = ?8, use_count = ?9, extra = ?10
         WHERE id = ?1",
        params![
            prompt.id,
            prompt.title,
            prompt.content,
            prompt.category,
            serde_json::to_string(&prompt.tags)?,
            serde_json::to_string(&prompt.variables)?,
            prompt.is_favorite,
            prompt.last_used,
            prompt.use_count,
            serde_json::to_string(&prompt.extra)?,
        ],
    )?;

    write_tag_index(conn, TAG_TABLE, prompt.id, &prompt.tags)
}
