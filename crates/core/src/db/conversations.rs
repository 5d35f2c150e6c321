//! Saved conversation history
//!
//! Conversations are written by the per-provider "Save conversation" buttons
//! and browsed from the side panel. Each record carries a lowercase
//! `search_text` blob that is rebuilt on insert and whenever an update touches
//! one of the fields it is made of.

use std::collections::BTreeMap;
use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::retry::RetryPolicy;
use super::transfer::{self, ImportSummary, MergeStrategy, EXPORT_FORMAT_VERSION};
use super::{json_column, now_millis, write_tag_index, Db};
use crate::errors::{RecordKind, Result, SidebarError};
use crate::search::SearchQuery;
use crate::validation::{
    check, is_blank, lenient, sanitize_string, sanitize_tags, Violation, MAX_CONVERSATION_CONTENT_LENGTH,
    MAX_CONVERSATION_ID_LENGTH, MAX_NOTES_LENGTH, MAX_PROVIDER_LENGTH, MAX_TAGS_COUNT, MAX_TITLE_LENGTH,
    MAX_URL_LENGTH,
};

pub const DEFAULT_PROVIDER: &str = "unknown";
pub const UNTITLED_CONVERSATION: &str = "Untitled Conversation";
pub const AUTO_TITLE_LENGTH: usize = 60;

/// Two imported conversations with the same title closer than this are duplicates
pub const DUPLICATE_WINDOW_MS: i64 = 60_000;

const TAG_TABLE: &str = "conversation_tags";
const COLUMNS: &str = "id, title, content, provider, timestamp, tags, is_favorite, notes, \
                       conversation_id, url, modified_at, search_text, extra";

/// Keys that never land in the passthrough map
const RESERVED_FIELDS: &[&str] = &["id", "searchText", "modifiedAt", "overwriteId"];

/// A stored conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id:              i64,
    pub title:           String,
    pub content:         String,
    pub provider:        String,
    pub timestamp:       i64,
    pub tags:            Vec<String>,
    pub is_favorite:     bool,
    pub notes:           String,
    pub conversation_id: String,
    pub url:             String,
    pub modified_at:     i64,
    pub search_text:     String,
    /// Fields set through updates that have no column of their own
    #[serde(flatten)]
    pub extra:           Map<String, Value>,
}

/// Payload for saving a conversation
///
/// Decoded leniently from the side panel's JSON: wrongly typed fields count
/// as missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDraft {
    #[serde(default, deserialize_with = "lenient::string")]
    pub title:           Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub content:         Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub provider:        Option<String>,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub timestamp:       Option<i64>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub tags:            Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_favorite:     bool,
    #[serde(default, deserialize_with = "lenient::string")]
    pub notes:           Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub conversation_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub url:             Option<String>,
    /// Replace this existing record instead of inserting a new one
    #[serde(default, deserialize_with = "lenient::integer")]
    pub overwrite_id:    Option<i64>,
}

impl ConversationDraft {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        if is_blank(self.content.as_deref()) {
            violations.push(Violation::Required("Conversation content"));
        }
        if self.tags.as_ref().is_some_and(|tags| tags.len() > MAX_TAGS_COUNT) {
            violations.push(Violation::TooMany {
                what: "tags",
                max:  MAX_TAGS_COUNT,
            });
        }

        violations
    }

    /// Title as it will be stored: the given one, or one derived from the content
    pub fn effective_title(&self) -> String {
        let title = match self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(title) => title.to_string(),
            None => generate_auto_title(self.content.as_deref().unwrap_or_default(), AUTO_TITLE_LENGTH),
        };
        sanitize_string(Some(&title), MAX_TITLE_LENGTH)
    }

    fn provider(&self) -> String {
        let provider = self.provider.as_deref().filter(|p| !p.trim().is_empty());
        sanitize_string(Some(provider.unwrap_or(DEFAULT_PROVIDER)), MAX_PROVIDER_LENGTH)
    }

    fn into_conversation(self, now: i64) -> Conversation {
        let mut conversation = Conversation {
            id:              0,
            title:           self.effective_title(),
            content:         sanitize_string(self.content.as_deref(), MAX_CONVERSATION_CONTENT_LENGTH),
            provider:        self.provider(),
            timestamp:       self.timestamp.unwrap_or(now),
            tags:            sanitize_tags(self.tags.as_deref()),
            is_favorite:     self.is_favorite,
            notes:           sanitize_string(self.notes.as_deref(), MAX_NOTES_LENGTH),
            conversation_id: sanitize_string(self.conversation_id.as_deref(), MAX_CONVERSATION_ID_LENGTH),
            url:             sanitize_string(self.url.as_deref(), MAX_URL_LENGTH),
            modified_at:     now,
            search_text:     String::new(),
            extra:           Map::new(),
        };
        conversation.search_text = generate_search_text(&conversation);
        conversation
    }

    /// Update used when saving over an existing record
    ///
    /// The timestamp is left out on purpose so the stored record keeps its
    /// original creation date; the favorite flag is left out so it survives.
    fn into_overwrite(self) -> ConversationUpdate {
        ConversationUpdate {
            title: Some(self.effective_title()),
            content: Some(sanitize_string(self.content.as_deref(), MAX_CONVERSATION_CONTENT_LENGTH)),
            provider: Some(self.provider()),
            timestamp: None,
            tags: Some(sanitize_tags(self.tags.as_deref())),
            is_favorite: None,
            notes: Some(sanitize_string(self.notes.as_deref(), MAX_NOTES_LENGTH)),
            conversation_id: Some(sanitize_string(
                self.conversation_id.as_deref(),
                MAX_CONVERSATION_ID_LENGTH,
            )),
            url: Some(sanitize_string(self.url.as_deref(), MAX_URL_LENGTH)),
            extra: Map::new(),
        }
    }
}

/// Partial update merged over a stored conversation
///
/// Unknown keys are kept in `extra` and stored alongside the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title:           Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content:         Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider:        Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp:       Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags:            Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite:     Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes:           Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url:             Option<String>,
    #[serde(flatten)]
    pub extra:           Map<String, Value>,
}

impl ConversationUpdate {
    pub fn validate(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        if self.content.is_some() && is_blank(self.content.as_deref()) {
            violations.push(Violation::Required("Conversation content"));
        }
        if self.tags.as_ref().is_some_and(|tags| tags.len() > MAX_TAGS_COUNT) {
            violations.push(Violation::TooMany {
                what: "tags",
                max:  MAX_TAGS_COUNT,
            });
        }

        violations
    }

    /// Whether `search_text` has to be rebuilt after applying this update
    pub fn touches_search_text(&self) -> bool {
        self.title.is_some()
            || self.content.is_some()
            || self.tags.is_some()
            || self.notes.is_some()
            || self.provider.is_some()
    }

    fn sanitized(mut self) -> Self {
        let clip = |value: Option<String>, max: usize| value.map(|v| sanitize_string(Some(&v), max));

        self.title = clip(self.title, MAX_TITLE_LENGTH).filter(|t| !t.is_empty());
        self.content = clip(self.content, MAX_CONVERSATION_CONTENT_LENGTH);
        self.provider = clip(self.provider, MAX_PROVIDER_LENGTH)
            .map(|p| if p.is_empty() { DEFAULT_PROVIDER.to_string() } else { p });
        self.tags = self.tags.map(|tags| sanitize_tags(Some(tags.as_slice())));
        self.notes = clip(self.notes, MAX_NOTES_LENGTH);
        self.conversation_id = clip(self.conversation_id, MAX_CONVERSATION_ID_LENGTH);
        self.url = clip(self.url, MAX_URL_LENGTH);
        self.extra.retain(|key, _| !RESERVED_FIELDS.contains(&key.as_str()));
        self
    }

    fn apply_to(&self, conversation: &mut Conversation) {
        if let Some(title) = &self.title {
            conversation.title = title.clone();
        }
        if let Some(content) = &self.content {
            conversation.content = content.clone();
        }
        if let Some(provider) = &self.provider {
            conversation.provider = provider.clone();
        }
        if let Some(timestamp) = self.timestamp {
            conversation.timestamp = timestamp;
        }
        if let Some(tags) = &self.tags {
            conversation.tags = tags.clone();
        }
        if let Some(is_favorite) = self.is_favorite {
            conversation.is_favorite = is_favorite;
        }
        if let Some(notes) = &self.notes {
            conversation.notes = notes.clone();
        }
        if let Some(conversation_id) = &self.conversation_id {
            conversation.conversation_id = conversation_id.clone();
        }
        if let Some(url) = &self.url {
            conversation.url = url.clone();
        }
        conversation
            .extra
            .extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));

        if self.touches_search_text() {
            conversation.search_text = generate_search_text(conversation);
        }
    }
}

/// Aggregate counts over the whole history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStats {
    pub total:            usize,
    pub favorites:        usize,
    pub by_provider:      BTreeMap<String, usize>,
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
}

/// Export bundle written by [`HistoryManager::export_conversations`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationExport {
    pub version:       String,
    pub export_date:   String,
    pub conversations: Vec<Conversation>,
}

/// Title derived from the first line of `content`
///
/// Lines longer than `max_length` are cut to `max_length - 3` characters plus
/// an ellipsis.
pub fn generate_auto_title(content: &str, max_length: usize) -> String {
    let first_line = content.split('\n').next().unwrap_or_default().trim();

    if first_line.is_empty() {
        return UNTITLED_CONVERSATION.to_string();
    }
    if first_line.chars().count() > max_length {
        let kept: String = first_line.chars().take(max_length.saturating_sub(3)).collect();
        return format!("{}...", kept);
    }
    first_line.to_string()
}

/// Lowercase blob of every searchable field, space-joined
pub fn generate_search_text(conversation: &Conversation) -> String {
    let mut parts: Vec<&str> = vec![
        &conversation.title,
        &conversation.content,
        &conversation.provider,
        &conversation.notes,
    ];
    parts.extend(conversation.tags.iter().map(String::as_str));
    parts.join(" ").to_lowercase()
}

/// Data access for saved conversations
pub struct HistoryManager {
    db:    Arc<Db>,
    retry: RetryPolicy,
}

impl HistoryManager {
    pub fn new(db: Arc<Db>, retry: RetryPolicy) -> Self {
        Self { db, retry }
    }

    /// Validate, sanitize and insert a conversation
    ///
    /// With `overwrite_id` pointing at an existing record, that record is
    /// updated in place instead and keeps its original timestamp.
    pub async fn save_conversation(&self, draft: ConversationDraft) -> Result<Conversation> {
        check(draft.validate())?;

        if let Some(overwrite_id) = draft.overwrite_id {
            if self.get_conversation(overwrite_id).await?.is_some() {
                debug!(id = overwrite_id, "Overwriting saved conversation");
                return self
                    .update_conversation(overwrite_id, draft.into_overwrite())
                    .await;
            }
        }

        let conversation = draft.into_conversation(now_millis());
        let row = conversation.clone();
        let id = self
            .db
            .execute(&self.retry, move |conn| insert_conversation(conn, &row))
            .await?;

        debug!(id, provider = %conversation.provider, "Saved conversation");
        Ok(Conversation { id, ..conversation })
    }

    pub async fn get_conversation(&self, id: i64) -> Result<Option<Conversation>> {
        self.db
            .execute(&self.retry, move |conn| select_conversation(conn, id))
            .await
    }

    pub async fn get_all_conversations(&self) -> Result<Vec<Conversation>> {
        self.select_where("", []).await
    }

    /// Read-modify-write merge of `updates` over the stored record
    pub async fn update_conversation(&self, id: i64, updates: ConversationUpdate) -> Result<Conversation> {
        check(updates.validate())?;
        let updates = updates.sanitized();

        self.db
            .execute(&self.retry, move |conn| {
                let tx = conn.transaction()?;
                let mut conversation = select_conversation(&tx, id)?.ok_or(SidebarError::NotFoundError {
                    kind: RecordKind::Conversation,
                    id,
                })?;

                updates.apply_to(&mut conversation);
                conversation.modified_at = now_millis();

                put_conversation(&tx, &conversation)?;
                tx.commit()?;
                Ok(conversation)
            })
            .await
    }

    pub async fn delete_conversation(&self, id: i64) -> Result<bool> {
        self.db
            .execute(&self.retry, move |conn| {
                let tx = conn.transaction()?;
                let removed = tx.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
                if removed == 0 {
                    return Err(SidebarError::NotFoundError {
                        kind: RecordKind::Conversation,
                        id,
                    });
                }
                write_tag_index(&tx, TAG_TABLE, id, &[])?;
                tx.commit()?;
                Ok(true)
            })
            .await
    }

    /// Full scan ranked by relevance; see [`crate::search`] for the syntax
    pub async fn search_conversations(&self, text: &str) -> Result<Vec<Conversation>> {
        let query = SearchQuery::parse(text);
        let conversations = self.get_all_conversations().await?;
        Ok(query.rank(conversations, now_millis()))
    }

    /// Conversations saved from `provider`; a blank provider returns everything
    pub async fn get_conversations_by_provider(&self, provider: &str) -> Result<Vec<Conversation>> {
        if provider.trim().is_empty() {
            return self.get_all_conversations().await;
        }
        self.select_where("WHERE provider = ?1", [provider.to_owned()]).await
    }

    pub async fn get_conversations_by_tag(&self, tag: &str) -> Result<Vec<Conversation>> {
        self.select_where(
            "WHERE id IN (SELECT record_id FROM conversation_tags WHERE tag = ?1)",
            [tag.to_owned()],
        )
        .await
    }

    pub async fn get_favorite_conversations(&self) -> Result<Vec<Conversation>> {
        self.select_where("WHERE is_favorite = 1", []).await
    }

    pub async fn toggle_conversation_favorite(&self, id: i64) -> Result<Conversation> {
        let conversation = self
            .get_conversation(id)
            .await?
            .ok_or(SidebarError::NotFoundError {
                kind: RecordKind::Conversation,
                id,
            })?;

        self.update_conversation(
            id,
            ConversationUpdate {
                is_favorite: Some(!conversation.is_favorite),
                ..Default::default()
            },
        )
        .await
    }

    /// Conversations with `start <= timestamp <= end`
    pub async fn get_conversations_by_date_range(&self, start: i64, end: i64) -> Result<Vec<Conversation>> {
        self.select_where("WHERE timestamp BETWEEN ?1 AND ?2", [start, end])
            .await
    }

    /// Every distinct tag in use, sorted
    pub async fn get_all_conversation_tags(&self) -> Result<Vec<String>> {
        self.db
            .execute(&self.retry, |conn| {
                let mut stmt = conn.prepare("SELECT DISTINCT tag FROM conversation_tags ORDER BY tag")?;
                let tags = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(tags)
            })
            .await
    }

    /// Duplicate lookup by the provider's own conversation id
    ///
    /// Returns the oldest match, or `None` for a blank id or no match.
    pub async fn find_conversation_by_conversation_id(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        if conversation_id.is_empty() {
            return Ok(None);
        }

        let conversation_id = conversation_id.to_owned();
        self.db
            .execute(&self.retry, move |conn| {
                let sql = format!(
                    "SELECT {} FROM conversations WHERE conversation_id = ?1 ORDER BY id LIMIT 1",
                    COLUMNS
                );
                let found = conn
                    .query_row(&sql, [conversation_id.as_str()], conversation_from_row)
                    .optional()?;
                Ok(found)
            })
            .await
    }

    pub async fn export_conversations(&self) -> Result<ConversationExport> {
        Ok(ConversationExport {
            version:       EXPORT_FORMAT_VERSION.to_string(),
            export_date:   transfer::export_date(),
            conversations: self.get_all_conversations().await?,
        })
    }

    /// Bulk import from an export bundle
    ///
    /// Supplied ids are ignored. With [`MergeStrategy::Skip`] a record is
    /// skipped when one with the same title and a timestamp less than a minute
    /// away already exists, including records inserted earlier in the batch.
    pub async fn import_conversations(&self, data: &Value, strategy: MergeStrategy) -> Result<ImportSummary> {
        let items = transfer::records(data, "conversations", || SidebarError::ImportFormatError)?;

        let mut existing = match strategy {
            MergeStrategy::Skip => self.get_all_conversations().await?,
            MergeStrategy::Overwrite => Vec::new(),
        };

        let mut summary = ImportSummary::default();
        for item in items {
            match self.import_one(item, strategy, &mut existing).await {
                Ok(true) => summary.imported += 1,
                Ok(false) => summary.skipped += 1,
                Err(err) => {
                    warn!("Skipping conversation during import: {}", err);
                    summary.fail(RecordKind::Conversation, item, &err);
                },
            }
        }

        info!(
            imported = summary.imported,
            skipped = summary.skipped,
            failed = summary.errors.len(),
            "Imported conversations"
        );
        Ok(summary)
    }

    async fn import_one(&self, item: &Value, strategy: MergeStrategy, existing: &mut Vec<Conversation>) -> Result<bool> {
        let mut draft: ConversationDraft = serde_json::from_value(item.clone())?;
        draft.overwrite_id = None;

        if strategy == MergeStrategy::Skip && is_duplicate(existing, &draft) {
            return Ok(false);
        }

        let saved = self.save_conversation(draft).await?;
        if strategy == MergeStrategy::Skip {
            existing.push(saved);
        }
        Ok(true)
    }

    pub async fn clear_all_conversations(&self) -> Result<bool> {
        self.db
            .execute(&self.retry, |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM conversation_tags", [])?;
                tx.execute("DELETE FROM conversations", [])?;
                tx.commit()?;
                Ok(true)
            })
            .await?;

        info!("Cleared conversation history");
        Ok(true)
    }

    pub async fn get_conversation_stats(&self) -> Result<ConversationStats> {
        let conversations = self.get_all_conversations().await?;

        let mut stats = ConversationStats {
            total: conversations.len(),
            favorites: conversations.iter().filter(|c| c.is_favorite).count(),
            oldest_timestamp: conversations.iter().map(|c| c.timestamp).min(),
            newest_timestamp: conversations.iter().map(|c| c.timestamp).max(),
            ..Default::default()
        };
        for conversation in &conversations {
            *stats.by_provider.entry(conversation.provider.clone()).or_default() += 1;
        }

        Ok(stats)
    }

    async fn select_where<P>(&self, clause: &'static str, params: P) -> Result<Vec<Conversation>>
    where
        P: Params + Clone + Send + Sync + 'static,
    {
        self.db
            .execute(&self.retry, move |conn| {
                select_conversations(conn, clause, params.clone())
            })
            .await
    }
}

fn is_duplicate(existing: &[Conversation], draft: &ConversationDraft) -> bool {
    let (Some(_), Some(timestamp)) = (draft.title.as_deref(), draft.timestamp) else {
        return false;
    };
    let title = draft.effective_title();

    existing
        .iter()
        .any(|c| c.title == title && c.timestamp.abs_diff(timestamp) < DUPLICATE_WINDOW_MS.unsigned_abs())
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id:              row.get(0)?,
        title:           row.get(1)?,
        content:         row.get(2)?,
        provider:        row.get(3)?,
        timestamp:       row.get(4)?,
        tags:            json_column(row, 5)?,
        is_favorite:     row.get(6)?,
        notes:           row.get(7)?,
        conversation_id: row.get(8)?,
        url:             row.get(9)?,
        modified_at:     row.get(10)?,
        search_text:     row.get(11)?,
        extra:           json_column(row, 12)?,
    })
}

fn select_conversation(conn: &Connection, id: i64) -> Result<Option<Conversation>> {
    let sql = format!("SELECT {} FROM conversations WHERE id = ?1", COLUMNS);
    Ok(conn
        .query_row(&sql, params![id], conversation_from_row)
        .optional()?)
}

fn select_conversations<P: Params>(conn: &Connection, clause: &str, params: P) -> Result<Vec<Conversation>> {
    let sql = format!("SELECT {} FROM conversations {} ORDER BY id", COLUMNS, clause);
    let mut stmt = conn.prepare(&sql)?;
    let conversations = stmt
        .query_map(params, conversation_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(conversations)
}

fn insert_conversation(conn: &mut Connection, conversation: &Conversation) -> Result<i64> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO conversations (title, content, provider, timestamp, tags, is_favorite, notes,
                                    conversation_id, url, modified_at, search_text, extra)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            conversation.title,
            conversation.content,
            conversation.provider,
            conversation.timestamp,
            serde_json::to_string(&conversation.tags)?,
            conversation.is_favorite,
            conversation.notes,
            conversation.conversation_id,
            conversation.url,
            conversation.modified_at,
            conversation.search_text,
            serde_json::to_string(&conversation.extra)?,
        ],
    )?;
    let id = tx.last_insert_rowid();

    write_tag_index(&tx, TAG_TABLE, id, &conversation.tags)?;
    tx.commit()?;
    Ok(id)
}

fn put_conversation(conn: &Connection, conversation: &Conversation) -> Result<()> {
    conn.execute(
        "UPDATE conversations
         SET title = ?2, content = ?3, provider = ?4, timestamp = ?5, tags = ?6, is_favorite = ?7,
             notes = ?8, conversation_id = ?9, url = ?10, modified_at = ?11, search_text = ?12,
             extra = ?13
         WHERE id = ?1",
        params![
            conversation.id,
            conversation.title,
            conversation.content,
            conversation.provider,
            conversation.timestamp,
            serde_json::to_string(&conversation.tags)?,
            conversation.is_favorite,
            conversation.notes,
            conversation.conversation_id,
            conversation.url,
            conversation.modified_at,
            conversation.search_text,
            serde_json::to_string(&conversation.extra)?,
        ],
    )?;

    write_tag_index(conn, TAG_TABLE, conversation.id, &conversation.tags)
}
