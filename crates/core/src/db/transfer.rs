//! Shared shapes for export and bulk import

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::errors::{RecordKind, Result, SidebarError};

/// Version tag written into every export bundle
pub const EXPORT_FORMAT_VERSION: &str = "1.0";

/// What to do with an incoming record during bulk import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Insert only when no similar record exists
    #[default]
    Skip,
    /// Always insert as a new record
    Overwrite,
}

/// One record that could not be imported
///
/// Serialized as `{"conversation": title, "error": ...}` or
/// `{"prompt": title, "error": ...}` depending on the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFailure {
    pub kind:  RecordKind,
    pub title: Option<String>,
    pub error: String,
}

impl Serialize for ImportFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(self.kind.key(), &self.title)?;
        map.serialize_entry("error", &self.error)?;
        map.end()
    }
}

/// Outcome of a bulk import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped:  usize,
    pub errors:   Vec<ImportFailure>,
}

impl ImportSummary {
    pub(crate) fn fail(&mut self, kind: RecordKind, record: &Value, error: &SidebarError) {
        self.errors.push(ImportFailure {
            kind,
            title: record.get("title").and_then(Value::as_str).map(String::from),
            error: error.to_string(),
        });
    }
}

/// Pull the record array out of an import payload
///
/// The whole call is rejected with `format_error` when `key` is missing or not
/// an array.
pub(crate) fn records<'a>(
    data: &'a Value,
    key: &str,
    format_error: fn() -> SidebarError,
) -> Result<&'a [Value]> {
    data.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(format_error)
}

/// Export timestamp in RFC 3339
pub(crate) fn export_date() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
