//! Result aggregation: pull JSON out of a model reply and persist it.
//!
//! Models asked for JSON usually answer with a fenced block, sometimes with
//! prose around it, sometimes with a broken fence. [`extract_json_fence`]
//! is deliberately forgiving and never fails; strictness lives in
//! [`append_record`], which refuses anything that does not parse.
//!
//! ## Store shape
//!
//! The store is a single JSON document. An array store grows by one element
//! per record; an object store absorbs the keys of each object record, later
//! keys winning. The shape chosen by the first write never changes.
//!
//! ## Atomic writes
//!
//! Every append rewrites the whole document into a temp file next to the
//! store and renames it over the old one, so a reader sees either the old
//! or the new document, never half of one. The read-modify-write itself is
//! not locked; callers must not append to the same store concurrently.

use crate::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use tracing::debug;

// ── Fence extraction ─────────────────────────────────────────────────────

// Opening fence, lazily up to the closing fence or end of input. The
// language tag is stripped separately by `strip_language_tag`.
static RE_TRIPLE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(.*?)(?:```|\z)").unwrap());

// A whole first line that reads as a language tag (`json`, `c++`, `jsonc`).
static RE_LANGUAGE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_+-]*$").unwrap());

// Two-backtick variant some models emit: ``json … ``
static RE_MALFORMED_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)``json(.*?)(?:``|\z)").unwrap());

/// Best-effort extraction of the text inside the first fenced block.
///
/// * `` ```json {..} ``` `` → `{..}`
/// * an unclosed fence → everything after the opening fence
/// * `` ``json {..} `` → `{..}`
/// * no fence → the trimmed input
pub fn extract_json_fence(raw: &str) -> String {
    if let Some(caps) = RE_TRIPLE_FENCE.captures(raw) {
        let body = caps.get(1).map_or("", |m| m.as_str());
        return strip_language_tag(body).trim().to_string();
    }
    if let Some(caps) = RE_MALFORMED_FENCE.captures(raw) {
        return caps[1].trim().to_string();
    }
    raw.trim().to_string()
}

/// Drop the language tag from a fence body.
///
/// A bare word on its own first line is a tag unless it is a JSON literal
/// (`true`, `false`, `null`). A leading `json`, in any case, is a tag even
/// with the payload glued to it.
fn strip_language_tag(body: &str) -> &str {
    if let Some((first, rest)) = body.split_once('\n') {
        let word = first.trim();
        if RE_LANGUAGE_TAG.is_match(word) && !matches!(word, "true" | "false" | "null") {
            return rest;
        }
    }
    match body.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &body[4..],
        _ => body,
    }
}

// ── Records ──────────────────────────────────────────────────────────────

/// Something to append to a store.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// JSON text; parsed before storing.
    Text(String),
    /// An already-parsed value.
    Value(Value),
}

impl From<&str> for Record {
    fn from(s: &str) -> Self {
        Record::Text(s.to_string())
    }
}

impl From<String> for Record {
    fn from(s: String) -> Self {
        Record::Text(s)
    }
}

impl From<Value> for Record {
    fn from(v: Value) -> Self {
        Record::Value(v)
    }
}

impl Record {
    /// Parse into a JSON value.
    pub fn into_value(self) -> Result<Value, ExtractError> {
        match self {
            Record::Value(v) => Ok(v),
            Record::Text(s) => serde_json::from_str(&s).map_err(|e| ExtractError::MalformedRecord {
                detail: format!("reply is not valid JSON ({e}): {}", preview(&s)),
            }),
        }
    }
}

fn preview(s: &str) -> String {
    let t = s.trim();
    if t.chars().count() > 80 {
        format!("{}…", t.chars().take(80).collect::<String>())
    } else {
        t.to_string()
    }
}

fn shape_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Store ────────────────────────────────────────────────────────────────

/// Read the store at `store_path`. A missing or blank file is an empty array.
pub fn load_store(store_path: &Path) -> Result<Value, ExtractError> {
    let text = match std::fs::read_to_string(store_path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Value::Array(Vec::new())),
        Err(e) => {
            return Err(ExtractError::StoreReadFailed {
                path: store_path.to_path_buf(),
                source: e,
            })
        }
    };

    if text.trim().is_empty() {
        return Ok(Value::Array(Vec::new()));
    }

    serde_json::from_str(&text).map_err(|e| ExtractError::CorruptStore {
        path: store_path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Append `record` to the store at `store_path`, creating it if needed.
pub fn append_record(store_path: &Path, record: impl Into<Record>) -> Result<(), ExtractError> {
    let value = record.into().into_value()?;
    let mut store = load_store(store_path)?;

    match &mut store {
        Value::Array(items) => {
            items.push(value);
            debug!("Appended record #{} to {}", items.len(), store_path.display());
        }
        Value::Object(map) => match value {
            Value::Object(incoming) => {
                let added = incoming.len();
                for (k, v) in incoming {
                    map.insert(k, v);
                }
                debug!("Merged {} keys into {}", added, store_path.display());
            }
            other => {
                return Err(ExtractError::MalformedRecord {
                    detail: format!(
                        "cannot merge a JSON {} into the object store '{}'",
                        shape_name(&other),
                        store_path.display()
                    ),
                })
            }
        },
        other => {
            return Err(ExtractError::UnsupportedStoreShape {
                path: store_path.to_path_buf(),
                found: shape_name(other),
            })
        }
    }

    write_store(store_path, &store)
}

/// Pretty-print `store` to a temp file beside `store_path`, then rename it into place.
fn write_store(store_path: &Path, store: &Value) -> Result<(), ExtractError> {
    let write_err = |source: std::io::Error| ExtractError::StoreWriteFailed {
        path: store_path.to_path_buf(),
        source,
    };

    let parent = match store_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
    serde_json::to_writer_pretty(&mut tmp, store).map_err(|e| write_err(e.into()))?;
    tmp.write_all(b"\n").map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(store_path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── extract_json_fence ───────────────────────────────────────────────

    #[test]
    fn fence_with_prose_around_it() {
        let out = extract_json_fence("prefix ```json {\"a\":1} ``` suffix");
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn fence_with_newlines() {
        let raw = "Here you go:\n```json\n[\n  {\"x\": 1}\n]\n```\nAnything else?";
        assert_eq!(extract_json_fence(raw), "[\n  {\"x\": 1}\n]");
    }

    #[test]
    fn fence_without_language_tag() {
        assert_eq!(extract_json_fence("```\n{\"b\":2}\n```"), "{\"b\":2}");
        assert_eq!(extract_json_fence("```{\"b\":2}```"), "{\"b\":2}");
    }

    #[test]
    fn unclosed_fence_returns_rest() {
        assert_eq!(extract_json_fence("```json\n{\"c\":3}"), "{\"c\":3}");
    }

    #[test]
    fn malformed_two_backtick_prefix() {
        assert_eq!(extract_json_fence("``json {\"d\":4} ``"), "{\"d\":4}");
        assert_eq!(extract_json_fence("``json {\"d\":4}"), "{\"d\":4}");
    }

    #[test]
    fn no_fence_is_trimmed_input() {
        assert_eq!(extract_json_fence("  {\"e\":5}\n"), "{\"e\":5}");
        assert_eq!(extract_json_fence(""), "");
    }

    #[test]
    fn only_first_block_is_taken() {
        let raw = "```json\n{\"first\":true}\n```\n```json\n{\"second\":true}\n```";
        assert_eq!(extract_json_fence(raw), "{\"first\":true}");
    }

    #[test]
    fn json_tag_glued_to_payload() {
        assert_eq!(extract_json_fence("```json{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(extract_json_fence("```JSON[1,2]```"), "[1,2]");

        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("results.json");
        append_record(&store, extract_json_fence("```json{\"a\":1}```")).unwrap();
        assert_eq!(load_store(&store).unwrap(), json!([{"a": 1}]));
    }

    #[test]
    fn json_literal_body_is_not_a_tag() {
        assert_eq!(extract_json_fence("```true\n```"), "true");
        assert_eq!(extract_json_fence("```null\n```"), "null");
        assert_eq!(extract_json_fence("```42 \n```"), "42");
    }

    #[test]
    fn other_language_tags_need_their_own_line() {
        assert_eq!(extract_json_fence("```jsonc\n{\"f\":6}\n```"), "{\"f\":6}");
        assert_eq!(extract_json_fence("```text\n\"hi\"\n```"), "\"hi\"");
    }

    // ── append_record ────────────────────────────────────────────────────

    #[test]
    fn appends_in_order_to_new_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("results.json");

        append_record(&store, "{\"n\": 1}").unwrap();
        append_record(&store, json!({"n": 2})).unwrap();

        assert_eq!(load_store(&store).unwrap(), json!([{"n": 1}, {"n": 2}]));
    }

    #[test]
    fn missing_store_equals_explicit_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "[]").unwrap();

        append_record(&missing, "[1, 2]").unwrap();
        append_record(&empty, "[1, 2]").unwrap();

        assert_eq!(load_store(&missing).unwrap(), load_store(&empty).unwrap());
        assert_eq!(load_store(&missing).unwrap(), json!([[1, 2]]));
    }

    #[test]
    fn blank_store_file_counts_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("blank.json");
        std::fs::write(&store, "  \n").unwrap();
        append_record(&store, "true").unwrap();
        assert_eq!(load_store(&store).unwrap(), json!([true]));
    }

    #[test]
    fn object_store_merges_keys_later_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("merged.json");
        std::fs::write(&store, "{\"a\": 1, \"b\": 1}").unwrap();

        append_record(&store, "{\"b\": 2, \"c\": 2}").unwrap();
        append_record(&store, "{\"c\": 3}").unwrap();

        let v = load_store(&store).unwrap();
        assert_eq!(v, json!({"a": 1, "b": 2, "c": 3}));
        let keys: Vec<&String> = v.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn non_object_into_object_store_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("obj.json");
        std::fs::write(&store, "{}").unwrap();
        let err = append_record(&store, "[1]").unwrap_err();
        assert!(matches!(err, ExtractError::MalformedRecord { .. }));
        assert_eq!(std::fs::read_to_string(&store).unwrap(), "{}");
    }

    #[test]
    fn invalid_json_record_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("s.json");
        let err = append_record(&store, "not json at all").unwrap_err();
        assert!(matches!(err, ExtractError::MalformedRecord { .. }));
        assert!(!store.exists(), "nothing should be written on failure");
    }

    #[test]
    fn scalar_store_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("scalar.json");
        std::fs::write(&store, "42").unwrap();
        let err = append_record(&store, "{}").unwrap_err();
        assert!(matches!(
            err,
            ExtractError::UnsupportedStoreShape { found: "number", .. }
        ));
    }

    #[test]
    fn corrupt_store_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("broken.json");
        std::fs::write(&store, "[{\"a\": ").unwrap();
        assert!(matches!(
            append_record(&store, "{}"),
            Err(ExtractError::CorruptStore { .. })
        ));
    }

    #[test]
    fn unreadable_store_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("results.json");
        std::fs::create_dir(&store).unwrap();

        let err = load_store(&store).unwrap_err();
        assert!(matches!(err, ExtractError::StoreReadFailed { .. }), "got {err:?}");
        assert!(!err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn store_is_pretty_printed_and_parent_created() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("out/nested/results.json");
        append_record(&store, "{\"k\": \"v\"}").unwrap();

        let text = std::fs::read_to_string(&store).unwrap();
        assert!(text.contains("\n  {\n    \"k\": \"v\"\n  }\n"), "got: {text}");
        assert!(text.ends_with('\n'));

        let leftovers: Vec<_> = std::fs::read_dir(store.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path() != store)
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }
}
