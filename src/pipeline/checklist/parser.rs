use serde_json::{Map, Value};

use super::sanitize::strip_reasoning;
use super::types::{GeneratedChecklist, GeneratedItem};
use super::{ExtractionErrorKind, ExtractionFailure};
use crate::models::{DocumentText, Locale, Translations};

/// Most notes kept from a generated checklist.
pub const MAX_NOTES: usize = 10;

/// Keys that may hold the item array in a top-level object.
const LIST_KEYS: &[&str] = &["checklist", "items", "documents"];

const ID_KEYS: &[&str] = &["documentId", "document_id", "id"];
const CATEGORY_KEYS: &[&str] = &["category", "type"];

/// Recover a checklist from raw generated text.
///
/// Scans top-level JSON candidates (balanced object/array substrings,
/// string-aware) in position order and returns the first that describes a
/// checklist. Values nested inside a candidate are never tried on their
/// own, so a truncated response fails as `Unbalanced` even when it holds
/// complete inner arrays. Code fences and surrounding prose are skipped by
/// the scan itself.
pub fn parse_generated_checklist(raw: &str) -> Result<GeneratedChecklist, ExtractionFailure> {
    let text = strip_reasoning(raw);
    if text.is_empty() {
        return Err(ExtractionFailure::new(ExtractionErrorKind::EmptyResponse, raw));
    }

    let bytes = text.as_bytes();
    let mut first_failure: Option<ExtractionErrorKind> = None;
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'{' && bytes[pos] != b'[' {
            pos += 1;
            continue;
        }
        let kind = match scan_value(bytes, pos) {
            // Stray bracket in prose, not the start of a value.
            Span::Mismatched => {
                pos += 1;
                continue;
            }
            // Everything after an unclosed top-level value is inside it.
            Span::Truncated => {
                first_failure.get_or_insert(ExtractionErrorKind::Unbalanced);
                break;
            }
            Span::Closed(end) => {
                let kind = match serde_json::from_str::<Value>(&text[pos..=end]) {
                    Err(_) => ExtractionErrorKind::InvalidJson,
                    Ok(value) => match checklist_from_value(&value) {
                        Some(checklist) => return Ok(checklist),
                        None => ExtractionErrorKind::UnexpectedShape,
                    },
                };
                pos = end + 1;
                kind
            }
        };
        first_failure.get_or_insert(kind);
    }

    let kind = first_failure.unwrap_or(ExtractionErrorKind::NoJsonFound);
    Err(ExtractionFailure::new(kind, raw))
}

/// Salvage complete item objects from text that failed extraction,
/// typically a response cut off mid-array.
pub fn salvage_items(raw: &str) -> GeneratedChecklist {
    let text = strip_reasoning(raw);
    let bytes = text.as_bytes();
    let mut items = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'{' {
            pos += 1;
            continue;
        }
        let Span::Closed(end) = scan_value(bytes, pos) else {
            pos += 1;
            continue;
        };
        let item = serde_json::from_str::<Value>(&text[pos..=end])
            .ok()
            .and_then(|v| v.as_object().and_then(item_from_object))
            .filter(|i| !i.document_id.is_empty());
        match item {
            Some(item) => {
                items.push(item);
                pos = end + 1;
            }
            None => pos += 1,
        }
    }

    GeneratedChecklist {
        items,
        notes: Vec::new(),
    }
}

/// Extent of the bracketed value opening at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    /// Index of the closing bracket.
    Closed(usize),
    /// A closing bracket of the wrong kind.
    Mismatched,
    /// Input ended with brackets still open.
    Truncated,
}

fn scan_value(bytes: &[u8], start: usize) -> Span {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return Span::Mismatched;
                }
                if stack.is_empty() {
                    return Span::Closed(start + offset);
                }
            }
            _ => {}
        }
    }
    Span::Truncated
}

/// Interpret a JSON value as a checklist, if it has a recognised shape.
fn checklist_from_value(value: &Value) -> Option<GeneratedChecklist> {
    match value {
        Value::Array(arr) => {
            if !arr.is_empty() && !arr.iter().any(Value::is_object) {
                return None;
            }
            Some(GeneratedChecklist {
                items: parse_items_lenient(arr),
                notes: Vec::new(),
            })
        }
        Value::Object(obj) => {
            let arr = LIST_KEYS
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_array))?;
            Some(GeneratedChecklist {
                items: parse_items_lenient(arr),
                notes: parse_notes(obj.get("notes")),
            })
        }
        _ => None,
    }
}

/// Parse an item array leniently: non-objects are skipped.
fn parse_items_lenient(arr: &[Value]) -> Vec<GeneratedItem> {
    arr.iter()
        .filter_map(Value::as_object)
        .filter_map(item_from_object)
        .collect()
}

fn parse_notes(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(arr)) = value else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(MAX_NOTES)
        .map(String::from)
        .collect()
}

fn first_string(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
}

fn parse_required(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Build an item from one object. Returns None only when the object has
/// neither an id nor any text.
fn item_from_object(obj: &Map<String, Value>) -> Option<GeneratedItem> {
    let document_id = first_string(obj, ID_KEYS).unwrap_or_default();
    let texts = parse_texts(obj);
    if document_id.is_empty() && !texts.has_any_populated() {
        return None;
    }
    Some(GeneratedItem {
        document_id,
        category: first_string(obj, CATEGORY_KEYS),
        required: parse_required(obj.get("required")),
        priority: first_string(obj, &["priority"]),
        texts,
    })
}

/// Localized text in either nested (`{en:{…}}`, `texts:{en:{…}}`) or flat
/// (`name`, `nameRu`, `descriptionUz`, …) form. Nested wins per locale.
fn parse_texts(obj: &Map<String, Value>) -> Translations {
    let nested_root = obj.get("texts").and_then(Value::as_object).unwrap_or(obj);
    let mut texts = Translations::default();

    for locale in Locale::ALL {
        let nested = nested_root
            .get(locale.as_str())
            .and_then(Value::as_object)
            .map(text_from_object);
        *texts.get_mut(*locale) = match nested {
            Some(text) if text.is_populated() => text,
            _ => flat_text(obj, *locale),
        };
    }
    texts
}

fn text_from_object(obj: &Map<String, Value>) -> DocumentText {
    DocumentText {
        name: first_string(obj, &["name", "title"]).unwrap_or_default(),
        description: first_string(obj, &["description"]).unwrap_or_default(),
        where_to_obtain: first_string(obj, &["whereToObtain", "where_to_obtain"]).unwrap_or_default(),
    }
}

fn flat_text(obj: &Map<String, Value>, locale: Locale) -> DocumentText {
    let suffix = match locale {
        Locale::En => "",
        Locale::Ru => "Ru",
        Locale::Uz => "Uz",
    };
    let snake_suffix = suffix.to_ascii_lowercase();
    let field = |camel: &str, snake: &str| {
        let camel_key = format!("{camel}{suffix}");
        let snake_key = if suffix.is_empty() {
            snake.to_string()
        } else {
            format!("{snake}_{snake_suffix}")
        };
        first_string(obj, &[camel_key.as_str(), snake_key.as_str()]).unwrap_or_default()
    };
    DocumentText {
        name: field("name", "name"),
        description: field("description", "description"),
        where_to_obtain: field("whereToObtain", "where_to_obtain"),
    }
}
