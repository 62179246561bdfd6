use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::CountryCode;
use super::enums::{ChecklistMode, ChecklistSource, DocumentCategory, Locale, Priority, VisaType};

/// Human-readable text for one document in one locale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentText {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub where_to_obtain: String,
}

impl DocumentText {
    pub fn new(name: &str, description: &str, where_to_obtain: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            where_to_obtain: where_to_obtain.to_string(),
        }
    }

    /// At least a name or a description is present.
    pub fn is_populated(&self) -> bool {
        !self.name.trim().is_empty() || !self.description.trim().is_empty()
    }

    /// Fill blank fields from `defaults`, keeping anything already present.
    /// Returns true when at least one field changed.
    pub fn backfill_from(&mut self, defaults: &DocumentText) -> bool {
        let mut changed = false;
        for (field, default) in [
            (&mut self.name, &defaults.name),
            (&mut self.description, &defaults.description),
            (&mut self.where_to_obtain, &defaults.where_to_obtain),
        ] {
            if field.trim().is_empty() && !default.trim().is_empty() {
                *field = default.clone();
                changed = true;
            }
        }
        changed
    }
}

/// The same document text in every supported locale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translations {
    #[serde(default)]
    pub en: DocumentText,
    #[serde(default)]
    pub ru: DocumentText,
    #[serde(default)]
    pub uz: DocumentText,
}

impl Translations {
    pub fn get(&self, locale: Locale) -> &DocumentText {
        match locale {
            Locale::En => &self.en,
            Locale::Ru => &self.ru,
            Locale::Uz => &self.uz,
        }
    }

    pub fn get_mut(&mut self, locale: Locale) -> &mut DocumentText {
        match locale {
            Locale::En => &mut self.en,
            Locale::Ru => &mut self.ru,
            Locale::Uz => &mut self.uz,
        }
    }

    pub fn has_any_populated(&self) -> bool {
        Locale::ALL.iter().any(|l| self.get(*l).is_populated())
    }

    /// Locales whose text has at least one blank field.
    pub fn incomplete_locales(&self) -> Vec<Locale> {
        Locale::ALL
            .iter()
            .copied()
            .filter(|l| {
                let text = self.get(*l);
                text.name.trim().is_empty()
                    || text.description.trim().is_empty()
                    || text.where_to_obtain.trim().is_empty()
            })
            .collect()
    }
}

/// One entry of the checklist returned to collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub document_id: String,
    pub category: DocumentCategory,
    pub required: bool,
    pub priority: Priority,
    #[serde(default)]
    pub texts: Translations,
}

impl ChecklistItem {
    /// Build an item whose `required` flag is consistent with `category`.
    pub fn new(
        document_id: &str,
        category: DocumentCategory,
        required: bool,
        priority: Priority,
        texts: Translations,
    ) -> Self {
        Self {
            document_id: document_id.to_string(),
            category,
            required: required || category.implies_required(),
            priority,
            texts,
        }
    }

    pub fn is_consistent(&self) -> bool {
        !self.category.implies_required() || self.required
    }
}

/// One canonical `(documentId, category, required)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseChecklistEntry {
    pub document_id: String,
    pub category: DocumentCategory,
    pub required: bool,
}

/// The canonical truth for a HYBRID request. Only the rule evaluator
/// constructs it; everything downstream reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseChecklist {
    entries: Vec<BaseChecklistEntry>,
}

impl BaseChecklist {
    pub(crate) fn from_entries(entries: Vec<BaseChecklistEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[BaseChecklistEntry] {
        &self.entries
    }

    pub fn get(&self, document_id: &str) -> Option<&BaseChecklistEntry> {
        self.entries.iter().find(|e| e.document_id == document_id)
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.get(document_id).is_some()
    }

    pub fn ids(&self) -> BTreeSet<String> {
        self.entries.iter().map(|e| e.document_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Token accounting reported by the generation service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Operational metadata for dashboards. Never shown to end users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistDiagnostics {
    pub request_id: Uuid,
    pub attempts: u8,
    pub model: Option<String>,
    pub token_usage: TokenUsage,
    /// Document ids the catalog had no default text for.
    pub catalog_gaps: BTreeSet<String>,
    pub cancelled: bool,
}

impl ChecklistDiagnostics {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            attempts: 0,
            model: None,
            token_usage: TokenUsage::default(),
            catalog_gaps: BTreeSet::new(),
            cancelled: false,
        }
    }
}

/// The only artifact returned from the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalChecklist {
    pub country: CountryCode,
    pub visa_type: VisaType,
    pub mode: ChecklistMode,
    pub source: ChecklistSource,
    pub items: Vec<ChecklistItem>,
    #[serde(default)]
    pub notes: Vec<String>,
    pub diagnostics: ChecklistDiagnostics,
    pub generated_at: DateTime<Utc>,
}

impl FinalChecklist {
    pub fn document_ids(&self) -> BTreeSet<String> {
        self.items.iter().map(|i| i.document_id.clone()).collect()
    }

    /// Non-empty, duplicate-free, every item category-consistent.
    pub fn is_well_formed(&self) -> bool {
        let mut seen = HashSet::new();
        !self.items.is_empty()
            && self
                .items
                .iter()
                .all(|i| i.is_consistent() && seen.insert(i.document_id.as_str()))
    }
}
