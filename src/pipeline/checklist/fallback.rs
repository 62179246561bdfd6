use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::catalog::{backfill_translations, default_translations};
use super::types::DocumentCatalog;
use super::DataError;
use crate::models::{
    BaseChecklist, ChecklistItem, CountryCode, DocumentCategory, Priority, Translations, VisaType,
};

/// Advisory note attached to every degraded checklist.
pub const DEGRADED_NOTE: &str =
    "This is a basic checklist. Please verify specific requirements with the embassy.";

/// One item as written in the fallback data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackItemSpec {
    pub document_id: String,
    pub category: DocumentCategory,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub texts: Translations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackEntrySpec {
    pub country: String,
    pub visa_type: VisaType,
    pub items: Vec<FallbackItemSpec>,
}

/// On-disk shape of the static fallback table. Entries for the reserved
/// generic country (`XX`) back every pair without its own entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticFallbackFile {
    pub entries: Vec<FallbackEntrySpec>,
}

/// Generic-country entries, one per visa type, so lookup is total.
#[derive(Debug, Clone)]
struct GenericEntries {
    tourist: Vec<ChecklistItem>,
    student: Vec<ChecklistItem>,
}

impl GenericEntries {
    fn get(&self, visa_type: VisaType) -> &[ChecklistItem] {
        match visa_type {
            VisaType::Tourist => &self.tourist,
            VisaType::Student => &self.student,
        }
    }
}

/// Immutable per-(country, visa type) checklist table for LEGACY degradation.
#[derive(Debug, Clone)]
pub struct StaticFallbackTable {
    generic: GenericEntries,
    entries: HashMap<(CountryCode, VisaType), Vec<ChecklistItem>>,
}

impl StaticFallbackTable {
    /// Build the lookup from file data. Items are de-duplicated by id,
    /// `required` is normalized to the category, and both generic entries
    /// must be present and non-empty.
    pub fn from_file(file: StaticFallbackFile) -> Result<Self, DataError> {
        let mut entries = HashMap::new();
        for entry in &file.entries {
            let country = CountryCode::parse(&entry.country).map_err(|_| DataError::InvalidCountryCode {
                name: "static fallback table".into(),
                value: entry.country.clone(),
            })?;
            let items = normalize_items(&entry.items);
            if items.is_empty() {
                tracing::warn!(
                    country = %country,
                    visa_type = %entry.visa_type,
                    "Static fallback entry is empty, generic entry will be used"
                );
                continue;
            }
            entries.insert((country, entry.visa_type), items);
        }

        let mut take_generic = |visa_type: VisaType| {
            entries
                .remove(&(CountryCode::generic(), visa_type))
                .ok_or_else(|| DataError::MissingGenericEntry(visa_type.to_string()))
        };
        let generic = GenericEntries {
            tourist: take_generic(VisaType::Tourist)?,
            student: take_generic(VisaType::Student)?,
        };

        Ok(Self { generic, entries })
    }

    /// Items for the pair, or the generic entry for the visa type when the
    /// pair is absent. The flag tells whether the generic entry was used.
    pub fn lookup(&self, country: &CountryCode, visa_type: VisaType) -> (&[ChecklistItem], bool) {
        if country.is_generic() {
            return (self.generic.get(visa_type), true);
        }
        match self.entries.get(&(country.clone(), visa_type)) {
            Some(items) if !items.is_empty() => (items.as_slice(), false),
            _ => (self.generic.get(visa_type), true),
        }
    }

    pub fn generic(&self, visa_type: VisaType) -> &[ChecklistItem] {
        self.generic.get(visa_type)
    }

    /// Every document id the table can emit.
    pub fn referenced_document_ids(&self) -> BTreeSet<String> {
        self.generic
            .tourist
            .iter()
            .chain(self.generic.student.iter())
            .chain(self.entries.values().flatten())
            .map(|i| i.document_id.clone())
            .collect()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

fn normalize_items(specs: &[FallbackItemSpec]) -> Vec<ChecklistItem> {
    let mut seen = HashSet::new();
    specs
        .iter()
        .filter(|s| !s.document_id.trim().is_empty())
        .filter(|s| seen.insert(s.document_id.trim().to_string()))
        .map(|s| {
            ChecklistItem::new(
                s.document_id.trim(),
                s.category,
                s.required,
                s.priority.unwrap_or_else(|| s.category.default_priority()),
                s.texts.clone(),
            )
        })
        .collect()
}

/// HYBRID terminal fallback: the base checklist with catalog text.
pub fn degrade_hybrid(
    base: &BaseChecklist,
    catalog: &dyn DocumentCatalog,
    gaps: &mut BTreeSet<String>,
) -> Vec<ChecklistItem> {
    base.entries()
        .iter()
        .map(|entry| {
            ChecklistItem::new(
                &entry.document_id,
                entry.category,
                entry.required,
                entry.category.default_priority(),
                default_translations(catalog, &entry.document_id, gaps),
            )
        })
        .collect()
}

/// LEGACY terminal fallback: the static table entry for the pair, else the
/// generic-country entry for the visa type. Blank text is backfilled.
pub fn degrade_legacy(
    table: &StaticFallbackTable,
    country: &CountryCode,
    visa_type: VisaType,
    catalog: &dyn DocumentCatalog,
    gaps: &mut BTreeSet<String>,
) -> Vec<ChecklistItem> {
    let (items, used_generic) = table.lookup(country, visa_type);
    if used_generic {
        tracing::info!(
            country = %country,
            visa_type = %visa_type,
            "No static fallback entry, using generic country entry"
        );
    }
    items
        .iter()
        .cloned()
        .map(|mut item| {
            backfill_translations(catalog, &item.document_id, &mut item.texts, gaps);
            item
        })
        .collect()
}
