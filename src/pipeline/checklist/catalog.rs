use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::types::DocumentCatalog;
use crate::models::{DocumentText, Locale, Translations};

/// Log target for catalog gaps so alerting can filter on it.
pub const CATALOG_GAP_TARGET: &str = "visa_checklist::catalog_gap";

/// Document catalog held in memory, immutable after load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InMemoryCatalog {
    documents: BTreeMap<String, Translations>,
}

impl InMemoryCatalog {
    pub fn new(documents: BTreeMap<String, Translations>) -> Self {
        Self { documents }
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.documents.contains_key(document_id)
    }

    pub fn document_ids(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }
}

impl DocumentCatalog for InMemoryCatalog {
    fn default_text(&self, document_id: &str, locale: Locale) -> Option<DocumentText> {
        self.documents
            .get(document_id)
            .map(|t| t.get(locale))
            .filter(|text| text.is_populated())
            .cloned()
    }

    fn document_count(&self) -> usize {
        self.documents.len()
    }
}

/// Default text for a document in every locale.
///
/// A locale the catalog cannot serve is a catalog gap: it is recorded in
/// `gaps`, logged once per document, and left as empty strings.
pub fn default_translations(
    catalog: &dyn DocumentCatalog,
    document_id: &str,
    gaps: &mut BTreeSet<String>,
) -> Translations {
    let mut texts = Translations::default();
    let mut missing: Vec<&str> = Vec::new();
    for locale in Locale::ALL {
        match catalog.default_text(document_id, *locale) {
            Some(text) => *texts.get_mut(*locale) = text,
            None => missing.push(locale.as_str()),
        }
    }

    if !missing.is_empty() && gaps.insert(document_id.to_string()) {
        tracing::warn!(
            target: CATALOG_GAP_TARGET,
            catalog_gap = true,
            document_id,
            locales = %missing.join(","),
            "Document catalog has no default text"
        );
    }
    texts
}

/// Fill blank localized fields from the catalog without touching anything
/// already present. Returns the number of fields filled.
pub fn backfill_translations(
    catalog: &dyn DocumentCatalog,
    document_id: &str,
    texts: &mut Translations,
    gaps: &mut BTreeSet<String>,
) -> usize {
    if texts.incomplete_locales().is_empty() {
        return 0;
    }
    let defaults = default_translations(catalog, document_id, gaps);
    let mut filled = 0;
    for locale in Locale::ALL {
        let before = texts.get(*locale).clone();
        if texts.get_mut(*locale).backfill_from(defaults.get(*locale)) {
            let after = texts.get(*locale);
            filled += [
                before.name != after.name,
                before.description != after.description,
                before.where_to_obtain != after.where_to_obtain,
            ]
            .iter()
            .filter(|changed| **changed)
            .count();
        }
    }
    filled
}
