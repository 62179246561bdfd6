use std::collections::{BTreeSet, HashSet};

use super::catalog::{backfill_translations, default_translations};
use super::types::{DocumentCatalog, GeneratedChecklist, ValidationResult};
use crate::models::{BaseChecklist, ChecklistItem};

/// Counts describing what the corrector changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrectionSummary {
    pub dropped: usize,
    pub synthesized: usize,
    pub overwritten: usize,
    pub backfilled_fields: usize,
}

/// Repair an invalid HYBRID response using the base checklist as truth.
///
/// Extra ids are dropped, missing ids are synthesized from catalog text,
/// and mismatched items take the canonical category/required while
/// keeping their generated text. Output follows base checklist order and
/// is valid by construction.
pub fn correct_checklist(
    generated: &GeneratedChecklist,
    validation: &ValidationResult,
    base: &BaseChecklist,
    catalog: &dyn DocumentCatalog,
    gaps: &mut BTreeSet<String>,
) -> (Vec<ChecklistItem>, CorrectionSummary) {
    let mismatched: HashSet<&str> = validation
        .field_mismatches
        .iter()
        .map(|m| m.document_id.as_str())
        .collect();

    let (items, mut summary) = merge_with_base(generated, base, &mismatched, catalog, gaps);
    summary.dropped = validation.extra_ids.len()
        + validation.duplicate_ids.len();

    tracing::info!(
        dropped = summary.dropped,
        synthesized = summary.synthesized,
        overwritten = summary.overwritten,
        backfilled = summary.backfilled_fields,
        "Corrected generated checklist against base checklist"
    );
    (items, summary)
}

/// Materialize a validated HYBRID response: base order, generated text,
/// blanks backfilled from the catalog.
pub fn accept_validated(
    generated: &GeneratedChecklist,
    base: &BaseChecklist,
    catalog: &dyn DocumentCatalog,
    gaps: &mut BTreeSet<String>,
) -> Vec<ChecklistItem> {
    merge_with_base(generated, base, &HashSet::new(), catalog, gaps).0
}

fn merge_with_base(
    generated: &GeneratedChecklist,
    base: &BaseChecklist,
    mismatched: &HashSet<&str>,
    catalog: &dyn DocumentCatalog,
    gaps: &mut BTreeSet<String>,
) -> (Vec<ChecklistItem>, CorrectionSummary) {
    let mut summary = CorrectionSummary::default();
    let mut items = Vec::with_capacity(base.len());

    for entry in base.entries() {
        let item = match generated.get(&entry.document_id) {
            Some(found) => {
                let overwrite = mismatched.contains(entry.document_id.as_str());
                let priority = if overwrite {
                    summary.overwritten += 1;
                    entry.category.default_priority()
                } else {
                    found
                        .parsed_priority()
                        .unwrap_or_else(|| entry.category.default_priority())
                };
                let mut texts = found.texts.clone();
                summary.backfilled_fields +=
                    backfill_translations(catalog, &entry.document_id, &mut texts, gaps);
                ChecklistItem::new(&entry.document_id, entry.category, entry.required, priority, texts)
            }
            None => {
                summary.synthesized += 1;
                ChecklistItem::new(
                    &entry.document_id,
                    entry.category,
                    entry.required,
                    entry.category.default_priority(),
                    default_translations(catalog, &entry.document_id, gaps),
                )
            }
        };
        items.push(item);
    }

    (items, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::models::{
        BaseChecklistEntry, DocumentCategory, DocumentText, Priority, Translations,
    };
    use crate::pipeline::checklist::catalog::InMemoryCatalog;
    use crate::pipeline::checklist::types::GeneratedItem;
    use crate::pipeline::checklist::validation::validate_hybrid;

    fn base() -> BaseChecklist {
        BaseChecklist::from_entries(vec![
            BaseChecklistEntry {
                document_id: "passport".into(),
                category: DocumentCategory::Required,
                required: true,
            },
            BaseChecklistEntry {
                document_id: "i20".into(),
                category: DocumentCategory::Required,
                required: true,
            },
            BaseChecklistEntry {
                document_id: "sevis_fee".into(),
                category: DocumentCategory::Required,
                required: true,
            },
        ])
    }

    fn catalog() -> InMemoryCatalog {
        let mut docs = BTreeMap::new();
        for (id, name) in [("passport", "Passport"), ("i20", "Form I-20"), ("sevis_fee", "SEVIS fee receipt")] {
            let text = DocumentText::new(name, &format!("{name} description"), "Official source");
            docs.insert(
                id.to_string(),
                Translations { en: text.clone(), ru: text.clone(), uz: text },
            );
        }
        InMemoryCatalog::new(docs)
    }

    fn ai_item(id: &str, category: &str, name: &str) -> GeneratedItem {
        GeneratedItem {
            document_id: id.into(),
            category: Some(category.into()),
            required: None,
            priority: Some("low".into()),
            texts: Translations {
                en: DocumentText::new(name, "AI description", "AI source"),
                ..Default::default()
            },
        }
    }

    fn ids(items: &[ChecklistItem]) -> Vec<&str> {
        items.iter().map(|i| i.document_id.as_str()).collect()
    }

    #[test]
    fn hallucinated_item_dropped() {
        let generated = GeneratedChecklist {
            items: vec![
                ai_item("passport", "required", "Passport (AI)"),
                ai_item("i20", "required", "I-20 (AI)"),
                ai_item("sevis_fee", "required", "SEVIS (AI)"),
                ai_item("selfie", "optional", "Selfie"),
            ],
            notes: vec![],
        };
        let validation = validate_hybrid(&generated, &base());
        let mut gaps = BTreeSet::new();
        let (items, summary) = correct_checklist(&generated, &validation, &base(), &catalog(), &mut gaps);

        assert_eq!(ids(&items), vec!["passport", "i20", "sevis_fee"]);
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.synthesized, 0);
        assert_eq!(items[0].texts.en.name, "Passport (AI)");
        assert!(gaps.is_empty());
    }

    #[test]
    fn missing_item_synthesized_from_catalog() {
        let generated = GeneratedChecklist {
            items: vec![ai_item("passport", "required", "Passport (AI)")],
            notes: vec![],
        };
        let validation = validate_hybrid(&generated, &base());
        let mut gaps = BTreeSet::new();
        let (items, summary) = correct_checklist(&generated, &validation, &base(), &catalog(), &mut gaps);

        assert_eq!(ids(&items), vec!["passport", "i20", "sevis_fee"]);
        assert_eq!(summary.synthesized, 2);
        assert_eq!(items[1].texts.ru.name, "Form I-20");
        assert_eq!(items[1].priority, Priority::High);
    }

    #[test]
    fn mismatch_keeps_ai_text_with_canonical_fields() {
        let generated = GeneratedChecklist {
            items: vec![
                ai_item("passport", "optional", "Passport (AI)"),
                ai_item("i20", "required", "I-20 (AI)"),
                ai_item("sevis_fee", "required", "SEVIS (AI)"),
            ],
            notes: vec![],
        };
        let validation = validate_hybrid(&generated, &base());
        let mut gaps = BTreeSet::new();
        let (items, summary) = correct_checklist(&generated, &validation, &base(), &catalog(), &mut gaps);

        assert_eq!(summary.overwritten, 1);
        let passport = &items[0];
        assert_eq!(passport.category, DocumentCategory::Required);
        assert!(passport.required);
        assert_eq!(passport.priority, Priority::High);
        assert_eq!(passport.texts.en.name, "Passport (AI)");
        assert_eq!(passport.texts.en.description, "AI description");
        // untouched items keep their generated priority
        assert_eq!(items[1].priority, Priority::Low);
    }

    #[test]
    fn corrected_output_revalidates() {
        let generated = GeneratedChecklist {
            items: vec![
                ai_item("passport", "optional", "Passport"),
                ai_item("passport", "required", "Passport again"),
                ai_item("selfie", "optional", "Selfie"),
                ai_item("", "required", "nameless"),
            ],
            notes: vec![],
        };
        let validation = validate_hybrid(&generated, &base());
        let mut gaps = BTreeSet::new();
        let (items, _) = correct_checklist(&generated, &validation, &base(), &catalog(), &mut gaps);

        let regenerated = GeneratedChecklist {
            items: items
                .iter()
                .map(|i| GeneratedItem {
                    document_id: i.document_id.clone(),
                    category: Some(i.category.to_string()),
                    required: Some(i.required),
                    priority: Some(i.priority.to_string()),
                    texts: i.texts.clone(),
                })
                .collect(),
            notes: vec![],
        };
        assert!(validate_hybrid(&regenerated, &base()).valid);
    }

    #[test]
    fn blank_text_backfilled_on_accept() {
        let mut passport = ai_item("passport", "required", "");
        passport.texts.en.description = String::new();
        let generated = GeneratedChecklist {
            items: vec![
                passport,
                ai_item("i20", "required", "I-20"),
                ai_item("sevis_fee", "required", "SEVIS"),
            ],
            notes: vec![],
        };
        let mut gaps = BTreeSet::new();
        let items = accept_validated(&generated, &base(), &catalog(), &mut gaps);
        assert_eq!(items[0].texts.en.name, "Passport");
        assert_eq!(items[0].texts.en.where_to_obtain, "AI source");
        assert_eq!(items[0].texts.uz.name, "Passport");
        assert_eq!(items[1].texts.en.name, "I-20");
    }

    #[test]
    fn catalog_gap_recorded_for_synthesized_item() {
        let generated = GeneratedChecklist::default();
        let validation = validate_hybrid(&generated, &base());
        let empty = InMemoryCatalog::default();
        let mut gaps = BTreeSet::new();
        let (items, _) = correct_checklist(&generated, &validation, &base(), &empty, &mut gaps);
        assert_eq!(items.len(), 3);
        assert_eq!(gaps.len(), 3);
        assert_eq!(items[2].texts.en.name, "");
    }
}
