// Validation of generated checklists. HYBRID responses are checked against
// the canonical base checklist; LEGACY responses only structurally.
// Localized text is never canonical and is not compared.

use std::collections::{BTreeSet, HashSet};

use super::types::{FieldMismatch, GeneratedChecklist, ValidationResult};
use crate::models::BaseChecklist;

/// Ids that occur more than once, in sorted order.
fn duplicate_ids(generated: &GeneratedChecklist) -> BTreeSet<String> {
    let mut seen = HashSet::new();
    generated
        .items
        .iter()
        .filter(|i| !seen.insert(i.document_id.as_str()))
        .map(|i| i.document_id.clone())
        .collect()
}

/// Compare a generated checklist with the canonical base checklist.
///
/// `missingIds = base − generated`, `extraIds = generated − base`, and
/// field mismatches on `category`/`required` for ids in both. Duplicated
/// ids also make the result invalid.
pub fn validate_hybrid(generated: &GeneratedChecklist, base: &BaseChecklist) -> ValidationResult {
    let generated_ids = generated.ids();
    let base_ids = base.ids();

    let missing_ids: BTreeSet<String> = base_ids.difference(&generated_ids).cloned().collect();
    let extra_ids: BTreeSet<String> = generated_ids.difference(&base_ids).cloned().collect();

    let mut field_mismatches = Vec::new();
    for entry in base.entries() {
        let Some(item) = generated.get(&entry.document_id) else {
            continue;
        };

        let category = item.parsed_category();
        if category != Some(entry.category) {
            field_mismatches.push(FieldMismatch {
                document_id: entry.document_id.clone(),
                field: "category".into(),
                expected: entry.category.to_string(),
                found: item.category.clone().unwrap_or_else(|| "<missing>".into()),
            });
        }

        let required = item.effective_required();
        if required != Some(entry.required) {
            field_mismatches.push(FieldMismatch {
                document_id: entry.document_id.clone(),
                field: "required".into(),
                expected: entry.required.to_string(),
                found: required.map_or_else(|| "<missing>".into(), |r| r.to_string()),
            });
        }
    }

    let duplicate_ids = duplicate_ids(generated);
    let valid = missing_ids.is_empty()
        && extra_ids.is_empty()
        && field_mismatches.is_empty()
        && duplicate_ids.is_empty();

    if !valid {
        tracing::debug!(
            missing = missing_ids.len(),
            extra = extra_ids.len(),
            mismatches = field_mismatches.len(),
            duplicates = duplicate_ids.len(),
            "Generated checklist disagrees with base checklist"
        );
    }

    ValidationResult {
        valid,
        missing_ids,
        extra_ids,
        field_mismatches,
        duplicate_ids,
        issues: Vec::new(),
    }
}

/// Structural validation when no canonical truth exists.
///
/// Every item needs a non-empty id, a known category, a `required` flag
/// consistent with the category and text in at least one locale. The list
/// must be non-empty and duplicate-free.
pub fn validate_legacy(generated: &GeneratedChecklist) -> ValidationResult {
    let mut issues = Vec::new();

    if generated.items.is_empty() {
        issues.push("Checklist has no items".to_string());
    }

    for (idx, item) in generated.items.iter().enumerate() {
        let label = if item.document_id.is_empty() {
            format!("item #{idx}")
        } else {
            item.document_id.clone()
        };

        if item.document_id.trim().is_empty() {
            issues.push(format!("{label}: empty documentId"));
        }
        match item.parsed_category() {
            None => issues.push(format!(
                "{label}: unknown category {:?}",
                item.category.as_deref().unwrap_or("")
            )),
            Some(category) => {
                if category.implies_required() && item.required == Some(false) {
                    issues.push(format!("{label}: required category but required=false"));
                }
            }
        }
        if !item.texts.has_any_populated() {
            issues.push(format!("{label}: no localized name or description"));
        }
    }

    let duplicate_ids = duplicate_ids(generated);
    let valid = issues.is_empty() && duplicate_ids.is_empty();

    if !valid {
        tracing::debug!(
            issues = issues.len(),
            duplicates = duplicate_ids.len(),
            "Legacy checklist failed structural validation"
        );
    }

    ValidationResult {
        valid,
        duplicate_ids,
        issues,
        ..ValidationResult::default()
    }
}
