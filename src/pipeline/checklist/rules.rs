use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::RuleSetStore;
use super::DataError;
use crate::models::{
    ApplicantContext, BaseChecklist, BaseChecklistEntry, ChecklistMode, CountryCode,
    DocumentCategory, VisaType,
};

/// Trigger predicate over questionnaire answers addressed by dotted paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Equals { path: String, value: Value },
    NotEquals { path: String, value: Value },
    In { path: String, values: Vec<Value> },
    IsTrue { path: String },
    Exists { path: String },
    AtLeast { path: String, value: f64 },
    AtMost { path: String, value: f64 },
    All { conditions: Vec<Condition> },
    Any { conditions: Vec<Condition> },
    Not { condition: Box<Condition> },
}

impl Condition {
    /// Evaluate against the applicant's answers. A missing path is false.
    pub fn matches(&self, ctx: &ApplicantContext) -> bool {
        match self {
            Self::Equals { path, value } => ctx.answer(path).is_some_and(|a| values_equal(a, value)),
            Self::NotEquals { path, value } => {
                ctx.answer(path).is_some_and(|a| !values_equal(a, value))
            }
            Self::In { path, values } => ctx
                .answer(path)
                .is_some_and(|a| values.iter().any(|v| values_equal(a, v))),
            Self::IsTrue { path } => ctx.answer(path).is_some_and(is_truthy),
            Self::Exists { path } => ctx.answer(path).is_some_and(|a| !a.is_null()),
            Self::AtLeast { path, value } => ctx
                .answer(path)
                .and_then(as_number)
                .is_some_and(|n| n >= *value),
            Self::AtMost { path, value } => ctx
                .answer(path)
                .and_then(as_number)
                .is_some_and(|n| n <= *value),
            Self::All { conditions } => conditions.iter().all(|c| c.matches(ctx)),
            Self::Any { conditions } => conditions.iter().any(|c| c.matches(ctx)),
            Self::Not { condition } => !condition.matches(ctx),
        }
    }
}

/// Strings compare case-insensitively, numbers numerically.
fn values_equal(answer: &Value, expected: &Value) -> bool {
    match (answer, expected) {
        (Value::String(a), Value::String(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
        (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::Number(_)) => {
            match (as_number(answer), as_number(expected)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        (Value::String(s), Value::Bool(b)) => parse_bool(s) == Some(*b),
        _ => answer == expected,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => parse_bool(s) == Some(true),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// A document a rule contributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDocument {
    pub document_id: String,
    pub category: DocumentCategory,
    #[serde(default)]
    pub required: bool,
}

impl RuleDocument {
    fn to_entry(&self) -> BaseChecklistEntry {
        BaseChecklistEntry {
            document_id: self.document_id.clone(),
            category: self.category,
            required: self.required || self.category.implies_required(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalDocument {
    #[serde(flatten)]
    pub document: RuleDocument,
    pub when: Condition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskDocument {
    #[serde(flatten)]
    pub document: RuleDocument,
    pub min_risk_score: f64,
}

/// Deterministic document rules for one (country, visa type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    pub country: CountryCode,
    pub visa_type: VisaType,
    pub base_documents: Vec<RuleDocument>,
    #[serde(default)]
    pub conditional_documents: Vec<ConditionalDocument>,
    #[serde(default)]
    pub risk_documents: Vec<RiskDocument>,
}

impl RuleSet {
    pub fn is_empty(&self) -> bool {
        self.base_documents.is_empty()
    }

    /// Every document id any rule of this set can emit.
    pub fn referenced_document_ids(&self) -> BTreeSet<String> {
        self.base_documents
            .iter()
            .chain(self.conditional_documents.iter().map(|c| &c.document))
            .chain(self.risk_documents.iter().map(|r| &r.document))
            .map(|d| d.document_id.clone())
            .collect()
    }

    pub fn validate(&self) -> Result<(), DataError> {
        let invalid = |reason: String| DataError::InvalidRuleSet {
            country: self.country.to_string(),
            visa_type: self.visa_type.to_string(),
            reason,
        };

        let all_docs = self
            .base_documents
            .iter()
            .chain(self.conditional_documents.iter().map(|c| &c.document))
            .chain(self.risk_documents.iter().map(|r| &r.document));
        for doc in all_docs {
            if doc.document_id.trim().is_empty() {
                return Err(invalid("empty documentId".into()));
            }
        }
        for risk in &self.risk_documents {
            if !risk.min_risk_score.is_finite() {
                return Err(invalid(format!(
                    "minRiskScore for {} is not a finite number",
                    risk.document.document_id
                )));
            }
        }
        Ok(())
    }
}

/// Compute the canonical base checklist: base documents, then matching
/// conditional documents, then risk documents whose threshold is met.
///
/// Duplicates keep their first position and the strongest category;
/// `required` is OR-ed and re-normalized against the category.
pub fn evaluate_rules(rule_set: &RuleSet, ctx: &ApplicantContext) -> BaseChecklist {
    let mut entries: Vec<BaseChecklistEntry> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    let mut push = |doc: &RuleDocument| {
        let entry = doc.to_entry();
        match positions.get(&entry.document_id) {
            Some(&pos) => {
                let existing = &mut entries[pos];
                if entry.category.rank() > existing.category.rank() {
                    existing.category = entry.category;
                }
                existing.required = existing.required
                    || entry.required
                    || existing.category.implies_required();
            }
            None => {
                positions.insert(entry.document_id.clone(), entries.len());
                entries.push(entry);
            }
        }
    };

    for doc in &rule_set.base_documents {
        push(doc);
    }

    let mut conditional_hits = 0usize;
    for cond in &rule_set.conditional_documents {
        if cond.when.matches(ctx) {
            conditional_hits += 1;
            push(&cond.document);
        }
    }

    let mut risk_hits = 0usize;
    if let Some(score) = ctx.risk_score.filter(|s| !s.is_nan()) {
        for risk in &rule_set.risk_documents {
            if score >= risk.min_risk_score {
                risk_hits += 1;
                push(&risk.document);
            }
        }
    }

    tracing::debug!(
        country = %rule_set.country,
        visa_type = %rule_set.visa_type,
        base = rule_set.base_documents.len(),
        conditional_hits,
        risk_hits,
        total = entries.len(),
        "Rule evaluation complete"
    );

    BaseChecklist::from_entries(entries)
}

/// HYBRID when a non-empty rule set exists, else LEGACY.
pub fn resolve_mode(store: &dyn RuleSetStore, country: &CountryCode, visa_type: VisaType) -> ChecklistMode {
    match store.rule_set(country, visa_type) {
        Some(rule_set) if !rule_set.is_empty() => ChecklistMode::Hybrid,
        _ => ChecklistMode::Legacy,
    }
}

/// Rule sets keyed by (country, visa type), immutable after load.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRuleSetStore {
    rule_sets: HashMap<(CountryCode, VisaType), RuleSet>,
}

impl InMemoryRuleSetStore {
    pub fn new(rule_sets: Vec<RuleSet>) -> Result<Self, DataError> {
        let mut map = HashMap::with_capacity(rule_sets.len());
        for rule_set in rule_sets {
            rule_set.validate()?;
            let key = (rule_set.country.clone(), rule_set.visa_type);
            if map.contains_key(&key) {
                return Err(DataError::InvalidRuleSet {
                    country: rule_set.country.to_string(),
                    visa_type: rule_set.visa_type.to_string(),
                    reason: "duplicate rule set".into(),
                });
            }
            map.insert(key, rule_set);
        }
        Ok(Self { rule_sets: map })
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuleSet> {
        self.rule_sets.values()
    }
}

impl RuleSetStore for InMemoryRuleSetStore {
    fn rule_set(&self, country: &CountryCode, visa_type: VisaType) -> Option<&RuleSet> {
        self.rule_sets.get(&(country.clone(), visa_type))
    }

    fn rule_set_count(&self) -> usize {
        self.rule_sets.len()
    }
}
