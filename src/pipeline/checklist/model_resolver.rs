//! Model resolution: which model identifier each kind of generation uses.
//!
//! Resolution order is override, primary default, secondary default. For
//! checklist generation a candidate below `ModelClass::Advanced` is skipped
//! with a warning; only conversational use may fall through to the
//! lightweight conversation fallback. Resolved once at construction and
//! read-only afterwards.

use serde::Serialize;
use thiserror::Error;

// ── Enums ──────────────────────────────────────────────────────

/// Capability class inferred from the model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelClass {
    Lightweight,
    Standard,
    Advanced,
}

/// What the model is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelPurpose {
    ChecklistGeneration,
    Conversation,
}

impl ModelPurpose {
    /// Lowest class this purpose accepts.
    pub fn minimum_class(&self) -> ModelClass {
        match self {
            Self::ChecklistGeneration => ModelClass::Advanced,
            Self::Conversation => ModelClass::Lightweight,
        }
    }
}

/// Which configuration slot the model came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    Override,
    Primary,
    Secondary,
    ConversationFallback,
}

// ── Data Structures ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedModel {
    pub name: String,
    pub class: ModelClass,
    pub source: ModelSource,
}

/// Configured model identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCandidates {
    pub override_model: Option<String>,
    pub primary: String,
    pub secondary: String,
    pub conversation_fallback: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelResolutionError {
    #[error("No configured model is eligible for {purpose:?} (minimum class {minimum:?})")]
    NoEligibleModel {
        purpose: ModelPurpose,
        minimum: ModelClass,
    },
}

// ── Classification (pure) ──────────────────────────────────────

/// Prefixes of models trusted to decide document checklists.
const ADVANCED_MODEL_PREFIXES: &[&str] = &[
    "gpt-4",
    "gpt-5",
    "o1",
    "o3",
    "o4",
    "deepseek-r1",
    "deepseek-v3",
    "claude",
];

/// Prefixes of small or legacy models.
const LIGHTWEIGHT_MODEL_PREFIXES: &[&str] = &["gpt-3.5", "gpt-3", "babbage", "davinci", "ada"];

/// Name component used for classification: namespace and tag stripped,
/// lower-cased. `deepseek-ai/DeepSeek-R1:latest` → `deepseek-r1`.
pub fn extract_model_component(full_name: &str) -> String {
    let without_tag = full_name.split(':').next().unwrap_or(full_name);
    let model_part = without_tag.rsplit('/').next().unwrap_or(without_tag);
    model_part.trim().to_lowercase()
}

/// Classify a model name by curated prefix lists. `-mini`/`-nano`
/// variants are lightweight whatever their family.
pub fn classify_model(model_name: &str) -> ModelClass {
    let component = extract_model_component(model_name);
    if component.contains("-mini") || component.contains("-nano") {
        return ModelClass::Lightweight;
    }
    if LIGHTWEIGHT_MODEL_PREFIXES.iter().any(|p| component.starts_with(p)) {
        return ModelClass::Lightweight;
    }
    if ADVANCED_MODEL_PREFIXES.iter().any(|p| component.starts_with(p)) {
        return ModelClass::Advanced;
    }
    ModelClass::Standard
}

// ── Resolver ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ModelResolver {
    checklist: Result<ResolvedModel, ModelResolutionError>,
    conversation: Result<ResolvedModel, ModelResolutionError>,
}

impl ModelResolver {
    pub fn new(candidates: &ModelCandidates) -> Self {
        Self {
            checklist: resolve_for(candidates, ModelPurpose::ChecklistGeneration),
            conversation: resolve_for(candidates, ModelPurpose::Conversation),
        }
    }

    pub fn resolve(&self, purpose: ModelPurpose) -> Result<&ResolvedModel, ModelResolutionError> {
        let resolved = match purpose {
            ModelPurpose::ChecklistGeneration => &self.checklist,
            ModelPurpose::Conversation => &self.conversation,
        };
        resolved.as_ref().map_err(|e| e.clone())
    }
}

fn resolve_for(
    candidates: &ModelCandidates,
    purpose: ModelPurpose,
) -> Result<ResolvedModel, ModelResolutionError> {
    let minimum = purpose.minimum_class();

    let mut chain: Vec<(&str, ModelSource)> = Vec::new();
    if let Some(name) = candidates.override_model.as_deref() {
        chain.push((name, ModelSource::Override));
    }
    chain.push((candidates.primary.as_str(), ModelSource::Primary));
    chain.push((candidates.secondary.as_str(), ModelSource::Secondary));
    if purpose == ModelPurpose::Conversation {
        chain.push((candidates.conversation_fallback.as_str(), ModelSource::ConversationFallback));
    }

    for (name, source) in chain {
        if name.trim().is_empty() {
            continue;
        }
        let class = classify_model(name);
        if class < minimum {
            tracing::warn!(
                model = name,
                source = ?source,
                class = ?class,
                purpose = ?purpose,
                "Configured model is below the required class, skipping"
            );
            continue;
        }
        return Ok(ResolvedModel {
            name: name.trim().to_string(),
            class,
            source,
        });
    }

    tracing::error!(purpose = ?purpose, "No eligible model configured");
    Err(ModelResolutionError::NoEligibleModel { purpose, minimum })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(override_model: Option<&str>, primary: &str, secondary: &str) -> ModelCandidates {
        ModelCandidates {
            override_model: override_model.map(String::from),
            primary: primary.into(),
            secondary: secondary.into(),
            conversation_fallback: "gpt-3.5-turbo".into(),
        }
    }

    mod classify {
        use super::*;

        #[test]
        fn gpt4_family_is_advanced() {
            assert_eq!(classify_model("gpt-4"), ModelClass::Advanced);
            assert_eq!(classify_model("gpt-4-turbo"), ModelClass::Advanced);
            assert_eq!(classify_model("GPT-4o"), ModelClass::Advanced);
        }

        #[test]
        fn mini_variants_are_lightweight() {
            assert_eq!(classify_model("gpt-4o-mini"), ModelClass::Lightweight);
            assert_eq!(classify_model("gpt-4.1-nano"), ModelClass::Lightweight);
            assert_eq!(classify_model("gpt-3.5-turbo"), ModelClass::Lightweight);
        }

        #[test]
        fn namespaced_reasoning_model_is_advanced() {
            assert_eq!(classify_model("deepseek-ai/DeepSeek-R1"), ModelClass::Advanced);
            assert_eq!(extract_model_component("deepseek-ai/DeepSeek-R1:latest"), "deepseek-r1");
        }

        #[test]
        fn unknown_model_is_standard() {
            assert_eq!(classify_model("mistral-large"), ModelClass::Standard);
            assert_eq!(classify_model(""), ModelClass::Standard);
        }
    }

    #[test]
    fn override_wins_when_eligible() {
        let resolver = ModelResolver::new(&candidates(Some("gpt-4.1"), "gpt-4o", "gpt-4-turbo"));
        let model = resolver.resolve(ModelPurpose::ChecklistGeneration).unwrap();
        assert_eq!(model.name, "gpt-4.1");
        assert_eq!(model.source, ModelSource::Override);
    }

    #[test]
    fn lightweight_override_skipped_for_checklists() {
        let resolver = ModelResolver::new(&candidates(Some("gpt-3.5-turbo"), "gpt-4o", "gpt-4-turbo"));
        let model = resolver.resolve(ModelPurpose::ChecklistGeneration).unwrap();
        assert_eq!(model.name, "gpt-4o");
        assert_eq!(model.source, ModelSource::Primary);

        let chat = resolver.resolve(ModelPurpose::Conversation).unwrap();
        assert_eq!(chat.name, "gpt-3.5-turbo");
        assert_eq!(chat.source, ModelSource::Override);
    }

    #[test]
    fn secondary_used_when_primary_ineligible() {
        let resolver = ModelResolver::new(&candidates(None, "gpt-4o-mini", "gpt-4-turbo"));
        let model = resolver.resolve(ModelPurpose::ChecklistGeneration).unwrap();
        assert_eq!(model.source, ModelSource::Secondary);
    }

    #[test]
    fn checklists_never_fall_back_to_conversation_model() {
        let resolver = ModelResolver::new(&candidates(None, "gpt-4o-mini", "gpt-3.5-turbo"));
        let err = resolver.resolve(ModelPurpose::ChecklistGeneration).unwrap_err();
        assert_eq!(
            err,
            ModelResolutionError::NoEligibleModel {
                purpose: ModelPurpose::ChecklistGeneration,
                minimum: ModelClass::Advanced,
            }
        );
        let chat = resolver.resolve(ModelPurpose::Conversation).unwrap();
        assert_eq!(chat.name, "gpt-4o-mini");
        assert_eq!(chat.source, ModelSource::Primary);
    }

    #[test]
    fn conversation_fallback_reached_last() {
        let resolver = ModelResolver::new(&candidates(None, "", " "));
        let chat = resolver.resolve(ModelPurpose::Conversation).unwrap();
        assert_eq!(chat.source, ModelSource::ConversationFallback);
    }
}
