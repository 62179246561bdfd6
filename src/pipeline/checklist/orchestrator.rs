use std::collections::BTreeSet;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use super::assets::EngineData;
use super::correction::{accept_validated, correct_checklist};
use super::fallback::{degrade_hybrid, degrade_legacy, StaticFallbackTable, DEGRADED_NOTE};
use super::model_resolver::{ModelPurpose, ModelResolver, ResolvedModel};
use super::parser::{parse_generated_checklist, salvage_items};
use super::prompt::{
    build_hybrid_prompt, build_legacy_prompt, HYBRID_SYSTEM_PROMPT, LEGACY_SYSTEM_PROMPT,
};
use super::rules::{evaluate_rules, resolve_mode, RuleSet};
use super::types::{
    Attempt, CancelFlag, DocumentCatalog, GeneratedChecklist, GenerationClient, GenerationRequest,
    GenerationResponse, RuleSetStore,
};
use super::validation::{validate_hybrid, validate_legacy};
use super::GenerationFailure;
use crate::models::{
    BaseChecklist, ChecklistDiagnostics, ChecklistItem, ChecklistMode, ChecklistRequest,
    ChecklistSource, CountryCode, FinalChecklist, VisaType,
};

/// How often a waiting attempt re-checks cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

// ── Policy ─────────────────────────────────────────────────────

/// Bounded retry policy for the attempt controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPolicy {
    pub max_attempts: u8,
    pub per_attempt_timeout: Duration,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            per_attempt_timeout: Duration::from_secs(20),
        }
    }
}

/// Sampling parameters sent with every generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            temperature: 0.3,
        }
    }
}

/// What one request resolved to before the checklist is assembled.
struct Outcome {
    source: ChecklistSource,
    items: Vec<ChecklistItem>,
    notes: Vec<String>,
}

impl Outcome {
    fn degraded(source: ChecklistSource, items: Vec<ChecklistItem>) -> Self {
        Self {
            source,
            items,
            notes: vec![DEGRADED_NOTE.to_string()],
        }
    }
}

// ── Engine ─────────────────────────────────────────────────────

/// Checklist generation engine:
/// mode → rules → prompt → generate → extract → validate → correct | degrade
///
/// Every collaborator is injected. The engine holds no mutable state, so
/// one instance serves concurrent requests.
pub struct ChecklistEngine {
    client: Arc<dyn GenerationClient>,
    rules: Arc<dyn RuleSetStore>,
    catalog: Arc<dyn DocumentCatalog>,
    fallback: Arc<StaticFallbackTable>,
    models: ModelResolver,
    policy: AttemptPolicy,
    settings: GenerationSettings,
}

impl ChecklistEngine {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        rules: Arc<dyn RuleSetStore>,
        catalog: Arc<dyn DocumentCatalog>,
        fallback: Arc<StaticFallbackTable>,
        models: ModelResolver,
    ) -> Self {
        Self {
            client,
            rules,
            catalog,
            fallback,
            models,
            policy: AttemptPolicy::default(),
            settings: GenerationSettings::default(),
        }
    }

    /// Engine over loaded reference data.
    pub fn from_data(client: Arc<dyn GenerationClient>, data: EngineData, models: ModelResolver) -> Self {
        Self::new(
            client,
            Arc::new(data.rules),
            Arc::new(data.catalog),
            Arc::new(data.fallback),
            models,
        )
    }

    pub fn with_policy(mut self, policy: AttemptPolicy) -> Self {
        self.policy = AttemptPolicy {
            max_attempts: policy.max_attempts.max(1),
            ..policy
        };
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn policy(&self) -> AttemptPolicy {
        self.policy
    }

    pub fn rule_set_count(&self) -> usize {
        self.rules.rule_set_count()
    }

    pub fn catalog_document_count(&self) -> usize {
        self.catalog.document_count()
    }

    pub fn mode_for(&self, country: &CountryCode, visa_type: VisaType) -> ChecklistMode {
        resolve_mode(self.rules.as_ref(), country, visa_type)
    }

    /// Produce a checklist for the request. Never fails: every failure is
    /// absorbed and reported through `FinalChecklist::source`.
    pub fn generate_checklist(&self, request: &ChecklistRequest) -> FinalChecklist {
        self.generate_checklist_with_cancel(request, &CancelFlag::new())
    }

    /// Like `generate_checklist`, but stops waiting on the generation
    /// service once `cancel` is raised and completes through degradation.
    pub fn generate_checklist_with_cancel(
        &self,
        request: &ChecklistRequest,
        cancel: &CancelFlag,
    ) -> FinalChecklist {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "generate_checklist",
            request_id = %request_id,
            country = %request.country,
            visa_type = %request.visa_type,
        );
        let _guard = span.enter();

        let mut diagnostics = ChecklistDiagnostics::new(request_id);
        let rule_set = self
            .rules
            .rule_set(&request.country, request.visa_type)
            .filter(|r| !r.is_empty());
        let mode = if rule_set.is_some() {
            ChecklistMode::Hybrid
        } else {
            ChecklistMode::Legacy
        };
        tracing::debug!(mode = %mode, "Resolved checklist mode");

        let outcome = match rule_set {
            Some(rule_set) => self.run_hybrid(request, rule_set, cancel, &mut diagnostics),
            None => self.run_legacy(request, cancel, &mut diagnostics),
        };
        diagnostics.cancelled = diagnostics.cancelled || cancel.is_cancelled();

        tracing::info!(
            mode = %mode,
            source = %outcome.source,
            items = outcome.items.len(),
            attempts = diagnostics.attempts,
            catalog_gaps = diagnostics.catalog_gaps.len(),
            cancelled = diagnostics.cancelled,
            "Checklist generated"
        );

        FinalChecklist {
            country: request.country.clone(),
            visa_type: request.visa_type,
            mode,
            source: outcome.source,
            items: outcome.items,
            notes: outcome.notes,
            diagnostics,
            generated_at: Utc::now(),
        }
    }

    // ── HYBRID ─────────────────────────────────────────────────

    fn run_hybrid(
        &self,
        request: &ChecklistRequest,
        rule_set: &RuleSet,
        cancel: &CancelFlag,
        diagnostics: &mut ChecklistDiagnostics,
    ) -> Outcome {
        let base = evaluate_rules(rule_set, &request.applicant_context);

        let Some(model) = self.checklist_model(diagnostics) else {
            return self.degrade_hybrid(&base, diagnostics);
        };
        let generation = self.generation_request(
            &model,
            HYBRID_SYSTEM_PROMPT,
            build_hybrid_prompt(
                &request.country,
                request.visa_type,
                &base,
                &request.applicant_context,
            ),
        );

        let mut last_text: Option<String> = None;
        for index in 1..=self.policy.max_attempts {
            let Some(mut attempt) = self.run_attempt(index, &generation, cancel, diagnostics) else {
                break;
            };
            if let Some(text) = attempt.raw_text.take() {
                last_text = Some(text);
            }

            if let Some(failure) = &attempt.generation_error {
                if !failure.is_retryable() {
                    break;
                }
                continue;
            }

            let Some(generated) = attempt.generated.take() else {
                log_extraction_failure(&attempt);
                continue;
            };
            // Nothing in common with the base checklist: the correction
            // would be catalog text only, so the response counts as unusable.
            if !generated.items.iter().any(|item| base.contains(&item.document_id)) {
                tracing::warn!(
                    attempt = index,
                    items = generated.items.len(),
                    "Generated checklist shares no documents with base checklist"
                );
                continue;
            }
            let validation = validate_hybrid(&generated, &base);
            if validation.valid {
                tracing::debug!(attempt = index, "Generated checklist matches base checklist");
                let items = accept_validated(
                    &generated,
                    &base,
                    self.catalog.as_ref(),
                    &mut diagnostics.catalog_gaps,
                );
                return Outcome {
                    source: ChecklistSource::AiValidated,
                    items,
                    notes: generated.notes,
                };
            }

            tracing::warn!(
                attempt = index,
                missing = ?validation.missing_ids,
                extra = ?validation.extra_ids,
                mismatches = validation.field_mismatches.len(),
                duplicates = validation.duplicate_ids.len(),
                "Generated checklist disagrees with base checklist, correcting"
            );
            let (items, _) = correct_checklist(
                &generated,
                &validation,
                &base,
                self.catalog.as_ref(),
                &mut diagnostics.catalog_gaps,
            );
            return Outcome {
                source: ChecklistSource::AiCorrected,
                items,
                notes: generated.notes,
            };
        }

        if !cancel.is_cancelled() {
            if let Some(outcome) = last_text.and_then(|text| self.salvage(&text, &base, diagnostics)) {
                return outcome;
            }
        }
        self.degrade_hybrid(&base, diagnostics)
    }

    /// Partial recovery from the last response that failed extraction.
    fn salvage(
        &self,
        raw_text: &str,
        base: &BaseChecklist,
        diagnostics: &mut ChecklistDiagnostics,
    ) -> Option<Outcome> {
        let salvaged = salvage_items(raw_text);
        let matching = salvaged
            .items
            .iter()
            .filter(|item| base.contains(&item.document_id))
            .count();
        if matching == 0 {
            tracing::debug!(
                salvaged = salvaged.items.len(),
                "Nothing salvageable matches the base checklist"
            );
            return None;
        }

        tracing::info!(
            salvaged = salvaged.items.len(),
            matching,
            "Recovered partial checklist from last response"
        );
        let validation = validate_hybrid(&salvaged, base);
        let (items, _) = correct_checklist(
            &salvaged,
            &validation,
            base,
            self.catalog.as_ref(),
            &mut diagnostics.catalog_gaps,
        );
        Some(Outcome {
            source: ChecklistSource::AiCorrected,
            items,
            notes: salvaged.notes,
        })
    }

    fn degrade_hybrid(&self, base: &BaseChecklist, diagnostics: &mut ChecklistDiagnostics) -> Outcome {
        tracing::warn!(
            attempts = diagnostics.attempts,
            "Generation unavailable, degrading to rule-based checklist"
        );
        let items = degrade_hybrid(base, self.catalog.as_ref(), &mut diagnostics.catalog_gaps);
        Outcome::degraded(ChecklistSource::DegradedRules, items)
    }

    // ── LEGACY ─────────────────────────────────────────────────

    fn run_legacy(
        &self,
        request: &ChecklistRequest,
        cancel: &CancelFlag,
        diagnostics: &mut ChecklistDiagnostics,
    ) -> Outcome {
        let Some(model) = self.checklist_model(diagnostics) else {
            return self.degrade_legacy(request, diagnostics);
        };
        let generation = self.generation_request(
            &model,
            LEGACY_SYSTEM_PROMPT,
            build_legacy_prompt(&request.country, request.visa_type, &request.applicant_context),
        );

        for index in 1..=self.policy.max_attempts {
            let Some(mut attempt) = self.run_attempt(index, &generation, cancel, diagnostics) else {
                break;
            };
            if matches!(&attempt.generation_error, Some(f) if !f.is_retryable()) {
                break;
            }
            let Some(generated) = attempt.generated.take() else {
                log_extraction_failure(&attempt);
                continue;
            };

            let validation = validate_legacy(&generated);
            if validation.valid {
                return Outcome {
                    source: ChecklistSource::AiLegacy,
                    items: legacy_items(&generated),
                    notes: generated.notes,
                };
            }
            tracing::warn!(
                attempt = index,
                issues = ?validation.issues,
                "Generated legacy checklist is structurally invalid"
            );
        }

        self.degrade_legacy(request, diagnostics)
    }

    fn degrade_legacy(&self, request: &ChecklistRequest, diagnostics: &mut ChecklistDiagnostics) -> Outcome {
        tracing::warn!(
            attempts = diagnostics.attempts,
            "Generation unavailable, degrading to static checklist"
        );
        let items = degrade_legacy(
            &self.fallback,
            &request.country,
            request.visa_type,
            self.catalog.as_ref(),
            &mut diagnostics.catalog_gaps,
        );
        Outcome::degraded(ChecklistSource::StaticFallback, items)
    }

    // ── Attempts ───────────────────────────────────────────────

    fn checklist_model(&self, diagnostics: &mut ChecklistDiagnostics) -> Option<ResolvedModel> {
        match self.models.resolve(ModelPurpose::ChecklistGeneration) {
            Ok(model) => {
                diagnostics.model = Some(model.name.clone());
                Some(model.clone())
            }
            Err(e) => {
                tracing::warn!(error = %e, "No model for checklist generation, skipping attempts");
                None
            }
        }
    }

    fn generation_request(
        &self,
        model: &ResolvedModel,
        system_prompt: &str,
        user_prompt: String,
    ) -> GenerationRequest {
        GenerationRequest {
            model: model.name.clone(),
            system_prompt: system_prompt.trim().to_string(),
            user_prompt,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            timeout: self.policy.per_attempt_timeout,
        }
    }

    /// One generate + extract round. `None` when the request was cancelled
    /// before the attempt could start.
    fn run_attempt(
        &self,
        index: u8,
        request: &GenerationRequest,
        cancel: &CancelFlag,
        diagnostics: &mut ChecklistDiagnostics,
    ) -> Option<Attempt> {
        if cancel.is_cancelled() {
            diagnostics.cancelled = true;
            return None;
        }

        diagnostics.attempts = index;
        let mut attempt = Attempt::new(index);
        let response = match self.call_with_deadline(request, cancel) {
            Ok(response) => response,
            Err(failure) => {
                if failure == GenerationFailure::Cancelled {
                    diagnostics.cancelled = true;
                }
                tracing::warn!(
                    attempt = index,
                    max_attempts = self.policy.max_attempts,
                    retryable = failure.is_retryable(),
                    error = %failure,
                    "Generation attempt failed"
                );
                attempt.generation_error = Some(failure);
                return Some(attempt);
            }
        };

        diagnostics.token_usage.add(&response.usage);
        if response.is_truncated() {
            tracing::warn!(attempt = index, "Generation stopped at the token limit, response truncated");
        }
        tracing::debug!(
            attempt = index,
            elapsed_ms = response.elapsed_ms,
            total_tokens = response.usage.total_tokens,
            raw = %response.text,
            "Generation attempt returned"
        );

        match parse_generated_checklist(&response.text) {
            Ok(generated) => attempt.generated = Some(generated),
            Err(failure) => attempt.extraction_error = Some(failure),
        }
        attempt.raw_text = Some(response.text);
        Some(attempt)
    }

    /// Run the blocking client call on a worker thread and wait for it
    /// under the hard per-attempt deadline. A worker that outlives the
    /// deadline is abandoned; its result is discarded.
    fn call_with_deadline(
        &self,
        request: &GenerationRequest,
        cancel: &CancelFlag,
    ) -> Result<GenerationResponse, GenerationFailure> {
        let (tx, rx) = mpsc::channel();
        let client = Arc::clone(&self.client);
        let owned = request.clone();
        thread::Builder::new()
            .name("checklist-generation".into())
            .spawn(move || {
                let _ = tx.send(client.generate(&owned));
            })
            .map_err(|e| GenerationFailure::Transport(format!("failed to start generation worker: {e}")))?;

        let deadline = Instant::now() + request.timeout;
        loop {
            if cancel.is_cancelled() {
                return Err(GenerationFailure::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(GenerationFailure::Timeout(request.timeout.as_millis() as u64));
            }
            match rx.recv_timeout((deadline - now).min(CANCEL_POLL_INTERVAL)) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(GenerationFailure::Transport(
                        "generation worker exited without a result".into(),
                    ))
                }
            }
        }
    }
}

fn log_extraction_failure(attempt: &Attempt) {
    if let Some(failure) = &attempt.extraction_error {
        tracing::warn!(
            attempt = attempt.index,
            kind = %failure.kind,
            "Could not extract checklist from response"
        );
    }
}

/// Materialize a validated LEGACY response. Ids are kept as generated.
fn legacy_items(generated: &GeneratedChecklist) -> Vec<ChecklistItem> {
    let mut seen = BTreeSet::new();
    generated
        .items
        .iter()
        .filter(|item| seen.insert(item.document_id.trim().to_string()))
        .filter_map(|item| {
            let category = item.parsed_category()?;
            Some(ChecklistItem::new(
                item.document_id.trim(),
                category,
                item.effective_required().unwrap_or(false),
                item.parsed_priority()
                    .unwrap_or_else(|| category.default_priority()),
                item.texts.clone(),
            ))
        })
        .collect()
}
