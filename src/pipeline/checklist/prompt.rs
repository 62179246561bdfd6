use super::sanitize::render_applicant_context;
use crate::models::{ApplicantContext, BaseChecklist, CountryCode, VisaType};

pub const HYBRID_SYSTEM_PROMPT: &str = r#"
You are a visa document assistant. You write clear, practical descriptions for
a document checklist that has ALREADY been decided by official rules.

RULES (ABSOLUTE, NO EXCEPTIONS):
1. Return EXACTLY the documents you are given. Never add a document. Never remove one.
2. Copy "documentId", "category" and "required" verbatim for every document.
3. Only write the text fields: name, description and whereToObtain.
4. Write every text field in English (en), Russian (ru) and Uzbek Latin (uz).
5. Use the applicant context only to make descriptions specific to this applicant.
6. Respond with JSON only. No prose before or after it.
"#;

pub const LEGACY_SYSTEM_PROMPT: &str = r#"
You are a visa document assistant. You decide which documents an applicant must
prepare for a visa application, based on the destination country, the visa type
and the applicant context.

RULES (ABSOLUTE, NO EXCEPTIONS):
1. Include only documents that consulates actually request for this visa type.
2. Give every document a unique snake_case "documentId".
3. "category" is one of: required, highly_recommended, optional.
4. "required" MUST be true when the category is "required".
5. Write every text field in English (en), Russian (ru) and Uzbek Latin (uz).
6. Respond with JSON only. No prose before or after it.
"#;

const OUTPUT_TEMPLATE: &str = r#"```json
{
  "checklist": [
    {
      "documentId": "passport",
      "category": "required | highly_recommended | optional",
      "required": true,
      "priority": "high | medium | low",
      "en": {"name": "...", "description": "...", "whereToObtain": "..."},
      "ru": {"name": "...", "description": "...", "whereToObtain": "..."},
      "uz": {"name": "...", "description": "...", "whereToObtain": "..."}
    }
  ],
  "notes": ["general advice for this applicant"]
}
```"#;

/// User prompt for HYBRID mode: the base checklist is fixed, the service
/// only enriches text.
pub fn build_hybrid_prompt(
    country: &CountryCode,
    visa_type: VisaType,
    base: &BaseChecklist,
    ctx: &ApplicantContext,
) -> String {
    let documents = serde_json::to_string_pretty(base.entries()).unwrap_or_default();
    let context = render_applicant_context(ctx);

    format!(
        r#"Destination country: {country}
Visa type: {visa_type}

<documents>
{documents}
</documents>

<applicant_context>
{context}
</applicant_context>

Write the localized text for EACH of the {count} documents above, keeping
documentId, category and required unchanged. Output this JSON structure:

{OUTPUT_TEMPLATE}"#,
        count = base.len(),
    )
}

/// User prompt for LEGACY mode: the service decides the full checklist.
pub fn build_legacy_prompt(country: &CountryCode, visa_type: VisaType, ctx: &ApplicantContext) -> String {
    let context = render_applicant_context(ctx);

    format!(
        r#"Destination country: {country}
Visa type: {visa_type}

<applicant_context>
{context}
</applicant_context>

Create a FULL, precise document checklist for this applicant. Use age,
citizenship, finances, sponsorship, ties to the home country and travel
history from the context. Include required, highly recommended and
country-specific documents. Output this JSON structure:

{OUTPUT_TEMPLATE}"#
    )
}
