use serde::{Deserialize, Serialize};

use super::ModelError;

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(DocumentCategory {
    Required => "required",
    HighlyRecommended => "highly_recommended",
    Optional => "optional",
});

str_enum!(Priority {
    High => "high",
    Medium => "medium",
    Low => "low",
});

str_enum!(VisaType {
    Tourist => "tourist",
    Student => "student",
});

str_enum!(Locale {
    En => "en",
    Ru => "ru",
    Uz => "uz",
});

str_enum!(ChecklistMode {
    Hybrid => "hybrid",
    Legacy => "legacy",
});

str_enum!(ChecklistSource {
    AiValidated => "ai_validated",
    AiCorrected => "ai_corrected",
    DegradedRules => "degraded_rules",
    AiLegacy => "ai_legacy",
    StaticFallback => "static_fallback",
});

impl DocumentCategory {
    /// Conflict-resolution rank: required > highly_recommended > optional.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Required => 3,
            Self::HighlyRecommended => 2,
            Self::Optional => 1,
        }
    }

    /// Whether this category forces `required = true`.
    pub fn implies_required(&self) -> bool {
        matches!(self, Self::Required)
    }

    pub fn default_priority(&self) -> Priority {
        match self {
            Self::Required => Priority::High,
            Self::HighlyRecommended => Priority::Medium,
            Self::Optional => Priority::Low,
        }
    }

    /// Lenient parse for generated text: accepts the canonical values plus
    /// the older `recommended` spelling and a few case/spacing variants.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "required" | "mandatory" => Some(Self::Required),
            "highly_recommended" | "recommended" => Some(Self::HighlyRecommended),
            "optional" => Some(Self::Optional),
            _ => None,
        }
    }
}

impl Priority {
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" | "normal" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl VisaType {
    /// Accepts the canonical codes plus common aliases sent by older clients.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tourist" | "tourism" | "visitor" | "b1/b2" => Some(Self::Tourist),
            "student" | "study" | "f1" | "f-1" => Some(Self::Student),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn document_category_round_trip() {
        for (variant, s) in [
            (DocumentCategory::Required, "required"),
            (DocumentCategory::HighlyRecommended, "highly_recommended"),
            (DocumentCategory::Optional, "optional"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(DocumentCategory::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn checklist_source_serializes_snake_case() {
        let json = serde_json::to_string(&ChecklistSource::DegradedRules).unwrap();
        assert_eq!(json, "\"degraded_rules\"");
        let back: ChecklistSource = serde_json::from_str("\"ai_corrected\"").unwrap();
        assert_eq!(back, ChecklistSource::AiCorrected);
    }

    #[test]
    fn invalid_enum_reports_field() {
        let err = VisaType::from_str("business").unwrap_err();
        assert!(err.to_string().contains("VisaType"));
        assert!(err.to_string().contains("business"));
    }

    #[test]
    fn category_rank_orders_required_first() {
        assert!(DocumentCategory::Required.rank() > DocumentCategory::HighlyRecommended.rank());
        assert!(DocumentCategory::HighlyRecommended.rank() > DocumentCategory::Optional.rank());
    }

    #[test]
    fn lenient_category_accepts_legacy_recommended() {
        assert_eq!(
            DocumentCategory::parse_lenient("Recommended"),
            Some(DocumentCategory::HighlyRecommended)
        );
        assert_eq!(
            DocumentCategory::parse_lenient("highly recommended"),
            Some(DocumentCategory::HighlyRecommended)
        );
        assert_eq!(DocumentCategory::parse_lenient("maybe"), None);
    }

    #[test]
    fn only_required_category_implies_required() {
        assert!(DocumentCategory::Required.implies_required());
        assert!(!DocumentCategory::HighlyRecommended.implies_required());
        assert!(!DocumentCategory::Optional.implies_required());
    }

    #[test]
    fn visa_type_aliases() {
        assert_eq!(VisaType::parse_lenient(" Study "), Some(VisaType::Student));
        assert_eq!(VisaType::parse_lenient("tourism"), Some(VisaType::Tourist));
        assert_eq!(VisaType::parse_lenient("work"), None);
    }

    #[test]
    fn locale_all_lists_three_locales() {
        assert_eq!(Locale::ALL, &[Locale::En, Locale::Ru, Locale::Uz]);
    }
}
