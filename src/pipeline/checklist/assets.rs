use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;

use super::catalog::{InMemoryCatalog, CATALOG_GAP_TARGET};
use super::fallback::{StaticFallbackFile, StaticFallbackTable};
use super::rules::{InMemoryRuleSetStore, RuleSet};
use super::DataError;

pub const CATALOG_FILE: &str = "document_catalog.json";
pub const RULE_SETS_FILE: &str = "rule_sets.json";
pub const FALLBACK_FILE: &str = "static_fallback.json";

const EMBEDDED_CATALOG: &str = include_str!("../../../assets/document_catalog.json");
const EMBEDDED_RULE_SETS: &str = include_str!("../../../assets/rule_sets.json");
const EMBEDDED_FALLBACK: &str = include_str!("../../../assets/static_fallback.json");

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleSetsFile {
    rule_sets: Vec<RuleSet>,
}

/// The external reference data the engine reads: catalog, rule sets and
/// the static fallback table. Loaded once at startup, immutable afterwards.
#[derive(Debug, Clone)]
pub struct EngineData {
    pub catalog: InMemoryCatalog,
    pub rules: InMemoryRuleSetStore,
    pub fallback: StaticFallbackTable,
}

impl EngineData {
    /// Data compiled into the binary.
    pub fn embedded() -> Result<Self, DataError> {
        Self::from_sources(
            (CATALOG_FILE, EMBEDDED_CATALOG),
            (RULE_SETS_FILE, EMBEDDED_RULE_SETS),
            (FALLBACK_FILE, EMBEDDED_FALLBACK),
        )
    }

    /// Load from `data_dir`; each file missing there falls back to the
    /// embedded copy.
    pub fn load(data_dir: Option<&Path>) -> Result<Self, DataError> {
        let catalog = read_source(data_dir, CATALOG_FILE, EMBEDDED_CATALOG)?;
        let rules = read_source(data_dir, RULE_SETS_FILE, EMBEDDED_RULE_SETS)?;
        let fallback = read_source(data_dir, FALLBACK_FILE, EMBEDDED_FALLBACK)?;
        Self::from_sources(
            (CATALOG_FILE, &catalog),
            (RULE_SETS_FILE, &rules),
            (FALLBACK_FILE, &fallback),
        )
    }

    fn from_sources(
        catalog: (&str, &str),
        rules: (&str, &str),
        fallback: (&str, &str),
    ) -> Result<Self, DataError> {
        let catalog: InMemoryCatalog = parse_json(catalog.0, catalog.1)?;
        let rule_sets: RuleSetsFile = parse_json(rules.0, rules.1)?;
        let fallback_file: StaticFallbackFile = parse_json(fallback.0, fallback.1)?;

        let data = Self {
            catalog,
            rules: InMemoryRuleSetStore::new(rule_sets.rule_sets)?,
            fallback: StaticFallbackTable::from_file(fallback_file)?,
        };

        let uncovered = data.uncovered_document_ids();
        if !uncovered.is_empty() {
            tracing::warn!(
                target: CATALOG_GAP_TARGET,
                catalog_gap = true,
                count = uncovered.len(),
                ids = ?uncovered,
                "Rule sets or fallback table reference documents missing from the catalog"
            );
        }
        tracing::info!(
            documents = data.catalog.document_ids().count(),
            rule_sets = data.rules.iter().count(),
            fallback_entries = data.fallback.entry_count(),
            "Engine data loaded"
        );
        Ok(data)
    }

    /// Ids referenced by rule sets or the fallback table with no catalog entry.
    pub fn uncovered_document_ids(&self) -> BTreeSet<String> {
        self.rules
            .iter()
            .flat_map(RuleSet::referenced_document_ids)
            .chain(self.fallback.referenced_document_ids())
            .filter(|id| !self.catalog.contains(id))
            .collect()
    }
}

fn read_source(data_dir: Option<&Path>, file_name: &str, embedded: &str) -> Result<String, DataError> {
    let Some(path) = data_dir.map(|d| d.join(file_name)).filter(|p| p.is_file()) else {
        return Ok(embedded.to_string());
    };
    tracing::debug!(path = %path.display(), "Loading engine data file");
    std::fs::read_to_string(&path).map_err(|source| DataError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn parse_json<T: for<'de> Deserialize<'de>>(name: &str, json: &str) -> Result<T, DataError> {
    serde_json::from_str(json).map_err(|source| DataError::Json {
        name: name.to_string(),
        source,
    })
}
