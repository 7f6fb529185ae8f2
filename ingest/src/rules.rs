//! Canonicalization of noisy free-text tag values.
//!
//! A rule file maps canonical names to the raw spellings that should be
//! folded into them:
//!
//! ```json
//! {
//!   "JOSM": { "starts_with": ["JOSM/"], "link": "https://josm.openstreetmap.de" },
//!   "Bing Maps Aerial": { "aliases": ["Bing", "bing"], "starts_with": ["Bing aerial"] }
//! }
//! ```
//!
//! Matching order:
//! 1. exact alias match;
//! 2. the first prefix rule, in file order, whose pattern starts the value;
//! 3. the first suffix rule, in file order, whose pattern ends the value;
//! 4. otherwise the value itself.
//!
//! The first matching rule wins, not the longest one. Reordering entries in a
//! rule file can therefore change the produced dictionaries.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("failed to read rule file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse rule file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize, Debug, Default)]
struct RawRuleEntry {
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    starts_with: Vec<String>,
    #[serde(default)]
    ends_with: Vec<String>,
}

/// Alias table plus ordered prefix and suffix rules for one category.
#[derive(Debug, Clone, Default)]
pub struct ReplaceRuleSet {
    aliases: HashMap<String, String>,
    prefixes: Vec<(String, String)>,
    suffixes: Vec<(String, String)>,
}

impl ReplaceRuleSet {
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        let raw: IndexMap<String, RawRuleEntry> = serde_json::from_str(text)?;
        Ok(Self::from_entries(raw))
    }

    pub fn load(path: &Path) -> Result<Self, RulesError> {
        let text = fs::read_to_string(path).map_err(|source| RulesError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let rules = Self::from_json_str(&text).map_err(|source| RulesError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            "Loaded {} aliases, {} prefix rules, {} suffix rules from {}",
            rules.aliases.len(),
            rules.prefixes.len(),
            rules.suffixes.len(),
            path.display()
        );
        Ok(rules)
    }

    fn from_entries(raw: IndexMap<String, RawRuleEntry>) -> Self {
        let mut rules = Self::default();
        for (name, entry) in raw {
            for alias in entry.aliases {
                // A later canonical name claiming the same alias replaces the earlier one.
                rules.aliases.insert(alias, name.clone());
            }
            for pattern in entry.starts_with {
                if pattern.is_empty() {
                    warn!("Ignoring empty starts_with pattern for '{name}'");
                    continue;
                }
                rules.prefixes.push((pattern, name.clone()));
            }
            for pattern in entry.ends_with {
                if pattern.is_empty() {
                    warn!("Ignoring empty ends_with pattern for '{name}'");
                    continue;
                }
                rules.suffixes.push((pattern, name.clone()));
            }
        }
        rules
    }

    /// Canonical name for `value`, or `value` itself when no rule applies.
    pub fn normalize<'a>(&'a self, value: &'a str) -> &'a str {
        if let Some(name) = self.aliases.get(value) {
            return name;
        }
        if let Some((_, name)) = self.prefixes.iter().find(|(p, _)| value.starts_with(p.as_str())) {
            return name;
        }
        if let Some((_, name)) = self.suffixes.iter().find(|(s, _)| value.ends_with(s.as_str())) {
            return name;
        }
        value
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty() && self.prefixes.is_empty() && self.suffixes.is_empty()
    }
}

/// Rule sets for the three normalized categories.
#[derive(Debug, Clone, Default)]
pub struct NormalizationRules {
    pub created_by: ReplaceRuleSet,
    pub imagery: ReplaceRuleSet,
    pub source: ReplaceRuleSet,
}

impl NormalizationRules {
    /// Load the software-identifier rules and the shared imagery/source rules.
    pub fn load(created_by: &Path, imagery_and_source: &Path) -> Result<Self, RulesError> {
        let created_by = ReplaceRuleSet::load(created_by)?;
        let imagery = ReplaceRuleSet::load(imagery_and_source)?;
        Ok(Self {
            created_by,
            source: imagery.clone(),
            imagery,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = r#"{
        "JOSM": { "aliases": ["josm"], "starts_with": ["JOSM/"], "link": "https://josm.openstreetmap.de" },
        "iD": { "starts_with": ["iD "] },
        "Potlatch": { "starts_with": ["Potlatch", "PL"], "ends_with": [" (Potlatch)"] },
        "Potlatch 2": { "starts_with": ["Potlatch 2"] },
        "Go Map!!": { "ends_with": ["Go Map!!"] }
    }"#;

    fn rules() -> ReplaceRuleSet {
        ReplaceRuleSet::from_json_str(RULES).unwrap()
    }

    #[test]
    fn test_alias_beats_prefix() {
        let mut rules = rules();
        // "JOSM/1.5" is also an alias of another name; the alias must win.
        rules.aliases.insert("JOSM/1.5".into(), "Legacy JOSM".into());
        assert_eq!(rules.normalize("JOSM/1.5"), "Legacy JOSM");
        assert_eq!(rules.normalize("JOSM/1.6"), "JOSM");
        assert_eq!(rules.normalize("josm"), "JOSM");
    }

    #[test]
    fn test_first_declared_prefix_wins_over_longer_pattern() {
        // "Potlatch" is declared before the longer "Potlatch 2".
        assert_eq!(rules().normalize("Potlatch 2.3"), "Potlatch");
    }

    #[test]
    fn test_suffix_after_prefix() {
        assert_eq!(rules().normalize("Vespucci 1.0 Go Map!!"), "Go Map!!");
        assert_eq!(rules().normalize("mapper (Potlatch)"), "Potlatch");
        // Prefix rules are tried before any suffix rule.
        assert_eq!(rules().normalize("iD Go Map!!"), "iD");
    }

    #[test]
    fn test_unmatched_value_passes_through() {
        assert_eq!(rules().normalize("Merkaartor 0.18"), "Merkaartor 0.18");
        assert_eq!(ReplaceRuleSet::default().normalize("x"), "x");
    }

    #[test]
    fn test_later_alias_owner_wins() {
        let rules = ReplaceRuleSet::from_json_str(
            r#"{ "A": { "aliases": ["x"] }, "B": { "aliases": ["x"] } }"#,
        )
        .unwrap();
        assert_eq!(rules.normalize("x"), "B");
    }

    #[test]
    fn test_empty_patterns_are_ignored() {
        let rules =
            ReplaceRuleSet::from_json_str(r#"{ "All": { "starts_with": [""], "ends_with": [""] } }"#)
                .unwrap();
        assert!(rules.is_empty());
        assert_eq!(rules.normalize("anything"), "anything");
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            ReplaceRuleSet::load(&missing),
            Err(RulesError::Read { .. })
        ));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            ReplaceRuleSet::load(&broken),
            Err(RulesError::Parse { .. })
        ));

        let wrong_shape = dir.path().join("shape.json");
        fs::write(&wrong_shape, r#"{ "A": { "aliases": "not-a-list" } }"#).unwrap();
        assert!(matches!(
            ReplaceRuleSet::load(&wrong_shape),
            Err(RulesError::Parse { .. })
        ));
    }

    #[test]
    fn test_normalization_rules_share_imagery_file() {
        let dir = tempfile::tempdir().unwrap();
        let created_by = dir.path().join("created_by.json");
        let imagery = dir.path().join("imagery.json");
        fs::write(&created_by, RULES).unwrap();
        fs::write(&imagery, r#"{ "Bing": { "starts_with": ["Bing"] } }"#).unwrap();

        let rules = NormalizationRules::load(&created_by, &imagery).unwrap();
        assert_eq!(rules.created_by.normalize("JOSM/1.5"), "JOSM");
        assert_eq!(rules.imagery.normalize("Bing aerial"), "Bing");
        assert_eq!(rules.source.normalize("Bing aerial"), "Bing");
    }

    #[test]
    fn test_shipped_rule_files_load() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../rules");
        let rules = NormalizationRules::load(
            &root.join("replace_rules_created_by.json"),
            &root.join("replace_rules_imagery_and_source.json"),
        )
        .unwrap();

        assert!(!rules.created_by.is_empty());
        assert_eq!(rules.created_by.normalize("StreetComplete 48.0"), "StreetComplete");
        assert_eq!(rules.created_by.normalize("StreetComplete_ee"), "StreetComplete");
        assert_eq!(rules.created_by.normalize("JOSM/1.5 (18543 en)"), "JOSM");
        assert_eq!(rules.created_by.normalize("unknown editor"), "unknown editor");
        assert_eq!(rules.imagery.normalize("Bing"), "Bing Maps Aerial");
        assert_eq!(rules.imagery.normalize("Bing aerial imagery"), "Bing Maps Aerial");
        assert_eq!(rules.source.normalize("survey"), "Survey");
        assert_eq!(rules.source.normalize("local knowledge"), "Survey");
    }
}
