// src/models/template.rs

//! Notification template file model.
//!
//! ```json
//! {
//!   "jma": {
//!     "case_1": {
//!       "sound": "default",
//!       "title": { "ko": "*location* 지진", "ja": "*location*の地震" }
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Language, NotifyTier, Source};

/// One output field of a tier template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateEntry {
    /// Rendered once, in Korean
    Text(String),
    /// Rendered once per listed language code
    Localized(BTreeMap<String, String>),
}

/// Output field name → template entry.
pub type TierTemplate = BTreeMap<String, TemplateEntry>;

/// Source → tier → output field → template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationTemplates(BTreeMap<String, BTreeMap<String, TierTemplate>>);

const TIER_KEYS: [&str; 4] = ["case_0", "case_1", "case_2", "case_3"];

impl NotificationTemplates {
    /// Load templates from a JSON file and validate their keys.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let templates: Self = serde_json::from_str(content)?;
        templates.validate()?;
        Ok(templates)
    }

    /// Reject unknown sources, tiers and language codes up front so the
    /// renderer never meets them mid-cycle.
    pub fn validate(&self) -> Result<()> {
        for (source, tiers) in &self.0 {
            if source != Source::Kma.as_str() && source != Source::Jma.as_str() {
                return Err(AppError::validation(format!(
                    "unknown template source '{source}'"
                )));
            }
            for (tier, fields) in tiers {
                if !TIER_KEYS.contains(&tier.as_str()) {
                    return Err(AppError::validation(format!(
                        "unknown tier '{tier}' for source '{source}'"
                    )));
                }
                for (field, entry) in fields {
                    if let TemplateEntry::Localized(by_lang) = entry {
                        if let Some(code) =
                            by_lang.keys().find(|code| Language::from_code(code).is_none())
                        {
                            return Err(AppError::validation(format!(
                                "unknown language '{code}' in {source}.{tier}.{field}"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Template for one source and tier, if configured.
    pub fn tier(&self, source: Source, tier: NotifyTier) -> Option<&TierTemplate> {
        self.0.get(source.as_str())?.get(tier.key())
    }

    /// Number of configured tier templates across sources.
    pub fn tier_count(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }
}
