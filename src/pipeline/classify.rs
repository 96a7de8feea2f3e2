// src/pipeline/classify.rs

//! Relevance classification.
//!
//! KMA bulletins are always relevant. JMA bulletins are relevant when the
//! hypocenter is the sentinel region or when the border region felt at
//! least intensity 2; the tier then depends on how the border region
//! compares to its neighbor and on whether the bulletin is combined.

use crate::models::{BulletinKind, EqkRecord, NotifyTier, RelevanceConfig, Source};

/// Minimum border-region intensity that triggers a notification.
const BORDER_THRESHOLD: u8 = 2;

#[derive(Debug, Clone)]
pub struct RelevanceClassifier {
    rules: RelevanceConfig,
}

impl RelevanceClassifier {
    pub fn new(rules: RelevanceConfig) -> Self {
        Self { rules }
    }

    /// Tier to notify with, or `None` for "do not notify".
    pub fn classify(&self, record: &EqkRecord) -> Option<NotifyTier> {
        match record.source {
            Source::Kma => Some(NotifyTier::Case0),
            Source::Jma => self.classify_jma(record),
        }
    }

    fn classify_jma(&self, record: &EqkRecord) -> Option<NotifyTier> {
        if record.hypocenter_name() == Some(self.rules.sentinel_hypocenter.as_str()) {
            return Some(NotifyTier::Case0);
        }

        let border = *record.region_intensity.get(&self.rules.border_region)?;
        if border < BORDER_THRESHOLD {
            return None;
        }

        let combined = record.kind == BulletinKind::JmaCombined;
        let reference = record.region_intensity.get(&self.rules.reference_region);
        let tier = match reference {
            Some(&reference) if border >= reference => {
                if combined {
                    NotifyTier::Case1
                } else {
                    NotifyTier::Case3
                }
            }
            _ if combined => NotifyTier::Case2,
            _ => NotifyTier::Case3,
        };
        Some(tier)
    }
}

impl Default for RelevanceClassifier {
    fn default() -> Self {
        Self::new(RelevanceConfig::default())
    }
}
