// src/config.rs

//! Rule file loading.
//!
//! The notification templates are required. The static dictionary and the
//! KMA region-code table are optional; a missing file leaves them empty.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::models::{NotificationTemplates, PathsConfig};
use crate::services::Dictionary;
use crate::services::kma::RegionCodes;

/// Read-only rule files shared by both pollers.
#[derive(Debug, Clone, Default)]
pub struct Rules {
    pub templates: NotificationTemplates,
    pub dictionary: Dictionary,
    pub region_codes: RegionCodes,
}

impl Rules {
    pub fn load(paths: &PathsConfig) -> Result<Self> {
        let templates = NotificationTemplates::load(&paths.templates)?;
        let dictionary: Dictionary = load_optional_json(&paths.dictionary, "dictionary")?;
        let region_codes = load_region_codes(&paths.region_codes)?;

        log::info!(
            "Loaded {} templates, {} dictionary entries, {} region codes",
            templates.tier_count(),
            dictionary.len(),
            region_codes.len()
        );

        Ok(Self {
            templates,
            dictionary,
            region_codes,
        })
    }
}

/// Load the KMA wide-area name → administrative code table.
pub fn load_region_codes(path: impl AsRef<Path>) -> Result<RegionCodes> {
    load_optional_json(path.as_ref(), "region codes")
}

fn load_optional_json<T: DeserializeOwned + Default>(path: &Path, what: &str) -> Result<T> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("No {what} file at {}; continuing without", path.display());
            Ok(T::default())
        }
        Err(e) => Err(e.into()),
    }
}
