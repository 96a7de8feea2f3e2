// src/models/mod.rs

//! Domain models for the crawler application.
//!
//! Bulletin records, output languages, notification templates and the
//! runtime configuration.

mod config;
mod language;
mod record;
mod template;

// Re-export all public types
pub use config::{
    AlertConfig, Config, CrawlerConfig, JmaConfig, KmaConfig, NotificationConfig, PathsConfig,
    RelevanceConfig, RetryConfig, StorageConfig, TranslationConfig,
};
pub use language::Language;
pub use record::{
    BulletinKind, Coordinate, EqkRecord, ImageRef, Location, NotifyTier, Source, datetime_format,
};
pub use template::{NotificationTemplates, TemplateEntry, TierTemplate};
