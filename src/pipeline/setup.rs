// src/pipeline/setup.rs

//! Wiring of the shared components into per-source pollers.

use std::sync::Arc;

use crate::config::Rules;
use crate::error::Result;
use crate::models::{Config, NotificationTemplates, Source};
use crate::notify::{self, Notifier};
use crate::services::kma::RegionCodes;
use crate::services::{BulletinSource, GoogleTranslator, JmaSource, KmaSource, Localizer, Translator};
use crate::storage::{StateStore, open_store};
use crate::utils::Fetcher;

use super::classify::RelevanceClassifier;
use super::poller::{PipelineContext, Poller};
use super::publish::Publisher;

/// Components shared by both pollers; built once per process.
pub struct Runtime {
    config: Arc<Config>,
    fetcher: Fetcher,
    templates: Arc<NotificationTemplates>,
    localizer: Localizer,
    publisher: Arc<Publisher>,
    notifier: Arc<dyn Notifier>,
    region_codes: Arc<RegionCodes>,
}

impl Runtime {
    pub async fn build(config: Config, rules: Rules) -> Result<Self> {
        let fetcher = Fetcher::new(&config.crawler, &config.retry)?;
        let client = fetcher.client().clone();

        let store = open_store(&config.storage).await?;
        log::info!("Publishing to {}", store.describe());
        let publisher = Publisher::new(
            store,
            fetcher.clone(),
            config.storage.version.clone(),
            config.paths.scratch_dir.clone(),
        );

        let translator: Option<Arc<dyn Translator>> =
            match GoogleTranslator::from_env(client.clone(), &config.translation) {
                Some(translator) => Some(Arc::new(translator)),
                None => {
                    log::warn!(
                        "{} is not set; translating from the dictionary only",
                        config.translation.api_key_env
                    );
                    None
                }
            };

        let notifier = notify::from_config(client, &config.notification);

        Ok(Self {
            fetcher,
            templates: Arc::new(rules.templates),
            localizer: Localizer::new(Arc::new(rules.dictionary), translator),
            publisher: Arc::new(publisher),
            notifier,
            region_codes: Arc::new(rules.region_codes),
            config: Arc::new(config),
        })
    }

    pub fn bulletin_source(&self, source: Source) -> Arc<dyn BulletinSource> {
        match source {
            Source::Kma => Arc::new(KmaSource::new(
                self.config.kma.clone(),
                Arc::clone(&self.region_codes),
            )),
            Source::Jma => Arc::new(JmaSource::new(self.config.jma.clone())),
        }
    }

    pub fn state(&self, source: Source) -> StateStore {
        StateStore::new(self.config.state_file(source))
    }

    /// Build the poller for one source, restoring its persisted id.
    pub async fn poller(&self, source: Source) -> Poller {
        let ctx = PipelineContext {
            source: self.bulletin_source(source),
            fetcher: self.fetcher.clone(),
            state: self.state(source),
            classifier: RelevanceClassifier::new(self.config.relevance.clone()),
            localizer: self.localizer.clone(),
            templates: Arc::clone(&self.templates),
            publisher: Arc::clone(&self.publisher),
            notifier: Arc::clone(&self.notifier),
            topic: self.config.notification.topic(source).to_string(),
            interval: self.config.interval(source),
        };
        Poller::resume(ctx).await
    }
}
