// src/pipeline/poller.rs

//! Per-source polling loop.
//!
//! Each cycle runs fetch → parse → dedup → classify → localize/render →
//! publish → notify → persist. Cycles never overlap. Non-fatal failures
//! abort the cycle and are logged; fatal ones stop the poller.
//!
//! The persisted id is only advanced after publish and notify have been
//! attempted, so an interrupted cycle is replayed after a restart.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::models::{EqkRecord, Language, NotificationTemplates, NotifyTier, Source};
use crate::notify::{Notifier, PushMessage};
use crate::services::{BulletinSource, Localizer};
use crate::storage::StateStore;
use crate::utils::Fetcher;

use super::classify::RelevanceClassifier;
use super::publish::Publisher;
use super::render::render_tier;

/// Offset of the first wake-up after start.
const FIRST_WAKE: Duration = Duration::from_millis(100);

/// Everything one poller needs, built once at startup.
pub struct PipelineContext {
    pub source: Arc<dyn BulletinSource>,
    pub fetcher: Fetcher,
    pub state: StateStore,
    pub classifier: RelevanceClassifier,
    pub localizer: Localizer,
    pub templates: Arc<NotificationTemplates>,
    pub publisher: Arc<Publisher>,
    pub notifier: Arc<dyn Notifier>,
    pub topic: String,
    pub interval: Duration,
}

/// Result of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Upstream listing had no interesting entry
    NoEvent,
    /// Newest entry was already handled by this process
    Unchanged,
    /// First entry after restart matched the persisted id
    Reconciled { id: String },
    /// Record parsed but not relevant; id persisted
    Skipped { id: String },
    /// Published, notified and persisted
    Published { id: String, tier: NotifyTier },
    /// Cycle stopped on a non-fatal error
    Aborted,
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::NoEvent => write!(f, "no event"),
            CycleOutcome::Unchanged => write!(f, "unchanged"),
            CycleOutcome::Reconciled { id } => write!(f, "{id} already processed before restart"),
            CycleOutcome::Skipped { id } => write!(f, "{id} not relevant"),
            CycleOutcome::Published { id, tier } => write!(f, "{id} published ({})", tier.key()),
            CycleOutcome::Aborted => write!(f, "aborted"),
        }
    }
}

/// Sleep that keeps wake-ups aligned to multiples of `interval`.
pub fn next_sleep(interval: Duration, work: Duration) -> Duration {
    let period = interval.as_nanos();
    if period == 0 {
        return Duration::ZERO;
    }
    let remaining = period - work.as_nanos() % period;
    Duration::from_nanos(u64::try_from(remaining).unwrap_or(u64::MAX))
}

pub struct Poller {
    ctx: PipelineContext,
    last_key: Option<String>,
    restart_id: Option<String>,
}

impl Poller {
    /// Build a poller, reading the persisted id for restart reconciliation.
    pub async fn resume(ctx: PipelineContext) -> Self {
        let restart_id = ctx.state.load().await;
        if let Some(id) = &restart_id {
            log::info!("[{}] Resuming after {id}", ctx.source.source());
        }
        Self {
            ctx,
            last_key: None,
            restart_id,
        }
    }

    pub fn source(&self) -> Source {
        self.ctx.source.source()
    }

    pub fn last_key(&self) -> Option<&str> {
        self.last_key.as_deref()
    }

    /// Poll forever; returns only on a fatal error.
    pub async fn run(&mut self) -> Result<()> {
        let interval = self.ctx.interval;
        let mut work = interval.saturating_sub(FIRST_WAKE);
        log::info!("[{}] Polling every {}s", self.source(), interval.as_secs());

        loop {
            tokio::time::sleep(next_sleep(interval, work)).await;
            let started = Instant::now();
            if let Err(e) = self.run_cycle().await {
                log::error!("[{}] Stopping: {e}", self.source());
                return Err(e);
            }
            work = started.elapsed();
        }
    }

    /// Run one cycle. Only fatal errors are returned.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        match self.cycle().await {
            Ok(outcome) => {
                log::debug!("[{}] {outcome}", self.source());
                Ok(outcome)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                log::warn!("[{}] Cycle aborted: {e}", self.source());
                Ok(CycleOutcome::Aborted)
            }
        }
    }

    async fn cycle(&mut self) -> Result<CycleOutcome> {
        let source = self.source();
        let Some(listing) = self.ctx.source.latest(&self.ctx.fetcher).await? else {
            return Ok(CycleOutcome::NoEvent);
        };
        if self.last_key.as_deref() == Some(listing.key.as_str()) {
            return Ok(CycleOutcome::Unchanged);
        }

        let record = self.ctx.source.fetch_record(&self.ctx.fetcher, &listing).await?;

        let restart_id = self.restart_id.take();
        if restart_id.as_deref() == Some(record.id.as_str()) {
            log::info!("[{source}] {} was processed before restart", record.id);
            self.last_key = Some(listing.key);
            return Ok(CycleOutcome::Reconciled { id: record.id });
        }

        log::info!("[{source}] New bulletin {} ({:?})", record.id, record.kind);

        let Some(tier) = self.ctx.classifier.classify(&record) else {
            log::info!("[{source}] {} is not relevant; not notifying", record.id);
            self.ctx.state.store(&record.id).await?;
            self.last_key = Some(listing.key);
            return Ok(CycleOutcome::Skipped { id: record.id });
        };

        let records = self.localize_all(&record).await;
        let payload = match self.ctx.templates.tier(record.source, tier) {
            Some(template) => Some(render_tier(template, &records)),
            None => {
                log::warn!("[{source}] No template for {}; not notifying", tier.key());
                None
            }
        };

        self.ctx.publisher.publish(&records).await?;

        if let Some(payload) = payload {
            let message = PushMessage::new(&self.ctx.topic, payload);
            if let Err(e) = self.ctx.notifier.send(&message).await {
                log::warn!("[{source}] Notification for {} failed: {e}", record.id);
            }
        }

        self.ctx.state.store(&record.id).await?;
        self.last_key = Some(listing.key);
        Ok(CycleOutcome::Published {
            id: record.id,
            tier,
        })
    }

    async fn localize_all(&self, record: &EqkRecord) -> BTreeMap<Language, EqkRecord> {
        let mut records = BTreeMap::new();
        for lang in Language::ALL {
            records.insert(lang, self.ctx.localizer.localize(record, lang).await);
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    use crate::error::AppError;
    use crate::models::{BulletinKind, Coordinate, Location};
    use crate::services::{Dictionary, Listing};
    use crate::storage::ArtifactStore;
    use crate::utils::RetryPolicy;

    const TEMPLATES: &str = r#"{
        "kma": { "case_0": { "title": "*location* 규모 *magnitude*" } },
        "jma": {
            "case_0": { "title": "*location*" },
            "case_1": { "title": "対馬 *region_intensity.長崎県対馬*" }
        }
    }"#;

    #[derive(Default)]
    struct StubSource {
        listing: Mutex<Option<Listing>>,
        record: Mutex<Option<EqkRecord>>,
        fetches: AtomicUsize,
    }

    impl StubSource {
        fn serve(&self, key: &str, record: Option<EqkRecord>) {
            let kind = record.as_ref().map_or(BulletinKind::KmaInfo, |r| r.kind);
            *self.listing.lock().unwrap() = Some(Listing {
                key: key.to_string(),
                kind,
                url: format!("https://example.com/{key}"),
                announced_raw: None,
                sequence: None,
            });
            *self.record.lock().unwrap() = record;
        }
    }

    #[async_trait]
    impl BulletinSource for StubSource {
        fn source(&self) -> Source {
            Source::Kma
        }

        async fn latest(&self, _fetcher: &Fetcher) -> Result<Option<Listing>> {
            Ok(self.listing.lock().unwrap().clone())
        }

        async fn fetch_record(&self, _fetcher: &Fetcher, _listing: &Listing) -> Result<EqkRecord> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.record
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| AppError::parse("location", "too few tokens"))
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        keys: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ArtifactStore for MemoryStore {
        async fn put(&self, key: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<()> {
            if self.fail {
                return Err(AppError::S3("bucket unavailable".into()));
            }
            self.keys.lock().unwrap().push(key.to_string());
            Ok(())
        }

        fn describe(&self) -> String {
            "memory".into()
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<PushMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, message: &PushMessage) -> Result<()> {
            self.sent.lock().unwrap().push(message.clone());
            if self.fail {
                return Err(AppError::Notify("FCM answered 500".into()));
            }
            Ok(())
        }
    }

    struct Harness {
        source: Arc<StubSource>,
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        state: StateStore,
        dir: TempDir,
    }

    impl Harness {
        fn new(store: MemoryStore, notifier: RecordingNotifier) -> Self {
            let dir = TempDir::new().unwrap();
            Self {
                source: Arc::new(StubSource::default()),
                store: Arc::new(store),
                notifier: Arc::new(notifier),
                state: StateStore::new(dir.path().join("kma_uid.txt")),
                dir,
            }
        }

        fn published(&self) -> usize {
            self.store.keys.lock().unwrap().len()
        }

        fn notified(&self) -> usize {
            self.notifier.sent.lock().unwrap().len()
        }

        async fn poller(&self) -> Poller {
            let fetcher = Fetcher::with_policy(reqwest::Client::new(), RetryPolicy::default());
            let publisher = Publisher::new(
                self.store.clone(),
                fetcher.clone(),
                "v3",
                self.dir.path().join("tmp"),
            );
            let ctx = PipelineContext {
                source: self.source.clone(),
                fetcher,
                state: self.state.clone(),
                classifier: RelevanceClassifier::default(),
                localizer: Localizer::new(Arc::new(Dictionary::default()), None),
                templates: Arc::new(NotificationTemplates::from_json(TEMPLATES).unwrap()),
                publisher: Arc::new(publisher),
                notifier: self.notifier.clone(),
                topic: "kma".into(),
                interval: Duration::from_secs(5),
            };
            Poller::resume(ctx).await
        }
    }

    fn kma_record(id: &str) -> EqkRecord {
        let at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let mut record = EqkRecord::new(id, BulletinKind::KmaInfo, at);
        record.magnitude = Some(2.4);
        record.location = Some(Location::Region {
            wide: "경북".into(),
            city: "경주시".into(),
            direction: "남남서쪽".into(),
            distance: 9,
            depth: None,
            code: None,
            coordinate: None,
        });
        record
    }

    fn jma_record(id: &str, border: u8) -> EqkRecord {
        let at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 1, 0)
            .unwrap();
        let mut record = EqkRecord::new(id, BulletinKind::JmaCombined, at);
        record.location = Some(Location::Hypocenter {
            name: "日向灘".into(),
            coordinate: Coordinate {
                latitude: 32.0,
                longitude: 132.0,
            },
            depth: Some(30.0),
        });
        record.region_intensity.insert("長崎県対馬".into(), border);
        record
    }

    #[test]
    fn test_next_sleep_keeps_phase() {
        let t = Duration::from_secs(5);
        assert_eq!(next_sleep(t, Duration::ZERO), t);
        assert_eq!(next_sleep(t, Duration::from_millis(1200)), Duration::from_millis(3800));
        assert_eq!(next_sleep(t, Duration::from_millis(6200)), Duration::from_millis(3800));
        assert_eq!(next_sleep(t, t), t);
        assert_eq!(next_sleep(t, t - FIRST_WAKE), FIRST_WAKE);
        assert_eq!(next_sleep(Duration::ZERO, t), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_same_listing_twice_publishes_once() {
        let harness = Harness::new(MemoryStore::default(), RecordingNotifier::default());
        harness.source.serve("eqk-1", Some(kma_record("202401010008")));
        let mut poller = harness.poller().await;

        let first = poller.run_cycle().await.unwrap();
        assert_eq!(
            first,
            CycleOutcome::Published {
                id: "202401010008".into(),
                tier: NotifyTier::Case0
            }
        );
        let published = harness.published();
        assert_eq!(published, Language::ALL.len());
        assert_eq!(harness.notified(), 1);

        assert_eq!(poller.run_cycle().await.unwrap(), CycleOutcome::Unchanged);
        assert_eq!(harness.published(), published);
        assert_eq!(harness.notified(), 1);
        assert_eq!(harness.source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(harness.state.load().await.as_deref(), Some("202401010008"));
    }

    #[tokio::test]
    async fn test_restart_with_same_id_does_nothing() {
        let harness = Harness::new(MemoryStore::default(), RecordingNotifier::default());
        harness.state.store("202401010008").await.unwrap();
        harness.source.serve("eqk-1", Some(kma_record("202401010008")));

        let mut poller = harness.poller().await;
        assert_eq!(
            poller.run_cycle().await.unwrap(),
            CycleOutcome::Reconciled {
                id: "202401010008".into()
            }
        );
        assert_eq!(harness.published(), 0);
        assert_eq!(harness.notified(), 0);

        harness.source.serve("eqk-2", Some(kma_record("202401010009")));
        assert!(matches!(
            poller.run_cycle().await.unwrap(),
            CycleOutcome::Published { .. }
        ));
        assert_eq!(harness.notified(), 1);
        assert_eq!(harness.state.load().await.as_deref(), Some("202401010009"));
    }

    #[tokio::test]
    async fn test_restart_with_new_id_processes() {
        let harness = Harness::new(MemoryStore::default(), RecordingNotifier::default());
        harness.state.store("202401010007").await.unwrap();
        harness.source.serve("eqk-1", Some(kma_record("202401010008")));

        let mut poller = harness.poller().await;
        assert!(matches!(
            poller.run_cycle().await.unwrap(),
            CycleOutcome::Published { .. }
        ));
        assert_eq!(harness.notified(), 1);
    }

    #[tokio::test]
    async fn test_parse_error_aborts_and_retries() {
        let harness = Harness::new(MemoryStore::default(), RecordingNotifier::default());
        harness.source.serve("eqk-1", None);
        let mut poller = harness.poller().await;

        assert_eq!(poller.run_cycle().await.unwrap(), CycleOutcome::Aborted);
        assert_eq!(poller.last_key(), None);
        assert_eq!(harness.state.load().await, None);

        *harness.source.record.lock().unwrap() = Some(kma_record("202401010008"));
        assert!(matches!(
            poller.run_cycle().await.unwrap(),
            CycleOutcome::Published { .. }
        ));
    }

    #[tokio::test]
    async fn test_publish_failure_skips_notify_and_state() {
        let store = MemoryStore {
            fail: true,
            ..MemoryStore::default()
        };
        let harness = Harness::new(store, RecordingNotifier::default());
        harness.source.serve("eqk-1", Some(kma_record("202401010008")));
        let mut poller = harness.poller().await;

        assert_eq!(poller.run_cycle().await.unwrap(), CycleOutcome::Aborted);
        assert_eq!(harness.notified(), 0);
        assert_eq!(harness.state.load().await, None);
        assert_eq!(poller.last_key(), None);
    }

    #[tokio::test]
    async fn test_notify_failure_still_advances_state() {
        let notifier = RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        };
        let harness = Harness::new(MemoryStore::default(), notifier);
        harness.source.serve("eqk-1", Some(kma_record("202401010008")));
        let mut poller = harness.poller().await;

        assert!(matches!(
            poller.run_cycle().await.unwrap(),
            CycleOutcome::Published { .. }
        ));
        assert_eq!(harness.state.load().await.as_deref(), Some("202401010008"));
    }

    #[tokio::test]
    async fn test_irrelevant_record_is_persisted_without_notify() {
        let harness = Harness::new(MemoryStore::default(), RecordingNotifier::default());
        harness.source.serve("urn:uuid:1", Some(jma_record("20240101100100", 1)));
        let mut poller = harness.poller().await;

        assert_eq!(
            poller.run_cycle().await.unwrap(),
            CycleOutcome::Skipped {
                id: "20240101100100".into()
            }
        );
        assert_eq!(harness.published(), 0);
        assert_eq!(harness.notified(), 0);
        assert_eq!(harness.state.load().await.as_deref(), Some("20240101100100"));
    }

    #[tokio::test]
    async fn test_rendered_payload_reaches_notifier() {
        let harness = Harness::new(MemoryStore::default(), RecordingNotifier::default());
        harness.source.serve("urn:uuid:2", Some(jma_record("20240101100100", 3)));
        let mut poller = harness.poller().await;

        assert_eq!(
            poller.run_cycle().await.unwrap(),
            CycleOutcome::Published {
                id: "20240101100100".into(),
                tier: NotifyTier::Case2
            }
        );
        // case_2 has no template for jma
        assert_eq!(harness.notified(), 0);

        harness.source.serve("urn:uuid:3", Some(jma_record("20240101100200", 3)));
        {
            let mut record = harness.source.record.lock().unwrap();
            if let Some(record) = record.as_mut() {
                record.region_intensity.insert("福岡県福岡".into(), 2);
            }
        }
        poller.run_cycle().await.unwrap();
        let sent = harness.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "kma");
        assert_eq!(sent[0].payload["title"], "対馬 3");
    }

    #[tokio::test]
    async fn test_unwritable_state_is_fatal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();

        let mut harness = Harness::new(MemoryStore::default(), RecordingNotifier::default());
        harness.state = StateStore::new(blocker.join("kma_uid.txt"));
        harness.source.serve("eqk-1", Some(kma_record("202401010008")));
        let mut poller = harness.poller().await;

        let err = poller.run_cycle().await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(harness.notified(), 1);
    }

    #[tokio::test]
    async fn test_empty_listing() {
        let harness = Harness::new(MemoryStore::default(), RecordingNotifier::default());
        let mut poller = harness.poller().await;
        assert_eq!(poller.run_cycle().await.unwrap(), CycleOutcome::NoEvent);
    }
}
