use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use brandsafe_api::{ChunkedFetcher, FetchOptions, FetchResult, MetadataSource};
use brandsafe_core::config::AuditConfig;
use brandsafe_core::keywords::KeywordCatalog;
use brandsafe_core::models::{
    ExcludedCategories, ItemKind, ItemMetadata, ItemScore, Keyword, RawRecord,
};
use brandsafe_core::scoring::{rollup_channel_score, score_item};

use crate::report::{AuditReport, ItemFailure, RunState, RunStats};
use crate::sink::ScoreSink;
use crate::RuntimeError;

/// A channel to audit together with the videos that make up its score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRequest {
    pub channel_id: String,
    #[serde(default)]
    pub video_ids: Vec<String>,
}

/// Drives fetch → normalize → score for a set of ids.
///
/// Runs on one orchestrator are expected to be sequential; the published
/// [`RunState`] describes the most recent run.
pub struct AuditOrchestrator<S> {
    fetcher: ChunkedFetcher<S>,
    keywords: RwLock<Arc<KeywordCatalog>>,
    excluded: ExcludedCategories,
    sink: Option<Arc<dyn ScoreSink>>,
    state: watch::Sender<RunState>,
}

impl<S: MetadataSource> AuditOrchestrator<S> {
    pub fn new(
        source: Arc<S>,
        options: FetchOptions,
        catalog: KeywordCatalog,
        excluded: ExcludedCategories,
    ) -> Self {
        let (state, _) = watch::channel(RunState::Pending);
        Self {
            fetcher: ChunkedFetcher::new(source, options),
            keywords: RwLock::new(Arc::new(catalog)),
            excluded,
            sink: None,
            state,
        }
    }

    /// Validate config and compile keywords. Fails before any request is made.
    pub fn from_config(
        source: Arc<S>,
        config: &AuditConfig,
        keywords: &[Keyword],
    ) -> Result<Self, RuntimeError> {
        config
            .validate()
            .map_err(|e| RuntimeError::Config(e.to_string()))?;
        let catalog =
            KeywordCatalog::load(keywords).map_err(|e| RuntimeError::Keywords(e.to_string()))?;
        Ok(Self::new(
            source,
            FetchOptions::from_config(&config.fetch),
            catalog,
            config.scoring.excluded(),
        ))
    }

    pub fn with_sink(mut self, sink: Arc<dyn ScoreSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The keyword catalog the next run will use.
    pub async fn keywords(&self) -> Arc<KeywordCatalog> {
        Arc::clone(&*self.keywords.read().await)
    }

    /// Compile a new keyword list and swap it in. Runs already in progress keep
    /// the catalog they started with. On error the current catalog stays active.
    pub async fn reload_keywords(&self, keywords: &[Keyword]) -> Result<(), RuntimeError> {
        let catalog =
            KeywordCatalog::load(keywords).map_err(|e| RuntimeError::Keywords(e.to_string()))?;
        let total = catalog.all().len();
        *self.keywords.write().await = Arc::new(catalog);
        info!(keywords = total, "Reloaded keyword catalog");
        Ok(())
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Watch run state transitions.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Fetch and score videos.
    ///
    /// Ids whose batch fails terminally are reported in `failures` and never
    /// appear in `scores`. Duplicate ids are audited once.
    pub async fn run_video_audit(
        &self,
        video_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<AuditReport, RuntimeError> {
        let ids = dedup(video_ids.iter().cloned());
        let catalog = self.keywords().await;
        let mut ledger = RunLedger::new(ids.len());

        self.begin_run();
        info!(videos = ids.len(), "Starting video audit");
        let records = self
            .fetch_into(ItemKind::Video, &ids, cancel, &mut ledger)
            .await;

        self.transition(RunState::Scoring);
        let scores: Vec<ItemScore> = self
            .score_records(ItemKind::Video, records, &catalog, &mut ledger)
            .into_values()
            .collect();

        self.publish(&scores)?;
        Ok(self.finish(ledger, scores, Vec::new()))
    }

    /// Fetch and score channels together with their videos.
    ///
    /// Each channel's own metadata score is rolled up with the scores of its
    /// videos. A channel whose own metadata could not be fetched or parsed gets
    /// no rollup; its videos are still scored and reported.
    pub async fn run_channel_audit(
        &self,
        channels: &[ChannelRequest],
        cancel: &CancellationToken,
    ) -> Result<AuditReport, RuntimeError> {
        let channel_ids = dedup(channels.iter().map(|c| c.channel_id.clone()));
        let video_ids = dedup(channels.iter().flat_map(|c| c.video_ids.iter().cloned()));
        let catalog = self.keywords().await;
        let mut ledger = RunLedger::new(channel_ids.len() + video_ids.len());

        self.begin_run();
        info!(
            channels = channel_ids.len(),
            videos = video_ids.len(),
            "Starting channel audit"
        );
        let channel_records = self
            .fetch_into(ItemKind::Channel, &channel_ids, cancel, &mut ledger)
            .await;
        let video_records = self
            .fetch_into(ItemKind::Video, &video_ids, cancel, &mut ledger)
            .await;

        self.transition(RunState::Scoring);
        let channel_meta =
            self.score_records(ItemKind::Channel, channel_records, &catalog, &mut ledger);
        let video_scores =
            self.score_records(ItemKind::Video, video_records, &catalog, &mut ledger);

        let mut videos_by_channel: HashMap<&str, Vec<&str>> = HashMap::new();
        for request in channels {
            let entry = videos_by_channel.entry(&request.channel_id).or_default();
            for id in &request.video_ids {
                if !entry.contains(&id.as_str()) {
                    entry.push(id);
                }
            }
        }

        let rollups: Vec<ItemScore> = channel_ids
            .iter()
            .filter_map(|channel_id| {
                let own = channel_meta.get(channel_id)?;
                let mut parts = vec![own.clone()];
                parts.extend(
                    videos_by_channel
                        .get(channel_id.as_str())
                        .into_iter()
                        .flatten()
                        .filter_map(|id| video_scores.get(*id))
                        .cloned(),
                );
                debug!(channel = %channel_id, items = parts.len(), "Rolling up channel");
                Some(rollup_channel_score(channel_id, &parts, &self.excluded))
            })
            .collect();

        let scores: Vec<ItemScore> = video_scores.into_values().collect();
        self.publish(&scores)?;
        self.publish(&rollups)?;
        Ok(self.finish(ledger, scores, rollups))
    }

    async fn fetch_into(
        &self,
        kind: ItemKind,
        ids: &[String],
        cancel: &CancellationToken,
        ledger: &mut RunLedger,
    ) -> Vec<RawRecord> {
        ledger.stats.batches += self.fetcher.batch_count(ids.len());

        let mut records = Vec::new();
        let mut results = std::pin::pin!(self.fetcher.fetch(kind, ids, cancel));
        while let Some(result) = results.next().await {
            if let Some(record) = ledger.record(kind, result) {
                records.push(record);
            }
        }
        records
    }

    fn score_records(
        &self,
        kind: ItemKind,
        records: Vec<RawRecord>,
        catalog: &KeywordCatalog,
        ledger: &mut RunLedger,
    ) -> BTreeMap<String, ItemScore> {
        let mut scores = BTreeMap::new();
        for record in records {
            match ItemMetadata::from_record(&record) {
                Ok(meta) => {
                    let score = score_item(&meta, catalog, &self.excluded);
                    ledger.stats.scored += 1;
                    ledger.stats.keyword_hits += score.total_hits();
                    scores.insert(score.item_id.clone(), score);
                }
                Err(e) => {
                    warn!(kind = %kind, item = %record.item_id, error = %e, "Malformed record");
                    ledger.reject(kind, record.item_id, e.to_string());
                }
            }
        }
        scores
    }

    fn publish(&self, scores: &[ItemScore]) -> Result<(), RuntimeError> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        for score in scores {
            if let Err(e) = sink.upsert(score) {
                self.transition(RunState::DoneWithFailures);
                return Err(RuntimeError::Sink(e.to_string()));
            }
        }
        Ok(())
    }

    fn begin_run(&self) {
        self.state.send_replace(RunState::Pending);
        self.transition(RunState::Fetching);
    }

    fn transition(&self, next: RunState) {
        self.state.send_modify(|state| {
            if !state.can_advance_to(next) {
                warn!(from = ?*state, to = ?next, "Unexpected run state transition");
            }
            debug!(from = ?*state, to = ?next, "Run state");
            *state = next;
        });
    }

    fn finish(
        &self,
        ledger: RunLedger,
        scores: Vec<ItemScore>,
        channels: Vec<ItemScore>,
    ) -> AuditReport {
        let report = ledger.finish(scores, channels);
        self.transition(report.state);

        let stats = &report.stats;
        info!(
            state = ?report.state,
            requested = stats.ids_requested,
            scored = stats.scored,
            failed = stats.failed,
            missing = stats.missing,
            cancelled = stats.cancelled,
            keyword_hits = stats.keyword_hits,
            elapsed_ms = stats.elapsed_ms,
            "Audit finished"
        );
        report
    }
}

/// Failures, missing ids and counters collected while a run progresses.
struct RunLedger {
    failures: Vec<ItemFailure>,
    missing: Vec<String>,
    stats: RunStats,
}

impl RunLedger {
    fn new(ids_requested: usize) -> Self {
        Self {
            failures: Vec::new(),
            missing: Vec::new(),
            stats: RunStats {
                ids_requested,
                started_at: Some(Utc::now()),
                ..Default::default()
            },
        }
    }

    /// Book one fetch result; returns the record if there is something to score.
    fn record(&mut self, kind: ItemKind, result: FetchResult) -> Option<RawRecord> {
        match result {
            FetchResult::Fetched(record) => {
                self.stats.fetched += 1;
                Some(record)
            }
            FetchResult::Missing { item_id } => {
                self.stats.missing += 1;
                self.missing.push(item_id);
                None
            }
            FetchResult::Failed {
                item_id,
                attempts,
                reason,
            } => {
                self.stats.failed += 1;
                self.failures.push(ItemFailure {
                    item_id,
                    kind,
                    attempts,
                    reason,
                    cancelled: false,
                });
                None
            }
            FetchResult::Cancelled { item_id } => {
                self.stats.cancelled += 1;
                self.failures.push(ItemFailure {
                    item_id,
                    kind,
                    attempts: 0,
                    reason: "run cancelled before the batch was requested".into(),
                    cancelled: true,
                });
                None
            }
        }
    }

    /// A fetched record that could not be turned into metadata.
    fn reject(&mut self, kind: ItemKind, item_id: String, reason: String) {
        self.stats.failed += 1;
        self.failures.push(ItemFailure {
            item_id,
            kind,
            attempts: 1,
            reason,
            cancelled: false,
        });
    }

    fn finish(mut self, mut scores: Vec<ItemScore>, mut channels: Vec<ItemScore>) -> AuditReport {
        scores.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        channels.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        self.failures.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        self.missing.sort();

        let finished = Utc::now();
        self.stats.elapsed_ms = self
            .stats
            .started_at
            .map(|start| (finished - start).num_milliseconds())
            .unwrap_or_default();
        self.stats.finished_at = Some(finished);

        let state = if self.failures.is_empty() {
            RunState::Done
        } else {
            RunState::DoneWithFailures
        };

        AuditReport {
            state,
            scores,
            channels,
            failures: self.failures,
            missing: self.missing,
            stats: self.stats,
        }
    }
}

/// Drop blank and repeated ids, keeping first-seen order.
fn dedup(ids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::{json, Value};

    use super::*;
    use crate::sink::MemorySink;
    use brandsafe_api::{Backoff, FetchBatch, RetryPolicy, Retryable};
    use brandsafe_core::models::CategoryId;

    #[derive(Debug, thiserror::Error)]
    #[error("upstream unavailable")]
    struct Unavailable;

    impl Retryable for Unavailable {
        fn is_transient(&self) -> bool {
            true
        }
    }

    /// Serves canned records; batches listed in `failing` always fail.
    #[derive(Default)]
    struct FakeSource {
        records: HashMap<String, Value>,
        failing: HashSet<(ItemKind, usize)>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn with(mut self, id: &str, fields: Value) -> Self {
            self.records.insert(id.to_string(), fields);
            self
        }
    }

    impl MetadataSource for FakeSource {
        type Error = Unavailable;

        async fn fetch_batch(&self, batch: &FetchBatch) -> Result<Vec<RawRecord>, Unavailable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&(batch.kind, batch.index)) {
                return Err(Unavailable);
            }
            Ok(batch
                .ids
                .iter()
                .filter_map(|id| match self.records.get(id) {
                    Some(Value::Object(fields)) => Some(RawRecord::new(id.clone(), fields.clone())),
                    _ => None,
                })
                .collect())
        }
    }

    fn keywords() -> Vec<Keyword> {
        vec![
            Keyword::new("first", "A", "en", 1),
            Keyword::new("second", "A", "en", 1),
            Keyword::new("third", "B", "en", 1),
        ]
    }

    fn options() -> FetchOptions {
        FetchOptions {
            batch_size: 50,
            max_workers: 4,
            retry: RetryPolicy {
                max_retries: 1,
                backoff: Backoff::Fixed(Duration::from_secs(15)),
            },
            request_timeout: Duration::from_secs(30),
        }
    }

    fn orchestrator(source: FakeSource) -> AuditOrchestrator<FakeSource> {
        AuditOrchestrator::new(
            Arc::new(source),
            options(),
            KeywordCatalog::load(&keywords()).unwrap(),
            ["B"].into_iter().collect(),
        )
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("v{i:03}")).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn scores_single_video() {
        let source = FakeSource::default().with(
            "v1",
            json!({"title": "First thing", "description": "second third"}),
        );
        let orch = orchestrator(source);
        let report = orch
            .run_video_audit(&["v1".into()], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.state, RunState::Done);
        let score = report.score("v1").unwrap();
        assert_eq!(score.overall_score, 98);
        assert_eq!(score.category_scores[&CategoryId::from("A")], -2);
        assert_eq!(score.category_scores[&CategoryId::from("B")], -1);
        assert_eq!(report.stats.keyword_hits, 3);
        assert_eq!(orch.state(), RunState::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_batch_reported_not_scored() {
        let mut source = FakeSource::default();
        for id in ids(120) {
            source = source.with(&id, json!({"title": "first"}));
        }
        source.failing.insert((ItemKind::Video, 1));
        let orch = orchestrator(source);

        let report = orch
            .run_video_audit(&ids(120), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.state, RunState::DoneWithFailures);
        assert_eq!(report.failures.len(), 50);
        assert_eq!(report.scores.len(), 70);
        assert_eq!(report.stats.batches, 3);
        assert_eq!(report.stats.failed, 50);
        for failure in &report.failures {
            assert!(report.score(&failure.item_id).is_none());
            assert_eq!(failure.attempts, 2);
        }
        assert!(report.scores.windows(2).all(|w| w[0].item_id < w[1].item_id));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_record_is_item_failure() {
        let source = FakeSource::default()
            .with("good", json!({"title": "second"}))
            .with("bad", json!({"title": 7}));
        let orch = orchestrator(source);
        let report = orch
            .run_video_audit(&["good".into(), "bad".into()], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.state, RunState::DoneWithFailures);
        assert_eq!(report.scores.len(), 1);
        assert_eq!(report.failures[0].item_id, "bad");
        assert!(!report.failures[0].cancelled);
        assert_eq!(orch.fetcher.options().batch_size, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_ids_do_not_fail_run() {
        let source = FakeSource::default().with("v1", json!({"title": "clean"}));
        let orch = orchestrator(source);
        let report = orch
            .run_video_audit(&["v1".into(), "gone".into()], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.state, RunState::Done);
        assert_eq!(report.missing, vec!["gone".to_string()]);
        assert_eq!(report.score("v1").unwrap().overall_score, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_ids_audited_once() {
        let source = FakeSource::default().with("v1", json!({"title": "first"}));
        let orch = orchestrator(source);
        let report = orch
            .run_video_audit(
                &["v1".into(), "v1".into(), " ".into()],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.stats.ids_requested, 1);
        assert_eq!(report.scores.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_run_reports_cancelled_ids() {
        let source = FakeSource::default().with("v1", json!({"title": "first"}));
        let orch = orchestrator(source);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = orch.run_video_audit(&ids(60), &cancel).await.unwrap();

        assert_eq!(report.state, RunState::DoneWithFailures);
        assert_eq!(report.stats.cancelled, 60);
        assert!(report.failures.iter().all(|f| f.cancelled));
        assert!(report.scores.is_empty());
        assert_eq!(orch.fetcher.options().max_workers, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn rerun_is_idempotent_in_sink() {
        let source = FakeSource::default()
            .with("v1", json!({"title": "first"}))
            .with("v2", json!({"title": "third"}));
        let sink = Arc::new(MemorySink::new());
        let orch = orchestrator(source).with_sink(sink.clone());
        let ids = vec!["v1".to_string(), "v2".to_string()];

        let first = orch
            .run_video_audit(&ids, &CancellationToken::new())
            .await
            .unwrap();
        let stored = sink.snapshot();
        let second = orch
            .run_video_audit(&ids, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(first.scores, second.scores);
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.snapshot(), stored);
        assert_eq!(sink.get("v2").unwrap().overall_score, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn channel_rollup_includes_own_metadata() {
        let source = FakeSource::default()
            .with("UC1", json!({"title": "first channel"}))
            .with("UC2", json!({"title": "other"}))
            .with("v1", json!({"title": "second"}))
            .with("v2", json!({"title": "third first"}))
            .with("v3", json!({"title": "second"}));
        let orch = orchestrator(source);
        let channels = vec![
            ChannelRequest {
                channel_id: "UC1".into(),
                video_ids: vec!["v1".into(), "v2".into()],
            },
            ChannelRequest {
                channel_id: "UC2".into(),
                video_ids: vec!["v3".into()],
            },
        ];

        let report = orch
            .run_channel_audit(&channels, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.state, RunState::Done);
        assert_eq!(report.scores.len(), 3);
        let uc1 = report.channel("UC1").unwrap();
        assert_eq!(uc1.items_scored, 3);
        assert_eq!(uc1.category_scores[&CategoryId::from("A")], -3);
        assert_eq!(uc1.category_scores[&CategoryId::from("B")], -1);
        assert_eq!(uc1.overall_score, 97);
        let uc2 = report.channel("UC2").unwrap();
        assert_eq!(uc2.overall_score, 99);
        assert_eq!(report.stats.batches, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn channel_without_metadata_has_no_rollup() {
        let mut source = FakeSource::default()
            .with("UC1", json!({"title": "clean"}))
            .with("v1", json!({"title": "first"}));
        source.failing.insert((ItemKind::Channel, 0));
        let orch = orchestrator(source);

        let report = orch
            .run_channel_audit(
                &[ChannelRequest {
                    channel_id: "UC1".into(),
                    video_ids: vec!["v1".into()],
                }],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.state, RunState::DoneWithFailures);
        assert!(report.channels.is_empty());
        assert_eq!(report.failures[0].kind, ItemKind::Channel);
        assert!(report.score("v1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn reload_swaps_keywords() {
        let source = FakeSource::default().with("v1", json!({"title": "fresh words"}));
        let orch = orchestrator(source);

        let before = orch
            .run_video_audit(&["v1".into()], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(before.score("v1").unwrap().overall_score, 100);

        let held = orch.keywords().await;
        orch.reload_keywords(&[Keyword::new("fresh", "A", "en", 5)])
            .await
            .unwrap();
        assert!(held.all().lookup("fresh").is_none());

        let after = orch
            .run_video_audit(&["v1".into()], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(after.score("v1").unwrap().overall_score, 95);
    }

    #[tokio::test]
    async fn failed_reload_keeps_catalog() {
        let orch = orchestrator(FakeSource::default());
        match orch.reload_keywords(&[]).await {
            Err(RuntimeError::Keywords(_)) => {}
            other => panic!("Expected Keywords error, got {other:?}"),
        }
        assert_eq!(orch.keywords().await.all().len(), 3);
    }

    #[test]
    fn empty_keywords_abort_before_fetch() {
        let source = Arc::new(FakeSource::default());
        let result =
            AuditOrchestrator::from_config(source.clone(), &AuditConfig::default(), &[]);
        assert!(matches!(result, Err(RuntimeError::Keywords(_))));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn state_changes_are_observable() {
        let orch = orchestrator(FakeSource::default().with("v1", json!({})));
        let rx = orch.subscribe();
        assert_eq!(*rx.borrow(), RunState::Pending);
        orch.run_video_audit(&["v1".into()], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(*rx.borrow(), RunState::Done);
    }
}
