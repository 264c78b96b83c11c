//! Phased batch processor.
//!
//! A full run drains four ordered phases: zone configuration, schedules,
//! zone data, media. Each phase fully drains its queryset before the next
//! begins. Phases 2 and 3 are fail-stop: the extraction collaborator is
//! rate-limited and costly, and skipping a record mid-batch risks marking
//! work that never happened. Phases 1 and 4 are idempotent per item and
//! safe to retry, so their failures are logged and the loop continues.
//!
//! A halt never loses work: failed and unvisited records were never marked
//! processed, so the next run re-derives the pending set and resumes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::capture::{
    CaptureStore, MediaRecord, MessageRecord, StoredRecord, SCHEDULE_CODE, ZONE_CONFIG_CODES,
    ZONE_DATA_CODES,
};
use crate::error::Error;
use crate::strategy::{Dispatcher, MediaStrategy, Outcome};
use crate::zones::ZoneRegistry;

/// Inter-item pauses. These respect external rate limits; they are not
/// backpressure.
#[derive(Debug, Clone, Copy)]
pub struct Delays {
    /// Between any two processed items.
    pub processing: Duration,
    /// Between consecutive extraction calls.
    pub ia: Duration,
}

impl Delays {
    pub fn from_millis(processing_ms: u64, ia_ms: u64) -> Self {
        Self {
            processing: Duration::from_millis(processing_ms),
            ia: Duration::from_millis(ia_ms),
        }
    }

    pub fn none() -> Self {
        Self::from_millis(0, 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ZoneConfig,
    Schedule,
    ZoneData,
    Media,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::ZoneConfig => "zone-config",
            Phase::Schedule => "schedule",
            Phase::ZoneData => "zone-data",
            Phase::Media => "media",
        };
        write!(f, "{name}")
    }
}

/// Items successfully processed, per phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseCounts {
    pub zone_config: usize,
    pub schedule: usize,
    pub zone_data: usize,
    pub media: usize,
    pub batch: usize,
}

impl PhaseCounts {
    pub fn total(&self) -> usize {
        self.zone_config + self.schedule + self.zone_data + self.media + self.batch
    }
}

/// How a run ended. A halt is reported to the host rather than exiting the
/// process; restart policy belongs to whoever drives the processor.
#[derive(Debug)]
pub enum RunOutcome {
    /// Another run holds the re-entrancy guard.
    AlreadyRunning,
    Completed(PhaseCounts),
    Halted {
        phase: Phase,
        counts: PhaseCounts,
        reason: Error,
    },
}

/// Releases the re-entrancy flag when a run ends, on any path out.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct PhasedProcessor {
    messages: CaptureStore<MessageRecord>,
    media: CaptureStore<MediaRecord>,
    registry: ZoneRegistry,
    dispatcher: Dispatcher,
    media_strategy: MediaStrategy,
    delays: Delays,
    batch_size: usize,
    running: AtomicBool,
}

impl PhasedProcessor {
    pub fn new(
        messages: CaptureStore<MessageRecord>,
        media: CaptureStore<MediaRecord>,
        registry: ZoneRegistry,
        dispatcher: Dispatcher,
        media_strategy: MediaStrategy,
        delays: Delays,
        batch_size: usize,
    ) -> Self {
        Self {
            messages,
            media,
            registry,
            dispatcher,
            media_strategy,
            delays,
            batch_size,
            running: AtomicBool::new(false),
        }
    }

    fn try_begin(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard(&self.running))
    }

    /// Full four-phase run.
    pub async fn run_all(&self) -> RunOutcome {
        let Some(_guard) = self.try_begin() else {
            info!("a processing run is already in progress");
            return RunOutcome::AlreadyRunning;
        };
        info!("starting full processing run");
        let mut counts = PhaseCounts::default();

        // Phase 1: zone configurations, per-item failures do not halt
        counts.zone_config = self.phase_zone_config().await;

        // Anything after this point reads the just-written configuration
        let active = self.registry.load();
        info!(zones = ?active.zones, "zone configuration reloaded");

        // Phase 2: schedules, fail-stop
        match self.phase_schedule().await {
            Ok(n) => counts.schedule = n,
            Err((n, reason)) => {
                counts.schedule = n;
                return self.halted(Phase::Schedule, counts, reason);
            }
        }

        // Phase 3: zone data, fail-stop
        match self.phase_zone_data().await {
            Ok(n) => counts.zone_data = n,
            Err((n, reason)) => {
                counts.zone_data = n;
                return self.halted(Phase::ZoneData, counts, reason);
            }
        }

        // Phase 4: media uploads, independent and retryable per item
        counts.media = self.phase_media().await;

        info!(processed = counts.total(), "full processing run finished");
        RunOutcome::Completed(counts)
    }

    /// Run a single phase, with the same halt rules as the full run.
    pub async fn run_phase(&self, phase: Phase) -> RunOutcome {
        let Some(_guard) = self.try_begin() else {
            return RunOutcome::AlreadyRunning;
        };
        let mut counts = PhaseCounts::default();
        match phase {
            Phase::ZoneConfig => counts.zone_config = self.phase_zone_config().await,
            Phase::Schedule => match self.phase_schedule().await {
                Ok(n) => counts.schedule = n,
                Err((n, reason)) => {
                    counts.schedule = n;
                    return self.halted(phase, counts, reason);
                }
            },
            Phase::ZoneData => match self.phase_zone_data().await {
                Ok(n) => counts.zone_data = n,
                Err((n, reason)) => {
                    counts.zone_data = n;
                    return self.halted(phase, counts, reason);
                }
            },
            Phase::Media => counts.media = self.phase_media().await,
        }
        RunOutcome::Completed(counts)
    }

    /// Bounded-batch mode: up to `limit` oldest pending messages regardless
    /// of phase, each through the dispatcher, uniform delay, per-item
    /// failures logged and left pending.
    pub async fn run_batch(&self, limit: Option<usize>) -> RunOutcome {
        let Some(_guard) = self.try_begin() else {
            return RunOutcome::AlreadyRunning;
        };
        let limit = limit.unwrap_or(self.batch_size);
        let items = self
            .messages
            .list_pending(None::<fn(&MessageRecord) -> bool>, Some(limit));
        if items.is_empty() {
            info!("no pending messages for batch");
            return RunOutcome::Completed(PhaseCounts::default());
        }
        info!(count = items.len(), "processing bounded batch");

        let mut counts = PhaseCounts::default();
        for (i, msg) in items.iter().enumerate() {
            let strategy = self.dispatcher.dispatch(msg.code);
            match strategy.process(msg).await {
                Ok(Outcome::Completed(summary)) => {
                    if self.mark_message(msg, summary) {
                        counts.batch += 1;
                    }
                }
                Ok(Outcome::Skipped(reason)) => {
                    info!(id = %msg.id, reason = %reason, "record left pending");
                }
                Err(e) => {
                    error!(id = %msg.id, strategy = strategy.name(), error = %e, "batch item failed, record stays pending");
                }
            }
            if i + 1 < items.len() {
                sleep(self.delays.processing).await;
            }
        }
        RunOutcome::Completed(counts)
    }

    fn halted(&self, phase: Phase, counts: PhaseCounts, reason: Error) -> RunOutcome {
        error!(
            phase = %phase,
            processed = counts.total(),
            kind = reason.kind(),
            error = %reason,
            "run halted; pending records are untouched and the next run resumes from them"
        );
        RunOutcome::Halted {
            phase,
            counts,
            reason,
        }
    }

    fn mark_message(&self, msg: &MessageRecord, summary: String) -> bool {
        match self.messages.mark_processed(&msg.id, Some(summary)) {
            Ok(true) => true,
            Ok(false) => {
                warn!(id = %msg.id, "record vanished before it could be marked");
                false
            }
            Err(e) => {
                warn!(id = %msg.id, error = %e, "could not mark record processed");
                false
            }
        }
    }

    /// Phase 1. Sorted ascending by code so slot 1 configures before slot 2
    /// before slot 3 regardless of arrival order.
    async fn phase_zone_config(&self) -> usize {
        let mut items = self.messages.list_pending_by_codes(&ZONE_CONFIG_CODES);
        if items.is_empty() {
            info!("phase 1: no pending zone configurations");
            return 0;
        }
        items.sort_by_key(|m| m.code);
        info!(count = items.len(), "phase 1: processing zone configurations");

        let mut processed = 0;
        for (i, msg) in items.iter().enumerate() {
            let strategy = self.dispatcher.dispatch(msg.code);
            match strategy.process(msg).await {
                Ok(Outcome::Completed(summary)) => {
                    if self.mark_message(msg, summary) {
                        processed += 1;
                    }
                }
                Ok(Outcome::Skipped(reason)) => {
                    info!(id = %msg.id, reason = %reason, "zone configuration left pending");
                }
                Err(e) => {
                    // This phase does not halt the run
                    error!(id = %msg.id, error = %e, "zone configuration failed, record stays pending");
                }
            }
            if i + 1 < items.len() {
                sleep(self.delays.processing).await;
            }
        }
        processed
    }

    /// Phase 2. Any strategy error terminates the run.
    async fn phase_schedule(&self) -> Result<usize, (usize, Error)> {
        let items = self.messages.list_pending_by_codes(&[SCHEDULE_CODE]);
        if items.is_empty() {
            info!("phase 2: no pending schedules");
            return Ok(0);
        }
        info!(count = items.len(), "phase 2: processing schedules");

        let mut processed = 0;
        for (i, msg) in items.iter().enumerate() {
            match self.dispatcher.dispatch(msg.code).process(msg).await {
                Ok(Outcome::Completed(summary)) => {
                    if self.mark_message(msg, summary) {
                        processed += 1;
                    }
                }
                Ok(Outcome::Skipped(reason)) => {
                    info!(id = %msg.id, reason = %reason, "schedule left pending");
                }
                Err(e) => return Err((processed, e)),
            }
            if i + 1 < items.len() {
                sleep(self.delays.ia).await;
            }
        }
        Ok(processed)
    }

    /// Phase 3. Grouped by code (ascending), timestamp order within each
    /// group. Any strategy error terminates the run.
    async fn phase_zone_data(&self) -> Result<usize, (usize, Error)> {
        let items = self.messages.list_pending_by_codes(&ZONE_DATA_CODES);
        if items.is_empty() {
            info!("phase 3: no pending zone data");
            return Ok(0);
        }

        let mut by_code: BTreeMap<u8, Vec<&MessageRecord>> = BTreeMap::new();
        for msg in &items {
            by_code.entry(msg.code).or_default().push(msg);
        }
        info!(count = items.len(), groups = by_code.len(), "phase 3: processing zone data");

        let mut processed = 0;
        for (code, group) in by_code {
            info!(zone = code, count = group.len(), "processing zone group");
            for (i, msg) in group.iter().enumerate() {
                match self.dispatcher.dispatch(msg.code).process(msg).await {
                    Ok(Outcome::Completed(summary)) => {
                        if self.mark_message(msg, summary) {
                            processed += 1;
                        }
                    }
                    Ok(Outcome::Skipped(reason)) => {
                        info!(id = %msg.id, reason = %reason, "zone data left pending");
                    }
                    Err(e) => return Err((processed, e)),
                }
                if i + 1 < group.len() {
                    sleep(self.delays.processing + self.delays.ia).await;
                }
            }
        }
        Ok(processed)
    }

    /// Phase 4. Only media with a valid zone code is eligible; the rest
    /// stays pending indefinitely rather than being discarded. Failures are
    /// per-item and never halt the run.
    async fn phase_media(&self) -> usize {
        let items = self
            .media
            .list_pending(Some(|m: &MediaRecord| ZONE_DATA_CODES.contains(&m.code())), None);
        if items.is_empty() {
            info!("phase 4: no pending media with valid zone codes");
            return 0;
        }
        info!(count = items.len(), "phase 4: uploading media");

        let mut processed = 0;
        for (i, media) in items.iter().enumerate() {
            match self.media_strategy.process(media).await {
                Ok(Outcome::Completed(summary)) => {
                    match self.media.mark_processed(&media.id, Some(summary)) {
                        Ok(true) => processed += 1,
                        Ok(false) => warn!(id = %media.id, "media record vanished before marking"),
                        Err(e) => warn!(id = %media.id, error = %e, "could not mark media processed"),
                    }
                }
                Ok(Outcome::Skipped(reason)) => {
                    info!(id = %media.id, reason = %reason, "media left pending");
                }
                Err(e) => {
                    error!(id = %media.id, file = %media.file_name, error = %e, "upload failed, media stays pending");
                }
            }
            if i + 1 < items.len() {
                // Uploads get extra headroom
                sleep(self.delays.processing * 2).await;
            }
        }
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MediaKind;
    use crate::collab::testing::{MockExtractor, RecordingRows, RecordingUploader};
    use crate::collab::{ScheduleFields, ZoneDataFields};
    use crate::strategy::media_strategy;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        processor: Arc<PhasedProcessor>,
        messages: CaptureStore<MessageRecord>,
        media: CaptureStore<MediaRecord>,
        registry: ZoneRegistry,
        extractor: Arc<MockExtractor>,
        rows: Arc<RecordingRows>,
        uploader: Arc<RecordingUploader>,
    }

    fn harness(extractor: MockExtractor) -> Harness {
        let dir = TempDir::new().unwrap();
        let backup = dir.path().join("backups");
        let messages: CaptureStore<MessageRecord> =
            CaptureStore::new(dir.path().join("messages.json"), backup.clone());
        let media: CaptureStore<MediaRecord> =
            CaptureStore::new(dir.path().join("media.json"), backup);
        let registry = ZoneRegistry::new(dir.path().join("zones.json"));
        let extractor = Arc::new(extractor);
        let rows = Arc::new(RecordingRows::default());
        let uploader = Arc::new(RecordingUploader::default());

        let dispatcher = Dispatcher::new(
            registry.clone(),
            extractor.clone(),
            rows.clone(),
        );
        let processor = Arc::new(PhasedProcessor::new(
            messages.clone(),
            media.clone(),
            registry.clone(),
            dispatcher,
            media_strategy(registry.clone(), uploader.clone()),
            Delays::none(),
            10,
        ));
        Harness {
            _dir: dir,
            processor,
            messages,
            media,
            registry,
            extractor,
            rows,
            uploader,
        }
    }

    fn text(h: &Harness, body: &str, offset_secs: i64) -> MessageRecord {
        h.messages
            .append(MessageRecord::from_text(
                body,
                "Ana",
                Utc::now() + ChronoDuration::seconds(offset_secs),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn test_scenario_zone_configuration_end_to_end() {
        let h = harness(MockExtractor::default());
        let rec = text(&h, "11 Riverside", 0);

        let outcome = h.processor.run_phase(Phase::ZoneConfig).await;
        assert!(matches!(outcome, RunOutcome::Completed(c) if c.zone_config == 1));

        let zone = h.registry.get_zone(1).unwrap();
        assert_eq!(zone.name.as_deref(), Some("RIVERSIDE"));
        assert!(zone.active);

        let stored = h.messages.read_all();
        assert_eq!(stored[0].id, rec.id);
        assert!(stored[0].processed);
        assert!(stored[0].result.as_deref().unwrap().contains("RIVERSIDE"));
    }

    #[tokio::test]
    async fn test_scenario_inactive_zone_leaves_record_pending() {
        let h = harness(MockExtractor::default());
        text(&h, "1 Jane Doe, Main St", 0);

        let outcome = h.processor.run_phase(Phase::ZoneData).await;
        assert!(matches!(outcome, RunOutcome::Completed(c) if c.zone_data == 0));

        assert!(!h.messages.read_all()[0].processed);
        assert!(h.rows.appended().is_empty());
        assert_eq!(h.extractor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_scenario_rate_limit_halts_run() {
        let extractor = MockExtractor::with_schedule(vec![Err(Error::RateLimited {
            retry_after_secs: 120,
        })]);
        let h = harness(extractor);
        h.registry.set_zone(1, "riverside").unwrap();
        text(&h, "5 meeting friday", 0);
        text(&h, "5 another meeting", 10);
        text(&h, "1 resident data", 20);

        let outcome = h.processor.run_all().await;
        match outcome {
            RunOutcome::Halted {
                phase,
                counts,
                reason,
            } => {
                assert_eq!(phase, Phase::Schedule);
                assert_eq!(counts.total(), 0);
                assert!(matches!(reason, Error::RateLimited { retry_after_secs: 120 }));
            }
            other => panic!("expected halt, got {other:?}"),
        }

        // Nothing was marked, later phases never ran
        for rec in h.messages.read_all() {
            assert!(!rec.processed);
        }
        assert_eq!(h.extractor.call_count(), 1, "halt after the failing record");
        assert!(h.rows.appended().is_empty());
        assert_eq!(h.uploader.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_auth_error_halts_zone_data_phase() {
        let extractor = MockExtractor::with_zone_data(vec![Err(Error::Auth("bad key".into()))]);
        let h = harness(extractor);
        h.registry.set_zone(2, "oak").unwrap();
        text(&h, "2 resident report", 0);

        let outcome = h.processor.run_all().await;
        assert!(
            matches!(outcome, RunOutcome::Halted { phase: Phase::ZoneData, reason: Error::Auth(_), .. })
        );
        assert!(!h.messages.read_all()[0].processed);
    }

    #[tokio::test]
    async fn test_full_run_configures_then_files_zone_data() {
        // Phase 3 observes the zone written by phase 1 in the same run
        let extractor = MockExtractor::with_zone_data(vec![Ok(Some(ZoneDataFields {
            full_name: Some("Jane Doe".into()),
            ..Default::default()
        }))]);
        let h = harness(extractor);
        text(&h, "11 riverside", 0);
        text(&h, "1 Jane Doe lives here", 10);

        let outcome = h.processor.run_all().await;
        match outcome {
            RunOutcome::Completed(counts) => {
                assert_eq!(counts.zone_config, 1);
                assert_eq!(counts.zone_data, 1);
            }
            other => panic!("expected completion, got {other:?}"),
        }

        let appended = h.rows.appended();
        // Separator row from configuration plus the data row
        assert_eq!(appended.len(), 2);
        assert_eq!(appended[1].0, "RIVERSIDE");
        assert_eq!(appended[1].1.len(), 11);
        assert!(h.messages.read_all().iter().all(|r| r.processed));
    }

    #[tokio::test]
    async fn test_zone_config_phase_processes_in_slot_order() {
        let h = harness(MockExtractor::default());
        // Arrival order 13, 11: slot order must win
        text(&h, "13 hillcrest", 0);
        text(&h, "11 riverside", 10);

        h.processor.run_phase(Phase::ZoneConfig).await;

        let appended = h.rows.appended();
        assert_eq!(appended[0].0, "RIVERSIDE");
        assert_eq!(appended[1].0, "HILLCREST");
    }

    #[tokio::test]
    async fn test_media_phase_skips_invalid_codes_and_survives_failures() {
        let h = harness(MockExtractor::default());
        h.registry.set_zone(1, "riverside").unwrap();

        let dir = TempDir::new().unwrap();
        let file_a = dir.path().join("a.jpg");
        let file_b = dir.path().join("b.jpg");
        std::fs::write(&file_a, b"a").unwrap();
        std::fs::write(&file_b, b"b").unwrap();

        let first = h
            .media
            .append(MediaRecord::from_caption(
                "1 first",
                "Luis",
                Utc::now(),
                MediaKind::Image,
                &file_a,
                1,
            ))
            .unwrap();
        let second = h
            .media
            .append(MediaRecord::from_caption(
                "1 second",
                "Luis",
                Utc::now() + ChronoDuration::seconds(5),
                MediaKind::Image,
                &file_b,
                1,
            ))
            .unwrap();
        // No zone code: never eligible, never discarded
        let uncoded = h
            .media
            .append(MediaRecord::from_caption(
                "just a photo",
                "Luis",
                Utc::now() + ChronoDuration::seconds(9),
                MediaKind::Image,
                Path::new("/tmp/c.jpg"),
                1,
            ))
            .unwrap();

        *h.uploader.fail_next.lock().unwrap() = Some(Error::Unavailable("quota".into()));
        let outcome = h.processor.run_phase(Phase::Media).await;
        assert!(matches!(outcome, RunOutcome::Completed(c) if c.media == 1));

        let records = h.media.read_all();
        let get = |id: &str| records.iter().find(|r| r.id == id).unwrap();
        assert!(!get(&first.id).processed, "failed upload stays pending");
        assert!(get(&second.id).processed);
        assert!(get(&second.id).uploaded);
        assert!(!get(&uncoded.id).processed);
        assert_eq!(h.uploader.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_bounded_batch_marks_through_dispatcher() {
        let extractor = MockExtractor::with_schedule(vec![Ok(Some(ScheduleFields::default()))]);
        let h = harness(extractor);
        text(&h, "no code chatter", 0);
        text(&h, "5 meeting", 10);
        text(&h, "also chatter", 20);

        let outcome = h.processor.run_batch(Some(2)).await;
        assert!(matches!(outcome, RunOutcome::Completed(c) if c.batch == 2));

        let records = h.messages.read_all();
        let processed: usize = records.iter().filter(|r| r.processed).count();
        assert_eq!(processed, 2, "only the two oldest were in the batch");
    }

    #[tokio::test]
    async fn test_reentrant_invocation_reports_already_running() {
        let mut extractor = MockExtractor::with_schedule(vec![Ok(None)]);
        extractor.delay = Some(std::time::Duration::from_millis(300));
        let h = harness(extractor);
        text(&h, "5 slow one", 0);

        let processor = h.processor.clone();
        let running = tokio::spawn(async move { processor.run_all().await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let second = h.processor.run_batch(None).await;
        assert!(matches!(second, RunOutcome::AlreadyRunning));

        let first = running.await.unwrap();
        assert!(matches!(first, RunOutcome::Completed(_)));
    }
}
