mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    dir_entries, in_process, loader, native, recorder, segment_bytes, test_config, ConcatPlugin,
    FakeFetcher, FfmpegEmulator,
};
use segmerge_core::engine::EngineKind;
use segmerge_core::loader::ExecutionMode;
use segmerge_core::media::MediaRef;
use segmerge_core::merge::{JobState, MergeError, MergeOptions, PrefetchPool};
use segmerge_core::plan::{PlanEntry, SegmentKey};
use tempfile::tempdir;
use tokio::time::Instant;

fn expected(labels: &[&str]) -> Vec<u8> {
    labels.iter().flat_map(|label| segment_bytes(label)).collect()
}

fn eleven_entries() -> Vec<PlanEntry> {
    (0..11).map(|i| PlanEntry::new(format!("S{i}"))).collect()
}

#[tokio::test]
async fn in_process_merge_preserves_playlist_order() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let fetcher = Arc::new(FakeFetcher::new());
    let executor = Arc::new(FfmpegEmulator::new());
    let loader = loader(&config, ExecutionMode::Filesystem, Arc::clone(&fetcher));
    let orchestrator = in_process(&config, Arc::clone(&loader), Arc::clone(&fetcher), Arc::clone(&executor), 2);
    let plan = vec![
        PlanEntry::new("A").with_repeat(2),
        PlanEntry::new("B").with_repeat(1).with_explanation(),
    ];

    let outcome = orchestrator
        .merge(&plan, Some("token"), MergeOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.engine, EngineKind::InProcess);
    assert_eq!(outcome.segments, 4);
    assert_eq!(outcome.chunks, 2);
    assert_eq!(outcome.leftover_entries, 0);
    let MediaRef::Blob(id) = outcome.media else {
        panic!("in-process output should be a blob");
    };
    assert_eq!(
        loader.blobs().read(&id).unwrap().as_slice(),
        expected(&["A", "A", "B_explanation", "B"])
    );
    // the repeated segment is fetched once
    assert_eq!(fetcher.calls_for("A"), 1);
    assert_eq!(fetcher.calls().len(), 3);
    assert!(dir_entries(&config.cache_dir().join("engine")).is_empty());
    assert!(!orchestrator.coordinator().is_busy());
}

#[tokio::test]
async fn chunk_count_follows_device_profile() {
    for (concurrency, chunks) in [(2, 4), (8, 3)] {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let fetcher = Arc::new(FakeFetcher::new());
        let executor = Arc::new(FfmpegEmulator::new());
        let loader = loader(&config, ExecutionMode::Filesystem, Arc::clone(&fetcher));
        let orchestrator = in_process(&config, loader, fetcher, Arc::clone(&executor), concurrency);

        let outcome = orchestrator
            .merge(&eleven_entries(), None, MergeOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.chunks, chunks);
        // one concat per chunk plus the final concat
        assert_eq!(executor.calls().len(), chunks + 1);
    }
}

#[tokio::test]
async fn single_chunk_uses_plain_stream_copy() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let fetcher = Arc::new(FakeFetcher::new());
    let executor = Arc::new(FfmpegEmulator::new());
    let loader = loader(&config, ExecutionMode::Filesystem, Arc::clone(&fetcher));
    let orchestrator = in_process(&config, Arc::clone(&loader), fetcher, Arc::clone(&executor), 2);

    let outcome = orchestrator
        .merge(
            &[PlanEntry::new("A"), PlanEntry::new("B")],
            None,
            MergeOptions::default(),
        )
        .await
        .unwrap();

    let calls = executor.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].iter().any(|arg| arg == "concat"));
    assert!(!calls[1].iter().any(|arg| arg == "concat"));
    assert_eq!(calls[1].last().unwrap(), "output_final.mp4");
    let MediaRef::Blob(id) = outcome.media else {
        panic!("in-process output should be a blob");
    };
    assert_eq!(loader.blobs().read(&id).unwrap().as_slice(), expected(&["A", "B"]));
}

#[tokio::test]
async fn progress_is_monotone_and_ends_at_one() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let fetcher = Arc::new(FakeFetcher::new());
    let executor = Arc::new(FfmpegEmulator::new());
    let loader = loader(&config, ExecutionMode::Filesystem, Arc::clone(&fetcher));
    let orchestrator = in_process(&config, loader, fetcher, executor, 2);
    let (callback, events) = recorder();

    orchestrator
        .merge(
            &eleven_entries(),
            None,
            MergeOptions::default().with_progress(callback),
        )
        .await
        .unwrap();

    let events = events.lock().unwrap();
    assert!(events.len() > 11);
    let (last, rest) = events.split_last().unwrap();
    assert_eq!(last.fraction, 1.0);
    assert_eq!(last.status, JobState::Ready);
    assert!(rest.iter().all(|event| event.fraction <= 0.99));
    assert!(events
        .windows(2)
        .all(|pair| pair[0].fraction <= pair[1].fraction));
    assert_eq!(events[0].status, JobState::Downloading);
}

#[tokio::test]
async fn failed_concat_still_cleans_up() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let fetcher = Arc::new(FakeFetcher::new());
    // second chunk concat fails
    let executor = Arc::new(FfmpegEmulator::failing_on_call(1));
    let loader = loader(&config, ExecutionMode::Portable, Arc::clone(&fetcher));
    let orchestrator = in_process(&config, Arc::clone(&loader), fetcher, executor, 2);
    let (callback, events) = recorder();

    let err = orchestrator
        .merge(
            &eleven_entries(),
            None,
            MergeOptions::default().with_progress(callback),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MergeError::Engine(_)));
    assert_eq!(err.code(), "engine");
    assert!(dir_entries(&config.cache_dir().join("engine")).is_empty());
    // portable-mode segment blobs are transient too
    assert!(loader.blobs().is_empty());
    assert_eq!(events.lock().unwrap().last().unwrap().status, JobState::Error);
    assert!(!orchestrator.coordinator().is_busy());
}

#[tokio::test]
async fn concurrent_merge_is_rejected_without_work() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let fetcher = Arc::new(FakeFetcher::new().with_delay(Duration::from_millis(20)));
    let executor = Arc::new(FfmpegEmulator::new());
    let loader = loader(&config, ExecutionMode::Filesystem, Arc::clone(&fetcher));
    let orchestrator = in_process(&config, loader, Arc::clone(&fetcher), executor, 2);
    let first_plan = vec![PlanEntry::new("A"), PlanEntry::new("B")];
    let second_plan = vec![PlanEntry::new("Z")];

    let first = orchestrator.merge(&first_plan, None, MergeOptions::default());
    let second = async {
        while !orchestrator.coordinator().is_busy() {
            tokio::task::yield_now().await;
        }
        orchestrator
            .merge(&second_plan, None, MergeOptions::default())
            .await
    };
    let (first, second) = tokio::join!(first, second);

    assert!(first.is_ok());
    assert!(matches!(second, Err(MergeError::Busy)));
    assert_eq!(fetcher.calls_for("Z"), 0);
}

#[tokio::test]
async fn empty_playlist_fails_before_any_work() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let fetcher = Arc::new(FakeFetcher::new());
    let executor = Arc::new(FfmpegEmulator::new());
    let loader = loader(&config, ExecutionMode::Filesystem, Arc::clone(&fetcher));
    let orchestrator = in_process(&config, loader, Arc::clone(&fetcher), Arc::clone(&executor), 2);
    let mut excluded = PlanEntry::new("A");
    excluded.excluded = true;

    let err = orchestrator
        .merge(&[excluded], None, MergeOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MergeError::EmptyPlaylist));
    assert_eq!(err.to_string(), "No videos to merge in the asana list");
    assert!(fetcher.calls().is_empty());
    assert!(executor.calls().is_empty());
    assert!(!config.cache_dir().join("engine").exists());
}

#[tokio::test]
async fn missing_ffmpeg_surfaces_a_remediation_hint() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let fetcher = Arc::new(FakeFetcher::new());
    let executor = Arc::new(FfmpegEmulator::without_binary());
    let loader = loader(&config, ExecutionMode::Filesystem, Arc::clone(&fetcher));
    let orchestrator = in_process(&config, loader, Arc::clone(&fetcher), executor, 2);

    let err = orchestrator
        .merge(&[PlanEntry::new("A")], None, MergeOptions::default())
        .await
        .unwrap_err();
    match &err {
        MergeError::Environment { hint, .. } => assert!(hint.contains("engine.strategy")),
        other => panic!("expected environment error, got {other:?}"),
    }
    assert!(fetcher.calls().is_empty());
}

#[tokio::test]
async fn native_merge_prefetches_and_moves_output() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let fetcher = Arc::new(FakeFetcher::new());
    let plugin = Arc::new(ConcatPlugin::default());
    let loader = loader(&config, ExecutionMode::Filesystem, Arc::clone(&fetcher));
    let orchestrator = native(&config, loader, Arc::clone(&fetcher), Arc::clone(&plugin));
    let plan = vec![
        PlanEntry::new("A").with_repeat(3),
        PlanEntry::new("B").with_explanation(),
    ];
    let (callback, events) = recorder();

    let outcome = orchestrator
        .merge(&plan, None, MergeOptions::default().with_progress(callback))
        .await
        .unwrap();

    assert_eq!(outcome.engine, EngineKind::Native);
    assert_eq!(outcome.chunks, 2);
    let MediaRef::LocalFile(path) = &outcome.media else {
        panic!("native output should be a local file");
    };
    assert!(path.starts_with(config.output_dir()));
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("merged_"));
    assert_eq!(
        std::fs::read(path).unwrap(),
        expected(&["A", "A", "A", "B_explanation", "B"])
    );
    assert_eq!(fetcher.calls().len(), 3);
    // two chunk merges and the final merge of their outputs
    let requests = plugin.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].video_paths.len(), 3);
    assert!(requests[1].video_paths[0].ends_with("B_explanation_720p.mp4"));
    // cached segments stay, session storage does not
    assert!(dir_entries(&config.cache_dir())
        .iter()
        .all(|entry| !entry.to_string_lossy().contains("video_merge_")));
    assert_eq!(dir_entries(&config.data_dir().join("asana-videos")).len(), 3);
    let events = events.lock().unwrap();
    assert_eq!(events.last().unwrap().fraction, 1.0);
    assert!(events
        .windows(2)
        .all(|pair| pair[0].fraction <= pair[1].fraction));
}

#[tokio::test]
async fn native_prefetch_skips_timed_out_segments() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.prefetch.task_timeout_seconds = 1;
    let fetcher = Arc::new(FakeFetcher::new().hanging_on("SLOW"));
    let plugin = Arc::new(ConcatPlugin::default());
    let loader = loader(&config, ExecutionMode::Filesystem, Arc::clone(&fetcher));
    let orchestrator = native(&config, loader, Arc::clone(&fetcher), plugin);
    let plan = vec![PlanEntry::new("A"), PlanEntry::new("SLOW"), PlanEntry::new("C")];

    let outcome = orchestrator
        .merge(&plan, None, MergeOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.segments, 2);
    assert_eq!(outcome.skipped, vec![SegmentKey::main("SLOW")]);
    let path = outcome.media.local_path().unwrap();
    assert_eq!(std::fs::read(path).unwrap(), expected(&["A", "C"]));
}

#[tokio::test]
async fn native_merge_without_any_local_segment_fails() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let fetcher = Arc::new(FakeFetcher::failing());
    let plugin = Arc::new(ConcatPlugin::default());
    let loader = loader(&config, ExecutionMode::Filesystem, Arc::clone(&fetcher));
    let orchestrator = native(&config, loader, Arc::clone(&fetcher), Arc::clone(&plugin));

    let err = orchestrator
        .merge(
            &[PlanEntry::new("A"), PlanEntry::new("B")],
            None,
            MergeOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MergeError::NoValidSegments));
    assert_eq!(err.to_string(), "No valid videos to merge");
    // three prefetch attempts and one staging download per segment
    assert_eq!(fetcher.calls().len(), 8);
    assert!(plugin.requests().is_empty());
    assert!(dir_entries(&config.cache_dir()).is_empty());
}

#[tokio::test]
async fn in_process_merge_skips_unavailable_segment() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let fetcher = Arc::new(FakeFetcher::new().failing_on("GONE"));
    let executor = Arc::new(FfmpegEmulator::new());
    let loader = loader(&config, ExecutionMode::Filesystem, Arc::clone(&fetcher));
    let orchestrator = in_process(&config, Arc::clone(&loader), Arc::clone(&fetcher), executor, 2);
    let plan = vec![PlanEntry::new("A"), PlanEntry::new("GONE"), PlanEntry::new("B")];

    let outcome = orchestrator
        .merge(&plan, None, MergeOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.segments, 2);
    assert_eq!(outcome.skipped, vec![SegmentKey::main("GONE")]);
    let MediaRef::Blob(id) = outcome.media else {
        panic!("in-process output should be a blob");
    };
    assert_eq!(loader.blobs().read(&id).unwrap().as_slice(), expected(&["A", "B"]));
    // three loader attempts plus one staging download
    assert_eq!(fetcher.calls_for("GONE"), 4);
    assert!(dir_entries(&config.cache_dir().join("engine")).is_empty());
}

#[tokio::test]
async fn native_merge_skips_unavailable_segment() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let fetcher = Arc::new(FakeFetcher::new().failing_on("GONE"));
    let plugin = Arc::new(ConcatPlugin::default());
    let loader = loader(&config, ExecutionMode::Filesystem, Arc::clone(&fetcher));
    let orchestrator = native(&config, loader, Arc::clone(&fetcher), Arc::clone(&plugin));
    let plan = vec![
        PlanEntry::new("A"),
        PlanEntry::new("GONE").with_repeat(2),
        PlanEntry::new("B"),
    ];

    let outcome = orchestrator
        .merge(&plan, None, MergeOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.segments, 2);
    assert_eq!(outcome.skipped, vec![SegmentKey::main("GONE")]);
    let path = outcome.media.local_path().unwrap();
    assert_eq!(std::fs::read(path).unwrap(), expected(&["A", "B"]));
    // the repeat is not retried once the segment is known to be unavailable
    assert_eq!(fetcher.calls_for("GONE"), 4);
    assert!(plugin
        .requests()
        .iter()
        .flat_map(|request| request.video_paths.iter())
        .all(|path| !path.contains("GONE")));
}

#[tokio::test]
async fn native_merge_accepts_file_uri_from_plugin() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let fetcher = Arc::new(FakeFetcher::new());
    let plugin = Arc::new(ConcatPlugin::answering_with_uri());
    let loader = loader(&config, ExecutionMode::Filesystem, Arc::clone(&fetcher));
    let orchestrator = native(&config, loader, fetcher, plugin);

    let outcome = orchestrator
        .merge(
            &[PlanEntry::new("A"), PlanEntry::new("B")],
            None,
            MergeOptions::default(),
        )
        .await
        .unwrap();

    let path = outcome.media.local_path().unwrap();
    assert!(path.starts_with(config.output_dir()));
    assert_eq!(std::fs::read(path).unwrap(), expected(&["A", "B"]));
}

#[tokio::test]
async fn native_plugin_failure_still_cleans_up() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let fetcher = Arc::new(FakeFetcher::new());
    // second chunk merge fails
    let plugin = Arc::new(ConcatPlugin::failing_on_request(1));
    let loader = loader(&config, ExecutionMode::Filesystem, Arc::clone(&fetcher));
    let orchestrator = native(&config, Arc::clone(&loader), fetcher, Arc::clone(&plugin));
    let (callback, events) = recorder();

    let err = orchestrator
        .merge(
            &eleven_entries(),
            None,
            MergeOptions::default().with_progress(callback),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MergeError::Engine(_)));
    assert_eq!(plugin.requests().len(), 2);
    assert!(dir_entries(&config.cache_dir())
        .iter()
        .all(|entry| !entry.to_string_lossy().contains("video_merge_")));
    assert!(dir_entries(&config.output_dir()).is_empty());
    assert!(loader.blobs().is_empty());
    assert_eq!(events.lock().unwrap().last().unwrap().status, JobState::Error);
    assert!(!orchestrator.coordinator().is_busy());
}

#[tokio::test]
async fn dropped_merge_removes_its_session() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let fetcher = Arc::new(FakeFetcher::new().hanging_on("B"));
    let executor = Arc::new(FfmpegEmulator::new());
    let loader = loader(&config, ExecutionMode::Filesystem, Arc::clone(&fetcher));
    let orchestrator = in_process(&config, loader, Arc::clone(&fetcher), executor, 2);
    let plan = vec![PlanEntry::new("A"), PlanEntry::new("B")];

    let abandoned = tokio::time::timeout(
        Duration::from_millis(500),
        orchestrator.merge(&plan, None, MergeOptions::default()),
    )
    .await;

    assert!(abandoned.is_err());
    assert_eq!(fetcher.calls_for("B"), 1);
    assert!(dir_entries(&config.cache_dir().join("engine")).is_empty());
    assert!(!orchestrator.coordinator().is_busy());
}

#[tokio::test(start_paused = true)]
async fn prefetch_workers_are_staggered_and_cool_down() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.prefetch.workers = 2;
    config.prefetch.stagger_ms = 500;
    config.prefetch.cooldown_ms = 200;
    let fetcher = Arc::new(FakeFetcher::new());
    let loader = loader(&config, ExecutionMode::Portable, Arc::clone(&fetcher));
    let keys: Vec<SegmentKey> = ["A", "B", "C", "D"].into_iter().map(SegmentKey::main).collect();
    let started = Instant::now();
    let ticks = std::sync::Mutex::new(Vec::new());
    let on_progress = |done: usize, total: usize| {
        ticks
            .lock()
            .unwrap()
            .push((done, total, started.elapsed().as_millis()));
    };

    let report = PrefetchPool::new(&loader, &config.prefetch)
        .run(keys, None, None, &on_progress)
        .await;

    assert_eq!(report.resolved.len(), 4);
    assert!(report.failed.is_empty());
    assert_eq!(
        ticks.into_inner().unwrap(),
        vec![(1, 4, 0), (2, 4, 200), (3, 4, 400), (4, 4, 500)]
    );
    // the last worker still cools down before returning
    assert_eq!(started.elapsed(), Duration::from_millis(700));
}
