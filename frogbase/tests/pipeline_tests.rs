//! End-to-end add pipeline tests
//!
//! Run against a temporary library with the offline transcriber chain
//! (captions, silence gate, no model backend) and the hashing embedder.

mod helpers;

use frogbase::db::media::{load_media, MediaFilter};
use frogbase::db::segments::load_segments_for_media;
use frogbase::models::{MediaStatus, OutcomeStatus};
use frogbase_common::events::{IngestEvent, IngestStage};
use helpers::{source, TestLibrary};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_invalid_source_does_not_stop_valid_one() {
    let t = TestLibrary::new().await;
    let frog = t.captioned_wav("frog", &[(0.0, 2.0, "a squeaky frog croaks")]);

    let summary = t
        .library
        .add(&["/definitely/not/here.mp3".to_string(), source(&frog)])
        .await;

    assert_eq!(summary.outcomes.len(), 2);
    assert_eq!(summary.outcomes[0].status, OutcomeStatus::Failed);
    assert_eq!(summary.outcomes[0].error_kind.as_deref(), Some("invalid_source"));
    assert_eq!(summary.outcomes[1].status, OutcomeStatus::Indexed);
    assert_eq!(summary.outcomes[1].segments, 1);
    assert_eq!(summary.outcomes[1].indexed, 1);
    assert_eq!(summary.indexed(), 1);
    assert_eq!(summary.failed(), 1);
    assert_eq!(t.library.index().len().await, 1);
}

#[tokio::test]
async fn test_silent_file_is_indexed_with_zero_segments() {
    let t = TestLibrary::new().await;
    let quiet = t.silent_wav("quiet", 10.0);

    let summary = t.library.add(&[source(&quiet)]).await;

    assert_eq!(summary.indexed(), 1, "outcomes: {:?}", summary.outcomes);
    let media_id = summary.outcomes[0].media_id.clone().unwrap();
    let item = load_media(t.library.pool(), &media_id).await.unwrap().unwrap();
    assert_eq!(item.status, MediaStatus::Indexed);
    let duration = item.duration_seconds.unwrap();
    assert!((duration - 10.0).abs() < 0.1, "duration {}", duration);

    let segments = load_segments_for_media(t.library.pool(), &media_id).await.unwrap();
    assert!(segments.is_empty());
    assert!(t.library.index().is_empty().await);
}

#[tokio::test]
async fn test_uncaptioned_speech_without_backend_fails_transcription() {
    let t = TestLibrary::new().await;
    let talk = t.uncaptioned_wav("talk");

    let summary = t.library.add(&[source(&talk)]).await;

    assert_eq!(summary.failed(), 1);
    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.error_kind.as_deref(), Some("transcription_error"));

    let item = load_media(t.library.pool(), outcome.media_id.as_ref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.status, MediaStatus::TranscriptionFailed);
    assert!(item.error.is_some());
    assert!(item.local_path.is_some(), "fetched file stays in the library");
}

#[tokio::test]
async fn test_segments_are_ordered_and_clamped_to_duration() {
    let t = TestLibrary::new().await;
    let frog = t.captioned_wav(
        "pond",
        &[
            (1.5, 2.5, "second line"),
            (0.0, 2.0, "first line"),
            (2.8, 9.0, "runs past the end"),
        ],
    );

    let summary = t.library.add(&[source(&frog)]).await;
    let media_id = summary.outcomes[0].media_id.clone().unwrap();
    let segments = load_segments_for_media(t.library.pool(), &media_id).await.unwrap();

    let spans: Vec<(f64, f64)> = segments.iter().map(|s| (s.start_seconds, s.end_seconds)).collect();
    assert_eq!(spans.len(), 3);
    assert_eq!(spans[0], (0.0, 1.5));
    assert_eq!(spans[1], (1.5, 2.5));
    assert_eq!(spans[2].0, 2.8);
    assert!((spans[2].1 - 3.0).abs() < 0.01);

    let numbers: Vec<u32> = segments.iter().map(|s| s.number).collect();
    assert_eq!(numbers, vec![0, 1, 2]);
    assert!(segments.iter().all(|s| s.generated_by.starts_with("captions")));
}

#[tokio::test]
async fn test_readding_indexed_item_is_skipped() {
    let t = TestLibrary::new().await;
    let frog = t.captioned_wav("frog", &[(0.0, 2.0, "ribbit ribbit")]);

    let first = t.library.add(&[source(&frog)]).await;
    assert_eq!(first.indexed(), 1);
    assert_eq!(t.transcriber.calls(), 1);

    let second = t.library.add(&[source(&frog)]).await;
    assert_eq!(second.skipped(), 1);
    assert_eq!(second.indexed(), 0);
    assert_eq!(t.transcriber.calls(), 1, "skipped items are not transcribed");
    assert_eq!(t.library.index().len().await, 1);
}

#[tokio::test]
async fn test_failed_item_resumes_without_refetching() {
    let t = TestLibrary::new().await;
    let talk = t.uncaptioned_wav("talk");

    let first = t.library.add(&[source(&talk)]).await;
    assert_eq!(first.failed(), 1);
    let media_id = first.outcomes[0].media_id.clone().unwrap();

    // Captions appear next to the copied file; the retry picks them up
    let item = load_media(t.library.pool(), &media_id).await.unwrap().unwrap();
    let stored = t.library.dir().join(item.local_path.as_ref().unwrap());
    helpers::write_vtt(&stored, &[(0.0, 2.0, "late captions")]).unwrap();
    std::fs::remove_file(&talk).unwrap();

    let second = t.library.add(&[source(&talk)]).await;
    assert_eq!(second.outcomes[0].status, OutcomeStatus::Failed);
    assert_eq!(
        second.outcomes[0].error_kind.as_deref(),
        Some("invalid_source"),
        "a vanished source cannot be resolved"
    );

    // Same file back in place: resumes at transcription
    helpers::generate_test_wav(&talk, &helpers::AudioConfig::default()).unwrap();
    let third = t.library.add(&[source(&talk)]).await;
    assert_eq!(third.indexed(), 1, "outcomes: {:?}", third.outcomes);
    let segments = load_segments_for_media(t.library.pool(), &media_id).await.unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].text, "late captions");
}

#[tokio::test]
async fn test_duplicate_sources_in_one_batch_run_once() {
    let t = TestLibrary::new().await;
    let frog = t.captioned_wav("frog", &[(0.0, 2.0, "ribbit")]);

    let summary = t
        .library
        .add(&[source(&frog), source(&frog), source(t.media.path())])
        .await;

    assert_eq!(summary.outcomes.len(), 1);
    assert_eq!(summary.indexed(), 1);
    assert_eq!(t.transcriber.calls(), 1);
}

#[tokio::test]
async fn test_directory_source_adds_every_file() {
    let t = TestLibrary::new().await;
    t.captioned_wav("a", &[(0.0, 1.0, "alpha frog")]);
    t.captioned_wav("b", &[(0.0, 1.0, "beta frog")]);
    t.silent_wav("c", 2.0);

    let summary = t.library.add(&[source(t.media.path())]).await;

    assert_eq!(summary.outcomes.len(), 3);
    assert_eq!(summary.indexed(), 3, "outcomes: {:?}", summary.outcomes);
    assert_eq!(t.library.index().len().await, 2);

    let listed = t.library.list_media(&MediaFilter::default()).await.unwrap();
    assert_eq!(listed.len(), 3);
    assert!(listed.iter().all(|m| m.status == MediaStatus::Indexed));
}

#[tokio::test]
async fn test_remote_playlist_and_fetch_failure() {
    let t = TestLibrary::new().await;

    let summary = t
        .library
        .add(&[
            "https://www.youtube.com/playlist?list=PLfrogs".to_string(),
            "https://www.youtube.com/watch?v=unavailable".to_string(),
        ])
        .await;

    assert_eq!(summary.outcomes.len(), 3);
    assert_eq!(summary.indexed(), 2, "outcomes: {:?}", summary.outcomes);
    assert_eq!(summary.outcomes[2].error_kind.as_deref(), Some("fetch_error"));

    let failed_id = summary.outcomes[2].media_id.clone().unwrap();
    let failed = load_media(t.library.pool(), &failed_id).await.unwrap().unwrap();
    assert_eq!(failed.status, MediaStatus::FetchFailed);

    let hits = t.library.search("remote frog chorus", 5).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.media.source_kind.is_remote()));
}

#[tokio::test]
async fn test_empty_playlist_reports_one_failure() {
    let t = TestLibrary::new().await;

    let summary = t
        .library
        .add(&["https://www.youtube.com/playlist?list=PLempty".to_string()])
        .await;

    assert_eq!(summary.outcomes.len(), 1, "outcomes: {:?}", summary.outcomes);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.outcomes[0].error_kind.as_deref(), Some("fetch_error"));
}

#[tokio::test]
async fn test_cancelled_batch_starts_nothing() {
    let t = TestLibrary::new().await;
    let frog = t.captioned_wav("frog", &[(0.0, 2.0, "ribbit")]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = t.library.add_with_cancel(&[source(&frog)], cancel).await;

    assert_eq!(summary.cancelled(), 1);
    assert_eq!(summary.outcomes[0].error_kind.as_deref(), Some("cancelled"));
    assert_eq!(t.transcriber.calls(), 0);
    assert!(t.library.index().is_empty().await);
}

#[tokio::test]
async fn test_events_follow_stage_order() {
    let t = TestLibrary::new().await;
    let frog = t.captioned_wav("frog", &[(0.0, 2.0, "ribbit")]);
    let mut rx = t.library.events().subscribe();

    t.library.add(&[source(&frog)]).await;

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            IngestEvent::StageCompleted { stage, .. } => kinds.push(stage.as_str().to_string()),
            other => kinds.push(other.event_type().to_string()),
        }
    }
    assert_eq!(
        kinds,
        vec![
            "BatchStarted",
            "ItemResolved",
            IngestStage::Fetch.as_str(),
            IngestStage::Transcribe.as_str(),
            IngestStage::Embed.as_str(),
            IngestStage::Index.as_str(),
            "BatchCompleted",
        ]
    );
}
