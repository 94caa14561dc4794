//! End-to-end flows through the job service: intake, admission, the three
//! pipeline stages and cleanup, with a fake engine and the filesystem
//! endpoint.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use common::{ConcatEngine, TestHarness};
use mf_core::config::UploadConfig;
use mf_core::events::EventPayload;
use mf_core::{
    ChatId, Error, JobKind, MergeVariant, PreconditionError, Preferences, SessionStore, Stage,
    TaskStatus, UploadTarget, UserId,
};
use mf_service::{GofileClient, Submission};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ALICE: UserId = UserId(100);
const ALICE_CHAT: ChatId = ChatId(100);
const BOB: UserId = UserId(200);
const BOB_CHAT: ChatId = ChatId(200);

fn started(submission: Submission) -> mf_core::TaskId {
    match submission {
        Submission::Started { task_id } => task_id,
        other => panic!("expected a started task, got {other:?}"),
    }
}

#[tokio::test]
async fn merge_two_videos_end_to_end() {
    let h = TestHarness::new();
    let s = &h.service;
    s.on_job_kind_selected(
        ALICE,
        ALICE_CHAT,
        JobKind::Merge(MergeVariant::VideoVideo),
        None,
    )
    .unwrap();

    let first = s
        .on_file_received(ALICE, ALICE_CHAT, h.attachment(ALICE_CHAT, "part1.mp4", b"AAA"))
        .unwrap();
    assert_eq!(
        first,
        Submission::Staged {
            missing: vec!["1 more video".to_string()]
        }
    );
    let task_id = started(
        s.on_file_received(ALICE, ALICE_CHAT, h.attachment(ALICE_CHAT, "part2.mp4", b"BBB"))
            .unwrap(),
    );

    let record = s.wait_for(task_id).await.unwrap();
    assert_eq!(record.status, TaskStatus::Completed);
    assert_eq!(record.progress, 100.0);
    assert!(record.completed_at.is_some());

    let output = h.delivered(ALICE_CHAT, "part1_merge_video_video.mp4");
    assert_eq!(std::fs::read(output).unwrap(), b"AAABBB");
    assert_eq!(h.leftover_workspaces(ALICE), 0);

    let stages: Vec<Stage> = s
        .task_events(task_id)
        .into_iter()
        .filter_map(|e| match e.payload {
            EventPayload::TaskStageChanged { stage, .. } => Some(stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![Stage::Acquiring, Stage::Transforming, Stage::Delivering]
    );

    let progress: Vec<f32> = s
        .task_events(task_id)
        .into_iter()
        .filter_map(|e| match e.payload {
            EventPayload::TaskProgress { progress, .. } => Some(progress),
            _ => None,
        })
        .collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");

    let session = s.context().store.load_session(ALICE).unwrap();
    assert_eq!(session.job_kind, None);
}

#[tokio::test]
async fn watermark_roles_accept_any_order() {
    let h = TestHarness::new();
    let s = &h.service;
    s.on_job_kind_selected(ALICE, ALICE_CHAT, JobKind::Watermark, None)
        .unwrap();

    let staged = s
        .on_file_received(ALICE, ALICE_CHAT, h.attachment(ALICE_CHAT, "logo.png", b"PNG"))
        .unwrap();
    assert_eq!(
        staged,
        Submission::Staged {
            missing: vec!["video".to_string()]
        }
    );

    let wrong = s
        .on_file_received(ALICE, ALICE_CHAT, h.attachment(ALICE_CHAT, "notes.srt", b"1"))
        .unwrap_err();
    assert_matches!(
        wrong,
        Error::Precondition(PreconditionError::WrongInputKind { .. })
    );

    let task_id = started(
        s.on_file_received(ALICE, ALICE_CHAT, h.attachment(ALICE_CHAT, "movie.mkv", b"MKV"))
            .unwrap(),
    );
    let record = s.wait_for(task_id).await.unwrap();
    assert_eq!(record.status, TaskStatus::Completed);
    assert!(h.delivered(ALICE_CHAT, "movie_watermark.mp4").is_file());
}

#[tokio::test]
async fn media_info_delivers_a_text_report() {
    let h = TestHarness::new();
    let s = &h.service;
    s.on_job_kind_selected(ALICE, ALICE_CHAT, JobKind::MediaInfo, None)
        .unwrap();

    let task_id = started(
        s.on_file_received(ALICE, ALICE_CHAT, h.attachment(ALICE_CHAT, "song.flac", b"fLaC"))
            .unwrap(),
    );
    assert_eq!(
        s.wait_for(task_id).await.unwrap().status,
        TaskStatus::Completed
    );

    let report = std::fs::read_to_string(h.delivered(ALICE_CHAT, "song_mediainfo.txt")).unwrap();
    assert!(report.contains("File: song.flac"));
}

#[tokio::test]
async fn engine_failure_fails_the_task_and_cleans_up() {
    let h = TestHarness::with_engine(ConcatEngine {
        fail_with: Some("Unknown encoder 'libnope'".into()),
        ..Default::default()
    });
    let s = &h.service;
    s.on_job_kind_selected(ALICE, ALICE_CHAT, JobKind::Convert, None)
        .unwrap();
    let task_id = started(
        s.on_file_received(ALICE, ALICE_CHAT, h.attachment(ALICE_CHAT, "a.mp4", b"x"))
            .unwrap(),
    );

    let record = s.wait_for(task_id).await.unwrap();
    assert_eq!(record.status, TaskStatus::Failed);
    assert!(record.error.as_deref().unwrap().contains("libnope"));
    assert_eq!(h.leftover_workspaces(ALICE), 0);
    assert!(s.context().store.staged_inputs(ALICE).unwrap().is_empty());

    let failed = s
        .task_events(task_id)
        .into_iter()
        .find_map(|e| match e.payload {
            EventPayload::TaskFailed { stage, .. } => Some(stage),
            _ => None,
        });
    assert_eq!(failed, Some(Some("transform".to_string())));
}

#[tokio::test]
async fn users_run_independently() {
    let h = TestHarness::new();
    let s = &h.service;
    for (user, chat) in [(ALICE, ALICE_CHAT), (BOB, BOB_CHAT)] {
        s.on_job_kind_selected(user, chat, JobKind::Convert, None)
            .unwrap();
    }

    let a = started(
        s.on_file_received(ALICE, ALICE_CHAT, h.attachment(ALICE_CHAT, "a.mp4", b"a"))
            .unwrap(),
    );
    let b = started(
        s.on_file_received(BOB, BOB_CHAT, h.attachment(BOB_CHAT, "b.mp4", b"b"))
            .unwrap(),
    );

    assert_eq!(s.wait_for(a).await.unwrap().status, TaskStatus::Completed);
    assert_eq!(s.wait_for(b).await.unwrap().status, TaskStatus::Completed);
    assert_eq!(s.list_tasks(ALICE, 10).unwrap().len(), 1);
    assert_eq!(s.list_tasks(BOB, 10).unwrap().len(), 1);
}

#[tokio::test]
async fn object_storage_delivery_returns_the_download_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/getServer"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "ok", "data": {"server": "store9"}})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/uploadFile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "data": {"downloadPage": "https://gofile.io/d/xyz"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let storage = GofileClient::new(&UploadConfig {
        object_storage_url: server.uri(),
        api_token: None,
    });
    let h = TestHarness::with_parts(ConcatEngine::default(), Arc::new(storage));
    let s = &h.service;
    s.set_preferences(
        ALICE,
        Preferences {
            upload: UploadTarget::ObjectStorage,
            ..Preferences::default()
        },
    )
    .unwrap();
    s.on_job_kind_selected(ALICE, ALICE_CHAT, JobKind::Convert, None)
        .unwrap();
    let task_id = started(
        s.on_file_received(ALICE, ALICE_CHAT, h.attachment(ALICE_CHAT, "a.mp4", b"video"))
            .unwrap(),
    );

    assert_eq!(
        s.wait_for(task_id).await.unwrap().status,
        TaskStatus::Completed
    );
    let link = s
        .task_events(task_id)
        .into_iter()
        .find_map(|e| match e.payload {
            EventPayload::TaskCompleted { link, .. } => link,
            _ => None,
        });
    assert_eq!(link.as_deref(), Some("https://gofile.io/d/xyz"));
    // Nothing went through the messaging outbox.
    assert!(!h.delivered(ALICE_CHAT, "a_convert.mp4").exists());
}

#[tokio::test]
async fn oversized_files_are_refused_without_staging() {
    let h = TestHarness::new();
    let s = &h.service;
    s.on_job_kind_selected(ALICE, ALICE_CHAT, JobKind::Convert, None)
        .unwrap();

    let mut file = h.attachment(ALICE_CHAT, "huge.mp4", b"x");
    file.size = s.context().config.storage.max_file_size + 1;
    assert_matches!(
        s.on_file_received(ALICE, ALICE_CHAT, file),
        Err(Error::Precondition(PreconditionError::FileTooLarge { .. }))
    );
    assert!(s.context().store.staged_inputs(ALICE).unwrap().is_empty());
}
