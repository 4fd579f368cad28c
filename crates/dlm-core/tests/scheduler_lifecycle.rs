//! Scheduler lifecycle against a scripted engine and the real filesystem placer.

mod common;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::mock_engine::MockEngine;
use dlm_core::engine::{Artifact, TransferError};
use dlm_core::retry::RetryPolicy;
use dlm_core::{DownloadError, DownloadOptions, FsPlacer, Scheduler, TaskState};
use tempfile::{tempdir, TempDir};

type Outcomes = Arc<Mutex<Vec<Result<PathBuf, DownloadError>>>>;

struct Harness {
    engine: Arc<MockEngine>,
    scheduler: Scheduler,
    out: TempDir,
    staging: TempDir,
}

impl Harness {
    fn new(limit: usize) -> Self {
        let engine = Arc::new(MockEngine::new());
        let scheduler = Scheduler::builder(engine.clone(), Arc::new(FsPlacer::new()))
            .concurrency_limit(limit)
            .retry_policy(RetryPolicy::fixed(Duration::from_millis(10)))
            .build()
            .unwrap();
        Harness {
            engine,
            scheduler,
            out: tempdir().unwrap(),
            staging: tempdir().unwrap(),
        }
    }

    fn options(&self) -> DownloadOptions {
        DownloadOptions::new(self.out.path())
    }

    /// Starts `target`, recording completions and progress.
    fn start(&self, target: &str, options: DownloadOptions) -> (Outcomes, Arc<Mutex<Vec<f64>>>) {
        let outcomes: Outcomes = Arc::default();
        let progress: Arc<Mutex<Vec<f64>>> = Arc::default();
        let (o, p) = (outcomes.clone(), progress.clone());
        self.scheduler.start(
            target,
            options,
            move |f| p.lock().unwrap().push(f),
            move |r| o.lock().unwrap().push(r),
        );
        (outcomes, progress)
    }
}

fn single(outcomes: &Outcomes) -> Result<PathBuf, DownloadError> {
    let all = outcomes.lock().unwrap();
    assert_eq!(all.len(), 1, "expected exactly one completion, got {:?}", *all);
    all[0].clone()
}

#[tokio::test]
async fn invalid_targets_are_rejected_synchronously() {
    let h = Harness::new(3);
    for target in ["", "not a url", "ftp://example.com/file", "https://"] {
        let (outcomes, _) = h.start(target, h.options());
        match single(&outcomes) {
            Err(DownloadError::InvalidInput { target: t, .. }) => assert_eq!(t, target),
            other => panic!("{:?} gave {:?}", target, other),
        }
    }
    assert_eq!(h.scheduler.len(), 0);
    assert_eq!(h.engine.begin_count(), 0);
}

#[tokio::test]
async fn negative_retry_count_is_rejected() {
    let h = Harness::new(3);
    let (outcomes, _) = h.start("https://example.com/a.bin", h.options().max_retries(-1));
    assert_eq!(single(&outcomes), Err(DownloadError::InvalidRetryCount(-1)));
    assert!(!h.scheduler.is_active("https://example.com/a.bin"));
}

#[tokio::test]
async fn malformed_checksum_is_rejected() {
    let h = Harness::new(3);
    let (outcomes, _) = h.start("https://example.com/a.bin", h.options().expected_sha256("xyz"));
    assert!(matches!(single(&outcomes), Err(DownloadError::InvalidInput { .. })));
}

#[tokio::test]
async fn duplicate_start_leaves_first_download_alone() {
    let h = Harness::new(3);
    let url = "https://example.com/dup.iso";
    let (first, first_progress) = h.start(url, h.options());
    h.engine.progress(url, 50, 100);

    let (second, _) = h.start(url, h.options());
    assert_eq!(single(&second), Err(DownloadError::DuplicateDownload(url.to_string())));

    assert_eq!(h.scheduler.state(url), Some(TaskState::Running));
    assert_eq!(h.engine.begin_count(), 1);
    h.engine.progress(url, 75, 100);
    h.engine.succeed(url, h.staging.path(), b"data");

    assert_eq!(single(&first), Ok(h.out.path().join("dup.iso")));
    assert_eq!(*first_progress.lock().unwrap(), vec![0.5, 0.75]);
}

#[tokio::test]
async fn zero_retries_fails_once_without_retrying() {
    let h = Harness::new(3);
    let url = "https://example.com/broken";
    let (outcomes, _) = h.start(url, h.options().max_retries(0));
    h.engine.fail(url, TransferError::http(500));

    match single(&outcomes) {
        Err(DownloadError::Transport(e)) => assert_eq!(e, TransferError::http(500)),
        other => panic!("unexpected {:?}", other),
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.engine.begin_count(), 1);
    assert!(!h.scheduler.is_active(url));
}

#[tokio::test]
async fn two_failures_then_success_is_placed() {
    let h = Harness::new(3);
    let url = "https://mirror.example.com/pool/pkg.deb";
    let (outcomes, _) = h.start(url, h.options().max_retries(2));

    let first = h.engine.wait_for_begins(url, 1).await;
    h.engine.fail(url, TransferError::connection("reset"));
    assert_eq!(h.scheduler.state(url), Some(TaskState::Running));
    assert!(outcomes.lock().unwrap().is_empty());

    let second = h.engine.wait_for_begins(url, 2).await;
    h.engine.fail(url, TransferError::timeout("30s"));
    let third = h.engine.wait_for_begins(url, 3).await;
    assert!(third.token.is_none());
    assert_ne!(first.id, second.id);
    assert_ne!(second.id, third.id);

    h.engine.succeed(url, h.staging.path(), b"package");
    let path = single(&outcomes).unwrap();
    assert_eq!(path, h.out.path().join("pkg.deb"));
    assert_eq!(std::fs::read(&path).unwrap(), b"package");
    assert_eq!(h.engine.begin_count(), 3);
}

#[tokio::test]
async fn final_timeout_surfaces_as_timeout() {
    let h = Harness::new(3);
    let url = "https://example.com/slow";
    let (outcomes, _) = h.start(url, h.options().max_retries(1));
    h.engine.fail(url, TransferError::timeout("first"));
    h.engine.wait_for_begins(url, 2).await;
    h.engine.fail(url, TransferError::timeout("second"));
    assert!(matches!(single(&outcomes), Err(DownloadError::Timeout(_))));
}

#[tokio::test]
async fn cancel_beats_a_late_success() {
    let h = Harness::new(3);
    let url = "https://example.com/cancel-me.bin";
    let (outcomes, _) = h.start(url, h.options());
    let begun = h.engine.latest(url);

    h.scheduler.cancel(url);
    assert_eq!(single(&outcomes), Err(DownloadError::Cancelled));
    assert_eq!(h.engine.aborts(), vec![begun.id]);

    let artifact = h.engine.succeed(url, h.staging.path(), b"late");
    assert_eq!(outcomes.lock().unwrap().len(), 1);
    assert!(!artifact.exists(), "stale artifact should be discarded");
    assert!(!h.out.path().join("cancel-me.bin").exists());

    h.scheduler.cancel(url);
    assert_eq!(outcomes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn limit_one_runs_in_fifo_order() {
    let h = Harness::new(1);
    let urls = ["https://a.example/1", "https://b.example/2", "https://c.example/3"];
    let outcomes: Vec<Outcomes> = urls.iter().map(|u| h.start(u, h.options()).0).collect();

    assert_eq!(h.engine.begin_count(), 1);
    assert_eq!(h.scheduler.running_count(), 1);
    assert_eq!(h.scheduler.queued_count(), 2);
    assert_eq!(h.scheduler.state(urls[2]), Some(TaskState::Queued));

    h.engine.succeed(urls[0], h.staging.path(), b"1");
    assert!(single(&outcomes[0]).is_ok());
    assert_eq!(h.engine.begin_count(), 2);
    assert_eq!(h.engine.latest(urls[1]).target, urls[1]);
    assert_eq!(h.scheduler.running_count(), 1);

    // a paused task frees its slot too
    h.scheduler.pause(urls[1]);
    assert_eq!(h.engine.begin_count(), 2);
    h.engine.ack_suspend(urls[1], None);
    assert_eq!(h.scheduler.state(urls[1]), Some(TaskState::Paused));
    assert_eq!(h.engine.begin_count(), 3);
    assert_eq!(h.engine.begun()[2].target, urls[2]);
    assert_eq!(h.scheduler.running_count(), 1);
}

#[tokio::test]
async fn same_filename_twice_gets_two_paths() {
    let h = Harness::new(3);
    let a = "https://one.example/dist/file.tar.gz";
    let b = "https://two.example/other/file.tar.gz";
    let (oa, _) = h.start(a, h.options());
    let (ob, _) = h.start(b, h.options());
    h.engine.succeed(a, h.staging.path(), b"from one");
    h.engine.succeed(b, h.staging.path(), b"from two");

    let pa = single(&oa).unwrap();
    let pb = single(&ob).unwrap();
    assert_eq!(pa, h.out.path().join("file.tar.gz"));
    assert_eq!(pb, h.out.path().join("file (1).tar.gz"));
    assert_eq!(std::fs::read(&pa).unwrap(), b"from one");
    assert_eq!(std::fs::read(&pb).unwrap(), b"from two");
}

#[tokio::test]
async fn overwrite_replaces_existing_file() {
    let h = Harness::new(3);
    std::fs::write(h.out.path().join("f.txt"), b"old").unwrap();
    let url = "https://example.com/f.txt";
    let (outcomes, _) = h.start(url, h.options().overwrite(true));
    h.engine.succeed(url, h.staging.path(), b"new");
    assert_eq!(single(&outcomes), Ok(h.out.path().join("f.txt")));
    assert_eq!(std::fs::read(h.out.path().join("f.txt")).unwrap(), b"new");
}

#[tokio::test]
async fn filename_priority() {
    let h = Harness::new(3);
    let explicit = "https://example.com/x?id=1";
    let (o1, _) = h.start(explicit, h.options().filename("chosen.bin"));
    h.engine.succeed(explicit, h.staging.path(), b"1");
    assert_eq!(single(&o1), Ok(h.out.path().join("chosen.bin")));

    let suggested = "https://example.com/download?id=2";
    let (o2, _) = h.start(suggested, h.options());
    let begun = h.engine.latest(suggested);
    let path = h.staging.path().join("artifact-2");
    std::fs::write(&path, b"2").unwrap();
    begun
        .sink
        .succeeded(Artifact::new(&path).with_suggested_filename("report.pdf"));
    assert_eq!(single(&o2), Ok(h.out.path().join("report.pdf")));

    let bare = "https://example.com/";
    let (o3, _) = h.start(bare, h.options());
    h.engine.succeed(bare, h.staging.path(), b"3");
    assert_eq!(single(&o3), Ok(h.out.path().join("download.bin")));
}

#[tokio::test]
async fn placement_failure_is_terminal() {
    let h = Harness::new(3);
    let blocker = h.out.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();
    let url = "https://example.com/a.bin";
    let (outcomes, _) = h.start(url, DownloadOptions::new(blocker.join("sub")).max_retries(3));
    let artifact = h.engine.succeed(url, h.staging.path(), b"a");

    assert!(matches!(single(&outcomes), Err(DownloadError::PlacementFailed(_))));
    assert!(!artifact.exists());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.engine.begin_count(), 1);
}

#[tokio::test]
async fn request_carries_headers_and_timeout() {
    let h = Harness::new(3);
    let url = "https://example.com/private";
    h.start(url, h.options().header("Authorization", "Bearer t").timeout_secs(12));
    let begun = h.engine.latest(url);
    assert_eq!(begun.request.url, url);
    assert_eq!(
        begun.request.headers.get("Authorization").map(String::as_str),
        Some("Bearer t")
    );
    assert_eq!(begun.request.timeout, Some(Duration::from_secs(12)));
}

#[tokio::test]
async fn progress_is_filtered_and_monotonic() {
    let h = Harness::new(3);
    let url = "https://example.com/big.iso";
    let (_, progress) = h.start(url, h.options());
    h.engine.progress(url, 10, 0);
    h.engine.progress(url, 25, 100);
    h.engine.progress(url, 20, 100);
    h.engine.progress(url, 300, 100);
    h.engine.progress(url, 60, 100);
    assert_eq!(*progress.lock().unwrap(), vec![0.25, 0.6]);

    h.scheduler.pause(url);
    h.engine.progress(url, 70, 100);
    assert_eq!(progress.lock().unwrap().len(), 2, "no progress while suspending");
}

#[tokio::test]
async fn engine_abort_reports_cancelled() {
    let h = Harness::new(3);
    let url = "https://example.com/aborted";
    let (outcomes, _) = h.start(url, h.options().max_retries(3));
    h.engine.fail(url, TransferError::aborted());
    assert_eq!(single(&outcomes), Err(DownloadError::Cancelled));
    assert_eq!(h.engine.begin_count(), 1);
}

#[tokio::test]
async fn cancel_all_clears_everything() {
    let h = Harness::new(1);
    let urls = ["https://a.example/1", "https://b.example/2", "https://c.example/3"];
    let outcomes: Vec<Outcomes> = urls.iter().map(|u| h.start(u, h.options()).0).collect();

    h.scheduler.cancel_all();
    for o in &outcomes {
        assert_eq!(single(o), Err(DownloadError::Cancelled));
    }
    assert!(h.scheduler.is_empty());
    assert_eq!(h.engine.aborts().len(), 1);
    assert_eq!(h.engine.begin_count(), 1, "queued work must not be admitted");
}

#[tokio::test]
async fn concurrency_limit_changes_apply_on_next_completion() {
    let h = Harness::new(1);
    h.scheduler.set_concurrency_limit(0);
    assert_eq!(h.scheduler.concurrency_limit(), 1);

    let urls = ["https://a.example/1", "https://b.example/2", "https://c.example/3"];
    for u in urls {
        h.start(u, h.options());
    }
    h.scheduler.set_concurrency_limit(3);
    assert_eq!(h.engine.begin_count(), 1, "no preemptive admission");

    h.engine.succeed(urls[0], h.staging.path(), b"1");
    assert_eq!(h.engine.begin_count(), 3);
    assert_eq!(h.scheduler.running_count(), 2);
}

#[tokio::test]
async fn checksum_mismatch_is_retried() {
    let h = Harness::new(3);
    let url = "https://example.com/hello.txt";
    // sha256("hello\n")
    let digest = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";
    let (outcomes, _) = h.start(url, h.options().expected_sha256(digest.to_uppercase()).max_retries(1));

    h.engine.succeed(url, h.staging.path(), b"corrupted");
    h.engine.wait_for_begins(url, 2).await;
    assert!(outcomes.lock().unwrap().is_empty());

    h.engine.succeed(url, h.staging.path(), b"hello\n");
    let done = common::eventually(Duration::from_secs(5), || !outcomes.lock().unwrap().is_empty()).await;
    assert!(done);
    let path = single(&outcomes).unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"hello\n");
}

#[tokio::test]
async fn checksum_mismatch_without_retries_fails_with_integrity() {
    let h = Harness::new(3);
    let url = "https://example.com/x";
    let (outcomes, _) = h.start(url, h.options().expected_sha256("00".repeat(32)).max_retries(0));
    h.engine.succeed(url, h.staging.path(), b"x");
    let done = common::eventually(Duration::from_secs(5), || !outcomes.lock().unwrap().is_empty()).await;
    assert!(done);
    match single(&outcomes) {
        Err(DownloadError::Transport(e)) => {
            assert_eq!(e.kind, dlm_core::TransferErrorKind::Integrity)
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn download_handle_resolves_with_path() {
    let h = Harness::new(3);
    let url = "https://example.com/handle.bin";
    let handle = h.scheduler.download(url, h.options());
    let progress = handle.progress();
    h.engine.progress(url, 1, 4);
    assert_eq!(*progress.borrow(), 0.25);
    h.engine.succeed(url, h.staging.path(), b"abcd");
    assert_eq!(handle.wait().await, Ok(h.out.path().join("handle.bin")));
}

#[tokio::test]
async fn dropping_scheduler_cancels_pending_downloads() {
    let h = Harness::new(3);
    let handle = h.scheduler.download("https://example.com/pending", h.options());
    let Harness { scheduler, engine, .. } = h;
    drop(scheduler);
    assert_eq!(handle.wait().await, Err(DownloadError::Cancelled));
    assert_eq!(engine.aborts().len(), 1);
}
