//! End-to-end tests for the polling watch loop.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant, SystemTime};

use docwatch_watcher::{
    Converter, Result, WatchConfig, WatchLoop, WatchState, converted_path, write_atomic,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const POLL: Duration = Duration::from_millis(20);

fn upper_converter() -> Arc<dyn Converter> {
    Arc::new(
        |source: &Path, content: &Path, output: &Path, fmt: &str| -> Result<PathBuf> {
            let target = converted_path(source, content, output, fmt)?;
            let text = fs::read_to_string(source)?.to_uppercase();
            write_atomic(&target, text.as_bytes())?;
            Ok(target)
        },
    )
}

fn set_mtime(path: &Path, secs: u64) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

async fn wait_for(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn dirs(temp: &TempDir) -> (PathBuf, PathBuf) {
    (temp.path().join("content"), temp.path().join("output"))
}

#[tokio::test]
async fn test_clean_start_empties_output() {
    let temp = TempDir::new().unwrap();
    let (content, output) = dirs(&temp);
    fs::create_dir_all(&content).unwrap();
    fs::create_dir_all(output.join("old")).unwrap();
    fs::write(output.join("old.html"), "stale").unwrap();

    let config = WatchConfig::new(&content, &output).with_poll_interval(POLL);
    let watch = Arc::new(WatchLoop::new(config, upper_converter()).unwrap());
    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let watch = Arc::clone(&watch);
        let cancel = cancel.clone();
        async move { watch.run(cancel).await }
    });

    wait_for("output to be cleaned", || !output.join("old.html").exists()).await;
    cancel.cancel();
    let stats = tokio_test::assert_ok!(task.await.unwrap());

    assert!(output.is_dir());
    assert_eq!(fs::read_dir(&output).unwrap().count(), 0);
    assert_eq!(stats.syncs, 0);
    assert_eq!(watch.state().await, WatchState::Stopped);
}

#[tokio::test]
async fn test_keeps_output_without_clean() {
    let temp = TempDir::new().unwrap();
    let (content, output) = dirs(&temp);
    fs::create_dir_all(&content).unwrap();
    fs::create_dir_all(&output).unwrap();
    fs::write(output.join("kept.html"), "kept").unwrap();
    fs::write(content.join("new.txt"), "new").unwrap();

    let config = WatchConfig::new(&content, &output)
        .with_poll_interval(POLL)
        .with_clean_output(false);
    let watch = WatchLoop::new(config, upper_converter()).unwrap();
    let cancel = CancellationToken::new();

    let stopper = {
        let cancel = cancel.clone();
        let copied = output.join("new.txt");
        async move {
            wait_for("copy", || copied.is_file()).await;
            cancel.cancel();
        }
    };
    let (stats, ()) = tokio::join!(watch.run(cancel.clone()), stopper);

    assert_eq!(stats.unwrap().syncs, 1);
    assert_eq!(fs::read_to_string(output.join("kept.html")).unwrap(), "kept");
}

#[tokio::test]
async fn test_incremental_sync_across_ticks() {
    let temp = TempDir::new().unwrap();
    let (content, output) = dirs(&temp);
    fs::create_dir_all(content.join("sub")).unwrap();
    fs::write(content.join("index.rst"), "home").unwrap();
    fs::write(content.join("sub/doc.rst"), "doc").unwrap();
    fs::write(content.join("sub/logo.png"), [1u8, 2, 3]).unwrap();
    for f in ["index.rst", "sub/doc.rst", "sub/logo.png"] {
        set_mtime(&content.join(f), 1_000);
    }

    let config = WatchConfig::new(&content, &output)
        .with_extension(".rst")
        .with_poll_interval(POLL);
    let watch = Arc::new(WatchLoop::new(config, upper_converter()).unwrap());
    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let watch = Arc::clone(&watch);
        let cancel = cancel.clone();
        async move { watch.run(cancel).await }
    });

    let doc_html = output.join("sub/doc.html");
    wait_for("initial sync", || doc_html.is_file()).await;
    assert_eq!(fs::read_to_string(&doc_html).unwrap(), "DOC");
    assert_eq!(fs::read_to_string(output.join("index.html")).unwrap(), "HOME");
    assert_eq!(fs::read(output.join("sub/logo.png")).unwrap(), vec![1u8, 2, 3]);

    // Modified file: rendered again.
    fs::write(content.join("sub/doc.rst"), "doc v2").unwrap();
    set_mtime(&content.join("sub/doc.rst"), 2_000);
    wait_for("re-render", || {
        fs::read_to_string(&doc_html).is_ok_and(|s| s == "DOC V2")
    })
    .await;

    // New file in a new directory.
    fs::create_dir_all(content.join("fresh/deep")).unwrap();
    fs::write(content.join("fresh/deep/page.rst"), "page").unwrap();
    wait_for("new file", || output.join("fresh/deep/page.html").is_file()).await;

    // Deleted content file: output is left in place.
    fs::remove_file(content.join("index.rst")).unwrap();
    fs::write(content.join("marker.txt"), "m").unwrap();
    wait_for("marker copy", || output.join("marker.txt").is_file()).await;
    assert!(output.join("index.html").is_file());

    cancel.cancel();
    let stats = task.await.unwrap().unwrap();
    assert!(stats.syncs >= 4, "expected at least 4 syncs, got {stats:?}");
    assert_eq!(stats.files_failed, 0);
}

#[tokio::test]
async fn test_recovers_after_failed_poll() {
    let temp = TempDir::new().unwrap();
    let (content, output) = dirs(&temp);

    let config = WatchConfig::new(&content, &output).with_poll_interval(POLL);
    let watch = Arc::new(WatchLoop::new(config, upper_converter()).unwrap());
    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let watch = Arc::clone(&watch);
        let cancel = cancel.clone();
        async move { watch.run(cancel).await }
    });

    // Let a few polls fail against the missing content root.
    tokio::time::sleep(POLL * 5).await;
    fs::create_dir_all(&content).unwrap();
    fs::write(content.join("late.txt"), "late").unwrap();
    wait_for("late copy", || output.join("late.txt").is_file()).await;

    cancel.cancel();
    let stats = task.await.unwrap().unwrap();
    assert!(stats.failed_polls >= 1, "expected failed polls, got {stats:?}");
    assert_eq!(stats.syncs, 1);
}

#[tokio::test]
async fn test_conversion_failure_does_not_stop_loop() {
    let temp = TempDir::new().unwrap();
    let (content, output) = dirs(&temp);
    fs::create_dir_all(&content).unwrap();
    fs::write(content.join("broken.rst"), "x").unwrap();
    fs::write(content.join("asset.css"), "x").unwrap();

    let failing: Arc<dyn Converter> = Arc::new(
        |source: &Path, _: &Path, _: &Path, _: &str| -> Result<PathBuf> {
            Err(docwatch_watcher::WatcherError::Conversion {
                path: source.to_path_buf(),
                message: "renderer unavailable".into(),
            })
        },
    );
    let config = WatchConfig::new(&content, &output)
        .with_extension("rst")
        .with_poll_interval(POLL);
    let watch = WatchLoop::new(config, failing).unwrap();
    let cancel = CancellationToken::new();

    let stopper = {
        let cancel = cancel.clone();
        let asset = output.join("asset.css");
        async move {
            wait_for("asset copy", || asset.is_file()).await;
            cancel.cancel();
        }
    };
    let (stats, ()) = tokio::join!(watch.run(cancel.clone()), stopper);
    let stats = stats.unwrap();

    assert_eq!(stats.files_failed, 1);
    assert!(!output.join("broken.html").exists());
}

#[tokio::test]
async fn test_converter_panic_is_retried_next_tick() {
    let temp = TempDir::new().unwrap();
    let (content, output) = dirs(&temp);
    fs::create_dir_all(&content).unwrap();
    fs::write(content.join("page.md"), "page").unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let flaky: Arc<dyn Converter> = {
        let calls = Arc::clone(&calls);
        let upper = upper_converter();
        Arc::new(
            move |source: &Path, content: &Path, output: &Path, fmt: &str| -> Result<PathBuf> {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("renderer crashed");
                }
                upper.convert(source, content, output, fmt)
            },
        )
    };
    let config = WatchConfig::new(&content, &output).with_poll_interval(POLL);
    let watch = WatchLoop::new(config, flaky).unwrap();
    let cancel = CancellationToken::new();

    let stopper = {
        let cancel = cancel.clone();
        let page = output.join("page.html");
        async move {
            wait_for("render after panic", || page.is_file()).await;
            cancel.cancel();
        }
    };
    let (stats, ()) = tokio::join!(watch.run(cancel.clone()), stopper);
    let stats = stats.unwrap();

    assert_eq!(stats.failed_polls, 1);
    assert_eq!(stats.syncs, 1);
    assert_eq!(fs::read_to_string(output.join("page.html")).unwrap(), "PAGE");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
