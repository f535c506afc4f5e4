//! Agent ticks against a mock collector.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use logship_agent::{
    Agent, AgentError, AgentSettings, AgentSettingsBuilder, ExtractionTool, ProbePolicy,
};
use mockito::{Matcher, Server, ServerGuard};
use tokio_util::sync::CancellationToken;

/// Serves the current content of each file, per path, and records cursors.
#[derive(Default)]
struct FakeTool {
    content: Mutex<HashMap<PathBuf, Result<&'static str, &'static str>>>,
    calls: Mutex<Vec<(PathBuf, Option<u64>)>>,
}

impl FakeTool {
    fn set(&self, path: &Path, out: &'static str) {
        self.content.lock().unwrap().insert(path.to_owned(), Ok(out));
    }

    fn fail(&self, path: &Path) {
        self.content.lock().unwrap().insert(path.to_owned(), Err("decoder crashed"));
    }

    fn cursors_for(&self, path: &Path) -> Vec<Option<u64>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, c)| *c)
            .collect()
    }
}

impl ExtractionTool for &'static FakeTool {
    async fn extract(&self, path: &Path, since: Option<u64>) -> Result<Bytes, AgentError> {
        self.calls.lock().unwrap().push((path.to_owned(), since));
        match self.content.lock().unwrap().get(path).copied() {
            Some(Ok(out)) => Ok(Bytes::from_static(out.as_bytes())),
            Some(Err(reason)) => Err(AgentError::Extraction {
                path: path.display().to_string(),
                reason: reason.to_owned(),
            }),
            None => Ok(Bytes::new()),
        }
    }
}

fn settings(root: &Path, url: String) -> AgentSettings {
    AgentSettingsBuilder::new()
        .watch_dir(root)
        .destination_url(url)
        .excluded_dirs(vec!["archive".to_owned()])
        .probe(ProbePolicy {
            delay: Duration::from_millis(10),
            max_attempts: 2,
        })
        .request_timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn write(root: &Path, rel: &str) -> PathBuf {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"raw").unwrap();
    path
}

async fn collector() -> ServerGuard {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/")
        .with_status(200)
        .create_async()
        .await;
    server
}

fn leak(tool: FakeTool) -> &'static FakeTool {
    Box::leak(Box::new(tool))
}

#[tokio::test]
async fn changed_output_is_sent_once_and_repeats_are_suppressed() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "ns/pod/a.bin.log");
    let mut server = collector().await;

    let aaaa = server
        .mock("POST", "/")
        .match_header("filename", "ns/pod/a.bin.log")
        .match_header("timestamp", Matcher::Regex(r"^\d+$".to_owned()))
        .match_body("AAAA")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let bbbb = server
        .mock("POST", "/")
        .match_header("filename", "ns/pod/a.bin.log")
        .match_body("BBBB")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let tool = leak(FakeTool::default());
    let mut agent = Agent::new(settings(dir.path(), format!("{}/", server.url())), tool).unwrap();
    let cancel = CancellationToken::new();

    tool.set(&file, "AAAA");
    let first = agent.tick(&cancel).await;
    assert_eq!((first.added, first.delivered), (1, 1));
    let after_first = agent.tracked().get(&file).unwrap();
    assert_eq!(after_first.last_payload, Bytes::from_static(b"AAAA"));
    let first_cursor = after_first.last_cursor;

    tool.set(&file, "BBBB");
    let second = agent.tick(&cancel).await;
    assert_eq!(second.delivered, 1);

    let cursor_before = agent.tracked().get(&file).unwrap().last_cursor;
    let third = agent.tick(&cancel).await;
    assert_eq!((third.delivered, third.duplicates), (0, 1));
    assert!(agent.tracked().get(&file).unwrap().last_cursor > cursor_before);

    aaaa.assert_async().await;
    bbbb.assert_async().await;

    let cursors = tool.cursors_for(&file);
    assert_eq!(cursors.len(), 3);
    assert_eq!(cursors[0], None);
    assert_eq!(cursors[1], Some(first_cursor));
    assert!(cursors[1].unwrap() < cursors[2].unwrap());
}

#[tokio::test]
async fn excluded_directories_are_never_extracted() {
    let dir = tempfile::tempdir().unwrap();
    let live = write(dir.path(), "a.bin.log");
    let archived = write(dir.path(), "archive/old.bin.log");
    let server = collector().await;

    let tool = leak(FakeTool::default());
    let mut agent = Agent::new(settings(dir.path(), format!("{}/", server.url())), tool).unwrap();
    agent.tick(&CancellationToken::new()).await;

    assert_eq!(tool.cursors_for(&live).len(), 1);
    assert!(tool.cursors_for(&archived).is_empty());
    assert_eq!(agent.tracked().len(), 1);
}

#[tokio::test]
async fn rejected_payload_is_not_resent() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "a.bin.log");
    let mut server = collector().await;
    let rejected = server
        .mock("POST", "/")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let tool = leak(FakeTool::default());
    tool.set(&file, "AAAA");
    let mut agent = Agent::new(settings(dir.path(), format!("{}/", server.url())), tool).unwrap();
    let cancel = CancellationToken::new();

    let first = agent.tick(&cancel).await;
    assert_eq!(first.rejected, 1);
    assert!(first.aborted.is_none());

    let second = agent.tick(&cancel).await;
    assert_eq!((second.rejected, second.duplicates), (0, 1));
    rejected.assert_async().await;
}

#[tokio::test]
async fn extraction_failure_stops_the_tick_but_keeps_extracted_payloads() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(dir.path(), "a.bin.log");
    let b = write(dir.path(), "b.bin.log");
    let c = write(dir.path(), "c.bin.log");
    let mut server = collector().await;
    let delivered = server
        .mock("POST", "/")
        .match_header("filename", "a.bin.log")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let tool = leak(FakeTool::default());
    tool.set(&a, "AAAA");
    tool.fail(&b);
    tool.set(&c, "CCCC");
    let mut agent = Agent::new(settings(dir.path(), format!("{}/", server.url())), tool).unwrap();

    let report = agent.tick(&CancellationToken::new()).await;

    assert_eq!(report.extracted, 1);
    assert_eq!(report.delivered, 1);
    assert!(report.aborted.unwrap().contains("decoder crashed"));
    assert!(tool.cursors_for(&c).is_empty());
    assert!(agent.tracked().get(&c).unwrap().is_new());
    delivered.assert_async().await;
}

#[tokio::test]
async fn unavailable_collector_drops_payloads_but_advances_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "a.bin.log");

    let tool = leak(FakeTool::default());
    tool.set(&file, "AAAA");
    let mut agent =
        Agent::new(settings(dir.path(), "http://127.0.0.1:1/".to_owned()), tool).unwrap();

    let report = agent.tick(&CancellationToken::new()).await;

    assert_eq!(report.undelivered, 1);
    assert!(report.aborted.is_some());
    assert!(!agent.tracked().get(&file).unwrap().is_new());
}

#[tokio::test]
async fn deleted_files_are_groomed() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "a.bin.log");
    let server = collector().await;

    let tool = leak(FakeTool::default());
    let mut agent = Agent::new(settings(dir.path(), format!("{}/", server.url())), tool).unwrap();
    let cancel = CancellationToken::new();

    agent.tick(&cancel).await;
    assert_eq!(agent.tracked().len(), 1);

    std::fs::remove_file(&file).unwrap();
    let report = agent.tick(&cancel).await;

    assert_eq!(report.groomed, 1);
    assert!(agent.tracked().is_empty());

    // still absent: stays untracked
    let report = agent.tick(&cancel).await;
    assert_eq!((report.added, report.groomed), (0, 0));
    assert!(agent.tracked().get(&file).is_none());
    let calls_while_absent = tool.cursors_for(&file).len();

    // rediscovered: tracked again from scratch
    std::fs::write(&file, b"raw again").unwrap();
    let report = agent.tick(&cancel).await;
    assert_eq!(report.added, 1);
    assert!(agent.tracked().get(&file).is_some());
    let cursors = tool.cursors_for(&file);
    assert_eq!(cursors.len(), calls_while_absent + 1);
    assert_eq!(cursors.last(), Some(&None));
}

#[tokio::test]
async fn run_loop_stops_on_cancel_and_applies_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let server = collector().await;
    let initial = settings(dir.path(), format!("{}/", server.url()));

    let tool = leak(FakeTool::default());
    let agent = Agent::new(initial.clone(), tool).unwrap();
    let (reload_tx, reload_rx) = tokio::sync::watch::channel(initial.clone());
    let (report_tx, mut report_rx) = tokio::sync::watch::channel(Default::default());
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(agent.run(cancel.clone(), Some(reload_rx), Some(report_tx)));

    // first tick fires immediately
    tokio::time::timeout(Duration::from_secs(5), report_rx.changed())
        .await
        .unwrap()
        .unwrap();

    let mut next = initial.clone();
    next.excluded_dirs = vec!["snapshots".to_owned()];
    reload_tx.send_replace(next.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;

    cancel.cancel();
    let agent = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(agent.settings(), &next);
}
