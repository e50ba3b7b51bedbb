use std::{io::Write, sync::Arc, time::Duration};

use async_trait::async_trait;
use sc2_match_relay::{
    prelude::*,
    telemetry::{ReaderCommand, TailerState},
};
use serde_json::Value;
use tokio::net::UdpSocket;

const LINE: &str = "00:10  240   43ms     0M    0G  13/ 15U sharpy.managers.core.log_manager:71 [GameAnalyzer] Income advantage is now SlightAdvantage";

fn init_test_logger() {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn collector() -> (UdpSocket, u16) {
    init_test_logger();
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    (socket, port)
}

async fn receive(socket: &UdpSocket) -> Value {
    let mut buf = vec![0u8; 65536];
    let n = tokio::time::timeout(Duration::from_secs(10), socket.recv(&mut buf))
        .await
        .expect("no GELF message received")
        .unwrap();
    serde_json::from_slice(&buf[..n]).unwrap()
}

fn append(path: &std::path::Path, line: &str) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    writeln!(file, "{line}").unwrap();
}

#[tokio::test]
async fn forwards_lines_appended_after_start() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("stderr.log");
    std::fs::write(&log, "").unwrap();
    let (socket, port) = collector().await;

    let forwarder = EventForwarder::connect("127.0.0.1", port).await.unwrap();
    let mut tailer = LogTailer::new(&log, forwarder).with_backoff(Duration::from_millis(100));
    let mut state = tailer.subscribe();
    tailer.start();
    tokio::time::timeout(
        Duration::from_secs(10),
        state.wait_for(|s| *s == TailerState::Streaming),
    )
    .await
    .unwrap()
    .unwrap();

    tailer.set_current_match_id(42);
    append(&log, LINE);
    append(&log, "   ");
    append(&log, "Traceback (most recent call last):");

    let parsed = receive(&socket).await;
    assert_eq!(
        parsed["short_message"],
        "[GameAnalyzer] Income advantage is now SlightAdvantage"
    );
    assert_eq!(parsed["_match_id"], 42);
    assert_eq!(parsed["_game_time"], "00:10");
    assert_eq!(parsed["_supply_capacity"], 15);
    assert_eq!(parsed["_source"], "starcraft_bot_controller");

    // the blank line is skipped
    let raw = receive(&socket).await;
    assert_eq!(raw["short_message"], "Traceback (most recent call last):");
    assert_eq!(raw["_match_id"], 42);
    assert!(raw.get("_game_time").is_none());

    tailer.stop().await;
    assert_eq!(tailer.state(), TailerState::Stopped);
}

#[tokio::test]
async fn file_created_after_start_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("later.log");
    let (socket, port) = collector().await;

    let forwarder = EventForwarder::connect("127.0.0.1", port).await.unwrap();
    let mut tailer = LogTailer::new(&log, forwarder).with_backoff(Duration::from_millis(100));
    tailer.start();

    tokio::time::sleep(Duration::from_millis(150)).await;
    append(&log, LINE);

    let event = receive(&socket).await;
    assert_eq!(event["_line_number"], 71);
    assert!(event.get("_match_id").is_none());
    tailer.stop().await;
}

#[tokio::test]
async fn reader_exit_restarts_after_backoff() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("stderr.log");
    append(&log, LINE);
    let (socket, port) = collector().await;

    // `cat` prints the file and exits, like a reader dying mid-match
    let forwarder = EventForwarder::connect("127.0.0.1", port).await.unwrap();
    let mut tailer = LogTailer::new(&log, forwarder)
        .with_backoff(Duration::from_millis(100))
        .with_reader(ReaderCommand {
            program: "cat".into(),
            args: vec![],
        });
    tailer.start();

    let first = receive(&socket).await;
    let second = receive(&socket).await;
    assert_eq!(first["short_message"], second["short_message"]);
    assert!(tailer.attempts() >= 2);
    assert!(tailer.is_running());

    tailer.stop().await;
    tailer.stop().await;
    assert_eq!(tailer.state(), TailerState::Stopped);
}

/// Pretends to play: writes a bot log line, then records a result like the real runner.
struct ScriptedRunner {
    log: std::path::PathBuf,
    results: std::path::PathBuf,
}

#[async_trait]
impl MatchExecutor for ScriptedRunner {
    async fn run(&self, request: &MatchRequest) {
        append(&self.log, &format!("{LINE} vs {}", request.opponent));
        tokio::time::sleep(Duration::from_millis(300)).await;
        std::fs::write(
            &self.results,
            r#"{"results":[{"match":1},{"match":2},{"match":3,"result":"Player1Win"}]}"#,
        )
        .unwrap();
    }
}

#[tokio::test]
async fn lines_are_tagged_with_the_running_match() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("stderr.log");
    let results = dir.path().join("results.json");
    std::fs::write(&log, "").unwrap();
    std::fs::write(&results, r#"{"results":[{"match":1},{"match":2}]}"#).unwrap();
    let (socket, port) = collector().await;

    let config = Configuration::new("TBone")
        .with_graylog("127.0.0.1", port)
        .with_log_file_path(&log)
        .with_results_path(&results)
        .with_tail_backoff(Duration::from_millis(100))
        .with_queue_poll_interval(Duration::from_millis(20));
    let runner = ScriptedRunner {
        log: log.clone(),
        results: results.clone(),
    };
    let mut service =
        MatchService::with_collaborators(&config, Arc::new(runner), Arc::new(LogNotifier))
            .await
            .unwrap();
    service.start();
    tokio::time::sleep(Duration::from_millis(200)).await;

    service.queue_match("Blink", "AcropolisAIE");

    let event = receive(&socket).await;
    assert_eq!(event["_match_id"], 3);
    assert_eq!(
        event["short_message"],
        "[GameAnalyzer] Income advantage is now SlightAdvantage vs Blink"
    );

    service.shutdown().await;
    assert_eq!(
        service.tailer().map(LogTailer::state),
        Some(TailerState::Stopped)
    );
}

/// Records the opponents it played, without touching any file.
#[derive(Default)]
struct RecordingRunner {
    played: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl MatchExecutor for RecordingRunner {
    async fn run(&self, request: &MatchRequest) {
        self.played
            .lock()
            .unwrap()
            .push(request.opponent.clone());
    }
}

#[tokio::test]
async fn service_without_collector_still_plays_queue() {
    init_test_logger();
    let dir = tempfile::tempdir().unwrap();
    let config = Configuration::new("TBone")
        .with_results_path(dir.path().join("results.json"))
        .with_queue_poll_interval(Duration::from_millis(20));
    let runner = Arc::new(RecordingRunner::default());
    let mut service =
        MatchService::with_collaborators(&config, runner.clone(), Arc::new(LogNotifier))
            .await
            .unwrap();
    assert!(service.tailer().is_none());

    service.enqueue(MatchRequest::new("BerlingradAIE", "TBone", "Blink").with_priority(1));
    service.queue_match("Zerg", "AcropolisAIE");
    assert_eq!(service.scheduler().status().pending, 2);

    service.start();
    tokio::time::timeout(Duration::from_secs(10), async {
        while runner.played.lock().unwrap().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue was not drained");

    assert_eq!(*runner.played.lock().unwrap(), ["Blink", "Zerg"]);
    assert_eq!(service.status().pending, 0);
    service.shutdown().await;
}
