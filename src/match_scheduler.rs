//! Sequential match queue.
//!
//! Requests are played strictly one after the other, in arrival order. Before each match the
//! next match id is read from the results ledger and published to the log tailer, so every
//! forwarded bot log line can be grouped by match.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    ledger::{MatchRecord, ResultsLedger},
    match_request::MatchRequest,
    match_runner::MatchExecutor,
    notifier::Notifier,
    telemetry::MatchIdTag,
    MatchId,
};

/// Snapshot of the queue, for status queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    pub current: Option<MatchRequest>,
    pub pending: usize,
}

pub struct MatchQueueScheduler {
    home: String,
    queue: Mutex<VecDeque<MatchRequest>>,
    current: Mutex<Option<MatchRequest>>,
    ledger: ResultsLedger,
    executor: Arc<dyn MatchExecutor>,
    notifier: Arc<dyn Notifier>,
    match_id: Option<MatchIdTag>,
    poll_interval: Duration,
}

impl std::fmt::Debug for MatchQueueScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchQueueScheduler")
            .field("home", &self.home)
            .field("status", &self.status())
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

impl MatchQueueScheduler {
    pub fn new(
        home: impl Into<String>,
        ledger: ResultsLedger,
        executor: Arc<dyn MatchExecutor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            home: home.into(),
            queue: Mutex::new(VecDeque::new()),
            current: Mutex::new(None),
            ledger,
            executor,
            notifier,
            match_id: None,
            poll_interval: Duration::from_secs(3),
        }
    }

    /// Publish each new match id through `tag` (usually the log tailer's).
    pub fn with_match_id_tag(mut self, tag: MatchIdTag) -> Self {
        self.match_id = Some(tag);
        self
    }

    /// How long the loop sleeps when there is nothing to start.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Append `request` to the queue. Callable at any time, even while a match is running.
    pub fn enqueue(&self, request: MatchRequest) {
        let mut queue = self.queue.lock().expect("poisoned");
        queue.push_back(request);
        debug!(pending = queue.len(), "match queued");
    }

    /// Queue our bot against `opponent` on `map`.
    pub fn queue_match(&self, opponent: &str, map: &str) -> MatchRequest {
        let request = MatchRequest::new(map, self.home.as_str(), opponent);
        self.enqueue(request.clone());
        request
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            current: self.current.lock().expect("poisoned").clone(),
            pending: self.queue.lock().expect("poisoned").len(),
        }
    }

    /// Drain the queue forever.
    pub async fn run(self: Arc<Self>) {
        info!("match queue started");
        loop {
            if !self.process_next().await {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }

    /// Play the head of the queue if no match is running.
    ///
    /// Returns `false` when there was nothing to do.
    pub async fn process_next(&self) -> bool {
        let request = {
            let mut current = self.current.lock().expect("poisoned");
            if current.is_some() {
                return false;
            }
            let Some(request) = self.queue.lock().expect("poisoned").pop_front() else {
                return false;
            };
            *current = Some(request.clone());
            request
        };

        self.play(&request).await;

        *self.current.lock().expect("poisoned") = None;
        true
    }

    #[instrument(skip_all, fields(%request))]
    async fn play(&self, request: &MatchRequest) {
        let match_id = self.ledger.next_match_id().await;
        if let Some(tag) = &self.match_id {
            tag.set(match_id);
        }
        info!(match_id, "starting match");
        self.notify(&format!(
            "Match {match_id} started: {} vs {} on map {}",
            request.home, request.opponent, request.map
        ))
        .await;

        self.executor.run(request).await;
        info!(match_id, "match ended");

        self.report_result(match_id, request).await;
    }

    async fn report_result(&self, match_id: MatchId, request: &MatchRequest) {
        let text = match self.ledger.last_result().await {
            Ok(result) => format_result(result, request),
            Err(e) => {
                error!("no result for match {match_id}: {e}");
                format!("No result recorded for match {match_id} ({e})")
            }
        };
        self.notify(&text).await;
    }

    async fn notify(&self, text: &str) {
        if let Err(e) = self.notifier.notify(text).await {
            warn!("could not send notification: {e:#}");
        }
    }
}

/// Result message: the ledger record plus the opponent and map of the request.
fn format_result(mut result: MatchRecord, request: &MatchRequest) -> String {
    result.insert("opponent".into(), request.opponent.clone().into());
    result.insert("map".into(), request.map.clone().into());
    format!(
        "**Match Results:**\n```json\n{}\n```",
        to_pretty_json(&Value::Object(result))
    )
}

fn to_pretty_json(value: &Value) -> String {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    if value.serialize(&mut ser).is_err() {
        return value.to_string();
    }
    String::from_utf8(buf).unwrap_or_else(|_| value.to_string())
}
