//! Wires the match queue and the log tailer together.
//!
//! [`MatchService::start`] spawns two independent tasks on the current tokio runtime:
//!
//! - the queue loop, which plays queued matches one at a time through an executor, and
//! - the log tailer (only when a Graylog host is configured), which forwards the bot log file
//!   line by line, tagged with the id of the match the queue loop last started.
//!
//! The queue loop runs for the lifetime of the process; [`MatchService::shutdown`] only stops
//! the tailer so that no reader process outlives the service.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::{
    configuration::Configuration,
    ledger::ResultsLedger,
    match_request::MatchRequest,
    match_runner::{DockerComposeExecutor, MatchExecutor},
    match_scheduler::{MatchQueueScheduler, QueueStatus},
    notifier::{LogNotifier, Notifier},
    telemetry::{EventForwarder, LogTailer},
};

pub struct MatchService {
    scheduler: Arc<MatchQueueScheduler>,
    tailer: Option<LogTailer>,
    queue_task: Option<JoinHandle<()>>,
}

impl MatchService {
    /// Build the service with the docker-compose executor and log notifications.
    pub async fn new(config: &Configuration) -> anyhow::Result<Self> {
        let executor = DockerComposeExecutor::new(
            &config.compose_file,
            &config.matches_path,
            &config.bots_dir,
        );
        Self::with_collaborators(config, Arc::new(executor), Arc::new(LogNotifier)).await
    }

    /// Build the service around custom collaborators.
    #[instrument(skip_all, fields(bot = %config.bot_name))]
    pub async fn with_collaborators(
        config: &Configuration,
        executor: Arc<dyn MatchExecutor>,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let tailer = match &config.graylog_host {
            Some(host) => {
                let forwarder = EventForwarder::connect(host, config.graylog_port).await?;
                Some(
                    LogTailer::new(&config.log_file_path, forwarder)
                        .with_backoff(config.tail_backoff),
                )
            }
            None => {
                info!("no Graylog host configured, bot logs are not forwarded");
                None
            }
        };

        let mut scheduler = MatchQueueScheduler::new(
            config.bot_name.as_str(),
            ResultsLedger::new(&config.results_path),
            executor,
            notifier,
        )
        .with_poll_interval(config.queue_poll_interval);
        if let Some(tailer) = &tailer {
            scheduler = scheduler.with_match_id_tag(tailer.match_id_tag());
        }

        Ok(Self {
            scheduler: Arc::new(scheduler),
            tailer,
            queue_task: None,
        })
    }

    /// Spawn the queue loop and the tailer. Calling it again does nothing.
    pub fn start(&mut self) {
        if let Some(tailer) = &mut self.tailer {
            tailer.start();
        }
        if self.queue_task.is_none() {
            self.queue_task = Some(tokio::spawn(self.scheduler.clone().run()));
        }
    }

    pub fn queue_match(&self, opponent: &str, map: &str) -> MatchRequest {
        self.scheduler.queue_match(opponent, map)
    }

    pub fn enqueue(&self, request: MatchRequest) {
        self.scheduler.enqueue(request);
    }

    pub fn status(&self) -> QueueStatus {
        self.scheduler.status()
    }

    pub fn scheduler(&self) -> &Arc<MatchQueueScheduler> {
        &self.scheduler
    }

    pub fn tailer(&self) -> Option<&LogTailer> {
        self.tailer.as_ref()
    }

    /// Stop the log tailer and wait for its reader process to exit.
    pub async fn shutdown(&mut self) {
        if let Some(tailer) = &mut self.tailer {
            tailer.stop().await;
        }
    }
}
