//! Runtime settings
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! - `PLAYER1` — Our bot, the home side of every match (required)
//! - `GRAYLOG_HOST` — Graylog host receiving bot logs; log forwarding is off when unset
//! - `GRAYLOG_PORT` — Graylog GELF UDP port (default: `12201`)
//! - `LOG_FILE_PATH` — Bot log file to follow (default: `logs/bot_controller1/TBone/stderr.log`)
//! - `RESULTS_PATH` — Results ledger written by the match runner (default: `results.json`)
//! - `MATCHES_PATH` — Run descriptor read by the match runner (default: `matches`)
//! - `COMPOSE_FILE` — docker-compose file of the match runner (default: `docker-compose-host-network.yml`)
//! - `BOTS_DIR` — Directory holding the bots (default: `bots`)
//! - `TAIL_BACKOFF_SECS` — Delay before restarting a dead log reader (default: `5`)
//! - `QUEUE_POLL_SECS` — Delay between two looks at an idle queue (default: `3`)
//! - `RUNNER_VERBOSE` — Debug level diagnostics, `true` or `false` (default: `true`)
//! - `RUNNER_LOG_DIR` — Write diagnostics to a file in this directory instead of stdout

use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::Context;

pub const DEFAULT_GRAYLOG_PORT: u16 = 12201;

/// Runtime settings.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) bot_name: String,
    pub(crate) graylog_host: Option<String>,
    pub(crate) graylog_port: u16,
    pub(crate) log_file_path: PathBuf,
    pub(crate) results_path: PathBuf,
    pub(crate) matches_path: PathBuf,
    pub(crate) compose_file: PathBuf,
    pub(crate) bots_dir: PathBuf,
    pub(crate) tail_backoff: Duration,
    pub(crate) queue_poll_interval: Duration,
    pub(crate) verbose: bool,
    pub(crate) log_dir: Option<PathBuf>,
}

impl Configuration {
    /// Create a new configuration with default parameters for `bot_name`.
    ///
    /// By default:
    /// - Bot logs are not forwarded (no Graylog host).
    /// - Files are looked up relative to the current directory.
    /// - A dead log reader is restarted after 5 seconds, an idle queue is checked every 3 seconds.
    /// - Diagnostics go to stdout at debug level.
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
            graylog_host: None,
            graylog_port: DEFAULT_GRAYLOG_PORT,
            log_file_path: PathBuf::from("logs/bot_controller1/TBone/stderr.log"),
            results_path: PathBuf::from("results.json"),
            matches_path: PathBuf::from("matches"),
            compose_file: PathBuf::from("docker-compose-host-network.yml"),
            bots_dir: PathBuf::from("bots"),
            tail_backoff: Duration::from_secs(5),
            queue_poll_interval: Duration::from_secs(3),
            verbose: true,
            log_dir: None,
        }
    }

    /// Create configuration from environment variables (see module documentation).
    ///
    /// # Errors
    /// When `PLAYER1` is missing or a numeric variable does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        fn parsed<T: FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            var: &str,
            default: T,
        ) -> anyhow::Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            match lookup(var).filter(|v| !v.is_empty()) {
                Some(val) => val
                    .parse()
                    .with_context(|| format!("invalid value for {var}: '{val}'")),
                None => Ok(default),
            }
        }
        let non_empty = |var: &str| lookup(var).filter(|v| !v.is_empty());

        let bot_name = non_empty("PLAYER1").context("missing required environment variable PLAYER1")?;
        let mut config = Self::new(bot_name);

        config.graylog_host = non_empty("GRAYLOG_HOST");
        config.graylog_port = parsed(&lookup, "GRAYLOG_PORT", DEFAULT_GRAYLOG_PORT)?;
        if let Some(path) = non_empty("LOG_FILE_PATH") {
            config.log_file_path = path.into();
        }
        if let Some(path) = non_empty("RESULTS_PATH") {
            config.results_path = path.into();
        }
        if let Some(path) = non_empty("MATCHES_PATH") {
            config.matches_path = path.into();
        }
        if let Some(path) = non_empty("COMPOSE_FILE") {
            config.compose_file = path.into();
        }
        if let Some(path) = non_empty("BOTS_DIR") {
            config.bots_dir = path.into();
        }
        config.tail_backoff = Duration::from_secs(parsed(&lookup, "TAIL_BACKOFF_SECS", 5)?);
        config.queue_poll_interval = Duration::from_secs(parsed(&lookup, "QUEUE_POLL_SECS", 3)?);
        config.verbose = match non_empty("RUNNER_VERBOSE") {
            Some(val) => val.eq_ignore_ascii_case("true"),
            None => true,
        };
        config.log_dir = non_empty("RUNNER_LOG_DIR").map(PathBuf::from);

        Ok(config)
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    /// Forward bot logs to the Graylog instance at `host`.
    pub fn with_graylog(mut self, host: impl Into<String>, port: u16) -> Self {
        self.graylog_host = Some(host.into());
        self.graylog_port = port;
        self
    }

    /// Bot log file to follow.
    pub fn with_log_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file_path = path.into();
        self
    }

    pub fn with_results_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.results_path = path.into();
        self
    }

    pub fn with_matches_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.matches_path = path.into();
        self
    }

    pub fn with_compose_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.compose_file = path.into();
        self
    }

    pub fn with_bots_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.bots_dir = path.into();
        self
    }

    /// Delay before a dead log reader is restarted.
    pub fn with_tail_backoff(mut self, value: Duration) -> Self {
        self.tail_backoff = value;
        self
    }

    /// Delay between two checks of an idle queue.
    pub fn with_queue_poll_interval(mut self, value: Duration) -> Self {
        self.queue_poll_interval = value;
        self
    }

    /// Enable or disable debug level diagnostics.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Write diagnostics to a timestamped file in `dir`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }
}
