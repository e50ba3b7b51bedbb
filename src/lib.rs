//! # SC2 Match Relay
//!
//! Plays StarCraft II bot matches one at a time and streams the bot's log to Graylog while
//! they run.
//!
//! It provides:
//! - A FIFO match queue that never runs two matches at once ([`MatchQueueScheduler`](crate::match_scheduler::MatchQueueScheduler))
//! - Match execution through the docker-compose based match runner ([`DockerComposeExecutor`](crate::match_runner::DockerComposeExecutor))
//! - A `tail -f` based log follower that parses bot debug lines and forwards them as GELF
//!   events, tagged with the id of the match in progress ([`LogTailer`](crate::telemetry::LogTailer))
//! - Read access to the runner's `results.json` ledger ([`ResultsLedger`](crate::ledger::ResultsLedger))
//!
//! # Documentation Overview
//!
//! - For wiring everything together, see [`MatchService`](crate::server::MatchService).
//! - For settings and their environment variables, see [`Configuration`](crate::configuration::Configuration).
//! - For the log line format and the forwarded fields, see the [`telemetry`] module.
//!
//! # Usage Example
//!
//! ```no_run
//! use sc2_match_relay::prelude::*;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Configuration::new("TBone").with_graylog("graylog.lan", 12201);
//!     let mut service = MatchService::new(&config).await?;
//!     service.start();
//!
//!     service.queue_match("Blink", "AcropolisAIE");
//!
//!     tokio::signal::ctrl_c().await?;
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod configuration;
pub mod ledger;
mod logger;
pub mod match_request;
pub mod match_runner;
pub mod match_scheduler;
pub mod notifier;
pub mod server;
pub mod telemetry;

pub use anyhow;
pub use logger::init_logger;

/// Identifier correlating forwarded log lines with a match. Starts at 1.
pub type MatchId = u64;

/// Commonly used types for quick access.
///
/// ```rust
/// use sc2_match_relay::prelude::*;
/// ```
pub mod prelude {
    pub use crate::configuration::Configuration;
    pub use crate::ledger::ResultsLedger;
    pub use crate::match_request::MatchRequest;
    pub use crate::match_runner::{DockerComposeExecutor, MatchExecutor};
    pub use crate::match_scheduler::MatchQueueScheduler;
    pub use crate::notifier::{LogNotifier, Notifier};
    pub use crate::server::MatchService;
    pub use crate::telemetry::{EventForwarder, LogTailer};
    pub use crate::MatchId;
}
