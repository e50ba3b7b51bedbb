//! Runs one match through the local-play-bootstrap docker setup.
//!
//! The runner reads the match to play from a one-line `matches` file:
//!
//! ```text
//! 1,TBone,T,python,2,Opponent,T,cpplinux,AcropolisAIE
//! ```
//!
//! then plays it and appends the outcome to `results.json`.

use std::{
    fmt::Display,
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::match_request::MatchRequest;

/// Executable kind assumed when an agent does not say otherwise.
pub const DEFAULT_AGENT_KIND: &str = "python";
const HOME_RACE: &str = "T";
const OPPONENT_RACE: &str = "T";

/// Plays one match to completion.
#[async_trait]
pub trait MatchExecutor: Send + Sync {
    /// Returns once the match is over, whatever its outcome.
    async fn run(&self, request: &MatchRequest);
}

/// The line written to the `matches` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDescriptor {
    pub home: String,
    pub home_race: String,
    pub home_kind: String,
    pub opponent: String,
    pub opponent_race: String,
    pub opponent_kind: String,
    pub map: String,
}

impl RunDescriptor {
    pub fn new(request: &MatchRequest, opponent_kind: impl Into<String>) -> Self {
        Self {
            home: request.home.clone(),
            home_race: HOME_RACE.to_owned(),
            home_kind: DEFAULT_AGENT_KIND.to_owned(),
            opponent: request.opponent.clone(),
            opponent_race: OPPONENT_RACE.to_owned(),
            opponent_kind: opponent_kind.into(),
            map: request.map.clone(),
        }
    }

    /// Overwrite `path` with this descriptor.
    pub async fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        tokio::fs::write(path, self.to_string())
            .await
            .with_context(|| format!("could not write run descriptor to {}", path.display()))
    }
}

impl Display for RunDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "1,{},{},{},2,{},{},{},{}",
            self.home,
            self.home_race,
            self.home_kind,
            self.opponent,
            self.opponent_race,
            self.opponent_kind,
            self.map
        )
    }
}

/// Executable kind of `agent`, read from `{bots_dir}/{agent}/ladderbots.json`.
///
/// Falls back to [`DEFAULT_AGENT_KIND`] when the file is missing or does not say.
pub async fn agent_kind(bots_dir: &Path, agent: &str) -> String {
    match read_agent_kind(bots_dir, agent).await {
        Ok(Some(kind)) => kind.to_owned(),
        Ok(None) => {
            warn!("unknown executable type for agent '{agent}', assuming {DEFAULT_AGENT_KIND}");
            DEFAULT_AGENT_KIND.to_owned()
        }
        Err(e) => {
            debug!("no ladderbots.json for '{agent}' ({e:#}), assuming {DEFAULT_AGENT_KIND}");
            DEFAULT_AGENT_KIND.to_owned()
        }
    }
}

async fn read_agent_kind(bots_dir: &Path, agent: &str) -> anyhow::Result<Option<&'static str>> {
    let path = bots_dir.join(agent).join("ladderbots.json");
    let text = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("could not read {}", path.display()))?;
    let info: Value = serde_json::from_str(&text).context("invalid ladderbots.json")?;

    let kind = match info["Bots"][agent]["Type"].as_str() {
        Some("BinaryCpp") => Some("cpplinux"),
        Some("Python") => Some("python"),
        Some("DotNetCore") => Some("dotnetcore"),
        _ => None,
    };
    Ok(kind)
}

/// Plays matches with `docker-compose -f <compose file> up`.
#[derive(Debug, Clone)]
pub struct DockerComposeExecutor {
    compose_file: PathBuf,
    matches_path: PathBuf,
    bots_dir: PathBuf,
}

impl DockerComposeExecutor {
    pub fn new(
        compose_file: impl Into<PathBuf>,
        matches_path: impl Into<PathBuf>,
        bots_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            compose_file: compose_file.into(),
            matches_path: matches_path.into(),
            bots_dir: bots_dir.into(),
        }
    }

    async fn prepare(&self, request: &MatchRequest) -> anyhow::Result<()> {
        let kind = agent_kind(&self.bots_dir, &request.opponent).await;
        let descriptor = RunDescriptor::new(request, kind);
        debug!(%descriptor);
        descriptor.write_to(&self.matches_path).await
    }

    async fn compose_up(&self) -> anyhow::Result<std::process::ExitStatus> {
        tokio::process::Command::new("docker-compose")
            .arg("-f")
            .arg(&self.compose_file)
            .arg("up")
            .stdin(Stdio::null())
            .status()
            .await
            .context("could not run docker-compose")
    }
}

#[async_trait]
impl MatchExecutor for DockerComposeExecutor {
    #[instrument(skip_all, fields(%request))]
    async fn run(&self, request: &MatchRequest) {
        if let Err(e) = self.prepare(request).await {
            error!("{e:#}");
            return;
        }

        match self.compose_up().await {
            Ok(status) if status.success() => info!("match runner finished"),
            Ok(status) => warn!(%status, "match runner failed"),
            Err(e) => error!("{e:#}"),
        }
    }
}
