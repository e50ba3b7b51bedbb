//! Read-only access to the `results.json` ledger written by the match runner.
//!
//! ```json
//! { "results": [ { "match": 1, "bot1": "...", "winner": "..." }, ... ] }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::MatchId;

/// One ledger entry. Only `match` is relied upon, everything else is passed through.
pub type MatchRecord = Map<String, Value>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("no match result recorded in {0}")]
    NotFound(PathBuf),
    #[error("could not read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed results file {path}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct LedgerFile {
    results: Vec<MatchRecord>,
}

#[derive(Debug, Clone)]
pub struct ResultsLedger {
    path: PathBuf,
}

impl ResultsLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Id for the match about to start: last recorded `match` + 1.
    ///
    /// Any read or parse problem yields 1.
    #[instrument(skip(self), fields(path = ?self.path))]
    pub async fn next_match_id(&self) -> MatchId {
        let last = match self.last_result().await {
            Ok(last) => last,
            Err(LedgerError::NotFound(_)) => return 1,
            Err(e) => {
                warn!("defaulting match id to 1: {e}");
                return 1;
            }
        };
        match last.get("match").and_then(Value::as_u64) {
            Some(id) => id.checked_add(1).unwrap_or_else(|| {
                warn!("last match id {id} cannot be incremented, defaulting to 1");
                1
            }),
            None => {
                debug!("last result has no integer 'match' field");
                1
            }
        }
    }

    /// Most recent record of the ledger.
    pub async fn last_result(&self) -> Result<MatchRecord, LedgerError> {
        let mut results = self.results().await?;
        results
            .pop()
            .ok_or_else(|| LedgerError::NotFound(self.path.clone()))
    }

    async fn results(&self) -> Result<Vec<MatchRecord>, LedgerError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LedgerError::NotFound(self.path.clone()))
            }
            Err(source) => {
                return Err(LedgerError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let file: LedgerFile =
            serde_json::from_str(&text).map_err(|source| LedgerError::Malformed {
                path: self.path.clone(),
                source,
            })?;
        Ok(file.results)
    }
}

#[cfg(test)]
mod ledger_tests {
    use serde_json::json;

    use super::*;

    fn ledger_with(content: &str) -> (tempfile::TempDir, ResultsLedger) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, content).unwrap();
        (dir, ResultsLedger::new(path))
    }

    #[tokio::test]
    async fn next_id_follows_last_match() {
        let (_dir, ledger) = ledger_with(r#"{"results":[{"match":7}]}"#);
        assert_eq!(ledger.next_match_id().await, 8);

        let (_dir, ledger) =
            ledger_with(r#"{"results":[{"match":2},{"match":3,"winner":"TBone"}]}"#);
        assert_eq!(ledger.next_match_id().await, 4);
    }

    #[tokio::test]
    async fn next_id_defaults_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ResultsLedger::new(dir.path().join("results.json"));
        assert_eq!(missing.next_match_id().await, 1);

        for content in [
            "{}",
            "",
            "not json",
            r#"{"results":[]}"#,
            r#"{"results":[{"winner":"TBone"}]}"#,
            r#"{"results":[{"match":"seven"}]}"#,
            r#"[1, 2]"#,
        ] {
            let (_dir, ledger) = ledger_with(content);
            assert_eq!(ledger.next_match_id().await, 1, "content: {content:?}");
        }
    }

    #[tokio::test]
    async fn next_id_wraps_to_one_at_max() {
        let (_dir, ledger) = ledger_with(r#"{"results":[{"match":18446744073709551615}]}"#);
        assert_eq!(ledger.next_match_id().await, 1);
        assert_eq!(ledger.path().file_name().unwrap(), "results.json");
    }

    #[tokio::test]
    async fn last_result_returns_last_record() {
        let (_dir, ledger) = ledger_with(
            r#"{"results":[{"match":1,"result":"Player1Win"},{"match":2,"result":"Player2Win"}]}"#,
        );
        let last = ledger.last_result().await.unwrap();
        assert_eq!(Value::Object(last), json!({"match": 2, "result": "Player2Win"}));
    }

    #[tokio::test]
    async fn last_result_not_found_when_empty_or_absent() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ResultsLedger::new(dir.path().join("results.json"));
        assert!(matches!(
            missing.last_result().await,
            Err(LedgerError::NotFound(_))
        ));

        let (_dir, ledger) = ledger_with(r#"{"results":[]}"#);
        assert!(matches!(
            ledger.last_result().await,
            Err(LedgerError::NotFound(_))
        ));

        let (_dir, ledger) = ledger_with("{");
        assert!(matches!(
            ledger.last_result().await,
            Err(LedgerError::Malformed { .. })
        ));
    }
}
