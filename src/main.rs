use anyhow::Context;
use sc2_match_relay::{init_logger, match_scheduler::QueueStatus, prelude::*};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

const DEFAULT_MAP: &str = "Acropolis";
/// Suffix of the AI Arena map files.
const MAP_SUFFIX: &str = "AIE";

const HELP: &str = "\
Commands:
  !match <opponent> [map]   queue a match against <opponent> (default map: Acropolis)
  !status                   show the current match and queue size
  !help                     show this message";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Match { opponent: String, map: String },
    Status,
    Help,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    match words.next()? {
        "!match" => {
            let params: Vec<&str> = words.collect();
            // a map is only taken from exactly `<opponent> <map>`
            let (opponent, map) = match params.as_slice() {
                [] => return None,
                [opponent, map] => (opponent.to_string(), *map),
                [opponent, ..] => (opponent.to_string(), DEFAULT_MAP),
            };
            Some(Command::Match {
                opponent,
                map: format!("{map}{MAP_SUFFIX}"),
            })
        }
        "!status" => Some(Command::Status),
        "!help" => Some(Command::Help),
        _ => None,
    }
}

fn status_message(status: &QueueStatus) -> String {
    match &status.current {
        Some(current) => format!("Current match: {current}"),
        None => format!("No active match. Queue size: {}", status.pending),
    }
}

/// Read commands from stdin until it closes or Ctrl-C.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Configuration::from_env()?;
    init_logger(&config)?;

    let mut service = MatchService::new(&config)
        .await
        .context("could not start match service")?;
    service.start();
    info!(bot = config.bot_name(), "ready, type !help for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("could not read stdin: {e}");
                break;
            }
        };

        match parse_command(&line) {
            Some(Command::Match { opponent, map }) => {
                println!("Queueing match against: {opponent} on map: {map}");
                service.queue_match(&opponent, &map);
            }
            Some(Command::Status) => println!("{}", status_message(&service.status())),
            Some(Command::Help) => println!("{HELP}"),
            None if line.trim().is_empty() => {}
            None => warn!("unknown command: {line}"),
        }
    }

    service.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod command_tests {
    use super::*;

    #[test]
    fn match_command() {
        assert_eq!(
            parse_command("!match Blink Berlingrad"),
            Some(Command::Match {
                opponent: "Blink".into(),
                map: "BerlingradAIE".into()
            })
        );
        assert_eq!(
            parse_command("!match Blink"),
            Some(Command::Match {
                opponent: "Blink".into(),
                map: "AcropolisAIE".into()
            })
        );
        assert_eq!(
            parse_command("!match Blink Berlingrad Extra"),
            Some(Command::Match {
                opponent: "Blink".into(),
                map: "AcropolisAIE".into()
            })
        );
        assert_eq!(parse_command("!match"), None);
    }

    #[test]
    fn status_reports_one_snapshot() {
        let idle = QueueStatus {
            current: None,
            pending: 2,
        };
        assert_eq!(status_message(&idle), "No active match. Queue size: 2");

        let busy = QueueStatus {
            current: Some(MatchRequest::new("AcropolisAIE", "TBone", "Blink")),
            pending: 0,
        };
        assert_eq!(
            status_message(&busy),
            "Current match: TBone vs Blink on map AcropolisAIE"
        );
    }

    #[test]
    fn other_commands() {
        assert_eq!(parse_command("!status"), Some(Command::Status));
        assert_eq!(parse_command("  !help "), Some(Command::Help));
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command(""), None);
    }
}
