//! Parser for the column-oriented debug lines written by the bot.
//!
//! A conforming line looks like:
//!
//! ```text
//! 00:10  240   43ms     0M    0G  13/ 15U sharpy.managers.core.log_manager:71 [GameAnalyzer] Income advantage
//! ```
//!
//! Some bot versions print a severity token (`INFO`, `Level 20`, ...) between the supply
//! column and the source location, others don't. Both forms are accepted.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static DEBUG_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(\d{2}:\d{2})\s+",                // game clock
        r"(\d+)\s+",                         // game step
        r"(\d+ms)\s+",                       // step duration
        r"(\d+M)\s+",                        // minerals
        r"(\d+G)\s+",                        // gas
        r"(\d+)\s*/\s*(\d+)U\s+",            // supply used/capacity
        r"(?:(Level\s+\d+|[A-Za-z]+)\s+)?",  // severity, not always present
        r"([^\s:]+):",                       // source file
        r"(\d+)\s+",                         // line number
        r"(.*)$",                            // message
    ))
    .expect("debug line pattern is valid")
});

/// Structured content of one bot debug line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugLine {
    pub game_time: String,
    pub game_step: u64,
    pub step_length: String,
    pub minerals: String,
    pub gas: String,
    pub supply_used: u32,
    pub supply_capacity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    pub source_file: String,
    pub line_number: u32,
    #[serde(skip)]
    pub message: String,
}

/// Parse one line (without its trailing newline).
///
/// Returns `None` when the line does not follow the column layout; the caller then forwards
/// the raw text as-is. Leading and trailing whitespace is ignored.
pub fn parse_debug_line(line: &str) -> Option<DebugLine> {
    let caps = DEBUG_LINE.captures(line.trim())?;
    let text = |i: usize| caps.get(i).map(|m| m.as_str().to_owned());

    Some(DebugLine {
        game_time: text(1)?,
        game_step: caps.get(2)?.as_str().parse().ok()?,
        step_length: text(3)?,
        minerals: text(4)?,
        gas: text(5)?,
        supply_used: caps.get(6)?.as_str().parse().ok()?,
        supply_capacity: caps.get(7)?.as_str().parse().ok()?,
        log_level: text(8),
        source_file: text(9)?,
        line_number: caps.get(10)?.as_str().parse().ok()?,
        message: text(11)?,
    })
}
