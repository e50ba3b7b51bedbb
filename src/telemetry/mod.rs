//! Bot log forwarding: tail the log file, parse each line, ship it to Graylog.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::MatchId;

mod debug_line;
mod forwarder;
mod gelf;
mod tailer;

pub use debug_line::{parse_debug_line, DebugLine};
pub use forwarder::{EventForwarder, LogEvent, EVENT_SOURCE};
pub use tailer::{LogTailer, ReaderCommand, TailerState};

/// Match id shared between the scheduler (writer) and the tailer (reader).
///
/// Match ids start at 1, so 0 stands for "no match yet".
#[derive(Debug, Clone, Default)]
pub struct MatchIdTag(Arc<AtomicU64>);

impl MatchIdTag {
    pub fn set(&self, id: MatchId) {
        self.0.store(id, Ordering::Relaxed);
    }

    pub fn get(&self) -> Option<MatchId> {
        match self.0.load(Ordering::Relaxed) {
            0 => None,
            id => Some(id),
        }
    }
}
