use std::fmt::Display;

/// Priority given to matches queued from chat. Not used for ordering yet.
pub const DEFAULT_PRIORITY: u8 = 3;

/// A match waiting in the queue. Never modified once queued.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchRequest {
    pub map: String,
    /// Our bot.
    pub home: String,
    pub opponent: String,
    pub priority: u8,
}

impl MatchRequest {
    pub fn new(
        map: impl Into<String>,
        home: impl Into<String>,
        opponent: impl Into<String>,
    ) -> MatchRequest {
        MatchRequest {
            map: map.into(),
            home: home.into(),
            opponent: opponent.into(),
            priority: DEFAULT_PRIORITY,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

impl Display for MatchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} vs {} on map {}", self.home, self.opponent, self.map)
    }
}
