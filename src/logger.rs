use std::{fs::File, sync::Mutex};

use anyhow::Context;
use time::{
    format_description::{self, parse},
    OffsetDateTime,
};
use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, FmtSubscriber};

use crate::configuration::Configuration;

/// Install the global diagnostics subscriber: stdout, or a timestamped file in
/// `config.log_dir` when set.
pub fn init_logger(config: &Configuration) -> anyhow::Result<()> {
    let level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let local_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
            .context("invalid time format")?,
    );

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_timer(timer);

    let result = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("could not create {}", dir.display()))?;
            let path = dir.join(get_log_file_name()?);
            let file = File::create(&path)
                .with_context(|| format!("could not create {}", path.display()))?;
            let subscriber = builder
                .with_ansi(false)
                .with_writer(BoxMakeWriter::new(Mutex::new(file)))
                .finish();
            set_global_default(subscriber)
        }
        None => set_global_default(builder.finish()),
    };
    result.context("a global tracing subscriber is already set")
}

fn get_log_file_name() -> anyhow::Result<String> {
    let format = parse("[year]-[month]-[day]_[hour]-[minute]-[second]_relay.log")
        .context("invalid file name format")?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&format).context("could not format log file name")
}

#[cfg(test)]
mod logger_tests {
    use super::*;

    #[test]
    fn log_file_name_is_timestamped() {
        let name = get_log_file_name().unwrap();
        assert!(name.ends_with("_relay.log"));
        // YYYY-MM-DD_HH-MM-SS
        assert_eq!(name.len(), "2024-01-01_00-00-00_relay.log".len());
        assert!(!name.contains(':'));
    }
}
