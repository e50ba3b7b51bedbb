use async_trait::async_trait;
use tracing::info;

/// Where match announcements and results go (a chat channel in production).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> anyhow::Result<()>;
}

/// Writes notifications to the diagnostics log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) -> anyhow::Result<()> {
        info!(target: "sc2_match_relay::notify", "{text}");
        Ok(())
    }
}
