use std::net::SocketAddr;

use anyhow::Context;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::net::UdpSocket;
use tracing::{debug, info, instrument, warn};

use super::debug_line::{parse_debug_line, DebugLine};
use super::gelf;
use crate::MatchId;

/// Tag put on every event so Graylog streams can tell this pipeline apart.
pub const EVENT_SOURCE: &str = "starcraft_bot_controller";

/// One forwarded log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    pub match_id: Option<MatchId>,
    pub source: &'static str,
    pub host: String,
    #[serde(skip)]
    pub message: String,
    #[serde(flatten)]
    pub line: Option<DebugLine>,
}

impl LogEvent {
    /// Flat key/value view, as sent to the collector.
    pub fn fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

struct Collector {
    socket: UdpSocket,
    target: SocketAddr,
    chunk_size: usize,
}

/// Sends log events to a GELF UDP collector and mirrors them to the local diagnostics.
///
/// Delivery is fire-and-forget: a failed send is logged and the event is lost.
pub struct EventForwarder {
    host: String,
    collector: Option<Collector>,
}

impl std::fmt::Debug for EventForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventForwarder")
            .field("host", &self.host)
            .field("collector", &self.collector.as_ref().map(|c| c.target))
            .finish()
    }
}

impl EventForwarder {
    /// Forwarder that only mirrors events locally.
    pub fn local_only() -> Self {
        Self {
            host: local_host_name(),
            collector: None,
        }
    }

    /// Resolve the collector address and open the UDP socket used to reach it.
    #[instrument]
    pub async fn connect(collector_host: &str, collector_port: u16) -> anyhow::Result<Self> {
        let target = tokio::net::lookup_host((collector_host, collector_port))
            .await
            .with_context(|| format!("could not resolve {collector_host}:{collector_port}"))?
            .next()
            .with_context(|| format!("no address for {collector_host}:{collector_port}"))?;

        let bind_addr = if target.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .context("could not bind GELF socket")?;
        info!(%target, "forwarding bot logs");

        Ok(Self {
            host: local_host_name(),
            collector: Some(Collector {
                socket,
                target,
                chunk_size: gelf::WAN_CHUNK_SIZE,
            }),
        })
    }

    /// Override the host name reported in events.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Turn a raw line into an event. Lines that don't parse keep their raw text as message.
    pub fn event(&self, match_id: Option<MatchId>, raw: &str) -> LogEvent {
        let line = parse_debug_line(raw);
        let message = match &line {
            Some(line) => line.message.clone(),
            None => raw.to_owned(),
        };
        LogEvent {
            match_id,
            source: EVENT_SOURCE,
            host: self.host.clone(),
            message,
            line,
        }
    }

    /// Mirror the event locally, then send it to the collector if there is one.
    pub async fn forward(&self, event: &LogEvent) {
        self.mirror(event);

        let Some(collector) = &self.collector else {
            return;
        };
        if let Err(e) = collector.send(event).await {
            warn!("could not forward log event: {e:#}");
        }
    }

    fn mirror(&self, event: &LogEvent) {
        match &event.line {
            Some(line) => info!(
                target: "sc2_match_relay::telemetry",
                match_id = ?event.match_id,
                game_time = %line.game_time,
                game_step = line.game_step,
                minerals = %line.minerals,
                gas = %line.gas,
                supply = %format!("{}/{}", line.supply_used, line.supply_capacity),
                source_file = %line.source_file,
                line_number = line.line_number,
                "{}",
                event.message
            ),
            None => info!(
                target: "sc2_match_relay::telemetry",
                match_id = ?event.match_id,
                "{}",
                event.message
            ),
        }
    }
}

impl Collector {
    async fn send(&self, event: &LogEvent) -> anyhow::Result<()> {
        let mut fields = event.fields();
        fields.remove("host");
        let payload =
            gelf::encode_message(&event.host, &event.message, unix_timestamp(), fields)?;
        let datagrams = gelf::into_datagrams(payload, self.chunk_size, rand::random())?;
        for datagram in &datagrams {
            self.socket
                .send_to(datagram, self.target)
                .await
                .with_context(|| format!("send to {} failed", self.target))?;
        }
        debug!(datagrams = datagrams.len(), "GELF message emitted");
        Ok(())
    }
}

fn unix_timestamp() -> f64 {
    let now = time::OffsetDateTime::now_utc();
    now.unix_timestamp_nanos() as f64 / 1e9
}

fn local_host_name() -> String {
    whoami::fallible::hostname().unwrap_or_else(|_| "unknown".into())
}
