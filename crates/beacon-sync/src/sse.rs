//! Server-Sent Events push transport.
//!
//! Consumes a `text/event-stream` endpoint with reqwest:
//!
//! ```text
//! event: ReceiveNotification
//! data: {"id":42,"type":"alert","title":"...","createdAt":"..."}
//!
//! : keepalive
//! ```
//!
//! `event:` names the event, `data:` lines carry the JSON payload, lines
//! starting with `:` are comments (keep-alives), and a blank line dispatches.
//! When the stream drops the transport walks its reconnect schedule before
//! reporting the channel closed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::{Client, Response};
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

use beacon_core::{defaults, Error, PushEvent, Result};

use crate::transport::{PushTransport, TransportSession, TransportSignal};

/// Event name used when a frame has `data:` but no `event:` field.
const DEFAULT_EVENT_NAME: &str = "message";

// =============================================================================
// PARSER
// =============================================================================

/// Incremental SSE frame parser.
///
/// Chunks may split lines (and UTF-8 sequences) anywhere; bytes are buffered
/// until a full line is available. A line longer than `max_line` is dropped
/// together with the frame it belongs to.
#[derive(Debug)]
pub struct SseParser {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already searched for a newline.
    scanned: usize,
    max_line: usize,
    /// Skipping the rest of an oversized line.
    discarding: bool,
    event_name: Option<String>,
    data: Vec<String>,
}

impl Default for SseParser {
    fn default() -> Self {
        Self::with_max_line(defaults::MAX_SSE_LINE_BYTES)
    }
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_line,
            discarding: false,
            event_name: None,
            data: Vec::new(),
        }
    }

    /// Feed raw bytes; returns every event completed by them, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<PushEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            let line_start = start;
            start = end + 1;
            self.scanned = start;

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if end - line_start > self.max_line {
                self.drop_oversized_line(end - line_start);
                self.discarding = false;
                continue;
            }

            let mut line = &self.buffer[line_start..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            let line = String::from_utf8_lossy(line).into_owned();
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_line {
            if !self.discarding {
                self.drop_oversized_line(self.buffer.len());
            }
            self.buffer.clear();
            self.scanned = 0;
        }

        events
    }

    /// Abandon the frame in progress and skip input up to the next newline.
    fn drop_oversized_line(&mut self, len: usize) {
        warn!(
            len,
            limit = self.max_line,
            "Dropping SSE frame with an oversized line"
        );
        self.event_name = None;
        self.data.clear();
        self.discarding = true;
    }

    fn process_line(&mut self, line: &str) -> Option<PushEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            trace!(comment = line, "SSE comment");
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event_name = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id / retry are not used: reconnect cadence is ours, and the
            // server does not replay missed events.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<PushEvent> {
        let name = self
            .event_name
            .take()
            .unwrap_or_else(|| DEFAULT_EVENT_NAME.to_string());
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");

        match serde_json::from_str::<JsonValue>(&data) {
            Ok(payload) => {
                trace!(event = %name, "SSE event parsed");
                Some(PushEvent { name, payload })
            }
            Err(e) => {
                warn!(event = %name, error = %e, "Dropping SSE event with non-JSON data");
                None
            }
        }
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Push transport over Server-Sent Events.
pub struct SseTransport {
    client: Client,
    url: String,
    reconnect_delays: Vec<Duration>,
}

impl SseTransport {
    /// Create a transport with the default reconnect schedule.
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            reconnect_delays: defaults::TRANSPORT_RECONNECT_DELAYS_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        }
    }

    /// Override the reconnect schedule used after a mid-session drop.
    pub fn with_reconnect_delays(mut self, delays: Vec<Duration>) -> Self {
        self.reconnect_delays = delays;
        self
    }
}

#[async_trait]
impl PushTransport for SseTransport {
    async fn open(&self) -> Result<TransportSession> {
        let response = connect(&self.client, &self.url).await?;
        debug!(url = %self.url, "SSE stream opened");

        let (session, signal_tx, close_rx) =
            TransportSession::channel(defaults::TRANSPORT_SIGNAL_CAPACITY);

        tokio::spawn(run_session(
            self.client.clone(),
            self.url.clone(),
            self.reconnect_delays.clone(),
            response,
            signal_tx,
            close_rx,
        ));

        Ok(session)
    }
}

async fn connect(client: &Client, url: &str) -> Result<Response> {
    client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .send()
        .await
        .and_then(Response::error_for_status)
        .map_err(|e| Error::Transport(format!("SSE connect to {url} failed: {e}")))
}

/// Why a stream read loop stopped.
enum StreamEnd {
    /// The consumer closed (or dropped) the session.
    Closed,
    /// Nobody is listening for signals any more.
    ReceiverGone,
    /// The server side went away.
    Dropped(String),
}

enum ReconnectOutcome {
    Connected(Response),
    Exhausted(String),
    Closed,
}

async fn run_session(
    client: Client,
    url: String,
    reconnect_delays: Vec<Duration>,
    mut response: Response,
    signal_tx: mpsc::Sender<TransportSignal>,
    mut close_rx: oneshot::Receiver<()>,
) {
    loop {
        let reason = match read_stream(&mut response, &signal_tx, &mut close_rx).await {
            StreamEnd::Closed | StreamEnd::ReceiverGone => {
                debug!(url = %url, "SSE session closed by consumer");
                return;
            }
            StreamEnd::Dropped(reason) => reason,
        };

        warn!(url = %url, reason = %reason, "SSE stream dropped, reconnecting");
        if signal_tx
            .send(TransportSignal::Reconnecting {
                reason: reason.clone(),
            })
            .await
            .is_err()
        {
            return;
        }

        match reconnect(&client, &url, &reconnect_delays, &mut close_rx).await {
            ReconnectOutcome::Connected(next) => {
                info!(url = %url, "SSE stream re-established");
                response = next;
                if signal_tx.send(TransportSignal::Reconnected).await.is_err() {
                    return;
                }
            }
            ReconnectOutcome::Exhausted(last_error) => {
                warn!(url = %url, error = %last_error, "SSE reconnect attempts exhausted");
                let _ = signal_tx
                    .send(TransportSignal::Closed {
                        reason: Some(last_error),
                    })
                    .await;
                return;
            }
            ReconnectOutcome::Closed => return,
        }
    }
}

async fn read_stream(
    response: &mut Response,
    signal_tx: &mpsc::Sender<TransportSignal>,
    close_rx: &mut oneshot::Receiver<()>,
) -> StreamEnd {
    let mut parser = SseParser::new();
    loop {
        tokio::select! {
            _ = &mut *close_rx => return StreamEnd::Closed,
            chunk = response.chunk() => match chunk {
                Ok(Some(bytes)) => {
                    for event in parser.feed(&bytes) {
                        if signal_tx.send(TransportSignal::Message(event)).await.is_err() {
                            return StreamEnd::ReceiverGone;
                        }
                    }
                }
                Ok(None) => return StreamEnd::Dropped("stream ended".to_string()),
                Err(e) => return StreamEnd::Dropped(e.to_string()),
            },
        }
    }
}

async fn reconnect(
    client: &Client,
    url: &str,
    delays: &[Duration],
    close_rx: &mut oneshot::Receiver<()>,
) -> ReconnectOutcome {
    let mut last_error = "no reconnect attempts configured".to_string();

    for (attempt, delay) in delays.iter().enumerate() {
        tokio::select! {
            _ = &mut *close_rx => return ReconnectOutcome::Closed,
            _ = sleep(*delay) => {}
        }

        debug!(attempt = attempt + 1, url, "SSE reconnect attempt");
        tokio::select! {
            _ = &mut *close_rx => return ReconnectOutcome::Closed,
            result = connect(client, url) => match result {
                Ok(response) => return ReconnectOutcome::Connected(response),
                Err(e) => last_error = e.to_string(),
            },
        }
    }

    ReconnectOutcome::Exhausted(last_error)
}
