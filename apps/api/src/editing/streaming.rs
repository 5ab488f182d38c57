//! Streaming: turns growing generation buffers into forward-only deltas.
//!
//! A generation source yields cumulative snapshots. `StreamingDiffer` keeps the
//! last one and hands out only the new suffix. When a snapshot does not extend
//! the previous one (the generation restarted, e.g. on retry) the whole new
//! snapshot is emitted as the delta.

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::editing::models::{EditResult, Task};
use crate::llm_client::{LlmError, SnapshotStream};

// ────────────────────────────────────────────────────────────────────────────
// Sink abstraction
// ────────────────────────────────────────────────────────────────────────────

/// Receives live output of a turn. Errors are logged and never fail the turn.
pub trait StreamingSink: Send + Sync {
    fn on_chunk(&self, delta: &str) -> anyhow::Result<()>;
    fn on_plan_update(&self, plan: &[Task]) -> anyhow::Result<()>;
}

pub(crate) fn notify_chunk(sink: Option<&dyn StreamingSink>, delta: &str) {
    if let Some(sink) = sink {
        if let Err(e) = sink.on_chunk(delta) {
            warn!("Streaming sink rejected chunk: {e:#}");
        }
    }
}

pub(crate) fn notify_plan(sink: Option<&dyn StreamingSink>, plan: &[Task]) {
    if let Some(sink) = sink {
        if let Err(e) = sink.on_plan_update(plan) {
            warn!("Streaming sink rejected plan update: {e:#}");
        }
    }
}

/// Events pushed to streaming transports.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditEvent {
    /// New visible text since the previous chunk.
    Chunk { text: String },
    Plan { plan: Vec<Task> },
    Result { result: EditResult },
    Error { code: String, message: String },
}

/// Forwards sink notifications over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EditEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<EditEvent>) -> Self {
        Self { tx }
    }
}

impl StreamingSink for ChannelSink {
    fn on_chunk(&self, delta: &str) -> anyhow::Result<()> {
        self.tx
            .send(EditEvent::Chunk {
                text: delta.to_string(),
            })
            .map_err(|_| anyhow::anyhow!("stream receiver dropped"))
    }

    fn on_plan_update(&self, plan: &[Task]) -> anyhow::Result<()> {
        self.tx
            .send(EditEvent::Plan {
                plan: plan.to_vec(),
            })
            .map_err(|_| anyhow::anyhow!("stream receiver dropped"))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Differ
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct StreamingDiffer {
    last: String,
}

impl StreamingDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last fully observed buffer.
    pub fn snapshot(&self) -> &str {
        &self.last
    }

    /// Records `buffer` and returns what is new since the previous one.
    pub fn observe(&mut self, buffer: &str) -> Option<String> {
        if buffer == self.last {
            return None;
        }
        let delta = match buffer.strip_prefix(self.last.as_str()) {
            Some(suffix) => suffix.to_string(),
            None => {
                debug!(
                    "Generation restarted ({} -> {} bytes), re-emitting full buffer",
                    self.last.len(),
                    buffer.len()
                );
                buffer.to_string()
            }
        };
        self.last = buffer.to_string();
        (!delta.is_empty()).then_some(delta)
    }
}

/// How a driven stream ended.
#[derive(Debug)]
pub struct StreamOutcome {
    /// Last raw snapshot received.
    pub raw: String,
    pub cancelled: bool,
    pub error: Option<LlmError>,
}

/// Pumps `snapshots` until it ends, fails, or `cancel` fires.
///
/// `view` maps a raw snapshot to the text the user should see; it must be
/// prefix-stable for the deltas to stay forward-only. Cancellation and stream
/// errors both return the last observed state rather than raising.
pub async fn drive<F>(
    mut snapshots: SnapshotStream,
    view: F,
    differ: &mut StreamingDiffer,
    sink: Option<&dyn StreamingSink>,
    cancel: &CancellationToken,
) -> StreamOutcome
where
    F: Fn(&str) -> String,
{
    let mut raw = String::new();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return StreamOutcome { raw, cancelled: true, error: None };
            }
            item = snapshots.next() => {
                match item {
                    Some(Ok(buffer)) => {
                        raw = buffer;
                        if let Some(delta) = differ.observe(&view(&raw)) {
                            notify_chunk(sink, &delta);
                        }
                    }
                    Some(Err(e)) => {
                        return StreamOutcome { raw, cancelled: false, error: Some(e) };
                    }
                    None => {
                        return StreamOutcome { raw, cancelled: false, error: None };
                    }
                }
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Visible text of a partial JSON payload
// ────────────────────────────────────────────────────────────────────────────

const MESSAGE_KEY: &str = "\"assistant_message\"";

/// Decodes as much of the `assistant_message` string value as has arrived.
///
/// Stops before an incomplete escape sequence, so the result only ever grows
/// as the buffer grows.
pub fn visible_message(buffer: &str) -> String {
    let Some(key_at) = buffer.find(MESSAGE_KEY) else {
        return String::new();
    };
    let rest = buffer[key_at + MESSAGE_KEY.len()..].trim_start();
    let Some(rest) = rest.strip_prefix(':') else {
        return String::new();
    };
    let Some(body) = rest.trim_start().strip_prefix('"') else {
        return String::new();
    };

    let mut out = String::new();
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => {
                let Some(escape) = chars.next() else { break };
                match escape {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'b' => out.push('\u{8}'),
                    'f' => out.push('\u{c}'),
                    '"' | '\\' | '/' => out.push(escape),
                    'u' => {
                        let hex: String = chars.by_ref().take(4).collect();
                        let Some(code) = parse_hex4(&hex) else { break };
                        if (0xD800..0xDC00).contains(&code) {
                            // high surrogate: need the low half to decode anything
                            let tail: String = chars.by_ref().take(6).collect();
                            let low = tail.strip_prefix("\\u").and_then(parse_hex4);
                            match low.and_then(|low| combine_surrogates(code, low)) {
                                Some(ch) => out.push(ch),
                                None => break,
                            }
                        } else {
                            match char::from_u32(code) {
                                Some(ch) => out.push(ch),
                                None => break,
                            }
                        }
                    }
                    _ => break,
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn parse_hex4(hex: &str) -> Option<u32> {
    if hex.len() != 4 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

fn combine_surrogates(high: u32, low: u32) -> Option<char> {
    if !(0xDC00..0xE000).contains(&low) {
        return None;
    }
    char::from_u32(0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00))
}
