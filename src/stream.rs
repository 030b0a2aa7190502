//! Ordered event stream for one conversational turn.
//!
//! The agent layer pushes tool lifecycle notifications, model tokens, and a
//! final model-done marker through an [`EmitterHandle`]; the transport end
//! consumes an ordered [`StreamEvent`] sequence from
//! [`StreamEmitter::into_stream`]. Ordering guarantees:
//!
//! - `tool_started` always precedes its invocation's terminal event, and
//!   each invocation has exactly one terminal event (upheld by the
//!   dispatcher; the stream preserves arrival order).
//! - exactly one `completion` is emitted, only after the model is done AND
//!   every started tool has reached a terminal event.
//! - if the consumer disconnects, producers keep running to completion so
//!   cache writes still land; their sends simply go nowhere.

use std::collections::HashSet;

use async_stream::stream;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::dispatcher::{TraceEvent, TraceSink};
use crate::error::ToolError;
use crate::orchestrator::ResultSource;

/// One event on the wire, in the order the consumer must see them.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    ToolStarted {
        request_id: Uuid,
        tool: String,
        arguments: Value,
    },
    ToolFinished {
        request_id: Uuid,
        tool: String,
        source: ResultSource,
        latency_ms: u64,
        output: Value,
    },
    ToolFailed {
        request_id: Uuid,
        tool: String,
        error: ToolError,
    },
    Token {
        text: String,
    },
    Completion {
        usage: UsageStats,
    },
}

impl From<TraceEvent> for StreamEvent {
    fn from(event: TraceEvent) -> Self {
        match event {
            TraceEvent::ToolStarted {
                request_id,
                tool,
                arguments,
            } => StreamEvent::ToolStarted {
                request_id,
                tool,
                arguments,
            },
            TraceEvent::ToolFinished {
                request_id,
                tool,
                source,
                latency_ms,
                output,
            } => StreamEvent::ToolFinished {
                request_id,
                tool,
                source,
                latency_ms,
                output,
            },
            TraceEvent::ToolFailed {
                request_id,
                tool,
                error,
            } => StreamEvent::ToolFailed {
                request_id,
                tool,
                error,
            },
        }
    }
}

/// Token accounting reported with the completion event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

enum EmitterInput {
    Trace(TraceEvent),
    Token(String),
    ModelDone(UsageStats),
}

/// Producer side of the stream. Cheap to clone; one per turn, shared by the
/// dispatcher (as a trace sink) and the model loop.
#[derive(Clone)]
pub struct EmitterHandle {
    tx: mpsc::UnboundedSender<EmitterInput>,
}

impl EmitterHandle {
    /// Push one model token. Silently dropped if the consumer is gone.
    pub fn token(&self, text: impl Into<String>) {
        let _ = self.tx.send(EmitterInput::Token(text.into()));
    }

    /// Mark the model as finished. The completion event is emitted once
    /// every open tool invocation has also reached a terminal event.
    pub fn model_done(&self, usage: UsageStats) {
        let _ = self.tx.send(EmitterInput::ModelDone(usage));
    }
}

impl TraceSink for EmitterHandle {
    fn emit(&self, event: TraceEvent) {
        let _ = self.tx.send(EmitterInput::Trace(event));
    }
}

/// Consumer side of the stream.
pub struct StreamEmitter {
    rx: mpsc::UnboundedReceiver<EmitterInput>,
}

/// Create a connected producer/consumer pair for one turn.
pub fn channel() -> (EmitterHandle, StreamEmitter) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EmitterHandle { tx }, StreamEmitter { rx })
}

impl StreamEmitter {
    /// Consume the emitter into an ordered event stream.
    ///
    /// The stream ends right after the completion event, or without one if
    /// every producer handle is dropped first (a turn aborted mid-flight).
    pub fn into_stream(self) -> impl Stream<Item = StreamEvent> {
        let mut rx = self.rx;
        stream! {
            let mut open: HashSet<Uuid> = HashSet::new();
            let mut pending_usage: Option<UsageStats> = None;

            while let Some(input) = rx.recv().await {
                match input {
                    EmitterInput::Trace(event) => {
                        if event.is_terminal() {
                            open.remove(&event.request_id());
                        } else {
                            open.insert(event.request_id());
                        }
                        yield StreamEvent::from(event);
                    }
                    EmitterInput::Token(text) => yield StreamEvent::Token { text },
                    EmitterInput::ModelDone(usage) => pending_usage = Some(usage),
                }

                if open.is_empty() {
                    if let Some(usage) = pending_usage.take() {
                        yield StreamEvent::Completion { usage };
                        return;
                    }
                }
            }
        }
    }
}
