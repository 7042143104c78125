//! Relay of handler stdout/stderr to a log sink.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

/// Which child stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        })
    }
}

/// One line written by a handler.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct LogLine {
    pub function_name: String,
    pub stream: Stream,
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

/// Destination for handler output.
pub trait LogSink: Send + Sync {
    fn record(&self, line: LogLine);
}

/// Emits handler output as `tracing` events on target `mimic::handler`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, line: LogLine) {
        tracing::info!(
            target: "mimic::handler",
            function = %line.function_name,
            stream = %line.stream,
            timestamp = %line.timestamp.to_rfc3339(),
            "{}",
            line.text
        );
    }
}

/// Forward every line of `reader` to `sink` until the stream closes.
pub(crate) fn relay<R>(reader: R, stream: Stream, function_name: String, sink: Arc<dyn LogSink>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(text)) => sink.record(LogLine {
                    function_name: function_name.clone(),
                    stream,
                    timestamp: Utc::now(),
                    text,
                }),
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(%stream, function = %function_name, error = %e, "handler output relay stopped");
                    break;
                }
            }
        }
    })
}
