//! Log readers (§6 A2). Each of the five simulator log streams is read by
//! a small [`EventSource`], decoded from newline-delimited JSON, and pushed
//! onto its matching core channel until EOF closes the channel.

use cosimtrace_core::channel::BoundedChannel;
use cosimtrace_core::event::{Event, ParserId};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::warn;

/// Produces the next event of a single log stream, or `None` at EOF.
#[async_trait::async_trait]
pub trait EventSource: Send {
    async fn next_event(&mut self) -> Option<Event>;
}

/// Reads one newline-delimited-JSON log file, one [`Event`] per line.
/// A line that fails to parse is logged and skipped rather than aborting
/// the whole stream — a single corrupt record should not erase everything
/// that came before or after it.
pub struct JsonlEventSource {
    path: Arc<str>,
    lines: Lines<BufReader<File>>,
}

impl JsonlEventSource {
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path).await?;
        Ok(Self {
            path: path.display().to_string().into(),
            lines: BufReader::new(file).lines(),
        })
    }
}

#[async_trait::async_trait]
impl EventSource for JsonlEventSource {
    async fn next_event(&mut self) -> Option<Event> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(err) => {
                    warn!(path = %self.path, error = %err, "log reader: i/o error, stopping stream");
                    return None;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(&line) {
                Ok(event) => return Some(event),
                Err(err) => {
                    warn!(path = %self.path, error = %err, "log reader: skipping malformed record");
                    continue;
                }
            }
        }
    }
}

/// Drains `source` into `sink`, closing `sink` once the source reaches EOF
/// (§5 "Cancellation / shutdown": channel closure is how end-of-simulation
/// propagates to the spanner consuming it).
pub async fn pump(mut source: impl EventSource, sink: Arc<BoundedChannel<Event>>) {
    while let Some(event) = source.next_event().await {
        if !sink.push(event).await {
            break;
        }
    }
    sink.close().await;
}

/// Merges several already-sorted [`JsonlEventSource`]s into one time-ordered
/// stream. The host and NIC roles are each split across a client-side and a
/// server-side log file; both halves describe the same causal actor, so the
/// spanner that consumes them wants one interleaved-by-timestamp stream
/// rather than two (see DESIGN.md).
pub struct MergedEventSource {
    sources: Vec<JsonlEventSource>,
    buffered: Vec<Option<Event>>,
}

impl MergedEventSource {
    pub async fn open(paths: &[std::path::PathBuf]) -> std::io::Result<Self> {
        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            sources.push(JsonlEventSource::open(path).await?);
        }
        let len = sources.len();
        Ok(Self { sources, buffered: vec![None; len] })
    }
}

#[async_trait::async_trait]
impl EventSource for MergedEventSource {
    async fn next_event(&mut self) -> Option<Event> {
        for (slot, source) in self.buffered.iter_mut().zip(self.sources.iter_mut()) {
            if slot.is_none() {
                *slot = source.next_event().await;
            }
        }
        let (idx, _) = self
            .buffered
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i, e.timestamp)))
            .min_by_key(|&(_, ts)| ts)?;
        self.buffered[idx].take()
    }
}

/// Spawns a pump reading `paths` (merged in timestamp order if there is more
/// than one) into `sink`, returning the join handle so the caller can await
/// all parsers together at shutdown.
pub fn spawn_pump(
    parser_id: ParserId,
    paths: Vec<std::path::PathBuf>,
    sink: Arc<BoundedChannel<Event>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match MergedEventSource::open(&paths).await {
            Ok(source) => pump(source, sink).await,
            Err(err) => {
                warn!(parser_id, paths = ?paths, error = %err, "failed to open log file(s); closing stream immediately");
                sink.close().await;
            }
        }
    })
}
