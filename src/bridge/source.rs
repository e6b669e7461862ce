use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::warn;

use crate::tracker::events::BrowserEvent;

/// Contract for whatever feeds browser signals into the tracker. Production
/// reads the extension shim's stdin stream; tests substitute scripted sources.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSource: Send {
    /// Resolves with the next event, or `None` once the source is exhausted
    /// (for stdin that means the browser closed the pipe).
    async fn next_event(&mut self) -> Result<Option<BrowserEvent>>;
}

/// Reads newline-delimited json events from stdin, the channel a browser
/// keeps open for the lifetime of the extension.
pub struct StdinEventSource {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinEventSource {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinEventSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for StdinEventSource {
    async fn next_event(&mut self) -> Result<Option<BrowserEvent>> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };
            if let Some(event) = decode_line(&line) {
                return Ok(Some(event));
            }
        }
    }
}

/// Decodes one wire line. Unparsable lines are dropped with a warning instead
/// of tearing the bridge down.
fn decode_line(line: &str) -> Option<BrowserEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<BrowserEvent>(line) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Ignoring malformed event line {line:?}: {e}");
            None
        }
    }
}
