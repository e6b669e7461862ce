use std::path::PathBuf;

use anyhow::Result;
use source::{EventSource, StdinEventSource};
use tokio::{select, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    storage::state_store::{JsonStateStore, StateStore},
    tracker::controller::{RemainderPolicy, TrackingController},
    utils::clock::{Clock, DefaultClock},
};

pub mod args;
pub mod shutdown;
pub mod source;

/// Represents the starting point for the bridge process. Runs until the
/// browser closes the event pipe or the process receives ctrl-c.
pub async fn start_bridge(app_dir: PathBuf, remainder: RemainderPolicy) -> Result<()> {
    let store = JsonStateStore::new(app_dir)?;
    let controller = TrackingController::new(store, Box::new(DefaultClock), remainder).await?;

    let shutdown_token = CancellationToken::new();
    let bridge = BridgeModule::new(
        StdinEventSource::new(),
        controller,
        shutdown_token.clone(),
        Box::new(DefaultClock),
    );

    let (_, run_result) = tokio::join!(shutdown::detect_shutdown(shutdown_token.clone()), async {
        let result = bridge.run().await;
        shutdown_token.cancel();
        result
    });

    if let Err(e) = &run_result {
        error!("Bridge loop got an error {e:?}");
    }
    run_result
}

/// Event loop gluing an [EventSource] to the [TrackingController]. Lifecycle
/// events and the periodic flush timer are serialized through one `select!`,
/// so controller state is never touched by two executions at once.
pub struct BridgeModule<E, S> {
    source: E,
    controller: TrackingController<S>,
    shutdown: CancellationToken,
    clock: Box<dyn Clock>,
}

impl<E: EventSource, S: StateStore> BridgeModule<E, S> {
    pub fn new(
        source: E,
        controller: TrackingController<S>,
        shutdown: CancellationToken,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            source,
            controller,
            shutdown,
            clock,
        }
    }

    /// Executes the bridge event loop. Every exit path closes the current
    /// session so trailing whole minutes are not lost.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let deadline = self.controller.flush_deadline();
            select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Shutdown requested, closing the session");
                    return self.controller.stop_tracking().await;
                }
                event = self.source.next_event() => match event {
                    Ok(Some(event)) => {
                        if let Err(e) = self.controller.handle_event(event).await {
                            error!("Error applying event {e:?}");
                        }
                    }
                    Ok(None) => {
                        info!("Event source closed, shutting down");
                        return self.controller.stop_tracking().await;
                    }
                    Err(e) => {
                        error!("Error reading from the event source {e:?}");
                        return self.controller.stop_tracking().await;
                    }
                },
                _ = flush_timer(self.clock.as_ref(), deadline) => {
                    if let Err(e) = self.controller.tick().await {
                        error!("Flush cycle failed, will retry next tick {e:?}");
                    }
                }
            }
        }
    }
}

/// Sleeps until the periodic flush is due; pends forever while no session is
/// active.
async fn flush_timer(clock: &dyn Clock, deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => clock.sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
