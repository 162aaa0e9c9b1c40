//! Snapshot event loop.
//!
//! Watches the store, lists a fresh [`Snapshot`] whenever something changes and
//! hands it to a [`Syncer`]. Passes never overlap: the next snapshot is only
//! listed after the previous `sync` returned. Bursts of change notifications
//! collapse into one pass.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tracing::{Instrument, Span, debug, info, warn};

use crate::error::{Error, Result};
use crate::store::{AttachmentClient, ChangeStream};
use crate::types::Snapshot;

/// Receives every snapshot the event loop produces.
#[async_trait]
pub trait Syncer: Send + Sync {
    /// Error returned by a failed pass.
    type Error: fmt::Display + Send;

    /// Reconcile one snapshot.
    async fn sync(&self, snapshot: &Snapshot) -> std::result::Result<(), Self::Error>;
}

/// Configuration for the event loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Run a pass at this interval even when nothing changed.
    pub resync_interval: Option<Duration>,
    /// Capacity of the error channel. Errors beyond it are logged and dropped.
    pub error_buffer: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            resync_interval: None,
            error_buffer: 64,
        }
    }
}

/// Handle for stopping a running loop.
#[derive(Debug, Clone)]
pub struct LoopStopper {
    tx: watch::Sender<bool>,
}

impl LoopStopper {
    /// Ask the loop to stop after the current pass.
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }
}

/// A running event loop.
pub struct RunningLoop {
    /// Delivery, listing and sync errors. None of them stop the loop.
    pub errors: mpsc::Receiver<Error>,
    /// Stops the loop.
    pub stopper: LoopStopper,
    /// Completes when the loop exits.
    pub handle: JoinHandle<()>,
}

/// Event loop driving a [`Syncer`] from store changes.
pub struct EventLoop<S: Syncer> {
    client: Arc<dyn AttachmentClient>,
    syncer: Arc<S>,
    config: LoopConfig,
    span: Span,
}

impl<S: Syncer + 'static> EventLoop<S> {
    /// Create a new event loop.
    pub fn new(client: Arc<dyn AttachmentClient>, syncer: Arc<S>, config: LoopConfig) -> Self {
        Self {
            client,
            syncer,
            config,
            span: tracing::info_span!("event_loop"),
        }
    }

    /// Log under the given span instead of the default one.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Start watching `namespaces`.
    ///
    /// Fails only if the watch cannot be established. After that, every error
    /// goes to [`RunningLoop::errors`] and the loop keeps running.
    pub async fn run(self, namespaces: Vec<String>) -> Result<RunningLoop> {
        let changes = self.client.watch(&namespaces).await?;
        let (error_tx, errors) = mpsc::channel(self.config.error_buffer.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);

        info!(parent: &self.span, namespaces = ?namespaces, "Watching namespaces");

        let span = self.span.clone();
        let worker = Worker {
            client: self.client,
            syncer: self.syncer,
            namespaces,
            errors: error_tx,
            resync: self.config.resync_interval.map(|period| {
                let start = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
                tokio::time::interval_at(start, period)
            }),
        };
        let handle = tokio::spawn(worker.run(changes, stop_rx).instrument(span));

        Ok(RunningLoop {
            errors,
            stopper: LoopStopper { tx: stop_tx },
            handle,
        })
    }
}

struct Worker<S: Syncer> {
    client: Arc<dyn AttachmentClient>,
    syncer: Arc<S>,
    namespaces: Vec<String>,
    errors: mpsc::Sender<Error>,
    resync: Option<Interval>,
}

/// Why the loop woke up.
enum Wake {
    Changed,
    Resync,
    DeliveryError(Error),
    Closed,
    Stopped,
}

impl<S: Syncer> Worker<S> {
    async fn run(mut self, mut changes: ChangeStream, mut stop: watch::Receiver<bool>) {
        self.pass().await;

        loop {
            match self.wait(&mut changes, &mut stop).await {
                Wake::Changed => {
                    if self.drain(&mut changes) {
                        self.pass().await;
                        break;
                    }
                    self.pass().await;
                }
                Wake::Resync => {
                    debug!("Periodic resync");
                    self.pass().await;
                }
                Wake::DeliveryError(e) => self.report(e),
                Wake::Closed => {
                    info!("Watch stream ended");
                    break;
                }
                Wake::Stopped => {
                    info!("Event loop stopped");
                    break;
                }
            }
        }
    }

    async fn wait(&mut self, changes: &mut ChangeStream, stop: &mut watch::Receiver<bool>) -> Wake {
        let resync = async {
            match self.resync.as_mut() {
                Some(interval) => {
                    interval.tick().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = stop.changed() => Wake::Stopped,
            item = changes.next() => match item {
                Some(Ok(())) => Wake::Changed,
                Some(Err(e)) => Wake::DeliveryError(e),
                None => Wake::Closed,
            },
            () = resync => Wake::Resync,
        }
    }

    /// Swallow notifications that are already queued so a burst costs one pass.
    /// Returns true if the stream ended while draining.
    fn drain(&self, changes: &mut ChangeStream) -> bool {
        while let Some(item) = changes.next().now_or_never() {
            match item {
                Some(Ok(())) => {}
                Some(Err(e)) => self.report(e),
                None => return true,
            }
        }
        false
    }

    async fn pass(&self) {
        let snapshot = match self.client.snapshot(&self.namespaces).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.report(e);
                return;
            }
        };

        debug!(attachments = snapshot.len(), "Running sync");
        if let Err(e) = self.syncer.sync(&snapshot).await {
            self.report(Error::sync_failed(e.to_string()));
        }
    }

    fn report(&self, error: Error) {
        warn!(error = %error, "Event loop error");
        if let Err(mpsc::error::TrySendError::Full(dropped)) = self.errors.try_send(error) {
            warn!(error = %dropped, "Error channel full, dropping error");
        }
    }
}
