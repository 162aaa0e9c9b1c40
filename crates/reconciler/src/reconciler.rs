//! Reconciler configuration and assembly.

use std::sync::Arc;

use kubedbg_api::AttachmentClient;
use tracing::{Span, info};

use crate::capability::{DebuggerSession, ProcessLocator};
use crate::controller::DebugController;
use crate::dispatcher::StateDispatcher;
use crate::error::{Error, Result};
use crate::pool::TaskPool;
use crate::report::{FailureReporter, LogFailureReporter};
use crate::syncer::ReconciliationSyncer;

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Maximum attach/remove tasks running at once.
    pub max_concurrent: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { max_concurrent: 16 }
    }
}

/// Builder wiring a store, platform capabilities and a task pool into a
/// [`ReconciliationSyncer`].
pub struct ReconcilerBuilder {
    store: Option<Arc<dyn AttachmentClient>>,
    locator: Option<Arc<dyn ProcessLocator>>,
    debugger: Option<Arc<dyn DebuggerSession>>,
    reporter: Option<Arc<dyn FailureReporter>>,
    config: ReconcilerConfig,
    span: Span,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            store: None,
            locator: None,
            debugger: None,
            reporter: None,
            config: ReconcilerConfig::default(),
            span: Span::none(),
        }
    }

    /// Set the resource store.
    pub fn with_store(mut self, store: Arc<dyn AttachmentClient>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the process locator.
    pub fn with_locator(mut self, locator: Arc<dyn ProcessLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Set the debugger launcher.
    pub fn with_debugger(mut self, debugger: Arc<dyn DebuggerSession>) -> Self {
        self.debugger = Some(debugger);
        self
    }

    /// Set where task failures go. Defaults to [`LogFailureReporter`].
    pub fn with_reporter(mut self, reporter: Arc<dyn FailureReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set max concurrent tasks.
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.config.max_concurrent = max;
        self
    }

    /// Set the span tasks and passes log under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Build the syncer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the store, locator or debugger is
    /// missing, or if `max_concurrent` is zero.
    pub fn build(self) -> Result<ReconciliationSyncer> {
        let store = self
            .store
            .ok_or_else(|| Error::invalid_config("Attachment store is required"))?;
        let locator = self
            .locator
            .ok_or_else(|| Error::invalid_config("Process locator is required"))?;
        let debugger = self
            .debugger
            .ok_or_else(|| Error::invalid_config("Debugger launcher is required"))?;
        if self.config.max_concurrent == 0 {
            return Err(Error::invalid_config("max_concurrent must be at least 1"));
        }
        let reporter = self
            .reporter
            .unwrap_or_else(|| Arc::new(LogFailureReporter));

        let span = &self.span;
        let max_concurrent = self.config.max_concurrent;
        info!(
            parent: span,
            max_concurrent = max_concurrent,
            "Reconciler ready"
        );

        let controller = Arc::new(DebugController::new(store, locator, debugger, reporter));
        let pool = TaskPool::new(self.config.max_concurrent, self.span.clone());
        Ok(ReconciliationSyncer::new(
            StateDispatcher::new(controller, pool),
            self.span,
        ))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
