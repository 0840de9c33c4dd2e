//! Path router
//!
//! Single dispatch point for inbound transport events. Each wire path is
//! parsed into a [`Path`] and handed to the one handler registered for it.
//! Events are dispatched strictly in the order the transport delivered them;
//! the router never reorders or reprioritizes.

use crate::protocol::Path;
use crate::transport::{DataEventKind, DataItem, EventStream, MessageEvent, TransportEvent};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("malformed event on {path}: {reason}")]
    Malformed { path: String, reason: String },
    #[error("change event on {0} carried no snapshot")]
    MissingSnapshot(String),
    #[error("handler for {0} panicked")]
    Panicked(String),
}

impl RouteError {
    pub fn malformed(path: Path, reason: impl ToString) -> Self {
        RouteError::Malformed {
            path: path.as_str().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Receives events for the paths it is registered on.
///
/// Implementations must return quickly: anything slow is moved off the
/// listener onto a worker.
pub trait PathHandler: Send + Sync {
    fn on_data_changed(&self, path: Path, item: &DataItem) -> Result<(), RouteError> {
        let _ = item;
        debug!("{} ignores data changes", path);
        Ok(())
    }

    fn on_data_deleted(&self, path: Path) -> Result<(), RouteError> {
        debug!("{} deleted", path);
        Ok(())
    }

    fn on_message(&self, path: Path, message: &MessageEvent) -> Result<(), RouteError> {
        let _ = message;
        debug!("{} ignores messages", path);
        Ok(())
    }
}

/// Where dispatch failures are reported.
pub trait RouteErrorSink: Send + Sync {
    fn report(&self, failure: &RouteFailure);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteFailure {
    pub path: String,
    pub error: RouteError,
}

/// Result of dispatching one transport event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub handled: usize,
    pub unrouted: usize,
    pub failures: Vec<RouteFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub handled: u64,
    pub unrouted: u64,
    pub failed: u64,
}

pub struct PathRouter {
    name: String,
    handlers: RwLock<HashMap<Path, Arc<dyn PathHandler>>>,
    stats: Mutex<RouterStats>,
}

enum Delivery<'a> {
    Changed(&'a DataItem),
    Deleted,
    Message(&'a MessageEvent),
}

impl PathRouter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: RwLock::new(HashMap::new()),
            stats: Mutex::new(RouterStats::default()),
        }
    }

    /// Register `handler` for `path`, returning any handler it replaces.
    pub fn register(
        &self,
        path: impl Into<Path>,
        handler: Arc<dyn PathHandler>,
    ) -> Option<Arc<dyn PathHandler>> {
        let path = path.into();
        debug!("[{}] handler registered for {}", self.name, path);
        self.handlers.write().insert(path, handler)
    }

    pub fn is_registered(&self, path: Path) -> bool {
        self.handlers.read().contains_key(&path)
    }

    pub fn stats(&self) -> RouterStats {
        self.stats.lock().clone()
    }

    /// Dispatch one transport event (a data batch is walked in order).
    pub fn dispatch(&self, event: &TransportEvent) -> DispatchReport {
        let mut report = DispatchReport::default();
        match event {
            TransportEvent::DataChanged(batch) => {
                for data_event in batch {
                    let delivery = match (data_event.kind, data_event.item.as_ref()) {
                        (DataEventKind::Changed, Some(item)) => Delivery::Changed(item),
                        (DataEventKind::Changed, None) => {
                            report.failures.push(RouteFailure {
                                path: data_event.path.clone(),
                                error: RouteError::MissingSnapshot(data_event.path.clone()),
                            });
                            continue;
                        }
                        (DataEventKind::Deleted, _) => Delivery::Deleted,
                    };
                    self.route(&data_event.path, delivery, &mut report);
                }
            }
            TransportEvent::Message(message) => {
                self.route(&message.path, Delivery::Message(message), &mut report);
            }
        }

        let mut stats = self.stats.lock();
        stats.handled += report.handled as u64;
        stats.unrouted += report.unrouted as u64;
        stats.failed += report.failures.len() as u64;
        report
    }

    fn route(&self, raw: &str, delivery: Delivery<'_>, report: &mut DispatchReport) {
        let handler = Path::parse(raw).and_then(|path| {
            self.handlers
                .read()
                .get(&path)
                .cloned()
                .map(|handler| (path, handler))
        });

        let Some((path, handler)) = handler else {
            debug!("[{}] no handler for {}", self.name, raw);
            report.unrouted += 1;
            return;
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| match delivery {
            Delivery::Changed(item) => handler.on_data_changed(path, item),
            Delivery::Deleted => handler.on_data_deleted(path),
            Delivery::Message(message) => handler.on_message(path, message),
        }))
        .unwrap_or_else(|_| Err(RouteError::Panicked(raw.to_string())));

        match outcome {
            Ok(()) => report.handled += 1,
            Err(error) => report.failures.push(RouteFailure {
                path: raw.to_string(),
                error,
            }),
        }
    }

    /// Listener loop: consume the event stream until the transport closes it.
    /// Failures are logged, reported to `sink`, and never stop the loop.
    pub async fn run(self: Arc<Self>, mut events: EventStream, sink: Option<Arc<dyn RouteErrorSink>>) {
        info!("[{}] listener started", self.name);
        while let Some(event) = events.recv().await {
            debug!("[{}] {}", self.name, event);
            let report = self.dispatch(&event);
            for failure in &report.failures {
                warn!("[{}] {}", self.name, failure.error);
                if let Some(sink) = &sink {
                    sink.report(failure);
                }
            }
        }
        info!("[{}] listener stopped", self.name);
    }
}
