//! Real-time relay between show-control clients ("producers") and browser
//! clients ("consumers").
//!
//! Each population connects on its own WebSocket port. Every frame a producer
//! sends is forwarded verbatim to every open consumer and vice versa. A small
//! HTTP surface reports connection counts and lets plain HTTP callers inject
//! messages toward the producers.

pub mod config;
pub mod connection;
pub mod error;
pub mod fanout;
pub mod ingress;
pub mod listener;
pub mod metrics;
pub mod registry;
pub mod server;


pub use config::{FileConfig, RelayConfig, load_config};
pub use connection::{ConnectionHandle, ConnectionId, ConnectionState, Population};
pub use error::RelayError;
pub use fanout::{FanoutReport, fanout};
pub use registry::{ConnectionRegistry, Registration};
pub use server::RelayServer;

use axum::extract::ws::Utf8Bytes;
use std::sync::Arc;

use crate::metrics::RelayMetrics;

/// Shared state handed to both listeners and the HTTP ingress.
#[derive(Clone)]
pub struct RelayState {
    pub producers: Arc<ConnectionRegistry>,
    pub consumers: Arc<ConnectionRegistry>,
    pub config: Arc<RelayConfig>,
    pub metrics: Arc<RelayMetrics>,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            producers: Arc::new(ConnectionRegistry::new(Population::Producer)),
            consumers: Arc::new(ConnectionRegistry::new(Population::Consumer)),
            config: Arc::new(config),
            metrics: Arc::new(RelayMetrics::new()),
        }
    }

    pub fn registry(&self, population: Population) -> &Arc<ConnectionRegistry> {
        match population {
            Population::Producer => &self.producers,
            Population::Consumer => &self.consumers,
        }
    }

    /// Fan `payload` out to every open member of `target` and record the result.
    pub async fn broadcast(&self, target: Population, payload: &Utf8Bytes) -> FanoutReport {
        let report = fanout(self.registry(target), payload, self.config.send_timeout).await;
        self.metrics.record_fanout(&report);
        report
    }
}
