//! Relay metrics for observability
//!
//! Counters only; nothing in the relay makes decisions based on them.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::connection::Population;
use crate::fanout::FanoutReport;

/// Per-population connection and traffic counters
#[derive(Debug, Default)]
pub struct PopulationCounters {
    /// Connections accepted since start
    pub opened: AtomicU64,
    /// Connections ended since start
    pub closed: AtomicU64,
    /// Frames received from this population
    pub messages_received: AtomicU64,
    /// Transport errors on this population's sockets
    pub transport_errors: AtomicU64,
}

impl PopulationCounters {
    fn snapshot(&self) -> PopulationMetrics {
        PopulationMetrics {
            opened: self.opened.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }
}

/// Relay-wide metrics
#[derive(Debug, Default)]
pub struct RelayMetrics {
    pub producer: PopulationCounters,
    pub consumer: PopulationCounters,

    // Fan-out results
    pub payloads_delivered: AtomicU64,
    pub payloads_skipped: AtomicU64,
    pub payloads_timed_out: AtomicU64,

    /// Messages injected through `POST /log`
    pub ingress_messages: AtomicU64,

    start_time: Option<Instant>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn population(&self, population: Population) -> &PopulationCounters {
        match population {
            Population::Producer => &self.producer,
            Population::Consumer => &self.consumer,
        }
    }

    pub fn connection_opened(&self, population: Population) {
        self.population(population)
            .opened
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self, population: Population) {
        self.population(population)
            .closed
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self, population: Population) {
        self.population(population)
            .messages_received
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn transport_error(&self, population: Population) {
        self.population(population)
            .transport_errors
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn ingress_message(&self) {
        self.ingress_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fanout(&self, report: &FanoutReport) {
        self.payloads_delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.payloads_skipped
            .fetch_add(report.skipped as u64, Ordering::Relaxed);
        self.payloads_timed_out
            .fetch_add(report.timed_out as u64, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            producer: self.producer.snapshot(),
            consumer: self.consumer.snapshot(),
            fanout: FanoutMetrics {
                delivered: self.payloads_delivered.load(Ordering::Relaxed),
                skipped: self.payloads_skipped.load(Ordering::Relaxed),
                timed_out: self.payloads_timed_out.load(Ordering::Relaxed),
            },
            ingress_messages: self.ingress_messages.load(Ordering::Relaxed),
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub producer: PopulationMetrics,
    pub consumer: PopulationMetrics,
    pub fanout: FanoutMetrics,
    pub ingress_messages: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationMetrics {
    pub opened: u64,
    pub closed: u64,
    pub messages_received: u64,
    pub transport_errors: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutMetrics {
    pub delivered: u64,
    pub skipped: u64,
    pub timed_out: u64,
}
