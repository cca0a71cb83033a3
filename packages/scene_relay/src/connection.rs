//! Per-connection handle shared between a socket task and the registry.

use axum::extract::ws::Utf8Bytes;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Which side of the relay a connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Population {
    /// Show-control system (TouchDesigner) clients.
    Producer,
    /// Browser clients.
    Consumer,
}

impl Population {
    /// Key used for this population in `GET /clients` and in logs.
    pub fn label(self) -> &'static str {
        match self {
            Population::Producer => "td",
            Population::Consumer => "browser",
        }
    }

    /// The population this one forwards its traffic to.
    pub fn peer(self) -> Population {
        match self {
            Population::Producer => Population::Consumer,
            Population::Consumer => Population::Producer,
        }
    }
}

impl fmt::Display for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        let s = self.0.simple().to_string();
        f.write_str(&s[..8])
    }
}

/// Transport lifecycle. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Result of one attempted send during a fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// Transport was not open for writing when the send was attempted.
    NotReady,
    /// Outbound queue stayed full for the whole send timeout.
    TimedOut,
    /// Writer went away while we were waiting.
    Closed,
}

/// Cloneable handle to one live socket.
///
/// The socket itself is owned by its connection task; the handle only reaches
/// it through a bounded queue drained by that task's writer half.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    population: Population,
    state: Arc<AtomicU8>,
    outbound: mpsc::Sender<Utf8Bytes>,
}

impl ConnectionHandle {
    /// Create a handle in the `Connecting` state plus the receiving end of its
    /// outbound queue.
    pub fn new(population: Population, buffer: usize) -> (Self, mpsc::Receiver<Utf8Bytes>) {
        let (outbound, rx) = mpsc::channel(buffer.max(1));
        let handle = Self {
            id: ConnectionId::new(),
            population,
            state: Arc::new(AtomicU8::new(ConnectionState::Connecting as u8)),
            outbound,
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn population(&self) -> Population {
        self.population
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Advance the lifecycle. Transitions only move forward, so a late
    /// `Open` can never resurrect a closing connection.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let next = next as u8;
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if next <= current {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Open for write: state is `Open` and the writer half is still draining.
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Open && !self.outbound.is_closed()
    }

    /// Queue `payload` for this connection, waiting at most `timeout` for room.
    pub async fn send(&self, payload: Utf8Bytes, timeout: Duration) -> SendOutcome {
        if !self.is_ready() {
            return SendOutcome::NotReady;
        }
        match tokio::time::timeout(timeout, self.outbound.send(payload)).await {
            Ok(Ok(())) => SendOutcome::Delivered,
            Ok(Err(_)) => SendOutcome::Closed,
            Err(_) => SendOutcome::TimedOut,
        }
    }
}
