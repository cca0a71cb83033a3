use axum::extract::ws::Utf8Bytes;
use futures::future::join_all;
use std::time::Duration;

use crate::connection::SendOutcome;
use crate::registry::ConnectionRegistry;

/// Tally of one fan-out. Informational only; nothing branches on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    /// Not open for write at send time (closing, closed, or writer gone).
    pub skipped: usize,
    pub timed_out: usize,
}

impl FanoutReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.skipped + self.timed_out
    }
}

/// Deliver `payload` once to every member of `target` that is open right now.
///
/// Sends run concurrently, each bounded by `send_timeout`, so a stalled peer
/// costs at most one timeout and never delays the others.
pub async fn fanout(
    target: &ConnectionRegistry,
    payload: &Utf8Bytes,
    send_timeout: Duration,
) -> FanoutReport {
    let members = target.snapshot();
    if members.is_empty() {
        return FanoutReport::default();
    }

    let outcomes = join_all(
        members
            .iter()
            .map(|conn| conn.send(payload.clone(), send_timeout)),
    )
    .await;

    outcomes
        .into_iter()
        .fold(FanoutReport::default(), |mut report, outcome| {
            match outcome {
                SendOutcome::Delivered => report.delivered += 1,
                SendOutcome::NotReady | SendOutcome::Closed => report.skipped += 1,
                SendOutcome::TimedOut => report.timed_out += 1,
            }
            report
        })
}
