//! Server Metrics: request/resolution counters with Prometheus + JSON export
//!
//! Uses lock-free atomics for all counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::authority::RejectReason;

/// Shared metrics state (all lock-free atomics)
#[derive(Debug)]
pub struct ServerMetrics {
    /// Requests that reached the authority
    pub requests_received: AtomicU64,
    /// Requests validated and applied
    pub requests_accepted: AtomicU64,
    /// Silent rejections, indexed by [`RejectReason::index`]
    pub rejections: [AtomicU64; RejectReason::COUNT],
    /// Hits resolved through the pipeline
    pub hits_resolved: AtomicU64,
    /// Broadcast entries appended to the log
    pub broadcasts: AtomicU64,
    /// Record change notifications emitted
    pub record_changes: AtomicU64,
    /// Frames the transport could not decode
    pub decode_errors: AtomicU64,
    /// Authority ticks processed
    pub ticks: AtomicU64,
    /// Server start time (for uptime calculation)
    pub start_time: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self {
            requests_received: AtomicU64::new(0),
            requests_accepted: AtomicU64::new(0),
            rejections: std::array::from_fn(|_| AtomicU64::new(0)),
            hits_resolved: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            record_changes: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }
}

impl ServerMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.requests_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self, reason: RejectReason) {
        self.rejections[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.hits_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_change(&self) {
        self.record_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected(&self, reason: RejectReason) -> u64 {
        self.rejections[reason.index()].load(Ordering::Relaxed)
    }

    pub fn total_rejected(&self) -> u64 {
        self.rejections
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .sum()
    }

    pub fn uptime_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    pub fn requests_per_second(&self) -> f64 {
        let total = self.requests_received.load(Ordering::Relaxed) as f64;
        let uptime = self.uptime_secs();
        if uptime > 0.0 { total / uptime } else { 0.0 }
    }

    // ========================================================================
    // Prometheus text exposition format
    // ========================================================================

    pub fn render_prometheus(&self) -> String {
        let received = self.requests_received.load(Ordering::Relaxed);
        let accepted = self.requests_accepted.load(Ordering::Relaxed);
        let hits = self.hits_resolved.load(Ordering::Relaxed);
        let broadcasts = self.broadcasts.load(Ordering::Relaxed);
        let record_changes = self.record_changes.load(Ordering::Relaxed);
        let decode_errors = self.decode_errors.load(Ordering::Relaxed);
        let ticks = self.ticks.load(Ordering::Relaxed);
        let uptime = self.uptime_secs();

        let mut body = format!(
            "# HELP duel_requests_received_total Combat requests received\n\
             # TYPE duel_requests_received_total counter\n\
             duel_requests_received_total {received}\n\
             \n\
             # HELP duel_requests_accepted_total Combat requests validated and applied\n\
             # TYPE duel_requests_accepted_total counter\n\
             duel_requests_accepted_total {accepted}\n\
             \n\
             # HELP duel_requests_rejected_total Combat requests dropped, by reason\n\
             # TYPE duel_requests_rejected_total counter\n"
        );
        for reason in RejectReason::ALL {
            body.push_str(&format!(
                "duel_requests_rejected_total{{reason=\"{}\"}} {}\n",
                reason.as_str(),
                self.rejected(reason)
            ));
        }
        body.push_str(&format!(
            "\n\
             # HELP duel_hits_resolved_total Hits resolved by the authority\n\
             # TYPE duel_hits_resolved_total counter\n\
             duel_hits_resolved_total {hits}\n\
             \n\
             # HELP duel_broadcasts_total Broadcast log entries\n\
             # TYPE duel_broadcasts_total counter\n\
             duel_broadcasts_total {broadcasts}\n\
             \n\
             # HELP duel_record_changes_total Record change notifications\n\
             # TYPE duel_record_changes_total counter\n\
             duel_record_changes_total {record_changes}\n\
             \n\
             # HELP duel_decode_errors_total Undecodable transport frames\n\
             # TYPE duel_decode_errors_total counter\n\
             duel_decode_errors_total {decode_errors}\n\
             \n\
             # HELP duel_tick_total Authority ticks processed\n\
             # TYPE duel_tick_total counter\n\
             duel_tick_total {ticks}\n\
             \n\
             # HELP duel_uptime_seconds Server uptime\n\
             # TYPE duel_uptime_seconds gauge\n\
             duel_uptime_seconds {uptime:.2}\n"
        ));
        body
    }

    pub fn to_json(&self) -> JsonMetrics {
        JsonMetrics {
            uptime_secs: self.uptime_secs(),
            ticks: self.ticks.load(Ordering::Relaxed),
            requests_received: self.requests_received.load(Ordering::Relaxed),
            requests_accepted: self.requests_accepted.load(Ordering::Relaxed),
            requests_rejected: self.total_rejected(),
            hits_resolved: self.hits_resolved.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            rps: self.requests_per_second(),
        }
    }

    pub fn render_json(&self) -> String {
        serde_json::to_string(&self.to_json()).unwrap_or_default()
    }
}

/// JSON form for tooling and stress clients
#[derive(Debug, Serialize)]
pub struct JsonMetrics {
    pub uptime_secs: f64,
    pub ticks: u64,
    pub requests_received: u64,
    pub requests_accepted: u64,
    pub requests_rejected: u64,
    pub hits_resolved: u64,
    pub broadcasts: u64,
    pub rps: f64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_metrics_defaults() {
        let m = ServerMetrics::default();
        assert_eq!(m.requests_received.load(Ordering::Relaxed), 0);
        assert_eq!(m.total_rejected(), 0);
    }

    #[test]
    fn test_rejections_by_reason() {
        let m = ServerMetrics::default();
        m.record_rejection(RejectReason::Stale);
        m.record_rejection(RejectReason::Stale);
        m.record_rejection(RejectReason::Cooldown);

        assert_eq!(m.rejected(RejectReason::Stale), 2);
        assert_eq!(m.rejected(RejectReason::Cooldown), 1);
        assert_eq!(m.rejected(RejectReason::Forbidden), 0);
        assert_eq!(m.total_rejected(), 3);
    }

    #[test]
    fn test_prometheus_render() {
        let m = ServerMetrics::default();
        m.record_received();
        m.record_accepted();
        m.record_rejection(RejectReason::Stamina);

        let text = m.render_prometheus();
        assert!(text.contains("duel_requests_received_total 1"));
        assert!(text.contains("duel_requests_rejected_total{reason=\"stamina\"} 1"));
        assert!(text.contains("duel_requests_rejected_total{reason=\"stale\"} 0"));
    }

    #[test]
    fn test_json_snapshot() {
        let m = ServerMetrics::default();
        m.record_hit();
        let json: serde_json::Value = serde_json::from_str(&m.render_json()).unwrap();
        assert_eq!(json["hits_resolved"], 1);
        assert!(m.requests_per_second().is_finite());
    }
}
