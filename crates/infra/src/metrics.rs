//! Process-wide auth counters.
//!
//! Created once at start-up and injected wherever something is counted; there
//! is no global registry.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct AuthMetrics {
    sessions_created: AtomicU64,
    sessions_revoked: AtomicU64,
    session_lookup_hits: AtomicU64,
    session_lookup_misses: AtomicU64,
    claims_upgrades: AtomicU64,
    cleanup_failures: AtomicU64,
}

/// Point-in-time copy for the debug endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthMetricsSnapshot {
    pub sessions_created: u64,
    pub sessions_revoked: u64,
    pub session_lookup_hits: u64,
    pub session_lookup_misses: u64,
    pub claims_upgrades: u64,
    pub cleanup_failures: u64,
}

impl AuthMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_revoked(&self) {
        self.sessions_revoked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lookup(&self, hit: bool) {
        let counter = if hit {
            &self.session_lookup_hits
        } else {
            &self.session_lookup_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn claims_upgraded(&self) {
        self.claims_upgrades.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cleanup_failed(&self) {
        self.cleanup_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AuthMetricsSnapshot {
        AuthMetricsSnapshot {
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_revoked: self.sessions_revoked.load(Ordering::Relaxed),
            session_lookup_hits: self.session_lookup_hits.load(Ordering::Relaxed),
            session_lookup_misses: self.session_lookup_misses.load(Ordering::Relaxed),
            claims_upgrades: self.claims_upgrades.load(Ordering::Relaxed),
            cleanup_failures: self.cleanup_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let m = AuthMetrics::new();
        m.session_created();
        m.session_created();
        m.lookup(true);
        m.lookup(false);
        m.lookup(false);
        m.cleanup_failed();

        let snap = m.snapshot();
        assert_eq!(snap.sessions_created, 2);
        assert_eq!(snap.session_lookup_hits, 1);
        assert_eq!(snap.session_lookup_misses, 2);
        assert_eq!(snap.cleanup_failures, 1);
        assert_eq!(snap.claims_upgrades, 0);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let v = serde_json::to_value(AuthMetrics::new().snapshot()).unwrap();
        assert!(v.get("sessionsCreated").is_some());
        assert!(v.get("cleanupFailures").is_some());
    }
}
