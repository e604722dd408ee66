use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Returns the local wall clock in epoch milliseconds
pub type TimeSource = fn() -> i64;

pub fn system_time_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Local clock corrected by the measured offset to the exchange clock
///
/// Clones share the same offset, so a time sync on one client handle is seen
/// by every in-flight signed request built from any other handle.
#[derive(Debug, Clone)]
pub struct ServerClock {
    offset_ms: Arc<AtomicI64>,
    now: TimeSource,
}

impl Default for ServerClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerClock {
    pub fn new() -> Self {
        Self::with_time_source(system_time_millis)
    }

    /// Use a custom time source, mainly for deterministic tests
    pub fn with_time_source(now: TimeSource) -> Self {
        Self {
            offset_ms: Arc::new(AtomicI64::new(0)),
            now,
        }
    }

    pub fn local_millis(&self) -> i64 {
        (self.now)()
    }

    /// Local minus server time, in milliseconds
    pub fn offset(&self) -> i64 {
        self.offset_ms.load(Ordering::SeqCst)
    }

    pub fn set_offset(&self, offset_ms: i64) {
        self.offset_ms.store(offset_ms, Ordering::SeqCst);
    }

    /// Record the offset against a freshly fetched server time and return it
    pub fn sync_with_server_time(&self, server_time_ms: i64) -> i64 {
        let offset = self.local_millis() - server_time_ms;
        self.set_offset(offset);
        offset
    }

    /// Timestamp to put on a signed request
    pub fn timestamp(&self) -> i64 {
        self.local_millis() - self.offset()
    }
}
