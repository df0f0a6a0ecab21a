//! Server metrics for observability
//!
//! Counters are owned by the [`Server`](crate::Server) instance and bumped with
//! relaxed atomics from every session task.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use sysinfo::{ProcessesToUpdate, System};

#[derive(Debug)]
pub struct ServerMetrics {
    // Connection metrics
    /// Connections accepted since start
    pub total_connections: AtomicU64,

    // Message metrics
    pub messages_received: AtomicU64,
    pub messages_sent: AtomicU64,
    /// Failed the validator
    pub messages_rejected: AtomicU64,
    /// Not queued because the recipient was congested or gone
    pub messages_dropped: AtomicU64,

    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,

    // Error metrics
    pub handler_errors: AtomicU64,
    /// Framing / compression / UTF-8 failures caused by the peer
    pub protocol_errors: AtomicU64,

    start_time: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_rejected: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            handler_errors: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn message_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn message_rejected(&self) {
        self.messages_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// `active` comes from the registry, which the metrics do not own.
    pub fn snapshot(&self, active: usize) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.uptime_secs(),
            memory_usage: current_process_memory_bytes(),
            connections: ConnectionStats {
                active: active as u64,
                total: self.total_connections.load(Ordering::Relaxed),
            },
            messages: MessageStats {
                received: self.messages_received.load(Ordering::Relaxed),
                sent: self.messages_sent.load(Ordering::Relaxed),
                rejected: self.messages_rejected.load(Ordering::Relaxed),
                dropped: self.messages_dropped.load(Ordering::Relaxed),
            },
            bytes: ByteStats {
                received: self.bytes_received.load(Ordering::Relaxed),
                sent: self.bytes_sent.load(Ordering::Relaxed),
            },
            errors: ErrorStats {
                handler: self.handler_errors.load(Ordering::Relaxed),
                protocol: self.protocol_errors.load(Ordering::Relaxed),
            },
        }
    }
}

/// Resident memory of this process in bytes, 0 if unavailable.
fn current_process_memory_bytes() -> u64 {
    let mut system = System::new();
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };
    let _ = system.refresh_processes(ProcessesToUpdate::Some(&[pid]), false);
    system.process(pid).map_or(0, sysinfo::Process::memory)
}

/// Serializable snapshot of server statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Seconds since the server was created.
    #[serde(rename = "uptime")]
    pub uptime_secs: u64,
    /// Resident set size in bytes.
    pub memory_usage: u64,
    pub connections: ConnectionStats,
    pub messages: MessageStats,
    pub bytes: ByteStats,
    pub errors: ErrorStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageStats {
    pub received: u64,
    pub sent: u64,
    pub rejected: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ByteStats {
    pub received: u64,
    pub sent: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorStats {
    pub handler: u64,
    pub protocol: u64,
}
