//! Lightweight global metrics for the page cache.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Frame parser (принято/отброшено)
//! - Reassembly (чанки, байты, аборты, завершённые страницы)
//! - Window controller (префетчи, таймауты, вытеснения)
//! - UI reads (hit/miss)

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// ----- Frame parser -----
static FRAMES_PARSED: AtomicU64 = AtomicU64::new(0);
static FRAMES_DROPPED: AtomicU64 = AtomicU64::new(0);

// ----- Reassembly -----
static CHUNKS_APPLIED: AtomicU64 = AtomicU64::new(0);
static CHUNK_BYTES: AtomicU64 = AtomicU64::new(0);
static REASSEMBLY_ABORTS: AtomicU64 = AtomicU64::new(0);
static PAGES_COMPLETED: AtomicU64 = AtomicU64::new(0);

// ----- Window controller -----
static PREFETCH_REQUESTS: AtomicU64 = AtomicU64::new(0);
static PREFETCH_TIMEOUTS: AtomicU64 = AtomicU64::new(0);
static PAGES_EVICTED: AtomicU64 = AtomicU64::new(0);

// ----- UI reads -----
static READ_HITS: AtomicU64 = AtomicU64::new(0);
static READ_MISSES: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    // Frame parser
    pub frames_parsed: u64,
    pub frames_dropped: u64,

    // Reassembly
    pub chunks_applied: u64,
    pub chunk_bytes: u64,
    pub reassembly_aborts: u64,
    pub pages_completed: u64,

    // Window controller
    pub prefetch_requests: u64,
    pub prefetch_timeouts: u64,
    pub pages_evicted: u64,

    // UI reads
    pub read_hits: u64,
    pub read_misses: u64,
}

impl MetricsSnapshot {
    pub fn read_hit_ratio(&self) -> f64 {
        let total = self.read_hits + self.read_misses;
        if total == 0 {
            0.0
        } else {
            self.read_hits as f64 / total as f64
        }
    }

    pub fn avg_chunk_bytes(&self) -> f64 {
        if self.chunks_applied == 0 {
            0.0
        } else {
            self.chunk_bytes as f64 / self.chunks_applied as f64
        }
    }
}

// ----- Recorders (Frame parser) -----
pub fn record_frame_parsed() {
    FRAMES_PARSED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_frame_dropped() {
    FRAMES_DROPPED.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Reassembly) -----
pub fn record_chunk_applied(payload_len: usize) {
    CHUNKS_APPLIED.fetch_add(1, Ordering::Relaxed);
    CHUNK_BYTES.fetch_add(payload_len as u64, Ordering::Relaxed);
}
pub fn record_reassembly_abort() {
    REASSEMBLY_ABORTS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_page_completed() {
    PAGES_COMPLETED.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Window controller) -----
pub fn record_prefetch_request() {
    PREFETCH_REQUESTS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_prefetch_timeout() {
    PREFETCH_TIMEOUTS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_pages_evicted(count: u64) {
    PAGES_EVICTED.fetch_add(count, Ordering::Relaxed);
}

// ----- Recorders (UI reads) -----
pub fn record_read_hit() {
    READ_HITS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_read_miss() {
    READ_MISSES.fetch_add(1, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        frames_parsed: FRAMES_PARSED.load(Ordering::Relaxed),
        frames_dropped: FRAMES_DROPPED.load(Ordering::Relaxed),

        chunks_applied: CHUNKS_APPLIED.load(Ordering::Relaxed),
        chunk_bytes: CHUNK_BYTES.load(Ordering::Relaxed),
        reassembly_aborts: REASSEMBLY_ABORTS.load(Ordering::Relaxed),
        pages_completed: PAGES_COMPLETED.load(Ordering::Relaxed),

        prefetch_requests: PREFETCH_REQUESTS.load(Ordering::Relaxed),
        prefetch_timeouts: PREFETCH_TIMEOUTS.load(Ordering::Relaxed),
        pages_evicted: PAGES_EVICTED.load(Ordering::Relaxed),

        read_hits: READ_HITS.load(Ordering::Relaxed),
        read_misses: READ_MISSES.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    FRAMES_PARSED.store(0, Ordering::Relaxed);
    FRAMES_DROPPED.store(0, Ordering::Relaxed);

    CHUNKS_APPLIED.store(0, Ordering::Relaxed);
    CHUNK_BYTES.store(0, Ordering::Relaxed);
    REASSEMBLY_ABORTS.store(0, Ordering::Relaxed);
    PAGES_COMPLETED.store(0, Ordering::Relaxed);

    PREFETCH_REQUESTS.store(0, Ordering::Relaxed);
    PREFETCH_TIMEOUTS.store(0, Ordering::Relaxed);
    PAGES_EVICTED.store(0, Ordering::Relaxed);

    READ_HITS.store(0, Ordering::Relaxed);
    READ_MISSES.store(0, Ordering::Relaxed);
}
