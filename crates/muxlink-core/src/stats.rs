use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Session-wide counters, shared by the dispatch loop and every relay.
#[derive(Debug, Default)]
pub struct SessionStats {
    frames_in: AtomicU64,
    frames_out: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    channels_opened: AtomicU64,
    channels_released: AtomicU64,
    closes_sent: AtomicU64,
    stray_closes: AtomicU64,
    dial_failures: AtomicU64,
    dropped_payloads: AtomicU64,
}

/// Point-in-time copy of [`SessionStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_in: u64,
    pub frames_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub channels_opened: u64,
    pub channels_released: u64,
    pub closes_sent: u64,
    pub stray_closes: u64,
    pub dial_failures: u64,
    pub dropped_payloads: u64,
    pub active_channels: usize,
}

impl SessionStats {
    pub fn record_frame_in(&self, len: usize) {
        self.frames_in.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn record_frame_out(&self, len: usize) {
        self.frames_out.fetch_add(1, Ordering::Relaxed);
        self.bytes_out.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn record_opened(&self) {
        self.channels_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_released(&self) {
        self.channels_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_close_sent(&self) {
        self.frames_out.fetch_add(1, Ordering::Relaxed);
        self.closes_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stray_close(&self) {
        self.stray_closes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dial_failure(&self) {
        self.dial_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_payload(&self) {
        self.dropped_payloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, active_channels: usize) -> StatsSnapshot {
        StatsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_out: self.frames_out.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            channels_opened: self.channels_opened.load(Ordering::Relaxed),
            channels_released: self.channels_released.load(Ordering::Relaxed),
            closes_sent: self.closes_sent.load(Ordering::Relaxed),
            stray_closes: self.stray_closes.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
            dropped_payloads: self.dropped_payloads.load(Ordering::Relaxed),
            active_channels,
        }
    }
}
