//! Shared health state for the /health endpoint.
//! Updated by the sync engine after every cycle.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};

use crate::types::SyncMode;

/// Shared health counters. Written by the sync engine, read by the API.
#[derive(Default)]
pub struct HealthState {
    /// Unix millis of the last finished cycle (0 = none yet).
    last_cycle_at_ms: AtomicI64,
    cycles_ok: AtomicU64,
    cycles_failed: AtomicU64,
    /// 0 = live, 1 = matchday, 2 = idle.
    mode: AtomicU8,
}

impl HealthState {
    pub fn new() -> Self {
        Self { mode: AtomicU8::new(encode_mode(SyncMode::Idle)), ..Default::default() }
    }

    pub fn record_cycle(&self, ok: bool, at_ms: i64) {
        self.last_cycle_at_ms.store(at_ms, Ordering::Relaxed);
        if ok {
            self.cycles_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_mode(&self, mode: SyncMode) {
        self.mode.store(encode_mode(mode), Ordering::Relaxed);
    }

    pub fn mode(&self) -> SyncMode {
        match self.mode.load(Ordering::Relaxed) {
            0 => SyncMode::Live,
            1 => SyncMode::Matchday,
            _ => SyncMode::Idle,
        }
    }

    pub fn last_cycle_at_ms(&self) -> Option<i64> {
        match self.last_cycle_at_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }

    pub fn cycles_ok(&self) -> u64 {
        self.cycles_ok.load(Ordering::Relaxed)
    }

    pub fn cycles_failed(&self) -> u64 {
        self.cycles_failed.load(Ordering::Relaxed)
    }
}

fn encode_mode(mode: SyncMode) -> u8 {
    match mode {
        SyncMode::Live => 0,
        SyncMode::Matchday => 1,
        SyncMode::Idle => 2,
    }
}
