//! Tick scheduling across encounters.
//!
//! One cooperative loop drives everything; there is no per-encounter timer.
//! Foreground encounters (observed, or with the controller participating)
//! are processed every base tick. Background encounters sit in a single
//! ordered-by-due-tick heap and are processed in batches: when one comes
//! due, the combat pass receives a cycle count equal to the base ticks that
//! elapsed since it was last processed. Background intervals are randomized
//! per encounter so dozens of encounters do not all come due on the same
//! tick.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use rand::Rng;

use crate::core::constants::{
    BACKGROUND_MAX_INTERVAL_SECONDS, BACKGROUND_MIN_INTERVAL_SECONDS, BASE_TICK_MS,
};
use crate::encounter::types::EncounterKey;

#[derive(Debug, Clone)]
struct BackgroundState {
    interval_ticks: u64,
    last_processed: u64,
}

/// An encounter due for processing this tick, with the number of base
/// ticks its combat pass should cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueEntry {
    pub key: EncounterKey,
    pub cycles: u64,
}

pub struct TickScheduler {
    foreground: HashSet<EncounterKey>,
    background: HashMap<EncounterKey, BackgroundState>,
    /// Min-heap of (due_tick, key). Entries for deregistered or
    /// re-scheduled keys are skipped at pop time instead of being removed,
    /// which keeps cancellation O(log n).
    due: BinaryHeap<Reverse<(u64, EncounterKey)>>,
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TickScheduler {
    pub fn new() -> Self {
        Self {
            foreground: HashSet::new(),
            background: HashMap::new(),
            due: BinaryHeap::new(),
        }
    }

    /// Registers a new encounter with a randomized background interval.
    pub fn register<R: Rng>(&mut self, key: EncounterKey, tick: u64, rng: &mut R) {
        let interval_seconds =
            rng.gen_range(BACKGROUND_MIN_INTERVAL_SECONDS..=BACKGROUND_MAX_INTERVAL_SECONDS);
        let interval_ticks = (interval_seconds / (BASE_TICK_MS as f64 / 1000.0)).round() as u64;
        let interval_ticks = interval_ticks.max(1);
        self.due.push(Reverse((tick + interval_ticks, key.clone())));
        self.background.insert(
            key,
            BackgroundState {
                interval_ticks,
                last_processed: tick,
            },
        );
    }

    /// Removes an encounter from both sets. Stale heap entries are left
    /// behind and discarded at pop time.
    pub fn deregister(&mut self, key: &EncounterKey) {
        self.foreground.remove(key);
        self.background.remove(key);
    }

    pub fn is_registered(&self, key: &EncounterKey) -> bool {
        self.background.contains_key(key) || self.foreground.contains(key)
    }

    /// Moves an encounter between the foreground and background sets.
    pub fn set_foreground(&mut self, key: &EncounterKey, foreground: bool) {
        if !self.background.contains_key(key) {
            return;
        }
        if foreground {
            self.foreground.insert(key.clone());
        } else {
            self.foreground.remove(key);
        }
    }

    pub fn is_foreground(&self, key: &EncounterKey) -> bool {
        self.foreground.contains(key)
    }

    /// All encounters to process this tick.
    ///
    /// Foreground entries always appear with `cycles == 1`. Background
    /// entries appear only when due, with `cycles` covering the gap since
    /// they were last processed; their next due time is pushed here.
    pub fn due_encounters(&mut self, tick: u64) -> Vec<DueEntry> {
        let mut entries: Vec<DueEntry> = Vec::new();

        let mut fg: Vec<&EncounterKey> = self.foreground.iter().collect();
        fg.sort();
        for key in fg {
            if self.background.contains_key(key) {
                entries.push(DueEntry {
                    key: key.clone(),
                    cycles: 1,
                });
            }
        }
        // Foreground processing counts as processing; keep the background
        // cursor current so a later demotion doesn't replay the gap.
        for entry in &entries {
            if let Some(state) = self.background.get_mut(&entry.key) {
                state.last_processed = tick;
            }
        }

        // Key reuse can leave more than one heap entry per key; only the
        // first popped entry this tick counts.
        let mut popped: HashSet<EncounterKey> = HashSet::new();
        while let Some(Reverse((due_tick, _))) = self.due.peek() {
            if *due_tick > tick {
                break;
            }
            let Reverse((_, key)) = self.due.pop().expect("peeked entry exists");

            let Some(state) = self.background.get_mut(&key) else {
                // Deregistered; drop the stale entry.
                continue;
            };
            if !popped.insert(key.clone()) {
                continue;
            }
            // Always reschedule, whether or not we process now.
            self.due
                .push(Reverse((tick + state.interval_ticks, key.clone())));

            if self.foreground.contains(&key) {
                continue;
            }
            let cycles = tick.saturating_sub(state.last_processed).max(1);
            state.last_processed = tick;
            entries.push(DueEntry { key, cycles });
        }

        entries
    }

    /// Drops everything. Part of deterministic shutdown.
    pub fn clear(&mut self) {
        self.foreground.clear();
        self.background.clear();
        self.due.clear();
    }
}
