//! Pending paint requests awaiting a server result
//!
//! The engine only talks to the [`PendingLedger`] trait. [`LinearLedger`]
//! scans every entry on each sweep, which is fine for the handful of cells a
//! single player has in flight. [`DeadlineLedger`] keeps entries in a
//! min-heap by issue time so a sweep only touches what has expired.

use shared::{CellKey, Position};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

/// One speculative paint attempt. At most one exists per cell key.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPaint {
    pub key: CellKey,
    pub color_number: u8,
    pub position: Position,
    pub issued_at: Instant,
    pub retries: u32,
}

impl PendingPaint {
    pub fn new(key: CellKey, color_number: u8, position: Position, issued_at: Instant) -> Self {
        Self {
            key,
            color_number,
            position,
            issued_at,
            retries: 0,
        }
    }

    fn expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.issued_at) >= timeout
    }
}

pub trait PendingLedger {
    /// Adds a request. Returns false, leaving the ledger unchanged, if the
    /// cell already has one.
    fn insert(&mut self, request: PendingPaint) -> bool;

    fn remove(&mut self, key: CellKey) -> Option<PendingPaint>;

    fn contains(&self, key: CellKey) -> bool;

    /// Removes and returns every request at least `timeout` old, oldest first.
    fn take_expired(&mut self, now: Instant, timeout: Duration) -> Vec<PendingPaint>;

    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct LinearLedger {
    entries: HashMap<CellKey, PendingPaint>,
}

impl LinearLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PendingLedger for LinearLedger {
    fn insert(&mut self, request: PendingPaint) -> bool {
        if self.entries.contains_key(&request.key) {
            return false;
        }
        self.entries.insert(request.key, request);
        true
    }

    fn remove(&mut self, key: CellKey) -> Option<PendingPaint> {
        self.entries.remove(&key)
    }

    fn contains(&self, key: CellKey) -> bool {
        self.entries.contains_key(&key)
    }

    fn take_expired(&mut self, now: Instant, timeout: Duration) -> Vec<PendingPaint> {
        let mut keys: Vec<(Instant, CellKey)> = self
            .entries
            .values()
            .filter(|p| p.expired(now, timeout))
            .map(|p| (p.issued_at, p.key))
            .collect();
        keys.sort();

        keys.into_iter()
            .filter_map(|(_, key)| self.entries.remove(&key))
            .collect()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Heap-backed ledger. Removals are lazy: the heap may hold stale slots,
/// recognised by a generation number that no longer matches the live entry.
#[derive(Debug, Default)]
pub struct DeadlineLedger {
    entries: HashMap<CellKey, (u64, PendingPaint)>,
    heap: BinaryHeap<Reverse<(Instant, u64, CellKey)>>,
    next_generation: u64,
}

impl DeadlineLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(&self, generation: u64, key: CellKey) -> bool {
        matches!(self.entries.get(&key), Some((g, _)) if *g == generation)
    }

    /// Rebuilds the heap once stale slots dominate it.
    fn compact(&mut self) {
        if self.heap.len() <= 2 * self.entries.len() + 16 {
            return;
        }
        self.heap = self
            .entries
            .iter()
            .map(|(key, (generation, p))| Reverse((p.issued_at, *generation, *key)))
            .collect();
    }
}

impl PendingLedger for DeadlineLedger {
    fn insert(&mut self, request: PendingPaint) -> bool {
        if self.entries.contains_key(&request.key) {
            return false;
        }
        let generation = self.next_generation;
        self.next_generation += 1;

        self.heap
            .push(Reverse((request.issued_at, generation, request.key)));
        self.entries.insert(request.key, (generation, request));
        true
    }

    fn remove(&mut self, key: CellKey) -> Option<PendingPaint> {
        let removed = self.entries.remove(&key).map(|(_, p)| p);
        self.compact();
        removed
    }

    fn contains(&self, key: CellKey) -> bool {
        self.entries.contains_key(&key)
    }

    fn take_expired(&mut self, now: Instant, timeout: Duration) -> Vec<PendingPaint> {
        let mut expired = Vec::new();

        while let Some(Reverse((issued_at, generation, key))) = self.heap.peek().copied() {
            if !self.is_live(generation, key) {
                self.heap.pop();
                continue;
            }
            if now.saturating_duration_since(issued_at) < timeout {
                break;
            }
            self.heap.pop();
            if let Some((_, request)) = self.entries.remove(&key) {
                expired.push(request);
            }
        }
        expired
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.heap.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
