use anyhow::{bail, Result};

// Slot markers. A tombstone is distinct from an empty slot so that probe
// chains survive deletion.
const EMPTY_KEY: i64 = -1;
const TOMB_KEY: i64 = -2;

/// Open-addressing table with linear probing, mapping a community id to an
/// integer aggregate. `hash(key) = key mod capacity`. The capacity is fixed
/// at construction and must be at least the number of distinct keys ever
/// inserted; sizing is the caller's obligation.
pub struct CommTable {
    keys: Vec<i64>,
    values: Vec<i64>,
    len: usize,
}

impl CommTable {
    pub fn with_capacity(capacity: usize) -> CommTable {
        let capacity = capacity.max(1);
        CommTable {
            keys: vec![EMPTY_KEY; capacity],
            values: vec![0; capacity],
            len: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a key that is not currently present. Probes forward from the
    /// hash slot until an empty or tombstoned slot is found.
    pub fn insert(&mut self, key: i64, value: i64) -> Result<()> {
        debug_assert!(key >= 0, "community ids are non-negative");
        let capacity = self.capacity();
        let mut slot = key as usize % capacity;
        for _ in 0..capacity {
            if self.keys[slot] == EMPTY_KEY || self.keys[slot] == TOMB_KEY {
                self.keys[slot] = key;
                self.values[slot] = value;
                self.len += 1;
                return Ok(());
            }
            slot += 1;
            if slot == capacity {
                slot = 0;
            }
        }
        bail!("community table capacity {} exhausted", capacity);
    }

    /// Probe forward until the key is found or an empty slot ends the
    /// chain. Tombstoned slots are skipped, never stopped at.
    pub fn search(&self, key: i64) -> Option<i64> {
        let capacity = self.capacity();
        let mut slot = key as usize % capacity;
        for _ in 0..capacity {
            if self.keys[slot] == EMPTY_KEY {
                return None;
            }
            if self.keys[slot] == key {
                return Some(self.values[slot]);
            }
            slot += 1;
            if slot == capacity {
                slot = 0;
            }
        }
        None
    }

    /// Mark the key's slot as a tombstone instead of emptying it, so that
    /// later keys probed past this slot stay reachable.
    pub fn delete(&mut self, key: i64) -> bool {
        let capacity = self.capacity();
        let mut slot = key as usize % capacity;
        for _ in 0..capacity {
            if self.keys[slot] == EMPTY_KEY {
                return false;
            }
            if self.keys[slot] == key {
                self.keys[slot] = TOMB_KEY;
                self.len -= 1;
                return true;
            }
            slot += 1;
            if slot == capacity {
                slot = 0;
            }
        }
        false
    }
}

/// Transient per-vertex aggregation structure: the table maps a community
/// id to a slot in the parallel `comms`/`weights` arrays, which record the
/// distinct neighbor communities in first-seen order and the total weight
/// incident to each.
pub struct LocalMap {
    table: CommTable,
    comms: Vec<i64>,
    weights: Vec<f64>,
}

impl LocalMap {
    pub fn with_capacity(capacity: usize) -> LocalMap {
        LocalMap {
            table: CommTable::with_capacity(capacity),
            comms: Vec::with_capacity(capacity),
            weights: Vec::with_capacity(capacity),
        }
    }

    /// Add `weight` to the aggregate of `comm`, creating the slot on first
    /// sight. Returns the slot index.
    pub fn accumulate(&mut self, comm: i64, weight: f64) -> Result<usize> {
        if let Some(slot) = self.table.search(comm) {
            self.weights[slot as usize] += weight;
            return Ok(slot as usize);
        }
        let slot = self.comms.len();
        self.table.insert(comm, slot as i64)?;
        self.comms.push(comm);
        self.weights.push(weight);
        Ok(slot)
    }

    #[inline]
    pub fn slot_of(&self, comm: i64) -> Option<usize> {
        self.table.search(comm).map(|slot| slot as usize)
    }

    #[inline]
    pub fn weight_at(&self, slot: usize) -> f64 {
        self.weights[slot]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.comms.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.comms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.comms.iter().copied().zip(self.weights.iter().copied())
    }
}

/// Rewrite the community array in place so that the surviving ids form the
/// contiguous range [0, cluster_count), assigned in order of first
/// appearance. Entries of -1 are left untouched. Returns the cluster count.
pub fn renumber_communities(c: &mut [i64]) -> Result<usize> {
    let mut table = CommTable::with_capacity(c.len());
    let mut next: i64 = 0;
    for entry in c.iter_mut() {
        if *entry < 0 {
            continue;
        }
        match table.search(*entry) {
            Some(new_id) => *entry = new_id,
            None => {
                table.insert(*entry, next)?;
                *entry = next;
                next += 1;
            }
        }
    }
    Ok(next as usize)
}
