//! Hash-chained broadcast log
//!
//! Every applied request and resolved hit becomes one entry. Entries carry a
//! monotonic sequence number and a SHA3 digest over their contents and the
//! previous entry's digest, so observers can verify what they replay and a
//! late joiner can catch up with [`BroadcastLog::since`].

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::protocol::CombatBroadcast;

/// A single authoritative outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEntry {
    /// Monotonic sequence number
    pub seq: u64,
    /// Authority tick when the outcome was applied
    pub tick: u64,
    pub payload: CombatBroadcast,
    /// Digest of the entry before this one (0 for the first)
    pub prev_digest: u64,
    pub digest: u64,
}

impl BroadcastEntry {
    pub fn new(seq: u64, tick: u64, payload: CombatBroadcast, prev_digest: u64) -> Self {
        let mut entry = Self {
            seq,
            tick,
            payload,
            prev_digest,
            digest: 0,
        };
        entry.digest = entry.compute_digest();
        entry
    }

    fn compute_digest(&self) -> u64 {
        let mut hasher = Sha3_256::new();
        hasher.update(self.seq.to_le_bytes());
        hasher.update(self.tick.to_le_bytes());
        hasher.update(self.prev_digest.to_le_bytes());
        hasher.update(bincode::serialize(&self.payload).unwrap_or_default());
        let result = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&result[..8]);
        u64::from_le_bytes(head)
    }

    /// Verify integrity of this entry on its own
    pub fn verify(&self) -> bool {
        self.digest == self.compute_digest()
    }
}

/// Ordered log of everything the authority broadcast.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BroadcastLog {
    entries: Vec<BroadcastEntry>,
    next_seq: u64,
    head_digest: u64,
}

impl BroadcastLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an outcome and return the stored entry.
    pub fn record(&mut self, tick: u64, payload: CombatBroadcast) -> &BroadcastEntry {
        let entry = BroadcastEntry::new(self.next_seq, tick, payload, self.head_digest);
        self.next_seq += 1;
        self.head_digest = entry.digest;
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    /// Entries with `seq >= from_seq` (incremental catch-up)
    pub fn since(&self, from_seq: u64) -> &[BroadcastEntry] {
        match self.entries.iter().position(|e| e.seq >= from_seq) {
            Some(start) => &self.entries[start..],
            None => &[],
        }
    }

    pub fn entries(&self) -> &[BroadcastEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Verify every digest and every link of the retained chain.
    pub fn verify_all(&self) -> bool {
        self.entries.windows(2).all(|pair| {
            pair[1].seq == pair[0].seq + 1 && pair[1].prev_digest == pair[0].digest
        }) && self.entries.iter().all(BroadcastEntry::verify)
    }

    /// Keep only the newest `max_entries`. The chain stays verifiable from
    /// the first retained entry.
    pub fn compact(&mut self, max_entries: usize) {
        if self.entries.len() > max_entries {
            let excess = self.entries.len() - max_entries;
            self.entries.drain(..excess);
        }
    }
}
