//! # Consistent Hash Ring
//!
//! Maps hashed keys to nodes through a virtual-node ring. Each node gets
//! `ring_size / node_count` virtual points (at least one), placed by
//! hashing `"{node_id}:{i}"`; hash values live in `[0, 10^9)`. Lookup
//! finds the first ring key at or after the target, wrapping to the
//! smallest key, which keeps remapping minimal when membership changes
//! slightly.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Upper bound (exclusive) of the ring's hash space.
pub const HASH_SPACE: u64 = 1_000_000_000;

/// A rebuildable virtual-node ring over a set of node ids.
#[derive(Debug, Clone)]
pub struct ConsistentHashRing {
    ring: BTreeMap<u64, String>,
    members: Vec<String>,
    ring_size: usize,
}

impl ConsistentHashRing {
    /// Create an empty ring that will distribute `ring_size` virtual
    /// points across its members.
    pub fn new(ring_size: usize) -> Self {
        Self {
            ring: BTreeMap::new(),
            members: Vec::new(),
            ring_size: ring_size.max(1),
        }
    }

    /// Hash an arbitrary key into the ring's hash space.
    ///
    /// First 8 bytes of SHA-256, reduced modulo [`HASH_SPACE`].
    pub fn hash_key(input: &str) -> u64 {
        let digest = Sha256::digest(input.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[0..8]);
        u64::from_be_bytes(bytes) % HASH_SPACE
    }

    /// Rebuild the ring from the given node set.
    ///
    /// Existing virtual points are discarded; points for node ids that
    /// stay in the set hash to the same positions, so keys only remap
    /// around membership changes.
    pub fn rebuild(&mut self, node_ids: &[String]) {
        self.ring.clear();
        self.members = node_ids.to_vec();
        self.members.sort();
        self.members.dedup();

        if self.members.is_empty() {
            return;
        }

        let points_per_node = (self.ring_size / self.members.len()).max(1);
        for id in &self.members {
            for i in 0..points_per_node {
                let hash = Self::hash_key(&format!("{id}:{i}"));
                self.ring.insert(hash, id.clone());
            }
        }
    }

    /// Resolve a hash key to the owning node id.
    ///
    /// The caller filters the result against its live candidate list and
    /// falls back to the first available node when the mapped node is gone.
    pub fn lookup(&self, key: u64) -> Option<&str> {
        self.ring
            .range(key..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, id)| id.as_str())
    }

    /// Node ids the ring was last built from, sorted and deduplicated.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Number of virtual points currently on the ring.
    pub fn len(&self) -> usize {
        self.ring.len()
    }
}
