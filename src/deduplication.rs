// 🔍 Deduplication Index - first-seen-wins set of natural keys
//
// Lives for one extraction pass. The extractor owns the only instance and
// feeds it in row order, so "first seen" always means "earliest row".

use crate::entities::Taxonomy;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

// ============================================================================
// KEYS
// ============================================================================

/// Composite key: which table the natural identifier belongs to, plus the identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    /// Registry entry code
    Entry(u64),

    /// Classification code within one taxonomy
    Code(Taxonomy, String),

    /// Organization SIRET
    Siret(String),
}

impl DedupKey {
    pub fn code(taxonomy: Taxonomy, code: &str) -> Self {
        DedupKey::Code(taxonomy, code.to_string())
    }

    pub fn siret(siret: &str) -> Self {
        DedupKey::Siret(siret.to_string())
    }
}

// ============================================================================
// INDEX
// ============================================================================

#[derive(Debug, Default)]
pub struct DedupIndex {
    /// key → sequence number of the row that first produced it
    seen: HashMap<DedupKey, u64>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key` as produced by row `sequence`.
    /// Returns true when the key is new, i.e. the caller should emit the entity.
    pub fn insert(&mut self, key: DedupKey, sequence: u64) -> bool {
        match self.seen.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(sequence);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Union with an index built over another row range.
    /// Keys present in both keep the earlier row, whichever index finished first.
    pub fn merge(&mut self, other: DedupIndex) {
        for (key, sequence) in other.seen {
            self.seen
                .entry(key)
                .and_modify(|first| *first = (*first).min(sequence))
                .or_insert(sequence);
        }
    }

    #[cfg(test)]
    pub fn contains(&self, key: &DedupKey) -> bool {
        self.seen.contains_key(key)
    }

    /// Row that first produced `key`
    pub fn first_seen(&self, key: &DedupKey) -> Option<u64> {
        self.seen.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_insert_wins() {
        let mut index = DedupIndex::new();

        assert!(index.insert(DedupKey::code(Taxonomy::Nsf, "310"), 0));
        assert!(!index.insert(DedupKey::code(Taxonomy::Nsf, "310"), 4));

        assert_eq!(index.first_seen(&DedupKey::code(Taxonomy::Nsf, "310")), Some(0));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_taxonomies_are_independent() {
        let mut index = DedupIndex::new();

        assert!(index.insert(DedupKey::code(Taxonomy::Nsf, "310"), 0));
        assert!(index.insert(DedupKey::code(Taxonomy::Formacode, "310"), 0));
        assert!(index.insert(DedupKey::Entry(310), 0));
        assert!(index.insert(DedupKey::siret("310"), 0));

        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_merge_keeps_earliest_row() {
        // shard covering rows 10.. finishes first
        let mut late = DedupIndex::new();
        late.insert(DedupKey::code(Taxonomy::Rome, "M1805"), 12);
        late.insert(DedupKey::siret("12345678901234"), 10);

        let mut early = DedupIndex::new();
        early.insert(DedupKey::code(Taxonomy::Rome, "M1805"), 3);

        late.merge(early);

        assert_eq!(late.first_seen(&DedupKey::code(Taxonomy::Rome, "M1805")), Some(3));
        assert_eq!(late.first_seen(&DedupKey::siret("12345678901234")), Some(10));
        assert_eq!(late.len(), 2);
    }

    #[test]
    fn test_contains() {
        let mut index = DedupIndex::new();
        assert!(index.is_empty());

        index.insert(DedupKey::siret("12345678901234"), 2);
        assert!(index.contains(&DedupKey::siret("12345678901234")));
        assert!(!index.contains(&DedupKey::siret("00000000000000")));
    }
}
