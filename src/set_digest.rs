//! A Bloom-filter-like summary of a glyph set.
//!
//! Three 32-bit masks, each tracking `glyph >> shift` modulo 32 for a
//! different shift. Querying can report false positives but never false
//! negatives, which is all the lookup fast path needs.

use read_fonts::tables::layout::CoverageTable;

const SHIFTS: [u32; 3] = [4, 0, 9];
const N: usize = SHIFTS.len();
const MASK_BITS: u32 = 32;
const MB1: u32 = MASK_BITS - 1;

#[derive(Clone, Copy, Default, Debug)]
pub struct SetDigest {
    masks: [u32; N],
}

impl SetDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn full() -> Self {
        Self {
            masks: [u32::MAX; N],
        }
    }

    pub fn clear(&mut self) {
        self.masks = [0; N];
    }

    pub fn add(&mut self, g: u32) {
        for (mask, shift) in self.masks.iter_mut().zip(SHIFTS) {
            *mask |= 1 << ((g >> shift) & MB1);
        }
    }

    pub fn add_array(&mut self, glyphs: impl IntoIterator<Item = u32>) {
        for g in glyphs {
            self.add(g);
        }
    }

    pub fn add_range(&mut self, a: u32, b: u32) {
        if self.masks.iter().all(|&m| m == u32::MAX) {
            return;
        }
        for (mask, shift) in self.masks.iter_mut().zip(SHIFTS) {
            if (b >> shift).wrapping_sub(a >> shift) >= MB1 {
                *mask = u32::MAX;
            } else {
                let ma = 1u32 << ((a >> shift) & MB1);
                let mb = 1u32 << ((b >> shift) & MB1);
                *mask |= mb.wrapping_add(mb.wrapping_sub(ma)) - u32::from(mb < ma);
            }
        }
    }

    pub fn add_coverage(&mut self, coverage: &CoverageTable) {
        match coverage {
            CoverageTable::Format1(table) => {
                for glyph in table.glyph_array() {
                    self.add(glyph.get().to_u32());
                }
            }
            CoverageTable::Format2(table) => {
                for range in table.range_records() {
                    self.add_range(
                        range.start_glyph_id().to_u32(),
                        range.end_glyph_id().to_u32(),
                    );
                }
            }
        }
    }

    pub fn from_coverage(coverage: &CoverageTable) -> Self {
        let mut digest = Self::new();
        digest.add_coverage(coverage);
        digest
    }

    pub fn union(&mut self, other: &Self) {
        for (mask, o) in self.masks.iter_mut().zip(other.masks) {
            *mask |= o;
        }
    }

    pub fn may_have(&self, g: u32) -> bool {
        self.masks
            .iter()
            .zip(SHIFTS)
            .all(|(mask, shift)| mask & (1 << ((g >> shift) & MB1)) != 0)
    }

    pub fn may_intersect(&self, other: &Self) -> bool {
        self.masks
            .iter()
            .zip(other.masks)
            .all(|(a, b)| a & b != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single() {
        let mut set = SetDigest::new();
        set.add(2);
        assert!(set.may_have(2));
    }

    #[test]
    fn multiple() {
        let mut set = SetDigest::new();
        for g in [2, 10, 255, 300, 1060] {
            set.add(g);
        }
        for g in [2, 10, 255, 300, 1060] {
            assert!(set.may_have(g));
        }
    }

    #[test]
    fn no_false_negatives_in_ranges() {
        let mut set = SetDigest::new();
        set.add_range(15, 20);
        for g in 15..=20 {
            assert!(set.may_have(g));
        }

        let mut set = SetDigest::new();
        set.add_range(5670, 5675);
        set.add_range(3456, 3460);
        set.add(8769);
        for g in (5670..=5675).chain(3456..=3460).chain([8769]) {
            assert!(set.may_have(g));
        }
    }

    #[test]
    fn wide_range_saturates() {
        let mut set = SetDigest::new();
        set.add_range(0, 100_000);
        assert!(set.may_have(4242));
    }

    #[test]
    fn intersect() {
        let mut a = SetDigest::new();
        let mut b = SetDigest::new();
        a.add(123);
        b.add(456);
        assert!(!a.may_intersect(&b));
        b.add(123);
        assert!(a.may_intersect(&b));
    }

    #[test]
    fn rejects_most_outsiders() {
        let mut set = SetDigest::new();
        set.add(77);
        let misses = (0u32..10_000).filter(|g| !set.may_have(*g)).count();
        // Statistical, not exact: the filter must actually filter.
        assert!(misses > 5_000);
    }
}
