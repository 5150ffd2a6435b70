// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Small helper traits shared by the dumplens crates.

use range_map::{Range, RangeMap};
use std::fmt::Debug;
use tracing::warn;

/// Builds a [`RangeMap`] from an iterator of possibly-overlapping ranges.
///
/// Minidumps in the wild contain overlapping module and memory ranges, and
/// `RangeMap` refuses to hold them. Overlaps with equal values are merged;
/// an overlap with a different value keeps the first entry and drops the
/// second with a warning.
pub trait IntoRangeMapSafe<V>: IntoIterator<Item = (Option<Range<u64>>, V)> + Sized
where
    V: Clone + Debug + Eq,
{
    fn into_rangemap_safe(self) -> RangeMap<u64, V> {
        let mut input: Vec<_> = self
            .into_iter()
            .filter_map(|(range, val)| range.map(|range| (range, val)))
            .collect();
        input.sort_by_key(|&(range, _)| (range.start, range.end));

        let mut vec: Vec<(Range<u64>, V)> = Vec::with_capacity(input.len());
        for (range, val) in input {
            if let Some(&mut (ref mut last_range, ref last_val)) = vec.last_mut() {
                if range.start <= last_range.end && &val != last_val {
                    warn!(
                        "overlapping ranges {:?} and {:?} map to different values, dropping the second",
                        last_range, range
                    );
                    continue;
                }
                if range.start <= last_range.end.saturating_add(1) && &val == last_val {
                    last_range.end = std::cmp::max(last_range.end, range.end);
                    continue;
                }
            }
            vec.push((range, val));
        }

        RangeMap::try_from_iter(vec).expect("ranges are already deduplicated and non-overlapping")
    }
}

impl<T, V> IntoRangeMapSafe<V> for T
where
    T: IntoIterator<Item = (Option<Range<u64>>, V)> + Sized,
    V: Clone + Debug + Eq,
{
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_disjoint_ranges() {
        let map: RangeMap<u64, u32> = vec![
            (Some(Range::new(0x1000, 0x1fff)), 0),
            (Some(Range::new(0x3000, 0x3fff)), 1),
        ]
        .into_iter()
        .into_rangemap_safe();
        assert_eq!(map.get(0x1000), Some(&0));
        assert_eq!(map.get(0x1fff), Some(&0));
        assert_eq!(map.get(0x2000), None);
        assert_eq!(map.get(0x3abc), Some(&1));
    }

    #[test]
    fn test_overlapping_ranges_drop_the_second() {
        let map: RangeMap<u64, u32> = vec![
            (Some(Range::new(0x1000, 0x2fff)), 0),
            (Some(Range::new(0x2000, 0x3fff)), 1),
        ]
        .into_iter()
        .into_rangemap_safe();
        assert_eq!(map.get(0x2fff), Some(&0));
        assert_eq!(map.get(0x3000), None);
    }

    #[test]
    fn test_nones_are_skipped() {
        let map: RangeMap<u64, u32> = vec![(None, 0), (Some(Range::new(0x10, 0x1f)), 1)]
            .into_iter()
            .into_rangemap_safe();
        assert_eq!(map.get(0x10), Some(&1));
    }
}
