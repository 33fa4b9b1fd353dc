//! Byte-offset-to-segment mapping (spec §4.5).
//!
//! NZB segment `bytes` attributes are wire-size (yEnc-encoded) estimates
//! that don't match decoded lengths. The interpolator starts from those
//! estimates and refines individual slots to actual decoded sizes as
//! segments are fetched, keeping later range requests exact without
//! requiring every segment to be fetched up front.

use crate::nzb::types::NzbSegment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLocation {
    pub segment_index: usize,
    pub offset_in_segment: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentRange {
    pub start_index: usize,
    pub end_index: usize,
    pub start_offset: u64,
    /// Exclusive upper bound within `end_index` (`end_offset + 1`).
    pub end_limit: u64,
}

pub struct SegmentInterpolator {
    declared_bytes: Vec<u64>,
    decoded_sizes: Vec<Option<u64>>,
    /// `cumulative[i]` is the start offset of segment `i` in the logical
    /// (decoded) byte stream, given current knowledge.
    cumulative: Vec<u64>,
}

impl SegmentInterpolator {
    pub fn new(segments: &[NzbSegment]) -> Self {
        let declared_bytes: Vec<u64> = segments.iter().map(|s| s.bytes).collect();
        let decoded_sizes = vec![None; declared_bytes.len()];
        let mut interpolator = Self {
            declared_bytes,
            decoded_sizes,
            cumulative: Vec::new(),
        };
        interpolator.recompute();
        interpolator
    }

    fn segment_size(&self, index: usize) -> u64 {
        self.decoded_sizes[index].unwrap_or(self.declared_bytes[index])
    }

    fn recompute(&mut self) {
        let mut running = 0u64;
        let mut cumulative = Vec::with_capacity(self.declared_bytes.len());
        for i in 0..self.declared_bytes.len() {
            cumulative.push(running);
            running += self.segment_size(i);
        }
        self.cumulative = cumulative;
    }

    pub fn total_size(&self) -> u64 {
        match (self.cumulative.last(), self.declared_bytes.len()) {
            (Some(&start), len) if len > 0 => start + self.segment_size(len - 1),
            _ => 0,
        }
    }

    /// Records the actual decoded size of segment `index`, once known, and
    /// recomputes all downstream cumulative offsets. Monotonic: once a
    /// slot is authoritative it is never reverted to an estimate.
    pub fn update_decoded_size(&mut self, index: usize, actual: u64) {
        if index >= self.decoded_sizes.len() {
            return;
        }
        self.decoded_sizes[index] = Some(actual);
        self.recompute();
    }

    /// `b` in `[0, total_size)` using decoded-size overrides where present,
    /// wire-size estimates elsewhere; `None` outside that range.
    pub fn find_segment_for_offset(&self, b: i64) -> Option<SegmentLocation> {
        if b < 0 {
            return None;
        }
        let b = b as u64;
        if b >= self.total_size() {
            return None;
        }
        let (segment_index, offset_in_segment) = self.locate_bound(b);
        Some(SegmentLocation {
            segment_index,
            offset_in_segment,
        })
    }

    /// `byteRange` is `[start, end]` inclusive; `end_limit` is the exclusive
    /// upper bound within `end_index` (`end`'s offset-in-segment plus one),
    /// computed by locating the bound at `end + 1` — which, when `end` is
    /// the final byte of the file, lands exactly one past the last
    /// segment's last byte (`offset_in_segment == segment_size(last)`).
    pub fn get_segment_range(&self, start: u64, end: u64) -> Option<SegmentRange> {
        if start > end || self.declared_bytes.is_empty() {
            return None;
        }
        let start_loc = self.find_segment_for_offset(start as i64)?;
        let (end_index, end_limit) = self.locate_bound(end + 1);
        Some(SegmentRange {
            start_index: start_loc.segment_index,
            end_index,
            start_offset: start_loc.offset_in_segment,
            end_limit,
        })
    }

    /// Locates `b` within `[0, total_size]` inclusive. `b == total_size`
    /// resolves to the last segment with an offset equal to its full size,
    /// used as the exclusive bound passed by `get_segment_range`.
    fn locate_bound(&self, b: u64) -> (usize, u64) {
        let total = self.total_size();
        if b >= total {
            let last = self.declared_bytes.len() - 1;
            return (last, self.segment_size(last));
        }
        let idx = match self.cumulative.binary_search(&b) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        (idx, b - self.cumulative[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments() -> Vec<NzbSegment> {
        vec![
            NzbSegment::new("a@x".into(), 1, 100),
            NzbSegment::new("b@x".into(), 2, 100),
            NzbSegment::new("c@x".into(), 3, 50),
        ]
    }

    #[test]
    fn finds_segment_for_offset_using_estimates() {
        let interpolator = SegmentInterpolator::new(&segments());
        assert_eq!(interpolator.total_size(), 250);

        let loc = interpolator.find_segment_for_offset(150).unwrap();
        assert_eq!(loc.segment_index, 1);
        assert_eq!(loc.offset_in_segment, 50);

        assert!(interpolator.find_segment_for_offset(-1).is_none());
        assert!(interpolator.find_segment_for_offset(250).is_none());
    }

    #[test]
    fn update_decoded_size_shifts_downstream_offsets() {
        let mut interpolator = SegmentInterpolator::new(&segments());
        interpolator.update_decoded_size(0, 120);
        assert_eq!(interpolator.total_size(), 270);

        let loc = interpolator.find_segment_for_offset(120).unwrap();
        assert_eq!(loc.segment_index, 1);
        assert_eq!(loc.offset_in_segment, 0);
    }

    #[test]
    fn segment_range_covers_inclusive_byte_range() {
        let interpolator = SegmentInterpolator::new(&segments());
        let range = interpolator.get_segment_range(90, 199).unwrap();
        assert_eq!(range.start_index, 0);
        assert_eq!(range.start_offset, 90);
        assert_eq!(range.end_index, 1);
        assert_eq!(range.end_limit, 100);
    }

    #[test]
    fn segment_range_to_end_of_file_hits_exclusive_bound() {
        let interpolator = SegmentInterpolator::new(&segments());
        let range = interpolator.get_segment_range(0, 249).unwrap();
        assert_eq!(range.end_index, 2);
        assert_eq!(range.end_limit, 50);
    }
}
