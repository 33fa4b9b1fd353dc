//! HTTP Range header parsing (spec §4.6, §6.3).
//!
//! Unlike a strict HTTP server, an invalid or unsatisfiable range here is
//! not an error: it falls back to serving the full file, matching the
//! spec's range contract for the streaming layer (the outer HTTP handler
//! is still free to reject with 416 using extra context it has that this
//! parser doesn't).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    /// `-1` means open-ended (read to the end of the file).
    pub end: i64,
}

impl ByteRange {
    pub fn end_inclusive(&self, total_size: u64) -> u64 {
        if self.end < 0 {
            total_size.saturating_sub(1)
        } else {
            (self.end as u64).min(total_size.saturating_sub(1))
        }
    }

    pub fn content_length(&self, total_size: u64) -> u64 {
        self.end_inclusive(total_size) + 1 - self.start
    }
}

/// Parses a `Range: bytes=...` header value. Supports `bytes=S-E`,
/// `bytes=S-`, and `bytes=-N` (last N bytes). Any other shape, or one
/// that's out of bounds for `total_size` (`S>=total_size`, `E<S`, `N<=0`,
/// non-numeric), yields `None` — treat as "serve the whole file".
pub fn parse_range_header(header_value: &str, total_size: u64) -> Option<ByteRange> {
    let spec = header_value.trim().strip_prefix("bytes=")?;
    let spec = spec.split(',').next()?.trim();
    let (start_str, end_str) = spec.split_once('-')?;

    if start_str.is_empty() {
        let suffix_length: u64 = end_str.parse().ok()?;
        if suffix_length == 0 || suffix_length > total_size {
            return if suffix_length == 0 {
                None
            } else {
                Some(ByteRange { start: 0, end: -1 })
            };
        }
        return Some(ByteRange {
            start: total_size - suffix_length,
            end: -1,
        });
    }

    let start: u64 = start_str.parse().ok()?;
    if start >= total_size {
        return None;
    }

    if end_str.is_empty() {
        return Some(ByteRange { start, end: -1 });
    }

    let end: u64 = end_str.parse().ok()?;
    if end < start {
        return None;
    }

    Some(ByteRange {
        start,
        end: end as i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explicit_range() {
        let range = parse_range_header("bytes=0-1023", 2048).unwrap();
        assert_eq!(range.start, 0);
        assert_eq!(range.end, 1023);
    }

    #[test]
    fn parses_open_ended_range() {
        let range = parse_range_header("bytes=1024-", 2048).unwrap();
        assert_eq!(range.start, 1024);
        assert_eq!(range.end, -1);
        assert_eq!(range.end_inclusive(2048), 2047);
    }

    #[test]
    fn parses_suffix_range() {
        let range = parse_range_header("bytes=-500", 2048).unwrap();
        assert_eq!(range.start, 1548);
        assert_eq!(range.end, -1);
    }

    #[test]
    fn rejects_out_of_bounds_as_full_range() {
        assert!(parse_range_header("bytes=5000-", 2048).is_none());
        assert!(parse_range_header("bytes=100-50", 2048).is_none());
        assert!(parse_range_header("bytes=-0", 2048).is_none());
        assert!(parse_range_header("bytes=abc-", 2048).is_none());
        assert!(parse_range_header("lines=0-10", 2048).is_none());
    }

    #[test]
    fn content_length_is_inclusive() {
        let range = ByteRange { start: 100, end: 199 };
        assert_eq!(range.content_length(1000), 100);
    }
}
