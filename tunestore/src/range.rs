//! Single byte-range resolution (`Range: bytes=start-end`)
//!
//! Only one range expression is supported. A range whose end is left open is
//! capped to `chunk_size` bytes so a single response never streams a whole
//! large file.

use crate::error::RangeError;

/// Inclusive byte range resolved against a resource size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered by the range
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` value for a partial response
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

/// `Content-Range` value sent with a 416 response
pub fn unsatisfiable_content_range(size: u64) -> String {
    format!("bytes */{}", size)
}

/// Resolves a `Range` header value against a resource of `size` bytes.
///
/// - `bytes=a-b`: `b == size` is read as "up to the end" and clamped to
///   `size - 1`; `a >= size`, `b > size` or `a > b` are unsatisfiable.
/// - `bytes=a-`: at most `chunk_size` bytes starting at `a`.
/// - `bytes=-n`: the last `n` bytes.
pub fn parse_range(header: &str, size: u64, chunk_size: u64) -> Result<ByteRange, RangeError> {
    let malformed = || RangeError::Malformed(header.to_string());

    let spec = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(malformed)?
        .trim();

    if spec.contains(',') {
        return Err(malformed());
    }

    let (start_str, end_str) = spec.split_once('-').ok_or_else(malformed)?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    let parse = |s: &str| s.parse::<u64>().map_err(|_| malformed());

    if start_str.is_empty() {
        // suffix form
        let suffix = parse(end_str)?;
        if suffix == 0 || size == 0 {
            return Err(RangeError::Unsatisfiable { size });
        }
        let start = size.saturating_sub(suffix);
        return Ok(ByteRange { start, end: size - 1 });
    }

    let start = parse(start_str)?;
    if start >= size {
        return Err(RangeError::Unsatisfiable { size });
    }

    let end = if end_str.is_empty() {
        let chunk = chunk_size.max(1);
        start.saturating_add(chunk - 1).min(size - 1)
    } else {
        let end = parse(end_str)?;
        if end > size || start > end {
            return Err(RangeError::Unsatisfiable { size });
        }
        end.min(size - 1)
    };

    Ok(ByteRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn explicit_range() {
        let r = parse_range("bytes=10-19", 100, MIB).unwrap();
        assert_eq!(r, ByteRange { start: 10, end: 19 });
        assert_eq!(r.len(), 10);
        assert_eq!(r.content_range(100), "bytes 10-19/100");
    }

    #[test]
    fn end_equal_to_size_covers_whole_file() {
        let r = parse_range("bytes=0-100", 100, MIB).unwrap();
        assert_eq!(r, ByteRange { start: 0, end: 99 });
        assert_eq!(r.content_range(100), "bytes 0-99/100");
    }

    #[test]
    fn open_end_is_capped_to_chunk() {
        let r = parse_range("bytes=0-", 10 * MIB, MIB).unwrap();
        assert_eq!(r, ByteRange { start: 0, end: MIB - 1 });

        let r = parse_range("bytes=95-", 100, MIB).unwrap();
        assert_eq!(r, ByteRange { start: 95, end: 99 });
    }

    #[test]
    fn suffix_range() {
        let r = parse_range("bytes=-10", 100, MIB).unwrap();
        assert_eq!(r, ByteRange { start: 90, end: 99 });

        let r = parse_range("bytes=-500", 100, MIB).unwrap();
        assert_eq!(r, ByteRange { start: 0, end: 99 });
    }

    #[test]
    fn unsatisfiable_ranges() {
        let unsat = Err(RangeError::Unsatisfiable { size: 100 });
        assert_eq!(parse_range("bytes=100-", 100, MIB), unsat);
        assert_eq!(parse_range("bytes=150-160", 100, MIB), unsat);
        assert_eq!(parse_range("bytes=0-101", 100, MIB), unsat);
        assert_eq!(parse_range("bytes=20-10", 100, MIB), unsat);
        assert_eq!(
            parse_range("bytes=0-", 0, MIB),
            Err(RangeError::Unsatisfiable { size: 0 })
        );
        assert_eq!(unsatisfiable_content_range(100), "bytes */100");
    }

    #[test]
    fn malformed_ranges() {
        for header in ["", "items=0-1", "bytes=abc-", "bytes=0-1,5-6", "bytes=5", "bytes=-"] {
            assert!(
                matches!(parse_range(header, 100, MIB), Err(RangeError::Malformed(_))),
                "{header:?} should be malformed"
            );
        }
    }
}
