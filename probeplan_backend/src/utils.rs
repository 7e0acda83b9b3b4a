//! Small helpers shared by the planning and streaming layers.

use regex::Regex;

/// Tracks progress through a long buffer written to hardware in bounded
/// chunks. Yields `(start, end)` index pairs until the buffer is exhausted.
///
/// # Examples
/// ```
/// # use probeplan_backend::utils::ChunkCursor;
/// let mut cursor = ChunkCursor::new(10, 4);
/// assert_eq!(cursor.next(), Some((0, 4)));
/// assert_eq!(cursor.next(), Some((4, 8)));
/// assert_eq!(cursor.next(), Some((8, 10)));
/// assert_eq!(cursor.next(), None);
/// ```
pub struct ChunkCursor {
    pos: usize,
    end: usize,
    chunk: usize,
}

impl ChunkCursor {
    pub fn new(total: usize, chunk: usize) -> Self {
        assert!(chunk > 0, "chunk size must be positive");
        Self {
            pos: 0,
            end: total,
            chunk,
        }
    }
}

impl Iterator for ChunkCursor {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }
        let start = self.pos;
        self.pos = (self.pos + self.chunk).min(self.end);
        Some((start, self.pos))
    }
}

/// Extracts the numeric suffix of a digital line name such as `"line8"`.
/// Returns `None` for names in any other shape.
pub fn line_number(name: &str) -> Option<u32> {
    let re = Regex::new(r"^line(\d+)$").unwrap();
    re.captures(name)?.get(1)?.as_str().parse().ok()
}
