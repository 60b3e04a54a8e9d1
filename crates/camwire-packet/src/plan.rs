//! Splitting a frame into chunks.

/// Number of chunks needed for `total_size` bytes: `ceil(total_size / chunk_size)`.
///
/// `chunk_size` must be non-zero.
pub fn chunk_count(total_size: usize, chunk_size: u16) -> usize {
    total_size.div_ceil(chunk_size as usize)
}

/// Position and length of one chunk within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub index: u16,
    pub offset: usize,
    pub len: usize,
}

impl ChunkSpan {
    /// The byte range of this chunk within the frame.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Iterates the chunk spans of a frame in index order.
///
/// Every span is `chunk_size` long except possibly the last; an empty frame
/// yields no spans.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    total_size: usize,
    chunk_size: usize,
    next: usize,
}

impl ChunkPlan {
    /// Plan the chunks of a `total_size`-byte frame. `chunk_size` must be
    /// non-zero and the resulting count must fit in `u16`.
    pub fn new(total_size: usize, chunk_size: u16) -> Self {
        Self {
            total_size,
            chunk_size: chunk_size as usize,
            next: 0,
        }
    }

    /// Total number of chunks in the plan.
    pub fn total_chunks(&self) -> usize {
        self.total_size.div_ceil(self.chunk_size)
    }
}

impl Iterator for ChunkPlan {
    type Item = ChunkSpan;

    fn next(&mut self) -> Option<ChunkSpan> {
        let offset = self.next * self.chunk_size;
        if offset >= self.total_size {
            return None;
        }
        let span = ChunkSpan {
            index: self.next as u16,
            offset,
            len: (self.total_size - offset).min(self.chunk_size),
        };
        self.next += 1;
        Some(span)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total_chunks().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkPlan {}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn thousand_bytes_in_512_byte_chunks() {
        let spans: Vec<_> = ChunkPlan::new(1000, 512).collect();
        assert_eq!(
            spans,
            vec![
                ChunkSpan {
                    index: 0,
                    offset: 0,
                    len: 512
                },
                ChunkSpan {
                    index: 1,
                    offset: 512,
                    len: 488
                },
            ]
        );
    }

    #[test]
    fn empty_frame_has_no_chunks() {
        assert_eq!(chunk_count(0, 512), 0);
        assert_eq!(ChunkPlan::new(0, 512).next(), None);
    }

    #[test]
    fn exact_multiple_has_no_trailing_chunk() {
        let spans: Vec<_> = ChunkPlan::new(1024, 512).collect();
        assert_eq!(spans.len(), 2);
        assert!(spans.iter().all(|span| span.len == 512));
        assert_eq!(ChunkPlan::new(512, 512).count(), 1);
    }

    #[test]
    fn size_hint_tracks_progress() {
        let mut plan = ChunkPlan::new(1500, 512);
        assert_eq!(plan.len(), 3);
        plan.next();
        assert_eq!(plan.len(), 2);
    }

    proptest! {
        #[test]
        fn spans_cover_frame_exactly(total in 0usize..20_000, chunk in 1u16..2048) {
            let plan = ChunkPlan::new(total, chunk);
            let expected = chunk_count(total, chunk);
            prop_assert_eq!(plan.total_chunks(), expected);
            prop_assert_eq!(expected, (total + chunk as usize - 1) / chunk as usize);

            let spans: Vec<_> = plan.collect();
            prop_assert_eq!(spans.len(), expected);

            let mut cursor = 0usize;
            for (i, span) in spans.iter().enumerate() {
                prop_assert_eq!(span.index as usize, i);
                prop_assert_eq!(span.offset, cursor);
                prop_assert!(span.len >= 1 && span.len <= chunk as usize);
                if i + 1 < spans.len() {
                    prop_assert_eq!(span.len, chunk as usize);
                }
                cursor += span.len;
            }
            prop_assert_eq!(cursor, total);
        }
    }
}
