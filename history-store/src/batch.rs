//! Batched insert sizing
//!
//! Multi-row statements are capped to bound per-statement memory and lock
//! duration; callers hand the store whole row sets and the store chunks.

/// Maximum rows per multi-row statement
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Split a row set into statement-sized chunks
pub fn chunked<T>(rows: &[T]) -> impl Iterator<Item = &[T]> {
    rows.chunks(MAX_BATCH_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunking() {
        let rows: Vec<u32> = (0..(MAX_BATCH_SIZE * 2 + 1) as u32).collect();
        let chunks: Vec<_> = chunked(&rows).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), MAX_BATCH_SIZE);
        assert_eq!(chunks[2].len(), 1);
    }

    #[test]
    fn test_empty_set_yields_no_chunks() {
        let rows: Vec<u32> = vec![];
        assert_eq!(chunked(&rows).count(), 0);
    }
}
