//! Order-preserving fixed-size batching for bounded downstream calls.

/// Split `items` into consecutive groups of at most `size`, preserving
/// order. The last group may be smaller; empty input yields no chunks.
///
/// `size` must be at least 1.
pub fn chunk<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    assert!(size >= 1, "chunk size must be at least 1");

    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    let mut current = Vec::with_capacity(size.min(items.len()));
    for item in items {
        current.push(item);
        if current.len() == size {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
