/// Window size in characters for source chunking.
pub const CHUNK_SIZE: usize = 1000;
/// Characters shared between consecutive chunks.
pub const CHUNK_OVERLAP: usize = 200;

/// Splits text into a sliding window of `size`-character chunks overlapping by
/// `overlap` characters. The last chunk may be shorter; a text no longer than
/// one window yields a single chunk. For a text of L chars with L > size the
/// chunk count is `ceil((L - overlap) / (size - overlap))`.
pub fn split_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    assert!(overlap < size, "overlap must be smaller than the chunk size");

    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= size {
        return vec![text.to_string()];
    }

    let stride = size - overlap;
    let mut chunks = Vec::with_capacity(chars.len().div_ceil(stride));
    let mut start = 0;

    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += stride;
    }

    chunks
}
