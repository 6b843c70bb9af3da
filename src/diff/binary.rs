use content_inspector::{ContentType, inspect};

/// Bytes inspected to decide whether a file is binary
const SNIFF_LEN: usize = 8192;

/// True if `content` looks binary. Empty content is text.
#[must_use]
pub fn is_binary(content: &[u8]) -> bool {
    let sample = &content[..content.len().min(SNIFF_LEN)];
    !sample.is_empty() && matches!(inspect(sample), ContentType::BINARY)
}
