//! Paragraph-greedy text chunking.

/// Split text into chunks of at most `max_size` bytes, packing whole
/// paragraphs (blank-line separated) greedily. A single paragraph larger
/// than `max_size` becomes its own oversized chunk rather than being cut
/// mid-sentence.
pub fn chunk_text(text: &str, max_size: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return vec![];
    }
    if text.len() <= max_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if current.len() + paragraph.len() <= max_size {
            current.push_str(paragraph);
            current.push_str("\n\n");
        } else {
            if !current.is_empty() {
                chunks.push(current.trim_end().to_string());
            }
            current = format!("{paragraph}\n\n");
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim_end().to_string());
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("short text", 512);
        assert_eq!(chunks, vec!["short text".to_string()]);
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunk_text("", 512).is_empty());
        assert!(chunk_text("   \n\n  ", 512).is_empty());
    }

    #[test]
    fn test_paragraphs_packed_greedily() {
        let text = format!("{}\n\n{}\n\n{}", "a".repeat(40), "b".repeat(40), "c".repeat(40));
        let chunks = chunk_text(&text, 90);
        // First two paragraphs fit together, third starts a new chunk.
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].contains('a') && chunks[0].contains('b'));
        assert!(chunks[1].contains('c'));
    }

    #[test]
    fn test_oversized_paragraph_kept_whole() {
        let big = "x".repeat(1000);
        let chunks = chunk_text(&big, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 1000);
    }

    #[test]
    fn test_no_content_lost() {
        let text = (0..20)
            .map(|i| format!("paragraph number {i} with some filler words"))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text(&text, 120);
        let rejoined = chunks.join("\n\n");
        for i in 0..20 {
            assert!(rejoined.contains(&format!("paragraph number {i}")));
        }
    }
}
