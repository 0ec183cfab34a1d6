use crate::error::IngestError;
use crate::models::ChunkingOptions;
use regex::Regex;
use std::sync::OnceLock;

/// A slice of a document's text with its char offsets, `char_end` exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
}

impl ChunkingOptions {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

fn inline_space_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t\u{a0}\u{0c}\r]+").expect("static regex"))
}

fn paragraph_gap_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("static regex"))
}

/// Collapses horizontal whitespace runs and trims every line, keeping line and
/// paragraph breaks so the splitter can prefer them as boundaries.
pub fn normalize_whitespace(text: &str) -> String {
    let lines = text
        .lines()
        .map(|line| inline_space_re().replace_all(line, " ").trim().to_string())
        .collect::<Vec<_>>()
        .join("\n");

    paragraph_gap_re()
        .replace_all(lines.trim(), "\n\n")
        .into_owned()
}

/// Splits `text` into windows of at most `chunk_size` chars, consecutive windows
/// sharing up to `chunk_overlap` chars.
pub fn split_text(text: &str, options: ChunkingOptions) -> Result<Vec<TextSpan>, IngestError> {
    options.validate()?;

    let chars: Vec<char> = text.chars().collect();
    let mut spans = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        while start < chars.len() && chars[start].is_whitespace() {
            start += 1;
        }
        if start >= chars.len() {
            break;
        }

        let hard_end = (start + options.chunk_size).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            soft_break(&chars, start, hard_end)
        };

        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim_end();
        if !trimmed.is_empty() {
            spans.push(TextSpan {
                text: trimmed.to_string(),
                char_start: start,
                char_end: start + trimmed.chars().count(),
            });
        }

        if end == chars.len() {
            break;
        }
        start = end.saturating_sub(options.chunk_overlap).max(start + 1);
    }

    Ok(spans)
}

// Pulls the window end back to the last paragraph break, line break or space
// found in the second half of the window.
fn soft_break(chars: &[char], start: usize, hard_end: usize) -> usize {
    const SEPARATORS: [&[char]; 3] = [&['\n', '\n'], &['\n'], &[' ']];

    let floor = start + (hard_end - start) / 2;
    let window = &chars[floor..hard_end];
    for separator in SEPARATORS {
        if let Some(position) = window
            .windows(separator.len())
            .rposition(|candidate| candidate == separator)
        {
            return floor + position + separator.len();
        }
    }
    hard_end
}

pub fn make_chunk_id(document_id: &str, index: u64) -> String {
    format!("{document_id}-{index:05}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(chunk_size: usize, chunk_overlap: usize) -> ChunkingOptions {
        ChunkingOptions {
            chunk_size,
            chunk_overlap,
        }
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\u{a0}of   spacing  \n\n\n\nnext   paragraph\n";
        assert_eq!(normalize_whitespace(input), "A lot of spacing\n\nnext paragraph");
    }

    #[test]
    fn short_text_is_one_chunk() {
        let spans = split_text("The capital of France is Paris.", options(512, 40)).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "The capital of France is Paris.");
        assert_eq!(spans[0].char_start, 0);
        assert_eq!(spans[0].char_end, 31);
    }

    #[test]
    fn chunks_respect_size_and_overlap() {
        let text = (0..60)
            .map(|n| format!("word{n:02}"))
            .collect::<Vec<_>>()
            .join(" ");
        let spans = split_text(&text, options(50, 12)).unwrap();

        assert!(spans.len() > 1);
        for span in &spans {
            assert!(span.text.chars().count() <= 50);
            let from_offsets: String = text
                .chars()
                .skip(span.char_start)
                .take(span.char_end - span.char_start)
                .collect();
            assert_eq!(from_offsets, span.text);
        }
        for pair in spans.windows(2) {
            assert!(pair[1].char_start < pair[0].char_end, "consecutive chunks overlap");
            assert!(pair[1].char_start > pair[0].char_start, "chunks advance");
        }
        assert_eq!(spans.last().map(|span| span.char_end), Some(text.chars().count()));
    }

    #[test]
    fn breaks_prefer_paragraphs_over_words() {
        let text = format!("{}\n\n{}", "a".repeat(30), "b ".repeat(20));
        let spans = split_text(&text, options(40, 0)).unwrap();
        assert_eq!(spans[0].text, "a".repeat(30));
        assert!(spans[1].text.starts_with('b'));
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "Lorem ipsum dolor sit amet. ".repeat(80);
        let first = split_text(&text, options(120, 20)).unwrap();
        let second = split_text(&text, options(120, 20)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "été à Zürich ".repeat(20);
        let spans = split_text(&text, options(16, 4)).unwrap();
        assert!(spans.iter().all(|span| span.text.chars().count() <= 16));
    }

    #[test]
    fn unbroken_text_still_advances() {
        let text = "x".repeat(100);
        let spans = split_text(&text, options(30, 29)).unwrap();
        assert_eq!(spans[0].char_end, 30);
        assert_eq!(spans[1].char_start, 1);
        assert_eq!(spans.last().map(|span| span.char_end), Some(100));
    }

    #[test]
    fn whitespace_only_text_has_no_chunks() {
        assert!(split_text(" \n\n  ", options(10, 2)).unwrap().is_empty());
    }

    #[test]
    fn invalid_options_are_rejected() {
        assert!(matches!(
            split_text("abc", options(0, 0)),
            Err(IngestError::InvalidChunkConfig(_))
        ));
        assert!(matches!(
            split_text("abc", options(10, 10)),
            Err(IngestError::InvalidChunkConfig(_))
        ));
    }

    #[test]
    fn chunk_ids_sort_by_index() {
        assert_eq!(make_chunk_id("doc", 7), "doc-00007");
        assert!(make_chunk_id("doc", 9) < make_chunk_id("doc", 10));
    }
}
