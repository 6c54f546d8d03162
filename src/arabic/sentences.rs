//! Sentence segmentation for span resolution.
//!
//! Splits on Arabic and Latin sentence enders plus newlines, keeping
//! character offsets stable so quotes can be mapped back into chunk text.

/// A sentence's character range within its source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentenceSpan {
    pub start: usize,
    pub end: usize,
}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\u{061F}' | '\u{061B}' | '\u{06D4}' | '\n')
}

/// Sentence spans over `text`, capped at `max_spans`. Offsets are char
/// indices into `text`; empty segments are skipped.
pub fn sentence_spans(text: &str, max_spans: usize) -> Vec<SentenceSpan> {
    let chars: Vec<char> = text.chars().collect();
    let mut spans = Vec::new();
    let mut start = 0usize;

    for (i, &c) in chars.iter().enumerate() {
        if is_sentence_end(c) {
            push_span(&chars, start, i, &mut spans);
            start = i + 1;
            if spans.len() >= max_spans {
                return spans;
            }
        }
    }
    push_span(&chars, start, chars.len(), &mut spans);
    spans.truncate(max_spans);
    spans
}

fn push_span(chars: &[char], mut start: usize, mut end: usize, spans: &mut Vec<SentenceSpan>) {
    while start < end && chars[start].is_whitespace() {
        start += 1;
    }
    while end > start && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    if end > start {
        spans.push(SentenceSpan { start, end });
    }
}

/// Sentence substrings of `text`, in order.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    sentence_spans(text, 256)
        .into_iter()
        .map(|sp| chars[sp.start..sp.end].iter().collect())
        .collect()
}

/// Extract the text of a span.
pub fn span_text(text: &str, span: SentenceSpan) -> String {
    text.chars()
        .skip(span.start)
        .take(span.end - span.start)
        .collect()
}
