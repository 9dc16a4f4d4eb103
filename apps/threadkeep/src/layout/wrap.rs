//! Greedy word wrap against the static font metrics.
//!
//! Explicit newlines are hard breaks and blank lines are kept. A word wider than
//! the line is broken between characters.

use crate::layout::font_metrics::{em_to_mm, FontMetricTable};

/// Splits `text` into lines no wider than `max_width_mm` at `font_size_pt`.
///
/// Returns an empty vector only for empty input.
pub fn wrap_text(
    text: &str,
    max_width_mm: f32,
    metrics: &FontMetricTable,
    font_size_pt: f32,
) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    // Work in em units so each word is measured once.
    let max_width = max_width_mm / em_to_mm(font_size_pt);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let paragraph = paragraph.trim_end_matches('\r');
        let mut current = String::new();
        let mut current_width = 0.0_f32;

        for word in paragraph.split_whitespace() {
            let word_w = metrics.measure_str(word);

            if word_w > max_width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let (mut chunks, tail_width) = break_word(word, max_width, metrics);
                current = chunks.pop().unwrap_or_default();
                current_width = tail_width;
                lines.extend(chunks);
                continue;
            }

            if current.is_empty() {
                current.push_str(word);
                current_width = word_w;
            } else if current_width + metrics.space_width + word_w <= max_width {
                current.push(' ');
                current.push_str(word);
                current_width += metrics.space_width + word_w;
            } else {
                lines.push(std::mem::replace(&mut current, word.to_string()));
                current_width = word_w;
            }
        }
        // An empty paragraph still produces a (blank) line.
        lines.push(current);
    }

    lines
}

/// Breaks an over-long word into chunks that each fit `max_width` (em).
/// Returns the chunks and the width of the last one.
fn break_word(word: &str, max_width: f32, metrics: &FontMetricTable) -> (Vec<String>, f32) {
    let mut chunks = Vec::new();
    let mut chunk = String::new();
    let mut width = 0.0_f32;

    for c in word.chars() {
        let w = metrics.char_width(c);
        if !chunk.is_empty() && width + w > max_width {
            chunks.push(std::mem::take(&mut chunk));
            width = 0.0;
        }
        chunk.push(c);
        width += w;
    }
    chunks.push(chunk);
    (chunks, width)
}
