//! Emote stripping: turns the raw message into the "plain text" view
//! used by the capitals-ratio and emote-flood detectors. Every other
//! detector works on the raw message on purpose.

use crate::types::EmoteSpan;

/// Remove every emote span from `raw`.
///
/// Spans are char offsets. They are processed in descending start
/// order so earlier removals never shift the offsets of spans still
/// to be removed. Out-of-range spans are clamped rather than panicking
/// since platform tags occasionally disagree with the message body.
pub fn strip_emotes(raw: &str, spans: &[EmoteSpan]) -> String {
    if spans.is_empty() {
        return raw.to_string();
    }

    let mut chars: Vec<char> = raw.chars().collect();
    let mut ordered: Vec<&EmoteSpan> = spans.iter().collect();
    ordered.sort_by(|a, b| b.start.cmp(&a.start));

    for span in ordered {
        let end = span.end.min(chars.len());
        let start = span.start.min(end);
        chars.drain(start..end);
    }

    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_single_emote() {
        // "hello Kappa world" with Kappa at chars 6..11
        let plain = strip_emotes("hello Kappa world", &[EmoteSpan::new(6, 11)]);
        assert_eq!(plain, "hello  world");
    }

    #[test]
    fn strips_multiple_emotes_regardless_of_input_order() {
        let raw = "Kappa mid PogChamp";
        let forward = [EmoteSpan::new(0, 5), EmoteSpan::new(10, 18)];
        let backward = [EmoteSpan::new(10, 18), EmoteSpan::new(0, 5)];
        assert_eq!(strip_emotes(raw, &forward), " mid ");
        assert_eq!(strip_emotes(raw, &backward), " mid ");
    }

    #[test]
    fn stripped_length_is_raw_minus_span_widths() {
        let raw = "abc Kappa def LUL ghi";
        let spans = [EmoteSpan::new(4, 9), EmoteSpan::new(14, 17)];
        let plain = strip_emotes(raw, &spans);
        let removed: usize = spans.iter().map(|s| s.width()).sum();
        assert_eq!(plain.chars().count(), raw.chars().count() - removed);
    }

    #[test]
    fn spans_use_char_offsets_not_bytes() {
        // Multibyte char before the emote must not skew the span.
        let raw = "héllo Kappa";
        let plain = strip_emotes(raw, &[EmoteSpan::new(6, 11)]);
        assert_eq!(plain, "héllo ");
    }

    #[test]
    fn out_of_range_span_is_clamped() {
        let plain = strip_emotes("short", &[EmoteSpan::new(3, 40)]);
        assert_eq!(plain, "sho");
    }

    #[test]
    fn no_spans_returns_raw() {
        assert_eq!(strip_emotes("untouched", &[]), "untouched");
    }
}
