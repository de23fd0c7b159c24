//! Line measurement and word-boundary wrapping.

use std::mem;

/// Rendered length of a subtitle line, in Unicode scalar values.
pub fn measure(text: &str) -> usize {
    text.chars().count()
}

/// Whether a writing system separates words with spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Spaced,
    Unspaced,
}

const UNSPACED_LANGUAGES: &[&str] = &[
    "ja", "jpn", "zh", "zho", "cmn", "yue", "th", "tha", "lo", "lao", "km", "khm", "my", "mya",
];

impl Script {
    /// Resolve from a language tag such as `en`, `ja`, `zho_Hans` or `zh-TW`.
    pub fn for_language(tag: Option<&str>) -> Self {
        let Some(tag) = tag else {
            return Self::Spaced;
        };
        let primary = tag
            .split(['_', '-'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if UNSPACED_LANGUAGES.contains(&primary.as_str()) {
            Self::Unspaced
        } else {
            Self::Spaced
        }
    }

    /// Joiner placed between sentence units sharing a line.
    pub fn separator(self) -> &'static str {
        match self {
            Self::Spaced => " ",
            Self::Unspaced => "",
        }
    }
}

/// Greedily wrap `text` into lines of at most `max_width`.
///
/// Breaks fall on whitespace; a word wider than the limit is cut verbatim
/// into `max_width`-sized pieces.
pub fn wrap(text: &str, max_width: usize) -> Vec<String> {
    let max_width = max_width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut width = 0;

    for word in text.split_whitespace() {
        let word_width = measure(word);

        if word_width > max_width {
            if !current.is_empty() {
                lines.push(mem::take(&mut current));
            }
            let mut pieces = hard_cut(word, max_width);
            if let Some(last) = pieces.pop() {
                lines.extend(pieces);
                width = measure(&last);
                current = last;
            }
            continue;
        }

        if current.is_empty() {
            current.push_str(word);
            width = word_width;
        } else if width + 1 + word_width <= max_width {
            current.push(' ');
            current.push_str(word);
            width += 1 + word_width;
        } else {
            lines.push(mem::take(&mut current));
            current.push_str(word);
            width = word_width;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn hard_cut(word: &str, max_width: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(max_width)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_counts_scalars_not_bytes() {
        assert_eq!(measure("héllo"), 5);
        assert_eq!(measure("こんにちは"), 5);
    }

    #[test]
    fn test_wrap_breaks_on_whitespace() {
        assert_eq!(
            wrap("the quick brown fox jumps", 10),
            vec!["the quick", "brown fox", "jumps"]
        );
    }

    #[test]
    fn test_wrap_hard_cuts_long_word() {
        assert_eq!(
            wrap("a supercalifragilistic b", 8),
            vec!["a", "supercal", "ifragili", "stic b"]
        );
    }

    #[test]
    fn test_wrap_unspaced_text_is_cut() {
        let lines = wrap("これは字幕の長い一文です", 5);
        assert_eq!(lines, vec!["これは字幕", "の長い一文", "です"]);
    }

    #[test]
    fn test_script_resolution() {
        assert_eq!(Script::for_language(Some("ja")), Script::Unspaced);
        assert_eq!(Script::for_language(Some("zho_Hans")), Script::Unspaced);
        assert_eq!(Script::for_language(Some("zh-TW")), Script::Unspaced);
        assert_eq!(Script::for_language(Some("tur_Latn")), Script::Spaced);
        assert_eq!(Script::for_language(None).separator(), " ");
    }
}
