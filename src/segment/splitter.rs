//! Sentence boundary detection.

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Splits free text into sentence units.
pub trait SentenceSplitter: Send + Sync {
    fn split(&self, text: &str) -> Vec<String>;
}

/// Which splitter the segmenter uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SplitterMode {
    /// Punctuation pattern with a couple of abbreviation guards
    Regex,
    /// Language-aware rules with abbreviation tables
    #[default]
    Linguistic,
}

impl SplitterMode {
    pub fn splitter(self, language: Option<&str>) -> Box<dyn SentenceSplitter> {
        match self {
            Self::Regex => Box::new(RegexSplitter),
            Self::Linguistic => Box::new(LinguisticSplitter::for_language(language)),
        }
    }
}

const CJK_TERMINATORS: &[char] = &['。', '！', '？'];
const CLOSERS: &[char] = &['"', '\'', '”', '’', ')', ']', '」', '』', '）'];

static BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[.!?]+["'”’)\]]*\s+|[。！？]+["'”’」』）)\]]*\s*"#)
        .expect("sentence boundary pattern is valid")
});

// `e.g` style tokens and two-letter title-case words such as `Mr` or `Dr`
static REGEX_ABBREVIATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\w])(?:\w\.\w|[A-Z][a-z])$").expect("abbreviation pattern is valid")
});

/// Punctuation-driven splitter.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexSplitter;

impl SentenceSplitter for RegexSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut start = 0;

        for boundary in BOUNDARY.find_iter(text) {
            let punctuation = boundary.as_str().trim_end();
            let is_cjk = punctuation.starts_with(CJK_TERMINATORS);

            if !is_cjk {
                let rest = &text[boundary.end()..];
                match rest.chars().next() {
                    None => continue,
                    Some(next) if next.is_lowercase() => continue,
                    _ => {}
                }
                let preceding = &text[start..boundary.start()];
                if punctuation.starts_with('.')
                    && !punctuation.starts_with("..")
                    && REGEX_ABBREVIATION.is_match(preceding)
                {
                    continue;
                }
            }

            push_trimmed(&mut sentences, &text[start..boundary.end()]);
            start = boundary.end();
        }

        push_trimmed(&mut sentences, &text[start..]);
        sentences
    }
}

/// Rule-based splitter aware of per-language abbreviations, initials,
/// decimals and ellipses.
#[derive(Debug, Clone)]
pub struct LinguisticSplitter {
    abbreviations: HashSet<&'static str>,
    /// English "I" is a word, never an initial
    pronoun_i: bool,
}

impl LinguisticSplitter {
    pub fn for_language(language: Option<&str>) -> Self {
        let (table, english) = abbreviation_table(language);
        Self {
            abbreviations: table.iter().copied().collect(),
            pronoun_i: english,
        }
    }

    /// Whether the period after `token` belongs to an abbreviation, given the
    /// first character of the following word.
    fn is_abbreviation(&self, token: &str, next: char) -> bool {
        let token = token.trim_start_matches(|c: char| !c.is_alphanumeric());
        if token.is_empty() {
            return false;
        }
        let lower = token.to_lowercase();
        if NUMBERED.contains(&lower.as_str()) {
            return next.is_numeric();
        }
        if self.abbreviations.contains(lower.as_str()) {
            return true;
        }
        let mut chars = token.chars();
        match (chars.next(), chars.next()) {
            // an initial such as "J." is followed by another capitalised name
            (Some(c), None) => {
                c.is_uppercase() && next.is_uppercase() && !(self.pronoun_i && c == 'I')
            }
            // dotted forms such as "U.S" or "e.g"
            _ => token.contains('.'),
        }
    }
}

impl SentenceSplitter for LinguisticSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let mut sentences = Vec::new();
        let mut start = 0;
        let mut i = 0;

        while i < chars.len() {
            let (offset, ch) = chars[i];

            if CJK_TERMINATORS.contains(&ch) {
                let mut j = i + 1;
                while j < chars.len()
                    && (CJK_TERMINATORS.contains(&chars[j].1) || CLOSERS.contains(&chars[j].1))
                {
                    j += 1;
                }
                let end = chars.get(j).map_or(text.len(), |(o, _)| *o);
                push_trimmed(&mut sentences, &text[start..end]);
                start = end;
                i = j;
                continue;
            }

            if !matches!(ch, '.' | '!' | '?' | '…') {
                i += 1;
                continue;
            }

            let mut j = i + 1;
            while j < chars.len() && matches!(chars[j].1, '.' | '!' | '?' | '…') {
                j += 1;
            }
            let run_end = j;
            while j < chars.len() && CLOSERS.contains(&chars[j].1) {
                j += 1;
            }

            // a boundary needs whitespace after the punctuation; this keeps
            // decimals and dotted abbreviations like "3.14" or "U.S." intact
            let Some(&(end, after)) = chars.get(j) else {
                break;
            };
            if !after.is_whitespace() {
                i = j;
                continue;
            }

            let mut k = j;
            while k < chars.len() && chars[k].1.is_whitespace() {
                k += 1;
            }
            let Some(&(_, next)) = chars.get(k) else {
                break;
            };
            if next.is_lowercase() {
                i = k;
                continue;
            }

            let single_period = run_end == i + 1 && ch == '.';
            if single_period {
                let token_start = text[start..offset]
                    .rfind(char::is_whitespace)
                    .map_or(start, |p| start + p + 1);
                if self.is_abbreviation(&text[token_start..offset], next) {
                    i = k;
                    continue;
                }
            }

            push_trimmed(&mut sentences, &text[start..end]);
            start = end;
            i = k;
        }

        push_trimmed(&mut sentences, &text[start..]);
        sentences
    }
}

fn push_trimmed(sentences: &mut Vec<String>, piece: &str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        sentences.push(piece.to_string());
    }
}

// only abbreviations when a number follows, as in "No. 5" or "Vol. 2"
const NUMBERED: &[&str] = &["no", "nr", "vol", "fig", "núm", "pág", "pag", "blz", "art"];

const EN: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "approx", "dept", "est",
    "inc", "ltd", "co", "corp", "jan", "feb", "mar", "apr", "jun", "jul",
    "aug", "sep", "sept", "oct", "nov", "dec", "mt", "ave", "gen", "col", "lt", "sgt", "capt",
];
const DE: &[&str] = &[
    "dr", "prof", "str", "hr", "fr", "bzw", "usw", "ca", "evtl", "ggf", "vgl", "s", "z.b",
    "u.a", "d.h", "jh", "abs", "tel",
];
const FR: &[&str] = &[
    "m", "mm", "mme", "mlle", "dr", "pr", "etc", "env", "av", "bd", "st", "ste", "p.ex", "cf",
];
const ES: &[&str] = &[
    "sr", "sra", "srta", "dr", "dra", "ud", "uds", "etc", "p.ej", "av", "aprox",
];
const IT: &[&str] = &["sig", "sigg", "dott", "prof", "ecc", "es", "avv", "ing", "geom"];
const PT: &[&str] = &["sr", "sra", "dr", "dra", "etc", "ex", "av", "prof", "profa"];
const NL: &[&str] = &["dhr", "mevr", "dr", "prof", "bijv", "enz", "ca", "ir"];
const TR: &[&str] = &["dr", "prof", "doç", "vb", "vs", "sn", "örn", "yy", "av", "yrd"];

/// Abbreviation table for a language tag, and whether English rules apply.
fn abbreviation_table(language: Option<&str>) -> (&'static [&'static str], bool) {
    let primary = language
        .and_then(|tag| tag.split(['_', '-']).next())
        .unwrap_or("en")
        .to_ascii_lowercase();
    match primary.as_str() {
        "de" | "deu" | "ger" => (DE, false),
        "fr" | "fra" | "fre" => (FR, false),
        "es" | "spa" => (ES, false),
        "it" | "ita" => (IT, false),
        "pt" | "por" => (PT, false),
        "nl" | "nld" | "dut" => (NL, false),
        "tr" | "tur" => (TR, false),
        _ => (EN, true),
    }
}
