//! Language tags accepted by the translator and their display names.
//!
//! Tags may be ISO 639-1 (`tr`), ISO 639-3 (`tur`) or NLLB style (`tur_Latn`).

const LANGUAGES: &[(&str, &str, &str)] = &[
    ("ar", "arb", "Arabic"),
    ("bg", "bul", "Bulgarian"),
    ("ca", "cat", "Catalan"),
    ("cs", "ces", "Czech"),
    ("da", "dan", "Danish"),
    ("de", "deu", "German"),
    ("el", "ell", "Greek"),
    ("en", "eng", "English"),
    ("es", "spa", "Spanish"),
    ("et", "est", "Estonian"),
    ("fa", "pes", "Persian"),
    ("fi", "fin", "Finnish"),
    ("fr", "fra", "French"),
    ("he", "heb", "Hebrew"),
    ("hi", "hin", "Hindi"),
    ("hr", "hrv", "Croatian"),
    ("hu", "hun", "Hungarian"),
    ("id", "ind", "Indonesian"),
    ("it", "ita", "Italian"),
    ("ja", "jpn", "Japanese"),
    ("km", "khm", "Khmer"),
    ("ko", "kor", "Korean"),
    ("lo", "lao", "Lao"),
    ("lt", "lit", "Lithuanian"),
    ("lv", "lvs", "Latvian"),
    ("my", "mya", "Burmese"),
    ("nl", "nld", "Dutch"),
    ("no", "nob", "Norwegian"),
    ("pl", "pol", "Polish"),
    ("pt", "por", "Portuguese"),
    ("ro", "ron", "Romanian"),
    ("ru", "rus", "Russian"),
    ("sk", "slk", "Slovak"),
    ("sl", "slv", "Slovenian"),
    ("sv", "swe", "Swedish"),
    ("th", "tha", "Thai"),
    ("tr", "tur", "Turkish"),
    ("uk", "ukr", "Ukrainian"),
    ("vi", "vie", "Vietnamese"),
    ("zh", "zho", "Chinese"),
];

// ISO 639-3 codes that differ from the macrolanguage code used above
const ALIASES: &[(&str, &str)] = &[
    ("ara", "arb"),
    ("fas", "pes"),
    ("lav", "lvs"),
    ("nor", "nob"),
    ("cmn", "zho"),
    ("yue", "zho"),
    ("ger", "deu"),
    ("fre", "fra"),
    ("dut", "nld"),
];

fn primary_subtag(tag: &str) -> String {
    tag.trim()
        .split(['_', '-'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// English display name for a language tag.
pub fn language_name(tag: &str) -> Option<&'static str> {
    let primary = primary_subtag(tag);
    let primary = ALIASES
        .iter()
        .find(|(alias, _)| *alias == primary)
        .map(|(_, code)| code.to_string())
        .unwrap_or(primary);

    LANGUAGES
        .iter()
        .find(|(iso1, iso3, _)| *iso1 == primary || *iso3 == primary)
        .map(|(_, _, name)| *name)
}

pub fn is_supported(tag: &str) -> bool {
    language_name(tag).is_some()
}

/// Whether two tags name the same language.
pub fn same_language(a: &str, b: &str) -> bool {
    match (language_name(a), language_name(b)) {
        (Some(x), Some(y)) => x == y,
        _ => primary_subtag(a) == primary_subtag(b),
    }
}
