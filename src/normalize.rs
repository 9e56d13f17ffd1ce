//! Text normalization for titles, author names, and search terms.
//!
//! Lookup responses come back with inconsistent casing, cramped punctuation
//! ("Dune:Messiah"), and author initials written three different ways; the
//! functions here repair them before scoring or display.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

use crate::parts::PartExtractor;

/// Words that should remain lowercase in titles (unless first/last word)
const LOWERCASE_WORDS: &[&str] = &[
    "a", "an", "the", "and", "but", "or", "nor", "for", "yet", "so", "at", "by", "in", "of", "on",
    "to", "up", "as", "is", "it", "if", "be", "vs", "via", "per", "out", "de", "la", "le",
];

lazy_static! {
    // ".com"-style site names that leak into filenames from release groups
    static ref SITE_NAME: Regex =
        Regex::new(r"[^a-z0-9][a-z0-9]*\.(?:com|net|org|io|cc)").unwrap();
    // Punctuation followed directly by a non-space: "Dune:Messiah"
    static ref CRAMPED_PUNCT: Regex = Regex::new(r"([.,!?;:])([^\s.,!?;:])").unwrap();
    // A dot followed directly by a letter: "J.R.R." -> "J. R. R."
    static ref DOT_INITIAL: Regex = Regex::new(r"\.([A-Za-z])").unwrap();
    // A bare capital followed by a space: "J R R Tolkien"
    static ref BARE_INITIAL: Regex = Regex::new(r"([A-Z]) ").unwrap();
    static ref MULTI_SPACE: Regex = Regex::new(r"\s+").unwrap();
    // YYYY, YYYY-MM, or YYYY-MM-DD, anchored at the front
    static ref PUBLISH_DATE: Regex =
        Regex::new(r"^(\d{4})(?:-(\d{1,2}))?(?:-(\d{1,2}))?").unwrap();
}

/// Convert a title to proper title case.
///
/// Words already carrying capitalization (proper nouns, acronyms, Roman
/// numerals) are left alone.
///
/// # Examples
/// ```
/// assert_eq!(to_title_case("the lord of the rings"), "The Lord of the Rings");
/// ```
pub fn to_title_case(title: &str) -> String {
    let words: Vec<&str> = title.split_whitespace().collect();
    if words.is_empty() {
        return String::new();
    }

    let lowercase_set: HashSet<&str> = LOWERCASE_WORDS.iter().copied().collect();

    let mut result: Vec<String> = Vec::new();
    for (i, word) in words.iter().enumerate() {
        let is_first = i == 0;
        let is_last = i == words.len() - 1;

        if looks_like_proper_noun(word) || looks_like_acronym(word) {
            result.push(word.to_string());
            continue;
        }

        let lower = word.to_lowercase();
        if (is_first || is_last) || !lowercase_set.contains(lower.as_str()) {
            result.push(capitalize_first(&lower));
        } else {
            result.push(lower);
        }
    }

    result.join(" ")
}

/// Capitalize the first letter of a word
fn capitalize_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

/// Check if a word looks like a proper noun (mixed case)
fn looks_like_proper_noun(word: &str) -> bool {
    if word.len() < 2 {
        return false;
    }
    let has_internal_capital = word.chars().skip(1).any(|c| c.is_uppercase());
    let starts_uppercase = word.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);
    has_internal_capital || (starts_uppercase && word.chars().skip(1).any(|c| c.is_lowercase()))
}

/// Check if a word looks like an acronym or Roman numeral (all caps, 2-5 chars)
fn looks_like_acronym(word: &str) -> bool {
    word.len() >= 2 && word.len() <= 5 && word.chars().all(|c| c.is_uppercase() || c.is_numeric())
}

/// Insert a space after punctuation that runs straight into the next word.
pub fn space_after_punctuation(text: &str) -> String {
    CRAMPED_PUNCT.replace_all(text, "$1 $2").into_owned()
}

/// Normalize an author name: "J.R.R. Tolkien" and "J R R Tolkien" both
/// become "J. R. R. Tolkien", then the whole name is title-cased.
pub fn normalize_author(author: &str) -> String {
    let spaced = DOT_INITIAL.replace_all(author.trim(), ". $1");
    let dotted = BARE_INITIAL.replace_all(&spaced, "$1. ");
    let collapsed = MULTI_SPACE.replace_all(&dotted, " ");
    to_title_case(collapsed.trim())
}

/// Derive a lookup search term from a filename stem.
///
/// Strips part/chapter markers, lowercases, drops leaked site names and the
/// configured junk words, and flattens punctuation to spaces. Returns the
/// cleaned term and whether the filename flagged itself as an excerpt.
pub fn clean_search_term(
    stem: &str,
    extractor: &PartExtractor,
    junk_words: &[String],
    punctuation: &[char],
) -> (String, bool) {
    let mut term = extractor.strip_markers(stem).to_lowercase();
    term = SITE_NAME.replace_all(&term, "").into_owned();

    let is_excerpt = term.contains("excerpt");
    if is_excerpt {
        term = term.replace("excerpt", "");
    }

    for word in junk_words {
        term = term.replace(word.as_str(), " ");
    }
    for &ch in punctuation {
        term = term.replace(ch, " ");
    }

    (MULTI_SPACE.replace_all(&term, " ").trim().to_string(), is_excerpt)
}

/// Parse a published date of the form YYYY, YYYY-MM, or YYYY-MM-DD.
/// Missing month and day default to 1, matching how lookup providers report
/// year-only publication dates.
pub fn parse_publish_date(text: &str) -> Option<NaiveDate> {
    let caps = PUBLISH_DATE.captures(text.trim())?;
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1);
    let day: u32 = caps
        .get(3)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1);
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Format a duration in seconds as "3H 21M 5S", omitting zero components.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.round() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{}H", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}M", minutes));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{}S", secs));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_title_case() {
        assert_eq!(to_title_case("the lord of the rings"), "The Lord of the Rings");
        assert_eq!(to_title_case("a tale of two cities"), "A Tale of Two Cities");
        assert_eq!(to_title_case("war and peace"), "War and Peace");
        // Acronyms and Roman numerals survive
        assert_eq!(to_title_case("henry VIII"), "Henry VIII");
    }

    #[test]
    fn test_space_after_punctuation() {
        assert_eq!(space_after_punctuation("Dune:Messiah"), "Dune: Messiah");
        assert_eq!(space_after_punctuation("one.two.three"), "one. two. three");
        assert_eq!(space_after_punctuation("Already fine."), "Already fine.");
    }

    #[test]
    fn test_normalize_author_initials() {
        assert_eq!(normalize_author("J.R.R. Tolkien"), "J. R. R. Tolkien");
        assert_eq!(normalize_author("J R R Tolkien"), "J. R. R. Tolkien");
        assert_eq!(normalize_author("Ursula K Le Guin"), "Ursula K. Le Guin");
    }

    #[test]
    fn test_clean_search_term() {
        let extractor = PartExtractor::new();
        let junk: Vec<String> = ["audiobook", "unabridged"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let punct = ['_', '-', '.', '(', ')'];

        let (term, excerpt) =
            clean_search_term("The_Hobbit_audiobook_Part 2", &extractor, &junk, &punct);
        assert_eq!(term, "the hobbit");
        assert!(!excerpt);
    }

    #[test]
    fn test_clean_search_term_flags_excerpt() {
        let extractor = PartExtractor::new();
        let (term, excerpt) = clean_search_term("Dune excerpt", &extractor, &[], &[]);
        assert_eq!(term, "dune");
        assert!(excerpt);
    }

    #[test]
    fn test_clean_search_term_strips_site_names() {
        let extractor = PartExtractor::new();
        let (term, _) = clean_search_term("silo audiobooks.net dune", &extractor, &[], &[]);
        assert!(!term.contains("net"));
        assert!(term.contains("dune"));
    }

    #[test]
    fn test_parse_publish_date() {
        assert_eq!(parse_publish_date("1965"), NaiveDate::from_ymd_opt(1965, 1, 1));
        assert_eq!(parse_publish_date("2008-09"), NaiveDate::from_ymd_opt(2008, 9, 1));
        assert_eq!(parse_publish_date("2008-09-16"), NaiveDate::from_ymd_opt(2008, 9, 16));
        assert_eq!(parse_publish_date("unknown"), None);
        assert_eq!(parse_publish_date("2008-13-01"), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0S");
        assert_eq!(format_duration(61.0), "1M 1S");
        assert_eq!(format_duration(3600.0), "1H");
        assert_eq!(format_duration(12065.0), "3H 21M 5S");
    }
}
