//! Part and chapter numbering extraction from audiobook filenames.
//!
//! Filenames in the wild encode structure in many ways: "Part 3", "Pt 3-5",
//! "Part 2 of 5", bare "02-15" pairs, "Chapter 4-6 Part 2", or a lone
//! trailing digit before a parenthesized suffix. One composite pattern with
//! alternative branches covers all of them; the branch grammar is a
//! heuristic, so the pattern is injectable and the named capture groups are
//! the stable interface.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

/// Default composite grammar. Branches, tried left-to-right at each position:
/// part keyword + number (optional range end or "of N" total), bare numeric
/// pair, chapter keyword + number (optional range end and nested trailing
/// part), single trailing digit. Character classes are deliberately wide to
/// tolerate punctuation noise around the numbers.
pub const DEFAULT_PART_PATTERN: &str = concat!(
    r"(?:[Pp][AaRrTtSs]{0,7}[^A-Za-z0-9]{0,5}(?P<part_start>\d+)",
    r"(?:[^0-9A-Za-z]{0,5}(?P<part_end>\d+)|\s+[A-Za-z]{2,7}\s+(?P<part_of>\d+))?",
    r"|(?:^|[^A-Za-z0-9])(?P<pair_start>\d+)[^0-9A-Za-z]{1,5}(?P<pair_end>\d+)",
    r"|[Cc][HhAaPpTtEeRrSs]{0,8}[^A-Za-z0-9]{0,5}(?P<chap_start>\d+)",
    r"(?:[^0-9]{0,5}(?P<chap_end>\d+))?",
    r"(?:\s+[Pp][AaRrTtSs]{0,6}[^A-Za-z0-9]{0,5}(?P<chap_part>\d+))?",
    r"|(?P<low_tail>\d)\s*[)\]]?\s*(?:\(.*\))?\s*$)",
);

lazy_static! {
    static ref DEFAULT_PATTERN: Regex = Regex::new(DEFAULT_PART_PATTERN).unwrap();
}

/// Structural numbering parsed out of a filename stem.
///
/// Each range is swap-normalized (start <= end); a single value is the range
/// `(n, n)`. Absent means the filename carried no such number; zero is a
/// valid part number. The derived ordering is lexicographic over
/// (high_part, chapter, low_part) with absent fields sorting first, which is
/// exactly the order files belong in within a book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Numbering {
    pub high_part: Option<(u32, u32)>,
    pub chapter: Option<(u32, u32)>,
    pub low_part: Option<u32>,
}

impl Numbering {
    pub fn is_empty(&self) -> bool {
        self.high_part.is_none() && self.chapter.is_none() && self.low_part.is_none()
    }
}

pub struct PartExtractor {
    pattern: Regex,
}

impl Default for PartExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PartExtractor {
    pub fn new() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.clone(),
        }
    }

    /// Replace the branch grammar. The pattern must use the same named
    /// capture groups as [`DEFAULT_PART_PATTERN`]; unknown groups are
    /// ignored.
    pub fn with_pattern(pattern: Regex) -> Self {
        Self { pattern }
    }

    /// Scan the whole stem for numbering. Every match is considered and the
    /// last match wins per field: disambiguating numbers tend to appear
    /// later in noisy filenames, after site or channel prefixes. Never
    /// fails; a stem with no recognizable numbers yields an empty
    /// [`Numbering`].
    pub fn extract(&self, stem: &str) -> Numbering {
        let mut numbering = Numbering::default();
        for caps in self.pattern.captures_iter(stem) {
            if let Some(start) = group_u32(&caps, "part_start") {
                let end = group_u32(&caps, "part_end")
                    .or_else(|| group_u32(&caps, "part_of"))
                    .unwrap_or(start);
                numbering.high_part = Some(ordered(start, end));
            }
            if let Some(start) = group_u32(&caps, "pair_start") {
                let end = group_u32(&caps, "pair_end").unwrap_or(start);
                numbering.high_part = Some(ordered(start, end));
            }
            if let Some(start) = group_u32(&caps, "chap_start") {
                let end = group_u32(&caps, "chap_end").unwrap_or(start);
                numbering.chapter = Some(ordered(start, end));
            }
            if let Some(low) = group_u32(&caps, "chap_part") {
                numbering.low_part = Some(low);
            }
            if let Some(low) = group_u32(&caps, "low_tail") {
                numbering.low_part = Some(low);
            }
        }
        numbering
    }

    /// Remove everything the numbering grammar matches, leaving the parts of
    /// the stem that actually name the book. Used when deriving a search
    /// term from a filename.
    pub fn strip_markers(&self, stem: &str) -> String {
        self.pattern.replace_all(stem, "").trim().to_string()
    }
}

fn group_u32(caps: &Captures, name: &str) -> Option<u32> {
    caps.name(name).and_then(|m| m.as_str().parse().ok())
}

fn ordered(a: u32, b: u32) -> (u32, u32) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
