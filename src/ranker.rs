//! Candidate ranking by token-set similarity.
//!
//! Provider searches are good but not perfect: a query occasionally returns
//! records that are clearly not the book. Each record is cross-checked
//! against the search term with Jaccard similarity over three field
//! combinations of increasing detail, keeping the best of the three.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::lookup::Volume;

/// Classification thresholds. Cosmetic for display, and the pivot points for
/// the auto-accept/auto-reject prompt policy.
pub const GOOD_MATCH: f64 = 0.5;
pub const MODERATE_MATCH: f64 = 0.25;

/// One scored lookup record.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub score: f64,
    pub record: Volume,
}

/// Lowercase, flatten the configured punctuation to spaces, and split on
/// whitespace into a token set. Duplicates collapse.
pub fn tokenize(text: &str, punctuation: &[char]) -> HashSet<String> {
    let mut cleaned = text.to_lowercase();
    for &ch in punctuation {
        cleaned = cleaned.replace(ch, " ");
    }
    cleaned.split_whitespace().map(str::to_string).collect()
}

/// Jaccard similarity over two token sets: |intersection| / |union|,
/// bounded in [0, 1]. Two empty sets score 0.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Score every record against the search token set and return them sorted
/// descending by score. The sort is stable, so ties keep provider order. The
/// output is a permutation of the input: nothing is dropped here, even
/// zero-score records, because the operator may still want to browse them.
pub fn rank(search: &HashSet<String>, volumes: Vec<Volume>, punctuation: &[char]) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = volumes
        .into_iter()
        .map(|record| {
            let score = response_strings(&record)
                .iter()
                .map(|response| jaccard(search, &tokenize(response, punctuation)))
                .fold(0.0, f64::max);
            Candidate { score, record }
        })
        .collect();
    sort_candidates(&mut candidates);
    candidates
}

/// Re-sort a candidate pool in place, descending by score, stable on ties.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// The three response strings compared against the search term: title alone,
/// title + first author, title + subtitle + first author. Absent fields
/// contribute nothing.
fn response_strings(record: &Volume) -> [String; 3] {
    let title = record.title.as_deref().unwrap_or("");
    let author = record.authors.first().map(String::as_str);
    let subtitle = record.subtitle.as_deref();

    let mut with_author = title.to_string();
    if let Some(author) = author {
        with_author.push(' ');
        with_author.push_str(author);
    }

    let mut full = title.to_string();
    if let Some(subtitle) = subtitle {
        full.push(' ');
        full.push_str(subtitle);
    }
    if let Some(author) = author {
        full.push(' ');
        full.push_str(author);
    }

    [title.to_string(), with_author, full]
}
