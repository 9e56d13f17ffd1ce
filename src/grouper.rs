//! Clustering of loose input files into candidate books.
//!
//! A single linear pass over the input: each filename is compared, in
//! normalized form, against the representative (first) member of every
//! existing group; exact equality joins the group, otherwise the file seeds
//! a new one. First match wins, so input order affects grouping. Callers
//! pass files in directory order, which keeps sets that arrived together
//! adjacent.

use std::path::PathBuf;

use crate::book::Audiobook;

/// Keyword substrings removed during normalization, in this order. Removal
/// happens after non-letters are stripped, so "Part 1" and "pt_1" both
/// vanish entirely.
const GROUP_KEYWORDS: &[&str] = &["part", "pt", "prt", "chap", "chapt", "chapter", "cpt", "chpt"];

/// Normalize a filename stem for group comparison: lowercase, keep ASCII
/// letters only (digits are stripped too, so differently-numbered parts of
/// one book compare equal), then drop the part/chapter keywords.
fn normalize_for_grouping(stem: &str) -> String {
    let mut letters: String = stem
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase())
        .collect();
    for keyword in GROUP_KEYWORDS {
        letters = letters.replace(keyword, "");
    }
    letters
}

/// Cluster input files into books. Every input path lands in exactly one
/// group; a group's file order is insertion order (part-sorting happens
/// later, once numbering is extracted). Empty input yields an empty Vec.
pub fn group_files(paths: &[PathBuf]) -> Vec<Audiobook> {
    let mut groups: Vec<(String, Vec<PathBuf>)> = Vec::new();

    for path in paths {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let key = normalize_for_grouping(&stem);

        match groups.iter_mut().find(|(rep, _)| *rep == key) {
            Some((_, members)) => members.push(path.clone()),
            None => groups.push((key, vec![path.clone()])),
        }
    }

    groups
        .into_iter()
        .map(|(_, members)| Audiobook::from_files(members))
        .collect()
}
