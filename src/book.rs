use chrono::{Datelike, NaiveDate};
use log::{debug, info, warn};
use serde_json::json;
use std::path::PathBuf;

use crate::lookup::Volume;
use crate::normalize;
use crate::parts::{Numbering, PartExtractor};
use crate::ranker::Candidate;
use crate::tags;

/// One audio file belonging to a book. The path is fixed until the write
/// stage moves the file; the title is the planned output name and starts as
/// the filename stem.
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub path: PathBuf,
    pub title: String,
    pub numbering: Numbering,
    pub size: u64,
    /// Average bitrate in kb/s, zero when unreadable.
    pub bitrate: u32,
    /// Playing time in seconds, zero when unreadable.
    pub duration: f64,
}

impl AudioFile {
    pub fn new(path: PathBuf) -> Self {
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            title,
            numbering: Numbering::default(),
            size: 0,
            bitrate: 0,
            duration: 0.0,
        }
    }

    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    /// "current_name.mp3 -> Planned Title.mp3" line for the review display.
    pub fn display_rename(&self) -> String {
        let current = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{} -> {}.{}", current, self.title, self.extension())
    }

    pub fn refresh_stats(&mut self) {
        let (size, bitrate, duration) = tags::read_stats(&self.path);
        self.size = size;
        self.bitrate = bitrate;
        self.duration = duration;
    }

    /// Compose the planned output name from the book title and this file's
    /// numbering: "Title - Part 2", "Title - Parts 1-3", "Title - Chapter 4",
    /// with a trailing "- Part k" for the low-level part.
    pub fn set_title(&mut self, book_title: &str) {
        let mut title = book_title.to_string();
        if let Some((start, end)) = self.numbering.high_part {
            if start == end {
                title.push_str(&format!(" - Part {}", start));
            } else {
                title.push_str(&format!(" - Parts {}-{}", start, end));
            }
        }
        if let Some((start, end)) = self.numbering.chapter {
            if start == end {
                title.push_str(&format!(" - Chapter {}", start));
            } else {
                title.push_str(&format!(" - Chapters {}-{}", start, end));
            }
        }
        if let Some(low) = self.numbering.low_part {
            title.push_str(&format!(" - Part {}", low));
        }
        self.title = title;
    }
}

/// Resolved book metadata, written to tags and sidecar files.
#[derive(Debug, Clone, Default)]
pub struct BookMeta {
    pub title: String,
    pub subtitle: String,
    pub author: String,
    pub publisher: String,
    pub genre: String,
    pub date_published: Option<NaiveDate>,
    pub description: String,
    /// ISBN-13 when the provider reports one, otherwise ISBN-10.
    pub isbn: String,
    pub content_rating: String,
    pub aggregate_rating: f64,
}

/// A group of files believed to be one work, moving through the pipeline:
/// created by the grouper, enriched with ranked candidates by the fetch
/// stage, resolved by the selection protocol, then written to the library.
#[derive(Debug, Default)]
pub struct Audiobook {
    pub files: Vec<AudioFile>,
    pub meta: BookMeta,
    pub candidates: Vec<Candidate>,
    pub is_excerpt: bool,
    /// Resolution verdict: only books with this set reach the write stage.
    pub add_to_library: bool,
    /// Overwrite-policy verdict: clear the incumbent directory first.
    pub delete_existing: bool,
    /// Aggregate size in bytes across all files.
    pub size: u64,
    /// Size-weighted average bitrate in kb/s.
    pub bitrate: u32,
    /// Total playing time in seconds.
    pub duration: f64,
    /// Destination directory, set by the write stage.
    pub directory: PathBuf,
}

impl Audiobook {
    pub fn from_files(paths: Vec<PathBuf>) -> Self {
        Self {
            files: paths.into_iter().map(AudioFile::new).collect(),
            ..Default::default()
        }
    }

    /// Add a file unless it is already present or has an unrecognized
    /// extension. Used when absorbing a pre-existing library directory.
    pub fn add_file(&mut self, path: PathBuf, formats: &[String]) {
        if self.files.iter().any(|f| f.path == path) {
            return;
        }
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if formats.iter().any(|f| f == &ext) {
            self.files.push(AudioFile::new(path));
        }
    }

    /// Re-read per-file stats and refresh the aggregates: total size, total
    /// duration, and size-weighted average bitrate.
    pub fn refresh_stats(&mut self) {
        let mut total_size: u64 = 0;
        let mut weighted_bitrate: f64 = 0.0;
        let mut total_duration: f64 = 0.0;

        for file in &mut self.files {
            file.refresh_stats();
            total_size += file.size;
            weighted_bitrate += file.size as f64 * file.bitrate as f64;
            total_duration += file.duration;
        }

        self.size = total_size;
        self.bitrate = if total_size > 0 {
            (weighted_bitrate / total_size as f64).round() as u32
        } else {
            0
        };
        self.duration = total_duration;
    }

    /// Extract numbering for every file and order them by it: high-level
    /// part, then chapter, then low-level part, absent fields first. The
    /// sort is stable, so files without numbering keep insertion order.
    pub fn sort_parts(&mut self, extractor: &PartExtractor) {
        for file in &mut self.files {
            file.numbering = extractor.extract(&file.stem());
        }
        if self.files.len() > 1 && self.files.iter().all(|f| f.numbering.is_empty()) {
            debug!("No numbering recognized; keeping file order as given");
        }
        self.files.sort_by_key(|f| f.numbering);
    }

    /// Fallback title when resolving without a candidate: the first file's
    /// stem with numbering markers removed.
    pub fn default_title(&self, extractor: &PartExtractor) -> String {
        self.files
            .first()
            .map(|f| extractor.strip_markers(&f.stem()))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Unknown Title".to_string())
    }

    /// Copy a selected record's fields into the book metadata.
    pub fn apply_record(&mut self, record: &Volume) {
        self.meta.title = record.title.clone().unwrap_or_default();
        self.meta.subtitle = record.subtitle.clone().unwrap_or_default();
        self.meta.author = record
            .authors
            .first()
            .cloned()
            .unwrap_or_else(|| "Unknown Author".to_string());
        self.meta.publisher = record.publisher.clone().unwrap_or_default();
        self.meta.genre = record.categories.first().cloned().unwrap_or_default();
        self.meta.date_published = record
            .published_date
            .as_deref()
            .and_then(normalize::parse_publish_date);
        self.meta.description = record.description.clone().unwrap_or_default();

        self.meta.isbn.clear();
        for id in &record.industry_identifiers {
            match id.id_type.as_str() {
                "ISBN_13" => self.meta.isbn = id.identifier.clone(),
                "ISBN_10" if self.meta.isbn.is_empty() => {
                    self.meta.isbn = id.identifier.clone();
                }
                "ISBN_10" => {}
                other => warn!("Unexpected ISBN version: {}", other),
            }
        }

        self.meta.content_rating = record.maturity_rating.clone().unwrap_or_default();
        self.meta.aggregate_rating = record.average_rating.unwrap_or(0.0);
        info!("Writing info to audiobook: {}", self.meta.title);
    }

    /// Recompose every file's planned name from the resolved book title.
    pub fn apply_titles(&mut self) {
        let title = self.meta.title.clone();
        for file in &mut self.files {
            file.set_title(&title);
        }
    }

    /// Sidecar metadata document, schema.org-flavored.
    pub fn json_metadata(&self) -> serde_json::Value {
        let alternate_name = if self.meta.subtitle.is_empty() {
            None
        } else {
            Some(format!("{}: {}", self.meta.title, self.meta.subtitle))
        };

        json!({
            "name": self.meta.title,
            "alternateName": alternate_name,
            "author": { "name": self.meta.author },
            "description": self.meta.description,
            "isbn": self.meta.isbn,
            "contentRating": self.meta.content_rating,
            "aggregateRating": self.meta.aggregate_rating,
            "datePublished": self.meta.date_published.map(|d| d.to_string()),
            "genre": self.meta.genre,
            "publisher": { "name": self.meta.publisher },
            "bitrate": self.bitrate,
            "contentSize": self.size,
            "duration": self.duration,
        })
    }

    /// Publication year for tag writing, when a date is known.
    pub fn publication_year(&self) -> Option<u32> {
        self.meta
            .date_published
            .map(|d| d.year())
            .filter(|y| *y > 0)
            .map(|y| y as u32)
    }
}
