//! The three-stage import pipeline: fetch -> select -> write.
//!
//! Stages run on their own threads, connected by two bounded channels
//! carrying whole books; a closed channel is the "no more work" sentinel.
//! The select stage blocks on operator input, which is the single
//! intentional blocking point of the design. Fetch runs ahead and buffers
//! lookups into the first channel; write drains the second concurrently so
//! file I/O overlaps with the interaction.
//!
//! Abort is cooperative: the select stage sets a shared stop flag and
//! returns without forwarding the book under review. Fetch observes the
//! flag between items (an in-flight lookup completes), write finishes the
//! fully-resolved books already handed to it, and everything exits. Nothing
//! half-resolved ever reaches the write stage.

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{error, info, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::book::Audiobook;
use crate::config::Config;
use crate::images::ImageLookup;
use crate::library::{Library, WriteOptions};
use crate::lookup::MetadataLookup;
use crate::normalize;
use crate::parts::PartExtractor;
use crate::ranker;
use crate::select::{Prompt, Resolution, Selector};

/// Hand-off depth per channel. Small on purpose: fetch should stay a little
/// ahead of the operator, not race through every lookup up front.
const CHANNEL_DEPTH: usize = 4;

pub struct RunOptions {
    pub dry_run: bool,
    pub write: WriteOptions,
}

/// Everything the stages share. Lookup handles are per-stage so the fetch
/// thread and the interactive re-search never contend on one client.
pub struct Stages<'a> {
    pub config: &'a Config,
    pub extractor: &'a PartExtractor,
    pub library: &'a Library,
    pub fetch_lookup: &'a dyn MetadataLookup,
    pub select_lookup: &'a dyn MetadataLookup,
    pub images: Option<&'a dyn ImageLookup>,
}

/// Fetch-stage work for one book: stats, part ordering, search term,
/// lookup, ranking. Lookup failure degrades to zero candidates.
pub fn fetch_info(book: &mut Audiobook, stages: &Stages) {
    book.refresh_stats();
    book.sort_parts(stages.extractor);

    let stem = match book.files.first() {
        Some(file) => file.stem(),
        None => return,
    };
    let (term, is_excerpt) = normalize::clean_search_term(
        &stem,
        stages.extractor,
        &stages.config.junk_words,
        &stages.config.punctuation,
    );
    book.is_excerpt = is_excerpt;

    info!("Fetching info for search term: {}", term);
    let volumes = stages.fetch_volumes(&term);
    let tokens: HashSet<String> = term.split_whitespace().map(str::to_string).collect();
    book.candidates = ranker::rank(&tokens, volumes, &stages.config.punctuation);
    info!("{} candidates for search term: {}", book.candidates.len(), term);
}

impl Stages<'_> {
    fn fetch_volumes(&self, term: &str) -> Vec<crate::lookup::Volume> {
        self.fetch_lookup.search(term).unwrap_or_else(|e| {
            warn!("Lookup failed: {}; treating as no matches", e);
            Vec::new()
        })
    }
}

/// Select-stage work for one book. Returns false when the operator aborted.
fn select_book(
    book: &mut Audiobook,
    stages: &Stages,
    options: &RunOptions,
    prompt: &mut dyn Prompt,
) -> bool {
    let selector = Selector {
        lookup: stages.select_lookup,
        config: stages.config,
        extractor: stages.extractor,
    };
    match selector.resolve(book, prompt) {
        Ok(Resolution::Aborted) => return false,
        Ok(Resolution::Excluded) => {
            info!("Book not valid, not adding to library");
        }
        Ok(Resolution::Applied) => {
            if book.add_to_library {
                match stages.library.check_existing(book, stages.config, prompt) {
                    Ok(true) => return false,
                    Ok(false) => {}
                    Err(e) => error!("Could not inspect existing book: {}", e),
                }
            }
            if options.dry_run {
                info!("Dry-run mode, not adding to library");
                book.add_to_library = false;
            }
        }
        Err(e) => {
            // Losing operator input is indistinguishable from an abort.
            error!("Selection failed: {}", e);
            return false;
        }
    }
    true
}

fn write_book(book: &mut Audiobook, stages: &Stages, options: &RunOptions) {
    match stages
        .library
        .add_book(book, stages.config, &options.write, stages.images)
    {
        Ok(()) => info!(
            "Added '{}' to {}",
            book.meta.title,
            book.directory.display()
        ),
        Err(e) => error!("Failed to add '{}' to library: {}", book.meta.title, e),
    }
}

/// Run the three stages concurrently. Returns true if the run was aborted.
pub fn run(
    books: Vec<Audiobook>,
    stages: &Stages,
    options: &RunOptions,
    prompt: &mut dyn Prompt,
) -> bool {
    let stop = Arc::new(AtomicBool::new(false));
    let (fetch_tx, fetch_rx): (Sender<Audiobook>, Receiver<Audiobook>) = bounded(CHANNEL_DEPTH);
    let (write_tx, write_rx): (Sender<Audiobook>, Receiver<Audiobook>) = bounded(CHANNEL_DEPTH);

    info!("Starting worker threads");
    thread::scope(|scope| {
        let fetch_stop = Arc::clone(&stop);
        scope.spawn(move || {
            for mut book in books {
                if fetch_stop.load(Ordering::SeqCst) {
                    break;
                }
                fetch_info(&mut book, stages);
                // A closed channel means the select stage is gone; stop.
                if fetch_tx.send(book).is_err() {
                    break;
                }
            }
        });

        scope.spawn(move || {
            // Drain until the select stage drops its sender. Books here are
            // fully resolved, so they are finished even after an abort.
            for mut book in write_rx.iter() {
                write_book(&mut book, stages, options);
            }
        });

        // The interactive stage runs on the caller's thread.
        for mut book in fetch_rx.iter() {
            if !select_book(&mut book, stages, options, prompt) {
                stop.store(true, Ordering::SeqCst);
                break;
            }
            if book.add_to_library {
                if write_tx.send(book).is_err() {
                    break;
                }
            }
        }
        // Unblock a fetch thread parked on a full channel after an abort,
        // and signal the write stage that no more books are coming.
        drop(fetch_rx);
        drop(write_tx);
    });

    stop.load(Ordering::SeqCst)
}

/// Run the same three stages sequentially, one book at a time, with
/// identical semantics. Returns true if the run was aborted.
pub fn run_single_threaded(
    books: Vec<Audiobook>,
    stages: &Stages,
    options: &RunOptions,
    prompt: &mut dyn Prompt,
) -> bool {
    info!("Running in single-thread mode");
    let total = books.len();
    for (i, mut book) in books.into_iter().enumerate() {
        info!("Fetching info for book {} of {}", i + 1, total);
        fetch_info(&mut book, stages);

        info!("Prompting user for correct info");
        if !select_book(&mut book, stages, options, prompt) {
            return true;
        }

        if book.add_to_library {
            info!("Adding book {} of {} to library", i + 1, total);
            write_book(&mut book, stages, options);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PromptLevel;
    use crate::lookup::Volume;
    use anyhow::Result;
    use std::collections::VecDeque;
    use std::io;
    use std::path::{Path, PathBuf};

    struct ScriptedPrompt {
        lines: VecDeque<String>,
    }

    impl ScriptedPrompt {
        fn new(lines: &[&str]) -> Self {
            Self {
                lines: lines.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    impl Prompt for ScriptedPrompt {
        fn read_line(&mut self, _prompt: &str) -> io::Result<String> {
            self.lines
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"))
        }
    }

    struct FakeLookup;

    impl MetadataLookup for FakeLookup {
        fn search(&self, query: &str) -> Result<Vec<Volume>> {
            // One plausible record per query, titled after the query.
            Ok(vec![Volume {
                title: Some(query.to_string()),
                authors: vec!["Test Author".to_string()],
                ..Default::default()
            }])
        }
    }

    struct FailingLookup;

    impl MetadataLookup for FailingLookup {
        fn search(&self, _query: &str) -> Result<Vec<Volume>> {
            anyhow::bail!("provider unreachable")
        }
    }

    fn staged_books(dir: &Path, stems: &[&str]) -> Vec<Audiobook> {
        stems
            .iter()
            .map(|stem| {
                let path = dir.join(format!("{}.mp3", stem));
                std::fs::write(&path, b"fake audio").unwrap();
                Audiobook::from_files(vec![path])
            })
            .collect()
    }

    fn book_dirs(library_root: &Path) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if let Ok(entries) = std::fs::read_dir(library_root) {
            for author in entries.flatten() {
                if author.path().is_dir() {
                    for book in std::fs::read_dir(author.path()).unwrap().flatten() {
                        dirs.push(book.path());
                    }
                }
            }
        }
        dirs
    }

    struct Harness {
        config: Config,
        extractor: PartExtractor,
        library: Library,
        lookup: FakeLookup,
    }

    impl Harness {
        fn new(library_root: &Path, prompt_level: PromptLevel) -> Self {
            Self {
                config: Config {
                    prompt_level,
                    ..Default::default()
                },
                extractor: PartExtractor::new(),
                library: Library::new(library_root).unwrap(),
                lookup: FakeLookup,
            }
        }

        fn stages(&self) -> Stages<'_> {
            Stages {
                config: &self.config,
                extractor: &self.extractor,
                library: &self.library,
                fetch_lookup: &self.lookup,
                select_lookup: &self.lookup,
                images: None,
            }
        }
    }

    fn options() -> RunOptions {
        RunOptions {
            dry_run: false,
            write: WriteOptions::default(),
        }
    }

    #[test]
    fn test_fetch_info_ranks_candidates() {
        let tmp = tempfile::tempdir().unwrap();
        let harness = Harness::new(&tmp.path().join("lib"), PromptLevel::Always);
        let mut books = staged_books(tmp.path(), &["dune frank herbert"]);

        fetch_info(&mut books[0], &harness.stages());
        assert_eq!(books[0].candidates.len(), 1);
        assert!(books[0].candidates[0].score > 0.9);
    }

    #[test]
    fn test_fetch_info_lookup_failure_means_zero_candidates() {
        let tmp = tempfile::tempdir().unwrap();
        let harness = Harness::new(&tmp.path().join("lib"), PromptLevel::Always);
        let failing = FailingLookup;
        let stages = Stages {
            fetch_lookup: &failing,
            ..harness.stages()
        };
        let mut books = staged_books(tmp.path(), &["dune"]);

        fetch_info(&mut books[0], &stages);
        assert!(books[0].candidates.is_empty());
    }

    #[test]
    fn test_single_threaded_imports_accepted_books() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("lib");
        let harness = Harness::new(&root, PromptLevel::Unsure);
        let books = staged_books(tmp.path(), &["dune", "emma"]);

        // Unsure prompt level auto-accepts the perfect fake matches.
        let mut prompt = ScriptedPrompt::new(&[]);
        let aborted = run_single_threaded(books, &harness.stages(), &options(), &mut prompt);

        assert!(!aborted);
        assert_eq!(book_dirs(&root).len(), 2);
    }

    #[test]
    fn test_abort_stops_later_books_single_threaded() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("lib");
        let harness = Harness::new(&root, PromptLevel::Always);
        let books = staged_books(tmp.path(), &["dune", "emma", "walden"]);

        // Abort on the very first review; two more books are queued.
        let mut prompt = ScriptedPrompt::new(&["b"]);
        let aborted = run_single_threaded(books, &harness.stages(), &options(), &mut prompt);

        assert!(aborted);
        assert!(book_dirs(&root).is_empty());
    }

    #[test]
    fn test_threaded_run_imports_books() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("lib");
        let harness = Harness::new(&root, PromptLevel::Unsure);
        let books = staged_books(tmp.path(), &["dune", "emma"]);

        let mut prompt = ScriptedPrompt::new(&[]);
        let aborted = run(books, &harness.stages(), &options(), &mut prompt);

        assert!(!aborted);
        assert_eq!(book_dirs(&root).len(), 2);
    }

    #[test]
    fn test_threaded_abort_keeps_queued_books_out_of_library() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("lib");
        let harness = Harness::new(&root, PromptLevel::Always);
        let books = staged_books(tmp.path(), &["dune", "emma", "walden"]);

        let mut prompt = ScriptedPrompt::new(&["b"]);
        let aborted = run(books, &harness.stages(), &options(), &mut prompt);

        assert!(aborted);
        assert!(book_dirs(&root).is_empty());
    }

    #[test]
    fn test_dry_run_never_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("lib");
        let harness = Harness::new(&root, PromptLevel::Unsure);
        let books = staged_books(tmp.path(), &["dune"]);

        let run_options = RunOptions {
            dry_run: true,
            write: WriteOptions::default(),
        };
        let mut prompt = ScriptedPrompt::new(&[]);
        let aborted = run_single_threaded(books, &harness.stages(), &run_options, &mut prompt);

        assert!(!aborted);
        assert!(book_dirs(&root).is_empty());
    }

    #[test]
    fn test_threaded_run_covers_every_book() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("lib");
        let harness = Harness::new(&root, PromptLevel::Unsure);
        let books = staged_books(tmp.path(), &["alpha", "beta", "gamma"]);

        let mut prompt = ScriptedPrompt::new(&[]);
        let aborted = run(books, &harness.stages(), &options(), &mut prompt);
        assert!(!aborted);

        let mut names: Vec<String> = book_dirs(&root)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    }
}
