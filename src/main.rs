mod book;
mod config;
mod grouper;
mod images;
mod library;
mod lookup;
mod normalize;
mod parts;
mod pipeline;
mod ranker;
mod select;
mod tags;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info, warn, LevelFilter};
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use config::Config;
use images::{CoverFetcher, ImageLookup};
use library::{Library, WriteOptions};
use lookup::GoogleBooks;
use parts::PartExtractor;
use pipeline::{RunOptions, Stages};
use select::StdinPrompt;

#[derive(Parser, Debug)]
#[command(
    name = "audiobook-importer",
    version,
    about = "Import audiobooks in directories or files into an organized library"
)]
struct Args {
    /// Files or directories to import.
    input: Vec<PathBuf>,

    /// Delete original audio files after importing.
    #[arg(short, long)]
    delete: bool,

    /// Recurse down through given directories.
    #[arg(short, long)]
    recursive: bool,

    /// Increase output verbosity.
    #[arg(short, long)]
    verbose: bool,

    /// Do not move or edit files.
    #[arg(short = 'u', long)]
    dry_run: bool,

    /// Run in single thread mode.
    #[arg(short, long)]
    single_thread: bool,

    /// Write metadata to a JSON file next to the tracks.
    #[arg(short = 'j', long)]
    write_json: bool,

    /// Skip downloading cover images for book and author.
    #[arg(short = 'i', long)]
    no_images: bool,

    /// Write the book summary to a desc.txt file.
    #[arg(short = 'e', long)]
    write_description: bool,

    /// Log level.
    #[arg(short = 'l', long, value_enum, default_value = "info")]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    fn to_filter(self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warning => LevelFilter::Warn,
            // The log crate has no level above error.
            LogLevel::Error | LogLevel::Critical => LevelFilter::Error,
        }
    }
}

fn has_known_format(path: &Path, formats: &[String]) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .map(|ext| formats.iter().any(|f| f == &ext))
        .unwrap_or(false)
}

/// macOS resource forks ("._foo.mp3") look like audio but aren't.
fn is_hidden_sidecar(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("._"))
        .unwrap_or(false)
}

/// Expand the positional arguments into the flat list of audio files to
/// import. Directory entries are visited in name order so grouping sees a
/// deterministic sequence.
fn collect_input_files(
    inputs: &[PathBuf],
    recurse: bool,
    formats: &[String],
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            if has_known_format(input, formats) && !is_hidden_sidecar(input) {
                files.push(input.clone());
            }
        } else if input.is_dir() {
            if recurse {
                for entry in WalkDir::new(input)
                    .follow_links(true)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                {
                    let path = entry.path();
                    if entry.file_type().is_file()
                        && !is_hidden_sidecar(path)
                        && has_known_format(path, formats)
                    {
                        files.push(path.to_path_buf());
                    }
                }
            } else {
                let mut entries: Vec<PathBuf> = std::fs::read_dir(input)?
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .collect();
                entries.sort();
                for path in entries {
                    if path.is_file() && !is_hidden_sidecar(&path) && has_known_format(&path, formats)
                    {
                        files.push(path);
                    }
                }
            }
        } else {
            return Err(anyhow!("{}: not a file or directory", input.display()));
        }
    }
    Ok(files)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        LevelFilter::Debug
    } else {
        args.log_level.to_filter()
    };
    env_logger::Builder::new().filter_level(filter).init();

    let config = Config::load().unwrap_or_else(|e| {
        warn!("Could not load config ({}); using defaults", e);
        Config::default()
    });

    let files = collect_input_files(
        &args.input,
        config.recurse || args.recursive,
        &config.formats,
    )?;
    if files.is_empty() {
        info!("No audio files to import");
        return Ok(());
    }

    let books = grouper::group_files(&files);
    info!("Grouped {} files into {} books", files.len(), books.len());
    for book in &books {
        debug!("Grouped files:");
        for file in &book.files {
            debug!("    {}", file.path.display());
        }
    }

    let extractor = match config.part_pattern.as_deref() {
        Some(pattern) => PartExtractor::with_pattern(
            Regex::new(pattern).context("invalid part_pattern in config")?,
        ),
        None => PartExtractor::new(),
    };
    let library = Library::new(&config.library_dir)?;
    let fetch_lookup = GoogleBooks::new()?;
    let select_lookup = GoogleBooks::new()?;

    let images = if args.no_images {
        None
    } else {
        let fetcher = CoverFetcher::new(std::env::temp_dir().join("audiobook-importer"))?;
        fetcher.reset_scratch()?;
        Some(fetcher)
    };

    let stages = Stages {
        config: &config,
        extractor: &extractor,
        library: &library,
        fetch_lookup: &fetch_lookup,
        select_lookup: &select_lookup,
        images: images.as_ref().map(|f| f as &dyn ImageLookup),
    };

    let options = RunOptions {
        dry_run: args.dry_run,
        write: WriteOptions {
            delete_originals: config.delete_originals || args.delete,
            write_json: args.write_json,
            write_description: args.write_description,
        },
    };

    let mut prompt = StdinPrompt;
    let aborted = if args.single_thread {
        pipeline::run_single_threaded(books, &stages, &options, &mut prompt)
    } else {
        pipeline::run(books, &stages, &options, &mut prompt)
    };

    if let Some(fetcher) = &images {
        if let Err(e) = fetcher.reset_scratch() {
            warn!("Could not clear download directory: {}", e);
        }
    }

    if aborted {
        info!("Run aborted by operator");
        std::process::exit(130);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formats() -> Vec<String> {
        vec!["mp3".to_string(), "ogg".to_string()]
    }

    #[test]
    fn test_collect_filters_by_format() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.mp3"), b"x").unwrap();
        std::fs::write(tmp.path().join("b.ogg"), b"x").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"x").unwrap();

        let files =
            collect_input_files(&[tmp.path().to_path_buf()], false, &formats()).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_collect_skips_resource_forks() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.mp3"), b"x").unwrap();
        std::fs::write(tmp.path().join("._a.mp3"), b"x").unwrap();

        let files =
            collect_input_files(&[tmp.path().to_path_buf()], false, &formats()).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_collect_recurses_only_when_asked() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(tmp.path().join("top.mp3"), b"x").unwrap();
        std::fs::write(nested.join("deep.mp3"), b"x").unwrap();

        let flat = collect_input_files(&[tmp.path().to_path_buf()], false, &formats()).unwrap();
        assert_eq!(flat.len(), 1);

        let deep = collect_input_files(&[tmp.path().to_path_buf()], true, &formats()).unwrap();
        assert_eq!(deep.len(), 2);
    }

    #[test]
    fn test_collect_rejects_missing_path() {
        let result = collect_input_files(&[PathBuf::from("/no/such/path")], false, &formats());
        assert!(result.is_err());
    }

    #[test]
    fn test_collect_single_file_argument() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("book.mp3");
        std::fs::write(&file, b"x").unwrap();

        let files = collect_input_files(&[file.clone()], false, &formats()).unwrap();
        assert_eq!(files, vec![file]);
    }
}
