use anyhow::{anyhow, Result};
use colored::Colorize;
use log::{info, warn};
use std::path::{Path, PathBuf};

use crate::book::Audiobook;
use crate::config::{Config, OverwritePolicy};
use crate::images::ImageLookup;
use crate::normalize;
use crate::select::Prompt;
use crate::tags;

/// Characters that cannot appear in directory or file names.
const INVALID_PATH_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !INVALID_PATH_CHARS.contains(c))
        .collect();
    let trimmed = cleaned.trim().trim_matches('.').trim();
    if trimmed.is_empty() {
        "Unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Move files into the library instead of copying them.
    pub delete_originals: bool,
    /// Write a <title>.json metadata sidecar next to the tracks.
    pub write_json: bool,
    /// Write the description to desc.txt for players that read it.
    pub write_description: bool,
}

/// The organized library: `base_dir/author/title/{tracks, cover, sidecars}`.
pub struct Library {
    base_dir: PathBuf,
}

impl Library {
    pub fn new(base_dir: &Path) -> Result<Self> {
        if base_dir.exists() && !base_dir.is_dir() {
            return Err(anyhow!("{}: not a valid directory", base_dir.display()));
        }
        std::fs::create_dir_all(base_dir)?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
        })
    }

    pub fn book_dir(&self, book: &Audiobook) -> PathBuf {
        self.base_dir
            .join(sanitize_component(&book.meta.author))
            .join(sanitize_component(&book.meta.title))
    }

    /// Apply the overwrite policy against a pre-existing copy of this book.
    /// Sets `delete_existing` / `add_to_library` on the incoming book.
    /// Returns true when the operator chose to abort the run.
    pub fn check_existing(
        &self,
        book: &mut Audiobook,
        config: &Config,
        prompt: &mut dyn Prompt,
    ) -> Result<bool> {
        let dir = self.book_dir(book);
        if !dir.is_dir() {
            return Ok(false);
        }

        let mut existing = Audiobook::default();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() {
                existing.add_file(path, &config.formats);
            }
        }
        existing.refresh_stats();

        match config.overwrite {
            OverwritePolicy::Bitrate => {
                if book.bitrate > existing.bitrate {
                    book.delete_existing = true;
                }
            }
            OverwritePolicy::Size => {
                if book.size > existing.size {
                    book.delete_existing = true;
                }
            }
            OverwritePolicy::Always => book.delete_existing = true,
            OverwritePolicy::Never => book.add_to_library = false,
            OverwritePolicy::Prompt => {
                return self.prompt_overwrite(book, &existing, prompt);
            }
        }
        Ok(false)
    }

    fn prompt_overwrite(
        &self,
        book: &mut Audiobook,
        existing: &Audiobook,
        prompt: &mut dyn Prompt,
    ) -> Result<bool> {
        println!();
        println!("Book already exists in library.");
        println!("{}", "Existing book:".green());
        for file in &existing.files {
            if let Some(name) = file.path.file_name() {
                println!("    {}", name.to_string_lossy());
            }
        }
        print_book_stats(existing);

        println!();
        println!("{}", "New book:".green());
        for file in &book.files {
            println!("    {}.{}", file.title, file.extension());
        }
        print_book_stats(book);

        loop {
            println!();
            println!(
                "{}",
                "Options: [A]dd new book, [k]eep old book, [m]erge books, a[b]ort".yellow()
            );
            let line = prompt.read_line(&"Command:".yellow().to_string())?;
            match line.to_lowercase().as_str() {
                "" | "a" => {
                    book.delete_existing = true;
                    return Ok(false);
                }
                "k" => {
                    book.add_to_library = false;
                    return Ok(false);
                }
                "m" => {
                    book.delete_existing = false;
                    return Ok(false);
                }
                "b" => {
                    info!("User aborted program");
                    return Ok(true);
                }
                _ => {}
            }
        }
    }

    /// Move the book into the library: place the files (collision names get
    /// a numeric suffix), absorb anything already in the directory, place
    /// the cover, write tags and sidecars.
    pub fn add_book(
        &self,
        book: &mut Audiobook,
        config: &Config,
        options: &WriteOptions,
        images: Option<&dyn ImageLookup>,
    ) -> Result<()> {
        let cover = images.and_then(|i| {
            info!("Getting image for book: {}", book.meta.title);
            i.fetch(&format!("\"{}\" audiobook", book.meta.title))
        });

        let author_dir = self.base_dir.join(sanitize_component(&book.meta.author));
        if !author_dir.is_dir() {
            std::fs::create_dir_all(&author_dir)?;
            // A brand-new author gets a portrait, named "folder" so library
            // players pick it up.
            if let Some(images) = images {
                info!("Getting image for author: {}", book.meta.author);
                if let Some(image) = images.fetch(&format!("\"{}\" author", book.meta.author)) {
                    let ext = image_extension(&image);
                    let dest = author_dir.join(format!("folder.{}", ext));
                    if let Err(e) = move_file(&image, &dest) {
                        warn!("Could not place author image: {}", e);
                    }
                }
            }
        }

        let book_dir = author_dir.join(sanitize_component(&book.meta.title));
        std::fs::create_dir_all(&book_dir)?;
        book.directory = book_dir.clone();

        if book.delete_existing {
            for entry in std::fs::read_dir(&book_dir)? {
                let path = entry?.path();
                if path.is_file() {
                    std::fs::remove_file(&path)?;
                }
            }
        }

        for file in &mut book.files {
            let ext = file.extension();
            let base = sanitize_component(&file.title);
            let mut dest = book_dir.join(format!("{}.{}", base, ext));
            // Same name already present: keep both.
            let mut n = 1;
            while dest.exists() {
                dest = book_dir.join(format!("{} {}.{}", base, n, ext));
                n += 1;
            }

            if options.delete_originals {
                info!("Moving file: {}", file.path.display());
                info!("Destination: {}", dest.display());
                move_file(&file.path, &dest)?;
            } else {
                info!("Copying file: {}", file.path.display());
                info!("Destination: {}", dest.display());
                std::fs::copy(&file.path, &dest)?;
            }
            file.path = dest;
        }

        // Pick up whatever else already lives here (merge case) so tags and
        // stats cover the whole directory.
        for entry in std::fs::read_dir(&book_dir)? {
            let path = entry?.path();
            if path.is_file() {
                book.add_file(path, &config.formats);
            }
        }

        if let Some(cover_path) = cover {
            let ext = image_extension(&cover_path);
            let dest = book_dir.join(format!("cover.{}", ext));
            if let Err(e) = move_file(&cover_path, &dest) {
                warn!("Could not place cover image: {}", e);
            }
        }

        tags::write_book_tags(book)?;
        book.refresh_stats();

        if options.write_json {
            let sidecar = book_dir.join(format!("{}.json", sanitize_component(&book.meta.title)));
            std::fs::write(&sidecar, serde_json::to_string_pretty(&book.json_metadata())?)?;
        }
        if options.write_description {
            std::fs::write(book_dir.join("desc.txt"), &book.meta.description)?;
        }

        Ok(())
    }
}

fn print_book_stats(book: &Audiobook) {
    println!(
        "    {} {} Kb/s",
        "Bitrate:".blue(),
        book.bitrate
    );
    println!(
        "    {} {} MB",
        "Size:   ".blue(),
        book.size / 1_000_000
    );
    println!(
        "    {} {}",
        "Length: ".blue(),
        normalize::format_duration(book.duration)
    );
}

fn image_extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "jpg".to_string())
}

/// Rename when possible, copy-and-remove across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to)?;
    std::fs::remove_file(from)?;
    Ok(())
}
