use anyhow::Result;
use log::{error, info, warn};
use std::path::Path;

use crate::book::{AudioFile, Audiobook};

/// Read (size, bitrate kb/s, duration secs) for a file. Unreadable files
/// degrade to zeros rather than failing the book.
pub fn read_stats(path: &Path) -> (u64, u32, f64) {
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    use lofty::prelude::*;
    use lofty::probe::Probe;

    let probed = Probe::open(path).and_then(|p| p.read());
    match probed {
        Ok(tagged_file) => {
            let properties = tagged_file.properties();
            (
                size,
                properties.audio_bitrate().unwrap_or(0),
                properties.duration().as_secs_f64(),
            )
        }
        Err(e) => {
            warn!("Could not read audio properties of {}: {}", path.display(), e);
            (size, 0, 0.0)
        }
    }
}

/// Write resolved metadata into every file of the book, one tag write per
/// file, track numbers 1-based in part order. A file that cannot be tagged
/// is logged and skipped; the rest of the book still gets written.
pub fn write_book_tags(book: &Audiobook) -> Result<()> {
    for (index, file) in book.files.iter().enumerate() {
        let track = index + 1;
        info!("Writing tags: {}", file.path.display());

        let result = match file.extension().as_str() {
            // The MP4 container family uses its own canonical atom keys
            "m4a" | "m4b" | "mp4" => write_mp4_tags(file, book, track),
            _ => write_standard_tags(file, book, track),
        };

        if let Err(e) = result {
            error!("Could not write tags to {}: {}", file.path.display(), e);
        }
    }
    Ok(())
}

/// Generic mapping for mp3/flac/ogg/opus via lofty.
fn write_standard_tags(file: &AudioFile, book: &Audiobook, track: usize) -> Result<()> {
    use lofty::prelude::*;
    use lofty::probe::Probe;
    use lofty::tag::Tag;

    let mut tagged_file = Probe::open(&file.path)?.read()?;

    let tag = if let Some(t) = tagged_file.primary_tag_mut() {
        t
    } else {
        let tag_type = tagged_file.primary_tag_type();
        tagged_file.insert_tag(Tag::new(tag_type));
        tagged_file.primary_tag_mut().unwrap()
    };

    tag.set_title(file.title.clone());
    if !book.meta.title.is_empty() {
        tag.set_album(book.meta.title.clone());
    }
    if !book.meta.author.is_empty() {
        tag.set_artist(book.meta.author.clone());
    }
    if let Some(year) = book.publication_year() {
        tag.set_year(year);
    }
    if !book.meta.genre.is_empty() {
        tag.set_genre(book.meta.genre.clone());
    }
    if !book.meta.description.is_empty() {
        tag.set_comment(book.meta.description.clone());
    }
    tag.set_track(track as u32);

    tagged_file.save_to_path(&file.path, lofty::config::WriteOptions::default())?;
    Ok(())
}

/// MP4 atom mapping for m4a/m4b/mp4 via mp4ameta.
fn write_mp4_tags(file: &AudioFile, book: &Audiobook, track: usize) -> Result<()> {
    use mp4ameta::Tag;

    let mut tag = Tag::read_from_path(&file.path).unwrap_or_else(|_| Tag::default());

    tag.set_title(&file.title);
    if !book.meta.title.is_empty() {
        tag.set_album(&book.meta.title);
    }
    if !book.meta.author.is_empty() {
        tag.set_artist(&book.meta.author);
        tag.set_album_artist(&book.meta.author);
    }
    if let Some(year) = book.publication_year() {
        tag.set_year(year.to_string());
    }
    if !book.meta.genre.is_empty() {
        tag.set_genre(&book.meta.genre);
    }
    if !book.meta.description.is_empty() {
        tag.set_comment(&book.meta.description);
    }
    tag.set_track_number(track as u16);

    tag.write_to_path(&file.path)?;
    Ok(())
}
