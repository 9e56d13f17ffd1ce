use anyhow::Result;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::lookup::{GoogleBooks, MetadataLookup};

/// Image lookup collaborator: a quoted search phrase in, zero or one
/// downloaded image path out. Any failure is "no image".
pub trait ImageLookup: Sync {
    fn fetch(&self, phrase: &str) -> Option<PathBuf>;
}

/// Preference ladder over the provider's image links, largest first.
const IMAGE_SIZES: &[&str] = &["extraLarge", "large", "medium", "small", "thumbnail"];

/// Fetches cover art by searching the volumes endpoint and downloading the
/// best image link of the first record that has one. Downloads land in a
/// scratch directory; the write stage moves them into the library.
pub struct CoverFetcher {
    lookup: GoogleBooks,
    client: reqwest::blocking::Client,
    scratch_dir: PathBuf,
}

impl CoverFetcher {
    pub fn new(scratch_dir: PathBuf) -> Result<Self> {
        Ok(Self {
            lookup: GoogleBooks::new()?,
            client: reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()?,
            scratch_dir,
        })
    }

    /// Empty the scratch directory, creating it if needed. Called before
    /// and after the write stage so stale downloads never leak into a
    /// later run.
    pub fn reset_scratch(&self) -> Result<()> {
        info!("Clearing download directory: {}", self.scratch_dir.display());
        if self.scratch_dir.is_dir() {
            for entry in std::fs::read_dir(&self.scratch_dir)? {
                let path = entry?.path();
                let removed = if path.is_dir() {
                    std::fs::remove_dir_all(&path)
                } else {
                    std::fs::remove_file(&path)
                };
                if let Err(e) = removed {
                    warn!("Failed to delete {}: {}", path.display(), e);
                }
            }
        } else {
            std::fs::create_dir_all(&self.scratch_dir)?;
        }
        Ok(())
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self.client.get(url).send()?;
        if !response.status().is_success() {
            anyhow::bail!("image download returned {}", response.status());
        }
        let bytes = response.bytes()?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, &bytes)?;
        Ok(())
    }
}

impl ImageLookup for CoverFetcher {
    fn fetch(&self, phrase: &str) -> Option<PathBuf> {
        let volumes = match self.lookup.search(phrase) {
            Ok(volumes) => volumes,
            Err(e) => {
                warn!("Image search failed for {}: {}", phrase, e);
                return None;
            }
        };

        let links = volumes.iter().find_map(|v| v.image_links.as_ref())?;
        let url = IMAGE_SIZES.iter().find_map(|size| links.get(*size))?;

        let extension = if url.contains(".png") { "png" } else { "jpg" };
        let dest = self.scratch_dir.join(format!("cover.{}", extension));

        match self.download(url, &dest) {
            Ok(()) => Some(dest),
            Err(e) => {
                warn!("No image downloaded for search term {}: {}", phrase, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_scratch_creates_and_empties() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("downloads");
        let fetcher = CoverFetcher::new(scratch.clone()).unwrap();

        fetcher.reset_scratch().unwrap();
        assert!(scratch.is_dir());

        std::fs::write(scratch.join("stale.jpg"), b"x").unwrap();
        fetcher.reset_scratch().unwrap();
        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
    }
}
