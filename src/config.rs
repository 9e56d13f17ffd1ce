use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How much operator confirmation is required before a match is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptLevel {
    /// Never prompt: good and moderate matches are imported, bad matches
    /// are rejected.
    Never,
    /// Prompt only when unsure: good matches are imported without asking.
    Unsure,
    /// Always prompt, no matter how confident the match.
    #[default]
    Always,
}

/// What to do when an imported book already exists in the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    /// Always replace the incumbent.
    Always,
    /// Always keep the incumbent; the import is dropped.
    Never,
    /// Replace when the new book is larger.
    Size,
    /// Replace when the new book has a higher average bitrate.
    #[default]
    Bitrate,
    /// Ask the operator: add, keep, merge, or abort.
    Prompt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Library root: books land under library_dir/author/title/.
    pub library_dir: PathBuf,
    /// Delete original files after importing (move instead of copy).
    pub delete_originals: bool,
    /// Recurse into subdirectories of directory arguments.
    pub recurse: bool,
    pub prompt_level: PromptLevel,
    pub overwrite: OverwritePolicy,
    /// Extensions treated as audiobook tracks.
    pub formats: Vec<String>,
    /// Words that tend to appear in file names but don't describe the book;
    /// they would only pollute lookup queries.
    pub junk_words: Vec<String>,
    /// Characters flattened to spaces before tokenizing. '&' is kept, it is
    /// sometimes meaningful in titles.
    pub punctuation: Vec<char>,
    /// Replacement numbering grammar for the part extractor. The built-in
    /// branches are a heuristic; a library with unusual naming can override
    /// them here, keeping the same named capture groups.
    pub part_pattern: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            library_dir: dirs::audio_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("Audiobooks"),
            delete_originals: false,
            recurse: false,
            prompt_level: PromptLevel::Always,
            overwrite: OverwritePolicy::Bitrate,
            formats: ["ogg", "flac", "mp3", "opus", "m4a", "m4b", "mp4"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            junk_words: [
                "audiobooks",
                "audiobook",
                "audio",
                "book",
                " by ",
                "narrated",
                "full",
                "complete",
                "hd",
                "abridged",
                "unabridged",
                "subtitles",
                "mp3",
                "m4a",
                "m4b",
                "wav",
                "free",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            punctuation: vec![
                '~', '`', '\'', '@', '$', '%', '^', '*', '=', '<', '>', '(', ')', '[', ']', '{',
                '}', '"', '|', '\\', '+', '-', ':', '#', '/', '!', '?', ',', '.', '_',
            ],
            part_pattern: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            // First run: write the defaults so the operator has a file to
            // edit.
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not find config directory"))?;
        Ok(config_dir.join("audiobook-importer").join("config.json"))
    }
}
