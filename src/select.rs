//! Interactive resolution of a book against its ranked candidates.
//!
//! The operator reviews the best candidate and can apply it, browse the
//! rest of the pool, re-run the search with their own terms, enter metadata
//! by hand, skip the book, or abort the whole run. A configured prompt
//! level can auto-resolve confident matches without asking.

use anyhow::Result;
use colored::Colorize;
use log::{info, warn};
use std::io::{self, Write};

use crate::book::{Audiobook, BookMeta};
use crate::config::{Config, PromptLevel};
use crate::lookup::MetadataLookup;
use crate::normalize;
use crate::parts::PartExtractor;
use crate::ranker::{self, Candidate, GOOD_MATCH, MODERATE_MATCH};

/// Terminal outcome of reviewing one book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Metadata resolved; the book's `add_to_library` flag is set.
    Applied,
    /// Book dropped: bad auto-match or operator skip.
    Excluded,
    /// Operator requested a process-wide shutdown. The only fatal path.
    Aborted,
}

/// Source of operator input. The stdin implementation is the production
/// one; tests drive the state machine with a scripted implementation.
pub trait Prompt {
    fn read_line(&mut self, prompt: &str) -> io::Result<String>;
}

pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn read_line(&mut self, prompt: &str) -> io::Result<String> {
        print!("{} ", prompt);
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Apply,
    More,
    Search,
    Manual,
    Skip,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchClass {
    Good,
    Moderate,
    Bad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auto {
    Accept,
    Reject,
    Ask,
}

fn classify(score: f64) -> MatchClass {
    if score >= GOOD_MATCH {
        MatchClass::Good
    } else if score >= MODERATE_MATCH {
        MatchClass::Moderate
    } else {
        MatchClass::Bad
    }
}

fn colored_percent(score: f64) -> String {
    let percent = format!("{:.0}%", score * 100.0);
    match classify(score) {
        MatchClass::Good => percent.green().to_string(),
        MatchClass::Moderate => percent.yellow().to_string(),
        MatchClass::Bad => percent.red().to_string(),
    }
}

pub struct Selector<'a> {
    pub lookup: &'a dyn MetadataLookup,
    pub config: &'a Config,
    pub extractor: &'a PartExtractor,
}

impl Selector<'_> {
    /// Drive the review loop for one book until a terminal state. The pool
    /// head is under review; every non-terminal command re-enters review
    /// with a candidate (possibly none), so the loop never dangles.
    pub fn resolve(&self, book: &mut Audiobook, prompt: &mut dyn Prompt) -> Result<Resolution> {
        let mut current = pop_head(&mut book.candidates);
        println!();
        if book.is_excerpt {
            println!(
                "{}",
                "Filename says excerpt; this is probably not the whole book".yellow()
            );
        }

        loop {
            // Preview the planned filenames against the reviewed candidate.
            if let Some(candidate) = &current {
                if let Some(title) = &candidate.record.title {
                    for file in &mut book.files {
                        file.set_title(title);
                    }
                }
            }

            let auto = match &current {
                Some(candidate) => {
                    let class = classify(candidate.score);
                    let label = match class {
                        MatchClass::Good => "Good".green(),
                        MatchClass::Moderate => "Moderate".yellow(),
                        MatchClass::Bad => "Bad".red(),
                    };
                    println!(
                        "Similarity: {} {}",
                        label,
                        format!("({:.0}%)", candidate.score * 100.0).bold()
                    );
                    match (class, self.config.prompt_level) {
                        (MatchClass::Good, PromptLevel::Never | PromptLevel::Unsure) => {
                            Auto::Accept
                        }
                        (MatchClass::Moderate, PromptLevel::Never) => Auto::Accept,
                        (MatchClass::Bad, PromptLevel::Never) => Auto::Reject,
                        _ => Auto::Ask,
                    }
                }
                None => {
                    println!("{}", "No matches found!".red());
                    Auto::Ask
                }
            };

            if auto == Auto::Reject {
                info!("Match below threshold, not adding to library");
                book.add_to_library = false;
                return Ok(Resolution::Excluded);
            }

            self.print_details(book, current.as_ref());

            if auto == Auto::Accept {
                return self.apply(book, current);
            }

            match self.read_command(prompt)? {
                Command::Apply => return self.apply(book, current),
                Command::More => current = self.browse(book, current, prompt)?,
                Command::Search => current = self.research(book, prompt)?,
                Command::Manual => return self.manual(book, prompt),
                Command::Skip => {
                    info!("Skipping book");
                    book.add_to_library = false;
                    return Ok(Resolution::Excluded);
                }
                Command::Abort => {
                    info!("User aborted program");
                    return Ok(Resolution::Aborted);
                }
            }
        }
    }

    fn print_details(&self, book: &Audiobook, current: Option<&Candidate>) {
        match current {
            Some(candidate) => {
                if let Some(title) = &candidate.record.title {
                    println!("{} {}", "Title:   ".blue(), title);
                }
                if let Some(subtitle) = &candidate.record.subtitle {
                    println!("{} {}", "Subtitle:".blue(), subtitle);
                }
                let author = candidate
                    .record
                    .authors
                    .first()
                    .map(String::as_str)
                    .unwrap_or("Unknown Author");
                println!("{} {}", "Author:  ".blue(), author);
            }
            None => {
                println!("{}", "Title:".blue());
                println!("{}", "Author:".blue());
            }
        }

        println!("{}", "Filenames:".blue());
        for file in &book.files {
            println!("    {}", file.display_rename());
        }
        println!();
    }

    fn read_command(&self, prompt: &mut dyn Prompt) -> Result<Command> {
        loop {
            println!("Is this information correct?");
            println!(
                "{}",
                "Options: [A]pply, [m]ore candidates, [e]nter search, e[n]ter metadata manually, [s]kip, a[b]ort"
                    .yellow()
            );
            let line = prompt.read_line(&"Command:".yellow().to_string())?;
            match line.to_lowercase().as_str() {
                "" | "a" => return Ok(Command::Apply),
                "m" => return Ok(Command::More),
                "e" => return Ok(Command::Search),
                "n" => return Ok(Command::Manual),
                "s" => return Ok(Command::Skip),
                "b" => return Ok(Command::Abort),
                _ => {}
            }
        }
    }

    /// Accept the reviewed candidate, or fall back to the filename-derived
    /// title when there is nothing to accept.
    fn apply(&self, book: &mut Audiobook, current: Option<Candidate>) -> Result<Resolution> {
        info!("Applying selected info");
        match current {
            Some(candidate) => book.apply_record(&candidate.record),
            None => {
                book.meta = BookMeta {
                    title: book.default_title(self.extractor),
                    author: "Unknown Author".to_string(),
                    ..Default::default()
                };
            }
        }
        book.add_to_library = true;
        book.apply_titles();
        Ok(Resolution::Applied)
    }

    /// Show the rest of the pool and let the operator pick by index. The
    /// reviewed candidate is pushed back before the pick, so it stays
    /// recoverable; the pool is then re-sorted. Malformed or out-of-range
    /// input re-prompts and is never fatal.
    fn browse(
        &self,
        book: &mut Audiobook,
        current: Option<Candidate>,
        prompt: &mut dyn Prompt,
    ) -> Result<Option<Candidate>> {
        println!();
        if book.candidates.is_empty() {
            println!("{}\n", "No more matches!".red());
            return Ok(current);
        }

        for (i, candidate) in book.candidates.iter().enumerate() {
            let mut line = format!("{} - {}", i + 1, colored_percent(candidate.score));
            if let Some(title) = &candidate.record.title {
                line.push_str(&format!(" - {}", title));
            }
            if let Some(subtitle) = &candidate.record.subtitle {
                line.push_str(&format!(": {}", subtitle));
            }
            if let Some(author) = candidate.record.authors.first() {
                line.push_str(&format!(" - {}", author));
            }
            println!("{}", line);
        }

        let count = book.candidates.len();
        let selection = loop {
            let line = prompt.read_line(&"\nEnter selection:".yellow().to_string())?;
            match line.parse::<usize>() {
                Ok(n) if (1..=count).contains(&n) => break n,
                _ => println!("{}", format!("Enter number between 1 and {}.", count).red()),
            }
        };

        if let Some(candidate) = current {
            book.candidates.push(candidate);
        }
        let picked = book.candidates.remove(selection - 1);
        ranker::sort_candidates(&mut book.candidates);
        Ok(Some(picked))
    }

    /// Re-run the lookup with operator-supplied terms and review the head of
    /// the fresh pool. A dead provider degrades to an empty pool.
    fn research(&self, book: &mut Audiobook, prompt: &mut dyn Prompt) -> Result<Option<Candidate>> {
        info!("Waiting for user to enter search term");
        println!();
        let title = prompt.read_line(&"Title:".yellow().to_string())?;
        let author = prompt.read_line(&"Author:".yellow().to_string())?;
        println!();

        let query = format!("{} {}", title, author).trim().to_lowercase();
        info!("Trying again with search term: {}", query);

        let volumes = self.lookup.search(&query).unwrap_or_else(|e| {
            warn!("Lookup failed: {}; treating as no matches", e);
            Vec::new()
        });
        let tokens = ranker::tokenize(&query, &self.config.punctuation);
        book.candidates = ranker::rank(&tokens, volumes, &self.config.punctuation);
        Ok(pop_head(&mut book.candidates))
    }

    /// Bypass ranking entirely: the operator supplies every field.
    fn manual(&self, book: &mut Audiobook, prompt: &mut dyn Prompt) -> Result<Resolution> {
        info!("Waiting for user to enter metadata");
        println!();
        book.meta.title = prompt.read_line(&"Title:".yellow().to_string())?;
        book.meta.subtitle = prompt.read_line(&"Subtitle:".yellow().to_string())?;
        book.meta.author = prompt.read_line(&"Author:".yellow().to_string())?;
        book.meta.publisher = prompt.read_line(&"Publisher:".yellow().to_string())?;
        book.meta.genre = prompt.read_line(&"Genre:".yellow().to_string())?;
        let date = prompt.read_line(&"Publish date:".yellow().to_string())?;
        book.meta.date_published = normalize::parse_publish_date(&date);
        book.meta.description = prompt.read_line(&"Description:".yellow().to_string())?;
        book.meta.isbn = prompt.read_line(&"ISBN:".yellow().to_string())?;
        println!();

        book.candidates.clear();
        book.add_to_library = true;
        book.apply_titles();
        Ok(Resolution::Applied)
    }
}

fn pop_head(candidates: &mut Vec<Candidate>) -> Option<Candidate> {
    if candidates.is_empty() {
        None
    } else {
        Some(candidates.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::Volume;
    use std::collections::VecDeque;
    use std::path::PathBuf;

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

    struct FakeLookup {
        volumes: Vec<Volume>,
    }

    impl MetadataLookup for FakeLookup {
        fn search(&self, _query: &str) -> Result<Vec<Volume>> {
            Ok(self.volumes.clone())
        }
    }

    fn volume(title: &str) -> Volume {
        Volume {
            title: Some(title.to_string()),
            authors: vec!["Frank Herbert".to_string()],
            ..Default::default()
        }
    }

    fn candidate(score: f64, title: &str) -> Candidate {
        Candidate {
            score,
            record: volume(title),
        }
    }

    fn test_book(candidates: Vec<Candidate>) -> Audiobook {
        let mut book = Audiobook::from_files(vec![PathBuf::from("Dune Part 1.mp3")]);
        book.candidates = candidates;
        book
    }

    fn config_with(level: PromptLevel) -> Config {
        Config {
            prompt_level: level,
            ..Default::default()
        }
    }

    fn resolve(
        level: PromptLevel,
        book: &mut Audiobook,
        lookup: &FakeLookup,
        script: &[&str],
    ) -> Resolution {
        let config = config_with(level);
        let extractor = PartExtractor::new();
        let selector = Selector {
            lookup,
            config: &config,
            extractor: &extractor,
        };
        let mut prompt = ScriptedPrompt::new(script);
        selector.resolve(book, &mut prompt).unwrap()
    }

    fn no_lookup() -> FakeLookup {
        FakeLookup { volumes: vec![] }
    }

    #[test]
    fn test_good_match_still_prompts_at_always() {
        let mut book = test_book(vec![candidate(0.8, "Dune")]);
        // The empty command is the Apply default; without it the script
        // would be exhausted and resolve would fail.
        let resolution = resolve(PromptLevel::Always, &mut book, &no_lookup(), &[""]);
        assert_eq!(resolution, Resolution::Applied);
        assert!(book.add_to_library);
        assert_eq!(book.meta.title, "Dune");
    }

    #[test]
    fn test_good_match_auto_accepts_at_unsure() {
        let mut book = test_book(vec![candidate(0.8, "Dune")]);
        let resolution = resolve(PromptLevel::Unsure, &mut book, &no_lookup(), &[]);
        assert_eq!(resolution, Resolution::Applied);
        assert!(book.add_to_library);
    }

    #[test]
    fn test_moderate_match_prompts_at_unsure() {
        let mut book = test_book(vec![candidate(0.3, "Dune")]);
        let resolution = resolve(PromptLevel::Unsure, &mut book, &no_lookup(), &["a"]);
        assert_eq!(resolution, Resolution::Applied);
    }

    #[test]
    fn test_moderate_match_auto_accepts_at_never() {
        let mut book = test_book(vec![candidate(0.3, "Dune")]);
        let resolution = resolve(PromptLevel::Never, &mut book, &no_lookup(), &[]);
        assert_eq!(resolution, Resolution::Applied);
    }

    #[test]
    fn test_bad_match_auto_rejected_at_never() {
        let mut book = test_book(vec![candidate(0.1, "Dune")]);
        let resolution = resolve(PromptLevel::Never, &mut book, &no_lookup(), &[]);
        assert_eq!(resolution, Resolution::Excluded);
        assert!(!book.add_to_library);
    }

    #[test]
    fn test_skip_excludes_book() {
        let mut book = test_book(vec![candidate(0.8, "Dune")]);
        let resolution = resolve(PromptLevel::Always, &mut book, &no_lookup(), &["s"]);
        assert_eq!(resolution, Resolution::Excluded);
        assert!(!book.add_to_library);
    }

    #[test]
    fn test_abort_is_terminal() {
        let mut book = test_book(vec![candidate(0.8, "Dune")]);
        let resolution = resolve(PromptLevel::Always, &mut book, &no_lookup(), &["b"]);
        assert_eq!(resolution, Resolution::Aborted);
        assert!(!book.add_to_library);
    }

    #[test]
    fn test_unrecognized_command_reprompts() {
        let mut book = test_book(vec![candidate(0.8, "Dune")]);
        let resolution = resolve(PromptLevel::Always, &mut book, &no_lookup(), &["x", "a"]);
        assert_eq!(resolution, Resolution::Applied);
    }

    #[test]
    fn test_browse_picks_candidate_and_keeps_previous() {
        let mut book = test_book(vec![candidate(0.9, "First"), candidate(0.4, "Second")]);
        // "m" lists the remaining pool (just "Second"); "3" is out of range
        // and re-prompts; "1" picks Second; "a" applies it.
        let resolution = resolve(
            PromptLevel::Always,
            &mut book,
            &no_lookup(),
            &["m", "3", "1", "a"],
        );
        assert_eq!(resolution, Resolution::Applied);
        assert_eq!(book.meta.title, "Second");
        // The head reviewed first was pushed back, not discarded.
        assert_eq!(book.candidates.len(), 1);
        assert_eq!(book.candidates[0].record.title.as_deref(), Some("First"));
    }

    #[test]
    fn test_browse_with_empty_pool_keeps_reviewing() {
        let mut book = test_book(vec![candidate(0.8, "Dune")]);
        let resolution = resolve(PromptLevel::Always, &mut book, &no_lookup(), &["m", "a"]);
        assert_eq!(resolution, Resolution::Applied);
        assert_eq!(book.meta.title, "Dune");
    }

    #[test]
    fn test_empty_pool_apply_falls_back_to_filename() {
        let mut book = test_book(vec![]);
        let resolution = resolve(PromptLevel::Always, &mut book, &no_lookup(), &[""]);
        assert_eq!(resolution, Resolution::Applied);
        assert_eq!(book.meta.title, "Dune");
        assert_eq!(book.meta.author, "Unknown Author");
    }

    #[test]
    fn test_new_search_requeries_lookup() {
        let lookup = FakeLookup {
            volumes: vec![volume("Dune")],
        };
        let mut book = test_book(vec![]);
        let resolution = resolve(
            PromptLevel::Always,
            &mut book,
            &lookup,
            &["e", "dune", "frank herbert", "a"],
        );
        assert_eq!(resolution, Resolution::Applied);
        assert_eq!(book.meta.title, "Dune");
        assert_eq!(book.meta.author, "Frank Herbert");
    }

    #[test]
    fn test_manual_entry_bypasses_ranking() {
        let mut book = test_book(vec![candidate(0.8, "Wrong Book")]);
        let resolution = resolve(
            PromptLevel::Always,
            &mut book,
            &no_lookup(),
            &[
                "n",
                "My Title",
                "My Subtitle",
                "An Author",
                "A Publisher",
                "Fantasy",
                "2001-05-02",
                "A description.",
                "9780000000000",
            ],
        );
        assert_eq!(resolution, Resolution::Applied);
        assert_eq!(book.meta.title, "My Title");
        assert_eq!(book.meta.author, "An Author");
        assert_eq!(
            book.meta.date_published,
            chrono::NaiveDate::from_ymd_opt(2001, 5, 2)
        );
        assert!(book.candidates.is_empty());
        assert!(book.add_to_library);
    }

    #[test]
    fn test_applied_book_gets_numbered_file_titles() {
        let mut book = test_book(vec![candidate(0.8, "Dune")]);
        book.sort_parts(&PartExtractor::new());
        resolve(PromptLevel::Unsure, &mut book, &no_lookup(), &[]);
        assert_eq!(book.files[0].title, "Dune - Part 1");
    }
}
