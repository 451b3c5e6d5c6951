use cinesort_core::genre::{GENRE_UNDETECTED, SUPPORTED_GENRES};
use cinesort_core::prompt::{AmbiguityReason, Choice, Decision, DisambiguationRequest, Prompter};
use colored::*;
use console::Term;
use std::io;
use std::path::Path;
use tracing::error;

/// Interactive prompter on the controlling terminal.
pub struct TerminalPrompter {
    term: Term,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        TerminalPrompter {
            term: Term::stderr(),
        }
    }

    fn ask(&self, prompt: &str) -> io::Result<String> {
        self.term.write_str(&format!("{} ", prompt))?;
        Ok(self.term.read_line()?.trim().to_string())
    }

    fn ask_disambiguation(&self, request: &DisambiguationRequest<'_>) -> io::Result<Choice> {
        let reason = match request.reason {
            AmbiguityReason::EmptyTitle => "no title could be read from the file name",
            AmbiguityReason::NoCandidates => "no match found",
            AmbiguityReason::LowScore => "best match is uncertain",
            AmbiguityReason::CloseScores => "several matches score alike",
        };
        self.term.write_line("")?;
        self.term.write_line(&format!(
            "{} {} ({})",
            "?".yellow().bold(),
            request.file_name.bold(),
            reason
        ))?;
        if !request.query.is_empty() {
            let year = request.year.map(|y| format!(" ({})", y)).unwrap_or_default();
            self.term
                .write_line(&format!("  searched: {}{}", request.query.cyan(), year))?;
        }
        for (i, scored) in request.candidates.iter().enumerate() {
            let c = &scored.candidate;
            let year = c.year.map(|y| y.to_string()).unwrap_or_else(|| "?".to_string());
            let original = c
                .original_title
                .as_deref()
                .filter(|o| *o != c.title)
                .map(|o| format!(" / {}", o))
                .unwrap_or_default();
            self.term.write_line(&format!(
                "  {:>2}. {} ({}){} {}",
                i + 1,
                c.title.green(),
                year,
                original,
                format!("[{:.2}]", scored.score).dimmed()
            ))?;
        }

        loop {
            let answer = self.ask("Number, (m)anual title, (r)etry search, (s)kip, (q)uit:")?;
            match answer.to_lowercase().as_str() {
                "s" | "" => return Ok(Choice::Skip),
                "q" => return Ok(Choice::Abort),
                "r" => {
                    let query = self.ask("New search:")?;
                    if !query.is_empty() {
                        return Ok(Choice::Retry(query));
                    }
                }
                "m" => return self.ask_manual(),
                n => match n.parse::<usize>() {
                    Ok(n) if n >= 1 && n <= request.candidates.len() => {
                        return Ok(Choice::Candidate(n - 1))
                    }
                    _ => self.term.write_line(&"Invalid choice".red().to_string())?,
                },
            }
        }
    }

    fn ask_manual(&self) -> io::Result<Choice> {
        let title = self.ask("Title:")?;
        if title.is_empty() {
            return Ok(Choice::Skip);
        }
        let year = self.ask("Year (empty if unknown):")?.parse::<u16>().ok();
        for (i, genre) in SUPPORTED_GENRES.iter().enumerate() {
            self.term.write_line(&format!("  {:>2}. {}", i + 1, genre))?;
        }
        let genre = self
            .ask(&format!("Genre number (empty for {}):", GENRE_UNDETECTED))?
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| SUPPORTED_GENRES.get(i))
            .map(|g| g.to_string());
        Ok(Choice::Manual { title, year, genre })
    }

    fn ask_similar(&self, new_file: &Path, existing: &Path) -> io::Result<Decision> {
        self.term.write_line("")?;
        self.term.write_line(&format!(
            "{} Similar file already in the archive",
            "!".yellow().bold()
        ))?;
        self.term
            .write_line(&format!("  new:      {}", new_file.display().to_string().green()))?;
        self.term
            .write_line(&format!("  existing: {}", existing.display().to_string().cyan()))?;
        loop {
            let answer = self.ask("(k)eep both, (r)eplace, (s)kip, (q)uit:")?;
            match answer.to_lowercase().as_str() {
                "k" => return Ok(Decision::KeepBoth),
                "r" => return Ok(Decision::Replace),
                "s" | "" => return Ok(Decision::Skip),
                "q" => return Ok(Decision::Abort),
                _ => self.term.write_line(&"Invalid choice".red().to_string())?,
            }
        }
    }
}

impl Prompter for TerminalPrompter {
    fn disambiguate(&mut self, request: &DisambiguationRequest<'_>) -> Choice {
        self.ask_disambiguation(request).unwrap_or_else(|e| {
            error!("Terminal input failed, skipping {}: {}", request.file_name, e);
            Choice::Skip
        })
    }

    fn confirm_similar(&mut self, new_file: &Path, existing: &Path) -> Decision {
        self.ask_similar(new_file, existing).unwrap_or_else(|e| {
            error!("Terminal input failed, skipping {}: {}", new_file.display(), e);
            Decision::Skip
        })
    }
}
