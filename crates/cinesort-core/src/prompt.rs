use std::path::Path;
use tracing::debug;

use crate::model::{MediaKind, ScoredCandidate};

/// Why the resolver stopped to ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbiguityReason {
    EmptyTitle,
    NoCandidates,
    LowScore,
    CloseScores,
}

/// Everything the operator needs to pick a match for one file.
#[derive(Debug, Clone)]
pub struct DisambiguationRequest<'a> {
    pub file_name: &'a str,
    pub query: &'a str,
    pub year: Option<u16>,
    pub media_kind: MediaKind,
    /// Ranked best first.
    pub candidates: &'a [ScoredCandidate],
    pub reason: AmbiguityReason,
}

/// Operator answer to a disambiguation request.
#[derive(Debug, Clone, PartialEq)]
pub enum Choice {
    /// Zero-based index into the ranked candidates.
    Candidate(usize),
    /// A title typed by hand. A missing genre is filed as undetected.
    Manual {
        title: String,
        year: Option<u16>,
        genre: Option<String>,
    },
    /// Search again with a revised title.
    Retry(String),
    Skip,
    Abort,
}

/// Operator answer when a placement lands on an existing, different file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep the existing entry and place the new one under a numbered name.
    KeepBoth,
    Replace,
    Skip,
    Abort,
}

/// Blocking, one-call-at-a-time operator surface.
pub trait Prompter {
    fn disambiguate(&mut self, request: &DisambiguationRequest<'_>) -> Choice;
    fn confirm_similar(&mut self, new_file: &Path, existing: &Path) -> Decision;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoPolicy {
    /// Skip every ambiguous file. It will be retried next run.
    #[default]
    SkipAmbiguous,
    /// Take the best ranked candidate when there is one.
    PickTop,
}

/// Non-interactive prompter for unattended runs. Never blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoPrompter {
    pub policy: AutoPolicy,
}

impl AutoPrompter {
    pub fn new(policy: AutoPolicy) -> Self {
        AutoPrompter { policy }
    }
}

impl Prompter for AutoPrompter {
    fn disambiguate(&mut self, request: &DisambiguationRequest<'_>) -> Choice {
        let choice = match self.policy {
            AutoPolicy::PickTop if !request.candidates.is_empty() => Choice::Candidate(0),
            _ => Choice::Skip,
        };
        debug!(
            "Auto answer for '{}' ({:?}): {:?}",
            request.file_name, request.reason, choice
        );
        choice
    }

    fn confirm_similar(&mut self, _new_file: &Path, _existing: &Path) -> Decision {
        match self.policy {
            AutoPolicy::PickTop => Decision::KeepBoth,
            AutoPolicy::SkipAmbiguous => Decision::Skip,
        }
    }
}
