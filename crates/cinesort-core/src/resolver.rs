//! Metadata resolution.
//!
//! A guess is looked up in the metadata cache first, then with the provider.
//! Candidates are ranked, and a single clear winner is accepted without
//! asking. Anything else goes to the [`Prompter`]. The final answer is cached
//! under the original query so the same raw name never prompts twice.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use strsim::jaro_winkler;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::genre::{genre_names, primary_genre};
use crate::model::{
    Candidate, ClassificationGuess, Confidence, EpisodeSpan, MediaKind, ResolvedMetadata,
    ScoredCandidate,
};
use crate::prompt::{AmbiguityReason, Choice, DisambiguationRequest, Prompter};
use crate::provider::{MetadataProvider, ProviderError, MOVIE_PROVIDER, SERIES_PROVIDER};
use crate::storage::MetadataCache;
use crate::text::{comparable, query_key, strip_article};

/// Fuzzy matches never reach the score of an exact title match.
const FUZZY_WEIGHT: f64 = 0.95;
const ARTICLE_MATCH_SCORE: f64 = 0.98;
const NEAR_YEAR_PENALTY: f64 = 0.05;
const FAR_YEAR_PENALTY: f64 = 0.20;
const UNKNOWN_YEAR_PENALTY: f64 = 0.10;

/// What the cache holds for one query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachedResolution {
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub resolved: Option<ResolvedMetadata>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Cache,
    Automatic,
    Operator,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved {
        metadata: ResolvedMetadata,
        source: ResolutionSource,
    },
    /// Left for the next run. No hash is recorded.
    Skipped,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolverSettings {
    pub auto_accept_score: f64,
    pub ambiguity_margin: f64,
    pub year_tolerance: u16,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        ResolverSettings {
            auto_accept_score: 0.90,
            ambiguity_margin: 0.05,
            year_tolerance: 1,
        }
    }
}

/// Per-run resolver state. Collaborators are passed in on each call.
#[derive(Debug, Default)]
pub struct Resolver {
    settings: ResolverSettings,
    /// Set on the first provider failure; the rest of the run is cache-only.
    provider_down: bool,
    provider_calls: usize,
}

impl Resolver {
    pub fn new(settings: ResolverSettings) -> Self {
        Resolver {
            settings,
            provider_down: false,
            provider_calls: 0,
        }
    }

    pub fn provider_down(&self) -> bool {
        self.provider_down
    }

    pub fn provider_calls(&self) -> usize {
        self.provider_calls
    }

    /// Resolve one guess to canonical metadata, or to a skip.
    ///
    /// Fails only on operator abort, or when neither the cache nor the
    /// provider can answer.
    pub fn resolve(
        &mut self,
        guess: &ClassificationGuess,
        file_name: &str,
        provider: &mut dyn MetadataProvider,
        cache: &mut dyn MetadataCache,
        prompter: &mut dyn Prompter,
    ) -> Result<Resolution, Error> {
        let kind = guess.media_kind;
        let namespace = namespace(kind);
        let original_key = (!guess.title.is_empty()).then(|| query_key(&guess.title, guess.year));
        if guess.confidence == Confidence::Empty {
            warn!("{}", Error::ClassificationAmbiguous(file_name.to_string()));
        }

        let mut candidates = Vec::new();
        if let Some(key) = &original_key {
            match self.cached(cache, namespace, key) {
                Some(CachedResolution {
                    resolved: Some(mut metadata),
                    ..
                }) => {
                    debug!("Resolved '{}' from cache", guess.title);
                    // Films and Animation share a namespace; the folder genre
                    // depends on the kind asking.
                    if !metadata.genres.is_empty() {
                        metadata.genre = primary_genre(kind, &metadata.genres);
                    }
                    return Ok(Resolution::Resolved {
                        metadata,
                        source: ResolutionSource::Cache,
                    });
                }
                Some(entry) => candidates = entry.candidates,
                None => candidates = self.search(&guess.title, guess.year, kind, provider, cache)?,
            }
        }

        let mut query = guess.title.clone();
        let mut ranked = self.rank(&query, guess.year, candidates.clone());

        loop {
            let reason = match self.assess(&query, &ranked) {
                None => {
                    let metadata = metadata_from(&ranked[0].candidate, guess);
                    info!(
                        "Matched '{}' to '{}' ({:.2})",
                        file_name, metadata.canonical_title, ranked[0].score
                    );
                    self.remember(cache, namespace, original_key.as_deref(), &candidates, &metadata);
                    return Ok(Resolution::Resolved {
                        metadata,
                        source: ResolutionSource::Automatic,
                    });
                }
                Some(reason) => reason,
            };

            let request = DisambiguationRequest {
                file_name,
                query: &query,
                year: guess.year,
                media_kind: kind,
                candidates: &ranked,
                reason,
            };
            match prompter.disambiguate(&request) {
                Choice::Candidate(index) => match ranked.get(index) {
                    Some(chosen) => {
                        let metadata = metadata_from(&chosen.candidate, guess);
                        self.remember(cache, namespace, original_key.as_deref(), &candidates, &metadata);
                        return Ok(Resolution::Resolved {
                            metadata,
                            source: ResolutionSource::Operator,
                        });
                    }
                    None => {
                        warn!("Choice {} out of range for '{}', skipping", index + 1, file_name);
                        return Ok(Resolution::Skipped);
                    }
                },
                Choice::Manual { title, year, genre } => {
                    let metadata = ResolvedMetadata {
                        canonical_title: title.trim().to_string(),
                        year: year.or(guess.year),
                        genre: genre.unwrap_or_else(|| primary_genre(kind, &[])),
                        provider_id: None,
                        genres: Vec::new(),
                    };
                    if crate::model::is_unset_title(Some(&metadata.canonical_title)) {
                        warn!("Empty manual title for '{}', skipping", file_name);
                        return Ok(Resolution::Skipped);
                    }
                    self.remember(cache, namespace, original_key.as_deref(), &candidates, &metadata);
                    return Ok(Resolution::Resolved {
                        metadata,
                        source: ResolutionSource::Operator,
                    });
                }
                Choice::Retry(revised) => {
                    query = revised.trim().to_string();
                    let key = query_key(&query, guess.year);
                    let found = match self.cached(cache, namespace, &key) {
                        Some(entry) => entry.candidates,
                        None => self.search(&query, guess.year, kind, provider, cache)?,
                    };
                    ranked = self.rank(&query, guess.year, found);
                }
                Choice::Skip => {
                    info!("Skipped '{}'", file_name);
                    return Ok(Resolution::Skipped);
                }
                Choice::Abort => return Err(Error::OperatorAbort),
            }
        }
    }

    /// Episode titles for one season, through the cache. Empty when unknown.
    pub fn episode_titles(
        &mut self,
        series_id: &str,
        season: u16,
        provider: &mut dyn MetadataProvider,
        cache: &mut dyn MetadataCache,
    ) -> Vec<String> {
        let key = format!("episodes:{}:{}", series_id, season);
        if let Some(raw) = cache.get(SERIES_PROVIDER, &key) {
            match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(titles) => return titles,
                Err(e) => warn!("Ignoring malformed cache entry {}: {}", key, e),
            }
        }
        if self.provider_down {
            return Vec::new();
        }
        self.provider_calls += 1;
        match provider.episode_titles(series_id, season) {
            Ok(titles) => {
                if let Ok(raw) = serde_json::to_string(&titles) {
                    cache.put(SERIES_PROVIDER, &key, &raw);
                }
                titles
            }
            Err(e) => {
                self.provider_failed(e);
                Vec::new()
            }
        }
    }

    fn cached(
        &self,
        cache: &mut dyn MetadataCache,
        namespace: &str,
        key: &str,
    ) -> Option<CachedResolution> {
        let raw = cache.get(namespace, key)?;
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Ignoring malformed cache entry {}:{}: {}", namespace, key, e);
                None
            }
        }
    }

    fn search(
        &mut self,
        title: &str,
        year: Option<u16>,
        kind: MediaKind,
        provider: &mut dyn MetadataProvider,
        cache: &mut dyn MetadataCache,
    ) -> Result<Vec<Candidate>, Error> {
        if title.is_empty() {
            return Ok(Vec::new());
        }
        if self.provider_down {
            if !cache.is_available() {
                return Err(Error::ResolutionUnavailable);
            }
            return Ok(Vec::new());
        }

        self.provider_calls += 1;
        let result = if kind == MediaKind::Series {
            provider.search_series(title)
        } else {
            provider.search_movie(title, year)
        };
        match result {
            Ok(candidates) => {
                debug!("Provider returned {} candidates for '{}'", candidates.len(), title);
                let entry = CachedResolution {
                    candidates: candidates.clone(),
                    resolved: None,
                };
                self.store(cache, namespace(kind), &query_key(title, year), &entry);
                Ok(candidates)
            }
            Err(e) => {
                self.provider_failed(e);
                if !cache.is_available() {
                    return Err(Error::ResolutionUnavailable);
                }
                Ok(Vec::new())
            }
        }
    }

    fn provider_failed(&mut self, err: ProviderError) {
        if !self.provider_down {
            warn!("{}. Continuing with cached metadata only", Error::from(err));
        }
        self.provider_down = true;
    }

    fn rank(&self, query: &str, year: Option<u16>, candidates: Vec<Candidate>) -> Vec<ScoredCandidate> {
        let mut ranked: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|candidate| ScoredCandidate {
                score: score_candidate(query, year, &candidate, self.settings.year_tolerance),
                candidate,
            })
            .collect();
        // Stable: ties keep the provider's order.
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        ranked
    }

    /// `None` when the top candidate can be taken without asking.
    fn assess(&self, query: &str, ranked: &[ScoredCandidate]) -> Option<AmbiguityReason> {
        if query.trim().is_empty() {
            return Some(AmbiguityReason::EmptyTitle);
        }
        let top = match ranked.first() {
            Some(top) => top,
            None => return Some(AmbiguityReason::NoCandidates),
        };
        if top.score < self.settings.auto_accept_score {
            return Some(AmbiguityReason::LowScore);
        }
        match ranked.get(1) {
            Some(second) if top.score - second.score < self.settings.ambiguity_margin => {
                Some(AmbiguityReason::CloseScores)
            }
            _ => None,
        }
    }

    fn remember(
        &self,
        cache: &mut dyn MetadataCache,
        namespace: &str,
        key: Option<&str>,
        candidates: &[Candidate],
        metadata: &ResolvedMetadata,
    ) {
        if let Some(key) = key {
            let entry = CachedResolution {
                candidates: candidates.to_vec(),
                resolved: Some(metadata.clone()),
            };
            self.store(cache, namespace, key, &entry);
        }
    }

    fn store(&self, cache: &mut dyn MetadataCache, namespace: &str, key: &str, entry: &CachedResolution) {
        match serde_json::to_string(entry) {
            Ok(raw) => cache.put(namespace, key, &raw),
            Err(e) => warn!("Could not serialize cache entry {}: {}", key, e),
        }
    }
}

fn namespace(kind: MediaKind) -> &'static str {
    if kind == MediaKind::Series {
        SERIES_PROVIDER
    } else {
        MOVIE_PROVIDER
    }
}

fn metadata_from(candidate: &Candidate, guess: &ClassificationGuess) -> ResolvedMetadata {
    let genres = genre_names(&candidate.genre_ids);
    ResolvedMetadata {
        canonical_title: candidate.title.trim().to_string(),
        year: candidate.year.or(guess.year),
        genre: primary_genre(guess.media_kind, &genres),
        provider_id: Some(candidate.id.clone()),
        genres,
    }
}

/// Exact title match first, then fuzzy similarity, adjusted by year distance.
pub fn score_candidate(query: &str, year: Option<u16>, candidate: &Candidate, year_tolerance: u16) -> f64 {
    let wanted = comparable(query);
    let wanted_bare = comparable(strip_article(query));
    let titles: Vec<&str> = std::iter::once(candidate.title.as_str())
        .chain(candidate.original_title.as_deref())
        .collect();

    let title_score = titles
        .iter()
        .map(|title| {
            let found = comparable(title);
            if found == wanted {
                1.0
            } else if comparable(strip_article(title)) == wanted_bare {
                ARTICLE_MATCH_SCORE
            } else {
                jaro_winkler(&wanted, &found) * FUZZY_WEIGHT
            }
        })
        .fold(0.0, f64::max);

    let penalty = match (year, candidate.year) {
        (Some(wanted), Some(found)) => {
            let distance = wanted.abs_diff(found);
            if distance == 0 {
                0.0
            } else if distance <= year_tolerance {
                NEAR_YEAR_PENALTY
            } else {
                FAR_YEAR_PENALTY
            }
        }
        (Some(_), None) => UNKNOWN_YEAR_PENALTY,
        _ => 0.0,
    };

    (title_score - penalty).clamp(0.0, 1.0)
}

/// A multi-episode file is split only when every episode in the range exists.
pub fn range_confirmed(span: EpisodeSpan, episode_titles: &[String]) -> bool {
    span.is_range() && span.first() >= 1 && usize::from(span.last()) <= episode_titles.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{AutoPolicy, AutoPrompter};
    use crate::storage::MemoryMetadataCache;
    use crate::model::TechnicalInfo;

    struct FixedProvider {
        candidates: Vec<Candidate>,
        calls: usize,
    }

    impl MetadataProvider for FixedProvider {
        fn search_movie(&mut self, _t: &str, _y: Option<u16>) -> Result<Vec<Candidate>, ProviderError> {
            self.calls += 1;
            Ok(self.candidates.clone())
        }
        fn search_series(&mut self, _t: &str) -> Result<Vec<Candidate>, ProviderError> {
            self.calls += 1;
            Ok(self.candidates.clone())
        }
        fn episode_titles(&mut self, _id: &str, _s: u16) -> Result<Vec<String>, ProviderError> {
            self.calls += 1;
            Ok(vec!["Pilote".into(), "Deux".into(), "Trois".into()])
        }
    }

    fn candidate(id: &str, title: &str, year: Option<u16>) -> Candidate {
        Candidate {
            id: id.into(),
            title: title.into(),
            original_title: None,
            year,
            genre_ids: vec![18],
        }
    }

    fn guess(title: &str, year: Option<u16>) -> ClassificationGuess {
        ClassificationGuess {
            media_kind: MediaKind::Movie,
            title: title.into(),
            year,
            season: None,
            episodes: None,
            technical: TechnicalInfo::default(),
            confidence: Confidence::High,
        }
    }

    #[test]
    fn test_exact_title_beats_fuzzy() {
        let exact = score_candidate("Amelie", Some(2001), &candidate("1", "Amélie", Some(2001)), 1);
        let fuzzy = score_candidate("Amelie", Some(2001), &candidate("2", "Amelia", Some(2001)), 1);
        assert_eq!(exact, 1.0);
        assert!(fuzzy < exact);
    }

    #[test]
    fn test_year_distance_lowers_score() {
        let c = candidate("1", "Dune", Some(2021));
        let same = score_candidate("Dune", Some(2021), &c, 1);
        let near = score_candidate("Dune", Some(2020), &c, 1);
        let far = score_candidate("Dune", Some(1984), &c, 1);
        assert!(same > near && near > far);
    }

    #[test]
    fn test_clear_winner_resolves_without_prompt() {
        let mut provider = FixedProvider {
            candidates: vec![candidate("7", "Heat", Some(1995)), candidate("8", "Heatwave", Some(2010))],
            calls: 0,
        };
        let mut cache = MemoryMetadataCache::new();
        let mut prompter = AutoPrompter::new(AutoPolicy::SkipAmbiguous);
        let mut resolver = Resolver::new(ResolverSettings::default());

        let result = resolver
            .resolve(&guess("Heat", Some(1995)), "Heat.1995.mkv", &mut provider, &mut cache, &mut prompter)
            .unwrap();
        match result {
            Resolution::Resolved { metadata, source } => {
                assert_eq!(metadata.canonical_title, "Heat");
                assert_eq!(metadata.genre, "Drame");
                assert_eq!(source, ResolutionSource::Automatic);
            }
            other => panic!("unexpected {:?}", other),
        }

        let again = resolver
            .resolve(&guess("heat ", Some(1995)), "heat.1995.avi", &mut provider, &mut cache, &mut prompter)
            .unwrap();
        assert!(matches!(again, Resolution::Resolved { source: ResolutionSource::Cache, .. }));
        assert_eq!(provider.calls, 1);
    }

    #[test]
    fn test_tie_is_not_auto_selected() {
        let mut provider = FixedProvider {
            candidates: vec![candidate("1", "Dune", Some(1984)), candidate("2", "Dune", Some(2021))],
            calls: 0,
        };
        let mut cache = MemoryMetadataCache::new();
        let mut prompter = AutoPrompter::new(AutoPolicy::SkipAmbiguous);
        let mut resolver = Resolver::new(ResolverSettings::default());
        let result = resolver
            .resolve(&guess("Dune", None), "Dune.mkv", &mut provider, &mut cache, &mut prompter)
            .unwrap();
        assert_eq!(result, Resolution::Skipped);
    }

    #[test]
    fn test_cached_genre_follows_media_kind() {
        let mut provider = FixedProvider {
            candidates: vec![Candidate {
                id: "149".into(),
                title: "Akira".into(),
                original_title: None,
                year: Some(1988),
                genre_ids: vec![16, 28, 878],
            }],
            calls: 0,
        };
        let mut cache = MemoryMetadataCache::new();
        let mut prompter = AutoPrompter::new(AutoPolicy::SkipAmbiguous);
        let mut resolver = Resolver::new(ResolverSettings::default());

        let mut animation = guess("Akira", Some(1988));
        animation.media_kind = MediaKind::Animation;
        let movie = guess("Akira", Some(1988));

        let genre_of = |result: Resolution| match result {
            Resolution::Resolved { metadata, .. } => metadata.genre,
            other => panic!("unexpected {:?}", other),
        };

        let first = resolver
            .resolve(&animation, "Akira.1988.mkv", &mut provider, &mut cache, &mut prompter)
            .unwrap();
        assert_eq!(genre_of(first), "Animation Enfant");

        let second = resolver
            .resolve(&movie, "Akira.1988.mkv", &mut provider, &mut cache, &mut prompter)
            .unwrap();
        assert!(matches!(second, Resolution::Resolved { source: ResolutionSource::Cache, .. }));
        assert_eq!(genre_of(second), "Animation/Animation Enfant");
        assert_eq!(provider.calls, 1);
    }

    #[test]
    fn test_episode_titles_are_cached() {
        let mut provider = FixedProvider {
            candidates: vec![],
            calls: 0,
        };
        let mut cache = MemoryMetadataCache::new();
        let mut resolver = Resolver::default();
        let first = resolver.episode_titles("42", 1, &mut provider, &mut cache);
        let second = resolver.episode_titles("42", 1, &mut provider, &mut cache);
        assert_eq!(first, second);
        assert_eq!(provider.calls, 1);
        assert!(range_confirmed(EpisodeSpan::Range(1, 3), &first));
        assert!(!range_confirmed(EpisodeSpan::Range(2, 4), &first));
        assert!(!range_confirmed(EpisodeSpan::Single(1), &first));
    }
}
