use thiserror::Error;

use crate::model::Candidate;

/// Cache namespace for film-like lookups.
pub const MOVIE_PROVIDER: &str = "tmdb";
/// Cache namespace for series lookups and episode titles.
pub const SERIES_PROVIDER: &str = "tvdb";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Network or authentication failure.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider rate limited: {0}")]
    RateLimited(String),
}

/// External metadata catalog. Implementations talk to the catalog services;
/// the pipeline only sees candidates.
pub trait MetadataProvider {
    fn search_movie(&mut self, title: &str, year: Option<u16>)
        -> Result<Vec<Candidate>, ProviderError>;

    fn search_series(&mut self, title: &str) -> Result<Vec<Candidate>, ProviderError>;

    /// Titles of every episode in the season, in episode order.
    fn episode_titles(&mut self, series_id: &str, season: u16)
        -> Result<Vec<String>, ProviderError>;
}

/// Provider used when no catalog client is configured. Every call reports the
/// provider as unavailable, which puts the run in cache-only mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineProvider;

impl MetadataProvider for OfflineProvider {
    fn search_movie(&mut self, _title: &str, _year: Option<u16>) -> Result<Vec<Candidate>, ProviderError> {
        Err(ProviderError::Unavailable("no catalog client configured".to_string()))
    }

    fn search_series(&mut self, _title: &str) -> Result<Vec<Candidate>, ProviderError> {
        Err(ProviderError::Unavailable("no catalog client configured".to_string()))
    }

    fn episode_titles(&mut self, _series_id: &str, _season: u16) -> Result<Vec<String>, ProviderError> {
        Err(ProviderError::Unavailable("no catalog client configured".to_string()))
    }
}
