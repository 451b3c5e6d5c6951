use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;

pub const DEFAULT_VIDEO_EXTENSIONS: [&str; 12] = [
    "mkv", "avi", "wmv", "mpeg", "mpg", "m4v", "mp4", "flv", "ts", "rm", "rmvb", "mov",
];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Directory holding the category folders to ingest.
    #[serde(default = "default_search_dir")]
    pub search_dir: PathBuf,
    /// Root of the symlink archive.
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
    /// Where the hash stores and the metadata cache live.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
    /// Hashing fans out to a worker pool only above this many files.
    #[serde(default = "default_parallel_hash_threshold")]
    pub parallel_hash_threshold: usize,
    /// 0 lets rayon pick.
    #[serde(default)]
    pub hash_workers: usize,
    #[serde(default = "default_auto_accept_score")]
    pub auto_accept_score: f64,
    #[serde(default = "default_ambiguity_margin")]
    pub ambiguity_margin: f64,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_year_tolerance")]
    pub year_tolerance: u16,
}

fn default_search_dir() -> PathBuf {
    PathBuf::from("/media/NAS64/temp")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("/media/Serveur/test")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_video_extensions() -> Vec<String> {
    DEFAULT_VIDEO_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}

fn default_parallel_hash_threshold() -> usize {
    10
}

fn default_auto_accept_score() -> f64 {
    0.90
}

fn default_ambiguity_margin() -> f64 {
    0.05
}

fn default_similarity_threshold() -> f64 {
    0.80
}

fn default_year_tolerance() -> u16 {
    1
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            search_dir: default_search_dir(),
            archive_dir: default_archive_dir(),
            state_dir: default_state_dir(),
            ignore_patterns: Vec::new(),
            video_extensions: default_video_extensions(),
            parallel_hash_threshold: default_parallel_hash_threshold(),
            hash_workers: 0,
            auto_accept_score: default_auto_accept_score(),
            ambiguity_margin: default_ambiguity_margin(),
            similarity_threshold: default_similarity_threshold(),
            year_tolerance: default_year_tolerance(),
        }
    }
}

impl AppConfig {
    /// The search directory must exist; archive and state directories are
    /// created unless this is a dry run.
    pub fn validate(&self, dry_run: bool) -> Result<(), Error> {
        if !self.search_dir.is_dir() {
            return Err(Error::Other(format!(
                "Search directory {} does not exist",
                self.search_dir.display()
            )));
        }
        if !(0.0..=1.0).contains(&self.auto_accept_score)
            || !(0.0..=1.0).contains(&self.similarity_threshold)
        {
            return Err(Error::Other(
                "Scores must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !dry_run {
            fs::create_dir_all(&self.archive_dir)?;
            fs::create_dir_all(&self.state_dir)?;
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, Error> {
        toml::to_string_pretty(self).map_err(|e| Error::Other(e.to_string()))
    }

    pub fn cache_db_path(&self) -> PathBuf {
        self.state_dir.join("cache.db")
    }

    pub fn is_video(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .map(|ext| self.video_extensions.iter().any(|v| v.eq_ignore_ascii_case(&ext)))
            .unwrap_or(false)
    }
}

/// `Config.toml` in the working directory, overridden by `CINESORT__*` variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("CINESORT").separator("__"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// How far back discovery looks.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FileAge {
    #[default]
    All,
    /// Only files changed in the last N days.
    Days(f64),
    /// Only files changed since the previous completed run.
    SinceLastRun,
}

/// Per-invocation switches.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub force: bool,
    pub file_age: FileAge,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_source() {
        let config: AppConfig = Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.parallel_hash_threshold, 10);
        assert_eq!(config.year_tolerance, 1);
        assert!(config.video_extensions.contains(&"mkv".to_string()));
    }

    #[test]
    fn test_is_video_is_case_insensitive() {
        let config = AppConfig::default();
        assert!(config.is_video(Path::new("/a/b/Movie.MKV")));
        assert!(!config.is_video(Path::new("/a/b/cover.jpg")));
        assert!(!config.is_video(Path::new("/a/b/noext")));
    }

    #[test]
    fn test_validate_rejects_missing_search_dir() {
        let config = AppConfig {
            search_dir: PathBuf::from("/definitely/not/here"),
            ..AppConfig::default()
        };
        assert!(config.validate(true).is_err());
    }

    #[test]
    fn test_cache_path_lives_in_state_dir() {
        let config = AppConfig {
            state_dir: PathBuf::from("/var/lib/cinesort"),
            ..AppConfig::default()
        };
        assert_eq!(config.cache_db_path(), PathBuf::from("/var/lib/cinesort/cache.db"));
    }
}
