//! Filename classification.
//!
//! Turns a loosely named file such as `Le.Fabuleux.Destin.d.Amelie.Poulain.2001.1080p.FRENCH.x264.mkv`
//! into a [`ClassificationGuess`]. The category folder the file was found in is
//! the prior for the media kind; everything else comes from the name itself.
//! Extraction never fails: a name with nothing usable yields an empty guess.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;
use tracing::debug;

use crate::model::{
    Category, ClassificationGuess, Confidence, EpisodeSpan, MediaKind, TechnicalInfo,
};
use crate::text::collapse_whitespace;

lazy_static! {
    static ref EPISODE: Regex = Regex::new(
        r"(?i)(?:^|[^a-z0-9])s(\d{1,2})[ ._-]?e(\d{1,3})(?:[ ._-]*e(\d{1,3}))?(?:$|[^a-z0-9])"
    )
    .unwrap();
    static ref CROSS_EPISODE: Regex =
        Regex::new(r"(?i)(?:^|[^a-z0-9])(\d{1,2})x(\d{2,3})(?:$|[^a-z0-9])").unwrap();
    static ref SEASON_ONLY: Regex =
        Regex::new(r"(?i)(?:^|[^a-z0-9])(?:s|saison[ ._]?|season[ ._]?)(\d{1,2})(?:$|[^a-z0-9])")
            .unwrap();
    static ref EPISODE_TOKEN: Regex = Regex::new(
        r"(?i)^(s\d{1,2}(e\d{1,3})*(-?e\d{1,3})?|\d{1,2}x\d{2,3}|(saison|season)\d{1,2})$"
    )
    .unwrap();
    static ref SEASON_WORD: Regex = Regex::new(r"(?i)^(saison|season)$").unwrap();
    static ref NUMBER: Regex = Regex::new(r"^\d{1,2}$").unwrap();
    static ref YEAR_TOKEN: Regex = Regex::new(r"^\(?((?:19|20)\d{2})\)?$").unwrap();
    static ref BRACKETED: Regex = Regex::new(r"\[[^\]]*\]|\{[^}]*\}").unwrap();
    static ref SEPARATORS: Regex = Regex::new(r"[\s._]+").unwrap();
    static ref CODEC_X264: Regex =
        Regex::new(r"(?i)(?:^|[^a-z0-9])(x264|h[ ._]?264|avc)(?:$|[^a-z0-9])").unwrap();
    static ref CODEC_HEVC: Regex =
        Regex::new(r"(?i)(?:^|[^a-z0-9])(x265|h[ ._]?265|hevc)(?:$|[^a-z0-9])").unwrap();
    static ref CODEC_AV1: Regex = Regex::new(r"(?i)(?:^|[^a-z0-9])av1(?:$|[^a-z0-9])").unwrap();
}

/// Resolution, codec and source markers. A title never continues past one.
const TECHNICAL_TOKENS: &[&str] = &[
    "2160p", "1080p", "1080i", "720p", "576p", "480p", "hdr10", "10bit", "x264", "x265", "h264",
    "h265", "hevc", "av1", "xvid", "divx", "bluray", "blu-ray", "brrip", "bdrip", "webrip",
    "web-dl", "webdl", "hdtv", "dvdrip", "remux", "hdlight",
];

/// Language and release words that are also ordinary title words (`The Web`,
/// `Limited`). They only end a title when followed by another tag or by
/// nothing at all.
const RELEASE_WORDS: &[&str] = &[
    "4k", "uhd", "hdr", "avc", "web", "dvd", "french", "truefrench", "subfrench", "vff", "vfq",
    "vfi", "vf", "vf2", "vostfr", "vostf", "vost", "multi", "vo", "eng", "aac", "ac3", "dts",
    "dd5", "ddp5", "proper", "repack", "extended", "unrated", "internal", "limited", "imax",
    "custom",
];

/// Classify a bare filename. `parent_hint` is the category root the file was
/// found under, when known.
pub fn classify(filename: &str, parent_hint: Option<Category>) -> ClassificationGuess {
    let stem = strip_extension(filename);

    let (season, episodes) = extract_episode(stem);
    let (title, year) = extract_title_and_year(stem);
    let technical = extract_technical(stem);

    let media_kind = match parent_hint {
        Some(category) => category.media_kind(),
        None if season.is_some() => MediaKind::Series,
        None if year.is_some() => MediaKind::Movie,
        None => MediaKind::Unknown,
    };

    let confidence = if title.is_empty() {
        debug!("No title detected for {}", filename);
        Confidence::Empty
    } else if year.is_some() || episodes.is_some() {
        Confidence::High
    } else {
        Confidence::Low
    };

    let guess = ClassificationGuess {
        media_kind,
        title,
        year,
        season,
        episodes,
        technical,
        confidence,
    };
    debug!("Classified '{}' as {:?}", filename, guess);
    guess
}

/// Classify a path, using the nearest category folder among its ancestors
/// as the hint.
pub fn classify_path(path: &Path) -> ClassificationGuess {
    let hint = path
        .ancestors()
        .skip(1)
        .filter_map(|dir| dir.file_name())
        .find_map(|name| Category::from_dir_name(&name.to_string_lossy()));
    let filename = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    classify(&filename, hint)
}

fn strip_extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
                && !ext.chars().all(|c| c.is_ascii_digit()) =>
        {
            stem
        }
        _ => filename,
    }
}

fn extract_episode(stem: &str) -> (Option<u16>, Option<EpisodeSpan>) {
    if let Some(caps) = EPISODE.captures(stem) {
        let season = caps[1].parse().ok();
        let first: Option<u16> = caps[2].parse().ok();
        let last: Option<u16> = caps.get(3).and_then(|m| m.as_str().parse().ok());
        let span = match (first, last) {
            (Some(first), Some(last)) if last > first => Some(EpisodeSpan::Range(first, last)),
            (Some(first), _) => Some(EpisodeSpan::Single(first)),
            _ => None,
        };
        return (season, span);
    }
    if let Some(caps) = CROSS_EPISODE.captures(stem) {
        return (
            caps[1].parse().ok(),
            caps[2].parse().ok().map(EpisodeSpan::Single),
        );
    }
    if let Some(caps) = SEASON_ONLY.captures(stem) {
        return (caps[1].parse().ok(), None);
    }
    (None, None)
}

fn is_technical(token: &str) -> bool {
    let lower = token.to_lowercase();
    TECHNICAL_TOKENS.contains(&lower.as_str()) || EPISODE_TOKEN.is_match(&lower)
}

fn is_release_word(token: &str) -> bool {
    RELEASE_WORDS.contains(&token.to_lowercase().as_str())
}

/// `Saison 2`, `Season 02`: the word alone is part of a title.
fn is_season_marker(token: &str, next: Option<&&str>) -> bool {
    SEASON_WORD.is_match(token) && next.map(|n| NUMBER.is_match(n)).unwrap_or(false)
}

/// Title tokens run until the first year, episode marker or technical tag,
/// or the trailing block of release words. A year in first position is part
/// of the title (`2001 A Space Odyssey 1968`).
fn extract_title_and_year(stem: &str) -> (String, Option<u16>) {
    let cleaned = BRACKETED.replace_all(stem, " ");
    let tokens: Vec<&str> = SEPARATORS
        .split(&cleaned)
        .map(|t| t.trim_matches(|c| c == '(' || c == ')' || c == '-'))
        .filter(|t| !t.is_empty())
        .collect();

    let mut title: Vec<&str> = Vec::new();
    let mut year = None;
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            if let Some(caps) = YEAR_TOKEN.captures(token) {
                year = caps[1].parse().ok();
                break;
            }
        }
        if is_technical(token) || is_season_marker(token, tokens.get(i + 1)) {
            break;
        }
        if is_release_word(token) {
            let is_tag = |t: &&str| is_release_word(t) || is_technical(t);
            let next_is_tag = tokens.get(i + 1).map(is_tag).unwrap_or(false);
            if next_is_tag || tokens[i..].iter().all(is_tag) {
                break;
            }
        }
        title.push(token);
    }

    if year.is_none() {
        year = tokens
            .iter()
            .skip(title.len() + 1)
            .find_map(|t| YEAR_TOKEN.captures(t).and_then(|c| c[1].parse().ok()));
    }

    (collapse_whitespace(&title.join(" ")), year)
}

fn extract_technical(stem: &str) -> TechnicalInfo {
    let lower = stem.to_lowercase();
    let tokens: Vec<&str> = SEPARATORS
        .split(&lower)
        .flat_map(|t| t.split(['-', '[', ']', '(', ')']))
        .filter(|t| !t.is_empty())
        .collect();
    let has = |names: &[&str]| tokens.iter().any(|t| names.contains(t));

    let audio_language = if has(&["multi", "mul"]) {
        Some("MULTi")
    } else if has(&["vostfr", "vostf", "vost", "subfrench"]) {
        Some("VOSTFR")
    } else if has(&["french", "truefrench", "vff", "vfq", "vfi", "vf", "vf2", "fr", "fra"]) {
        Some("FR")
    } else if has(&["vo"]) {
        Some("VO")
    } else {
        None
    };

    let codec = if CODEC_AV1.is_match(&lower) {
        Some("AV1")
    } else if CODEC_HEVC.is_match(&lower) {
        Some("HEVC")
    } else if CODEC_X264.is_match(&lower) {
        Some("x264")
    } else {
        None
    };

    let resolution = if has(&["2160p", "4k", "uhd"]) {
        Some("2160p")
    } else if has(&["1080p", "1080i"]) {
        Some("1080p")
    } else if has(&["720p"]) {
        Some("720p")
    } else if has(&["576p"]) {
        Some("576p")
    } else if has(&["480p"]) {
        Some("480p")
    } else if has(&["dvdrip"]) {
        Some("DVDRip")
    } else {
        None
    };

    TechnicalInfo {
        audio_language: audio_language.map(String::from),
        codec: codec.map(String::from),
        resolution: resolution.map(String::from),
    }
}
