//! Controlled genre vocabulary used for the archive's genre folders.

use crate::model::MediaKind;

pub const GENRE_UNDETECTED: &str = "Non détecté";
pub const COMEDY_DRAMA: &str = "Comédie dramatique";
pub const ANIMATION_ADULT: &str = "Adultes";
pub const ANIMATION_CHILDREN: &str = "Animation Enfant";
const ANIMATION: &str = "Animation";
const CHILDREN: &str = "Films pour enfants";

/// Genres that may become a genre folder.
pub const SUPPORTED_GENRES: [&str; 14] = [
    "Action & Aventure",
    "Animation",
    "Comédie",
    "Comédie dramatique",
    "Policier",
    "Drame",
    "Films pour enfants",
    "Fantastique",
    "Historique",
    "Horreur",
    "SF",
    "Thriller",
    "Western",
    "Guerre & espionnage",
];

/// Checked in this order when several are present.
const PRIORITY_GENRES: [&str; 5] = ["Western", "Historique", "SF", "Films pour enfants", COMEDY_DRAMA];

/// Unsupported provider genres and the supported genre they fold into.
const GENRE_MAPPING: [(&str, &str); 29] = [
    ("romance", "Drame"),
    ("romantic", "Drame"),
    ("romantique", "Drame"),
    ("téléfilm", "Drame"),
    ("telefilm", "Drame"),
    ("tv movie", "Drame"),
    ("tv-movie", "Drame"),
    ("music", "Drame"),
    ("musical", "Drame"),
    ("musique", "Drame"),
    ("crime", "Policier"),
    ("criminal", "Policier"),
    ("mystery", "Thriller"),
    ("mystère", "Thriller"),
    ("mysterious", "Thriller"),
    ("adventure", "Action & Aventure"),
    ("aventure", "Action & Aventure"),
    ("family", "Films pour enfants"),
    ("famille", "Films pour enfants"),
    ("biography", "Drame"),
    ("biographical", "Drame"),
    ("biographie", "Drame"),
    ("sport", "Drame"),
    ("sports", "Drame"),
    ("news", "Drame"),
    ("actualités", "Drame"),
    ("war & politics", "Guerre & espionnage"),
    ("docs", "Drame"),
    ("séries pour enfants", "Films pour enfants"),
];

/// TMDB genre id to French genre name.
pub fn tmdb_genre_name(id: u32) -> Option<&'static str> {
    let name = match id {
        28 | 12 | 10759 => "Action & Aventure",
        16 => "Animation",
        35 => "Comédie",
        80 => "Policier",
        99 => "Docs",
        18 => "Drame",
        10751 => "Films pour enfants",
        14 => "Fantastique",
        36 => "Historique",
        27 => "Horreur",
        10402 => "Musique",
        9648 | 53 => "Thriller",
        10749 => "Romance",
        878 | 10765 => "SF",
        10770 => "Téléfilm",
        10752 => "Guerre & espionnage",
        37 => "Western",
        10768 => "War & Politics",
        10762 => "Séries pour enfants",
        _ => return None,
    };
    Some(name)
}

/// Names for a list of TMDB ids, first occurrence order, duplicates removed.
pub fn genre_names(ids: &[u32]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in ids.iter().filter_map(|id| tmdb_genre_name(*id)) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

pub fn is_supported(genre: &str) -> bool {
    SUPPORTED_GENRES.contains(&genre)
}

/// Map unsupported genres onto the vocabulary, exact key first, then partial.
pub fn suggest_mapping(unsupported: &[String]) -> Option<&'static str> {
    for genre in unsupported {
        let lower = genre.to_lowercase();
        if let Some((_, mapped)) = GENRE_MAPPING.iter().find(|(k, _)| *k == lower) {
            return Some(mapped);
        }
        if let Some((_, mapped)) = GENRE_MAPPING
            .iter()
            .find(|(k, _)| lower.contains(k) || k.contains(lower.as_str()))
        {
            return Some(mapped);
        }
    }
    let narrative = ["drama", "story", "film", "movie", "drame", "histoire"];
    unsupported
        .iter()
        .any(|g| narrative.iter().any(|n| g.to_lowercase().contains(n)))
        .then_some("Drame")
}

/// Keep supported genres, or fold unsupported ones into a single mapped genre.
pub fn filter_supported(genres: &[String]) -> Vec<String> {
    let valid: Vec<String> = genres.iter().filter(|g| is_supported(g)).cloned().collect();
    if !valid.is_empty() {
        return valid;
    }
    match suggest_mapping(genres) {
        Some(mapped) => vec![mapped.to_string()],
        None => Vec::new(),
    }
}

/// Pick the single genre folder for a resolved title.
pub fn primary_genre(kind: MediaKind, genres: &[String]) -> String {
    let genres = filter_supported(genres);
    if genres.is_empty() {
        return GENRE_UNDETECTED.to_string();
    }

    let has = |name: &str| genres.iter().any(|g| g == name);

    if kind == MediaKind::Animation || has(ANIMATION) {
        let sub = if genres.len() == 1 {
            ANIMATION_ADULT
        } else {
            ANIMATION_CHILDREN
        };
        return if kind == MediaKind::Animation {
            sub.to_string()
        } else {
            format!("{}/{}", ANIMATION, sub)
        };
    }

    if has("Drame") && has("Comédie") {
        return COMEDY_DRAMA.to_string();
    }

    if let Some(priority) = PRIORITY_GENRES.iter().find(|p| has(p)) {
        return priority.to_string();
    }

    genres[0].clone()
}
