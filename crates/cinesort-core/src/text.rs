//! Title normalisation shared by the classifier, the resolver and placement.

/// Leading articles removed before alphabetical sorting, longest first so that
/// `De la ` wins over `De `.
const ARTICLES: [&str; 23] = [
    "d'une ", "de la ", "de l'", "d'un ", "à la ", "a la ", "à l'", "a l'", "une ", "les ",
    "des ", "aux ", "the ", "un ", "le ", "la ", "de ", "du ", "au ", "an ", "l'", "a ", "l ",
];

/// Replace accented latin letters and ligatures with their ASCII base.
pub fn fold_diacritics(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => out.push('a'),
            'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => out.push('A'),
            'è' | 'é' | 'ê' | 'ë' => out.push('e'),
            'È' | 'É' | 'Ê' | 'Ë' => out.push('E'),
            'ì' | 'í' | 'î' | 'ï' => out.push('i'),
            'Ì' | 'Í' | 'Î' | 'Ï' => out.push('I'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => out.push('o'),
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' => out.push('O'),
            'ù' | 'ú' | 'û' | 'ü' => out.push('u'),
            'Ù' | 'Ú' | 'Û' | 'Ü' => out.push('U'),
            'ý' | 'ÿ' => out.push('y'),
            'Ý' | 'Ÿ' => out.push('Y'),
            'ç' => out.push('c'),
            'Ç' => out.push('C'),
            'ñ' => out.push('n'),
            'Ñ' => out.push('N'),
            'œ' => out.push_str("oe"),
            'Œ' => out.push_str("Oe"),
            'æ' => out.push_str("ae"),
            'Æ' => out.push_str("Ae"),
            '’' => out.push('\''),
            _ => out.push(c),
        }
    }
    out
}

/// Drop one leading French or English article. Case-insensitive.
pub fn strip_article(title: &str) -> &str {
    let trimmed = title.trim();
    let lower = trimmed.to_lowercase();
    for article in ARTICLES {
        if lower.starts_with(article) {
            // Articles are ASCII except the accented `à`, which lowercases to the
            // same byte length, so the prefix length carries over.
            if let Some(rest) = trimmed.get(article.len()..) {
                if !rest.trim().is_empty() {
                    return rest.trim_start();
                }
            }
        }
    }
    trimmed
}

/// Lowercase, diacritic-free, alphanumerics separated by single spaces.
pub fn comparable(text: &str) -> String {
    let folded = fold_diacritics(text).to_lowercase();
    let spaced: String = folded
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    collapse_whitespace(&spaced)
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cache key for a title query: case-folded, whitespace-collapsed title plus
/// the year when known.
pub fn query_key(title: &str, year: Option<u16>) -> String {
    let title = collapse_whitespace(&fold_diacritics(title).to_lowercase());
    match year {
        Some(year) => format!("{}|{}", title, year),
        None => title,
    }
}

/// Make a display title safe to use as a file or folder name.
pub fn sanitize_filename(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ':' => out.push_str(", "),
            '?' => out.push_str("..."),
            '/' | '\\' => out.push_str(" - "),
            '*' | '"' | '<' | '>' | '|' => {}
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    let collapsed = collapse_whitespace(&out);
    collapsed.replace(" ,", ",").replace(" .", ".").trim().to_string()
}

/// Sort key for a display title: article removed, diacritics folded, lowercase.
pub fn sort_key(title: &str) -> String {
    fold_diacritics(strip_article(title)).to_lowercase()
}
