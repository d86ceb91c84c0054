/// Fuzzy title matching used to confirm scraped candidates against a
/// search query. Pure functions, no I/O.

/// Lowercase a title and strip punctuation, collapsing runs of whitespace.
pub fn normalize_title(title: &str) -> String {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decide whether a scraped title is the movie we searched for.
///
/// Exact equality wins immediately. A substring hit counts only for
/// queries longer than 3 characters. Otherwise at least 70% of the
/// query's tokens (and no fewer than 2) must have exact-token matches in
/// the found title; the dual threshold keeps short or common-word
/// queries from matching everything while tolerating subtitle noise.
pub fn matches(found_title: &str, query: &str) -> bool {
    let found = normalize_title(found_title);
    let query = normalize_title(query);

    if found.is_empty() || query.is_empty() {
        return false;
    }

    if found == query {
        return true;
    }

    if query.len() > 3 && found.contains(&query) {
        return true;
    }

    // Tokens of length <= 2 carry no signal ("of", "a", roman numerals)
    let found_tokens: Vec<&str> = found.split(' ').filter(|t| t.len() > 2).collect();
    let query_tokens: Vec<&str> = query.split(' ').filter(|t| t.len() > 2).collect();

    if found_tokens.is_empty() || query_tokens.is_empty() {
        return false;
    }

    let matched = query_tokens
        .iter()
        .filter(|t| found_tokens.contains(t))
        .count();

    matched >= 2 && (matched as f64 / query_tokens.len() as f64) >= 0.7
}
