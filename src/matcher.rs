//! Fuzzy title matching by Levenshtein edit distance.

/// Levenshtein distance between two strings, counted in chars.
pub use strsim::levenshtein;

/// Case-insensitive edit distance.
pub fn distance_ignore_case(a: &str, b: &str) -> usize {
    levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Lowercase and keep only ASCII letters and digits ("One-Punch Man!" -> "onepunchman").
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Candidate whose title is closest to `query`, ignoring case.
///
/// Ties keep the earliest candidate. Returns `None` only for an empty input.
pub fn closest_match<'a, T, F>(query: &str, candidates: &'a [T], title: F) -> Option<&'a T>
where
    F: Fn(&T) -> &str,
{
    let query = query.to_lowercase();
    let mut best: Option<(&T, usize)> = None;
    for candidate in candidates {
        let d = levenshtein(&query, &title(candidate).to_lowercase());
        if best.map_or(true, |(_, min)| d < min) {
            best = Some((candidate, d));
        }
    }
    best.map(|(c, _)| c)
}

/// Closest title among plain strings.
pub fn closest_title<'a>(query: &str, titles: &'a [&'a str]) -> Option<&'a str> {
    closest_match(query, titles, |t| *t).copied()
}

/// Rank items by distance between normalized strings, closest first, stable on ties.
pub fn rank_by_similarity<T, F>(query: &str, items: Vec<T>, title: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    let query = normalize(query);
    let mut scored: Vec<(usize, T)> = items
        .into_iter()
        .map(|item| (levenshtein(&query, &normalize(title(&item))), item))
        .collect();
    scored.sort_by_key(|(score, _)| *score);
    scored.into_iter().map(|(_, item)| item).collect()
}
