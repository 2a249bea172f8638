//! Search expression grammar.
//!
//! Bare terms match tokens exactly (case-insensitive); a trailing `*` is a
//! prefix wildcard; `?` at the start or end stands for exactly one
//! character; a trailing `~` requests a fuzzy match within edit distance 2;
//! quoted text matches as a phrase with token order preserved.

const DEFAULT_FUZZY_DISTANCE: usize = 2;

/// One parsed term of a search expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermQuery {
    Exact(String),
    Prefix(String),
    /// Pattern over a single token where `?` matches exactly one character.
    Wildcard(String),
    Fuzzy(String, usize),
    Phrase(Vec<String>),
}

impl TermQuery {
    /// Weight contributed when `token` matches this term, or `None` if it
    /// does not match. Fuzzy matches are down-weighted by edit distance so
    /// exact hits rank above near-misses.
    pub fn match_weight(&self, token: &str) -> Option<f64> {
        match self {
            TermQuery::Exact(term) => (token == term).then_some(1.0),
            TermQuery::Prefix(prefix) => token.starts_with(prefix.as_str()).then_some(1.0),
            TermQuery::Wildcard(pattern) => wildcard_match(pattern, token).then_some(1.0),
            TermQuery::Fuzzy(term, max_distance) => {
                let distance = bounded_levenshtein(term, token, *max_distance)?;
                Some(1.0 / (1.0 + distance as f64))
            }
            // Phrases are matched against whole documents, not single tokens.
            TermQuery::Phrase(_) => None,
        }
    }
}

/// Parse a search expression into its terms. The expression is case-folded
/// first, which is what makes ranking case-invariant end to end.
pub fn parse_expression(expression: &str) -> Vec<TermQuery> {
    let folded = expression.to_lowercase();
    let mut terms = Vec::new();
    let mut rest = folded.trim();

    while !rest.is_empty() {
        if let Some(after_quote) = rest.strip_prefix('"') {
            // Quoted phrase; an unterminated quote runs to the end.
            let (phrase, remainder) = match after_quote.find('"') {
                Some(end) => (&after_quote[..end], &after_quote[end + 1..]),
                None => (after_quote, ""),
            };
            let tokens = crate::index::tokenize(phrase);
            if !tokens.is_empty() {
                terms.push(TermQuery::Phrase(tokens));
            }
            rest = remainder.trim_start();
            continue;
        }

        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let word = &rest[..end];
        if let Some(term) = parse_bare_term(word) {
            terms.push(term);
        }
        rest = rest[end..].trim_start();
    }

    terms
}

fn parse_bare_term(word: &str) -> Option<TermQuery> {
    if let Some(stem) = word.strip_suffix('~') {
        let stem = fold_term(stem);
        return (!stem.is_empty()).then(|| TermQuery::Fuzzy(stem, DEFAULT_FUZZY_DISTANCE));
    }
    if let Some(stem) = word.strip_suffix('*') {
        let stem = fold_term(stem);
        return (!stem.is_empty()).then(|| TermQuery::Prefix(stem));
    }
    if word.starts_with('?') || word.ends_with('?') {
        let pattern: String = word
            .chars()
            .filter(|c| *c == '?' || c.is_alphanumeric())
            .collect();
        return (pattern.chars().any(|c| c != '?')).then(|| TermQuery::Wildcard(pattern));
    }

    let term = fold_term(word);
    (!term.is_empty()).then(|| TermQuery::Exact(term))
}

/// Reduce a raw expression word to analyzer form: already lowercased by the
/// caller, stripped of non-alphanumeric characters.
fn fold_term(word: &str) -> String {
    word.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Match a pattern where `?` stands for exactly one character.
fn wildcard_match(pattern: &str, token: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let token: Vec<char> = token.chars().collect();
    if pattern.len() != token.len() {
        return false;
    }
    pattern
        .iter()
        .zip(&token)
        .all(|(p, t)| *p == '?' || p == t)
}

/// Levenshtein distance, abandoning early once `max` is exceeded.
/// Returns `None` when the distance is above the bound.
fn bounded_levenshtein(a: &str, b: &str, max: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.len().abs_diff(b.len()) > max {
        return None;
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        let mut row_min = current[0];
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
            row_min = row_min.min(current[j + 1]);
        }
        if row_min > max {
            return None;
        }
        std::mem::swap(&mut previous, &mut current);
    }

    (previous[b.len()] <= max).then_some(previous[b.len()])
}
