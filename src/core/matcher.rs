//! "Did you mean" suggestions for mistyped command names.
//!
//! Two measures are combined: edit distance catches swapped or dropped
//! letters, a scored subsequence match catches abbreviations like `hst`.

/// Score `abbrev` as an in-order abbreviation of `name`, ignoring ASCII case.
///
/// Returns `None` unless every character of `abbrev` occurs in `name` in
/// order. Higher is better: each hit counts 1, adjacent hits add 10, hits at
/// the start of a word (after `_`, `-`, `.`) add 5, and a plain prefix adds 20.
///
/// # Examples
///
/// ```
/// use rsh_console::core::abbreviation_score;
///
/// assert!(abbreviation_score("hst", "history").is_some());
/// assert!(abbreviation_score("hist", "history") > abbreviation_score("hst", "history"));
/// assert_eq!(abbreviation_score("xyz", "help"), None);
/// ```
pub fn abbreviation_score(abbrev: &str, name: &str) -> Option<i32> {
    let wanted = abbrev.as_bytes();
    let name_bytes = name.as_bytes();
    if wanted.is_empty() {
        return Some(0);
    }

    let mut score = if name_bytes.len() >= wanted.len()
        && name_bytes[..wanted.len()].eq_ignore_ascii_case(wanted)
    {
        20
    } else {
        0
    };

    let mut next = 0;
    let mut last_hit = None;
    for (pos, byte) in name_bytes.iter().enumerate() {
        if next == wanted.len() {
            break;
        }
        if !byte.eq_ignore_ascii_case(&wanted[next]) {
            continue;
        }
        score += 1;
        if pos > 0 && last_hit == Some(pos - 1) {
            score += 10;
        }
        if pos == 0 || matches!(name_bytes[pos - 1], b'_' | b'-' | b'.') {
            score += 5;
        }
        last_hit = Some(pos);
        next += 1;
    }

    (next == wanted.len()).then_some(score)
}

/// Levenshtein distance between two strings, compared case-insensitively.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Pick up to `limit` candidates that look like what the user meant to type.
///
/// Close typos (edit distance of at most 2) come first, closest first, followed
/// by abbreviation matches, best score first.
pub fn suggest<'a>(
    input: &str,
    candidates: impl IntoIterator<Item = &'a str>,
    limit: usize,
) -> Vec<String> {
    let candidates: Vec<&str> = candidates.into_iter().collect();

    let mut typos: Vec<(usize, &str)> = candidates
        .iter()
        .map(|c| (edit_distance(input, c), *c))
        .filter(|(distance, _)| *distance <= 2)
        .collect();
    typos.sort();

    let mut abbreviations: Vec<(i32, &str)> = candidates
        .iter()
        .filter_map(|c| abbreviation_score(input, c).map(|score| (score, *c)))
        .collect();
    abbreviations.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

    let mut out: Vec<String> = Vec::new();
    for candidate in typos
        .into_iter()
        .map(|(_, c)| c)
        .chain(abbreviations.into_iter().map(|(_, c)| c))
    {
        if !out.iter().any(|c| c == candidate) {
            out.push(candidate.to_string());
        }
    }

    out.truncate(limit);
    out
}
