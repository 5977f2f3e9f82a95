//! Name normalization and string similarity for project clustering.

/// Filler tokens stripped before comparing project names. "Atlas Migration"
/// and "The Atlas Migration Initiative" should normalize to the same string.
const PROJECT_STOPWORDS: [&str; 12] = [
    "the",
    "a",
    "an",
    "project",
    "initiative",
    "program",
    "planning",
    "phase",
    "effort",
    "work",
    "task",
    "plan",
];

/// Normalize a project name for comparison.
///
/// Lowercase, split on whitespace, drop stopword tokens, rejoin with single
/// spaces. Empty input stays empty; a name made entirely of stopwords
/// normalizes to the empty string.
///
/// Example: "The Atlas Migration Initiative" → "atlas migration"
pub fn normalize_project_name(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .filter(|token| !PROJECT_STOPWORDS.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Gestalt (Ratcliff/Obershelp) similarity ratio between two strings.
///
/// Returns 2·M/T where M is the total length of recursively matched common
/// substrings and T the combined length of both inputs. 1.0 for identical
/// strings, 0.0 for strings with no characters in common.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let matches = matching_chars(&a, &b);
    (2.0 * matches as f64) / ((a.len() + b.len()) as f64)
}

/// Total matched characters: longest common substring, then recurse on the
/// unmatched pieces to either side of it.
fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (pos_a, pos_b, len) = longest_common_substring(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..pos_a], &b[..pos_b])
        + matching_chars(&a[pos_a + len..], &b[pos_b + len..])
}

/// Round to two decimal places for exported confidence values.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round to one decimal place for exported averages.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Longest common substring as (start in a, start in b, length).
///
/// Ties resolve to the earliest position in `a`, then the earliest in `b`.
fn longest_common_substring(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        let mut cur = vec![0usize; b.len() + 1];
        for j in 0..b.len() {
            if a[i] == b[j] {
                let run = prev[j] + 1;
                cur[j + 1] = run;
                if run > best.2 {
                    best = (i + 1 - run, j + 1 - run, run);
                }
            }
        }
        prev = cur;
    }
    best
}
