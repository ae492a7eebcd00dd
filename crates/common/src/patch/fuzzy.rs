// Fallback matchers used when a change has no unique exact match.

use std::ops::Range;

/// What a fallback matcher gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct FallbackRequest<'a> {
    /// Serialized document text.
    pub text: &'a str,
    pub search: &'a str,
    /// Exact occurrences of `search`, in document order. Empty when the
    /// search text was not found at all.
    pub candidates: &'a [Range<usize>],
}

/// Locates the most plausible target span for a change.
pub trait FallbackMatcher {
    fn locate(&self, request: &FallbackRequest<'_>) -> Option<Range<usize>>;
}

impl<F> FallbackMatcher for F
where
    F: Fn(&FallbackRequest<'_>) -> Option<Range<usize>>,
{
    fn locate(&self, request: &FallbackRequest<'_>) -> Option<Range<usize>> {
        self(request)
    }
}

/// Never locates anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFallback;

impl FallbackMatcher for NoFallback {
    fn locate(&self, _request: &FallbackRequest<'_>) -> Option<Range<usize>> {
        None
    }
}

pub const DEFAULT_MAX_ERROR_RATIO: f64 = 0.25;
pub const DEFAULT_MAX_PATTERN_CHARS: usize = 512;

/// Deterministic approximate matcher.
///
/// With exact candidates it picks the first one in document order.
/// Otherwise it tries a whitespace- and case-insensitive match (which must
/// be unique), then the lowest edit-distance span within
/// `max_error_ratio` of the search length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyMatcher {
    pub max_error_ratio: f64,
    pub max_pattern_chars: usize,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self {
            max_error_ratio: DEFAULT_MAX_ERROR_RATIO,
            max_pattern_chars: DEFAULT_MAX_PATTERN_CHARS,
        }
    }
}

impl FallbackMatcher for FuzzyMatcher {
    fn locate(&self, request: &FallbackRequest<'_>) -> Option<Range<usize>> {
        if let Some(first) = request.candidates.first() {
            return Some(first.clone());
        }

        let text = Normalized::new(request.text);
        let pattern = Normalized::new(request.search.trim());
        if pattern.chars.is_empty() {
            return None;
        }

        match count_occurrences(&text.chars, &pattern.chars) {
            (1, Some(start)) => return Some(text.byte_range(start..start + pattern.chars.len())),
            (0, _) => {}
            _ => return None,
        }

        if pattern.chars.len() > self.max_pattern_chars {
            return None;
        }
        let max_errors = (self.max_error_ratio * pattern.chars.len() as f64).floor() as usize;
        let (cost, span) = best_approximate_span(&text.chars, &pattern.chars)?;
        (cost <= max_errors).then(|| text.byte_range(span))
    }
}

/// Lowercased text with whitespace runs collapsed to one space, remembering
/// the source byte range of every normalized char.
struct Normalized {
    chars: Vec<char>,
    origin: Vec<Range<usize>>,
}

impl Normalized {
    fn new(source: &str) -> Self {
        let mut chars = Vec::with_capacity(source.len());
        let mut origin: Vec<Range<usize>> = Vec::with_capacity(source.len());
        for (offset, ch) in source.char_indices() {
            let end = offset + ch.len_utf8();
            if ch.is_whitespace() {
                if chars.last() == Some(&' ') {
                    if let Some(previous) = origin.last_mut() {
                        previous.end = end;
                    }
                    continue;
                }
                chars.push(' ');
                origin.push(offset..end);
                continue;
            }
            for lower in ch.to_lowercase() {
                chars.push(lower);
                origin.push(offset..end);
            }
        }
        Self { chars, origin }
    }

    /// Source byte range covered by normalized chars `span`.
    fn byte_range(&self, span: Range<usize>) -> Range<usize> {
        self.origin[span.start].start..self.origin[span.end - 1].end
    }
}

/// Number of (possibly overlapping) occurrences and the first start.
fn count_occurrences(text: &[char], pattern: &[char]) -> (usize, Option<usize>) {
    let mut count = 0;
    let mut first = None;
    for (start, window) in text.windows(pattern.len()).enumerate() {
        if window == pattern {
            count += 1;
            first.get_or_insert(start);
        }
    }
    (count, first)
}

/// Semi-global edit distance: the text span with the fewest edits to
/// `pattern`, earliest on ties. Returns `(cost, span)`.
fn best_approximate_span(text: &[char], pattern: &[char]) -> Option<(usize, Range<usize>)> {
    let m = pattern.len();
    let mut cost: Vec<usize> = (0..=m).collect();
    let mut origin: Vec<usize> = vec![0; m + 1];
    let mut best: Option<(usize, Range<usize>)> = None;

    for (j, &ch) in text.iter().enumerate() {
        let mut next_cost = vec![0; m + 1];
        let mut next_origin = vec![j + 1; m + 1];
        for i in 1..=m {
            let substitute = cost[i - 1] + usize::from(pattern[i - 1] != ch);
            let skip_pattern = next_cost[i - 1] + 1;
            let skip_text = cost[i] + 1;
            (next_cost[i], next_origin[i]) = if substitute <= skip_pattern && substitute <= skip_text {
                (substitute, origin[i - 1])
            } else if skip_pattern <= skip_text {
                (skip_pattern, next_origin[i - 1])
            } else {
                (skip_text, origin[i])
            };
        }
        cost = next_cost;
        origin = next_origin;

        let end = j + 1;
        let start = origin[m];
        if start < end && best.as_ref().map_or(true, |(best_cost, _)| cost[m] < *best_cost) {
            best = Some((cost[m], start..end));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locate(text: &str, search: &str) -> Option<String> {
        let request = FallbackRequest { text, search, candidates: &[] };
        FuzzyMatcher::default().locate(&request).map(|span| text[span].to_string())
    }

    #[test]
    fn first_candidate_wins_when_exact_matches_exist() {
        let candidates = [4..7, 12..15];
        let request = FallbackRequest { text: "fix bug, and bug", search: "bug", candidates: &candidates };
        assert_eq!(FuzzyMatcher::default().locate(&request), Some(4..7));
    }

    #[test]
    fn whitespace_and_case_insensitive_match() {
        assert_eq!(locate("Ship The  API\nby Friday.\n", "the api by friday").as_deref(), Some("The  API\nby Friday"));
    }

    #[test]
    fn normalized_match_must_be_unique() {
        assert_eq!(locate("Bug and BUG\n", "bug"), None);
    }

    #[test]
    fn edit_distance_tolerates_small_typos() {
        assert_eq!(locate("We ship the release on friday.\n", "the relase").as_deref(), Some("the release"));
    }

    #[test]
    fn edit_distance_rejects_distant_text() {
        assert_eq!(locate("completely unrelated words\n", "quarterly budget"), None);
    }

    #[test]
    fn long_patterns_skip_edit_distance() {
        let matcher = FuzzyMatcher { max_pattern_chars: 4, ..FuzzyMatcher::default() };
        let request = FallbackRequest { text: "the release", search: "the relase", candidates: &[] };
        assert_eq!(matcher.locate(&request), None);
    }

    #[test]
    fn multibyte_text_maps_back_to_byte_ranges() {
        assert_eq!(locate("Café — ÜBER alles\n", "über").as_deref(), Some("ÜBER"));
    }

    #[test]
    fn closures_and_no_fallback_implement_the_trait() {
        let stub = |_: &FallbackRequest<'_>| Some(0..1);
        let request = FallbackRequest { text: "abc", search: "zzz", candidates: &[] };
        assert_eq!(stub.locate(&request), Some(0..1));
        assert_eq!(NoFallback.locate(&request), None);
    }
}
