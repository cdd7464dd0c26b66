//! `Accept` header negotiation.
//!
//! [`accepts`] picks the media type the client prefers from the ones a
//! handler can produce. Matching runs in three passes over the client's list,
//! highest priority first:
//!
//! 1. an exact type such as `application/json`;
//! 2. a subtype wildcard such as `text/*`, matched on the top-level type;
//! 3. the catch-all `*/*`, which selects the first offered type.
//!
//! Ranges sharing a priority do not rank among themselves: within such a
//! group the handler's own order decides.
//!
//! ```rust
//! use courier_core::negotiate::accepts;
//!
//! let offered = ["text/html", "application/json"];
//! assert_eq!(accepts(Some("application/json, text/html; q=.1"), &offered), Some("application/json"));
//! assert_eq!(accepts(Some("text/*"), &offered), Some("text/html"));
//! assert_eq!(accepts(Some("image/png"), &offered), None);
//! assert_eq!(accepts(None, &offered), None);
//! ```

/// One entry of a parsed `Accept` header.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    /// Lowercased type with any `;q=` suffix removed.
    pub media_type: String,
    /// The `q` value, `1.0` when absent.
    pub priority: f32,
}

impl MediaRange {
    /// Top-level type of a `type/*` range, `None` for anything else.
    fn wildcard_prefix(&self) -> Option<&str> {
        let prefix = self.media_type.strip_suffix("/*")?;
        (!prefix.is_empty()).then_some(prefix)
    }
}

/// Parses an `Accept` header into ranges sorted by descending priority.
///
/// The sort is stable, so ranges with equal priority keep header order.
#[must_use]
pub fn parse_accept(header: &str) -> Vec<MediaRange> {
    let mut ranges: Vec<MediaRange> = header
        .split(',')
        .map(|token| token.trim().to_lowercase())
        .filter(|token| !token.is_empty())
        .map(|token| parse_range(&token))
        .collect();

    ranges.sort_by(|a, b| b.priority.total_cmp(&a.priority));
    ranges
}

fn parse_range(token: &str) -> MediaRange {
    if let Some((media_type, param)) = token.rsplit_once(';') {
        if let Some(q) = param.trim().strip_prefix("q=") {
            if let Ok(priority) = q.trim().parse::<f32>() {
                return MediaRange {
                    media_type: media_type.trim().to_string(),
                    priority,
                };
            }
        }
    }
    MediaRange {
        media_type: token.to_string(),
        priority: 1.0,
    }
}

/// Splits ranges sorted by [`parse_accept`] into runs of equal priority.
fn priority_groups(ranges: &[MediaRange]) -> impl Iterator<Item = &[MediaRange]> {
    let mut rest = ranges;
    std::iter::from_fn(move || {
        let first = rest.first()?;
        let len = rest
            .iter()
            .take_while(|r| r.priority.total_cmp(&first.priority).is_eq())
            .count();
        let (group, tail) = rest.split_at(len);
        rest = tail;
        Some(group)
    })
}

fn same_top_level(offered: &str, prefix: &str) -> bool {
    offered
        .split_once('/')
        .is_some_and(|(top, _)| top.eq_ignore_ascii_case(prefix))
}

/// Selects the offered type best matching an already parsed header.
#[must_use]
pub fn select<'a>(ranges: &[MediaRange], offered: &[&'a str]) -> Option<&'a str> {
    for group in priority_groups(ranges) {
        let exact = offered
            .iter()
            .copied()
            .find(|o| group.iter().any(|r| o.eq_ignore_ascii_case(&r.media_type)));
        if exact.is_some() {
            return exact;
        }
    }

    for group in priority_groups(ranges) {
        let wildcard = offered.iter().copied().find(|o| {
            group
                .iter()
                .filter_map(MediaRange::wildcard_prefix)
                .any(|prefix| same_top_level(o, prefix))
        });
        if wildcard.is_some() {
            return wildcard;
        }
    }

    if ranges.iter().any(|r| r.media_type == "*/*") {
        return offered.first().copied();
    }
    None
}

/// Selects the offered type best matching an `Accept` header value.
///
/// Returns `None` when the header is absent or nothing matches.
#[must_use]
pub fn accepts<'a>(header: Option<&str>, offered: &[&'a str]) -> Option<&'a str> {
    let ranges = parse_accept(header?);
    select(&ranges, offered)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFERED: [&str; 2] = ["text/html", "application/json"];

    #[test]
    fn test_exact_match() {
        assert_eq!(accepts(Some("text/html"), &OFFERED), Some("text/html"));
        assert_eq!(accepts(Some("Application/JSON"), &OFFERED), Some("application/json"));
    }

    #[test]
    fn test_subtype_wildcard() {
        assert_eq!(accepts(Some("text/*"), &OFFERED), Some("text/html"));
        assert_eq!(accepts(Some("application/*"), &OFFERED), Some("application/json"));
    }

    #[test]
    fn test_catch_all_returns_first_offered() {
        assert_eq!(accepts(Some("*/*"), &OFFERED), Some("text/html"));
        assert_eq!(accepts(Some("*/*"), &[]), None);
    }

    #[test]
    fn test_priority_ordering() {
        assert_eq!(
            accepts(Some("application/json, text/html; q=.1"), &OFFERED),
            Some("application/json")
        );
        assert_eq!(
            accepts(Some("application/json;q=0.2, text/html;q=0.9"), &OFFERED),
            Some("text/html")
        );
    }

    #[test]
    fn test_equal_priority_ties_follow_offered_order() {
        let offered = ["text/html", "application/json"];
        assert_eq!(accepts(Some("application/json, text/html"), &offered), Some("text/html"));
        assert_eq!(
            accepts(Some("application/json;q=0.5, text/html;q=0.5"), &offered),
            Some("text/html")
        );
        // A higher priority still wins over the handler's order.
        assert_eq!(
            accepts(Some("application/json, text/html;q=0.9"), &offered),
            Some("application/json")
        );
    }

    #[test]
    fn test_wildcard_ties_follow_offered_order() {
        let offered = ["image/png", "text/plain"];
        assert_eq!(accepts(Some("text/*, image/*"), &offered), Some("image/png"));
        assert_eq!(accepts(Some("text/*, image/*;q=0.1"), &offered), Some("text/plain"));
    }

    #[test]
    fn test_exact_beats_wildcard_regardless_of_priority() {
        assert_eq!(
            accepts(Some("text/*;q=1, application/json;q=0.1"), &OFFERED),
            Some("application/json")
        );
    }

    #[test]
    fn test_no_match_and_missing_header() {
        assert_eq!(accepts(Some("image/png, audio/*"), &OFFERED), None);
        assert_eq!(accepts(None, &OFFERED), None);
        assert_eq!(accepts(Some(""), &OFFERED), None);
    }

    #[test]
    fn test_parse_keeps_non_q_parameters() {
        let ranges = parse_accept("text/html;level=1, text/plain; q=0.5");
        assert_eq!(ranges[0].media_type, "text/html;level=1");
        assert!((ranges[0].priority - 1.0).abs() < f32::EPSILON);
        assert_eq!(ranges[1].media_type, "text/plain");
        assert!((ranges[1].priority - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_equal_priorities_keep_header_order() {
        let ranges = parse_accept("b/b, a/a, c/c;q=0.5, d/d");
        let order: Vec<_> = ranges.iter().map(|r| r.media_type.as_str()).collect();
        assert_eq!(order, vec!["b/b", "a/a", "d/d", "c/c"]);
    }
}
