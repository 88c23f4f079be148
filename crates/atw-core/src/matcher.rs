//! Dot-separated event key patterns with single-segment `*` wildcards.
//!
//! A pattern matches a key when it has no more segments than the key and
//! every pattern segment is either `*` or equal to the key segment at the
//! same position. `player` and `player.*` therefore both match `player.join`.
//!
//! When several patterns match, the most specific one decides: more segments
//! first, then fewer wildcards. See [`MatchScore`].

/// Returns true if `pattern` matches the event `key`.
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    if pattern.is_empty() || key.is_empty() {
        return false;
    }

    let mut key_parts = key.split('.');
    for part in pattern.split('.') {
        match key_parts.next() {
            Some(key_part) if part == "*" || part == key_part => continue,
            _ => return false,
        }
    }
    true
}

/// How closely a pattern matches a key. Ordered so that the more specific
/// match compares greater: deeper patterns win, then patterns with fewer `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchScore {
    pub depth: usize,
    pub specificity: usize,
}

/// Score `pattern` against `key`, or `None` if it does not match.
pub fn match_score(pattern: &str, key: &str) -> Option<MatchScore> {
    if !pattern_matches(pattern, key) {
        return None;
    }
    let mut score = MatchScore {
        depth: 0,
        specificity: 0,
    };
    for part in pattern.split('.') {
        score.depth += 1;
        if part != "*" {
            score.specificity += 1;
        }
    }
    Some(score)
}

/// The best score any of `patterns` reaches against `key`.
pub fn best_match<'a, I>(patterns: I, key: &str) -> Option<MatchScore>
where
    I: IntoIterator<Item = &'a str>,
{
    patterns
        .into_iter()
        .filter_map(|pattern| match_score(pattern, key))
        .max()
}

/// The pattern with the best score against `key`. On a tie the earliest wins.
pub fn most_specific<'a, T, F>(entries: &'a [T], key: &str, pattern: F) -> Option<&'a T>
where
    F: Fn(&T) -> &str,
{
    let mut best: Option<(MatchScore, &T)> = None;
    for entry in entries {
        if let Some(score) = match_score(pattern(entry), key) {
            if best.map_or(true, |(current, _)| score > current) {
                best = Some((score, entry));
            }
        }
    }
    best.map(|(_, entry)| entry)
}

/// Returns true if the pattern contains a wildcard segment.
pub fn is_wildcard(pattern: &str) -> bool {
    pattern.split('.').any(|part| part == "*")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(pattern_matches("player.join", "player.join"));
        assert!(!pattern_matches("player.quit", "player.join"));
    }

    #[test]
    fn test_prefix_and_wildcard_match() {
        assert!(pattern_matches("player", "player.join"));
        assert!(pattern_matches("player.*", "player.join"));
        assert!(pattern_matches("*.damage", "entity.damage.player"));
        assert!(pattern_matches("player.*.block", "player.break.block"));
        assert!(!pattern_matches("player.*.block", "player.chat"));
    }

    #[test]
    fn test_longer_pattern_never_matches() {
        assert!(!pattern_matches("player.join.extra", "player.join"));
    }

    #[test]
    fn test_empty_inputs() {
        assert!(!pattern_matches("", "player.join"));
        assert!(!pattern_matches("player", ""));
    }

    #[test]
    fn test_score_prefers_depth_then_specificity() {
        let key = "player.command";
        assert!(match_score("player.command", key) > match_score("player.*", key));
        assert!(match_score("player.*", key) > match_score("player", key));
        assert!(match_score("*.command", key) < match_score("player.command", key));
        assert!(match_score("player.*", key) < match_score("player.command", key));
        assert_eq!(match_score("entity.*", key), None);
    }

    #[test]
    fn test_most_specific_pattern() {
        let patterns = ["*", "player.*", "player.chat", "*.chat"];
        let best = most_specific(&patterns, "player.chat", |p| *p);
        assert_eq!(best, Some(&"player.chat"));
        assert_eq!(most_specific(&patterns, "player.join", |p| *p), Some(&"player.*"));
        assert_eq!(most_specific(&patterns, "server.chat", |p| *p), Some(&"*.chat"));
        assert_eq!(
            best_match(patterns.iter().copied(), "world.load"),
            match_score("*", "world.load")
        );
    }

    #[test]
    fn test_is_wildcard() {
        assert!(is_wildcard("player.*"));
        assert!(!is_wildcard("player.join"));
        assert!(!is_wildcard("player.j*"));
    }
}
