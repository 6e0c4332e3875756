// Copyright (C) 2025 Barn Authors. This program is free software: you can
// redistribute it and/or modify it under the terms of the GNU General Public
// License as published by the Free Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

/// A verb name pattern may contain at most one `*`.
pub fn verb_pattern_valid(pattern: &str) -> bool {
    pattern.chars().filter(|c| *c == '*').count() <= 1
}

/// Match one verb-name pattern against a candidate name, case-insensitively.
/// `pre*post` matches any name that begins with `pre` and ends with `post`;
/// a pattern without `*` must match exactly.
pub fn verbname_matches(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let candidate = candidate.to_lowercase();
    match pattern.split_once('*') {
        None => pattern == candidate,
        Some((pre, post)) => {
            if post.contains('*') {
                // Malformed pattern; never matches.
                return false;
            }
            candidate.len() >= pre.len().max(post.len())
                && candidate.starts_with(pre)
                && candidate.ends_with(post)
        }
    }
}

/// Match a candidate against a space-separated set of verb name patterns, as
/// stored on a verb definition.
pub fn verbnames_match(names: &str, candidate: &str) -> bool {
    names
        .split(' ')
        .any(|pattern| !pattern.is_empty() && verbname_matches(pattern, candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("co*nnect", "connect", true; "wildcard minimal")]
    #[test_case("co*nnect", "connnnect", true; "wildcard stuffed")]
    #[test_case("co*nnect", "co", false; "prefix alone is not enough")]
    #[test_case("co*nnect", "konnect", false; "wrong prefix")]
    #[test_case("look", "LOOK", true; "exact is caseless")]
    #[test_case("look", "looks", false; "exact must be exact")]
    #[test_case("*", "anything", true; "bare star matches all")]
    #[test_case("foo*", "foobar", true; "open suffix")]
    #[test_case("foo*", "fo", false; "prefix shorter than stem")]
    fn matching(pattern: &str, name: &str, expected: bool) {
        assert_eq!(verbname_matches(pattern, name), expected);
    }

    #[test]
    fn pattern_validity() {
        assert!(verb_pattern_valid("foo*bar"));
        assert!(verb_pattern_valid("foobar"));
        assert!(!verb_pattern_valid("foo*bar*"));
    }

    #[test]
    fn multi_name_sets() {
        assert!(verbnames_match("get take", "Take"));
        assert!(!verbnames_match("get take", "drop"));
    }
}
