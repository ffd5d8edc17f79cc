//! Glob patterns over object paths.
//!
//! Patterns are relative to a dataset root and use `/` separators:
//! `*` matches within one path segment, `?` matches one character and a
//! `**` segment matches any number of segments.

use regex::Regex;

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct FilePattern {
    pattern: String,
    prefix: String,
    regex: Regex,
}

fn is_literal(segment: &str) -> bool {
    !segment.contains(['*', '?'])
}

fn segment_regex(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len() * 2);
    for c in segment.chars() {
        match c {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    out
}

impl FilePattern {
    /// Compile a glob pattern.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let trimmed = pattern.trim_matches('/');
        let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();

        let mut expr = String::from("^");
        for (i, segment) in segments.iter().enumerate() {
            let last = i + 1 == segments.len();
            match (*segment, last) {
                ("**", true) => expr.push_str(".*"),
                ("**", false) => expr.push_str("(?:[^/]+/)*"),
                (segment, true) => expr.push_str(&segment_regex(segment)),
                (segment, false) => {
                    expr.push_str(&segment_regex(segment));
                    expr.push('/');
                }
            }
        }
        expr.push('$');

        // The last segment names files, so it never narrows the listing.
        let directories = segments.len().saturating_sub(1);
        let prefix = segments[..directories]
            .iter()
            .take_while(|s| is_literal(s))
            .copied()
            .collect::<Vec<_>>()
            .join("/");

        Ok(Self {
            pattern: pattern.to_string(),
            prefix,
            regex: Regex::new(&expr)?,
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Longest leading run of literal directory segments.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether a path relative to the dataset root matches.
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_song_pattern() {
        let pattern = FilePattern::new("song_data/*/*/*/*.json").unwrap();

        assert_eq!(pattern.prefix(), "song_data");
        assert!(pattern.matches("song_data/A/B/C/TRABCEI128F424C983.json"));
        assert!(!pattern.matches("song_data/A/B/TRABCEI128F424C983.json"));
        assert!(!pattern.matches("song_data/A/B/C/D/TRABCEI128F424C983.json"));
        assert!(!pattern.matches("song_data/A/B/C/TRABCEI128F424C983.json.bak"));
    }

    #[test]
    fn test_flat_log_pattern() {
        let pattern = FilePattern::new("log_data/*.json").unwrap();

        assert_eq!(pattern.prefix(), "log_data");
        assert!(pattern.matches("log_data/2018-11-01-events.json"));
        assert!(!pattern.matches("log_data/2018/11/2018-11-01-events.json"));
    }

    #[test]
    fn test_double_star_spans_segments() {
        let pattern = FilePattern::new("log_data/**/*.json").unwrap();

        assert!(pattern.matches("log_data/a.json"));
        assert!(pattern.matches("log_data/2018/11/a.json"));
        assert!(!pattern.matches("song_data/a.json"));
    }

    #[test]
    fn test_question_mark_and_literal_dots() {
        let pattern = FilePattern::new("data/part-?.json").unwrap();

        assert!(pattern.matches("data/part-1.json"));
        assert!(!pattern.matches("data/part-12.json"));
        assert!(!pattern.matches("data/part-1xjson"));
    }

    #[test]
    fn test_prefix_stops_at_first_wildcard() {
        let pattern = FilePattern::new("raw/*/events/*.json").unwrap();
        assert_eq!(pattern.prefix(), "raw");

        let pattern = FilePattern::new("*.json").unwrap();
        assert_eq!(pattern.prefix(), "");

        let pattern = FilePattern::new("log_data/events.json").unwrap();
        assert_eq!(pattern.prefix(), "log_data");
        assert!(pattern.matches("log_data/events.json"));
    }
}
