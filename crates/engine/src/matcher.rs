//! Package name and repository id patterns

use globset::{GlobBuilder, GlobMatcher};

/// Case-insensitive `*`/`?` pattern
#[derive(Debug, Clone)]
pub struct NameMatcher {
    pattern: String,
    glob: Option<GlobMatcher>,
}

impl NameMatcher {
    /// Compile a pattern; one that is not a valid glob matches literally
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .ok()
            .map(|glob| glob.compile_matcher());
        Self {
            pattern: pattern.to_lowercase(),
            glob,
        }
    }

    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        match &self.glob {
            Some(glob) => glob.is_match(text),
            None => self.pattern == text.to_lowercase(),
        }
    }

    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.pattern.contains(['*', '?', '['])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards_and_case() {
        let m = NameMatcher::new("Lib*-devel");
        assert!(m.is_match("libfoo-devel"));
        assert!(!m.is_match("libfoo"));
        assert!(m.is_wildcard());

        let q = NameMatcher::new("vi?");
        assert!(q.is_match("vim"));
        assert!(!q.is_match("vimx"));
    }

    #[test]
    fn invalid_glob_matches_literally() {
        let m = NameMatcher::new("foo[");
        assert!(m.is_match("FOO["));
        assert!(!m.is_match("foo"));
    }
}
