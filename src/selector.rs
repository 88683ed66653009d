//! Document selector: decides which documents the session tracks.

use glob::Pattern;
use lsp_types::Url;
use std::path::Path;

/// Glob matched against BASIC source documents.
pub const BASIC_SOURCE_GLOB: &str = "**/*.bas";

/// Matching rules (URI scheme + path glob) determining which open documents
/// are forwarded to the server. Static for the process lifetime.
#[derive(Debug, Clone)]
pub struct DocumentSelector {
    scheme: String,
    pattern: Pattern,
}

impl DocumentSelector {
    pub fn new(scheme: &str, pattern: &str) -> crate::Result<Self> {
        let pattern = Pattern::new(pattern)
            .map_err(|e| crate::ClientError::InvalidState(format!("bad selector glob: {e}")))?;
        Ok(DocumentSelector {
            scheme: scheme.to_string(),
            pattern,
        })
    }

    /// Selector for local-filesystem BASIC sources (`file` scheme, `**/*.bas`).
    pub fn basic_source() -> Self {
        DocumentSelector {
            scheme: "file".to_string(),
            // The literal is valid, so construction cannot fail.
            pattern: Pattern::new(BASIC_SOURCE_GLOB).unwrap_or_else(|_| Pattern::default()),
        }
    }

    pub fn matches(&self, uri: &Url) -> bool {
        uri.scheme() == self.scheme && self.pattern.matches_path(Path::new(uri.path()))
    }

    pub fn glob(&self) -> &str {
        self.pattern.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::DocumentSelector;
    use lsp_types::Url;

    #[test]
    fn test_matches_basic_source() {
        let selector = DocumentSelector::basic_source();
        let uri = Url::parse("file:///games/pong/main.bas").unwrap();
        assert!(selector.matches(&uri));
    }

    #[test]
    fn test_rejects_other_extensions() {
        let selector = DocumentSelector::basic_source();
        let uri = Url::parse("file:///games/pong/readme.txt").unwrap();
        assert!(!selector.matches(&uri));
    }

    #[test]
    fn test_rejects_non_file_scheme() {
        let selector = DocumentSelector::basic_source();
        let uri = Url::parse("untitled:/scratch.bas").unwrap();
        assert!(!selector.matches(&uri));
    }

    #[test]
    fn test_matches_deeply_nested() {
        let selector = DocumentSelector::basic_source();
        let uri = Url::parse("file:///a/b/c/d/e/game.bas").unwrap();
        assert!(selector.matches(&uri));
    }
}
