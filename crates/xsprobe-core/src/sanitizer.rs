//! The suspicious-content predicate seam.
//!
//! The worker queues a fragment only when sanitizing it would change
//! it: content that survives sanitization untouched is not suspicious.
//! The sanitizer itself is an external collaborator behind
//! [`ContentSanitizer`]; [`BasicMarkupSanitizer`] is a conservative
//! reference implementation for the CLI and tests.

use std::sync::OnceLock;

use regex::Regex;

/// External sanitizer seam.
pub trait ContentSanitizer: Send + Sync {
    /// Return the sanitized form of `content`.
    fn sanitize(&self, content: &str) -> String;

    /// A fragment is suspicious iff sanitizing it would alter it.
    fn is_suspicious(&self, content: &str) -> bool {
        self.sanitize(content) != content
    }
}

fn script_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("static pattern")
    })
}

fn dangerous_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)</?\s*(script|iframe|object|embed|frame|frameset|form|base)\b[^>]*>")
            .expect("static pattern")
    })
}

fn event_handler_attr() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\son\w+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#).expect("static pattern")
    })
}

fn script_url_attr() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\s(href|src)\s*=\s*(?:"\s*javascript:[^"]*"|'\s*javascript:[^']*')"#)
            .expect("static pattern")
    })
}

/// Conservative regex-based markup sanitizer.
///
/// Strips script blocks, script-bearing tags, inline event handlers,
/// and `javascript:` URLs. Deliberately over-strips rather than
/// under-strips: a false positive costs one wasted render, a false
/// negative misses an execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicMarkupSanitizer;

impl ContentSanitizer for BasicMarkupSanitizer {
    fn sanitize(&self, content: &str) -> String {
        let out = script_block().replace_all(content, "");
        let out = dangerous_tag().replace_all(&out, "");
        let out = event_handler_attr().replace_all(&out, "");
        let out = script_url_attr().replace_all(&out, "");
        out.into_owned()
    }
}
