//! Route pattern compilation and matching.
//!
//! # Responsibilities
//! - Parse a pattern into literal and named-capture segments
//! - Compile inline capture regexes once, at registration time
//! - Match a request path segment by segment, collecting captures by name
//!
//! # Syntax
//! ```text
//! /users/:id              capture "id", any non-empty segment
//! /users/:id([0-9]+)      capture "id", segment must match [0-9]+
//! /static/logo.png        literal segments only
//! ```
//!
//! # Design Decisions
//! - Segment-wise matching: a capture never spans '/'
//! - Literal segments compare exactly (case-sensitive)
//! - Exactly one leading '/' is canonicalized; trailing slashes are significant

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;

use crate::routing::RouteError;

/// How specific a single segment is. Higher ranks win when two patterns
/// could match the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SegmentRank {
    /// `:name` without an inline regex.
    AnyCapture,
    /// `:name(regex)`.
    RegexCapture,
    /// A literal segment.
    Literal,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Capture { name: String, regex: Option<Regex> },
}

impl Segment {
    fn rank(&self) -> SegmentRank {
        match self {
            Segment::Literal(_) => SegmentRank::Literal,
            Segment::Capture { regex: None, .. } => SegmentRank::AnyCapture,
            Segment::Capture { regex: Some(_), .. } => SegmentRank::RegexCapture,
        }
    }

    fn accepts(&self, value: &str) -> bool {
        match self {
            Segment::Literal(literal) => literal == value,
            Segment::Capture { regex: None, .. } => !value.is_empty(),
            Segment::Capture { regex: Some(regex), .. } => regex.is_match(value),
        }
    }
}

/// Values captured by a successful match, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    /// Look up a capture by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub(crate) fn extend(&mut self, other: Params) {
        self.0.extend(other.0);
    }
}

impl IntoIterator for Params {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A compiled route pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Compile a pattern.
    ///
    /// Fails if a capture segment is malformed, carries an invalid regex, or
    /// reuses a name already captured earlier in the same pattern.
    pub fn compile(source: &str) -> Result<Self, RouteError> {
        let mut segments = Vec::new();

        for raw in split_path(source) {
            let segment = match raw.strip_prefix(':') {
                Some(capture) => parse_capture(source, capture)?,
                None => Segment::Literal(raw.to_string()),
            };

            if let Segment::Capture { name, .. } = &segment {
                let duplicate = segments.iter().any(|s| {
                    matches!(s, Segment::Capture { name: other, .. } if other == name)
                });
                if duplicate {
                    return Err(invalid(source, format!("capture name '{}' used twice", name)));
                }
            }

            segments.push(segment);
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The root pattern "/", which has no segments.
    pub(crate) fn root() -> Self {
        Self {
            source: "/".to_string(),
            segments: Vec::new(),
        }
    }

    /// The pattern as it was written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of '/'-delimited segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True for the root pattern "/".
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Names of all captures, in order.
    pub fn capture_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Capture { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Per-segment specificity, used to order candidates.
    pub fn ranks(&self) -> Vec<SegmentRank> {
        self.segments.iter().map(Segment::rank).collect()
    }

    /// Match a full request path.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let segments: Vec<&str> = split_path(path).collect();
        self.match_segments(&segments)
    }

    /// Match exactly the given segments.
    pub(crate) fn match_segments(&self, segments: &[&str]) -> Option<Params> {
        if segments.len() != self.segments.len() {
            return None;
        }
        self.match_leading(segments)
    }

    /// Match the leading segments, leaving the rest for nested patterns.
    pub(crate) fn match_prefix(&self, segments: &[&str]) -> Option<Params> {
        if segments.len() < self.segments.len() {
            return None;
        }
        self.match_leading(&segments[..self.segments.len()])
    }

    fn match_leading(&self, segments: &[&str]) -> Option<Params> {
        let mut params = Vec::new();
        for (segment, value) in self.segments.iter().zip(segments) {
            if !segment.accepts(value) {
                return None;
            }
            if let Segment::Capture { name, .. } = segment {
                params.push((name.clone(), (*value).to_string()));
            }
        }
        Some(Params(params))
    }

    /// True when both patterns accept exactly the same paths, whatever their
    /// capture names.
    pub(crate) fn same_shape(&self, other: &Pattern) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|pair| match pair {
                    (Segment::Literal(a), Segment::Literal(b)) => a == b,
                    (Segment::Capture { regex: a, .. }, Segment::Capture { regex: b, .. }) => {
                        a.as_ref().map(Regex::as_str) == b.as_ref().map(Regex::as_str)
                    }
                    _ => false,
                })
    }

    /// Orders patterns so that the one to try first compares as `Less`:
    /// more segments first, then more specific segments.
    pub(crate) fn precedence(&self, other: &Pattern) -> Ordering {
        other
            .len()
            .cmp(&self.len())
            .then_with(|| other.ranks().cmp(&self.ranks()))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Split a path into segments after canonicalizing the leading '/'.
/// The root path yields no segments.
pub(crate) fn split_path(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = path.trim_start_matches('/');
    let mut segments = trimmed.split('/');
    if trimmed.is_empty() {
        // `"".split('/')` yields one empty segment; the root has none.
        segments.next();
    }
    segments
}

/// Normalize a registration pattern: one leading '/', no empty segments,
/// no trailing '/' except for the root.
pub fn normalize(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 1);
    for segment in pattern.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

fn parse_capture(source: &str, capture: &str) -> Result<Segment, RouteError> {
    let name_len = capture
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(capture.len());
    let (name, rest) = capture.split_at(name_len);

    if name.is_empty() {
        return Err(invalid(source, "capture segment without a name"));
    }

    if rest.is_empty() {
        return Ok(Segment::Capture {
            name: name.to_string(),
            regex: None,
        });
    }

    let inner = rest
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or_else(|| invalid(source, format!("unbalanced regex in capture '{}'", name)))?;

    if inner.is_empty() {
        return Err(invalid(source, format!("empty regex in capture '{}'", name)));
    }
    if !is_balanced(inner) {
        return Err(invalid(source, format!("unbalanced regex in capture '{}'", name)));
    }

    let regex = Regex::new(&format!("^(?:{})$", inner))
        .map_err(|e| invalid(source, format!("capture '{}': {}", name, e)))?;

    Ok(Segment::Capture {
        name: name.to_string(),
        regex: Some(regex),
    })
}

/// Parenthesis balance, skipping escapes and character classes.
fn is_balanced(regex: &str) -> bool {
    let mut depth = 0usize;
    let mut chars = regex.chars();
    let mut in_class = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => depth += 1,
            ')' if !in_class => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            _ => {}
        }
    }

    depth == 0 && !in_class
}

fn invalid(pattern: &str, reason: impl Into<String>) -> RouteError {
    RouteError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_match() {
        let pattern = Pattern::compile("/ping").unwrap();
        assert!(pattern.matches("/ping").unwrap().is_empty());
        assert!(pattern.matches("/pong").is_none());
        assert!(pattern.matches("/ping/").is_none()); // trailing slash is significant
        assert!(pattern.matches("/Ping").is_none()); // case-sensitive
    }

    #[test]
    fn test_leading_slash_canonicalized() {
        let pattern = Pattern::compile("/ping").unwrap();
        assert!(pattern.matches("//ping").is_some());
        assert!(pattern.matches("ping").is_some());
    }

    #[test]
    fn test_root() {
        let pattern = Pattern::compile("/").unwrap();
        assert!(pattern.is_empty());
        assert!(pattern.matches("/").is_some());
        assert!(pattern.matches("/a").is_none());
    }

    #[test]
    fn test_default_capture() {
        let pattern = Pattern::compile("/users/:id").unwrap();
        let params = pattern.matches("/users/42").unwrap();
        assert_eq!(params.get("id"), Some("42"));

        // Captures never span '/' and never match an empty segment
        assert!(pattern.matches("/users/42/posts").is_none());
        assert!(pattern.matches("/users/").is_none());
    }

    #[test]
    fn test_regex_capture() {
        let pattern = Pattern::compile("/users/:id([0-9]+)").unwrap();
        assert_eq!(pattern.matches("/users/7").unwrap().get("id"), Some("7"));
        assert!(pattern.matches("/users/abc").is_none());
        // Regex is anchored to the whole segment
        assert!(pattern.matches("/users/7a").is_none());
    }

    #[test]
    fn test_multiple_captures() {
        let pattern = Pattern::compile("/blog/:category/:post([a-z-]+)").unwrap();
        let params = pattern.matches("/blog/rust/request-routers").unwrap();
        assert_eq!(params.get("category"), Some("rust"));
        assert_eq!(params.get("post"), Some("request-routers"));
        assert_eq!(
            pattern.capture_names().collect::<Vec<_>>(),
            vec!["category", "post"]
        );
    }

    #[test]
    fn test_invalid_patterns() {
        for source in [
            "/users/:id([0-9]+",
            "/users/:id(",
            "/users/:id())",
            "/users/:id()",
            "/users/:",
            "/users/:id[0-9]",
            "/users/:id(a/b)",
            "/users/:id([0-9)",
        ] {
            let err = Pattern::compile(source).unwrap_err();
            assert!(
                matches!(err, RouteError::InvalidPattern { .. }),
                "{} should not compile",
                source
            );
        }
    }

    #[test]
    fn test_duplicate_capture_name() {
        let err = Pattern::compile("/:id/posts/:id").unwrap_err();
        assert!(err.to_string().contains("used twice"));
    }

    #[test]
    fn test_escaped_parens_and_classes() {
        let pattern = Pattern::compile(r"/files/:name([(]\)?[a-z]+)").unwrap();
        assert!(pattern.matches("/files/(abc").is_some());
        assert!(pattern.matches("/files/()abc").is_some());
        assert!(pattern.matches("/files/abc)").is_none());
    }

    #[test]
    fn test_prefix_match() {
        let pattern = Pattern::compile("/orgs/:org").unwrap();
        let segments = ["orgs", "acme", "repos"];
        let params = pattern.match_prefix(&segments).unwrap();
        assert_eq!(params.get("org"), Some("acme"));
        assert!(pattern.match_prefix(&["orgs"]).is_none());
    }

    #[test]
    fn test_precedence() {
        let literal = Pattern::compile("/users/me").unwrap();
        let regex = Pattern::compile("/users/:id([0-9]+)").unwrap();
        let any = Pattern::compile("/users/:name").unwrap();
        let longer = Pattern::compile("/users/:id/posts").unwrap();

        assert_eq!(literal.precedence(&regex), Ordering::Less);
        assert_eq!(regex.precedence(&any), Ordering::Less);
        assert_eq!(longer.precedence(&literal), Ordering::Less);
    }

    #[test]
    fn test_same_shape_ignores_capture_names() {
        let id = Pattern::compile("/users/:id").unwrap();
        let name = Pattern::compile("/users/:name").unwrap();
        let digits = Pattern::compile("/users/:id([0-9]+)").unwrap();
        let me = Pattern::compile("/users/me").unwrap();

        assert!(id.same_shape(&name));
        assert!(digits.same_shape(&Pattern::compile("/users/:uid([0-9]+)").unwrap()));
        assert!(!id.same_shape(&digits));
        assert!(!id.same_shape(&me));
        assert!(!id.same_shape(&Pattern::compile("/users/:id/posts").unwrap()));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("api"), "/api");
        assert_eq!(normalize("//api//v1/"), "/api/v1");
    }
}
