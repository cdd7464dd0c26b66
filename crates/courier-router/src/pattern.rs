//! Route patterns and path matching.
//!
//! A pattern is one of three shapes:
//!
//! - **Literal**: a plain path such as `/status`. Stored lowercased and
//!   compared against the lowercased request path, so `/STATUS` matches but
//!   `/status/` does not.
//! - **Template**: a path containing `:name` segments, such as
//!   `/users/:id`. Compiled once into an anchored, case-insensitive regex with
//!   one `[^/]+` capture per name.
//! - **Custom**: any [`PathMatcher`], including a caller-compiled
//!   [`regex::Regex`] whose named groups become parameters.
//!
//! Parameter names follow `[a-z][a-z0-9_]*`, case-insensitive. A `/:` that is
//! not followed by a letter stays part of the literal text.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::error::RoutingError;
use crate::params::Params;

/// A matcher deciding whether a request path belongs to a route.
///
/// Implement this for routing rules that neither literals nor templates can
/// express. Returning `Some` means the path matched; the returned parameters
/// are merged into the request.
pub trait PathMatcher: Send + Sync + fmt::Debug {
    /// Tests `path`, returning the extracted parameters on a match.
    fn match_path(&self, path: &str) -> Option<Params>;
}

impl PathMatcher for Regex {
    fn match_path(&self, path: &str) -> Option<Params> {
        let captures = self.captures(path)?;
        let params = self
            .capture_names()
            .flatten()
            .filter_map(|name| {
                captures
                    .name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();
        Some(params)
    }
}

/// A compiled route pattern.
#[derive(Debug, Clone)]
pub enum RoutePattern {
    /// Exact, case-insensitive path.
    Literal(String),
    /// Path with `:name` captures.
    Template(Template),
    /// Caller-supplied matcher.
    Custom(Arc<dyn PathMatcher>),
}

impl RoutePattern {
    /// Compiles a pattern string.
    ///
    /// Strings without parameter segments become literals; everything else is
    /// compiled into a template.
    ///
    /// ```rust
    /// use courier_router::RoutePattern;
    ///
    /// let literal = RoutePattern::parse("/Status").unwrap();
    /// assert!(literal.match_path("/status").is_some());
    ///
    /// let template = RoutePattern::parse("/users/:id").unwrap();
    /// let params = template.match_path("/USERS/42").unwrap();
    /// assert_eq!(params.get("id"), Some("42"));
    /// ```
    pub fn parse(pattern: &str) -> Result<Self, RoutingError> {
        let segments = split_template(pattern);
        if segments.iter().all(|s| matches!(s, Segment::Text(_))) {
            return Ok(Self::Literal(pattern.to_lowercase()));
        }
        Template::compile(pattern, &segments).map(Self::Template)
    }

    /// Wraps a custom matcher.
    pub fn custom(matcher: impl PathMatcher + 'static) -> Self {
        Self::Custom(Arc::new(matcher))
    }

    /// Tests `path` against this pattern.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<Params> {
        match self {
            Self::Literal(literal) => (path.to_lowercase() == *literal).then(Params::new),
            Self::Template(template) => template.match_path(path),
            Self::Custom(matcher) => matcher.match_path(path),
        }
    }
}

/// Conversion into a [`RoutePattern`] at registration time.
pub trait IntoPattern {
    /// Compiles `self` into a pattern.
    fn into_pattern(self) -> Result<RoutePattern, RoutingError>;
}

impl IntoPattern for RoutePattern {
    fn into_pattern(self) -> Result<RoutePattern, RoutingError> {
        Ok(self)
    }
}

impl IntoPattern for &str {
    fn into_pattern(self) -> Result<RoutePattern, RoutingError> {
        RoutePattern::parse(self)
    }
}

impl IntoPattern for String {
    fn into_pattern(self) -> Result<RoutePattern, RoutingError> {
        RoutePattern::parse(&self)
    }
}

impl IntoPattern for &String {
    fn into_pattern(self) -> Result<RoutePattern, RoutingError> {
        RoutePattern::parse(self)
    }
}

impl IntoPattern for Regex {
    fn into_pattern(self) -> Result<RoutePattern, RoutingError> {
        Ok(RoutePattern::custom(self))
    }
}

/// A template pattern compiled into a regex.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    regex: Regex,
    names: Vec<String>,
}

impl Template {
    fn compile(source: &str, segments: &[Segment<'_>]) -> Result<Self, RoutingError> {
        let mut expr = String::from("(?i)^");
        let mut names = Vec::new();
        for segment in segments {
            match segment {
                Segment::Text(text) => expr.push_str(&regex::escape(text)),
                Segment::Param(name) => {
                    if names.iter().any(|n: &String| n.eq_ignore_ascii_case(name)) {
                        return Err(RoutingError::invalid_pattern(
                            source,
                            format!("parameter ':{name}' appears more than once"),
                        ));
                    }
                    expr.push_str("/(?P<");
                    expr.push_str(name);
                    expr.push_str(">[^/]+)");
                    names.push((*name).to_string());
                }
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| RoutingError::invalid_pattern(source, e))?;
        Ok(Self {
            source: source.to_string(),
            regex,
            names,
        })
    }

    /// The template as registered.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parameter names in template order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    fn match_path(&self, path: &str) -> Option<Params> {
        let captures = self.regex.captures(path)?;
        let mut params = Params::new();
        for name in &self.names {
            if let Some(value) = captures.name(name) {
                params.push(name.clone(), value.as_str());
            }
        }
        Some(params)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    /// A `/:name` segment; holds the name without the leading `/:`.
    Param(&'a str),
}

/// Splits a pattern into literal text and `/:name` parameter segments.
fn split_template(pattern: &str) -> Vec<Segment<'_>> {
    let bytes = pattern.as_bytes();
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'/'
            && bytes.get(i + 1) == Some(&b':')
            && bytes.get(i + 2).is_some_and(u8::is_ascii_alphabetic)
        {
            let name_start = i + 2;
            let name_end = bytes[name_start..]
                .iter()
                .position(|b| !(b.is_ascii_alphanumeric() || *b == b'_'))
                .map_or(bytes.len(), |offset| name_start + offset);

            if text_start < i {
                segments.push(Segment::Text(&pattern[text_start..i]));
            }
            segments.push(Segment::Param(&pattern[name_start..name_end]));
            text_start = name_end;
            i = name_end;
        } else {
            i += 1;
        }
    }
    if text_start < pattern.len() {
        segments.push(Segment::Text(&pattern[text_start..]));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_template_segments() {
        assert_eq!(
            split_template("/users/:id/posts/:post_id"),
            vec![
                Segment::Text("/users"),
                Segment::Param("id"),
                Segment::Text("/posts"),
                Segment::Param("post_id"),
            ]
        );
        assert_eq!(split_template("/plain"), vec![Segment::Text("/plain")]);
        assert_eq!(split_template("/:1abc"), vec![Segment::Text("/:1abc")]);
        assert_eq!(split_template(""), Vec::<Segment<'_>>::new());
    }

    #[test]
    fn test_literal_is_case_insensitive_and_exact() {
        let pattern = RoutePattern::parse("/test").unwrap();
        assert!(matches!(pattern, RoutePattern::Literal(_)));

        assert!(pattern.match_path("/test").is_some());
        assert!(pattern.match_path("/TEST").is_some());
        assert!(pattern.match_path("/TEST/").is_none());
        assert!(pattern.match_path("a/TEST").is_none());
        assert!(pattern.match_path("/test?x=1").is_none());
    }

    #[test]
    fn test_template_extracts_each_parameter_once() {
        let pattern = RoutePattern::parse("/test/:id").unwrap();
        let params = pattern.match_path("/TEST/222").unwrap();

        assert_eq!(params.len(), 1);
        assert_eq!(params.get("id"), Some("222"));
    }

    #[test]
    fn test_template_does_not_cross_segments() {
        let pattern = RoutePattern::parse("/files/:name").unwrap();
        assert!(pattern.match_path("/files/a/b").is_none());
        assert!(pattern.match_path("/files/").is_none());
        assert!(pattern.match_path("/files").is_none());
    }

    #[test]
    fn test_template_escapes_literal_text() {
        let pattern = RoutePattern::parse("/v1.0/:item").unwrap();
        assert!(pattern.match_path("/v1.0/x").is_some());
        assert!(pattern.match_path("/v1x0/x").is_none());
    }

    #[test]
    fn test_template_keeps_trailing_text() {
        let pattern = RoutePattern::parse("/reports/:year.csv").unwrap();
        let params = pattern.match_path("/reports/2024.csv").unwrap();
        assert_eq!(params.get("year"), Some("2024"));
    }

    #[test]
    fn test_duplicate_parameter_names_are_rejected() {
        let err = RoutePattern::parse("/a/:id/b/:ID").unwrap_err();
        assert!(matches!(err, RoutingError::InvalidPattern { .. }));
    }

    #[test]
    fn test_custom_regex_named_groups() {
        let regex = Regex::new(r"^/archive/(?P<year>\d{4})/(?P<month>\d{2})$").unwrap();
        let pattern = regex.into_pattern().unwrap();

        let params = pattern.match_path("/archive/2024/03").unwrap();
        assert_eq!(params.get("year"), Some("2024"));
        assert_eq!(params.get("month"), Some("03"));
        assert!(pattern.match_path("/archive/24/03").is_none());
    }

    #[test]
    fn test_custom_matcher() {
        #[derive(Debug)]
        struct Prefix;

        impl PathMatcher for Prefix {
            fn match_path(&self, path: &str) -> Option<Params> {
                let rest = path.strip_prefix("/static/")?;
                let mut params = Params::new();
                params.push("file", rest);
                Some(params)
            }
        }

        let pattern = RoutePattern::custom(Prefix);
        let params = pattern.match_path("/static/css/site.css").unwrap();
        assert_eq!(params.get("file"), Some("css/site.css"));
    }
}
