//! Route matching logic.
//!
//! # Responsibilities
//! - Parse Express-style path patterns (`/user/:id`, `/:slug?`, `/files/*`)
//! - Match the request method against the route verb
//! - Extract named path parameters
//!
//! # Design Decisions
//! - Literal segments compare case-insensitively
//! - A trailing slash on the request path is ignored
//! - `use` routes match by segment prefix
//! - No regex, O(segments) matching

use std::collections::HashMap;

use axum::http::Method;

use crate::routing::descriptor::Verb;

/// Path parameters captured by the matched route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams(HashMap<String, String>);

impl RouteParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn insert(&mut self, name: &str, raw: &str) {
        let value = urlencoding::decode(raw)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| raw.to_string());
        self.0.insert(name.to_string(), value);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Param { name: String, optional: bool },
    Wildcard,
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    parts: Vec<Part>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Self {
        let parts = split(pattern)
            .map(|segment| {
                if segment == "*" {
                    Part::Wildcard
                } else if let Some(name) = segment.strip_prefix(':') {
                    match name.strip_suffix('?') {
                        Some(name) => Part::Param {
                            name: name.to_string(),
                            optional: true,
                        },
                        None => Part::Param {
                            name: name.to_string(),
                            optional: false,
                        },
                    }
                } else {
                    Part::Literal(segment.to_string())
                }
            })
            .collect();

        Self {
            raw: pattern.to_string(),
            parts,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match `path` exactly (or by prefix when `prefix` is set).
    pub fn matches(&self, path: &str, prefix: bool) -> Option<RouteParams> {
        let segments: Vec<&str> = split(path).collect();
        let mut params = RouteParams::default();
        let mut index = 0;

        for part in &self.parts {
            match part {
                Part::Wildcard => {
                    params.insert("0", &segments[index.min(segments.len())..].join("/"));
                    return Some(params);
                }
                Part::Literal(literal) => {
                    let segment = segments.get(index)?;
                    if !segment.eq_ignore_ascii_case(literal) {
                        return None;
                    }
                    index += 1;
                }
                Part::Param { name, optional } => match segments.get(index) {
                    Some(segment) => {
                        params.insert(name, segment);
                        index += 1;
                    }
                    None if *optional => {}
                    None => return None,
                },
            }
        }

        if index == segments.len() || prefix {
            Some(params)
        } else {
            None
        }
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Verb + path matcher for one compiled route.
#[derive(Debug, Clone)]
pub struct RouteMatcher {
    verb: Verb,
    pattern: PathPattern,
}

impl RouteMatcher {
    pub fn new(verb: Verb, path: &str) -> Self {
        Self {
            verb,
            pattern: PathPattern::parse(path),
        }
    }

    /// Returns the captured parameters if the request is served by this route.
    pub fn matches(&self, method: &Method, path: &str) -> Option<RouteParams> {
        if !self.verb.accepts(method) {
            return None;
        }
        self.pattern.matches(path, self.verb == Verb::Use)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_param() {
        let pattern = PathPattern::parse("/admin/user/:id/update");

        let params = pattern.matches("/admin/user/42/update", false).unwrap();
        assert_eq!(params.get("id"), Some("42"));

        assert!(pattern.matches("/Admin/User/42/update/", false).is_some());
        assert!(pattern.matches("/admin/user/42", false).is_none());
        assert!(pattern.matches("/admin/user/42/update/extra", false).is_none());
    }

    #[test]
    fn test_root_pattern() {
        let pattern = PathPattern::parse("/");
        assert!(pattern.matches("/", false).is_some());
        assert!(pattern.matches("/anything", false).is_none());
        assert!(pattern.matches("/anything", true).is_some());
    }

    #[test]
    fn test_optional_param() {
        let pattern = PathPattern::parse("/blog/:slug?");
        assert_eq!(pattern.matches("/blog", false).unwrap().len(), 0);
        assert_eq!(pattern.matches("/blog/hello", false).unwrap().get("slug"), Some("hello"));
    }

    #[test]
    fn test_wildcard_captures_rest() {
        let pattern = PathPattern::parse("/files/*");
        let params = pattern.matches("/files/a/b.txt", false).unwrap();
        assert_eq!(params.get("0"), Some("a/b.txt"));
    }

    #[test]
    fn test_params_are_decoded() {
        let pattern = PathPattern::parse("/user/:name");
        let params = pattern.matches("/user/jane%20doe", false).unwrap();
        assert_eq!(params.get("name"), Some("jane doe"));
    }

    #[test]
    fn test_route_matcher_checks_verb() {
        let matcher = RouteMatcher::new(Verb::Post, "/login");
        assert!(matcher.matches(&Method::POST, "/login").is_some());
        assert!(matcher.matches(&Method::GET, "/login").is_none());

        let middleware = RouteMatcher::new(Verb::Use, "/api");
        assert!(middleware.matches(&Method::DELETE, "/api/v1/items").is_some());
        assert!(middleware.matches(&Method::GET, "/apis").is_none());
    }
}
