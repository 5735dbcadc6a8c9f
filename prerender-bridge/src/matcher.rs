//! Decides per request path whether prerendering applies.
//!
//! Exclusions are checked first, in order; the first matching pattern
//! wins. Paths that are not excluded are looked up in the server route
//! table, whose default is a single `**` route in prerender mode.
//!
//! Pattern forms:
//!
//! - `/sockjs-node` matches the path itself and anything below it
//!   (`/sockjs-node/info`), but not `/sockjs-nodes`
//! - `/api/*/raw` and `/assets/**` are globs: `*` stays within one
//!   segment, `**` spans segments. A glob also matches everything below
//!   what it matched.
//!
//! Matching ignores ASCII case, so `/SockJS-Node/info` is excluded by
//! `/sockjs-node`.

use crate::{PrerenderError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A single compiled path pattern
#[derive(Debug, Clone)]
pub enum PathPattern {
    Prefix(String),
    Glob { source: String, regex: Regex },
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        if !pattern.contains('*') {
            return Ok(Self::Prefix(pattern.to_string()));
        }

        let mut expr = String::from("(?i)^");
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '*' {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    expr.push_str(".*");
                } else {
                    expr.push_str("[^/]*");
                }
            } else {
                expr.push_str(&regex::escape(&c.to_string()));
            }
        }
        expr.push_str("(?:/.*)?$");

        let regex = Regex::new(&expr).map_err(|e| {
            PrerenderError::Configuration(format!("invalid path pattern '{}': {}", pattern, e))
        })?;

        Ok(Self::Glob {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Prefix(prefix) => {
                if prefix.is_empty() {
                    return false;
                }
                match path.get(..prefix.len()) {
                    Some(head) if head.eq_ignore_ascii_case(prefix) => {
                        let rest = &path[prefix.len()..];
                        rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/')
                    }
                    _ => false,
                }
            }
            Self::Glob { regex, .. } => regex.is_match(path),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Prefix(prefix) => prefix,
            Self::Glob { source, .. } => source,
        }
    }
}

/// Ordered exclusion list, first match wins
#[derive(Debug, Clone, Default)]
pub struct ExclusionRuleSet {
    rules: Vec<PathPattern>,
}

impl ExclusionRuleSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let rules = patterns
            .iter()
            .map(|p| PathPattern::parse(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// The first rule matching `path`, if any
    pub fn first_match(&self, path: &str) -> Option<&PathPattern> {
        self.rules.iter().find(|rule| rule.matches(path))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// How a server route is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Render on the server (build-time prerendered pages are served the same way here)
    Prerender,
    /// Render on the server per request
    Server,
    /// Never render on the server; always ship the shell
    Client,
}

/// Entry of the server route table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRoute {
    pub path: String,
    pub render_mode: RenderMode,
}

impl ServerRoute {
    pub fn new(path: impl Into<String>, render_mode: RenderMode) -> Self {
        Self {
            path: path.into(),
            render_mode,
        }
    }

    /// The catch-all `**` prerender route
    pub fn catch_all() -> Self {
        Self::new("**", RenderMode::Prerender)
    }
}

/// URL matcher over immutable configuration
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    exclusions: ExclusionRuleSet,
    routes: Vec<(PathPattern, RenderMode)>,
}

impl UrlMatcher {
    pub fn new(exclusions: ExclusionRuleSet, routes: &[ServerRoute]) -> Result<Self> {
        let routes = routes
            .iter()
            .map(|route| Ok((PathPattern::parse(&route.path)?, route.render_mode)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { exclusions, routes })
    }

    /// Exclusions only, with the default catch-all route
    pub fn with_exclusions<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        Self::new(ExclusionRuleSet::new(patterns)?, &[ServerRoute::catch_all()])
    }

    /// Whether `path` (leading slash, no query string) should be prerendered
    pub fn should_prerender(&self, path: &str) -> bool {
        if let Some(rule) = self.exclusions.first_match(path) {
            tracing::trace!(path, rule = rule.as_str(), "path excluded from prerendering");
            return false;
        }

        self.render_mode(path)
            .is_some_and(|mode| mode != RenderMode::Client)
    }

    /// Render mode of the first route matching `path`
    pub fn render_mode(&self, path: &str) -> Option<RenderMode> {
        self.routes
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .map(|(_, mode)| *mode)
    }
}

impl Default for UrlMatcher {
    fn default() -> Self {
        Self {
            exclusions: ExclusionRuleSet::default(),
            routes: vec![(PathPattern::Prefix("/".to_string()), RenderMode::Prerender)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_respects_segments() {
        let pattern = PathPattern::parse("/sockjs-node").unwrap();
        assert!(pattern.matches("/sockjs-node"));
        assert!(pattern.matches("/sockjs-node/info"));
        assert!(!pattern.matches("/sockjs-nodes"));
        assert!(!pattern.matches("/about"));
    }

    #[test]
    fn test_matching_ignores_case() {
        let prefix = PathPattern::parse("/sockjs-node").unwrap();
        assert!(prefix.matches("/SockJS-Node/info"));
        assert!(prefix.matches("/SOCKJS-NODE"));
        assert!(!prefix.matches("/SockJS-Nodes"));

        let glob = PathPattern::parse("/api/*").unwrap();
        assert!(glob.matches("/API/users"));

        let matcher = UrlMatcher::with_exclusions(&["/sockjs-node"]).unwrap();
        assert!(!matcher.should_prerender("/SockJS-Node/info"));
    }

    #[test]
    fn test_prefix_with_multibyte_path() {
        let pattern = PathPattern::parse("/ab").unwrap();
        assert!(!pattern.matches("/é"));
        assert!(pattern.matches("/AB/é"));
    }

    #[test]
    fn test_trailing_slash_prefix() {
        let pattern = PathPattern::parse("/api/").unwrap();
        assert!(pattern.matches("/api/users"));
        assert!(!pattern.matches("/api"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let pattern = PathPattern::parse("/users/*/avatar").unwrap();
        assert!(pattern.matches("/users/42/avatar"));
        assert!(pattern.matches("/users/42/avatar/large"));
        assert!(!pattern.matches("/users/42/x/avatar"));
    }

    #[test]
    fn test_double_star_spans_segments() {
        let pattern = PathPattern::parse("/docs/**").unwrap();
        assert!(pattern.matches("/docs/a/b/c"));
        assert!(!pattern.matches("/blog/a"));

        let all = PathPattern::parse("**").unwrap();
        assert!(all.matches("/"));
        assert!(all.matches("/anything/at/all"));
    }

    #[test]
    fn test_glob_escapes_regex_metacharacters() {
        let pattern = PathPattern::parse("/v1.0/*").unwrap();
        assert!(pattern.matches("/v1.0/items"));
        assert!(!pattern.matches("/v1x0/items"));
    }

    #[test]
    fn test_excluded_paths_are_not_prerendered() {
        let matcher = UrlMatcher::with_exclusions(&["/sockjs-node", "/api/*"]).unwrap();
        assert!(!matcher.should_prerender("/sockjs-node/info"));
        assert!(!matcher.should_prerender("/api/users"));
        assert!(matcher.should_prerender("/about"));
    }

    #[test]
    fn test_empty_exclusions_prerender_everything() {
        let matcher = UrlMatcher::with_exclusions::<&str>(&[]).unwrap();
        for path in ["/", "/about", "/a/b/c", "/sockjs-node"] {
            assert!(matcher.should_prerender(path), "{path}");
        }
        assert!(UrlMatcher::default().should_prerender("/deep/link"));
    }

    #[test]
    fn test_first_exclusion_wins() {
        let rules = ExclusionRuleSet::new(&["/admin/**", "/admin"]).unwrap();
        assert_eq!(rules.first_match("/admin/users").map(|r| r.as_str()), Some("/admin/**"));
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn test_client_routes_skip_prerendering() {
        let matcher = UrlMatcher::new(
            ExclusionRuleSet::default(),
            &[
                ServerRoute::new("/dashboard/**", RenderMode::Client),
                ServerRoute::catch_all(),
            ],
        )
        .unwrap();

        assert!(!matcher.should_prerender("/dashboard/stats"));
        assert!(matcher.should_prerender("/about"));
        assert_eq!(matcher.render_mode("/dashboard"), Some(RenderMode::Client));
    }

    #[test]
    fn test_unrouted_paths_are_not_prerendered() {
        let matcher = UrlMatcher::new(
            ExclusionRuleSet::default(),
            &[ServerRoute::new("/blog/**", RenderMode::Server)],
        )
        .unwrap();
        assert!(matcher.should_prerender("/blog/post-1"));
        assert!(!matcher.should_prerender("/shop"));
    }

    #[test]
    fn test_route_deserializes() {
        let route: ServerRoute =
            serde_json::from_str(r#"{"path": "**", "render_mode": "prerender"}"#).unwrap();
        assert_eq!(route, ServerRoute::catch_all());
    }
}
