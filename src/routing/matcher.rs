//! Path template compilation and matching.
//!
//! # Responsibilities
//! - Compile `/`-separated templates with `:name` parameters into one anchored regex
//! - Match request paths and return captured parameters by name
//!
//! # Design Decisions
//! - Compilation is the only fallible step; matching never fails, it only misses
//! - Parameters are positional capture groups; names live beside the regex, so any
//!   character allowed in a name (including `.`) never reaches the regex syntax
//! - `:name` captures one or more characters of a single segment, non-greedily
//! - `*name` as the final segment captures the remainder of the path, slashes included
//! - Literal text is escaped; the whole path must match (no partial matches)

use regex::Regex;
use thiserror::Error;

/// Errors raised while compiling a path template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("route template `{0}` must start with `/`")]
    MissingLeadingSlash(String),

    #[error("route template `{template}` has a parameter without a name at byte {position}")]
    EmptyParameter { template: String, position: usize },

    #[error("route template `{template}` declares parameter `{name}` twice")]
    DuplicateParameter { template: String, name: String },

    #[error("route template `{0}` has a catch-all parameter before the last segment")]
    CatchAllNotLast(String),

    #[error("route template `{template}` failed to compile: {reason}")]
    Regex { template: String, reason: String },
}

/// A compiled, immutable path template.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    template: String,
    regex: Regex,
    names: Vec<String>,
}

/// Parameters captured by a successful match, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    values: Vec<(String, String)>,
}

impl RouteParams {
    /// Look up a captured value by parameter name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Outcome of matching a path against a pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMatch {
    pub matched: bool,
    pub params: RouteParams,
}

impl RouteMatch {
    fn miss() -> Self {
        Self::default()
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

impl RoutePattern {
    /// Compile a template such as `/user/:id/posts/:post.id`.
    pub fn compile(template: &str) -> Result<Self, RouteError> {
        if !template.starts_with('/') {
            return Err(RouteError::MissingLeadingSlash(template.to_string()));
        }

        let segments: Vec<&str> = template.split('/').filter(|s| !s.is_empty()).collect();
        let mut pattern = String::from("^");
        let mut names: Vec<String> = Vec::new();

        for (index, segment) in segments.iter().enumerate() {
            pattern.push('/');

            if let Some(name) = segment.strip_prefix('*') {
                if index + 1 != segments.len() {
                    return Err(RouteError::CatchAllNotLast(template.to_string()));
                }
                if name.is_empty() || !name.chars().all(is_name_char) {
                    return Err(RouteError::EmptyParameter {
                        template: template.to_string(),
                        position: template.len() - segment.len(),
                    });
                }
                push_name(template, &mut names, name)?;
                pattern.push_str("(.+)");
                continue;
            }

            compile_segment(template, segment, &mut pattern, &mut names)?;
        }

        if segments.is_empty() {
            pattern.push('/');
        } else if template.ends_with('/') {
            pattern.push('/');
        }
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| RouteError::Regex {
            template: template.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            template: template.to_string(),
            regex,
            names,
        })
    }

    /// The template this pattern was compiled from.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Parameter names in declaration order.
    pub fn param_names(&self) -> &[String] {
        &self.names
    }

    /// Match a full request path.
    pub fn matches(&self, path: &str) -> RouteMatch {
        let Some(captures) = self.regex.captures(path) else {
            return RouteMatch::miss();
        };

        let values = self
            .names
            .iter()
            .enumerate()
            .filter_map(|(i, name)| {
                captures
                    .get(i + 1)
                    .map(|m| (name.clone(), m.as_str().to_string()))
            })
            .collect();

        RouteMatch {
            matched: true,
            params: RouteParams { values },
        }
    }

    /// Convenience: captured parameters, or `None` on a miss.
    pub fn captures(&self, path: &str) -> Option<RouteParams> {
        let result = self.matches(path);
        result.matched.then_some(result.params)
    }
}

fn push_name(template: &str, names: &mut Vec<String>, name: &str) -> Result<(), RouteError> {
    if names.iter().any(|n| n == name) {
        return Err(RouteError::DuplicateParameter {
            template: template.to_string(),
            name: name.to_string(),
        });
    }
    names.push(name.to_string());
    Ok(())
}

fn compile_segment(
    template: &str,
    segment: &str,
    pattern: &mut String,
    names: &mut Vec<String>,
) -> Result<(), RouteError> {
    // Byte offset of the segment inside the template, for error positions.
    let base = segment.as_ptr() as usize - template.as_ptr() as usize;
    let mut literal = String::new();
    let mut chars = segment.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        if c != ':' {
            literal.push(c);
            continue;
        }

        let mut name = String::new();
        while let Some(&(_, next)) = chars.peek() {
            if !is_name_char(next) {
                break;
            }
            name.push(next);
            chars.next();
        }
        if name.is_empty() {
            return Err(RouteError::EmptyParameter {
                template: template.to_string(),
                position: base + offset,
            });
        }

        pattern.push_str(&regex::escape(&literal));
        literal.clear();
        push_name(template, names, &name)?;
        pattern.push_str("([^/]+?)");
    }

    pattern.push_str(&regex::escape(&literal));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_template() {
        let pattern = RoutePattern::compile("/login").unwrap();
        assert!(pattern.matches("/login").matched);
        assert!(!pattern.matches("/login/").matched);
        assert!(!pattern.matches("/logout").matched);
        assert!(pattern.param_names().is_empty());
    }

    #[test]
    fn test_root_template() {
        let pattern = RoutePattern::compile("/").unwrap();
        assert!(pattern.matches("/").matched);
        assert!(!pattern.matches("/x").matched);
    }

    #[test]
    fn test_parameters_substitute() {
        let cases = [
            ("/user/:id", vec![("id", "42")]),
            ("/user/:id/posts/:post", vec![("id", "a-b"), ("post", "x y")]),
            ("/:a/:b/:c", vec![("a", "1"), ("b", "two"), ("c", "3.0")]),
            ("/file/:name.ext", vec![("name.ext", "readme")]),
            ("/v1/report-:year", vec![("year", "2024")]),
        ];

        for (template, params) in cases {
            let pattern = RoutePattern::compile(template).unwrap();
            let mut path = template.to_string();
            for (name, value) in &params {
                path = path.replacen(&format!(":{}", name), value, 1);
            }

            let result = pattern.matches(&path);
            assert!(result.matched, "{} should match {}", template, path);
            for (name, value) in &params {
                assert_eq!(result.params.get(name), Some(*value), "{} in {}", name, template);
            }
        }
    }

    #[test]
    fn test_anchoring_rejects_extra_segments() {
        for (template, path) in [
            ("/user/:id", "/user/42"),
            ("/a/:x/b", "/a/1/b"),
            ("/static", "/static"),
        ] {
            let pattern = RoutePattern::compile(template).unwrap();
            assert!(pattern.matches(path).matched);
            assert!(!pattern.matches(&format!("{}/extra", path)).matched);
            assert!(!pattern.matches(&format!("/prefix{}", path)).matched);
        }
    }

    #[test]
    fn test_parameter_requires_one_character() {
        let pattern = RoutePattern::compile("/user/:id").unwrap();
        assert!(!pattern.matches("/user/").matched);
    }

    #[test]
    fn test_literals_are_escaped() {
        let pattern = RoutePattern::compile("/files/a.b+c").unwrap();
        assert!(pattern.matches("/files/a.b+c").matched);
        assert!(!pattern.matches("/files/aXbbc").matched);
    }

    #[test]
    fn test_catch_all() {
        let pattern = RoutePattern::compile("/:zone/resource/*path").unwrap();
        let params = pattern.captures("/docs/resource/css/site.css").unwrap();
        assert_eq!(params.get("zone"), Some("docs"));
        assert_eq!(params.get("path"), Some("css/site.css"));
        assert!(pattern.captures("/docs/resource/").is_none());
    }

    #[test]
    fn test_malformed_templates() {
        assert!(matches!(
            RoutePattern::compile("user/:id"),
            Err(RouteError::MissingLeadingSlash(_))
        ));
        assert!(matches!(
            RoutePattern::compile("/user/:"),
            Err(RouteError::EmptyParameter { position: 6, .. })
        ));
        assert!(matches!(
            RoutePattern::compile("/:id/:id"),
            Err(RouteError::DuplicateParameter { .. })
        ));
        assert!(matches!(
            RoutePattern::compile("/*rest/tail"),
            Err(RouteError::CatchAllNotLast(_))
        ));
    }

    #[test]
    fn test_pattern_shared_across_threads() {
        let pattern = std::sync::Arc::new(RoutePattern::compile("/item/:id").unwrap());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let pattern = pattern.clone();
                std::thread::spawn(move || {
                    pattern
                        .captures(&format!("/item/{}", i))
                        .and_then(|p| p.get("id").map(str::to_string))
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), Some(i.to_string()));
        }
    }
}
